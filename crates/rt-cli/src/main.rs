mod cmd;
mod context;
mod output;
mod prompter;

use clap::{Parser, Subcommand};
use cmd::{ReleaseArgs, SlotArgs};
use colored::Colorize;
use context::{GlobalArgs, Settings};
use rt_core::commands::infra::Mark;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "rt",
    about = "Release tool for immutable applications: infrastructure, versioned slots and traffic",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new application definition from a skeleton
    CreateApp {
        /// Skeleton name under ~/.rt/skeletons
        #[arg(long)]
        skeleton: String,
        /// Directory the application directory is created in
        #[arg(long, default_value = ".")]
        path: PathBuf,
    },

    /// Provision application infrastructure
    ApplyInfra {
        #[command(flatten)]
        release: ReleaseArgs,
    },

    /// Destroy application infrastructure
    DestroyInfra {
        #[command(flatten)]
        release: ReleaseArgs,
    },

    /// Show the plan for the infrastructure level
    DiffInfra {
        #[command(flatten)]
        release: ReleaseArgs,
    },

    /// Deploy an application into a slot
    Deploy {
        #[command(flatten)]
        slot: SlotArgs,
        #[command(flatten)]
        release: ReleaseArgs,
        /// Directory with the slot's Terraform configuration
        path: Option<PathBuf>,
    },

    /// Destroy one slot of an application
    DeployDestroy {
        #[command(flatten)]
        slot: SlotArgs,
        #[command(flatten)]
        release: ReleaseArgs,
        path: Option<PathBuf>,
    },

    /// Show the plan for a slot
    DiffDeploy {
        #[command(flatten)]
        slot: SlotArgs,
        #[command(flatten)]
        release: ReleaseArgs,
        path: Option<PathBuf>,
    },

    /// Detach load balancers from a slot's scaling group
    DisableTraffic {
        #[command(flatten)]
        slot: SlotArgs,
    },

    /// Attach load balancers to a slot's scaling group
    EnableTraffic {
        #[command(flatten)]
        slot: SlotArgs,
    },

    /// Show which scaling groups have load balancers attached
    ShowTraffic,

    /// List all applications of an environment
    ListApps,

    /// List the slots of an application
    ListSlots,

    /// List the slot prefixes of an application
    ListSlotPrefixes,

    /// Remove records of inactive slots
    CleanupSlots {
        /// Only slots whose last deployment started before this long ago (e.g. 7day, 2week)
        #[arg(long, default_value = "2week")]
        older_than: String,
    },

    /// Add a slot prefix
    AddSlotPrefix {
        prefix: String,
        #[arg(short, long)]
        yes: bool,
    },

    /// Delete a slot prefix
    DeleteSlotPrefix {
        prefix: String,
        #[arg(short, long)]
        yes: bool,
    },

    /// Taint an infrastructure resource
    TaintInfraResource {
        resource: String,
        #[arg(long)]
        module: Option<String>,
    },

    /// Untaint an infrastructure resource
    UntaintInfraResource {
        resource: String,
        #[arg(long)]
        module: Option<String>,
    },

    /// Taint a resource of a deployed slot
    TaintDeployedResource {
        #[arg(long)]
        slot_id: Option<String>,
        #[arg(long)]
        module: Option<String>,
        path: PathBuf,
        resource: String,
    },

    /// Untaint a resource of a deployed slot
    UntaintDeployedResource {
        #[arg(long)]
        slot_id: Option<String>,
        #[arg(long)]
        module: Option<String>,
        path: PathBuf,
        resource: String,
    },

    /// Show the infrastructure outputs of an application
    Output {
        /// Single output to show
        #[arg(long)]
        name: Option<String>,
    },

    /// Show the outputs of one slot
    SlotOutput {
        #[arg(long)]
        slot_id: Option<String>,
        #[arg(long)]
        name: Option<String>,
        path: Option<PathBuf>,
    },

    /// List the latest deployments of an application
    ListDeployments {
        #[arg(long)]
        slot_id: Option<String>,
        /// Deployments shown per slot
        #[arg(long, default_value_t = rt_core::commands::listing::DEFAULT_DEPLOYMENT_LIMIT)]
        limit: usize,
    },

    /// Validate the Terraform code in the working directory
    ValidateInfra,

    /// Validate the Terraform code of every slot directory
    ValidateSlots,

    /// Show the tool and Terraform versions
    Version,
}

fn main() {
    let cli = Cli::parse();

    let settings = match Settings::resolve(&cli.global) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{} {e:#}", "error:".red().bold());
            std::process::exit(1);
        }
    };
    if let Err(e) = context::init_logging(&settings) {
        eprintln!("{} {e:#}", "error:".red().bold());
        std::process::exit(1);
    }

    let result = match cli.command {
        Commands::CreateApp { skeleton, path } => cmd::create_app::run(&settings, &skeleton, &path),
        Commands::ApplyInfra { release } => cmd::infra::apply(&settings, &release),
        Commands::DestroyInfra { release } => cmd::infra::destroy(&settings, &release),
        Commands::DiffInfra { release } => cmd::infra::diff(&settings, &release),
        Commands::Deploy {
            slot,
            release,
            path,
        } => cmd::slots::deploy(&settings, &slot, &release, path.as_deref()),
        Commands::DeployDestroy {
            slot,
            release,
            path,
        } => cmd::slots::destroy(&settings, &slot, &release, path.as_deref()),
        Commands::DiffDeploy {
            slot,
            release,
            path,
        } => cmd::slots::diff(&settings, &slot, &release, path.as_deref()),
        Commands::DisableTraffic { slot } => cmd::traffic::disable(&settings, &slot),
        Commands::EnableTraffic { slot } => cmd::traffic::enable(&settings, &slot),
        Commands::ShowTraffic => cmd::traffic::show(&settings),
        Commands::ListApps => cmd::listing::apps(&settings),
        Commands::ListSlots => cmd::listing::slots(&settings),
        Commands::ListSlotPrefixes => cmd::prefixes::list(&settings),
        Commands::CleanupSlots { older_than } => cmd::slots::cleanup(&settings, &older_than),
        Commands::AddSlotPrefix { prefix, yes } => cmd::prefixes::add(&settings, &prefix, yes),
        Commands::DeleteSlotPrefix { prefix, yes } => {
            cmd::prefixes::delete(&settings, &prefix, yes)
        }
        Commands::TaintInfraResource { resource, module } => {
            cmd::infra::mark(&settings, Mark::Taint, &resource, module.as_deref())
        }
        Commands::UntaintInfraResource { resource, module } => {
            cmd::infra::mark(&settings, Mark::Untaint, &resource, module.as_deref())
        }
        Commands::TaintDeployedResource {
            slot_id,
            module,
            path,
            resource,
        } => cmd::slots::mark(
            &settings,
            Mark::Taint,
            slot_id.as_deref(),
            &path,
            &resource,
            module.as_deref(),
        ),
        Commands::UntaintDeployedResource {
            slot_id,
            module,
            path,
            resource,
        } => cmd::slots::mark(
            &settings,
            Mark::Untaint,
            slot_id.as_deref(),
            &path,
            &resource,
            module.as_deref(),
        ),
        Commands::Output { name } => cmd::infra::output(&settings, name.as_deref()),
        Commands::SlotOutput {
            slot_id,
            name,
            path,
        } => cmd::slots::output(&settings, slot_id.as_deref(), path.as_deref(), name.as_deref()),
        Commands::ListDeployments { slot_id, limit } => {
            cmd::listing::deployments(&settings, slot_id.as_deref(), limit)
        }
        Commands::ValidateInfra => cmd::infra::validate(&settings),
        Commands::ValidateSlots => cmd::infra::validate_slots(&settings),
        Commands::Version => cmd::version::run(&settings),
    };

    if let Err(e) = result {
        tracing::debug!("command failed: {e:?}");
        eprintln!("{} {}", "error:".red().bold(), format!("{e:#}").red().bold());
        std::process::exit(1);
    }
}
