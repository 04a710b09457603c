//! Flags shared by every command, user profiles, logging, and assembling a
//! [`Session`] for the command that runs.

use crate::prompter::TerminalPrompter;
use anyhow::{bail, Context};
use clap::Args;
use rt_core::aws::cloud::AwsCloud;
use rt_core::aws::sts::{self, Identity};
use rt_core::aws::{AwsConfig, DEFAULT_REGION};
use rt_core::commands::{Session, DEFAULT_NAMESPACE};
use rt_core::config::{ProjectConfig, UserConfig};
use rt_core::prompt::{Prompter, Tone};
use rt_core::store::DeploymentState;
use rt_core::terraform::{Driver, DriverOptions, TerraformBinary};
use rt_core::{paths, validate};
use std::path::PathBuf;

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Environment, e.g. dev or prod
    #[arg(long, global = true, env = "RT_ENV")]
    pub env: Option<String>,

    /// Application name
    #[arg(long, global = true)]
    pub app: Option<String>,

    /// Named profile from ~/.aws/credentials
    #[arg(long, global = true, env = "RT_AWS_PROFILE")]
    pub aws_profile: Option<String>,

    /// AWS region [default: us-east-1]
    #[arg(long, global = true, env = "RT_AWS_REGION")]
    pub aws_region: Option<String>,

    /// Remote-state namespace; `default` means the AWS account id
    #[arg(long, global = true)]
    pub namespace: Option<String>,

    /// Profile from ~/.rt/config.yaml supplying defaults for these flags
    #[arg(long, global = true, env = "RT_PROFILE")]
    pub profile: Option<String>,

    /// Project configuration file [default: ./rt.yaml]
    #[arg(long, global = true, env = "RT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true, env = "RT_LOG")]
    pub verbose: bool,

    /// Write logs (and Terraform's) to ~/.rt/logs
    #[arg(long, global = true, env = "RT_ENABLE_FILE_LOGGING")]
    pub enable_file_logging: bool,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    pub json: bool,
}

/// Flags after profile defaults are applied.
#[derive(Debug, Clone)]
pub struct Settings {
    pub rt_home: PathBuf,
    pub env: Option<String>,
    pub app: Option<String>,
    pub aws_profile: Option<String>,
    pub aws_region: String,
    pub namespace: String,
    pub config: Option<PathBuf>,
    pub verbose: bool,
    pub log_file: Option<PathBuf>,
    pub json: bool,
}

impl Settings {
    pub fn resolve(args: &GlobalArgs) -> anyhow::Result<Self> {
        let rt_home = paths::rt_home()?;
        let profile = match &args.profile {
            Some(name) => {
                let path = paths::user_config_path(&rt_home);
                let users = UserConfig::load(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                users.profile(name)?.clone()
            }
            None => Default::default(),
        };

        let enable_file_logging =
            args.enable_file_logging || profile.enable_file_logging.unwrap_or(false);
        let log_file = enable_file_logging
            .then(|| paths::log_file_path(&rt_home, chrono::Utc::now()));

        Ok(Settings {
            env: args.env.clone().or(profile.env),
            app: args.app.clone().or(profile.app),
            aws_profile: args.aws_profile.clone().or(profile.aws_profile),
            aws_region: args
                .aws_region
                .clone()
                .or(profile.aws_region)
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            namespace: args
                .namespace
                .clone()
                .or(profile.namespace)
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            config: args.config.clone(),
            verbose: args.verbose || profile.verbose.unwrap_or(false),
            log_file,
            json: args.json,
            rt_home,
        })
    }

    pub fn env(&self) -> anyhow::Result<&str> {
        let env = self
            .env
            .as_deref()
            .context("--env is required (or RT_ENV, or a profile setting env)")?;
        validate::environment("env", env)?;
        Ok(env)
    }

    pub fn app(&self) -> anyhow::Result<&str> {
        let app = self
            .app
            .as_deref()
            .context("--app is required (or a profile setting app)")?;
        validate::application("app", app)?;
        Ok(app)
    }

    pub fn aws(&self) -> AwsConfig {
        AwsConfig::new(&self.aws_region, self.aws_profile.as_deref())
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

pub fn init_logging(settings: &Settings) -> anyhow::Result<()> {
    let level = if settings.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    let filter =
        tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    match &settings.log_file {
        Some(path) => {
            rt_core::io::ensure_dir(&paths::logs_dir(&settings.rt_home))?;
            let file = std::fs::File::create(path)
                .with_context(|| format!("failed to create log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter.add_directive(tracing::Level::DEBUG.into()))
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .init();
            eprintln!("Logging into {}", path.display());
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init(),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// What a command needs beyond the store.
#[derive(Debug, Clone, Copy, Default)]
pub struct Needs {
    /// Runs the engine against remote state.
    pub remote_state: bool,
    /// Talks to the scaling and load-balancing APIs.
    pub cloud: bool,
    /// Changes deployment state.
    pub writes: bool,
}

fn project_config_path(settings: &Settings, default: PathBuf) -> PathBuf {
    settings.config.clone().unwrap_or(default)
}

/// Resolve the caller when something depends on the account id: the
/// `default` namespace or an `${aws_account_id}` placeholder in the config.
fn identity(
    settings: &Settings,
    prompter: &TerminalPrompter,
    config_text: &str,
    writes: bool,
) -> anyhow::Result<(Identity, Option<String>)> {
    let needed =
        settings.namespace == DEFAULT_NAMESPACE || config_text.contains("${aws_account_id}");
    if !needed {
        tracing::debug!("skipping caller identity lookup");
        return Ok((Identity::default(), None));
    }
    let identity = sts::caller_identity(&settings.aws())
        .context("Unable to determine the AWS identity; check your credentials")?;
    prompter.say(
        Tone::Plain,
        &format!(
            "Authenticated as {} (account {})",
            identity.arn, identity.account_id
        ),
    );
    if !writes {
        return Ok((identity, None));
    }
    let ip = match sts::public_ip(sts::CHECK_IP_URL) {
        Ok(ip) => {
            prompter.say(Tone::Plain, &format!("Current IP Address: {ip}"));
            Some(ip)
        }
        Err(e) => {
            tracing::warn!("unable to detect public IP address: {e}");
            None
        }
    };
    Ok((identity, ip))
}

fn open_store(
    settings: &Settings,
    prompter: &TerminalPrompter,
    config: &ProjectConfig,
    writes: bool,
) -> anyhow::Result<DeploymentState> {
    let store = DeploymentState::from_config(&config.deployment_state)?;
    if !store.are_backends_ready()? {
        bail!("Deployment state backends are not ready, check the deployment_state configuration");
    }
    if writes && !store.supports_write_lock() {
        prompter.say(
            Tone::Warning,
            "Note: Locking is not supported by the deployment state backends, avoid running rt concurrently on the same app",
        );
    }
    tracing::debug!(?store, json = settings.json, "deployment state opened");
    Ok(store)
}

/// A session for the app in `./rt.yaml` (or `--config`).
pub fn open(settings: &Settings, needs: Needs) -> anyhow::Result<Session> {
    let env = settings.env()?;
    let app = settings.app()?;
    validate::namespace("namespace", &settings.namespace)?;
    let cwd = std::env::current_dir().context("failed to read the working directory")?;
    let config_path = project_config_path(settings, paths::project_config_path(&cwd));
    open_at(settings, needs, env, app, cwd, config_path)
}

/// A store-only session for listing every application; the config defaults
/// to `~/.rt/rt.yaml`.
pub fn open_store_only(settings: &Settings) -> anyhow::Result<DeploymentState> {
    let env = settings.env()?;
    let prompter = TerminalPrompter::new();
    let path = project_config_path(settings, paths::project_config_path(&settings.rt_home));
    let text = std::fs::read_to_string(&path).unwrap_or_default();
    let (identity, _) = identity(settings, &prompter, &text, false)?;
    let config = ProjectConfig::load(&path, env, &identity.account_id)?;
    open_store(settings, &prompter, &config, false)
}

fn open_at(
    settings: &Settings,
    needs: Needs,
    env: &str,
    app: &str,
    cwd: PathBuf,
    config_path: PathBuf,
) -> anyhow::Result<Session> {
    let prompter = TerminalPrompter::new();
    let text = std::fs::read_to_string(&config_path).unwrap_or_default();
    let (identity, ip) = identity(settings, &prompter, &text, needs.writes)?;
    let config = ProjectConfig::load(&config_path, env, &identity.account_id)?;
    let store = open_store(settings, &prompter, &config, needs.writes)?;

    // Read-only listings and traffic commands never start the engine, so
    // they do not require it to be installed.
    let driver = if needs.remote_state || needs.writes {
        Driver::from_options(&DriverOptions {
            log_path: settings.log_file.clone(),
            echo: true,
        })?
    } else {
        Driver::new(Box::new(TerraformBinary::new("terraform")))
    };

    let mut session = Session::new(env, app, store, driver, Box::new(prompter) as Box<dyn Prompter>)
        .with_identity(identity, ip)
        .with_namespace(&settings.namespace)
        .with_cwd(cwd);
    if needs.remote_state {
        let remote = config.require_remote_state(&config_path)?.clone();
        session = session.with_remote_state(remote);
    }
    if needs.cloud {
        let cloud = AwsCloud::new(&settings.aws()).context("failed to set up the AWS client")?;
        session = session.with_cloud(Box::new(cloud));
    }
    tracing::debug!(?session, "session ready");
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(namespace: &str) -> Settings {
        Settings {
            rt_home: PathBuf::from("/tmp/rt-home"),
            env: Some("dev".into()),
            app: Some("hello".into()),
            aws_profile: None,
            aws_region: DEFAULT_REGION.into(),
            namespace: namespace.into(),
            config: None,
            verbose: false,
            log_file: None,
            json: false,
        }
    }

    #[test]
    fn env_and_app_are_validated() {
        let mut s = settings("team");
        assert_eq!(s.env().unwrap(), "dev");
        s.env = Some("production".into());
        assert!(s.env().unwrap_err().to_string().contains("invalid env"));
        s.env = None;
        assert!(s.env().unwrap_err().to_string().contains("--env is required"));
        s.app = Some("shared-services".into());
        assert!(s.app().is_err());
    }

    #[test]
    fn identity_is_skipped_for_explicit_namespace() {
        let s = settings("team");
        let (identity, ip) =
            identity(&s, &TerminalPrompter::new(), "deployment_state: []", true).unwrap();
        assert_eq!(identity, Identity::default());
        assert!(ip.is_none());
    }

    #[test]
    fn explicit_config_path_wins() {
        let mut s = settings("team");
        assert_eq!(
            project_config_path(&s, PathBuf::from("rt.yaml")),
            PathBuf::from("rt.yaml")
        );
        s.config = Some(PathBuf::from("/etc/rt.yaml"));
        assert_eq!(
            project_config_path(&s, PathBuf::from("rt.yaml")),
            PathBuf::from("/etc/rt.yaml")
        );
    }
}
