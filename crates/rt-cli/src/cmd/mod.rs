pub mod create_app;
pub mod infra;
pub mod listing;
pub mod prefixes;
pub mod slots;
pub mod traffic;
pub mod version;

use clap::Args;
use colored::Colorize;
use rt_core::commands::{Outcome, ReleaseFlags, SlotSelector};
use rt_core::terraform::PlanResourceDiff;
use rt_core::validate;

/// Flags of every command that plans and applies.
#[derive(Args, Debug, Clone, Default)]
pub struct ReleaseArgs {
    /// Terraform variable as key=value; repeatable
    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub vars: Vec<String>,

    /// Limit the run to one resource address
    #[arg(long)]
    pub target: Option<String>,

    /// Answer yes to every question
    #[arg(short, long)]
    pub yes: bool,

    /// Apply even when the plan shows no changes
    #[arg(short, long)]
    pub force: bool,

    /// Pass -Xlegacy-graph to Terraform
    #[arg(short = 'x', long)]
    pub xlegacy: bool,
}

impl ReleaseArgs {
    pub fn to_flags(&self) -> anyhow::Result<ReleaseFlags> {
        Ok(ReleaseFlags {
            variables: validate::variables(&self.vars)?,
            target: self.target.clone().filter(|t| !t.is_empty()),
            yes: self.yes,
            force: self.force,
            xlegacy: self.xlegacy,
        })
    }
}

/// Which slot a command is about.
#[derive(Args, Debug, Clone, Default)]
pub struct SlotArgs {
    #[arg(long)]
    pub slot_id: Option<String>,

    /// Use the prefix's counter instead of an explicit slot id
    #[arg(long)]
    pub slot_prefix: Option<String>,

    /// With --slot-prefix, the slot before the last one
    #[arg(long = "previous-slot")]
    pub previous: bool,
}

impl SlotArgs {
    pub fn to_selector(&self) -> SlotSelector {
        SlotSelector {
            slot_id: self.slot_id.clone().filter(|s| !s.is_empty()),
            slot_prefix: self.slot_prefix.clone().filter(|s| !s.is_empty()),
            previous: self.previous,
        }
    }
}

/// Final line of a plan-and-apply command.
pub fn report(outcome: &Outcome, done: &str) {
    match outcome {
        Outcome::Unchanged => {}
        Outcome::Declined => println!("OK, bailing out."),
        Outcome::Applied(applied) => {
            for w in &applied.warnings {
                println!("{} {w}", "warning:".yellow());
            }
            let d = applied.diff;
            println!(
                "{} ({} created, {} changed, {} removed)",
                done.green(),
                d.created,
                d.changed,
                d.removed
            );
        }
    }
}

pub fn print_diff(diff: &PlanResourceDiff) {
    if diff.is_empty() {
        println!("No changes.");
        return;
    }
    println!(
        "Plan: {} to add, {} to change, {} to destroy.",
        diff.to_create, diff.to_change, diff.to_remove
    );
}
