use super::{print_diff, report, ReleaseArgs};
use crate::context::{self, Needs, Settings};
use crate::output::print_json;
use rt_core::commands::infra::{self, Mark};
use rt_core::commands::Outcome;

const ENGINE_WRITE: Needs = Needs {
    remote_state: true,
    cloud: false,
    writes: true,
};

const ENGINE_READ: Needs = Needs {
    remote_state: true,
    cloud: false,
    writes: false,
};

pub fn apply(settings: &Settings, args: &ReleaseArgs) -> anyhow::Result<()> {
    let flags = args.to_flags()?;
    let session = context::open(settings, ENGINE_WRITE)?;
    let outcome = infra::apply_infra(&session, &flags)?;
    report(&outcome, "Infrastructure applied");
    Ok(())
}

pub fn destroy(settings: &Settings, args: &ReleaseArgs) -> anyhow::Result<()> {
    let flags = args.to_flags()?;
    let session = context::open(settings, ENGINE_WRITE)?;
    let outcome = infra::destroy_infra(&session, &flags)?;
    if let Outcome::Applied(applied) = &outcome {
        tracing::debug!(state_empty = applied.state_empty, "infra destroyed");
    }
    report(&outcome, "Infrastructure destroyed");
    Ok(())
}

pub fn diff(settings: &Settings, args: &ReleaseArgs) -> anyhow::Result<()> {
    let flags = args.to_flags()?;
    let session = context::open(settings, ENGINE_READ)?;
    let diff = infra::diff_infra(&session, &flags)?;
    if settings.json {
        return print_json(&diff);
    }
    print_diff(&diff);
    Ok(())
}

pub fn mark(
    settings: &Settings,
    mark: Mark,
    resource: &str,
    module: Option<&str>,
) -> anyhow::Result<()> {
    let session = context::open(settings, ENGINE_WRITE)?;
    let message = infra::mark_infra_resource(&session, mark, resource, module)?;
    println!("{message}");
    Ok(())
}

pub fn output(settings: &Settings, name: Option<&str>) -> anyhow::Result<()> {
    let session = context::open(settings, ENGINE_READ)?;
    print!("{}", infra::output(&session, name)?);
    Ok(())
}

pub fn validate(settings: &Settings) -> anyhow::Result<()> {
    let session = context::open(settings, Needs::default())?;
    infra::validate_infra(&session)?;
    Ok(())
}

pub fn validate_slots(settings: &Settings) -> anyhow::Result<()> {
    let session = context::open(settings, Needs::default())?;
    infra::validate_slots(&session)?;
    Ok(())
}
