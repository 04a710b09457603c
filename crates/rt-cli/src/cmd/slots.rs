use super::{print_diff, report, ReleaseArgs, SlotArgs};
use crate::context::{self, Needs, Settings};
use crate::output::{print_json, print_table};
use rt_core::commands::infra::Mark;
use rt_core::commands::slots::{self, Kept};
use rt_core::validate;
use serde::Serialize;
use std::path::Path;

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

pub fn deploy(
    settings: &Settings,
    slot: &SlotArgs,
    args: &ReleaseArgs,
    path: Option<&Path>,
) -> anyhow::Result<()> {
    let flags = args.to_flags()?;
    let session = context::open(settings, ENGINE_WRITE)?;
    let outcome = slots::deploy(&session, &slot.to_selector(), path, &flags)?;
    report(&outcome, "Deployment finished");
    Ok(())
}

pub fn destroy(
    settings: &Settings,
    slot: &SlotArgs,
    args: &ReleaseArgs,
    path: Option<&Path>,
) -> anyhow::Result<()> {
    let flags = args.to_flags()?;
    let session = context::open(settings, ENGINE_WRITE)?;
    let outcome = slots::deploy_destroy(&session, &slot.to_selector(), path, &flags)?;
    report(&outcome, "Slot destroyed");
    Ok(())
}

pub fn diff(
    settings: &Settings,
    slot: &SlotArgs,
    args: &ReleaseArgs,
    path: Option<&Path>,
) -> anyhow::Result<()> {
    let flags = args.to_flags()?;
    let session = context::open(settings, ENGINE_READ)?;
    let diff = slots::diff_deploy(&session, &slot.to_selector(), path, &flags)?;
    if settings.json {
        return print_json(&diff);
    }
    print_diff(&diff);
    Ok(())
}

pub fn mark(
    settings: &Settings,
    mark: Mark,
    slot_id: Option<&str>,
    path: &Path,
    resource: &str,
    module: Option<&str>,
) -> anyhow::Result<()> {
    let session = context::open(settings, ENGINE_WRITE)?;
    let message =
        slots::mark_deployed_resource(&session, mark, slot_id, Some(path), resource, module)?;
    println!("{message}");
    Ok(())
}

pub fn output(
    settings: &Settings,
    slot_id: Option<&str>,
    path: Option<&Path>,
    name: Option<&str>,
) -> anyhow::Result<()> {
    let session = context::open(settings, ENGINE_READ)?;
    print!("{}", slots::slot_output(&session, slot_id, path, name)?);
    Ok(())
}

#[derive(Serialize)]
struct KeptSlot<'a> {
    slot_id: &'a str,
    reason: String,
}

fn reason(kept: &Kept) -> String {
    match kept {
        Kept::InFlight => "being deployed".to_string(),
        Kept::Active => "active".to_string(),
        Kept::Recent(age) => format!("deployed {} days ago", age.num_days()),
    }
}

pub fn cleanup(settings: &Settings, older_than: &str) -> anyhow::Result<()> {
    let older_than = validate::big_duration(older_than)?;
    let session = context::open(settings, Needs { writes: true, ..Needs::default() })?;
    let report = slots::cleanup_slots(&session, older_than, chrono::Utc::now())?;

    let kept: Vec<KeptSlot<'_>> = report
        .kept
        .iter()
        .map(|(slot_id, why)| KeptSlot {
            slot_id,
            reason: reason(why),
        })
        .collect();
    if settings.json {
        #[derive(Serialize)]
        struct Report<'a> {
            deleted: &'a [String],
            kept: &'a [KeptSlot<'a>],
        }
        return print_json(&Report {
            deleted: &report.deleted,
            kept: &kept,
        });
    }

    let mut rows: Vec<Vec<String>> = report
        .deleted
        .iter()
        .map(|id| vec![id.clone(), "deleted".to_string()])
        .collect();
    rows.extend(kept.iter().map(|k| vec![k.slot_id.to_string(), format!("kept ({})", k.reason)]));
    if rows.is_empty() {
        println!("No slots found.");
        return Ok(());
    }
    print_table(&["SLOT", "RESULT"], rows);
    Ok(())
}
