//! Commands on individual slots: deploy, destroy, diff, taint and outputs,
//! plus removal of stale slot records.

use super::infra::Mark;
use super::{output_message, Outcome, ReleaseFlags, Session, SlotSelector};
use crate::error::{Result, RtError};
use crate::paths;
use crate::prompt::Tone;
use crate::release::{self, Layer};
use crate::schema::ApplicationData;
use crate::terraform::PlanResourceDiff;
use crate::validate;
use chrono::{DateTime, Duration, Utc};
use std::path::Path;

fn slot_name(prefix: &str, counter: u64) -> String {
    format!("{prefix}{counter}")
}

/// The single slot selection the operator made.
enum Selected<'a> {
    Id(&'a str),
    Prefix(&'a str),
}

/// Exactly one of `--slot-id` and `--slot-prefix`.
fn selected<'a>(s: &Session, sel: &'a SlotSelector) -> Result<Selected<'a>> {
    match (sel.slot_id.as_deref(), sel.slot_prefix.as_deref()) {
        (Some(id), None) => Ok(Selected::Id(id)),
        (None, Some(prefix)) => Ok(Selected::Prefix(prefix)),
        (None, None) => Err(RtError::Usage(format!(
            "'slot-id' or 'slot-prefix' is required parameter for {:?} (migrated app)",
            s.app
        ))),
        (Some(_), Some(_)) => Err(RtError::Usage(
            "You can specify either 'slot-id' or 'slot-prefix', not both.".into(),
        )),
    }
}

fn counter_of(s: &Session, prefix: &str, app: &ApplicationData) -> Result<u64> {
    match s.store.get_slot_counter(prefix, app) {
        (counter, true) => Ok(counter),
        (_, false) => Err(RtError::SlotPrefixNotFound(prefix.to_string())),
    }
}

/// Slot a new deployment goes into. A prefix mints the next id and saves the
/// counter straight away.
fn next_slot(s: &Session, sel: &SlotSelector, app: &mut ApplicationData) -> Result<String> {
    let slot_id = match selected(s, sel)? {
        Selected::Id(id) => id.to_string(),
        Selected::Prefix(prefix) => {
            let old = counter_of(s, prefix, app)?;
            let (counter, updated) = s.store.increment_slot_counter(prefix, app.clone())?;
            s.store.save_application(&s.app, &updated)?;
            *app = updated;
            let slot_id = slot_name(prefix, counter);
            s.say(
                Tone::Plain,
                &format!(
                    "Last slot ID is {}, preparing deploy into {slot_id}",
                    slot_name(prefix, old)
                ),
            );
            slot_id
        }
    };
    validate::slot_id("slot-id", &slot_id)?;
    Ok(slot_id)
}

/// Slot an operation on existing deployments targets: the prefix's current
/// counter, or the one before it with `previous`. Never mutates the counter.
pub fn current_slot(s: &Session, sel: &SlotSelector, app: &ApplicationData) -> Result<String> {
    let slot_id = match selected(s, sel)? {
        Selected::Id(id) => id.to_string(),
        Selected::Prefix(prefix) => {
            let counter = counter_of(s, prefix, app)?;
            if sel.previous {
                slot_name(prefix, counter.saturating_sub(1))
            } else {
                slot_name(prefix, counter)
            }
        }
    };
    validate::slot_id("slot-id", &slot_id)?;
    Ok(slot_id)
}

pub fn deploy(
    s: &Session,
    sel: &SlotSelector,
    path: Option<&Path>,
    flags: &ReleaseFlags,
) -> Result<Outcome> {
    let Some(mut app) = s.begin_application(flags.yes)? else {
        return Ok(Outcome::Declined);
    };
    release::check_writable(&app)?;
    let requested = match selected(s, sel)? {
        Selected::Id(id) | Selected::Prefix(id) => id,
    };
    if s.ip_address.is_none() {
        s.say(Tone::Warning, "Note: We were unable to detect your IP address");
    }
    let engine_version = s.engine_version()?;
    s.slot_root(path, requested)?;
    let slot_id = next_slot(s, sel, &mut app)?;
    let root = s.slot_root(path, &slot_id)?;

    let note = format!(
        "It looks like you want to deploy '{}' into slot '{slot_id}' ({}/{}).",
        s.app,
        s.namespace(),
        s.env
    );
    let spec = s.release_spec(
        Layer::Slot(slot_id.clone()),
        root,
        flags.variables.clone(),
        flags,
    );
    s.with_release(spec, |r| {
        let outcome = s.plan_and_apply(r, false, flags, &note, |r, planned| {
            r.execute_slot(&mut app, planned, Some(s.pilot()), &engine_version)
        })?;
        let Outcome::Applied(applied) = outcome else {
            return Ok(outcome);
        };
        s.say(
            Tone::Plain,
            &format!("Apply TimeStamp: {}", applied.finished.to_rfc3339()),
        );
        Ok(Outcome::Applied(applied.succeeded()?))
    })
}

pub fn deploy_destroy(
    s: &Session,
    sel: &SlotSelector,
    path: Option<&Path>,
    flags: &ReleaseFlags,
) -> Result<Outcome> {
    let Some(mut app) = s.begin_application(flags.yes)? else {
        return Ok(Outcome::Declined);
    };
    release::check_writable(&app)?;
    let slot_id = current_slot(s, sel, &app)?;
    match (&sel.slot_prefix, sel.previous) {
        (Some(prefix), true) => {
            let last = slot_name(prefix, counter_of(s, prefix, &app)?);
            s.say(
                Tone::Danger,
                &format!("Last slot ID is {last}, preparing destruction of {slot_id}"),
            );
        }
        (Some(_), false) => s.say(
            Tone::Danger,
            &format!("Preparing destruction of slot ID {slot_id}"),
        ),
        (None, _) => {}
    }
    let root = s.slot_root(path, &slot_id)?;
    let engine_version = s.engine_version()?;

    let slot = s.store.get_slot(&s.app, &slot_id)?;
    let mut variables = slot
        .last_terraform_run
        .map(|run| run.variables)
        .unwrap_or_default();
    variables.extend(flags.variables.clone());

    let note = format!(
        "It looks like you want to DESTROY SLOT {slot_id} of '{}' ({}/{}).",
        s.app,
        s.namespace(),
        s.env
    );
    let spec = s.release_spec(Layer::Slot(slot_id.clone()), root, variables, flags);
    s.with_release(spec, |r| {
        let outcome = s.plan_and_apply(r, true, flags, &note, |r, planned| {
            r.execute_slot(&mut app, planned, Some(s.pilot()), &engine_version)
        })?;
        let Outcome::Applied(applied) = outcome else {
            return Ok(outcome);
        };
        if applied.exit_code != 0 {
            let message = if applied.state_empty {
                "Slot was successfully destroyed. Terraform encountered some errors."
            } else {
                "Slot could not be destroyed because Terraform encountered some errors."
            };
            s.say(Tone::Emphasis, message);
        }
        Ok(Outcome::Applied(applied.succeeded()?))
    })
}

/// Plan a deployment without applying it. A prefix previews the slot the
/// next deploy would create.
pub fn diff_deploy(
    s: &Session,
    sel: &SlotSelector,
    path: Option<&Path>,
    flags: &ReleaseFlags,
) -> Result<PlanResourceDiff> {
    let app = s.existing_application()?;
    release::check_writable(&app)?;
    let slot_id = match selected(s, sel)? {
        Selected::Id(id) => id.to_string(),
        Selected::Prefix(prefix) => slot_name(prefix, counter_of(s, prefix, &app)? + 1),
    };
    validate::slot_id("slot-id", &slot_id)?;
    let root = s.slot_root(path, &slot_id)?;
    let spec = s.release_spec(Layer::Slot(slot_id), root, flags.variables.clone(), flags);
    s.with_release(spec, |r| Ok(r.plan(false)?.diff))
}

/// Mark a resource of a deployed slot for recreation, or clear the mark.
pub fn mark_deployed_resource(
    s: &Session,
    mark: Mark,
    slot_id: Option<&str>,
    path: Option<&Path>,
    resource: &str,
    module: Option<&str>,
) -> Result<String> {
    let slot_id = slot_id.filter(|id| !id.is_empty()).ok_or_else(|| {
        RtError::Usage(format!(
            "'slot-id' is required parameter for {:?} (migrated app)",
            s.app
        ))
    })?;
    let root = s.slot_root(path, slot_id)?;
    if resource.is_empty() {
        return Err(RtError::Usage(format!(
            "You need to supply a resource to {}",
            mark.verb()
        )));
    }
    let app = s.existing_application()?;
    release::check_writable(&app)?;
    let remote = s.remote_state()?.for_slot(s.namespace(), &s.app, slot_id)?;

    let result = (|| -> Result<String> {
        s.driver.reenable_remote_state(&remote, &root)?;
        let module_part = module
            .filter(|m| !m.is_empty())
            .map(|m| format!(" in module {m}"))
            .unwrap_or_default();
        s.say(
            Tone::Plain,
            &format!(
                "{} resource {resource}{module_part} for application {} (slot {slot_id}) in {}/{}.",
                mark.progressive(),
                s.app,
                s.namespace(),
                s.env
            ),
        );
        let out = match mark {
            Mark::Taint => s.driver.taint(&root, resource, module)?,
            Mark::Untaint => s.driver.untaint(&root, resource, module)?,
        };
        Ok(out.stdout)
    })();
    let cleaned = crate::io::remove_paths(&[
        paths::backend_config_path(&root),
        paths::engine_cache_dir(&root),
    ]);
    let stdout = result?;
    cleaned?;
    Ok(stdout)
}

/// Outputs of one slot's state.
pub fn slot_output(
    s: &Session,
    slot_id: Option<&str>,
    path: Option<&Path>,
    name: Option<&str>,
) -> Result<String> {
    let slot_id = slot_id.filter(|id| !id.is_empty()).ok_or_else(|| {
        RtError::Usage(format!(
            "Please provide a slot-id for {:?} in environment {:?}",
            s.app, s.env
        ))
    })?;
    let app = s.existing_application()?;
    release::check_writable(&app)?;
    let root = s.slot_root(path, slot_id)?;
    s.store.get_slot(&s.app, slot_id)?;

    let remote = s.remote_state()?.for_slot(s.namespace(), &s.app, slot_id)?;
    let result = s.driver.fresh_output(&remote, &root);
    let cleaned = crate::io::remove_paths(&[
        paths::backend_config_path(&root),
        paths::engine_cache_dir(&root),
    ]);
    let outputs = result?;
    cleaned?;
    output_message(&s.app, &s.env, Some(slot_id), name, &outputs)
}

/// Why a slot survived `cleanup-slots`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kept {
    InFlight,
    Active,
    Recent(Duration),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub deleted: Vec<String>,
    pub kept: Vec<(String, Kept)>,
}

/// Delete records of inactive slots whose last deployment started more than
/// `older_than` before `now`. In-flight and active slots are never touched.
pub fn cleanup_slots(s: &Session, older_than: Duration, now: DateTime<Utc>) -> Result<CleanupReport> {
    s.existing_application()?;
    let borderline = now
        .checked_sub_signed(older_than)
        .ok_or_else(|| RtError::InvalidFlag {
            flag: "older-than".into(),
            reason: format!(
                "{} days reaches before the earliest representable time",
                older_than.num_days()
            ),
        })?;
    let mut report = CleanupReport::default();
    for slot in s.store.list_slots(&s.app)? {
        if slot.is_in_flight() {
            report.kept.push((slot.slot_id, Kept::InFlight));
            continue;
        }
        if slot.is_active {
            report.kept.push((slot.slot_id, Kept::Active));
            continue;
        }
        let started = slot.last_deployment_start_time.unwrap_or(DateTime::<Utc>::MIN_UTC);
        if started >= borderline {
            report.kept.push((slot.slot_id, Kept::Recent(now - started)));
            continue;
        }
        s.store.delete_slot(&s.app, &slot.slot_id)?;
        tracing::info!(slot = %slot.slot_id, "deleted slot record");
        report.deleted.push(slot.slot_id);
    }
    Ok(report)
}
