//! Commands on an application's infrastructure layer, configured in the
//! working directory itself.

use super::{output_message, Outcome, ReleaseFlags, Session};
use crate::error::{Result, RtError};
use crate::paths;
use crate::prompt::Tone;
use crate::release::{self, Layer};
use crate::template;
use crate::terraform::{CmdOutput, PlanResourceDiff};
use std::collections::BTreeMap;
use std::path::Path;

/// `taint` or `untaint`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    Taint,
    Untaint,
}

impl Mark {
    pub fn verb(self) -> &'static str {
        match self {
            Mark::Taint => "taint",
            Mark::Untaint => "untaint",
        }
    }

    pub(crate) fn progressive(self) -> &'static str {
        match self {
            Mark::Taint => "Tainting",
            Mark::Untaint => "Untainting",
        }
    }
}

pub fn apply_infra(s: &Session, flags: &ReleaseFlags) -> Result<Outcome> {
    let Some(mut app) = s.begin_application(flags.yes)? else {
        return Ok(Outcome::Declined);
    };
    release::check_writable(&app)?;
    let engine_version = s.engine_version()?;

    let note = format!(
        "It looks like you want to change infrastructure of '{}' in {}/{}.",
        s.app,
        s.namespace(),
        s.env
    );
    let spec = s.release_spec(Layer::Infra, s.cwd.clone(), flags.variables.clone(), flags);
    s.with_release(spec, |r| {
        let outcome = s.plan_and_apply(r, false, flags, &note, |r, planned| {
            r.execute_infra(&mut app, planned, &engine_version)
        })?;
        if let Outcome::Applied(applied) = outcome {
            tracing::debug!(is_active = !applied.state_empty, "infra applied");
            return Ok(Outcome::Applied(applied.succeeded()?));
        }
        Ok(outcome)
    })
}

/// Refuses while any slot of the app is still active, before touching the
/// engine.
pub fn destroy_infra(s: &Session, flags: &ReleaseFlags) -> Result<Outcome> {
    let Some(mut app) = s.begin_application(flags.yes)? else {
        return Ok(Outcome::Declined);
    };
    release::check_writable(&app)?;

    let active: Vec<String> = s
        .store
        .list_slots(&s.app)?
        .into_iter()
        .filter(|slot| slot.is_active)
        .map(|slot| slot.slot_id)
        .collect();
    if !active.is_empty() {
        return Err(RtError::ActiveSlots {
            app: s.app.clone(),
            env: s.env.clone(),
            slots: active,
        });
    }
    let engine_version = s.engine_version()?;

    let note = format!(
        "It looks like you want to DESTROY INFRASTRUCTURE of '{}' ({}/{}).",
        s.app,
        s.namespace(),
        s.env
    );
    let spec = s.release_spec(Layer::Infra, s.cwd.clone(), flags.variables.clone(), flags);
    s.with_release(spec, |r| {
        let outcome = s.plan_and_apply(r, true, flags, &note, |r, planned| {
            r.execute_infra(&mut app, planned, &engine_version)
        })?;
        if let Outcome::Applied(applied) = outcome {
            return Ok(Outcome::Applied(applied.succeeded()?));
        }
        Ok(outcome)
    })
}

/// Plan only.
pub fn diff_infra(s: &Session, flags: &ReleaseFlags) -> Result<PlanResourceDiff> {
    let app = s.existing_application()?;
    release::check_writable(&app)?;
    let spec = s.release_spec(Layer::Infra, s.cwd.clone(), flags.variables.clone(), flags);
    s.with_release(spec, |r| Ok(r.plan(false)?.diff))
}

fn validate_tree(s: &Session, root: &Path) -> Result<CmdOutput> {
    let vars = template::standard_vars(&s.app, &s.env, s.namespace());
    let rendered = template::process_templates(root, paths::TEMPLATE_SUFFIX, &vars)?;
    let result = s.driver.validate(root);
    let cleaned = crate::io::remove_paths(&rendered);
    let out = result?;
    cleaned?;
    Ok(out)
}

pub fn validate_infra(s: &Session) -> Result<()> {
    if !s.cwd.exists() {
        return Err(RtError::Usage(format!(
            "{:?} does not exist",
            s.cwd.display().to_string()
        )));
    }
    let app = s.existing_application()?;
    release::check_writable(&app)?;
    validate_tree(s, &s.cwd)?;
    s.say(
        Tone::Success,
        &format!(
            "\\(◕ヮ◕)/\nTerraform code for app '{}' in environment '{}' is valid.",
            s.app, s.env
        ),
    );
    Ok(())
}

/// Validate every visible subdirectory of the working directory.
pub fn validate_slots(s: &Session) -> Result<()> {
    if !s.cwd.exists() {
        return Err(RtError::Usage(format!(
            "{:?} does not exist",
            s.cwd.display().to_string()
        )));
    }
    if std::fs::read_dir(&s.cwd)?.next().is_none() {
        return Err(RtError::Usage(format!(
            "Current working directory {} is empty",
            s.cwd.display()
        )));
    }
    let app = s.existing_application()?;
    release::check_writable(&app)?;
    for dir in crate::io::visible_subdirs(&s.cwd)? {
        tracing::debug!(dir = %dir.display(), "validating slot config");
        validate_tree(s, &dir)?;
    }
    s.say(
        Tone::Success,
        &format!(
            "\\(◕ヮ◕)/\nTerraform code for app '{}' in environment '{}' is valid.",
            s.app, s.env
        ),
    );
    Ok(())
}

/// Mark an infrastructure resource for recreation, or clear the mark.
pub fn mark_infra_resource(
    s: &Session,
    mark: Mark,
    resource: &str,
    module: Option<&str>,
) -> Result<String> {
    if resource.is_empty() {
        return Err(RtError::Usage(format!(
            "You need to supply a resource to {}",
            mark.verb()
        )));
    }
    let app = s.existing_application()?;
    release::check_writable(&app)?;
    let remote = s.remote_state()?.for_app(s.namespace(), &s.app)?;

    let result = (|| -> Result<String> {
        s.driver.reenable_remote_state(&remote, &s.cwd)?;
        let module_part = module
            .filter(|m| !m.is_empty())
            .map(|m| format!(" in module {m}"))
            .unwrap_or_default();
        s.say(
            Tone::Plain,
            &format!(
                "{} infra resource {resource}{module_part} for application {} in {}/{}.",
                mark.progressive(),
                s.app,
                s.namespace(),
                s.env
            ),
        );
        let out = match mark {
            Mark::Taint => s.driver.taint(&s.cwd, resource, module)?,
            Mark::Untaint => s.driver.untaint(&s.cwd, resource, module)?,
        };
        Ok(out.stdout)
    })();
    let cleaned = crate::io::remove_paths(&[
        paths::backend_config_path(&s.cwd),
        paths::engine_cache_dir(&s.cwd),
    ]);
    let stdout = result?;
    cleaned?;
    Ok(stdout)
}

/// Outputs of the infrastructure state, all of them or just `name`.
pub fn output(s: &Session, name: Option<&str>) -> Result<String> {
    let app = s.existing_application()?;
    release::check_writable(&app)?;
    let outputs: BTreeMap<String, String> = {
        let vars = template::standard_vars(&s.app, &s.env, s.namespace());
        let remote = s.remote_state()?.for_app(s.namespace(), &s.app)?;
        let mut cleanup = template::process_templates(&s.cwd, paths::TEMPLATE_SUFFIX, &vars)?;
        cleanup.push(paths::backend_config_path(&s.cwd));
        cleanup.push(paths::engine_cache_dir(&s.cwd));
        let result = s.driver.fresh_output(&remote, &s.cwd);
        let cleaned = crate::io::remove_paths(&cleanup);
        let outputs = result?;
        cleaned?;
        outputs
    };
    output_message(&s.app, &s.env, None, name, &outputs)
}
