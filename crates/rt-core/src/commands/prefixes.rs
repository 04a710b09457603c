//! Slot prefixes: named counters that mint slot ids (`stable` → `stable13`).

use super::Session;
use crate::error::{Result, RtError};
use crate::prompt::Tone;
use crate::schema::ApplicationData;

fn check_prefixes_allowed(s: &Session, app: &ApplicationData) -> Result<()> {
    if app.use_central_git_repo {
        return Err(RtError::Usage(format!(
            "You cannot use slot prefixes for {:?} as it comes from the central git repo",
            s.app
        )));
    }
    Ok(())
}

/// Counters of the application, sorted by prefix.
pub fn list_slot_prefixes(s: &Session) -> Result<Vec<(String, u64)>> {
    let app = s.existing_application()?;
    check_prefixes_allowed(s, &app)?;
    let counters: Vec<(String, u64)> = s
        .store
        .list_slot_counters(&app)
        .into_iter()
        .map(|(prefix, counter)| (prefix.to_string(), counter))
        .collect();
    if counters.is_empty() {
        return Err(RtError::Usage(format!(
            "No slot counters found for {:?} in {:?}",
            s.app, s.env
        )));
    }
    Ok(counters)
}

/// Start a new counter at zero. Returns false when the operator declined.
pub fn add_slot_prefix(s: &Session, prefix: &str, yes: bool) -> Result<bool> {
    let Some(app) = s.begin_application(yes)? else {
        return Ok(false);
    };
    check_prefixes_allowed(s, &app)?;
    let (_, exists) = s.store.get_slot_counter(prefix, &app);
    if exists {
        return Err(RtError::Usage(format!(
            "Slot prefix {prefix:?} already exists for {:?} / {:?},",
            s.app, s.env
        )));
    }

    let note = format!(
        "It looks like you want to create a new prefix {prefix:?} for {:?} in {:?}",
        s.app, s.env
    );
    if !s.confirm(&note, yes)? {
        return Ok(false);
    }
    let app = s.store.add_slot_counter(prefix, app)?;
    s.store.save_application(&s.app, &app)?;
    s.say(
        Tone::Success,
        &format!("Slot prefix {prefix:?} created for {:?} / {:?}.", s.app, s.env),
    );
    Ok(true)
}

/// Drop a counter. Slots it minted are left alone.
pub fn delete_slot_prefix(s: &Session, prefix: &str, yes: bool) -> Result<bool> {
    let app = s.existing_application()?;
    check_prefixes_allowed(s, &app)?;
    let (counter, exists) = s.store.get_slot_counter(prefix, &app);
    if !exists {
        return Err(RtError::SlotPrefixNotFound(prefix.to_string()));
    }

    let note = format!(
        "It looks like you want to delete prefix {prefix:?} (last slot {prefix}{counter}) for {:?} in {:?}",
        s.app, s.env
    );
    if !s.confirm(&note, yes)? {
        return Ok(false);
    }
    let app = s.store.delete_slot_counter(prefix, app)?;
    s.store.save_application(&s.app, &app)?;
    s.say(
        Tone::Success,
        &format!("Slot prefix {prefix:?} deleted for {:?} / {:?}.", s.app, s.env),
    );
    Ok(true)
}
