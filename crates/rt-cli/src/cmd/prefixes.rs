use crate::context::{self, Needs, Settings};
use crate::output::{print_json, print_table};
use rt_core::commands::prefixes;
use rt_core::validate;
use serde::Serialize;

const WRITE: Needs = Needs {
    remote_state: false,
    cloud: false,
    writes: true,
};

#[derive(Serialize)]
struct Prefix {
    prefix: String,
    last_slot_id: u64,
}

pub fn list(settings: &Settings) -> anyhow::Result<()> {
    let session = context::open(settings, Needs::default())?;
    let counters = prefixes::list_slot_prefixes(&session)?;
    if settings.json {
        let out: Vec<Prefix> = counters
            .into_iter()
            .map(|(prefix, last_slot_id)| Prefix {
                prefix,
                last_slot_id,
            })
            .collect();
        return print_json(&out);
    }
    let rows = counters
        .into_iter()
        .map(|(prefix, counter)| vec![prefix, counter.to_string()])
        .collect();
    print_table(&["PREFIX", "LAST SLOT"], rows);
    Ok(())
}

pub fn add(settings: &Settings, prefix: &str, yes: bool) -> anyhow::Result<()> {
    validate::non_empty("slot-prefix", prefix)?;
    validate::slot_id("slot-prefix", prefix)?;
    let session = context::open(settings, WRITE)?;
    if !prefixes::add_slot_prefix(&session, prefix, yes)? {
        println!("OK, bailing out.");
    }
    Ok(())
}

pub fn delete(settings: &Settings, prefix: &str, yes: bool) -> anyhow::Result<()> {
    validate::non_empty("slot-prefix", prefix)?;
    validate::slot_id("slot-prefix", prefix)?;
    let session = context::open(settings, WRITE)?;
    if !prefixes::delete_slot_prefix(&session, prefix, yes)? {
        println!("OK, bailing out.");
    }
    Ok(())
}
