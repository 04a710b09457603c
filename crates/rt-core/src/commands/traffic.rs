//! Moving traffic between slots by attaching the application's load
//! balancers to a slot's scaling group.

use super::slots::current_slot;
use super::{Session, SlotSelector};
use crate::error::{Result, RtError};
use crate::prompt::Tone;
use crate::schema::ApplicationData;
use crate::traffic::{internal_app_name, SlotTraffic, TrafficController};

struct Target<'a> {
    tc: TrafficController<'a>,
    app: ApplicationData,
    internal: String,
}

fn target(s: &Session) -> Result<Target<'_>> {
    let app = s.existing_application()?;
    let internal = internal_app_name(&app)?;
    let tc = TrafficController::new(s.cloud()?, &s.env, &internal);
    s.say(
        Tone::Plain,
        &format!("Operating on resources in AWS region {}", tc.region()),
    );
    Ok(Target { tc, app, internal })
}

fn traffic_slot(s: &Session, sel: &SlotSelector, app: &ApplicationData, verb: &str) -> Result<String> {
    let slot_id = current_slot(s, sel, app)?;
    if sel.slot_prefix.is_some() {
        s.say(
            Tone::Plain,
            &format!("{verb} traffic for last slot ({slot_id})"),
        );
    }
    s.store.get_slot(&s.app, &slot_id)?;
    Ok(slot_id)
}

fn scaling_group(t: &Target<'_>, slot_id: &str) -> Result<String> {
    t.tc
        .scaling_group_for_slot(slot_id)?
        .ok_or_else(|| RtError::Traffic(format!("Slot {slot_id} has no scaling group")))
}

fn app_balancers(t: &Target<'_>) -> Result<Vec<String>> {
    let balancers = t.tc.balancers_for_app()?;
    if balancers.is_empty() {
        return Err(RtError::Traffic(format!(
            "No Load Balancer found for {}",
            t.internal
        )));
    }
    Ok(balancers)
}

pub fn enable_traffic(s: &Session, sel: &SlotSelector) -> Result<()> {
    let t = target(s)?;
    let slot_id = traffic_slot(s, sel, &t.app, "Enabling")?;
    let group = scaling_group(&t, &slot_id)?;
    let balancers = app_balancers(&t)?;

    for b in &balancers {
        let attached = t.tc.instance_health(b)?.len();
        if attached > 0 {
            s.say(
                Tone::Plain,
                &format!("(ELB {b} already has {attached} instances attached)"),
            );
        }
    }
    t.tc.attach(&group, &balancers)?;
    tracing::info!(slot = %slot_id, %group, ?balancers, "balancers attached");
    s.say(
        Tone::Success,
        &format!("Load Balancers attached to scaling group {group}"),
    );
    Ok(())
}

/// Detach the balancers from a slot, unless it is the last slot serving.
pub fn disable_traffic(s: &Session, sel: &SlotSelector) -> Result<()> {
    let t = target(s)?;
    let slot_id = traffic_slot(s, sel, &t.app, "Disabling")?;
    let slots = s.store.list_slots(&s.app)?;
    t.tc.ensure_other_slot_serves_traffic(&slot_id, &slots)?;

    let group = scaling_group(&t, &slot_id)?;
    let balancers = app_balancers(&t)?;
    t.tc.detach(&group, &balancers)?;
    tracing::info!(slot = %slot_id, %group, ?balancers, "balancers detached");
    s.say(
        Tone::Success,
        &format!("Load Balancers have begun detaching from scaling group {group}"),
    );
    Ok(())
}

pub fn show_traffic(s: &Session) -> Result<Vec<SlotTraffic>> {
    let t = target(s)?;
    let mut slots = s.store.list_slots(&s.app)?;
    slots.sort_by(|a, b| a.slot_id.cmp(&b.slot_id));
    t.tc.show(&slots)
}
