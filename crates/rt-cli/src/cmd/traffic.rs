use super::SlotArgs;
use crate::context::{self, Needs, Settings};
use crate::output::{print_json, time};
use colored::Colorize;
use rt_core::commands::traffic;
use rt_core::traffic::{GroupTraffic, SlotTraffic};

const CLOUD: Needs = Needs {
    remote_state: false,
    cloud: true,
    writes: false,
};

pub fn enable(settings: &Settings, slot: &SlotArgs) -> anyhow::Result<()> {
    let session = context::open(settings, CLOUD)?;
    traffic::enable_traffic(&session, &slot.to_selector())?;
    Ok(())
}

pub fn disable(settings: &Settings, slot: &SlotArgs) -> anyhow::Result<()> {
    let session = context::open(settings, CLOUD)?;
    traffic::disable_traffic(&session, &slot.to_selector())?;
    Ok(())
}

pub fn show(settings: &Settings) -> anyhow::Result<()> {
    let session = context::open(settings, CLOUD)?;
    let report = traffic::show_traffic(&session)?;
    if settings.json {
        return print_json(&report);
    }
    if report.is_empty() {
        println!("No active slots found.");
        return Ok(());
    }
    for slot in &report {
        println!("{}", render_slot(slot));
    }
    Ok(())
}

fn render_group(group: &GroupTraffic, out: &mut Vec<String>) {
    out.push(format!("  Scaling group {}", group.name));
    if group.balancers.is_empty() {
        out.push("    (no load balancers attached)".to_string());
    }
    for b in &group.balancers {
        out.push(format!("    ELB {} ({})", b.name.bold(), b.state));
        for i in &b.instances {
            let state = if i.state == "InService" {
                i.state.green()
            } else {
                i.state.yellow()
            };
            let mut line = format!("      {} {state}", i.instance_id);
            if let Some(ip) = &i.ip {
                line.push_str(&format!(" {ip}"));
            }
            if !i.this_version {
                line.push_str(" (other slot)");
            }
            out.push(line);
        }
    }
}

fn render_slot(slot: &SlotTraffic) -> String {
    let mut out = vec![format!(
        "Slot {} (deployed {})",
        slot.slot_id.bold(),
        time(slot.finish_time)
    )];
    for (k, v) in &slot.variables {
        out.push(format!("  {k} = {v}"));
    }
    match &slot.group {
        Some(group) => render_group(group, &mut out),
        None => out.push("  (no scaling group)".to_string()),
    }
    out.join("\n")
}
