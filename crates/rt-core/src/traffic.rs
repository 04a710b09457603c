//! Traffic shifting: attach and detach an application's load balancers to and
//! from the scaling group of one slot.
//!
//! The cloud is reached through [`Cloud`], a thin set of queries and
//! mutations; [`TrafficController`] adds the naming conventions and safety
//! checks on top.

use crate::error::{Result, RtError};
use crate::schema::{ApplicationData, SlotData};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Infra output naming the application as it appears in resource names.
pub const APP_OUTPUT: &str = "app";

/// Tag-description requests accept at most this many balancer names.
pub const TAG_BATCH_SIZE: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Balancer {
    pub name: String,
    /// `Adding`, `Added`, `InService` or `Removing`.
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceHealth {
    pub instance_id: String,
    /// `InService`, `OutOfService` or `Unknown`.
    pub state: String,
}

/// Instances launched together; `(instance id, private ip)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reservation {
    pub instances: Vec<(String, String)>,
}

pub trait Cloud {
    fn region(&self) -> &str;

    /// Scaling groups carrying tag `key=value`.
    fn scaling_group_ids_by_tag(&self, key: &str, value: &str) -> Result<Vec<String>>;

    fn scaling_group_instance_ids(&self, group: &str) -> Result<Vec<String>>;

    fn scaling_group_balancers(&self, group: &str) -> Result<Vec<Balancer>>;

    fn load_balancer_names(&self) -> Result<Vec<String>>;

    /// Tags of up to [`TAG_BATCH_SIZE`] balancers.
    fn load_balancer_tags(&self, names: &[String]) -> Result<Vec<(String, BTreeMap<String, String>)>>;

    fn instance_health(&self, balancer: &str) -> Result<Vec<InstanceHealth>>;

    fn attach_load_balancers(&self, group: &str, balancers: &[String]) -> Result<()>;

    fn detach_load_balancers(&self, group: &str, balancers: &[String]) -> Result<()>;

    fn describe_instances(&self, instance_ids: &[String]) -> Result<Vec<Reservation>>;
}

/// The `app` infra output of `app`, which names cloud resources.
pub fn internal_app_name(app: &ApplicationData) -> Result<String> {
    if app.infra_outputs.is_empty() {
        return Err(RtError::Traffic(format!(
            "No infra outputs found for {:?}",
            app.name
        )));
    }
    app.infra_outputs
        .get(APP_OUTPUT)
        .cloned()
        .ok_or_else(|| RtError::Traffic(format!("Output {APP_OUTPUT:?} not found")))
}

/// `Name` tag of the instances of one slot.
pub fn slot_instance_name(env: &str, app: &str, slot_id: &str) -> String {
    format!("{env}-{app}-v{slot_id}-vinst")
}

pub struct TrafficController<'a> {
    cloud: &'a dyn Cloud,
    env: String,
    app: String,
}

impl<'a> TrafficController<'a> {
    /// `app` is the internal name from the `app` infra output.
    pub fn new(cloud: &'a dyn Cloud, env: &str, app: &str) -> Self {
        TrafficController {
            cloud,
            env: env.to_string(),
            app: app.to_string(),
        }
    }

    pub fn region(&self) -> &str {
        self.cloud.region()
    }

    pub fn scaling_group_for_slot(&self, slot_id: &str) -> Result<Option<String>> {
        tracing::debug!(app = %self.app, slot_id, "discovering scaling group");
        let name = slot_instance_name(&self.env, &self.app, slot_id);
        let mut groups = self.cloud.scaling_group_ids_by_tag("Name", &name)?;
        match groups.len() {
            0 => Ok(None),
            1 => Ok(groups.pop()),
            _ => Err(RtError::Traffic(format!(
                "More than one ASG for slot {slot_id}"
            ))),
        }
    }

    /// Every balancer tagged `App=<app>`.
    pub fn balancers_for_app(&self) -> Result<Vec<String>> {
        tracing::debug!(app = %self.app, "discovering load balancers");
        let all = self.cloud.load_balancer_names()?;
        let mut found = Vec::new();
        for batch in all.chunks(TAG_BATCH_SIZE) {
            for (name, tags) in self.cloud.load_balancer_tags(batch)? {
                if tags.get("App").is_some_and(|v| *v == self.app) {
                    found.push(name);
                }
            }
        }
        tracing::debug!(app = %self.app, ?found, "found load balancers");
        Ok(found)
    }

    pub fn balancers_for_scaling_group(&self, group: &str) -> Result<Vec<Balancer>> {
        self.cloud.scaling_group_balancers(group)
    }

    pub fn instance_health(&self, balancer: &str) -> Result<Vec<InstanceHealth>> {
        self.cloud.instance_health(balancer)
    }

    pub fn attach(&self, group: &str, balancers: &[String]) -> Result<()> {
        self.cloud.attach_load_balancers(group, balancers)
    }

    pub fn detach(&self, group: &str, balancers: &[String]) -> Result<()> {
        match self.cloud.detach_load_balancers(group, balancers) {
            Err(RtError::Cloud { code, message })
                if code == "ValidationError"
                    && message.contains(
                        "Trying to remove Load Balancers that are not part of the group",
                    ) =>
            {
                Err(RtError::BalancersNotAttached(group.to_string()))
            }
            other => other,
        }
    }

    /// Private address per instance id. Every reservation must hold exactly
    /// one instance.
    pub fn private_ips(&self, instance_ids: &[String]) -> Result<BTreeMap<String, String>> {
        let mut out = BTreeMap::new();
        // An unfiltered DescribeInstances covers the whole account.
        if instance_ids.is_empty() {
            return Ok(out);
        }
        for r in self.cloud.describe_instances(instance_ids)? {
            if r.instances.len() != 1 {
                return Err(RtError::Traffic(format!(
                    "Expected exactly 1 instance, {} given",
                    r.instances.len()
                )));
            }
            let (id, ip) = r.instances[0].clone();
            out.insert(id, ip);
        }
        Ok(out)
    }

    /// Refuse to take `slot_id` out of service unless another active,
    /// finished slot still has balancers attached.
    pub fn ensure_other_slot_serves_traffic(&self, slot_id: &str, slots: &[SlotData]) -> Result<()> {
        for s in slots {
            if !s.is_active || s.slot_id == slot_id || s.is_in_flight() {
                continue;
            }
            let Some(group) = self.scaling_group_for_slot(&s.slot_id)? else {
                continue;
            };
            if !self.balancers_for_scaling_group(&group)?.is_empty() {
                tracing::debug!(other = %s.slot_id, %group, "another slot serves traffic");
                return Ok(());
            }
        }
        Err(RtError::OnlyTrafficSlot(slot_id.to_string()))
    }

    /// What every active, finished slot looks like from the load balancers'
    /// point of view.
    pub fn show(&self, slots: &[SlotData]) -> Result<Vec<SlotTraffic>> {
        let mut out = Vec::new();
        for s in slots {
            let Some(run) = s.last_terraform_run.as_ref().filter(|_| s.is_active) else {
                continue;
            };
            let group = match self.scaling_group_for_slot(&s.slot_id)? {
                Some(name) => Some(self.group_traffic(name)?),
                None => None,
            };
            out.push(SlotTraffic {
                slot_id: s.slot_id.clone(),
                finish_time: run.finish_time,
                variables: run.variables.clone(),
                group,
            });
        }
        Ok(out)
    }

    fn group_traffic(&self, name: String) -> Result<GroupTraffic> {
        let balancers = self.balancers_for_scaling_group(&name)?;
        let own = self.cloud.scaling_group_instance_ids(&name)?;
        let ips = self.private_ips(&own).unwrap_or_else(|e| {
            tracing::error!(instances = ?own, "unable to get private IPs: {e}");
            BTreeMap::new()
        });
        let mut out = Vec::with_capacity(balancers.len());
        for b in balancers {
            let instances = self
                .instance_health(&b.name)?
                .into_iter()
                .map(|h| {
                    let this_version = own.contains(&h.instance_id);
                    InstanceTraffic {
                        ip: ips.get(&h.instance_id).filter(|_| this_version).cloned(),
                        instance_id: h.instance_id,
                        state: h.state,
                        this_version,
                    }
                })
                .collect();
            out.push(BalancerTraffic {
                name: b.name,
                state: b.state,
                instances,
            });
        }
        Ok(GroupTraffic {
            name,
            balancers: out,
        })
    }
}

// ---------------------------------------------------------------------------
// Show-traffic report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotTraffic {
    pub slot_id: String,
    pub finish_time: Option<DateTime<Utc>>,
    pub variables: BTreeMap<String, String>,
    /// `None` when the slot has no scaling group.
    pub group: Option<GroupTraffic>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupTraffic {
    pub name: String,
    pub balancers: Vec<BalancerTraffic>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalancerTraffic {
    pub name: String,
    pub state: String,
    pub instances: Vec<InstanceTraffic>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceTraffic {
    pub instance_id: String,
    pub state: String,
    /// Launched by this slot's scaling group.
    pub this_version: bool,
    pub ip: Option<String>,
}
