//! Read-only views over the deployment state.

use super::Session;
use crate::error::{Result, RtError};
use crate::schema::{DeployPilot, DeploymentData, SlotData};
use crate::store::DeploymentState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Infra outputs shown by `list-apps`.
pub const LISTED_OUTPUTS: &[&str] = &["app", "lb_fqdn"];

pub const DEFAULT_DEPLOYMENT_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppSummary {
    pub name: String,
    pub is_active: bool,
    pub last_deployment_time: Option<DateTime<Utc>>,
    pub outputs: BTreeMap<String, String>,
}

/// Every application in the store. Works without a session since
/// `list-apps` is not scoped to one application.
pub fn list_apps(store: &DeploymentState) -> Result<Vec<AppSummary>> {
    let mut apps: Vec<AppSummary> = store
        .list_applications()?
        .into_iter()
        .map(|app| AppSummary {
            outputs: app
                .infra_outputs
                .into_iter()
                .filter(|(k, _)| LISTED_OUTPUTS.contains(&k.as_str()))
                .collect(),
            name: app.name,
            is_active: app.is_active,
            last_deployment_time: app.last_deployment_time,
        })
        .collect();
    if apps.is_empty() {
        return Err(RtError::Usage("No applications found.".into()));
    }
    apps.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(apps)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SlotState {
    BeingDeployed,
    LastDeployed,
    Destroyed,
}

impl SlotState {
    pub fn of(slot: &SlotData) -> Self {
        if slot.is_in_flight() {
            SlotState::BeingDeployed
        } else if slot.is_active {
            SlotState::LastDeployed
        } else {
            SlotState::Destroyed
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SlotState::BeingDeployed => "being deployed",
            SlotState::LastDeployed => "last deployed",
            SlotState::Destroyed => "destroyed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotSummary {
    pub slot_id: String,
    pub state: SlotState,
    pub since: Option<DateTime<Utc>>,
    pub pilot: Option<DeployPilot>,
}

/// Slots of the session's application, most recently started first.
pub fn list_slots(s: &Session) -> Result<Vec<SlotSummary>> {
    s.existing_application()?;
    let mut slots: Vec<SlotSummary> = s
        .store
        .list_slots(&s.app)?
        .into_iter()
        .map(|slot| {
            let state = SlotState::of(&slot);
            let since = match state {
                SlotState::BeingDeployed => slot.last_deployment_start_time,
                _ => slot
                    .last_terraform_run
                    .as_ref()
                    .and_then(|run| run.finish_time)
                    .or(slot.last_deployment_start_time),
            };
            SlotSummary {
                slot_id: slot.slot_id,
                state,
                since,
                pilot: slot.last_deploy_pilot,
            }
        })
        .collect();
    slots.sort_by(|a, b| b.since.cmp(&a.since).then_with(|| a.slot_id.cmp(&b.slot_id)));
    Ok(slots)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotDeployments {
    pub slot_id: String,
    pub deployments: Vec<DeploymentData>,
}

/// The newest `limit` deployments of one slot, or of every slot.
pub fn list_deployments(
    s: &Session,
    slot_id: Option<&str>,
    limit: usize,
) -> Result<Vec<SlotDeployments>> {
    s.existing_application()?;
    let slot_ids = match slot_id.filter(|id| !id.is_empty()) {
        Some(id) => vec![s.store.get_slot(&s.app, id)?.slot_id],
        None => {
            let mut ids: Vec<String> = s
                .store
                .list_slots(&s.app)?
                .into_iter()
                .map(|slot| slot.slot_id)
                .collect();
            ids.sort();
            ids
        }
    };
    slot_ids
        .into_iter()
        .map(|slot_id| {
            let deployments = s
                .store
                .list_sorted_deployments_for_slot_id(&s.app, &slot_id, limit)?;
            Ok(SlotDeployments {
                slot_id,
                deployments,
            })
        })
        .collect()
}
