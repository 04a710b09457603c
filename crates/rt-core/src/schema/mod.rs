//! Persisted record kinds of the deployment state.
//!
//! Every record carries a schema version `v`. Reading goes through
//! [`migrations::upgrade`], which walks older documents forward to the current
//! version and refuses documents written by a newer rt. Names and ids are
//! keys in the backend, never part of the payload; backends inject them after
//! decoding.

pub mod migrations;

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const APPLICATION_SCHEMA_VERSION: u64 = 1;
pub const SLOT_SCHEMA_VERSION: u64 = 1;
pub const DEPLOYMENT_SCHEMA_VERSION: u64 = 1;

/// Version of this tool, recorded on applications and deployments.
pub const RT_VERSION: &str = env!("CARGO_PKG_VERSION");

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationData {
    #[serde(rename = "v", default)]
    pub schema_version: u64,
    #[serde(skip)]
    pub name: String,
    #[serde(default)]
    pub use_central_git_repo: bool,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default, deserialize_with = "nullable_map")]
    pub infra_outputs: BTreeMap<String, String>,
    #[serde(default)]
    pub last_rt_version: String,
    #[serde(default)]
    pub last_terraform_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_deployment_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_infra_change_time: Option<DateTime<Utc>>,
    #[serde(
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        deserialize_with = "nullable_map"
    )]
    pub slot_counters: BTreeMap<String, u64>,
}

impl ApplicationData {
    /// A record for an application created by this version of rt.
    pub fn new(name: &str, terraform_version: &str) -> Self {
        ApplicationData {
            schema_version: APPLICATION_SCHEMA_VERSION,
            name: name.to_string(),
            is_active: true,
            last_rt_version: RT_VERSION.to_string(),
            last_terraform_version: terraform_version.to_string(),
            ..Default::default()
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        let mut out = self.clone();
        out.schema_version = APPLICATION_SCHEMA_VERSION;
        Ok(serde_json::to_vec(&out)?)
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        let value = migrations::upgrade(migrations::RecordKind::Application, data)?;
        Ok(serde_json::from_value(value)?)
    }
}

// ---------------------------------------------------------------------------
// Slot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlotData {
    #[serde(rename = "v", default)]
    pub schema_version: u64,
    #[serde(skip)]
    pub slot_id: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub last_deployment_start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_deploy_pilot: Option<DeployPilot>,
    #[serde(default)]
    pub last_terraform_run: Option<TerraformRun>,
}

impl SlotData {
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let mut out = self.clone();
        out.schema_version = SLOT_SCHEMA_VERSION;
        Ok(serde_json::to_vec(&out)?)
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        let value = migrations::upgrade(migrations::RecordKind::Slot, data)?;
        Ok(serde_json::from_value(value)?)
    }

    /// A slot whose deployment began but never finished.
    pub fn is_in_flight(&self) -> bool {
        self.last_terraform_run.is_none()
    }
}

// ---------------------------------------------------------------------------
// Deployment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentData {
    #[serde(rename = "v", default)]
    pub schema_version: u64,
    #[serde(skip)]
    pub deployment_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_pilot: Option<DeployPilot>,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terraform: Option<TerraformRun>,
    #[serde(default)]
    pub rt_version: String,
}

impl DeploymentData {
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let mut out = self.clone();
        out.schema_version = DEPLOYMENT_SCHEMA_VERSION;
        Ok(serde_json::to_vec(&out)?)
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        let value = migrations::upgrade(migrations::RecordKind::Deployment, data)?;
        Ok(serde_json::from_value(value)?)
    }
}

// ---------------------------------------------------------------------------
// Shared pieces
// ---------------------------------------------------------------------------

/// Who ran a deployment: the cloud principal and where they called from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployPilot {
    /// IAM/STS ARN of the caller.
    pub aws_api_caller: String,
    pub ip_address: String,
}

/// Resources touched by one apply or destroy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDiff {
    #[serde(rename = "Created")]
    pub created: u64,
    #[serde(rename = "Removed")]
    pub removed: u64,
    #[serde(rename = "Changed")]
    pub changed: u64,
}

/// One engine run against an infrastructure or slot root.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TerraformRun {
    #[serde(default)]
    pub plan_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub plan_finish_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finish_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_destroy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_diff: Option<ResourceDiff>,
    #[serde(default, deserialize_with = "nullable_map")]
    pub variables: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "nullable_map")]
    pub outputs: BTreeMap<String, String>,
    #[serde(default)]
    pub terraform_version: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub exit_code: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stderr: String,
}

/// Result of a finished engine run, folded into a [`DeploymentData`] by
/// `finish_deployment`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinishedTerraformRun {
    pub plan_start_time: DateTime<Utc>,
    pub plan_finish_time: DateTime<Utc>,
    pub start_time: DateTime<Utc>,
    pub finish_time: DateTime<Utc>,
    pub resource_diff: ResourceDiff,
    pub outputs: BTreeMap<String, String>,
    pub exit_code: i32,
    pub warnings: Vec<String>,
    pub stderr: String,
}

fn is_zero(v: &i32) -> bool {
    *v == 0
}

/// Older writers emitted `null` for empty maps.
fn nullable_map<'de, D, V>(deserializer: D) -> std::result::Result<BTreeMap<String, V>, D::Error>
where
    D: serde::Deserializer<'de>,
    V: Deserialize<'de>,
{
    Ok(Option::<BTreeMap<String, V>>::deserialize(deserializer)?.unwrap_or_default())
}
