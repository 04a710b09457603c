//! Storage backends for deployment state.
//!
//! A backend is any type implementing [`Backend`]. Implementations are looked
//! up by name in a process-wide registry and built from a [`BackendConfig`]
//! block of the project configuration.

pub mod local;
pub mod object;

use crate::error::{Result, RtError};
use crate::schema::{ApplicationData, DeploymentData, SlotData};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// One `deployment_state` block: backend name plus its string settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub backend: String,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

impl BackendConfig {
    pub fn required(&self, key: &str) -> Result<&str> {
        match self.config.get(key).map(String::as_str) {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(RtError::Config(format!(
                "backend {:?} requires {key:?} in its config",
                self.backend
            ))),
        }
    }

    pub fn optional(&self, key: &str) -> Option<&str> {
        self.config
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

pub trait Backend {
    /// Registry name, used in log lines and errors.
    fn name(&self) -> &str;

    fn is_ready(&self) -> Result<bool>;

    fn supports_write_lock(&self) -> bool;

    fn list_applications(&self) -> Result<Vec<ApplicationData>>;

    fn get_application(&self, app: &str) -> Result<ApplicationData>;

    fn save_application(&self, app: &str, data: &ApplicationData) -> Result<()>;

    fn list_slots(&self, app: &str) -> Result<Vec<SlotData>>;

    fn get_slot(&self, app: &str, slot_id: &str) -> Result<SlotData>;

    fn save_slot(&self, app: &str, slot_id: &str, data: &SlotData) -> Result<()>;

    fn delete_slot(&self, app: &str, slot_id: &str) -> Result<()>;

    /// Newest first. `limit == 0` returns every deployment of the slot.
    fn list_sorted_deployments_for_slot_id(
        &self,
        app: &str,
        slot_id: &str,
        limit: usize,
    ) -> Result<Vec<DeploymentData>>;

    fn get_deployment(&self, app: &str, slot_id: &str, deployment_id: &str)
        -> Result<DeploymentData>;

    fn save_deployment(
        &self,
        app: &str,
        slot_id: &str,
        deployment_id: &str,
        data: &DeploymentData,
    ) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

pub type Constructor = fn(&BackendConfig) -> Result<Box<dyn Backend>>;

/// Every backend this build knows, keyed by the name used in configuration.
pub fn registry() -> &'static BTreeMap<&'static str, Constructor> {
    static REGISTRY: OnceLock<BTreeMap<&'static str, Constructor>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut m: BTreeMap<&'static str, Constructor> = BTreeMap::new();
        m.insert("s3", crate::aws::s3::configure);
        m.insert("local", local::configure);
        m
    })
}

/// Build the backend named by `cfg.backend`.
pub fn configure(cfg: &BackendConfig) -> Result<Box<dyn Backend>> {
    let ctor = registry()
        .get(cfg.backend.as_str())
        .ok_or_else(|| RtError::BackendNotSupported(cfg.backend.clone()))?;
    tracing::debug!(backend = %cfg.backend, "configuring deployment state backend");
    ctor(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_backend_is_rejected() {
        let cfg = BackendConfig {
            backend: "consul".into(),
            config: BTreeMap::new(),
        };
        let err = configure(&cfg).err().unwrap();
        assert_eq!(err.to_string(), "Defined backend consul is not supported");
    }

    #[test]
    fn registry_lists_builtin_backends() {
        let names: Vec<_> = registry().keys().copied().collect();
        assert_eq!(names, vec!["local", "s3"]);
    }

    #[test]
    fn required_key_must_be_non_empty() {
        let mut cfg = BackendConfig {
            backend: "s3".into(),
            config: BTreeMap::new(),
        };
        cfg.config.insert("bucket".into(), String::new());
        assert!(cfg.required("bucket").is_err());
        cfg.config.insert("bucket".into(), "state".into());
        assert_eq!(cfg.required("bucket").unwrap(), "state");
    }
}
