use crate::error::{Result, RtError};
use crate::io::atomic_write;
use crate::paths;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Where Terraform keeps its own state: a backend type and its settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteState {
    pub backend: String,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

impl RemoteState {
    /// State of the application's infrastructure layer.
    pub fn for_app(&self, namespace: &str, app: &str) -> Result<RemoteState> {
        self.with_key(format!("{namespace}/{app}/terraform.tfstate"), "app")
    }

    /// State of one slot of the application.
    pub fn for_slot(&self, namespace: &str, app: &str, slot_id: &str) -> Result<RemoteState> {
        self.with_key(format!("{namespace}/{app}/slots/{slot_id}.tfstate"), "slot")
    }

    fn with_key(&self, key: String, what: &str) -> Result<RemoteState> {
        if self.backend != "s3" {
            return Err(RtError::Config(format!(
                "Unable to construct {what} remote state cfg for {:?} backend",
                self.backend
            )));
        }
        let mut rs = self.clone();
        rs.config.insert("key".into(), key);
        Ok(rs)
    }

    pub fn key(&self) -> Option<&str> {
        self.config.get("key").map(String::as_str)
    }

    /// `{"terraform":[{"backend":[{"<type>":[{..config}]}]}]}`
    pub fn backend_config_json(&self) -> Value {
        json!({
            "terraform": [{
                "backend": [{
                    self.backend.clone(): [self.config]
                }]
            }]
        })
    }

    /// Write `backend-config.tf.json` into `root` and return its path.
    pub fn write_backend_config(&self, root: &Path) -> Result<PathBuf> {
        let path = paths::backend_config_path(root);
        let body = serde_json::to_vec(&self.backend_config_json())?;
        atomic_write(&path, &body)?;
        tracing::debug!(path = %path.display(), "wrote backend config");
        Ok(path)
    }
}
