use super::Backend;
use crate::error::{Result, RtError};
use crate::schema::{ApplicationData, DeploymentData, SlotData};
use regex::Regex;

pub const CONTENT_TYPE: &str = "application/json";
pub const ACL: &str = "bucket-owner-read";

/// Flat key/value blob storage with lexicographic listing.
///
/// `get` answers `Ok(None)` for a missing key; every other failure is an error.
pub trait ObjectStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `body` as `application/json` with the `bucket-owner-read` ACL.
    fn put(&self, key: &str, body: &[u8]) -> Result<()>;

    fn delete(&self, key: &str) -> Result<()>;

    /// Keys starting with `prefix`, in lexicographic order.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// [`Backend`] over an [`ObjectStore`], laid out as
///
/// ```text
/// <prefix>/<app>/APPLICATION.json
/// <prefix>/<app>/SLOT-<slot>.json
/// <prefix>/<app>/DEPLOYMENT-<slot>-<deployment>.json
/// ```
pub struct ObjectStoreBackend<S> {
    name: &'static str,
    prefix: String,
    store: S,
}

impl<S: ObjectStore> ObjectStoreBackend<S> {
    pub fn new(name: &'static str, prefix: &str, store: S) -> Self {
        ObjectStoreBackend {
            name,
            prefix: prefix.trim_end_matches('/').to_string(),
            store,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn app_dir(&self, app: &str) -> String {
        if self.prefix.is_empty() {
            format!("{app}/")
        } else {
            format!("{}/{app}/", self.prefix)
        }
    }

    pub fn application_key(&self, app: &str) -> String {
        format!("{}APPLICATION.json", self.app_dir(app))
    }

    pub fn slot_key(&self, app: &str, slot_id: &str) -> String {
        format!("{}SLOT-{slot_id}.json", self.app_dir(app))
    }

    pub fn deployment_key(&self, app: &str, slot_id: &str, deployment_id: &str) -> String {
        format!("{}DEPLOYMENT-{slot_id}-{deployment_id}.json", self.app_dir(app))
    }

    fn application_name_re(&self) -> Result<Regex> {
        let prefix = if self.prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", regex::escape(&self.prefix))
        };
        Regex::new(&format!("^{prefix}([^/]+)/APPLICATION\\.json$"))
            .map_err(|e| RtError::Backend(e.to_string()))
    }
}

/// Deployment ids are fixed-width decimal strings.
fn is_deployment_id(s: &str) -> bool {
    s.len() == 20 && s.bytes().all(|b| b.is_ascii_digit())
}

impl<S: ObjectStore> Backend for ObjectStoreBackend<S> {
    fn name(&self) -> &str {
        self.name
    }

    fn is_ready(&self) -> Result<bool> {
        // Reading the prefix itself either finds nothing or proves access.
        self.store.get(&self.prefix)?;
        Ok(true)
    }

    fn supports_write_lock(&self) -> bool {
        false
    }

    fn list_applications(&self) -> Result<Vec<ApplicationData>> {
        let re = self.application_name_re()?;
        let list_prefix = if self.prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", self.prefix)
        };
        let mut apps = Vec::new();
        for key in self.store.list(&list_prefix)? {
            let Some(caps) = re.captures(&key) else {
                continue;
            };
            apps.push(self.get_application(&caps[1])?);
        }
        Ok(apps)
    }

    fn get_application(&self, app: &str) -> Result<ApplicationData> {
        let key = self.application_key(app);
        tracing::debug!(%key, "reading application");
        let body = self
            .store
            .get(&key)?
            .ok_or_else(|| RtError::AppNotFound(app.to_string()))?;
        let mut data = ApplicationData::from_json(&body)?;
        data.name = app.to_string();
        Ok(data)
    }

    fn save_application(&self, app: &str, data: &ApplicationData) -> Result<()> {
        let key = self.application_key(app);
        tracing::debug!(%key, "saving application");
        self.store.put(&key, &data.to_json()?)
    }

    fn list_slots(&self, app: &str) -> Result<Vec<SlotData>> {
        let prefix = format!("{}SLOT-", self.app_dir(app));
        let mut slots = Vec::new();
        for key in self.store.list(&prefix)? {
            let Some(slot_id) = key
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(".json"))
            else {
                continue;
            };
            slots.push(self.get_slot(app, slot_id)?);
        }
        Ok(slots)
    }

    fn get_slot(&self, app: &str, slot_id: &str) -> Result<SlotData> {
        let key = self.slot_key(app, slot_id);
        tracing::debug!(%key, "reading slot");
        let body = self.store.get(&key)?.ok_or_else(|| RtError::SlotNotFound {
            app: app.to_string(),
            slot: slot_id.to_string(),
        })?;
        let mut data = SlotData::from_json(&body)?;
        data.slot_id = slot_id.to_string();
        Ok(data)
    }

    fn save_slot(&self, app: &str, slot_id: &str, data: &SlotData) -> Result<()> {
        let key = self.slot_key(app, slot_id);
        tracing::debug!(%key, "saving slot");
        self.store.put(&key, &data.to_json()?)
    }

    fn delete_slot(&self, app: &str, slot_id: &str) -> Result<()> {
        let key = self.slot_key(app, slot_id);
        tracing::debug!(%key, "deleting slot");
        self.store.delete(&key)
    }

    fn list_sorted_deployments_for_slot_id(
        &self,
        app: &str,
        slot_id: &str,
        limit: usize,
    ) -> Result<Vec<DeploymentData>> {
        let prefix = format!("{}DEPLOYMENT-{slot_id}-", self.app_dir(app));
        let mut deployments = Vec::new();
        for key in self.store.list(&prefix)? {
            if limit > 0 && deployments.len() >= limit {
                break;
            }
            // "DEPLOYMENT-a-" also prefixes keys of slot "a-b"; require a bare id.
            let Some(id) = key
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(".json"))
                .filter(|id| is_deployment_id(id))
            else {
                continue;
            };
            deployments.push(self.get_deployment(app, slot_id, id)?);
        }
        Ok(deployments)
    }

    fn get_deployment(
        &self,
        app: &str,
        slot_id: &str,
        deployment_id: &str,
    ) -> Result<DeploymentData> {
        let key = self.deployment_key(app, slot_id, deployment_id);
        let body = self
            .store
            .get(&key)?
            .ok_or_else(|| RtError::DeploymentNotFound {
                app: app.to_string(),
                slot: slot_id.to_string(),
                deployment: deployment_id.to_string(),
            })?;
        let mut data = DeploymentData::from_json(&body)?;
        data.deployment_id = deployment_id.to_string();
        Ok(data)
    }

    fn save_deployment(
        &self,
        app: &str,
        slot_id: &str,
        deployment_id: &str,
        data: &DeploymentData,
    ) -> Result<()> {
        let key = self.deployment_key(app, slot_id, deployment_id);
        tracing::debug!(%key, "saving deployment");
        self.store.put(&key, &data.to_json()?)
    }
}
