//! The deployment-state store: ordered backends, read-from-first and
//! write-to-all.

use crate::backend::{self, Backend, BackendConfig};
use crate::error::{Result, RtError};
use crate::schema::{
    ApplicationData, DeployPilot, DeploymentData, FinishedTerraformRun, SlotData, TerraformRun,
    RT_VERSION,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

pub struct DeploymentState {
    backends: Vec<Box<dyn Backend>>,
}

impl std::fmt::Debug for DeploymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.backends.iter().map(|b| b.name()).collect();
        f.debug_struct("DeploymentState")
            .field("backends", &names)
            .finish()
    }
}

/// Mint a deployment id for `now`: `i64::MAX - unix_seconds`, zero-padded to 20
/// digits so that lexicographic order is newest first.
pub fn deployment_id_at(now: DateTime<Utc>) -> String {
    format!("{:020}", i64::MAX - now.timestamp())
}

impl DeploymentState {
    /// Build the store from `deployment_state` configuration blocks, in order.
    pub fn from_config(configs: &[BackendConfig]) -> Result<Self> {
        if configs.is_empty() {
            return Err(RtError::Config(
                "No configuration provided for \"deployment_state\"".into(),
            ));
        }
        let mut seen: Vec<&str> = Vec::new();
        let mut backends = Vec::with_capacity(configs.len());
        for cfg in configs {
            if seen.contains(&cfg.backend.as_str()) {
                return Err(RtError::Config(format!(
                    "Duplicate backend defined ({})",
                    cfg.backend
                )));
            }
            seen.push(&cfg.backend);
            backends.push(backend::configure(cfg)?);
        }
        Ok(DeploymentState { backends })
    }

    pub fn from_backends(backends: Vec<Box<dyn Backend>>) -> Result<Self> {
        if backends.is_empty() {
            return Err(RtError::Config("No loadable backend found".into()));
        }
        Ok(DeploymentState { backends })
    }

    fn primary(&self) -> &dyn Backend {
        // Constructors refuse an empty list.
        self.backends[0].as_ref()
    }

    /// Run `op` against every backend in order, stopping at the first failure.
    fn fan_out(&self, what: &str, op: impl Fn(&dyn Backend) -> Result<()>) -> Result<()> {
        for (i, b) in self.backends.iter().enumerate() {
            if let Err(e) = op(b.as_ref()) {
                if i > 0 {
                    tracing::warn!(
                        backend = b.name(),
                        written = i,
                        "{what} failed after earlier backends were written; backends may diverge"
                    );
                }
                return Err(RtError::Backend(format!(
                    "{what} failed on backend {}: {e}",
                    b.name()
                )));
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Capabilities
    // -----------------------------------------------------------------------

    pub fn are_backends_ready(&self) -> Result<bool> {
        for b in &self.backends {
            let ready = b.is_ready().map_err(|e| {
                RtError::Backend(format!(
                    "There was an error getting backend {} ready: {e}",
                    b.name()
                ))
            })?;
            if !ready {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// True only when every configured backend can lock writes.
    pub fn supports_write_lock(&self) -> bool {
        self.backends.iter().all(|b| b.supports_write_lock())
    }

    // -----------------------------------------------------------------------
    // Applications
    // -----------------------------------------------------------------------

    pub fn list_applications(&self) -> Result<Vec<ApplicationData>> {
        self.primary().list_applications()
    }

    pub fn get_application(&self, app: &str) -> Result<ApplicationData> {
        self.primary().get_application(app)
    }

    pub fn save_application(&self, app: &str, data: &ApplicationData) -> Result<()> {
        self.fan_out("saving application", |b| b.save_application(app, data))
    }

    // -----------------------------------------------------------------------
    // Slots
    // -----------------------------------------------------------------------

    pub fn list_slots(&self, app: &str) -> Result<Vec<SlotData>> {
        self.primary().list_slots(app)
    }

    pub fn get_slot(&self, app: &str, slot_id: &str) -> Result<SlotData> {
        self.primary().get_slot(app, slot_id)
    }

    pub fn save_slot(&self, app: &str, slot_id: &str, data: &SlotData) -> Result<()> {
        self.fan_out("saving slot", |b| b.save_slot(app, slot_id, data))
    }

    /// Delete from every backend, attempting all of them and reporting every failure.
    pub fn delete_slot(&self, app: &str, slot_id: &str) -> Result<()> {
        let failures: Vec<String> = self
            .backends
            .iter()
            .filter_map(|b| {
                b.delete_slot(app, slot_id)
                    .err()
                    .map(|e| format!("{}: {e}", b.name()))
            })
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(RtError::Cleanup(failures))
        }
    }

    // -----------------------------------------------------------------------
    // Deployments
    // -----------------------------------------------------------------------

    pub fn list_sorted_deployments_for_slot_id(
        &self,
        app: &str,
        slot_id: &str,
        limit: usize,
    ) -> Result<Vec<DeploymentData>> {
        self.primary()
            .list_sorted_deployments_for_slot_id(app, slot_id, limit)
    }

    pub fn get_deployment(
        &self,
        app: &str,
        slot_id: &str,
        deployment_id: &str,
    ) -> Result<DeploymentData> {
        self.primary().get_deployment(app, slot_id, deployment_id)
    }

    pub fn save_deployment(
        &self,
        app: &str,
        slot_id: &str,
        deployment_id: &str,
        data: &DeploymentData,
    ) -> Result<()> {
        self.fan_out("saving deployment", |b| {
            b.save_deployment(app, slot_id, deployment_id, data)
        })
    }

    /// Open a deployment of `slot_id`: stamp the slot (creating it active when
    /// new) and record a fresh deployment, on every backend in order.
    #[allow(clippy::too_many_arguments)]
    pub fn begin_deployment(
        &self,
        app: &str,
        slot_id: &str,
        is_destroy: bool,
        pilot: Option<DeployPilot>,
        start_time: DateTime<Utc>,
        variables: BTreeMap<String, String>,
        terraform_version: &str,
    ) -> Result<DeploymentData> {
        let deployment_id = deployment_id_at(start_time);
        let data = DeploymentData {
            schema_version: crate::schema::DEPLOYMENT_SCHEMA_VERSION,
            deployment_id: deployment_id.clone(),
            deploy_pilot: pilot.clone(),
            start_time,
            terraform: Some(TerraformRun {
                is_destroy,
                variables,
                terraform_version: terraform_version.to_string(),
                ..Default::default()
            }),
            rt_version: RT_VERSION.to_string(),
        };

        for b in &self.backends {
            let mut slot = match b.get_slot(app, slot_id) {
                Ok(slot) => slot,
                Err(RtError::SlotNotFound { .. }) => SlotData {
                    slot_id: slot_id.to_string(),
                    is_active: true,
                    ..Default::default()
                },
                Err(e) => {
                    return Err(RtError::Backend(format!(
                        "Unable to get slot data for {app} / {slot_id}: {e}"
                    )))
                }
            };
            slot.last_deploy_pilot = pilot.clone();
            slot.last_deployment_start_time = Some(start_time);
            b.save_slot(app, slot_id, &slot)?;
            b.save_deployment(app, slot_id, &deployment_id, &data)
                .map_err(|e| {
                    RtError::Backend(format!(
                        "There was an error beginning the deployment with backend {}: {e}",
                        b.name()
                    ))
                })?;
        }

        tracing::info!(app, slot_id, %deployment_id, is_destroy, "deployment begun");
        Ok(data)
    }

    /// Close a deployment: fold the finished run into `data`, re-save it, then
    /// mark the slot active or not and attach the run to it.
    pub fn finish_deployment(
        &self,
        app: &str,
        slot_id: &str,
        deployment_id: &str,
        is_active: bool,
        data: &mut DeploymentData,
        run: &FinishedTerraformRun,
    ) -> Result<()> {
        let tf = data.terraform.get_or_insert_with(TerraformRun::default);
        tf.plan_start_time = Some(run.plan_start_time);
        tf.plan_finish_time = Some(run.plan_finish_time);
        tf.start_time = Some(run.start_time);
        tf.finish_time = Some(run.finish_time);
        tf.resource_diff = Some(run.resource_diff);
        tf.outputs = run.outputs.clone();
        tf.exit_code = run.exit_code;
        tf.warnings = run.warnings.clone();
        tf.stderr = run.stderr.clone();

        for b in &self.backends {
            b.save_deployment(app, slot_id, deployment_id, data)
                .map_err(|e| {
                    RtError::Backend(format!(
                        "There was an error finishing the deployment with backend {}: {e}",
                        b.name()
                    ))
                })?;

            let mut slot = b.get_slot(app, slot_id)?;
            slot.is_active = is_active;
            slot.last_deploy_pilot = data.deploy_pilot.clone();
            slot.last_terraform_run = data.terraform.clone();
            b.save_slot(app, slot_id, &slot)?;
        }

        tracing::info!(app, slot_id, deployment_id, is_active, "deployment finished");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Slot counters (in-memory on the app record; callers save the app)
    // -----------------------------------------------------------------------

    pub fn get_slot_counter(&self, prefix: &str, app: &ApplicationData) -> (u64, bool) {
        match app.slot_counters.get(prefix) {
            Some(c) => (*c, true),
            None => (0, false),
        }
    }

    pub fn add_slot_counter(&self, prefix: &str, mut app: ApplicationData) -> Result<ApplicationData> {
        if app.slot_counters.contains_key(prefix) {
            return Err(RtError::SlotPrefixExists(prefix.to_string()));
        }
        app.slot_counters.insert(prefix.to_string(), 0);
        Ok(app)
    }

    pub fn increment_slot_counter(
        &self,
        prefix: &str,
        mut app: ApplicationData,
    ) -> Result<(u64, ApplicationData)> {
        let counter = app
            .slot_counters
            .get_mut(prefix)
            .ok_or_else(|| RtError::SlotPrefixNotFound(prefix.to_string()))?;
        *counter += 1;
        let value = *counter;
        Ok((value, app))
    }

    pub fn delete_slot_counter(&self, prefix: &str, mut app: ApplicationData) -> Result<ApplicationData> {
        if app.slot_counters.remove(prefix).is_none() {
            return Err(RtError::SlotPrefixNotFound(prefix.to_string()));
        }
        Ok(app)
    }

    pub fn list_slot_counters<'a>(&self, app: &'a ApplicationData) -> Vec<(&'a str, u64)> {
        app.slot_counters
            .iter()
            .map(|(k, v)| (k.as_str(), *v))
            .collect()
    }
}
