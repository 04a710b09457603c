//! Non-interactive release steps shared by the infra and slot commands.
//!
//! A [`Release`] owns one working tree for the duration of a command: it
//! renders templates, points the engine at the right remote state, plans,
//! applies or destroys, records the outcome in the deployment-state store and
//! finally removes every ephemeral file it produced. Prompting is left to the
//! caller, between [`Release::plan`] and the apply step.

use crate::error::{Result, RtError};
use crate::paths;
use crate::schema::{ApplicationData, DeployPilot, FinishedTerraformRun, ResourceDiff, RT_VERSION};
use crate::store::DeploymentState;
use crate::template;
use crate::terraform::{
    ApplyInput, DestroyInput, Driver, PlanInput, PlanResourceDiff, RemoteState,
};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

/// Write commands refuse applications that still live in the central
/// repository.
pub fn check_writable(app: &ApplicationData) -> Result<()> {
    if app.use_central_git_repo {
        return Err(RtError::DeprecatedCentralRepo(app.name.clone()));
    }
    Ok(())
}

/// The running tool must be at least as new as the one that last touched
/// `app`. An app that has never recorded a version passes.
pub fn check_tool_version(app: &ApplicationData) -> Result<()> {
    if app.last_rt_version.is_empty() {
        return Ok(());
    }
    let last = semver::Version::parse(app.last_rt_version.trim_start_matches('v'))?;
    let current = semver::Version::parse(RT_VERSION)?;
    if current < last {
        return Err(RtError::OutdatedTool {
            app: app.name.clone(),
            last: app.last_rt_version.clone(),
            current: RT_VERSION.to_string(),
        });
    }
    Ok(())
}

fn sensitive_env_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("(prod|production|live)").expect("valid regex"))
}

/// Environments whose changes deserve a louder prompt.
pub fn is_sensitive_env(env: &str) -> bool {
    sensitive_env_re().is_match(env)
}

/// Caller variables plus the ones every run receives. Standard keys win.
pub fn build_variables(
    caller: &BTreeMap<String, String>,
    app: &str,
    env: &str,
    slot_id: Option<&str>,
) -> BTreeMap<String, String> {
    let mut vars = caller.clone();
    vars.insert("app_name".into(), app.to_string());
    vars.insert("environment".into(), env.to_string());
    if let Some(slot) = slot_id {
        vars.insert("app_version".into(), slot.to_string());
    }
    vars
}

// ---------------------------------------------------------------------------
// Release
// ---------------------------------------------------------------------------

/// Which engine state a release works on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layer {
    Infra,
    Slot(String),
}

impl Layer {
    pub fn slot_id(&self) -> Option<&str> {
        match self {
            Layer::Infra => None,
            Layer::Slot(id) => Some(id),
        }
    }

    fn plan_file(&self, root: &Path) -> PathBuf {
        match self {
            Layer::Infra => root.join("planfile"),
            Layer::Slot(id) => paths::plan_file_path(root, id),
        }
    }
}

/// Everything needed to set up a [`Release`].
#[derive(Debug, Clone)]
pub struct ReleaseSpec {
    pub app: String,
    pub env: String,
    /// Remote-state namespace, already resolved (never `default`).
    pub namespace: String,
    /// Passed to templates as `AwsAccountId`.
    pub account_id: String,
    pub layer: Layer,
    pub root: PathBuf,
    pub variables: BTreeMap<String, String>,
    pub target: Option<String>,
    pub xlegacy: bool,
}

/// Result of the planning step.
#[derive(Debug, Clone)]
pub struct Planned {
    pub diff: PlanResourceDiff,
    pub destroy: bool,
    pub plan_file: Option<PathBuf>,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub warnings: Vec<String>,
}

impl Planned {
    /// Nothing to do unless forced.
    pub fn is_noop(&self, force: bool) -> bool {
        self.diff.is_empty() && !force
    }
}

/// Outcome of an apply or destroy. A non-zero exit is kept here so callers
/// can report before turning it into an error with [`Applied::succeeded`].
#[derive(Debug, Clone)]
pub struct Applied {
    pub operation: &'static str,
    pub exit_code: i32,
    pub stderr: String,
    pub warnings: Vec<String>,
    pub diff: ResourceDiff,
    pub outputs: BTreeMap<String, String>,
    pub state_empty: bool,
    pub finished: DateTime<Utc>,
}

impl Applied {
    pub fn succeeded(self) -> Result<Self> {
        if self.exit_code != 0 {
            return Err(RtError::Engine {
                operation: self.operation.to_string(),
                exit_code: self.exit_code,
                stderr: self.stderr,
            });
        }
        Ok(self)
    }
}

pub struct Release<'a> {
    store: &'a DeploymentState,
    driver: &'a Driver,
    spec: ReleaseSpec,
    remote: RemoteState,
    variables: BTreeMap<String, String>,
    cleanup: Vec<PathBuf>,
}

impl std::fmt::Debug for Release<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Release")
            .field("app", &self.spec.app)
            .field("layer", &self.spec.layer)
            .field("remote", &self.remote.key())
            .finish()
    }
}

impl<'a> Release<'a> {
    /// Resolve the remote state and render templates in `spec.root`.
    pub fn prepare(
        store: &'a DeploymentState,
        driver: &'a Driver,
        remote_state: &RemoteState,
        spec: ReleaseSpec,
    ) -> Result<Self> {
        let remote = match &spec.layer {
            Layer::Infra => remote_state.for_app(&spec.namespace, &spec.app)?,
            Layer::Slot(id) => remote_state.for_slot(&spec.namespace, &spec.app, id)?,
        };
        let template_vars = template::standard_vars(&spec.app, &spec.env, &spec.account_id);
        let rendered =
            template::process_templates(&spec.root, paths::TEMPLATE_SUFFIX, &template_vars)?;
        let variables =
            build_variables(&spec.variables, &spec.app, &spec.env, spec.layer.slot_id());

        let mut cleanup = vec![
            paths::engine_cache_dir(&spec.root),
            paths::state_backup_path(&spec.root),
            paths::backend_config_path(&spec.root),
        ];
        cleanup.extend(rendered);

        tracing::debug!(
            app = %spec.app,
            key = remote.key().unwrap_or_default(),
            "release prepared"
        );
        Ok(Release {
            store,
            driver,
            spec,
            remote,
            variables,
            cleanup,
        })
    }

    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }

    pub fn remote(&self) -> &RemoteState {
        &self.remote
    }

    pub fn root(&self) -> &Path {
        &self.spec.root
    }

    /// Plan against fresh remote state. Destroy plans write no plan file.
    pub fn plan(&mut self, destroy: bool) -> Result<Planned> {
        let plan_file = (!destroy).then(|| self.spec.layer.plan_file(&self.spec.root));
        if let Some(p) = &plan_file {
            self.cleanup.push(p.clone());
        }

        let started = Utc::now();
        let out = self.driver.fresh_plan(
            &self.remote,
            &PlanInput {
                root: self.spec.root.clone(),
                plan_file: plan_file.clone(),
                variables: self.variables.clone(),
                refresh: true,
                target: self.spec.target.clone(),
                destroy,
                xlegacy: self.spec.xlegacy,
            },
        )?;
        let finished = Utc::now();
        if out.exit_code != 0 {
            return Err(RtError::Engine {
                operation: "Planning".into(),
                exit_code: out.exit_code,
                stderr: out.stderr,
            });
        }

        tracing::info!(
            to_create = out.diff.to_create,
            to_change = out.diff.to_change,
            to_remove = out.diff.to_remove,
            destroy,
            "plan finished"
        );
        Ok(Planned {
            diff: out.diff,
            destroy,
            plan_file,
            started,
            finished,
            warnings: out.warnings,
        })
    }

    fn run_engine(&self, planned: &Planned, variables: &BTreeMap<String, String>) -> Result<Applied> {
        let root = self.spec.root.clone();
        let applied = if planned.destroy {
            let out = self.driver.destroy(&DestroyInput {
                root,
                variables: variables.clone(),
                refresh: true,
                target: self.spec.target.clone(),
                xlegacy: self.spec.xlegacy,
            })?;
            Applied {
                operation: "Destroy operation",
                exit_code: out.exit_code,
                stderr: out.stderr,
                warnings: out.warnings,
                diff: out.diff,
                outputs: BTreeMap::new(),
                state_empty: false,
                finished: Utc::now(),
            }
        } else {
            let out = self.driver.apply(&ApplyInput {
                root,
                plan_file: planned.plan_file.clone(),
                variables: if planned.plan_file.is_some() {
                    BTreeMap::new()
                } else {
                    variables.clone()
                },
                refresh: true,
            })?;
            Applied {
                operation: "Apply operation",
                exit_code: out.exit_code,
                stderr: out.stderr,
                warnings: out.warnings,
                diff: out.diff,
                outputs: out.outputs,
                state_empty: false,
                finished: Utc::now(),
            }
        };
        let state_empty = self.driver.is_state_empty(&self.spec.root)?;
        Ok(Applied {
            state_empty,
            ..applied
        })
    }

    /// Apply or destroy the infrastructure layer, then record it on `app`.
    pub fn execute_infra(
        &self,
        app: &mut ApplicationData,
        planned: &Planned,
        engine_version: &str,
    ) -> Result<Applied> {
        let applied = self.run_engine(planned, &self.variables)?;

        app.name = self.spec.app.clone();
        app.last_infra_change_time = Some(applied.finished);
        app.is_active = !applied.state_empty;
        app.last_rt_version = RT_VERSION.to_string();
        app.last_terraform_version = engine_version.to_string();
        if !applied.outputs.is_empty() {
            app.infra_outputs = applied.outputs.clone();
        }
        self.store.save_application(&self.spec.app, app)?;
        Ok(applied)
    }

    /// Apply or destroy one slot inside an open deployment record.
    pub fn execute_slot(
        &self,
        app: &mut ApplicationData,
        planned: &Planned,
        pilot: Option<DeployPilot>,
        engine_version: &str,
    ) -> Result<Applied> {
        let slot_id = self
            .spec
            .layer
            .slot_id()
            .ok_or_else(|| RtError::Config("slot release without a slot id".into()))?
            .to_string();

        let start_time = Utc::now();
        let mut deployment = self.store.begin_deployment(
            &self.spec.app,
            &slot_id,
            planned.destroy,
            pilot,
            start_time,
            self.variables.clone(),
            engine_version,
        )?;

        let applied = self.run_engine(planned, &self.variables)?;

        let deployment_id = deployment.deployment_id.clone();
        self.store.finish_deployment(
            &self.spec.app,
            &slot_id,
            &deployment_id,
            !applied.state_empty,
            &mut deployment,
            &FinishedTerraformRun {
                plan_start_time: planned.started,
                plan_finish_time: planned.finished,
                start_time,
                finish_time: applied.finished,
                resource_diff: applied.diff,
                outputs: applied.outputs.clone(),
                exit_code: applied.exit_code,
                warnings: applied.warnings.clone(),
                stderr: applied.stderr.clone(),
            },
        )?;

        app.name = self.spec.app.clone();
        app.last_deployment_time = Some(applied.finished);
        app.is_active = true;
        app.last_rt_version = RT_VERSION.to_string();
        app.last_terraform_version = engine_version.to_string();
        self.store.save_application(&self.spec.app, app)?;
        Ok(applied)
    }

    /// Remove every ephemeral file. A cleanup failure never replaces an
    /// error already in `result`.
    pub fn finish<T>(self, result: Result<T>) -> Result<T> {
        let cleaned = crate::io::remove_paths(&self.cleanup);
        match (result, cleaned) {
            (Ok(v), Ok(())) => Ok(v),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(cleanup)) => {
                tracing::warn!("cleanup after failure also failed: {cleanup}");
                Err(e)
            }
        }
    }
}
