//! Operator intents, one public function per CLI command.
//!
//! Every command runs over a [`Session`]: the deployment-state store, the
//! engine driver, the remote-state block, an optional cloud client, the
//! caller's identity and a [`Prompter`] through which all questions and
//! progress lines go. Listing commands return data for the CLI to render.

pub mod create_app;
pub mod infra;
pub mod listing;
pub mod prefixes;
pub mod slots;
pub mod traffic;

use crate::aws::sts::Identity;
use crate::error::{Result, RtError};
use crate::prompt::{Prompter, Tone};
use crate::release::{self, Applied, Layer, Planned, Release, ReleaseSpec};
use crate::schema::{ApplicationData, DeployPilot};
use crate::store::DeploymentState;
use crate::terraform::{Driver, RemoteState};
use crate::traffic::Cloud;
use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Namespace flag value meaning "the caller's account id".
pub const DEFAULT_NAMESPACE: &str = "default";

// ---------------------------------------------------------------------------
// Flags
// ---------------------------------------------------------------------------

/// Flags shared by every command that plans and applies.
#[derive(Debug, Clone, Default)]
pub struct ReleaseFlags {
    pub variables: BTreeMap<String, String>,
    pub target: Option<String>,
    /// Answer yes to every confirmation.
    pub yes: bool,
    /// Apply even when the plan is empty.
    pub force: bool,
    pub xlegacy: bool,
}

/// `--slot-id` / `--slot-prefix` / `--previous-slot`.
#[derive(Debug, Clone, Default)]
pub struct SlotSelector {
    pub slot_id: Option<String>,
    pub slot_prefix: Option<String>,
    pub previous: bool,
}

/// What became of a plan-and-apply command.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Empty plan without `--force`.
    Unchanged,
    /// The operator said no.
    Declined,
    Applied(Applied),
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct Session {
    pub env: String,
    pub app: String,
    namespace_flag: String,
    pub identity: Identity,
    pub ip_address: Option<String>,
    pub store: DeploymentState,
    pub driver: Driver,
    pub remote_state: Option<RemoteState>,
    pub cloud: Option<Box<dyn Cloud>>,
    pub prompter: Box<dyn Prompter>,
    pub cwd: PathBuf,
    engine_version: OnceCell<String>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("env", &self.env)
            .field("app", &self.app)
            .field("namespace", &self.namespace())
            .field("store", &self.store)
            .field("cwd", &self.cwd)
            .finish()
    }
}

impl Session {
    pub fn new(
        env: &str,
        app: &str,
        store: DeploymentState,
        driver: Driver,
        prompter: Box<dyn Prompter>,
    ) -> Self {
        Session {
            env: env.to_string(),
            app: app.to_string(),
            namespace_flag: DEFAULT_NAMESPACE.to_string(),
            identity: Identity::default(),
            ip_address: None,
            store,
            driver,
            remote_state: None,
            cloud: None,
            prompter,
            cwd: PathBuf::from("."),
            engine_version: OnceCell::new(),
        }
    }

    pub fn with_identity(mut self, identity: Identity, ip_address: Option<String>) -> Self {
        self.identity = identity;
        self.ip_address = ip_address;
        self
    }

    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace_flag = namespace.to_string();
        self
    }

    pub fn with_remote_state(mut self, remote_state: RemoteState) -> Self {
        self.remote_state = Some(remote_state);
        self
    }

    pub fn with_cloud(mut self, cloud: Box<dyn Cloud>) -> Self {
        self.cloud = Some(cloud);
        self
    }

    pub fn with_cwd(mut self, cwd: PathBuf) -> Self {
        self.cwd = cwd;
        self
    }

    /// Remote-state namespace; `default` resolves to the caller's account.
    pub fn namespace(&self) -> &str {
        if self.namespace_flag == DEFAULT_NAMESPACE {
            &self.identity.account_id
        } else {
            &self.namespace_flag
        }
    }

    pub fn remote_state(&self) -> Result<&RemoteState> {
        self.remote_state
            .as_ref()
            .ok_or_else(|| RtError::Config("No 'remote_state' block configured".into()))
    }

    pub fn cloud(&self) -> Result<&dyn Cloud> {
        self.cloud
            .as_deref()
            .ok_or_else(|| RtError::Config("no cloud client configured for this command".into()))
    }

    pub fn pilot(&self) -> DeployPilot {
        self.identity.pilot(self.ip_address.as_deref())
    }

    /// `terraform version`, asked once per session.
    pub fn engine_version(&self) -> Result<String> {
        if let Some(v) = self.engine_version.get() {
            return Ok(v.clone());
        }
        let v = self.driver.version()?;
        Ok(self.engine_version.get_or_init(|| v).clone())
    }

    pub fn is_sensitive(&self) -> bool {
        release::is_sensitive_env(&self.env)
    }

    pub fn say(&self, tone: Tone, message: &str) {
        self.prompter.say(tone, message);
    }

    /// Ask `note`, or report the override when `yes` is set.
    pub fn confirm(&self, note: &str, yes: bool) -> Result<bool> {
        if yes {
            self.say(Tone::Plain, &format!("{note}\n(Answer overriden with Yes)"));
            return Ok(true);
        }
        let confirmed = self.prompter.confirm(note, self.is_sensitive())?;
        if !confirmed {
            tracing::debug!("operator declined: {note}");
        }
        Ok(confirmed)
    }

    /// Load the application for a write command, offering to create it when
    /// it does not exist yet. `None` means the operator declined. The new
    /// record is only saved by the command that goes on to change something.
    pub fn begin_application(&self, yes: bool) -> Result<Option<ApplicationData>> {
        let app = match self.store.get_application(&self.app) {
            Ok(app) => app,
            Err(RtError::AppNotFound(_)) => {
                let note = format!(
                    "Application {:?} doesn't exist in {:?}, do you want to create it?",
                    self.app, self.env
                );
                if !self.confirm(&note, yes)? {
                    return Ok(None);
                }
                ApplicationData::new(&self.app, &self.engine_version()?)
            }
            Err(e) => return Err(e),
        };
        release::check_tool_version(&app)?;
        Ok(Some(app))
    }

    /// Load an existing application for a read-only command.
    pub fn existing_application(&self) -> Result<ApplicationData> {
        let app = self.store.get_application(&self.app)?;
        release::check_tool_version(&app)?;
        Ok(app)
    }

    /// Directory holding a slot's configuration: a subdirectory of the
    /// working directory.
    pub fn slot_root(&self, path: Option<&Path>, slot_id: &str) -> Result<PathBuf> {
        let path = path.ok_or_else(|| {
            RtError::Usage(format!(
                "You need to supply a path to Terraform configs of {slot_id:?}."
            ))
        })?;
        let root = self.cwd.join(path);
        let is_cwd = root.components().eq(self.cwd.components())
            || path.as_os_str().is_empty()
            || path == Path::new(".");
        if is_cwd {
            return Err(RtError::Usage(format!(
                "Terraform configs for a slot have to be in a separate dir, not in {:?}!",
                self.cwd.display().to_string()
            )));
        }
        if !root.exists() {
            return Err(RtError::Usage(format!(
                "{:?} does not exist",
                root.display().to_string()
            )));
        }
        Ok(root)
    }

    fn release_spec(
        &self,
        layer: Layer,
        root: PathBuf,
        variables: BTreeMap<String, String>,
        flags: &ReleaseFlags,
    ) -> ReleaseSpec {
        ReleaseSpec {
            app: self.app.clone(),
            env: self.env.clone(),
            namespace: self.namespace().to_string(),
            account_id: self.namespace().to_string(),
            layer,
            root,
            variables,
            target: flags.target.clone(),
            xlegacy: flags.xlegacy,
        }
    }

    /// Prepare a release, run `body` over it and always clean up.
    fn with_release<T>(
        &self,
        spec: ReleaseSpec,
        body: impl FnOnce(&mut Release<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut release = Release::prepare(&self.store, &self.driver, self.remote_state()?, spec)?;
        let result = body(&mut release);
        release.finish(result)
    }

    /// Plan, skip an empty diff, confirm, then hand over to `apply`.
    fn plan_and_apply(
        &self,
        release: &mut Release<'_>,
        destroy: bool,
        flags: &ReleaseFlags,
        note: &str,
        apply: impl FnOnce(&Release<'_>, &Planned) -> Result<Applied>,
    ) -> Result<Outcome> {
        let planned = release.plan(destroy)?;
        if planned.is_noop(flags.force) {
            self.say(Tone::Plain, "No changes. Nothing to do.");
            return Ok(Outcome::Unchanged);
        }
        if !self.confirm(note, flags.yes)? {
            return Ok(Outcome::Declined);
        }
        Ok(Outcome::Applied(apply(&*release, &planned)?))
    }
}

/// Text for `output` / `slot-output`: every output as indented JSON, or the
/// single one asked for by `name`.
pub fn output_message(
    app: &str,
    env: &str,
    slot_id: Option<&str>,
    name: Option<&str>,
    outputs: &BTreeMap<String, String>,
) -> Result<String> {
    let slot_part = slot_id
        .map(|s| format!(" with slot-id {s}"))
        .unwrap_or_default();
    match name.filter(|n| !n.is_empty()) {
        None => {
            let json = serde_json::to_string_pretty(outputs)?;
            Ok(format!(
                "The app {app}{slot_part} in env {env} contains the outputs:\n{json}\n"
            ))
        }
        Some(name) => match outputs.get(name) {
            Some(value) => Ok(format!(
                "The app {app}{slot_part} in env {env} contains the output:\n{name}: {value}\n"
            )),
            None => Err(RtError::Usage(format!(
                "The app {app}{slot_part} in env {env} does not contain the output:\n{name}\n"
            ))),
        },
    }
}
