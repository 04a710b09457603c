use thiserror::Error;

#[derive(Debug, Error)]
pub enum RtError {
    #[error("application {0:?} not found")]
    AppNotFound(String),

    #[error("slot {slot:?} of application {app:?} not found")]
    SlotNotFound { app: String, slot: String },

    #[error("deployment {deployment:?} of slot {slot:?} ({app:?}) not found")]
    DeploymentNotFound {
        app: String,
        slot: String,
        deployment: String,
    },

    #[error(
        "unsupported schema version of {kind} record: found v{found}, this rt supports up to v{supported}. Please upgrade rt."
    )]
    UnsupportedSchemaVersion {
        kind: &'static str,
        found: u64,
        supported: u64,
    },

    #[error("Last used RT version for {app:?}: {last}. You have {current:?}, please upgrade.")]
    OutdatedTool {
        app: String,
        last: String,
        current: String,
    },

    #[error(
        "Application {0:?} lives in the central Git repository. Please migrate your app out of the central Git repository as it is deprecated."
    )]
    DeprecatedCentralRepo(String),

    #[error("{operation} failed (exit code {exit_code}). Stderr:\n{stderr}")]
    Engine {
        operation: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("failed to run terraform: {0}")]
    EngineSpawn(String),

    #[error("terraform binary not found: install terraform or set RT_TERRAFORM_BIN")]
    EngineNotFound,

    #[error(
        "Bailing out of destroy-infra...\nCannot destroy app {app} in env {env} while slots are active. Please use deploy-destroy on active slots:\n{}",
        slots.join("\n")
    )]
    ActiveSlots {
        app: String,
        env: String,
        slots: Vec<String>,
    },

    #[error(
        "Slot {0} is the only slot serving traffic, disabling it would cause downtime. Do you intend to deprovision this slot/app? Use deploy-destroy instead."
    )]
    OnlyTrafficSlot(String),

    #[error("ELBs are not attached to scaling group {0}")]
    BalancersNotAttached(String),

    #[error("{0}")]
    Traffic(String),

    #[error("cloud API error {code}: {message}")]
    Cloud { code: String, message: String },

    #[error("slot prefix {0:?} already exists")]
    SlotPrefixExists(String),

    #[error("Slot prefix {0} does not exist")]
    SlotPrefixNotFound(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("Defined backend {0} is not supported")]
    BackendNotSupported(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// Operator supplied an unusable combination of arguments.
    #[error("{0}")]
    Usage(String),

    #[error("invalid {flag}: {reason}")]
    InvalidFlag { flag: String, reason: String },

    #[error("template error in {path}: {reason}")]
    Template { path: String, reason: String },

    #[error("http error: {0}")]
    Http(String),

    #[error("cleanup failed:\n{}", .0.join("\n"))]
    Cleanup(Vec<String>),

    #[error("home directory not found: set HOME environment variable")]
    HomeNotFound,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl RtError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RtError::AppNotFound(_)
                | RtError::SlotNotFound { .. }
                | RtError::DeploymentNotFound { .. }
        )
    }
}

impl From<reqwest::Error> for RtError {
    fn from(e: reqwest::Error) -> Self {
        RtError::Http(e.to_string())
    }
}

impl From<semver::Error> for RtError {
    fn from(e: semver::Error) -> Self {
        RtError::Config(format!("invalid version: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, RtError>;
