use crate::error::{Result, RtError};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const RT_DIR: &str = ".rt";
pub const LOGS_DIR: &str = "logs";
pub const SKELETONS_DIR: &str = "skeletons";

pub const PROJECT_CONFIG_FILE: &str = "rt.yaml";
pub const USER_CONFIG_FILE: &str = "config.yaml";

pub const ENGINE_CACHE_DIR: &str = ".terraform";
pub const BACKEND_CONFIG_FILE: &str = "backend-config.tf.json";
pub const STATE_BACKUP_FILE: &str = "terraform.tfstate.backup";
pub const TEMPLATE_SUFFIX: &str = "tpl";

// ---------------------------------------------------------------------------
// Per-user directory
// ---------------------------------------------------------------------------

/// `~/.rt`, or `RT_HOME` when set.
pub fn rt_home() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("RT_HOME") {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    home::home_dir()
        .map(|h| h.join(RT_DIR))
        .ok_or(RtError::HomeNotFound)
}

pub fn logs_dir(rt_home: &Path) -> PathBuf {
    rt_home.join(LOGS_DIR)
}

pub fn skeletons_dir(rt_home: &Path) -> PathBuf {
    rt_home.join(SKELETONS_DIR)
}

pub fn user_config_path(rt_home: &Path) -> PathBuf {
    rt_home.join(USER_CONFIG_FILE)
}

pub fn project_config_path(dir: &Path) -> PathBuf {
    dir.join(PROJECT_CONFIG_FILE)
}

/// Fresh log file name for one invocation, e.g. `rt-20240102-150405.log`.
pub fn log_file_path(rt_home: &Path, now: chrono::DateTime<chrono::Utc>) -> PathBuf {
    logs_dir(rt_home).join(format!("rt-{}.log", now.format("%Y%m%d-%H%M%S")))
}

// ---------------------------------------------------------------------------
// Engine working files
// ---------------------------------------------------------------------------

pub fn engine_cache_dir(root: &Path) -> PathBuf {
    root.join(ENGINE_CACHE_DIR)
}

pub fn backend_config_path(root: &Path) -> PathBuf {
    root.join(BACKEND_CONFIG_FILE)
}

pub fn state_backup_path(root: &Path) -> PathBuf {
    root.join(STATE_BACKUP_FILE)
}

pub fn plan_file_path(root: &Path, name: &str) -> PathBuf {
    root.join(format!("{name}-planfile"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn log_file_is_timestamped() {
        let now = chrono::Utc.with_ymd_and_hms(2016, 9, 12, 13, 52, 12).unwrap();
        let path = log_file_path(Path::new("/home/op/.rt"), now);
        assert_eq!(path, PathBuf::from("/home/op/.rt/logs/rt-20160912-135212.log"));
    }

    #[test]
    fn plan_file_is_named_after_target() {
        assert_eq!(
            plan_file_path(Path::new("/cfg/slots"), "stable13"),
            PathBuf::from("/cfg/slots/stable13-planfile")
        );
    }
}
