use crate::backend::BackendConfig;
use crate::error::{Result, RtError};
use crate::terraform::RemoteState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Top-level blocks accepted in `rt.yaml`.
pub const SUPPORTED_BLOCKS: &[&str] = &["deployment_state", "remote_state"];

// ---------------------------------------------------------------------------
// ProjectConfig (rt.yaml)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub deployment_state: Vec<BackendConfig>,
    #[serde(default)]
    pub remote_state: Option<RemoteState>,
}

/// Replace `${env}` and `${aws_account_id}` before the text is parsed.
pub fn substitute(text: &str, env: &str, account_id: &str) -> String {
    text.replace("${env}", env)
        .replace("${aws_account_id}", account_id)
}

impl ProjectConfig {
    pub fn parse(text: &str, env: &str, account_id: &str) -> Result<Self> {
        let text = substitute(text, env, account_id);
        let value: serde_yaml::Value = serde_yaml::from_str(&text)?;
        if let serde_yaml::Value::Mapping(map) = &value {
            for key in map.keys() {
                let name = key.as_str().unwrap_or_default();
                if !SUPPORTED_BLOCKS.contains(&name) {
                    return Err(RtError::Config(format!(
                        "Unrecognised config block ({name:?}), supported: {SUPPORTED_BLOCKS:?}"
                    )));
                }
            }
        }
        let cfg: ProjectConfig = serde_yaml::from_value(value)?;
        if cfg.deployment_state.is_empty() {
            return Err(RtError::Config(
                "No configuration provided for \"deployment_state\"".into(),
            ));
        }
        Ok(cfg)
    }

    pub fn load(path: &Path, env: &str, account_id: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            RtError::Config(format!("Failed to load config from {:?}: {e}", path.display().to_string()))
        })?;
        Self::parse(&text, env, account_id).map_err(|e| {
            RtError::Config(format!("Failed to load config from {:?}: {e}", path.display().to_string()))
        })
    }

    /// The remote-state block, required by every command that runs the engine.
    pub fn require_remote_state(&self, path: &Path) -> Result<&RemoteState> {
        self.remote_state.as_ref().ok_or_else(|| {
            RtError::Config(format!(
                "No 'remote_state' block found in {:?}",
                path.display().to_string()
            ))
        })
    }
}

// ---------------------------------------------------------------------------
// UserConfig (~/.rt/config.yaml)
// ---------------------------------------------------------------------------

/// Defaults for flags the operator did not pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Profile {
    #[serde(default)]
    pub env: Option<String>,
    #[serde(default)]
    pub app: Option<String>,
    #[serde(default)]
    pub aws_profile: Option<String>,
    #[serde(default)]
    pub aws_region: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub verbose: Option<bool>,
    #[serde(default)]
    pub enable_file_logging: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl UserConfig {
    /// A missing file is an empty config.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(UserConfig::default());
        }
        let data = std::fs::read_to_string(path)?;
        if data.trim().is_empty() {
            return Ok(UserConfig::default());
        }
        Ok(serde_yaml::from_str(&data)?)
    }

    pub fn profile(&self, name: &str) -> Result<&Profile> {
        self.profiles.get(name).ok_or_else(|| {
            let known: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
            RtError::Config(format!("profile {name:?} not found (known: {known:?})"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const RT_YAML: &str = r#"
deployment_state:
  - backend: s3
    config:
      bucket: "rt-${aws_account_id}"
      prefix: "${env}"
      region: us-east-1
  - backend: local
    config:
      path: /tmp/rt
remote_state:
  backend: s3
  config:
    bucket: "tfstate-${aws_account_id}"
    region: us-east-1
"#;

    #[test]
    fn placeholders_are_substituted() {
        let cfg = ProjectConfig::parse(RT_YAML, "dev", "123456789012").unwrap();
        assert_eq!(cfg.deployment_state.len(), 2);
        assert_eq!(cfg.deployment_state[0].config["bucket"], "rt-123456789012");
        assert_eq!(cfg.deployment_state[0].config["prefix"], "dev");
        assert_eq!(cfg.deployment_state[1].backend, "local");
        let rs = cfg.remote_state.unwrap();
        assert_eq!(rs.config["bucket"], "tfstate-123456789012");
    }

    #[test]
    fn unknown_blocks_are_rejected() {
        let text = format!("{RT_YAML}random_thing_oink:\n  a: b\n");
        let err = ProjectConfig::parse(&text, "dev", "1").unwrap_err();
        assert!(err
            .to_string()
            .contains("Unrecognised config block (\"random_thing_oink\")"));
    }

    #[test]
    fn deployment_state_is_required() {
        let err = ProjectConfig::parse("remote_state:\n  backend: s3\n", "dev", "1").unwrap_err();
        assert!(err.to_string().contains("deployment_state"));
    }

    #[test]
    fn missing_remote_state_names_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rt.yaml");
        std::fs::write(&path, "deployment_state:\n  - backend: local\n    config: {path: x}\n")
            .unwrap();
        let cfg = ProjectConfig::load(&path, "dev", "1").unwrap();
        let err = cfg.require_remote_state(&path).unwrap_err();
        assert!(err.to_string().contains("No 'remote_state' block found"));
        assert!(err.to_string().contains("rt.yaml"));
    }

    #[test]
    fn load_reports_the_path() {
        let dir = TempDir::new().unwrap();
        let err = ProjectConfig::load(&dir.path().join("rt.yaml"), "dev", "1").unwrap_err();
        assert!(err.to_string().contains("Failed to load config from"));
    }

    #[test]
    fn user_profiles() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        assert!(UserConfig::load(&path).unwrap().profiles.is_empty());

        std::fs::write(
            &path,
            "profiles:\n  work:\n    env: dev\n    app: hello\n    aws-profile: acme\n    enable-file-logging: true\n",
        )
        .unwrap();
        let cfg = UserConfig::load(&path).unwrap();
        let p = cfg.profile("work").unwrap();
        assert_eq!(p.env.as_deref(), Some("dev"));
        assert_eq!(p.aws_profile.as_deref(), Some("acme"));
        assert_eq!(p.enable_file_logging, Some(true));
        assert!(p.aws_region.is_none());
        assert!(cfg.profile("home").is_err());
    }
}
