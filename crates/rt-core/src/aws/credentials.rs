//! Credential lookup: environment variables first, then a named profile in the
//! shared credentials file.

use super::sigv4::Credentials;
use crate::error::{Result, RtError};
use std::path::PathBuf;

pub const DEFAULT_PROFILE: &str = "default";

impl Credentials {
    /// `AWS_ACCESS_KEY_ID`/`AWS_SECRET_ACCESS_KEY` (plus optional
    /// `AWS_SESSION_TOKEN`) win over the profile. Without an explicit
    /// profile, `AWS_PROFILE` then `default` is used.
    pub fn resolve(profile: Option<&str>) -> Result<Credentials> {
        if profile.is_none() {
            if let Some(creds) = from_env(|k| std::env::var(k).ok()) {
                tracing::debug!("using AWS credentials from environment");
                return Ok(creds);
            }
        }
        let profile = profile
            .map(str::to_string)
            .or_else(|| std::env::var("AWS_PROFILE").ok().filter(|p| !p.is_empty()))
            .unwrap_or_else(|| DEFAULT_PROFILE.to_string());
        let path = shared_credentials_path()?;
        let text = std::fs::read_to_string(&path).map_err(|e| {
            RtError::Config(format!(
                "no AWS credentials in environment and {} unreadable: {e}",
                path.display()
            ))
        })?;
        tracing::debug!(%profile, path = %path.display(), "using AWS credentials from profile");
        from_profile(&text, &profile)
    }
}

fn shared_credentials_path() -> Result<PathBuf> {
    if let Ok(p) = std::env::var("AWS_SHARED_CREDENTIALS_FILE") {
        if !p.is_empty() {
            return Ok(PathBuf::from(p));
        }
    }
    home::home_dir()
        .map(|h| h.join(".aws").join("credentials"))
        .ok_or(RtError::HomeNotFound)
}

pub fn from_env(get: impl Fn(&str) -> Option<String>) -> Option<Credentials> {
    let access_key_id = get("AWS_ACCESS_KEY_ID").filter(|v| !v.is_empty())?;
    let secret_access_key = get("AWS_SECRET_ACCESS_KEY").filter(|v| !v.is_empty())?;
    Some(Credentials {
        access_key_id,
        secret_access_key,
        session_token: get("AWS_SESSION_TOKEN").filter(|v| !v.is_empty()),
    })
}

/// Read `[profile]` from an INI-style credentials file.
pub fn from_profile(text: &str, profile: &str) -> Result<Credentials> {
    let mut in_section = false;
    let mut key_id = None;
    let mut secret = None;
    let mut token = None;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_section = name.trim() == profile;
            continue;
        }
        if !in_section {
            continue;
        }
        let Some((k, v)) = line.split_once('=') else {
            continue;
        };
        let v = v.trim().to_string();
        match k.trim() {
            "aws_access_key_id" => key_id = Some(v),
            "aws_secret_access_key" => secret = Some(v),
            "aws_session_token" => token = Some(v),
            _ => {}
        }
    }
    match (key_id, secret) {
        (Some(access_key_id), Some(secret_access_key)) => Ok(Credentials {
            access_key_id,
            secret_access_key,
            session_token: token,
        }),
        _ => Err(RtError::Config(format!(
            "AWS profile {profile:?} not found or incomplete"
        ))),
    }
}
