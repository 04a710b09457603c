//! Operator input validation: names that end up in resource names, state keys
//! and object-store paths.

use crate::error::{Result, RtError};
use chrono::Duration;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn env_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_]{1,4}$").expect("valid regex"))
}

fn app_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_-]{1,26}$").expect("valid regex"))
}

fn slot_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9.\-_]{0,25}$").expect("valid regex"))
}

fn namespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9/\-_.*'()]{1,255}$").expect("valid regex"))
}

fn duration_term_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([0-9]+)([a-z]+)").expect("valid regex"))
}

fn invalid(flag: &str, reason: impl Into<String>) -> RtError {
    RtError::InvalidFlag {
        flag: flag.to_string(),
        reason: reason.into(),
    }
}

/// Reserved for the shared infrastructure every app builds on.
pub const RESERVED_APP_NAME: &str = "shared-services";

pub fn environment(flag: &str, value: &str) -> Result<()> {
    if !env_re().is_match(value) {
        return Err(invalid(
            flag,
            format!("{value:?} must match {}", env_re().as_str()),
        ));
    }
    Ok(())
}

pub fn application(flag: &str, value: &str) -> Result<()> {
    if value == RESERVED_APP_NAME {
        return Err(invalid(flag, format!("{value:?} is reserved")));
    }
    if !app_re().is_match(value) {
        return Err(invalid(
            flag,
            format!("{value:?} must match {}", app_re().as_str()),
        ));
    }
    Ok(())
}

pub fn slot_id(flag: &str, value: &str) -> Result<()> {
    if !slot_id_re().is_match(value) {
        return Err(invalid(
            flag,
            format!("{value:?} must match {}", slot_id_re().as_str()),
        ));
    }
    Ok(())
}

pub fn namespace(flag: &str, value: &str) -> Result<()> {
    if !namespace_re().is_match(value) {
        return Err(invalid(
            flag,
            format!("{value:?} must match {}", namespace_re().as_str()),
        ));
    }
    Ok(())
}

pub fn non_empty(flag: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(invalid(flag, "must not be empty"));
    }
    Ok(())
}

const DAY: i64 = 24 * 3600;
const MAX_SECONDS: i64 = i64::MAX / 1000;

/// Parse durations such as `7day`, `2week`, `36h` or `1month2day`.
///
/// Months count as 30 days and years as 365.
pub fn big_duration(value: &str) -> Result<Duration> {
    let bad = || invalid("older-than", format!("{value:?} is not a valid duration"));
    if value.is_empty() {
        return Err(bad());
    }
    let mut total: i64 = 0;
    let mut consumed = 0;
    for caps in duration_term_re().captures_iter(value) {
        let Some(m) = caps.get(0) else { continue };
        if m.start() != consumed {
            return Err(bad());
        }
        consumed = m.end();
        let n: i64 = caps[1].parse().map_err(|_| bad())?;
        let unit: i64 = match &caps[2] {
            "y" | "year" | "years" => 365 * DAY,
            "mo" | "month" | "months" => 30 * DAY,
            "w" | "week" | "weeks" => 7 * DAY,
            "d" | "day" | "days" => DAY,
            "h" => 3600,
            "m" => 60,
            "s" => 1,
            _ => return Err(bad()),
        };
        total = n
            .checked_mul(unit)
            .and_then(|t| total.checked_add(t))
            .filter(|t| *t <= MAX_SECONDS)
            .ok_or_else(bad)?;
    }
    if consumed != value.len() {
        return Err(bad());
    }
    Ok(Duration::seconds(total))
}

/// `--var k=v` flags into a map; later keys win. Values may contain `=`.
pub fn variables(vars: &[String]) -> Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for v in vars {
        let (key, value) = v
            .split_once('=')
            .filter(|(k, _)| !k.is_empty())
            .ok_or_else(|| invalid("var", format!("{v:?} is not of the form key=value")))?;
        out.insert(key.to_string(), value.to_string());
    }
    Ok(out)
}
