//! `*.tpl` rendering for configuration trees.
//!
//! Templates may only reference variables: `{{ .AppName }}`. A reference to
//! an unknown variable, or any other `{{ ... }}` action, fails the render.

use crate::error::{Result, RtError};
use crate::io::atomic_write;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

fn action_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{(.*?)\}\}").expect("valid regex"))
}

fn variable_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*\.([A-Za-z_][A-Za-z0-9_]*)\s*$").expect("valid regex"))
}

/// Variables available to the templates of an app or slot tree.
pub fn standard_vars(app: &str, env: &str, account_id: &str) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    vars.insert("AppName".to_string(), app.to_string());
    vars.insert("Environment".to_string(), env.to_string());
    vars.insert("AwsAccountId".to_string(), account_id.to_string());
    vars
}

/// Substitute every `{{ .Key }}` in `source`.
pub fn render(name: &str, source: &str, vars: &BTreeMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(source.len());
    let mut last = 0;
    for caps in action_re().captures_iter(source) {
        let whole = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or((0, 0));
        let action = &caps[1];
        let key = variable_re()
            .captures(action)
            .map(|c| c[1].to_string())
            .ok_or_else(|| RtError::Template {
                path: name.to_string(),
                reason: format!("unsupported action {{{{{action}}}}}"),
            })?;
        let value = vars.get(&key).ok_or_else(|| RtError::Template {
            path: name.to_string(),
            reason: format!("can't evaluate field {key}"),
        })?;
        out.push_str(&source[last..whole.0]);
        out.push_str(value);
        last = whole.1;
    }
    out.push_str(&source[last..]);
    Ok(out)
}

/// Render every `*.<suffix>` directly inside `dir` to the same name without
/// the suffix. Returns the rendered paths, sorted, so callers can clean them
/// up afterwards.
pub fn process_templates(
    dir: &Path,
    suffix: &str,
    vars: &BTreeMap<String, String>,
) -> Result<Vec<PathBuf>> {
    process(dir, suffix, vars, false)
}

/// Like [`process_templates`], removing each template once rendered.
pub fn process_templates_and_delete(
    dir: &Path,
    suffix: &str,
    vars: &BTreeMap<String, String>,
) -> Result<Vec<PathBuf>> {
    process(dir, suffix, vars, true)
}

fn process(
    dir: &Path,
    suffix: &str,
    vars: &BTreeMap<String, String>,
    delete_source: bool,
) -> Result<Vec<PathBuf>> {
    let ext = format!(".{suffix}");
    let mut sources: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(&ext) && n.len() > ext.len())
        })
        .collect();
    sources.sort();

    let mut rendered = Vec::with_capacity(sources.len());
    for source in sources {
        tracing::debug!(path = %source.display(), "processing template");
        let text = std::fs::read_to_string(&source)?;
        let output = render(&source.display().to_string(), &text, vars)?;
        let target = source.with_file_name(
            source
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(&ext))
                .unwrap_or_default(),
        );
        atomic_write(&target, output.as_bytes())?;
        if delete_source {
            std::fs::remove_file(&source)?;
        }
        rendered.push(target);
    }
    Ok(rendered)
}
