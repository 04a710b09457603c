use crate::error::{Result, RtError};
use serde_json::Value;

use super::{APPLICATION_SCHEMA_VERSION, DEPLOYMENT_SCHEMA_VERSION, SLOT_SCHEMA_VERSION};

/// A data-to-data transform from schema `v_n` to `v_{n+1}`.
type Migration = fn(Value) -> Result<Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Application,
    Slot,
    Deployment,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Application => "application",
            RecordKind::Slot => "slot",
            RecordKind::Deployment => "deployment",
        }
    }

    pub fn current_version(self) -> u64 {
        match self {
            RecordKind::Application => APPLICATION_SCHEMA_VERSION,
            RecordKind::Slot => SLOT_SCHEMA_VERSION,
            RecordKind::Deployment => DEPLOYMENT_SCHEMA_VERSION,
        }
    }

    /// Migrations indexed by source version: `chain()[n]` takes `v_n` to `v_{n+1}`.
    fn chain(self) -> &'static [Migration] {
        match self {
            RecordKind::Application => &[bump_version],
            RecordKind::Slot => &[bump_version],
            RecordKind::Deployment => &[bump_version],
        }
    }
}

/// Decode a stored document and walk it forward to the current schema.
///
/// A document newer than this build is refused before any migration runs.
pub fn upgrade(kind: RecordKind, data: &[u8]) -> Result<Value> {
    let mut value: Value = serde_json::from_slice(data)?;
    let current = kind.current_version();
    let mut version = schema_version(&value);

    if version > current {
        return Err(RtError::UnsupportedSchemaVersion {
            kind: kind.as_str(),
            found: version,
            supported: current,
        });
    }

    while version < current {
        let Some(migrate) = kind.chain().get(version as usize) else {
            return Err(RtError::Config(format!(
                "no migration available for {} schema v{version}",
                kind.as_str()
            )));
        };
        value = migrate(value)?;
        let next = schema_version(&value);
        if next != version + 1 {
            return Err(RtError::Config(format!(
                "{} migration from v{version} produced v{next}",
                kind.as_str()
            )));
        }
        tracing::debug!(kind = kind.as_str(), from = version, to = next, "migrated record");
        version = next;
    }

    Ok(value)
}

fn schema_version(value: &Value) -> u64 {
    value.get("v").and_then(Value::as_u64).unwrap_or(0)
}

/// v0 and v1 share a layout; only the version moves.
fn bump_version(mut value: Value) -> Result<Value> {
    let next = schema_version(&value) + 1;
    match value.as_object_mut() {
        Some(obj) => {
            obj.insert("v".to_string(), Value::from(next));
            Ok(value)
        }
        None => Err(RtError::Config("record is not a JSON object".into())),
    }
}
