use super::object::{ObjectStore, ObjectStoreBackend};
use super::{Backend, BackendConfig};
use crate::error::Result;
use crate::io::atomic_write;
use std::path::{Path, PathBuf};

/// Object store on the local filesystem: a key is a path under `root`.
///
/// Used for single-operator setups and for exercising the CLI without a cloud
/// account.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalStore { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn collect(&self, dir: &Path, out: &mut Vec<String>) -> Result<()> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                self.collect(&path, out)?;
            } else if let Ok(rel) = path.strip_prefix(&self.root) {
                let key = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                out.push(key);
            }
        }
        Ok(())
    }
}

impl ObjectStore for LocalStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        if path.is_dir() {
            return Ok(None);
        }
        match std::fs::read(&path) {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, body: &[u8]) -> Result<()> {
        atomic_write(&self.path_for(key), body)
    }

    fn delete(&self, key: &str) -> Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        self.collect(&self.root, &mut keys)?;
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }
}

/// Registry constructor for `backend: local` (`path`, optional `prefix`).
pub fn configure(cfg: &BackendConfig) -> Result<Box<dyn Backend>> {
    let root = cfg.required("path")?;
    let prefix = cfg.optional("prefix").unwrap_or("");
    Ok(Box::new(ObjectStoreBackend::new(
        "local",
        prefix,
        LocalStore::new(root),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ApplicationData, SlotData};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn local_backend(dir: &TempDir) -> Box<dyn Backend> {
        let mut config = BTreeMap::new();
        config.insert("path".to_string(), dir.path().display().to_string());
        config.insert("prefix".to_string(), "state/dev".to_string());
        configure(&BackendConfig {
            backend: "local".into(),
            config,
        })
        .unwrap()
    }

    #[test]
    fn writes_land_on_disk_under_prefix() {
        let dir = TempDir::new().unwrap();
        let b = local_backend(&dir);
        b.save_application("hello", &ApplicationData::new("hello", "0.7"))
            .unwrap();
        assert!(dir
            .path()
            .join("state/dev/hello/APPLICATION.json")
            .exists());
        assert_eq!(b.list_applications().unwrap()[0].name, "hello");
    }

    #[test]
    fn list_slots_reads_every_slot_file() {
        let dir = TempDir::new().unwrap();
        let b = local_backend(&dir);
        b.save_slot("hello", "a1", &SlotData::default()).unwrap();
        b.save_slot("hello", "a2", &SlotData::default()).unwrap();
        let ids: Vec<_> = b
            .list_slots("hello")
            .unwrap()
            .into_iter()
            .map(|s| s.slot_id)
            .collect();
        assert_eq!(ids, vec!["a1", "a2"]);
    }

    #[test]
    fn ready_on_empty_directory() {
        let dir = TempDir::new().unwrap();
        assert!(local_backend(&dir).is_ready().unwrap());
    }

    #[test]
    fn path_is_required() {
        let cfg = BackendConfig {
            backend: "local".into(),
            config: BTreeMap::new(),
        };
        assert!(configure(&cfg).is_err());
    }
}
