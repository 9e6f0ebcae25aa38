//! Cluster record persistence.
//!
//! One JSON file per cluster under the records directory, named after the
//! cluster. Saves are write-to-temp-then-rename so a crash never leaves a
//! half-written record behind.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};

mod record;

pub use record::{
    wire_now, ClusterRecord, GitRemote, HostInfo, NotebookSetup, WorkerOptions, WorkerSet,
};

/// Filesystem-backed store of cluster records.
pub struct ClusterStore {
    dir: PathBuf,
}

impl ClusterStore {
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    /// Reject a name carrying the storage suffix; the canonical name is
    /// the bare cluster name.
    fn canonical(name: &str) -> Result<()> {
        if let Some(stem) = name.strip_suffix(".json") {
            return Err(StoreError::InvalidName {
                given: name.to_owned(),
                canonical: stem.to_owned(),
            }
            .into());
        }
        Ok(())
    }

    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).is_file()
    }

    /// Persist `record` atomically, creating the directory if needed.
    pub fn save(&self, record: &ClusterRecord) -> Result<()> {
        let json = serde_json::to_string_pretty(record)?;
        fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            name: record.name.clone(),
            source,
        })?;

        let path = self.path_for(&record.name);
        let temp_path = path.with_extension("tmp");
        let io_err = |source| StoreError::Io {
            name: record.name.clone(),
            source,
        };

        let mut file = fs::File::create(&temp_path).map_err(io_err)?;
        let cleanup_and_err = |e| {
            let _ = fs::remove_file(&temp_path);
            io_err(e)
        };
        file.write_all(json.as_bytes()).map_err(cleanup_and_err)?;
        file.sync_all().map_err(cleanup_and_err)?;
        fs::rename(&temp_path, &path).map_err(cleanup_and_err)?;

        Ok(())
    }

    /// Load the record for `name`.
    pub fn load(&self, name: &str) -> Result<ClusterRecord> {
        Self::canonical(name)?;
        let path = self.path_for(name);
        if !path.is_file() {
            return Err(StoreError::NotFound(name.to_owned()).into());
        }
        let raw = fs::read_to_string(&path).map_err(|source| StoreError::Io {
            name: name.to_owned(),
            source,
        })?;
        let record = serde_json::from_str(&raw).map_err(|source| StoreError::Decode {
            name: name.to_owned(),
            source,
        })?;
        Ok(record)
    }

    /// Raw JSON text of the record, for detailed display.
    pub fn raw(&self, name: &str) -> Result<String> {
        Self::canonical(name)?;
        let path = self.path_for(name);
        if !path.is_file() {
            return Err(StoreError::NotFound(name.to_owned()).into());
        }
        fs::read_to_string(&path).map_err(|source| {
            StoreError::Io {
                name: name.to_owned(),
                source,
            }
            .into()
        })
    }

    /// Remove the record for `name`.
    pub fn delete(&self, name: &str) -> Result<()> {
        Self::canonical(name)?;
        let path = self.path_for(name);
        if !path.is_file() {
            return Err(StoreError::NotFound(name.to_owned()).into());
        }
        fs::remove_file(&path).map_err(|source| {
            StoreError::Io {
                name: name.to_owned(),
                source,
            }
            .into()
        })
    }

    /// Names of all stored clusters, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(|source| StoreError::Io {
            name: "<records dir>".to_owned(),
            source,
        })? {
            let entry = entry.map_err(|source| StoreError::Io {
                name: "<records dir>".to_owned(),
                source,
            })?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_owned());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tempfile::TempDir;

    fn store() -> (TempDir, ClusterStore) {
        let dir = TempDir::new().unwrap();
        let store = ClusterStore::new(dir.path().join("clusters"));
        (dir, store)
    }

    #[test]
    fn save_then_load_round_trips() {
        let (_guard, store) = store();
        let mut record = ClusterRecord::new("alpha", Some("dask"), Some("test rig"));
        record.instances = vec!["i-1".into(), "i-2".into()];
        store.save(&record).unwrap();

        let loaded = store.load("alpha").unwrap();
        assert_eq!(loaded.name, "alpha");
        assert_eq!(loaded.topology.as_deref(), Some("dask"));
        assert_eq!(loaded.instances, vec!["i-1", "i-2"]);
    }

    #[test]
    fn load_missing_is_not_found() {
        let (_guard, store) = store();
        match store.load("ghost") {
            Err(Error::Store(StoreError::NotFound(name))) => assert_eq!(name, "ghost"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn suffixed_name_is_rejected_with_the_canonical_form() {
        let (_guard, store) = store();
        match store.load("alpha.json") {
            Err(Error::Store(StoreError::InvalidName { given, canonical })) => {
                assert_eq!(given, "alpha.json");
                assert_eq!(canonical, "alpha");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn delete_removes_the_record() {
        let (_guard, store) = store();
        store
            .save(&ClusterRecord::new("alpha", None, None))
            .unwrap();
        assert!(store.exists("alpha"));
        store.delete("alpha").unwrap();
        assert!(!store.exists("alpha"));
        assert!(matches!(
            store.delete("alpha"),
            Err(Error::Store(StoreError::NotFound(_)))
        ));
    }

    #[test]
    fn list_is_sorted_and_ignores_strays() {
        let (_guard, store) = store();
        store.save(&ClusterRecord::new("beta", None, None)).unwrap();
        store
            .save(&ClusterRecord::new("alpha", None, None))
            .unwrap();
        fs::write(store.dir().join("notes.txt"), "stray").unwrap();

        assert_eq!(store.list().unwrap(), vec!["alpha", "beta"]);
    }

    #[test]
    fn list_on_missing_dir_is_empty() {
        let (_guard, store) = store();
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn save_overwrites_in_place() {
        let (_guard, store) = store();
        let mut record = ClusterRecord::new("alpha", None, None);
        store.save(&record).unwrap();
        record.instances.push("i-9".into());
        store.save(&record).unwrap();

        let loaded = store.load("alpha").unwrap();
        assert_eq!(loaded.instances, vec!["i-9"]);
        assert!(!store.dir().join("alpha.tmp").exists());
    }
}
