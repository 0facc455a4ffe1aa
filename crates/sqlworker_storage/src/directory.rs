//! Directory-rooted file store.

use crate::error::{StoreError, StoreResult};
use crate::path::StorePath;
use crate::store::FileStore;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// A file store rooted at a host directory.
///
/// Store paths map onto files below the root. Writes go to a uniquely
/// named sibling first and are renamed into place after `sync_all`, so a
/// crash mid-write leaves the previous file intact.
///
/// # Example
///
/// ```no_run
/// use sqlworker_storage::{DirectoryStore, FileStore};
///
/// let store = DirectoryStore::new("/var/lib/app");
/// store.write("main.sqlite3", b"...").unwrap();
/// let host_path = store.resolve("main.sqlite3").unwrap();
/// assert!(host_path.ends_with("main.sqlite3"));
/// ```
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Creates a store rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn host_path(&self, path: &str) -> StoreResult<(StorePath, PathBuf)> {
        let parsed = StorePath::parse(path)?;
        let host = self.root.join(parsed.to_relative());
        Ok((parsed, host))
    }
}

impl FileStore for DirectoryStore {
    fn resolve(&self, path: &str) -> StoreResult<PathBuf> {
        self.host_path(path).map(|(_, host)| host)
    }

    fn read(&self, path: &str) -> StoreResult<Vec<u8>> {
        let (parsed, host) = self.host_path(path)?;
        fs::read(&host).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(parsed.to_string()),
            _ => StoreError::Io(err),
        })
    }

    fn write(&self, path: &str, data: &[u8]) -> StoreResult<()> {
        let (parsed, host) = self.host_path(path)?;
        if let Some(parent) = host.parent() {
            fs::create_dir_all(parent)?;
        }

        let staging = host.with_file_name(format!(
            ".{}.{}.tmp",
            parsed.file_name(),
            Uuid::new_v4().simple()
        ));
        let result = (|| {
            let mut file = File::create(&staging)?;
            file.write_all(data)?;
            file.sync_all()?;
            fs::rename(&staging, &host)
        })();

        if let Err(err) = result {
            let _ = fs::remove_file(&staging);
            return Err(err.into());
        }
        Ok(())
    }

    fn remove(&self, path: &str) -> StoreResult<bool> {
        let (_, host) = self.host_path(path)?;
        match fs::remove_file(&host) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn rename(&self, from: &str, to: &str) -> StoreResult<bool> {
        let (_, source) = self.host_path(from)?;
        let (_, target) = self.host_path(to)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        match fs::rename(&source, &target) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn exists(&self, path: &str) -> StoreResult<bool> {
        let (_, host) = self.host_path(path)?;
        Ok(host.is_file())
    }

    fn size(&self, path: &str) -> StoreResult<Option<u64>> {
        let (_, host) = self.host_path(path)?;
        match fs::metadata(&host) {
            Ok(meta) => Ok(Some(meta.len())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn create_parent_dirs(&self, path: &str) -> StoreResult<()> {
        let (_, host) = self.host_path(path)?;
        if let Some(parent) = host.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}
