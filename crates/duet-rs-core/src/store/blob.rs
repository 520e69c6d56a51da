//! Keyed blob backends for the session collection.

use super::StoreError;
use log::{debug, info};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Durable key -> UTF-8 blob mapping.
///
/// `write` returns only after the blob is durably replaced.
pub trait BlobStore: Send + Sync {
    /// Read the blob stored under `key`, if any.
    fn read(&self, key: &str) -> Result<Option<String>, StoreError>;
    /// Replace the blob stored under `key`.
    fn write(&self, key: &str, contents: &str) -> Result<(), StoreError>;
}

/// Blob store that keeps one `<key>.json` file per key under a root directory.
pub struct FileBlobStore {
    root: PathBuf,
    /// Serialize writers so temp files never collide.
    write_lock: Mutex<()>,
}

impl FileBlobStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        info!("initialized file blob store (root={})", root.display());
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

impl BlobStore for FileBlobStore {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.blob_path(key);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, key: &str, contents: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let path = self.blob_path(key);
        let tmp_path = self.root.join(format!(".{key}.json.tmp"));
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(contents.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;
        debug!(
            "wrote blob (path={}, bytes={})",
            path.display(),
            contents.len()
        );
        Ok(())
    }
}

/// In-process blob store, used for ephemeral sessions and tests.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.blobs.read().get(key).cloned())
    }

    fn write(&self, key: &str, contents: &str) -> Result<(), StoreError> {
        self.blobs
            .write()
            .insert(key.to_string(), contents.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{BlobStore, FileBlobStore};
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn file_store_round_trips_and_replaces() {
        let root = tempdir().expect("root");
        let store = FileBlobStore::new(root.path().join("nested")).expect("store");
        assert_eq!(store.read("chats").expect("read"), None);

        store.write("chats", "[1]").expect("write");
        store.write("chats", "[2]").expect("overwrite");
        assert_eq!(store.read("chats").expect("read"), Some("[2]".to_string()));
        assert!(store.root().join("chats.json").exists());
        assert!(!store.root().join(".chats.json.tmp").exists());
    }
}
