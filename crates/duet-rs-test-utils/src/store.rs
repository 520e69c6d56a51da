use duet_rs_core::{BlobStore, StoreError};
use std::io;

/// Blob store whose writes always fail; reads see an empty store.
#[derive(Default)]
pub struct FailingBlobStore;

impl FailingBlobStore {
    pub fn new() -> Self {
        Self
    }
}

impl BlobStore for FailingBlobStore {
    fn read(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Ok(None)
    }

    fn write(&self, _key: &str, _contents: &str) -> Result<(), StoreError> {
        Err(StoreError::Io(io::Error::other("disk full")))
    }
}
