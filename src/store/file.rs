use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use super::error::{engine_error, StoreResult};
use super::{StorageEngine, StoredRecord};

/// File-backed storage engine suitable for desktop deployments.
///
/// The whole store is one JSON document, loaded on construction and
/// rewritten after every mutation under a single mutex. That single
/// writer is what makes `replace_all` atomic for concurrent readers; it
/// also means the on-disk token written by one process is visible to
/// sibling processes sharing the same path, which the sync lock relies
/// on.
pub struct FileEngine {
    path: PathBuf,
    inner: Mutex<HashMap<String, Vec<StoredRecord>>>,
}

impl FileEngine {
    pub fn new(path: PathBuf) -> StoreResult<Self> {
        let document = if path.exists() {
            Self::load_document(&path)?
        } else {
            HashMap::new()
        };
        Ok(Self {
            path,
            inner: Mutex::new(document),
        })
    }

    fn load_document(path: &PathBuf) -> StoreResult<HashMap<String, Vec<StoredRecord>>> {
        let data = fs::read(path)
            .map_err(|err| engine_error(format!("failed to read store file: {err}")))?;
        serde_json::from_slice(&data)
            .map_err(|err| engine_error(format!("failed to parse store file as JSON: {err}")))
    }

    fn persist(&self, document: &HashMap<String, Vec<StoredRecord>>) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| engine_error(format!("failed to create store directory: {err}")))?;
        }
        let serialized = serde_json::to_vec(document)
            .map_err(|err| engine_error(format!("failed to serialize store document: {err}")))?;
        fs::write(&self.path, serialized)
            .map_err(|err| engine_error(format!("failed to write store file: {err}")))?;
        Ok(())
    }

    /// Re-reads the document from disk. Sibling processes mutate the same
    /// file; callers that coordinate across processes (the sync lock)
    /// reload before deciding anything.
    pub fn reload(&self) -> StoreResult<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let document = Self::load_document(&self.path)?;
        *self.inner.lock().unwrap() = document;
        Ok(())
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl StorageEngine for FileEngine {
    async fn get_all(&self, collection: &str) -> StoreResult<Vec<StoredRecord>> {
        let guard = self.inner.lock().unwrap();
        Ok(guard.get(collection).cloned().unwrap_or_default())
    }

    async fn put(&self, collection: &str, record: StoredRecord) -> StoreResult<()> {
        let mut guard = self.inner.lock().unwrap();
        let records = guard.entry(collection.to_string()).or_default();
        if let Some(existing) = records.iter_mut().find(|existing| existing.key == record.key) {
            *existing = record;
        } else {
            records.push(record);
        }
        self.persist(&guard)
    }

    async fn replace_all(&self, collection: &str, records: Vec<StoredRecord>) -> StoreResult<()> {
        let mut guard = self.inner.lock().unwrap();
        guard.insert(collection.to_string(), records);
        self.persist(&guard)
    }

    async fn delete(&self, collection: &str, key: &str) -> StoreResult<()> {
        let mut guard = self.inner.lock().unwrap();
        if let Some(records) = guard.get_mut(collection) {
            records.retain(|record| record.key != key);
        }
        self.persist(&guard)
    }
}
