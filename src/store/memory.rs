use std::collections::HashMap;
use std::sync::Mutex;

use super::{StorageEngine, StoreResult, StoredRecord};

/// In-memory storage engine for tests and ephemeral hosts.
///
/// All collections live behind one mutex, which makes `replace_all`
/// trivially atomic with respect to readers.
#[derive(Default)]
pub struct MemoryEngine {
    inner: Mutex<HashMap<String, Vec<StoredRecord>>>,
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl StorageEngine for MemoryEngine {
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
        Ok(())
    }

    async fn replace_all(&self, collection: &str, records: Vec<StoredRecord>) -> StoreResult<()> {
        let mut guard = self.inner.lock().unwrap();
        guard.insert(collection.to_string(), records);
        Ok(())
    }

    async fn delete(&self, collection: &str, key: &str) -> StoreResult<()> {
        let mut guard = self.inner.lock().unwrap();
        if let Some(records) = guard.get_mut(collection) {
            records.retain(|record| record.key != key);
        }
        Ok(())
    }
}
