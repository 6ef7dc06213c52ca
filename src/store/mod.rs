//! Durable, namespaced local storage with timeout-bounded operations.
//!
//! The [`StorageEngine`] trait is the seam between the sync core and
//! whatever durable storage the host platform provides. Two engines ship
//! with the crate: an in-memory one for tests and ephemeral hosts, and a
//! file-backed one for desktop deployments. A browser host can plug an
//! IndexedDB-backed engine through the same trait.
//!
//! [`LocalStore`] wraps an engine and applies a timeout budget to every
//! call so a stalled engine surfaces a typed error instead of hanging the
//! application.

pub mod cache;
pub mod error;
mod memory;
#[cfg(not(target_arch = "wasm32"))]
mod file;
#[cfg(not(target_arch = "wasm32"))]
pub mod migrate;

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::platform::runtime;

pub use error::{engine_error, timeout_error, StoreError, StoreErrorCode, StoreResult};
#[cfg(not(target_arch = "wasm32"))]
pub use file::FileEngine;
pub use memory::MemoryEngine;

/// Collection names making up the persisted layout: one snapshot
/// collection per entity kind, the mutation queue, and two key/value
/// areas.
pub mod collections {
    pub const USERS: &str = "users";
    pub const PRODUCTS: &str = "products";
    pub const DRIVERS: &str = "drivers";
    pub const REGIONS: &str = "regions";
    pub const SHIPMENTS: &str = "shipments";
    pub const PRODUCT_PRICES: &str = "product_prices";
    pub const NOTIFICATIONS: &str = "notifications";
    pub const INSTALLMENTS: &str = "installments";
    pub const INSTALLMENT_PAYMENTS: &str = "installment_payments";
    pub const MUTATION_QUEUE: &str = "mutation_queue";
    pub const SETTINGS: &str = "settings";
    pub const METADATA: &str = "metadata";
}

/// A single record in a collection: primary key plus JSON value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub key: String,
    pub value: JsonValue,
}

impl StoredRecord {
    pub fn new(key: impl Into<String>, value: JsonValue) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Storage backend contract.
///
/// Engines must preserve record insertion order within a collection (the
/// mutation queue replays oldest-first from stored order) and must make
/// `replace_all` atomic with respect to readers: a concurrent `get_all`
/// never observes a half-cleared collection.
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait StorageEngine: Send + Sync {
    async fn get_all(&self, collection: &str) -> StoreResult<Vec<StoredRecord>>;

    /// Upsert by primary key; idempotent. An existing record keeps its
    /// position, a new one is appended.
    async fn put(&self, collection: &str, record: StoredRecord) -> StoreResult<()>;

    /// Clear-then-bulk-insert in one write transaction.
    async fn replace_all(&self, collection: &str, records: Vec<StoredRecord>) -> StoreResult<()>;

    async fn delete(&self, collection: &str, key: &str) -> StoreResult<()>;
}

/// Timeout-guarded facade over a [`StorageEngine`].
pub struct LocalStore {
    engine: Arc<dyn StorageEngine>,
    default_budget: Duration,
    queue_budget: Duration,
}

impl LocalStore {
    pub fn new(engine: Arc<dyn StorageEngine>) -> Self {
        Self::with_budgets(engine, Duration::from_secs(5), Duration::from_secs(10))
    }

    /// Queue operations get a longer budget: they are less
    /// latency-sensitive and more correctness-sensitive than snapshot
    /// reads.
    pub fn with_budgets(
        engine: Arc<dyn StorageEngine>,
        default_budget: Duration,
        queue_budget: Duration,
    ) -> Self {
        Self {
            engine,
            default_budget,
            queue_budget,
        }
    }

    fn budget_for(&self, collection: &str) -> Duration {
        if collection == collections::MUTATION_QUEUE {
            self.queue_budget
        } else {
            self.default_budget
        }
    }

    async fn guarded<F, T>(&self, collection: &str, operation: &str, future: F) -> StoreResult<T>
    where
        F: std::future::Future<Output = StoreResult<T>>,
    {
        match runtime::timeout(self.budget_for(collection), future).await {
            Ok(result) => result,
            Err(runtime::Elapsed) => Err(timeout_error(format!(
                "{operation} on '{collection}' exceeded its budget"
            ))),
        }
    }

    pub async fn get_all(&self, collection: &str) -> StoreResult<Vec<StoredRecord>> {
        self.guarded(collection, "get_all", self.engine.get_all(collection))
            .await
    }

    pub async fn put(&self, collection: &str, record: StoredRecord) -> StoreResult<()> {
        self.guarded(collection, "put", self.engine.put(collection, record))
            .await
    }

    pub async fn replace_all(
        &self,
        collection: &str,
        records: Vec<StoredRecord>,
    ) -> StoreResult<()> {
        self.guarded(
            collection,
            "replace_all",
            self.engine.replace_all(collection, records),
        )
        .await
    }

    pub async fn delete(&self, collection: &str, key: &str) -> StoreResult<()> {
        self.guarded(collection, "delete", self.engine.delete(collection, key))
            .await
    }

    /// Reads a typed value from the metadata area.
    pub async fn get_meta<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        let records = self.get_all(collections::METADATA).await?;
        let Some(record) = records.into_iter().find(|record| record.key == key) else {
            return Ok(None);
        };
        match serde_json::from_value(record.value) {
            Ok(value) => Ok(Some(value)),
            Err(err) => Err(engine_error(format!(
                "failed to parse metadata '{key}': {err}"
            ))),
        }
    }

    pub async fn set_meta<T: Serialize>(&self, key: &str, value: &T) -> StoreResult<()> {
        let value = serde_json::to_value(value)
            .map_err(|err| engine_error(format!("failed to serialize metadata '{key}': {err}")))?;
        self.put(collections::METADATA, StoredRecord::new(key, value))
            .await
    }

    pub async fn delete_meta(&self, key: &str) -> StoreResult<()> {
        self.delete(collections::METADATA, key).await
    }
}
