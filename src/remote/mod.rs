//! Remote row-oriented backend consumed by the sync core.
//!
//! The backend is the ultimate arbiter of identifiers and authoritative
//! state. The core assumes inserts return the full persisted row (that
//! is how a server-assigned identifier is learned) and that updates
//! return the affected rows (an update touching zero rows is an
//! integrity signal, not a success).

pub mod error;
mod rest;

use serde_json::Value as JsonValue;

pub use error::{
    not_found, rejected, timeout_error, transport_error, unauthorized, RemoteError,
    RemoteErrorCode, RemoteResult,
};
pub use rest::{RestOptions, RestRowBackend};

/// Equality filter for selects, e.g. `id = <value>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub equals: String,
}

impl Filter {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            column: "id".into(),
            equals: id.into(),
        }
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait RowBackend: Send + Sync {
    /// Inserts a row and returns the persisted representation, including
    /// the server-assigned identifier.
    async fn insert(&self, table: &str, row: JsonValue) -> RemoteResult<JsonValue>;

    /// Applies a sparse update to the row with the given id and returns
    /// the affected rows.
    async fn update(&self, table: &str, id: &str, changes: JsonValue)
        -> RemoteResult<Vec<JsonValue>>;

    async fn delete(&self, table: &str, id: &str) -> RemoteResult<()>;

    async fn select(&self, table: &str, filter: Option<&Filter>) -> RemoteResult<Vec<JsonValue>>;

    /// Whether a row with the given id exists. Used by orphan pruning.
    async fn exists(&self, table: &str, id: &str) -> RemoteResult<bool> {
        let rows = self.select(table, Some(&Filter::by_id(id))).await?;
        Ok(!rows.is_empty())
    }

    /// Best-effort session refresh before a drain. The default is a
    /// no-op for backends without a session concept.
    async fn refresh_session(&self) -> RemoteResult<()> {
        Ok(())
    }
}
