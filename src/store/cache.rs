//! Snapshot caches: one collection per entity kind, replaced wholesale
//! from the remote backend so cached views converge on server-assigned
//! identifiers and current field values after a drain.

use super::{LocalStore, StoreResult, StoredRecord};
use crate::queue::entry::EntityKind;
use crate::remote::RowBackend;

/// Refreshes the snapshot collection for one entity kind.
pub async fn refresh_kind(
    store: &LocalStore,
    backend: &dyn RowBackend,
    kind: EntityKind,
) -> StoreResult<usize> {
    let rows = match backend.select(kind.table_name(), None).await {
        Ok(rows) => rows,
        Err(err) => {
            // Stale data beats crashing: keep the previous snapshot.
            log::warn!("snapshot refresh for '{}' failed: {err}", kind.table_name());
            return Ok(0);
        }
    };

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        match row.get("id").and_then(|id| id.as_str()).map(str::to_owned) {
            Some(id) => records.push(StoredRecord::new(id, row)),
            None => log::warn!(
                "dropping '{}' row without an id during refresh",
                kind.table_name()
            ),
        }
    }

    let count = records.len();
    store.replace_all(kind.store_name(), records).await?;
    Ok(count)
}

/// Refreshes every snapshot collection. Individual kinds fail soft; the
/// store write itself is the only hard error.
pub async fn refresh_all(store: &LocalStore, backend: &dyn RowBackend) -> StoreResult<usize> {
    let mut total = 0;
    for kind in EntityKind::ALL {
        total += refresh_kind(store, backend, kind).await?;
    }
    log::debug!("snapshot refresh complete: {total} rows cached");
    Ok(total)
}
