//! Ordered, persisted staging area for writes made while offline.
//!
//! Entries are sealed by the cipher before they reach the store and
//! survive process restarts. The queue owns entry lifecycle: the sync
//! engine is the only component that removes entries (on confirmed
//! success) or rewrites the surviving subset after a drain; the UI never
//! mutates queue state directly.

pub mod entry;

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::cipher::{Cipher, Envelope};
use crate::remote::RowBackend;
use crate::status::StatusBroadcaster;
use crate::store::{collections, LocalStore, StoreResult, StoredRecord};

pub use entry::{
    EntityKind, InstallmentDraft, InstallmentPatch, Mutation, OperationKind, PaymentDraft,
    PaymentPatch, QueueEntry, RecordId, ShipmentDraft, ShipmentPatch, ShipmentProduct,
    LOCAL_ID_PREFIX,
};

/// Queue entries older than this are dropped by the cleanup sweep.
pub const DEFAULT_MAX_ENTRY_AGE_HOURS: i64 = 168;

pub struct MutationQueue {
    store: Arc<LocalStore>,
    cipher: Arc<Cipher>,
    status: Arc<StatusBroadcaster>,
}

impl MutationQueue {
    pub fn new(
        store: Arc<LocalStore>,
        cipher: Arc<Cipher>,
        status: Arc<StatusBroadcaster>,
    ) -> Self {
        Self {
            store,
            cipher,
            status,
        }
    }

    /// Stages a mutation for later replay. Never propagates an error:
    /// a failure to enqueue is logged and swallowed so a storage hiccup
    /// cannot block the UI. Returns the persisted entry, or `None` when
    /// persistence failed.
    pub async fn enqueue(&self, mutation: Mutation) -> Option<QueueEntry> {
        let entry = QueueEntry::new(mutation);

        let value = match serde_json::to_value(&entry) {
            Ok(value) => value,
            Err(err) => {
                log::error!("failed to serialize queue entry: {err}");
                return None;
            }
        };
        let envelope = self.cipher.encrypt(&value).await;
        let record = match envelope_record(&entry.id, &envelope) {
            Some(record) => record,
            None => return None,
        };

        if let Err(err) = self.store.put(collections::MUTATION_QUEUE, record).await {
            log::error!("failed to persist queue entry: {err}");
            return None;
        }

        log::debug!(
            "queued {:?} {:?} as {}",
            entry.mutation.operation(),
            entry.mutation.entity_kind(),
            entry.id
        );
        self.recompute_status().await;
        Some(entry)
    }

    /// Reads every stored entry, decrypting each one independently.
    /// Corruption of a single entry must not block draining the rest, so
    /// undecryptable or unparsable blobs are skipped with a warning and
    /// only the survivors are returned, in stored order.
    pub async fn read_all(&self) -> StoreResult<Vec<QueueEntry>> {
        let records = self.store.get_all(collections::MUTATION_QUEUE).await?;

        let mut entries = Vec::with_capacity(records.len());
        for record in records {
            let envelope: Envelope = match serde_json::from_value(record.value) {
                Ok(envelope) => envelope,
                Err(err) => {
                    log::warn!("skipping queue blob '{}': not an envelope: {err}", record.key);
                    continue;
                }
            };
            let value = match self.cipher.decrypt(&envelope).await {
                Ok(value) => value,
                Err(err) => {
                    log::warn!("skipping queue entry '{}': {err}", record.key);
                    continue;
                }
            };
            match serde_json::from_value::<QueueEntry>(value) {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    log::warn!("skipping queue entry '{}': malformed payload: {err}", record.key);
                }
            }
        }

        Ok(entries)
    }

    /// Persists the surviving subset after a drain pass.
    pub async fn replace_all(&self, entries: &[QueueEntry]) -> StoreResult<()> {
        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            let value = match serde_json::to_value(entry) {
                Ok(value) => value,
                Err(err) => {
                    log::error!("failed to serialize queue entry '{}': {err}", entry.id);
                    continue;
                }
            };
            let envelope = self.cipher.encrypt(&value).await;
            if let Some(record) = envelope_record(&entry.id, &envelope) {
                records.push(record);
            }
        }

        self.store
            .replace_all(collections::MUTATION_QUEUE, records)
            .await?;
        self.recompute_status().await;
        Ok(())
    }

    pub async fn clear(&self) -> StoreResult<()> {
        self.store
            .replace_all(collections::MUTATION_QUEUE, Vec::new())
            .await?;
        self.recompute_status().await;
        log::info!("mutation queue cleared");
        Ok(())
    }

    /// Number of entries awaiting replay. Read failures count as zero:
    /// the projection must never take the UI down with it.
    pub async fn pending_count(&self) -> usize {
        match self.read_all().await {
            Ok(entries) => entries.len(),
            Err(err) => {
                log::warn!("failed to count pending mutations: {err}");
                0
            }
        }
    }

    /// Drops entries whose `submitted_at` predates the cutoff, bounding
    /// unbounded growth from permanently failing entries. Returns how
    /// many were removed.
    pub async fn prune_older_than(&self, max_age_hours: i64) -> StoreResult<usize> {
        let cutoff = Utc::now() - Duration::hours(max_age_hours);
        let entries = self.read_all().await?;

        let (kept, dropped): (Vec<_>, Vec<_>) = entries
            .into_iter()
            .partition(|entry| entry.submitted_at >= cutoff);

        if dropped.is_empty() {
            return Ok(0);
        }

        for entry in &dropped {
            log::warn!(
                "pruning queue entry '{}' submitted at {}: exceeded {max_age_hours}h retention",
                entry.id,
                entry.submitted_at
            );
        }
        self.replace_all(&kept).await?;
        Ok(dropped.len())
    }

    /// Drops Update entries whose target no longer exists remotely.
    /// Such entries can never succeed and would otherwise retry forever.
    /// Targets that are still local placeholders are left alone — they
    /// resolve against the in-pass id map, not the backend.
    pub async fn prune_orphaned(&self, backend: &dyn RowBackend) -> StoreResult<usize> {
        let entries = self.read_all().await?;

        let mut kept = Vec::with_capacity(entries.len());
        let mut dropped = 0usize;
        for entry in entries {
            let orphaned = match entry.mutation.update_target() {
                Some(target) if !target.is_local() => {
                    let table = entry.mutation.entity_kind().table_name();
                    match backend.exists(table, target.as_str()).await {
                        Ok(exists) => !exists,
                        Err(err) => {
                            // Can't verify right now; keep the entry.
                            log::debug!("orphan probe for '{}' failed: {err}", entry.id);
                            false
                        }
                    }
                }
                _ => false,
            };

            if orphaned {
                log::warn!(
                    "dropping orphaned queue entry '{}': target no longer exists remotely",
                    entry.id
                );
                dropped += 1;
            } else {
                kept.push(entry);
            }
        }

        if dropped > 0 {
            self.replace_all(&kept).await?;
        }
        Ok(dropped)
    }

    async fn recompute_status(&self) {
        let count = self.pending_count().await;
        self.status.set_pending_count(count);
    }
}

fn envelope_record(entry_id: &str, envelope: &Envelope) -> Option<StoredRecord> {
    match serde_json::to_value(envelope) {
        Ok(value) => Some(StoredRecord::new(entry_id, value)),
        Err(err) => {
            log::error!("failed to serialize envelope for '{entry_id}': {err}");
            None
        }
    }
}

/// Raw envelope value for a stored entry; used by tests to corrupt a
/// single blob in place.
#[cfg(test)]
pub(crate) fn raw_record(entry_id: &str, value: serde_json::Value) -> StoredRecord {
    StoredRecord::new(entry_id, value)
}

#[cfg(test)]
#[cfg(not(target_arch = "wasm32"))]
mod tests {
    use super::*;
    use crate::store::MemoryEngine;
    use crate::test_support::MockBackend;
    use serde_json::json;

    fn fixture() -> (Arc<LocalStore>, MutationQueue) {
        let store = Arc::new(LocalStore::new(Arc::new(MemoryEngine::default())));
        let cipher = Arc::new(Cipher::new(store.clone()));
        let status = Arc::new(StatusBroadcaster::new(true));
        let queue = MutationQueue::new(store.clone(), cipher, status);
        (store, queue)
    }

    fn shipment_create(sales_order: &str) -> Mutation {
        Mutation::AddShipment {
            shipment: ShipmentDraft {
                id: Some(RecordId::new_local()),
                pending_sync: true,
                sales_order: sales_order.into(),
                order_date: "2026-08-01".into(),
                region_id: "r-1".into(),
                driver_id: "d-1".into(),
                status: "pending".into(),
                products: vec![ShipmentProduct {
                    product_id: "p-1".into(),
                    product_name: "Olive oil 1L".into(),
                    carton_count: 40,
                    product_wage_price: Some(2.5),
                }],
                due_amount: Some(1800.0),
                notes: None,
                created_by: Some("u-7".into()),
            },
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn enqueue_persists_encrypted_and_reads_back() {
        let (store, queue) = fixture();

        let entry = queue.enqueue(shipment_create("SO-1")).await.unwrap();

        // On disk the queue holds sealed envelopes, not entries.
        let records = store.get_all(collections::MUTATION_QUEUE).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value["format"], json!("sealed"));

        let entries = queue.read_all().await.unwrap();
        assert_eq!(entries, vec![entry]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn corrupted_entry_is_skipped_not_fatal() {
        let (store, queue) = fixture();

        let first = queue.enqueue(shipment_create("SO-1")).await.unwrap();
        let second = queue.enqueue(shipment_create("SO-2")).await.unwrap();
        let third = queue.enqueue(shipment_create("SO-3")).await.unwrap();

        // Corrupt the middle blob in place.
        store
            .put(
                collections::MUTATION_QUEUE,
                raw_record(&second.id, json!({"format": "sealed", "nonce": "!!", "body": "!!"})),
            )
            .await
            .unwrap();

        let entries = queue.read_all().await.unwrap();
        let ids: Vec<&str> = entries.iter().map(|entry| entry.id.as_str()).collect();
        assert_eq!(ids, vec![first.id.as_str(), third.id.as_str()]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn prune_older_than_drops_only_expired_entries() {
        let (_, queue) = fixture();

        let mut old = QueueEntry::new(shipment_create("SO-old"));
        old.submitted_at = Utc::now() - Duration::hours(200);
        let mut fresh = QueueEntry::new(shipment_create("SO-fresh"));
        fresh.submitted_at = Utc::now() - Duration::hours(100);
        queue.replace_all(&[old, fresh.clone()]).await.unwrap();

        let dropped = queue.prune_older_than(DEFAULT_MAX_ENTRY_AGE_HOURS).await.unwrap();
        assert_eq!(dropped, 1);

        let remaining = queue.read_all().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, fresh.id);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn prune_orphaned_drops_updates_without_remote_target() {
        let (_, queue) = fixture();
        let backend = MockBackend::new();
        backend.seed_row("shipments", json!({"id": "s-live", "status": "pending"}));

        queue
            .enqueue(Mutation::UpdateShipment {
                target: RecordId::parse("s-live"),
                changes: ShipmentPatch::default(),
            })
            .await
            .unwrap();
        queue
            .enqueue(Mutation::UpdateShipment {
                target: RecordId::parse("s-gone"),
                changes: ShipmentPatch::default(),
            })
            .await
            .unwrap();
        // A still-local target is not probed against the backend.
        queue
            .enqueue(Mutation::UpdateShipment {
                target: RecordId::parse("offline-zz"),
                changes: ShipmentPatch::default(),
            })
            .await
            .unwrap();

        let dropped = queue.prune_orphaned(&backend).await.unwrap();
        assert_eq!(dropped, 1);

        let remaining = queue.read_all().await.unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(remaining
            .iter()
            .all(|entry| entry.mutation.update_target().unwrap().as_str() != "s-gone"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn pending_count_tracks_queue_size() {
        let (_, queue) = fixture();
        assert_eq!(queue.pending_count().await, 0);

        queue.enqueue(shipment_create("SO-1")).await.unwrap();
        queue.enqueue(shipment_create("SO-2")).await.unwrap();
        assert_eq!(queue.pending_count().await, 2);

        queue.clear().await.unwrap();
        assert_eq!(queue.pending_count().await, 0);
    }
}
