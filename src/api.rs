//! Host-facing facade wiring the sync core together.
//!
//! The hosting UI talks to [`SyncService`] exclusively: it enqueues
//! mutations, triggers drains, subscribes to status, and feeds the
//! connectivity signal in. Storage internals, the cipher and the queue
//! never leak past this surface, and no public operation propagates an
//! error to the host — everything resolves best-effort and reports
//! through the status broadcaster and the log.

use std::sync::Arc;
use std::time::Duration;

use crate::cipher::Cipher;
use crate::config::SyncConfig;
use crate::platform::connectivity::{Connectivity, ConnectivitySubscription};
use crate::platform::runtime;
use crate::queue::{Mutation, MutationQueue, QueueEntry};
use crate::remote::RowBackend;
use crate::status::{StatusBroadcaster, StatusListener, StatusSubscription, SyncStatus};
use crate::store::{cache, LocalStore, StorageEngine, StoreResult};
use crate::sync::{DrainNotice, DrainOutcome, NoticeBus, SyncEngine};

/// Delay between an enqueue while online and the follow-up drain, so a
/// burst of edits coalesces into one pass.
const ENQUEUE_DRAIN_DELAY: Duration = Duration::from_secs(1);

pub struct SyncService {
    store: Arc<LocalStore>,
    queue: Arc<MutationQueue>,
    backend: Arc<dyn RowBackend>,
    status: Arc<StatusBroadcaster>,
    connectivity: Arc<Connectivity>,
    bus: Arc<NoticeBus>,
    engine: Arc<SyncEngine>,
    _reconnect_trigger: ConnectivitySubscription,
    _status_link: ConnectivitySubscription,
}

impl SyncService {
    /// Builds the whole core over the given storage engine and backend.
    /// Constructed once per process; consumers receive it by reference.
    pub fn new(
        storage: Arc<dyn StorageEngine>,
        backend: Arc<dyn RowBackend>,
        config: SyncConfig,
    ) -> Self {
        let store = Arc::new(LocalStore::with_budgets(
            storage,
            config.store_budget,
            config.queue_budget,
        ));
        let cipher = Arc::new(Cipher::with_max_key_age(store.clone(), config.key_max_age));
        let status = Arc::new(StatusBroadcaster::new(config.initially_online));
        let queue = Arc::new(MutationQueue::new(
            store.clone(),
            cipher,
            status.clone(),
        ));
        let connectivity = Arc::new(Connectivity::new(config.initially_online));
        let bus = Arc::new(NoticeBus::new());
        let engine = Arc::new(SyncEngine::new(
            store.clone(),
            queue.clone(),
            backend.clone(),
            status.clone(),
            connectivity.clone(),
            bus.clone(),
            &config,
        ));

        let status_for_link = status.clone();
        let status_link = connectivity.subscribe(Arc::new(move |online| {
            status_for_link.set_online(online);
        }));
        let reconnect_trigger = engine.spawn_on_reconnect();

        Self {
            store,
            queue,
            backend,
            status,
            connectivity,
            bus,
            engine,
            _reconnect_trigger: reconnect_trigger,
            _status_link: status_link,
        }
    }

    /// Stages a mutation for replay. If the engine is currently online,
    /// a drain is scheduled shortly after — the entry was most likely
    /// deferred by a failed direct write, and the backend may well be
    /// reachable again.
    pub async fn enqueue_mutation(&self, mutation: Mutation) -> Option<QueueEntry> {
        let entry = self.queue.enqueue(mutation).await;

        if entry.is_some() && self.connectivity.is_online() {
            let engine = self.engine.clone();
            runtime::spawn_detached(async move {
                runtime::sleep(ENQUEUE_DRAIN_DELAY).await;
                let _ = engine.drain().await;
            });
        }
        entry
    }

    /// Fire-and-forget drain trigger for a user-initiated "sync now"
    /// action or a host background trigger.
    pub fn trigger_drain_now(&self) {
        let engine = self.engine.clone();
        runtime::spawn_detached(async move {
            let _ = engine.drain().await;
        });
    }

    /// Drain and wait for the outcome.
    pub async fn drain_now(&self) -> DrainOutcome {
        self.engine.drain().await
    }

    pub fn subscribe_to_status(&self, listener: StatusListener) -> StatusSubscription {
        self.status.subscribe(listener)
    }

    pub fn current_status(&self) -> SyncStatus {
        self.status.current()
    }

    /// Ingests the connectivity flag from the hosting environment. A
    /// transition to online triggers a drain.
    pub fn set_online(&self, online: bool) {
        self.connectivity.set_online(online);
    }

    /// Replaces every snapshot cache with fresh rows from the backend.
    pub async fn refresh_caches(&self) -> StoreResult<usize> {
        cache::refresh_all(&self.store, self.backend.as_ref()).await
    }

    pub fn subscribe_to_drain_notices(&self) -> async_channel::Receiver<DrainNotice> {
        self.bus.subscribe()
    }

    /// One-time import of the legacy storage layout, guarded by the
    /// migration flag.
    #[cfg(not(target_arch = "wasm32"))]
    pub async fn migrate_legacy(&self, legacy_path: &std::path::Path) -> StoreResult<bool> {
        crate::store::migrate::migrate_legacy_file(&self.store, legacy_path).await
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    pub fn queue(&self) -> &Arc<MutationQueue> {
        &self.queue
    }
}

#[cfg(test)]
#[cfg(not(target_arch = "wasm32"))]
mod tests {
    use super::*;
    use crate::queue::{RecordId, ShipmentDraft, ShipmentProduct};
    use crate::store::MemoryEngine;
    use crate::test_support::MockBackend;
    use std::sync::Mutex;

    fn service() -> (SyncService, Arc<MockBackend>) {
        let backend = Arc::new(MockBackend::new());
        let service = SyncService::new(
            Arc::new(MemoryEngine::default()),
            backend.clone(),
            SyncConfig {
                rate_limit: chrono::Duration::zero(),
                initially_online: false,
                ..SyncConfig::default()
            },
        );
        (service, backend)
    }

    fn offline_shipment() -> Mutation {
        Mutation::AddShipment {
            shipment: ShipmentDraft {
                id: Some(RecordId::new_local()),
                pending_sync: true,
                sales_order: "SO-77".into(),
                order_date: "2026-08-05".into(),
                region_id: "r-2".into(),
                driver_id: "d-3".into(),
                status: "pending".into(),
                products: vec![ShipmentProduct {
                    product_id: "p-9".into(),
                    product_name: "Soap 12pk".into(),
                    carton_count: 15,
                    product_wage_price: None,
                }],
                due_amount: None,
                notes: None,
                created_by: None,
            },
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn offline_edits_accumulate_then_drain_on_reconnect() {
        let (service, backend) = service();
        let notices = service.subscribe_to_drain_notices();

        assert!(service.enqueue_mutation(offline_shipment()).await.is_some());
        assert_eq!(service.current_status().pending_count, 1);
        assert!(!service.current_status().is_online);
        assert!(backend.calls().is_empty());

        // The transition to online triggers a detached drain; wait for
        // its ended notice rather than racing it.
        service.set_online(true);
        loop {
            match notices.recv().await.expect("notice bus closed") {
                DrainNotice::Ended { .. } => break,
                DrainNotice::Started { .. } => {}
            }
        }

        assert_eq!(service.current_status().pending_count, 0);
        assert!(!backend.calls().is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn connectivity_signal_is_reflected_in_status() {
        let (service, _backend) = service();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _subscription = service.subscribe_to_status(Arc::new(move |status: &SyncStatus| {
            sink.lock().unwrap().push(status.is_online);
        }));

        service.set_online(true);
        service.set_online(false);

        let flags = seen.lock().unwrap().clone();
        assert_eq!(flags, vec![false, true, false]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn refresh_caches_pulls_reference_data() {
        let (service, backend) = service();
        backend.seed_row("drivers", serde_json::json!({"id": "d-1", "name": "Imad"}));

        let count = service.refresh_caches().await.unwrap();
        assert_eq!(count, 1);
    }
}
