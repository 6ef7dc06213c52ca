//! Synchronization engine: the state machine that drains the mutation
//! queue against the remote backend.
//!
//! One drain pass moves through `Idle → Locking → Draining → Reconciling
//! → Idle`, with early exits when the engine is offline, rate limited or
//! loses the cross-tab lock. Replay is strictly sequential: an Update
//! that targets an entity created offline can only be rewritten to the
//! server-assigned identifier after its Create has been replayed, so
//! ordering is a correctness requirement, not an optimization.

pub mod bus;
pub mod lock;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::config::SyncConfig;
use crate::platform::connectivity::{Connectivity, ConnectivitySubscription};
use crate::platform::runtime;
use crate::queue::{Mutation, MutationQueue, QueueEntry, RecordId};
use crate::remote::{RemoteError, RowBackend};
use crate::status::StatusBroadcaster;
use crate::store::{cache, LocalStore};

pub use bus::{DrainNotice, NoticeBus};
pub use lock::{LockToken, SyncLock, LOCK_META};

pub const LAST_SYNC_META: &str = "last_sync_time";
pub const LAST_ATTEMPT_META: &str = "last_sync_attempt";

/// Result of one drain attempt.
#[derive(Clone, Debug, PartialEq)]
pub enum DrainOutcome {
    Completed(DrainReport),
    Skipped(SkipReason),
}

#[derive(Clone, Debug, PartialEq)]
pub enum SkipReason {
    /// The engine is offline; nothing was attempted.
    Offline,
    /// A prior attempt started too recently.
    RateLimited,
    /// Another drain owns the lock (cross-tab or in-process). A normal
    /// abort, not a failure.
    LockContention,
    /// Shared setup failed (store unavailable, session rejected). The
    /// attempt aborted cleanly and the queue is untouched.
    Faulted(String),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DrainReport {
    /// Entries confirmed by the backend and removed from the queue.
    pub succeeded: usize,
    /// Entries that failed transiently and were retained for retry.
    pub failed: usize,
    /// Entries dropped as unrecoverable (terminal rejections).
    pub dropped: usize,
    /// Entries still queued after the pass.
    pub remaining: usize,
}

struct ReplayFailure {
    message: String,
    terminal: bool,
}

impl ReplayFailure {
    fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            terminal: false,
        }
    }

    fn terminal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            terminal: true,
        }
    }
}

impl From<RemoteError> for ReplayFailure {
    fn from(error: RemoteError) -> Self {
        Self {
            terminal: error.is_terminal(),
            message: error.to_string(),
        }
    }
}

pub struct SyncEngine {
    store: Arc<LocalStore>,
    queue: Arc<MutationQueue>,
    backend: Arc<dyn RowBackend>,
    status: Arc<StatusBroadcaster>,
    connectivity: Arc<Connectivity>,
    bus: Arc<NoticeBus>,
    lock: SyncLock,
    drain_gate: async_lock::Mutex<()>,
    rate_limit: chrono::Duration,
    max_entry_age_hours: i64,
}

impl SyncEngine {
    pub fn new(
        store: Arc<LocalStore>,
        queue: Arc<MutationQueue>,
        backend: Arc<dyn RowBackend>,
        status: Arc<StatusBroadcaster>,
        connectivity: Arc<Connectivity>,
        bus: Arc<NoticeBus>,
        config: &SyncConfig,
    ) -> Self {
        let suffix: String = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(|c| (c as char).to_ascii_lowercase())
            .collect();
        let owner = format!("drain-{suffix}");

        Self {
            lock: SyncLock::new(store.clone(), owner, config.lock_ttl),
            store,
            queue,
            backend,
            status,
            connectivity,
            bus,
            drain_gate: async_lock::Mutex::new(()),
            rate_limit: config.rate_limit,
            max_entry_age_hours: config.max_entry_age_hours,
        }
    }

    pub fn owner(&self) -> &str {
        self.lock.owner()
    }

    /// Registers a connectivity listener that kicks off a drain whenever
    /// the engine comes back online. The subscription must be kept alive
    /// by the caller.
    pub fn spawn_on_reconnect(self: &Arc<Self>) -> ConnectivitySubscription {
        let weak = Arc::downgrade(self);
        self.connectivity.subscribe(Arc::new(move |online| {
            if !online {
                return;
            }
            let Some(engine) = weak.upgrade() else {
                return;
            };
            log::info!("back online, scheduling drain");
            runtime::spawn_detached(async move {
                let _ = engine.drain().await;
            });
        }))
    }

    /// Runs one drain attempt. All failure modes are contained: the
    /// outcome reports what happened, nothing propagates to the caller.
    pub async fn drain(&self) -> DrainOutcome {
        if !self.connectivity.is_online() {
            log::debug!("drain skipped: offline");
            return DrainOutcome::Skipped(SkipReason::Offline);
        }

        // In-process serialization; the store-backed lock below covers
        // sibling tabs and processes.
        let Some(_gate) = self.drain_gate.try_lock() else {
            log::debug!("drain skipped: already draining in this process");
            return DrainOutcome::Skipped(SkipReason::LockContention);
        };

        match self.rate_limited().await {
            Ok(true) => {
                log::info!("drain skipped: a prior attempt started too recently");
                return DrainOutcome::Skipped(SkipReason::RateLimited);
            }
            Ok(false) => {}
            Err(message) => return DrainOutcome::Skipped(SkipReason::Faulted(message)),
        }

        log::debug!("drain phase: locking");
        match self.lock.try_claim().await {
            Ok(true) => {}
            Ok(false) => return DrainOutcome::Skipped(SkipReason::LockContention),
            Err(err) => {
                log::error!("failed to claim drain lock: {err}");
                return DrainOutcome::Skipped(SkipReason::Faulted(err.to_string()));
            }
        }

        self.bus.publish(DrainNotice::Started {
            owner: self.owner().to_string(),
        });
        self.status.set_syncing(true);

        let outcome = self.run_pass().await;

        // The lock is released in every exit path, success or not; a
        // stale, unrecoverable lock is the one thing this engine must
        // never leave behind.
        self.status.set_syncing(false);
        if let Err(err) = self.lock.release().await {
            log::error!("failed to release drain lock: {err}");
        }
        self.bus.publish(DrainNotice::Ended {
            owner: self.owner().to_string(),
        });

        outcome
    }

    async fn rate_limited(&self) -> Result<bool, String> {
        let last: Option<DateTime<Utc>> = self
            .store
            .get_meta(LAST_ATTEMPT_META)
            .await
            .map_err(|err| err.to_string())?;
        if let Some(last) = last {
            if Utc::now() - last < self.rate_limit {
                return Ok(true);
            }
        }
        self.store
            .set_meta(LAST_ATTEMPT_META, &Utc::now())
            .await
            .map_err(|err| err.to_string())?;
        Ok(false)
    }

    async fn run_pass(&self) -> DrainOutcome {
        // Session validity is a shared precondition: replaying against a
        // dead session would fail every entry, so the attempt aborts
        // cleanly instead.
        if let Err(err) = self.backend.refresh_session().await {
            log::error!("session refresh failed, aborting drain: {err}");
            self.status.record_sync_error(err.to_string());
            return DrainOutcome::Skipped(SkipReason::Faulted(err.to_string()));
        }

        // Pre-flush hygiene: age out stale entries, drop updates whose
        // target no longer exists remotely.
        if let Err(err) = self.queue.prune_older_than(self.max_entry_age_hours).await {
            log::error!("age pruning failed, aborting drain: {err}");
            return DrainOutcome::Skipped(SkipReason::Faulted(err.to_string()));
        }
        if let Err(err) = self.queue.prune_orphaned(self.backend.as_ref()).await {
            log::error!("orphan pruning failed, aborting drain: {err}");
            return DrainOutcome::Skipped(SkipReason::Faulted(err.to_string()));
        }

        let mut entries = match self.queue.read_all().await {
            Ok(entries) => entries,
            Err(err) => {
                log::error!("failed to read mutation queue, aborting drain: {err}");
                self.status.record_sync_error(err.to_string());
                return DrainOutcome::Skipped(SkipReason::Faulted(err.to_string()));
            }
        };

        if entries.is_empty() {
            // Draining an empty queue is a no-op that still counts as a
            // successful sync.
            self.finish_pass(None).await;
            return DrainOutcome::Completed(DrainReport::default());
        }

        log::debug!("drain phase: draining {} entries", entries.len());
        entries.sort_by_key(|entry| entry.submitted_at);

        let mut id_map: HashMap<String, String> = HashMap::new();
        let mut survivors: Vec<QueueEntry> = Vec::new();
        let mut report = DrainReport::default();
        let mut last_error: Option<String> = None;

        for mut entry in entries {
            match self.replay_entry(&entry, &mut id_map).await {
                Ok(()) => {
                    log::info!(
                        "synced {:?} {:?} ({})",
                        entry.mutation.operation(),
                        entry.mutation.entity_kind(),
                        entry.id
                    );
                    report.succeeded += 1;
                }
                Err(failure) if failure.terminal => {
                    log::error!(
                        "dropping queue entry '{}': terminal rejection: {}",
                        entry.id,
                        failure.message
                    );
                    last_error = Some(failure.message);
                    report.dropped += 1;
                }
                Err(failure) => {
                    log::warn!(
                        "queue entry '{}' failed, retaining for retry: {}",
                        entry.id,
                        failure.message
                    );
                    entry.last_error = Some(failure.message.clone());
                    last_error = Some(failure.message);
                    survivors.push(entry);
                    report.failed += 1;
                }
            }
        }

        log::debug!("drain phase: reconciling");
        report.remaining = survivors.len();
        if let Err(err) = self.queue.replace_all(&survivors).await {
            log::error!("failed to persist surviving queue entries: {err}");
            last_error = Some(err.to_string());
        }

        self.finish_pass(last_error).await;

        // Converge every cached view on server truth, including ids
        // assigned during this pass.
        if let Err(err) = cache::refresh_all(&self.store, self.backend.as_ref()).await {
            log::warn!("post-drain snapshot refresh failed: {err}");
        }

        log::info!(
            "drain complete: {} synced, {} retained, {} dropped, {} remaining",
            report.succeeded,
            report.failed,
            report.dropped,
            report.remaining
        );
        DrainOutcome::Completed(report)
    }

    async fn finish_pass(&self, last_error: Option<String>) {
        let completed_at = Utc::now();
        if let Err(err) = self.store.set_meta(LAST_SYNC_META, &completed_at).await {
            log::warn!("failed to persist last sync time: {err}");
        }
        self.status.record_sync_success(completed_at);
        if let Some(message) = last_error {
            self.status.record_sync_error(message);
        }
    }

    async fn replay_entry(
        &self,
        entry: &QueueEntry,
        id_map: &mut HashMap<String, String>,
    ) -> Result<(), ReplayFailure> {
        let table = entry.mutation.entity_kind().table_name();

        match &entry.mutation {
            Mutation::AddShipment { shipment } => {
                let mut row = to_row(shipment)?;
                if let Some(map) = row.as_object_mut() {
                    // The backend assigns the real identifier; the
                    // placeholder and the pending marker never leave the
                    // device.
                    map.remove("id");
                    map.remove("pending_sync");
                }

                let persisted = self.backend.insert(table, row).await?;

                if let Some(placeholder) = entry.mutation.local_placeholder() {
                    match persisted.get("id").and_then(|id| id.as_str()) {
                        Some(server_id) => {
                            id_map.insert(placeholder.as_str().to_string(), server_id.to_string());
                        }
                        None => log::warn!(
                            "insert into '{table}' returned no id; dependent updates cannot be remapped"
                        ),
                    }
                }
                Ok(())
            }
            Mutation::UpdateShipment { target, changes } => {
                let id = resolve_id(target, id_map)?;
                self.apply_update(table, &id, to_row(changes)?).await
            }
            Mutation::CreateInstallment { installment } => {
                let mut row = to_row(installment)?;
                if installment.shipment_id.is_local() {
                    let shipment_id = resolve_id(&installment.shipment_id, id_map)?;
                    row["shipment_id"] = JsonValue::String(shipment_id);
                }
                self.backend.insert(table, row).await?;
                Ok(())
            }
            Mutation::UpdateInstallment { target, changes } => {
                let id = resolve_id(target, id_map)?;
                self.apply_update(table, &id, to_row(changes)?).await
            }
            Mutation::AddInstallmentPayment { payment } => {
                let mut row = to_row(payment)?;
                if payment.installment_id.is_local() {
                    let installment_id = resolve_id(&payment.installment_id, id_map)?;
                    row["installment_id"] = JsonValue::String(installment_id);
                }
                self.backend.insert(table, row).await?;
                Ok(())
            }
            Mutation::UpdateInstallmentPayment { target, changes } => {
                let id = resolve_id(target, id_map)?;
                self.apply_update(table, &id, to_row(changes)?).await
            }
        }
    }

    async fn apply_update(
        &self,
        table: &str,
        id: &str,
        changes: JsonValue,
    ) -> Result<(), ReplayFailure> {
        let rows = self.backend.update(table, id, changes).await?;
        if rows.is_empty() {
            // Integrity signal: the target vanished between enqueue and
            // replay. Retained here; the orphan sweep owns the drop.
            return Err(ReplayFailure::transient(format!(
                "update of '{table}' row '{id}' touched zero rows"
            )));
        }
        Ok(())
    }
}

fn to_row<T: Serialize>(value: &T) -> Result<JsonValue, ReplayFailure> {
    serde_json::to_value(value)
        .map_err(|err| ReplayFailure::terminal(format!("failed to serialize payload: {err}")))
}

fn resolve_id(
    target: &RecordId,
    id_map: &HashMap<String, String>,
) -> Result<String, ReplayFailure> {
    match target {
        RecordId::Server(id) => Ok(id.clone()),
        RecordId::Local(id) => match id_map.get(id) {
            Some(server_id) => Ok(server_id.clone()),
            // The Create this entry depends on has not succeeded yet;
            // the entry can only be replayed after it does.
            None => Err(ReplayFailure::transient(format!(
                "placeholder '{id}' has no server identifier yet"
            ))),
        },
    }
}
