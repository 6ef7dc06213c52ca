use std::time::Duration;

/// Tuning knobs for the sync core, injected at construction.
///
/// The defaults match production behavior; tests shrink the windows to
/// keep runs fast.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Timeout budget for snapshot-store operations.
    pub store_budget: Duration,
    /// Timeout budget for mutation-queue operations. Longer than the
    /// snapshot budget: queue writes are correctness-sensitive, not
    /// latency-sensitive.
    pub queue_budget: Duration,
    /// Minimum spacing between drain attempt starts, shared across tabs.
    pub rate_limit: chrono::Duration,
    /// Age after which a drain lock token is considered abandoned.
    pub lock_ttl: chrono::Duration,
    /// Queue entries older than this are removed by the cleanup sweep.
    pub max_entry_age_hours: i64,
    /// Age after which the data-at-rest key is rotated.
    pub key_max_age: chrono::Duration,
    /// Connectivity assumption before the host reports a real value.
    pub initially_online: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            store_budget: Duration::from_secs(5),
            queue_budget: Duration::from_secs(10),
            rate_limit: chrono::Duration::seconds(30),
            lock_ttl: chrono::Duration::seconds(30),
            max_entry_age_hours: 168,
            key_max_age: chrono::Duration::days(30),
            initially_online: true,
        }
    }
}
