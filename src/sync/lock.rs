//! Cross-process advisory drain lock.
//!
//! The token lives in the shared store's metadata area, so every tab (or
//! process) of the same deployment sees it. This is an advisory lock
//! with timestamp expiry, not a true distributed lock: the store offers
//! read-check-write, and between the read and the write another claimant
//! can slip in. The window is small and the worst case is a duplicate
//! drain attempt serialized by the backend; the mutual-exclusion test
//! documents the residual race explicitly.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{LocalStore, StoreResult};

pub const LOCK_META: &str = "sync_lock";

/// Token representing "a drain is in progress", owned by whichever
/// claimant wrote it. Self-expires so a crashed holder cannot wedge the
/// queue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LockToken {
    pub owner: String,
    pub acquired_at: DateTime<Utc>,
}

pub struct SyncLock {
    store: Arc<LocalStore>,
    owner: String,
    ttl: Duration,
}

impl SyncLock {
    pub fn new(store: Arc<LocalStore>, owner: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            owner: owner.into(),
            ttl,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Attempts to claim the drain lock. A live token held by someone
    /// else loses the claim; a stale token (older than the TTL) or our
    /// own leftover token is overwritten.
    pub async fn try_claim(&self) -> StoreResult<bool> {
        if let Some(token) = self.store.get_meta::<LockToken>(LOCK_META).await? {
            let age = Utc::now() - token.acquired_at;
            if token.owner != self.owner && age < self.ttl {
                log::info!(
                    "drain lock held by '{}' for {}s; skipping",
                    token.owner,
                    age.num_seconds()
                );
                return Ok(false);
            }
            if token.owner != self.owner {
                log::warn!(
                    "overriding stale drain lock from '{}' ({}s old)",
                    token.owner,
                    age.num_seconds()
                );
            }
        }

        self.store
            .set_meta(
                LOCK_META,
                &LockToken {
                    owner: self.owner.clone(),
                    acquired_at: Utc::now(),
                },
            )
            .await?;
        Ok(true)
    }

    /// Releases the lock, but only if we still own it. A slow holder
    /// whose token already expired must not clobber a newer owner's
    /// token.
    pub async fn release(&self) -> StoreResult<()> {
        match self.store.get_meta::<LockToken>(LOCK_META).await? {
            Some(token) if token.owner == self.owner => {
                self.store.delete_meta(LOCK_META).await
            }
            Some(token) => {
                log::warn!(
                    "not releasing drain lock: now owned by '{}'",
                    token.owner
                );
                Ok(())
            }
            None => Ok(()),
        }
    }
}
