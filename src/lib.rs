//! Offline-first mutation queue and synchronization engine for the
//! shipment tracking dashboard.
//!
//! The dashboard keeps working while disconnected: edits are captured as
//! queue entries, sealed at rest, and replayed against the remote row
//! store exactly once, in submission order, when connectivity returns —
//! even with several tabs racing to sync at the same time.
//!
//! The host wires a [`store::StorageEngine`] and a
//! [`remote::RowBackend`] into [`api::SyncService`] and interacts with
//! that facade alone:
//!
//! ```no_run
//! use std::sync::Arc;
//! use shipsync::api::SyncService;
//! use shipsync::config::SyncConfig;
//! use shipsync::remote::{RestOptions, RestRowBackend};
//! use shipsync::store::FileEngine;
//!
//! let storage = Arc::new(FileEngine::new("data/shipsync.json".into()).unwrap());
//! let backend = Arc::new(RestRowBackend::new(RestOptions::new(
//!     "https://acme.example.co/rest/v1/".parse().unwrap(),
//!     "anon-key",
//! )));
//! let service = SyncService::new(storage, backend, SyncConfig::default());
//! service.trigger_drain_now();
//! ```

pub mod api;
pub mod cipher;
pub mod config;
pub mod platform;
pub mod queue;
pub mod remote;
pub mod status;
pub mod store;
pub mod sync;

#[cfg(test)]
pub mod test_support;

pub use api::SyncService;
pub use config::SyncConfig;
pub use status::SyncStatus;
