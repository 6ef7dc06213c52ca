//! One-time migration from the legacy single-document storage layout.
//!
//! Earlier releases kept everything in one flat key/value dump with
//! `shipmentTracker_`-prefixed keys. This imports that dump into the
//! per-entity collections and marks the store migrated so the import
//! never runs twice.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono::Utc;
use serde_json::Value as JsonValue;

use super::error::{engine_error, StoreResult};
use super::{collections, LocalStore, StoredRecord};

pub const MIGRATION_FLAG: &str = "migrated_from_legacy";
pub const MIGRATION_TIMESTAMP: &str = "migration_timestamp";

const LEGACY_PREFIX: &str = "shipmentTracker_";

const LEGACY_COLLECTIONS: [(&str, &str); 8] = [
    ("users", collections::USERS),
    ("products", collections::PRODUCTS),
    ("drivers", collections::DRIVERS),
    ("regions", collections::REGIONS),
    ("shipments", collections::SHIPMENTS),
    ("productPrices", collections::PRODUCT_PRICES),
    ("notifications", collections::NOTIFICATIONS),
    ("mutationQueue", collections::MUTATION_QUEUE),
];

/// Imports a legacy dump if present and not yet migrated. Returns whether
/// the import ran.
pub async fn migrate_legacy_file(store: &LocalStore, legacy_path: &Path) -> StoreResult<bool> {
    if store.get_meta::<bool>(MIGRATION_FLAG).await?.unwrap_or(false) {
        log::debug!("legacy migration already completed");
        return Ok(false);
    }
    if !legacy_path.exists() {
        // Nothing to import; still set the flag so we never look again.
        store.set_meta(MIGRATION_FLAG, &true).await?;
        return Ok(false);
    }

    log::info!("migrating legacy store from {}", legacy_path.display());

    let data = fs::read(legacy_path)
        .map_err(|err| engine_error(format!("failed to read legacy dump: {err}")))?;
    let dump: HashMap<String, JsonValue> = serde_json::from_slice(&data)
        .map_err(|err| engine_error(format!("failed to parse legacy dump: {err}")))?;

    for (legacy_name, collection) in LEGACY_COLLECTIONS {
        let key = format!("{LEGACY_PREFIX}{legacy_name}");
        let Some(JsonValue::Array(items)) = dump.get(&key) else {
            continue;
        };

        let mut records = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let key = item
                .get("id")
                .and_then(|id| id.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| format!("legacy-{index}"));
            records.push(StoredRecord::new(key, item.clone()));
        }
        let count = records.len();
        store.replace_all(collection, records).await?;
        log::info!("migrated {count} legacy records into '{collection}'");
    }

    // Loose settings keys move into the settings collection unchanged.
    for (key, value) in &dump {
        if key.starts_with(LEGACY_PREFIX) {
            continue;
        }
        store
            .put(collections::SETTINGS, StoredRecord::new(key.clone(), value.clone()))
            .await?;
    }

    store.set_meta(MIGRATION_FLAG, &true).await?;
    store
        .set_meta(MIGRATION_TIMESTAMP, &Utc::now().to_rfc3339())
        .await?;

    Ok(true)
}
