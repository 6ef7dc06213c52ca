//! Shared helpers for unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use serde_json::Value as JsonValue;

use crate::remote::{transport_error, Filter, RemoteError, RemoteResult, RowBackend};

/// What a test backend observed, in call order.
#[derive(Clone, Debug, PartialEq)]
pub enum RecordedCall {
    Insert { table: String, row: JsonValue },
    Update { table: String, id: String, changes: JsonValue },
    Delete { table: String, id: String },
    Select { table: String },
}

#[derive(Default)]
struct Failures {
    insert: Option<RemoteError>,
    update: Option<RemoteError>,
}

/// In-memory [`RowBackend`] with scripted failures and call recording.
///
/// Inserts assign sequential `srv-N` identifiers, mirroring the real
/// backend's role as the arbiter of ids.
pub struct MockBackend {
    rows: Mutex<std::collections::HashMap<String, Vec<JsonValue>>>,
    calls: Mutex<Vec<RecordedCall>>,
    failures: Mutex<Failures>,
    fail_selects: AtomicBool,
    fail_session: AtomicBool,
    next_id: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(std::collections::HashMap::new()),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(Failures::default()),
            fail_selects: AtomicBool::new(false),
            fail_session: AtomicBool::new(false),
            next_id: AtomicUsize::new(1),
        }
    }

    pub fn seed_row(&self, table: &str, row: JsonValue) {
        self.rows
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn rows_in(&self, table: &str) -> Vec<JsonValue> {
        self.rows
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn fail_inserts_with(&self, error: RemoteError) {
        self.failures.lock().unwrap().insert = Some(error);
    }

    pub fn fail_updates_with(&self, error: RemoteError) {
        self.failures.lock().unwrap().update = Some(error);
    }

    pub fn fail_selects(&self) {
        self.fail_selects.store(true, Ordering::SeqCst);
    }

    pub fn fail_session_refresh(&self) {
        self.fail_session.store(true, Ordering::SeqCst);
    }

    pub fn clear_failures(&self) {
        *self.failures.lock().unwrap() = Failures::default();
        self.fail_selects.store(false, Ordering::SeqCst);
        self.fail_session.store(false, Ordering::SeqCst);
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl RowBackend for MockBackend {
    async fn insert(&self, table: &str, row: JsonValue) -> RemoteResult<JsonValue> {
        self.calls.lock().unwrap().push(RecordedCall::Insert {
            table: table.to_string(),
            row: row.clone(),
        });

        if let Some(error) = self.failures.lock().unwrap().insert.clone() {
            return Err(error);
        }

        let id = format!("srv-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut persisted = row;
        if let Some(map) = persisted.as_object_mut() {
            map.insert("id".to_string(), JsonValue::String(id));
        }
        self.rows
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(persisted.clone());
        Ok(persisted)
    }

    async fn update(
        &self,
        table: &str,
        id: &str,
        changes: JsonValue,
    ) -> RemoteResult<Vec<JsonValue>> {
        self.calls.lock().unwrap().push(RecordedCall::Update {
            table: table.to_string(),
            id: id.to_string(),
            changes: changes.clone(),
        });

        if let Some(error) = self.failures.lock().unwrap().update.clone() {
            return Err(error);
        }

        let mut rows = self.rows.lock().unwrap();
        let Some(table_rows) = rows.get_mut(table) else {
            return Ok(Vec::new());
        };
        let mut affected = Vec::new();
        for row in table_rows.iter_mut() {
            if row.get("id").and_then(|value| value.as_str()) == Some(id) {
                if let (Some(target), Some(source)) = (row.as_object_mut(), changes.as_object()) {
                    for (key, value) in source {
                        target.insert(key.clone(), value.clone());
                    }
                }
                affected.push(row.clone());
            }
        }
        Ok(affected)
    }

    async fn delete(&self, table: &str, id: &str) -> RemoteResult<()> {
        self.calls.lock().unwrap().push(RecordedCall::Delete {
            table: table.to_string(),
            id: id.to_string(),
        });

        let mut rows = self.rows.lock().unwrap();
        if let Some(table_rows) = rows.get_mut(table) {
            table_rows.retain(|row| row.get("id").and_then(|value| value.as_str()) != Some(id));
        }
        Ok(())
    }

    async fn select(&self, table: &str, filter: Option<&Filter>) -> RemoteResult<Vec<JsonValue>> {
        self.calls.lock().unwrap().push(RecordedCall::Select {
            table: table.to_string(),
        });

        if self.fail_selects.load(Ordering::SeqCst) {
            return Err(transport_error("scripted select failure"));
        }

        let rows = self.rows.lock().unwrap();
        let table_rows = rows.get(table).cloned().unwrap_or_default();
        Ok(match filter {
            None => table_rows,
            Some(filter) => table_rows
                .into_iter()
                .filter(|row| {
                    row.get(&filter.column).and_then(|value| value.as_str())
                        == Some(filter.equals.as_str())
                })
                .collect(),
        })
    }

    async fn refresh_session(&self) -> RemoteResult<()> {
        if self.fail_session.load(Ordering::SeqCst) {
            return Err(transport_error("scripted session failure"));
        }
        Ok(())
    }
}
