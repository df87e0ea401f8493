//! In-memory [`RemoteGateway`] implementation.
//!
//! Backs the test suites and offline development.  Besides plain storage it
//! can inject the behaviors the cache has to cope with in production:
//! slow responses (the rows are captured *before* the delay, so a late reply
//! carries stale data), one-shot failures, and change-notification fan-out
//! on every write.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::gateway::{AuthIdentity, GatewayError, Order, Query, RemoteGateway, Row};
use crate::tables::{ChangeEvent, ChangeKind, Table};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

#[derive(Default)]
struct Inner {
    tables: HashMap<Table, Vec<Row>>,
    fetch_delay: HashMap<Table, Duration>,
    fail_next: HashSet<Table>,
    fetch_calls: HashMap<Table, u32>,
    identity: Option<AuthIdentity>,
}

/// In-memory backend with test-support controls.
pub struct MemoryGateway {
    inner: Mutex<Inner>,
    channels: Mutex<HashMap<Table, broadcast::Sender<ChangeEvent>>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the contents of `table`.
    pub fn seed(&self, table: Table, rows: Vec<Row>) {
        self.inner
            .lock()
            .expect("gateway lock poisoned")
            .tables
            .insert(table, rows);
    }

    /// Sign in a fake identity.
    pub fn set_identity(&self, identity: Option<AuthIdentity>) {
        self.inner.lock().expect("gateway lock poisoned").identity = identity;
    }

    /// Delay every subsequent fetch of `table` by `delay`.
    ///
    /// The rows are snapshotted when the fetch is issued, so a delayed
    /// response delivers the data as it was at request time — exactly the
    /// slow-stale-response scenario the cache's sequence guard exists for.
    pub fn set_fetch_delay(&self, table: Table, delay: Duration) {
        self.inner
            .lock()
            .expect("gateway lock poisoned")
            .fetch_delay
            .insert(table, delay);
    }

    /// Make the next operation touching `table` fail with a backend error.
    pub fn fail_next(&self, table: Table) {
        self.inner
            .lock()
            .expect("gateway lock poisoned")
            .fail_next
            .insert(table);
    }

    /// How many times `table` has been fetched.
    pub fn fetch_count(&self, table: Table) -> u32 {
        self.inner
            .lock()
            .expect("gateway lock poisoned")
            .fetch_calls
            .get(&table)
            .copied()
            .unwrap_or(0)
    }

    fn sender(&self, table: Table) -> broadcast::Sender<ChangeEvent> {
        self.channels
            .lock()
            .expect("gateway lock poisoned")
            .entry(table)
            .or_insert_with(|| broadcast::channel(CHANGE_CHANNEL_CAPACITY).0)
            .clone()
    }

    fn emit(&self, table: Table, kind: ChangeKind, row: Option<Row>) {
        // Nobody listening is fine.
        let _ = self.sender(table).send(ChangeEvent { table, kind, row });
    }

    fn take_failure(inner: &mut Inner, table: Table) -> Result<(), GatewayError> {
        if inner.fail_next.remove(&table) {
            return Err(GatewayError::Backend(format!(
                "injected failure on {table}"
            )));
        }
        Ok(())
    }
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteGateway for MemoryGateway {
    async fn fetch_table(&self, table: Table, query: Query) -> Result<Vec<Row>, GatewayError> {
        let (mut rows, delay) = {
            let mut inner = self.inner.lock().expect("gateway lock poisoned");
            *inner.fetch_calls.entry(table).or_insert(0) += 1;
            Self::take_failure(&mut inner, table)?;
            let rows = inner.tables.get(&table).cloned().unwrap_or_default();
            let delay = inner.fetch_delay.get(&table).copied().unwrap_or_default();
            (rows, delay)
        };

        rows.retain(|row| {
            query
                .filters
                .iter()
                .all(|(column, value)| row.get(column) == Some(value))
        });

        if let Some((column, order)) = &query.order {
            rows.sort_by(|a, b| {
                let ordering = cmp_values(a.get(column), b.get(column));
                match order {
                    Order::Ascending => ordering,
                    Order::Descending => ordering.reverse(),
                }
            });
        }

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        Ok(rows)
    }

    async fn insert(&self, table: Table, mut row: Row) -> Result<Row, GatewayError> {
        let stored = {
            let mut inner = self.inner.lock().expect("gateway lock poisoned");
            Self::take_failure(&mut inner, table)?;

            let object = row
                .as_object_mut()
                .ok_or_else(|| GatewayError::Serde("row is not an object".into()))?;
            let has_id = object
                .get("id")
                .and_then(Value::as_str)
                .is_some_and(|id| !id.is_empty());
            if !has_id {
                object.insert("id".into(), Value::String(uuid::Uuid::new_v4().to_string()));
            }

            inner.tables.entry(table).or_default().push(row.clone());
            row
        };

        self.emit(table, ChangeKind::Insert, Some(stored.clone()));
        Ok(stored)
    }

    async fn update(&self, table: Table, id: &str, patch: Row) -> Result<Row, GatewayError> {
        let updated = {
            let mut inner = self.inner.lock().expect("gateway lock poisoned");
            Self::take_failure(&mut inner, table)?;

            let rows = inner.tables.entry(table).or_default();
            let row = rows
                .iter_mut()
                .find(|row| row.get("id").and_then(Value::as_str) == Some(id))
                .ok_or_else(|| GatewayError::NotFound {
                    table,
                    id: id.to_string(),
                })?;

            merge_patch(row, &patch)?;
            row.clone()
        };

        self.emit(table, ChangeKind::Update, Some(updated.clone()));
        Ok(updated)
    }

    async fn upsert(
        &self,
        table: Table,
        row: Row,
        conflict_keys: &[&str],
    ) -> Result<Row, GatewayError> {
        let (stored, kind) = {
            let mut inner = self.inner.lock().expect("gateway lock poisoned");
            Self::take_failure(&mut inner, table)?;

            let rows = inner.tables.entry(table).or_default();
            let existing = rows.iter_mut().find(|candidate| {
                conflict_keys
                    .iter()
                    .all(|key| candidate.get(*key) == row.get(*key))
            });

            match existing {
                Some(slot) => {
                    merge_patch(slot, &row)?;
                    (slot.clone(), ChangeKind::Update)
                }
                None => {
                    rows.push(row.clone());
                    (row, ChangeKind::Insert)
                }
            }
        };

        self.emit(table, kind, Some(stored.clone()));
        Ok(stored)
    }

    async fn delete(&self, table: Table, id: &str) -> Result<(), GatewayError> {
        {
            let mut inner = self.inner.lock().expect("gateway lock poisoned");
            Self::take_failure(&mut inner, table)?;

            let rows = inner.tables.entry(table).or_default();
            let before = rows.len();
            rows.retain(|row| row.get("id").and_then(Value::as_str) != Some(id));
            if rows.len() == before {
                return Err(GatewayError::NotFound {
                    table,
                    id: id.to_string(),
                });
            }
        }

        self.emit(table, ChangeKind::Delete, None);
        Ok(())
    }

    fn subscribe(&self, table: Table) -> broadcast::Receiver<ChangeEvent> {
        self.sender(table).subscribe()
    }

    async fn authenticated_identity(&self) -> Result<Option<AuthIdentity>, GatewayError> {
        Ok(self
            .inner
            .lock()
            .expect("gateway lock poisoned")
            .identity
            .clone())
    }
}

/// Overlay `patch`'s keys onto `target`.  Explicit nulls clear the column,
/// matching the backend's update semantics.
fn merge_patch(target: &mut Row, patch: &Row) -> Result<(), GatewayError> {
    let patch = patch
        .as_object()
        .ok_or_else(|| GatewayError::Serde("patch is not an object".into()))?;
    let target = target
        .as_object_mut()
        .ok_or_else(|| GatewayError::Serde("stored row is not an object".into()))?;
    for (key, value) in patch {
        target.insert(key.clone(), value.clone());
    }
    Ok(())
}

fn cmp_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => {
            if let (Some(a), Some(b)) = (a.as_f64(), b.as_f64()) {
                a.partial_cmp(&b).unwrap_or(Ordering::Equal)
            } else if let (Some(a), Some(b)) = (a.as_str(), b.as_str()) {
                a.cmp(b)
            } else {
                Ordering::Equal
            }
        }
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}
