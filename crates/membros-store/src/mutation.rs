//! Optimistic mutations: apply locally, confirm remotely, roll back on
//! failure.
//!
//! The engine is generic over a [`Record`]: anything that knows its table,
//! its identity key, its mapper pair and which [`Snapshot`] slice it lives
//! in.  Rollback is entity-granular — only the touched entity is restored
//! from the pre-mutation snapshot, so concurrent mutations on other
//! identities survive a failure unharmed.

use std::sync::RwLock;

use serde_json::Value;

use membros_gateway::{RemoteGateway, Row, Table};
use membros_shared::models::*;

use crate::cache::Slot;
use crate::error::{MappingError, Result, StoreError};
use crate::mappers;
use crate::snapshot::Snapshot;

// ---------------------------------------------------------------------------
// Public surface
// ---------------------------------------------------------------------------

/// One write against a single table.
#[derive(Debug, Clone)]
pub enum Op {
    /// Insert a new row.  The row may omit its id; the backend assigns one
    /// and the optimistic placeholder is replaced on confirmation.
    Insert { row: Row },
    /// Patch the entity with identity `id`.
    Update { id: String, patch: Row },
    /// Insert-or-replace keyed on the entity's conflict columns.
    Upsert { row: Row },
    /// Delete the entity with identity `id`.
    Delete { id: String },
}

/// A table plus the operation to run against it.
#[derive(Debug, Clone)]
pub struct Mutation {
    pub table: Table,
    pub op: Op,
}

impl Mutation {
    pub fn insert(table: Table, row: Row) -> Self {
        Self {
            table,
            op: Op::Insert { row },
        }
    }

    pub fn update(table: Table, id: impl Into<String>, patch: Row) -> Self {
        Self {
            table,
            op: Op::Update {
                id: id.into(),
                patch,
            },
        }
    }

    pub fn upsert(table: Table, row: Row) -> Self {
        Self {
            table,
            op: Op::Upsert { row },
        }
    }

    pub fn delete(table: Table, id: impl Into<String>) -> Self {
        Self {
            table,
            op: Op::Delete { id: id.into() },
        }
    }
}

// ---------------------------------------------------------------------------
// Record: what the generic engine needs from an entity kind
// ---------------------------------------------------------------------------

pub(crate) trait Record: Clone + Sized {
    const TABLE: Table;
    /// Columns the backend keys upserts on.
    const CONFLICT_KEYS: &'static [&'static str];

    fn from_row(row: &Row) -> std::result::Result<Self, MappingError>;
    fn to_row(&self) -> Row;
    /// Identity within the snapshot slice.
    fn key(&self) -> String;
    fn slice(snapshot: &Snapshot) -> &Vec<Self>;
    fn slice_mut(snapshot: &mut Snapshot) -> &mut Vec<Self>;
}

macro_rules! id_record {
    ($entity:ty, $table:expr, $from:path, $to:path, $slice:ident) => {
        impl Record for $entity {
            const TABLE: Table = $table;
            const CONFLICT_KEYS: &'static [&'static str] = &["id"];

            fn from_row(row: &Row) -> std::result::Result<Self, MappingError> {
                $from(row)
            }

            fn to_row(&self) -> Row {
                $to(self)
            }

            fn key(&self) -> String {
                self.id.clone()
            }

            fn slice(snapshot: &Snapshot) -> &Vec<Self> {
                &snapshot.$slice
            }

            fn slice_mut(snapshot: &mut Snapshot) -> &mut Vec<Self> {
                &mut snapshot.$slice
            }
        }
    };
}

id_record!(
    Category,
    Table::Categories,
    mappers::category_from_row,
    mappers::category_to_row,
    categories
);
id_record!(
    Course,
    Table::Courses,
    mappers::course_from_row,
    mappers::course_to_row,
    courses
);
id_record!(
    Module,
    Table::Modules,
    mappers::module_from_row,
    mappers::module_to_row,
    modules
);
id_record!(
    Lesson,
    Table::Lessons,
    mappers::lesson_from_row,
    mappers::lesson_to_row,
    lessons
);
id_record!(
    Post,
    Table::Posts,
    mappers::post_from_row,
    mappers::post_to_row,
    posts
);
id_record!(
    Offer,
    Table::Offers,
    mappers::offer_from_row,
    mappers::offer_to_row,
    offers
);
id_record!(
    User,
    Table::Profiles,
    mappers::user_from_row,
    mappers::user_to_row,
    profiles
);

impl Record for LessonProgress {
    const TABLE: Table = Table::UserProgress;
    const CONFLICT_KEYS: &'static [&'static str] = &["user_id", "lesson_id"];

    fn from_row(row: &Row) -> std::result::Result<Self, MappingError> {
        mappers::progress_from_row(row)
    }

    fn to_row(&self) -> Row {
        mappers::progress_to_row(self)
    }

    fn key(&self) -> String {
        format!("{}:{}", self.user_id, self.lesson_id)
    }

    fn slice(snapshot: &Snapshot) -> &Vec<Self> {
        &snapshot.progress
    }

    fn slice_mut(snapshot: &mut Snapshot) -> &mut Vec<Self> {
        &mut snapshot.progress
    }
}

// ---------------------------------------------------------------------------
// Snapshot surgery
// ---------------------------------------------------------------------------

fn set_in<R: Record>(snapshot: &mut Snapshot, entity: R) {
    let key = entity.key();
    let slice = R::slice_mut(snapshot);
    match slice.iter_mut().find(|e| e.key() == key) {
        Some(slot) => *slot = entity,
        None => slice.push(entity),
    }
}

fn remove_in<R: Record>(snapshot: &mut Snapshot, key: &str) {
    R::slice_mut(snapshot).retain(|e| e.key() != key);
}

/// Restore one entity's state from `pre`: put it back if it existed, remove
/// it if it did not.
fn restore_in<R: Record>(snapshot: &mut Snapshot, pre: &Snapshot, key: &str) {
    match R::slice(pre).iter().find(|e| e.key() == key) {
        Some(entity) => set_in(snapshot, entity.clone()),
        None => remove_in::<R>(snapshot, key),
    }
}

/// Publish a derived snapshot: clone the current one, mutate the clone,
/// re-normalize, swap.  Readers never see the intermediate state.
fn publish(slot: &RwLock<Slot>, apply: impl FnOnce(&mut Snapshot)) {
    let mut guard = slot.write().expect("snapshot lock poisoned");
    let mut next = (*guard.snapshot).clone();
    apply(&mut next);
    next.normalize();
    guard.snapshot = std::sync::Arc::new(next);
}

fn overlay(row: &mut Row, patch: &Row) {
    if let (Some(target), Some(patch)) = (row.as_object_mut(), patch.as_object()) {
        for (column, value) in patch {
            target.insert(column.clone(), value.clone());
        }
    }
}

fn with_placeholder(row: &Row, placeholder: &str) -> Row {
    let mut row = row.clone();
    if let Some(object) = row.as_object_mut() {
        let has_id = object
            .get("id")
            .and_then(Value::as_str)
            .is_some_and(|id| !id.is_empty());
        if !has_id {
            object.insert("id".into(), Value::String(placeholder.to_string()));
        }
    }
    row
}

// ---------------------------------------------------------------------------
// The engine
// ---------------------------------------------------------------------------

/// The identity key an operation will touch, used to serialize concurrent
/// mutations on the same entity.
pub(crate) fn op_key<R: Record>(op: &Op, placeholder: &str) -> Result<String> {
    match op {
        Op::Insert { row } => Ok(R::from_row(&with_placeholder(row, placeholder))?.key()),
        Op::Update { id, .. } | Op::Delete { id } => Ok(id.clone()),
        Op::Upsert { row } => Ok(R::from_row(row)?.key()),
    }
}

/// Run one operation: optimistic local apply, remote write, then confirm
/// with the server's canonical row or roll the entity back.
///
/// Returns the canonical stored row for writes, `None` for deletes.
pub(crate) async fn execute<R: Record>(
    gateway: &dyn RemoteGateway,
    slot: &RwLock<Slot>,
    op: Op,
    placeholder: &str,
) -> Result<Option<Row>> {
    let pre = slot
        .read()
        .expect("snapshot lock poisoned")
        .snapshot
        .clone();

    match op {
        Op::Insert { row } => {
            let optimistic = R::from_row(&with_placeholder(&row, placeholder))?;
            let key = optimistic.key();
            publish(slot, |s| set_in(s, optimistic));

            match gateway.insert(R::TABLE, row).await {
                Ok(stored) => {
                    let canonical = R::from_row(&stored)?;
                    publish(slot, |s| {
                        remove_in::<R>(s, &key);
                        set_in(s, canonical);
                    });
                    Ok(Some(stored))
                }
                Err(source) => {
                    publish(slot, |s| restore_in::<R>(s, &pre, &key));
                    Err(StoreError::Mutation {
                        table: R::TABLE,
                        source,
                    })
                }
            }
        }

        Op::Update { id, patch } => {
            let current = R::slice(&pre)
                .iter()
                .find(|e| e.key() == id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound {
                    table: R::TABLE,
                    key: id.clone(),
                })?;
            let mut merged = current.to_row();
            overlay(&mut merged, &patch);
            let optimistic = R::from_row(&merged)?;
            publish(slot, |s| set_in(s, optimistic));

            match gateway.update(R::TABLE, &id, patch).await {
                Ok(stored) => {
                    let canonical = R::from_row(&stored)?;
                    publish(slot, |s| set_in(s, canonical));
                    Ok(Some(stored))
                }
                Err(source) => {
                    publish(slot, |s| restore_in::<R>(s, &pre, &id));
                    Err(StoreError::Mutation {
                        table: R::TABLE,
                        source,
                    })
                }
            }
        }

        Op::Upsert { row } => {
            let optimistic = R::from_row(&row)?;
            let key = optimistic.key();
            publish(slot, |s| set_in(s, optimistic));

            match gateway.upsert(R::TABLE, row, R::CONFLICT_KEYS).await {
                Ok(stored) => {
                    let canonical = R::from_row(&stored)?;
                    publish(slot, |s| set_in(s, canonical));
                    Ok(Some(stored))
                }
                Err(source) => {
                    publish(slot, |s| restore_in::<R>(s, &pre, &key));
                    Err(StoreError::Mutation {
                        table: R::TABLE,
                        source,
                    })
                }
            }
        }

        Op::Delete { id } => {
            if !R::slice(&pre).iter().any(|e| e.key() == id) {
                return Err(StoreError::NotFound {
                    table: R::TABLE,
                    key: id,
                });
            }
            publish(slot, |s| remove_in::<R>(s, &id));

            match gateway.delete(R::TABLE, &id).await {
                Ok(()) => Ok(None),
                Err(source) => {
                    publish(slot, |s| restore_in::<R>(s, &pre, &id));
                    Err(StoreError::Mutation {
                        table: R::TABLE,
                        source,
                    })
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Table dispatch
// ---------------------------------------------------------------------------

pub(crate) fn op_key_for(table: Table, op: &Op, placeholder: &str) -> Result<String> {
    match table {
        Table::Categories => op_key::<Category>(op, placeholder),
        Table::Courses => op_key::<Course>(op, placeholder),
        Table::Modules => op_key::<Module>(op, placeholder),
        Table::Lessons => op_key::<Lesson>(op, placeholder),
        Table::UserProgress => op_key::<LessonProgress>(op, placeholder),
        Table::Posts => op_key::<Post>(op, placeholder),
        Table::Offers => op_key::<Offer>(op, placeholder),
        Table::Profiles => op_key::<User>(op, placeholder),
    }
}

pub(crate) async fn execute_for(
    table: Table,
    gateway: &dyn RemoteGateway,
    slot: &RwLock<Slot>,
    op: Op,
    placeholder: &str,
) -> Result<Option<Row>> {
    match table {
        Table::Categories => execute::<Category>(gateway, slot, op, placeholder).await,
        Table::Courses => execute::<Course>(gateway, slot, op, placeholder).await,
        Table::Modules => execute::<Module>(gateway, slot, op, placeholder).await,
        Table::Lessons => execute::<Lesson>(gateway, slot, op, placeholder).await,
        Table::UserProgress => execute::<LessonProgress>(gateway, slot, op, placeholder).await,
        Table::Posts => execute::<Post>(gateway, slot, op, placeholder).await,
        Table::Offers => execute::<Offer>(gateway, slot, op, placeholder).await,
        Table::Profiles => execute::<User>(gateway, slot, op, placeholder).await,
    }
}
