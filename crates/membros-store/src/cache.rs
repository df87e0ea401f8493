//! The snapshot cache: batch refresh, coalescing, stale-result guarding and
//! optimistic mutation entry point.
//!
//! One [`SnapshotCache`] is shared by every part of the client.  It owns the
//! current [`Snapshot`] behind a cheap read lock; the snapshot is replaced
//! atomically, never edited in place.  Every committed snapshot carries the
//! sequence number of the refresh that produced it, and a refresh result is
//! only committed when its sequence is newer than the committed one, so a
//! slow response can never overwrite fresher data.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::watch;

use membros_gateway::{Order, Query, RemoteGateway, Row, Table};
use membros_shared::models::*;

use crate::error::{Result, StoreError};
use crate::mutation::{self, Mutation, Record};
use crate::snapshot::Snapshot;

/// Lifecycle of the cache, as the UI wants to render it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Never loaded; nothing to show.
    Empty,
    /// First load in flight; show a spinner, not stale data.
    Loading,
    /// At least one snapshot committed; render it.
    Ready,
}

/// The committed snapshot plus its provenance.
pub(crate) struct Slot {
    /// Sequence of the refresh that produced `snapshot`.
    pub(crate) seq: u64,
    /// Whether any refresh has ever committed (survives mutations, cleared
    /// by `reset`).
    pub(crate) loaded: bool,
    pub(crate) snapshot: Arc<Snapshot>,
}

struct Inflight {
    user_id: Option<String>,
    seq: u64,
    rx: watch::Receiver<Option<Result<()>>>,
}

struct Inner {
    gateway: Arc<dyn RemoteGateway>,
    snapshot: RwLock<Slot>,
    /// The user scope of the most recently requested refresh.
    scope: RwLock<Option<String>>,
    next_seq: AtomicU64,
    active_refreshes: AtomicUsize,
    inflight: tokio::sync::Mutex<Option<Inflight>>,
    /// One async lock per entity identity, so concurrent mutations of the
    /// same entity run one at a time.  Entries are dropped opportunistically
    /// once nobody is waiting.
    mutation_locks: Mutex<HashMap<(Table, String), Arc<tokio::sync::Mutex<()>>>>,
}

/// Cheaply cloneable handle to the shared cache.
#[derive(Clone)]
pub struct SnapshotCache {
    inner: Arc<Inner>,
}

impl SnapshotCache {
    pub fn new(gateway: Arc<dyn RemoteGateway>) -> Self {
        Self {
            inner: Arc::new(Inner {
                gateway,
                snapshot: RwLock::new(Slot {
                    seq: 0,
                    loaded: false,
                    snapshot: Arc::new(Snapshot::default()),
                }),
                scope: RwLock::new(None),
                next_seq: AtomicU64::new(1),
                active_refreshes: AtomicUsize::new(0),
                inflight: tokio::sync::Mutex::new(None),
                mutation_locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The current snapshot.  Synchronous and wait-free apart from a short
    /// read lock; the returned `Arc` stays internally consistent however
    /// long the caller holds it.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.inner
            .snapshot
            .read()
            .expect("snapshot lock poisoned")
            .snapshot
            .clone()
    }

    pub fn state(&self) -> CacheState {
        let loaded = self
            .inner
            .snapshot
            .read()
            .expect("snapshot lock poisoned")
            .loaded;
        if loaded {
            CacheState::Ready
        } else if self.inner.active_refreshes.load(AtomicOrdering::SeqCst) > 0 {
            CacheState::Loading
        } else {
            CacheState::Empty
        }
    }

    /// Refetch everything for `user_id` (or the guest view) and commit one
    /// new snapshot.
    ///
    /// Calls that arrive while a refresh for the *same* scope is in flight
    /// coalesce onto it and share its outcome; a call for a different scope
    /// starts its own, newer refresh.  On failure the previous snapshot is
    /// retained and the call may simply be retried.
    pub async fn refresh(&self, user_id: Option<&str>) -> Result<()> {
        let mut rx = {
            let mut inflight = self.inner.inflight.lock().await;
            match inflight.as_ref() {
                Some(current) if current.user_id.as_deref() == user_id => current.rx.clone(),
                _ => self.spawn_refresh(&mut inflight, user_id),
            }
        };

        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).clone().unwrap_or(Err(StoreError::Canceled)),
            Err(_) => Err(StoreError::Canceled),
        };
        outcome
    }

    fn spawn_refresh(
        &self,
        inflight: &mut Option<Inflight>,
        user_id: Option<&str>,
    ) -> watch::Receiver<Option<Result<()>>> {
        let (tx, rx) = watch::channel(None);
        let seq = self.inner.next_seq.fetch_add(1, AtomicOrdering::SeqCst);
        let scope = user_id.map(String::from);

        *self.inner.scope.write().expect("scope lock poisoned") = scope.clone();
        self.inner
            .active_refreshes
            .fetch_add(1, AtomicOrdering::SeqCst);

        let inner = self.inner.clone();
        let task_scope = scope.clone();
        tokio::spawn(async move {
            let result = run_refresh(&inner, task_scope.as_deref(), seq).await;
            inner
                .active_refreshes
                .fetch_sub(1, AtomicOrdering::SeqCst);
            {
                let mut slot = inner.inflight.lock().await;
                if slot.as_ref().is_some_and(|i| i.seq == seq) {
                    *slot = None;
                }
            }
            if let Err(err) = &result {
                tracing::warn!(%err, seq, "refresh failed");
            }
            let _ = tx.send(Some(result));
        });

        *inflight = Some(Inflight {
            user_id: scope,
            seq,
            rx: rx.clone(),
        });
        rx
    }

    /// React to a change notification: refetch the smallest span that keeps
    /// the snapshot coherent.
    ///
    /// The course catalog tables are relationally entangled (progress
    /// percentages span lessons, modules and courses), so a change to any of
    /// them triggers a full refresh; the self-contained tables refetch just
    /// themselves.
    pub async fn invalidate(&self, table: Table) -> Result<()> {
        match table {
            Table::Courses | Table::Modules | Table::Lessons | Table::UserProgress => {
                let scope = self
                    .inner
                    .scope
                    .read()
                    .expect("scope lock poisoned")
                    .clone();
                self.refresh(scope.as_deref()).await
            }
            Table::Categories | Table::Posts | Table::Offers | Table::Profiles => {
                self.partial_refresh(table).await
            }
        }
    }

    async fn partial_refresh(&self, table: Table) -> Result<()> {
        let seq = self.inner.next_seq.fetch_add(1, AtomicOrdering::SeqCst);
        let scope = self
            .inner
            .scope
            .read()
            .expect("scope lock poisoned")
            .clone();
        let query = query_for(table, scope.as_deref());

        // Login-walled tables are never refetched for guests.
        if scope.is_none()
            && matches!(
                table,
                Table::UserProgress | Table::Posts | Table::Offers | Table::Profiles
            )
        {
            return Ok(());
        }

        match table {
            Table::Categories => self.refresh_slice::<Category>(seq, query).await,
            Table::Courses => self.refresh_slice::<Course>(seq, query).await,
            Table::Modules => self.refresh_slice::<Module>(seq, query).await,
            Table::Lessons => self.refresh_slice::<Lesson>(seq, query).await,
            Table::UserProgress => self.refresh_slice::<LessonProgress>(seq, query).await,
            Table::Posts => self.refresh_slice::<Post>(seq, query).await,
            Table::Offers => self.refresh_slice::<Offer>(seq, query).await,
            Table::Profiles => self.refresh_slice::<User>(seq, query).await,
        }
    }

    async fn refresh_slice<R: Record>(&self, seq: u64, query: Query) -> Result<()> {
        let slice = fetch_slice::<R>(self.inner.gateway.as_ref(), query).await?;

        let mut slot = self.inner.snapshot.write().expect("snapshot lock poisoned");
        if seq <= slot.seq {
            tracing::debug!(seq, committed = slot.seq, "dropping stale partial refresh");
            return Ok(());
        }
        let mut next = (*slot.snapshot).clone();
        *R::slice_mut(&mut next) = slice;
        next.normalize();
        slot.seq = seq;
        slot.snapshot = Arc::new(next);
        Ok(())
    }

    /// Run one optimistic mutation.
    ///
    /// Mutations touching the same entity identity are serialized; distinct
    /// identities proceed concurrently.  Returns the canonical stored row
    /// for writes, `None` for deletes.
    pub async fn apply(&self, mutation: Mutation) -> Result<Option<Row>> {
        let placeholder = uuid::Uuid::new_v4().to_string();
        let key = mutation::op_key_for(mutation.table, &mutation.op, &placeholder)?;

        let lock = self.mutation_lock(mutation.table, &key);
        let result = {
            let _guard = lock.lock().await;
            mutation::execute_for(
                mutation.table,
                self.inner.gateway.as_ref(),
                &self.inner.snapshot,
                mutation.op,
                &placeholder,
            )
            .await
        };
        self.release_mutation_lock(mutation.table, &key, &lock);
        result
    }

    fn mutation_lock(&self, table: Table, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.inner
            .mutation_locks
            .lock()
            .expect("mutation lock map poisoned")
            .entry((table, key.to_string()))
            .or_default()
            .clone()
    }

    fn release_mutation_lock(&self, table: Table, key: &str, held: &Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self
            .inner
            .mutation_locks
            .lock()
            .expect("mutation lock map poisoned");
        // The map's clone plus ours: nobody else is waiting.
        if Arc::strong_count(held) <= 2 {
            locks.remove(&(table, key.to_string()));
        }
    }

    /// Apply a local-only adjustment to the snapshot, with no remote write.
    ///
    /// Used for denormalized repairs, like re-joining post author fields
    /// after a profile edit.
    pub fn update_local(&self, apply: impl FnOnce(&mut Snapshot)) {
        let mut slot = self.inner.snapshot.write().expect("snapshot lock poisoned");
        let mut next = (*slot.snapshot).clone();
        apply(&mut next);
        next.normalize();
        slot.snapshot = Arc::new(next);
    }

    /// Drop everything, as on logout.  In-flight refreshes from before the
    /// reset can no longer commit.
    pub fn reset(&self) {
        let epoch = self.inner.next_seq.fetch_add(1, AtomicOrdering::SeqCst);
        {
            let mut slot = self.inner.snapshot.write().expect("snapshot lock poisoned");
            slot.seq = epoch;
            slot.loaded = false;
            slot.snapshot = Arc::new(Snapshot::default());
        }
        *self.inner.scope.write().expect("scope lock poisoned") = None;
    }
}

// ---------------------------------------------------------------------------
// Fetch plumbing
// ---------------------------------------------------------------------------

/// The server-side filter and ordering each table is fetched with.
fn query_for(table: Table, user_id: Option<&str>) -> Query {
    match table {
        Table::Categories => Query::new().order_by("display_order", Order::Ascending),
        Table::Courses => Query::new().order_by("created_at", Order::Descending),
        Table::Modules | Table::Lessons => Query::new().order_by("order_number", Order::Ascending),
        Table::UserProgress => Query::new().eq("user_id", user_id.unwrap_or_default()),
        Table::Posts => Query::new()
            .eq("status", "published")
            .order_by("created_at", Order::Descending),
        Table::Offers => Query::new().order_by("priority", Order::Descending),
        Table::Profiles => Query::new(),
    }
}

fn map_rows<R: Record>(rows: &[Row]) -> Vec<R> {
    rows.iter()
        .filter_map(|row| match R::from_row(row) {
            Ok(entity) => Some(entity),
            Err(err) => {
                tracing::warn!(%err, "skipping unmappable row");
                None
            }
        })
        .collect()
}

async fn fetch_slice<R: Record>(gateway: &dyn RemoteGateway, query: Query) -> Result<Vec<R>> {
    let rows = gateway
        .fetch_table(R::TABLE, query)
        .await
        .map_err(|source| StoreError::Fetch {
            table: R::TABLE,
            source,
        })?;
    Ok(map_rows(&rows))
}

/// Fetch all eight tables concurrently, build one snapshot, commit it if it
/// is still the newest.
async fn run_refresh(inner: &Inner, user_id: Option<&str>, seq: u64) -> Result<()> {
    let gateway = inner.gateway.as_ref();

    // The catalog is public; everything behind the login wall is only
    // fetched for a signed-in user and stays empty for guests, with no
    // round-trip.
    let progress = async {
        match user_id {
            Some(_) => {
                fetch_slice::<LessonProgress>(gateway, query_for(Table::UserProgress, user_id))
                    .await
            }
            None => Ok(Vec::new()),
        }
    };
    let posts = async {
        match user_id {
            Some(_) => fetch_slice::<Post>(gateway, query_for(Table::Posts, user_id)).await,
            None => Ok(Vec::new()),
        }
    };
    let offers = async {
        match user_id {
            Some(_) => fetch_slice::<Offer>(gateway, query_for(Table::Offers, user_id)).await,
            None => Ok(Vec::new()),
        }
    };
    let profiles = async {
        match user_id {
            Some(_) => fetch_slice::<User>(gateway, query_for(Table::Profiles, user_id)).await,
            None => Ok(Vec::new()),
        }
    };

    let (categories, courses, modules, lessons, progress, posts, offers, profiles) = tokio::try_join!(
        fetch_slice::<Category>(gateway, query_for(Table::Categories, user_id)),
        fetch_slice::<Course>(gateway, query_for(Table::Courses, user_id)),
        fetch_slice::<Module>(gateway, query_for(Table::Modules, user_id)),
        fetch_slice::<Lesson>(gateway, query_for(Table::Lessons, user_id)),
        progress,
        posts,
        offers,
        profiles,
    )?;

    let mut snapshot = Snapshot {
        categories,
        courses,
        modules,
        lessons,
        progress,
        posts,
        offers,
        profiles,
    };
    snapshot.normalize();

    let mut slot = inner.snapshot.write().expect("snapshot lock poisoned");
    if seq <= slot.seq {
        tracing::debug!(seq, committed = slot.seq, "dropping stale refresh result");
        return Ok(());
    }
    slot.seq = seq;
    slot.loaded = true;
    slot.snapshot = Arc::new(snapshot);
    Ok(())
}
