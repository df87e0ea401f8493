//! Routes backend change notifications into cache invalidations.
//!
//! One debounce task per watched table: a burst of change events collapses
//! into a single refetch once the stream has been quiet for the debounce
//! window.  Watching is idempotent (one task per table, however many
//! handles) and teardown is RAII — dropping the last [`WatchHandle`] aborts
//! the task, which drops the broadcast receiver, which is the unsubscribe.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

use membros_gateway::{ChangeEvent, RemoteGateway, Table};

use crate::cache::SnapshotCache;

struct RouterInner {
    gateway: Arc<dyn RemoteGateway>,
    cache: SnapshotCache,
    debounce: Duration,
    watches: Mutex<HashMap<Table, Weak<WatchInner>>>,
}

/// Hands out per-table watches over the gateway's change streams.
#[derive(Clone)]
pub struct ChangeRouter {
    inner: Arc<RouterInner>,
}

struct WatchInner {
    table: Table,
    task: JoinHandle<()>,
}

impl Drop for WatchInner {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Keeps a table watch alive.  Cloneable; the watch ends when the last
/// clone is dropped.
#[derive(Clone)]
pub struct WatchHandle {
    inner: Arc<WatchInner>,
}

impl WatchHandle {
    pub fn table(&self) -> Table {
        self.inner.table
    }
}

impl ChangeRouter {
    pub fn new(gateway: Arc<dyn RemoteGateway>, cache: SnapshotCache, debounce: Duration) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                gateway,
                cache,
                debounce,
                watches: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Start (or join) the watch on `table`.
    ///
    /// Watching an already-watched table returns a handle to the existing
    /// task rather than stacking a second subscription.
    pub fn watch(&self, table: Table) -> WatchHandle {
        let mut watches = self.inner.watches.lock().expect("watch map poisoned");
        if let Some(existing) = watches.get(&table).and_then(Weak::upgrade) {
            return WatchHandle { inner: existing };
        }

        let rx = self.inner.gateway.subscribe(table);
        let cache = self.inner.cache.clone();
        let debounce = self.inner.debounce;
        let task = tokio::spawn(debounce_loop(table, rx, cache, debounce));

        let inner = Arc::new(WatchInner { table, task });
        watches.insert(table, Arc::downgrade(&inner));
        tracing::debug!(%table, "watch started");
        WatchHandle { inner }
    }
}

/// Absorb change events; after `window` of quiet, invalidate once.
async fn debounce_loop(
    table: Table,
    mut rx: broadcast::Receiver<ChangeEvent>,
    cache: SnapshotCache,
    window: Duration,
) {
    loop {
        match rx.recv().await {
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                // A lagged stream still means "something changed".
                tracing::warn!(%table, missed, "change stream lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }

        let deadline = sleep(window);
        tokio::pin!(deadline);
        let mut open = true;
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                event = rx.recv() => match event {
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        deadline.as_mut().reset(Instant::now() + window);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        open = false;
                        break;
                    }
                }
            }
        }

        if let Err(err) = cache.invalidate(table).await {
            tracing::warn!(%table, %err, "invalidation after change failed");
        }
        if !open {
            break;
        }
    }
    tracing::debug!(%table, "watch ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use membros_gateway::MemoryGateway;
    use serde_json::json;

    async fn ready_stack() -> (Arc<MemoryGateway>, SnapshotCache, ChangeRouter) {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.seed(
            Table::Offers,
            vec![json!({ "id": "o1", "title": "Oferta", "priority": 1 })],
        );
        let cache = SnapshotCache::new(gateway.clone() as Arc<dyn RemoteGateway>);
        cache.refresh(Some("u1")).await.unwrap();
        let router = ChangeRouter::new(
            gateway.clone() as Arc<dyn RemoteGateway>,
            cache.clone(),
            Duration::from_millis(250),
        );
        (gateway, cache, router)
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_burst_collapses_into_one_refetch() {
        let (gateway, cache, router) = ready_stack().await;
        let _watch = router.watch(Table::Offers);
        assert_eq!(gateway.fetch_count(Table::Offers), 1);

        for i in 0..10 {
            gateway
                .insert(Table::Offers, json!({ "title": format!("Oferta {i}") }))
                .await
                .unwrap();
        }

        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(gateway.fetch_count(Table::Offers), 2);
        assert_eq!(cache.snapshot().offers.len(), 11);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_is_idempotent() {
        let (_gateway, _cache, router) = ready_stack().await;
        let a = router.watch(Table::Posts);
        let b = router.watch(Table::Posts);
        assert!(Arc::ptr_eq(&a.inner, &b.inner));
        assert_eq!(a.table(), Table::Posts);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_last_handle_stops_the_watch() {
        let (gateway, _cache, router) = ready_stack().await;
        let a = router.watch(Table::Offers);
        let b = a.clone();
        drop(a);
        drop(b);

        gateway
            .insert(Table::Offers, json!({ "title": "Nova" }))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;

        // The aborted task never refetched.
        assert_eq!(gateway.fetch_count(Table::Offers), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_can_be_restarted_after_teardown() {
        let (gateway, cache, router) = ready_stack().await;
        drop(router.watch(Table::Offers));

        let _watch = router.watch(Table::Offers);
        gateway
            .insert(Table::Offers, json!({ "title": "Nova" }))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(gateway.fetch_count(Table::Offers), 2);
        assert_eq!(cache.snapshot().offers.len(), 2);
    }
}
