//! Watcher multiplexer (spec §4.8).
//!
//! Reference-counts watch subscriptions per `(canonical key, recursive,
//! excludes)`. The underlying `provider.watch` call is asynchronous and
//! fired in the background so the caller gets a handle immediately; if that
//! handle is disposed before the provider's future resolves, the eventual
//! disposable is disposed the moment it arrives (spec §3 invariant, §4.8
//! design note).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

use crate::capability::is_case_sensitive;
use crate::provider::{Disposable, FileSystemProvider};
use crate::uri::Resource;

enum RecordState {
    Pending,
    Ready(Box<dyn Disposable>),
    Disposed,
}

struct Record {
    count: AtomicUsize,
    state: Mutex<RecordState>,
}

impl Record {
    fn new() -> Self {
        Self { count: AtomicUsize::new(1), state: Mutex::new(RecordState::Pending) }
    }
}

fn compose_key(provider: &dyn FileSystemProvider, resource: &Resource, recursive: bool, excludes: &[String]) -> String {
    let canonical = resource.canonical_key(is_case_sensitive(provider.capabilities()));
    format!("{canonical}|{recursive}|{}", excludes.join(","))
}

/// Per-key refcounted watch table.
pub struct WatcherMultiplexer {
    table: Mutex<HashMap<String, Arc<Record>>>,
}

impl WatcherMultiplexer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { table: Mutex::new(HashMap::new()) })
    }

    /// `watch(resource, options)` (spec §4.8). Always returns a handle
    /// immediately; the underlying provider subscription is established in
    /// the background on first reference to a key.
    pub async fn watch(
        self: &Arc<Self>,
        provider: Arc<dyn FileSystemProvider>,
        resource: Resource,
        recursive: bool,
        excludes: Vec<String>,
    ) -> WatchHandle {
        let key = compose_key(&*provider, &resource, recursive, &excludes);

        let mut table = self.table.lock().await;
        if let Some(record) = table.get(&key) {
            record.count.fetch_add(1, Ordering::SeqCst);
            let record = record.clone();
            drop(table);
            return WatchHandle { key, record, multiplexer: self.clone() };
        }

        let record = Arc::new(Record::new());
        table.insert(key.clone(), record.clone());
        drop(table);

        let spawned_record = record.clone();
        let spawn_key = key.clone();
        tokio::spawn(async move {
            match provider.watch(&resource, recursive, &excludes).await {
                Ok(disposable) => {
                    let mut state = spawned_record.state.lock().await;
                    if matches!(*state, RecordState::Disposed) {
                        drop(state);
                        disposable.dispose();
                    } else {
                        *state = RecordState::Ready(disposable);
                    }
                }
                Err(err) => {
                    warn!(key = %spawn_key, error = %err, "underlying provider.watch failed");
                }
            }
        });

        WatchHandle { key, record, multiplexer: self.clone() }
    }

    /// Service disposal: tear down every active watcher and clear the table.
    pub async fn dispose_all(&self) {
        let mut table = self.table.lock().await;
        for (_, record) in table.drain() {
            let mut state = record.state.lock().await;
            if let RecordState::Ready(disposable) = std::mem::replace(&mut *state, RecordState::Disposed) {
                disposable.dispose();
            }
        }
    }

    #[cfg(test)]
    async fn active_key_count(&self) -> usize {
        self.table.lock().await.len()
    }
}

/// A disposable handle into the multiplexer's refcount for one key.
pub struct WatchHandle {
    key: String,
    record: Arc<Record>,
    multiplexer: Arc<WatcherMultiplexer>,
}

impl Disposable for WatchHandle {
    fn dispose(self: Box<Self>) {
        let record = self.record.clone();
        let multiplexer = self.multiplexer.clone();
        let key = self.key.clone();
        tokio::spawn(async move {
            if record.count.fetch_sub(1, Ordering::SeqCst) == 1 {
                let mut state = record.state.lock().await;
                let previous = std::mem::replace(&mut *state, RecordState::Disposed);
                drop(state);
                if let RecordState::Ready(disposable) = previous {
                    disposable.dispose();
                }
                multiplexer.table.lock().await.remove(&key);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mem_provider::MemFsProvider;
    use std::time::Duration;

    #[tokio::test]
    async fn two_watches_on_same_key_share_one_underlying_subscription() {
        let provider: Arc<dyn FileSystemProvider> = Arc::new(MemFsProvider::new());
        let mux = WatcherMultiplexer::new();
        let resource: Resource = "mem:///dir".parse().unwrap();

        let h1 = mux.watch(provider.clone(), resource.clone(), false, vec![]).await;
        let h2 = mux.watch(provider.clone(), resource.clone(), false, vec![]).await;
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(mux.active_key_count().await, 1);

        Box::new(h1).dispose();
        tokio::task::yield_now().await;
        assert_eq!(mux.active_key_count().await, 1);

        Box::new(h2).dispose();
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(mux.active_key_count().await, 0);
    }

    #[tokio::test]
    async fn different_recursive_flag_is_a_different_key() {
        let provider: Arc<dyn FileSystemProvider> = Arc::new(MemFsProvider::new());
        let mux = WatcherMultiplexer::new();
        let resource: Resource = "mem:///dir".parse().unwrap();

        let _h1 = mux.watch(provider.clone(), resource.clone(), false, vec![]).await;
        let _h2 = mux.watch(provider.clone(), resource.clone(), true, vec![]).await;
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(mux.active_key_count().await, 2);
    }

    #[tokio::test]
    async fn dispose_before_underlying_watch_resolves_still_disposes_it() {
        let provider: Arc<dyn FileSystemProvider> = Arc::new(MemFsProvider::new());
        let mux = WatcherMultiplexer::new();
        let resource: Resource = "mem:///dir".parse().unwrap();

        let handle = mux.watch(provider.clone(), resource, false, vec![]).await;
        // Dispose immediately, racing the background provider.watch() call.
        Box::new(handle).dispose();
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(mux.active_key_count().await, 0);
    }
}
