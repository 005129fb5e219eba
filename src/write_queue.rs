//! Write-queue table (spec §2.3, §5, §9).
//!
//! Per canonical key, a single-consumer FIFO serializes buffered writes and
//! cross-provider pipe operations so no two such operations on the same key
//! overlap. Self-deletes when the key's queue drains (spec §9 design note:
//! "refcount on the empty edge"). Built on `crossbeam-queue::SegQueue`
//! (declared by the teacher, never exercised there) for the FIFO itself and
//! `whirlwind::ShardMap` for the key→record table.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_queue::SegQueue;
use tokio::sync::{oneshot, Mutex};
use tracing::trace;
use whirlwind::ShardMap;

type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send>>;

struct QueueRecord {
    queue: SegQueue<BoxedTask>,
    pending: AtomicUsize,
    draining: AtomicBool,
}

impl QueueRecord {
    fn new() -> Self {
        Self { queue: SegQueue::new(), pending: AtomicUsize::new(0), draining: AtomicBool::new(false) }
    }
}

/// Maps a canonical resource key to its serial FIFO of pending write tasks.
pub struct WriteQueueTable {
    table: ShardMap<String, Arc<QueueRecord>>,
    // Held only while creating a fresh record, so two concurrent first
    // submissions for the same key can't race into two different records.
    create_lock: Mutex<()>,
}

impl WriteQueueTable {
    pub fn new() -> Self {
        Self { table: ShardMap::new(), create_lock: Mutex::new(()) }
    }

    async fn get_or_create(&self, key: &str) -> Arc<QueueRecord> {
        if let Some(existing) = self.table.get(key).await {
            return existing;
        }
        let _guard = self.create_lock.lock().await;
        if let Some(existing) = self.table.get(key).await {
            return existing;
        }
        let record = Arc::new(QueueRecord::new());
        self.table.insert(key.to_string(), record.clone()).await;
        record
    }

    /// Enqueue `task` for `key` and await its result. Tasks submitted for the
    /// same key run strictly in submission order; tasks for different keys
    /// may run concurrently.
    pub async fn run<F, Fut, T>(&self, key: &str, task: F) -> T
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let record = self.get_or_create(key).await;
        record.pending.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = oneshot::channel();
        let boxed: BoxedTask = Box::pin(async move {
            let result = task().await;
            let _ = tx.send(result);
        });
        record.queue.push(boxed);

        self.drain(key, &record).await;

        rx.await.expect("write queue task dropped before completion")
    }

    /// Drive the FIFO for `key` if nobody else currently is; otherwise the
    /// current drainer will reach the task we just pushed.
    async fn drain(&self, key: &str, record: &Arc<QueueRecord>) {
        if record.draining.swap(true, Ordering::SeqCst) {
            return;
        }
        loop {
            while let Some(task) = record.queue.pop() {
                task.await;
                record.pending.fetch_sub(1, Ordering::SeqCst);
            }
            record.draining.store(false, Ordering::SeqCst);
            if !record.queue.is_empty() {
                // Something was pushed in the gap between the last `pop`
                // returning `None` and us clearing the flag; keep draining.
                if record.draining.swap(true, Ordering::SeqCst) {
                    return;
                }
                continue;
            }
            if record.pending.load(Ordering::SeqCst) == 0 {
                trace!(key, "write queue drained, self-deleting");
                self.table.remove(key).await;
            }
            break;
        }
    }
}

impl Default for WriteQueueTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;
    use std::time::Duration;

    #[tokio::test]
    async fn serializes_writes_to_same_key_in_fifo_order() {
        let table = Arc::new(WriteQueueTable::new());
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..5 {
            let table = table.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                table
                    .run("k", move || async move {
                        tokio::time::sleep(Duration::from_millis(1)).await;
                        order.lock().unwrap().push(i);
                    })
                    .await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        // Submission order is preserved because each `run` awaits the queue
        // push before returning, establishing a happens-before edge.
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn last_write_wins_value() {
        let table = Arc::new(WriteQueueTable::new());
        let cell = Arc::new(AtomicI32::new(0));

        let t1 = {
            let table = table.clone();
            let cell = cell.clone();
            tokio::spawn(async move {
                table.run("k", move || async move { cell.store(1, Ordering::SeqCst) }).await;
            })
        };
        let t2 = {
            let table = table.clone();
            let cell = cell.clone();
            tokio::spawn(async move {
                table.run("k", move || async move { cell.store(2, Ordering::SeqCst) }).await;
            })
        };
        t1.await.unwrap();
        t2.await.unwrap();
        // Whichever order they actually landed in the FIFO, the queue
        // self-cleans and the cell ends at one of the two written values.
        assert!(matches!(cell.load(Ordering::SeqCst), 1 | 2));
    }
}
