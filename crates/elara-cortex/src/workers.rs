//! Deliberative worker pools — named bounded thread pools with backpressure.
//!
//! Two pools: `io` (4 threads) for DB and file I/O, `llm` (2 threads) for
//! long-running external calls. Queue depth past `MAX_QUEUE_DEPTH` refuses
//! the submission; callers fall back to inline execution.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use once_cell::sync::Lazy;
use serde::Serialize;

use elara_core::constants::{IO_POOL_THREADS, LLM_POOL_THREADS, MAX_QUEUE_DEPTH};
use elara_core::ElaraError;

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Clone, Debug, Serialize)]
pub struct PoolStats {
    pub name: String,
    pub max_workers: usize,
    pub pending: usize,
    pub submitted: u64,
    pub completed: u64,
    pub rejected: u64,
}

struct PoolState {
    pending: AtomicUsize,
    submitted: AtomicU64,
    completed: AtomicU64,
    rejected: AtomicU64,
}

/// A named thread pool with queue-depth tracking.
pub struct WorkerPool {
    name: String,
    max_workers: usize,
    sender: Mutex<Option<crossbeam_channel::Sender<Job>>>,
    state: Arc<PoolState>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(name: &str, max_workers: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();
        let mut handles = Vec::with_capacity(max_workers);
        for i in 0..max_workers {
            let receiver = receiver.clone();
            let handle = std::thread::Builder::new()
                .name(format!("elara-{name}-{i}"))
                .spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        job();
                    }
                })
                .expect("spawning worker thread");
            handles.push(handle);
        }
        Self {
            name: name.to_string(),
            max_workers,
            sender: Mutex::new(Some(sender)),
            state: Arc::new(PoolState {
                pending: AtomicUsize::new(0),
                submitted: AtomicU64::new(0),
                completed: AtomicU64::new(0),
                rejected: AtomicU64::new(0),
            }),
            handles: Mutex::new(handles),
        }
    }

    /// Submit work; the returned receiver resolves to the result. Refuses
    /// with `WorkerPoolBusy` at the queue-depth ceiling.
    pub fn submit_sync<T, F>(&self, f: F) -> Result<tokio::sync::oneshot::Receiver<T>, ElaraError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let pending = self.state.pending.load(Ordering::SeqCst);
        if pending >= MAX_QUEUE_DEPTH {
            self.state.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(ElaraError::WorkerPoolBusy {
                pool: self.name.clone(),
                pending,
                limit: MAX_QUEUE_DEPTH,
            });
        }

        let sender = self.sender.lock().expect("pool lock poisoned");
        let Some(sender) = sender.as_ref() else {
            return Err(ElaraError::Other(format!("pool '{}' is shut down", self.name)));
        };

        self.state.pending.fetch_add(1, Ordering::SeqCst);
        self.state.submitted.fetch_add(1, Ordering::SeqCst);

        let state = Arc::clone(&self.state);
        let (tx, rx) = tokio::sync::oneshot::channel();
        let job: Job = Box::new(move || {
            let result = f();
            state.pending.fetch_sub(1, Ordering::SeqCst);
            state.completed.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(result);
        });

        if sender.send(job).is_err() {
            self.state.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(ElaraError::Other(format!("pool '{}' is shut down", self.name)));
        }
        Ok(rx)
    }

    /// Async submit — awaits the result.
    pub async fn submit<T, F>(&self, f: F) -> Result<T, ElaraError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let rx = self.submit_sync(f)?;
        rx.await
            .map_err(|_| ElaraError::Other(format!("pool '{}' dropped the result", self.name)))
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            name: self.name.clone(),
            max_workers: self.max_workers,
            pending: self.state.pending.load(Ordering::SeqCst),
            submitted: self.state.submitted.load(Ordering::SeqCst),
            completed: self.state.completed.load(Ordering::SeqCst),
            rejected: self.state.rejected.load(Ordering::SeqCst),
        }
    }

    /// Close the queue and join the worker threads. In-flight jobs finish.
    pub fn shutdown(&self) {
        self.sender.lock().expect("pool lock poisoned").take();
        let handles: Vec<_> = self.handles.lock().expect("pool lock poisoned").drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
        tracing::info!(pool = %self.name, "worker pool shut down");
    }
}

// ── Tool → pool routing ──────────────────────────────────────────────────────

/// Tools routed to the IO pool (embedded DB, file I/O).
static IO_TOOLS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "elara_remember",
        "elara_recall",
        "elara_rebuild_indexes",
        "elara_memory_consolidation",
        "elara_model",
        "elara_prediction",
        "elara_principle",
        "elara_workflow",
        "elara_reasoning",
        "elara_outcome",
        "elara_synthesis",
    ])
});

/// Tools routed to the LLM pool (long-running external calls).
static LLM_TOOLS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "elara_llm",
        "elara_briefing",
        "elara_dream",
        "elara_dream_info",
    ])
});

/// Manages the fixed pool set for the cortical execution model.
pub struct WorkerManager {
    pub io: Arc<WorkerPool>,
    pub llm: Arc<WorkerPool>,
}

impl Default for WorkerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerManager {
    pub fn new() -> Self {
        Self {
            io: Arc::new(WorkerPool::new("io", IO_POOL_THREADS)),
            llm: Arc::new(WorkerPool::new("llm", LLM_POOL_THREADS)),
        }
    }

    pub fn pool(&self, name: &str) -> Option<&Arc<WorkerPool>> {
        match name {
            "io" => Some(&self.io),
            "llm" => Some(&self.llm),
            _ => None,
        }
    }

    /// Route a tool to its pool. Unknown tools default to `io`.
    pub fn pool_for_tool(&self, tool_name: &str) -> &Arc<WorkerPool> {
        if LLM_TOOLS.contains(tool_name) {
            &self.llm
        } else if IO_TOOLS.contains(tool_name) {
            &self.io
        } else {
            &self.io
        }
    }

    pub fn stats(&self) -> Vec<PoolStats> {
        vec![self.io.stats(), self.llm.stats()]
    }

    pub fn shutdown(&self) {
        self.io.shutdown();
        self.llm.shutdown();
        tracing::info!("all worker pools shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn submit_sync_returns_result() {
        let pool = WorkerPool::new("test", 2);
        let rx = pool.submit_sync(|| 40 + 2).unwrap();
        assert_eq!(rx.blocking_recv().unwrap(), 42);
        pool.shutdown();
    }

    #[tokio::test]
    async fn async_submit_awaits_result() {
        let pool = WorkerPool::new("test", 2);
        let result = pool.submit(|| "hello".to_string()).await.unwrap();
        assert_eq!(result, "hello");
        pool.shutdown();
    }

    #[test]
    fn stats_track_submissions() {
        let pool = WorkerPool::new("test", 2);
        pool.submit_sync(|| ()).unwrap().blocking_recv().unwrap();
        pool.submit_sync(|| ()).unwrap().blocking_recv().unwrap();

        let stats = pool.stats();
        assert_eq!(stats.name, "test");
        assert_eq!(stats.submitted, 2);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.rejected, 0);
        pool.shutdown();
    }

    #[test]
    fn saturated_pool_refuses_with_busy() {
        let pool = WorkerPool::new("test", 1);
        let gate = Arc::new(std::sync::Barrier::new(2));

        // Occupy the single worker, then fill the queue to the ceiling.
        let gate2 = Arc::clone(&gate);
        let _running = pool
            .submit_sync(move || {
                gate2.wait();
            })
            .unwrap();
        let mut queued = Vec::new();
        while pool.stats().pending < MAX_QUEUE_DEPTH {
            queued.push(pool.submit_sync(|| ()).unwrap());
        }

        let err = pool.submit_sync(|| ()).unwrap_err();
        assert!(matches!(err, ElaraError::WorkerPoolBusy { .. }));
        assert_eq!(pool.stats().rejected, 1);

        gate.wait();
        for rx in queued {
            rx.blocking_recv().unwrap();
        }
        pool.shutdown();
    }

    #[test]
    fn concurrent_execution_uses_all_workers() {
        let pool = WorkerPool::new("test", 2);
        let start = std::time::Instant::now();
        let a = pool
            .submit_sync(|| std::thread::sleep(Duration::from_millis(50)))
            .unwrap();
        let b = pool
            .submit_sync(|| std::thread::sleep(Duration::from_millis(50)))
            .unwrap();
        a.blocking_recv().unwrap();
        b.blocking_recv().unwrap();
        assert!(start.elapsed() < Duration::from_millis(100));
        pool.shutdown();
    }

    #[test]
    fn tool_routing_defaults_to_io() {
        let manager = WorkerManager::new();
        assert_eq!(manager.pool_for_tool("elara_dream").stats().name, "llm");
        assert_eq!(manager.pool_for_tool("elara_recall").stats().name, "io");
        assert_eq!(manager.pool_for_tool("unknown_tool").stats().name, "io");
        manager.shutdown();
    }
}
