//! Fixed-size worker pool with a FIFO task queue.
//!
//! Workers block on a condition variable while the queue is empty. On
//! shutdown the queue is drained before the workers exit, so every task
//! accepted by [`WorkerPool::execute`] runs exactly once.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, error, info};

type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker pool needs at least one thread")]
    NoWorkers,
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] io::Error),
    #[error("worker pool is shutting down")]
    Stopped,
}

struct State {
    tasks: VecDeque<Task>,
    stopping: bool,
}

struct Shared {
    state: Mutex<State>,
    available: Condvar,
}

/// Pool of named worker threads.
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size)
            .field("queued", &self.queued())
            .finish()
    }
}

impl WorkerPool {
    /// Spawns `size` worker threads named `grid-worker-<n>`.
    ///
    /// # Errors
    ///
    /// [`PoolError::NoWorkers`] for a zero size, [`PoolError::Spawn`] when
    /// the OS refuses a thread. Threads spawned before the failure are
    /// stopped and joined.
    pub fn new(size: usize) -> Result<Self, PoolError> {
        if size == 0 {
            return Err(PoolError::NoWorkers);
        }

        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                tasks: VecDeque::new(),
                stopping: false,
            }),
            available: Condvar::new(),
        });

        let pool = Self {
            shared,
            workers: Mutex::new(Vec::with_capacity(size)),
            size,
        };

        for index in 0..size {
            let shared = pool.shared.clone();
            let handle = thread::Builder::new()
                .name(format!("grid-worker-{index}"))
                .spawn(move || worker_loop(&shared))
                .map_err(PoolError::Spawn)?;
            pool.workers.lock().push(handle);
        }

        info!("👷 Worker pool started with {} thread(s)", size);
        Ok(pool)
    }

    /// Queues a task for the next idle worker.
    pub fn execute<F>(&self, task: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut state = self.shared.state.lock();
            if state.stopping {
                return Err(PoolError::Stopped);
            }
            state.tasks.push_back(Box::new(task));
        }
        self.shared.available.notify_one();
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of tasks waiting for a worker.
    pub fn queued(&self) -> usize {
        self.shared.state.lock().tasks.len()
    }

    /// Stops accepting tasks, lets the workers drain the queue and joins
    /// them. Calling it again is a no-op.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            state.stopping = true;
        }
        self.shared.available.notify_all();

        let workers = std::mem::take(&mut *self.workers.lock());
        if workers.is_empty() {
            return;
        }

        let current = thread::current().id();
        for worker in workers {
            // The last handle to the pool may be dropped by one of its own tasks.
            if worker.thread().id() == current {
                continue;
            }
            let name = worker.thread().name().map(str::to_owned);
            if worker.join().is_err() {
                error!(worker = ?name, "worker thread terminated abnormally");
            }
        }
        info!("👷 Worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let task = {
            let mut state = shared.state.lock();
            loop {
                if let Some(task) = state.tasks.pop_front() {
                    break task;
                }
                if state.stopping {
                    debug!("worker exiting");
                    return;
                }
                shared.available.wait(&mut state);
            }
        };

        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
            error!("task panicked; worker continues");
        }
    }
}
