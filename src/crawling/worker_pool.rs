//! # Worker Pool
//!
//! Fixed number of tokio tasks pulling jobs from one bounded channel.
//!
//! - Concurrency is exactly `workers`; jobs never get a task of their own.
//! - `submit` waits while the queue is full, so producers are slowed down
//!   instead of work being dropped.
//! - Cancelling the token stops workers from taking new jobs; a job already
//!   running finishes.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("worker pool '{0}' is closed")]
    Closed(String),

    #[error("worker pool '{name}' lost {count} worker(s) to panics")]
    WorkerPanicked { name: String, count: usize },
}

/// Sizing of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub workers: usize,
    pub queue_capacity: usize,
}

impl PoolConfig {
    /// Queue twice as deep as the worker count
    pub fn with_workers(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            workers,
            queue_capacity: workers * 2,
        }
    }
}

/// Bounded pool of identical workers
pub struct WorkerPool<T> {
    name: String,
    sender: mpsc::Sender<T>,
    handles: Vec<JoinHandle<()>>,
    completed: Arc<AtomicUsize>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Start `config.workers` workers, each running `handler` on one job at a time
    pub fn start<F, Fut>(name: impl Into<String>, config: PoolConfig, cancel: CancellationToken, handler: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let (sender, receiver) = mpsc::channel::<T>(config.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let handler = Arc::new(handler);
        let completed = Arc::new(AtomicUsize::new(0));

        let handles = (0..config.workers.max(1))
            .map(|worker_id| {
                let receiver = Arc::clone(&receiver);
                let handler = Arc::clone(&handler);
                let completed = Arc::clone(&completed);
                let cancel = cancel.clone();
                let pool_name = name.clone();

                tokio::spawn(async move {
                    loop {
                        let job = {
                            let mut rx = receiver.lock().await;
                            tokio::select! {
                                biased;
                                () = cancel.cancelled() => None,
                                job = rx.recv() => job,
                            }
                        };

                        let Some(job) = job else { break };
                        handler(job).await;
                        completed.fetch_add(1, Ordering::Relaxed);
                    }
                    debug!("{} worker {} stopped", pool_name, worker_id);
                })
            })
            .collect();

        Self {
            name,
            sender,
            handles,
            completed,
        }
    }

    /// Queue a job, waiting for space when the queue is full
    pub async fn submit(&self, job: T) -> Result<(), PoolError> {
        self.sender
            .send(job)
            .await
            .map_err(|_| PoolError::Closed(self.name.clone()))
    }

    /// Stop accepting jobs, drain the queue and wait for every worker.
    ///
    /// Returns the number of jobs handled.
    pub async fn join(self) -> Result<usize, PoolError> {
        let Self {
            name,
            sender,
            handles,
            completed,
        } = self;
        drop(sender);

        let mut panicked = 0;
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                error!("{} worker failed: {}", name, e);
                panicked += 1;
            }
        }

        if panicked > 0 {
            return Err(PoolError::WorkerPanicked { name, count: panicked });
        }
        Ok(completed.load(Ordering::Relaxed))
    }
}
