use crate::config::EngineConfig;
use crate::errors::{AppError, AppResult};
use crate::store::SlotStore;
use crate::worker::{Failure, Fetched, Worker, WorkerSignal};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Semaphore};

/// Receives one worker's lifecycle, on a runtime task rather than the worker
/// thread.
pub trait FetchContinuation: Send + 'static {
    fn on_started(&mut self) {}
    fn on_fetched(&mut self, fetched: Fetched);
    fn on_alerted(&mut self, failure: Failure);
    fn on_stopped(&mut self) {}
}

/// Bounded worker pool. Holds no query logic; schedules and forwards.
#[derive(Clone)]
pub struct Dispatcher {
    permits: Arc<Semaphore>,
    running: Arc<AtomicUsize>,
    handle: Handle,
    pool_size: usize,
}

impl Dispatcher {
    /// Binds to the ambient tokio runtime.
    pub fn new(pool_size: usize) -> AppResult<Self> {
        let handle = Handle::try_current()
            .map_err(|err| AppError::Internal(format!("dispatcher needs a tokio runtime: {}", err)))?;
        Self::with_handle(handle, pool_size)
    }

    pub fn from_config(config: &EngineConfig) -> AppResult<Self> {
        Self::new(config.pool_size)
    }

    pub fn with_handle(handle: Handle, pool_size: usize) -> AppResult<Self> {
        if pool_size == 0 {
            return Err(AppError::Config("pool size must be at least 1".to_string()));
        }
        Ok(Self {
            permits: Arc::new(Semaphore::new(pool_size)),
            running: Arc::new(AtomicUsize::new(0)),
            handle,
            pool_size,
        })
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Workers currently holding a pool slot.
    pub fn in_flight(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn dispatch<S, C>(&self, worker: Worker<S>, continuation: C)
    where
        S: SlotStore,
        C: FetchContinuation,
    {
        let signals = self.dispatch_channel(worker);
        self.handle.spawn(forward(signals, continuation));
    }

    /// Starts `worker` once a pool slot frees up and streams its signals.
    /// Admission waits; it never fails for lack of capacity.
    pub fn dispatch_channel<S>(&self, worker: Worker<S>) -> mpsc::UnboundedReceiver<WorkerSignal>
    where
        S: SlotStore,
    {
        let (sender, receiver) = mpsc::unbounded_channel();
        let permits = self.permits.clone();
        let running = self.running.clone();
        let worker_id = worker.id();
        tracing::debug!(worker_id = %worker_id, kind = worker.request().kind(), "worker queued");

        self.handle.spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(error) => {
                    tracing::error!(worker_id = %worker_id, error = %error, "worker pool closed");
                    return;
                }
            };
            running.fetch_add(1, Ordering::SeqCst);

            let joined = tokio::task::spawn_blocking(move || {
                let mut worker = worker;
                worker.run(|signal| {
                    let _ = sender.send(signal);
                })
            })
            .await;
            running.fetch_sub(1, Ordering::SeqCst);

            match joined {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    tracing::error!(worker_id = %worker_id, error = %error, "worker failed hard");
                }
                Err(error) => {
                    tracing::error!(worker_id = %worker_id, error = %error, "worker panicked");
                }
            }
        });

        receiver
    }
}

async fn forward<C: FetchContinuation>(mut signals: mpsc::UnboundedReceiver<WorkerSignal>, mut continuation: C) {
    while let Some(signal) = signals.recv().await {
        match signal {
            WorkerSignal::Started { .. } => continuation.on_started(),
            WorkerSignal::Fetched { fetched, .. } => continuation.on_fetched(fetched),
            WorkerSignal::Alerted { failure, .. } => continuation.on_alerted(failure),
            WorkerSignal::Stopped { .. } => continuation.on_stopped(),
        }
    }
}
