//! Rate-limited FIFO dispatch of outbound operations.
//!
//! Operations are queued in submission order and run one at a time by a
//! single worker task, each after taking a token from the [`TokenBucket`].
//! The caller gets a [`QueueTicket`] resolving to the operation's own result.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::RealtimeError;
use crate::rate_limit::TokenBucket;

struct QueueItem {
    job: BoxFuture<'static, ()>,
    enqueued_at: Instant,
}

/// Handle to one queued operation's result.
pub struct QueueTicket<T> {
    rx: oneshot::Receiver<Result<T, RealtimeError>>,
}

impl<T> QueueTicket<T> {
    /// Wait for the operation to run and return its result.
    pub async fn wait(self) -> Result<T, RealtimeError> {
        self.rx.await.unwrap_or(Err(RealtimeError::Cancelled))
    }
}

/// Single-worker queue draining at the bucket's rate.
pub struct DispatchQueue {
    tx: Mutex<Option<mpsc::UnboundedSender<QueueItem>>>,
    /// Held until the first enqueue spawns the worker.
    rx: Mutex<Option<mpsc::UnboundedReceiver<QueueItem>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    /// Operations queued or running.
    outstanding: Arc<watch::Sender<usize>>,
    limiter: Arc<TokenBucket>,
}

impl DispatchQueue {
    /// Create a queue drawing tokens from `limiter`. The worker starts on
    /// first use.
    pub fn new(limiter: TokenBucket) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
            worker: Mutex::new(None),
            outstanding: Arc::new(watch::Sender::new(0)),
            limiter: Arc::new(limiter),
        }
    }

    /// Queue `op`. It runs after every previously queued operation and after
    /// a token is available.
    pub fn enqueue<F, Fut, T>(&self, op: F) -> Result<QueueTicket<T>, RealtimeError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, RealtimeError>> + Send + 'static,
        T: Send + 'static,
    {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = guard.as_ref() else {
            return Err(RealtimeError::QueueClosed);
        };
        self.ensure_worker();

        let (result_tx, rx) = oneshot::channel();
        let job = async move {
            let _ = result_tx.send(op().await);
        }
        .boxed();

        self.outstanding.send_modify(|n| *n += 1);
        let item = QueueItem {
            job,
            enqueued_at: Instant::now(),
        };
        if sender.send(item).is_err() {
            self.outstanding.send_modify(|n| *n = n.saturating_sub(1));
            return Err(RealtimeError::QueueClosed);
        }
        Ok(QueueTicket { rx })
    }

    fn ensure_worker(&self) {
        let Some(rx) = self.rx.lock().unwrap_or_else(PoisonError::into_inner).take() else {
            return;
        };
        let handle = tokio::spawn(run_worker(
            rx,
            Arc::clone(&self.limiter),
            Arc::clone(&self.outstanding),
        ));
        *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Wait until every queued operation has finished.
    pub async fn drain(&self) {
        let mut rx = self.outstanding.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Stop accepting work, finish what is queued, then stop the worker.
    /// Idempotent.
    pub async fn shutdown(&self) {
        let sender = self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
        if sender.is_some() {
            tracing::debug!(outstanding = self.len(), "Shutting down dispatch queue");
        }
        self.drain().await;
        drop(sender);

        let worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }
    }

    /// Operations queued or running.
    pub fn len(&self) -> usize {
        *self.outstanding.borrow()
    }

    /// Whether nothing is queued or running.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_closed(&self) -> bool {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).is_none()
    }

    /// Tokens currently available to the worker.
    pub fn available_tokens(&self) -> u32 {
        self.limiter.available_tokens()
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<QueueItem>,
    limiter: Arc<TokenBucket>,
    outstanding: Arc<watch::Sender<usize>>,
) {
    while let Some(item) = rx.recv().await {
        limiter.acquire().await;
        tracing::trace!(
            queued_ms = item.enqueued_at.elapsed().as_millis() as u64,
            "Dispatching queued operation"
        );
        if AssertUnwindSafe(item.job).catch_unwind().await.is_err() {
            tracing::error!("Queued operation panicked");
        }
        outstanding.send_modify(|n| *n = n.saturating_sub(1));
    }
    tracing::debug!("Dispatch worker stopped");
}
