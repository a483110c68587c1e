//! Request/response correlation.
//!
//! Each outbound request gets a fresh numeric id written into the envelope's
//! `cid`. The pending entry lives in a concurrent map until exactly one of
//! three things removes it: a matching response, a timeout, or a bulk drain
//! when the connection drops. Whoever removes the entry owns the completion,
//! so a request is never resolved twice.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::adapter::EnvelopeSink;
use crate::envelope::{Envelope, Payload};
use crate::error::RealtimeError;

/// Outcome delivered to the waiting caller.
pub type RequestResult = Result<Payload, RealtimeError>;

/// One in-flight request.
struct PendingRequest {
    created_at: Instant,
    slot: oneshot::Sender<RequestResult>,
}

type PendingMap = DashMap<u64, PendingRequest>;

/// Table of requests waiting for a response.
pub struct CorrelationTable {
    pending: Arc<PendingMap>,
    next_cid: AtomicU64,
    sink: Arc<dyn EnvelopeSink>,
}

impl CorrelationTable {
    /// Create an empty table transmitting through `sink`.
    pub fn new(sink: Arc<dyn EnvelopeSink>) -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            next_cid: AtomicU64::new(1),
            sink,
        }
    }

    /// Register a request, transmit it, and return a handle for the response.
    ///
    /// The entry is registered before the frame is written so a fast response
    /// cannot arrive ahead of it. `timeout` covers the write as well as the
    /// wait for the response. A transmit failure removes the entry and is
    /// returned directly.
    pub async fn send(
        &self,
        payload: Payload,
        timeout: Duration,
    ) -> Result<PendingHandle, RealtimeError> {
        let cid = self.next_cid.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let created_at = Instant::now();
        self.pending.insert(
            cid,
            PendingRequest {
                created_at,
                slot: tx,
            },
        );

        let envelope = Envelope::new(payload).with_cid(cid);
        let name = envelope.payload_name();
        let deadline = created_at + timeout;
        match tokio::time::timeout_at(deadline, self.sink.send_envelope(envelope)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.pending.remove(&cid);
                return Err(e);
            }
            Err(_) => {
                self.pending.remove(&cid);
                tracing::debug!(cid, payload = name, ?timeout, "Request write timed out");
                return Err(RealtimeError::RequestTimeout { cid, timeout });
            }
        }
        tracing::trace!(cid, payload = name, "Request sent");

        Ok(PendingHandle {
            cid,
            timeout,
            deadline,
            rx: Some(rx),
            pending: Arc::clone(&self.pending),
        })
    }

    /// Complete request `cid` successfully. Unknown ids are ignored.
    pub fn resolve(&self, cid: u64, payload: Payload) -> bool {
        self.complete(cid, Ok(payload))
    }

    /// Fail request `cid`. Unknown ids are ignored.
    pub fn reject(&self, cid: u64, err: RealtimeError) -> bool {
        self.complete(cid, Err(err))
    }

    fn complete(&self, cid: u64, result: RequestResult) -> bool {
        match self.pending.remove(&cid) {
            Some((_, request)) => {
                tracing::trace!(
                    cid,
                    elapsed_ms = request.created_at.elapsed().as_millis() as u64,
                    ok = result.is_ok(),
                    "Request completed"
                );
                let _ = request.slot.send(result);
                true
            }
            None => {
                tracing::debug!(cid, "Ignoring completion for unknown request");
                false
            }
        }
    }

    /// Fail every outstanding request with `err`. Returns how many were failed.
    pub fn fail_all(&self, err: RealtimeError) -> usize {
        let cids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        cids.into_iter()
            .filter(|cid| self.reject(*cid, err.clone()))
            .count()
    }

    /// Whether `cid` is still waiting.
    pub fn contains(&self, cid: u64) -> bool {
        self.pending.contains_key(&cid)
    }

    /// Number of outstanding requests.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no requests are outstanding.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Caller's side of one pending request.
///
/// Dropping the handle cancels the request: its entry is removed and a late
/// response is ignored.
pub struct PendingHandle {
    cid: u64,
    timeout: Duration,
    deadline: Instant,
    rx: Option<oneshot::Receiver<RequestResult>>,
    pending: Arc<PendingMap>,
}

impl PendingHandle {
    /// Correlation id assigned to the request.
    pub fn cid(&self) -> u64 {
        self.cid
    }

    /// Wait for the response, a failure, or the timeout.
    pub async fn wait(mut self) -> RequestResult {
        let Some(mut rx) = self.rx.take() else {
            return Err(RealtimeError::Cancelled);
        };
        match tokio::time::timeout_at(self.deadline, &mut rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RealtimeError::ConnectionLost),
            Err(_) => {
                if self.pending.remove(&self.cid).is_some() {
                    tracing::debug!(cid = self.cid, timeout = ?self.timeout, "Request timed out");
                    Err(RealtimeError::RequestTimeout {
                        cid: self.cid,
                        timeout: self.timeout,
                    })
                } else {
                    // A completion removed the entry first; its result is in the slot.
                    rx.await.unwrap_or(Err(RealtimeError::ConnectionLost))
                }
            }
        }
    }
}

impl Drop for PendingHandle {
    fn drop(&mut self) {
        self.pending.remove(&self.cid);
    }
}
