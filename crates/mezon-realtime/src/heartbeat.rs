//! Application-level liveness probing.
//!
//! While the connection is open, a correlated `Ping` is sent every interval
//! and must be answered within the probe timeout. After the configured number
//! of consecutive failures the monitor runs its failure hook, which forces the
//! connection closed as lost so the reconnect path takes over.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::adapter::ConnectionState;
use crate::correlation::CorrelationTable;
use crate::envelope::{Payload, Ping};

/// Probe cycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatState {
    /// Not running.
    Idle,
    /// Waiting for the next probe.
    Armed,
    /// A probe is in flight.
    ProbeSent,
    /// Liveness was lost and the failure hook ran.
    TimedOut,
}

/// Heartbeat timing.
#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatConfig {
    /// Delay between the end of one probe and the next.
    pub interval: Duration,
    /// How long a probe may go unanswered.
    pub timeout: Duration,
    /// Consecutive failed probes that count as lost liveness.
    pub max_consecutive_failures: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(10),
            max_consecutive_failures: 1,
        }
    }
}

/// Called once when liveness is lost.
pub type FailureHook = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

struct ProbeContext {
    run: u64,
    current_run: Arc<AtomicU64>,
    config: HeartbeatConfig,
    correlation: Arc<CorrelationTable>,
    state: Arc<watch::Sender<HeartbeatState>>,
    last_rtt: Arc<Mutex<Option<Duration>>>,
    on_failure: FailureHook,
}

impl ProbeContext {
    fn is_current(&self) -> bool {
        self.current_run.load(Ordering::SeqCst) == self.run
    }

    fn set_state(&self, state: HeartbeatState) {
        if self.is_current() {
            self.state.send_replace(state);
        }
    }
}

/// Runs one probe loop per established connection.
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    correlation: Arc<CorrelationTable>,
    state: Arc<watch::Sender<HeartbeatState>>,
    last_rtt: Arc<Mutex<Option<Duration>>>,
    current_run: Arc<AtomicU64>,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
}

impl HeartbeatMonitor {
    /// Create an idle monitor probing through `correlation`.
    pub fn new(config: HeartbeatConfig, correlation: Arc<CorrelationTable>) -> Self {
        Self {
            config,
            correlation,
            state: Arc::new(watch::Sender::new(HeartbeatState::Idle)),
            last_rtt: Arc::new(Mutex::new(None)),
            current_run: Arc::new(AtomicU64::new(0)),
            shutdown: Mutex::new(None),
        }
    }

    /// Start probing. Replaces any running loop. The loop ends on its own once
    /// `connection` leaves [`ConnectionState::Connected`].
    pub fn start(&self, connection: watch::Receiver<ConnectionState>, on_failure: FailureHook) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let previous = self
            .shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(shutdown_tx);
        if let Some(previous) = previous {
            let _ = previous.send(true);
        }

        let run = self.current_run.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_replace(HeartbeatState::Armed);
        let ctx = ProbeContext {
            run,
            current_run: Arc::clone(&self.current_run),
            config: self.config.clone(),
            correlation: Arc::clone(&self.correlation),
            state: Arc::clone(&self.state),
            last_rtt: Arc::clone(&self.last_rtt),
            on_failure,
        };
        tracing::debug!(
            interval_ms = self.config.interval.as_millis() as u64,
            timeout_ms = self.config.timeout.as_millis() as u64,
            "Heartbeat started"
        );
        tokio::spawn(probe_loop(ctx, connection, shutdown_rx));
    }

    /// Stop probing. A timed-out monitor keeps reporting
    /// [`HeartbeatState::TimedOut`] until started again.
    pub fn stop(&self) {
        self.current_run.fetch_add(1, Ordering::SeqCst);
        if let Some(tx) = self
            .shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = tx.send(true);
        }
        self.state.send_if_modified(|state| {
            if *state == HeartbeatState::TimedOut || *state == HeartbeatState::Idle {
                false
            } else {
                *state = HeartbeatState::Idle;
                true
            }
        });
    }

    /// Current probe cycle state.
    pub fn state(&self) -> HeartbeatState {
        *self.state.borrow()
    }

    /// Observe state changes.
    pub fn subscribe(&self) -> watch::Receiver<HeartbeatState> {
        self.state.subscribe()
    }

    /// Round-trip time of the last answered probe.
    pub fn last_rtt(&self) -> Option<Duration> {
        *self.last_rtt.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn probe_loop(
    ctx: ProbeContext,
    mut connection: watch::Receiver<ConnectionState>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut failures = 0u32;
    let threshold = ctx.config.max_consecutive_failures.max(1);

    loop {
        if !ctx.is_current() || *connection.borrow() != ConnectionState::Connected {
            break;
        }
        ctx.set_state(HeartbeatState::Armed);

        tokio::select! {
            _ = tokio::time::sleep(ctx.config.interval) => {}
            _ = shutdown.changed() => break,
            changed = connection.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
        }
        if !ctx.is_current() || *connection.borrow() != ConnectionState::Connected {
            break;
        }

        ctx.set_state(HeartbeatState::ProbeSent);
        let started = Instant::now();
        let outcome = match ctx
            .correlation
            .send(Payload::Ping(Ping {}), ctx.config.timeout)
            .await
        {
            Ok(handle) => tokio::select! {
                result = handle.wait() => result,
                _ = shutdown.changed() => break,
            },
            Err(e) => Err(e),
        };

        // A probe failing because the socket went away is not a liveness verdict.
        if !ctx.is_current() || *connection.borrow() != ConnectionState::Connected {
            break;
        }

        match outcome {
            Ok(_) => {
                failures = 0;
                let rtt = started.elapsed();
                *ctx.last_rtt.lock().unwrap_or_else(PoisonError::into_inner) = Some(rtt);
                tracing::trace!(rtt_ms = rtt.as_millis() as u64, "Heartbeat acknowledged");
            }
            Err(e) => {
                failures += 1;
                tracing::warn!(failures, threshold, error = %e, "Heartbeat probe failed");
                if failures >= threshold {
                    tracing::warn!("Heartbeat timed out, dropping connection");
                    ctx.set_state(HeartbeatState::TimedOut);
                    (ctx.on_failure)().await;
                    return;
                }
            }
        }
    }
    ctx.set_state(HeartbeatState::Idle);
}
