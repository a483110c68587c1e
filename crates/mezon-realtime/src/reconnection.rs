//! Automatic reconnection with exponential backoff.
//!
//! The [`ReconnectController`] is told about every connection closure. A lost
//! connection starts a single backoff loop; further losses while that loop
//! runs are folded into it. An intentional close disables the controller and
//! cancels any pending attempt until the next explicit connect re-arms it.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use rand::Rng;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::adapter::CloseReason;
use crate::error::RealtimeError;

/// Configuration for reconnection behaviour.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first attempt. Default: 5 s.
    pub initial_delay: Duration,
    /// Multiplier applied to the delay after each failed attempt. Default: 2.0.
    pub backoff_multiplier: f64,
    /// Maximum delay between attempts. Default: 60 s.
    pub max_delay: Duration,
    /// Attempts before giving up, or `None` to retry forever. Default: `None`.
    pub max_attempts: Option<u32>,
    /// Jitter factor (0.0–1.0). Applied as ±jitter to the delay. Default: 0.25.
    pub jitter: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            max_attempts: None,
            jitter: 0.25,
        }
    }
}

/// Tracks the attempt count and computes the next backoff delay.
pub struct Backoff {
    config: ReconnectConfig,
    attempts: u32,
    current_delay: Duration,
}

impl Backoff {
    /// Create a new backoff from the given config.
    pub fn new(config: ReconnectConfig) -> Self {
        let initial = config.initial_delay;
        Self {
            config,
            attempts: 0,
            current_delay: initial,
        }
    }

    /// Compute the next delay and advance the attempt counter.
    /// Returns `None` once the attempt limit is reached.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self
            .config
            .max_attempts
            .is_some_and(|max| self.attempts >= max)
        {
            return None;
        }

        let base = self.current_delay;
        self.attempts = self.attempts.saturating_add(1);

        let cap = self.config.max_delay;
        // Uniform in [base * (1 - jitter), base * (1 + jitter)].
        let jitter = self.config.jitter.clamp(0.0, 1.0);
        let jittered = if jitter > 0.0 {
            let factor = rand::rng().random_range((1.0 - jitter)..=(1.0 + jitter));
            scale_capped(base, factor, cap)
        } else {
            base.min(cap)
        };

        self.current_delay =
            scale_capped(self.current_delay, self.config.backoff_multiplier.max(1.0), cap);

        Some(jittered)
    }

    /// Start over from the initial delay.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.current_delay = self.config.initial_delay;
    }

    /// Number of delays handed out so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// `delay * factor`, saturating at `cap` on overflow or a non-finite factor.
fn scale_capped(delay: Duration, factor: f64, cap: Duration) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor).map_or(cap, |d| d.min(cap))
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Reconnect controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectState {
    /// Waiting for a connection loss.
    Idle,
    /// Sleeping before the next attempt.
    AwaitingBackoff,
    /// An attempt is in flight.
    Attempting,
    /// Disabled by an intentional close.
    Disabled,
}

/// What the controller drives. Implemented by the client.
pub trait Reconnector: Send + Sync {
    /// Re-establish the connection and restore any server-side subscriptions.
    fn reconnect(&self) -> BoxFuture<'_, Result<(), RealtimeError>>;

    /// Whether the connection is open right now.
    fn is_connected(&self) -> bool;
}

struct LoopContext {
    config: ReconnectConfig,
    state: Arc<watch::Sender<ReconnectState>>,
    attempts: Arc<AtomicU32>,
    connector: Arc<dyn Reconnector>,
}

impl LoopContext {
    fn transition(&self, from: ReconnectState, to: ReconnectState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        })
    }
}

/// Serialises reconnect attempts for one client.
pub struct ReconnectController {
    config: ReconnectConfig,
    state: Arc<watch::Sender<ReconnectState>>,
    cancel: Mutex<CancellationToken>,
    attempts: Arc<AtomicU32>,
    connector: Arc<dyn Reconnector>,
}

impl ReconnectController {
    /// Create an idle controller driving `connector`.
    pub fn new(config: ReconnectConfig, connector: Arc<dyn Reconnector>) -> Self {
        Self {
            config,
            state: Arc::new(watch::Sender::new(ReconnectState::Idle)),
            cancel: Mutex::new(CancellationToken::new()),
            attempts: Arc::new(AtomicU32::new(0)),
            connector,
        }
    }

    /// Current state.
    pub fn state(&self) -> ReconnectState {
        *self.state.borrow()
    }

    /// Observe state changes.
    pub fn subscribe(&self) -> watch::Receiver<ReconnectState> {
        self.state.subscribe()
    }

    /// Reconnect attempts made over the controller's lifetime.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Re-enable after an intentional close. Called on explicit connect.
    pub fn arm(&self) {
        let mut cancel = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
        if cancel.is_cancelled() {
            *cancel = CancellationToken::new();
        }
        if self.state.send_if_modified(|state| {
            if *state == ReconnectState::Disabled {
                *state = ReconnectState::Idle;
                true
            } else {
                false
            }
        }) {
            tracing::debug!("Reconnect re-armed");
        }
    }

    /// Disable reconnection and cancel any pending attempt.
    pub fn disable(&self) {
        self.state.send_replace(ReconnectState::Disabled);
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    /// React to a connection closure.
    pub fn on_close(&self, reason: CloseReason) {
        match reason {
            CloseReason::Intentional => {
                tracing::debug!("Intentional close, reconnect disabled");
                self.disable();
            }
            CloseReason::Lost => self.schedule(),
        }
    }

    fn schedule(&self) {
        let started = self.state.send_if_modified(|state| {
            if *state == ReconnectState::Idle {
                *state = ReconnectState::AwaitingBackoff;
                true
            } else {
                false
            }
        });
        if !started {
            tracing::debug!(state = ?self.state(), "Connection loss folded into current reconnect state");
            return;
        }

        let token = {
            let mut cancel = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
            if cancel.is_cancelled() {
                *cancel = CancellationToken::new();
            }
            cancel.clone()
        };
        let ctx = LoopContext {
            config: self.config.clone(),
            state: Arc::clone(&self.state),
            attempts: Arc::clone(&self.attempts),
            connector: Arc::clone(&self.connector),
        };
        tokio::spawn(reconnect_loop(ctx, token));
    }
}

/// Sleep, attempt, and repeat until connected, disabled or out of attempts.
async fn reconnect_loop(ctx: LoopContext, token: CancellationToken) {
    let mut backoff = Backoff::new(ctx.config.clone());

    loop {
        let Some(delay) = backoff.next_delay() else {
            tracing::error!(attempts = backoff.attempts(), "Reconnect attempts exhausted");
            ctx.transition(ReconnectState::AwaitingBackoff, ReconnectState::Idle);
            return;
        };
        tracing::info!(
            attempt = backoff.attempts(),
            delay_ms = delay.as_millis() as u64,
            "Reconnecting after backoff"
        );

        tokio::select! {
            _ = token.cancelled() => {
                tracing::debug!("Pending reconnect cancelled");
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        if !ctx.transition(ReconnectState::AwaitingBackoff, ReconnectState::Attempting) {
            return;
        }
        ctx.attempts.fetch_add(1, Ordering::SeqCst);
        let result = ctx.connector.reconnect().await;

        let retryable = result.as_ref().err().is_none_or(RealtimeError::is_retryable);
        let mut settled = None;
        ctx.state.send_if_modified(|state| {
            if *state != ReconnectState::Attempting {
                return false;
            }
            let next = if (result.is_ok() && ctx.connector.is_connected()) || !retryable {
                ReconnectState::Idle
            } else {
                ReconnectState::AwaitingBackoff
            };
            *state = next;
            settled = Some(next);
            true
        });

        match (settled, result) {
            (None, _) => {
                tracing::debug!("Reconnect disabled during attempt");
                return;
            }
            (Some(ReconnectState::Idle), Ok(())) => {
                tracing::info!(attempts = backoff.attempts(), "Reconnected");
                return;
            }
            (Some(ReconnectState::Idle), Err(e)) => {
                tracing::error!(error = %e, "Reconnect stopped on non-retryable error");
                return;
            }
            (Some(_), Ok(())) => {
                tracing::warn!("Connection dropped again while reconnecting");
            }
            (Some(_), Err(e)) => {
                tracing::warn!(attempt = backoff.attempts(), error = %e, "Reconnect attempt failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use tokio::time::Instant;

    fn config_no_jitter() -> ReconnectConfig {
        ReconnectConfig {
            jitter: 0.0,
            ..Default::default()
        }
    }

    fn fast_config() -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            jitter: 0.0,
            ..Default::default()
        }
    }

    #[derive(Default)]
    struct FakeReconnector {
        fail_first: u32,
        stale_successes: u32,
        calls: AtomicU32,
        connected: AtomicBool,
        called_at: Mutex<Vec<Instant>>,
    }

    impl Reconnector for FakeReconnector {
        fn reconnect(&self) -> BoxFuture<'_, Result<(), RealtimeError>> {
            Box::pin(async move {
                let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
                self.called_at.lock().unwrap().push(Instant::now());
                if call <= self.fail_first {
                    return Err(RealtimeError::Transport("refused".into()));
                }
                let stale = call <= self.fail_first + self.stale_successes;
                self.connected.store(!stale, Ordering::SeqCst);
                Ok(())
            })
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }
    }

    fn controller(fake: FakeReconnector, config: ReconnectConfig) -> (Arc<FakeReconnector>, ReconnectController) {
        let fake = Arc::new(fake);
        let controller = ReconnectController::new(config, fake.clone());
        (fake, controller)
    }

    #[test]
    fn test_backoff_sequence_is_exponential() {
        let mut backoff = Backoff::new(config_no_jitter());

        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(5)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(10)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(20)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(40)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(60)), "Capped");
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_oversized_multiplier_saturates_at_max_delay() {
        for multiplier in [f64::INFINITY, 1e300, f64::NAN] {
            let mut backoff = Backoff::new(ReconnectConfig {
                backoff_multiplier: multiplier,
                ..config_no_jitter()
            });
            assert_eq!(backoff.next_delay(), Some(Duration::from_secs(5)));
            let second = backoff.next_delay().unwrap();
            assert!(second <= Duration::from_secs(60), "{multiplier}: {second:?}");
            assert!(backoff.next_delay().unwrap() <= Duration::from_secs(60));
        }
    }

    #[test]
    fn test_unbounded_attempts_never_exhaust() {
        let mut backoff = Backoff::new(config_no_jitter());
        for _ in 0..1000 {
            assert!(backoff.next_delay().is_some());
        }
        assert_eq!(backoff.attempts(), 1000);
    }

    #[test]
    fn test_max_attempts_exhausted() {
        let mut backoff = Backoff::new(ReconnectConfig {
            max_attempts: Some(3),
            ..config_no_jitter()
        });

        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_none());
    }

    #[test]
    fn test_reset_restores_initial_delay() {
        let mut backoff = Backoff::new(config_no_jitter());
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.attempts(), 2);

        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_jitter_stays_within_bounds_and_varies() {
        let mut delays = Vec::new();
        for _ in 0..20 {
            let mut backoff = Backoff::new(ReconnectConfig::default());
            delays.push(backoff.next_delay().unwrap());
        }

        for d in &delays {
            assert!(
                *d >= Duration::from_millis(3750) && *d <= Duration::from_millis(6250),
                "Jittered delay out of range: {d:?}"
            );
        }
        let all_same = delays.windows(2).all(|w| w[0] == w[1]);
        assert!(!all_same, "Jitter should cause variation in delays: {delays:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_connection_reconnects_after_initial_delay() {
        let (fake, controller) = controller(FakeReconnector::default(), fast_config());

        controller.on_close(CloseReason::Lost);
        assert_eq!(controller.state(), ReconnectState::AwaitingBackoff);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);
        assert_eq!(controller.state(), ReconnectState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_attempts_back_off_exponentially() {
        let (fake, controller) = controller(
            FakeReconnector {
                fail_first: 2,
                ..Default::default()
            },
            fast_config(),
        );
        let start = Instant::now();

        controller.on_close(CloseReason::Lost);
        tokio::time::sleep(Duration::from_secs(2)).await;

        let offsets: Vec<u128> = fake
            .called_at
            .lock()
            .unwrap()
            .iter()
            .map(|at| at.duration_since(start).as_millis())
            .collect();
        assert_eq!(offsets.len(), 3);
        for (offset, expected) in offsets.iter().zip([100u128, 300, 700]) {
            assert!(
                *offset >= expected && *offset < expected + 10,
                "Attempt at {offset}ms, expected ~{expected}ms"
            );
        }
        assert_eq!(controller.state(), ReconnectState::Idle);
        assert_eq!(controller.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_infinite_multiplier_keeps_reconnecting() {
        let (fake, controller) = controller(
            FakeReconnector {
                fail_first: 1,
                ..Default::default()
            },
            ReconnectConfig {
                backoff_multiplier: f64::INFINITY,
                ..fast_config()
            },
        );
        let start = Instant::now();

        controller.on_close(CloseReason::Lost);
        tokio::time::sleep(Duration::from_secs(2)).await;

        let offsets: Vec<u128> = fake
            .called_at
            .lock()
            .unwrap()
            .iter()
            .map(|at| at.duration_since(start).as_millis())
            .collect();
        assert_eq!(offsets.len(), 2);
        assert!(offsets[1] >= 1100 && offsets[1] < 1110, "Second attempt at {}ms", offsets[1]);
        assert_eq!(controller.state(), ReconnectState::Idle);

        // A later loss still starts a new cycle.
        controller.on_close(CloseReason::Lost);
        assert_eq!(controller.state(), ReconnectState::AwaitingBackoff);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_losses_start_one_loop() {
        let (fake, controller) = controller(FakeReconnector::default(), fast_config());
        let controller = Arc::new(controller);

        let mut notifiers = Vec::new();
        for _ in 0..10 {
            let controller = Arc::clone(&controller);
            notifiers.push(tokio::spawn(async move {
                controller.on_close(CloseReason::Lost);
            }));
        }
        for notifier in notifiers {
            notifier.await.unwrap();
        }
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_intentional_close_disables_reconnect() {
        let (fake, controller) = controller(FakeReconnector::default(), fast_config());

        controller.on_close(CloseReason::Intentional);
        controller.on_close(CloseReason::Lost);
        controller.on_close(CloseReason::Lost);
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
        assert_eq!(controller.state(), ReconnectState::Disabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_intentional_close_cancels_pending_backoff() {
        let (fake, controller) = controller(FakeReconnector::default(), fast_config());

        controller.on_close(CloseReason::Lost);
        tokio::time::sleep(Duration::from_millis(50)).await;
        controller.on_close(CloseReason::Intentional);
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
        assert_eq!(controller.state(), ReconnectState::Disabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_arm_reenables_after_disable() {
        let (fake, controller) = controller(FakeReconnector::default(), fast_config());

        controller.disable();
        controller.arm();
        assert_eq!(controller.state(), ReconnectState::Idle);

        controller.on_close(CloseReason::Lost);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_success_schedules_another_attempt() {
        let (fake, controller) = controller(
            FakeReconnector {
                stale_successes: 1,
                ..Default::default()
            },
            fast_config(),
        );

        controller.on_close(CloseReason::Lost);
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(fake.calls.load(Ordering::SeqCst), 2);
        assert_eq!(controller.state(), ReconnectState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let (fake, controller) = controller(
            FakeReconnector {
                fail_first: u32::MAX,
                ..Default::default()
            },
            ReconnectConfig {
                max_attempts: Some(2),
                ..fast_config()
            },
        );

        controller.on_close(CloseReason::Lost);
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(fake.calls.load(Ordering::SeqCst), 2);
        assert_eq!(controller.state(), ReconnectState::Idle);
    }
}
