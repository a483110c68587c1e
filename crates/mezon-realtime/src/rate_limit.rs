//! Token bucket limiting how fast requests reach the socket.
//!
//! Credit is tracked in integer units so refills are exact: one token is
//! worth `period` nanoseconds of credit and every elapsed nanosecond adds
//! `capacity` units. A full bucket holds `capacity` tokens.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

struct BucketState {
    credit: u128,
    last_refill: Instant,
}

/// Allows `capacity` operations per `period`, with bursts up to `capacity`.
pub struct TokenBucket {
    state: Mutex<BucketState>,
    capacity: u32,
    period_nanos: u128,
}

impl TokenBucket {
    /// Create a full bucket. Zero capacity or period is raised to the
    /// smallest usable value.
    pub fn new(capacity: u32, period: Duration) -> Self {
        let capacity = capacity.max(1);
        let period_nanos = period.as_nanos().max(1);
        Self {
            state: Mutex::new(BucketState {
                credit: u128::from(capacity) * period_nanos,
                last_refill: Instant::now(),
            }),
            capacity,
            period_nanos,
        }
    }

    /// Maximum number of tokens the bucket holds.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_nanos();
        if elapsed > 0 {
            let max = u128::from(self.capacity) * self.period_nanos;
            state.credit = (state.credit + elapsed * u128::from(self.capacity)).min(max);
            state.last_refill = now;
        }
    }

    /// Take a token if one is available, otherwise return how long until one is.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut state);
        if state.credit >= self.period_nanos {
            state.credit -= self.period_nanos;
            return Ok(());
        }
        let missing = self.period_nanos - state.credit;
        let wait = missing.div_ceil(u128::from(self.capacity));
        Err(Duration::from_nanos(u64::try_from(wait).unwrap_or(u64::MAX)))
    }

    /// Wait until a token is available and take it.
    pub async fn acquire(&self) {
        loop {
            match self.try_acquire() {
                Ok(()) => return,
                Err(wait) => {
                    tracing::trace!(wait_ms = wait.as_millis() as u64, "Rate limited");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Whole tokens available right now.
    pub fn available_tokens(&self) -> u32 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut state);
        u32::try_from(state.credit / self.period_nanos).unwrap_or(self.capacity)
    }
}
