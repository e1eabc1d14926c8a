//! Circuit breaker for external integrations.
//!
//! Three states per breaker: `Closed` (normal), `Open` (reject calls),
//! `HalfOpen` (single trial call). The threshold counts *consecutive*
//! failures: any success in `Closed` resets the counter. All transitions are
//! serialized through one mutex, and `can_execute` is a checked side effect
//! (it may transition `Open → HalfOpen`), so callers must invoke it exactly
//! once per attempted call.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, tracking consecutive failures.
    Closed,
    /// Rejecting all calls until the recovery timeout elapses.
    Open,
    /// One trial call in flight; its outcome decides the next state.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// Time to wait after the last failure before allowing a trial call.
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

/// Clock abstraction so tests can drive the recovery window deterministically.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Monotonic-ish current time in milliseconds.
    fn now_ms(&self) -> u64;
}

/// System clock.
#[derive(Debug, Default)]
pub struct RealClock;

impl Clock for RealClock {
    fn now_ms(&self) -> u64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure_ms: Option<u64>,
    trial_in_flight: bool,
}

/// Per-integration circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::with_clock(name, config, Arc::new(RealClock))
    }

    pub fn with_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            clock,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_ms: None,
                trial_in_flight: false,
            }),
        }
    }

    /// Current state (for monitoring).
    pub async fn state(&self) -> CircuitState {
        self.inner.lock().await.state
    }

    /// Current consecutive-failure count.
    pub async fn failure_count(&self) -> u32 {
        self.inner.lock().await.failure_count
    }

    /// Whether a call may proceed. May transition `Open → HalfOpen`, and in
    /// half-open admits only the single trial caller.
    pub async fn can_execute(&self) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let recovered = inner.last_failure_ms.is_some_and(|last| {
                    self.clock.now_ms().saturating_sub(last)
                        >= self.config.recovery_timeout.as_millis() as u64
                });
                if recovered {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                    inner.trial_in_flight = true;
                    info!(breaker = %self.name, "circuit breaker attempting recovery");
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    false
                } else {
                    inner.trial_in_flight = true;
                    true
                }
            }
        }
    }

    /// Record a successful call.
    pub async fn record_success(&self) {
        let mut inner = self.inner.lock().await;
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                self.transition(&mut inner, CircuitState::Closed);
                inner.failure_count = 0;
                inner.last_failure_ms = None;
                inner.trial_in_flight = false;
                info!(breaker = %self.name, "circuit breaker closed - calls restored");
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed call.
    pub async fn record_failure(&self) {
        let mut inner = self.inner.lock().await;
        inner.failure_count += 1;
        inner.last_failure_ms = Some(self.clock.now_ms());

        match inner.state {
            CircuitState::HalfOpen => {
                self.transition(&mut inner, CircuitState::Open);
                inner.trial_in_flight = false;
                error!(
                    breaker = %self.name,
                    failure_count = inner.failure_count,
                    recovery_timeout_secs = self.config.recovery_timeout.as_secs(),
                    "circuit breaker reopened - trial call failed"
                );
            }
            CircuitState::Closed if inner.failure_count >= self.config.failure_threshold => {
                self.transition(&mut inner, CircuitState::Open);
                error!(
                    breaker = %self.name,
                    failure_count = inner.failure_count,
                    recovery_timeout_secs = self.config.recovery_timeout.as_secs(),
                    "circuit breaker opened - calls disabled"
                );
            }
            _ => {}
        }
    }

    fn transition(&self, inner: &mut BreakerInner, new_state: CircuitState) {
        let previous = inner.state;
        inner.state = new_state;
        warn!(
            breaker = %self.name,
            previous_state = previous.as_str(),
            new_state = new_state.as_str(),
            failure_count = inner.failure_count,
            "circuit breaker state changed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering::Relaxed};

    #[derive(Debug, Default)]
    struct TestClock {
        now: AtomicU64,
    }

    impl TestClock {
        fn advance(&self, ms: u64) {
            self.now.fetch_add(ms, Relaxed);
        }
    }

    impl Clock for TestClock {
        fn now_ms(&self) -> u64 {
            self.now.load(Relaxed)
        }
    }

    fn breaker(threshold: u32, recovery_ms: u64) -> (CircuitBreaker, Arc<TestClock>) {
        let clock = Arc::new(TestClock::default());
        let cb = CircuitBreaker::with_clock(
            "test",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                recovery_timeout: Duration::from_millis(recovery_ms),
            },
            clock.clone(),
        );
        (cb, clock)
    }

    #[tokio::test]
    async fn threshold_counts_consecutive_failures_only() {
        let (cb, _clock) = breaker(3, 1_000);

        cb.record_failure().await;
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Closed);

        // Success resets the counter, so the next failure is 1/3 again.
        cb.record_success().await;
        assert_eq!(cb.failure_count().await, 0);

        cb.record_failure().await;
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn open_rejects_until_recovery_timeout() {
        let (cb, clock) = breaker(1, 5_000);
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Open);
        assert!(!cb.can_execute().await);

        clock.advance(4_999);
        assert!(!cb.can_execute().await);

        clock.advance(1);
        assert!(cb.can_execute().await);
        assert_eq!(cb.state().await, CircuitState::HalfOpen);
    }

    #[tokio::test]
    async fn half_open_admits_a_single_trial_caller() {
        let (cb, clock) = breaker(1, 100);
        cb.record_failure().await;
        clock.advance(100);

        // First caller transitions and is admitted; the second is not.
        assert!(cb.can_execute().await);
        assert!(!cb.can_execute().await);

        cb.record_success().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
        assert_eq!(cb.failure_count().await, 0);
        assert!(cb.can_execute().await);
    }

    #[tokio::test]
    async fn half_open_failure_restarts_the_window() {
        let (cb, clock) = breaker(1, 100);
        cb.record_failure().await;
        clock.advance(100);
        assert!(cb.can_execute().await);

        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Open);
        assert!(!cb.can_execute().await);

        // The window restarts from the trial failure.
        clock.advance(99);
        assert!(!cb.can_execute().await);
        clock.advance(1);
        assert!(cb.can_execute().await);
    }
}
