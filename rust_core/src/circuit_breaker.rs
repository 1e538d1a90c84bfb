//! Circuit breaker guarding the downstream odds API.
//!
//! Only transient failures (network, timeouts, 5xx) count against the
//! breaker. A conflict or a validation rejection means the API answered, so
//! it counts as a healthy call.

use crate::error::ApiError;
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls flow normally
    Closed,
    /// Calls fail fast until the cool-down elapses
    Open,
    /// Probing: a few calls are let through to test recovery
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive transient failures that open the breaker
    pub failure_threshold: u32,
    pub cool_down: Duration,
    /// Successful probes needed to close again
    pub success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cool_down: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    probe_successes: u32,
    opened_at: Option<Instant>,
}

#[derive(Debug)]
pub struct DownstreamBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl DownstreamBreaker {
    pub fn new(name: &str, config: BreakerConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                probe_successes: 0,
                opened_at: None,
            }),
        }
    }

    /// Fail fast with a transient error while the breaker is open.
    pub fn check(&self) -> Result<(), ApiError> {
        let mut inner = self.inner.lock();
        if inner.state != BreakerState::Open {
            return Ok(());
        }

        let cooled = inner
            .opened_at
            .map(|t| t.elapsed() >= self.config.cool_down)
            .unwrap_or(true);
        if cooled {
            inner.state = BreakerState::HalfOpen;
            inner.probe_successes = 0;
            return Ok(());
        }

        Err(ApiError::Transient {
            status: None,
            message: format!("circuit breaker '{}' is open", self.name),
        })
    }

    /// Feed the outcome of a call back into the breaker.
    pub fn record<T>(&self, outcome: &Result<T, ApiError>) {
        match outcome {
            Err(err) if err.is_transient() => self.record_failure(),
            _ => self.record_success(),
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        let state = inner.state;
        match state {
            BreakerState::HalfOpen => {
                inner.probe_successes += 1;
                if inner.probe_successes >= self.config.success_threshold {
                    inner.state = BreakerState::Closed;
                    inner.opened_at = None;
                    info!(breaker = %self.name, "Downstream circuit closed");
                }
            }
            _ => inner.state = BreakerState::Closed,
        }
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures += 1;
        let (state, failures) = (inner.state, inner.consecutive_failures);
        match state {
            BreakerState::Closed if failures >= self.config.failure_threshold => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                warn!(
                    breaker = %self.name,
                    failures,
                    "Downstream circuit opened"
                );
            }
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                warn!(breaker = %self.name, "Downstream circuit re-opened during probe");
            }
            _ => {}
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transient() -> Result<(), ApiError> {
        Err(ApiError::Transient {
            status: Some(503),
            message: "unavailable".to_string(),
        })
    }

    fn breaker(cool_down: Duration) -> DownstreamBreaker {
        DownstreamBreaker::new(
            "clm",
            BreakerConfig {
                failure_threshold: 3,
                cool_down,
                success_threshold: 1,
            },
        )
    }

    #[test]
    fn test_opens_after_consecutive_transient_failures() {
        let b = breaker(Duration::from_secs(60));
        for _ in 0..2 {
            b.record(&transient());
        }
        assert_eq!(b.state(), BreakerState::Closed);
        b.record(&transient());
        assert_eq!(b.state(), BreakerState::Open);

        let err = b.check().unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_rejections_do_not_count() {
        let b = breaker(Duration::from_secs(60));
        for _ in 0..10 {
            b.record::<()>(&Err(ApiError::Rejected {
                status: 400,
                body: "bad".to_string(),
            }));
        }
        assert_eq!(b.state(), BreakerState::Closed);
        assert!(b.check().is_ok());
    }

    #[test]
    fn test_half_open_probe() {
        let b = breaker(Duration::from_millis(0));
        for _ in 0..3 {
            b.record(&transient());
        }
        assert_eq!(b.state(), BreakerState::Open);

        // Cool-down of zero: the next check moves to half-open
        assert!(b.check().is_ok());
        assert_eq!(b.state(), BreakerState::HalfOpen);

        b.record(&transient());
        assert_eq!(b.state(), BreakerState::Open);

        assert!(b.check().is_ok());
        b.record(&Ok(()));
        assert_eq!(b.state(), BreakerState::Closed);
    }
}
