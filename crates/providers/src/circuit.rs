//! Per-provider circuit breaker. Grounded on the tool circuit breaker's
//! Closed/Open/HalfOpen state machine, simplified to the fixed (not
//! exponential) reset window spec §4.5 calls for.

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use warden_domain::model::{CircuitStatus, CircuitState as CircuitStateSnapshot};

struct Inner {
    status: CircuitStatus,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    max_failures: u32,
    reset_window: Duration,
}

impl CircuitBreaker {
    pub fn new(max_failures: u32, reset_seconds: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                status: CircuitStatus::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
            max_failures,
            reset_window: Duration::from_secs(reset_seconds),
        }
    }

    /// Whether a call may proceed right now. Transitions Open -> HalfOpen
    /// once the reset window has elapsed.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.status {
            CircuitStatus::Closed | CircuitStatus::HalfOpen => true,
            CircuitStatus::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.reset_window {
                    inner.status = CircuitStatus::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.status = CircuitStatus::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.status {
            CircuitStatus::HalfOpen => {
                inner.status = CircuitStatus::Open;
                inner.opened_at = Some(Instant::now());
            }
            CircuitStatus::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.max_failures {
                    inner.status = CircuitStatus::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitStatus::Open => {}
        }
    }

    pub fn snapshot(&self) -> CircuitStateSnapshot {
        let inner = self.inner.lock();
        CircuitStateSnapshot {
            status: inner.status,
            consecutive_failures: inner.consecutive_failures,
            opened_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_max_failures() {
        let breaker = CircuitBreaker::new(2, 60);
        assert!(breaker.allow());
        breaker.record_failure();
        assert!(breaker.allow());
        breaker.record_failure();
        assert!(!breaker.allow());
    }

    #[test]
    fn stays_open_within_reset_window() {
        let breaker = CircuitBreaker::new(1, 60);
        breaker.record_failure();
        assert_eq!(breaker.snapshot().status, CircuitStatus::Open);
        assert!(!breaker.allow());
    }

    #[test]
    fn half_open_probe_allowed_once_window_elapses() {
        let breaker = CircuitBreaker::new(1, 0);
        breaker.record_failure();
        assert!(breaker.allow());
        assert_eq!(breaker.snapshot().status, CircuitStatus::HalfOpen);
    }

    #[test]
    fn success_resets_to_closed() {
        let breaker = CircuitBreaker::new(1, 0);
        breaker.record_failure();
        assert!(breaker.allow());
        breaker.record_success();
        assert_eq!(breaker.snapshot().status, CircuitStatus::Closed);
        assert_eq!(breaker.snapshot().consecutive_failures, 0);
    }
}
