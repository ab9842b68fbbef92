//! Tick-driven bounded waits for a dependent subsystem (e.g. the skeleton).

use crate::config::ReadinessConfig;
use crate::error::AvatarError;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WaitStatus {
    Ready,
    Pending,
    TimedOut,
}

/// Checks a predicate every `backoff` seconds until it holds or `timeout` elapses.
/// The first poll always checks.
#[derive(Clone, Debug)]
pub struct ReadinessWait {
    timeout: f32,
    backoff: f32,
    waited: f32,
    since_check: Option<f32>,
}

impl ReadinessWait {
    pub fn new(cfg: &ReadinessConfig) -> Self {
        Self {
            timeout: cfg.timeout_secs,
            backoff: cfg.backoff_secs,
            waited: 0.0,
            since_check: None,
        }
    }

    pub fn waited(&self) -> f32 {
        self.waited
    }

    pub fn poll(&mut self, dt: f32, is_ready: impl FnOnce() -> bool) -> WaitStatus {
        let dt = dt.max(0.0);
        self.waited += dt;
        let due = match self.since_check.as_mut() {
            None => true,
            Some(since) => {
                *since += dt;
                *since >= self.backoff
            }
        };
        if due {
            self.since_check = Some(0.0);
            if is_ready() {
                return WaitStatus::Ready;
            }
        }
        if self.waited >= self.timeout {
            WaitStatus::TimedOut
        } else {
            WaitStatus::Pending
        }
    }

    /// Error describing a timed-out wait for `what`.
    pub fn timeout_error(&self, what: &str) -> AvatarError {
        AvatarError::NotReady {
            what: what.to_string(),
            waited_secs: self.waited,
        }
    }
}
