//! Network failure backoff
//!
//! The [`BackoffController`] decides how long the orchestrator waits before
//! the next resolve attempt. It never terminates anything; it only turns a
//! run of total resolution failures into a growing delay and reports the
//! switch into (and out of) resilient mode exactly once per transition.
//!
//! ```text
//!   success            failure            failures >= threshold
//! ┌────────┐  fail  ┌──────────┐  fail  ┌─────────┐
//! │ Normal │──────▶│ Degraded │──────▶│ Backoff │
//! └────────┘        └──────────┘        └─────────┘
//!      ▲                 │ success           │ success
//!      └─────────────────┴───────────────────┘
//! ```

use std::time::Duration;
use tracing::{info, warn};

/// Backoff tunables
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Delay after the first failure
    pub base_delay: Duration,
    /// Growth factor per additional failure
    pub multiplier: f64,
    /// Upper bound for any delay
    pub max_delay: Duration,
    /// Consecutive failures before resilient mode
    pub failure_threshold: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(60),
            multiplier: 2.0,
            max_delay: Duration::from_secs(600),
            failure_threshold: 5,
        }
    }
}

impl BackoffPolicy {
    /// Delay to apply after `failures` consecutive failures (`failures >= 1`).
    ///
    /// `min(base * multiplier^(failures - 1), max)`; zero failures yield the
    /// base delay.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let max = self.max_delay.as_secs_f64();
        if !secs.is_finite() || secs >= max {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs.max(0.0))
        }
    }
}

/// Coarse health state derived from the failure count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// Last resolve succeeded
    Normal,
    /// Failing, but below the threshold
    Degraded,
    /// At or above the threshold; resilient mode
    Backoff,
}

/// Snapshot of the controller's state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkHealth {
    pub consecutive_failures: u32,
    pub current_delay: Duration,
    pub resilient_mode: bool,
}

/// What a recorded failure means for the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureOutcome {
    /// How long to wait before the next attempt
    pub delay: Duration,
    /// Consecutive failures including this one
    pub consecutive_failures: u32,
    /// True only on the failure that switched resilient mode on
    pub entered_resilient_mode: bool,
}

/// What a recorded success means for the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryOutcome {
    /// Failures that preceded this success
    pub previous_failures: u32,
    /// True only when this success switched resilient mode off
    pub left_resilient_mode: bool,
}

/// Failure counter and delay state machine
#[derive(Debug, Clone)]
pub struct BackoffController {
    policy: BackoffPolicy,
    consecutive_failures: u32,
    current_delay: Duration,
    resilient_mode: bool,
}

impl BackoffController {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            consecutive_failures: 0,
            current_delay: Duration::ZERO,
            resilient_mode: false,
        }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Swap the tunables (configuration reload); counters are kept
    pub fn set_policy(&mut self, policy: BackoffPolicy) {
        self.policy = policy;
    }

    pub fn state(&self) -> HealthState {
        if self.consecutive_failures == 0 {
            HealthState::Normal
        } else if self.resilient_mode {
            HealthState::Backoff
        } else {
            HealthState::Degraded
        }
    }

    pub fn health(&self) -> NetworkHealth {
        NetworkHealth {
            consecutive_failures: self.consecutive_failures,
            current_delay: self.current_delay,
            resilient_mode: self.resilient_mode,
        }
    }

    /// Record a total resolution failure
    pub fn record_failure(&mut self) -> FailureOutcome {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.current_delay = self.policy.delay_for(self.consecutive_failures);

        let entered = !self.resilient_mode
            && self.consecutive_failures >= self.policy.failure_threshold.max(1);
        if entered {
            self.resilient_mode = true;
            warn!(
                "Entering resilient mode after {} consecutive failures; retrying every {:?} at most",
                self.consecutive_failures, self.policy.max_delay
            );
        }

        FailureOutcome {
            delay: self.current_delay,
            consecutive_failures: self.consecutive_failures,
            entered_resilient_mode: entered,
        }
    }

    /// Record a successful resolution; resets everything immediately
    pub fn record_success(&mut self) -> RecoveryOutcome {
        let outcome = RecoveryOutcome {
            previous_failures: self.consecutive_failures,
            left_resilient_mode: self.resilient_mode,
        };
        if outcome.left_resilient_mode {
            info!(
                "Network recovered after {} consecutive failures, leaving resilient mode",
                self.consecutive_failures
            );
        }
        self.consecutive_failures = 0;
        self.current_delay = Duration::ZERO;
        self.resilient_mode = false;
        outcome
    }
}

impl Default for BackoffController {
    fn default() -> Self {
        Self::new(BackoffPolicy::default())
    }
}
