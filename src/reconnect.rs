// ABOUTME: Restart policy the dispatch supervisor consults between loop failures
// ABOUTME: Immediate restarts by default, with optional exponential backoff

use std::time::Duration;

/// Exponential backoff settings.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Ceiling for the delay
    pub max_delay: Duration,
    /// Multiplier applied after each consecutive failure
    pub multiplier: u32,
    /// Consecutive failures tolerated before giving up (0 = unlimited)
    pub max_restarts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            multiplier: 2,
            max_restarts: 0,
        }
    }
}

/// How the supervisor paces restarts.
///
/// The baseline contract is "always restart, immediately"; callers that
/// need resilience against rapid failure loops opt into `Backoff`.
#[derive(Debug, Clone, Default)]
pub enum RestartPolicy {
    #[default]
    Immediate,
    Backoff(BackoffConfig),
}

impl RestartPolicy {
    pub fn schedule(&self) -> RestartSchedule {
        let next = match self {
            RestartPolicy::Immediate => Duration::ZERO,
            RestartPolicy::Backoff(config) => config.initial_delay,
        };
        RestartSchedule {
            policy: self.clone(),
            consecutive_failures: 0,
            next,
        }
    }
}

/// Mutable pacing state for one supervisor run.
#[derive(Debug)]
pub struct RestartSchedule {
    policy: RestartPolicy,
    consecutive_failures: u32,
    next: Duration,
}

impl RestartSchedule {
    /// A connection made it to listening; reset the pacing.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        if let RestartPolicy::Backoff(config) = &self.policy {
            self.next = config.initial_delay;
        }
    }

    /// Record a failure and return the delay before the next restart, or
    /// `None` when the restart budget is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.consecutive_failures += 1;
        match &self.policy {
            RestartPolicy::Immediate => Some(Duration::ZERO),
            RestartPolicy::Backoff(config) => {
                if config.max_restarts > 0 && self.consecutive_failures > config.max_restarts {
                    return None;
                }
                let delay = self.next;
                self.next = std::cmp::min(self.next * config.multiplier, config.max_delay);
                Some(delay)
            }
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}
