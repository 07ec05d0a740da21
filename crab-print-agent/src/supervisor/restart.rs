//! Restart budget

use crate::core::AgentSettings;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct RestartPolicy {
    /// Wait before restarting a crashed pipeline
    pub delay: Duration,
    /// Restarts allowed within `window`
    pub max_restarts: u32,
    pub window: Duration,
}

impl RestartPolicy {
    pub fn from_settings(settings: &AgentSettings) -> Self {
        Self {
            delay: settings.restart_delay(),
            max_restarts: settings.max_restarts,
            window: settings.restart_window(),
        }
    }
}

/// Sliding window of recent restarts
#[derive(Debug)]
pub struct RestartTracker {
    policy: RestartPolicy,
    recent: VecDeque<Instant>,
}

impl RestartTracker {
    pub fn new(policy: RestartPolicy) -> Self {
        Self {
            policy,
            recent: VecDeque::new(),
        }
    }

    pub fn policy(&self) -> &RestartPolicy {
        &self.policy
    }

    /// Restarts counted in the current window
    pub fn count(&self) -> u32 {
        self.recent.len() as u32
    }

    /// Record a crash at `now`; false once the budget is spent
    pub fn try_restart(&mut self, now: Instant) -> bool {
        while let Some(&oldest) = self.recent.front() {
            if now.duration_since(oldest) >= self.policy.window {
                self.recent.pop_front();
            } else {
                break;
            }
        }

        if self.count() >= self.policy.max_restarts {
            return false;
        }
        self.recent.push_back(now);
        true
    }
}
