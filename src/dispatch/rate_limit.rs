use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Timestamps of recent dispatches, persisted with the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateWindow {
    #[serde(default)]
    calls: VecDeque<DateTime<Utc>>,
}

impl RateWindow {
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let horizon = now - Duration::hours(1);
        while self.calls.front().is_some_and(|t| *t <= horizon) {
            self.calls.pop_front();
        }
    }

    fn count_since(&self, since: DateTime<Utc>) -> usize {
        self.calls.iter().filter(|t| **t > since).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Throttled { wait: std::time::Duration },
}

/// Sliding-window limiter over capability invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiter {
    /// `0` disables the per-minute window.
    pub max_per_minute: u32,
    /// `0` disables the per-hour window.
    pub max_per_hour: u32,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self {
            max_per_minute: 30,
            max_per_hour: 500,
        }
    }
}

impl RateLimiter {
    /// Check the window and, when allowed, record the call.
    pub fn acquire(&self, window: &mut RateWindow, now: DateTime<Utc>) -> RateDecision {
        let decision = self.check(window, now);
        if decision == RateDecision::Allowed {
            window.calls.push_back(now);
        }
        decision
    }

    /// Check without recording.
    pub fn check(&self, window: &mut RateWindow, now: DateTime<Utc>) -> RateDecision {
        window.prune(now);

        let windows = [
            (self.max_per_minute, Duration::minutes(1)),
            (self.max_per_hour, Duration::hours(1)),
        ];
        let mut wait = Duration::zero();
        for (limit, span) in windows {
            if limit == 0 {
                continue;
            }
            let since = now - span;
            if window.count_since(since) >= limit as usize {
                // The window frees up when its oldest in-range call ages out.
                if let Some(oldest) = window.calls.iter().find(|t| **t > since) {
                    let until = *oldest + span - now;
                    if until > wait {
                        wait = until;
                    }
                }
            }
        }

        if wait > Duration::zero() {
            RateDecision::Throttled {
                wait: wait.to_std().unwrap_or(std::time::Duration::from_secs(1)),
            }
        } else {
            RateDecision::Allowed
        }
    }
}
