// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The global throttle gate (spec §4.5): a pure classification of the
//! daemon's current GitHub rate-limit and error-rate signals into a
//! scheduling posture.

/// Scheduling posture derived from the current throttle signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleGate {
    /// Start zero new tasks this tick; tasks already in flight keep draining.
    SoftThrottled,
    /// Pause all tasks at their next safe checkpoint.
    HardThrottled,
    Normal,
}

/// Snapshot of the signals the gate classifies on.
#[derive(Debug, Clone, Copy)]
pub struct ThrottleSignals {
    pub github_rate_limit_remaining: Option<u32>,
    pub recent_5xx_rate: f64,
}

/// Below this many remaining GitHub requests, stop starting new tasks.
const SOFT_RATE_LIMIT_FLOOR: u32 = 200;
/// Below this, the daemon itself is at risk of being banned; pause everything.
const HARD_RATE_LIMIT_FLOOR: u32 = 25;
/// Fraction of recent requests failing with 5xx that triggers a soft throttle.
const SOFT_ERROR_RATE: f64 = 0.2;
/// Fraction that triggers a hard throttle.
const HARD_ERROR_RATE: f64 = 0.5;

pub fn decide(signals: ThrottleSignals) -> ThrottleGate {
    if signals.github_rate_limit_remaining.is_some_and(|r| r < HARD_RATE_LIMIT_FLOOR) || signals.recent_5xx_rate >= HARD_ERROR_RATE {
        return ThrottleGate::HardThrottled;
    }
    if signals.github_rate_limit_remaining.is_some_and(|r| r < SOFT_RATE_LIMIT_FLOOR) || signals.recent_5xx_rate >= SOFT_ERROR_RATE {
        return ThrottleGate::SoftThrottled;
    }
    ThrottleGate::Normal
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy() -> ThrottleSignals {
        ThrottleSignals { github_rate_limit_remaining: Some(4000), recent_5xx_rate: 0.0 }
    }

    #[test]
    fn healthy_signals_are_normal() {
        assert_eq!(decide(healthy()), ThrottleGate::Normal);
    }

    #[test]
    fn low_rate_limit_soft_throttles() {
        let signals = ThrottleSignals { github_rate_limit_remaining: Some(150), ..healthy() };
        assert_eq!(decide(signals), ThrottleGate::SoftThrottled);
    }

    #[test]
    fn near_exhausted_rate_limit_hard_throttles() {
        let signals = ThrottleSignals { github_rate_limit_remaining: Some(10), ..healthy() };
        assert_eq!(decide(signals), ThrottleGate::HardThrottled);
    }

    #[test]
    fn elevated_error_rate_soft_throttles() {
        let signals = ThrottleSignals { recent_5xx_rate: 0.25, ..healthy() };
        assert_eq!(decide(signals), ThrottleGate::SoftThrottled);
    }

    #[test]
    fn severe_error_rate_hard_throttles() {
        let signals = ThrottleSignals { recent_5xx_rate: 0.6, ..healthy() };
        assert_eq!(decide(signals), ThrottleGate::HardThrottled);
    }
}
