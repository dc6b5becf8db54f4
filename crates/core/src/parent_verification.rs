// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parent-verification: re-checking a parent issue's acceptance criteria
//! before its child work is considered mergeable, with bounded-attempt
//! backoff per spec §4.3.6.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentVerificationStatus {
    /// Not yet due, or waiting for a backoff window to elapse.
    Pending,
    /// Claimed by a worker and currently running.
    InProgress,
    /// Verified the parent's acceptance criteria; child work may proceed.
    Verified,
    /// Exhausted its attempt budget without verifying.
    Exhausted,
}

crate::simple_display! {
    ParentVerificationStatus {
        Pending => "pending",
        InProgress => "in_progress",
        Verified => "verified",
        Exhausted => "exhausted",
    }
}

/// Tracked state for one task's parent-verification attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParentVerificationState {
    pub status: ParentVerificationStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub next_attempt_at_ms: u64,
    pub last_failure_reason: Option<String>,
}

impl ParentVerificationState {
    pub fn new(max_attempts: u32, due_at_ms: u64) -> Self {
        Self {
            status: ParentVerificationStatus::Pending,
            attempts: 0,
            max_attempts,
            next_attempt_at_ms: due_at_ms,
            last_failure_reason: None,
        }
    }

    pub fn is_due(&self, now_ms: u64) -> bool {
        matches!(self.status, ParentVerificationStatus::Pending) && now_ms >= self.next_attempt_at_ms
    }

    pub fn claim(&mut self) {
        self.status = ParentVerificationStatus::InProgress;
    }

    pub fn complete_verified(&mut self) {
        self.status = ParentVerificationStatus::Verified;
    }

    /// Record a failed attempt. Applies exponential backoff until
    /// `max_attempts` is exhausted, then transitions to `Exhausted`.
    pub fn record_failure(&mut self, reason: String, now_ms: u64, base_backoff_ms: u64) {
        self.attempts += 1;
        self.last_failure_reason = Some(reason);
        if self.attempts >= self.max_attempts {
            self.status = ParentVerificationStatus::Exhausted;
            return;
        }
        self.status = ParentVerificationStatus::Pending;
        let backoff = base_backoff_ms.saturating_mul(1u64 << self.attempts.min(10));
        self.next_attempt_at_ms = now_ms.saturating_add(backoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn becomes_due_once_backoff_elapses() {
        let state = ParentVerificationState::new(3, 1000);
        assert!(!state.is_due(500));
        assert!(state.is_due(1000));
    }

    #[test]
    fn exhausts_after_max_attempts() {
        let mut state = ParentVerificationState::new(2, 0);
        state.record_failure("no criteria met".into(), 0, 100);
        assert_eq!(state.status, ParentVerificationStatus::Pending);
        state.record_failure("still no criteria met".into(), 0, 100);
        assert_eq!(state.status, ParentVerificationStatus::Exhausted);
    }

    #[test]
    fn backoff_grows_with_attempts() {
        let mut state = ParentVerificationState::new(5, 0);
        state.record_failure("x".into(), 0, 100);
        let first_due = state.next_attempt_at_ms;
        state.record_failure("x".into(), 0, 100);
        let second_due = state.next_attempt_at_ms;
        assert!(second_due > first_due);
    }
}
