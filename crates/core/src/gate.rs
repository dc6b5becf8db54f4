// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Review-gate outcomes (plan-review, product-review, devex-review, PR-evidence)
//! and the artifacts they produce.

use serde::{Deserialize, Serialize};

/// Which gate produced a [`GateResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    PlanReview,
    ProductReview,
    DevexReview,
    PrEvidence,
    ParentVerification,
}

crate::simple_display! {
    GateKind {
        PlanReview => "plan_review",
        ProductReview => "product_review",
        DevexReview => "devex_review",
        PrEvidence => "pr_evidence",
        ParentVerification => "parent_verification",
    }
}

/// Outcome recorded for a gate. Transitions are monotonic within one run:
/// `Pending -> {Pass | Fail | Skipped}`, never backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    Pending,
    Pass,
    Fail,
    Skipped,
}

crate::simple_display! {
    GateStatus {
        Pending => "pending",
        Pass => "pass",
        Fail => "fail",
        Skipped => "skipped",
    }
}

impl GateStatus {
    /// Whether moving from `self` to `next` is a legal gate transition.
    /// Only `Pending -> *` is allowed; a decided gate cannot be re-decided
    /// in place (a new run records a new `GateResult` instead).
    pub fn can_transition_to(self, next: GateStatus) -> bool {
        matches!(self, GateStatus::Pending)
            || self == next
    }
}

/// Kind of evidence artifact a gate attaches to its result (e.g. the parsed
/// marker JSON, or a link to CI logs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateArtifactKind {
    Marker,
    CiLog,
    Diff,
    Comment,
}

crate::simple_display! {
    GateArtifactKind {
        Marker => "marker",
        CiLog => "ci_log",
        Diff => "diff",
        Comment => "comment",
    }
}

/// A single piece of evidence attached to a gate's decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateArtifact {
    pub kind: GateArtifactKind,
    pub recorded_at_ms: u64,
    pub location: String,
    pub summary: Option<String>,
}

/// The decision recorded for one gate within one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateResult {
    pub kind: GateKind,
    pub status: GateStatus,
    pub decided_at_ms: u64,
    pub reason: Option<String>,
    pub artifacts: Vec<GateArtifact>,
}

impl GateResult {
    pub fn pending(kind: GateKind, now_ms: u64) -> Self {
        Self { kind, status: GateStatus::Pending, decided_at_ms: now_ms, reason: None, artifacts: Vec::new() }
    }

    /// Apply a decision, enforcing the monotonic-transition invariant.
    /// Returns `false` (no-op) if the transition is illegal.
    pub fn decide(&mut self, status: GateStatus, reason: Option<String>, now_ms: u64) -> bool {
        if !self.status.can_transition_to(status) {
            return false;
        }
        self.status = status;
        self.reason = reason;
        self.decided_at_ms = now_ms;
        true
    }

    pub fn attach(&mut self, artifact: GateArtifact) {
        self.artifacts.push(artifact);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_can_move_to_any_decided_status() {
        assert!(GateStatus::Pending.can_transition_to(GateStatus::Pass));
        assert!(GateStatus::Pending.can_transition_to(GateStatus::Fail));
        assert!(GateStatus::Pending.can_transition_to(GateStatus::Skipped));
    }

    #[test]
    fn decided_status_cannot_be_overwritten() {
        assert!(!GateStatus::Pass.can_transition_to(GateStatus::Fail));
        assert!(!GateStatus::Fail.can_transition_to(GateStatus::Pass));
    }

    #[test]
    fn decide_rejects_illegal_transition() {
        let mut g = GateResult::pending(GateKind::PlanReview, 0);
        assert!(g.decide(GateStatus::Pass, None, 10));
        assert!(!g.decide(GateStatus::Fail, None, 20));
        assert_eq!(g.status, GateStatus::Pass);
        assert_eq!(g.decided_at_ms, 10);
    }
}
