// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A single worker invocation against a task.

use crate::issue_ref::IssueRef;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a run instance.
    pub struct RunId("run-");
}

/// What kind of attempt a [`Run`] represents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptKind {
    Process,
    CiTriage,
    MergeConflict,
    ParentVerify,
    Other(String),
}

crate::simple_display! {
    AttemptKind {
        Process => "process",
        CiTriage => "ci-triage",
        MergeConflict => "merge-conflict",
        ParentVerify => "parent-verify",
        Other(..) => "other",
    }
}

/// Terminal outcome of a completed [`Run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    Failed,
    Escalated,
    Throttled,
}

crate::simple_display! {
    RunOutcome {
        Success => "success",
        Failed => "failed",
        Escalated => "escalated",
        Throttled => "throttled",
    }
}

/// Recognized reasons a successful run may legitimately carry no PR URL.
/// See spec §4.3.5 and §4.3.6 — the PR-evidence gate treats these as `skipped`
/// rather than converting the run to `escalated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoPrTerminalReason {
    ParentVerificationNoPr,
    IssueClosedUpstream,
}

crate::simple_display! {
    NoPrTerminalReason {
        ParentVerificationNoPr => "parent_verification_no_pr",
        IssueClosedUpstream => "issue_closed_upstream",
    }
}

/// One worker invocation against a task. Created at the start of a pipeline
/// attempt, completed exactly once (`completeRun` is idempotent on `run_id`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub run_id: RunId,
    pub issue_ref: IssueRef,
    pub attempt_kind: AttemptKind,
    pub started_at_ms: u64,
    pub completed_at_ms: Option<u64>,
    pub outcome: Option<RunOutcome>,
    pub details: Option<String>,
    pub pr_url: Option<String>,
    pub no_pr_terminal_reason: Option<NoPrTerminalReason>,
}

impl Run {
    pub fn new(issue_ref: IssueRef, attempt_kind: AttemptKind, started_at_ms: u64) -> Self {
        Self {
            run_id: RunId::new(),
            issue_ref,
            attempt_kind,
            started_at_ms,
            completed_at_ms: None,
            outcome: None,
            details: None,
            pr_url: None,
            no_pr_terminal_reason: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at_ms.is_some()
    }

    /// The PR-evidence invariant from spec §3/§8: every completed run with
    /// outcome `success` and a populated issue link must carry either a PR
    /// URL or a recognized no-PR terminal reason.
    pub fn satisfies_pr_evidence_invariant(&self) -> bool {
        match self.outcome {
            Some(RunOutcome::Success) => {
                self.pr_url.is_some() || self.no_pr_terminal_reason.is_some()
            }
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_without_pr_or_reason_violates_invariant() {
        let mut run = Run::new(IssueRef::new("acme", "demo", 1), AttemptKind::Process, 0);
        run.outcome = Some(RunOutcome::Success);
        assert!(!run.satisfies_pr_evidence_invariant());
    }

    #[test]
    fn success_with_pr_url_satisfies_invariant() {
        let mut run = Run::new(IssueRef::new("acme", "demo", 1), AttemptKind::Process, 0);
        run.outcome = Some(RunOutcome::Success);
        run.pr_url = Some("https://github.com/acme/demo/pull/1".into());
        assert!(run.satisfies_pr_evidence_invariant());
    }

    #[test]
    fn success_with_no_pr_reason_satisfies_invariant() {
        let mut run = Run::new(IssueRef::new("acme", "demo", 1), AttemptKind::Process, 0);
        run.outcome = Some(RunOutcome::Success);
        run.no_pr_terminal_reason = Some(NoPrTerminalReason::ParentVerificationNoPr);
        assert!(run.satisfies_pr_evidence_invariant());
    }

    #[test]
    fn non_success_outcomes_are_exempt() {
        let mut run = Run::new(IssueRef::new("acme", "demo", 1), AttemptKind::Process, 0);
        run.outcome = Some(RunOutcome::Escalated);
        assert!(run.satisfies_pr_evidence_invariant());
    }
}
