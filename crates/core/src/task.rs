// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task identifier and lifecycle state.

use crate::issue_ref::IssueRef;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Status of a [`Task`]'s pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    InProgress,
    Blocked,
    Escalated,
    Completed,
}

crate::simple_display! {
    TaskStatus {
        Queued => "queued",
        InProgress => "in-progress",
        Blocked => "blocked",
        Escalated => "escalated",
        Completed => "completed",
    }
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Escalated)
    }
}

/// Why a [`Task`] is currently blocked. Every `Blocked` task carries one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockedSource {
    /// A review gate (plan/product/devex) returned `fail`.
    Review,
    /// GitHub denied the calling identity (auth/permission failure).
    Auth,
    /// A capability the task needs is not granted (policy-denied).
    Permission,
    /// CI-triage quarantined the task after a repeating failure signature.
    CiTriage,
    /// A watchdog/stall timeout requeued the task once already.
    Watchdog,
    /// Parent-verification is deferred under backoff.
    ParentVerify,
    Other(String),
}

impl std::fmt::Display for BlockedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockedSource::Review => write!(f, "review"),
            BlockedSource::Auth => write!(f, "auth"),
            BlockedSource::Permission => write!(f, "permission"),
            BlockedSource::CiTriage => write!(f, "ci_triage"),
            BlockedSource::Watchdog => write!(f, "watchdog"),
            BlockedSource::ParentVerify => write!(f, "parent_verify"),
            BlockedSource::Other(s) => write!(f, "{s}"),
        }
    }
}

/// A single issue's claim on the orchestrator: where it is in the pipeline,
/// which daemon/session owns it, and retry counters for the deterministic
/// recovery lanes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub issue_ref: IssueRef,
    pub status: TaskStatus,
    pub blocked_source: Option<BlockedSource>,
    pub blocked_reason: Option<String>,
    pub blocked_details: Option<String>,
    pub blocked_at_ms: Option<u64>,
    pub session_id: Option<String>,
    pub worktree_path: Option<PathBuf>,
    pub watchdog_retries: u32,
    pub stall_retries: u32,
    pub created_at_ms: u64,
    pub heartbeat_at_ms: Option<u64>,
    pub daemon_id: Option<String>,
    pub completed_at_ms: Option<u64>,
}

impl Task {
    pub fn new(issue_ref: IssueRef, created_at_ms: u64) -> Self {
        Self {
            issue_ref,
            status: TaskStatus::Queued,
            blocked_source: None,
            blocked_reason: None,
            blocked_details: None,
            blocked_at_ms: None,
            session_id: None,
            worktree_path: None,
            watchdog_retries: 0,
            stall_retries: 0,
            created_at_ms,
            heartbeat_at_ms: None,
            daemon_id: None,
            completed_at_ms: None,
        }
    }

    /// Whether a currently-held lease has gone stale relative to `ttl_ms`.
    pub fn lease_is_stale(&self, now_ms: u64, ttl_ms: u64) -> bool {
        match self.heartbeat_at_ms {
            None => true,
            Some(hb) => now_ms.saturating_sub(hb) >= ttl_ms,
        }
    }

    /// Move the task into `Blocked`, recording source/reason/details atomically.
    /// Invariant (spec §3): a `Blocked` task always has a non-empty `blocked_source`.
    pub fn block(&mut self, source: BlockedSource, reason: String, details: Option<String>, now_ms: u64) {
        self.status = TaskStatus::Blocked;
        self.blocked_source = Some(source);
        self.blocked_reason = Some(reason);
        self.blocked_details = details;
        self.blocked_at_ms = Some(now_ms);
    }

    /// Clear any blocked-state fields when transitioning out of `Blocked`.
    pub fn clear_blocked(&mut self) {
        self.blocked_source = None;
        self.blocked_reason = None;
        self.blocked_details = None;
        self.blocked_at_ms = None;
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn builder(issue_ref: IssueRef) -> TaskBuilder {
        TaskBuilder::new(issue_ref)
    }
}

#[cfg(any(test, feature = "test-support"))]
pub struct TaskBuilder {
    task: Task,
}

#[cfg(any(test, feature = "test-support"))]
impl TaskBuilder {
    pub fn new(issue_ref: IssueRef) -> Self {
        Self { task: Task::new(issue_ref, 1_700_000_000_000) }
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.task.status = status;
        self
    }

    pub fn watchdog_retries(mut self, n: u32) -> Self {
        self.task.watchdog_retries = n;
        self
    }

    pub fn stall_retries(mut self, n: u32) -> Self {
        self.task.stall_retries = n;
        self
    }

    pub fn session_id(mut self, id: impl Into<String>) -> Self {
        self.task.session_id = Some(id.into());
        self
    }

    pub fn heartbeat_at_ms(mut self, ms: u64) -> Self {
        self.task.heartbeat_at_ms = Some(ms);
        self
    }

    pub fn daemon_id(mut self, id: impl Into<String>) -> Self {
        self.task.daemon_id = Some(id.into());
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_sets_all_fields_together() {
        let mut t = Task::new(IssueRef::new("acme", "demo", 1), 0);
        t.block(BlockedSource::Review, "plan review failed".into(), Some("detail".into()), 1000);
        assert_eq!(t.status, TaskStatus::Blocked);
        assert_eq!(t.blocked_source, Some(BlockedSource::Review));
        assert_eq!(t.blocked_at_ms, Some(1000));
    }

    #[test]
    fn clear_blocked_empties_fields() {
        let mut t = Task::new(IssueRef::new("acme", "demo", 1), 0);
        t.block(BlockedSource::Auth, "denied".into(), None, 1000);
        t.clear_blocked();
        assert!(t.blocked_source.is_none());
        assert!(t.blocked_reason.is_none());
        assert!(t.blocked_at_ms.is_none());
    }

    #[test]
    fn stale_lease_detection() {
        let mut t = Task::new(IssueRef::new("acme", "demo", 1), 0);
        assert!(t.lease_is_stale(1000, 500), "no heartbeat ever => stale");
        t.heartbeat_at_ms = Some(1000);
        assert!(!t.lease_is_stale(1200, 500));
        assert!(t.lease_is_stale(1600, 500));
    }
}
