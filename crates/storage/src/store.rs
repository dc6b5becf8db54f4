// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `WalStateStore`: the single-writer façade over the WAL + materialized
//! state. Every mutation is append-then-apply — the WAL entry is durable
//! (or at least written) before the in-memory projection changes, so a
//! crash between the two can only ever lose the last unflushed batch, never
//! produce a projection the log disagrees with.

use crate::snapshot;
use crate::state::MaterializedState;
use crate::wal::{Wal, WalError};
use parking_lot::Mutex;
use ralph_core::{
    BlockedSource, Event, GateArtifact, GateKind, GateResult, GateStatus, IdempotencyKey,
    IdempotencyRecord, IdempotentOp, IssueRef, NoPrTerminalReason, NudgeItem, NudgeQueue,
    ParentVerificationState, PrResolution, Run, RunId, RunOutcome, Task, TaskStatus, TokenTotal,
};
use std::path::{Path, PathBuf};

/// Compact (snapshot + WAL truncation) after this many applied events.
const SNAPSHOT_EVERY: u64 = 500;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Wal(#[from] WalError),
    #[error(transparent)]
    Snapshot(#[from] snapshot::SnapshotError),
    #[error("unknown run {0}")]
    UnknownRun(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

struct Inner {
    wal: Wal,
    state: MaterializedState,
    snapshot_path: PathBuf,
    events_since_snapshot: u64,
}

impl Inner {
    fn record(&mut self, event: Event) -> Result<u64, StoreError> {
        let seq = self.wal.append(&event)?;
        self.state.apply_event(&event);
        self.wal.mark_processed(seq);
        if self.wal.needs_flush() {
            self.wal.flush()?;
        }
        self.events_since_snapshot += 1;
        if self.events_since_snapshot >= SNAPSHOT_EVERY {
            self.compact()?;
        }
        Ok(seq)
    }

    fn compact(&mut self) -> Result<(), StoreError> {
        self.wal.flush()?;
        let processed = self.wal.processed_seq();
        snapshot::write(&self.snapshot_path, &self.state, processed)?;
        self.wal.truncate_before(processed + 1)?;
        self.events_since_snapshot = 0;
        Ok(())
    }
}

/// Durable store for every orchestrator entity, backed by a WAL directory
/// (`wal.log` + `snapshot.zst`) guarded by a single-writer lock.
pub struct WalStateStore {
    inner: Mutex<Inner>,
}

impl WalStateStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let wal_path = dir.join("wal.log");
        let snapshot_path = dir.join("snapshot.zst");

        let (mut state, processed_seq) = snapshot::read(&snapshot_path)?.unwrap_or_default();
        let mut wal = Wal::open(&wal_path, processed_seq)?;

        while let Some(entry) = wal.next_unprocessed()? {
            if matches!(entry.event, Event::Shutdown) {
                wal.mark_processed(entry.seq);
                continue;
            }
            state.apply_event(&entry.event);
            wal.mark_processed(entry.seq);
        }

        Ok(Self {
            inner: Mutex::new(Inner { wal, state, snapshot_path, events_since_snapshot: 0 }),
        })
    }

    fn with_inner<R>(&self, f: impl FnOnce(&mut Inner) -> Result<R, StoreError>) -> Result<R, StoreError> {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }

    // -- read path: snapshots of the current projection --

    pub fn task(&self, issue_ref: &IssueRef) -> Option<Task> {
        self.inner.lock().state.task(issue_ref).cloned()
    }

    pub fn run(&self, run_id: &RunId) -> Option<Run> {
        self.inner.lock().state.run(run_id.as_str()).cloned()
    }

    pub fn gate_result(&self, issue_ref: &IssueRef, run_id: &RunId, kind: GateKind) -> Option<GateResult> {
        let guard = self.inner.lock();
        let key = crate::state::gate_key(issue_ref, run_id.as_str(), kind);
        guard.state.gates.get(&key).cloned()
    }

    pub fn idempotency_record(&self, key: &IdempotencyKey) -> Option<IdempotencyRecord> {
        self.inner.lock().state.idempotency.get(&key.to_string()).cloned()
    }

    pub fn nudges(&self, issue_ref: &IssueRef) -> NudgeQueue {
        self.inner.lock().state.nudges.get(&issue_ref.to_string()).cloned().unwrap_or_default()
    }

    pub fn parent_verification(&self, issue_ref: &IssueRef) -> Option<ParentVerificationState> {
        self.inner.lock().state.parent_verification.get(&issue_ref.to_string()).cloned()
    }

    pub fn token_total(&self, issue_ref: &IssueRef) -> TokenTotal {
        self.inner.lock().state.token_totals.get(&issue_ref.to_string()).copied().unwrap_or_default()
    }

    pub fn all_tasks(&self) -> Vec<Task> {
        self.inner.lock().state.tasks.values().cloned().collect()
    }

    // -- write path: one method per mutation the orchestrator performs --

    /// Transitions `issue_ref` to `InProgress` under `daemon_id`, but only
    /// when no other daemon holds a fresh lease. An existing task whose
    /// heartbeat is within `heartbeat_ttl_ms` of `now_ms` is left untouched
    /// and this call fails with `Conflict` instead of stealing the lease.
    pub fn claim_task(
        &self,
        issue_ref: &IssueRef,
        daemon_id: &str,
        heartbeat_ttl_ms: u64,
        now_ms: u64,
    ) -> Result<(), StoreError> {
        self.with_inner(|inner| {
            if let Some(task) = inner.state.task(issue_ref) {
                if task.status == TaskStatus::InProgress && !task.lease_is_stale(now_ms, heartbeat_ttl_ms) {
                    return Err(StoreError::Conflict(format!(
                        "{issue_ref} is held by {} with a fresh lease",
                        task.daemon_id.as_deref().unwrap_or("unknown")
                    )));
                }
            }
            inner.record(Event::TaskClaimed { issue_ref: issue_ref.clone(), daemon_id: daemon_id.to_string(), now_ms })?;
            Ok(())
        })
    }

    pub fn update_task_status(&self, issue_ref: &IssueRef, status: TaskStatus, now_ms: u64) -> Result<(), StoreError> {
        self.with_inner(|inner| {
            inner.record(Event::TaskStatusChanged { issue_ref: issue_ref.clone(), status, now_ms })?;
            Ok(())
        })
    }

    /// Compare-and-set status transition: records the transition only when
    /// the task's current status equals `expected`, else fails with
    /// `Conflict` without touching the log. This is the primitive the
    /// pipeline uses wherever a stage must not clobber a concurrent writer's
    /// transition (e.g. a watchdog requeue racing a worker's own progress).
    pub fn update_task_status_cas(
        &self,
        issue_ref: &IssueRef,
        expected: TaskStatus,
        next: TaskStatus,
        now_ms: u64,
    ) -> Result<(), StoreError> {
        self.with_inner(|inner| {
            let current = inner.state.task(issue_ref).map(|t| t.status);
            if current != Some(expected) {
                return Err(StoreError::Conflict(format!(
                    "{issue_ref} status is {current:?}, expected {expected:?}"
                )));
            }
            inner.record(Event::TaskStatusChanged { issue_ref: issue_ref.clone(), status: next, now_ms })?;
            Ok(())
        })
    }

    pub fn set_task_worktree(&self, issue_ref: &IssueRef, path: PathBuf) -> Result<(), StoreError> {
        self.with_inner(|inner| {
            inner.record(Event::TaskWorktreeSet { issue_ref: issue_ref.clone(), path })?;
            Ok(())
        })
    }

    pub fn block_task(
        &self,
        issue_ref: &IssueRef,
        source: BlockedSource,
        reason: &str,
        details: Option<&str>,
        now_ms: u64,
    ) -> Result<(), StoreError> {
        self.with_inner(|inner| {
            inner.record(Event::TaskBlocked {
                issue_ref: issue_ref.clone(),
                source,
                reason: reason.to_string(),
                details: details.map(str::to_string),
                now_ms,
            })?;
            Ok(())
        })
    }

    pub fn unblock_task(&self, issue_ref: &IssueRef) -> Result<(), StoreError> {
        self.with_inner(|inner| {
            inner.record(Event::TaskUnblocked { issue_ref: issue_ref.clone() })?;
            Ok(())
        })
    }

    pub fn heartbeat_task(&self, issue_ref: &IssueRef, now_ms: u64) -> Result<(), StoreError> {
        self.with_inner(|inner| {
            inner.record(Event::TaskHeartbeat { issue_ref: issue_ref.clone(), now_ms })?;
            Ok(())
        })
    }

    pub fn complete_task(&self, issue_ref: &IssueRef, now_ms: u64) -> Result<(), StoreError> {
        self.with_inner(|inner| {
            inner.record(Event::TaskCompleted { issue_ref: issue_ref.clone(), now_ms })?;
            Ok(())
        })
    }

    pub fn increment_retry(&self, issue_ref: &IssueRef, source: BlockedSource) -> Result<(), StoreError> {
        self.with_inner(|inner| {
            inner.record(Event::TaskRetryIncremented { issue_ref: issue_ref.clone(), source })?;
            Ok(())
        })
    }

    pub fn resolve_task_pr(&self, issue_ref: &IssueRef, resolution: PrResolution) -> Result<(), StoreError> {
        self.with_inner(|inner| {
            inner.record(Event::TaskPrResolved { issue_ref: issue_ref.clone(), resolution })?;
            Ok(())
        })
    }

    pub fn create_run(&self, run: Run) -> Result<RunId, StoreError> {
        self.with_inner(|inner| {
            let run_id = run.run_id;
            inner.record(Event::RunCreated { run })?;
            Ok(run_id)
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn complete_run(
        &self,
        run_id: RunId,
        outcome: RunOutcome,
        details: Option<&str>,
        pr_url: Option<&str>,
        no_pr_terminal_reason: Option<NoPrTerminalReason>,
        completed_at_ms: u64,
    ) -> Result<(), StoreError> {
        self.with_inner(|inner| {
            inner.record(Event::RunCompleted {
                run_id,
                outcome,
                details: details.map(str::to_string),
                pr_url: pr_url.map(str::to_string),
                no_pr_terminal_reason,
                completed_at_ms,
            })?;
            Ok(())
        })
    }

    pub fn upsert_gate_result(
        &self,
        issue_ref: &IssueRef,
        run_id: RunId,
        kind: GateKind,
        status: GateStatus,
        reason: Option<&str>,
        now_ms: u64,
    ) -> Result<(), StoreError> {
        self.with_inner(|inner| {
            inner.record(Event::GateUpserted {
                issue_ref: issue_ref.clone(),
                run_id,
                kind,
                status,
                reason: reason.map(str::to_string),
                now_ms,
            })?;
            Ok(())
        })
    }

    pub fn record_gate_artifact(
        &self,
        issue_ref: &IssueRef,
        run_id: RunId,
        kind: GateKind,
        artifact: GateArtifact,
    ) -> Result<(), StoreError> {
        self.with_inner(|inner| {
            inner.record(Event::GateArtifactRecorded { issue_ref: issue_ref.clone(), run_id, kind, artifact })?;
            Ok(())
        })
    }

    pub fn record_idempotency_key(&self, record: IdempotencyRecord) -> Result<(), StoreError> {
        self.with_inner(|inner| {
            inner.record(Event::IdempotencyRecorded { record })?;
            Ok(())
        })
    }

    pub fn delete_idempotency_key(&self, key: IdempotencyKey) -> Result<(), StoreError> {
        self.with_inner(|inner| {
            inner.record(Event::IdempotencyDeleted { key })?;
            Ok(())
        })
    }

    pub fn enqueue_nudge(&self, issue_ref: &IssueRef, item: NudgeItem) -> Result<(), StoreError> {
        self.with_inner(|inner| {
            inner.record(Event::NudgeEnqueued { issue_ref: issue_ref.clone(), item })?;
            Ok(())
        })
    }

    pub fn deliver_nudge(&self, issue_ref: &IssueRef) -> Result<(), StoreError> {
        self.with_inner(|inner| {
            inner.record(Event::NudgeDelivered { issue_ref: issue_ref.clone() })?;
            Ok(())
        })
    }

    pub fn set_parent_verification(&self, issue_ref: &IssueRef, state: ParentVerificationState) -> Result<(), StoreError> {
        self.with_inner(|inner| {
            inner.record(Event::ParentVerificationSet { issue_ref: issue_ref.clone(), state })?;
            Ok(())
        })
    }

    pub fn claim_parent_verification(&self, issue_ref: &IssueRef) -> Result<(), StoreError> {
        self.with_inner(|inner| {
            inner.record(Event::ParentVerificationClaimed { issue_ref: issue_ref.clone() })?;
            Ok(())
        })
    }

    pub fn record_parent_verification_failure(
        &self,
        issue_ref: &IssueRef,
        reason: &str,
        now_ms: u64,
        base_backoff_ms: u64,
    ) -> Result<(), StoreError> {
        self.with_inner(|inner| {
            inner.record(Event::ParentVerificationFailed {
                issue_ref: issue_ref.clone(),
                reason: reason.to_string(),
                now_ms,
                base_backoff_ms,
            })?;
            Ok(())
        })
    }

    pub fn complete_parent_verification(&self, issue_ref: &IssueRef) -> Result<(), StoreError> {
        self.with_inner(|inner| {
            inner.record(Event::ParentVerificationCompleted { issue_ref: issue_ref.clone() })?;
            Ok(())
        })
    }

    pub fn record_token_usage(&self, issue_ref: &IssueRef, input_tokens: u64, output_tokens: u64) -> Result<(), StoreError> {
        self.with_inner(|inner| {
            inner.record(Event::TokenUsageRecorded { issue_ref: issue_ref.clone(), input_tokens, output_tokens })?;
            Ok(())
        })
    }

    pub fn reset_token_usage(&self, issue_ref: &IssueRef) -> Result<(), StoreError> {
        self.with_inner(|inner| {
            inner.record(Event::TokenUsageReset { issue_ref: issue_ref.clone() })?;
            Ok(())
        })
    }

    /// Force a snapshot + WAL truncation outside the normal event-count
    /// threshold, e.g. on graceful shutdown.
    pub fn snapshot_now(&self) -> Result<(), StoreError> {
        self.with_inner(|inner| inner.compact())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ralph_core::AttemptKind;
    use tempfile::tempdir;

    fn issue() -> IssueRef {
        IssueRef::new("acme", "demo", 1)
    }

    #[test]
    fn claim_and_read_back() {
        let dir = tempdir().unwrap();
        let store = WalStateStore::open(dir.path()).unwrap();
        store.claim_task(&issue(), "daemon-1", 120_000, 100).unwrap();
        let task = store.task(&issue()).unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
    }

    #[test]
    fn claim_conflicts_with_a_fresh_lease() {
        let dir = tempdir().unwrap();
        let store = WalStateStore::open(dir.path()).unwrap();
        store.claim_task(&issue(), "daemon-1", 120_000, 0).unwrap();
        let err = store.claim_task(&issue(), "daemon-2", 120_000, 1_000).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn claim_succeeds_once_the_lease_goes_stale() {
        let dir = tempdir().unwrap();
        let store = WalStateStore::open(dir.path()).unwrap();
        store.claim_task(&issue(), "daemon-1", 1_000, 0).unwrap();
        store.claim_task(&issue(), "daemon-2", 1_000, 5_000).unwrap();
        let task = store.task(&issue()).unwrap();
        assert_eq!(task.daemon_id.as_deref(), Some("daemon-2"));
    }

    #[test]
    fn update_task_status_cas_rejects_a_stale_expectation() {
        let dir = tempdir().unwrap();
        let store = WalStateStore::open(dir.path()).unwrap();
        store.claim_task(&issue(), "daemon-1", 120_000, 0).unwrap();
        store.update_task_status_cas(&issue(), TaskStatus::InProgress, TaskStatus::Blocked, 50).unwrap();
        let err = store
            .update_task_status_cas(&issue(), TaskStatus::InProgress, TaskStatus::Completed, 100)
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.task(&issue()).unwrap().status, TaskStatus::Blocked);
    }

    #[test]
    fn survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = WalStateStore::open(dir.path()).unwrap();
            store.claim_task(&issue(), "daemon-1", 120_000, 100).unwrap();
            store.heartbeat_task(&issue(), 200).unwrap();
        }
        let store = WalStateStore::open(dir.path()).unwrap();
        let task = store.task(&issue()).unwrap();
        assert_eq!(task.heartbeat_at_ms, Some(200));
    }

    #[test]
    fn snapshot_then_reopen_keeps_state() {
        let dir = tempdir().unwrap();
        {
            let store = WalStateStore::open(dir.path()).unwrap();
            store.claim_task(&issue(), "daemon-1", 120_000, 100).unwrap();
            store.snapshot_now().unwrap();
        }
        let store = WalStateStore::open(dir.path()).unwrap();
        assert!(store.task(&issue()).is_some());
    }

    #[test]
    fn run_lifecycle_round_trips() {
        let dir = tempdir().unwrap();
        let store = WalStateStore::open(dir.path()).unwrap();
        let run = Run::new(issue(), AttemptKind::Process, 0);
        let run_id = store.create_run(run).unwrap();
        store
            .complete_run(run_id, RunOutcome::Success, None, Some("https://example.com/pr/9"), None, 500)
            .unwrap();
        let run = store.run(&run_id).unwrap();
        assert_eq!(run.outcome, Some(RunOutcome::Success));
    }
}
