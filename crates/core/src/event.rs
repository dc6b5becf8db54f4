// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The append-only fact stream the state store replays to rebuild
//! [`crate::task::Task`] / [`crate::run::Run`] / gate state. Every operation
//! in the state store's operation table writes exactly one of these.

use crate::gate::{GateArtifact, GateKind, GateStatus};
use crate::idempotency::{IdempotencyKey, IdempotencyRecord};
use crate::issue_ref::IssueRef;
use crate::nudge::NudgeItem;
use crate::parent_verification::ParentVerificationState;
use crate::pr_resolution::PrResolution;
use crate::run::{NoPrTerminalReason, Run, RunId, RunOutcome};
use crate::task::{BlockedSource, TaskStatus};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Event {
    TaskClaimed {
        issue_ref: IssueRef,
        daemon_id: String,
        now_ms: u64,
    },
    TaskStatusChanged {
        issue_ref: IssueRef,
        status: TaskStatus,
        now_ms: u64,
    },
    TaskBlocked {
        issue_ref: IssueRef,
        source: BlockedSource,
        reason: String,
        details: Option<String>,
        now_ms: u64,
    },
    TaskUnblocked {
        issue_ref: IssueRef,
    },
    TaskHeartbeat {
        issue_ref: IssueRef,
        now_ms: u64,
    },
    TaskCompleted {
        issue_ref: IssueRef,
        now_ms: u64,
    },
    TaskRetryIncremented {
        issue_ref: IssueRef,
        source: BlockedSource,
    },
    TaskPrResolved {
        issue_ref: IssueRef,
        resolution: PrResolution,
    },
    TaskWorktreeSet {
        issue_ref: IssueRef,
        path: PathBuf,
    },

    RunCreated {
        run: Run,
    },
    RunCompleted {
        run_id: RunId,
        outcome: RunOutcome,
        details: Option<String>,
        pr_url: Option<String>,
        no_pr_terminal_reason: Option<NoPrTerminalReason>,
        completed_at_ms: u64,
    },

    GateUpserted {
        issue_ref: IssueRef,
        run_id: RunId,
        kind: GateKind,
        status: GateStatus,
        reason: Option<String>,
        now_ms: u64,
    },
    GateArtifactRecorded {
        issue_ref: IssueRef,
        run_id: RunId,
        kind: GateKind,
        artifact: GateArtifact,
    },

    IdempotencyRecorded {
        record: IdempotencyRecord,
    },
    IdempotencyDeleted {
        key: IdempotencyKey,
    },

    NudgeEnqueued {
        issue_ref: IssueRef,
        item: NudgeItem,
    },
    NudgeDelivered {
        issue_ref: IssueRef,
    },

    ParentVerificationSet {
        issue_ref: IssueRef,
        state: ParentVerificationState,
    },
    ParentVerificationClaimed {
        issue_ref: IssueRef,
    },
    ParentVerificationFailed {
        issue_ref: IssueRef,
        reason: String,
        now_ms: u64,
        base_backoff_ms: u64,
    },
    ParentVerificationCompleted {
        issue_ref: IssueRef,
    },

    TokenUsageRecorded {
        issue_ref: IssueRef,
        input_tokens: u64,
        output_tokens: u64,
    },
    TokenUsageReset {
        issue_ref: IssueRef,
    },

    /// Control event. Not a state mutation; the daemon loop recognizes it on
    /// replay and stops applying further events instead of treating it as
    /// a fact about task state.
    Shutdown,
}
