// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized state rebuilt by replaying the WAL (or a snapshot plus the
//! WAL tail after it). Each entity lives in its own submodule's `apply`.

mod gates;
mod idempotency;
mod nudges;
mod parent_verification;
mod runs;
mod tasks;
mod token_totals;

use ralph_core::{
    Event, GateResult, IdempotencyRecord, IssueRef, NudgeQueue, ParentVerificationState, Run,
    Task, TokenTotal,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// In-memory projection of every entity the orchestrator tracks. Rebuilt on
/// startup from the latest snapshot plus any WAL entries written after it;
/// kept current thereafter by applying each newly-appended event exactly once.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MaterializedState {
    pub tasks: HashMap<String, Task>,
    pub runs: HashMap<String, Run>,
    /// Keyed by `"{issue_ref}:{run_id}:{gate_kind}"`.
    pub gates: HashMap<String, GateResult>,
    pub idempotency: HashMap<String, IdempotencyRecord>,
    pub nudges: HashMap<String, NudgeQueue>,
    pub parent_verification: HashMap<String, ParentVerificationState>,
    pub token_totals: HashMap<String, TokenTotal>,
}

impl MaterializedState {
    pub fn task(&self, issue_ref: &IssueRef) -> Option<&Task> {
        self.tasks.get(&issue_ref.to_string())
    }

    pub fn run(&self, run_id: &str) -> Option<&Run> {
        self.runs.get(run_id)
    }

    /// Apply one event to the projection. Handlers must be idempotent:
    /// replaying the same event twice (once for immediate in-process
    /// visibility, once on WAL replay after a restart) must not double-count
    /// anything.
    pub fn apply_event(&mut self, event: &Event) {
        match event {
            Event::TaskClaimed { .. }
            | Event::TaskStatusChanged { .. }
            | Event::TaskBlocked { .. }
            | Event::TaskUnblocked { .. }
            | Event::TaskHeartbeat { .. }
            | Event::TaskCompleted { .. }
            | Event::TaskRetryIncremented { .. }
            | Event::TaskPrResolved { .. }
            | Event::TaskWorktreeSet { .. } => tasks::apply(self, event),

            Event::RunCreated { .. } | Event::RunCompleted { .. } => runs::apply(self, event),

            Event::GateUpserted { .. } | Event::GateArtifactRecorded { .. } => {
                gates::apply(self, event)
            }

            Event::IdempotencyRecorded { .. } | Event::IdempotencyDeleted { .. } => {
                idempotency::apply(self, event)
            }

            Event::NudgeEnqueued { .. } | Event::NudgeDelivered { .. } => nudges::apply(self, event),

            Event::ParentVerificationSet { .. }
            | Event::ParentVerificationClaimed { .. }
            | Event::ParentVerificationFailed { .. }
            | Event::ParentVerificationCompleted { .. } => parent_verification::apply(self, event),

            Event::TokenUsageRecorded { .. } | Event::TokenUsageReset { .. } => {
                token_totals::apply(self, event)
            }

            Event::Shutdown => {}
        }
    }
}

pub(crate) fn gate_key(issue_ref: &IssueRef, run_id: &str, kind: ralph_core::GateKind) -> String {
    format!("{issue_ref}:{run_id}:{kind}")
}
