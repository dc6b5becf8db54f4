// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Idempotency keys guarding at-most-once side effects (PR creation, comment
//! writebacks, merges) against duplicate execution after a crash/restart.

use crate::issue_ref::IssueRef;
use serde::{Deserialize, Serialize};

/// The side-effecting operation an idempotency key is guarding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotentOp {
    CreatePr,
    PostComment,
    Merge,
    Other(String),
}

crate::simple_display! {
    IdempotentOp {
        CreatePr => "create_pr",
        PostComment => "post_comment",
        Merge => "merge",
        Other(..) => "other",
    }
}

/// Natural key for an idempotency record: an issue plus the operation plus a
/// caller-chosen discriminator (e.g. the gate/marker that triggered it), so
/// the same operation kind can recur across a task's lifetime without
/// colliding with an earlier attempt's key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey {
    pub issue_ref: IssueRef,
    pub op: IdempotentOp,
    pub discriminator: String,
}

impl IdempotencyKey {
    pub fn new(issue_ref: IssueRef, op: IdempotentOp, discriminator: impl Into<String>) -> Self {
        Self { issue_ref, op, discriminator: discriminator.into() }
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.issue_ref, self.op, self.discriminator)
    }
}

/// Result recorded under an [`IdempotencyKey`] once the guarded operation
/// completes. Recording is itself idempotent: a duplicate `recordIdempotencyKey`
/// call with the same key and same outcome is a no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: IdempotencyKey,
    pub recorded_at_ms: u64,
    pub outcome_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_issue_op_and_discriminator() {
        let key = IdempotencyKey::new(
            IssueRef::new("acme", "demo", 7),
            IdempotentOp::CreatePr,
            "run-abc",
        );
        assert_eq!(key.to_string(), "acme/demo#7:create_pr:run-abc");
    }

    #[test]
    fn keys_with_different_discriminators_are_distinct() {
        let a = IdempotencyKey::new(IssueRef::new("acme", "demo", 7), IdempotentOp::Merge, "run-1");
        let b = IdempotencyKey::new(IssueRef::new("acme", "demo", 7), IdempotentOp::Merge, "run-2");
        assert_ne!(a, b);
    }
}
