// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Idempotency-key event handlers: recording and clearing at-most-once
//! guards for side-effecting operations (PR creation, merges, comments).

use ralph_core::Event;

use super::MaterializedState;

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::IdempotencyRecorded { record } => {
            // Recording is itself idempotent: first writer wins.
            state.idempotency.entry(record.key.to_string()).or_insert_with(|| record.clone());
        }

        Event::IdempotencyDeleted { key } => {
            state.idempotency.remove(&key.to_string());
        }

        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ralph_core::{IdempotencyKey, IdempotencyRecord, IdempotentOp, IssueRef};

    #[test]
    fn recording_twice_keeps_first_outcome() {
        let mut state = MaterializedState::default();
        let key = IdempotencyKey::new(IssueRef::new("acme", "demo", 1), IdempotentOp::CreatePr, "run-1");
        apply(
            &mut state,
            &Event::IdempotencyRecorded {
                record: IdempotencyRecord { key: key.clone(), recorded_at_ms: 1, outcome_url: Some("pr/1".into()) },
            },
        );
        apply(
            &mut state,
            &Event::IdempotencyRecorded {
                record: IdempotencyRecord { key: key.clone(), recorded_at_ms: 2, outcome_url: Some("pr/2".into()) },
            },
        );
        let rec = state.idempotency.get(&key.to_string()).unwrap();
        assert_eq!(rec.outcome_url.as_deref(), Some("pr/1"));
    }

    #[test]
    fn delete_removes_record() {
        let mut state = MaterializedState::default();
        let key = IdempotencyKey::new(IssueRef::new("acme", "demo", 1), IdempotentOp::Merge, "run-1");
        apply(
            &mut state,
            &Event::IdempotencyRecorded {
                record: IdempotencyRecord { key: key.clone(), recorded_at_ms: 1, outcome_url: None },
            },
        );
        apply(&mut state, &Event::IdempotencyDeleted { key: key.clone() });
        assert!(state.idempotency.get(&key.to_string()).is_none());
    }
}
