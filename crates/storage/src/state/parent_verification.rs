// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parent-verification state event handlers.

use ralph_core::Event;

use super::MaterializedState;

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::ParentVerificationSet { issue_ref, state: pv_state } => {
            state.parent_verification.insert(issue_ref.to_string(), pv_state.clone());
        }

        Event::ParentVerificationClaimed { issue_ref } => {
            if let Some(pv) = state.parent_verification.get_mut(&issue_ref.to_string()) {
                pv.claim();
            }
        }

        Event::ParentVerificationFailed { issue_ref, reason, now_ms, base_backoff_ms } => {
            if let Some(pv) = state.parent_verification.get_mut(&issue_ref.to_string()) {
                pv.record_failure(reason.clone(), *now_ms, *base_backoff_ms);
            }
        }

        Event::ParentVerificationCompleted { issue_ref } => {
            if let Some(pv) = state.parent_verification.get_mut(&issue_ref.to_string()) {
                pv.complete_verified();
            }
        }

        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ralph_core::{IssueRef, ParentVerificationState, ParentVerificationStatus};

    #[test]
    fn claim_then_complete() {
        let mut state = MaterializedState::default();
        let issue_ref = IssueRef::new("acme", "demo", 1);
        apply(
            &mut state,
            &Event::ParentVerificationSet { issue_ref: issue_ref.clone(), state: ParentVerificationState::new(3, 0) },
        );
        apply(&mut state, &Event::ParentVerificationClaimed { issue_ref: issue_ref.clone() });
        assert_eq!(
            state.parent_verification.get(&issue_ref.to_string()).unwrap().status,
            ParentVerificationStatus::InProgress
        );
        apply(&mut state, &Event::ParentVerificationCompleted { issue_ref: issue_ref.clone() });
        assert_eq!(
            state.parent_verification.get(&issue_ref.to_string()).unwrap().status,
            ParentVerificationStatus::Verified
        );
    }
}
