// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-task nudge queue event handlers.

use ralph_core::{Event, NudgeQueue};

use super::MaterializedState;

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::NudgeEnqueued { issue_ref, item } => {
            state
                .nudges
                .entry(issue_ref.to_string())
                .or_insert_with(NudgeQueue::new)
                .push(item.clone());
        }

        Event::NudgeDelivered { issue_ref } => {
            if let Some(queue) = state.nudges.get_mut(&issue_ref.to_string()) {
                queue.pop_front();
            }
        }

        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ralph_core::{IssueRef, NudgeItem};

    #[test]
    fn enqueue_then_deliver_in_order() {
        let mut state = MaterializedState::default();
        let issue_ref = IssueRef::new("acme", "demo", 1);
        apply(
            &mut state,
            &Event::NudgeEnqueued {
                issue_ref: issue_ref.clone(),
                item: NudgeItem { text: "first".into(), submitted_at_ms: 0, submitted_by: None },
            },
        );
        apply(
            &mut state,
            &Event::NudgeEnqueued {
                issue_ref: issue_ref.clone(),
                item: NudgeItem { text: "second".into(), submitted_at_ms: 1, submitted_by: None },
            },
        );
        let queue = state.nudges.get(&issue_ref.to_string()).unwrap();
        assert_eq!(queue.peek_front().unwrap().text, "first");

        apply(&mut state, &Event::NudgeDelivered { issue_ref: issue_ref.clone() });
        let queue = state.nudges.get(&issue_ref.to_string()).unwrap();
        assert_eq!(queue.peek_front().unwrap().text, "second");
    }
}
