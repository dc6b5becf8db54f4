// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-task token usage event handlers, feeding the context-compact decision.

use ralph_core::Event;

use super::MaterializedState;

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::TokenUsageRecorded { issue_ref, input_tokens, output_tokens } => {
            state
                .token_totals
                .entry(issue_ref.to_string())
                .or_default()
                .add(*input_tokens, *output_tokens);
        }

        Event::TokenUsageReset { issue_ref } => {
            if let Some(total) = state.token_totals.get_mut(&issue_ref.to_string()) {
                total.reset();
            }
        }

        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ralph_core::IssueRef;

    #[test]
    fn accumulates_then_resets() {
        let mut state = MaterializedState::default();
        let issue_ref = IssueRef::new("acme", "demo", 1);
        apply(&mut state, &Event::TokenUsageRecorded { issue_ref: issue_ref.clone(), input_tokens: 100, output_tokens: 50 });
        apply(&mut state, &Event::TokenUsageRecorded { issue_ref: issue_ref.clone(), input_tokens: 10, output_tokens: 5 });
        assert_eq!(state.token_totals.get(&issue_ref.to_string()).unwrap().total(), 165);
        apply(&mut state, &Event::TokenUsageReset { issue_ref: issue_ref.clone() });
        assert_eq!(state.token_totals.get(&issue_ref.to_string()).unwrap().total(), 0);
    }
}
