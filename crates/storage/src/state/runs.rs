// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run lifecycle event handlers.

use ralph_core::Event;

use super::MaterializedState;

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::RunCreated { run } => {
            state.runs.entry(run.run_id.as_str().to_string()).or_insert_with(|| run.clone());
        }

        Event::RunCompleted { run_id, outcome, details, pr_url, no_pr_terminal_reason, completed_at_ms } => {
            if let Some(run) = state.runs.get_mut(run_id.as_str()) {
                // Idempotent: a duplicate completion for an already-completed
                // run is a no-op rather than overwriting the first outcome.
                if run.completed_at_ms.is_some() {
                    return;
                }
                run.completed_at_ms = Some(*completed_at_ms);
                run.outcome = Some(*outcome);
                run.details = details.clone();
                run.pr_url = pr_url.clone();
                run.no_pr_terminal_reason = *no_pr_terminal_reason;
            }
        }

        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ralph_core::{AttemptKind, IssueRef, Run, RunOutcome};

    #[test]
    fn complete_is_idempotent() {
        let mut state = MaterializedState::default();
        let run = Run::new(IssueRef::new("acme", "demo", 1), AttemptKind::Process, 0);
        let run_id = run.run_id;
        apply(&mut state, &Event::RunCreated { run });
        apply(
            &mut state,
            &Event::RunCompleted {
                run_id,
                outcome: RunOutcome::Success,
                details: None,
                pr_url: Some("https://example.com/pr/1".into()),
                no_pr_terminal_reason: None,
                completed_at_ms: 100,
            },
        );
        apply(
            &mut state,
            &Event::RunCompleted {
                run_id,
                outcome: RunOutcome::Failed,
                details: None,
                pr_url: None,
                no_pr_terminal_reason: None,
                completed_at_ms: 200,
            },
        );
        let run = state.run(run_id.as_str()).unwrap();
        assert_eq!(run.outcome, Some(RunOutcome::Success));
        assert_eq!(run.completed_at_ms, Some(100));
    }
}
