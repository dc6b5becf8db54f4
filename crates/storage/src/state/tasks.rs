// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task lifecycle event handlers.

use ralph_core::{Event, Task, TaskStatus};

use super::MaterializedState;

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::TaskClaimed { issue_ref, daemon_id, now_ms } => {
            let key = issue_ref.to_string();
            let task = state
                .tasks
                .entry(key)
                .or_insert_with(|| Task::new(issue_ref.clone(), *now_ms));
            task.status = TaskStatus::InProgress;
            task.daemon_id = Some(daemon_id.clone());
            task.heartbeat_at_ms = Some(*now_ms);
        }

        Event::TaskStatusChanged { issue_ref, status, now_ms } => {
            if let Some(task) = state.tasks.get_mut(&issue_ref.to_string()) {
                task.status = *status;
                if *status == TaskStatus::InProgress {
                    task.heartbeat_at_ms = Some(*now_ms);
                }
            }
        }

        Event::TaskBlocked { issue_ref, source, reason, details, now_ms } => {
            if let Some(task) = state.tasks.get_mut(&issue_ref.to_string()) {
                task.block(source.clone(), reason.clone(), details.clone(), *now_ms);
            }
        }

        Event::TaskUnblocked { issue_ref } => {
            if let Some(task) = state.tasks.get_mut(&issue_ref.to_string()) {
                task.status = TaskStatus::Queued;
                task.clear_blocked();
            }
        }

        Event::TaskHeartbeat { issue_ref, now_ms } => {
            if let Some(task) = state.tasks.get_mut(&issue_ref.to_string()) {
                task.heartbeat_at_ms = Some(*now_ms);
            }
        }

        Event::TaskCompleted { issue_ref, now_ms } => {
            if let Some(task) = state.tasks.get_mut(&issue_ref.to_string()) {
                task.status = TaskStatus::Completed;
                task.completed_at_ms = Some(*now_ms);
                task.clear_blocked();
                task.session_id = None;
                task.worktree_path = None;
                task.watchdog_retries = 0;
                task.stall_retries = 0;
            }
        }

        Event::TaskWorktreeSet { issue_ref, path } => {
            if let Some(task) = state.tasks.get_mut(&issue_ref.to_string()) {
                task.worktree_path = Some(path.clone());
            }
        }

        Event::TaskRetryIncremented { issue_ref, source } => {
            if let Some(task) = state.tasks.get_mut(&issue_ref.to_string()) {
                use ralph_core::BlockedSource;
                match source {
                    BlockedSource::Watchdog => task.watchdog_retries += 1,
                    _ => task.stall_retries += 1,
                }
            }
        }

        Event::TaskPrResolved { issue_ref, .. } => {
            // Resolution is recorded for audit via the run it's attached to;
            // the task itself only cares that it's no longer in flight.
            if let Some(task) = state.tasks.get_mut(&issue_ref.to_string()) {
                if task.status != TaskStatus::Completed {
                    task.status = TaskStatus::Completed;
                }
            }
        }

        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ralph_core::{BlockedSource, IssueRef};

    fn issue() -> IssueRef {
        IssueRef::new("acme", "demo", 1)
    }

    #[test]
    fn claim_creates_task_in_progress() {
        let mut state = MaterializedState::default();
        apply(&mut state, &Event::TaskClaimed { issue_ref: issue(), daemon_id: "d1".into(), now_ms: 100 });
        let task = state.task(&issue()).unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.daemon_id.as_deref(), Some("d1"));
    }

    #[test]
    fn block_then_unblock_round_trips() {
        let mut state = MaterializedState::default();
        apply(&mut state, &Event::TaskClaimed { issue_ref: issue(), daemon_id: "d1".into(), now_ms: 0 });
        apply(
            &mut state,
            &Event::TaskBlocked {
                issue_ref: issue(),
                source: BlockedSource::Review,
                reason: "plan review failed".into(),
                details: None,
                now_ms: 10,
            },
        );
        assert_eq!(state.task(&issue()).unwrap().status, TaskStatus::Blocked);
        apply(&mut state, &Event::TaskUnblocked { issue_ref: issue() });
        let task = state.task(&issue()).unwrap();
        assert_eq!(task.status, TaskStatus::Queued);
        assert!(task.blocked_source.is_none());
    }

    #[test]
    fn retry_increment_is_per_source() {
        let mut state = MaterializedState::default();
        apply(&mut state, &Event::TaskClaimed { issue_ref: issue(), daemon_id: "d1".into(), now_ms: 0 });
        apply(&mut state, &Event::TaskRetryIncremented { issue_ref: issue(), source: BlockedSource::Watchdog });
        apply(&mut state, &Event::TaskRetryIncremented { issue_ref: issue(), source: BlockedSource::Watchdog });
        let task = state.task(&issue()).unwrap();
        assert_eq!(task.watchdog_retries, 2);
        assert_eq!(task.stall_retries, 0);
    }
}
