// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Step 2 of the daemon loop (spec §4.6): synchronize GitHub issue state
//! for the configured repos and register newly-labelled issues as queued
//! tasks.

use ralph_adapters::github::{GitHubPort, Request};
use ralph_core::{IssueRef, TaskStatus};
use ralph_storage::WalStateStore;
use tracing::{info, warn};

/// Lists open issues carrying `label` for `owner/repo` and registers any
/// that aren't already tracked as a task. Returns the number newly
/// registered.
///
/// `claim_task` is the store's only task-creation primitive, and it leases
/// the task to `daemon_id` as [`TaskStatus::InProgress`]; a discovered issue
/// isn't actually being worked yet, so it's immediately demoted back to
/// [`TaskStatus::Queued`] for the scheduler to pick up.
pub async fn sync_repo_issues<G: GitHubPort>(
    github: &G,
    store: &WalStateStore,
    owner: &str,
    repo: &str,
    label: &str,
    daemon_id: &str,
    heartbeat_ttl_ms: u64,
    now_ms: u64,
) -> usize {
    let path = format!("/repos/{owner}/{repo}/issues?labels={label}&state=open");
    let response = match github.request(Request::get(&path).allowing_not_found()).await {
        Ok(response) => response,
        Err(e) => {
            warn!(owner, repo, error = %e, "issue sync request failed");
            return 0;
        }
    };

    let Some(serde_json::Value::Array(issues)) = response.data else {
        return 0;
    };

    let mut claimed = 0;
    for issue in issues {
        let Some(number) = issue.get("number").and_then(serde_json::Value::as_u64) else {
            continue;
        };
        let issue_ref = IssueRef::new(owner, repo, number);
        if store.task(&issue_ref).is_some() {
            continue;
        }
        match store.claim_task(&issue_ref, daemon_id, heartbeat_ttl_ms, now_ms) {
            Ok(()) => match store.update_task_status(&issue_ref, TaskStatus::Queued, now_ms) {
                Ok(()) => {
                    claimed += 1;
                    info!(%issue_ref, "discovered new task");
                }
                Err(e) => warn!(%issue_ref, error = %e, "failed to queue discovered task"),
            },
            Err(e) => warn!(%issue_ref, error = %e, "failed to register discovered task"),
        }
    }
    claimed
}

#[cfg(test)]
mod tests {
    use super::*;
    use ralph_adapters::github::{FakeGitHubPort, RateLimit, Response};
    use ralph_core::SystemClock;
    use std::collections::HashMap;

    #[tokio::test]
    async fn claims_new_issues_and_skips_known_ones() {
        let dir = tempfile::tempdir().unwrap();
        let store = WalStateStore::open(dir.path()).unwrap();
        let github = FakeGitHubPort::new();
        github.push_response(Response {
            status: 200,
            data: Some(serde_json::json!([{"number": 1}, {"number": 2}])),
            headers: HashMap::new(),
            rate_limit: RateLimit::default(),
            next_page: None,
        });

        let now = ralph_core::Clock::epoch_ms(&SystemClock);
        let claimed = sync_repo_issues(&github, &store, "acme", "demo", "ralph", "daemon-1", 120_000, now).await;
        assert_eq!(claimed, 2);
        assert!(store.task(&IssueRef::new("acme", "demo", 1)).is_some());

        github.push_response(Response {
            status: 200,
            data: Some(serde_json::json!([{"number": 1}])),
            headers: HashMap::new(),
            rate_limit: RateLimit::default(),
            next_page: None,
        });
        let claimed_again = sync_repo_issues(&github, &store, "acme", "demo", "ralph", "daemon-1", 120_000, now).await;
        assert_eq!(claimed_again, 0, "issue 1 is already tracked");
    }
}
