// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reference to a single GitHub issue within a configured repository.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt;

/// `(owner, repo, issue number)` — the natural key for a [`crate::task::Task`].
///
/// Ordered by `(owner, repo, number)` so schedulers can enumerate tasks within
/// a repo in stable, issue-number-ascending order (required by the scheduler's
/// ordering guarantee).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IssueRef {
    pub owner: SmolStr,
    pub repo: SmolStr,
    pub number: u64,
}

impl IssueRef {
    pub fn new(owner: impl Into<SmolStr>, repo: impl Into<SmolStr>, number: u64) -> Self {
        Self { owner: owner.into(), repo: repo.into(), number }
    }

    /// `owner/repo` with no issue number — the repo this issue belongs to.
    pub fn repo_slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

impl fmt::Display for IssueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_by_owner_repo_number() {
        let a = IssueRef::new("acme", "demo", 3);
        let b = IssueRef::new("acme", "demo", 10);
        assert!(a < b, "issue 3 should sort before issue 10, not lexicographically");
    }

    #[test]
    fn displays_as_owner_repo_hash_number() {
        let r = IssueRef::new("acme", "demo", 123);
        assert_eq!(r.to_string(), "acme/demo#123");
    }
}
