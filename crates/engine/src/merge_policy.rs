// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pre-merge refusal guards (spec §4.4 `merge`). These are pure checks over
//! PR/issue metadata the worker has already fetched; none of them touch the
//! network or the filesystem.

/// What the merge stage knows about the PR and the issue driving it at the
/// moment it's about to merge.
#[derive(Debug, Clone, Copy)]
pub struct MergeGuardInput<'a> {
    pub base_ref: &'a str,
    pub allow_main_label: bool,
    pub diff_is_ci_only: bool,
    pub issue_has_ci_label: bool,
    pub pr_is_draft: bool,
    pub head_repo_full_name: &'a str,
    pub target_repo_full_name: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeRefusal {
    DraftPr,
    CrossRepoPr,
    MainBranchNotAllowed,
    CiOnlyDiffNotLabelled,
}

impl MergeRefusal {
    pub fn reason(&self) -> &'static str {
        match self {
            MergeRefusal::DraftPr => "refusing to merge a draft pull request",
            MergeRefusal::CrossRepoPr => "refusing to merge a pull request whose head lives in a different repo",
            MergeRefusal::MainBranchNotAllowed => "refusing a main-branch merge without the allow-main label",
            MergeRefusal::CiOnlyDiffNotLabelled => "refusing a CI-only diff on an issue not labelled for CI changes",
        }
    }
}

/// Applies the four merge refusal guards in priority order. A draft PR or a
/// cross-repo PR is refused outright regardless of branch or diff shape;
/// only once those are ruled out do the main-branch and CI-only-diff checks
/// apply.
pub fn check(input: MergeGuardInput<'_>) -> Option<MergeRefusal> {
    if input.pr_is_draft {
        return Some(MergeRefusal::DraftPr);
    }
    if input.head_repo_full_name != input.target_repo_full_name {
        return Some(MergeRefusal::CrossRepoPr);
    }
    if input.base_ref == "main" && !input.allow_main_label {
        return Some(MergeRefusal::MainBranchNotAllowed);
    }
    if input.diff_is_ci_only && !input.issue_has_ci_label {
        return Some(MergeRefusal::CiOnlyDiffNotLabelled);
    }
    None
}

/// Decides whether a `git diff --stat` output touches nothing but CI
/// configuration. An empty diff-stat (no lines at all) is NOT CI-only - it
/// means nothing changed, and treating "nothing" as "CI-only" would refuse
/// merges that never touched CI config in the first place.
pub fn diff_is_ci_only(diff_stat: &str) -> bool {
    let lines: Vec<&str> = diff_stat.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if lines.is_empty() {
        return false;
    }
    lines.iter().all(|line| {
        let path = line.split('|').next().unwrap_or("").trim();
        is_ci_path(path)
    })
}

fn is_ci_path(path: &str) -> bool {
    path.starts_with(".github/workflows/")
        || path.starts_with(".github/actions/")
        || path == ".github/dependabot.yml"
        || path.ends_with(".gitlab-ci.yml")
}
