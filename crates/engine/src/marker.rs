// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic strict parsers for the agent's final-line JSON markers
//! (spec §6, "Markers"). Each parser accepts exactly one marker on the
//! final non-empty line of agent output; review-style markers additionally
//! tolerate a missing/case-varying prefix and a trailing code fence.

use ralph_core::NoPrTerminalReason;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStatus {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewMarker {
    pub status: GateStatus,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
struct RawReview {
    status: String,
    #[serde(default)]
    reason: String,
}

fn final_non_empty_line(output: &str) -> Option<&str> {
    output.lines().rev().find(|line| !line.trim().is_empty())
}

/// Strips a trailing single-line code fence (` ``` `) from the final line,
/// per the tolerance the original source exercises.
fn strip_trailing_fence(line: &str) -> &str {
    line.trim().trim_end_matches("```").trim()
}

fn parse_raw_review(json: &str) -> Option<ReviewMarker> {
    let raw: RawReview = serde_json::from_str(json).ok()?;
    let status = match raw.status.to_ascii_lowercase().as_str() {
        "pass" => GateStatus::Pass,
        "fail" => GateStatus::Fail,
        _ => return None,
    };
    Some(ReviewMarker { status, reason: raw.reason })
}

/// Strict parse of `RALPH_PLAN_REVIEW: <json>` on the final non-empty line.
pub fn parse_plan_review(output: &str) -> Option<ReviewMarker> {
    let line = final_non_empty_line(output)?;
    let line = strip_trailing_fence(line);
    let json = line.strip_prefix("RALPH_PLAN_REVIEW:")?.trim();
    parse_raw_review(json)
}

/// `RALPH_REVIEW: <json>` with fallback parsers: case-insensitive prefix,
/// then raw JSON-on-final-line when the prefix is missing entirely.
pub fn parse_review(output: &str) -> Option<ReviewMarker> {
    let line = final_non_empty_line(output)?;
    let line = strip_trailing_fence(line);

    if let Some(rest) = strip_prefix_case_insensitive(line, "RALPH_REVIEW:") {
        return parse_raw_review(rest.trim());
    }

    parse_raw_review(line)
}

fn strip_prefix_case_insensitive<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    if line.len() < prefix.len() {
        return None;
    }
    let (head, tail) = line.split_at(prefix.len());
    head.eq_ignore_ascii_case(prefix).then_some(tail)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentVerifyMarker {
    pub version: u32,
    pub work_remains: bool,
    pub reason: String,
    pub why_satisfied: Option<String>,
    pub no_pr_terminal_reason: Option<NoPrTerminalReason>,
}

#[derive(Debug, Deserialize)]
struct RawParentVerify {
    version: u32,
    work_remains: bool,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    why_satisfied: Option<String>,
    #[serde(default)]
    #[serde(rename = "noPrTerminalReason")]
    no_pr_terminal_reason: Option<String>,
}

/// Strict parse of `RALPH_PARENT_VERIFY: <json>` on the final non-empty line.
pub fn parse_parent_verify(output: &str) -> Option<ParentVerifyMarker> {
    let line = final_non_empty_line(output)?;
    let json = line.trim().strip_prefix("RALPH_PARENT_VERIFY:")?.trim();
    let raw: RawParentVerify = serde_json::from_str(json).ok()?;

    let no_pr_terminal_reason = match raw.no_pr_terminal_reason.as_deref() {
        None => None,
        Some("PARENT_VERIFICATION_NO_PR") => Some(NoPrTerminalReason::ParentVerificationNoPr),
        Some("ISSUE_CLOSED_UPSTREAM") => Some(NoPrTerminalReason::IssueClosedUpstream),
        Some(_) => return None,
    };

    Some(ParentVerifyMarker {
        version: raw.version,
        work_remains: raw.work_remains,
        reason: raw.reason,
        why_satisfied: raw.why_satisfied,
        no_pr_terminal_reason,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreflightReport {
    pub status: String,
    pub command: String,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildEvidenceMarker {
    pub version: u32,
    pub branch: String,
    pub base: String,
    pub head_sha: String,
    pub worktree_clean: bool,
    pub preflight: PreflightReport,
    pub ready_for_pr_create: bool,
}

#[derive(Debug, Deserialize)]
struct RawBuildEvidence {
    version: u32,
    branch: String,
    base: String,
    head_sha: String,
    worktree_clean: bool,
    preflight: RawPreflight,
    ready_for_pr_create: bool,
}

#[derive(Debug, Deserialize)]
struct RawPreflight {
    status: String,
    command: String,
    summary: String,
}

fn is_valid_head_sha(sha: &str) -> bool {
    (7..=40).contains(&sha.len()) && sha.chars().all(|c| c.is_ascii_hexdigit())
}

/// Strict parse of `RALPH_BUILD_EVIDENCE: <json>` on the final non-empty line.
pub fn parse_build_evidence(output: &str) -> Option<BuildEvidenceMarker> {
    let line = final_non_empty_line(output)?;
    let json = line.trim().strip_prefix("RALPH_BUILD_EVIDENCE:")?.trim();
    let raw: RawBuildEvidence = serde_json::from_str(json).ok()?;

    if !is_valid_head_sha(&raw.head_sha) {
        return None;
    }

    Some(BuildEvidenceMarker {
        version: raw.version,
        branch: raw.branch,
        base: raw.base,
        head_sha: raw.head_sha,
        worktree_clean: raw.worktree_clean,
        preflight: PreflightReport { status: raw.preflight.status, command: raw.preflight.command, summary: raw.preflight.summary },
        ready_for_pr_create: raw.ready_for_pr_create,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_review_parses_pass() {
        let output = "some log line\nRALPH_PLAN_REVIEW: {\"status\":\"pass\",\"reason\":\"looks good\"}";
        let marker = parse_plan_review(output).unwrap();
        assert_eq!(marker.status, GateStatus::Pass);
        assert_eq!(marker.reason, "looks good");
    }

    #[test]
    fn plan_review_ignores_trailing_blank_lines() {
        let output = "RALPH_PLAN_REVIEW: {\"status\":\"fail\",\"reason\":\"no\"}\n\n\n";
        assert_eq!(parse_plan_review(output).unwrap().status, GateStatus::Fail);
    }

    #[test]
    fn plan_review_rejects_missing_prefix() {
        let output = "{\"status\":\"pass\",\"reason\":\"x\"}";
        assert!(parse_plan_review(output).is_none());
    }

    #[test]
    fn review_accepts_case_insensitive_prefix() {
        let output = "ralph_review: {\"status\":\"pass\",\"reason\":\"ok\"}";
        assert_eq!(parse_review(output).unwrap().status, GateStatus::Pass);
    }

    #[test]
    fn review_falls_back_to_raw_json_without_prefix() {
        let output = "{\"status\":\"fail\",\"reason\":\"missing tests\"}";
        assert_eq!(parse_review(output).unwrap().status, GateStatus::Fail);
    }

    #[test]
    fn review_tolerates_trailing_code_fence() {
        let output = "RALPH_REVIEW: {\"status\":\"pass\",\"reason\":\"ok\"}\n```";
        assert_eq!(parse_review(output).unwrap().status, GateStatus::Pass);
    }

    #[test]
    fn parent_verify_parses_no_work_with_reason() {
        let output = "RALPH_PARENT_VERIFY: {\"version\":1,\"work_remains\":false,\"reason\":\"done\",\"noPrTerminalReason\":\"ISSUE_CLOSED_UPSTREAM\"}";
        let marker = parse_parent_verify(output).unwrap();
        assert!(!marker.work_remains);
        assert_eq!(marker.no_pr_terminal_reason, Some(NoPrTerminalReason::IssueClosedUpstream));
    }

    #[test]
    fn parent_verify_rejects_unrecognized_reason() {
        let output = "RALPH_PARENT_VERIFY: {\"version\":1,\"work_remains\":false,\"reason\":\"done\",\"noPrTerminalReason\":\"BOGUS\"}";
        assert!(parse_parent_verify(output).is_none());
    }

    #[test]
    fn build_evidence_validates_head_sha_hex_length() {
        let output = r#"RALPH_BUILD_EVIDENCE: {"version":1,"branch":"ralph/1","base":"main","head_sha":"abc123f","worktree_clean":true,"preflight":{"status":"pass","command":"make check","summary":"ok"},"ready_for_pr_create":true}"#;
        assert!(parse_build_evidence(output).is_some());
    }

    #[test]
    fn build_evidence_rejects_non_hex_sha() {
        let output = r#"RALPH_BUILD_EVIDENCE: {"version":1,"branch":"ralph/1","base":"main","head_sha":"not-hex!","worktree_clean":true,"preflight":{"status":"pass","command":"x","summary":"y"},"ready_for_pr_create":true}"#;
        assert!(parse_build_evidence(output).is_none());
    }
}
