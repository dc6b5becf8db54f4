// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic FNV-based signatures used to recognize "the same failure
//! repeating" without storing the full failure text, and to derive marker
//! ids for idempotent GitHub comments.

use fnv::FnvHasher;
use std::hash::Hasher;

/// Caps how much of a tool invocation's argument preview feeds the
/// watchdog signature, per the marker grammar's `argsPreview(<=200 chars)`.
pub const ARGS_PREVIEW_MAX_CHARS: usize = 200;

fn fnv_hex(parts: &[&str]) -> String {
    let mut hasher = FnvHasher::default();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.write_u8(0);
        }
        hasher.write(part.as_bytes());
    }
    format!("{:016x}", hasher.finish())
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Watchdog/stall signature v2 = `FNV(stage | source | toolName | argsPreview)`.
pub fn watchdog_signature_v2(stage: &str, source: &str, tool_name: &str, args_preview: &str) -> String {
    let preview = truncate_chars(args_preview, ARGS_PREVIEW_MAX_CHARS);
    fnv_hex(&[stage, source, tool_name, &preview])
}

/// One CI check's observed state, as fed into the CI-triage signature.
#[derive(Debug, Clone)]
pub struct CiCheckObservation<'a> {
    pub check_name: &'a str,
    pub normalized_excerpt: &'a str,
}

/// CI-triage signature v3 = `FNV(timedOut, sorted (checkName, normalizedExcerpt))`.
pub fn ci_triage_signature_v3(timed_out: bool, checks: &[CiCheckObservation<'_>]) -> String {
    let mut sorted: Vec<&CiCheckObservation<'_>> = checks.iter().collect();
    sorted.sort_by_key(|c| c.check_name);

    let mut parts: Vec<&str> = Vec::with_capacity(sorted.len() * 2 + 1);
    let timed_out_str = if timed_out { "1" } else { "0" };
    parts.push(timed_out_str);
    for check in &sorted {
        parts.push(check.check_name);
        parts.push(check.normalized_excerpt);
    }
    fnv_hex(&parts)
}

/// Deterministic 12-char FNV digest of `repo|issueNumber`, used as the
/// marker id on the single tracked GitHub comment per issue/lane.
pub fn comment_marker_id(repo_slug: &str, issue_number: u64) -> String {
    let number = issue_number.to_string();
    let digest = fnv_hex(&[repo_slug, &number]);
    digest[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watchdog_signature_is_deterministic_and_order_sensitive() {
        let a = watchdog_signature_v2("build", "agent", "run_tests", "pytest -k foo");
        let b = watchdog_signature_v2("build", "agent", "run_tests", "pytest -k foo");
        assert_eq!(a, b);

        let c = watchdog_signature_v2("build", "agent", "run_tests", "pytest -k bar");
        assert_ne!(a, c);
    }

    #[test]
    fn watchdog_signature_truncates_args_preview() {
        let long = "x".repeat(500);
        let a = watchdog_signature_v2("build", "agent", "tool", &long);
        let truncated = "x".repeat(ARGS_PREVIEW_MAX_CHARS);
        let b = watchdog_signature_v2("build", "agent", "tool", &truncated);
        assert_eq!(a, b, "signature must only depend on the first 200 chars");
    }

    #[test]
    fn ci_triage_signature_is_order_independent_over_checks() {
        let checks_a = vec![
            CiCheckObservation { check_name: "lint", normalized_excerpt: "clippy error" },
            CiCheckObservation { check_name: "test", normalized_excerpt: "assertion failed" },
        ];
        let checks_b = vec![
            CiCheckObservation { check_name: "test", normalized_excerpt: "assertion failed" },
            CiCheckObservation { check_name: "lint", normalized_excerpt: "clippy error" },
        ];
        assert_eq!(ci_triage_signature_v3(false, &checks_a), ci_triage_signature_v3(false, &checks_b));
    }

    #[test]
    fn ci_triage_signature_distinguishes_timeout() {
        let checks = vec![CiCheckObservation { check_name: "test", normalized_excerpt: "x" }];
        assert_ne!(ci_triage_signature_v3(true, &checks), ci_triage_signature_v3(false, &checks));
    }

    #[test]
    fn comment_marker_id_is_twelve_hex_chars() {
        let id = comment_marker_id("acme/demo", 42);
        assert_eq!(id.len(), 12);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn comment_marker_id_is_stable_per_repo_and_issue() {
        assert_eq!(comment_marker_id("acme/demo", 42), comment_marker_id("acme/demo", 42));
        assert_ne!(comment_marker_id("acme/demo", 42), comment_marker_id("acme/demo", 43));
    }
}
