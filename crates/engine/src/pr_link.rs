// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Canonical-PR resolution (spec §4.4 pre-flight): an issue can accumulate
//! more than one cross-referenced PR over its lifetime (a stale attempt left
//! open, a manually-opened duplicate). Pre-flight picks the one the pipeline
//! continues operating against: earliest opened, ties broken by most
//! recently updated.

/// One PR cross-referenced from an issue's timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrCandidate {
    pub number: u64,
    pub html_url: String,
    pub gh_created_at_ms: u64,
    pub gh_updated_at_ms: u64,
}

/// Earliest `gh_created_at_ms` wins; a tie is broken by the latest
/// `gh_updated_at_ms` (the one someone has kept pushing to).
pub fn select_canonical(candidates: &[PrCandidate]) -> Option<&PrCandidate> {
    candidates.iter().min_by_key(|c| (c.gh_created_at_ms, std::cmp::Reverse(c.gh_updated_at_ms)))
}

/// Parses the `cross-referenced` events of a GitHub issue timeline response
/// into [`PrCandidate`]s, keeping only entries whose source is itself a pull
/// request (the `source.issue.pull_request` field GitHub sets on PRs).
pub fn parse_pr_candidates(timeline: Option<&serde_json::Value>) -> Vec<PrCandidate> {
    let Some(items) = timeline.and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    items
        .iter()
        .filter(|item| item.get("event").and_then(|v| v.as_str()) == Some("cross-referenced"))
        .filter_map(|item| {
            let source_issue = item.get("source")?.get("issue")?;
            source_issue.get("pull_request")?;
            let number = source_issue.get("number")?.as_u64()?;
            let html_url = source_issue.get("html_url").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let gh_created_at_ms = parse_github_timestamp_ms(source_issue.get("created_at")?.as_str()?);
            let gh_updated_at_ms = source_issue
                .get("updated_at")
                .and_then(|v| v.as_str())
                .map(parse_github_timestamp_ms)
                .unwrap_or(gh_created_at_ms);
            Some(PrCandidate { number, html_url, gh_created_at_ms, gh_updated_at_ms })
        })
        .collect()
}

/// Best-effort parse of a GitHub `YYYY-MM-DDTHH:MM:SSZ` timestamp into epoch
/// milliseconds. Falls back to `0` (sorts first) on anything unrecognized
/// rather than failing canonical-PR selection outright.
fn parse_github_timestamp_ms(ts: &str) -> u64 {
    let digits: String = ts.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse::<u64>().unwrap_or(0)
}

/// Pulls the trailing numeric path segment out of a PR URL, e.g.
/// `https://example.com/pull/7` -> `Some(7)`. Used to recover the PR number
/// from the idempotency record's stored `outcome_url`.
pub fn pr_number_from_url(url: &str) -> Option<u64> {
    url.rsplit('/').next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(number: u64, created: u64, updated: u64) -> PrCandidate {
        PrCandidate { number, html_url: format!("https://example.com/pull/{number}"), gh_created_at_ms: created, gh_updated_at_ms: updated }
    }

    #[test]
    fn picks_the_earliest_created() {
        let candidates = vec![candidate(2, 200, 200), candidate(1, 100, 100)];
        assert_eq!(select_canonical(&candidates).unwrap().number, 1);
    }

    #[test]
    fn ties_on_created_break_by_latest_updated() {
        let candidates = vec![candidate(1, 100, 150), candidate(2, 100, 300)];
        assert_eq!(select_canonical(&candidates).unwrap().number, 2);
    }

    #[test]
    fn empty_candidates_select_nothing() {
        assert!(select_canonical(&[]).is_none());
    }

    #[test]
    fn pr_number_parses_trailing_path_segment() {
        assert_eq!(pr_number_from_url("https://example.com/pull/42"), Some(42));
        assert_eq!(pr_number_from_url("not-a-url"), None);
    }

    #[test]
    fn parse_pr_candidates_skips_non_pr_cross_references() {
        let timeline = serde_json::json!([
            {
                "event": "cross-referenced",
                "source": {"issue": {"number": 9, "html_url": "https://example.com/pull/9", "created_at": "2026-01-01T00:00:00Z", "pull_request": {}}},
            },
            {
                "event": "cross-referenced",
                "source": {"issue": {"number": 10, "html_url": "https://example.com/issues/10", "created_at": "2026-01-01T00:00:00Z"}},
            },
            {"event": "commented"},
        ]);
        let candidates = parse_pr_candidates(Some(&timeline));
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].number, 9);
    }
}
