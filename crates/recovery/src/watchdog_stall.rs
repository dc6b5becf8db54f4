// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Watchdog & stall recovery lane (spec §4.3.3).

pub use crate::signature::watchdog_signature_v2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogDecision {
    /// Keep waiting; no timeout condition observed yet.
    Continue,
    /// First timeout: requeue with `watchdog-retries` bumped, post a stuck comment.
    Requeue,
    /// Second timeout, or an early-terminate condition on the first retry: escalate.
    Escalate,
}

/// A single recent tool invocation, as recorded in the session's event window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub tool_name: String,
    pub args_preview: String,
}

pub struct WatchdogInput<'a> {
    pub timed_out: bool,
    pub retry_count: u32,
    /// Most recent invocations first.
    pub recent_events: &'a [ToolInvocation],
    pub current_signature: &'a str,
    pub prior_session_signature: Option<&'a str>,
}

/// `retryCount == 0` early-terminates the retry loop (skipping straight to
/// escalation) when either 3+ identical recent tool calls are observed, or
/// the prior signature on the same session repeats.
fn early_terminate(input: &WatchdogInput<'_>) -> bool {
    if input.retry_count != 0 {
        return false;
    }

    let repeated_tool_calls = input
        .recent_events
        .first()
        .map(|first| input.recent_events.iter().filter(|e| *e == first).count() >= 3)
        .unwrap_or(false);

    let repeated_signature = input.prior_session_signature == Some(input.current_signature);

    repeated_tool_calls || repeated_signature
}

pub fn decide(input: WatchdogInput<'_>) -> WatchdogDecision {
    if !input.timed_out {
        return WatchdogDecision::Continue;
    }

    if early_terminate(&input) {
        return WatchdogDecision::Escalate;
    }

    if input.retry_count == 0 {
        WatchdogDecision::Requeue
    } else {
        WatchdogDecision::Escalate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation(tool: &str, preview: &str) -> ToolInvocation {
        ToolInvocation { tool_name: tool.into(), args_preview: preview.into() }
    }

    #[test]
    fn no_timeout_continues() {
        let decision = decide(WatchdogInput {
            timed_out: false,
            retry_count: 0,
            recent_events: &[],
            current_signature: "sig",
            prior_session_signature: None,
        });
        assert_eq!(decision, WatchdogDecision::Continue);
    }

    #[test]
    fn first_timeout_requeues() {
        let decision = decide(WatchdogInput {
            timed_out: true,
            retry_count: 0,
            recent_events: &[],
            current_signature: "sig-a",
            prior_session_signature: Some("sig-b"),
        });
        assert_eq!(decision, WatchdogDecision::Requeue);
    }

    #[test]
    fn second_timeout_escalates() {
        let decision = decide(WatchdogInput {
            timed_out: true,
            retry_count: 1,
            recent_events: &[],
            current_signature: "sig",
            prior_session_signature: None,
        });
        assert_eq!(decision, WatchdogDecision::Escalate);
    }

    #[test]
    fn three_identical_recent_calls_early_terminate_on_first_retry() {
        let events = vec![invocation("run_tests", "pytest"), invocation("run_tests", "pytest"), invocation("run_tests", "pytest")];
        let decision = decide(WatchdogInput {
            timed_out: true,
            retry_count: 0,
            recent_events: &events,
            current_signature: "sig-a",
            prior_session_signature: Some("sig-b"),
        });
        assert_eq!(decision, WatchdogDecision::Escalate);
    }

    #[test]
    fn repeated_session_signature_early_terminates_on_first_retry() {
        let decision = decide(WatchdogInput {
            timed_out: true,
            retry_count: 0,
            recent_events: &[],
            current_signature: "same-sig",
            prior_session_signature: Some("same-sig"),
        });
        assert_eq!(decision, WatchdogDecision::Escalate);
    }

    #[test]
    fn early_terminate_does_not_apply_past_first_retry() {
        let decision = decide(WatchdogInput {
            timed_out: true,
            retry_count: 1,
            recent_events: &[],
            current_signature: "same-sig",
            prior_session_signature: Some("same-sig"),
        });
        assert_eq!(decision, WatchdogDecision::Escalate);
    }
}
