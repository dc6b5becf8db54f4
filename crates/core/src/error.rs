// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The orchestrator's unified error taxonomy (spec §7). Every port and
//! recovery lane reports through this enum so the daemon loop can classify
//! a failure into a recovery lane without inspecting string text.

use thiserror::Error;

/// Top-level error taxonomy spanning ports, recovery lanes, and the pipeline
/// itself. Variants map directly onto spec §7's failure classification table.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    #[error("rate limited, retry after {retry_after_ms}ms: {message}")]
    RateLimited { retry_after_ms: u64, message: String },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("agent process failed: {0}")]
    AgentFailure(String),

    #[error("watchdog timeout after {elapsed_ms}ms with no heartbeat")]
    WatchdogTimeout { elapsed_ms: u64 },

    #[error("stall timeout: no forward progress for {elapsed_ms}ms")]
    StallTimeout { elapsed_ms: u64 },

    #[error("loop trip: stage {stage} revisited {visits} times")]
    LoopTrip { stage: String, visits: u32 },

    #[error("context length exceeded: {used_tokens} tokens used, limit {limit_tokens}")]
    ContextLengthExceeded { used_tokens: u64, limit_tokens: u64 },

    #[error("marker parse failure in {stage}: {reason}")]
    MarkerParse { stage: String, reason: String },

    #[error("merge conflict in {path}")]
    MergeConflict { path: String },

    #[error("CI failure: {0}")]
    CiFailure(String),

    #[error("PR evidence missing for completed run {run_id}")]
    PrEvidenceMissing { run_id: String },

    #[error("policy denied: {0}")]
    PolicyDenied(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("port not configured: {0}")]
    NotConfigured(String),

    #[error("conflict: {0}")]
    Conflict(String),
}

impl OrchestratorError {
    /// Whether this error class is safe to retry without operator
    /// intervention (transient network blips, rate limiting).
    pub fn is_retryable(&self) -> bool {
        matches!(self, OrchestratorError::TransientNetwork(_) | OrchestratorError::RateLimited { .. })
    }

    /// Whether this error should route the task to the `Escalated` terminal
    /// state rather than a recovery lane (spec §7: auth/permission/policy
    /// failures never self-heal).
    pub fn is_terminal_escalation(&self) -> bool {
        matches!(self, OrchestratorError::PermissionDenied(_) | OrchestratorError::PolicyDenied(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_network_is_retryable() {
        assert!(OrchestratorError::TransientNetwork("dns".into()).is_retryable());
    }

    #[test]
    fn permission_denied_is_terminal() {
        assert!(OrchestratorError::PermissionDenied("no write access".into()).is_terminal_escalation());
    }

    #[test]
    fn agent_failure_is_neither_retryable_nor_terminal_by_default() {
        let e = OrchestratorError::AgentFailure("nonzero exit".into());
        assert!(!e.is_retryable());
        assert!(!e.is_terminal_escalation());
    }
}
