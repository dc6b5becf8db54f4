// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The session adapter port: how the orchestrator drives the external
//! coding-agent process through one pipeline stage, continues an existing
//! session with a follow-up prompt, or runs a one-off shell command in the
//! task's worktree.

mod cli;
mod preferred;
mod sdk;

#[cfg(any(test, feature = "test-support"))]
mod fake;

pub use cli::CliSessionAdapter;
pub use preferred::{PreferredTransport, Transport};
pub use sdk::SdkSessionAdapter;

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeSessionAdapter, ScriptedTurn};

use async_trait::async_trait;
use ralph_core::IssueRef;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to spawn session process: {0}")]
    Spawn(String),
    #[error("session process exited non-zero (code {code:?}): {stderr_tail}")]
    NonZeroExit { code: Option<i32>, stderr_tail: String },
    #[error("session produced no parseable marker on its final line")]
    NoMarker,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("transport not configured: {0}")]
    NotConfigured(String),
}

/// Input to a fresh agent turn for one pipeline stage.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub issue_ref: IssueRef,
    pub stage: String,
    pub workdir: PathBuf,
    pub prompt: String,
    pub env: Vec<(String, String)>,
}

/// What a completed agent turn produced.
#[derive(Debug, Clone, Default)]
pub struct SessionOutput {
    pub session_id: String,
    pub final_text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub exit_code: Option<i32>,
    /// Structured failure code the agent reported alongside (not instead of)
    /// a successful turn, e.g. `context_length_exceeded`.
    pub error_code: Option<String>,
}

/// Port for running/continuing an agent session or a bare shell command.
/// CLI-process and SDK transports implement this identically from the
/// orchestrator's point of view; see [`PreferredTransport`] for picking
/// between them.
#[async_trait]
pub trait SessionAdapter: Send + Sync + 'static {
    async fn run_agent(&self, config: &SessionConfig) -> Result<SessionOutput, SessionError>;

    async fn continue_session(&self, session_id: &str, prompt: &str) -> Result<SessionOutput, SessionError>;

    async fn continue_command(
        &self,
        workdir: &std::path::Path,
        command: &str,
        args: &[String],
    ) -> Result<SessionOutput, SessionError>;
}
