// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted session adapter for tests: feeds back a queue of canned turns
//! instead of spawning a real process.

use super::{SessionAdapter, SessionConfig, SessionError, SessionOutput};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

/// One canned response for a single call to the adapter.
#[derive(Debug, Clone)]
pub struct ScriptedTurn {
    pub final_text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub exit_code: Option<i32>,
    pub fails_with: Option<String>,
    pub error_code: Option<String>,
}

impl ScriptedTurn {
    pub fn ok(final_text: impl Into<String>) -> Self {
        Self {
            final_text: final_text.into(),
            input_tokens: 0,
            output_tokens: 0,
            exit_code: Some(0),
            fails_with: None,
            error_code: None,
        }
    }

    pub fn with_tokens(mut self, input_tokens: u64, output_tokens: u64) -> Self {
        self.input_tokens = input_tokens;
        self.output_tokens = output_tokens;
        self
    }

    pub fn with_error_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            final_text: String::new(),
            input_tokens: 0,
            output_tokens: 0,
            exit_code: None,
            fails_with: Some(message.into()),
            error_code: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub kind: &'static str,
    pub prompt: String,
}

/// Drains a shared queue of [`ScriptedTurn`]s in FIFO order. Once the queue
/// is empty, every subsequent call fails with `SessionError::NotConfigured`
/// so a test that under-scripts its turns fails loudly instead of hanging.
#[derive(Clone, Default)]
pub struct FakeSessionAdapter {
    turns: Arc<Mutex<VecDeque<ScriptedTurn>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl FakeSessionAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_turns(turns: Vec<ScriptedTurn>) -> Self {
        let adapter = Self::new();
        adapter.push_all(turns);
        adapter
    }

    pub fn push(&self, turn: ScriptedTurn) {
        self.turns.lock().push_back(turn);
    }

    pub fn push_all(&self, turns: Vec<ScriptedTurn>) {
        self.turns.lock().extend(turns);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    fn next_turn(&self, kind: &'static str, prompt: &str) -> Result<SessionOutput, SessionError> {
        self.calls.lock().push(RecordedCall { kind, prompt: prompt.to_string() });

        let turn = self
            .turns
            .lock()
            .pop_front()
            .ok_or_else(|| SessionError::NotConfigured("fake session adapter: no scripted turns left".into()))?;

        if let Some(message) = turn.fails_with {
            return Err(SessionError::NonZeroExit { code: turn.exit_code, stderr_tail: message });
        }

        Ok(SessionOutput {
            session_id: "fake-session".into(),
            final_text: turn.final_text,
            input_tokens: turn.input_tokens,
            output_tokens: turn.output_tokens,
            exit_code: turn.exit_code,
            error_code: turn.error_code,
        })
    }
}

#[async_trait]
impl SessionAdapter for FakeSessionAdapter {
    async fn run_agent(&self, config: &SessionConfig) -> Result<SessionOutput, SessionError> {
        self.next_turn("run_agent", &config.prompt)
    }

    async fn continue_session(&self, _session_id: &str, prompt: &str) -> Result<SessionOutput, SessionError> {
        self.next_turn("continue_session", prompt)
    }

    async fn continue_command(&self, _workdir: &Path, command: &str, args: &[String]) -> Result<SessionOutput, SessionError> {
        self.next_turn("continue_command", &format!("{command} {}", args.join(" ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drains_scripted_turns_in_order() {
        let adapter = FakeSessionAdapter::with_turns(vec![
            ScriptedTurn::ok("first").with_tokens(10, 20),
            ScriptedTurn::ok("second"),
        ]);

        let config = SessionConfig {
            issue_ref: ralph_core::IssueRef::new("acme", "demo", 1),
            stage: "plan".into(),
            workdir: std::env::temp_dir(),
            prompt: "do the thing".into(),
            env: vec![],
        };

        let first = adapter.run_agent(&config).await.unwrap();
        assert_eq!(first.final_text, "first");
        assert_eq!(first.input_tokens, 10);

        let second = adapter.continue_session("sid", "follow up").await.unwrap();
        assert_eq!(second.final_text, "second");

        assert_eq!(adapter.calls().len(), 2);
    }

    #[tokio::test]
    async fn empty_queue_fails_loudly() {
        let adapter = FakeSessionAdapter::new();
        let config = SessionConfig {
            issue_ref: ralph_core::IssueRef::new("acme", "demo", 1),
            stage: "plan".into(),
            workdir: std::env::temp_dir(),
            prompt: "x".into(),
            env: vec![],
        };
        let err = adapter.run_agent(&config).await.unwrap_err();
        assert!(matches!(err, SessionError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn scripted_failure_surfaces_as_non_zero_exit() {
        let adapter = FakeSessionAdapter::with_turns(vec![ScriptedTurn::failing("agent crashed")]);
        let config = SessionConfig {
            issue_ref: ralph_core::IssueRef::new("acme", "demo", 1),
            stage: "build".into(),
            workdir: std::env::temp_dir(),
            prompt: "x".into(),
            env: vec![],
        };
        let err = adapter.run_agent(&config).await.unwrap_err();
        match err {
            SessionError::NonZeroExit { stderr_tail, .. } => assert_eq!(stderr_tail, "agent crashed"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
