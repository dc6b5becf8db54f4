// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI-process transport: spawns the configured agent binary as a child
//! process, feeds it the prompt on stdin, and captures stdout for marker
//! parsing by the caller.

use super::{SessionAdapter, SessionConfig, SessionError, SessionOutput};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Drives the agent via a local CLI binary, one process per turn.
pub struct CliSessionAdapter {
    binary: String,
}

impl CliSessionAdapter {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    async fn run(&self, workdir: &Path, args: &[&str], stdin: &str) -> Result<SessionOutput, SessionError> {
        let mut child = Command::new(&self.binary)
            .args(args)
            .current_dir(workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SessionError::Spawn(e.to_string()))?;

        if let Some(mut stdin_handle) = child.stdin.take() {
            stdin_handle.write_all(stdin.as_bytes()).await?;
        }

        let output = child.wait_with_output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

        if !output.status.success() {
            let stderr_tail = String::from_utf8_lossy(&output.stderr);
            let stderr_tail = stderr_tail.lines().rev().take(20).collect::<Vec<_>>().join("\n");
            return Err(SessionError::NonZeroExit { code: output.status.code(), stderr_tail });
        }

        Ok(SessionOutput {
            session_id: String::new(),
            final_text: stdout,
            input_tokens: 0,
            output_tokens: 0,
            exit_code: output.status.code(),
            error_code: None,
        })
    }
}

#[async_trait]
impl SessionAdapter for CliSessionAdapter {
    async fn run_agent(&self, config: &SessionConfig) -> Result<SessionOutput, SessionError> {
        self.run(&config.workdir, &["--stage", &config.stage], &config.prompt).await
    }

    async fn continue_session(&self, session_id: &str, prompt: &str) -> Result<SessionOutput, SessionError> {
        self.run(Path::new("."), &["--continue", session_id], prompt).await
    }

    async fn continue_command(
        &self,
        workdir: &Path,
        command: &str,
        args: &[String],
    ) -> Result<SessionOutput, SessionError> {
        let child = Command::new(command)
            .args(args)
            .current_dir(workdir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SessionError::Spawn(e.to_string()))?;

        let output = child.wait_with_output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

        if !output.status.success() {
            let stderr_tail = String::from_utf8_lossy(&output.stderr);
            let stderr_tail = stderr_tail.lines().rev().take(20).collect::<Vec<_>>().join("\n");
            return Err(SessionError::NonZeroExit { code: output.status.code(), stderr_tail });
        }

        Ok(SessionOutput {
            session_id: String::new(),
            final_text: stdout,
            input_tokens: 0,
            output_tokens: 0,
            exit_code: output.status.code(),
            error_code: None,
        })
    }
}
