// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prefers the SDK transport when available, falling back to the CLI
//! transport on its first failure. Once a fallback happens the decorator
//! sticks to CLI for the rest of the process's life — flapping between
//! transports mid-run would make session continuity impossible to reason
//! about, so the first failure is treated as a durable signal that the SDK
//! path isn't usable in this environment.

use super::{CliSessionAdapter, SdkSessionAdapter, SessionAdapter, SessionConfig, SessionError, SessionOutput};
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Sdk,
    Cli,
}

pub struct PreferredTransport {
    sdk: SdkSessionAdapter,
    cli: CliSessionAdapter,
    stuck_to_cli: AtomicBool,
}

impl PreferredTransport {
    pub fn new(cli: CliSessionAdapter) -> Self {
        Self { sdk: SdkSessionAdapter::new(), cli, stuck_to_cli: AtomicBool::new(false) }
    }

    pub fn current_transport(&self) -> Transport {
        if self.stuck_to_cli.load(Ordering::Acquire) {
            Transport::Cli
        } else {
            Transport::Sdk
        }
    }

    fn note_sdk_failure(&self) {
        self.stuck_to_cli.store(true, Ordering::Release);
    }
}

#[async_trait]
impl SessionAdapter for PreferredTransport {
    async fn run_agent(&self, config: &SessionConfig) -> Result<SessionOutput, SessionError> {
        if self.current_transport() == Transport::Sdk {
            match self.sdk.run_agent(config).await {
                Ok(out) => return Ok(out),
                Err(e) => {
                    tracing::warn!(error = %e, "sdk transport failed, falling back to cli for the rest of this process");
                    self.note_sdk_failure();
                }
            }
        }
        self.cli.run_agent(config).await
    }

    async fn continue_session(&self, session_id: &str, prompt: &str) -> Result<SessionOutput, SessionError> {
        if self.current_transport() == Transport::Sdk {
            match self.sdk.continue_session(session_id, prompt).await {
                Ok(out) => return Ok(out),
                Err(e) => {
                    tracing::warn!(error = %e, "sdk transport failed, falling back to cli for the rest of this process");
                    self.note_sdk_failure();
                }
            }
        }
        self.cli.continue_session(session_id, prompt).await
    }

    async fn continue_command(&self, workdir: &Path, command: &str, args: &[String]) -> Result<SessionOutput, SessionError> {
        if self.current_transport() == Transport::Sdk {
            match self.sdk.continue_command(workdir, command, args).await {
                Ok(out) => return Ok(out),
                Err(e) => {
                    tracing::warn!(error = %e, "sdk transport failed, falling back to cli for the rest of this process");
                    self.note_sdk_failure();
                }
            }
        }
        self.cli.continue_command(workdir, command, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn falls_back_to_cli_after_sdk_failure_and_sticks() {
        let transport = PreferredTransport::new(CliSessionAdapter::new("/bin/echo"));
        assert_eq!(transport.current_transport(), Transport::Sdk);

        let config = SessionConfig {
            issue_ref: ralph_core::IssueRef::new("acme", "demo", 1),
            stage: "plan".into(),
            workdir: std::env::temp_dir(),
            prompt: "hello".into(),
            env: vec![],
        };
        let _ = transport.run_agent(&config).await;
        assert_eq!(transport.current_transport(), Transport::Cli);

        // Stays on CLI even though this call isn't re-checking the SDK.
        let _ = transport.run_agent(&config).await;
        assert_eq!(transport.current_transport(), Transport::Cli);
    }
}
