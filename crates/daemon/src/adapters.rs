// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Composition-root helpers: picking the configured session transport and
//! erasing its concrete type so the rest of the daemon isn't generic over it.

use async_trait::async_trait;
use ralph_adapters::session::{CliSessionAdapter, PreferredTransport, SdkSessionAdapter, SessionAdapter, SessionConfig, SessionError, SessionOutput};
use std::path::Path;

use crate::config::OpencodeTransport;

/// Type-erased [`SessionAdapter`] so [`ralph_engine::Worker`] doesn't need a
/// distinct monomorphization per transport choice (spec §6:
/// `RALPH_OPENCODE_TRANSPORT`).
pub struct BoxedSessionAdapter(Box<dyn SessionAdapter>);

impl BoxedSessionAdapter {
    pub fn new(inner: impl SessionAdapter) -> Self {
        Self(Box::new(inner))
    }

    /// Build the transport selected by `RALPH_OPENCODE_TRANSPORT`.
    pub fn for_transport(transport: OpencodeTransport, agent_binary: &str) -> Self {
        let cli = CliSessionAdapter::new(agent_binary);
        match transport {
            OpencodeTransport::Cli => Self::new(cli),
            OpencodeTransport::Sdk => Self::new(SdkSessionAdapter::new()),
            OpencodeTransport::SdkPreferred => Self::new(PreferredTransport::new(cli)),
        }
    }
}

#[async_trait]
impl SessionAdapter for BoxedSessionAdapter {
    async fn run_agent(&self, config: &SessionConfig) -> Result<SessionOutput, SessionError> {
        self.0.run_agent(config).await
    }

    async fn continue_session(&self, session_id: &str, prompt: &str) -> Result<SessionOutput, SessionError> {
        self.0.continue_session(session_id, prompt).await
    }

    async fn continue_command(&self, workdir: &Path, command: &str, args: &[String]) -> Result<SessionOutput, SessionError> {
        self.0.continue_command(workdir, command, args).await
    }
}
