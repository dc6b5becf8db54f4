// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SDK transport: in-process client for the agent vendor's SDK. Wiring up
//! an actual SDK client is outside this exercise's scope; this adapter
//! exists so [`super::PreferredTransport`] has something to prefer and fall
//! back from when it isn't available.

use super::{SessionAdapter, SessionConfig, SessionError, SessionOutput};
use async_trait::async_trait;
use std::path::Path;

#[derive(Debug, Default)]
pub struct SdkSessionAdapter {
    _private: (),
}

impl SdkSessionAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionAdapter for SdkSessionAdapter {
    async fn run_agent(&self, _config: &SessionConfig) -> Result<SessionOutput, SessionError> {
        Err(SessionError::NotConfigured("sdk transport".into()))
    }

    async fn continue_session(&self, _session_id: &str, _prompt: &str) -> Result<SessionOutput, SessionError> {
        Err(SessionError::NotConfigured("sdk transport".into()))
    }

    async fn continue_command(&self, _workdir: &Path, _command: &str, _args: &[String]) -> Result<SessionOutput, SessionError> {
        Err(SessionError::NotConfigured("sdk transport".into()))
    }
}
