// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Git port: the minimal set of `git` subcommands the orchestrator ever
//! invokes, each scoped to an explicit `cwd`.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortError {
    #[error("git port not configured: {0}")]
    NotConfigured(String),
    #[error("git command failed (status {status:?}): {stderr}")]
    CommandFailed { status: Option<i32>, stderr: String },
}

#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: Option<i32>,
}

/// Port for the handful of `git` operations the orchestrator needs, each
/// scoped to a worktree directory.
#[async_trait]
pub trait GitPort: Send + Sync + 'static {
    async fn fetch(&self, cwd: &Path, remote: &str, ref_name: &str) -> Result<CommandOutput, PortError>;

    async fn diff(&self, cwd: &Path, range: &str, no_color: bool, stat_only: bool) -> Result<CommandOutput, PortError>;

    async fn status_porcelain(&self, cwd: &Path) -> Result<CommandOutput, PortError>;

    async fn merge_no_edit(&self, cwd: &Path, target: &str) -> Result<CommandOutput, PortError>;

    async fn checkout(&self, cwd: &Path, ref_name: &str) -> Result<CommandOutput, PortError>;

    async fn push(&self, cwd: &Path, remote: &str, ref_name: &str) -> Result<CommandOutput, PortError>;

    async fn worktree_list(&self, cwd: &Path) -> Result<CommandOutput, PortError>;

    async fn worktree_add(&self, cwd: &Path, path: &Path, ref_name: &str) -> Result<CommandOutput, PortError>;

    async fn worktree_remove(&self, cwd: &Path, path: &Path) -> Result<CommandOutput, PortError>;

    async fn rev_parse_git_path(&self, cwd: &Path, path: &str) -> Result<PathBuf, PortError>;
}

/// Documented extension point for a production `git`-subprocess
/// implementation. Left unimplemented: wiring a concrete subprocess runner
/// here is outside this exercise's scope; [`crate::session::CliSessionAdapter`]
/// already shows the idiom this would follow.
pub mod process {
    use super::{CommandOutput, GitPort, PortError};
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};

    #[derive(Debug, Default)]
    pub struct ProcessGitPort {
        _private: (),
    }

    impl ProcessGitPort {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl GitPort for ProcessGitPort {
        async fn fetch(&self, _cwd: &Path, _remote: &str, _ref_name: &str) -> Result<CommandOutput, PortError> {
            Err(PortError::NotConfigured("process git port".into()))
        }

        async fn diff(&self, _cwd: &Path, _range: &str, _no_color: bool, _stat_only: bool) -> Result<CommandOutput, PortError> {
            Err(PortError::NotConfigured("process git port".into()))
        }

        async fn status_porcelain(&self, _cwd: &Path) -> Result<CommandOutput, PortError> {
            Err(PortError::NotConfigured("process git port".into()))
        }

        async fn merge_no_edit(&self, _cwd: &Path, _target: &str) -> Result<CommandOutput, PortError> {
            Err(PortError::NotConfigured("process git port".into()))
        }

        async fn checkout(&self, _cwd: &Path, _ref_name: &str) -> Result<CommandOutput, PortError> {
            Err(PortError::NotConfigured("process git port".into()))
        }

        async fn push(&self, _cwd: &Path, _remote: &str, _ref_name: &str) -> Result<CommandOutput, PortError> {
            Err(PortError::NotConfigured("process git port".into()))
        }

        async fn worktree_list(&self, _cwd: &Path) -> Result<CommandOutput, PortError> {
            Err(PortError::NotConfigured("process git port".into()))
        }

        async fn worktree_add(&self, _cwd: &Path, _path: &Path, _ref_name: &str) -> Result<CommandOutput, PortError> {
            Err(PortError::NotConfigured("process git port".into()))
        }

        async fn worktree_remove(&self, _cwd: &Path, _path: &Path) -> Result<CommandOutput, PortError> {
            Err(PortError::NotConfigured("process git port".into()))
        }

        async fn rev_parse_git_path(&self, _cwd: &Path, _path: &str) -> Result<PathBuf, PortError> {
            Err(PortError::NotConfigured("process git port".into()))
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::{CommandOutput, GitPort, PortError};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    pub struct RecordedCall {
        pub op: &'static str,
        pub args: Vec<String>,
    }

    /// Drains a shared FIFO queue of scripted [`CommandOutput`]s, recording
    /// every call made against it. All operations share one queue — tests
    /// script the exact sequence of git calls they expect.
    #[derive(Clone, Default)]
    pub struct FakeGitPort {
        outputs: Arc<Mutex<VecDeque<Result<CommandOutput, PortError>>>>,
        calls: Arc<Mutex<Vec<RecordedCall>>>,
    }

    impl FakeGitPort {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_ok(&self, stdout: impl Into<String>) {
            self.outputs.lock().push_back(Ok(CommandOutput { stdout: stdout.into(), stderr: String::new(), status: Some(0) }));
        }

        pub fn push_err(&self, error: PortError) {
            self.outputs.lock().push_back(Err(error));
        }

        pub fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().clone()
        }

        fn next(&self, op: &'static str, args: Vec<String>) -> Result<CommandOutput, PortError> {
            self.calls.lock().push(RecordedCall { op, args });
            self.outputs
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(PortError::NotConfigured(format!("fake git port: no scripted output for {op}"))))
        }
    }

    #[async_trait]
    impl GitPort for FakeGitPort {
        async fn fetch(&self, _cwd: &Path, remote: &str, ref_name: &str) -> Result<CommandOutput, PortError> {
            self.next("fetch", vec![remote.to_string(), ref_name.to_string()])
        }

        async fn diff(&self, _cwd: &Path, range: &str, no_color: bool, stat_only: bool) -> Result<CommandOutput, PortError> {
            self.next("diff", vec![range.to_string(), no_color.to_string(), stat_only.to_string()])
        }

        async fn status_porcelain(&self, _cwd: &Path) -> Result<CommandOutput, PortError> {
            self.next("status_porcelain", vec![])
        }

        async fn merge_no_edit(&self, _cwd: &Path, target: &str) -> Result<CommandOutput, PortError> {
            self.next("merge_no_edit", vec![target.to_string()])
        }

        async fn checkout(&self, _cwd: &Path, ref_name: &str) -> Result<CommandOutput, PortError> {
            self.next("checkout", vec![ref_name.to_string()])
        }

        async fn push(&self, _cwd: &Path, remote: &str, ref_name: &str) -> Result<CommandOutput, PortError> {
            self.next("push", vec![remote.to_string(), ref_name.to_string()])
        }

        async fn worktree_list(&self, _cwd: &Path) -> Result<CommandOutput, PortError> {
            self.next("worktree_list", vec![])
        }

        async fn worktree_add(&self, _cwd: &Path, path: &Path, ref_name: &str) -> Result<CommandOutput, PortError> {
            self.next("worktree_add", vec![path.display().to_string(), ref_name.to_string()])
        }

        async fn worktree_remove(&self, _cwd: &Path, path: &Path) -> Result<CommandOutput, PortError> {
            self.next("worktree_remove", vec![path.display().to_string()])
        }

        async fn rev_parse_git_path(&self, _cwd: &Path, path: &str) -> Result<PathBuf, PortError> {
            let out = self.next("rev_parse_git_path", vec![path.to_string()])?;
            Ok(PathBuf::from(out.stdout.trim()))
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeGitPort;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[tokio::test]
    async fn fake_port_drains_scripted_outputs_in_call_order() {
        let port = FakeGitPort::new();
        port.push_ok("up to date");
        port.push_ok(" M src/lib.rs\n");

        let fetch = port.fetch(Path::new("."), "origin", "main").await.unwrap();
        assert_eq!(fetch.stdout, "up to date");

        let status = port.status_porcelain(Path::new(".")).await.unwrap();
        assert_eq!(status.stdout, " M src/lib.rs\n");

        assert_eq!(port.calls().len(), 2);
        assert_eq!(port.calls()[0].op, "fetch");
    }

    #[tokio::test]
    async fn process_port_is_not_configured() {
        let port = process::ProcessGitPort::new();
        let err = port.fetch(Path::new("."), "origin", "main").await.unwrap_err();
        assert!(matches!(err, PortError::NotConfigured(_)));
    }
}
