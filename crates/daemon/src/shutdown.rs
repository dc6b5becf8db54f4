// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Graceful shutdown (spec §5): SIGTERM drains in-flight workers inside a
//! grace window, then the daemon's whole process group is force-killed so
//! no orphaned agent subprocess survives it.

use std::time::Duration;

use nix::sys::signal::{killpg, Signal};
use nix::unistd::getpgrp;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Waits for `workers` to finish, aborting and SIGKILLing the process group
/// if they haven't drained within `grace`.
pub async fn drain_or_kill(mut workers: JoinSet<()>, grace: Duration) {
    if workers.is_empty() {
        return;
    }

    info!(pending = workers.len(), grace_ms = grace.as_millis(), "draining in-flight workers");
    let drained = tokio::time::timeout(grace, async {
        while workers.join_next().await.is_some() {}
    })
    .await;

    if drained.is_err() {
        warn!("grace window elapsed with workers still running; killing process group");
        workers.abort_all();
        terminate_process_group();
    } else {
        info!("all workers drained cleanly");
    }
}

/// SIGKILLs this process's entire process group, per spec §5's cancellation
/// order ("SIGTERM → grace window → SIGKILL"). Agent subprocesses spawned by
/// [`ralph_adapters::session::CliSessionAdapter`] inherit the daemon's
/// process group, so this reaches them too.
fn terminate_process_group() {
    if let Err(e) = killpg(getpgrp(), Signal::SIGKILL) {
        warn!(error = %e, "failed to signal process group");
    }
}
