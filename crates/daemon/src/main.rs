// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ralphd`: the orchestrator daemon entry point. Parses the global flag
//! surface (spec §6), resolves configuration, wires the composition root
//! (`RuntimeContext` in spec §9 — one instance of each port handed to the
//! scheduler/worker by generic parameter), and runs the tick loop (spec
//! §4.6) until SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use ralph_adapters::git::process::ProcessGitPort;
use ralph_adapters::github::http::HttpGitHubPort;
use ralph_adapters::notify::NoopNotifier;
use ralph_core::{Clock, IssueRef, SystemClock, TaskStatus};
use ralph_daemon::adapters::BoxedSessionAdapter;
use ralph_daemon::{discovery, shutdown, DaemonConfig, Profile};
use ralph_engine::{decide_throttle, ConcurrencyGates, Scheduler, ThrottleSignals, Worker};
use ralph_storage::WalStateStore;
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

type DaemonWorker = Worker<BoxedSessionAdapter, HttpGitHubPort, ProcessGitPort, NoopNotifier, SystemClock>;

/// Orchestrator daemon: drives labelled GitHub issues through the fixed
/// plan/review/build/merge pipeline.
#[derive(Parser, Debug)]
#[command(name = "ralphd")]
struct Cli {
    /// Deployment profile; only changes default state-directory roots.
    #[arg(long, value_enum, default_value = "prod")]
    profile: Profile,

    /// Identifies this daemon instance in claimed-task leases and logs.
    /// Defaults to a fresh random id.
    #[arg(long)]
    run_id: Option<String>,

    /// Overrides the default `<state_dir>/config.toml` location.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let run_id = cli.run_id.unwrap_or_else(|| nanoid::nanoid!(10));
    let config = DaemonConfig::load(cli.profile, run_id, cli.config.as_deref())?;

    let _log_guard = init_tracing(&config)?;
    tracing::info!(run_id = %config.run_id, profile = ?config.profile, "ralphd starting");

    run(config).await
}

fn init_tracing(config: &DaemonConfig) -> Result<tracing_appender::non_blocking::WorkerGuard, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(&config.sessions_dir)?;
    let file_appender = tracing_appender::rolling::daily(&config.sessions_dir, "ralphd.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();

    Ok(guard)
}

async fn run(config: DaemonConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(WalStateStore::open(&config.state_db_path)?);
    let session = BoxedSessionAdapter::for_transport(config.opencode_transport, &config.file.agent_binary);
    let discovery_github = HttpGitHubPort::new();
    let git = ProcessGitPort::new();
    let notify = NoopNotifier;
    let clock = SystemClock;

    let worker = Arc::new(DaemonWorker::new(
        Arc::clone(&store),
        session,
        HttpGitHubPort::new(),
        git,
        notify,
        clock,
        config.run_id.clone(),
    ));

    let mut scheduler = Scheduler::new(config.scheduler_bands());
    let mut gates = ConcurrencyGates::new(config.file.global_concurrency, config.file.per_repo_concurrency);

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut workers: JoinSet<()> = JoinSet::new();
    let mut tick = tokio::time::interval(Duration::from_millis(config.file.tick_interval_ms));

    loop {
        tokio::select! {
            _ = tick.tick() => {
                run_tick(&config, &store, &discovery_github, &worker, &mut scheduler, &mut gates, &mut workers).await;
            }
            Some(finished) = workers.join_next(), if !workers.is_empty() => {
                if let Err(e) = finished {
                    if e.is_panic() {
                        tracing::error!("a worker task panicked");
                    }
                }
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, beginning graceful shutdown");
                break;
            }
        }
    }

    shutdown::drain_or_kill(workers, Duration::from_millis(config.file.shutdown_grace_ms)).await;
    tracing::info!("ralphd stopped");
    Ok(())
}

/// One tick of the daemon loop (spec §4.6): refresh inventory, sync GitHub
/// issue state, invoke the scheduler, emit a heartbeat.
async fn run_tick(
    config: &DaemonConfig,
    store: &Arc<WalStateStore>,
    discovery_github: &HttpGitHubPort,
    worker: &Arc<DaemonWorker>,
    scheduler: &mut Scheduler,
    gates: &mut ConcurrencyGates,
    workers: &mut JoinSet<()>,
) {
    let now = SystemClock.epoch_ms();

    for band in &config.file.bands {
        for repo in &band.repos {
            let Some((owner, name)) = repo.split_once('/') else {
                tracing::warn!(repo, "malformed repo slug, expected owner/name");
                continue;
            };
            discovery::sync_repo_issues(
                discovery_github,
                store,
                owner,
                name,
                &config.file.issue_label,
                &config.run_id,
                config.file.heartbeat_ttl_ms,
                now,
            )
            .await;
        }
    }
    scheduler.resync(config.scheduler_bands());

    let gate = decide_throttle(ThrottleSignals { github_rate_limit_remaining: None, recent_5xx_rate: 0.0 });
    if !ralph_engine::scheduler::may_start_new_work(gate) {
        tracing::debug!(?gate, "throttled, starting no new work this tick");
        tracing::info!(heartbeat = true, active_workers = workers.len(), "tick complete");
        return;
    }

    if let Some(repo) = scheduler.next_repo() {
        if let Some((owner, name)) = repo.split_once('/') {
            if let Some(task) = next_queued_task(store, owner, name) {
                if let Some(slot) = gates.try_acquire(&repo) {
                    let worker = Arc::clone(worker);
                    workers.spawn(async move {
                        let _slot = slot;
                        if let Err(e) = worker.run_issue(&task).await {
                            tracing::error!(issue = %task, error = %e, "pipeline run failed");
                        }
                    });
                }
            }
        }
    }

    tracing::info!(heartbeat = true, active_workers = workers.len(), "tick complete");
}

fn next_queued_task(store: &WalStateStore, owner: &str, repo: &str) -> Option<IssueRef> {
    store
        .all_tasks()
        .into_iter()
        .filter(|t| t.status == TaskStatus::Queued && t.issue_ref.owner == owner && t.issue_ref.repo == repo)
        .map(|t| t.issue_ref)
        .min()
}
