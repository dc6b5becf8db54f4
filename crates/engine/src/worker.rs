// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-issue worker (spec §4.4): drives one claimed task through the
//! fixed ten-stage pipeline, dispatching to a recovery lane on any stage
//! failure and durably recording every transition before attempting a
//! side effect that cannot be replayed.

use crate::marker::{self, GateStatus as MarkerStatus};
use crate::merge_policy;
use crate::pr_link;
use crate::stage::Stage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ralph_adapters::git::GitPort;
use ralph_adapters::github::{GitHubPort, Request};
use ralph_adapters::notify::NotifyPort;
use ralph_adapters::session::{SessionAdapter, SessionConfig, SessionOutput};
use ralph_core::{
    AttemptKind, BlockedSource, Clock, GateArtifact, GateArtifactKind, GateKind, GateStatus, IdempotencyKey,
    IdempotencyRecord, IdempotentOp, IssueRef, NoPrTerminalReason, OrchestratorError, ParentVerificationState, Run,
    RunId, RunOutcome, TaskStatus,
};
use ralph_recovery::signature::CiCheckObservation;
use ralph_recovery::{ci_triage, context_compact, merge_conflict, parent_verification as parent_verify_lane, pr_evidence, watchdog_stall};
use ralph_storage::WalStateStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Base, cap and max-attempts for [`Worker::ci_wait`]'s required-check poll
/// loop (spec §4.4: "exponential backoff on unchanged signatures; jitter
/// +/-20%; cap 120s").
const CI_WAIT_BASE_BACKOFF_MS: u64 = 2_000;
const CI_WAIT_MAX_BACKOFF_MS: u64 = 120_000;
const CI_WAIT_MAX_ATTEMPTS: u32 = 8;

/// Backoff seed handed to a deferred parent-verification retry.
const PARENT_VERIFY_BASE_BACKOFF_MS: u64 = 30_000;

/// Tunables for the pipeline's bounded retry/repair behavior. All of these
/// are named by spec §4.3/§4.4 rather than invented.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub max_review_repairs: u32,
    pub max_ci_triage_attempts: u32,
    pub max_parent_verify_attempts: u32,
    /// Identifies the pre-flight setup recipe; part of the setup-marker
    /// idempotency discriminator alongside the worktree's lockfile signature.
    pub setup_commands_hash: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_review_repairs: 2,
            max_ci_triage_attempts: 3,
            max_parent_verify_attempts: 5,
            setup_commands_hash: "ralph-setup".into(),
        }
    }
}

/// Terminal result of a full pipeline run, mirroring the worker's state
/// machine terminals (spec §4.4): `completed`, `escalated`, `blocked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    Completed,
    Escalated,
    Blocked,
}

/// One iteration's verdict, used internally to decide whether the pipeline
/// keeps advancing or stops at a terminal.
enum StageVerdict {
    Advance,
    Blocked,
    Escalated,
    /// Reached a terminal "success" outside the normal stage order (e.g. a
    /// parent-verification "no work remains" outcome): complete the task and
    /// the run without a PR URL.
    Completed { no_pr_terminal_reason: Option<NoPrTerminalReason> },
}

/// What the merge stage and the CI poll loop both need about a pull request.
#[derive(Debug, Clone, Default)]
struct PrMetadata {
    mergeable_state: String,
    head_sha: String,
    base_ref: String,
    draft: bool,
    head_repo_full_name: String,
    base_repo_full_name: String,
    labels: Vec<String>,
}

struct CheckRun {
    name: String,
    status: String,
    conclusion: Option<String>,
    excerpt: String,
}

pub struct Worker<S, H, G, N, C> {
    store: Arc<WalStateStore>,
    session: S,
    github: H,
    git: G,
    notify: N,
    clock: C,
    daemon_id: String,
    config: WorkerConfig,
}

impl<S, H, G, N, C> Worker<S, H, G, N, C>
where
    S: SessionAdapter,
    H: GitHubPort,
    G: GitPort,
    N: NotifyPort,
    C: Clock,
{
    pub fn new(store: Arc<WalStateStore>, session: S, github: H, git: G, notify: N, clock: C, daemon_id: impl Into<String>) -> Self {
        Self { store, session, github, git, notify, clock, daemon_id: daemon_id.into(), config: WorkerConfig::default() }
    }

    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Drive `issue_ref`'s currently-claimed task through the pipeline,
    /// starting from `pre_flight`, until it reaches a terminal state.
    pub async fn run_issue(&self, issue_ref: &IssueRef) -> Result<PipelineOutcome, OrchestratorError> {
        let now = self.clock.epoch_ms();
        let run = Run::new(issue_ref.clone(), AttemptKind::Process, now);
        let run_id = self.store.create_run(run).map_err(storage_err)?;

        let mut stage = Stage::PreFlight;
        loop {
            tracing::info!(%issue_ref, %stage, "entering stage");

            let verdict = match stage {
                Stage::PreFlight => self.pre_flight(issue_ref, run_id).await,
                Stage::Plan => self.plan(issue_ref).await,
                Stage::PlanReview => self.plan_review(issue_ref, run_id).await,
                Stage::Build => self.build(issue_ref).await,
                Stage::ProductReview => self.review(issue_ref, run_id, GateKind::ProductReview, "main").await,
                Stage::DevexReview => self.review(issue_ref, run_id, GateKind::DevexReview, "main").await,
                Stage::PrCreate => self.pr_create(issue_ref).await,
                Stage::CiWait => self.ci_wait(issue_ref).await,
                Stage::Merge => self.merge(issue_ref).await,
                Stage::PrEvidence => self.pr_evidence(issue_ref, run_id).await,
                Stage::Done => {
                    self.store.complete_task(issue_ref, self.clock.epoch_ms()).map_err(storage_err)?;
                    self.store
                        .complete_run(run_id, RunOutcome::Success, None, None, None, self.clock.epoch_ms())
                        .map_err(storage_err)?;
                    return Ok(PipelineOutcome::Completed);
                }
            }?;

            match verdict {
                StageVerdict::Advance => {
                    stage = stage.next().expect("Done is handled separately above");
                }
                StageVerdict::Blocked => return Ok(PipelineOutcome::Blocked),
                StageVerdict::Escalated => {
                    self.notify
                        .notify("task escalated", &format!("{issue_ref} escalated at stage {stage}"))
                        .await
                        .ok();
                    return Ok(PipelineOutcome::Escalated);
                }
                StageVerdict::Completed { no_pr_terminal_reason } => {
                    self.store.complete_task(issue_ref, self.clock.epoch_ms()).map_err(storage_err)?;
                    self.store
                        .complete_run(run_id, RunOutcome::Success, None, None, no_pr_terminal_reason, self.clock.epoch_ms())
                        .map_err(storage_err)?;
                    return Ok(PipelineOutcome::Completed);
                }
            }
        }
    }

    async fn block(&self, issue_ref: &IssueRef, source: BlockedSource, reason: &str) -> Result<StageVerdict, OrchestratorError> {
        self.store.block_task(issue_ref, source, reason, None, self.clock.epoch_ms()).map_err(storage_err)?;
        Ok(StageVerdict::Blocked)
    }

    async fn escalate(&self, issue_ref: &IssueRef, run_id: RunId, reason: &str) -> Result<StageVerdict, OrchestratorError> {
        self.post_idempotent_comment(issue_ref, "escalated", &format!("escalating this task: {reason}")).await?;
        self.store
            .complete_run(run_id, RunOutcome::Escalated, Some(reason), None, None, self.clock.epoch_ms())
            .map_err(storage_err)?;
        self.store.update_task_status(issue_ref, TaskStatus::Escalated, self.clock.epoch_ms()).map_err(storage_err)?;
        Ok(StageVerdict::Escalated)
    }

    /// The task's managed worktree, resolved during pre-flight. Every stage
    /// that shells out to git or the agent runs there, never in a scratch
    /// directory the pipeline doesn't own.
    fn workdir(&self, issue_ref: &IssueRef) -> PathBuf {
        self.store.task(issue_ref).and_then(|t| t.worktree_path).unwrap_or_else(std::env::temp_dir)
    }

    fn pr_create_key(&self, issue_ref: &IssueRef) -> IdempotencyKey {
        IdempotencyKey::new(issue_ref.clone(), IdempotentOp::CreatePr, format!("{issue_ref}-bot-branch"))
    }

    async fn pre_flight(&self, issue_ref: &IssueRef, run_id: RunId) -> Result<StageVerdict, OrchestratorError> {
        let task = self.store.task(issue_ref).ok_or_else(|| OrchestratorError::Storage("task missing at pre-flight".into()))?;

        let worktree_path = match task.worktree_path {
            Some(path) => path,
            None => {
                let managed_root = PathBuf::from("/var/lib/ralph/worktrees");
                let path = managed_root.join(format!("{}-{}", issue_ref.owner, issue_ref.repo)).join(issue_ref.number.to_string());
                self.git
                    .worktree_add(&managed_root, &path, "HEAD")
                    .await
                    .map_err(|e| OrchestratorError::TransientNetwork(e.to_string()))?;
                self.store.set_task_worktree(issue_ref, path.clone()).map_err(storage_err)?;
                path
            }
        };

        if let Some(verdict) = self.maybe_run_parent_verification(issue_ref, run_id, &worktree_path).await? {
            return Ok(verdict);
        }

        self.ensure_setup(issue_ref, &worktree_path).await?;
        self.resolve_canonical_pr(issue_ref).await?;

        Ok(StageVerdict::Advance)
    }

    /// Skips running setup when a prior successful attempt recorded the same
    /// `(commandsHash, lockfileSignature)` pair; otherwise runs it under a
    /// heartbeat'd window so the watchdog doesn't mistake a slow install for
    /// a stuck session.
    async fn ensure_setup(&self, issue_ref: &IssueRef, workdir: &Path) -> Result<(), OrchestratorError> {
        let status = self.git.status_porcelain(workdir).await.map_err(|e| OrchestratorError::TransientNetwork(e.to_string()))?;
        let lockfile_signature = if status.stdout.trim().is_empty() { "clean".to_string() } else { status.stdout.trim().to_string() };
        let key = IdempotencyKey::new(
            issue_ref.clone(),
            IdempotentOp::Other("ensure_setup".into()),
            format!("{}:{}", self.config.setup_commands_hash, lockfile_signature),
        );

        if self.store.idempotency_record(&key).is_some() {
            return Ok(());
        }

        self.store.heartbeat_task(issue_ref, self.clock.epoch_ms()).map_err(storage_err)?;
        let result = self.session.continue_command(workdir, "sh", &["-lc".to_string(), self.config.setup_commands_hash.clone()]).await;
        self.store.heartbeat_task(issue_ref, self.clock.epoch_ms()).map_err(storage_err)?;

        result.map_err(|e| OrchestratorError::AgentFailure(e.to_string()))?;
        self.store
            .record_idempotency_key(IdempotencyRecord { key, recorded_at_ms: self.clock.epoch_ms(), outcome_url: None })
            .map_err(storage_err)?;
        Ok(())
    }

    /// Resolves the canonical PR for this issue from its cross-referenced
    /// timeline entries (earliest opened, ties broken by latest updated) and
    /// seeds the `CreatePr` idempotency record so `pr_create` finds it
    /// already satisfied instead of opening a duplicate.
    async fn resolve_canonical_pr(&self, issue_ref: &IssueRef) -> Result<(), OrchestratorError> {
        let key = self.pr_create_key(issue_ref);
        if self.store.idempotency_record(&key).is_some() {
            return Ok(());
        }

        let path = format!("/repos/{}/{}/issues/{}/timeline", issue_ref.owner, issue_ref.repo, issue_ref.number);
        let response = self
            .github
            .request(Request::get(&path).allowing_not_found())
            .await
            .map_err(|e| OrchestratorError::TransientNetwork(e.to_string()))?;

        let candidates = pr_link::parse_pr_candidates(response.data.as_ref());
        let Some(canonical) = pr_link::select_canonical(&candidates) else {
            return Ok(());
        };

        self.store
            .record_idempotency_key(IdempotencyRecord { key, recorded_at_ms: self.clock.epoch_ms(), outcome_url: Some(canonical.html_url.clone()) })
            .map_err(storage_err)?;
        Ok(())
    }

    /// Claims and runs a pending, due parent-verification marker (spec
    /// §4.3.5). Returns `None` when there's nothing to verify (or it isn't
    /// due yet), letting pre-flight continue into the normal pipeline.
    async fn maybe_run_parent_verification(
        &self,
        issue_ref: &IssueRef,
        run_id: RunId,
        workdir: &Path,
    ) -> Result<Option<StageVerdict>, OrchestratorError> {
        let Some(mut state) = self.store.parent_verification(issue_ref) else {
            return Ok(None);
        };
        let now = self.clock.epoch_ms();
        if !state.is_due(now) {
            return Ok(None);
        }

        state.claim();
        self.store.claim_parent_verification(issue_ref).map_err(storage_err)?;

        let output = self
            .session
            .run_agent(&SessionConfig {
                issue_ref: issue_ref.clone(),
                stage: "parent_verify".into(),
                workdir: workdir.to_path_buf(),
                prompt: "ralph-parent-verify".into(),
                env: vec![],
            })
            .await
            .map_err(|e| OrchestratorError::AgentFailure(e.to_string()))?;

        self.store.record_token_usage(issue_ref, output.input_tokens, output.output_tokens).map_err(storage_err)?;

        let parsed = marker::parse_parent_verify(&output.final_text).map(|m| {
            if m.work_remains {
                parent_verify_lane::ParsedVerifyMarker::WorkRemains
            } else {
                parent_verify_lane::ParsedVerifyMarker::NoWork {
                    reason: m.no_pr_terminal_reason.unwrap_or(NoPrTerminalReason::ParentVerificationNoPr),
                }
            }
        });

        match parent_verify_lane::decide(parsed, state.attempts, state.max_attempts) {
            parent_verify_lane::ParentVerifyOutcome::WorkRemains => {
                self.store.complete_parent_verification(issue_ref).map_err(storage_err)?;
                Ok(None)
            }
            parent_verify_lane::ParentVerifyOutcome::NoWork { reason } => {
                self.store.complete_parent_verification(issue_ref).map_err(storage_err)?;
                Ok(Some(StageVerdict::Completed { no_pr_terminal_reason: Some(reason) }))
            }
            parent_verify_lane::ParentVerifyOutcome::Deferred => {
                self.store
                    .record_parent_verification_failure(issue_ref, "parent verify marker parse failure", now, PARENT_VERIFY_BASE_BACKOFF_MS)
                    .map_err(storage_err)?;
                Ok(Some(self.block(issue_ref, BlockedSource::ParentVerify, "parent verification deferred, awaiting retry window").await?))
            }
            parent_verify_lane::ParentVerifyOutcome::Escalate => {
                self.store
                    .record_parent_verification_failure(issue_ref, "parent verify attempts exhausted", now, PARENT_VERIFY_BASE_BACKOFF_MS)
                    .map_err(storage_err)?;
                Ok(Some(self.escalate(issue_ref, run_id, "parent verification exhausted").await?))
            }
        }
    }

    async fn plan(&self, issue_ref: &IssueRef) -> Result<StageVerdict, OrchestratorError> {
        let workdir = self.workdir(issue_ref);
        let output = self.run_agent_with_compact(issue_ref, Stage::Plan, &workdir, "ralph-plan").await?;
        self.store.record_token_usage(issue_ref, output.input_tokens, output.output_tokens).map_err(storage_err)?;
        Ok(StageVerdict::Advance)
    }

    async fn plan_review(&self, issue_ref: &IssueRef, run_id: RunId) -> Result<StageVerdict, OrchestratorError> {
        let mut attempt = 0;
        loop {
            let output = self
                .session
                .continue_session(issue_ref.to_string().as_str(), "emit RALPH_PLAN_REVIEW")
                .await
                .map_err(|e| OrchestratorError::AgentFailure(e.to_string()))?;

            match marker::parse_plan_review(&output.final_text) {
                Some(m) => {
                    let status = if m.status == MarkerStatus::Pass { GateStatus::Pass } else { GateStatus::Fail };
                    self.store
                        .upsert_gate_result(issue_ref, run_id, GateKind::PlanReview, status, Some(&m.reason), self.clock.epoch_ms())
                        .map_err(storage_err)?;
                    return if status == GateStatus::Pass {
                        Ok(StageVerdict::Advance)
                    } else {
                        self.block(issue_ref, BlockedSource::Review, &m.reason).await
                    };
                }
                None if attempt < self.config.max_review_repairs => {
                    attempt += 1;
                    continue;
                }
                None => {
                    self.store
                        .upsert_gate_result(issue_ref, run_id, GateKind::PlanReview, GateStatus::Fail, Some("marker parse failure"), self.clock.epoch_ms())
                        .map_err(storage_err)?;
                    return self.block(issue_ref, BlockedSource::Review, "plan review marker parse failure").await;
                }
            }
        }
    }

    async fn build(&self, issue_ref: &IssueRef) -> Result<StageVerdict, OrchestratorError> {
        let workdir = self.workdir(issue_ref);
        let result = self.run_agent_with_compact(issue_ref, Stage::Build, &workdir, "ralph-build").await;

        match result {
            Ok(out) => {
                self.store.record_token_usage(issue_ref, out.input_tokens, out.output_tokens).map_err(storage_err)?;
                Ok(StageVerdict::Advance)
            }
            Err(e) => {
                let decision = watchdog_stall::decide(watchdog_stall::WatchdogInput {
                    timed_out: true,
                    retry_count: self.store.task(issue_ref).map(|t| t.watchdog_retries).unwrap_or(0),
                    recent_events: &[],
                    current_signature: "build",
                    prior_session_signature: None,
                });
                match decision {
                    watchdog_stall::WatchdogDecision::Requeue => {
                        self.store.increment_retry(issue_ref, BlockedSource::Watchdog).map_err(storage_err)?;
                        self.post_idempotent_comment(issue_ref, "stuck", &format!("automation appears stuck at the build stage: {e}")).await?;
                        self.block(issue_ref, BlockedSource::Watchdog, &e.to_string()).await
                    }
                    watchdog_stall::WatchdogDecision::Escalate | watchdog_stall::WatchdogDecision::Continue => {
                        Err(OrchestratorError::AgentFailure(e.to_string()))
                    }
                }
            }
        }
    }

    /// Runs one agent turn, then transparently compacts and resumes if the
    /// turn reports `error_code == "context_length_exceeded"` (spec §4.3.4),
    /// at most once per `(issue, stage)`.
    async fn run_agent_with_compact(&self, issue_ref: &IssueRef, stage: Stage, workdir: &Path, prompt: &str) -> Result<SessionOutput, OrchestratorError> {
        let output = self
            .session
            .run_agent(&SessionConfig {
                issue_ref: issue_ref.clone(),
                stage: stage.as_str().into(),
                workdir: workdir.to_path_buf(),
                prompt: prompt.into(),
                env: vec![],
            })
            .await
            .map_err(|e| OrchestratorError::AgentFailure(e.to_string()))?;

        if output.error_code.as_deref() == Some("context_length_exceeded") {
            return self.compact_and_resume(issue_ref, stage.as_str(), workdir).await;
        }
        Ok(output)
    }

    async fn compact_and_resume(&self, issue_ref: &IssueRef, step_key: &str, workdir: &Path) -> Result<SessionOutput, OrchestratorError> {
        let key = IdempotencyKey::new(issue_ref.clone(), IdempotentOp::Other("context_compact".into()), step_key.to_string());
        let already_attempted = self.store.idempotency_record(&key).is_some();

        match context_compact::decide(step_key, already_attempted) {
            context_compact::ContextCompactDecision::PropagateOriginal => {
                Err(OrchestratorError::ContextLengthExceeded { used_tokens: 0, limit_tokens: 0 })
            }
            context_compact::ContextCompactDecision::CompactAndResume => {
                self.store
                    .record_idempotency_key(IdempotencyRecord { key, recorded_at_ms: self.clock.epoch_ms(), outcome_url: None })
                    .map_err(storage_err)?;
                self.session
                    .continue_command(workdir, "sh", &["-lc".to_string(), "git status --porcelain".to_string()])
                    .await
                    .map_err(|e| OrchestratorError::AgentFailure(e.to_string()))?;
                self.session
                    .continue_session(issue_ref.to_string().as_str(), "/compact")
                    .await
                    .map_err(|e| OrchestratorError::AgentFailure(e.to_string()))
            }
        }
    }

    async fn review(&self, issue_ref: &IssueRef, run_id: RunId, kind: GateKind, base: &str) -> Result<StageVerdict, OrchestratorError> {
        let workdir = self.workdir(issue_ref);
        self.git.fetch(&workdir, "origin", base).await.map_err(|e| OrchestratorError::TransientNetwork(e.to_string()))?;
        let diff = self
            .git
            .diff(&workdir, &format!("origin/{base}...HEAD"), true, false)
            .await
            .map_err(|e| OrchestratorError::TransientNetwork(e.to_string()))?;

        let output = self
            .session
            .run_agent(&SessionConfig {
                issue_ref: issue_ref.clone(),
                stage: kind.to_string(),
                workdir,
                prompt: format!("review this diff:\n{}", diff.stdout),
                env: vec![],
            })
            .await
            .map_err(|e| OrchestratorError::AgentFailure(e.to_string()))?;

        self.store.record_token_usage(issue_ref, output.input_tokens, output.output_tokens).map_err(storage_err)?;

        match marker::parse_review(&output.final_text) {
            Some(m) => {
                let status = if m.status == MarkerStatus::Pass { GateStatus::Pass } else { GateStatus::Fail };
                self.store.upsert_gate_result(issue_ref, run_id, kind, status, Some(&m.reason), self.clock.epoch_ms()).map_err(storage_err)?;
                self.store
                    .record_gate_artifact(
                        issue_ref,
                        run_id,
                        kind,
                        GateArtifact {
                            kind: GateArtifactKind::Diff,
                            recorded_at_ms: self.clock.epoch_ms(),
                            location: "diff.patch".into(),
                            summary: Some(diff.stdout.lines().take(5).collect::<Vec<_>>().join("\n")),
                        },
                    )
                    .map_err(storage_err)?;
                if status == GateStatus::Pass {
                    Ok(StageVerdict::Advance)
                } else {
                    self.block(issue_ref, BlockedSource::Review, &m.reason).await
                }
            }
            None => {
                self.store.upsert_gate_result(issue_ref, run_id, kind, GateStatus::Fail, Some("marker parse failure"), self.clock.epoch_ms()).map_err(storage_err)?;
                self.block(issue_ref, BlockedSource::Review, "review marker parse failure").await
            }
        }
    }

    async fn pr_create(&self, issue_ref: &IssueRef) -> Result<StageVerdict, OrchestratorError> {
        let key = self.pr_create_key(issue_ref);

        if let Some(existing) = self.store.idempotency_record(&key) {
            tracing::debug!(%issue_ref, url = ?existing.outcome_url, "pr already created, skipping");
            return Ok(StageVerdict::Advance);
        }

        let response = self
            .github
            .request(Request::post(&format!("/repos/{}/{}/pulls", issue_ref.owner, issue_ref.repo), serde_json::json!({"issue": issue_ref.number})))
            .await;

        match response {
            Ok(resp) if resp.status == 403 => self.block(issue_ref, BlockedSource::Permission, "pr create denied by github").await,
            Ok(resp) => {
                let url = resp.data.as_ref().and_then(|d| d.get("html_url")).and_then(|v| v.as_str()).map(str::to_string);
                self.store.record_idempotency_key(IdempotencyRecord { key, recorded_at_ms: self.clock.epoch_ms(), outcome_url: url }).map_err(storage_err)?;
                Ok(StageVerdict::Advance)
            }
            Err(e) => Err(OrchestratorError::TransientNetwork(e.to_string())),
        }
    }

    fn resolve_pr_number(&self, issue_ref: &IssueRef) -> Result<u64, OrchestratorError> {
        let record = self
            .store
            .idempotency_record(&self.pr_create_key(issue_ref))
            .ok_or_else(|| OrchestratorError::Storage("pr not yet created".into()))?;
        let url = record.outcome_url.ok_or_else(|| OrchestratorError::Storage("pr creation record missing url".into()))?;
        pr_link::pr_number_from_url(&url).ok_or_else(|| OrchestratorError::Storage(format!("could not parse pr number from {url}")))
    }

    async fn fetch_pr_metadata(&self, issue_ref: &IssueRef, pr_number: u64) -> Result<PrMetadata, OrchestratorError> {
        let path = format!("/repos/{}/{}/pulls/{}", issue_ref.owner, issue_ref.repo, pr_number);
        let response = self.github.request(Request::get(&path)).await.map_err(|e| OrchestratorError::TransientNetwork(e.to_string()))?;
        let data = response.data.ok_or_else(|| OrchestratorError::TransientNetwork("pull request response missing body".into()))?;

        let labels = data
            .get("labels")
            .and_then(|v| v.as_array())
            .map(|items| items.iter().filter_map(|l| l.get("name").and_then(|n| n.as_str()).map(str::to_string)).collect())
            .unwrap_or_default();

        Ok(PrMetadata {
            mergeable_state: data.get("mergeable_state").and_then(|v| v.as_str()).unwrap_or("unknown").to_string(),
            head_sha: data.get("head").and_then(|h| h.get("sha")).and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            base_ref: data.get("base").and_then(|b| b.get("ref")).and_then(|v| v.as_str()).unwrap_or("main").to_string(),
            draft: data.get("draft").and_then(|v| v.as_bool()).unwrap_or(false),
            head_repo_full_name: data.get("head").and_then(|h| h.get("repo")).and_then(|r| r.get("full_name")).and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            base_repo_full_name: data.get("base").and_then(|b| b.get("repo")).and_then(|r| r.get("full_name")).and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            labels,
        })
    }

    async fn fetch_required_check_runs(&self, issue_ref: &IssueRef, head_sha: &str) -> Result<Vec<CheckRun>, OrchestratorError> {
        let path = format!("/repos/{}/{}/commits/{}/check-runs", issue_ref.owner, issue_ref.repo, head_sha);
        let response = self
            .github
            .request(Request::get(&path).allowing_not_found())
            .await
            .map_err(|e| OrchestratorError::TransientNetwork(e.to_string()))?;

        let Some(items) = response.data.as_ref().and_then(|d| d.get("check_runs")).and_then(|v| v.as_array()) else {
            return Ok(Vec::new());
        };

        Ok(items
            .iter()
            .map(|item| CheckRun {
                name: item.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                status: item.get("status").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                conclusion: item.get("conclusion").and_then(|v| v.as_str()).map(str::to_string),
                excerpt: item
                    .get("output")
                    .and_then(|o| o.get("summary"))
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .chars()
                    .take(200)
                    .collect(),
            })
            .collect())
    }

    /// Polls required checks on the open PR with jittered exponential
    /// backoff, routing a dirty merge state to the conflict lane and a
    /// failure or exhausted poll budget to CI-triage (spec §4.4/§4.5).
    async fn ci_wait(&self, issue_ref: &IssueRef) -> Result<StageVerdict, OrchestratorError> {
        let pr_number = self.resolve_pr_number(issue_ref)?;
        let mut prior_signature: Option<String> = None;
        let mut attempt: u32 = 0;

        loop {
            let pr = self.fetch_pr_metadata(issue_ref, pr_number).await?;
            if pr.mergeable_state == "dirty" {
                return self.block(issue_ref, BlockedSource::Review, "pull request is dirty, needs a rebase").await;
            }

            let checks = self.fetch_required_check_runs(issue_ref, &pr.head_sha).await?;
            let observations: Vec<CiCheckObservation<'_>> =
                checks.iter().map(|c| CiCheckObservation { check_name: &c.name, normalized_excerpt: &c.excerpt }).collect();

            let all_complete = checks.iter().all(|c| c.status == "completed");
            let any_failed = checks.iter().any(|c| matches!(c.conclusion.as_deref(), Some("failure") | Some("timed_out") | Some("cancelled")));
            let timed_out = attempt >= CI_WAIT_MAX_ATTEMPTS;

            if all_complete && !any_failed {
                return Ok(StageVerdict::Advance);
            }

            if any_failed || timed_out {
                let prior_attempt = prior_signature.take().map(|signature| ci_triage::PriorAttempt { signature, attempt_count: attempt });
                let result = ci_triage::decide(ci_triage::CiTriageInput {
                    timed_out: timed_out && !any_failed,
                    checks: &observations,
                    prior_attempt,
                    max_attempts: self.config.max_ci_triage_attempts,
                });
                match result.decision {
                    ci_triage::CiTriageDecision::Quarantine => return self.block(issue_ref, BlockedSource::CiTriage, "ci failure signature repeating").await,
                    ci_triage::CiTriageDecision::Escalate => return Err(OrchestratorError::CiFailure("ci-triage attempts exhausted".into())),
                    ci_triage::CiTriageDecision::Spawn | ci_triage::CiTriageDecision::Resume => {
                        prior_signature = Some(result.signature);
                    }
                }
            }

            attempt += 1;
            let backoff_ms = jittered_backoff_ms(attempt);
            tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
        }
    }

    async fn merge(&self, issue_ref: &IssueRef) -> Result<StageVerdict, OrchestratorError> {
        let pr_number = self.resolve_pr_number(issue_ref)?;
        let workdir = self.workdir(issue_ref);

        self.git.fetch(&workdir, "origin", "main").await.map_err(|e| OrchestratorError::TransientNetwork(e.to_string()))?;
        let ahead_behind = self
            .git
            .diff(&workdir, "HEAD..origin/main", true, true)
            .await
            .map_err(|e| OrchestratorError::TransientNetwork(e.to_string()))?;
        if !ahead_behind.stdout.trim().is_empty() {
            self.git.merge_no_edit(&workdir, "origin/main").await.map_err(|e| OrchestratorError::MergeConflict { path: e.to_string() })?;
        }

        let pr = self.fetch_pr_metadata(issue_ref, pr_number).await?;
        let diff_stat = self
            .git
            .diff(&workdir, "origin/main...HEAD", true, true)
            .await
            .map_err(|e| OrchestratorError::TransientNetwork(e.to_string()))?;

        let guard_input = merge_policy::MergeGuardInput {
            base_ref: &pr.base_ref,
            allow_main_label: pr.labels.iter().any(|l| l == "allow-main"),
            diff_is_ci_only: merge_policy::diff_is_ci_only(&diff_stat.stdout),
            issue_has_ci_label: pr.labels.iter().any(|l| l == "ci"),
            pr_is_draft: pr.draft,
            head_repo_full_name: &pr.head_repo_full_name,
            target_repo_full_name: &pr.base_repo_full_name,
        };
        if let Some(refusal) = merge_policy::check(guard_input) {
            return self.block(issue_ref, BlockedSource::Review, refusal.reason()).await;
        }

        let status = self.git.status_porcelain(&workdir).await.map_err(|e| OrchestratorError::TransientNetwork(e.to_string()))?;
        if !status.stdout.trim().is_empty() {
            let outcome = merge_conflict::ResumeOutcome { permission_denied: false, tooling_unavailable: false, stderr_tail: &status.stdout };
            let class = merge_conflict::classify(&outcome);
            return match merge_conflict::decide(class) {
                merge_conflict::Decision::RetrySameRun => Err(OrchestratorError::MergeConflict { path: "worktree".into() }),
                merge_conflict::Decision::Escalate => self.block(issue_ref, BlockedSource::Review, "merge conflict could not be resolved").await,
            };
        }

        self.git.merge_no_edit(&workdir, &pr.base_ref).await.map_err(|e| OrchestratorError::MergeConflict { path: e.to_string() })?;
        self.git.push(&workdir, "origin", "HEAD").await.map_err(|e| OrchestratorError::TransientNetwork(e.to_string()))?;
        Ok(StageVerdict::Advance)
    }

    async fn pr_evidence(&self, issue_ref: &IssueRef, run_id: RunId) -> Result<StageVerdict, OrchestratorError> {
        let record = self.store.idempotency_record(&self.pr_create_key(issue_ref));

        let decision = pr_evidence::decide(pr_evidence::PrEvidenceInput {
            pr_url_present: record.as_ref().and_then(|r| r.outcome_url.as_ref()).is_some(),
            verified_no_pr_terminal: false,
            cause: pr_evidence::CauseCode::Unknown,
        });

        self.store
            .upsert_gate_result(
                issue_ref,
                run_id,
                GateKind::PrEvidence,
                match decision {
                    pr_evidence::PrEvidenceDecision::Pass => GateStatus::Pass,
                    pr_evidence::PrEvidenceDecision::Skipped => GateStatus::Skipped,
                    pr_evidence::PrEvidenceDecision::Escalated { .. } => GateStatus::Fail,
                },
                None,
                self.clock.epoch_ms(),
            )
            .map_err(storage_err)?;

        match decision {
            pr_evidence::PrEvidenceDecision::Pass | pr_evidence::PrEvidenceDecision::Skipped => Ok(StageVerdict::Advance),
            pr_evidence::PrEvidenceDecision::Escalated { .. } => self.escalate(issue_ref, run_id, "missing_pr_url").await,
        }
    }

    /// Posts a marked comment at most once per `(issue, label)`, used for the
    /// watchdog "stuck" notice and the escalation writeback (spec §4.3.3).
    async fn post_idempotent_comment(&self, issue_ref: &IssueRef, label: &str, body: &str) -> Result<(), OrchestratorError> {
        let marker_id = ralph_recovery::signature::comment_marker_id(&issue_ref.repo_slug(), issue_ref.number);
        let key = IdempotencyKey::new(issue_ref.clone(), IdempotentOp::PostComment, format!("{label}:{marker_id}"));
        if self.store.idempotency_record(&key).is_some() {
            return Ok(());
        }

        let path = format!("/repos/{}/{}/issues/{}/comments", issue_ref.owner, issue_ref.repo, issue_ref.number);
        let marked_body = format!("{body}\n\n<!-- ralph-marker:{marker_id}:{label} -->");
        let response = self
            .github
            .request(Request::post(&path, serde_json::json!({"body": marked_body})))
            .await
            .map_err(|e| OrchestratorError::TransientNetwork(e.to_string()))?;

        let url = response.data.as_ref().and_then(|d| d.get("html_url")).and_then(|v| v.as_str()).map(str::to_string);
        self.store.record_idempotency_key(IdempotencyRecord { key, recorded_at_ms: self.clock.epoch_ms(), outcome_url: url }).map_err(storage_err)?;
        Ok(())
    }
}

/// Jittered exponential backoff for the CI poll loop: doubles per attempt,
/// caps at 120s, then applies up to +/-20% jitter. Seeded by the attempt
/// number rather than wall-clock entropy so it stays deterministic.
fn jittered_backoff_ms(attempt: u32) -> u64 {
    let doubled = CI_WAIT_BASE_BACKOFF_MS.saturating_mul(1u64 << attempt.min(6));
    let capped = doubled.min(CI_WAIT_MAX_BACKOFF_MS) as i64;
    let mut rng = StdRng::seed_from_u64(attempt as u64);
    let jitter_pct = rng.random_range(-20i64..=20i64);
    (capped + capped * jitter_pct / 100).max(0) as u64
}

fn storage_err(e: ralph_storage::StoreError) -> OrchestratorError {
    OrchestratorError::Storage(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ralph_adapters::git::FakeGitPort;
    use ralph_adapters::github::{FakeGitHubPort, RateLimit, Response};
    use ralph_adapters::notify::FakeNotifier;
    use ralph_adapters::session::{FakeSessionAdapter, ScriptedTurn};
    use ralph_core::FakeClock;
    use tempfile::tempdir;

    fn issue() -> IssueRef {
        IssueRef::new("acme", "demo", 1)
    }

    fn store(dir: &std::path::Path) -> Arc<WalStateStore> {
        let store = Arc::new(WalStateStore::open(dir).unwrap());
        store.claim_task(&issue(), "daemon-1", 120_000, 0).unwrap();
        store
    }

    fn github_response(data: serde_json::Value) -> Response {
        Response { status: 200, data: Some(data), headers: Default::default(), rate_limit: RateLimit::default(), next_page: None }
    }

    fn pr_metadata_json() -> serde_json::Value {
        serde_json::json!({
            "mergeable_state": "clean",
            "draft": false,
            "head": {"sha": "abc1234", "ref": "ralph/1", "repo": {"full_name": "acme/demo"}},
            "base": {"ref": "main", "repo": {"full_name": "acme/demo"}},
            "labels": [{"name": "allow-main"}],
        })
    }

    #[tokio::test]
    async fn full_happy_path_completes() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let git = FakeGitPort::new();
        // pre_flight: worktree_add, status_porcelain
        git.push_ok("");
        git.push_ok("");
        // product review: fetch, diff
        git.push_ok("");
        git.push_ok("diff --git a/src/lib.rs b/src/lib.rs\n+fn x() {}\n");
        // devex review: fetch, diff
        git.push_ok("");
        git.push_ok("diff --git a/src/lib.rs b/src/lib.rs\n+fn x() {}\n");
        // merge: fetch, ahead/behind diff (clean, not behind), ci-only-check diff, status_porcelain, merge_no_edit, push
        git.push_ok("");
        git.push_ok("");
        git.push_ok(" src/lib.rs | 2 +-\n");
        git.push_ok("");
        git.push_ok("");
        git.push_ok("");

        let session = FakeSessionAdapter::with_turns(vec![
            ScriptedTurn::ok("setup complete"),
            ScriptedTurn::ok("plan written"),
            ScriptedTurn::ok("RALPH_PLAN_REVIEW: {\"status\":\"pass\",\"reason\":\"ok\"}"),
            ScriptedTurn::ok("build done"),
            ScriptedTurn::ok("RALPH_REVIEW: {\"status\":\"pass\",\"reason\":\"ok\"}"),
            ScriptedTurn::ok("RALPH_REVIEW: {\"status\":\"pass\",\"reason\":\"ok\"}"),
        ]);

        let github = FakeGitHubPort::new();
        github.push_response(github_response(serde_json::json!([]))); // pre-flight canonical-pr timeline
        github.push_response(Response {
            status: 201,
            data: Some(serde_json::json!({"html_url": "https://example.com/pr/1"})),
            headers: Default::default(),
            rate_limit: Default::default(),
            next_page: None,
        }); // pr_create
        github.push_response(github_response(pr_metadata_json())); // ci_wait pr metadata
        github.push_response(github_response(serde_json::json!({"check_runs": [{"name": "ci", "status": "completed", "conclusion": "success"}]}))); // ci_wait checks
        github.push_response(github_response(pr_metadata_json())); // merge pr metadata

        let worker = Worker::new(store.clone(), session, github, git, FakeNotifier::new(), FakeClock::new(), "daemon-1");
        let outcome = worker.run_issue(&issue()).await.unwrap();
        assert_eq!(outcome, PipelineOutcome::Completed);

        let task = store.task(&issue()).unwrap();
        assert_eq!(task.status, ralph_core::TaskStatus::Completed);
    }

    #[tokio::test]
    async fn failing_plan_review_blocks() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let git = FakeGitPort::new();
        git.push_ok(""); // worktree_add
        git.push_ok(""); // ensure_setup status_porcelain
        let session = FakeSessionAdapter::with_turns(vec![
            ScriptedTurn::ok("setup complete"),
            ScriptedTurn::ok("plan written"),
            ScriptedTurn::ok("RALPH_PLAN_REVIEW: {\"status\":\"fail\",\"reason\":\"missing edge cases\"}"),
        ]);

        let worker = Worker::new(store.clone(), session, FakeGitHubPort::new(), git, FakeNotifier::new(), FakeClock::new(), "daemon-1");
        let outcome = worker.run_issue(&issue()).await.unwrap();
        assert_eq!(outcome, PipelineOutcome::Blocked);

        let task = store.task(&issue()).unwrap();
        assert_eq!(task.status, ralph_core::TaskStatus::Blocked);
        assert_eq!(task.blocked_source, Some(BlockedSource::Review));
    }

    #[test]
    fn jittered_backoff_stays_within_twenty_percent_and_under_cap() {
        for attempt in 0..10 {
            let backoff = jittered_backoff_ms(attempt);
            assert!(backoff <= CI_WAIT_MAX_BACKOFF_MS + CI_WAIT_MAX_BACKOFF_MS / 5);
        }
    }

    #[test]
    fn jittered_backoff_doubles_before_hitting_the_cap() {
        assert!(jittered_backoff_ms(1) > jittered_backoff_ms(0) / 2);
    }
}
