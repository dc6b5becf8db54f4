// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fair, band-weighted repo selection (spec §4.5), generalized from the
//! teacher's single-timer bookkeeping (`oj-engine::Scheduler`) to per-band
//! token buckets. Pure bookkeeping here; concurrency gating (the per-repo
//! and global semaphores) lives alongside it but is driven by the caller.

use crate::throttle::ThrottleGate;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// One priority band: a fixed set of repos, drained round-robin while the
/// band still has budget. Higher `priority` bands are drained first.
#[derive(Debug, Clone)]
struct Band {
    priority: u32,
    repos: Vec<String>,
    cursor: usize,
    remaining_budget: u32,
}

impl Band {
    fn new(priority: u32, mut repos: Vec<String>) -> Self {
        repos.sort();
        let remaining_budget = priority.max(1);
        Self { priority, repos, cursor: 0, remaining_budget }
    }

    fn is_exhausted(&self) -> bool {
        self.repos.is_empty() || self.remaining_budget == 0
    }

    fn replenish(&mut self) {
        self.remaining_budget = self.priority.max(1);
    }

    /// Pick this band's next repo and advance its cursor, without touching budget.
    fn peek_next(&self) -> Option<&str> {
        self.repos.get(self.cursor % self.repos.len().max(1)).map(String::as_str)
    }

    fn advance(&mut self) {
        if !self.repos.is_empty() {
            self.cursor = (self.cursor + 1) % self.repos.len();
        }
        self.remaining_budget = self.remaining_budget.saturating_sub(1);
    }
}

/// Band-weighted round-robin picker over a fixed repo set (spec §4.5's
/// fairness rule). A repo set change resets cursors/budgets deterministically
/// via a fingerprint over the sorted repo list.
pub struct Scheduler {
    bands: Vec<Band>,
    fingerprint: u64,
}

fn fingerprint_of(bands: &[(u32, Vec<String>)]) -> u64 {
    let mut repos: Vec<&str> = bands.iter().flat_map(|(_, repos)| repos.iter().map(String::as_str)).collect();
    repos.sort_unstable();
    let mut hasher = DefaultHasher::new();
    repos.hash(&mut hasher);
    hasher.finish()
}

impl Scheduler {
    /// `bands` is `(priority, repos)` pairs, highest priority first or not —
    /// order doesn't matter, selection always sorts by priority descending.
    pub fn new(bands: Vec<(u32, Vec<String>)>) -> Self {
        let fingerprint = fingerprint_of(&bands);
        let mut bands: Vec<Band> = bands.into_iter().map(|(priority, repos)| Band::new(priority, repos)).collect();
        bands.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self { bands, fingerprint }
    }

    /// Reset cursors/budgets if the repo set changed since construction.
    pub fn resync(&mut self, bands: Vec<(u32, Vec<String>)>) {
        let fingerprint = fingerprint_of(&bands);
        if fingerprint == self.fingerprint {
            return;
        }
        *self = Self::new(bands);
    }

    /// Select the next repo to dispatch into, per spec §4.5's band-then-cursor
    /// ordering. Returns `None` if every band's budget is currently exhausted,
    /// at which point every band is replenished for the next call.
    pub fn next_repo(&mut self) -> Option<String> {
        for band in self.bands.iter_mut() {
            if band.is_exhausted() {
                continue;
            }
            let repo = band.peek_next()?.to_string();
            band.advance();
            return Some(repo);
        }

        if self.bands.iter().all(|b| b.repos.is_empty()) {
            return None;
        }

        for band in self.bands.iter_mut() {
            band.replenish();
        }
        None
    }
}

/// Per-repo and global concurrency gates, acquired in that order (spec §4.5:
/// "tryAcquire per repo, then global; on failure, skip this repo").
pub struct ConcurrencyGates {
    global: Arc<Semaphore>,
    per_repo: std::collections::HashMap<String, Arc<Semaphore>>,
    per_repo_limit: usize,
}

pub struct AcquiredSlot {
    _repo: OwnedSemaphorePermit,
    _global: OwnedSemaphorePermit,
}

impl ConcurrencyGates {
    pub fn new(global_limit: usize, per_repo_limit: usize) -> Self {
        Self { global: Arc::new(Semaphore::new(global_limit)), per_repo: std::collections::HashMap::new(), per_repo_limit }
    }

    fn repo_semaphore(&mut self, repo: &str) -> Arc<Semaphore> {
        self.per_repo.entry(repo.to_string()).or_insert_with(|| Arc::new(Semaphore::new(self.per_repo_limit))).clone()
    }

    /// Try to acquire one slot for `repo`: the repo semaphore first, then the
    /// global one. Either failing releases any partial acquisition.
    pub fn try_acquire(&mut self, repo: &str) -> Option<AcquiredSlot> {
        let repo_sem = self.repo_semaphore(repo);
        let repo_permit = Arc::clone(&repo_sem).try_acquire_owned().ok()?;
        match Arc::clone(&self.global).try_acquire_owned() {
            Ok(global_permit) => Some(AcquiredSlot { _repo: repo_permit, _global: global_permit }),
            Err(_) => None,
        }
    }
}

/// Whether the scheduler should start any new work this tick, per the
/// throttle gate's posture.
pub fn may_start_new_work(gate: ThrottleGate) -> bool {
    matches!(gate, ThrottleGate::Normal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_priority_band_drains_first() {
        let mut scheduler = Scheduler::new(vec![(1, vec!["low/repo".into()]), (5, vec!["high/repo".into()])]);
        assert_eq!(scheduler.next_repo().as_deref(), Some("high/repo"));
    }

    #[test]
    fn round_robins_within_a_band() {
        let mut scheduler = Scheduler::new(vec![(3, vec!["acme/a".into(), "acme/b".into(), "acme/c".into()])]);
        let picks: Vec<String> = (0..3).filter_map(|_| scheduler.next_repo()).collect();
        assert_eq!(picks, vec!["acme/a", "acme/b", "acme/c"]);
    }

    #[test]
    fn band_budget_exhausts_then_replenishes() {
        let mut scheduler = Scheduler::new(vec![(2, vec!["acme/a".into()])]);
        assert!(scheduler.next_repo().is_some());
        assert!(scheduler.next_repo().is_some());
        assert!(scheduler.next_repo().is_none(), "budget of 2 should exhaust after two picks");
        assert!(scheduler.next_repo().is_some(), "exhausted band should have replenished");
    }

    #[test]
    fn resync_resets_on_repo_set_change() {
        let mut scheduler = Scheduler::new(vec![(1, vec!["acme/a".into()])]);
        scheduler.next_repo();
        scheduler.resync(vec![(1, vec!["acme/a".into(), "acme/b".into()])]);
        let picks: Vec<String> = (0..2).filter_map(|_| scheduler.next_repo()).collect();
        assert_eq!(picks, vec!["acme/a", "acme/b"]);
    }

    #[test]
    fn resync_is_a_no_op_when_fingerprint_unchanged() {
        let mut scheduler = Scheduler::new(vec![(1, vec!["acme/a".into()])]);
        scheduler.next_repo();
        scheduler.resync(vec![(1, vec!["acme/a".into()])]);
        assert!(scheduler.next_repo().is_none(), "budget of 1 already spent, resync should not have reset it");
    }

    #[tokio::test]
    async fn global_limit_blocks_a_second_acquisition() {
        let mut gates = ConcurrencyGates::new(1, 2);
        let first = gates.try_acquire("acme/demo");
        assert!(first.is_some());
        let second = gates.try_acquire("acme/other");
        assert!(second.is_none(), "global limit of 1 is already held by the first acquisition");
    }

    #[tokio::test]
    async fn per_repo_limit_blocks_before_global_is_checked() {
        let mut gates = ConcurrencyGates::new(4, 1);
        let first = gates.try_acquire("acme/demo");
        assert!(first.is_some());
        let second = gates.try_acquire("acme/demo");
        assert!(second.is_none(), "per-repo limit of 1 already held for this repo");
        assert!(gates.try_acquire("acme/other").is_some(), "a different repo has its own semaphore");
    }

    #[test]
    fn normal_gate_allows_new_work() {
        assert!(may_start_new_work(ThrottleGate::Normal));
        assert!(!may_start_new_work(ThrottleGate::SoftThrottled));
        assert!(!may_start_new_work(ThrottleGate::HardThrottled));
    }
}
