// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CI-triage recovery lane (spec §4.3.2). Entry: required checks `failure`
//! or `timeout` on an open PR.

use crate::signature::{ci_triage_signature_v3, CiCheckObservation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CiTriageDecision {
    Spawn,
    Resume,
    Quarantine,
    Escalate,
}

/// Everything the lane needs to know about the prior attempt, if any.
#[derive(Debug, Clone)]
pub struct PriorAttempt {
    pub signature: String,
    pub attempt_count: u32,
}

pub struct CiTriageInput<'a> {
    pub timed_out: bool,
    pub checks: &'a [CiCheckObservation<'a>],
    pub prior_attempt: Option<PriorAttempt>,
    pub max_attempts: u32,
}

/// The new signature, plus the decision. Callers persist the signature into
/// the tracked comment's embedded state blob regardless of the decision.
pub struct CiTriageResult {
    pub signature: String,
    pub decision: CiTriageDecision,
}

pub fn decide(input: CiTriageInput<'_>) -> CiTriageResult {
    let signature = ci_triage_signature_v3(input.timed_out, input.checks);

    let decision = match &input.prior_attempt {
        None => CiTriageDecision::Spawn,
        Some(prior) if prior.attempt_count > input.max_attempts => CiTriageDecision::Escalate,
        Some(prior) if prior.signature == signature => CiTriageDecision::Quarantine,
        Some(_) => CiTriageDecision::Resume,
    };

    CiTriageResult { signature, decision }
}
