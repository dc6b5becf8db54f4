// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gate decision event handlers.

use ralph_core::{Event, GateResult};

use super::{gate_key, MaterializedState};

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::GateUpserted { issue_ref, run_id, kind, status, reason, now_ms } => {
            let key = gate_key(issue_ref, run_id.as_str(), *kind);
            let result = state
                .gates
                .entry(key)
                .or_insert_with(|| GateResult::pending(*kind, *now_ms));
            result.decide(*status, reason.clone(), *now_ms);
        }

        Event::GateArtifactRecorded { issue_ref, run_id, kind, artifact } => {
            let key = gate_key(issue_ref, run_id.as_str(), *kind);
            if let Some(result) = state.gates.get_mut(&key) {
                result.attach(artifact.clone());
            }
        }

        _ => {}
    }
}
