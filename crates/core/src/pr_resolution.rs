// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! How a task's pull request was ultimately resolved.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrResolution {
    Merged,
    ClosedUnmerged,
    SupersededByNewRun,
}

crate::simple_display! {
    PrResolution {
        Merged => "merged",
        ClosedUnmerged => "closed_unmerged",
        SupersededByNewRun => "superseded_by_new_run",
    }
}
