// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable, single-writer event-sourced storage for the orchestrator:
//! an append-only WAL of [`ralph_core::Event`]s, a [`state::MaterializedState`]
//! projection rebuilt by replaying it, periodic zstd snapshots so recovery
//! doesn't replay from the beginning, and [`store::WalStateStore`] — the
//! façade every other crate talks to.

pub mod migration;
pub mod snapshot;
pub mod state;
pub mod store;
pub mod wal;

pub use state::MaterializedState;
pub use store::{StoreError, WalStateStore};
pub use wal::{Wal, WalEntry, WalError};
