// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic zstd-compressed snapshots of [`MaterializedState`], letting
//! recovery skip replaying the whole WAL from the beginning.

use crate::migration::{MigrationRegistry, CURRENT_SNAPSHOT_VERSION};
use crate::state::MaterializedState;
use serde_json::json;
use std::fs;
use std::io::Write;
use std::path::Path;

const ZSTD_LEVEL: i32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("snapshot migration error: {0}")]
    Migration(#[from] crate::migration::MigrationError),
}

/// Write `state` as of `processed_seq` to `path`, atomically (write to a
/// temp file in the same directory, then rename over the destination).
pub fn write(path: impl AsRef<Path>, state: &MaterializedState, processed_seq: u64) -> Result<(), SnapshotError> {
    let path = path.as_ref();
    let envelope = json!({
        "v": CURRENT_SNAPSHOT_VERSION,
        "seq": processed_seq,
        "state": state,
    });
    let plain = serde_json::to_vec(&envelope)?;
    let compressed = zstd::encode_all(plain.as_slice(), ZSTD_LEVEL)?;

    let tmp_path = path.with_extension("tmp");
    {
        let mut f = fs::File::create(&tmp_path)?;
        f.write_all(&compressed)?;
        f.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Read and decompress a snapshot, migrating it to the current schema
/// version if it was written under an older one. Returns `None` if the
/// file doesn't exist (first boot).
pub fn read(path: impl AsRef<Path>) -> Result<Option<(MaterializedState, u64)>, SnapshotError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(None);
    }

    let compressed = fs::read(path)?;
    let plain = zstd::decode_all(compressed.as_slice())?;
    let envelope: serde_json::Value = serde_json::from_slice(&plain)?;

    let registry = MigrationRegistry::new();
    let envelope = registry.migrate_to(envelope, CURRENT_SNAPSHOT_VERSION)?;

    let seq = envelope.get("seq").and_then(serde_json::Value::as_u64).unwrap_or(0);
    let state: MaterializedState = serde_json::from_value(
        envelope.get("state").cloned().unwrap_or(serde_json::Value::Null),
    )?;

    Ok(Some((state, seq)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ralph_core::{IssueRef, Task};
    use tempfile::tempdir;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snapshot.zst");

        let mut state = MaterializedState::default();
        let issue_ref = IssueRef::new("acme", "demo", 1);
        state.tasks.insert(issue_ref.to_string(), Task::new(issue_ref.clone(), 0));

        write(&path, &state, 42).unwrap();
        let (restored, seq) = read(&path).unwrap().unwrap();

        assert_eq!(seq, 42);
        assert!(restored.tasks.contains_key(&issue_ref.to_string()));
    }

    #[test]
    fn missing_file_returns_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.zst");
        assert!(read(&path).unwrap().is_none());
    }
}
