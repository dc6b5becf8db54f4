// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only write-ahead log of [`Event`]s, one JSON object per line.
//!
//! Durability model: every [`Wal::append`] assigns the next sequence number
//! and writes the line immediately; [`Wal::flush`] fsyncs. Batching fsyncs
//! across several appends (see [`Wal::needs_flush`]) trades a small
//! replay-on-crash window for write throughput.
//!
//! Corruption model: a WAL is only ever appended to by this process, but a
//! crash mid-write can leave a trailing partial/garbage line. `open` treats
//! anything after the last fully-parseable line as corruption: the original
//! file is rotated to `.bak` (keeping up to 3 generations) and the file is
//! rewritten with just the valid prefix.

use ralph_core::Event;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const FLUSH_COUNT_THRESHOLD: u32 = 100;
const FLUSH_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum WalError {
    #[error("wal io error: {0}")]
    Io(#[from] io::Error),
    #[error("wal serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
    pub seq: u64,
    pub event: Event,
}

pub struct Wal {
    path: PathBuf,
    file: File,
    entries: Vec<WalEntry>,
    write_seq: u64,
    processed_seq: u64,
    next_seq_to_read: u64,
    loaded_bytes: u64,
    pending_since_flush: u32,
    last_flush_at: Instant,
}

impl Wal {
    pub fn open(path: impl AsRef<Path>, processed_seq: u64) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            File::create(&path)?;
        }

        let raw = fs::read(&path)?;
        let (entries, valid_bytes, had_corruption) = parse_prefix(&raw);

        if had_corruption {
            rotate_backups(&path)?;
            let mut rewritten = Vec::new();
            for entry in &entries {
                rewritten.extend_from_slice(serde_json::to_string(entry)?.as_bytes());
                rewritten.push(b'\n');
            }
            fs::write(&path, &rewritten)?;
        }

        let write_seq = entries.last().map(|e| e.seq).unwrap_or(0);
        let loaded_bytes = fs::metadata(&path)?.len();

        let file = OpenOptions::new().append(true).open(&path)?;

        Ok(Self {
            path,
            file,
            entries,
            write_seq,
            processed_seq,
            next_seq_to_read: processed_seq + 1,
            loaded_bytes,
            pending_since_flush: 0,
            last_flush_at: Instant::now(),
        })
    }

    pub fn write_seq(&self) -> u64 {
        self.write_seq
    }

    pub fn processed_seq(&self) -> u64 {
        self.processed_seq
    }

    pub fn append(&mut self, event: &Event) -> Result<u64, WalError> {
        let seq = self.write_seq + 1;
        let entry = WalEntry { seq, event: event.clone() };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');
        self.file.write_all(line.as_bytes())?;
        self.loaded_bytes += line.len() as u64;
        self.write_seq = seq;
        self.entries.push(entry);
        self.pending_since_flush += 1;
        Ok(seq)
    }

    pub fn flush(&mut self) -> Result<(), WalError> {
        self.file.flush()?;
        self.file.sync_data()?;
        self.pending_since_flush = 0;
        self.last_flush_at = Instant::now();
        Ok(())
    }

    pub fn needs_flush(&self) -> bool {
        self.pending_since_flush >= FLUSH_COUNT_THRESHOLD
            || (self.pending_since_flush > 0 && self.last_flush_at.elapsed() >= FLUSH_INTERVAL)
    }

    pub fn mark_processed(&mut self, seq: u64) {
        if seq > self.processed_seq {
            self.processed_seq = seq;
        }
    }

    /// Return the next not-yet-read entry, advancing the read cursor.
    ///
    /// Reads directly from disk beyond what's already loaded so a line
    /// appended outside this `Wal` handle (only possible in tests) is still
    /// observed. A corrupt/unparseable line is skipped and counts as "no
    /// entry this call" rather than an error.
    pub fn next_unprocessed(&mut self) -> Result<Option<WalEntry>, WalError> {
        let want = self.next_seq_to_read;

        if let Some(entry) = self.entries.iter().find(|e| e.seq == want) {
            self.next_seq_to_read += 1;
            return Ok(Some(entry.clone()));
        }

        let mut f = File::open(&self.path)?;
        f.seek(SeekFrom::Start(self.loaded_bytes))?;
        let mut rest = Vec::new();
        f.read_to_end(&mut rest)?;
        if rest.is_empty() {
            return Ok(None);
        }

        let newline_at = rest.iter().position(|&b| b == b'\n');
        let (line_bytes, consumed) = match newline_at {
            Some(idx) => (&rest[..idx], idx + 1),
            None => (&rest[..], rest.len()),
        };

        let parsed = std::str::from_utf8(line_bytes)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .and_then(|s| serde_json::from_str::<WalEntry>(s).ok());

        self.loaded_bytes += consumed as u64;

        match parsed {
            Some(entry) if entry.seq == want => {
                self.write_seq = self.write_seq.max(entry.seq);
                self.entries.push(entry.clone());
                self.next_seq_to_read += 1;
                Ok(Some(entry))
            }
            _ => Ok(None),
        }
    }

    /// All parsed entries with `seq > seq`, scanning from the start of the
    /// file and stopping at the first unparseable line.
    pub fn entries_after(&self, seq: u64) -> Result<Vec<WalEntry>, WalError> {
        let raw = fs::read(&self.path)?;
        let (entries, _, _) = parse_prefix(&raw);
        Ok(entries.into_iter().filter(|e| e.seq > seq).collect())
    }

    /// Drop all entries with `seq < seq` and rewrite the file with the
    /// remainder. Used after a snapshot makes older entries redundant.
    pub fn truncate_before(&mut self, seq: u64) -> Result<(), WalError> {
        self.entries.retain(|e| e.seq >= seq);
        let mut rewritten = Vec::new();
        for entry in &self.entries {
            rewritten.extend_from_slice(serde_json::to_string(entry)?.as_bytes());
            rewritten.push(b'\n');
        }
        fs::write(&self.path, &rewritten)?;
        self.loaded_bytes = rewritten.len() as u64;
        self.file = OpenOptions::new().append(true).open(&self.path)?;
        Ok(())
    }
}

/// Parse as many well-formed `WalEntry` lines as possible from the start of
/// `raw`. Returns the valid entries, the byte length of the valid prefix,
/// and whether anything after that prefix failed to parse.
fn parse_prefix(raw: &[u8]) -> (Vec<WalEntry>, u64, bool) {
    let mut entries = Vec::new();
    let mut consumed: u64 = 0;
    let mut had_corruption = false;

    let reader = BufReader::new(raw);
    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => {
                had_corruption = true;
                break;
            }
        };
        if line.trim().is_empty() {
            consumed += line.len() as u64 + 1;
            continue;
        }
        match serde_json::from_str::<WalEntry>(&line) {
            Ok(entry) => {
                consumed += line.len() as u64 + 1;
                entries.push(entry);
            }
            Err(_) => {
                had_corruption = true;
                break;
            }
        }
    }

    (entries, consumed, had_corruption)
}

fn rotate_backups(path: &Path) -> io::Result<()> {
    let bak1 = path.with_extension("bak");
    let bak2 = path.with_extension("bak.2");
    let bak3 = path.with_extension("bak.3");

    if bak3.exists() {
        fs::remove_file(&bak3)?;
    }
    if bak2.exists() {
        fs::rename(&bak2, &bak3)?;
    }
    if bak1.exists() {
        fs::rename(&bak1, &bak2)?;
    }
    fs::copy(path, &bak1)?;
    Ok(())
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
