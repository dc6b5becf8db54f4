// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-task running token usage, tracked for context-compact decisions.

use serde::{Deserialize, Serialize};

/// Cumulative token usage for a task's current session, reset whenever the
/// session is compacted or restarted.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenTotal {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenTotal {
    pub fn total(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }

    pub fn add(&mut self, input_tokens: u64, output_tokens: u64) {
        self.input_tokens = self.input_tokens.saturating_add(input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(output_tokens);
    }

    pub fn exceeds(&self, threshold: u64) -> bool {
        self.total() >= threshold
    }

    pub fn reset(&mut self) {
        self.input_tokens = 0;
        self.output_tokens = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_across_turns() {
        let mut t = TokenTotal::default();
        t.add(100, 50);
        t.add(200, 75);
        assert_eq!(t.total(), 425);
    }

    #[test]
    fn reset_clears_total() {
        let mut t = TokenTotal::default();
        t.add(100, 50);
        t.reset();
        assert_eq!(t.total(), 0);
    }

    #[test]
    fn exceeds_is_inclusive_of_threshold() {
        let mut t = TokenTotal::default();
        t.add(1000, 0);
        assert!(t.exceeds(1000));
        assert!(!t.exceeds(1001));
    }
}
