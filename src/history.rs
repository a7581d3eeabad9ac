use crate::grid::Grid;
use std::time::{SystemTime, UNIX_EPOCH};

/// A committed grid state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub grid: Grid,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl HistoryEntry {
    fn new(grid: Grid) -> Self {
        Self {
            grid,
            timestamp: now_millis(),
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Linear undo log with a cursor. Never empty: it is seeded at construction.
///
/// Pushing while the cursor is behind the tail drops the redo branch. An
/// optional limit drops the oldest entries once exceeded.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    entries: Vec<HistoryEntry>,
    cursor: usize,
    limit: Option<usize>,
}

impl HistoryStore {
    pub fn new(initial: Grid) -> Self {
        Self::with_limit(initial, None)
    }

    pub fn with_limit(initial: Grid, limit: Option<usize>) -> Self {
        Self {
            entries: vec![HistoryEntry::new(initial)],
            cursor: 0,
            limit: limit.map(|l| l.max(1)),
        }
    }

    pub fn push(&mut self, grid: &Grid) {
        self.entries.truncate(self.cursor + 1);
        self.entries.push(HistoryEntry::new(grid.clone()));
        if let Some(limit) = self.limit {
            let excess = self.entries.len().saturating_sub(limit);
            if excess > 0 {
                self.entries.drain(..excess);
            }
        }
        self.cursor = self.entries.len() - 1;
    }

    pub fn undo(&mut self) -> Option<Grid> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        Some(self.entries[self.cursor].grid.clone())
    }

    pub fn redo(&mut self) -> Option<Grid> {
        if self.cursor + 1 >= self.entries.len() {
            return None;
        }
        self.cursor += 1;
        Some(self.entries[self.cursor].grid.clone())
    }

    pub fn reset(&mut self, grid: &Grid) {
        self.entries.clear();
        self.entries.push(HistoryEntry::new(grid.clone()));
        self.cursor = 0;
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn current(&self) -> &HistoryEntry {
        &self.entries[self.cursor]
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }
}
