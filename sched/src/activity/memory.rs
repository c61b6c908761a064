//! Bounded in-memory activity log

use std::collections::VecDeque;
use std::sync::Mutex;

use super::ActivityLog;

/// Keeps the most recent `max_lines` lines
#[derive(Debug)]
pub struct MemoryLog {
    max_lines: usize,
    lines: Mutex<VecDeque<String>>,
}

impl MemoryLog {
    pub fn new(max_lines: usize) -> Self {
        Self {
            max_lines: max_lines.max(1),
            lines: Mutex::new(VecDeque::new()),
        }
    }

    /// Copy of the retained lines, oldest first
    pub fn lines(&self) -> Vec<String> {
        let lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        lines.iter().cloned().collect()
    }

    /// Whether any retained line contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        let lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        lines.iter().any(|line| line.contains(needle))
    }

    pub fn clear(&self) {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl Default for MemoryLog {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl ActivityLog for MemoryLog {
    fn push(&self, line: &str) {
        let mut lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        while lines.len() >= self.max_lines {
            lines.pop_front();
        }
        lines.push_back(line.to_string());
    }
}
