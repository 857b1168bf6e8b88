//! History windowing.

use serde::{Deserialize, Serialize};

use super::context::Role;

/// One prior turn, reduced to what a prompt needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

impl HistoryEntry {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

impl From<&HistoryEntry> for HistoryEntry {
    fn from(entry: &HistoryEntry) -> Self {
        entry.clone()
    }
}

/// Returns the last `k` turns of `history` in their original order.
///
/// Shorter histories come back whole; `k == 0` yields nothing.
pub fn window<'a, T>(history: &'a [T], k: usize) -> Vec<HistoryEntry>
where
    &'a T: Into<HistoryEntry>,
{
    let start = history.len().saturating_sub(k);
    history[start..].iter().map(Into::into).collect()
}
