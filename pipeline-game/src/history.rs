//! Append-only record of the loggable nodes a player has passed through.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryLog {
    entries: Vec<String>,
    #[serde(skip)]
    changed: bool,
}

impl HistoryLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a log from persisted entries without marking it changed.
    #[must_use]
    pub fn from_entries(entries: Vec<String>) -> Self {
        Self {
            entries,
            changed: false,
        }
    }

    pub fn append(&mut self, name: impl Into<String>) {
        self.entries.push(name.into());
        self.changed = true;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.changed = true;
    }

    #[must_use]
    pub fn list(&self) -> &[String] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the log changed since the last call, resetting the flag.
    pub fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }
}
