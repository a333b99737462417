//! Trait store: numeric stats and categorical classes accumulated by the player.
//!
//! Keys are normalized to lowercase at every entry point, class values are
//! lowercased on write. Keys starting with [`HIDDEN_KEY_PREFIX`] are internal
//! bookkeeping and never show up in [`TraitStore::enumerate_visible`].
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::constants::HIDDEN_KEY_PREFIX;
use crate::numbers::format_stat;
use crate::text::title_case;

/// Whether a trait key denotes internal state hidden from the player.
#[must_use]
pub fn is_hidden_key(key: &str) -> bool {
    key.starts_with(HIDDEN_KEY_PREFIX)
}

fn normalize(key: &str) -> String {
    key.to_lowercase()
}

/// Add `amount` to the stat at `key`, saturating at the finite range.
/// A NaN result leaves the stat unchanged.
fn accumulate(stats: &mut BTreeMap<String, f64>, key: &str, amount: f64) {
    let slot = stats.entry(normalize(key)).or_insert(0.0);
    let next = *slot + amount;
    if !next.is_nan() {
        *slot = next.clamp(f64::MIN, f64::MAX);
    }
}

/// One entry of a batched stat update.
#[derive(Debug, Clone, PartialEq)]
pub struct StatDelta {
    pub key: String,
    pub amount: f64,
}

impl StatDelta {
    pub fn new(key: impl Into<String>, amount: f64) -> Self {
        Self {
            key: key.into(),
            amount,
        }
    }
}

/// One entry of a batched class update; `None` removes the class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassAssignment {
    pub key: String,
    pub value: Option<String>,
}

impl ClassAssignment {
    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    pub fn unset(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }
}

/// Value half of a visible trait row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TraitValue {
    Stat(f64),
    Class(String),
}

impl fmt::Display for TraitValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stat(value) => f.write_str(&format_stat(*value)),
            Self::Class(value) => f.write_str(&title_case(value)),
        }
    }
}

/// A trait as shown to the player.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisibleTrait {
    pub key: String,
    pub value: TraitValue,
}

impl VisibleTrait {
    /// Key rendered for display.
    #[must_use]
    pub fn label(&self) -> String {
        title_case(&self.key.replace('_', " "))
    }
}

/// Which halves of the store changed since the last drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraitChanges {
    pub stats: bool,
    pub classes: bool,
}

impl TraitChanges {
    #[must_use]
    pub const fn any(self) -> bool {
        self.stats || self.classes
    }

    #[must_use]
    pub const fn merge(self, other: Self) -> Self {
        Self {
            stats: self.stats || other.stats,
            classes: self.classes || other.classes,
        }
    }
}

/// Persistent numeric and categorical player state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TraitStore {
    stats: BTreeMap<String, f64>,
    classes: BTreeMap<String, String>,
    #[serde(skip)]
    changes: TraitChanges,
}

impl TraitStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from raw maps, normalizing keys and class values.
    /// Non-finite stats are dropped.
    ///
    /// The result reports no pending changes.
    #[must_use]
    pub fn from_parts(stats: BTreeMap<String, f64>, classes: BTreeMap<String, String>) -> Self {
        Self {
            stats: stats
                .into_iter()
                .filter(|(_, value)| value.is_finite())
                .map(|(key, value)| (normalize(&key), value))
                .collect(),
            classes: classes
                .into_iter()
                .map(|(key, value)| (normalize(&key), value.to_lowercase()))
                .collect(),
            changes: TraitChanges::default(),
        }
    }

    #[must_use]
    pub fn get_stat(&self, key: &str) -> f64 {
        self.stats.get(&normalize(key)).copied().unwrap_or(0.0)
    }

    #[must_use]
    pub fn has_stat(&self, key: &str, threshold: f64) -> bool {
        self.get_stat(key) >= threshold
    }

    pub fn add_stat(&mut self, key: &str, amount: f64) {
        accumulate(&mut self.stats, key, amount);
        self.changes.stats = true;
    }

    pub fn sub_stat(&mut self, key: &str, amount: f64) {
        self.add_stat(key, -amount);
    }

    /// Apply every delta as one logical update.
    pub fn add_stats<I>(&mut self, batch: I)
    where
        I: IntoIterator<Item = StatDelta>,
    {
        for delta in batch {
            accumulate(&mut self.stats, &delta.key, delta.amount);
        }
        self.changes.stats = true;
    }

    #[must_use]
    pub fn get_class(&self, key: &str) -> Option<&str> {
        self.classes.get(&normalize(key)).map(String::as_str)
    }

    /// Class value with every word capitalized, for body text.
    #[must_use]
    pub fn class_display(&self, key: &str) -> Option<String> {
        self.get_class(key).map(title_case)
    }

    pub fn set_class(&mut self, key: &str, value: Option<&str>) {
        self.apply_class(key, value);
        self.changes.classes = true;
    }

    /// Apply every assignment as one logical update.
    pub fn set_classes<I>(&mut self, batch: I)
    where
        I: IntoIterator<Item = ClassAssignment>,
    {
        for assignment in batch {
            self.apply_class(&assignment.key, assignment.value.as_deref());
        }
        self.changes.classes = true;
    }

    fn apply_class(&mut self, key: &str, value: Option<&str>) {
        let key = normalize(key);
        match value {
            Some(value) => {
                self.classes.insert(key, value.to_lowercase());
            }
            None => {
                self.classes.remove(&key);
            }
        }
    }

    #[must_use]
    pub fn is_class(&self, key: &str, value: &str) -> bool {
        self.get_class(key)
            .is_some_and(|current| current == value.to_lowercase())
    }

    /// Stats followed by classes, skipping hidden keys.
    #[must_use]
    pub fn enumerate_visible(&self) -> Vec<VisibleTrait> {
        let stats = self.stats.iter().map(|(key, value)| VisibleTrait {
            key: key.clone(),
            value: TraitValue::Stat(*value),
        });
        let classes = self.classes.iter().map(|(key, value)| VisibleTrait {
            key: key.clone(),
            value: TraitValue::Class(value.clone()),
        });
        stats
            .chain(classes)
            .filter(|entry| !is_hidden_key(&entry.key))
            .collect()
    }

    pub fn clear(&mut self) {
        self.stats.clear();
        self.classes.clear();
        self.changes = TraitChanges {
            stats: true,
            classes: true,
        };
    }

    #[must_use]
    pub const fn stats(&self) -> &BTreeMap<String, f64> {
        &self.stats
    }

    #[must_use]
    pub const fn classes(&self) -> &BTreeMap<String, String> {
        &self.classes
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stats.is_empty() && self.classes.is_empty()
    }

    /// Changes recorded since the last call, resetting the record.
    pub fn take_changes(&mut self) -> TraitChanges {
        std::mem::take(&mut self.changes)
    }

    #[must_use]
    pub const fn pending_changes(&self) -> TraitChanges {
        self.changes
    }
}
