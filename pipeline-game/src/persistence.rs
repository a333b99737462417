//! Snapshot persistence: one JSON value per logical key.
//!
//! Writes are gated on a completed [`Persistence::load`] so a fresh engine
//! can never overwrite a save it has not read yet.
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::constants::{KEY_CLASSES, KEY_HISTORY, KEY_PANEL, KEY_STATS};
use crate::graph::NodeGraph;
use crate::history::HistoryLog;
use crate::storage::KeyValueStore;
use crate::traits::{TraitChanges, TraitStore};

#[derive(Debug, Error)]
pub enum PersistenceError<E>
where
    E: std::error::Error + 'static,
{
    #[error("storage backend failed: {0}")]
    Storage(#[source] E),
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

/// State restored by [`Persistence::load`].
#[derive(Debug, Clone, Default)]
pub struct LoadedSnapshot {
    pub current: String,
    pub traits: TraitStore,
    pub history: HistoryLog,
    /// The stored node id was unknown and every key was wiped.
    pub wiped: bool,
    /// Keys that failed to parse and fell back to their defaults.
    pub recovered: Vec<&'static str>,
}

/// Which persisted keys need rewriting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotChanges {
    pub panel: bool,
    pub history: bool,
    pub traits: TraitChanges,
}

impl SnapshotChanges {
    /// Every key, used after a reset.
    pub const ALL: Self = Self {
        panel: true,
        history: true,
        traits: TraitChanges {
            stats: true,
            classes: true,
        },
    };

    #[must_use]
    pub const fn any(self) -> bool {
        self.panel || self.history || self.traits.any()
    }
}

/// Borrowed view of the state being saved.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotRef<'a> {
    pub current: &'a str,
    pub traits: &'a TraitStore,
    pub history: &'a HistoryLog,
}

#[derive(Debug)]
pub struct Persistence<S> {
    store: S,
    loaded: bool,
}

impl<S: KeyValueStore> Persistence<S> {
    pub const fn new(store: S) -> Self {
        Self {
            store,
            loaded: false,
        }
    }

    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.loaded
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Read and validate the stored snapshot against `graph`.
    ///
    /// # Errors
    ///
    /// Returns an error only when the backend itself fails; malformed
    /// values are recovered and reported through [`LoadedSnapshot`].
    pub fn load(&mut self, graph: &NodeGraph) -> Result<LoadedSnapshot, PersistenceError<S::Error>> {
        let initial = graph.initial().id().to_string();
        let panel = self.read(KEY_PANEL)?;
        let current = match panel {
            None => initial.clone(),
            Some(raw) => match serde_json::from_str::<String>(&raw)
                .ok()
                .and_then(|id| graph.resolve(&id).ok())
            {
                Some(node) => node.id().to_string(),
                None => {
                    log::warn!("stored node '{raw}' is not in the graph; wiping saved progress");
                    self.wipe()?;
                    self.loaded = true;
                    return Ok(LoadedSnapshot {
                        current: initial,
                        wiped: true,
                        ..LoadedSnapshot::default()
                    });
                }
            },
        };

        let mut recovered = Vec::new();
        let stats: BTreeMap<String, Option<f64>> =
            self.read_or_default(KEY_STATS, &mut recovered)?;
        let stats = finite_stats(stats);
        let classes: BTreeMap<String, String> =
            self.read_or_default(KEY_CLASSES, &mut recovered)?;
        let entries: Vec<String> = self.read_or_default(KEY_HISTORY, &mut recovered)?;

        self.loaded = true;
        log::debug!(
            "loaded snapshot at '{current}' with {} history entries",
            entries.len()
        );
        Ok(LoadedSnapshot {
            current,
            traits: TraitStore::from_parts(stats, classes),
            history: HistoryLog::from_entries(entries),
            wiped: false,
            recovered,
        })
    }

    /// Write the keys flagged in `changes`; a no-op before [`Self::load`].
    ///
    /// Returns how many keys were written.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the backend write fails.
    pub fn save(
        &self,
        snapshot: SnapshotRef<'_>,
        changes: SnapshotChanges,
    ) -> Result<usize, PersistenceError<S::Error>> {
        if !self.loaded || !changes.any() {
            return Ok(0);
        }
        let mut written = 0;
        if changes.panel {
            self.write(KEY_PANEL, &serde_json::to_string(snapshot.current)?)?;
            written += 1;
        }
        if changes.history {
            self.write(KEY_HISTORY, &serde_json::to_string(snapshot.history)?)?;
            written += 1;
        }
        if changes.traits.stats {
            self.write(KEY_STATS, &serde_json::to_string(snapshot.traits.stats())?)?;
            written += 1;
        }
        if changes.traits.classes {
            self.write(KEY_CLASSES, &serde_json::to_string(snapshot.traits.classes())?)?;
            written += 1;
        }
        Ok(written)
    }

    /// Delete every snapshot key.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend refuses a deletion.
    pub fn wipe(&self) -> Result<(), PersistenceError<S::Error>> {
        self.store.clear().map_err(PersistenceError::Storage)
    }

    fn read(&self, key: &str) -> Result<Option<String>, PersistenceError<S::Error>> {
        self.store.get(key).map_err(PersistenceError::Storage)
    }

    fn write(&self, key: &str, value: &str) -> Result<(), PersistenceError<S::Error>> {
        self.store.set(key, value).map_err(PersistenceError::Storage)
    }

    fn read_or_default<T>(
        &self,
        key: &'static str,
        recovered: &mut Vec<&'static str>,
    ) -> Result<T, PersistenceError<S::Error>>
    where
        T: DeserializeOwned + Default,
    {
        let Some(raw) = self.read(key)? else {
            return Ok(T::default());
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(value),
            Err(err) => {
                log::warn!("discarding unreadable '{key}' snapshot: {err}");
                recovered.push(key);
                Ok(T::default())
            }
        }
    }
}

/// Keep the readable stats; JSON writes non-finite numbers as `null`.
fn finite_stats(raw: BTreeMap<String, Option<f64>>) -> BTreeMap<String, f64> {
    let total = raw.len();
    let stats: BTreeMap<String, f64> = raw
        .into_iter()
        .filter_map(|(key, value)| value.map(|value| (key, value)))
        .collect();
    if stats.len() < total {
        log::warn!("dropped {} unreadable stat entries", total - stats.len());
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Node, NodeOption};
    use crate::storage::MemoryStore;

    fn graph() -> NodeGraph {
        NodeGraph::builder(Node::new("start", "Start").option(NodeOption::new("Go").to("end")))
            .node(Node::new("end", "End"))
            .build()
            .unwrap()
    }

    #[test]
    fn empty_store_loads_defaults() {
        let mut persistence = Persistence::new(MemoryStore::new());
        let snapshot = persistence.load(&graph()).unwrap();
        assert_eq!(snapshot.current, "start");
        assert!(snapshot.traits.is_empty());
        assert!(snapshot.history.is_empty());
        assert!(!snapshot.wiped);
        assert!(snapshot.recovered.is_empty());
    }

    #[test]
    fn ghost_panel_wipes_every_key() {
        let store = MemoryStore::with_entries([
            (KEY_PANEL, "\"ghost-node\""),
            (KEY_STATS, r#"{"network":3}"#),
            (KEY_HISTORY, r#"["Mid"]"#),
        ]);
        let mut persistence = Persistence::new(store.clone());
        let snapshot = persistence.load(&graph()).unwrap();
        assert!(snapshot.wiped);
        assert_eq!(snapshot.current, "start");
        assert!(store.is_empty());

        let again = Persistence::new(store).load(&graph()).unwrap();
        assert!(!again.wiped);
        assert!(again.traits.is_empty());
    }

    #[test]
    fn non_string_panel_is_corrupt() {
        let store = MemoryStore::with_entries([(KEY_PANEL, "42")]);
        let snapshot = Persistence::new(store).load(&graph()).unwrap();
        assert!(snapshot.wiped);
    }

    #[test]
    fn bad_keys_recover_independently() {
        let store = MemoryStore::with_entries([
            (KEY_PANEL, "\"END\""),
            (KEY_STATS, "{not json"),
            (KEY_CLASSES, r#"{"Income":"HIGH"}"#),
            (KEY_HISTORY, r#"["Start"]"#),
        ]);
        let snapshot = Persistence::new(store).load(&graph()).unwrap();
        assert_eq!(snapshot.current, "end");
        assert_eq!(snapshot.recovered, vec![KEY_STATS]);
        assert_eq!(snapshot.traits.get_class("income"), Some("high"));
        assert_eq!(snapshot.history.list(), ["Start"]);
    }

    #[test]
    fn null_stat_entries_do_not_drop_the_map() {
        let store = MemoryStore::with_entries([
            (KEY_PANEL, "\"end\""),
            (KEY_STATS, r#"{"network":5.0,"big":null}"#),
        ]);
        let snapshot = Persistence::new(store).load(&graph()).unwrap();
        assert!(snapshot.recovered.is_empty());
        assert_eq!(snapshot.traits.get_stat("network"), 5.0);
        assert_eq!(snapshot.traits.stats().len(), 1);
    }

    #[test]
    fn saturated_stats_round_trip() {
        let store = MemoryStore::new();
        let mut persistence = Persistence::new(store.clone());
        persistence.load(&graph()).unwrap();
        let mut traits = TraitStore::new();
        traits.add_stat("network", 5.0);
        traits.add_stat("big", f64::MAX);
        traits.add_stat("big", f64::MAX);
        let history = HistoryLog::new();
        let snapshot = SnapshotRef {
            current: "end",
            traits: &traits,
            history: &history,
        };
        persistence.save(snapshot, SnapshotChanges::ALL).unwrap();

        let restored = Persistence::new(store).load(&graph()).unwrap();
        assert!(restored.recovered.is_empty());
        assert_eq!(restored.traits.stats(), traits.stats());
    }

    #[test]
    fn saves_wait_for_load_and_write_only_changes() {
        let store = MemoryStore::new();
        let mut persistence = Persistence::new(store.clone());
        let mut traits = TraitStore::new();
        traits.add_stat("network", 1.0);
        let history = HistoryLog::new();
        let snapshot = SnapshotRef {
            current: "end",
            traits: &traits,
            history: &history,
        };

        assert_eq!(persistence.save(snapshot, SnapshotChanges::ALL).unwrap(), 0);
        assert!(store.is_empty());

        persistence.load(&graph()).unwrap();
        let changes = SnapshotChanges {
            traits: TraitChanges {
                stats: true,
                classes: false,
            },
            ..SnapshotChanges::default()
        };
        assert_eq!(persistence.save(snapshot, changes).unwrap(), 1);
        assert_eq!(
            store.snapshot().keys().map(String::as_str).collect::<Vec<_>>(),
            vec![KEY_STATS]
        );
        assert_eq!(store.get(KEY_STATS).unwrap().as_deref(), Some(r#"{"network":1.0}"#));
    }
}
