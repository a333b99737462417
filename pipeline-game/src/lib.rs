//! Pipeline Progression Engine
//!
//! Platform-agnostic core for a branching career-pipeline narrative. A player
//! walks a directed graph of nodes; each choice mutates a persistent trait
//! store that gates later options. This crate provides the graph, the trait
//! store, the transition state machine and persistence, without any UI.

pub mod career;
pub mod config;
pub mod constants;
pub mod engine;
pub mod graph;
pub mod history;
pub mod notify;
pub mod numbers;
pub mod persistence;
pub mod rng;
pub mod storage;
pub mod text;
pub mod traits;
pub mod weighted;

use std::sync::Arc;

// Re-export commonly used types
pub use config::{ConfigError, EngineConfig};
pub use engine::{
    CommitOutcome, EngineError, EnginePhase, LoadReport, NodeView, OptionView, Outcome,
    PendingTransition, ProgressionEngine, ResetOutcome, SelectOutcome, TransitionKind,
};
pub use graph::{
    DanglingDestination, Eligibility, GraphBuilder, GraphError, Node, NodeGraph, NodeOption,
};
pub use history::HistoryLog;
pub use notify::{LogNotifier, Notifier, RecordingNotifier};
pub use persistence::{LoadedSnapshot, Persistence, PersistenceError, SnapshotChanges};
pub use rng::CountingRng;
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError};
pub use traits::{ClassAssignment, StatDelta, TraitStore, TraitValue, VisibleTrait};
pub use weighted::{Weighted, WeightedError, select_weighted};

/// Open an in-memory engine over `graph` with default config and log notifications.
///
/// # Errors
///
/// Returns an error if the engine cannot be opened.
pub fn open_with_defaults(
    graph: Arc<NodeGraph>,
) -> anyhow::Result<ProgressionEngine<MemoryStore, LogNotifier>> {
    let engine = ProgressionEngine::open(
        graph,
        MemoryStore::new(),
        LogNotifier,
        EngineConfig::default(),
    )?;
    Ok(engine)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_open_at_initial_node() {
        let graph = Arc::new(career::physics_professor().unwrap());
        let engine = open_with_defaults(graph).unwrap();
        assert_eq!(engine.current(), "welcome");
        assert_eq!(engine.outcome(), Outcome::InProgress);
        assert!(engine.visible_traits().is_empty());
    }
}
