//! Progression engine: the selection and transition state machine.
//!
//! The engine owns the trait store, the history log and the current node.
//! A selection schedules a commit after the configured delay; the caller
//! drives time by passing a monotonic `now` to [`ProgressionEngine::poll`].
//! Only one commit can be pending at a time.
use rand::rngs::SmallRng;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{ConfigError, EngineConfig};
use crate::constants::MSG_NEXT_NODE_UNAVAILABLE;
use crate::graph::{Eligibility, Node, NodeGraph};
use crate::history::HistoryLog;
use crate::notify::{LogNotifier, Notifier};
use crate::persistence::{
    LoadedSnapshot, Persistence, PersistenceError, SnapshotChanges, SnapshotRef,
};
use crate::rng::CountingRng;
use crate::storage::KeyValueStore;
use crate::traits::{TraitStore, VisibleTrait};

#[derive(Debug, Error)]
pub enum EngineError<E>
where
    E: std::error::Error + 'static,
{
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to restore saved progress: {0}")]
    Persistence(#[from] PersistenceError<E>),
}

/// What a pending commit will do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    Advance { option: usize },
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTransition {
    pub kind: TransitionKind,
    pub due: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnginePhase {
    #[default]
    Idle,
    Transitioning(PendingTransition),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    Scheduled { due: Duration },
    /// Another transition is already pending.
    Busy,
    UnknownOption,
    Ineligible(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    Scheduled { due: Duration },
    /// A pending advance was cancelled in favour of the reset.
    Replaced { due: Duration },
    AlreadyPending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Advanced { from: String, to: String },
    /// The resolved target does not exist; nothing changed.
    Failed { target: String },
    Reset,
}

/// Classification of the current node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    InProgress,
    Won,
    Lost,
    /// No options left and no terminal flag.
    Stalled,
}

impl Outcome {
    #[must_use]
    pub const fn is_finished(self) -> bool {
        !matches!(self, Self::InProgress)
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::InProgress => "in-progress",
            Self::Won => "won",
            Self::Lost => "lost",
            Self::Stalled => "stalled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionView {
    pub index: usize,
    pub name: String,
    pub eligibility: Eligibility,
    pub annotation: Option<String>,
}

/// Read-only snapshot of the current node for presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeView {
    pub id: String,
    pub name: String,
    pub body: String,
    pub citations: Vec<String>,
    pub is_terminal_loss: bool,
    pub is_terminal_win: bool,
    pub transitioning: bool,
    pub options: Vec<OptionView>,
}

/// Summary of what `open` found in storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub wiped: bool,
    pub recovered: Vec<&'static str>,
}

pub struct ProgressionEngine<S, N = LogNotifier> {
    graph: Arc<NodeGraph>,
    config: EngineConfig,
    persistence: Persistence<S>,
    notifier: N,
    rng: CountingRng<SmallRng>,
    current: String,
    traits: TraitStore,
    history: HistoryLog,
    phase: EnginePhase,
    panel_changed: bool,
    load_report: LoadReport,
}

impl<S: KeyValueStore, N: Notifier> ProgressionEngine<S, N> {
    /// Restore saved progress from `store` and start accepting selections.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or the backend cannot be read.
    pub fn open(
        graph: Arc<NodeGraph>,
        store: S,
        notifier: N,
        config: EngineConfig,
    ) -> Result<Self, EngineError<S::Error>> {
        config.validate()?;
        let mut persistence = Persistence::new(store);
        let LoadedSnapshot {
            current,
            traits,
            history,
            wiped,
            recovered,
        } = persistence.load(&graph)?;
        if wiped {
            log::warn!("saved progress referenced an unknown node and was reset");
        }
        log::debug!("engine opened at '{current}' (seed {})", config.seed);
        Ok(Self {
            rng: CountingRng::for_hooks(config.seed),
            graph,
            config,
            persistence,
            notifier,
            current,
            traits,
            history,
            phase: EnginePhase::Idle,
            panel_changed: false,
            load_report: LoadReport { wiped, recovered },
        })
    }

    /// Schedule the option at `index` on the current node.
    pub fn select(&mut self, index: usize, now: Duration) -> SelectOutcome {
        if self.is_transitioning() {
            return SelectOutcome::Busy;
        }
        let Some(option) = self.current_node().options().get(index) else {
            return SelectOutcome::UnknownOption;
        };
        if let Eligibility::Ineligible(reason) = option.eligibility(&self.traits) {
            log::debug!("option '{}' is closed: {reason}", option.name());
            return SelectOutcome::Ineligible(reason);
        }
        let due = now.saturating_add(self.config.transition_delay());
        log::debug!("option '{}' selected on '{}'", option.name(), self.current);
        self.phase = EnginePhase::Transitioning(PendingTransition {
            kind: TransitionKind::Advance { option: index },
            due,
        });
        SelectOutcome::Scheduled { due }
    }

    /// Schedule a full reset, replacing any pending advance.
    pub fn reset(&mut self, now: Duration) -> ResetOutcome {
        let due = now.saturating_add(self.config.transition_delay());
        let pending = PendingTransition {
            kind: TransitionKind::Reset,
            due,
        };
        match self.phase {
            EnginePhase::Transitioning(PendingTransition {
                kind: TransitionKind::Reset,
                ..
            }) => ResetOutcome::AlreadyPending,
            EnginePhase::Transitioning(_) => {
                log::debug!("pending advance cancelled by reset");
                self.phase = EnginePhase::Transitioning(pending);
                ResetOutcome::Replaced { due }
            }
            EnginePhase::Idle => {
                self.phase = EnginePhase::Transitioning(pending);
                ResetOutcome::Scheduled { due }
            }
        }
    }

    /// Commit the pending transition once `now` reaches its due time.
    pub fn poll(&mut self, now: Duration) -> Option<CommitOutcome> {
        match self.phase {
            EnginePhase::Transitioning(pending) if now >= pending.due => {
                Some(self.commit(pending.kind))
            }
            _ => None,
        }
    }

    /// Commit the pending transition immediately, whatever its due time.
    pub fn run_pending(&mut self) -> Option<CommitOutcome> {
        match self.phase {
            EnginePhase::Transitioning(pending) => Some(self.commit(pending.kind)),
            EnginePhase::Idle => None,
        }
    }

    /// Sleep until the pending transition is due, then commit it.
    ///
    /// `now` is the caller's clock reading at the time of the call.
    #[cfg(feature = "async")]
    pub async fn settle(&mut self, now: Duration) -> Option<CommitOutcome> {
        let EnginePhase::Transitioning(pending) = self.phase else {
            return None;
        };
        let wait = pending.due.saturating_sub(now);
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        self.poll(pending.due)
    }

    fn commit(&mut self, kind: TransitionKind) -> CommitOutcome {
        self.phase = EnginePhase::Idle;
        let outcome = match kind {
            TransitionKind::Advance { option } => self.commit_advance(option),
            TransitionKind::Reset => self.commit_reset(),
        };
        self.persist();
        outcome
    }

    fn commit_advance(&mut self, option_index: usize) -> CommitOutcome {
        let graph = Arc::clone(&self.graph);
        let node = self.current_node_in(&graph);
        let Some(option) = node.options().get(option_index) else {
            return self.fail(String::new());
        };

        // Hooks run against working copies so a failed resolve leaves no trace.
        let mut traits = self.traits.clone();
        let mut history = self.history.clone();
        let mut rng = self.rng.clone();
        if node.logs_to_history() {
            history.append(node.name());
        }
        let target = option.route(&mut traits, &mut rng);
        let Ok(next) = graph.resolve(&target) else {
            return self.fail(target);
        };
        next.enter(&mut traits, &mut rng);

        let from = std::mem::replace(&mut self.current, next.id().to_string());
        self.traits = traits;
        self.history = history;
        self.rng = rng;
        self.panel_changed = true;
        log::debug!("advanced from '{from}' to '{}'", self.current);
        CommitOutcome::Advanced {
            from,
            to: self.current.clone(),
        }
    }

    fn commit_reset(&mut self) -> CommitOutcome {
        self.current = self.graph.initial().id().to_string();
        self.traits.clear();
        self.history.clear();
        self.panel_changed = true;
        log::debug!("progress reset to '{}'", self.current);
        CommitOutcome::Reset
    }

    fn fail(&self, target: String) -> CommitOutcome {
        log::warn!("transition from '{}' to '{target}' failed", self.current);
        self.notifier.notify(MSG_NEXT_NODE_UNAVAILABLE);
        CommitOutcome::Failed { target }
    }

    fn persist(&mut self) {
        let changes = SnapshotChanges {
            panel: std::mem::take(&mut self.panel_changed),
            history: self.history.take_changed(),
            traits: self.traits.take_changes(),
        };
        let snapshot = SnapshotRef {
            current: &self.current,
            traits: &self.traits,
            history: &self.history,
        };
        match self.persistence.save(snapshot, changes) {
            Ok(0) => {}
            Ok(written) => log::debug!("persisted {written} snapshot keys"),
            Err(err) => log::error!("failed to persist progress: {err}"),
        }
    }

    fn current_node_in<'g>(&self, graph: &'g NodeGraph) -> &'g Node {
        graph
            .resolve(&self.current)
            .unwrap_or_else(|_| graph.initial())
    }

    #[must_use]
    pub fn current_node(&self) -> &Node {
        self.current_node_in(&self.graph)
    }

    /// Id of the current node.
    #[must_use]
    pub fn current(&self) -> &str {
        &self.current
    }

    #[must_use]
    pub const fn phase(&self) -> EnginePhase {
        self.phase
    }

    #[must_use]
    pub const fn is_transitioning(&self) -> bool {
        matches!(self.phase, EnginePhase::Transitioning(_))
    }

    #[must_use]
    pub const fn traits(&self) -> &TraitStore {
        &self.traits
    }

    #[must_use]
    pub fn visible_traits(&self) -> Vec<VisibleTrait> {
        self.traits.enumerate_visible()
    }

    #[must_use]
    pub fn history(&self) -> &[String] {
        self.history.list()
    }

    #[must_use]
    pub fn graph(&self) -> &NodeGraph {
        &self.graph
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub const fn load_report(&self) -> &LoadReport {
        &self.load_report
    }

    #[must_use]
    pub const fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Random draws consumed by hooks so far.
    #[must_use]
    pub const fn hook_draws(&self) -> u64 {
        self.rng.draws()
    }

    #[must_use]
    pub fn outcome(&self) -> Outcome {
        let node = self.current_node();
        if node.is_terminal_win() {
            Outcome::Won
        } else if node.is_terminal_loss() {
            Outcome::Lost
        } else if node.is_terminal() {
            Outcome::Stalled
        } else {
            Outcome::InProgress
        }
    }

    #[must_use]
    pub fn view(&self) -> NodeView {
        let node = self.current_node();
        let options = node
            .options()
            .iter()
            .enumerate()
            .map(|(index, option)| OptionView {
                index,
                name: option.name().to_string(),
                eligibility: option.eligibility(&self.traits),
                annotation: option.annotation().map(str::to_string),
            })
            .collect();
        NodeView {
            id: node.id().to_string(),
            name: node.name().to_string(),
            body: node.render_body(&self.traits),
            citations: node.citations().to_vec(),
            is_terminal_loss: node.is_terminal_loss(),
            is_terminal_win: node.is_terminal_win(),
            transitioning: self.is_transitioning(),
            options,
        }
    }
}

impl<S, N> std::fmt::Debug for ProgressionEngine<S, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressionEngine")
            .field("current", &self.current)
            .field("phase", &self.phase)
            .field("traits", &self.traits)
            .field("history", &self.history)
            .finish_non_exhaustive()
    }
}
