//! Automated playthroughs driven by a virtual clock.
use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use pipeline_game::{
    CommitOutcome, EngineConfig, MemoryStore, NodeGraph, Outcome, ProgressionEngine,
    RecordingNotifier, ResetOutcome, SelectOutcome, TraitStore,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on selections before a run counts as stalled.
pub const DEFAULT_STEP_CAP: usize = 128;

const CHOOSER_SALT: u64 = 0x5EED_C401_CE00_0001;

pub type TesterEngine = ProgressionEngine<MemoryStore, RecordingNotifier>;

/// How a playthrough picks among eligible options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PlayStrategy {
    FirstEligible,
    LastEligible,
    Random,
}

impl PlayStrategy {
    pub const ALL: [Self; 3] = [Self::FirstEligible, Self::LastEligible, Self::Random];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::FirstEligible => "first-eligible",
            Self::LastEligible => "last-eligible",
            Self::Random => "random",
        }
    }
}

impl fmt::Display for PlayStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

struct Chooser {
    strategy: PlayStrategy,
    rng: ChaCha20Rng,
}

impl Chooser {
    fn new(strategy: PlayStrategy, seed: u64) -> Self {
        Self {
            strategy,
            rng: ChaCha20Rng::seed_from_u64(seed ^ CHOOSER_SALT),
        }
    }

    fn pick(&mut self, open: &[usize]) -> Option<usize> {
        match self.strategy {
            PlayStrategy::FirstEligible => open.first().copied(),
            PlayStrategy::LastEligible => open.last().copied(),
            PlayStrategy::Random if open.is_empty() => None,
            PlayStrategy::Random => open.get(self.rng.gen_range(0..open.len())).copied(),
        }
    }
}

/// Extra engine behaviour exercised on top of the plain playthrough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlanMode {
    #[default]
    Straight,
    /// Play the same seed twice and compare the runs.
    Replay,
    /// Drop the engine after `split` steps and reopen it on the same store.
    Resume { split: usize },
    /// Reset while an advance is pending after `after` steps.
    ResetMidway { after: usize },
    /// Select twice during one transition.
    BusyProbe,
}

impl PlanMode {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Straight => "straight",
            Self::Replay => "replay",
            Self::Resume { .. } => "resume",
            Self::ResetMidway { .. } => "reset-midway",
            Self::BusyProbe => "busy-probe",
        }
    }
}

/// Observations collected by a non-straight plan mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "probe", rename_all = "kebab-case")]
pub enum ProbeReport {
    Replay {
        identical: bool,
    },
    Resume {
        saved_at: String,
        resumed_at: String,
        traits_restored: bool,
        history_restored: bool,
    },
    Reset {
        cancelled: bool,
        committed_reset: bool,
        landed: String,
        cleared: bool,
    },
    Busy {
        rejected: bool,
        commits: usize,
    },
}

/// Assertion hook run after a playthrough completes.
type PlaythroughExpectationFn =
    Arc<dyn Fn(&PlaythroughSummary) -> Result<()> + Send + Sync + 'static>;

#[derive(Clone)]
pub struct PlaythroughExpectation(PlaythroughExpectationFn);

impl fmt::Debug for PlaythroughExpectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaythroughExpectation").finish()
    }
}

impl PlaythroughExpectation {
    pub fn evaluate(&self, summary: &PlaythroughSummary) -> Result<()> {
        (self.0)(summary)
    }
}

impl<F> From<F> for PlaythroughExpectation
where
    F: Fn(&PlaythroughSummary) -> Result<()> + Send + Sync + 'static,
{
    fn from(f: F) -> Self {
        Self(Arc::new(f))
    }
}

#[derive(Debug, Clone)]
pub struct PlaythroughPlan {
    pub mode: PlanMode,
    pub strategy: PlayStrategy,
    pub step_cap: usize,
    pub expectations: Vec<PlaythroughExpectation>,
}

impl PlaythroughPlan {
    #[must_use]
    pub const fn new(mode: PlanMode, strategy: PlayStrategy) -> Self {
        Self {
            mode,
            strategy,
            step_cap: DEFAULT_STEP_CAP,
            expectations: Vec::new(),
        }
    }

    #[must_use]
    pub const fn with_step_cap(mut self, step_cap: usize) -> Self {
        self.step_cap = step_cap;
        self
    }

    #[must_use]
    pub fn with_expectation(mut self, expectation: impl Into<PlaythroughExpectation>) -> Self {
        self.expectations.push(expectation.into());
        self
    }

    /// Same plan, different chooser.
    #[must_use]
    pub fn with_strategy(mut self, strategy: PlayStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// One selection made during a playthrough.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub node: String,
    pub option: String,
    pub index: usize,
    pub eligible_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaythroughSummary {
    pub seed: u64,
    pub strategy: PlayStrategy,
    #[serde(serialize_with = "serialize_outcome")]
    pub outcome: Outcome,
    pub steps: usize,
    pub terminal: String,
    pub history: Vec<String>,
    pub decisions: Vec<Decision>,
    pub failed_commits: usize,
    pub hook_draws: u64,
    pub probe: Option<ProbeReport>,
    #[serde(skip)]
    pub traits: TraitStore,
}

fn serialize_outcome<S>(outcome: &Outcome, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(outcome.label())
}

impl PlaythroughSummary {
    /// The last few decisions, for failure messages.
    #[must_use]
    pub fn decision_trail(&self) -> String {
        if self.decisions.is_empty() {
            return "no decisions recorded".to_string();
        }
        let skip = self.decisions.len().saturating_sub(3);
        self.decisions[skip..]
            .iter()
            .map(|d| {
                format!(
                    "{} -> {} [{} of {} open]",
                    d.node, d.option, d.index, d.eligible_count
                )
            })
            .collect::<Vec<_>>()
            .join(" | ")
    }

    fn same_run(&self, other: &Self) -> bool {
        self.outcome == other.outcome
            && self.terminal == other.terminal
            && self.history == other.history
            && self.decisions == other.decisions
            && self.hook_draws == other.hook_draws
            && same_traits(&self.traits, &other.traits)
    }
}

fn same_traits(left: &TraitStore, right: &TraitStore) -> bool {
    left.stats() == right.stats() && left.classes() == right.classes()
}

/// Open an engine over `store` for `seed`.
pub fn open_engine(graph: &Arc<NodeGraph>, store: MemoryStore, seed: u64) -> Result<TesterEngine> {
    ProgressionEngine::open(
        Arc::clone(graph),
        store,
        RecordingNotifier::new(),
        EngineConfig::default().with_seed(seed),
    )
    .context("failed to open engine")
}

/// Select `index` and commit it on the virtual clock.
pub fn commit_choice(
    engine: &mut TesterEngine,
    index: usize,
    now: &mut Duration,
) -> Result<CommitOutcome> {
    match engine.select(index, *now) {
        SelectOutcome::Scheduled { due } => {
            *now = due;
            engine
                .poll(due)
                .context("transition was not due at its scheduled time")
        }
        other => bail!(
            "selection {index} on '{}' rejected: {other:?}",
            engine.current()
        ),
    }
}

fn eligible_options(engine: &TesterEngine) -> Vec<usize> {
    engine
        .view()
        .options
        .iter()
        .filter(|option| option.eligibility.is_eligible())
        .map(|option| option.index)
        .collect()
}

/// Clock, chooser and decision log shared across the phases of one run.
struct Driver {
    chooser: Chooser,
    now: Duration,
    decisions: Vec<Decision>,
    step_cap: usize,
}

impl Driver {
    fn new(strategy: PlayStrategy, seed: u64, step_cap: usize) -> Self {
        Self {
            chooser: Chooser::new(strategy, seed),
            now: Duration::ZERO,
            decisions: Vec::new(),
            step_cap,
        }
    }

    /// Pick the next option, log it, and return its index.
    fn next_choice(&mut self, engine: &TesterEngine) -> Option<usize> {
        let open = eligible_options(engine);
        let index = self.chooser.pick(&open)?;
        let view = engine.view();
        self.decisions.push(Decision {
            node: view.id,
            option: view.options[index].name.clone(),
            index,
            eligible_count: open.len(),
        });
        Some(index)
    }

    /// Advance up to `limit` more steps, stopping early on a terminal node.
    fn advance(&mut self, engine: &mut TesterEngine, limit: usize) -> Result<()> {
        let target = self.decisions.len().saturating_add(limit).min(self.step_cap);
        while self.decisions.len() < target && !engine.outcome().is_finished() {
            let Some(index) = self.next_choice(engine) else {
                log::debug!("no eligible option on '{}'", engine.current());
                break;
            };
            commit_choice(engine, index, &mut self.now)?;
        }
        Ok(())
    }

    fn finish(&mut self, engine: &mut TesterEngine) -> Result<()> {
        self.advance(engine, usize::MAX)
    }

    fn summarize(
        self,
        engine: &TesterEngine,
        seed: u64,
        strategy: PlayStrategy,
        probe: Option<ProbeReport>,
    ) -> PlaythroughSummary {
        let outcome = match engine.outcome() {
            Outcome::InProgress => Outcome::Stalled,
            finished => finished,
        };
        PlaythroughSummary {
            seed,
            strategy,
            outcome,
            steps: self.decisions.len(),
            terminal: engine.current().to_string(),
            history: engine.history().to_vec(),
            decisions: self.decisions,
            failed_commits: engine.notifier().count(),
            hook_draws: engine.hook_draws(),
            probe,
            traits: engine.traits().clone(),
        }
    }
}

/// Play one run of `graph` from scratch.
pub fn run_playthrough(
    graph: &Arc<NodeGraph>,
    strategy: PlayStrategy,
    seed: u64,
    step_cap: usize,
) -> Result<PlaythroughSummary> {
    let mut engine = open_engine(graph, MemoryStore::new(), seed)?;
    let mut driver = Driver::new(strategy, seed, step_cap);
    driver.finish(&mut engine)?;
    Ok(driver.summarize(&engine, seed, strategy, None))
}

/// Execute `plan` for `seed`, including its mode-specific probe.
pub fn run_plan(
    graph: &Arc<NodeGraph>,
    plan: &PlaythroughPlan,
    seed: u64,
) -> Result<PlaythroughSummary> {
    match plan.mode {
        PlanMode::Straight => run_playthrough(graph, plan.strategy, seed, plan.step_cap),
        PlanMode::Replay => {
            let first = run_playthrough(graph, plan.strategy, seed, plan.step_cap)?;
            let mut second = run_playthrough(graph, plan.strategy, seed, plan.step_cap)?;
            second.probe = Some(ProbeReport::Replay {
                identical: first.same_run(&second),
            });
            Ok(second)
        }
        PlanMode::Resume { split } => run_resume(graph, plan, seed, split),
        PlanMode::ResetMidway { after } => run_reset_midway(graph, plan, seed, after),
        PlanMode::BusyProbe => run_busy_probe(graph, plan, seed),
    }
}

fn run_resume(
    graph: &Arc<NodeGraph>,
    plan: &PlaythroughPlan,
    seed: u64,
    split: usize,
) -> Result<PlaythroughSummary> {
    let store = MemoryStore::new();
    let mut driver = Driver::new(plan.strategy, seed, plan.step_cap);
    let (saved_at, saved_traits, saved_history) = {
        let mut engine = open_engine(graph, store.clone(), seed)?;
        driver.advance(&mut engine, split)?;
        (
            engine.current().to_string(),
            engine.traits().clone(),
            engine.history().to_vec(),
        )
    };

    let mut engine = open_engine(graph, store, seed)?;
    let probe = ProbeReport::Resume {
        resumed_at: engine.current().to_string(),
        traits_restored: same_traits(engine.traits(), &saved_traits),
        history_restored: engine.history() == saved_history.as_slice(),
        saved_at,
    };
    driver.finish(&mut engine)?;
    Ok(driver.summarize(&engine, seed, plan.strategy, Some(probe)))
}

fn run_reset_midway(
    graph: &Arc<NodeGraph>,
    plan: &PlaythroughPlan,
    seed: u64,
    after: usize,
) -> Result<PlaythroughSummary> {
    let mut engine = open_engine(graph, MemoryStore::new(), seed)?;
    let mut driver = Driver::new(plan.strategy, seed, plan.step_cap);
    driver.advance(&mut engine, after)?;

    let Some(index) = eligible_options(&engine).first().copied() else {
        bail!("no eligible option to interrupt on '{}'", engine.current());
    };
    let SelectOutcome::Scheduled { due } = engine.select(index, driver.now) else {
        bail!("selection on '{}' was not scheduled", engine.current());
    };
    let halfway = driver.now + (due - driver.now) / 2;
    let cancelled = matches!(engine.reset(halfway), ResetOutcome::Replaced { .. });
    let mut committed = Vec::new();
    let mut tick = driver.now;
    while engine.is_transitioning() {
        tick += engine.config().transition_delay() / 4 + Duration::from_millis(1);
        committed.extend(engine.poll(tick));
    }
    driver.now = tick;
    let probe = ProbeReport::Reset {
        cancelled,
        committed_reset: committed == [CommitOutcome::Reset],
        landed: engine.current().to_string(),
        cleared: engine.traits().is_empty() && engine.history().is_empty(),
    };
    driver.finish(&mut engine)?;
    Ok(driver.summarize(&engine, seed, plan.strategy, Some(probe)))
}

fn run_busy_probe(
    graph: &Arc<NodeGraph>,
    plan: &PlaythroughPlan,
    seed: u64,
) -> Result<PlaythroughSummary> {
    let mut engine = open_engine(graph, MemoryStore::new(), seed)?;
    let mut driver = Driver::new(plan.strategy, seed, plan.step_cap);

    let Some(index) = driver.next_choice(&engine) else {
        bail!("initial node '{}' has no eligible option", engine.current());
    };
    let SelectOutcome::Scheduled { due } = engine.select(index, driver.now) else {
        bail!("first selection on '{}' was not scheduled", engine.current());
    };
    let rejected = engine.select(index, driver.now) == SelectOutcome::Busy;
    let mut commits = 0;
    for factor in 1..=3 {
        if engine.poll(due * factor).is_some() {
            commits += 1;
        }
    }
    driver.now = due * 3;
    driver.finish(&mut engine)?;
    Ok(driver.summarize(
        &engine,
        seed,
        plan.strategy,
        Some(ProbeReport::Busy { rejected, commits }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_game::career::physics_professor;

    fn career() -> Arc<NodeGraph> {
        Arc::new(physics_professor().unwrap())
    }

    #[test]
    fn strategies_finish_the_career_graph() {
        let graph = career();
        for strategy in PlayStrategy::ALL {
            let summary = run_playthrough(&graph, strategy, 1337, DEFAULT_STEP_CAP).unwrap();
            assert!(
                matches!(summary.outcome, Outcome::Won | Outcome::Lost),
                "{strategy}: {}",
                summary.decision_trail()
            );
            assert_eq!(summary.failed_commits, 0);
            assert_eq!(summary.steps, summary.decisions.len());
        }
    }

    #[test]
    fn step_cap_marks_run_stalled() {
        let summary = run_playthrough(&career(), PlayStrategy::FirstEligible, 3, 2).unwrap();
        assert_eq!(summary.outcome, Outcome::Stalled);
        assert_eq!(summary.steps, 2);
        assert_eq!(summary.terminal, "income_intro");
    }

    #[test]
    fn chooser_respects_strategy() {
        let open = [1, 4, 6];
        assert_eq!(
            Chooser::new(PlayStrategy::FirstEligible, 0).pick(&open),
            Some(1)
        );
        assert_eq!(
            Chooser::new(PlayStrategy::LastEligible, 0).pick(&open),
            Some(6)
        );
        let picked = Chooser::new(PlayStrategy::Random, 0).pick(&open).unwrap();
        assert!(open.contains(&picked));
        assert_eq!(Chooser::new(PlayStrategy::Random, 0).pick(&[]), None);
    }

    #[test]
    fn decision_trail_keeps_last_three() {
        let summary =
            run_playthrough(&career(), PlayStrategy::FirstEligible, 5, DEFAULT_STEP_CAP).unwrap();
        let trail = summary.decision_trail();
        assert_eq!(trail.matches(" | ").count(), 2);
        assert!(trail.starts_with(&summary.decisions[summary.steps - 3].node));
    }

    #[test]
    fn summary_serializes_outcome_label() {
        let summary =
            run_playthrough(&career(), PlayStrategy::LastEligible, 8, DEFAULT_STEP_CAP).unwrap();
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["strategy"], "last-eligible");
        assert!(["won", "lost"].contains(&json["outcome"].as_str().unwrap()));
        assert!(json.get("traits").is_none());
        assert!(json["probe"].is_null());
    }

    #[test]
    fn replay_mode_reports_identical_runs() {
        let plan = PlaythroughPlan::new(PlanMode::Replay, PlayStrategy::Random);
        let summary = run_plan(&career(), &plan, 21).unwrap();
        assert_eq!(summary.probe, Some(ProbeReport::Replay { identical: true }));
    }

    #[test]
    fn resume_mode_restores_saved_node() {
        let plan = PlaythroughPlan::new(PlanMode::Resume { split: 4 }, PlayStrategy::FirstEligible);
        let summary = run_plan(&career(), &plan, 11).unwrap();
        let Some(ProbeReport::Resume {
            saved_at,
            resumed_at,
            traits_restored,
            history_restored,
        }) = summary.probe
        else {
            panic!("missing resume probe");
        };
        assert_eq!(saved_at, resumed_at);
        assert!(traits_restored);
        assert!(history_restored);
        assert!(summary.outcome.is_finished());
    }

    #[test]
    fn reset_midway_lands_on_initial_node() {
        let plan =
            PlaythroughPlan::new(PlanMode::ResetMidway { after: 3 }, PlayStrategy::FirstEligible);
        let summary = run_plan(&career(), &plan, 2).unwrap();
        assert_eq!(
            summary.probe,
            Some(ProbeReport::Reset {
                cancelled: true,
                committed_reset: true,
                landed: "welcome".to_string(),
                cleared: true,
            })
        );
        assert_eq!(summary.decisions[0].node, "welcome");
        assert_eq!(summary.decisions[3].node, "welcome");
    }

    #[test]
    fn busy_probe_commits_once() {
        let plan = PlaythroughPlan::new(PlanMode::BusyProbe, PlayStrategy::FirstEligible);
        let summary = run_plan(&career(), &plan, 9).unwrap();
        assert_eq!(
            summary.probe,
            Some(ProbeReport::Busy {
                rejected: true,
                commits: 1
            })
        );
        assert_eq!(summary.decisions[1].node, "gender");
    }
}
