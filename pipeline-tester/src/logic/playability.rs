use anyhow::{Context, Result, ensure};
use pipeline_game::numbers::{count_to_f64, ratio};
use pipeline_game::{NodeGraph, Outcome};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::logic::playthrough::{PlayStrategy, PlaythroughSummary, run_playthrough};
use crate::logic::seeds::SeedInfo;

/// One playthrough reduced to the numbers the sweep reports on.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayabilityRecord {
    pub strategy: PlayStrategy,
    pub seed_label: String,
    pub seed_value: u64,
    pub outcome: Outcome,
    pub steps: usize,
    pub terminal: String,
    pub history_len: usize,
    pub visible_traits: usize,
    pub hook_draws: u64,
    pub failed_commits: usize,
}

impl PlayabilityRecord {
    fn from_summary(seed: &SeedInfo, summary: &PlaythroughSummary) -> Self {
        Self {
            strategy: summary.strategy,
            seed_label: seed.label.clone(),
            seed_value: summary.seed,
            outcome: summary.outcome,
            steps: summary.steps,
            terminal: summary.terminal.clone(),
            history_len: summary.history.len(),
            visible_traits: summary.traits.enumerate_visible().len(),
            hook_draws: summary.hook_draws,
            failed_commits: summary.failed_commits,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayabilityAggregate {
    pub strategy: PlayStrategy,
    pub iterations: usize,
    pub win_pct: f64,
    pub loss_pct: f64,
    pub stall_pct: f64,
    pub mean_steps: f64,
    pub std_steps: f64,
    pub max_steps: usize,
    pub mean_hook_draws: f64,
    pub terminals: BTreeMap<String, usize>,
}

/// Graph-level facts reported next to the sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphAudit {
    pub nodes: usize,
    pub fingerprint: u64,
    pub dangling: Vec<String>,
    pub unreachable: Vec<String>,
}

impl GraphAudit {
    #[must_use]
    pub fn of(graph: &NodeGraph) -> Self {
        Self {
            nodes: graph.len(),
            fingerprint: graph.fingerprint(),
            dangling: graph
                .dangling_destinations()
                .into_iter()
                .map(|d| format!("{}/{} -> {}", d.node_id, d.option, d.destination))
                .collect(),
            unreachable: graph
                .unreachable_nodes()
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Play every strategy against every seed `iterations` times.
pub fn run_playability_analysis(
    graph: &Arc<NodeGraph>,
    seeds: &[SeedInfo],
    iterations: usize,
    step_cap: usize,
) -> Result<Vec<PlayabilityRecord>> {
    let iterations = iterations.max(1);
    let mut records = Vec::with_capacity(seeds.len() * PlayStrategy::ALL.len() * iterations);

    for strategy in PlayStrategy::ALL {
        for seed in seeds {
            for iteration in 0..iterations {
                let iteration_offset = u64::try_from(iteration).unwrap_or(0);
                let iteration_seed = seed.seed.wrapping_add(iteration_offset);
                let summary = run_playthrough(graph, strategy, iteration_seed, step_cap)
                    .with_context(|| {
                        format!(
                            "Playthrough aborted for strategy {strategy}, seed {} (iteration {})",
                            seed.label,
                            iteration + 1
                        )
                    })?;
                records.push(PlayabilityRecord::from_summary(seed, &summary));
            }
        }
    }

    Ok(records)
}

pub fn aggregate_playability(records: &[PlayabilityRecord]) -> Vec<PlayabilityAggregate> {
    let mut aggregates: BTreeMap<PlayStrategy, AggregateBuilder> = BTreeMap::new();
    for record in records {
        aggregates
            .entry(record.strategy)
            .or_insert_with(|| AggregateBuilder::new(record.strategy))
            .ingest(record);
    }
    aggregates
        .into_values()
        .map(AggregateBuilder::finish)
        .collect()
}

/// Every run must finish cleanly and the graph must be fully wired.
///
/// # Errors
///
/// Returns the first violated target.
pub fn validate_playability_targets(
    audit: &GraphAudit,
    aggregates: &[PlayabilityAggregate],
    records: &[PlayabilityRecord],
) -> Result<()> {
    ensure!(
        audit.dangling.is_empty(),
        "Graph has dangling destinations: {}",
        audit.dangling.join(", ")
    );
    ensure!(
        audit.unreachable.is_empty(),
        "Graph has unreachable nodes: {}",
        audit.unreachable.join(", ")
    );
    for record in records {
        ensure!(
            record.outcome != Outcome::Stalled,
            "Strategy {} stalled at '{}' for seed {}",
            record.strategy,
            record.terminal,
            record.seed_label
        );
        ensure!(
            record.failed_commits == 0,
            "Strategy {} hit {} failed transitions for seed {}",
            record.strategy,
            record.failed_commits,
            record.seed_label
        );
    }
    ensure_deterministic(records)?;
    for aggregate in aggregates {
        ensure!(
            aggregate.win_pct + aggregate.loss_pct > 0.0 || aggregate.iterations == 0,
            "Strategy {} never reached a terminal node",
            aggregate.strategy
        );
    }
    Ok(())
}

fn ensure_deterministic(records: &[PlayabilityRecord]) -> Result<()> {
    let mut seen: BTreeMap<(PlayStrategy, u64), &PlayabilityRecord> = BTreeMap::new();
    for record in records {
        if let Some(previous) = seen.insert((record.strategy, record.seed_value), record) {
            ensure!(
                previous.terminal == record.terminal && previous.steps == record.steps,
                "Strategy {} seed {} diverged: '{}' after {} steps vs '{}' after {} steps",
                record.strategy,
                record.seed_value,
                previous.terminal,
                previous.steps,
                record.terminal,
                record.steps
            );
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct AggregateBuilder {
    strategy: PlayStrategy,
    steps: RunningStats,
    iterations: usize,
    won: usize,
    lost: usize,
    stalled: usize,
    max_steps: usize,
    hook_draw_sum: u64,
    terminals: BTreeMap<String, usize>,
}

impl AggregateBuilder {
    fn new(strategy: PlayStrategy) -> Self {
        Self {
            strategy,
            steps: RunningStats::default(),
            iterations: 0,
            won: 0,
            lost: 0,
            stalled: 0,
            max_steps: 0,
            hook_draw_sum: 0,
            terminals: BTreeMap::new(),
        }
    }

    fn ingest(&mut self, record: &PlayabilityRecord) {
        self.iterations += 1;
        self.steps.add(count_to_f64(record.steps));
        self.max_steps = self.max_steps.max(record.steps);
        self.hook_draw_sum = self.hook_draw_sum.saturating_add(record.hook_draws);
        match record.outcome {
            Outcome::Won => self.won += 1,
            Outcome::Lost => self.lost += 1,
            Outcome::Stalled | Outcome::InProgress => self.stalled += 1,
        }
        *self.terminals.entry(record.terminal.clone()).or_default() += 1;
    }

    fn finish(self) -> PlayabilityAggregate {
        #[allow(clippy::cast_precision_loss)]
        let mean_hook_draws = if self.iterations == 0 {
            0.0
        } else {
            self.hook_draw_sum as f64 / count_to_f64(self.iterations)
        };
        PlayabilityAggregate {
            strategy: self.strategy,
            iterations: self.iterations,
            win_pct: ratio(self.won, self.iterations),
            loss_pct: ratio(self.lost, self.iterations),
            stall_pct: ratio(self.stalled, self.iterations),
            mean_steps: self.steps.mean(),
            std_steps: self.steps.std_dev(),
            max_steps: self.max_steps,
            mean_hook_draws,
            terminals: self.terminals,
        }
    }
}

#[derive(Debug, Default, Clone)]
struct RunningStats {
    count: u32,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    fn add(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / f64::from(self.count);
        self.m2 += delta * (value - self.mean);
    }

    const fn mean(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.mean }
    }

    fn std_dev(&self) -> f64 {
        if self.count > 1 {
            (self.m2 / f64::from(self.count - 1)).sqrt()
        } else {
            0.0
        }
    }
}
