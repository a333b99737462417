//! Named playthrough scenarios for the logic tester.
use anyhow::{Result, ensure};
use pipeline_game::Outcome;

use crate::logic::{PlanMode, PlayStrategy, PlaythroughPlan, PlaythroughSummary, ProbeReport};

/// Keys accepted by [`get_scenario`], in the order `all` runs them.
pub const SCENARIO_KEYS: [&str; 7] = [
    "smoke",
    "random-walk",
    "last-eligible",
    "deterministic-replay",
    "persistence-resume",
    "reset-cancels-transition",
    "busy-rejects-select",
];

#[derive(Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    pub description: String,
    pub plan: PlaythroughPlan,
}

impl TestScenario {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        plan: PlaythroughPlan,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            plan,
        }
    }

    #[must_use]
    pub fn with_step_cap(mut self, step_cap: usize) -> Self {
        self.plan = self.plan.with_step_cap(step_cap);
        self
    }
}

fn finishes_cleanly(summary: &PlaythroughSummary) -> Result<()> {
    ensure!(
        matches!(summary.outcome, Outcome::Won | Outcome::Lost),
        "run ended {} at '{}'",
        summary.outcome.label(),
        summary.terminal
    );
    ensure!(
        summary.failed_commits == 0,
        "{} transitions failed to resolve",
        summary.failed_commits
    );
    Ok(())
}

fn history_is_consistent(summary: &PlaythroughSummary) -> Result<()> {
    ensure!(
        summary.history.len() <= summary.steps,
        "history has {} entries after {} steps",
        summary.history.len(),
        summary.steps
    );
    ensure!(
        summary.history.iter().all(|entry| !entry.trim().is_empty()),
        "history contains a blank entry"
    );
    Ok(())
}

fn replay_is_identical(summary: &PlaythroughSummary) -> Result<()> {
    ensure!(
        summary.probe == Some(ProbeReport::Replay { identical: true }),
        "replay diverged: {:?}",
        summary.probe
    );
    Ok(())
}

fn resume_restores_progress(summary: &PlaythroughSummary) -> Result<()> {
    let Some(ProbeReport::Resume {
        saved_at,
        resumed_at,
        traits_restored,
        history_restored,
    }) = &summary.probe
    else {
        anyhow::bail!("resume probe missing");
    };
    ensure!(
        saved_at == resumed_at,
        "saved at '{saved_at}' but resumed at '{resumed_at}'"
    );
    ensure!(*traits_restored, "traits differ after reopening");
    ensure!(*history_restored, "history differs after reopening");
    Ok(())
}

fn reset_returns_to_start(summary: &PlaythroughSummary) -> Result<()> {
    let Some(ProbeReport::Reset {
        cancelled,
        committed_reset,
        landed,
        cleared,
    }) = &summary.probe
    else {
        anyhow::bail!("reset probe missing");
    };
    ensure!(*cancelled, "reset did not replace the pending advance");
    ensure!(*committed_reset, "the cancelled advance still committed");
    ensure!(landed == "welcome", "reset landed on '{landed}'");
    ensure!(*cleared, "reset left traits or history behind");
    Ok(())
}

fn busy_commits_once(summary: &PlaythroughSummary) -> Result<()> {
    let Some(ProbeReport::Busy { rejected, commits }) = &summary.probe else {
        anyhow::bail!("busy probe missing");
    };
    ensure!(*rejected, "second selection was accepted mid-transition");
    ensure!(*commits == 1, "expected one commit, saw {commits}");
    Ok(())
}

fn straight(strategy: PlayStrategy) -> PlaythroughPlan {
    PlaythroughPlan::new(PlanMode::Straight, strategy)
        .with_expectation(finishes_cleanly)
        .with_expectation(history_is_consistent)
}

pub fn get_scenario(name: &str) -> Option<TestScenario> {
    let (key, description, plan) = match name.to_lowercase().as_str() {
        "smoke" | "basic" => (
            "smoke",
            "First eligible option every step",
            straight(PlayStrategy::FirstEligible),
        ),
        "random-walk" | "random" => (
            "random-walk",
            "Seeded random choices to a terminal node",
            straight(PlayStrategy::Random),
        ),
        "last-eligible" | "last" => (
            "last-eligible",
            "Last eligible option every step",
            straight(PlayStrategy::LastEligible),
        ),
        "deterministic-replay" | "replay" => (
            "deterministic-replay",
            "Same seed twice yields identical runs",
            PlaythroughPlan::new(PlanMode::Replay, PlayStrategy::Random)
                .with_expectation(replay_is_identical),
        ),
        "persistence-resume" | "resume" => (
            "persistence-resume",
            "Reopening on the same store restores progress",
            PlaythroughPlan::new(PlanMode::Resume { split: 5 }, PlayStrategy::Random)
                .with_expectation(resume_restores_progress)
                .with_expectation(finishes_cleanly),
        ),
        "reset-cancels-transition" | "reset" => (
            "reset-cancels-transition",
            "Reset during a pending advance wins",
            PlaythroughPlan::new(PlanMode::ResetMidway { after: 4 }, PlayStrategy::Random)
                .with_expectation(reset_returns_to_start)
                .with_expectation(finishes_cleanly),
        ),
        "busy-rejects-select" | "busy" => (
            "busy-rejects-select",
            "Selections during a transition are refused",
            PlaythroughPlan::new(PlanMode::BusyProbe, PlayStrategy::FirstEligible)
                .with_expectation(busy_commits_once)
                .with_expectation(finishes_cleanly),
        ),
        _ => return None,
    };
    Some(TestScenario::new(key, description, plan))
}

#[must_use]
pub fn list_scenarios() -> Vec<(&'static str, String)> {
    SCENARIO_KEYS
        .iter()
        .filter_map(|key| get_scenario(key).map(|scenario| (*key, scenario.description)))
        .collect()
}
