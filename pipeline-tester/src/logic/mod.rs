pub mod playability;
pub mod playthrough;
pub mod reports;
pub mod seeds;
pub mod tester;

pub use playability::{
    GraphAudit, PlayabilityAggregate, PlayabilityRecord, aggregate_playability,
    run_playability_analysis, validate_playability_targets,
};
pub use playthrough::{
    DEFAULT_STEP_CAP, PlanMode, PlayStrategy, PlaythroughPlan, PlaythroughSummary, ProbeReport,
};
pub use seeds::{SeedInfo, resolve_seed_inputs, split_csv};
pub use tester::*;
