mod logic;
mod play;
mod scenario;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use pipeline_game::NodeGraph;
use pipeline_game::career::physics_professor;
use std::fs::File;
use std::io::{BufWriter, Write, stdin, stdout};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use logic::{
    GraphAudit, LogicTester, PlayabilityAggregate, PlayabilityRecord, SeedInfo,
    aggregate_playability, resolve_seed_inputs, run_playability_analysis, split_csv,
    validate_playability_targets,
};
use play::{PlayOptions, load_config};
use scenario::{SCENARIO_KEYS, get_scenario, list_scenarios};

#[derive(Debug, Parser)]
#[command(name = "pipeline-tester", version)]
#[command(about = "Automated QA and terminal playthrough for the career pipeline engine")]
struct Args {
    /// Scenarios to run (comma-separated, or "all")
    #[arg(long, default_value = "smoke")]
    scenarios: String,

    /// List all available scenarios and exit
    #[arg(long)]
    list_scenarios: bool,

    /// Seeds to run (comma-separated; integers, 0x hex, range:A..B, phrase:<text>)
    #[arg(long, default_value = "1337")]
    seeds: String,

    /// Number of iterations per scenario and seed
    #[arg(long, default_value_t = 10)]
    iterations: usize,

    /// Selections allowed before a run counts as stalled
    #[arg(long, default_value_t = logic::DEFAULT_STEP_CAP)]
    step_cap: usize,

    /// Output report format
    #[arg(long, default_value = "console")]
    #[arg(value_parser = ["json", "markdown", "console", "csv"])]
    report: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    // Interactive options
    /// Play the career graph in the terminal instead of running scenarios
    #[arg(long)]
    play: bool,

    /// Directory for saved progress (interactive mode; in-memory when omitted)
    #[arg(long)]
    save_dir: Option<PathBuf>,

    /// JSON engine config file (interactive mode)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Hook RNG seed override (interactive mode)
    #[arg(long)]
    seed: Option<u64>,

    /// Transition delay override in milliseconds (interactive mode)
    #[arg(long)]
    delay_ms: Option<u64>,
}

/// Sweep output consumed by the console and CSV reports.
#[derive(Debug)]
struct PlayabilityData {
    records: Vec<PlayabilityRecord>,
    aggregates: Vec<PlayabilityAggregate>,
    audit: GraphAudit,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if maybe_list_scenarios(&args)? {
        return Ok(());
    }

    let graph = Arc::new(physics_professor().context("career graph failed to build")?);

    if args.play {
        let options = PlayOptions {
            save_dir: args.save_dir.clone(),
            config: load_config(args.config.as_deref(), args.seed, args.delay_ms)?,
            hyperlinks: colored::control::SHOULD_COLORIZE.should_colorize(),
        };
        return play::play(graph, &options, stdin().lock(), &mut stdout()).await;
    }

    announce_banner();

    let start_time = Instant::now();
    let scenarios = expand_scenarios(&args.scenarios);
    let seed_tokens = split_csv(&args.seeds);
    let seed_infos = resolve_seed_inputs(&seed_tokens)?;

    let all_results = run_logic_scenarios(&args, &scenarios, &seed_infos, &graph);
    let playability = gather_playability(&args, &graph, &seed_infos)?;

    write_reports(&args, &all_results, playability.as_ref(), start_time)?;

    if let Some(data) = playability.as_ref() {
        validate_playability_targets(&data.audit, &data.aggregates, &data.records)?;
    }

    if all_results.iter().any(|r| !r.passed) {
        std::process::exit(1);
    }

    Ok(())
}

fn maybe_list_scenarios(args: &Args) -> Result<bool> {
    if !args.list_scenarios {
        return Ok(false);
    }
    let mut output_target = OutputTarget::new(args.output.clone())?;
    writeln!(output_target.writer(), "Available scenarios:")?;
    for (key, description) in list_scenarios() {
        writeln!(output_target.writer(), "  {key:25} - {description}")?;
    }
    output_target.flush_inner()?;
    Ok(true)
}

fn announce_banner() {
    println!("{}", "🎓 Pipeline Automated Tester".bright_cyan().bold());
    println!("{}", "============================".cyan());
}

fn expand_scenarios(scenarios_arg: &str) -> Vec<String> {
    let mut scenarios = split_csv(scenarios_arg);
    if scenarios.iter().any(|s| s.eq_ignore_ascii_case("all")) {
        scenarios.retain(|s| !s.eq_ignore_ascii_case("all"));
        for key in SCENARIO_KEYS {
            if !scenarios.iter().any(|s| s == key) {
                scenarios.push(key.to_string());
            }
        }
    }
    scenarios
}

fn run_logic_scenarios(
    args: &Args,
    scenarios: &[String],
    seeds: &[SeedInfo],
    graph: &Arc<NodeGraph>,
) -> Vec<logic::ScenarioResult> {
    let mut results = Vec::new();
    if scenarios.is_empty() {
        return results;
    }

    println!("{}", "🧠 Running Logic Tests".bright_yellow().bold());
    println!("{}", "-".repeat(30).yellow());

    let logic_tester = LogicTester::new(Arc::clone(graph), args.verbose);

    for scenario_name in scenarios {
        if let Some(scenario) = get_scenario(scenario_name) {
            let scenario = scenario.with_step_cap(args.step_cap);
            results.extend(logic_tester.run_scenario(&scenario, seeds, args.iterations));
        } else {
            eprintln!("⚠️  Unknown scenario: {}", scenario_name.yellow());
        }
    }

    results
}

fn gather_playability(
    args: &Args,
    graph: &Arc<NodeGraph>,
    seeds: &[SeedInfo],
) -> Result<Option<PlayabilityData>> {
    if !matches!(args.report.as_str(), "console" | "csv") {
        return Ok(None);
    }
    let records = run_playability_analysis(graph, seeds, args.iterations, args.step_cap)?;
    Ok(Some(PlayabilityData {
        aggregates: aggregate_playability(&records),
        records,
        audit: GraphAudit::of(graph),
    }))
}

fn write_reports(
    args: &Args,
    results: &[logic::ScenarioResult],
    playability: Option<&PlayabilityData>,
    start_time: Instant,
) -> Result<()> {
    let mut output_target = OutputTarget::new(args.output.clone())?;

    match args.report.as_str() {
        "json" => {
            if results.is_empty() {
                writeln!(&mut output_target, "[]")?;
            } else {
                logic::reports::generate_json_report(&mut output_target, results)?;
            }
        }
        "markdown" => {
            if results.is_empty() {
                writeln!(
                    &mut output_target,
                    "# Pipeline Logic Test Results\n\n_No scenarios executed._"
                )?;
            } else {
                logic::reports::generate_markdown_report(&mut output_target, results)?;
            }
        }
        "csv" => {
            if let Some(data) = playability {
                logic::reports::generate_csv_report(&mut output_target, &data.records)?;
            } else {
                writeln!(&mut output_target, "[]")?;
            }
        }
        _ => {
            let duration = start_time.elapsed();
            if results.is_empty() {
                writeln!(&mut output_target, "No logic scenarios executed.")?;
            } else if let Some(data) = playability {
                logic::reports::generate_console_report(
                    &mut output_target,
                    results,
                    &data.aggregates,
                    Some(&data.audit),
                    duration,
                )?;
            } else {
                writeln!(&mut output_target, "Playability data unavailable.")?;
            }
        }
    }

    let duration = start_time.elapsed();
    writeln!(&mut output_target)?;
    writeln!(&mut output_target, "🏁 Total time: {duration:?}")?;
    output_target.flush_inner()?;
    Ok(())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::{PlayStrategy, ScenarioResult};
    use pipeline_game::Outcome;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn base_args() -> Args {
        Args {
            scenarios: "smoke".to_string(),
            list_scenarios: false,
            seeds: "1337".to_string(),
            iterations: 1,
            step_cap: logic::DEFAULT_STEP_CAP,
            report: "json".to_string(),
            verbose: false,
            output: None,
            play: false,
            save_dir: None,
            config: None,
            seed: None,
            delay_ms: None,
        }
    }

    fn temp_path(label: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("pipeline-tester-{label}-{nanos}"))
    }

    fn career() -> Arc<NodeGraph> {
        Arc::new(physics_professor().unwrap())
    }

    fn sample_result(passed: bool) -> ScenarioResult {
        ScenarioResult {
            scenario_name: "Smoke".to_string(),
            seed: 1337,
            seed_label: "1337".to_string(),
            passed,
            iterations_run: 3,
            successful_iterations: if passed { 3 } else { 2 },
            failures: if passed {
                Vec::new()
            } else {
                vec!["failure".to_string()]
            },
            average_duration: Duration::from_millis(10),
            performance_data: vec![Duration::from_millis(10)],
        }
    }

    fn sample_data() -> PlayabilityData {
        let record = PlayabilityRecord {
            strategy: PlayStrategy::FirstEligible,
            seed_label: "1337".to_string(),
            seed_value: 1337,
            outcome: Outcome::Lost,
            steps: 9,
            terminal: "industry".to_string(),
            history_len: 4,
            visible_traits: 5,
            hook_draws: 3,
            failed_commits: 0,
        };
        PlayabilityData {
            aggregates: vec![PlayabilityAggregate {
                strategy: PlayStrategy::FirstEligible,
                iterations: 1,
                win_pct: 0.0,
                loss_pct: 1.0,
                stall_pct: 0.0,
                mean_steps: 9.0,
                std_steps: 0.0,
                max_steps: 9,
                mean_hook_draws: 3.0,
                terminals: BTreeMap::from([("industry".to_string(), 1)]),
            }],
            records: vec![record],
            audit: GraphAudit::of(&career()),
        }
    }

    fn report_with(report: &str, results: &[ScenarioResult], data: Option<&PlayabilityData>) -> String {
        let temp = temp_path(report);
        let args = Args {
            report: report.to_string(),
            output: Some(temp.clone()),
            ..base_args()
        };
        write_reports(&args, results, data, Instant::now()).unwrap();
        let content = std::fs::read_to_string(&temp).unwrap();
        std::fs::remove_file(temp).unwrap();
        content
    }

    #[test]
    fn expands_all_scenarios_keyword() {
        let expanded = expand_scenarios("smoke,ALL");
        assert_eq!(expanded[0], "smoke");
        assert_eq!(expanded.len(), SCENARIO_KEYS.len());
        assert!(expanded.contains(&"busy-rejects-select".to_string()));
    }

    #[test]
    fn expand_scenarios_without_all_preserves_order() {
        let expanded = expand_scenarios("replay, smoke");
        assert_eq!(expanded, vec!["replay".to_string(), "smoke".to_string()]);
    }

    #[test]
    fn run_logic_scenarios_skips_unknown_names() {
        let args = base_args();
        let seeds = [SeedInfo::from_numeric(42)];
        let results = run_logic_scenarios(
            &args,
            &["smoke".to_string(), "missing".to_string()],
            &seeds,
            &career(),
        );
        assert_eq!(results.len(), 1);
        assert!(results[0].passed, "{:?}", results[0].failures);
    }

    #[test]
    fn step_cap_flows_into_scenarios() {
        let args = Args {
            step_cap: 2,
            ..base_args()
        };
        let results = run_logic_scenarios(
            &args,
            &["smoke".to_string()],
            &[SeedInfo::from_numeric(1)],
            &career(),
        );
        assert!(!results[0].passed);
        assert!(results[0].failures[0].contains("stalled"));
    }

    #[test]
    fn gather_playability_only_for_console_and_csv() {
        let seeds = [SeedInfo::from_numeric(42)];
        assert!(gather_playability(&base_args(), &career(), &seeds).unwrap().is_none());
        let args = Args {
            report: "csv".to_string(),
            ..base_args()
        };
        let data = gather_playability(&args, &career(), &seeds).unwrap().unwrap();
        assert_eq!(data.records.len(), PlayStrategy::ALL.len());
        assert_eq!(data.aggregates.len(), PlayStrategy::ALL.len());
        assert_eq!(data.audit.nodes, career().len());
    }

    #[test]
    fn maybe_list_scenarios_writes_output() {
        let temp = temp_path("scenarios");
        let args = Args {
            list_scenarios: true,
            output: Some(temp.clone()),
            ..base_args()
        };
        assert!(maybe_list_scenarios(&args).unwrap());
        let content = std::fs::read_to_string(&temp).unwrap();
        assert!(content.starts_with("Available scenarios:"));
        assert!(content.contains("  persistence-resume"));
        std::fs::remove_file(temp).unwrap();
    }

    #[test]
    fn maybe_list_scenarios_returns_false_when_disabled() {
        assert!(!maybe_list_scenarios(&base_args()).unwrap());
    }

    #[test]
    fn write_reports_empty_fallbacks() {
        assert!(report_with("json", &[], None).starts_with("[]"));
        assert!(report_with("markdown", &[], None).contains("_No scenarios executed._"));
        assert!(report_with("csv", &[], None).starts_with("[]"));
        assert!(report_with("console", &[], None).contains("No logic scenarios executed."));
        assert!(
            report_with("console", &[sample_result(true)], None)
                .contains("Playability data unavailable.")
        );
    }

    #[test]
    fn write_reports_emits_each_format() {
        let results = [sample_result(true), sample_result(false)];
        let data = sample_data();
        assert!(report_with("json", &results, None).contains("\"scenario_name\": \"Smoke\""));
        assert!(report_with("markdown", &results, None).contains("# Pipeline Logic Test Results"));
        let csv = report_with("csv", &results, Some(&data));
        assert!(csv.contains("1337,first-eligible,lost,9,industry,4,5,3"));
        let console = report_with("console", &results, Some(&data));
        assert!(console.contains("Outcome Summary"));
        assert!(console.contains("Graph Audit"));
        assert!(console.contains("🏁 Total time"));
    }

    #[test]
    fn output_target_stdout_writes() {
        let mut target = OutputTarget::new(None).unwrap();
        target.write_all(b"ok").unwrap();
        target.flush().unwrap();
    }
}
