use anyhow::Result;
use colored::Colorize;
use pipeline_game::numbers::ratio;
use std::io::Write;
use std::time::Duration;

use super::playability::{GraphAudit, PlayabilityAggregate, PlayabilityRecord};
use super::ScenarioResult;

pub fn generate_console_report(
    out: &mut dyn Write,
    results: &[ScenarioResult],
    aggregates: &[PlayabilityAggregate],
    audit: Option<&GraphAudit>,
    total_duration: Duration,
) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", "📊 Logic Test Results Summary".bright_cyan().bold())?;
    writeln!(out, "{}", "==============================".cyan())?;

    let total_tests = results.len();
    let passed_tests = results.iter().filter(|r| r.passed).count();
    let failed_tests = total_tests - passed_tests;

    writeln!(out, "Total scenarios: {total_tests}")?;
    writeln!(out, "Passed: {}", passed_tests.to_string().green())?;
    writeln!(out, "Failed: {}", failed_tests.to_string().red())?;
    let success_rate = ratio(passed_tests, total_tests) * 100.0;
    writeln!(out, "Success rate: {success_rate:.1}%")?;
    writeln!(out, "Total time: {total_duration:?}")?;
    writeln!(out)?;

    for result in results {
        let status = if result.passed {
            "✅ PASS".green()
        } else {
            "❌ FAIL".red()
        };

        writeln!(
            out,
            "{} {} (seed {})",
            status,
            result.scenario_name.bold(),
            result.seed_label
        )?;
        writeln!(
            out,
            "   Iterations: {}/{} successful",
            result.successful_iterations, result.iterations_run
        )?;
        writeln!(out, "   Average time: {:?}", result.average_duration)?;

        if !result.failures.is_empty() {
            writeln!(out, "   Failures:")?;
            for failure in &result.failures {
                writeln!(out, "     • {}", failure.red())?;
            }
        }
        writeln!(out)?;
    }

    if let Some(audit) = audit {
        writeln!(out, "{}", "🗺️  Graph Audit".bright_blue().bold())?;
        writeln!(out, "{}", "==============".blue())?;
        writeln!(out, "Nodes: {}", audit.nodes)?;
        writeln!(out, "Fingerprint: {:016x}", audit.fingerprint)?;
        writeln!(out, "Dangling destinations: {}", audit.dangling.len())?;
        writeln!(out, "Unreachable nodes: {}", audit.unreachable.len())?;
        writeln!(out)?;
    }

    if !aggregates.is_empty() {
        writeln!(out, "{}", "🎯 Outcome Summary".bright_magenta().bold())?;
        writeln!(out, "{}", "==================".magenta())?;
        for aggregate in aggregates {
            writeln!(
                out,
                "{:15} runs {:4} | won {:5.1}% lost {:5.1}% stalled {:5.1}% | steps {:.1}±{:.1} (max {})",
                aggregate.strategy.label(),
                aggregate.iterations,
                aggregate.win_pct * 100.0,
                aggregate.loss_pct * 100.0,
                aggregate.stall_pct * 100.0,
                aggregate.mean_steps,
                aggregate.std_steps,
                aggregate.max_steps
            )?;
            let endings = aggregate
                .terminals
                .iter()
                .map(|(terminal, count)| format!("{terminal}×{count}"))
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(out, "{:15} endings: {endings}", "")?;
        }
        writeln!(out)?;
    }

    if let (Some(fastest), Some(slowest)) = (
        results.iter().min_by_key(|r| r.average_duration),
        results.iter().max_by_key(|r| r.average_duration),
    ) {
        writeln!(out, "{}", "⚡ Performance Summary".bright_yellow().bold())?;
        writeln!(out, "{}", "=====================".yellow())?;
        writeln!(
            out,
            "Fastest: {} ({:?})",
            fastest.scenario_name.green(),
            fastest.average_duration
        )?;
        writeln!(
            out,
            "Slowest: {} ({:?})",
            slowest.scenario_name.yellow(),
            slowest.average_duration
        )?;
    }
    Ok(())
}

pub fn generate_json_report(out: &mut dyn Write, results: &[ScenarioResult]) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, results)?;
    writeln!(out)?;
    Ok(())
}

pub fn generate_markdown_report(out: &mut dyn Write, results: &[ScenarioResult]) -> Result<()> {
    writeln!(out, "# Pipeline Logic Test Results\n")?;
    writeln!(
        out,
        "_Generated {}_\n",
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    )?;

    let total_tests = results.len();
    let passed_tests = results.iter().filter(|r| r.passed).count();

    writeln!(out, "## Summary\n")?;
    writeln!(out, "- **Total scenarios**: {total_tests}")?;
    writeln!(out, "- **Passed**: {passed_tests}")?;
    writeln!(out, "- **Failed**: {}", total_tests - passed_tests)?;
    let success_rate = ratio(passed_tests, total_tests) * 100.0;
    writeln!(out, "- **Success rate**: {success_rate:.1}%\n")?;

    writeln!(out, "## Detailed Results\n")?;
    for result in results {
        let status = if result.passed { "✅" } else { "❌" };
        writeln!(
            out,
            "### {} {} (seed {})\n",
            status, result.scenario_name, result.seed_label
        )?;
        writeln!(
            out,
            "- **Iterations**: {}/{} successful",
            result.successful_iterations, result.iterations_run
        )?;
        writeln!(out, "- **Average time**: {:?}", result.average_duration)?;
        if !result.failures.is_empty() {
            writeln!(out, "- **Failures**:")?;
            for failure in &result.failures {
                writeln!(out, "  - {failure}")?;
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

pub fn generate_csv_report(out: &mut dyn Write, records: &[PlayabilityRecord]) -> Result<()> {
    writeln!(
        out,
        "seed,strategy,outcome,steps,terminal,history_len,visible_traits,hook_draws"
    )?;
    for record in records {
        writeln!(
            out,
            "{},{},{},{},{},{},{},{}",
            csv_field(&record.seed_label),
            record.strategy.label(),
            record.outcome.label(),
            record.steps,
            csv_field(&record.terminal),
            record.history_len,
            record.visible_traits,
            record.hook_draws
        )?;
    }
    Ok(())
}

fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::playthrough::PlayStrategy;
    use pipeline_game::Outcome;
    use std::collections::BTreeMap;

    fn result(passed: bool) -> ScenarioResult {
        ScenarioResult {
            scenario_name: "smoke".to_string(),
            seed: 1337,
            seed_label: "1337".to_string(),
            passed,
            iterations_run: 2,
            successful_iterations: usize::from(passed) * 2,
            failures: if passed {
                Vec::new()
            } else {
                vec!["Iteration 1: broke".to_string()]
            },
            average_duration: Duration::from_millis(2),
            performance_data: vec![Duration::from_millis(2)],
        }
    }

    fn aggregate() -> PlayabilityAggregate {
        PlayabilityAggregate {
            strategy: PlayStrategy::Random,
            iterations: 4,
            win_pct: 0.25,
            loss_pct: 0.75,
            stall_pct: 0.0,
            mean_steps: 11.5,
            std_steps: 1.2,
            max_steps: 13,
            mean_hook_draws: 3.0,
            terminals: BTreeMap::from([("grad_school".to_string(), 1), ("industry".to_string(), 3)]),
        }
    }

    fn render<F>(write: F) -> String
    where
        F: FnOnce(&mut dyn Write) -> Result<()>,
    {
        let mut buffer = Vec::new();
        write(&mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn console_report_lists_outcomes_and_failures() {
        colored::control::set_override(false);
        let text = render(|out| {
            generate_console_report(
                out,
                &[result(true), result(false)],
                &[aggregate()],
                None,
                Duration::from_secs(1),
            )
        });
        assert!(text.contains("Success rate: 50.0%"));
        assert!(text.contains("Outcome Summary"));
        assert!(text.contains("industry×3"));
        assert!(text.contains("• Iteration 1: broke"));
        assert!(text.contains("Performance Summary"));
    }

    #[test]
    fn markdown_report_has_header_and_sections() {
        let text = render(|out| generate_markdown_report(out, &[result(false)]));
        assert!(text.starts_with("# Pipeline Logic Test Results"));
        assert!(text.contains("_Generated "));
        assert!(text.contains("### ❌ smoke (seed 1337)"));
        assert!(text.contains("  - Iteration 1: broke"));
    }

    #[test]
    fn json_report_is_an_array() {
        let text = render(|out| generate_json_report(out, &[result(true)]));
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value[0]["scenario_name"], "smoke");
    }

    #[test]
    fn csv_report_quotes_phrase_labels() {
        let record = PlayabilityRecord {
            strategy: PlayStrategy::FirstEligible,
            seed_label: "grad, school".to_string(),
            seed_value: 9,
            outcome: Outcome::Won,
            steps: 12,
            terminal: "grad_school".to_string(),
            history_len: 5,
            visible_traits: 3,
            hook_draws: 2,
            failed_commits: 0,
        };
        let text = render(|out| generate_csv_report(out, &[record]));
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("seed,strategy,outcome,steps,terminal,history_len,visible_traits,hook_draws")
        );
        assert_eq!(
            lines.next(),
            Some("\"grad, school\",first-eligible,won,12,grad_school,5,3,2")
        );
    }
}
