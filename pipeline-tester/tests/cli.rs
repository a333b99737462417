use std::io::Write;
use std::process::{Command, Stdio};

fn temp_path(label: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!(
        "pipeline-cli-{label}-{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    ))
}

#[test]
fn cli_list_scenarios_writes_output() {
    let exe = env!("CARGO_BIN_EXE_pipeline-tester");
    let output_path = temp_path("list");
    let status = Command::new(exe)
        .args(["--list-scenarios", "--output"])
        .arg(&output_path)
        .status()
        .expect("run cli");
    assert!(status.success());
    let content = std::fs::read_to_string(output_path).expect("read output");
    assert!(content.contains("Available scenarios"));
    assert!(content.contains("reset-cancels-transition"));
}

#[test]
fn cli_runs_all_scenarios_with_json_report() {
    let exe = env!("CARGO_BIN_EXE_pipeline-tester");
    let output_path = temp_path("run");
    let output = Command::new(exe)
        .args([
            "--report",
            "json",
            "--scenarios",
            "all",
            "--iterations",
            "2",
            "--seeds",
            "1,phrase:tenure track",
            "--output",
        ])
        .arg(&output_path)
        .output()
        .expect("run cli");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Pipeline Automated Tester"));

    let content = std::fs::read_to_string(output_path).expect("read output");
    let json_end = content.rfind(']').expect("json array");
    let results: serde_json::Value =
        serde_json::from_str(&content[..=json_end]).expect("valid json");
    let results = results.as_array().expect("array of results");
    assert_eq!(results.len(), 7 * 2);
    assert!(results.iter().all(|r| r["passed"] == true));
    assert!(results.iter().any(|r| r["seed_label"] == "tenure track"));
}

#[test]
fn cli_csv_report_lists_every_strategy() {
    let exe = env!("CARGO_BIN_EXE_pipeline-tester");
    let output_path = temp_path("csv");
    let status = Command::new(exe)
        .args(["--report", "csv", "--iterations", "1", "--seeds", "range:10..12", "--output"])
        .arg(&output_path)
        .status()
        .expect("run cli");
    assert!(status.success());
    let content = std::fs::read_to_string(output_path).expect("read output");
    let rows: Vec<&str> = content.lines().filter(|l| l.starts_with("1")).collect();
    assert_eq!(rows.len(), 3 * 2);
    for strategy in ["first-eligible", "last-eligible", "random"] {
        assert!(content.contains(strategy), "missing {strategy}");
    }
}

#[test]
fn cli_rejects_bad_seed_tokens() {
    let exe = env!("CARGO_BIN_EXE_pipeline-tester");
    let output = Command::new(exe)
        .args(["--seeds", "not-a-seed", "--report", "json"])
        .output()
        .expect("run cli");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unrecognized seed token"));
}

#[test]
fn cli_play_mode_reads_commands_from_stdin() {
    let exe = env!("CARGO_BIN_EXE_pipeline-tester");
    let save_dir = temp_path("save");
    let mut child = Command::new(exe)
        .args(["--play", "--delay-ms", "0", "--save-dir"])
        .arg(&save_dir)
        .env("NO_COLOR", "1")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("spawn cli");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(b"1\n2\nq\n")
        .expect("write commands");
    let output = child.wait_with_output().expect("wait cli");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("== Childhood Income Level =="));
    assert!(stdout.contains("Gender: Female"));
    assert!(save_dir.join("panel.json").exists());
    std::fs::remove_dir_all(save_dir).expect("clean save dir");
}
