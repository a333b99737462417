//! Interactive terminal playthrough.
use anyhow::{Context, Result};
use colored::Colorize;
use pipeline_game::text::link_citations;
use pipeline_game::{
    EngineConfig, FileStore, KeyValueStore, MemoryStore, NodeGraph, NodeView, Outcome,
    ProgressionEngine, RecordingNotifier, ResetOutcome, SelectOutcome,
};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::Instant;

type PlayEngine<S> = ProgressionEngine<S, RecordingNotifier>;

/// Where the interactive session keeps its progress and how it is tuned.
#[derive(Debug, Clone, Default)]
pub struct PlayOptions {
    pub save_dir: Option<PathBuf>,
    pub config: EngineConfig,
    /// Emit OSC 8 hyperlinks for citations.
    pub hyperlinks: bool,
}

/// Build the engine config from an optional JSON file plus CLI overrides.
///
/// # Errors
///
/// Returns an error if the file cannot be read or holds an invalid config.
pub fn load_config(
    path: Option<&Path>,
    seed: Option<u64>,
    delay_ms: Option<u64>,
) -> Result<EngineConfig> {
    let mut config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            EngineConfig::from_json(&raw)
                .with_context(|| format!("invalid engine config in {}", path.display()))?
        }
        None => EngineConfig::default(),
    };
    if let Some(seed) = seed {
        config = config.with_seed(seed);
    }
    if let Some(delay_ms) = delay_ms {
        config = config.with_delay_ms(delay_ms);
    }
    config.validate()?;
    Ok(config)
}

/// Run a session on stdin/stdout-like streams until the player quits.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or the streams fail.
pub async fn play<R, W>(
    graph: Arc<NodeGraph>,
    options: &PlayOptions,
    input: R,
    out: &mut W,
) -> Result<()>
where
    R: BufRead,
    W: Write,
{
    if let Some(dir) = &options.save_dir {
        let store = FileStore::open(dir)
            .with_context(|| format!("failed to open save directory {}", dir.display()))?;
        let engine = open(graph, store, options.config)?;
        Session::new(engine, options.hyperlinks).run(input, out).await
    } else {
        let engine = open(graph, MemoryStore::new(), options.config)?;
        Session::new(engine, options.hyperlinks).run(input, out).await
    }
}

fn open<S: KeyValueStore>(
    graph: Arc<NodeGraph>,
    store: S,
    config: EngineConfig,
) -> Result<PlayEngine<S>> {
    let engine = ProgressionEngine::open(graph, store, RecordingNotifier::new(), config)?;
    let report = engine.load_report();
    if report.wiped {
        log::info!("saved progress pointed at a missing node; starting over");
    }
    for key in &report.recovered {
        log::info!("recovered from a corrupt '{key}' entry");
    }
    Ok(engine)
}

enum Command {
    Choose(usize),
    Reset,
    History,
    Help,
    Quit,
    Unknown(String),
}

impl Command {
    fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        match trimmed.to_lowercase().as_str() {
            "q" | "quit" | "exit" => Self::Quit,
            "r" | "reset" | "restart" => Self::Reset,
            "h" | "history" => Self::History,
            "?" | "help" => Self::Help,
            other => other
                .parse::<usize>()
                .ok()
                .filter(|n| *n >= 1)
                .map_or_else(|| Self::Unknown(trimmed.to_string()), |n| Self::Choose(n - 1)),
        }
    }
}

struct Session<S> {
    engine: PlayEngine<S>,
    started: Instant,
    seen_notifications: usize,
    hyperlinks: bool,
}

impl<S: KeyValueStore> Session<S> {
    fn new(engine: PlayEngine<S>, hyperlinks: bool) -> Self {
        Self {
            engine,
            started: Instant::now(),
            seen_notifications: 0,
            hyperlinks,
        }
    }

    async fn run<R: BufRead, W: Write>(mut self, mut input: R, out: &mut W) -> Result<()> {
        let mut line = String::new();
        loop {
            self.render(out)?;
            write!(out, "{} ", ">".bright_cyan())?;
            out.flush()?;

            line.clear();
            if input.read_line(&mut line)? == 0 {
                writeln!(out)?;
                return Ok(());
            }
            match Command::parse(&line) {
                Command::Quit => return Ok(()),
                Command::Help => write_help(out)?,
                Command::History => self.write_history(out)?,
                Command::Reset => self.reset(out).await?,
                Command::Choose(index) => self.choose(index, out).await?,
                Command::Unknown(text) => {
                    writeln!(out, "Unrecognized command '{text}'. Type ? for help.")?;
                }
            }
        }
    }

    async fn choose<W: Write>(&mut self, index: usize, out: &mut W) -> Result<()> {
        match self.engine.select(index, self.started.elapsed()) {
            SelectOutcome::Scheduled { .. } => {
                self.engine.settle(self.started.elapsed()).await;
                self.flush_notifications(out)?;
            }
            SelectOutcome::Ineligible(reason) => {
                writeln!(out, "{} {reason}", "Unavailable:".yellow())?;
            }
            SelectOutcome::UnknownOption => {
                writeln!(out, "There is no option {}.", index + 1)?;
            }
            SelectOutcome::Busy => writeln!(out, "Please wait for the current transition.")?,
        }
        Ok(())
    }

    async fn reset<W: Write>(&mut self, out: &mut W) -> Result<()> {
        if let ResetOutcome::AlreadyPending = self.engine.reset(self.started.elapsed()) {
            return Ok(());
        }
        self.engine.settle(self.started.elapsed()).await;
        writeln!(out, "{}", "Progress cleared.".dimmed())?;
        Ok(())
    }

    fn flush_notifications<W: Write>(&mut self, out: &mut W) -> Result<()> {
        let messages = self.engine.notifier().messages();
        for message in messages.iter().skip(self.seen_notifications) {
            writeln!(out, "{} {message}", "⚠".red())?;
        }
        self.seen_notifications = messages.len();
        Ok(())
    }

    fn write_history<W: Write>(&self, out: &mut W) -> Result<()> {
        let history = self.engine.history();
        if history.is_empty() {
            writeln!(out, "No milestones yet.")?;
        }
        for (position, entry) in history.iter().enumerate() {
            writeln!(out, "  {}. {entry}", position + 1)?;
        }
        Ok(())
    }

    fn render<W: Write>(&self, out: &mut W) -> Result<()> {
        let view = self.engine.view();
        writeln!(out)?;
        writeln!(out, "{}", format!("== {} ==", view.name).bold())?;
        writeln!(out, "{}", self.body(&view))?;
        for (position, url) in view.citations.iter().enumerate() {
            writeln!(out, "  [{}] {}", position + 1, url.dimmed())?;
        }

        let traits = self.engine.visible_traits();
        if !traits.is_empty() {
            let row = traits
                .iter()
                .map(|entry| format!("{}: {}", entry.label(), entry.value))
                .collect::<Vec<_>>()
                .join(" | ");
            writeln!(out, "{}", row.cyan())?;
        }

        match self.engine.outcome() {
            Outcome::Won => writeln!(out, "{}", "🎓 You made it. (r to play again, q to quit)".green())?,
            Outcome::Lost => {
                writeln!(out, "{}", "You left the pipeline. (r to play again, q to quit)".red())?;
            }
            Outcome::Stalled => writeln!(out, "The story ends here. (r to restart, q to quit)")?,
            Outcome::InProgress => {
                for option in &view.options {
                    let label = format!("  {}) {}", option.index + 1, option.name);
                    match option.eligibility.reason() {
                        Some(reason) => {
                            writeln!(out, "{} {}", label.dimmed(), format!("({reason})").dimmed())?;
                        }
                        None => {
                            writeln!(out, "{label}")?;
                            if let Some(note) = &option.annotation {
                                writeln!(out, "     {}", note.italic())?;
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn body(&self, view: &NodeView) -> String {
        if !self.hyperlinks {
            return view.body.clone();
        }
        link_citations(&view.body, &view.citations, |n, url| {
            format!("\x1b]8;;{url}\x1b\\[{n}]\x1b]8;;\x1b\\")
        })
    }
}

fn write_help<W: Write>(out: &mut W) -> Result<()> {
    writeln!(out, "Commands:")?;
    writeln!(out, "  <number>  choose that option")?;
    writeln!(out, "  h         show your milestones")?;
    writeln!(out, "  r         start over")?;
    writeln!(out, "  q         quit (progress is kept when saving to disk)")?;
    Ok(())
}
