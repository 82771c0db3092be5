mod credentials;
mod file_store;
mod reports;
mod util;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use log::info;
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::{Path, PathBuf};

use credentials::Credentials;
use file_store::FileStore;
use puttboard_engine::config::{EngineConfig, RunFilters};
use puttboard_engine::gate::{RunMode, guard};
use puttboard_engine::jobs::{run_event_scoring, run_reconcile};
use reports::{
    RunPreamble, preamble_line, write_json, write_preamble, write_reconcile_console,
    write_scoring_console,
};
use util::split_all;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Colored human-readable summary
    Console,
    /// Machine-readable JSON document
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "puttboard", version)]
#[command(about = "Leaderboard reconciliation and ranked-event scoring for putting leagues")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Rebuild leaderboard entries from raw sessions
    Reconcile {
        #[command(flatten)]
        common: CommonArgs,

        /// Game types to reconcile (repeatable or comma-separated, at most 10)
        #[arg(long = "game-type")]
        game_type: Vec<String>,
    },
    /// Score ranked events and update season totals
    ScoreEvents {
        #[command(flatten)]
        common: CommonArgs,

        /// Event ids to score (repeatable or comma-separated)
        #[arg(long = "event-id")]
        event_id: Vec<String>,

        /// Season ids to score (repeatable or comma-separated)
        #[arg(long = "season-id")]
        season_id: Vec<String>,

        /// Replace every event's bonus step with this value
        #[arg(long)]
        bonus_step: Option<f64>,
    },
}

#[derive(Debug, Clone, ClapArgs)]
struct CommonArgs {
    /// Write changes (default is a dry run)
    #[arg(long)]
    apply: bool,

    /// Confirm an --apply run
    #[arg(long)]
    confirm: bool,

    /// Expected target project; must match the credentials
    #[arg(long)]
    project: Option<String>,

    /// Credentials file (falls back to PUTTBOARD_CREDENTIALS)
    #[arg(long)]
    credentials: Option<PathBuf>,

    /// Engine config JSON file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output report format
    #[arg(long, value_enum, default_value_t = ReportFormat::Console)]
    report: ReportFormat,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Command {
    const fn common(&self) -> &CommonArgs {
        match self {
            Self::Reconcile { common, .. } | Self::ScoreEvents { common, .. } => common,
        }
    }

    const fn job_name(&self) -> &'static str {
        match self {
            Self::Reconcile { .. } => "reconcile",
            Self::ScoreEvents { .. } => "score-events",
        }
    }

    fn filters(&self) -> Result<RunFilters> {
        let filters = match self {
            Self::Reconcile { game_type, .. } => RunFilters::new(&split_all(game_type), &[], &[]),
            Self::ScoreEvents {
                event_id,
                season_id,
                ..
            } => RunFilters::new(&[], &split_all(event_id), &split_all(season_id)),
        };
        Ok(filters?)
    }

    const fn bonus_step(&self) -> Option<f64> {
        match self {
            Self::ScoreEvents { bonus_step, .. } => *bonus_step,
            Self::Reconcile { .. } => None,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();
    init_logging(args.command.common().verbose);

    if let Err(err) = run(&args).await {
        eprintln!("{} {err:#}", "❌ puttboard failed:".red().bold());
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .try_init();
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    EngineConfig::from_json(&raw).with_context(|| format!("invalid config {}", path.display()))
}

async fn run(args: &Args) -> Result<()> {
    let command = &args.command;
    let common = command.common();

    // Everything that can refuse the run happens before the store is opened.
    let mode = RunMode::from_flags(common.apply, common.confirm)?;
    let credentials = Credentials::resolve(common.credentials.as_deref())?;
    let mode = guard(mode, common.project.as_deref(), &credentials.project_id)?;
    let config = load_config(common.config.as_deref())?;
    let filters = command.filters()?;
    config.scoring_params(command.bonus_step())?;

    let preamble = RunPreamble {
        job: command.job_name(),
        mode,
        target: &credentials.project_id,
        target_verified: common.project.is_some(),
        filters: &filters,
        bonus_step: command.bonus_step(),
    };
    let mut output_target = OutputTarget::new(common.output.clone())?;
    match common.report {
        ReportFormat::Console => {
            write_preamble(&mut output_target, &preamble)?;
            output_target.flush_inner()?;
        }
        // The JSON document is only written at the end; log what was asked for now.
        ReportFormat::Json => info!("{}", preamble_line(&preamble)),
    }

    let store = FileStore::open(&credentials.data_path)
        .await
        .with_context(|| format!("failed to open {}", credentials.data_path.display()))?;
    let now = Utc::now();

    match command {
        Command::Reconcile { .. } => {
            let report = run_reconcile(&store, &config, &filters, mode, now).await?;
            match common.report {
                ReportFormat::Console => write_reconcile_console(&mut output_target, &report)?,
                ReportFormat::Json => write_json(&mut output_target, &preamble, &report)?,
            }
        }
        Command::ScoreEvents { bonus_step, .. } => {
            let report =
                run_event_scoring(&store, &config, &filters, *bonus_step, mode, now).await?;
            match common.report {
                ReportFormat::Console => write_scoring_console(&mut output_target, &report)?,
                ReportFormat::Json => write_json(&mut output_target, &preamble, &report)?,
            }
        }
    }
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
