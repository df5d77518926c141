mod browser;
mod clock;
mod config;
mod discovery;
mod error;
mod odds;
mod poller;
mod schedule;
mod scheduler;
mod store;
mod types;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::browser::WebDriverProvider;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::discovery::{Discovery, DiscoveryWorker};
use crate::error::{AppError, Result};
use crate::odds::extract_totals;
use crate::poller::PollingWorker;
use crate::scheduler::{ProcessLauncher, SchedulingOrchestrator};
use crate::store::{MatchRegistry, SnapshotWriter};
use crate::types::{parse_ts, PollJob};

#[derive(Parser)]
#[command(name = "totals-tracker")]
#[command(about = "Discovers basketball matches and records quarter totals odds while they are live")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover and schedule every cycle, indefinitely
    Run,
    /// Run a single discovery pass
    Discover,
    /// Schedule pending matches from the registry once, without discovery
    Schedule,
    /// Poll one match between two timestamps (reference frame, YYYY-MM-DD HH:MM:SS)
    Poll {
        #[arg(long)]
        url: String,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
    },
    /// Run the totals extractor over a text dump (blocks separated by `---` lines)
    Extract {
        #[arg(long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = dispatch(cli.command, cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn dispatch(command: Commands, cfg: Config) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(cfg.reference_offset));
    let registry = MatchRegistry::new(cfg.matches_path());

    match command {
        Commands::Run => {
            let orchestrator = orchestrator(&cfg, registry, clock)?;
            info!("Start");
            orchestrator.run().await;
            Ok(())
        }
        Commands::Discover => {
            let provider = WebDriverProvider::new(&cfg.webdriver_url, cfg.headless)?;
            DiscoveryWorker::new(&cfg, provider, registry, clock)
                .run_pass()
                .await?;
            Ok(())
        }
        Commands::Schedule => {
            let report = orchestrator(&cfg, registry, clock)?.schedule_pending()?;
            info!(
                loaded = report.loaded,
                scheduled = report.scheduled,
                skipped = report.skipped_unparseable,
                failed = report.launch_failures,
                persisted = report.persisted,
                "Scheduling pass complete",
            );
            Ok(())
        }
        Commands::Poll { url, start, end } => {
            let job = PollJob {
                start: parse_arg_ts("--start", &start)?,
                end: parse_arg_ts("--end", &end)?,
                url,
            };
            let provider = WebDriverProvider::new(&cfg.webdriver_url, cfg.headless)?;
            let writer = SnapshotWriter::for_match(&cfg.data_dir, &job.url);
            PollingWorker::new(
                job,
                provider,
                writer,
                clock,
                cfg.selectors.clone(),
                cfg.timing.clone(),
            )
            .run()
            .await;
            Ok(())
        }
        Commands::Extract { file } => {
            let dump = std::fs::read_to_string(&file)?;
            let blocks = split_dump(&dump);
            let outcome = extract_totals(&blocks);
            println!("quarter: {}", outcome.quarter());
            println!("totals:  {}", outcome.totals());
            Ok(())
        }
    }
}

fn orchestrator(
    cfg: &Config,
    registry: MatchRegistry,
    clock: Arc<dyn Clock>,
) -> Result<SchedulingOrchestrator<DiscoveryWorker<WebDriverProvider>, ProcessLauncher>> {
    let provider = WebDriverProvider::new(&cfg.webdriver_url, cfg.headless)?;
    let discovery = DiscoveryWorker::new(cfg, provider, registry.clone(), Arc::clone(&clock));
    let launcher = ProcessLauncher::from_config(cfg.worker_program.clone(), Arc::clone(&clock))?;
    Ok(SchedulingOrchestrator::new(
        discovery,
        launcher,
        registry,
        cfg.timing.clone(),
        clock,
    ))
}

fn parse_arg_ts(flag: &str, raw: &str) -> Result<chrono::NaiveDateTime> {
    parse_ts(raw).ok_or_else(|| {
        AppError::ParseFailure(format!("{flag} expects YYYY-MM-DD HH:MM:SS, got {raw:?}"))
    })
}

fn split_dump(dump: &str) -> Vec<String> {
    let mut blocks = vec![String::new()];
    for line in dump.lines() {
        if line.trim() == "---" {
            blocks.push(String::new());
        } else if let Some(current) = blocks.last_mut() {
            current.push_str(line);
            current.push('\n');
        }
    }
    blocks
}
