use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use cmdreport::{
    CommandEntry, CommandId, CommandRecord, CommandReport, DisposalScope,
    InMemoryCommandClient, RecordView, ReportConfig, ReportError,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

/// Used when `RUST_LOG` is unset or unparsable: soft failures stay visible.
const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Parser)]
#[command(name = "cmdreport")]
#[command(about = "Follow the merged history of one command")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a scenario file through an in-memory command history source
    Replay {
        #[arg(long)]
        scenario: PathBuf,
        #[arg(long)]
        command: String,
        /// Report settings, e.g. "filter=transport,backfill=false"
        #[arg(long, default_value = "")]
        settings: String,
        #[arg(long, default_value_t = 2000)]
        timeout_ms: u64,
        /// Print acknowledgment stages after the record
        #[arg(long)]
        acks: bool,
    },
}

/// Scenario file contents.
struct Scenario {
    history: Vec<CommandEntry>,
    live: Vec<CommandEntry>,
    fail_open: Option<String>,
    fail_fetch: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = log_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref());
    tracing::subscriber::set_global_default(log_subscriber(filter, std::io::stderr))
        .context("Failed to install the log subscriber")?;

    let cli = Cli::parse();

    match cli.command {
        Command::Replay {
            scenario,
            command,
            settings,
            timeout_ms,
            acks,
        } => replay(&scenario, &command, &settings, timeout_ms, acks).await,
    }
}

fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Logs go to `writer` (stderr in the binary) so stdout stays pure JSON.
fn log_subscriber<W>(filter: EnvFilter, writer: W) -> impl tracing::Subscriber + Send + Sync
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .finish()
}

fn load_scenario(path: &Path) -> Result<Scenario> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario '{}'", path.display()))?;
    let doc: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("Scenario '{}' is not valid JSON", path.display()))?;

    let entries = |key: &str| -> Result<Vec<CommandEntry>> {
        match doc.get(key) {
            None => Ok(Vec::new()),
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .map(|item| {
                    CommandEntry::from_json(item)
                        .with_context(|| format!("Invalid entry in '{}'", key))
                })
                .collect(),
            Some(_) => Err(anyhow!("'{}' must be an array of entries", key)),
        }
    };
    let text = |key: &str| doc.get(key).and_then(|v| v.as_str()).map(str::to_string);

    Ok(Scenario {
        history: entries("history")?,
        live: entries("live")?,
        fail_open: text("fail_open"),
        fail_fetch: text("fail_fetch"),
    })
}

async fn replay(
    path: &Path,
    command: &str,
    settings: &str,
    timeout_ms: u64,
    show_acks: bool,
) -> Result<()> {
    let scenario = load_scenario(path)?;
    let config = ReportConfig::parse(settings).context("Invalid --settings")?;
    let record =
        run_scenario(scenario, command, config, Duration::from_millis(timeout_ms)).await?;

    match &record {
        Some(record) => {
            println!("{}", serde_json::to_string_pretty(&record.to_json())?);
            if show_acks {
                print_acknowledgments(record);
            }
        }
        None => println!("null"),
    }
    Ok(())
}

/// Drives one report through `scenario` and returns the record it settled on.
async fn run_scenario(
    scenario: Scenario,
    command: &str,
    config: ReportConfig,
    wait: Duration,
) -> Result<RecordView> {
    let target = CommandId::new(command).context("Invalid --command")?;

    let client = Arc::new(InMemoryCommandClient::new().with_command_filter());
    let in_history = scenario
        .history
        .iter()
        .any(|entry| entry.command_id() == &target);
    for entry in scenario.history {
        client.record_history(entry);
    }
    if let Some(reason) = &scenario.fail_open {
        client.fail_open(ReportError::StreamOpen(reason.clone()));
    }
    if let Some(reason) = &scenario.fail_fetch {
        client.fail_fetch(ReportError::Transport(reason.clone()));
    }

    let scope = DisposalScope::new();
    let report = CommandReport::spawn(Arc::clone(&client), command, &scope, config.clone())?;
    report
        .ready()
        .await
        .with_context(|| format!("Could not follow command '{}'", target))?;

    let live_for_target = scenario
        .live
        .iter()
        .filter(|entry| entry.command_id() == &target)
        .count() as u64;
    for entry in scenario.live {
        client.emit(entry);
    }

    let backfilled = config.backfill && in_history && scenario.fail_fetch.is_none();
    let expected = live_for_target + u64::from(backfilled);

    let mut records = report.records();
    let record = if expected == 0 {
        records.current()
    } else {
        tokio::time::timeout(
            wait,
            records.wait_for(|record| record.merge_count() >= expected),
        )
        .await
        .map_err(|_| anyhow!("Timed out waiting for {} merged entries", expected))?
    };

    report.shutdown().await?;
    Ok(record)
}

fn print_acknowledgments(record: &CommandRecord) {
    let stages = record.acknowledgments().into_iter().chain(record.completion());
    for ack in stages {
        let time = ack
            .time
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        let message = ack.message.unwrap_or_default();
        println!("{:<28} {:<10} {:<32} {}", ack.name, ack.status, time, message);
    }
}
