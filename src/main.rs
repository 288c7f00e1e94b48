//! mail-scout command line interface.

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use mail_scout_core::{ConfigBuilder, FindRow, MailScout, VerifyRow};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "mail-scout",
    version,
    about = "Discover and verify email addresses without ever sending mail"
)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, short = 'c', global = true, env = "MAIL_SCOUT_CONFIG")]
    config: Option<PathBuf>,

    /// Maximum concurrent rows in bulk operations.
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Disable the per-domain catch-all probe.
    #[arg(long, global = true)]
    no_catch_all: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Discover the most likely addresses for one contact.
    Find {
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        domain: String,
    },
    /// Verify one email address.
    Verify {
        address: String,
    },
    /// Discover addresses for every row in a JSON-lines file
    /// ({"first_name":..,"last_name":..,"domain":..} per line).
    BulkFind {
        input: PathBuf,
    },
    /// Verify every row in a JSON-lines file ({"email":..} per line).
    BulkVerify {
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut builder = ConfigBuilder::new();
    if let Some(path) = &cli.config {
        builder = builder
            .with_file(path)
            .with_context(|| format!("failed to load config file {}", path.display()))?;
    }
    if let Some(limit) = cli.concurrency {
        builder = builder.max_concurrency(limit);
    }
    if cli.no_catch_all {
        builder = builder.enable_catch_all_check(false);
    }
    let config = builder.build().context("invalid configuration")?;
    tracing::debug!("Effective configuration: {:?}", config);

    let scout = MailScout::new(config).context("failed to initialize engine")?;

    match cli.command {
        Command::Find {
            first_name,
            last_name,
            domain,
        } => {
            let found = scout.find_email(&first_name, &last_name, &domain).await?;
            print_json(&found)?;
        }
        Command::Verify { address } => {
            let result = scout.verify_email(&address).await?;
            print_json(&result)?;
        }
        Command::BulkFind { input } => {
            let rows: Vec<FindRow> = read_rows(&input)?;
            let bar = spinner(rows.len());
            let outcomes = scout.bulk_find(rows).await;
            bar.finish_and_clear();
            print_json(&outcomes)?;
        }
        Command::BulkVerify { input } => {
            let rows: Vec<VerifyRow> = read_rows(&input)?;
            let bar = spinner(rows.len());
            let outcomes = scout.bulk_verify(rows).await;
            bar.finish_and_clear();
            print_json(&outcomes)?;
        }
    }

    Ok(())
}

/// Reads one JSON object per non-empty line.
fn read_rows<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open input file {}", path.display()))?;
    let reader = std::io::BufReader::new(file);
    let mut rows = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let row: T = serde_json::from_str(trimmed)
            .with_context(|| format!("invalid row on line {}", line_no + 1))?;
        rows.push(row);
    }
    if rows.is_empty() {
        anyhow::bail!("input file {} contains no rows", path.display());
    }
    Ok(rows)
}

fn spinner(rows: usize) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(format!("processing {rows} rows"));
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
