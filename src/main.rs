//! Sumi-Harvest main entry point
//!
//! This is the command-line interface for the Sumi-Harvest documentation
//! harvester.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use sumi_harvest::config::{load_config_with_hash, Config};
use sumi_harvest::crawler::{run_harvest, HarvestOptions};
use sumi_harvest::output::{load_statistics, print_ledger_statistics, print_statistics};
use sumi_harvest::{CancelToken, HarvestError, Ledger};
use tracing_subscriber::EnvFilter;

/// Sumi-Harvest: an incremental documentation harvester
///
/// Sumi-Harvest discovers the manifest behind each configured source
/// (llms.txt, sitemaps, mkdocs search indexes), fetches every listed page
/// with bounded concurrency and stores the pages that changed since the
/// previous run.
#[derive(Parser, Debug)]
#[command(name = "sumi-harvest")]
#[command(version)]
#[command(about = "An incremental documentation harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Start a fresh harvest, ignoring the existing ledger
    #[arg(long)]
    fresh: bool,

    /// Remove ledger entries for pages no source listed this run
    #[arg(long)]
    prune: bool,

    /// Validate config and show what would be harvested without fetching
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the ledger and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config).await?;
    } else {
        let options = HarvestOptions {
            fresh: cli.fresh,
            prune: cli.prune,
        };
        handle_harvest(config, options).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_harvest=info,warn"),
            1 => EnvFilter::new("sumi_harvest=debug,info"),
            2 => EnvFilter::new("sumi_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be harvested
fn handle_dry_run(config: &Config) {
    println!("=== Sumi-Harvest Dry Run ===\n");

    println!("Harvest Configuration:");
    println!("  Concurrency: {}", config.harvest.concurrency);
    match config.harvest.max_items {
        Some(limit) => println!("  Item limit: {}", limit),
        None => println!("  Item limit: none"),
    }
    println!("  Ledger: {}", config.harvest.ledger_path);
    println!("  Output directory: {}", config.harvest.output_dir);

    println!("\nFetching:");
    println!("  User agent: {}", config.fetch.user_agent);
    println!("  Timeout: {}s", config.fetch.timeout_secs);
    println!(
        "  Retries: {} attempts, {}ms initial delay, {}ms cap",
        config.retry.max_attempts, config.retry.initial_delay_ms, config.retry.max_delay_ms
    );

    println!("\nSources ({}):", config.sources.len());
    for source in &config.sources {
        match source.kind {
            Some(kind) => println!("  - {} ({} manifest)", source.url, kind),
            None => println!("  - {} (discover)", source.url),
        }
        for pattern in &source.allowed_domains {
            println!("    * {}", pattern);
        }
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would harvest {} sources", config.sources.len());
}

/// Handles the --stats mode: shows statistics from the ledger
async fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Ledger: {}\n", config.harvest.ledger_path);

    let ledger = Ledger::open(&config.harvest.ledger_path, &CancelToken::new()).await?;
    print_ledger_statistics(&load_statistics(&ledger));

    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(config: Config, options: HarvestOptions) -> anyhow::Result<()> {
    tracing::info!("Sources: {}", config.sources.len());

    let cancel = CancelToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight work");
            signal_token.cancel();
        }
    });

    match run_harvest(config, options, &cancel).await {
        Ok(stats) => {
            print_statistics(&stats);
            if stats.sources_resolved == 0 && stats.sources_failed > 0 {
                bail!("no source could be harvested");
            }
            Ok(())
        }
        Err(HarvestError::Cancelled) => {
            tracing::warn!("Harvest interrupted; ledger saved");
            bail!("harvest cancelled")
        }
        Err(e) => {
            tracing::error!("Harvest failed: {}", e);
            Err(e.into())
        }
    }
}
