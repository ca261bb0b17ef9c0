//! Nuri-Harvest main entry point
//!
//! This is the command-line interface for the bid-announcement harvester.

use anyhow::Context;
use clap::Parser;
use nuri_harvest::config::{load_config_with_hash, Config};
use nuri_harvest::output::{
    export_all, generate_markdown_summary, load_statistics, print_statistics, RunSummary,
};
use nuri_harvest::state::RunStats;
use nuri_harvest::storage::load_snapshot;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Nuri-Harvest: a resumable bid-announcement harvester
///
/// Drives a browser through the procurement portal's announcement list,
/// extracts every detail page, and skips announcements collected by earlier
/// runs.
#[derive(Parser, Debug)]
#[command(name = "nuri-harvest")]
#[command(version)]
#[command(about = "A resumable bid-announcement harvester", long_about = None)]
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

    /// Ignore the existing visited set and collect everything again
    #[arg(long)]
    fresh: bool,

    /// Validate config and print the resolved settings without crawling
    #[arg(long, conflicts_with_all = ["stats", "export"])]
    dry_run: bool,

    /// Show statistics from the snapshot and visited set and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export"])]
    stats: bool,

    /// Regenerate CSV and workbook exports from the snapshot and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    export: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.export {
        handle_export(&config)?;
    } else {
        handle_harvest(config, &config_hash, cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("nuri_harvest=info,warn"),
            1 => EnvFilter::new("nuri_harvest=debug,info"),
            2 => EnvFilter::new("nuri_harvest=trace,debug"),
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

/// Handles the --dry-run mode: prints the resolved configuration
fn handle_dry_run(config: &Config) {
    println!("=== Nuri-Harvest Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Entry URL: {}", config.crawler.entry_url);
    match config.crawler.target_count {
        Some(target) => println!("  Target count: {}", target),
        None => println!("  Target count: unlimited"),
    }
    println!("  Duplicate ceiling: {}", config.crawler.max_duplicates);
    println!("  Row delay: {}ms", config.crawler.row_delay_ms);
    println!(
        "  Retries: {} (base delay {}ms)",
        config.crawler.max_retries, config.crawler.retry_delay_ms
    );
    println!(
        "  Pagination passes: {}",
        config.crawler.pagination_attempts
    );
    if let Some(minutes) = config.crawler.max_run_minutes {
        println!("  Run budget: {} minutes", minutes);
    }

    println!("\nBrowser:");
    println!("  Headless: {}", config.browser.headless);
    println!(
        "  Window: {}x{}",
        config.browser.window_width, config.browser.window_height
    );
    println!("  Locale: {}", config.browser.locale);

    println!("\nMenu Path ({} steps):", config.site.menu_path.len());
    for step in &config.site.menu_path {
        println!("  - {} ({})", step.text, step.selector);
    }

    println!("\nOutput:");
    println!("  Visited set: {}", config.output.state_path);
    println!("  Snapshot: {}", config.output.snapshot_path);
    println!("  CSV: {}", config.output.csv_path);
    println!("  Workbook: {}", config.output.workbook_path);
    println!("  Summary: {}", config.output.summary_path);

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: cross-checks the snapshot against the visited set
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Snapshot: {}", config.output.snapshot_path);
    println!("Visited set: {}\n", config.output.state_path);

    let stats = load_statistics(
        Path::new(&config.output.snapshot_path),
        Path::new(&config.output.state_path),
    )?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --export mode: rewrites the exports from the snapshot
fn handle_export(config: &Config) -> anyhow::Result<()> {
    println!("=== Exporting Results ===\n");
    println!("Snapshot: {}", config.output.snapshot_path);

    let results = load_snapshot(Path::new(&config.output.snapshot_path))
        .with_context(|| format!("failed to read snapshot {}", config.output.snapshot_path))?;

    let written = export_all(&config.output, &results)?;
    for path in &written {
        println!("✓ Wrote {}", path.display());
    }

    Ok(())
}

/// Moves a previous run's snapshot aside so the new run does not overwrite it
#[cfg_attr(not(feature = "chrome"), allow(dead_code))]
fn rotate_snapshot(snapshot_path: &Path) -> anyhow::Result<()> {
    if !snapshot_path.exists() {
        return Ok(());
    }
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S");
    let mut rotated = snapshot_path.as_os_str().to_owned();
    rotated.push(format!(".{}.bak", stamp));
    std::fs::rename(snapshot_path, &rotated)
        .with_context(|| format!("failed to rotate snapshot {}", snapshot_path.display()))?;
    tracing::info!(
        "Previous snapshot kept at {}",
        PathBuf::from(rotated).display()
    );
    Ok(())
}

/// Handles the main harvest operation
#[cfg(feature = "chrome")]
async fn handle_harvest(config: Config, config_hash: &str, fresh: bool) -> anyhow::Result<()> {
    use nuri_harvest::browser::ChromeDriver;
    use nuri_harvest::storage::JsonVisitedStore;
    use nuri_harvest::Orchestrator;

    if fresh {
        tracing::info!("Starting fresh harvest (ignoring previous visited set)");
    } else {
        tracing::info!("Starting harvest (announcements collected earlier are skipped)");
    }

    rotate_snapshot(Path::new(&config.output.snapshot_path))?;

    let visited = if fresh {
        JsonVisitedStore::fresh(&config.output.state_path)
    } else {
        JsonVisitedStore::new(&config.output.state_path)
    };

    let driver = ChromeDriver::launch(&config.browser)
        .await
        .context("failed to launch browser")?;
    let output = config.output.clone();

    let mut orchestrator = Orchestrator::new(driver, config, visited)?;
    let results = orchestrator.run().await;
    let stats = orchestrator.stats().clone();

    if let Err(e) = orchestrator.into_driver().close().await {
        tracing::warn!("Browser did not close cleanly: {}", e);
    }

    write_reports(&output, &results, &stats, config_hash)
}

#[cfg(not(feature = "chrome"))]
async fn handle_harvest(_config: Config, _config_hash: &str, _fresh: bool) -> anyhow::Result<()> {
    anyhow::bail!("this build has no browser driver; rebuild with the `chrome` feature")
}

/// Writes exports and the run summary once the run has ended
#[cfg_attr(not(feature = "chrome"), allow(dead_code))]
fn write_reports(
    output: &nuri_harvest::config::OutputConfig,
    results: &nuri_harvest::ResultCollection,
    stats: &RunStats,
    config_hash: &str,
) -> anyhow::Result<()> {
    let export_result = export_all(output, results);

    let summary = RunSummary::from_stats(stats, results, config_hash);
    generate_markdown_summary(&summary, Path::new(&output.summary_path))
        .with_context(|| format!("failed to write summary {}", output.summary_path))?;
    tracing::info!("Summary written to {}", output.summary_path);

    export_result?;

    match &stats.terminal_error {
        Some(e) => {
            tracing::error!("Harvest ended early: {}", e);
            anyhow::bail!("harvest failed: {}", e)
        }
        None => {
            tracing::info!("Harvest completed with {} new records", results.len());
            Ok(())
        }
    }
}
