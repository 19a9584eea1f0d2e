//! pagewalk main entry point
//!
//! This is the command-line interface for the pagewalk crawl engine. Results
//! go to stdout as JSON; logs go to stderr.

use anyhow::Context;
use clap::Parser;
use pagewalk::config::{apply_overrides, load_config_with_hash, validate, Config, ConfigOverrides};
use pagewalk::output::{stream_events, write_error, write_report, CrawlReport, NdjsonWriter};
use pagewalk::{check_seed, CrawlController, CrawlRequest, PagewalkError, ProgressPublisher};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// pagewalk: crawl one site and extract its content
///
/// pagewalk visits every page reachable from the seed URL without leaving
/// the seed's origin, and extracts headings, paragraphs, list items and code
/// blocks from each page.
#[derive(Parser, Debug)]
#[command(name = "pagewalk")]
#[command(version)]
#[command(about = "A same-origin crawl engine", long_about = None)]
struct Cli {
    /// Seed URL to start crawling from
    #[arg(value_name = "URL")]
    url: String,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Stream progress events as newline-delimited JSON instead of a final report
    #[arg(long)]
    stream: bool,

    /// Validate config and seed without crawling
    #[arg(long, conflicts_with = "stream")]
    dry_run: bool,

    /// Maximum number of pages to visit
    #[arg(long, value_name = "N")]
    max_pages: Option<usize>,

    /// Maximum number of pages processed at once
    #[arg(long, value_name = "N")]
    max_concurrency: Option<usize>,

    /// Directory holding the persisted frontier stores
    #[arg(long, value_name = "DIR")]
    store_dir: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

const EXIT_FAILURE: u8 = 1;
const EXIT_INPUT_ERROR: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// Logs go to stderr so stdout carries only JSON.
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("pagewalk=info,warn"),
            1 => EnvFilter::new("pagewalk=debug,info"),
            2 => EnvFilter::new("pagewalk=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = load_effective_config(&cli)?;

    if cli.dry_run {
        return handle_dry_run(&config, &cli.url);
    }

    handle_crawl(config, CrawlRequest::new(cli.url), cli.stream).await
}

/// Loads the config file (if any), then applies command-line overrides
fn load_effective_config(cli: &Cli) -> anyhow::Result<Config> {
    let config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => {
            tracing::debug!("No configuration file given, using defaults");
            let config = Config::default();
            validate(&config).context("default configuration is invalid")?;
            config
        }
    };

    let overrides = ConfigOverrides {
        max_pages: cli.max_pages,
        max_concurrency: cli.max_concurrency,
        store_directory: cli.store_dir.clone(),
    };
    apply_overrides(config, &overrides).context("invalid command-line option")
}

/// Handles the --dry-run mode: validates the seed and shows what would be crawled
fn handle_dry_run(config: &Config, url: &str) -> anyhow::Result<ExitCode> {
    let seed = match check_seed(url, &config.scope.blocked_hosts) {
        Ok(seed) => seed,
        Err(e) => return report_error(&PagewalkError::from(e)),
    };

    println!("=== pagewalk Dry Run ===\n");
    println!("Seed: {}", seed);
    println!("Origin: {}", seed.origin().ascii_serialization());

    println!("\nCrawler Configuration:");
    println!("  Max pages: {}", config.crawler.max_pages);
    println!("  Max concurrency: {}", config.crawler.max_concurrency);
    println!("  Navigation timeout: {}s", config.crawler.navigation_timeout_secs);
    println!("  Handler timeout: {}s", config.crawler.handler_timeout_secs);

    println!("\nStore:");
    println!("  Directory: {}", config.store.directory.display());
    println!("  Keep finished sessions: {}", config.store.keep_sessions);
    println!(
        "  Lock retries: {} x {}ms",
        config.lock.max_retries, config.lock.retry_backoff_ms
    );

    println!("\nUser Agent: {}", config.user_agent.header_value());
    println!("\nBlocked Hosts ({}):", config.scope.blocked_hosts.len());
    for pattern in &config.scope.blocked_hosts {
        println!("  - {}", pattern);
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would start crawling at {}", seed);

    Ok(ExitCode::SUCCESS)
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, request: CrawlRequest, stream: bool) -> anyhow::Result<ExitCode> {
    let controller = CrawlController::from_config(config);
    let locks = controller.lock_manager();

    tokio::select! {
        code = crawl(&controller, request, stream) => code,
        _ = tokio::signal::ctrl_c() => {
            let released = locks.release_all();
            tracing::warn!("Interrupted; released {} store locks", released);
            Ok(ExitCode::from(EXIT_FAILURE))
        }
    }
}

async fn crawl(
    controller: &CrawlController,
    request: CrawlRequest,
    stream: bool,
) -> anyhow::Result<ExitCode> {
    if stream {
        let (publisher, events) = ProgressPublisher::channel();
        let mut writer = NdjsonWriter::new(std::io::stdout());
        let (result, streamed) = tokio::join!(
            controller.run(request, publisher),
            stream_events(events, &mut writer)
        );
        let streamed = streamed.context("failed to write progress stream")?;
        tracing::debug!("Streamed {} events", streamed);
        return finish(result.map(|_| ()));
    }

    let result = controller
        .run(request.clone(), ProgressPublisher::disabled())
        .await
        .map(|outcome| CrawlReport::from_outcome(&request, outcome));

    match result {
        Ok(report) => {
            let mut stdout = std::io::stdout().lock();
            write_report(&mut stdout, &report).context("failed to write report")?;
            stdout.flush()?;
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => finish(Err(e)),
    }
}

fn finish(result: Result<(), PagewalkError>) -> anyhow::Result<ExitCode> {
    match result {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => report_error(&e),
    }
}

/// Writes the error body to stdout and picks the exit code
fn report_error(error: &PagewalkError) -> anyhow::Result<ExitCode> {
    tracing::error!("{}", error);
    let mut stdout = std::io::stdout().lock();
    write_error(&mut stdout, error).context("failed to write error")?;
    stdout.flush()?;

    Ok(if error.is_input_error() {
        ExitCode::from(EXIT_INPUT_ERROR)
    } else {
        ExitCode::from(EXIT_FAILURE)
    })
}
