//! MarketLens - terminal client for the market analysis backend
//!
//! Lists symbols, searches tickers, runs single-symbol analyses and
//! follows the long-running market analysis with a progress bar.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (connection, config, invalid arguments, etc.)
//!   2 - The analysis itself failed (backend error or market analysis failure)

mod api;
mod cli;
mod config;
mod display;
mod models;
mod poller;
mod report;
mod symbols;

use anyhow::{Context, Result};
use api::{ApiError, BackendClient};
use chrono::Utc;
use cli::{Args, Command};
use config::{Config, CONFIG_FILE_NAME};
use display::{BarDisplay, ProgressDisplay, SilentDisplay};
use models::{AnalysisModel, AnalysisOutcome};
use poller::MarketOutcome;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use symbols::SymbolKind;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Initialize logging
    init_logging(&args);

    info!("MarketLens v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle init-config: generate a default .marketlens.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to change the server, polling interval and favorites.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Dispatch the selected command. Returns the process exit code.
async fn run(args: Args) -> Result<i32> {
    match args.command {
        Command::InitConfig => handle_init_config().map(|_| 0),
        Command::Symbols { kind } => {
            let (config, client) = connect(&args)?;
            list_symbols(&client, &config, kind).await
        }
        Command::Search { ref query } => {
            let (_, client) = connect(&args)?;
            search(&client, query.trim()).await
        }
        Command::Analyze {
            ref symbol,
            model,
            ref output,
        } => {
            let (config, client) = connect(&args)?;
            let model = model.unwrap_or(config.server.default_model);
            analyze_symbol(&client, symbol.trim(), model, output.as_ref()).await
        }
        Command::Market { ref output, .. } => {
            let (config, client) = connect(&args)?;
            run_market(client, &config, output.as_ref()).await
        }
    }
}

/// Resolve the effective configuration and build the backend client.
fn connect(args: &Args) -> Result<(Config, BackendClient)> {
    let mut config = load_config(args)?;
    config.merge_with_args(args);
    config.validate().context("Invalid configuration")?;

    let client = BackendClient::new(&config.client_config())?;
    info!("Backend: {}", client.base_url());
    Ok((config, client))
}

/// List backend symbols of one kind.
async fn list_symbols(client: &BackendClient, config: &Config, kind: SymbolKind) -> Result<i32> {
    let listed = if kind == SymbolKind::Favorite {
        config.display.favorites.clone()
    } else {
        let all = client
            .fetch_symbols()
            .await
            .context("Failed to fetch symbols")?;
        debug!("Backend returned {} symbols", all.len());
        symbols::filter_symbols(&all, kind, &config.display.favorites)
    };

    print!("{}", report::render_symbol_list(&listed));
    Ok(0)
}

/// Look up a ticker.
async fn search(client: &BackendClient, query: &str) -> Result<i32> {
    let results = client
        .search_ticker(query)
        .await
        .with_context(|| format!("Search for '{}' failed", query))?;

    print!("{}", report::render_search_results(&results));
    Ok(0)
}

/// Run a single-symbol analysis.
async fn analyze_symbol(
    client: &BackendClient,
    symbol: &str,
    model: AnalysisModel,
    output: Option<&PathBuf>,
) -> Result<i32> {
    println!("🔬 Analyzing {} with {}... Please wait.", symbol, model);
    let start_time = Instant::now();

    let (rendered, exit_code) = match client.analyze(symbol, model).await {
        Ok(response) => {
            let exit_code = match response.outcome() {
                AnalysisOutcome::Failed(e) => {
                    warn!("Backend reported an error for {}: {}", symbol, e);
                    2
                }
                _ => 0,
            };
            (
                report::render_analysis(&response, symbol, model.as_str(), Utc::now()),
                exit_code,
            )
        }
        Err(e) => {
            error!("Analysis request failed: {}", e);
            (
                report::render_analysis_error(symbol, model.as_str(), &e.to_string()),
                exit_code_for(&e),
            )
        }
    };

    println!();
    print!("{}", rendered);
    debug!("Analysis took {:.1}s", start_time.elapsed().as_secs_f64());

    save_output(output, &rendered)?;
    Ok(exit_code)
}

/// Run the market analysis while polling its progress.
async fn run_market(client: BackendClient, config: &Config, output: Option<&PathBuf>) -> Result<i32> {
    let start_time = Instant::now();
    let poller_config = config.poller_config();

    println!("📈 Analyzing market... Please wait.");
    if let Some(limit) = poller_config.stall_timeout {
        println!("   Polling stops if progress stalls for {}s", limit.as_secs());
    }

    let mut display: Box<dyn ProgressDisplay> = if config.display.progress_bar {
        Box::new(BarDisplay::new())
    } else {
        Box::new(SilentDisplay::new())
    };

    let session =
        poller::run_market_session(Arc::new(client), display.as_mut(), poller_config).await;

    if let Some(ref failure) = session.progress_error {
        warn!(
            "Progress tracking ended early at {}: {}",
            session.last_progress, failure
        );
    } else {
        debug!("Last progress reading: {}", session.last_progress);
    }

    let rendered = report::render_market_outcome(&session.outcome);
    println!();
    print!("{}", rendered);

    let exit_code = match session.outcome {
        MarketOutcome::Completed(_) => {
            println!(
                "\n✅ Market analysis complete in {:.1}s",
                start_time.elapsed().as_secs_f64()
            );
            0
        }
        MarketOutcome::Failed { .. } => 2,
    };

    save_output(output, &rendered)?;
    Ok(exit_code)
}

fn save_output(output: Option<&PathBuf>, rendered: &str) -> Result<()> {
    if let Some(path) = output {
        report::write_report(path, rendered)?;
        println!("📝 Saved to: {}", path.display());
    }
    Ok(())
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE_NAME);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}

/// Exit code for a failed request, distinguishing backend-reported errors.
fn exit_code_for(error: &ApiError) -> i32 {
    match error {
        ApiError::Status { .. } => 2,
        _ => 1,
    }
}
