//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::AnalysisModel;
use crate::symbols::SymbolKind;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// MarketLens - terminal client for the market analysis backend
///
/// List symbols, search tickers, analyze a single symbol, or run the
/// full market analysis with a live progress bar.
///
/// Examples:
///   marketlens symbols --kind crypto
///   marketlens search aapl
///   marketlens analyze SPX --model openai -o spx.md
///   marketlens market --stall-timeout 600
///   marketlens init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Base URL of the analysis backend
    ///
    /// Overrides the [server] url of the config file.
    #[arg(short, long, global = true, value_name = "URL", env = "MARKETLENS_SERVER")]
    pub server: Option<String>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .marketlens.toml in the current directory
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Timeout for ordinary requests in seconds
    ///
    /// The market analysis request itself is never timed out.
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (no progress bar, errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available actions.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List symbols known to the backend
    Symbols {
        /// Which group of symbols to list
        #[arg(long, default_value = "favorite")]
        kind: SymbolKind,
    },

    /// Search for a ticker
    Search {
        /// Ticker or name to look up
        query: String,
    },

    /// Analyze a single symbol
    Analyze {
        /// Symbol to analyze (e.g. SPX, BTC/USDT)
        symbol: String,

        /// Model the backend should use
        ///
        /// Defaults to [server] default_model from the config file.
        #[arg(short, long, env = "MARKETLENS_MODEL")]
        model: Option<AnalysisModel>,

        /// Also write the rendered analysis to this file
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Run the market-wide analysis and follow its progress
    Market {
        /// Milliseconds between progress checks
        #[arg(long, value_name = "MS")]
        interval_ms: Option<u64>,

        /// Stop polling if progress does not change for this many seconds
        #[arg(long, value_name = "SECS")]
        stall_timeout: Option<u64>,

        /// Also write the rendered analysis to this file
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Generate a default .marketlens.toml configuration file
    InitConfig,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref server) = self.server {
            if !server.starts_with("http://") && !server.starts_with("https://") {
                return Err("Server URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        match &self.command {
            Command::Search { query } if query.trim().is_empty() => {
                return Err("Search query must not be empty".to_string());
            }
            Command::Analyze { symbol, .. } if symbol.trim().is_empty() => {
                return Err("Symbol must not be empty".to_string());
            }
            Command::Market {
                interval_ms,
                stall_timeout,
                ..
            } => {
                if *interval_ms == Some(0) {
                    return Err("Polling interval must be at least 1 millisecond".to_string());
                }
                if *stall_timeout == Some(0) {
                    return Err("Stall timeout must be at least 1 second".to_string());
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
