//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.marketlens.toml` files.

use crate::api::ClientConfig;
use crate::models::AnalysisModel;
use crate::poller::PollerConfig;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".marketlens.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Backend settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Progress polling settings.
    #[serde(default)]
    pub poller: PollerSettings,

    /// Terminal display settings.
    #[serde(default)]
    pub display: DisplayConfig,
}

/// Backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the analysis backend.
    #[serde(default = "default_server_url")]
    pub url: String,

    /// Timeout for ordinary requests in seconds.
    ///
    /// The market analysis submission is never timed out.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Model used by `analyze` when none is given.
    #[serde(default)]
    pub default_model: AnalysisModel,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            timeout_seconds: default_timeout(),
            default_model: AnalysisModel::default(),
        }
    }
}

fn default_server_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Progress polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerSettings {
    /// Milliseconds between progress queries.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Stop polling when progress does not move for this many seconds.
    /// Unset means poll until completion or failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stall_timeout_seconds: Option<u64>,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            stall_timeout_seconds: None,
        }
    }
}

fn default_interval_ms() -> u64 {
    2000
}

/// Terminal display settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Draw a progress bar during market analysis.
    #[serde(default = "default_true")]
    pub progress_bar: bool,

    /// Symbols listed by `symbols --kind favorite`.
    #[serde(default = "crate::symbols::default_favorites")]
    pub favorites: Vec<String>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            progress_bar: true,
            favorites: crate::symbols::default_favorites(),
        }
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// Only explicitly provided values override the file.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref server) = args.server {
            self.server.url = server.clone();
        }

        if let Some(timeout) = args.timeout {
            self.server.timeout_seconds = timeout;
        }

        if let crate::cli::Command::Market {
            interval_ms,
            stall_timeout,
            ..
        } = &args.command
        {
            if let Some(interval_ms) = interval_ms {
                self.poller.interval_ms = *interval_ms;
            }
            if stall_timeout.is_some() {
                self.poller.stall_timeout_seconds = *stall_timeout;
            }
        }

        if args.quiet {
            self.display.progress_bar = false;
        }
    }

    /// Reject settings that cannot drive a session.
    ///
    /// Run after [`Config::merge_with_args`], since values may come from the file.
    pub fn validate(&self) -> Result<()> {
        if self.server.timeout_seconds == 0 {
            bail!("server.timeout_seconds must be greater than 0");
        }
        if self.poller.interval_ms == 0 {
            bail!("poller.interval_ms must be greater than 0");
        }
        if self.poller.stall_timeout_seconds == Some(0) {
            bail!("poller.stall_timeout_seconds must be greater than 0");
        }
        Ok(())
    }

    /// Settings for the HTTP client.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.server.url.clone(),
            timeout_seconds: self.server.timeout_seconds,
        }
    }

    /// Settings for the progress poller.
    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            interval: Duration::from_millis(self.poller.interval_ms),
            stall_timeout: self.poller.stall_timeout_seconds.map(Duration::from_secs),
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Args, Command};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.url, "http://127.0.0.1:5000");
        assert_eq!(config.poller.interval_ms, 2000);
        assert!(config.poller.stall_timeout_seconds.is_none());
        assert!(config.display.favorites.contains(&"VIX".to_string()));
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[server]
url = "http://analysis.local:8080"
default_model = "openai"

[poller]
interval_ms = 500
stall_timeout_seconds = 120

[display]
favorites = ["SPX", "BTC/USDT"]
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.server.url, "http://analysis.local:8080");
        assert_eq!(config.server.timeout_seconds, 30);
        assert_eq!(config.server.default_model, AnalysisModel::Openai);
        assert_eq!(config.display.favorites, vec!["SPX", "BTC/USDT"]);
        assert!(config.display.progress_bar);

        let poller = config.poller_config();
        assert_eq!(poller.interval, Duration::from_millis(500));
        assert_eq!(poller.stall_timeout, Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[poller]\ninterval_ms = 750\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.poller.interval_ms, 750);
        assert_eq!(config.server.url, "http://127.0.0.1:5000");

        std::fs::write(&path, "[poller\n").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_merge_with_args() {
        let mut config = Config::default();
        let args = Args {
            server: Some("http://10.0.0.2:5000".to_string()),
            config: None,
            timeout: Some(5),
            verbose: false,
            quiet: true,
            command: Command::Market {
                interval_ms: Some(1000),
                stall_timeout: Some(60),
                output: None,
            },
        };

        config.merge_with_args(&args);
        assert_eq!(config.server.url, "http://10.0.0.2:5000");
        assert_eq!(config.server.timeout_seconds, 5);
        assert_eq!(config.poller.interval_ms, 1000);
        assert_eq!(config.poller.stall_timeout_seconds, Some(60));
        assert!(!config.display.progress_bar);
    }

    #[test]
    fn test_validate() {
        assert!(Config::default().validate().is_ok());

        let config: Config = toml::from_str("[poller]\ninterval_ms = 0\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("interval_ms"));

        let config: Config = toml::from_str("[server]\ntimeout_seconds = 0\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("timeout_seconds"));

        let config: Config = toml::from_str("[poller]\nstall_timeout_seconds = 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cli_interval_fixes_invalid_file_value() {
        let mut config: Config = toml::from_str("[poller]\ninterval_ms = 0\n").unwrap();
        let args = Args {
            server: None,
            config: None,
            timeout: None,
            verbose: false,
            quiet: false,
            command: Command::Market {
                interval_ms: Some(250),
                stall_timeout: None,
                output: None,
            },
        };

        config.merge_with_args(&args);
        assert!(config.validate().is_ok());
        assert_eq!(config.poller_config().interval, Duration::from_millis(250));
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[server]"));
        assert!(toml_str.contains("[poller]"));
        assert!(toml_str.contains("[display]"));
        assert!(!toml_str.contains("stall_timeout_seconds"));

        let reparsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(reparsed.poller.interval_ms, 2000);
    }
}
