//! Backend HTTP client.
//!
//! Wraps the five endpoints of the analysis backend. Every call maps
//! transport problems into [`ApiError`] so the callers can render them as
//! text without caring about `reqwest` details.

use crate::models::{AnalysisModel, AnalysisResponse, MarketAnalysisResponse, Progress, ProgressReport};
use crate::poller::{MarketBackend, ProgressSource};
use anyhow::{Context, Result};
use futures::future::{BoxFuture, FutureExt};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors raised while talking to the backend.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Request to {endpoint} timed out after {timeout_seconds}s")]
    Timeout {
        endpoint: &'static str,
        timeout_seconds: u64,
    },

    #[error("Cannot connect to backend at {base_url}. Is the server running?")]
    Connect { base_url: String },

    #[error("Request to {endpoint} failed: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// Non-2xx answer. The body is kept because some endpoints explain
    /// the failure in it.
    #[error("Backend returned {status} for {endpoint}")]
    Status {
        endpoint: &'static str,
        status: StatusCode,
        body: String,
    },

    #[error("Failed to decode response from {endpoint}: {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

const FETCH_SYMBOLS: &str = "/fetch_symbols";
const SEARCH_TICKER: &str = "/search_ticker";
const ANALYZE: &str = "/analyze";
const ANALYZE_MARKET: &str = "/analyze_market";
const MARKET_PROGRESS: &str = "/market_analysis_progress";

/// Connection settings for [`BackendClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Timeout for ordinary requests. The market submission is exempt.
    pub timeout_seconds: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            timeout_seconds: 30,
        }
    }
}

/// Client for the analysis backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
    base_url: String,
    timeout_seconds: u64,
    http: reqwest::Client,
    /// Used for `/analyze_market`, which may run for many minutes.
    unbounded_http: reqwest::Client,
}

impl BackendClient {
    /// Build a client for the given backend.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_seconds);

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let unbounded_http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout_seconds: config.timeout_seconds,
            http,
            unbounded_http,
        })
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// List every symbol the backend knows about.
    pub async fn fetch_symbols(&self) -> Result<Vec<String>, ApiError> {
        let request = self.http.get(self.url(FETCH_SYMBOLS));
        self.send_json(FETCH_SYMBOLS, request).await
    }

    /// Look up tickers matching `query`.
    pub async fn search_ticker(&self, query: &str) -> Result<Vec<String>, ApiError> {
        let request = self
            .http
            .get(self.url(SEARCH_TICKER))
            .query(&[("query", query)]);
        self.send_json(SEARCH_TICKER, request).await
    }

    /// Run a single-symbol analysis.
    pub async fn analyze(
        &self,
        symbol: &str,
        model: AnalysisModel,
    ) -> Result<AnalysisResponse, ApiError> {
        let request = self
            .http
            .post(self.url(ANALYZE))
            .form(&[("symbol", symbol), ("model", model.as_str())]);
        self.send_json(ANALYZE, request).await
    }

    /// Start the market-wide analysis and wait for its result.
    ///
    /// No client-side timeout applies; progress is observed separately
    /// through [`BackendClient::market_progress`].
    pub async fn analyze_market(&self) -> Result<MarketAnalysisResponse, ApiError> {
        let request = self.unbounded_http.post(self.url(ANALYZE_MARKET));
        self.send_json(ANALYZE_MARKET, request).await
    }

    /// Current completion of the running market analysis.
    pub async fn market_progress(&self) -> Result<Progress, ApiError> {
        let request = self.http.get(self.url(MARKET_PROGRESS));
        let report: ProgressReport = self.send_json(MARKET_PROGRESS, request).await?;
        Ok(report.progress)
    }

    /// Send a request and decode its JSON body.
    async fn send_json<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        debug!("Sending request to {}", endpoint);

        let response = request.send().await.map_err(|e| self.map_send_error(endpoint, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.map_send_error(endpoint, e))?;

        if !status.is_success() {
            return Err(ApiError::Status {
                endpoint,
                status,
                body,
            });
        }

        serde_json::from_str(&body).map_err(|source| ApiError::Decode { endpoint, source })
    }

    fn map_send_error(&self, endpoint: &'static str, error: reqwest::Error) -> ApiError {
        if error.is_timeout() {
            ApiError::Timeout {
                endpoint,
                timeout_seconds: self.timeout_seconds,
            }
        } else if error.is_connect() {
            ApiError::Connect {
                base_url: self.base_url.clone(),
            }
        } else {
            ApiError::Transport {
                endpoint,
                source: error,
            }
        }
    }
}

impl ProgressSource for BackendClient {
    fn fetch_progress(&self) -> BoxFuture<'_, Result<Progress, ApiError>> {
        self.market_progress().boxed()
    }
}

impl MarketBackend for BackendClient {
    fn submit_market_analysis(&self) -> BoxFuture<'_, Result<MarketAnalysisResponse, ApiError>> {
        self.analyze_market().boxed()
    }
}
