//! Data models for the market analysis client.
//!
//! This module contains the payloads exchanged with the analysis backend
//! and the bounded progress value shown while a market analysis runs.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Completion percentage of a long-running market analysis.
///
/// Always within `0..=100`. Values reported outside that range are clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct Progress(u8);

impl Progress {
    /// No work done yet.
    pub const ZERO: Progress = Progress(0);
    /// Analysis finished.
    pub const COMPLETE: Progress = Progress(100);

    /// Create a progress value, clamping into `0..=100`.
    pub fn new(value: i64) -> Self {
        Self(value.clamp(0, 100) as u8)
    }

    /// Raw percentage.
    pub fn value(self) -> u8 {
        self.0
    }

    /// Whether the backend reports the job as done.
    pub fn is_complete(self) -> bool {
        self >= Progress::COMPLETE
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl<'de> Deserialize<'de> for Progress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Accepts integers and floats alike; NaN lands on 0.
        let raw = f64::deserialize(deserializer)?;
        Ok(Progress::new(raw.round() as i64))
    }
}

/// Body of `GET /market_analysis_progress`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ProgressReport {
    pub progress: Progress,
}

/// Model the backend should use for a single-symbol analysis.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisModel {
    /// Anthropic Claude (backend default)
    #[default]
    Claude,
    /// OpenAI
    Openai,
}

impl AnalysisModel {
    /// Wire name sent in the `model` form field.
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisModel::Claude => "claude",
            AnalysisModel::Openai => "openai",
        }
    }
}

impl fmt::Display for AnalysisModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response of `POST /analyze`.
///
/// The backend answers 200 for both outcomes; failures carry `error`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisResponse {
    /// Rendered analysis content.
    pub analysis: Option<String>,
    /// Symbol the analysis was produced for.
    pub symbol: Option<String>,
    /// Backend timestamp (ISO 8601, usually without offset).
    pub timestamp: Option<String>,
    /// Model that produced the analysis.
    pub model: Option<String>,
    /// Backend-reported failure.
    pub error: Option<String>,
}

/// Interpretation of an [`AnalysisResponse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisOutcome<'a> {
    /// The backend reported an error.
    Failed(&'a str),
    /// Analysis content is available.
    Ready(&'a str),
    /// Neither analysis nor error was returned.
    Empty,
}

impl AnalysisResponse {
    /// Classify the response. An `error` field wins over any content.
    pub fn outcome(&self) -> AnalysisOutcome<'_> {
        match (self.error.as_deref(), self.analysis.as_deref()) {
            (Some(error), _) => AnalysisOutcome::Failed(error),
            (None, Some(analysis)) if !analysis.is_empty() => AnalysisOutcome::Ready(analysis),
            _ => AnalysisOutcome::Empty,
        }
    }
}

/// One asset entry inside a market analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndividualAnalysis {
    pub symbol: Option<String>,
    pub analysis: Option<String>,
    pub error: Option<String>,
    pub timestamp: Option<String>,
}

/// Successful response of `POST /analyze_market`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketAnalysisResponse {
    /// Combined market commentary.
    pub market_analysis: Option<String>,
    /// Per-asset analyses keyed by asset name.
    #[serde(default)]
    pub individual_analyses: BTreeMap<String, IndividualAnalysis>,
    /// Assets whose analysis failed.
    #[serde(default)]
    pub failed_analyses: Vec<String>,
    pub timestamp: Option<String>,
}

/// Error payload returned with a non-2xx status by `POST /analyze_market`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketFailure {
    pub error: Option<String>,
    /// Server-side diagnostic trace, shown verbatim.
    pub traceback: Option<String>,
    #[serde(default)]
    pub failed_analyses: Vec<String>,
}
