//! Markdown rendering of backend results.
//!
//! Everything the client prints is produced here, so the same text goes
//! to the terminal and to `--output` files.

use crate::models::{AnalysisOutcome, AnalysisResponse, MarketAnalysisResponse, MarketFailure};
use crate::poller::MarketOutcome;
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::Path;

/// Render a single-symbol analysis.
///
/// Missing `symbol`, `timestamp` and `model` fall back to the requested
/// symbol, `now` and the requested model.
pub fn render_analysis(
    response: &AnalysisResponse,
    requested_symbol: &str,
    requested_model: &str,
    now: DateTime<Utc>,
) -> String {
    let mut output = String::new();

    match response.outcome() {
        AnalysisOutcome::Failed(error) => {
            output.push_str(&generate_header(requested_symbol, "Error occurred", requested_model));
            output.push_str(&format!("Error: {}\n", error));
        }
        AnalysisOutcome::Ready(analysis) => {
            let fallback_time = now.to_rfc3339_opts(SecondsFormat::Millis, true);
            output.push_str(&generate_header(
                response.symbol.as_deref().unwrap_or(requested_symbol),
                response.timestamp.as_deref().unwrap_or(&fallback_time),
                response.model.as_deref().unwrap_or(requested_model),
            ));
            output.push_str(analysis.trim_end());
            output.push('\n');
        }
        AnalysisOutcome::Empty => {
            output.push_str("No analysis available for this symbol.\n");
        }
    }

    output
}

/// Render a transport failure of a single-symbol analysis.
pub fn render_analysis_error(requested_symbol: &str, requested_model: &str, reason: &str) -> String {
    let mut output = generate_header(requested_symbol, "Error occurred", requested_model);
    output.push_str(&format!("Error: {}\n", reason));
    output
}

fn generate_header(symbol: &str, timestamp: &str, model: &str) -> String {
    let mut header = String::new();
    header.push_str(&format!("# {}\n\n", symbol));
    header.push_str(&format!("- **Timestamp:** {}\n", timestamp));
    header.push_str(&format!("- **Model:** `{}`\n\n", model));
    header
}

/// Render the final result of a market session.
pub fn render_market_outcome(outcome: &MarketOutcome) -> String {
    match outcome {
        MarketOutcome::Completed(response) => render_market_analysis(response),
        MarketOutcome::Failed { reason, payload } => {
            render_market_failure(reason, payload.as_ref())
        }
    }
}

/// Render a successful market analysis.
pub fn render_market_analysis(response: &MarketAnalysisResponse) -> String {
    let mut output = String::new();

    if let Some(ref analysis) = response.market_analysis {
        output.push_str("## Market Analysis\n\n");
        output.push_str(analysis.trim_end());
        output.push_str("\n\n");
    }

    if !response.individual_analyses.is_empty() {
        output.push_str("## Individual Asset Analyses\n\n");
        for (asset, entry) in &response.individual_analyses {
            output.push_str(&format!("### {}\n\n", asset));
            match (&entry.analysis, &entry.error) {
                (Some(analysis), _) => output.push_str(analysis.trim_end()),
                (None, Some(error)) => output.push_str(&format!("Error: {}", error)),
                (None, None) => output.push_str("No analysis available."),
            }
            output.push_str("\n\n");
        }
    }

    if !response.failed_analyses.is_empty() {
        output.push_str("## Failed Analyses\n\n");
        for asset in &response.failed_analyses {
            output.push_str(&format!("- {}\n", asset));
        }
        output.push('\n');
    }

    if output.is_empty() {
        output.push_str("No market analysis was returned.\n");
    }

    output
}

/// Render a failed market analysis. The traceback is copied verbatim.
pub fn render_market_failure(reason: &str, payload: Option<&MarketFailure>) -> String {
    let mut output = String::new();

    output.push_str("## Error in Analysis\n\n");
    output.push_str(reason);
    output.push_str("\n\n");

    if let Some(payload) = payload {
        if let Some(ref error) = payload.error {
            output.push_str(&format!("Error: {}\n\n", error));
        }

        if !payload.failed_analyses.is_empty() {
            output.push_str(&format!(
                "Failed assets: {}\n\n",
                payload.failed_analyses.join(", ")
            ));
        }

        if let Some(ref traceback) = payload.traceback {
            output.push_str("### Traceback\n\n");
            output.push_str("```text\n");
            output.push_str(traceback);
            if !traceback.ends_with('\n') {
                output.push('\n');
            }
            output.push_str("```\n");
        }
    }

    output
}

/// Render ticker search results.
pub fn render_search_results(results: &[String]) -> String {
    if results.is_empty() {
        return "No results found.\n".to_string();
    }
    render_symbol_list(results)
}

/// One symbol per line.
pub fn render_symbol_list(symbols: &[String]) -> String {
    let mut output = String::new();
    for symbol in symbols {
        output.push_str(symbol);
        output.push('\n');
    }
    output
}

/// Write rendered Markdown to a file.
pub fn write_report(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write report to {}", path.display()))
}
