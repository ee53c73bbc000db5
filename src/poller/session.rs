//! Market analysis session.
//!
//! Runs the analysis submission and a progress poller side by side. A
//! single `select!` loop consumes both, so the display and the final
//! result have exactly one writer. Polling is always stopped before the
//! result is handed back.

use super::progress_poller::{PollEvent, PollEvents, PollFailure, PollerConfig, ProgressPoller, ProgressSource};
use crate::api::ApiError;
use crate::display::ProgressDisplay;
use crate::models::{MarketAnalysisResponse, MarketFailure, Progress};
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shown when a progress query fails while the analysis keeps running.
pub const PROGRESS_ERROR_MESSAGE: &str = "Error checking progress. Please try again.";

/// Backend able to run a market analysis and report its progress.
pub trait MarketBackend: ProgressSource {
    fn submit_market_analysis(&self) -> BoxFuture<'_, Result<MarketAnalysisResponse, ApiError>>;
}

/// How the submission ended.
#[derive(Debug)]
pub enum MarketOutcome {
    Completed(MarketAnalysisResponse),
    Failed {
        reason: String,
        /// Error body sent by the backend, when it could be decoded.
        payload: Option<MarketFailure>,
    },
}

/// Everything observed during one session.
#[derive(Debug)]
pub struct SessionReport {
    pub outcome: MarketOutcome,
    /// Set when polling ended early.
    pub progress_error: Option<PollFailure>,
    /// Last value shown on the display.
    pub last_progress: Progress,
}

/// Run one market analysis from submission to result.
pub async fn run_market_session<B: MarketBackend>(
    backend: Arc<B>,
    display: &mut dyn ProgressDisplay,
    config: PollerConfig,
) -> SessionReport {
    display.show();
    display.set(Progress::ZERO);

    let mut poller = ProgressPoller::new(config);
    let source: Arc<dyn ProgressSource> = backend.clone();
    let mut events = match poller.start(source) {
        Ok(events) => Some(events),
        Err(e) => {
            warn!("Could not start progress polling: {}", e);
            None
        }
    };

    info!("Submitting market analysis");
    let submission = backend.submit_market_analysis();
    tokio::pin!(submission);

    let mut progress_error = None;
    let mut last_progress = Progress::ZERO;

    let result = loop {
        tokio::select! {
            biased;
            result = &mut submission => break result,
            event = next_event(&mut events) => match event {
                Some(PollEvent::Progress(progress)) => {
                    last_progress = progress;
                    display.set(progress);
                }
                Some(PollEvent::Completed) => {
                    poller.stop();
                    debug!("Progress complete, waiting for the analysis result");
                }
                Some(PollEvent::Failed(failure)) => {
                    poller.stop();
                    display.note(PROGRESS_ERROR_MESSAGE);
                    progress_error = Some(failure);
                }
                None => events = None,
            },
        }
    };

    // A no-op when polling already ended on its own.
    poller.stop();
    display.hide();

    let outcome = match result {
        Ok(response) => {
            info!(
                "Market analysis finished with {} individual analyses",
                response.individual_analyses.len()
            );
            MarketOutcome::Completed(response)
        }
        Err(e) => {
            warn!("Market analysis failed: {}", e);
            let payload = match &e {
                ApiError::Status { body, .. } => serde_json::from_str(body).ok(),
                _ => None,
            };
            MarketOutcome::Failed {
                reason: e.to_string(),
                payload,
            }
        }
    };

    SessionReport {
        outcome,
        progress_error,
        last_progress,
    }
}

async fn next_event(events: &mut Option<PollEvents>) -> Option<PollEvent> {
    match events {
        Some(events) => events.recv().await,
        None => futures::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::SilentDisplay;
    use futures::future::FutureExt;
    use reqwest::StatusCode;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tokio::time;

    type Submission = Result<MarketAnalysisResponse, ApiError>;

    struct FakeBackend {
        progress: Mutex<VecDeque<Option<i64>>>,
        progress_calls: AtomicUsize,
        submission: Mutex<Option<oneshot::Receiver<Submission>>>,
    }

    impl FakeBackend {
        /// `None` entries fail; the last entry repeats.
        fn new(progress: Vec<Option<i64>>) -> (Arc<Self>, oneshot::Sender<Submission>) {
            let (tx, rx) = oneshot::channel();
            let backend = Arc::new(Self {
                progress: Mutex::new(progress.into()),
                progress_calls: AtomicUsize::new(0),
                submission: Mutex::new(Some(rx)),
            });
            (backend, tx)
        }

        fn progress_calls(&self) -> usize {
            self.progress_calls.load(Ordering::SeqCst)
        }
    }

    impl ProgressSource for FakeBackend {
        fn fetch_progress(&self) -> BoxFuture<'_, Result<Progress, ApiError>> {
            self.progress_calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.progress.lock().unwrap();
            let step = if script.len() > 1 {
                script.pop_front().flatten()
            } else {
                script.front().copied().flatten()
            };
            async move {
                step.map(Progress::new).ok_or_else(|| ApiError::Status {
                    endpoint: "/market_analysis_progress",
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    body: String::new(),
                })
            }
            .boxed()
        }
    }

    impl MarketBackend for FakeBackend {
        fn submit_market_analysis(&self) -> BoxFuture<'_, Submission> {
            let rx = self.submission.lock().unwrap().take();
            async move {
                match rx {
                    Some(rx) => rx.await.unwrap_or_else(|_| {
                        Err(ApiError::Connect {
                            base_url: "test".to_string(),
                        })
                    }),
                    None => Err(ApiError::Connect {
                        base_url: "test".to_string(),
                    }),
                }
            }
            .boxed()
        }
    }

    #[derive(Default)]
    struct RecordingDisplay {
        ops: Vec<String>,
    }

    impl ProgressDisplay for RecordingDisplay {
        fn show(&mut self) {
            self.ops.push("show".to_string());
        }
        fn set(&mut self, progress: Progress) {
            self.ops.push(progress.to_string());
        }
        fn note(&mut self, message: &str) {
            self.ops.push(format!("note: {message}"));
        }
        fn hide(&mut self) {
            self.ops.push("hide".to_string());
        }
    }

    fn market_response() -> MarketAnalysisResponse {
        MarketAnalysisResponse {
            market_analysis: Some("Risk-on".to_string()),
            ..Default::default()
        }
    }

    async fn finish_after(delay: Duration, tx: oneshot::Sender<Submission>, result: Submission) {
        time::sleep(delay).await;
        let _ = tx.send(result);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_reaches_100_before_submission() {
        let (backend, tx) = FakeBackend::new(vec![Some(40), Some(100)]);
        let mut display = RecordingDisplay::default();

        let (report, _) = tokio::join!(
            run_market_session(backend.clone(), &mut display, PollerConfig::default()),
            finish_after(Duration::from_secs(5), tx, Ok(market_response())),
        );

        assert!(matches!(report.outcome, MarketOutcome::Completed(_)));
        assert!(report.progress_error.is_none());
        assert_eq!(report.last_progress, Progress::COMPLETE);
        assert_eq!(display.ops, vec!["show", "0%", "40%", "100%", "hide"]);
        assert_eq!(backend.progress_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submission_finishing_stops_polling() {
        let (backend, tx) = FakeBackend::new(vec![Some(40)]);
        let mut display = RecordingDisplay::default();

        let (report, _) = tokio::join!(
            run_market_session(backend.clone(), &mut display, PollerConfig::default()),
            finish_after(Duration::from_millis(5000), tx, Ok(market_response())),
        );

        assert!(matches!(report.outcome, MarketOutcome::Completed(_)));
        assert_eq!(backend.progress_calls(), 2);
        assert_eq!(display.ops.last().map(String::as_str), Some("hide"));

        time::sleep(Duration::from_secs(20)).await;
        assert_eq!(backend.progress_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_failure_keeps_waiting_for_submission() {
        let (backend, tx) = FakeBackend::new(vec![None, Some(50)]);
        let mut display = RecordingDisplay::default();
        let failure = ApiError::Status {
            endpoint: "/analyze_market",
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: r#"{"error": "Unexpected error: boom", "traceback": "File \"app.py\", line 114"}"#
                .to_string(),
        };

        let (report, _) = tokio::join!(
            run_market_session(backend.clone(), &mut display, PollerConfig::default()),
            finish_after(Duration::from_secs(9), tx, Err(failure)),
        );

        assert_eq!(backend.progress_calls(), 1);
        assert!(matches!(report.progress_error, Some(PollFailure::Query(_))));
        assert!(display
            .ops
            .contains(&format!("note: {PROGRESS_ERROR_MESSAGE}")));

        match report.outcome {
            MarketOutcome::Failed { reason, payload } => {
                assert!(reason.contains("500"));
                let payload = payload.unwrap();
                assert_eq!(payload.error.as_deref(), Some("Unexpected error: boom"));
                assert_eq!(
                    payload.traceback.as_deref(),
                    Some("File \"app.py\", line 114")
                );
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_transport_failure() {
        let (backend, tx) = FakeBackend::new(vec![Some(10)]);
        drop(tx);
        let mut display = RecordingDisplay::default();

        let report =
            run_market_session(backend.clone(), &mut display, PollerConfig::default()).await;

        match report.outcome {
            MarketOutcome::Failed { reason, payload } => {
                assert!(reason.contains("Cannot connect"));
                assert!(payload.is_none());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(backend.progress_calls(), 0);
        assert_eq!(display.ops, vec!["show", "0%", "hide"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiet_display_still_shows_progress_error() {
        let (backend, tx) = FakeBackend::new(vec![None]);
        let mut display = SilentDisplay::with_writer(Vec::new());

        let (report, _) = tokio::join!(
            run_market_session(backend.clone(), &mut display, PollerConfig::default()),
            finish_after(Duration::from_secs(5), tx, Ok(market_response())),
        );

        assert!(matches!(report.outcome, MarketOutcome::Completed(_)));
        assert!(report.progress_error.is_some());
        let printed = String::from_utf8(display.output().clone()).unwrap();
        assert_eq!(printed, format!("{PROGRESS_ERROR_MESSAGE}\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_skips_polling() {
        let (backend, tx) = FakeBackend::new(vec![Some(40)]);
        let mut display = RecordingDisplay::default();
        let config = PollerConfig {
            interval: Duration::ZERO,
            stall_timeout: None,
        };

        let (report, _) = tokio::join!(
            run_market_session(backend.clone(), &mut display, config),
            finish_after(Duration::from_secs(3), tx, Ok(market_response())),
        );

        assert!(matches!(report.outcome, MarketOutcome::Completed(_)));
        assert_eq!(backend.progress_calls(), 0);
        assert_eq!(display.ops, vec!["show", "0%", "hide"]);
    }
}
