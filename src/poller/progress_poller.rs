//! Interval-driven progress poller.
//!
//! A poller is either `Idle` or `Polling`. While polling, a background
//! task queries a [`ProgressSource`] on a fixed interval and forwards each
//! reading. The cycle ends when progress reaches 100, when one query
//! fails, when progress stalls past the optional limit, or when the owner
//! calls [`ProgressPoller::stop`].

use crate::api::ApiError;
use crate::models::Progress;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Something that can report the progress of a running analysis.
pub trait ProgressSource: Send + Sync + 'static {
    fn fetch_progress(&self) -> BoxFuture<'_, Result<Progress, ApiError>>;
}

/// Poller timing.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Delay between two progress queries. The first query fires one
    /// interval after the cycle starts.
    pub interval: Duration,
    /// Give up when the reported value has not changed for this long.
    pub stall_timeout: Option<Duration>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2000),
            stall_timeout: None,
        }
    }
}

/// Observable state of a [`ProgressPoller`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling,
}

/// Why a polling cycle ended early.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollFailure {
    #[error("progress query failed: {0}")]
    Query(String),

    #[error("progress stalled at {progress} for {}s", .after.as_secs())]
    Stalled { progress: Progress, after: Duration },
}

/// Messages from the polling task to the poller's owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEvent {
    /// A successful reading.
    Progress(Progress),
    /// Progress reached 100; no further queries are issued.
    Completed,
    /// The cycle stopped after a failure; no retry is attempted.
    Failed(PollFailure),
}

#[derive(Debug, Error)]
pub enum PollerError {
    #[error("progress polling is already active")]
    AlreadyPolling,
    #[error("polling interval must be greater than zero")]
    ZeroInterval,
}

/// Receiving end of one polling cycle.
///
/// Yields nothing once the cycle has been stopped, even if readings were
/// still queued.
#[derive(Debug)]
pub struct PollEvents {
    rx: mpsc::UnboundedReceiver<PollEvent>,
    cancel: CancellationToken,
}

impl PollEvents {
    /// Next event, or `None` when the cycle is over.
    pub async fn recv(&mut self) -> Option<PollEvent> {
        if self.cancel.is_cancelled() {
            return None;
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            event = self.rx.recv() => event,
        }
    }
}

struct PollHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

enum Cycle {
    Idle,
    Polling(PollHandle),
}

/// Owns at most one polling cycle.
pub struct ProgressPoller {
    config: PollerConfig,
    cycle: Cycle,
}

impl ProgressPoller {
    pub fn new(config: PollerConfig) -> Self {
        Self {
            config,
            cycle: Cycle::Idle,
        }
    }

    /// Current state. A cycle whose task has ended on its own counts as idle.
    pub fn state(&self) -> PollState {
        match &self.cycle {
            Cycle::Polling(handle) if !handle.task.is_finished() => PollState::Polling,
            _ => PollState::Idle,
        }
    }

    /// Begin a polling cycle. Rejected while another cycle is running.
    pub fn start(&mut self, source: Arc<dyn ProgressSource>) -> Result<PollEvents, PollerError> {
        if self.state() == PollState::Polling {
            return Err(PollerError::AlreadyPolling);
        }
        if self.config.interval.is_zero() {
            return Err(PollerError::ZeroInterval);
        }
        // Drop the handle of a cycle that finished by itself.
        self.stop();

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(poll_loop(
            source,
            self.config.clone(),
            cancel.clone(),
            tx,
        ));

        info!(
            "Polling progress every {}ms",
            self.config.interval.as_millis()
        );

        self.cycle = Cycle::Polling(PollHandle {
            cancel: cancel.clone(),
            task,
        });

        Ok(PollEvents { rx, cancel })
    }

    /// Stop the current cycle, aborting any in-flight query.
    ///
    /// Returns whether a running cycle was stopped. Stopping an idle poller
    /// does nothing.
    pub fn stop(&mut self) -> bool {
        match std::mem::replace(&mut self.cycle, Cycle::Idle) {
            Cycle::Polling(handle) => {
                handle.cancel.cancel();
                let was_running = !handle.task.is_finished();
                if was_running {
                    debug!("Progress polling stopped");
                }
                was_running
            }
            Cycle::Idle => false,
        }
    }
}

impl Drop for ProgressPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_loop(
    source: Arc<dyn ProgressSource>,
    config: PollerConfig,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<PollEvent>,
) {
    let mut ticker = time::interval_at(Instant::now() + config.interval, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut last_seen: Option<Progress> = None;
    let mut last_change = Instant::now();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Aborted in-flight progress query");
                return;
            }
            result = source.fetch_progress() => result,
        };

        let progress = match result {
            Ok(progress) => progress,
            Err(e) => {
                warn!("Progress check failed: {}", e);
                let _ = events.send(PollEvent::Failed(PollFailure::Query(e.to_string())));
                return;
            }
        };

        debug!("Market analysis progress: {}", progress);
        if events.send(PollEvent::Progress(progress)).is_err() {
            // Owner went away.
            return;
        }

        if progress.is_complete() {
            info!("Market analysis reported complete");
            let _ = events.send(PollEvent::Completed);
            return;
        }

        if last_seen != Some(progress) {
            last_seen = Some(progress);
            last_change = Instant::now();
        } else if let Some(limit) = config.stall_timeout {
            let stalled_for = last_change.elapsed();
            if stalled_for >= limit {
                warn!("Progress stuck at {} for {:?}", progress, stalled_for);
                let _ = events.send(PollEvent::Failed(PollFailure::Stalled {
                    progress,
                    after: stalled_for,
                }));
                return;
            }
        }
    }
}
