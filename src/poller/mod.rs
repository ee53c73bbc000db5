//! Progress polling for long-running market analyses.
//!
//! A [`progress_poller::ProgressPoller`] owns one polling cycle at a time
//! and reports what it sees as events. [`run_market_session`] combines a
//! poller with the analysis submission and a progress display.

pub mod progress_poller;
pub mod session;

pub use progress_poller::{PollerConfig, ProgressSource};
pub use session::{run_market_session, MarketBackend, MarketOutcome};
