//! Terminal progress display.

use crate::models::Progress;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::time::Duration;
use tracing::{debug, warn};

/// Widget reflecting the completion of a market analysis.
pub trait ProgressDisplay {
    /// Make the indicator visible.
    fn show(&mut self);
    /// Reflect a new value.
    fn set(&mut self, progress: Progress);
    /// Print a line without corrupting the indicator.
    fn note(&mut self, message: &str);
    /// Remove the indicator.
    fn hide(&mut self);
}

/// `indicatif` bar showing `NN%`.
#[derive(Default)]
pub struct BarDisplay {
    bar: Option<ProgressBar>,
}

impl BarDisplay {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressDisplay for BarDisplay {
    fn show(&mut self) {
        if self.bar.is_some() {
            return;
        }

        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        self.bar = Some(bar);
    }

    fn set(&mut self, progress: Progress) {
        if let Some(ref bar) = self.bar {
            bar.set_position(u64::from(progress.value()));
            bar.set_message(progress.to_string());
        }
    }

    fn note(&mut self, message: &str) {
        match self.bar {
            Some(ref bar) => bar.println(message),
            None => eprintln!("{}", message),
        }
    }

    fn hide(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

/// Display for quiet mode: readings only go to the log, notes still reach the user.
#[derive(Debug)]
pub struct SilentDisplay<W: Write = io::Stderr> {
    out: W,
}

impl SilentDisplay {
    pub fn new() -> Self {
        Self::with_writer(io::stderr())
    }
}

impl Default for SilentDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> SilentDisplay<W> {
    /// Send notes to `out` instead of stderr.
    pub fn with_writer(out: W) -> Self {
        Self { out }
    }

    #[cfg(test)]
    pub(crate) fn output(&self) -> &W {
        &self.out
    }
}

impl<W: Write> ProgressDisplay for SilentDisplay<W> {
    fn show(&mut self) {}

    fn set(&mut self, progress: Progress) {
        debug!("Progress: {}", progress);
    }

    fn note(&mut self, message: &str) {
        if let Err(e) = writeln!(self.out, "{}", message) {
            warn!("Failed to print '{}': {}", message, e);
        }
    }

    fn hide(&mut self) {}
}
