use super::Candidate;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

const TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} hosts ({per_sec}) {msg}";

/// Live counters for a running scan.
///
/// `processed` only ever grows and counts every finished probe, open or
/// not. The same numbers drive the terminal progress bar.
pub struct ScanProgress {
    processed: AtomicU64,
    found: AtomicU64,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    accessible: bool,
    bar: ProgressBar,
}

impl ScanProgress {
    /// A progress bar drawn on stderr.
    pub fn new(total: u64, accessible: bool) -> Self {
        let bar = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::default_bar().template(TEMPLATE) {
            bar.set_style(style.progress_chars("=> "));
        }
        Self::with_bar(bar, accessible)
    }

    /// Counts without drawing anything.
    pub fn hidden(total: u64) -> Self {
        Self::with_bar(
            ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::hidden()),
            true,
        )
    }

    fn with_bar(bar: ProgressBar, accessible: bool) -> Self {
        Self {
            processed: AtomicU64::new(0),
            found: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            accessible,
            bar,
        }
    }

    pub(super) fn start(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        InFlight(self)
    }

    pub(super) fn found(&self, candidate: Candidate) {
        self.found.fetch_add(1, Ordering::Relaxed);
        if self.accessible {
            self.bar.println(format!("Open {candidate}"));
        } else {
            self.bar
                .println(format!("Open {}", candidate.to_string().purple()));
        }
    }

    pub(super) fn finish(&self) {
        self.bar.finish_and_clear();
    }

    /// Probes finished so far.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::SeqCst)
    }

    pub fn found_count(&self) -> u64 {
        self.found.load(Ordering::Relaxed)
    }

    /// Highest number of connection attempts that were outstanding at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for ScanProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanProgress")
            .field("processed", &self.processed())
            .field("found", &self.found_count())
            .field("peak_in_flight", &self.peak_in_flight())
            .finish_non_exhaustive()
    }
}

/// Marks one outstanding probe; dropping it records the probe as processed.
pub(super) struct InFlight<'a>(&'a ScanProgress);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.0.processed.fetch_add(1, Ordering::SeqCst);
        self.0.bar.inc(1);
    }
}
