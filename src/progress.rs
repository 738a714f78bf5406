//! Progress reporting utilities using indicatif.
//!
//! [`Progress`] implements [`ProgressCallback`] to draw a bar while a
//! foreground sweep runs. [`StatusSpinner`] mirrors a background worker's
//! status line while `mediadupe run` waits for it.
//!
//! # Accessible Mode
//!
//! When accessible mode is enabled, progress reporting uses simplified output:
//! - No spinners or animations
//! - ASCII bar characters

use std::sync::Mutex;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::sweep::SweepStatus;

/// Progress callback for sweep passes.
///
/// Implement this trait to receive progress updates while a
/// [`Sweeper`](crate::sweep::Sweeper) works through pending files.
pub trait ProgressCallback: Send + Sync {
    /// Called when a phase starts.
    ///
    /// # Arguments
    ///
    /// * `phase` - Name of the phase (e.g., "sweep")
    /// * `total` - Total number of items to process
    fn on_phase_start(&self, phase: &str, total: usize);

    /// Called for each item processed.
    ///
    /// # Arguments
    ///
    /// * `current` - Current item number (1-based)
    /// * `path` - Path being processed
    fn on_progress(&self, current: usize, path: &str);

    /// Called when an item has been fingerprinted, with the bytes its merge
    /// reclaimed.
    fn on_item_completed(&self, _bytes_reclaimed: u64) {}

    /// Called when a phase completes.
    fn on_phase_end(&self, phase: &str);
}

/// Progress bar for a foreground sweep pass.
pub struct Progress {
    bar: Mutex<Option<ProgressBar>>,
    reclaimed: Mutex<u64>,
    quiet: bool,
    accessible: bool,
}

impl Progress {
    /// Create a new progress reporter.
    ///
    /// # Arguments
    ///
    /// * `quiet` - If true, no progress bars will be displayed.
    /// # Examples
    ///
    /// ```
    /// use mediadupe::progress::Progress;
    ///
    /// let progress = Progress::new(false);
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self::with_accessible(quiet, false)
    }

    /// Create a new progress reporter with accessible mode.
    #[must_use]
    pub fn with_accessible(quiet: bool, accessible: bool) -> Self {
        Self {
            bar: Mutex::new(None),
            reclaimed: Mutex::new(0),
            quiet,
            accessible,
        }
    }

    fn sweep_style(&self) -> ProgressStyle {
        if self.accessible {
            ProgressStyle::with_template("[{elapsed_precise}] [{bar:40}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-")
        } else {
            ProgressStyle::with_template(
                "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█>-")
        }
    }
}

impl ProgressCallback for Progress {
    fn on_phase_start(&self, phase: &str, total: usize) {
        if self.quiet || total == 0 {
            return;
        }

        let pb = ProgressBar::new(total as u64);
        pb.set_style(self.sweep_style());
        pb.set_message(phase.to_string());
        if let Ok(mut bar) = self.bar.lock() {
            *bar = Some(pb);
        }
        if let Ok(mut reclaimed) = self.reclaimed.lock() {
            *reclaimed = 0;
        }
    }

    fn on_progress(&self, current: usize, path: &str) {
        if let Ok(bar) = self.bar.lock() {
            if let Some(pb) = bar.as_ref() {
                pb.set_position(current as u64);
                pb.set_message(truncate_path(path, 30));
            }
        }
    }

    fn on_item_completed(&self, bytes_reclaimed: u64) {
        if let Ok(mut reclaimed) = self.reclaimed.lock() {
            *reclaimed += bytes_reclaimed;
        }
    }

    fn on_phase_end(&self, _phase: &str) {
        let reclaimed = self.reclaimed.lock().map(|r| *r).unwrap_or(0);
        if let Ok(mut bar) = self.bar.lock() {
            if let Some(pb) = bar.take() {
                pb.finish_with_message(format!(
                    "done, {} reclaimed",
                    bytesize::ByteSize::b(reclaimed)
                ));
            }
        }
    }
}

/// A spinner showing a background worker's status line.
pub struct StatusSpinner {
    bar: Option<ProgressBar>,
}

impl StatusSpinner {
    #[must_use]
    pub fn new(quiet: bool, accessible: bool) -> Self {
        if quiet {
            return Self { bar: None };
        }

        let bar = ProgressBar::new_spinner();
        if accessible {
            bar.set_style(
                ProgressStyle::with_template("[{elapsed_precise}] {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
        } else {
            bar.set_style(
                ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner())
                    .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ "),
            );
        }
        let tick_rate = if accessible { 500 } else { 100 };
        bar.enable_steady_tick(Duration::from_millis(tick_rate));
        Self { bar: Some(bar) }
    }

    /// Show the latest status.
    pub fn update(&self, status: &SweepStatus) {
        if let Some(bar) = &self.bar {
            bar.set_message(format!("{}: {}", status.phase, status.message));
        }
    }

    pub fn finish(&self, status: &SweepStatus) {
        if let Some(bar) = &self.bar {
            bar.finish_with_message(status.message.clone());
        }
    }
}

/// Truncate a path for display in the progress bar.
fn truncate_path(path: &str, max_len: usize) -> String {
    if path.chars().count() <= max_len {
        return path.to_string();
    }

    let file_name = std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let name_len = file_name.chars().count();
    if name_len >= max_len {
        let tail: String = file_name.chars().skip(name_len + 3 - max_len).collect();
        return format!("...{tail}");
    }

    format!(".../{file_name}")
}
