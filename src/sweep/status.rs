//! Observable worker status.
//!
//! The worker writes, everyone else reads. Readers always get a consistent
//! snapshot via [`StatusHandle::snapshot`].

use serde::Serialize;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use super::report::SweepReport;

pub const STATUS_STARTING: &str = "Starting up...";
pub const STATUS_IDLE: &str = "Ready for new files...";
pub const STATUS_FINISHED: &str = "Finished.";

/// "Deduplicating (N) files..." for `remaining` files left in the pass.
#[must_use]
pub fn deduplicating_message(remaining: usize) -> String {
    format!("Deduplicating ({remaining}) files...")
}

/// Lifecycle of the sweep worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepPhase {
    #[default]
    Starting,
    Scanning,
    IdleWait,
    FinalScan,
    Stopping,
    Stopped,
}

impl fmt::Display for SweepPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Starting => "starting",
            Self::Scanning => "scanning",
            Self::IdleWait => "idle",
            Self::FinalScan => "final scan",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepStatus {
    pub phase: SweepPhase,
    /// Human-readable status line.
    pub message: String,
    /// Files left in the current pass.
    pub remaining: usize,
    pub running: bool,
    /// Set when the worker terminated on a fatal error.
    pub last_error: Option<String>,
    pub last_report: Option<SweepReport>,
}

impl Default for SweepStatus {
    fn default() -> Self {
        Self {
            phase: SweepPhase::Starting,
            message: String::new(),
            remaining: 0,
            running: false,
            last_error: None,
            last_report: None,
        }
    }
}

/// Shared handle to a worker's [`SweepStatus`].
#[derive(Debug, Clone, Default)]
pub struct StatusHandle {
    inner: Arc<RwLock<SweepStatus>>,
}

impl StatusHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the current status.
    #[must_use]
    pub fn snapshot(&self) -> SweepStatus {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update(&self, f: impl FnOnce(&mut SweepStatus)) {
        let mut status = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut status);
    }

    pub(crate) fn starting(&self) {
        self.update(|s| {
            s.phase = SweepPhase::Starting;
            s.message = STATUS_STARTING.to_string();
            s.remaining = 0;
            s.running = true;
            s.last_error = None;
        });
    }

    pub(crate) fn set_phase(&self, phase: SweepPhase) {
        self.update(|s| s.phase = phase);
    }

    pub(crate) fn idle(&self) {
        self.update(|s| {
            s.phase = SweepPhase::IdleWait;
            s.message = STATUS_IDLE.to_string();
            s.remaining = 0;
        });
    }

    pub(crate) fn set_remaining(&self, remaining: usize) {
        self.update(|s| {
            s.remaining = remaining;
            s.message = deduplicating_message(remaining);
        });
    }

    pub(crate) fn record_report(&self, report: &SweepReport) {
        self.update(|s| s.last_report = Some(report.clone()));
    }

    pub(crate) fn finished(&self) {
        self.update(|s| {
            s.phase = SweepPhase::Stopped;
            s.message = STATUS_FINISHED.to_string();
            s.remaining = 0;
            s.running = false;
        });
    }

    pub(crate) fn failed(&self, error: String) {
        self.update(|s| {
            s.phase = SweepPhase::Stopped;
            s.message = format!("Stopped on error: {error}");
            s.running = false;
            s.last_error = Some(error);
        });
    }
}
