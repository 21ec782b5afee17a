//! One run of a monitoring job
//!
//! A run takes the job's guard, discovers resources, writes gauges and
//! releases the guard on every exit path.

pub mod spot;
pub mod tags;

pub use spot::SpotReconciler;
pub use tags::{Snapshot, TagReconciler, TrackedInstance};

use crate::job_guard::{JobError, JobKind};
use std::fmt;

/// Counts reported at the end of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub kind: JobKind,
    /// Instances that passed the filter
    pub matched: usize,
    /// Successful tag writes (or price series written, for spot runs)
    pub tagged: usize,
    /// Tag writes that failed or were skipped
    pub failed: usize,
    /// Gauges reset for instances that left the matching set
    pub cleared: usize,
}

impl RunSummary {
    pub fn new(kind: JobKind) -> Self {
        Self {
            kind,
            matched: 0,
            tagged: 0,
            failed: 0,
            cleared: 0,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: matched={} tagged={} failed={} cleared={}",
            self.kind, self.matched, self.tagged, self.failed, self.cleared
        )
    }
}

/// Whether a run failed only because the previous one is still going
pub fn is_already_running(error: &anyhow::Error) -> bool {
    error
        .chain()
        .any(|cause| matches!(cause.downcast_ref::<JobError>(), Some(JobError::AlreadyRunning { .. })))
}
