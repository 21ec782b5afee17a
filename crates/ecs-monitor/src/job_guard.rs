//! Single-flight guard for recurring jobs
//!
//! A scheduled firing that arrives while the previous run is still going is
//! rejected rather than queued. Running flag and kind live under one lock so
//! they are always observed together.

use std::sync::{Mutex, MutexGuard, PoisonError};
use strum::{Display, EnumString, IntoStaticStr};
use thiserror::Error;
use tracing::debug;

/// Unit of work a guard can be running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum JobKind {
    /// Report instances missing the environment tag
    Query,
    /// Tag Kubernetes workers with their environment
    Update,
    /// Export spot and list prices
    SpotPrice,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("job is still running: {kind}")]
    AlreadyRunning { kind: JobKind },
}

/// Consistent snapshot of a guard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobState {
    pub is_running: bool,
    pub kind: Option<JobKind>,
}

/// Mutual exclusion around one recurring job
#[derive(Debug, Default)]
pub struct JobGuard {
    state: Mutex<JobState>,
}

impl JobGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, JobState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move from idle to running. The returned permit finishes the job on drop.
    pub fn try_start(&self, kind: JobKind) -> Result<JobPermit<'_>, JobError> {
        let mut state = self.lock();
        if state.is_running {
            return Err(JobError::AlreadyRunning {
                kind: state.kind.unwrap_or(kind),
            });
        }
        *state = JobState {
            is_running: true,
            kind: Some(kind),
        };
        debug!(%kind, "Job started");
        Ok(JobPermit { guard: self, kind })
    }

    /// Return to idle, whether or not a start preceded it
    pub fn finish(&self) {
        *self.lock() = JobState::default();
    }

    pub fn snapshot(&self) -> JobState {
        *self.lock()
    }

    pub fn is_running(&self) -> bool {
        self.lock().is_running
    }
}

/// Proof of a successful [`JobGuard::try_start`]
#[derive(Debug)]
#[must_use = "the job finishes as soon as the permit is dropped"]
pub struct JobPermit<'a> {
    guard: &'a JobGuard,
    kind: JobKind,
}

impl JobPermit<'_> {
    pub fn kind(&self) -> JobKind {
        self.kind
    }
}

impl Drop for JobPermit<'_> {
    fn drop(&mut self) {
        self.guard.finish();
        debug!(kind = %self.kind, "Job finished");
    }
}
