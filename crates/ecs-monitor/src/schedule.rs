//! Recurring job trigger driven by a cron expression
//!
//! Expressions have six fields with seconds first (`0 */5 * * * *`). Each
//! firing is spawned as its own task, so a slow run never delays the next
//! firing; overlapping runs are left to the job's guard to reject.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use croner::Cron;
use std::fmt;
use std::future::Future;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A parsed cron expression
#[derive(Debug, Clone)]
pub struct Schedule {
    expression: String,
    cron: Cron,
}

impl Schedule {
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First firing strictly after `t`
    pub fn next_after(&self, t: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.cron.find_next_occurrence(t, false).ok()
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

/// Parse a six-field cron expression
pub fn parse_schedule(expr: &str) -> Result<Schedule> {
    let expression = expr.trim().to_string();
    let cron = Cron::new(&expression)
        .with_seconds_required()
        .parse()
        .with_context(|| format!("Invalid cron expression {expr:?}"))?;
    Ok(Schedule { expression, cron })
}

/// Map a wall-clock instant onto the runtime clock
fn deadline(origin: (Instant, DateTime<Utc>), at: DateTime<Utc>) -> Instant {
    let offset = (at - origin.1).to_std().unwrap_or_default();
    origin.0 + offset
}

/// Fire `job` on every tick of `schedule` until `cancel` fires.
pub async fn run_scheduled<F, Fut>(schedule: Schedule, cancel: CancellationToken, mut job: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let origin = (Instant::now(), Utc::now());
    let mut cursor = origin.1;
    info!(schedule = %schedule, "Scheduler started");

    loop {
        let Some(next) = schedule.next_after(&cursor) else {
            warn!(schedule = %schedule, "Schedule has no further firings");
            return;
        };
        debug!(next = %next, "Next scheduled run");

        tokio::select! {
            _ = tokio::time::sleep_until(deadline(origin, next)) => {}
            _ = cancel.cancelled() => {
                info!("Scheduler stopped");
                return;
            }
        }

        cursor = next;
        tokio::spawn(job());
    }
}
