//! ecs-monitor - ECS tag compliance and spot price monitoring
//!
//! Discovers ECS instances, reports those missing their environment tag,
//! optionally tags Kubernetes workers, and exports spot prices, all as
//! Prometheus gauges. Runs once or on a cron schedule.

pub mod cloud;
pub mod config;
pub mod job_guard;
pub mod logging;
pub mod metrics;
pub mod reconcile;
pub mod schedule;
