//! ecs-monitor-common - Shared domain types and pure decision logic
//!
//! This crate holds everything that does not talk to the network, so it can
//! be tested in isolation and reused by tooling around ecs-monitor.
//!
//! ## Modules
//!
//! - [`defaults`]: Default configuration values
//! - [`filter`]: Instance inclusion rules
//! - [`metrics`]: Prometheus gauge names and label keys
//! - [`model`]: Instance, network, tag and page snapshots
//! - [`network`]: VPC to environment label mapping
//! - [`spot`]: Spot price samples and de-duplication
//! - [`tags`]: Kubernetes worker tag constants

pub mod defaults;
pub mod filter;
pub mod metrics;
pub mod model;
pub mod network;
pub mod spot;
pub mod tags;

// Re-export commonly used types
pub use filter::{Decision, FilterError, FilterRule};
pub use model::{Instance, Network, Page, Tag};
pub use network::{NetworkLookup, environment_label};
pub use spot::{SpotPriceSample, latest_per_zone};
