//! Shared Prometheus metric names and label keys.
//!
//! Single source of truth for the gauges exported by the tag and spot-price
//! jobs, so reconcilers and the exporter agree on names and label sets.

/// Gauge names
pub mod names {
    /// 1 while an instance is missing its environment tag, else 0
    pub const NO_TAG: &str = "notag";
    /// Watchdog for the tag checking jobs
    pub const NO_TAG_WATCHDOG: &str = "notagwatchdog";
    /// Spot price per zone and instance type
    pub const SPOT_PRICE: &str = "ecsspotprice";
    /// List (on-demand) price per zone and instance type
    pub const LIST_PRICE: &str = "ecslistprice";
    /// Watchdog for the spot price job
    pub const SPOT_PRICE_WATCHDOG: &str = "spotpricewatchdog";
}

/// Label keys
pub mod labels {
    pub const ID: &str = "id";
    pub const VPC: &str = "vpc";
    pub const NAME: &str = "name";
    pub const ZONE_ID: &str = "zoneid";
    pub const TYPE: &str = "type";
}

/// Help text for each gauge, in registration order
pub const GAUGES: &[(&str, &str, &[&str])] = &[
    (
        names::NO_TAG,
        "No environment tag on ecs instance.",
        &[labels::ID, labels::VPC, labels::NAME],
    ),
    (
        names::NO_TAG_WATCHDOG,
        "Watchdog for no tag checking program.",
        &[labels::NAME],
    ),
    (
        names::SPOT_PRICE,
        "Spot price for ecs instance.",
        &[labels::ZONE_ID, labels::TYPE],
    ),
    (
        names::LIST_PRICE,
        "List price for ecs instance.",
        &[labels::ZONE_ID, labels::TYPE],
    ),
    (
        names::SPOT_PRICE_WATCHDOG,
        "Watchdog for spot price checking program.",
        &[labels::NAME],
    ),
];

/// Gauge value for an instance still missing its tag
pub const MISSING: f64 = 1.0;

/// Gauge value for an instance that is tagged or no longer tracked
pub const CLEARED: f64 = 0.0;
