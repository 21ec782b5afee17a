//! Spot price samples and per-zone de-duplication

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// One point of spot price history
#[derive(Debug, Clone, PartialEq)]
pub struct SpotPriceSample {
    pub zone_id: String,
    pub instance_type: String,
    pub spot_price: f64,
    /// On-demand price for the same zone and type
    pub list_price: f64,
    pub timestamp: DateTime<Utc>,
}

/// Keep only the most recent sample per zone.
///
/// Providers return history in no guaranteed order, so the newest
/// timestamp wins regardless of position. The result is ordered by zone id.
pub fn latest_per_zone(samples: impl IntoIterator<Item = SpotPriceSample>) -> Vec<SpotPriceSample> {
    let mut latest: BTreeMap<String, SpotPriceSample> = BTreeMap::new();
    for sample in samples {
        match latest.get(&sample.zone_id) {
            Some(current) if current.timestamp >= sample.timestamp => {}
            _ => {
                latest.insert(sample.zone_id.clone(), sample);
            }
        }
    }
    latest.into_values().collect()
}
