//! Wire format of ECS RPC responses (`Format=JSON`)
//!
//! The API nests every list one level deep (`Instances.Instance`,
//! `Tags.Tag`). These types mirror that shape and convert into the flat
//! domain snapshots from `ecs-monitor-common`.

use chrono::{DateTime, Utc};
use ecs_monitor_common::{Instance, Network, Page, SpotPriceSample, Tag};
use serde::Deserialize;

/// Error document returned with non-2xx responses
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorResponse {
    #[serde(default)]
    pub request_id: String,
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeInstancesResponse {
    pub total_count: u32,
    #[serde(default)]
    pub instances: InstanceSet,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InstanceSet {
    #[serde(default)]
    pub instance: Vec<InstanceRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InstanceRecord {
    pub instance_id: String,
    #[serde(default)]
    pub instance_name: String,
    #[serde(default)]
    pub instance_type: String,
    #[serde(default)]
    pub spot_strategy: String,
    #[serde(default)]
    pub vpc_attributes: VpcAttributes,
    #[serde(default)]
    pub tags: TagSet,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VpcAttributes {
    #[serde(default)]
    pub vpc_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TagSet {
    #[serde(default)]
    pub tag: Vec<TagRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TagRecord {
    pub tag_key: String,
    #[serde(default)]
    pub tag_value: String,
}

impl From<InstanceRecord> for Instance {
    fn from(r: InstanceRecord) -> Self {
        Instance {
            id: r.instance_id,
            name: r.instance_name,
            network_id: r.vpc_attributes.vpc_id,
            tags: r
                .tags
                .tag
                .into_iter()
                .map(|t| Tag::new(t.tag_key, t.tag_value))
                .collect(),
            spot_strategy: r.spot_strategy,
            instance_type: r.instance_type,
        }
    }
}

impl From<DescribeInstancesResponse> for Page<Instance> {
    fn from(r: DescribeInstancesResponse) -> Self {
        Page::new(
            r.instances.instance.into_iter().map(Instance::from).collect(),
            r.total_count,
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeVpcsResponse {
    pub total_count: u32,
    #[serde(default)]
    pub vpcs: VpcSet,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VpcSet {
    #[serde(default)]
    pub vpc: Vec<VpcRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VpcRecord {
    pub vpc_id: String,
    #[serde(default)]
    pub vpc_name: String,
}

impl From<DescribeVpcsResponse> for Page<Network> {
    fn from(r: DescribeVpcsResponse) -> Self {
        Page::new(
            r.vpcs
                .vpc
                .into_iter()
                .map(|v| Network {
                    id: v.vpc_id,
                    name: v.vpc_name,
                })
                .collect(),
            r.total_count,
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeSpotPriceHistoryResponse {
    #[serde(default)]
    pub spot_prices: SpotPriceSet,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SpotPriceSet {
    #[serde(default)]
    pub spot_price_type: Vec<SpotPriceRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SpotPriceRecord {
    pub zone_id: String,
    #[serde(default)]
    pub instance_type: String,
    pub spot_price: f64,
    pub origin_price: f64,
    pub timestamp: DateTime<Utc>,
}

impl SpotPriceRecord {
    /// Convert, falling back to the requested type when the record omits it
    pub fn into_sample(self, requested_type: &str) -> SpotPriceSample {
        let instance_type = if self.instance_type.is_empty() {
            requested_type.to_string()
        } else {
            self.instance_type
        };
        SpotPriceSample {
            zone_id: self.zone_id,
            instance_type,
            spot_price: self.spot_price,
            list_price: self.origin_price,
            timestamp: self.timestamp,
        }
    }
}
