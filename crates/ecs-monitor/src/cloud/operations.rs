//! ECS operations trait for testing

use super::client::EcsClient;
use anyhow::Result;
use ecs_monitor_common::{Instance, Network, Page, SpotPriceSample, Tag};

/// Trait for the ECS calls the reconcilers make.
///
/// Abstracts the client so discovery and reconcile logic can be tested
/// without a live endpoint.
///
/// Note: `name_filter` is `Option<String>` instead of `Option<&str>` to work
/// around mockall lifetime limitations.
#[allow(async_fn_in_trait)] // Internal use only, Send+Sync bounds on trait are sufficient
#[cfg_attr(test, mockall::automock)]
pub trait EcsOperations: Send + Sync {
    /// List one page of instances, pre-filtered server-side by tags and name
    async fn list_instances_page(
        &self,
        page_number: u32,
        page_size: u32,
        tag_filter: &[Tag],
        name_filter: Option<String>,
    ) -> Result<Page<Instance>>;

    /// List one page of VPCs
    async fn list_networks_page(&self, page_number: u32, page_size: u32) -> Result<Page<Network>>;

    /// Attach tags to an instance
    async fn apply_tags(&self, instance_id: &str, tags: &[Tag]) -> Result<()>;

    /// Spot price history for an instance type
    async fn list_spot_price_history(&self, instance_type: &str) -> Result<Vec<SpotPriceSample>>;
}

impl EcsOperations for EcsClient {
    async fn list_instances_page(
        &self,
        page_number: u32,
        page_size: u32,
        tag_filter: &[Tag],
        name_filter: Option<String>,
    ) -> Result<Page<Instance>> {
        EcsClient::describe_instances(self, page_number, page_size, tag_filter, name_filter.as_deref())
            .await
    }

    async fn list_networks_page(&self, page_number: u32, page_size: u32) -> Result<Page<Network>> {
        EcsClient::describe_vpcs(self, page_number, page_size).await
    }

    async fn apply_tags(&self, instance_id: &str, tags: &[Tag]) -> Result<()> {
        EcsClient::add_tags(self, instance_id, tags).await
    }

    async fn list_spot_price_history(&self, instance_type: &str) -> Result<Vec<SpotPriceSample>> {
        EcsClient::describe_spot_price_history(self, instance_type).await
    }
}
