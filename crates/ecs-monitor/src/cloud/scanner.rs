//! Paginated discovery of instances and networks
//!
//! Walks a paged listing from page 1 until the provider reports nothing
//! left (`total - page * size <= 0`), even when a page came back exactly
//! full. A failed page aborts the walk and drops what was collected.

use super::operations::EcsOperations;
use anyhow::{Context, Result, ensure};
use ecs_monitor_common::{Decision, FilterRule, Instance, NetworkLookup, Page};
use std::future::Future;
use tracing::debug;

/// Parameters of one instance discovery
#[derive(Debug, Clone)]
pub struct InstanceQuery {
    pub rule: FilterRule,
    /// Exact instance name, applied server-side
    pub name_filter: Option<String>,
    pub page_size: u32,
}

impl InstanceQuery {
    pub fn new(rule: FilterRule, page_size: u32) -> Self {
        Self {
            rule,
            name_filter: None,
            page_size,
        }
    }

    pub fn with_name_filter(mut self, name: impl Into<String>) -> Self {
        self.name_filter = Some(name.into());
        self
    }
}

/// Fetch every page and return the concatenated items in listing order.
pub async fn collect_pages<T, F, Fut>(page_size: u32, mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    ensure!(page_size > 0, "page size must be at least 1");

    let mut items = Vec::new();
    let mut page_number = 1u32;
    loop {
        let page = fetch(page_number)
            .await
            .with_context(|| format!("Failed to fetch page {page_number}"))?;
        let total = page.total_count;
        items.extend(page.items);

        let remaining = i64::from(total) - i64::from(page_number) * i64::from(page_size);
        if remaining <= 0 {
            debug!(pages = page_number, total, "Listing complete");
            return Ok(items);
        }
        page_number += 1;
    }
}

/// Discover every instance that passes `query.rule`
pub async fn query_instances<C: EcsOperations>(cloud: &C, query: &InstanceQuery) -> Result<Vec<Instance>> {
    let rule = &query.rule;
    let listed = collect_pages(query.page_size, |page_number| {
        cloud.list_instances_page(
            page_number,
            query.page_size,
            rule.exact_tags(),
            query.name_filter.clone(),
        )
    })
    .await
    .context("Instance discovery failed")?;

    let listed_count = listed.len();
    let matched: Vec<Instance> = listed
        .into_iter()
        .filter(|instance| match rule.evaluate(instance) {
            Decision::Included => true,
            decision => {
                debug!(instance_id = %instance.id, name = %instance.name, ?decision, "Instance excluded");
                false
            }
        })
        .collect();

    debug!(listed = listed_count, matched = matched.len(), "Instance discovery finished");
    Ok(matched)
}

/// Build the network-id to environment mapping from every VPC
pub async fn query_networks<C: EcsOperations>(cloud: &C, page_size: u32) -> Result<NetworkLookup> {
    let networks = collect_pages(page_size, |page_number| {
        cloud.list_networks_page(page_number, page_size)
    })
    .await
    .context("Network discovery failed")?;

    Ok(networks.into_iter().collect())
}
