//! Shared test utilities for integration tests
//!
//! [`FakeCloud`] is an in-memory ECS account: paged listings over a fixed
//! inventory, tag writes that mutate it, and an optional gate that holds
//! listing calls until released.

#![allow(dead_code)]

use anyhow::{Result, anyhow};
use chrono::{TimeZone, Utc};
use ecs_monitor::cloud::EcsOperations;
use ecs_monitor_common::{Instance, Network, Page, SpotPriceSample, Tag};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Default)]
struct Inventory {
    instances: Vec<Instance>,
    networks: Vec<Network>,
    spot_prices: HashMap<String, Vec<SpotPriceSample>>,
    failing_tag_writes: HashSet<String>,
    fail_listing: bool,
    tag_writes: Vec<(String, Vec<Tag>)>,
}

/// In-memory ECS account
#[derive(Clone, Default)]
pub struct FakeCloud {
    inventory: Arc<Mutex<Inventory>>,
    instance_page_requests: Arc<AtomicUsize>,
    gate: Option<Arc<Notify>>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every network listing until [`FakeCloud::release`]
    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Notify::new())),
            ..Self::default()
        }
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub fn with_network(self, id: &str, name: &str) -> Self {
        self.inventory.lock().unwrap().networks.push(Network {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    pub fn with_instance(self, instance: Instance) -> Self {
        self.inventory.lock().unwrap().instances.push(instance);
        self
    }

    pub fn with_spot_prices(self, instance_type: &str, samples: Vec<SpotPriceSample>) -> Self {
        self.inventory
            .lock()
            .unwrap()
            .spot_prices
            .insert(instance_type.to_string(), samples);
        self
    }

    pub fn fail_tag_writes_for(self, instance_id: &str) -> Self {
        self.inventory
            .lock()
            .unwrap()
            .failing_tag_writes
            .insert(instance_id.to_string());
        self
    }

    pub fn set_fail_listing(&self, fail: bool) {
        self.inventory.lock().unwrap().fail_listing = fail;
    }

    /// Remove an instance, as if it was released
    pub fn remove_instance(&self, instance_id: &str) {
        self.inventory
            .lock()
            .unwrap()
            .instances
            .retain(|i| i.id != instance_id);
    }

    pub fn tag_writes(&self) -> Vec<(String, Vec<Tag>)> {
        self.inventory.lock().unwrap().tag_writes.clone()
    }

    pub fn instance_page_requests(&self) -> usize {
        self.instance_page_requests.load(Ordering::SeqCst)
    }
}

fn page_slice<T: Clone>(items: &[T], page_number: u32, page_size: u32) -> Page<T> {
    let start = ((page_number.saturating_sub(1)) * page_size) as usize;
    let end = (start + page_size as usize).min(items.len());
    let slice = if start < items.len() { items[start..end].to_vec() } else { Vec::new() };
    Page::new(slice, items.len() as u32)
}

impl EcsOperations for FakeCloud {
    async fn list_instances_page(
        &self,
        page_number: u32,
        page_size: u32,
        tag_filter: &[Tag],
        name_filter: Option<String>,
    ) -> Result<Page<Instance>> {
        self.instance_page_requests.fetch_add(1, Ordering::SeqCst);
        let inventory = self.inventory.lock().unwrap();
        if inventory.fail_listing {
            return Err(anyhow!("DescribeInstances failed: Throttling"));
        }
        let visible: Vec<Instance> = inventory
            .instances
            .iter()
            .filter(|i| tag_filter.iter().all(|t| i.tags.contains(t)))
            .filter(|i| name_filter.as_deref().is_none_or(|n| i.name == n))
            .cloned()
            .collect();
        Ok(page_slice(&visible, page_number, page_size))
    }

    async fn list_networks_page(&self, page_number: u32, page_size: u32) -> Result<Page<Network>> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let inventory = self.inventory.lock().unwrap();
        Ok(page_slice(&inventory.networks, page_number, page_size))
    }

    async fn apply_tags(&self, instance_id: &str, tags: &[Tag]) -> Result<()> {
        let mut inventory = self.inventory.lock().unwrap();
        if inventory.failing_tag_writes.contains(instance_id) {
            return Err(anyhow!("AddTags failed for {instance_id}: Forbidden.RAM"));
        }
        let instance = inventory
            .instances
            .iter_mut()
            .find(|i| i.id == instance_id)
            .ok_or_else(|| anyhow!("AddTags failed for {instance_id}: InvalidInstanceId.NotFound"))?;
        for tag in tags {
            instance.tags.retain(|t| t.key != tag.key);
            instance.tags.push(tag.clone());
        }
        inventory.tag_writes.push((instance_id.to_string(), tags.to_vec()));
        Ok(())
    }

    async fn list_spot_price_history(&self, instance_type: &str) -> Result<Vec<SpotPriceSample>> {
        let inventory = self.inventory.lock().unwrap();
        inventory
            .spot_prices
            .get(instance_type)
            .cloned()
            .ok_or_else(|| anyhow!("DescribeSpotPriceHistory failed: InvalidInstanceType.NotFound"))
    }
}

/// Worker instance in a VPC
pub fn worker(id: &str, vpc: &str) -> Instance {
    Instance {
        id: id.to_string(),
        name: format!("worker-k8s-{id}"),
        network_id: vpc.to_string(),
        instance_type: "ecs.g6.large".to_string(),
        spot_strategy: "NoSpot".to_string(),
        ..Default::default()
    }
}

/// Spot price sample at `hour` on 2024-05-01
pub fn spot_sample(zone: &str, instance_type: &str, hour: u32, spot: f64, list: f64) -> SpotPriceSample {
    SpotPriceSample {
        zone_id: zone.to_string(),
        instance_type: instance_type.to_string(),
        spot_price: spot,
        list_price: list,
        timestamp: Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap(),
    }
}
