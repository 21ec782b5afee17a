//! Spot price export for the instance types Kubernetes workers run on

use super::RunSummary;
use crate::cloud::operations::EcsOperations;
use crate::cloud::scanner::{InstanceQuery, query_instances};
use crate::config::SpotJobConfig;
use crate::job_guard::{JobGuard, JobKind};
use crate::metrics::MetricsSink;
use anyhow::{Context, Result};
use ecs_monitor_common::metrics::{labels, names};
use ecs_monitor_common::tags::K8S_WORKER_NAME_PATTERN;
use ecs_monitor_common::{FilterRule, Instance, latest_per_zone};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Distinct instance types of spot instances, sorted
pub fn spot_instance_types(instances: &[Instance]) -> BTreeSet<String> {
    instances
        .iter()
        .filter(|i| i.is_spot())
        .map(|i| i.instance_type.clone())
        .collect()
}

pub struct SpotReconciler<C, M> {
    cloud: C,
    metrics: M,
    guard: JobGuard,
    query: InstanceQuery,
}

impl<C: EcsOperations, M: MetricsSink> SpotReconciler<C, M> {
    pub fn new(cloud: C, metrics: M, config: SpotJobConfig) -> Result<Self> {
        let rule = FilterRule::new(&[K8S_WORKER_NAME_PATTERN], vec![], &[], &[])
            .context("Invalid worker name pattern")?;
        Ok(Self {
            cloud,
            metrics,
            guard: JobGuard::new(),
            query: InstanceQuery::new(rule, config.page_size),
        })
    }

    pub fn guard(&self) -> &JobGuard {
        &self.guard
    }

    /// One guarded run. A failed price lookup aborts the run.
    pub async fn run(&self) -> Result<RunSummary> {
        let _permit = self.guard.try_start(JobKind::SpotPrice)?;
        info!(kind = %JobKind::SpotPrice, "Running job");

        let instances = query_instances(&self.cloud, &self.query).await?;
        let mut summary = RunSummary::new(JobKind::SpotPrice);
        summary.matched = instances.len();

        for instance_type in spot_instance_types(&instances) {
            let history = self
                .cloud
                .list_spot_price_history(&instance_type)
                .await
                .with_context(|| format!("Failed to query spot price for {instance_type}"))?;

            for sample in latest_per_zone(history) {
                let series = [(labels::ZONE_ID, sample.zone_id.as_str()), (labels::TYPE, instance_type.as_str())];
                self.metrics.set_gauge(names::SPOT_PRICE, &series, sample.spot_price);
                self.metrics.set_gauge(names::LIST_PRICE, &series, sample.list_price);
                debug!(
                    instance_type = %instance_type,
                    zone = %sample.zone_id,
                    spot_price = sample.spot_price,
                    list_price = sample.list_price,
                    "Spot price"
                );
                summary.tagged += 1;
            }
        }

        info!(%summary, "Job completed");
        Ok(summary)
    }
}
