//! Environment tag reconciliation for Kubernetes workers
//!
//! Query runs report every matched instance as missing its tag. Update runs
//! additionally write `{Environment, role, stack}` and clear the gauge for
//! each instance tagged successfully. Instances that drop out of the
//! matching set between runs have their gauge reset to 0.

use super::RunSummary;
use crate::cloud::operations::EcsOperations;
use crate::cloud::scanner::{InstanceQuery, query_instances, query_networks};
use crate::config::TagJobConfig;
use crate::job_guard::{JobGuard, JobKind};
use crate::metrics::MetricsSink;
use anyhow::Result;
use ecs_monitor_common::metrics::{CLEARED, MISSING, labels, names};
use ecs_monitor_common::tags::k8s_worker_tags;
use ecs_monitor_common::{Instance, NetworkLookup};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, error, info, warn};

/// Label values a `notag` series was last written with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedInstance {
    pub name: String,
    /// Environment label of the instance's VPC, empty when unknown
    pub environment: String,
}

/// Instances matched by the previous successful run, by id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    instances: BTreeMap<String, TrackedInstance>,
}

impl Snapshot {
    pub fn contains(&self, instance_id: &str) -> bool {
        self.instances.contains_key(instance_id)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.instances.keys().map(String::as_str)
    }

    fn track(&mut self, instance: &Instance, environment: &str) {
        self.instances.insert(
            instance.id.clone(),
            TrackedInstance {
                name: instance.name.clone(),
                environment: environment.to_string(),
            },
        );
    }
}

/// Runs query or update passes against one account
pub struct TagReconciler<C, M> {
    cloud: C,
    metrics: M,
    guard: JobGuard,
    config: TagJobConfig,
    previous: Mutex<Snapshot>,
}

impl<C: EcsOperations, M: MetricsSink> TagReconciler<C, M> {
    pub fn new(cloud: C, metrics: M, config: TagJobConfig) -> Self {
        Self {
            cloud,
            metrics,
            guard: JobGuard::new(),
            config,
            previous: Mutex::new(Snapshot::default()),
        }
    }

    pub fn guard(&self) -> &JobGuard {
        &self.guard
    }

    pub fn kind(&self) -> JobKind {
        self.config.kind
    }

    /// Snapshot carried into the next run
    pub fn snapshot(&self) -> Snapshot {
        self.previous
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// One guarded run. Fails with [`crate::job_guard::JobError`] when the
    /// previous run has not finished; the stored snapshot only advances on
    /// success.
    pub async fn run(&self) -> Result<RunSummary> {
        let _permit = self.guard.try_start(self.config.kind)?;
        info!(kind = %self.config.kind, "Running job");

        let previous = self.snapshot();
        let (next, summary) = self.reconcile(&previous).await?;
        *self.previous.lock().unwrap_or_else(PoisonError::into_inner) = next;

        info!(%summary, "Job completed");
        Ok(summary)
    }

    /// Discovery, tag writes and gauge updates against `previous`.
    ///
    /// Does not touch the guard. Returns the snapshot for the next run.
    pub async fn reconcile(&self, previous: &Snapshot) -> Result<(Snapshot, RunSummary)> {
        let kind = self.config.kind;
        let lookup = query_networks(&self.cloud, self.config.page_size).await?;
        let query = InstanceQuery {
            rule: self.config.rule.clone(),
            name_filter: self.config.name_filter.clone(),
            page_size: self.config.page_size,
        };
        let instances = query_instances(&self.cloud, &query).await?;

        let mut summary = RunSummary::new(kind);
        summary.matched = instances.len();

        let mut next = Snapshot::default();
        for instance in &instances {
            next.track(instance, lookup.label_or_empty(&instance.network_id));
        }

        for (id, tracked) in &previous.instances {
            if !next.contains(id) {
                debug!(instance_id = %id, "Instance left the matching set");
                self.set_no_tag(id, &tracked.environment, &tracked.name, CLEARED);
                summary.cleared += 1;
            }
        }

        for instance in &instances {
            let environment = lookup.label_or_empty(&instance.network_id);
            match kind {
                JobKind::Update if self.is_target(instance) => {
                    let value = if self.tag_instance(instance, &lookup).await {
                        summary.tagged += 1;
                        CLEARED
                    } else {
                        summary.failed += 1;
                        MISSING
                    };
                    self.set_no_tag(&instance.id, environment, &instance.name, value);
                }
                JobKind::Update => {
                    debug!(instance_id = %instance.id, "Not the requested instance, skipping update");
                    self.set_no_tag(&instance.id, environment, &instance.name, MISSING);
                }
                _ => {
                    info!(
                        instance_id = %instance.id,
                        name = %instance.name,
                        environment = %environment,
                        "Instance has no environment tag"
                    );
                    self.set_no_tag(&instance.id, environment, &instance.name, MISSING);
                }
            }
        }

        Ok((next, summary))
    }

    fn is_target(&self, instance: &Instance) -> bool {
        self.config
            .instance_id
            .as_deref()
            .is_none_or(|id| id == instance.id)
    }

    /// Write the worker tags. Failures are logged, never propagated.
    async fn tag_instance(&self, instance: &Instance, lookup: &NetworkLookup) -> bool {
        let Some(environment) = lookup.environment(&instance.network_id) else {
            warn!(
                instance_id = %instance.id,
                network_id = %instance.network_id,
                "No environment known for network, not tagging"
            );
            return false;
        };

        info!(instance_id = %instance.id, name = %instance.name, %environment, "Adding tags");
        match self
            .cloud
            .apply_tags(&instance.id, &k8s_worker_tags(environment))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                error!(instance_id = %instance.id, error = %format!("{e:#}"), "Failed to add tags");
                false
            }
        }
    }

    fn set_no_tag(&self, id: &str, environment: &str, name: &str, value: f64) {
        self.metrics.set_gauge(
            names::NO_TAG,
            &[(labels::ID, id), (labels::VPC, environment), (labels::NAME, name)],
            value,
        );
    }
}
