//! Configuration types for the monitor
//!
//! The CLI layer turns flags into these validated structs before any cloud
//! call is made: regexes are compiled, tags parsed and cron expressions
//! checked up front.

use crate::cloud::credentials::{Credential, CredentialError};
use crate::job_guard::JobKind;
use crate::schedule::{Schedule, parse_schedule};
use anyhow::{Context, Result, ensure};
use ecs_monitor_common::defaults::{DEFAULT_ECS_ENDPOINT, DEFAULT_METADATA_ENDPOINT};
use ecs_monitor_common::tags::{K8S_WORKER_NAME_PATTERN, TAG_ENVIRONMENT};
use ecs_monitor_common::{FilterRule, Tag};

/// Cloud endpoints and credential source
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// ECS RPC endpoint
    pub endpoint: String,
    /// Instance metadata service root
    pub metadata_endpoint: String,
    pub region: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ECS_ENDPOINT.to_string(),
            metadata_endpoint: DEFAULT_METADATA_ENDPOINT.to_string(),
            region: None,
            access_key: None,
            secret_key: None,
        }
    }
}

impl CloudConfig {
    /// Static key pair when one is configured.
    ///
    /// `None` means role credentials from the metadata service. A key
    /// without its secret or region is an error rather than a silent
    /// fallback.
    pub fn static_credential(&self) -> Result<Option<Credential>, CredentialError> {
        let non_empty = |v: &Option<String>| v.as_deref().filter(|s| !s.is_empty()).map(str::to_string);
        let (key, secret, region) = (
            non_empty(&self.access_key),
            non_empty(&self.secret_key),
            non_empty(&self.region),
        );
        match (key, secret, region) {
            (None, None, _) => Ok(None),
            (Some(key), Some(secret), Some(region)) => Ok(Some(Credential::fixed(key, secret, region))),
            (None, _, _) => Err(CredentialError::Incomplete("ALICLOUD_ACCESS_KEY")),
            (_, None, _) => Err(CredentialError::Incomplete("ALICLOUD_SECRET_KEY")),
            (_, _, None) => Err(CredentialError::Incomplete("ALICLOUD_REGION")),
        }
    }
}

/// Tag query or update job
#[derive(Debug, Clone)]
pub struct TagJobConfig {
    /// [`JobKind::Query`] or [`JobKind::Update`]
    pub kind: JobKind,
    pub rule: FilterRule,
    /// Exact instance name, passed to the listing call
    pub name_filter: Option<String>,
    /// Restrict tag writes to this instance
    pub instance_id: Option<String>,
    pub page_size: u32,
    /// Recurring schedule; `None` runs once
    pub schedule: Option<Schedule>,
}

impl TagJobConfig {
    /// Query job from raw flag values
    pub fn query(
        name_patterns: &[String],
        tags: &[String],
        no_tag_keys: &[String],
        no_tag_values: &[String],
        name_filter: Option<String>,
        page_size: u32,
        cron: Option<&str>,
    ) -> Result<Self> {
        let tags = tags
            .iter()
            .map(|t| t.parse::<Tag>())
            .collect::<Result<Vec<_>, _>>()
            .context("Invalid --tag")?;
        let rule = FilterRule::new(name_patterns, tags, no_tag_keys, no_tag_values)?;
        Ok(Self {
            kind: JobKind::Query,
            rule,
            name_filter: name_filter.filter(|n| !n.is_empty()),
            instance_id: None,
            page_size: validate_page_size(page_size)?,
            schedule: cron.map(parse_schedule).transpose()?,
        })
    }

    /// Update job: workers named `worker-k8s.*` without an `Environment` tag
    pub fn update_k8s_workers(
        instance_id: Option<String>,
        page_size: u32,
        cron: Option<&str>,
    ) -> Result<Self> {
        let rule = FilterRule::new(&[K8S_WORKER_NAME_PATTERN], vec![], &[TAG_ENVIRONMENT], &[])?;
        Ok(Self {
            kind: JobKind::Update,
            rule,
            name_filter: None,
            instance_id: instance_id.filter(|i| !i.is_empty()),
            page_size: validate_page_size(page_size)?,
            schedule: cron.map(parse_schedule).transpose()?,
        })
    }
}

/// Spot price export job
#[derive(Debug, Clone)]
pub struct SpotJobConfig {
    pub page_size: u32,
    pub schedule: Option<Schedule>,
}

impl SpotJobConfig {
    pub fn new(page_size: u32, cron: Option<&str>) -> Result<Self> {
        Ok(Self {
            page_size: validate_page_size(page_size)?,
            schedule: cron.map(parse_schedule).transpose()?,
        })
    }
}

fn validate_page_size(page_size: u32) -> Result<u32> {
    ensure!(page_size >= 1, "page size must be at least 1, got {page_size}");
    Ok(page_size)
}
