//! ECS RPC client
//!
//! Every request is signed with the credential current at send time, so a
//! refresh never invalidates calls issued afterwards. Throttling responses
//! are retried with exponential backoff; anything else surfaces at once.

use super::credentials::CredentialStore;
use super::error::CloudError;
use super::signer::{self, SIGNATURE_METHOD, SIGNATURE_VERSION, TIMESTAMP_FORMAT};
use super::types::{
    DescribeInstancesResponse, DescribeSpotPriceHistoryResponse, DescribeVpcsResponse,
    ErrorResponse,
};
use anyhow::{Context, Result};
use backon::{ExponentialBuilder, Retryable};
use chrono::Utc;
use ecs_monitor_common::defaults::{API_TIMEOUT, DEFAULT_ECS_ENDPOINT, ECS_API_VERSION, SPOT_NETWORK_TYPE};
use ecs_monitor_common::{Instance, Network, Page, SpotPriceSample, Tag};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Backoff applied to throttled calls
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub max_retries: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(20),
            max_retries: 4,
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries)
            .with_jitter()
    }
}

/// Signed HTTP client for the ECS RPC API
#[derive(Clone)]
pub struct EcsClient {
    http: reqwest::Client,
    endpoint: String,
    credentials: CredentialStore,
    retry: RetryPolicy,
}

impl EcsClient {
    /// Client for the default public endpoint
    pub fn new(credentials: CredentialStore) -> Result<Self, CloudError> {
        Self::with_endpoint(credentials, DEFAULT_ECS_ENDPOINT)
    }

    pub fn with_endpoint(
        credentials: CredentialStore,
        endpoint: impl Into<String>,
    ) -> Result<Self, CloudError> {
        let http = reqwest::Client::builder().timeout(API_TIMEOUT).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            credentials,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Add the common parameters and sign with the current credential
    fn signed_url(&self, action: &str, params: &[(String, String)]) -> Result<String, CloudError> {
        let credential = self.credentials.current();

        let mut all: BTreeMap<String, String> = params.iter().cloned().collect();
        for (k, v) in [
            ("Action", action.to_string()),
            ("Format", "JSON".to_string()),
            ("Version", ECS_API_VERSION.to_string()),
            ("AccessKeyId", credential.access_key_id.clone()),
            ("SignatureMethod", SIGNATURE_METHOD.to_string()),
            ("SignatureVersion", SIGNATURE_VERSION.to_string()),
            ("SignatureNonce", uuid::Uuid::new_v4().to_string()),
            ("Timestamp", Utc::now().format(TIMESTAMP_FORMAT).to_string()),
            ("RegionId", credential.region_id.clone()),
        ] {
            all.insert(k.to_string(), v);
        }
        if let Some(token) = &credential.session_token {
            all.insert("SecurityToken".to_string(), token.clone());
        }

        let query = signer::signed_query(&all, &credential.access_key_secret)?;
        Ok(format!("{}/?{}", self.endpoint, query))
    }

    async fn call_once<T: DeserializeOwned>(
        &self,
        action: &str,
        params: &[(String, String)],
    ) -> Result<T, CloudError> {
        let url = self.signed_url(action, params)?;
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(e) => CloudError::Api {
                    status: status.as_u16(),
                    code: e.code,
                    message: e.message,
                    request_id: e.request_id,
                },
                Err(_) => CloudError::Api {
                    status: status.as_u16(),
                    code: format!("HTTP{}", status.as_u16()),
                    message: body.chars().take(200).collect(),
                    request_id: String::new(),
                },
            });
        }

        debug!(action, bytes = body.len(), "ECS call succeeded");
        Ok(serde_json::from_str(&body)?)
    }

    /// Call an action, retrying while the provider throttles us
    async fn call<T: DeserializeOwned>(
        &self,
        action: &'static str,
        params: Vec<(String, String)>,
    ) -> Result<T, CloudError> {
        (|| self.call_once::<T>(action, &params))
            .retry(self.retry.backoff())
            .when(CloudError::is_throttled)
            .notify(|e, delay| {
                warn!(action, delay = ?delay, error = %e, "ECS call throttled, retrying");
            })
            .await
    }

    /// One page of `DescribeInstances`
    pub async fn describe_instances(
        &self,
        page_number: u32,
        page_size: u32,
        tag_filter: &[Tag],
        name_filter: Option<&str>,
    ) -> Result<Page<Instance>> {
        let mut params = vec![
            ("PageNumber".to_string(), page_number.to_string()),
            ("PageSize".to_string(), page_size.to_string()),
        ];
        params.extend(tag_params(tag_filter));
        if let Some(name) = name_filter.filter(|n| !n.is_empty()) {
            params.push(("InstanceName".to_string(), name.to_string()));
        }

        let response: DescribeInstancesResponse = self
            .call("DescribeInstances", params)
            .await
            .context("DescribeInstances failed")?;
        Ok(response.into())
    }

    /// One page of `DescribeVpcs`
    pub async fn describe_vpcs(&self, page_number: u32, page_size: u32) -> Result<Page<Network>> {
        let params = vec![
            ("PageNumber".to_string(), page_number.to_string()),
            ("PageSize".to_string(), page_size.to_string()),
        ];
        let response: DescribeVpcsResponse = self
            .call("DescribeVpcs", params)
            .await
            .context("DescribeVpcs failed")?;
        Ok(response.into())
    }

    /// Attach tags to an instance, overwriting existing values for the same keys
    pub async fn add_tags(&self, instance_id: &str, tags: &[Tag]) -> Result<()> {
        let mut params = vec![
            ("ResourceType".to_string(), "instance".to_string()),
            ("ResourceId".to_string(), instance_id.to_string()),
        ];
        params.extend(tag_params(tags));

        let _: serde_json::Value = self
            .call("AddTags", params)
            .await
            .with_context(|| format!("AddTags failed for {instance_id}"))?;
        Ok(())
    }

    /// Spot price history for one instance type in VPC networks
    pub async fn describe_spot_price_history(
        &self,
        instance_type: &str,
    ) -> Result<Vec<SpotPriceSample>> {
        let params = vec![
            ("NetworkType".to_string(), SPOT_NETWORK_TYPE.to_string()),
            ("InstanceType".to_string(), instance_type.to_string()),
        ];
        let response: DescribeSpotPriceHistoryResponse = self
            .call("DescribeSpotPriceHistory", params)
            .await
            .with_context(|| format!("DescribeSpotPriceHistory failed for {instance_type}"))?;
        Ok(response
            .spot_prices
            .spot_price_type
            .into_iter()
            .map(|r| r.into_sample(instance_type))
            .collect())
    }
}

impl std::fmt::Debug for EcsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcsClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

/// Encode tags as `Tag.N.Key` / `Tag.N.Value`, 1-based
fn tag_params(tags: &[Tag]) -> Vec<(String, String)> {
    tags.iter()
        .enumerate()
        .flat_map(|(i, tag)| {
            let n = i + 1;
            [
                (format!("Tag.{n}.Key"), tag.key.clone()),
                (format!("Tag.{n}.Value"), tag.value.clone()),
            ]
        })
        .collect()
}
