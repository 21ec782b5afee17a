//! Instance metadata identity provider
//!
//! Reads the RAM role attached to the instance and exchanges it for a
//! temporary credential via the local metadata service.

use super::credentials::{Credential, CredentialError, IdentityProvider};
use chrono::{DateTime, Utc};
use ecs_monitor_common::defaults::{DEFAULT_METADATA_ENDPOINT, METADATA_TIMEOUT};
use serde::Deserialize;
use tracing::debug;

const ROLE_PATH: &str = "ram/security-credentials/";
const REGION_PATH: &str = "region-id";
const VPC_PATH: &str = "vpc-id";
const SUCCESS: &str = "Success";

/// Static facts about the instance this process runs on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceIdentity {
    pub role_name: String,
    pub region_id: String,
    pub vpc_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RoleCredentialDocument {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    access_key_id: String,
    #[serde(default)]
    access_key_secret: String,
    #[serde(default)]
    security_token: String,
    #[serde(default)]
    expiration: String,
}

/// Fetches role credentials from the metadata service
#[derive(Debug, Clone)]
pub struct MetadataProvider {
    http: reqwest::Client,
    base_url: String,
}

impl MetadataProvider {
    pub fn new() -> Result<Self, CredentialError> {
        Self::with_endpoint(DEFAULT_METADATA_ENDPOINT)
    }

    /// Point at a different metadata root (tests use a local server)
    pub fn with_endpoint(base_url: impl Into<String>) -> Result<Self, CredentialError> {
        let http = reqwest::Client::builder().timeout(METADATA_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get_text(&self, path: &str) -> Result<String, CredentialError> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CredentialError::Status {
                path: path.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?.trim().to_string())
    }

    /// Name of the attached RAM role
    pub async fn role_name(&self) -> Result<String, CredentialError> {
        let body = self.get_text(ROLE_PATH).await?;
        body.lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
            .ok_or(CredentialError::NoRole)
    }

    pub async fn region_id(&self) -> Result<String, CredentialError> {
        self.get_text(REGION_PATH).await
    }

    pub async fn vpc_id(&self) -> Result<String, CredentialError> {
        self.get_text(VPC_PATH).await
    }

    /// Role, region and VPC in one call
    pub async fn identity(&self) -> Result<InstanceIdentity, CredentialError> {
        Ok(InstanceIdentity {
            role_name: self.role_name().await?,
            region_id: self.region_id().await?,
            vpc_id: self.vpc_id().await?,
        })
    }

    async fn role_credential(
        &self,
        role_name: &str,
        region_id: String,
    ) -> Result<Credential, CredentialError> {
        let body = self.get_text(&format!("{ROLE_PATH}{role_name}")).await?;
        let doc: RoleCredentialDocument = serde_json::from_str(&body)?;
        if let Some(code) = doc.code.filter(|c| c != SUCCESS) {
            return Err(CredentialError::Rejected { code });
        }
        let expires_at = DateTime::parse_from_rfc3339(&doc.expiration)
            .map_err(|_| CredentialError::Expiration(doc.expiration.clone()))?
            .with_timezone(&Utc);

        debug!(role = %role_name, expires_at = %expires_at, "Fetched role credential");
        Ok(Credential {
            access_key_id: doc.access_key_id,
            access_key_secret: doc.access_key_secret,
            session_token: Some(doc.security_token),
            expires_at: Some(expires_at),
            region_id,
        })
    }
}

impl IdentityProvider for MetadataProvider {
    async fn fetch(&self) -> Result<Credential, CredentialError> {
        let role_name = self.role_name().await?;
        let region_id = self.region_id().await?;
        self.role_credential(&role_name, region_id).await
    }
}
