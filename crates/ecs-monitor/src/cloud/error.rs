//! ECS API error classification
//!
//! Provides typed errors for ECS RPC calls, classified by the provider's
//! `Code` field rather than by matching on message text.

use thiserror::Error;

/// Errors returned by the ECS RPC client
#[derive(Debug, Error)]
pub enum CloudError {
    /// Provider rejected the request with an error document
    #[error("{code}: {message} (request id: {request_id})")]
    Api {
        status: u16,
        code: String,
        message: String,
        request_id: String,
    },

    /// Transport failure before a response was received
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body did not match the expected shape
    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Request could not be signed
    #[error("Failed to sign request: {0}")]
    Signing(String),
}

/// Provider codes meaning "slow down and retry"
const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "Throttling.User",
    "Throttling.Api",
    "ServiceUnavailable",
    "InternalError",
];

/// Provider codes meaning the target resource does not exist
const NOT_FOUND_CODES: &[&str] = &[
    "InvalidInstanceId.NotFound",
    "InvalidResourceId.NotFound",
    "InvalidVpcId.NotFound",
];

/// Provider codes meaning the credential was rejected
const CREDENTIAL_CODES: &[&str] = &[
    "InvalidAccessKeyId.NotFound",
    "InvalidAccessKeyId.Inactive",
    "InvalidSecurityToken.Expired",
    "InvalidSecurityToken.Malformed",
    "InvalidSecurityToken.MismatchWithAccessKey",
    "SignatureDoesNotMatch",
];

impl CloudError {
    /// Provider error code, if the provider answered
    pub fn code(&self) -> Option<&str> {
        match self {
            CloudError::Api { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Check if the error is transient and worth retrying
    pub fn is_throttled(&self) -> bool {
        match self {
            CloudError::Api { code, status, .. } => {
                THROTTLING_CODES.contains(&code.as_str()) || *status == 503
            }
            CloudError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        self.code().is_some_and(|c| NOT_FOUND_CODES.contains(&c))
    }

    /// Check if the provider rejected the credential (expired token etc.)
    pub fn is_credential_rejected(&self) -> bool {
        self.code().is_some_and(|c| CREDENTIAL_CODES.contains(&c))
    }
}

/// Classify an error from an anyhow::Error by walking its chain for a
/// [`CloudError`].
pub fn classify_anyhow_error(error: &anyhow::Error) -> Option<&CloudError> {
    error.chain().find_map(|cause| cause.downcast_ref::<CloudError>())
}
