//! Alibaba Cloud ECS access: credentials, signing, RPC client and discovery

pub mod client;
pub mod credentials;
pub mod error;
pub mod metadata;
pub mod operations;
pub mod scanner;
pub mod signer;
pub mod types;

pub use client::{EcsClient, RetryPolicy};
pub use credentials::{
    Credential, CredentialError, CredentialStore, IdentityProvider, RefreshStep, run_refresh_loop,
};
pub use error::{CloudError, classify_anyhow_error};
pub use metadata::{InstanceIdentity, MetadataProvider};
pub use operations::EcsOperations;
#[cfg(test)]
pub use operations::MockEcsOperations;
pub use scanner::{InstanceQuery, query_instances, query_networks};
