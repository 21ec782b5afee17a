//! ECS tag constants for Kubernetes worker classification
//!
//! Worker instances are expected to carry these tags. The `Environment` tag
//! is derived from the VPC an instance lives in; the other two are static.
//!
//! ## Tag Schema
//!
//! | Tag Key | Value |
//! |---------|-------|
//! | `Environment` | VPC environment label (e.g. `develop`, `prod`) |
//! | `role` | `worker` |
//! | `stack` | `kubernetes` |

use crate::model::Tag;

/// Tag key carrying the environment classification
pub const TAG_ENVIRONMENT: &str = "Environment";

/// Tag key for the instance role
pub const TAG_ROLE: &str = "role";

/// Tag value for the instance role
pub const TAG_ROLE_VALUE: &str = "worker";

/// Tag key for the software stack
pub const TAG_STACK: &str = "stack";

/// Tag value for the software stack
pub const TAG_STACK_VALUE: &str = "kubernetes";

/// Name pattern identifying Kubernetes worker instances
pub const K8S_WORKER_NAME_PATTERN: &str = "worker-k8s.*";

/// Build the fixed three-entry tag set applied to Kubernetes workers.
pub fn k8s_worker_tags(environment: &str) -> Vec<Tag> {
    vec![
        Tag::new(TAG_ENVIRONMENT, environment),
        Tag::new(TAG_ROLE, TAG_ROLE_VALUE),
        Tag::new(TAG_STACK, TAG_STACK_VALUE),
    ]
}
