//! Default configuration values
//!
//! These constants keep CLI defaults and library defaults in one place.

use std::time::Duration;

/// Default page size for paginated ECS listing calls
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Default address for the Prometheus metrics endpoint
pub const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:9085";

/// Default ECS RPC endpoint (the central endpoint accepts every region)
pub const DEFAULT_ECS_ENDPOINT: &str = "https://ecs.aliyuncs.com";

/// ECS RPC API version
pub const ECS_API_VERSION: &str = "2014-05-26";

/// Default ECS instance metadata service base URL
pub const DEFAULT_METADATA_ENDPOINT: &str = "http://100.100.100.200/latest/meta-data";

/// HTTP timeout for metadata service requests
pub const METADATA_TIMEOUT: Duration = Duration::from_secs(3);

/// HTTP timeout for ECS API requests
pub const API_TIMEOUT: Duration = Duration::from_secs(30);

/// Refresh credentials once less than this much validity remains
pub const CREDENTIAL_REFRESH_WINDOW: Duration = Duration::from_secs(10 * 60);

/// Sleep between expiry checks while the credential is comfortably valid
pub const CREDENTIAL_IDLE_INTERVAL: Duration = Duration::from_secs(9 * 60);

/// Sleep between refresh attempts once inside the refresh window
pub const CREDENTIAL_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Network type used when querying spot price history
pub const SPOT_NETWORK_TYPE: &str = "vpc";

/// Prefix of `SpotStrategy` values that denote preemptible instances
pub const SPOT_STRATEGY_PREFIX: &str = "Spot";
