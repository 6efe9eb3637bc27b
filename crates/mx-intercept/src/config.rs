//! Transport configuration types.

use serde::Deserialize;

/// Connection pool and timeout settings for the inner HTTP client.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    #[serde(default = "default_keepalive_expiry_secs")]
    pub keepalive_expiry_secs: u64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Settings for the interception transport.
///
/// Constructed once by the surrounding application and passed into
/// [`InterceptTransport::new`](crate::InterceptTransport::new); the
/// transport performs no ambient lookup of its own. Whether an absent
/// endpoint URL means "interception disabled" is the caller's decision,
/// made before this struct exists.
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// Base URL of the interception endpoint (e.g. "http://localhost:9000").
    pub endpoint_url: String,

    /// Proxy authentication secret sent as `mx-api-key`. May be empty
    /// when the endpoint does not authenticate callers.
    #[serde(default)]
    pub proxy_key: String,

    #[serde(default)]
    pub http: HttpConfig,
}

fn default_max_connections() -> usize {
    500
}

fn default_keepalive_expiry_secs() -> u64 {
    300
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            keepalive_expiry_secs: default_keepalive_expiry_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}
