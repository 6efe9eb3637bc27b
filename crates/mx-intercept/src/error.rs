//! Transport error taxonomy.

use thiserror::Error;

/// Failures surfaced by [`InterceptTransport`](crate::InterceptTransport).
///
/// Network failures are propagated unchanged; the transport never
/// retries and never falls back to an unproxied call, since a silent
/// bypass would break the correlation guarantee.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("interception endpoint URL must not be empty")]
    InvalidEndpoint,

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("header value not representable: {0}")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),

    /// The request body could not be fully materialized. Raised before
    /// any network I/O; a partial body is never forwarded.
    #[error("failed to read request body: {0}")]
    BodyRead(#[source] std::io::Error),

    #[error("request to interception endpoint failed: {0}")]
    Send(#[source] reqwest::Error),

    #[error("transport is closed")]
    Closed,
}
