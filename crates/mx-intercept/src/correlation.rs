//! Correlation identifiers linking local call traces to the
//! interception endpoint's persisted usage rows.

use std::fmt;

use http::HeaderValue;
use uuid::Uuid;

/// Header carrying the per-call correlation identifier.
pub const CALL_ID_HEADER: &str = "x-mx-request-call-id";

/// Header carrying the proxy authentication secret.
pub const PROXY_KEY_HEADER: &str = "mx-api-key";

/// Header carrying the original (pre-rewrite) destination URL.
pub const ORIGINAL_URL_HEADER: &str = "x-original-url";

/// Path on the interception endpoint that accepts rewritten requests.
pub const INTERCEPT_PATH: &str = "/intercept";

/// Unique per-call token (UUID v4 rendered as text).
///
/// Minted exactly once per logical call and carried unchanged through
/// every layer: the outbound correlation header, the local trace entry,
/// and the endpoint's persisted usage row all hold this exact value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CallId(String);

impl CallId {
    /// Mint a fresh identifier.
    pub fn mint() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    // Minted ids are always header-safe; a forwarded id with bytes
    // that cannot travel in a header is rejected, never rewritten.
    pub(crate) fn header_value(&self) -> Result<HeaderValue, http::header::InvalidHeaderValue> {
        HeaderValue::from_str(&self.0)
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CallId {
    fn from(value: String) -> Self {
        Self(value)
    }
}
