//! Request interception transport.
//!
//! Presents the contract of a plain HTTP transport while silently
//! substituting the destination: every request is rewritten to the
//! configured endpoint's `/intercept` path, with all original headers
//! preserved and proxy metadata added. Callers above this layer never
//! observe that interception exists.

use std::future::poll_fn;
use std::io;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_core::Stream;
use http::header::CONTENT_LENGTH;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};

use crate::config::TransportConfig;
use crate::correlation::{INTERCEPT_PATH, ORIGINAL_URL_HEADER, PROXY_KEY_HEADER};
use crate::error::TransportError;

/// Source of request body bytes, consumed exactly once.
///
/// The transport materializes the full body before forwarding so the
/// rewritten request can carry an exact `content-length`.
pub enum OutboundBody {
    Full(Bytes),
    Stream(Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>),
}

impl OutboundBody {
    pub fn from_stream(stream: impl Stream<Item = io::Result<Bytes>> + Send + 'static) -> Self {
        Self::Stream(Box::pin(stream))
    }

    // A mid-stream read error aborts the whole body; partial bytes are
    // discarded, never forwarded.
    async fn materialize(self) -> io::Result<Bytes> {
        match self {
            Self::Full(bytes) => Ok(bytes),
            Self::Stream(mut stream) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = poll_fn(|cx| stream.as_mut().poll_next(cx)).await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(buf.freeze())
            }
        }
    }
}

impl From<Bytes> for OutboundBody {
    fn from(bytes: Bytes) -> Self {
        Self::Full(bytes)
    }
}

impl From<Vec<u8>> for OutboundBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Full(Bytes::from(bytes))
    }
}

impl From<&'static str> for OutboundBody {
    fn from(s: &'static str) -> Self {
        Self::Full(Bytes::from_static(s.as_bytes()))
    }
}

impl From<String> for OutboundBody {
    fn from(s: String) -> Self {
        Self::Full(Bytes::from(s))
    }
}

/// An outbound request as the caller intended it, before rewriting.
pub struct OutboundRequest {
    pub method: Method,
    /// The real provider URL. Forwarded to the endpoint in
    /// `x-original-url`; never contacted directly by this layer.
    pub url: String,
    pub headers: HeaderMap,
    pub body: OutboundBody,
}

impl OutboundRequest {
    pub fn new(method: Method, url: impl Into<String>, body: impl Into<OutboundBody>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn post(url: impl Into<String>, body: impl Into<OutboundBody>) -> Self {
        Self::new(Method::POST, url, body)
    }
}

/// Response from the interception endpoint, body fully read.
#[derive(Debug)]
pub struct InterceptResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Transport that reroutes every request through the interception
/// endpoint.
///
/// Safe for concurrent use: the only shared mutable state is the inner
/// client's connection pool, which is concurrency-safe by design. The
/// transport holds no per-request state, so cancelling a caller simply
/// abandons the in-flight send.
pub struct InterceptTransport {
    endpoint: String,
    proxy_key: String,
    inner: Mutex<Option<reqwest::Client>>,
}

impl InterceptTransport {
    /// Build a transport for the given endpoint.
    ///
    /// The endpoint URL must be non-empty. An empty proxy key is
    /// accepted; it only works against an endpoint that skips
    /// authentication.
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        if config.endpoint_url.trim().is_empty() {
            return Err(TransportError::InvalidEndpoint);
        }
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(config.http.max_connections)
            .pool_idle_timeout(Duration::from_secs(config.http.keepalive_expiry_secs))
            .timeout(Duration::from_secs(config.http.timeout_secs))
            .build()
            .map_err(TransportError::Client)?;

        Ok(Self {
            endpoint: config.endpoint_url.trim_end_matches('/').to_string(),
            proxy_key: config.proxy_key.clone(),
            inner: Mutex::new(Some(client)),
        })
    }

    /// Send one request through the interception endpoint.
    ///
    /// The body is materialized fully before any network I/O. All
    /// original headers pass through verbatim — provider credentials
    /// included, since the endpoint re-issues the real provider call
    /// with them — then `mx-api-key` and `x-original-url` are added and
    /// `content-length` is overwritten with the exact materialized
    /// length. Network failures propagate unchanged; there is no retry
    /// and no direct-to-provider fallback.
    pub async fn send(
        &self,
        request: OutboundRequest,
    ) -> Result<InterceptResponse, TransportError> {
        let client = self.lock_inner().clone().ok_or(TransportError::Closed)?;

        let body = request
            .body
            .materialize()
            .await
            .map_err(TransportError::BodyRead)?;

        let mut headers = request.headers;
        headers.insert(
            HeaderName::from_static(PROXY_KEY_HEADER),
            HeaderValue::from_str(&self.proxy_key)?,
        );
        headers.insert(
            HeaderName::from_static(ORIGINAL_URL_HEADER),
            HeaderValue::from_str(&request.url)?,
        );
        headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len() as u64));

        let url = format!("{}{INTERCEPT_PATH}", self.endpoint);
        tracing::debug!(
            method = %request.method,
            original_url = %request.url,
            rewritten_url = %url,
            body_bytes = body.len(),
            "Forwarding request through interception endpoint"
        );

        let response = client
            .request(request.method, url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(TransportError::Send)?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(TransportError::Send)?;

        Ok(InterceptResponse {
            status,
            headers,
            body,
        })
    }

    /// Drop the inner client, releasing its pooled connections.
    /// Idempotent; later sends fail with [`TransportError::Closed`].
    pub fn close(&self) {
        self.lock_inner().take();
    }

    fn lock_inner(&self) -> MutexGuard<'_, Option<reqwest::Client>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
