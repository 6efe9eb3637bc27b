//! Client-side interception layer for outbound LLM API calls.
//!
//! Calling code addresses the real model provider; this transport
//! silently rewrites every request to a local interception endpoint,
//! carrying a per-call correlation identifier so the local debug trace
//! and the endpoint's persisted usage records can later be matched
//! one-to-one.

pub mod client;
pub mod config;
pub mod correlation;
pub mod error;
pub mod trace;
pub mod transport;

pub use client::{send_traced, send_traced_with_id};
pub use config::{HttpConfig, TransportConfig};
pub use correlation::{
    CallId, CALL_ID_HEADER, INTERCEPT_PATH, ORIGINAL_URL_HEADER, PROXY_KEY_HEADER,
};
pub use error::TransportError;
pub use trace::{CallEntry, CallOutcome, CallTrace, EntryHandle};
pub use transport::{InterceptResponse, InterceptTransport, OutboundBody, OutboundRequest};
