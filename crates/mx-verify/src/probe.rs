//! The consistency check: one traced call, then bounded polling of the
//! usage store for the matching row.
//!
//! State machine: `issue-call → await-local-trace → await-remote-settle
//! → compare`. The endpoint persists its usage row asynchronously with
//! no acknowledgement, so a row missing at the end of the grace period
//! is reported as inconclusive rather than failed — the write may still
//! land later. The grace period is a test convenience, not a protocol
//! guarantee.

use std::time::Duration;

use mx_intercept::{send_traced, CallTrace, InterceptTransport, OutboundRequest, TransportError};
use thiserror::Error;
use tokio::time::{sleep, Instant};

use crate::store::{RecentRecord, StoreError, UsageRecord, UsageStore};

/// How many rows to attach for near-miss diagnosis.
const DIAGNOSTIC_ROWS: u32 = 3;

/// Settlement window for the endpoint's asynchronous write.
#[derive(Clone, Copy, Debug)]
pub struct SettleConfig {
    pub grace: Duration,
    pub poll_interval: Duration,
}

impl Default for SettleConfig {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(5),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Terminal probe outcome.
#[derive(Debug)]
pub enum ProbeOutcome {
    /// Trace and store agree on the identifier, with positive usage.
    Pass { record: UsageRecord },

    Fail {
        reason: FailReason,
        recent: Vec<RecentRecord>,
    },

    /// The row had not appeared when the grace period ran out. Not
    /// proof of failure — "never arrived" and "arrived late" are
    /// indistinguishable from here.
    Inconclusive {
        call_id: String,
        waited: Duration,
        recent: Vec<RecentRecord>,
    },
}

#[derive(Debug, Error)]
pub enum FailReason {
    #[error("call failed before a response: {0}")]
    CallFailed(#[from] TransportError),

    /// A call was issued but nothing was recorded locally. A contract
    /// defect in the identifier propagation, not a runtime condition.
    #[error("no trace entry was recorded for the issued call")]
    MissingTraceEntry,

    #[error("trace entry carries an empty correlation identifier")]
    EmptyCallId,

    #[error("persisted row for {call_uuid} has no usage (total_tokens = {total_tokens})")]
    ZeroUsage { call_uuid: String, total_tokens: i64 },
}

/// Run the probe once.
pub async fn run(
    transport: &InterceptTransport,
    store: &UsageStore,
    request: OutboundRequest,
    settle: SettleConfig,
) -> Result<ProbeOutcome, StoreError> {
    // issue-call: a fresh trace scope, exactly one call in it.
    let trace = CallTrace::new();
    let send_result = send_traced(transport, &trace, request).await;

    // await-local-trace: the identifier must be in the trace even when
    // the call itself failed.
    let entries = trace.entries();
    let Some(entry) = entries.first() else {
        return fail(store, FailReason::MissingTraceEntry).await;
    };
    if entry.call_id.is_empty() {
        return fail(store, FailReason::EmptyCallId).await;
    }
    let call_id = entry.call_id.clone();

    if let Err(e) = send_result {
        return fail(store, FailReason::CallFailed(e)).await;
    }
    tracing::info!(call_id = %call_id, "Call issued and traced, awaiting settlement");

    // await-remote-settle / compare: bounded polling, never one blind
    // sleep.
    let deadline = Instant::now() + settle.grace;
    loop {
        if let Some(record) = store.find(&call_id).await? {
            if record.total_tokens > 0 {
                return Ok(ProbeOutcome::Pass { record });
            }
            return fail(
                store,
                FailReason::ZeroUsage {
                    call_uuid: record.call_uuid,
                    total_tokens: record.total_tokens,
                },
            )
            .await;
        }
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        sleep(settle.poll_interval.min(deadline - now)).await;
    }

    Ok(ProbeOutcome::Inconclusive {
        call_id,
        waited: settle.grace,
        recent: diagnostics(store).await,
    })
}

async fn fail(store: &UsageStore, reason: FailReason) -> Result<ProbeOutcome, StoreError> {
    Ok(ProbeOutcome::Fail {
        reason,
        recent: diagnostics(store).await,
    })
}

// Best-effort: a broken store must not mask the failure being reported.
async fn diagnostics(store: &UsageStore) -> Vec<RecentRecord> {
    match store.recent(DIAGNOSTIC_ROWS).await {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!(error = %e, "Could not read recent rows for diagnostics");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::IntoFuture;
    use std::net::SocketAddr;
    use std::path::PathBuf;

    use http::HeaderMap;
    use mx_intercept::{HttpConfig, TransportConfig, CALL_ID_HEADER, INTERCEPT_PATH};

    use super::*;
    use crate::store::test_support::{create_stats_db, insert_row};

    /// Mock interception endpoint: responds immediately, then persists
    /// the usage row after `write_delay` (mirroring the real endpoint's
    /// deferred write). `total_tokens: None` means it never writes.
    async fn spawn_endpoint(
        db: PathBuf,
        write_delay: Duration,
        total_tokens: Option<i64>,
    ) -> SocketAddr {
        let app = axum::Router::new().route(
            INTERCEPT_PATH,
            axum::routing::post(move |headers: HeaderMap| {
                let db = db.clone();
                async move {
                    let call_id = headers
                        .get(CALL_ID_HEADER)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    if let Some(tokens) = total_tokens {
                        tokio::spawn(async move {
                            sleep(write_delay).await;
                            insert_row(
                                &db,
                                &call_id,
                                "test-model",
                                tokens,
                                0.0001,
                                "2026-08-27 12:00:00",
                            );
                        });
                    }
                    (axum::http::StatusCode::OK, r#"{"content":"pong"}"#)
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(axum::serve(listener, app).into_future());
        addr
    }

    fn transport_for(endpoint_url: String) -> InterceptTransport {
        InterceptTransport::new(&TransportConfig {
            endpoint_url,
            proxy_key: "s".to_string(),
            http: HttpConfig::default(),
        })
        .unwrap()
    }

    fn probe_request() -> OutboundRequest {
        OutboundRequest::post("https://example.com/v1/chat/completions", r#"{"ping":1}"#)
    }

    fn fast_settle() -> SettleConfig {
        SettleConfig {
            grace: Duration::from_secs(2),
            poll_interval: Duration::from_millis(25),
        }
    }

    #[tokio::test]
    async fn passes_once_the_deferred_write_settles() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("mx.db");
        create_stats_db(&db);

        let addr = spawn_endpoint(db.clone(), Duration::from_millis(100), Some(57)).await;
        let transport = transport_for(format!("http://{addr}"));
        let store = UsageStore::new(&db);

        let outcome = run(&transport, &store, probe_request(), fast_settle())
            .await
            .unwrap();

        match outcome {
            ProbeOutcome::Pass { record } => {
                assert_eq!(record.total_tokens, 57);
                assert!(!record.call_uuid.is_empty());
            }
            other => panic!("expected pass, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn inconclusive_when_the_row_never_lands() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("mx.db");
        create_stats_db(&db);
        // A stale row from an earlier run, for the diagnostics listing.
        insert_row(&db, "stale", "gpt-4o", 5, 0.001, "2026-08-27 08:00:00");

        let addr = spawn_endpoint(db.clone(), Duration::ZERO, None).await;
        let transport = transport_for(format!("http://{addr}"));
        let store = UsageStore::new(&db);

        let settle = SettleConfig {
            grace: Duration::from_millis(200),
            poll_interval: Duration::from_millis(25),
        };
        let outcome = run(&transport, &store, probe_request(), settle)
            .await
            .unwrap();

        match outcome {
            ProbeOutcome::Inconclusive {
                call_id,
                waited,
                recent,
            } => {
                assert!(!call_id.is_empty());
                assert_eq!(waited, settle.grace);
                assert_eq!(recent.len(), 1);
                assert_eq!(recent[0].call_uuid, "stale");
            }
            other => panic!("expected inconclusive, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fails_on_a_row_with_zero_usage() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("mx.db");
        create_stats_db(&db);

        let addr = spawn_endpoint(db.clone(), Duration::ZERO, Some(0)).await;
        let transport = transport_for(format!("http://{addr}"));
        let store = UsageStore::new(&db);

        let outcome = run(&transport, &store, probe_request(), fast_settle())
            .await
            .unwrap();

        match outcome {
            ProbeOutcome::Fail { reason, .. } => {
                assert!(matches!(reason, FailReason::ZeroUsage { total_tokens: 0, .. }));
            }
            other => panic!("expected fail, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fails_fast_when_the_call_itself_fails() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("mx.db");
        create_stats_db(&db);

        // Nothing listens on this port.
        let transport = transport_for("http://127.0.0.1:1".to_string());
        let store = UsageStore::new(&db);

        let outcome = run(&transport, &store, probe_request(), fast_settle())
            .await
            .unwrap();

        match outcome {
            ProbeOutcome::Fail { reason, .. } => {
                assert!(matches!(reason, FailReason::CallFailed(_)));
            }
            other => panic!("expected fail, got {other:?}"),
        }
    }
}
