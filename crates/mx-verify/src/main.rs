//! Verification probe: issues one traced call through the interception
//! transport and checks that the endpoint persisted a usage row under
//! the same correlation identifier.
//!
//! Exit codes: 0 pass, 1 fail, 2 inconclusive (the usage row had not
//! settled within the grace period).

mod config;
mod probe;
mod store;

use std::time::Duration;

use anyhow::Context;
use mx_intercept::{InterceptTransport, OutboundRequest, TransportConfig};
use tracing_subscriber::EnvFilter;

use config::VerifyConfig;
use probe::{ProbeOutcome, SettleConfig};
use store::UsageStore;

fn main() -> anyhow::Result<()> {
    // Config path: --config wins over a bare positional argument,
    // then the environment, then the default file name.
    let config_path = {
        let args: Vec<String> = std::env::args().collect();
        args.iter()
            .position(|a| a == "--config")
            .and_then(|i| args.get(i + 1).cloned())
            .or_else(|| args.get(1).filter(|a| !a.starts_with('-')).cloned())
            .or_else(|| std::env::var("MX_VERIFY_CONFIG").ok())
            .unwrap_or_else(|| "mx-verify.toml".to_string())
    };

    let config = VerifyConfig::load(&config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run(config))
}

async fn run(config: VerifyConfig) -> anyhow::Result<()> {
    let base_url = config
        .api_base_url
        .clone()
        .context("MX_API_BASE_URL is not set — interception endpoint not configured")?;

    tracing::info!(
        endpoint = %base_url,
        db_path = %config.db_path,
        model = %config.model,
        "Starting verification probe"
    );

    let transport = InterceptTransport::new(&TransportConfig {
        endpoint_url: base_url,
        proxy_key: config.api_key.clone(),
        http: config.http.clone(),
    })?;
    let store = UsageStore::new(&config.db_path);
    let settle = SettleConfig {
        grace: Duration::from_secs(config.settle.grace_secs),
        poll_interval: Duration::from_millis(config.settle.poll_interval_ms),
    };

    let body = serde_json::to_vec(&serde_json::json!({
        "model": config.model,
        "messages": [
            {"role": "user", "content": "Reply with exactly one word: pong"}
        ],
    }))?;
    let request = OutboundRequest::post(config.target_url.clone(), body);

    let outcome = probe::run(&transport, &store, request, settle).await?;
    transport.close();

    match outcome {
        ProbeOutcome::Pass { record } => {
            tracing::info!(
                call_uuid = %record.call_uuid,
                model = %record.model,
                total_tokens = record.total_tokens,
                cost_usd = record.cost_usd,
                "PASS: trace and usage store agree on the correlation identifier"
            );
            Ok(())
        }
        ProbeOutcome::Fail { reason, recent } => {
            tracing::error!(reason = %reason, "FAIL");
            log_recent(&recent);
            std::process::exit(1);
        }
        ProbeOutcome::Inconclusive {
            call_id,
            waited,
            recent,
        } => {
            tracing::warn!(
                call_id = %call_id,
                waited_secs = waited.as_secs_f64(),
                "INCONCLUSIVE: usage row has not settled yet — not proof of failure"
            );
            log_recent(&recent);
            std::process::exit(2);
        }
    }
}

fn log_recent(recent: &[store::RecentRecord]) {
    if recent.is_empty() {
        tracing::info!("No recent rows in the usage store");
        return;
    }
    for row in recent {
        tracing::info!(
            call_uuid = %row.call_uuid,
            created_at = %row.created_at,
            "Recent usage row"
        );
    }
}
