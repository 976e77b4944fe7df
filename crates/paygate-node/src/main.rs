//! Paygate node: runs the payment gateway over HTTP.
//!
//! Configuration starts from `GatewayConfig::default()` and is overridden by
//! environment variables:
//!
//! | Variable | Setting |
//! |----------|---------|
//! | `PAYMENT_GATEWAY_SECRET` | tokenizer secret (required) |
//! | `PAYGATE_HTTP_PORT` | listen port |
//! | `PAYGATE_PDP_URL` / `PERMIT_API_KEY` | policy decision point |
//! | `PAYGATE_IDENTITY_URL` | identity verifier |
//! | `PAYGATE_SUCCESS_PROBABILITY` | simulated settlement success rate |
//! | `PAYGATE_RATE_LIMIT_MAX` / `PAYGATE_RATE_LIMIT_INTERVAL` | admission window |
//! | `PAYGATE_LOG` | log filter, e.g. `info,paygate=debug` |
//! | `PAYGATE_LOG_JSON=1` | JSON log lines |

use anyhow::{Context, Result};
use paygate::domain::config::humantime_serde::parse_duration;
use paygate::{GatewayConfig, PaymentGatewayService};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_env("PAYGATE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    let json = std::env::var("PAYGATE_LOG_JSON").is_ok_and(|v| v == "1" || v == "true");
    if json {
        builder
            .json()
            .try_init()
            .map_err(|e| anyhow::anyhow!(e))?;
    } else {
        builder.try_init().map_err(|e| anyhow::anyhow!(e))?;
    }
    Ok(())
}

fn load_config() -> GatewayConfig {
    load_config_from(|key| std::env::var(key).ok())
}

/// Overlay environment settings onto the defaults. Unparseable values are
/// logged and ignored.
fn load_config_from(env: impl Fn(&str) -> Option<String>) -> GatewayConfig {
    let mut config = GatewayConfig::default();

    if let Some(secret) = env("PAYMENT_GATEWAY_SECRET") {
        config.tokenizer.secret = Some(secret);
    }

    if let Some(port) = env("PAYGATE_HTTP_PORT") {
        match port.parse() {
            Ok(p) => config.http.port = p,
            Err(_) => warn!(value = %port, "PAYGATE_HTTP_PORT is not a port number"),
        }
    }

    if let Some(url) = env("PAYGATE_PDP_URL") {
        config.policy.pdp_url = url;
    }
    if let Some(key) = env("PERMIT_API_KEY") {
        config.policy.api_key = Some(key);
    }
    if let Some(url) = env("PAYGATE_IDENTITY_URL") {
        config.identity.verifier_url = url;
    }

    if let Some(p) = env("PAYGATE_SUCCESS_PROBABILITY") {
        match p.parse() {
            Ok(p) => config.settlement.success_probability = p,
            Err(_) => warn!(value = %p, "PAYGATE_SUCCESS_PROBABILITY is not a number"),
        }
    }

    if let Some(max) = env("PAYGATE_RATE_LIMIT_MAX") {
        match max.parse() {
            Ok(m) => config.rate_limit.max_requests = m,
            Err(_) => warn!(value = %max, "PAYGATE_RATE_LIMIT_MAX is not a number"),
        }
    }
    if let Some(interval) = env("PAYGATE_RATE_LIMIT_INTERVAL") {
        match parse_duration(&interval) {
            Ok(d) => config.rate_limit.interval = d,
            Err(e) => warn!(value = %interval, error = e, "PAYGATE_RATE_LIMIT_INTERVAL is invalid"),
        }
    }

    config
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    let config = load_config();
    let service = Arc::new(
        PaymentGatewayService::new(config).context("failed to initialize payment gateway")?,
    );

    let mut server = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.start().await })
    };

    info!(version = paygate::VERSION, "Paygate is running. Press Ctrl+C to stop.");

    tokio::select! {
        result = &mut server => {
            result.context("server task panicked")??;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl+C")?;
            service.shutdown();
            server.await.context("server task panicked")??;
        }
    }

    Ok(())
}
