// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courier serve` command implementation.
//!
//! Startup: row store, messenger bridge, engine (settings, accounts, queue,
//! scheduler), then the admin API. A signal first closes the HTTP listener
//! so no operator request can enqueue into a stopping queue, then the
//! engine drains in order.

use std::sync::Arc;
use std::time::Duration;

use courier_config::CourierConfig;
use courier_core::{Clock, CourierError, MessengerFactory, SystemClock};
use courier_engine::{Core, shutdown};
use courier_gateway::{AuthConfig, GatewayState, ServerConfig, start_server};
use courier_whatsapp::BridgeFactory;
use tracing::{error, info, warn};

/// Runs the `courier serve` command until SIGINT/SIGTERM.
pub async fn run_serve(config: CourierConfig) -> Result<(), CourierError> {
    init_tracing(&config.agent.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), "starting courier serve");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let rpc_timeout = Duration::from_secs(config.engine.rpc_timeout_secs);

    let repo = courier_storage::open_repository(&config.store, clock.clone(), rpc_timeout)
        .await
        .inspect_err(|e| error!(error = %e, "failed to open row store"))?;

    let factory: Arc<dyn MessengerFactory> =
        Arc::new(BridgeFactory::new(&config.messenger.bridge_url, rpc_timeout)?);
    info!(bridge_url = %config.messenger.bridge_url, "messenger bridge configured");

    let core = Core::start(&config, repo, factory, clock)
        .await
        .inspect_err(|e| error!(error = %e, "engine failed to start"))?;

    if config.gateway.bearer_token.is_none() {
        warn!("gateway.bearer_token not set; the admin API is open to anyone who can reach it");
    }

    let cancel = shutdown::install_signal_handler();
    let state = GatewayState::new(
        core.clone(),
        AuthConfig::new(config.gateway.bearer_token.clone()),
    );
    let server_config = ServerConfig::from(&config.gateway);
    let http_cancel = cancel.clone();
    let served = start_server(&server_config, state, async move {
        http_cancel.cancelled().await;
    })
    .await;

    if let Err(e) = &served {
        error!(error = %e, "gateway stopped with an error");
    }

    core.shutdown().await;
    served?;

    info!("courier serve shutdown complete");
    Ok(())
}

/// Initialize the tracing subscriber with the configured log level.
///
/// `RUST_LOG` takes precedence when set.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("courier={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
