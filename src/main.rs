mod abi;
mod actions;
mod composer;
mod config;
mod contract;
mod error;
mod http;
mod models;
mod reconciler;
mod rpc;
mod state;
#[cfg(test)]
mod testing;
mod wallet;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::contract::VotingContract;
use crate::reconciler::Reconciler;
use crate::rpc::RpcClient;
use crate::state::AppState;
use crate::wallet::WalletBridge;
use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = AppConfig::load().context("Failed to load configuration")?;

    let rpc_client = RpcClient::new(&config.chain.rpc_url, config.chain.request_timeout())
        .context("Failed to initialize RPC client")?;
    info!(
        rpc_url = %config.chain.rpc_url,
        timeout_ms = rpc_client.timeout().as_millis() as u64,
        contract = %config.chain.contract_address,
        "Wallet provider configured"
    );

    let contract = Arc::new(VotingContract::new(rpc_client.clone(), &config.chain));
    let wallet = Arc::new(WalletBridge::new(Arc::new(rpc_client)));
    let reconciler = Arc::new(Reconciler::new(contract));

    let account = wallet.current_account().await;
    let network = wallet.current_network().await;
    match network {
        Some(network) => info!(network = %network, "Wallet on {}", network.display_name()),
        None => warn!("Wallet network unknown at startup"),
    }
    if let Err(err) = reconciler.refresh(account).await {
        warn!("Initial proposal fetch failed: {err}");
    }

    let refresher = Arc::clone(&reconciler);
    let _account_listener = wallet.on_account_change(move |account| {
        let reconciler = Arc::clone(&refresher);
        tokio::spawn(async move {
            if let Err(err) = reconciler.refresh(account).await {
                warn!("Proposal refresh after account change failed: {err}");
            }
        });
    });

    let expected = config.chain.expected_network();
    let _network_listener = wallet.on_network_change(move |network| match (expected, network) {
        (Some(expected), Some(actual)) if expected != actual => warn!(
            "Wallet switched to {}, contract lives on {}; writes will be refused",
            actual.display_name(),
            expected.display_name()
        ),
        _ => {}
    });

    let app_state = AppState::new(Arc::clone(&wallet), reconciler);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let tracker = Arc::clone(&wallet);
    let poll_interval = config.wallet.account_poll_interval();
    // The HTTP provider has no push channel; tracking relies on polling.
    let tracker_handle = tokio::spawn(async move {
        tracker.run(None, poll_interval, shutdown_rx).await;
    });

    let listener = TcpListener::bind(config.server.address())
        .await
        .context("Failed to bind HTTP listener")?;
    let local_addr = listener
        .local_addr()
        .context("Failed to obtain listener address")?;
    info!("Vote dapp listening on {local_addr}");

    let router: Router = http::router(app_state);
    let server = axum::serve(listener, router.into_make_service());
    server
        .with_graceful_shutdown(shutdown_signal(shutdown_tx.clone()))
        .await
        .context("HTTP server exited with error")?;

    shutdown_tx.send(true).ok();
    if let Err(join_err) = tracker_handle.await {
        error!("Wallet tracker join error: {join_err}");
    }

    Ok(())
}

fn init_tracing() {
    let default_filter = "info";
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    assert!(!filter.is_empty(), "Tracing filter must not be empty");
    assert!(filter.len() < 256, "Tracing filter length exceeds bounds");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .compact()
        .init();
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {err}");
        return;
    }
    shutdown_tx.send(true).ok();
    info!("Shutdown signal dispatched");
}
