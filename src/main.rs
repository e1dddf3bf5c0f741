//! Hyperdex Router — Entry Point
//!
//! Initializes configuration, logging, the aggregated book feed, account
//! tracking and the smart order executor. Runs until SIGINT.
//!
//! Wiring sequence:
//! 1. Load config.toml + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Load the agent signing key from env (ROUTER_AGENT_KEY)
//! 4. Create VenueClient (HTTP + timeout + concurrency limit)
//! 5. Create gateways, asset catalog and account tracker
//! 6. Connect the book feed (auto-reconnect WebSocket)
//! 7. Spawn tracker polling + health/metrics server
//! 8. Heartbeat standby loop — orders come from the embedding caller
//! 9. Wait for SIGINT → graceful shutdown (disconnect→drain→exit)

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rust_decimal::prelude::ToPrimitive;
use tokio::signal;
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};

mod adapters;
mod config;
mod domain;
mod ports;
mod usecases;

use adapters::api::account::HttpAccountData;
use adapters::api::assets::{AssetCatalog, HttpAssetResolver};
use adapters::api::client::{VenueClient, VenueClientConfig};
use adapters::api::orders::ExchangeOrderGateway;
use adapters::api::signing::AgentWallet;
use adapters::api::transfers::SendAssetGateway;
use adapters::feeds::BookFeed;
use adapters::metrics::MetricsRegistry;
use ports::market_feed::{ConnectionState, MarketFeed};
use usecases::executor::ExecutorConfig;
use usecases::{AccountTracker, SmartOrderExecutor};

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration from config.toml ──────────────
    let config = config::loader::load_config("config.toml")
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(&config.router.log_level)
            }),
        )
        .json()
        .init();

    info!(
        name = %config.router.name,
        version = env!("CARGO_PKG_VERSION"),
        coin = %config.router.coin,
        venues = config.venues.len(),
        "Starting Hyperdex Router"
    );

    // ── 3. Shutdown signal channels ─────────────────────────
    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);
    let (ready_tx, ready_rx) = watch::channel(true);

    // ── 4. Load the agent signing key from env ──────────────
    let wallet = match AgentWallet::from_env(&config.account.signature_chain_id) {
        Ok(wallet) => {
            info!(agent = %wallet.address(), "Agent wallet loaded");
            Some(Arc::new(wallet))
        }
        Err(e) => {
            warn!(error = %e, "No agent wallet; running read-only (orders disabled)");
            None
        }
    };

    // ── 5. Create the shared venue HTTP client ──────────────
    let client = Arc::new(
        VenueClient::new(VenueClientConfig {
            info_url: config.api.info_url.clone(),
            exchange_url: config.api.exchange_url.clone(),
            timeout: Duration::from_millis(config.api.timeout_ms),
            ..VenueClientConfig::default()
        })
        .context("Failed to create venue client")?,
    );

    // ── 6. Gateways, asset catalog, tracker, metrics ────────
    let venue_ids: Vec<String> = config.venues.iter().map(|v| v.id.clone()).collect();
    let display_names = config
        .venues
        .iter()
        .map(|v| (v.id.clone(), v.display_name.clone()))
        .collect();

    let metrics = Arc::new(MetricsRegistry::new().context("Failed to register metrics")?);
    let assets = Arc::new(AssetCatalog::new(
        Arc::new(HttpAssetResolver::new(Arc::clone(&client))),
        &config.venues,
    ));
    let tracker = Arc::new(AccountTracker::new(
        Arc::new(HttpAccountData::new(Arc::clone(&client), venue_ids.clone())),
        config.account.address.clone(),
        venue_ids,
        &config.polling,
    ));
    let order_gateway = Arc::new(ExchangeOrderGateway::new(
        Arc::clone(&client),
        wallet.clone(),
    ));

    let executor = wallet.map(|wallet| {
        Arc::new(SmartOrderExecutor::new(
            Arc::new(BookFeed::new(config.feed.clone())),
            Arc::clone(&tracker),
            Arc::new(SendAssetGateway::new(
                Arc::clone(&client),
                wallet,
                config.account.chain.clone(),
                config.account.signature_chain_id.clone(),
            )),
            order_gateway,
            assets,
            Arc::clone(&metrics),
            config.account.address.clone(),
            display_names,
            ExecutorConfig::from_app_config(&config),
        ))
    });

    // ── 7. Connect the book feed ────────────────────────────
    // The executor owns the feed it plans against; in read-only mode a
    // standalone feed still powers the heartbeat.
    let feed: Arc<BookFeed> = match &executor {
        Some(exec) => exec.feed(),
        None => Arc::new(BookFeed::new(config.feed.clone())),
    };
    feed.connect().await.context("Failed to start book feed")?;

    // ── 8. Spawn background tasks ───────────────────────────
    let tracker_shutdown = shutdown_tx.subscribe();
    let tracker_ref = Arc::clone(&tracker);
    let tracker_handle = tokio::spawn(async move {
        if let Err(e) = tracker_ref.run(tracker_shutdown).await {
            error!(error = %e, "Account tracker failed");
        }
    });

    let metrics_handle = if config.metrics.enabled {
        let bind = config.metrics.bind_address.clone();
        let registry = Arc::clone(&metrics);
        Some(tokio::spawn(async move {
            if let Err(e) = adapters::metrics::server::serve(bind, ready_rx, registry).await {
                error!(error = %e, "Health/metrics server failed");
            }
        }))
    } else {
        None
    };

    // Mirror feed connection state into the metrics gauge
    let mut state_rx = feed.connection_state();
    let state_metrics = Arc::clone(&metrics);
    let state_handle = tokio::spawn(async move {
        loop {
            let connected = matches!(*state_rx.borrow(), ConnectionState::Connected);
            state_metrics.feed_connected.set(f64::from(u8::from(connected)));
            if state_rx.changed().await.is_err() {
                return;
            }
        }
    });

    info!(
        ready = executor.as_ref().is_some_and(|e| e.ready()),
        "All tasks spawned — router is running"
    );

    // ── 9. Heartbeat standby loop until SIGINT ──────────────
    // Orders come from the embedding caller; the binary keeps snapshots
    // warm and reports top-of-book health.
    let coin = config.router.coin.clone();
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("SIGINT received, initiating graceful shutdown");
                break;
            }
            _ = tokio::time::sleep(Duration::from_secs(30)) => {
                if let Some(balances) = tracker.balances().await {
                    for (venue, bal) in &balances {
                        metrics
                            .venue_balance
                            .with_label_values(&[venue.as_str()])
                            .set(bal.withdrawable.to_f64().unwrap_or(0.0));
                    }
                }
                match feed.current_book(&coin).await {
                    Some(book) => info!(
                        coin = %coin,
                        best_bid = %book.best_bid,
                        best_ask = %book.best_ask,
                        venues = book.venues.len(),
                        just_updated = feed.just_updated(),
                        ready = executor.as_ref().is_some_and(|e| e.ready()),
                        "Heartbeat"
                    ),
                    None => info!(
                        coin = %coin,
                        state = %*feed.connection_state().borrow(),
                        "Heartbeat — no book yet"
                    ),
                }
            }
        }
    }

    // ── Graceful shutdown (disconnect→drain→exit) ───────────

    // 1. Mark unready (readiness probe → 503)
    let _ = ready_tx.send(false);

    // 2. Deliberately disconnect the feed (no retry)
    feed.disconnect().await;

    // 3. Signal background tasks and wait briefly
    let _ = shutdown_tx.send(());
    let _ = tokio::time::timeout(Duration::from_secs(5), tracker_handle).await;
    state_handle.abort();
    if let Some(handle) = metrics_handle {
        handle.abort();
    }

    info!("Shutdown complete");
    Ok(())
}
