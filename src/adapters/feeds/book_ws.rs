//! Aggregated Book WebSocket Feed — Primary Market Data Source
//!
//! Connects to the price-aggregation backend and publishes one
//! [`AggregatedBook`] per frame. Implements the `MarketFeed` port trait so
//! the usecases layer never depends on transport details.
//!
//! Behavior:
//! - Each frame carries a complete per-venue snapshot; the book for the
//!   instrument is replaced wholesale (copy-on-publish via `Arc` swap)
//! - Involuntary disconnects reconnect with exponential backoff
//!   (min(base × 2^attempt, cap)), bounded attempts, then terminal failed
//! - Deliberate `disconnect()` never retries; `reconnect()` resets the
//!   attempt counter and retries after a 1 s delay
//! - Malformed frames are logged and dropped without tearing down the
//!   connection

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, instrument, warn};

use crate::config::FeedConfig;
use crate::domain::book::{AggregatedBook, BookLevel, Coin, VenueQuote};
use crate::ports::market_feed::{ConnectionState, MarketFeed};

/// One depth level as published by the aggregation backend.
#[derive(Debug, Deserialize)]
struct WsLevel {
    price: Decimal,
    size: Decimal,
    #[serde(default)]
    orders: u32,
}

/// Reference top-of-book payload.
#[derive(Debug, Deserialize)]
struct WsBookData {
    coin: String,
    #[serde(default)]
    timestamp: u64,
    #[serde(default)]
    bids: Vec<WsLevel>,
    #[serde(default)]
    asks: Vec<WsLevel>,
    best_bid: Decimal,
    best_ask: Decimal,
    spread: Decimal,
    mid_price: Decimal,
}

/// Per-venue top-of-book as published by the aggregation backend.
/// Zero or missing prices mean the venue had no resting interest on
/// that side.
#[derive(Debug, Deserialize)]
struct WsVenueQuote {
    #[serde(default)]
    best_bid: Option<Decimal>,
    #[serde(default)]
    best_ask: Option<Decimal>,
    #[serde(default)]
    spread: Option<Decimal>,
    #[serde(default)]
    mid_price: Option<Decimal>,
}

/// Frame metadata: per-venue quotes keyed by "venue:symbol".
#[derive(Debug, Deserialize)]
struct WsBookMeta {
    #[serde(default)]
    individual_exchanges: HashMap<String, WsVenueQuote>,
}

/// Envelope for one aggregated book frame.
#[derive(Debug, Deserialize)]
struct WsEnvelope {
    #[serde(rename = "type")]
    kind: String,
    data: WsBookData,
    metadata: WsBookMeta,
}

fn positive(price: Option<Decimal>) -> Option<Decimal> {
    price.filter(|p| *p > Decimal::ZERO)
}

impl WsEnvelope {
    /// Convert one wire frame into a published book snapshot.
    fn into_book(self) -> AggregatedBook {
        let timestamp_ms = self.data.timestamp;
        let venues = self
            .metadata
            .individual_exchanges
            .into_iter()
            .map(|(key, quote)| {
                // Keys arrive as "venue:symbol"; the venue id is the prefix.
                let venue = key.split(':').next().unwrap_or(&key).to_string();
                (
                    venue,
                    VenueQuote {
                        best_bid: positive(quote.best_bid),
                        best_ask: positive(quote.best_ask),
                        spread: quote.spread,
                        mid_price: quote.mid_price,
                        observed_at_ms: timestamp_ms,
                    },
                )
            })
            .collect();

        let level = |l: WsLevel| BookLevel {
            price: l.price,
            size: l.size,
            orders: l.orders,
        };

        AggregatedBook {
            coin: self.data.coin,
            timestamp_ms,
            best_bid: self.data.best_bid,
            best_ask: self.data.best_ask,
            spread: self.data.spread,
            mid_price: self.data.mid_price,
            bids: self.data.bids.into_iter().map(level).collect(),
            asks: self.data.asks.into_iter().map(level).collect(),
            venues,
        }
    }
}

/// Backoff delay before reconnect attempt `attempt` (zero-based).
fn backoff_delay(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let exp = 2u64.saturating_pow(attempt);
    Duration::from_millis(base_ms.saturating_mul(exp).min(max_ms))
}

/// State shared between the feed handle and its connection task.
struct FeedShared {
    config: FeedConfig,
    /// Latest published book per instrument.
    books: RwLock<HashMap<Coin, Arc<AggregatedBook>>>,
    /// Broadcast of every accepted snapshot.
    update_tx: broadcast::Sender<Arc<AggregatedBook>>,
    /// Observable connection state.
    state_tx: watch::Sender<ConnectionState>,
    /// When the last snapshot was accepted, for the highlight window.
    last_change: std::sync::RwLock<Option<Instant>>,
    /// Consecutive involuntary-disconnect retries.
    attempts: AtomicU32,
}

impl FeedShared {
    fn set_state(&self, state: ConnectionState) {
        let _ = self.state_tx.send(state);
    }

    /// Parse one frame and publish the new book wholesale.
    async fn apply_message(&self, text: &str) -> Result<()> {
        let envelope: WsEnvelope =
            serde_json::from_str(text).context("invalid aggregated book JSON")?;

        if envelope.kind != "aggregated_order_book" {
            return Ok(());
        }

        let book = Arc::new(envelope.into_book());
        {
            let mut books = self.books.write().await;
            books.insert(book.coin.clone(), Arc::clone(&book));
        }
        *self.last_change.write().unwrap() = Some(Instant::now());

        debug!(
            coin = %book.coin,
            best_bid = %book.best_bid,
            best_ask = %book.best_ask,
            venues = book.venues.len(),
            "Book updated"
        );

        // Broadcast (ignore if no receivers)
        let _ = self.update_tx.send(book);
        Ok(())
    }
}

/// A running connection task and its stop signal.
struct FeedSession {
    stop_tx: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

/// WebSocket adapter for the aggregated multi-venue book feed.
pub struct BookFeed {
    shared: Arc<FeedShared>,
    session: Mutex<Option<FeedSession>>,
}

impl BookFeed {
    /// Create a new feed from config. Does not connect yet.
    pub fn new(config: FeedConfig) -> Self {
        let (update_tx, _) = broadcast::channel(256);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(FeedShared {
                config,
                books: RwLock::new(HashMap::new()),
                update_tx,
                state_tx,
                last_change: std::sync::RwLock::new(None),
                attempts: AtomicU32::new(0),
            }),
            session: Mutex::new(None),
        }
    }

    /// Run the connection loop until deliberate shutdown or retry
    /// exhaustion.
    #[instrument(skip_all, name = "book_feed")]
    async fn run(shared: Arc<FeedShared>, mut stop_rx: watch::Receiver<bool>) {
        loop {
            let attempt = shared.attempts.load(Ordering::Relaxed);
            shared.set_state(if attempt == 0 {
                ConnectionState::Connecting
            } else {
                ConnectionState::Reconnecting { attempt }
            });

            match Self::connect_and_stream(&shared, &mut stop_rx).await {
                Ok(()) => {
                    info!("Book feed shut down deliberately");
                    shared.set_state(ConnectionState::Disconnected);
                    return;
                }
                Err(e) => {
                    let attempt = shared.attempts.load(Ordering::Relaxed);
                    if attempt >= shared.config.max_reconnect_attempts {
                        error!(
                            error = %e,
                            attempts = attempt,
                            "Book feed retries exhausted; entering failed state"
                        );
                        shared.set_state(ConnectionState::Failed);
                        return;
                    }

                    let delay = backoff_delay(
                        attempt,
                        shared.config.reconnect_base_ms,
                        shared.config.reconnect_max_ms,
                    );
                    warn!(
                        error = %e,
                        attempt = attempt + 1,
                        max = shared.config.max_reconnect_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Book feed disconnected, backing off"
                    );
                    shared.attempts.fetch_add(1, Ordering::Relaxed);

                    tokio::select! {
                        changed = stop_rx.changed() => {
                            // A closed stop channel means the handle is gone
                            if changed.is_err() || *stop_rx.borrow() {
                                shared.set_state(ConnectionState::Disconnected);
                                return;
                            }
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Single WebSocket session: connect, then stream until error or stop.
    /// Returns `Ok(())` only on deliberate shutdown.
    async fn connect_and_stream(
        shared: &Arc<FeedShared>,
        stop_rx: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        let (ws_stream, _) = connect_async(&shared.config.ws_url)
            .await
            .context("book feed connection failed")?;
        let (_write, mut read) = ws_stream.split();

        shared.attempts.store(0, Ordering::Relaxed);
        shared.set_state(ConnectionState::Connected);
        info!(url = %shared.config.ws_url, "Aggregated book feed connected");

        loop {
            tokio::select! {
                biased;
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        return Ok(());
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Err(e) = shared.apply_message(text.as_ref()).await {
                                debug!(error = %e, "Dropped malformed book frame");
                            }
                        }
                        Some(Ok(Message::Ping(_))) => {
                            debug!("Book feed ping received");
                        }
                        Some(Ok(Message::Close(frame))) => {
                            return Err(anyhow::anyhow!(
                                "book feed closed by server: {frame:?}"
                            ));
                        }
                        Some(Err(e)) => {
                            return Err(anyhow::anyhow!("book feed stream error: {e}"));
                        }
                        None => {
                            return Err(anyhow::anyhow!("book feed stream ended"));
                        }
                        _ => {}
                    }
                }
            }
        }
    }
}

#[async_trait]
impl MarketFeed for BookFeed {
    async fn connect(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if let Some(existing) = session.as_ref() {
            if !existing.task.is_finished() {
                return Ok(());
            }
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(Self::run(shared, stop_rx));
        *session = Some(FeedSession { stop_tx, task });
        Ok(())
    }

    async fn disconnect(&self) {
        let mut session = self.session.lock().await;
        if let Some(FeedSession { stop_tx, task }) = session.take() {
            let _ = stop_tx.send(true);
            let _ = task.await;
        }
        self.shared.set_state(ConnectionState::Disconnected);
    }

    async fn reconnect(&self) -> Result<()> {
        self.disconnect().await;
        self.shared.attempts.store(0, Ordering::Relaxed);
        tokio::time::sleep(Duration::from_secs(1)).await;
        self.connect().await
    }

    fn subscribe(&self) -> broadcast::Receiver<Arc<AggregatedBook>> {
        self.shared.update_tx.subscribe()
    }

    async fn current_book(&self, coin: &str) -> Option<Arc<AggregatedBook>> {
        let books = self.shared.books.read().await;
        books.get(coin).cloned()
    }

    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    fn just_updated(&self) -> bool {
        let window = Duration::from_millis(self.shared.config.highlight_ms);
        self.shared
            .last_change
            .read()
            .unwrap()
            .is_some_and(|at| at.elapsed() < window)
    }
}
