//! Market Feed Port - Live Aggregated Book Interface
//!
//! Defines the trait for receiving aggregated multi-venue order book
//! snapshots from a streaming market-data source.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};

use crate::domain::book::AggregatedBook;

/// Connection lifecycle of the streaming feed.
///
/// `Failed` and `Disconnected` are terminal: `Failed` until an explicit
/// `reconnect()`, `Disconnected` after a deliberate `disconnect()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
  /// First connection attempt in progress.
  Connecting,
  /// Streaming normally.
  Connected,
  /// Involuntary disconnect; backing off before attempt `attempt`.
  Reconnecting {
    /// Zero-based retry attempt about to be made.
    attempt: u32,
  },
  /// Deliberately disconnected; no retry will happen.
  Disconnected,
  /// Retries exhausted; stays failed until `reconnect()` is called.
  Failed,
}

impl std::fmt::Display for ConnectionState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Connecting => write!(f, "connecting"),
      Self::Connected => write!(f, "connected"),
      Self::Reconnecting { attempt } => write!(f, "reconnecting (attempt {attempt})"),
      Self::Disconnected => write!(f, "disconnected"),
      Self::Failed => write!(f, "failed"),
    }
  }
}

/// Trait for aggregated market data feed providers.
///
/// Implementors own one long-lived streaming connection and publish
/// immutable book snapshots. Consumers only ever read the latest
/// published snapshot; they never block the publisher.
#[async_trait]
pub trait MarketFeed: Send + Sync + 'static {
  /// Open the streaming connection and start publishing books.
  async fn connect(&self) -> anyhow::Result<()>;

  /// Deliberately close the connection. Must not trigger any retry.
  async fn disconnect(&self);

  /// Reset the retry counter and reconnect after a short delay.
  /// The escape hatch out of the terminal `Failed` state.
  async fn reconnect(&self) -> anyhow::Result<()>;

  /// Subscribe to book snapshots as they are published.
  fn subscribe(&self) -> broadcast::Receiver<Arc<AggregatedBook>>;

  /// Latest published book for an instrument, if any has arrived yet.
  async fn current_book(&self, coin: &str) -> Option<Arc<AggregatedBook>>;

  /// Observable connection state for status displays.
  fn connection_state(&self) -> watch::Receiver<ConnectionState>;

  /// True for a short window after each accepted snapshot, so consumers
  /// can flag "just changed" without diffing books themselves.
  fn just_updated(&self) -> bool;
}
