//! Account Tracker Use Case - Balance, Order and Position Snapshots
//!
//! Owns the account's per-venue balance, open-order and position
//! snapshots. Polls the account data provider on fixed intervals and
//! refreshes on demand after any transfer or order submission that could
//! change them. Snapshots are replaced atomically; staleness between
//! polls is advisory and consumers tolerate slightly outdated values.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::config::PollingConfig;
use crate::domain::book::{VenueBalance, VenueId};
use crate::ports::account_data::{AccountDataProvider, OpenOrder, VenuePosition};

/// Immutable balance snapshot with its fetch time.
#[derive(Debug, Clone)]
pub struct BalancesSnapshot {
  /// Withdrawable balance and margin summary per venue.
  pub per_venue: BTreeMap<VenueId, VenueBalance>,
  /// When the snapshot was fetched.
  pub fetched_at: DateTime<Utc>,
}

impl BalancesSnapshot {
  /// Whether the snapshot is older than `max_age_secs`. Advisory only -
  /// no caller rejects a stale snapshot, they just know it is one.
  pub fn is_stale(&self, max_age_secs: i64) -> bool {
    (Utc::now() - self.fetched_at).num_seconds() > max_age_secs
  }
}

/// Tracks the authenticated account's state across venues.
pub struct AccountTracker<P: AccountDataProvider> {
  provider: Arc<P>,
  account: String,
  venues: Vec<VenueId>,
  balances: RwLock<Option<BalancesSnapshot>>,
  open_orders: RwLock<Vec<OpenOrder>>,
  positions: RwLock<Vec<VenuePosition>>,
  balance_interval: Duration,
  view_interval: Duration,
}

impl<P: AccountDataProvider> AccountTracker<P> {
  /// Create a new tracker. Nothing is fetched until `run` starts or a
  /// refresh is requested.
  pub fn new(
    provider: Arc<P>,
    account: String,
    venues: Vec<VenueId>,
    polling: &PollingConfig,
  ) -> Self {
    Self {
      provider,
      account,
      venues,
      balances: RwLock::new(None),
      open_orders: RwLock::new(Vec::new()),
      positions: RwLock::new(Vec::new()),
      balance_interval: Duration::from_secs(polling.balance_interval_secs),
      view_interval: Duration::from_secs(polling.view_interval_secs),
    }
  }

  /// Latest balance map, or `None` before the first successful poll.
  pub async fn balances(&self) -> Option<BTreeMap<VenueId, VenueBalance>> {
    let guard = self.balances.read().await;
    guard.as_ref().map(|s| s.per_venue.clone())
  }

  /// Latest balance snapshot including its fetch time.
  pub async fn balances_snapshot(&self) -> Option<BalancesSnapshot> {
    let guard = self.balances.read().await;
    guard.clone()
  }

  /// Latest open orders across venues.
  pub async fn open_orders(&self) -> Vec<OpenOrder> {
    self.open_orders.read().await.clone()
  }

  /// Latest open positions across venues.
  pub async fn positions(&self) -> Vec<VenuePosition> {
    self.positions.read().await.clone()
  }

  /// Force-refresh the balance snapshot.
  pub async fn refresh_balances(&self) -> Result<()> {
    let per_venue = self
      .provider
      .fetch_balances(&self.account, &self.venues)
      .await?;

    let mut guard = self.balances.write().await;
    *guard = Some(BalancesSnapshot {
      per_venue,
      fetched_at: Utc::now(),
    });
    debug!("Balance snapshot refreshed");
    Ok(())
  }

  /// Force-refresh open orders and positions.
  pub async fn refresh_views(&self) -> Result<()> {
    let orders = self.provider.fetch_open_orders(&self.account).await?;
    let positions = self.provider.fetch_positions(&self.account).await?;

    {
      let mut guard = self.open_orders.write().await;
      *guard = orders;
    }
    {
      let mut guard = self.positions.write().await;
      *guard = positions;
    }
    debug!("Open orders and positions refreshed");
    Ok(())
  }

  /// Refresh everything. Used after every execution attempt so dependent
  /// views never observe pre-attempt state.
  pub async fn refresh_all(&self) -> Result<()> {
    self.refresh_balances().await?;
    self.refresh_views().await
  }

  /// Run the polling loop until shutdown.
  #[instrument(skip_all, name = "account_tracker")]
  pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
    let mut balance_tick = tokio::time::interval(self.balance_interval);
    let mut view_tick = tokio::time::interval(self.view_interval);

    info!(
      account = %self.account,
      venues = self.venues.len(),
      "Account tracker started"
    );

    loop {
      tokio::select! {
        biased;
        _ = shutdown_rx.recv() => {
          info!("Account tracker shutting down");
          return Ok(());
        }
        _ = balance_tick.tick() => {
          if let Err(e) = self.refresh_balances().await {
            warn!(error = %e, "Balance poll failed");
          }
        }
        _ = view_tick.tick() => {
          if let Err(e) = self.refresh_views().await {
            warn!(error = %e, "Account view poll failed");
          }
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use async_trait::async_trait;
  use rust_decimal_macros::dec;
  use std::sync::atomic::{AtomicU32, Ordering};

  struct CountingProvider {
    balance_calls: AtomicU32,
  }

  #[async_trait]
  impl AccountDataProvider for CountingProvider {
    async fn fetch_balances(
      &self,
      _account: &str,
      venues: &[VenueId],
    ) -> Result<BTreeMap<VenueId, VenueBalance>> {
      self.balance_calls.fetch_add(1, Ordering::Relaxed);
      Ok(
        venues
          .iter()
          .map(|v| {
            (
              v.clone(),
              VenueBalance {
                withdrawable: dec!(100),
                total_raw_usd: dec!(100),
                margin_used: dec!(0),
              },
            )
          })
          .collect(),
      )
    }

    async fn fetch_open_orders(&self, _account: &str) -> Result<Vec<OpenOrder>> {
      Ok(Vec::new())
    }

    async fn fetch_positions(&self, _account: &str) -> Result<Vec<VenuePosition>> {
      Ok(Vec::new())
    }
  }

  fn tracker() -> AccountTracker<CountingProvider> {
    AccountTracker::new(
      Arc::new(CountingProvider {
        balance_calls: AtomicU32::new(0),
      }),
      "0xabc".to_string(),
      vec!["btcx".to_string(), "sekaw".to_string()],
      &PollingConfig {
        balance_interval_secs: 30,
        view_interval_secs: 5,
      },
    )
  }

  #[tokio::test]
  async fn test_balances_none_before_first_poll() {
    let tracker = tracker();
    assert!(tracker.balances().await.is_none());
  }

  #[tokio::test]
  async fn test_refresh_publishes_snapshot() {
    let tracker = tracker();
    tracker.refresh_balances().await.unwrap();

    let balances = tracker.balances().await.unwrap();
    assert_eq!(balances.len(), 2);
    assert_eq!(balances["btcx"].withdrawable, dec!(100));

    let snapshot = tracker.balances_snapshot().await.unwrap();
    assert!(!snapshot.is_stale(30));
    assert_eq!(tracker.provider.balance_calls.load(Ordering::Relaxed), 1);
  }

  #[tokio::test]
  async fn test_refresh_all_covers_views() {
    let tracker = tracker();
    tracker.refresh_all().await.unwrap();
    assert!(tracker.balances().await.is_some());
    assert!(tracker.open_orders().await.is_empty());
    assert!(tracker.positions().await.is_empty());
  }
}
