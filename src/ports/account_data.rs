//! Account Data Port - Balance, Order and Position Snapshots
//!
//! Defines the trait for retrieving the authenticated account's state
//! across venues. The provider is a polling data accessor: the tracker
//! use case calls it on a fixed interval and on demand after any transfer
//! or order submission that could change balances.

use std::collections::BTreeMap;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::book::{Coin, VenueBalance, VenueId};
use crate::domain::order::OrderSide;

/// An order currently resting on some venue's book.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenOrder {
  /// Venue the order rests on.
  pub venue: VenueId,
  /// Instrument.
  pub coin: Coin,
  /// Venue-assigned order id.
  pub oid: u64,
  /// Buy or sell.
  pub side: OrderSide,
  /// Resting limit price.
  pub limit_px: Decimal,
  /// Remaining size.
  pub size: Decimal,
  /// Placement timestamp (Unix ms).
  pub timestamp_ms: u64,
}

/// An open position on one venue.
#[derive(Debug, Clone, PartialEq)]
pub struct VenuePosition {
  /// Venue holding the position.
  pub venue: VenueId,
  /// Instrument.
  pub coin: Coin,
  /// Signed size (positive = long, negative = short).
  pub size: Decimal,
  /// Average entry price, when the venue reports one.
  pub entry_price: Option<Decimal>,
  /// Mark-to-market unrealized PnL.
  pub unrealized_pnl: Decimal,
  /// Margin consumed by this position.
  pub margin_used: Decimal,
}

/// Trait for account state providers.
///
/// Implementors query the venue info endpoints for the authenticated
/// account. All methods are read-only; staleness between polls is
/// advisory and tolerated by consumers.
#[async_trait]
pub trait AccountDataProvider: Send + Sync + 'static {
  /// Withdrawable balance and margin summary per venue.
  async fn fetch_balances(
    &self,
    account: &str,
    venues: &[VenueId],
  ) -> anyhow::Result<BTreeMap<VenueId, VenueBalance>>;

  /// Orders currently resting across all venues.
  async fn fetch_open_orders(&self, account: &str) -> anyhow::Result<Vec<OpenOrder>>;

  /// Open positions across all venues.
  async fn fetch_positions(&self, account: &str) -> anyhow::Result<Vec<VenuePosition>>;
}
