//! Asset Resolver Port - Venue-Qualified Instrument Metadata
//!
//! Each venue assigns its own numeric asset id and rounding rules to the
//! same instrument. The resolver looks these up from venue metadata; the
//! catalog adapter layers caching and a static fallback table on top.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::book::VenueId;

/// Venue-specific metadata for one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetMeta {
  /// Venue-qualified asset id.
  pub asset_id: u32,
  /// Decimal places for order sizes.
  pub sz_decimals: u32,
  /// Decimal places for prices.
  pub px_decimals: u32,
  /// Minimum price increment.
  pub tick_size: Decimal,
}

/// Trait for venue asset metadata lookup.
#[async_trait]
pub trait AssetIdResolver: Send + Sync + 'static {
  /// Resolve metadata for `coin` on `venue`.
  async fn resolve(&self, venue: &VenueId, coin: &str) -> anyhow::Result<AssetMeta>;
}
