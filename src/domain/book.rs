//! Aggregated order book domain types.
//!
//! One instrument is traded on several independent builder DEXs
//! ("venues"). The feed publishes a merged top-of-book for a reference
//! venue plus the per-venue best bid/ask map the planner routes against.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────
// Type aliases consumed by ports and adapters
// ────────────────────────────────────────────

/// Lightweight venue identifier used at the ports boundary (e.g. "sekaw").
pub type VenueId = String;

/// Instrument symbol (e.g. "BTC").
pub type Coin = String;

/// Best bid/ask snapshot for a single venue.
///
/// A quote missing either side is unusable for routing; so is a crossed
/// quote (`ask < bid`), which only appears when a venue publishes garbage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueQuote {
    /// Best bid price, if the venue has resting buy interest.
    pub best_bid: Option<Decimal>,
    /// Best ask price, if the venue has resting sell interest.
    pub best_ask: Option<Decimal>,
    /// Spread (ask - bid), as published by the feed.
    pub spread: Option<Decimal>,
    /// Mid price, as published by the feed.
    pub mid_price: Option<Decimal>,
    /// When the venue snapshot was taken (Unix ms).
    pub observed_at_ms: u64,
}

impl VenueQuote {
    /// Whether this quote can be routed against.
    pub fn is_executable(&self) -> bool {
        matches!(
            (self.best_bid, self.best_ask),
            (Some(bid), Some(ask)) if ask >= bid
        )
    }
}

/// One depth level of the reference order book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    /// Level price.
    pub price: Decimal,
    /// Total size resting at this price.
    pub size: Decimal,
    /// Number of orders at this price.
    pub orders: u32,
}

/// Merged top-of-book across all tracked venues for one instrument.
///
/// Published wholesale by the feed on every message (copy-on-publish:
/// a new `Arc<AggregatedBook>` replaces the old one, readers never see a
/// partially updated aggregate). Venues are keyed in a `BTreeMap` so that
/// iteration order — and therefore planner tie-breaking — is fixed by
/// venue identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedBook {
    /// Instrument this book aggregates.
    pub coin: Coin,
    /// Feed timestamp of this snapshot (Unix ms).
    pub timestamp_ms: u64,
    /// Best bid on the reference venue.
    pub best_bid: Decimal,
    /// Best ask on the reference venue.
    pub best_ask: Decimal,
    /// Reference spread (ask - bid).
    pub spread: Decimal,
    /// Reference mid price.
    pub mid_price: Decimal,
    /// Reference bid depth, sorted by price descending.
    pub bids: Vec<BookLevel>,
    /// Reference ask depth, sorted by price ascending.
    pub asks: Vec<BookLevel>,
    /// Per-venue top-of-book, keyed by venue identifier.
    pub venues: BTreeMap<VenueId, VenueQuote>,
}

impl AggregatedBook {
    /// Venues with a routable quote, in fixed venue-id order.
    pub fn executable_venues(&self) -> impl Iterator<Item = (&VenueId, &VenueQuote)> {
        self.venues.iter().filter(|(_, q)| q.is_executable())
    }
}

/// Per-venue account balance snapshot.
///
/// Refreshed on a fixed polling interval and on demand after transfers and
/// order submissions. Staleness is advisory — consumers tolerate slightly
/// outdated values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueBalance {
    /// USDC available for withdrawal / transfer out of the venue.
    pub withdrawable: Decimal,
    /// Total raw USD value held on the venue.
    pub total_raw_usd: Decimal,
    /// Margin currently in use on the venue.
    pub margin_used: Decimal,
}
