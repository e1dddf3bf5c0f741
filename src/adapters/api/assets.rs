//! Asset Catalog — Venue Asset Resolution with Static Fallback
//!
//! Each venue assigns its own numeric asset id and rounding rules to the
//! same instrument. `HttpAssetResolver` derives them from venue metadata;
//! `AssetCatalog` layers an explicit cache and the static per-venue
//! fallback table from config on top, so order submission never aborts on
//! a resolution failure. The catalog is owned by the wiring context and
//! passed into the orchestrator — there is no ambient global cache.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::client::VenueClient;
use super::types::MetaWire;
use crate::config::VenueConfig;
use crate::domain::book::VenueId;
use crate::ports::asset_resolver::{AssetIdResolver, AssetMeta};

/// Asset id used when a venue/coin pair is in no fallback table at all.
const DEFAULT_FALLBACK_ASSET_ID: u32 = 390_000;

/// Size/price decimals assumed when metadata is unavailable.
const DEFAULT_SZ_DECIMALS: u32 = 3;
const DEFAULT_PX_DECIMALS: u32 = 2;

/// Price decimals from size decimals, per the venue's perp convention.
fn px_decimals(sz_decimals: u32) -> u32 {
    6u32.saturating_sub(sz_decimals)
}

fn tick_size(px_decimals: u32) -> Decimal {
    Decimal::new(1, px_decimals)
}

/// Live resolver backed by the venue's metadata endpoints.
///
/// The asset id is venue-qualified: `10000 × (venue index + 1)` plus the
/// instrument's position in that venue's universe.
pub struct HttpAssetResolver {
    client: Arc<VenueClient>,
}

impl HttpAssetResolver {
    pub fn new(client: Arc<VenueClient>) -> Self {
        Self { client }
    }

    async fn venue_index(&self, venue: &str) -> Result<u32> {
        let raw = self
            .client
            .post_info(&json!({"type": "perpDexs"}))
            .await
            .context("perpDexs query failed")?;
        let names: Vec<Option<String>> =
            serde_json::from_value(raw).context("Malformed perpDexs response")?;
        names
            .iter()
            .position(|n| n.as_deref() == Some(venue))
            .map(|i| i as u32)
            .with_context(|| format!("Venue {venue} not listed by perpDexs"))
    }
}

#[async_trait]
impl AssetIdResolver for HttpAssetResolver {
    async fn resolve(&self, venue: &VenueId, coin: &str) -> Result<AssetMeta> {
        let venue_index = self.venue_index(venue).await?;

        let raw = self
            .client
            .post_info(&json!({"type": "meta", "dex": venue}))
            .await
            .with_context(|| format!("meta query failed for {venue}"))?;
        let meta: MetaWire =
            serde_json::from_value(raw).with_context(|| format!("Malformed meta for {venue}"))?;

        let (coin_index, entry) = meta
            .universe
            .iter()
            .enumerate()
            .find(|(_, e)| e.name == coin)
            .with_context(|| format!("Coin {coin} not in universe of {venue}"))?;

        let px = px_decimals(entry.sz_decimals);
        Ok(AssetMeta {
            asset_id: 10_000 * (venue_index + 1) + coin_index as u32,
            sz_decimals: entry.sz_decimals,
            px_decimals: px,
            tick_size: tick_size(px),
        })
    }
}

/// Caching catalog over any resolver, with static fallbacks.
pub struct AssetCatalog<R: AssetIdResolver> {
    resolver: Arc<R>,
    cache: RwLock<HashMap<(VenueId, String), AssetMeta>>,
    /// venue id -> coin -> fallback asset id, from config.
    fallbacks: HashMap<VenueId, HashMap<String, u32>>,
}

impl<R: AssetIdResolver> AssetCatalog<R> {
    /// Build the catalog with fallback tables taken from venue config.
    pub fn new(resolver: Arc<R>, venues: &[VenueConfig]) -> Self {
        let fallbacks = venues
            .iter()
            .map(|v| (v.id.clone(), v.fallback_assets.clone()))
            .collect();
        Self {
            resolver,
            cache: RwLock::new(HashMap::new()),
            fallbacks,
        }
    }

    /// Resolve metadata, consulting cache first and falling back to the
    /// static table when live resolution fails. Never errors: an order
    /// submission must not abort because metadata was unavailable.
    pub async fn asset_meta(&self, venue: &VenueId, coin: &str) -> AssetMeta {
        let key = (venue.clone(), coin.to_string());
        {
            let cache = self.cache.read().await;
            if let Some(hit) = cache.get(&key) {
                return hit.clone();
            }
        }

        match self.resolver.resolve(venue, coin).await {
            Ok(meta) => {
                debug!(venue = %venue, coin, asset_id = meta.asset_id, "Resolved asset meta");
                let mut cache = self.cache.write().await;
                cache.insert(key, meta.clone());
                meta
            }
            Err(e) => {
                warn!(
                    venue = %venue,
                    coin,
                    error = %e,
                    "Asset resolution failed, using static fallback"
                );
                self.fallback(venue, coin)
            }
        }
    }

    /// Drop all cached entries, forcing fresh resolution.
    pub async fn invalidate(&self) {
        let mut cache = self.cache.write().await;
        cache.clear();
    }

    fn fallback(&self, venue: &VenueId, coin: &str) -> AssetMeta {
        let asset_id = self
            .fallbacks
            .get(venue)
            .and_then(|coins| coins.get(coin))
            .copied()
            .unwrap_or(DEFAULT_FALLBACK_ASSET_ID);
        AssetMeta {
            asset_id,
            sz_decimals: DEFAULT_SZ_DECIMALS,
            px_decimals: DEFAULT_PX_DECIMALS,
            tick_size: tick_size(DEFAULT_PX_DECIMALS),
        }
    }
}
