//! Account Data Adapter — Balance, Order and Position Queries
//!
//! Implements the `AccountDataProvider` port against the venue's info
//! endpoint. Each venue is an independent clearinghouse, so balances and
//! positions are queried per venue and merged.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::json;

use super::client::VenueClient;
use super::types::{parse_decimal, ClearinghouseStateWire, OpenOrderWire};
use crate::domain::book::{VenueBalance, VenueId};
use crate::domain::order::OrderSide;
use crate::ports::account_data::{AccountDataProvider, OpenOrder, VenuePosition};

/// Info-endpoint implementation of the account data port.
pub struct HttpAccountData {
    client: Arc<VenueClient>,
    /// Venues this deployment tracks, in config order.
    venues: Vec<VenueId>,
}

impl HttpAccountData {
    pub fn new(client: Arc<VenueClient>, venues: Vec<VenueId>) -> Self {
        Self { client, venues }
    }

    async fn clearinghouse_state(
        &self,
        account: &str,
        venue: &str,
    ) -> Result<ClearinghouseStateWire> {
        let body = json!({
            "type": "clearinghouseState",
            "user": account,
            "dex": venue,
        });
        let raw = self
            .client
            .post_info(&body)
            .await
            .with_context(|| format!("clearinghouseState query failed for {venue}"))?;
        serde_json::from_value(raw)
            .with_context(|| format!("Malformed clearinghouseState for {venue}"))
    }
}

#[async_trait]
impl AccountDataProvider for HttpAccountData {
    async fn fetch_balances(
        &self,
        account: &str,
        venues: &[VenueId],
    ) -> Result<BTreeMap<VenueId, VenueBalance>> {
        let mut balances = BTreeMap::new();
        for venue in venues {
            let state = self.clearinghouse_state(account, venue).await?;
            balances.insert(
                venue.clone(),
                VenueBalance {
                    withdrawable: parse_decimal(&state.withdrawable, "withdrawable")?,
                    total_raw_usd: parse_decimal(
                        &state.margin_summary.total_raw_usd,
                        "totalRawUsd",
                    )?,
                    margin_used: parse_decimal(
                        &state.margin_summary.total_margin_used,
                        "totalMarginUsed",
                    )?,
                },
            );
        }
        Ok(balances)
    }

    async fn fetch_open_orders(&self, account: &str) -> Result<Vec<OpenOrder>> {
        let mut orders = Vec::new();
        for venue in &self.venues {
            let body = json!({
                "type": "frontendOpenOrders",
                "user": account,
                "dex": venue,
            });
            let raw = self
                .client
                .post_info(&body)
                .await
                .with_context(|| format!("frontendOpenOrders query failed for {venue}"))?;
            let wire: Vec<OpenOrderWire> = serde_json::from_value(raw)
                .with_context(|| format!("Malformed open orders for {venue}"))?;

            for order in wire {
                orders.push(OpenOrder {
                    venue: venue.clone(),
                    coin: order.coin.clone(),
                    oid: order.oid,
                    side: if order.side == "B" {
                        OrderSide::Buy
                    } else {
                        OrderSide::Sell
                    },
                    limit_px: parse_decimal(&order.limit_px, "limitPx")?,
                    size: parse_decimal(&order.sz, "sz")?,
                    timestamp_ms: order.timestamp,
                });
            }
        }
        Ok(orders)
    }

    async fn fetch_positions(&self, account: &str) -> Result<Vec<VenuePosition>> {
        let mut positions = Vec::new();
        for venue in &self.venues {
            let state = self.clearinghouse_state(account, venue).await?;
            for entry in state.asset_positions {
                let p = entry.position;
                let size = parse_decimal(&p.szi, "szi")?;
                if size == Decimal::ZERO {
                    continue;
                }
                positions.push(VenuePosition {
                    venue: venue.clone(),
                    coin: p.coin,
                    size,
                    entry_price: p
                        .entry_px
                        .as_deref()
                        .map(|px| parse_decimal(px, "entryPx"))
                        .transpose()?,
                    unrealized_pnl: p
                        .unrealized_pnl
                        .as_deref()
                        .map_or(Ok(Decimal::ZERO), |v| parse_decimal(v, "unrealizedPnl"))?,
                    margin_used: p
                        .margin_used
                        .as_deref()
                        .map_or(Ok(Decimal::ZERO), |v| parse_decimal(v, "marginUsed"))?,
                });
            }
        }
        Ok(positions)
    }
}
