//! Venue API Request/Response Types
//!
//! Serialization types for the venue's info and exchange endpoints.
//! The venue reports all decimal quantities as strings; parsing into
//! `Decimal` happens at this boundary so nothing downstream touches
//! floating point.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;

/// Margin summary block of a clearinghouse state response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginSummaryWire {
    pub account_value: String,
    pub total_raw_usd: String,
    pub total_margin_used: String,
}

/// Per-venue account state from `{"type": "clearinghouseState"}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearinghouseStateWire {
    pub margin_summary: MarginSummaryWire,
    pub withdrawable: String,
    #[serde(default)]
    pub asset_positions: Vec<AssetPositionWire>,
    #[serde(default)]
    pub time: u64,
}

/// One open position entry.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetPositionWire {
    pub position: PositionWire,
}

/// Position details as reported by the venue.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionWire {
    pub coin: String,
    /// Signed size.
    pub szi: String,
    #[serde(default)]
    pub entry_px: Option<String>,
    #[serde(default)]
    pub unrealized_pnl: Option<String>,
    #[serde(default)]
    pub margin_used: Option<String>,
}

/// One resting order from `{"type": "frontendOpenOrders"}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenOrderWire {
    pub coin: String,
    /// "B" for bid (buy), "A" for ask (sell).
    pub side: String,
    pub limit_px: String,
    pub sz: String,
    pub oid: u64,
    #[serde(default)]
    pub timestamp: u64,
}

/// One instrument entry from `{"type": "meta"}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniverseEntryWire {
    pub name: String,
    pub sz_decimals: u32,
}

/// Instrument metadata response for one venue.
#[derive(Debug, Clone, Deserialize)]
pub struct MetaWire {
    pub universe: Vec<UniverseEntryWire>,
}

/// Envelope returned by the exchange endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeResponseWire {
    pub status: String,
    #[serde(default)]
    pub response: serde_json::Value,
}

/// Parse one of the venue's string-encoded decimals.
pub fn parse_decimal(value: &str, field: &str) -> Result<Decimal> {
    value
        .parse::<Decimal>()
        .with_context(|| format!("Invalid decimal in field {field}: {value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_clearinghouse_state_parses() {
        let raw = r#"{
            "marginSummary": {
                "accountValue": "2050.0",
                "totalNtlPos": "0.0",
                "totalRawUsd": "2050.0",
                "totalMarginUsed": "12.5"
            },
            "withdrawable": "2000.0",
            "assetPositions": [
                {"position": {"coin": "BTC", "szi": "0.01", "entryPx": "100000", "unrealizedPnl": "5.0", "marginUsed": "12.5"}}
            ],
            "time": 1700000000000
        }"#;
        let state: ClearinghouseStateWire = serde_json::from_str(raw).unwrap();
        assert_eq!(
            parse_decimal(&state.withdrawable, "withdrawable").unwrap(),
            dec!(2000)
        );
        assert_eq!(state.asset_positions.len(), 1);
        assert_eq!(state.asset_positions[0].position.coin, "BTC");
    }

    #[test]
    fn test_parse_decimal_rejects_garbage() {
        assert!(parse_decimal("not-a-number", "test").is_err());
    }
}
