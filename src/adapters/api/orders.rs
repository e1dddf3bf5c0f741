//! Order Gateway Adapter — Agent-Signed Order Submission
//!
//! Implements the `OrderGateway` port against the venue's exchange
//! endpoint. The signing agent is attached at construction time; a
//! gateway without one reports not-ready instead of failing at call
//! time. Submission is a single attempt — the response is classified
//! into the failure taxonomy and never retried here.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, instrument, warn};

use super::client::VenueClient;
use super::signing::AgentWallet;
use super::types::{parse_decimal, ExchangeResponseWire};
use crate::ports::order_gateway::{FillSummary, OrderAck, OrderGateway, OrderTicket, SubmitError};

/// Exchange-endpoint implementation of the order gateway.
pub struct ExchangeOrderGateway {
    client: Arc<VenueClient>,
    /// Delegated signing agent; absent in read-only deployments.
    wallet: Option<Arc<AgentWallet>>,
}

impl ExchangeOrderGateway {
    pub fn new(client: Arc<VenueClient>, wallet: Option<Arc<AgentWallet>>) -> Self {
        Self { client, wallet }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Map a venue rejection string onto the submission failure taxonomy.
///
/// "User or API Wallet ... does not exist" means the venue has no record
/// of the delegated agent — an actionable re-registration problem, kept
/// distinct from ordinary order rejections.
fn classify_rejection(message: &str) -> SubmitError {
    if message.contains("does not exist") || message.contains("User or API Wallet") {
        SubmitError::AgentNotRegistered
    } else {
        SubmitError::Rejected(message.to_string())
    }
}

/// Interpret the exchange response for a single-order action.
fn parse_ack(response: ExchangeResponseWire) -> Result<OrderAck, SubmitError> {
    if response.status != "ok" {
        let message = response
            .response
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| response.response.to_string());
        return Err(classify_rejection(&message));
    }

    let status = response
        .response
        .pointer("/data/statuses/0")
        .cloned()
        .unwrap_or_default();

    if let Some(error) = status.get("error").and_then(|e| e.as_str()) {
        return Err(classify_rejection(error));
    }

    let oid = status.pointer("/resting/oid").and_then(|v| v.as_u64());

    let filled = status.get("filled").and_then(|f| {
        let avg = f.get("avgPx")?.as_str()?;
        let total = f.get("totalSz")?.as_str()?;
        Some(FillSummary {
            avg_price: parse_decimal(avg, "avgPx").ok()?,
            total_size: parse_decimal(total, "totalSz").ok()?,
        })
    });

    Ok(OrderAck { oid, filled })
}

#[async_trait]
impl OrderGateway for ExchangeOrderGateway {
    fn is_ready(&self) -> bool {
        self.wallet.is_some()
    }

    #[instrument(skip(self, ticket), fields(asset = ticket.asset_id, price = %ticket.price, size = %ticket.size))]
    async fn submit(&self, account: &str, ticket: &OrderTicket) -> Result<OrderAck, SubmitError> {
        let wallet = self
            .wallet
            .as_ref()
            .ok_or_else(|| SubmitError::Transport("no signing agent attached".to_string()))?;

        let nonce = now_ms();
        let action = json!({
            "type": "order",
            "orders": [{
                "a": ticket.asset_id,
                "b": ticket.is_buy,
                "p": ticket.price.to_string(),
                "s": ticket.size.to_string(),
                "r": ticket.reduce_only,
                "t": {"limit": {"tif": ticket.time_in_force.as_wire()}},
            }],
            "grouping": "na",
        });

        let signature = wallet
            .sign_l1_action(&action, nonce)
            .map_err(|e| SubmitError::Transport(e.to_string()))?;

        let body = json!({
            "action": action,
            "nonce": nonce,
            "signature": signature,
        });

        let raw = self
            .client
            .post_exchange(&body)
            .await
            .map_err(|e| SubmitError::Transport(e.to_string()))?;

        let response: ExchangeResponseWire = serde_json::from_value(raw)
            .map_err(|e| SubmitError::Transport(format!("malformed response: {e}")))?;

        let ack = parse_ack(response)?;
        match (&ack.oid, &ack.filled) {
            (_, Some(fill)) => info!(avg_px = %fill.avg_price, size = %fill.total_size, "Order filled"),
            (Some(oid), None) => info!(oid, "Order resting"),
            (None, None) => warn!(account, "Order accepted without oid or fill"),
        }
        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn wire(raw: &str) -> ExchangeResponseWire {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_resting_ack_parses() {
        let ack = parse_ack(wire(
            r#"{"status": "ok", "response": {"type": "order", "data": {"statuses": [{"resting": {"oid": 77738308}}]}}}"#,
        ))
        .unwrap();
        assert_eq!(ack.oid, Some(77738308));
        assert!(ack.filled.is_none());
    }

    #[test]
    fn test_fill_ack_parses() {
        let ack = parse_ack(wire(
            r#"{"status": "ok", "response": {"type": "order", "data": {"statuses": [{"filled": {"totalSz": "0.01", "avgPx": "100004.5", "oid": 1}}]}}}"#,
        ))
        .unwrap();
        let fill = ack.filled.unwrap();
        assert_eq!(fill.avg_price, dec!(100004.5));
        assert_eq!(fill.total_size, dec!(0.01));
    }

    #[test]
    fn test_agent_not_registered_classified() {
        let err = parse_ack(wire(
            r#"{"status": "err", "response": "User or API Wallet 0xabc does not exist."}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, SubmitError::AgentNotRegistered));
    }

    #[test]
    fn test_status_level_rejection_verbatim() {
        let err = parse_ack(wire(
            r#"{"status": "ok", "response": {"type": "order", "data": {"statuses": [{"error": "Order price too aggressive"}]}}}"#,
        ))
        .unwrap_err();
        match err {
            SubmitError::Rejected(msg) => assert_eq!(msg, "Order price too aggressive"),
            other => panic!("wrong classification: {other:?}"),
        }
    }
}
