//! Order request domain types.
//!
//! An `OrderRequest` is caller-supplied, validated at construction and
//! immutable afterwards. The planner and orchestrator only ever read it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Requested execution style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    /// Cross the spread at the best available price plus slippage.
    Market,
    /// Rest at the caller's limit price.
    Limit,
    /// Immediate-or-cancel at best price plus slippage.
    Ioc,
}

/// Venue time-in-force derived from the order kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    Gtc,
    Ioc,
}

impl TimeInForce {
    /// Wire representation expected by the exchange endpoint.
    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::Gtc => "Gtc",
            Self::Ioc => "Ioc",
        }
    }
}

/// Rejected order construction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderValidation {
    #[error("order size must be positive")]
    NonPositiveSize,
    #[error("limit orders require a limit price")]
    MissingLimitPrice,
    #[error("limit price must be positive")]
    NonPositiveLimitPrice,
    #[error("slippage percent must not be negative")]
    NegativeSlippage,
}

/// A validated, immutable order request.
///
/// Use the [`market`](Self::market), [`limit`](Self::limit) and
/// [`ioc`](Self::ioc) constructors; there is no way to build an invalid
/// request or to mutate one after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    side: OrderSide,
    size: Decimal,
    kind: OrderKind,
    limit_price: Option<Decimal>,
    slippage_pct: Decimal,
}

impl OrderRequest {
    /// A market order with a slippage allowance in percent.
    pub fn market(
        side: OrderSide,
        size: Decimal,
        slippage_pct: Decimal,
    ) -> Result<Self, OrderValidation> {
        Self::build(side, size, OrderKind::Market, None, slippage_pct)
    }

    /// A limit order resting at `limit_price`.
    pub fn limit(
        side: OrderSide,
        size: Decimal,
        limit_price: Decimal,
    ) -> Result<Self, OrderValidation> {
        Self::build(side, size, OrderKind::Limit, Some(limit_price), Decimal::ZERO)
    }

    /// An immediate-or-cancel order with a slippage allowance in percent.
    pub fn ioc(
        side: OrderSide,
        size: Decimal,
        slippage_pct: Decimal,
    ) -> Result<Self, OrderValidation> {
        Self::build(side, size, OrderKind::Ioc, None, slippage_pct)
    }

    fn build(
        side: OrderSide,
        size: Decimal,
        kind: OrderKind,
        limit_price: Option<Decimal>,
        slippage_pct: Decimal,
    ) -> Result<Self, OrderValidation> {
        if size <= Decimal::ZERO {
            return Err(OrderValidation::NonPositiveSize);
        }
        if slippage_pct < Decimal::ZERO {
            return Err(OrderValidation::NegativeSlippage);
        }
        match (kind, limit_price) {
            (OrderKind::Limit, None) => return Err(OrderValidation::MissingLimitPrice),
            (OrderKind::Limit, Some(px)) if px <= Decimal::ZERO => {
                return Err(OrderValidation::NonPositiveLimitPrice)
            }
            _ => {}
        }
        Ok(Self {
            side,
            size,
            kind,
            limit_price,
            slippage_pct,
        })
    }

    pub fn side(&self) -> OrderSide {
        self.side
    }

    pub fn size(&self) -> Decimal {
        self.size
    }

    pub fn kind(&self) -> OrderKind {
        self.kind
    }

    /// Present iff the order is a limit order.
    pub fn limit_price(&self) -> Option<Decimal> {
        self.limit_price
    }

    /// Slippage allowance in percent; only meaningful for market/ioc.
    pub fn slippage_pct(&self) -> Decimal {
        self.slippage_pct
    }

    /// Venue time-in-force: `Ioc` for ioc orders, `Gtc` otherwise.
    pub fn time_in_force(&self) -> TimeInForce {
        match self.kind {
            OrderKind::Ioc => TimeInForce::Ioc,
            OrderKind::Market | OrderKind::Limit => TimeInForce::Gtc,
        }
    }
}
