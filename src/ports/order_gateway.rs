//! Order Gateway Port - Venue Order Submission Interface
//!
//! Defines the trait for submitting one order to a venue's exchange
//! endpoint and the classified failure taxonomy the orchestrator
//! propagates. The submission capability is resolved at construction
//! time: a constructed gateway either has a signing agent or it does not,
//! and `is_ready()` reports which.

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::order::TimeInForce;

/// A fully resolved order, ready for the wire.
///
/// Prices and sizes are already rounded to the venue's decimals; the
/// asset id is already venue-qualified.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderTicket {
  /// Venue-qualified asset id.
  pub asset_id: u32,
  /// Buy (true) or sell (false).
  pub is_buy: bool,
  /// Submitted price.
  pub price: Decimal,
  /// Submitted size.
  pub size: Decimal,
  /// Whether the order may only reduce an existing position.
  pub reduce_only: bool,
  /// Venue time-in-force.
  pub time_in_force: TimeInForce,
}

/// Fill details when the venue matched the order immediately.
#[derive(Debug, Clone, PartialEq)]
pub struct FillSummary {
  /// Average fill price.
  pub avg_price: Decimal,
  /// Total size filled.
  pub total_size: Decimal,
}

/// Venue acceptance of a submitted order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
  /// Venue-assigned order id, when the order rested.
  pub oid: Option<u64>,
  /// Immediate fill, when the order crossed.
  pub filled: Option<FillSummary>,
}

/// Classified submission failure.
#[derive(Debug, Error)]
pub enum SubmitError {
  /// The venue does not recognize the delegated agent wallet. The caller
  /// must re-register the agent with the venue before trading again —
  /// never conflate this with an ordinary rejection.
  #[error("agent wallet is not registered with the venue; re-approve it before trading")]
  AgentNotRegistered,

  /// Venue-side validation rejected the order; message verbatim.
  #[error("order rejected: {0}")]
  Rejected(String),

  /// The exchange endpoint could not be reached or answered garbage.
  #[error("order gateway error: {0}")]
  Transport(String),
}

/// Trait for venue order submission.
#[async_trait]
pub trait OrderGateway: Send + Sync + 'static {
  /// Whether a signing agent is attached and submission can proceed.
  fn is_ready(&self) -> bool;

  /// Submit one order on behalf of `account`.
  async fn submit(&self, account: &str, ticket: &OrderTicket) -> Result<OrderAck, SubmitError>;
}
