//! Transfer Gateway Port - Signed Inter-Venue Fund Movement
//!
//! Defines the trait for moving collateral between venues the account
//! controls. A transfer is a venue-signed instruction; the gateway signs
//! with the delegated agent wallet and submits it. Transfers are never
//! retried by the core — a failure aborts the surrounding execution.

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::book::VenueId;

/// A requested fund movement between two venues.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
  /// Account address the funds belong to.
  pub account: String,
  /// Venue to move funds out of.
  pub source: VenueId,
  /// Venue to move funds into.
  pub destination: VenueId,
  /// Asset token to move (normally "USDC").
  pub token: String,
  /// Amount in token units.
  pub amount: Decimal,
}

/// Venue acknowledgment of a completed transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferReceipt {
  /// Amount acknowledged by the venue.
  pub amount: Decimal,
  /// Source venue.
  pub source: VenueId,
  /// Destination venue.
  pub destination: VenueId,
  /// Acknowledgment timestamp (Unix ms).
  pub timestamp_ms: u64,
}

/// Classified transfer failure, for user messaging.
#[derive(Debug, Error)]
pub enum TransferError {
  /// The signature was produced for a different chain than the venue
  /// expects. Fix the configured signature chain id.
  #[error("signature chain id mismatch: {0}")]
  ChainIdMismatch(String),

  /// The signer declined to sign the transfer instruction.
  #[error("transfer signing was rejected by the wallet")]
  UserRejected,

  /// The venue refused the transfer; message passed through verbatim.
  #[error("venue rejected transfer: {0}")]
  VenueRejected(String),

  /// The gateway could not be reached or returned garbage.
  #[error("transfer gateway error: {0}")]
  Gateway(String),
}

/// Trait for signed inter-venue transfer execution.
#[async_trait]
pub trait TransferGateway: Send + Sync + 'static {
  /// Sign and submit one transfer instruction.
  async fn transfer(&self, request: &TransferRequest) -> Result<TransferReceipt, TransferError>;
}
