//! Venue REST API Adapters
//!
//! Concrete implementations of the account-data, transfer, order and
//! asset-resolution ports against the venue's info and exchange
//! endpoints, plus the shared HTTP client and agent signing.

pub mod account;
pub mod assets;
pub mod client;
pub mod orders;
pub mod signing;
pub mod transfers;
pub mod types;
