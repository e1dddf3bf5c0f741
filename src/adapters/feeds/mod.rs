//! Market Data Feed Adapters - Live Aggregated Book Streaming
//!
//! WebSocket-based feed from the price-aggregation backend, with the
//! reconnect/backoff state machine and copy-on-publish book snapshots.

pub mod book_ws;

pub use book_ws::BookFeed;
