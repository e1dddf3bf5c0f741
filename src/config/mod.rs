//! Configuration Module - TOML-based Router Configuration
//!
//! Loads and validates configuration from `config.toml`. All venue
//! identifiers, endpoints and timing parameters are externalized here -
//! nothing is hardcoded in the domain layer.

pub mod loader;

use std::collections::HashMap;

use serde::Deserialize;

/// Top-level router configuration.
///
/// Loaded from `config.toml` at startup. All fields are validated
/// before any connection is opened.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Router identity and instrument.
  pub router: RouterConfig,
  /// Authenticated account and signing chain.
  pub account: AccountConfig,
  /// Tracked venues, in display order.
  pub venues: Vec<VenueConfig>,
  /// Streaming book feed endpoint and reconnect policy.
  pub feed: FeedConfig,
  /// Execution timing and bounds.
  pub execution: ExecutionConfig,
  /// Venue REST API endpoints.
  pub api: ApiConfig,
  /// Account polling cadence.
  pub polling: PollingConfig,
  /// Metrics and health endpoints.
  pub metrics: MetricsConfig,
}

/// Router identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
  /// Human-readable router name.
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
  /// Instrument routed by this deployment.
  #[serde(default = "default_coin")]
  pub coin: String,
}

/// Authenticated account configuration.
///
/// The agent private key is NEVER in config; it comes from the
/// `ROUTER_AGENT_KEY` environment variable.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
  /// Account address the agent wallet is delegated for.
  pub address: String,
  /// Collateral token moved between venues.
  #[serde(default = "default_token")]
  pub token: String,
  /// Venue chain name ("Testnet" or "Mainnet").
  #[serde(default = "default_chain")]
  pub chain: String,
  /// EIP-712 signature chain id (hex string).
  #[serde(default = "default_signature_chain_id")]
  pub signature_chain_id: String,
}

/// Individual venue configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct VenueConfig {
  /// Venue identifier as it appears in feed messages (e.g. "sekaw").
  pub id: String,
  /// Human-readable name for progress and log messages.
  pub display_name: String,
  /// Static asset-id fallbacks per coin, used when live resolution fails.
  #[serde(default)]
  pub fallback_assets: HashMap<String, u32>,
}

/// Streaming feed configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
  /// Aggregated book WebSocket URL.
  pub ws_url: String,
  /// Base reconnect delay in milliseconds (doubles per attempt).
  #[serde(default = "default_reconnect_base_ms")]
  pub reconnect_base_ms: u64,
  /// Reconnect delay cap in milliseconds.
  #[serde(default = "default_reconnect_max_ms")]
  pub reconnect_max_ms: u64,
  /// Involuntary-disconnect retries before entering the failed state.
  #[serde(default = "default_max_reconnect_attempts")]
  pub max_reconnect_attempts: u32,
  /// How long a book counts as "just updated" (milliseconds).
  #[serde(default = "default_highlight_ms")]
  pub highlight_ms: u64,
}

/// Execution timing configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
  /// Wait after a transfer before trusting refreshed balances (ms).
  #[serde(default = "default_settle_delay_ms")]
  pub settle_delay_ms: u64,
  /// Full protocol restarts allowed when the best venue keeps changing.
  #[serde(default = "default_max_replans")]
  pub max_replans: u32,
}

/// REST API endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Info endpoint base URL (metadata, balances, positions).
  pub info_url: String,
  /// Exchange endpoint base URL (orders, transfers).
  pub exchange_url: String,
  /// Request timeout in milliseconds.
  #[serde(default = "default_timeout_ms")]
  pub timeout_ms: u64,
}

/// Account polling configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
  /// Balance refresh interval in seconds.
  #[serde(default = "default_balance_interval")]
  pub balance_interval_secs: u64,
  /// Open-order / position refresh interval in seconds.
  #[serde(default = "default_view_interval")]
  pub view_interval_secs: u64,
}

/// Metrics and health configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  /// Enable the Prometheus/health HTTP server.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Bind address for /metrics, /live and /ready.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

fn default_coin() -> String {
  "BTC".to_string()
}

fn default_token() -> String {
  "USDC".to_string()
}

fn default_chain() -> String {
  "Testnet".to_string()
}

fn default_signature_chain_id() -> String {
  "0x66eee".to_string()
}

fn default_true() -> bool {
  true
}

fn default_reconnect_base_ms() -> u64 {
  1_000
}

fn default_reconnect_max_ms() -> u64 {
  30_000
}

fn default_max_reconnect_attempts() -> u32 {
  5
}

fn default_highlight_ms() -> u64 {
  1_000
}

fn default_settle_delay_ms() -> u64 {
  2_000
}

fn default_max_replans() -> u32 {
  3
}

fn default_timeout_ms() -> u64 {
  10_000
}

fn default_balance_interval() -> u64 {
  30
}

fn default_view_interval() -> u64 {
  5
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}
