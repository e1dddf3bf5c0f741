//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters, and
//! providing clear error messages for misconfiguration.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::AppConfig;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config: AppConfig = toml::from_str(&content)
    .with_context(|| "Failed to parse config.toml")?;

  validate_config(&config)?;

  info!(
    name = %config.router.name,
    coin = %config.router.coin,
    venues = config.venues.len(),
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Validate all configuration parameters.
fn validate_config(config: &AppConfig) -> Result<()> {
  // Venue validation
  anyhow::ensure!(
    !config.venues.is_empty(),
    "At least one venue must be configured"
  );

  let mut seen = HashSet::new();
  for (i, venue) in config.venues.iter().enumerate() {
    anyhow::ensure!(!venue.id.is_empty(), "Venue {} has an empty id", i);
    anyhow::ensure!(
      seen.insert(venue.id.as_str()),
      "Duplicate venue id: {}",
      venue.id
    );
    anyhow::ensure!(
      !venue.display_name.is_empty(),
      "Venue {} ({}) has an empty display_name",
      i,
      venue.id
    );
  }

  // Account validation
  anyhow::ensure!(
    config.account.address.starts_with("0x"),
    "Account address must be a 0x-prefixed hex address, got {}",
    config.account.address
  );
  anyhow::ensure!(
    config.account.signature_chain_id.starts_with("0x"),
    "signature_chain_id must be a 0x-prefixed hex chain id"
  );
  anyhow::ensure!(
    config.account.chain == "Testnet" || config.account.chain == "Mainnet",
    "account.chain must be \"Testnet\" or \"Mainnet\", got {}",
    config.account.chain
  );

  // Feed validation
  anyhow::ensure!(!config.feed.ws_url.is_empty(), "Feed WebSocket URL must not be empty");
  anyhow::ensure!(
    config.feed.reconnect_base_ms > 0,
    "reconnect_base_ms must be positive"
  );
  anyhow::ensure!(
    config.feed.reconnect_max_ms >= config.feed.reconnect_base_ms,
    "reconnect_max_ms must be >= reconnect_base_ms"
  );
  anyhow::ensure!(
    config.feed.max_reconnect_attempts > 0,
    "max_reconnect_attempts must be positive"
  );

  // Execution validation
  anyhow::ensure!(
    config.execution.max_replans >= 1,
    "max_replans must be at least 1, got {}",
    config.execution.max_replans
  );

  // API validation
  anyhow::ensure!(!config.api.info_url.is_empty(), "Info API URL must not be empty");
  anyhow::ensure!(
    !config.api.exchange_url.is_empty(),
    "Exchange API URL must not be empty"
  );
  anyhow::ensure!(config.api.timeout_ms > 0, "API timeout must be positive");

  // Polling validation
  anyhow::ensure!(
    config.polling.balance_interval_secs > 0,
    "balance_interval_secs must be positive"
  );
  anyhow::ensure!(
    config.polling.view_interval_secs > 0,
    "view_interval_secs must be positive"
  );

  Ok(())
}
