//! Venue HTTP Client - Rate-limited REST API Client
//!
//! Wraps reqwest with a concurrency limit and timeouts for all venue REST
//! interactions. Info queries (metadata, balances, positions) are
//! idempotent reads and retry on transient failures; exchange posts
//! (orders, transfers) are submitted exactly once — retrying those is the
//! caller's decision, never this client's.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for the venue HTTP client.
#[derive(Debug, Clone)]
pub struct VenueClientConfig {
    /// Info endpoint URL.
    pub info_url: String,
    /// Exchange endpoint URL.
    pub exchange_url: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Maximum concurrent requests.
    pub max_concurrent: usize,
    /// Maximum retries for info queries.
    pub max_retries: u32,
    /// Base delay between retries (exponential backoff).
    pub retry_base_delay: Duration,
}

impl Default for VenueClientConfig {
    fn default() -> Self {
        Self {
            info_url: "https://api.hyperliquid-testnet.xyz/info".to_string(),
            exchange_url: "https://api.hyperliquid-testnet.xyz/exchange".to_string(),
            timeout: Duration::from_secs(10),
            max_concurrent: 10,
            max_retries: 3,
            retry_base_delay: Duration::from_millis(200),
        }
    }
}

/// Shared HTTP client for the venue's info and exchange endpoints.
pub struct VenueClient {
    http: Client,
    config: VenueClientConfig,
    semaphore: Arc<Semaphore>,
}

impl VenueClient {
    /// Create a new venue client.
    pub fn new(config: VenueClientConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(5)
            .build()
            .context("Failed to build HTTP client")?;

        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));

        Ok(Self {
            http,
            config,
            semaphore,
        })
    }

    /// Query the info endpoint, retrying transient failures.
    pub async fn post_info(&self, body: &serde_json::Value) -> Result<serde_json::Value> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .context("Semaphore closed")?;

        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = self.config.retry_base_delay * 2u32.pow(attempt - 1);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "Retrying info query");
                sleep(delay).await;
            }

            match self
                .http
                .post(&self.config.info_url)
                .json(body)
                .send()
                .await
            {
                Ok(response) => match response.status() {
                    StatusCode::OK => {
                        return response
                            .json()
                            .await
                            .context("Invalid JSON from info endpoint");
                    }
                    StatusCode::TOO_MANY_REQUESTS => {
                        warn!("Rate limited by info endpoint, backing off");
                        last_error = Some(anyhow::anyhow!("Rate limited"));
                        continue;
                    }
                    status if status.is_server_error() => {
                        warn!(status = %status, "Info endpoint server error, retrying");
                        last_error = Some(anyhow::anyhow!("Server error: {status}"));
                        continue;
                    }
                    status => {
                        let body = response.text().await.unwrap_or_default();
                        return Err(anyhow::anyhow!("Info endpoint error {status}: {body}"));
                    }
                },
                Err(e) => {
                    warn!(error = %e, attempt, "Info request failed");
                    last_error = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Max retries exceeded")))
    }

    /// Submit a signed action to the exchange endpoint. Exactly one
    /// attempt: orders and transfers are not idempotent.
    pub async fn post_exchange(&self, body: &serde_json::Value) -> Result<serde_json::Value> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .context("Semaphore closed")?;

        let response = self
            .http
            .post(&self.config.exchange_url)
            .json(body)
            .send()
            .await
            .context("Exchange request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Exchange endpoint error {status}: {body}"));
        }

        response
            .json()
            .await
            .context("Invalid JSON from exchange endpoint")
    }

    /// Check if the info endpoint is reachable.
    pub async fn health_check(&self) -> bool {
        self.post_info(&serde_json::json!({"type": "meta"}))
            .await
            .is_ok()
    }
}
