//! Smart Order Executor - Multi-Venue Routing and Execution
//!
//! The orchestrator. Drives one order request through:
//! 1. Ready gate (account + constructed order gateway)
//! 2. Planning against the latest book and balance snapshots
//! 3. Optional funding transfer, settle delay, forced balance refresh
//!    and re-planning (markets move during a transfer)
//! 4. Asset resolution with static fallback
//! 5. Submission and failure classification
//! 6. Post-attempt account refresh, success or failure
//!
//! Concurrency: one execution at a time per account. A second `execute`
//! call while one is in flight queues on the per-account lock and runs
//! after — balance reads and transfers are never interleaved.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::adapters::api::assets::AssetCatalog;
use crate::adapters::metrics::MetricsRegistry;
use crate::config::AppConfig;
use crate::domain::book::{Coin, VenueId};
use crate::domain::order::{OrderRequest, OrderSide};
use crate::domain::planner::{self, ExecutionPlan};
use crate::ports::account_data::AccountDataProvider;
use crate::ports::asset_resolver::AssetIdResolver;
use crate::ports::market_feed::MarketFeed;
use crate::ports::order_gateway::{FillSummary, OrderGateway, OrderTicket, SubmitError};
use crate::ports::transfer_gateway::{TransferError, TransferGateway, TransferRequest};

use super::account_tracker::AccountTracker;

/// Observable progress of an in-flight execution.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionStep {
  Idle,
  Analyzing,
  Transferring { amount: Decimal, to: String },
  BuildingOrder,
  Submitting { venue: String },
  Refreshing,
}

impl std::fmt::Display for ExecutionStep {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Idle => write!(f, ""),
      Self::Analyzing => write!(f, "Analyzing order..."),
      Self::Transferring { amount, to } => {
        write!(f, "Transferring ${amount:.2} to {to}...")
      }
      Self::BuildingOrder => write!(f, "Building order parameters..."),
      Self::Submitting { venue } => write!(f, "Submitting order on {venue}..."),
      Self::Refreshing => write!(f, "Refreshing account data..."),
    }
  }
}

/// Terminal failure of one `execute` call. Every variant is a returned
/// outcome; nothing here aborts the process.
#[derive(Debug, Error)]
pub enum ExecutionFailure {
  /// No authenticated account or no submission capability.
  #[error("account or order gateway is not ready")]
  NotReady,

  /// Market or balance data insufficient to decide anything.
  #[error("could not build an execution plan from current market and balance data")]
  CannotPlan,

  /// Selected venue is short and no other venue can cover the gap.
  #[error("insufficient funds: required {required}, available {available}")]
  InsufficientFunds {
    required: Decimal,
    available: Decimal,
  },

  /// The funding transfer failed; the whole execution is aborted.
  #[error("fund transfer failed: {0}")]
  Transfer(#[from] TransferError),

  /// The best venue kept changing after each transfer. Fails closed
  /// instead of looping forever.
  #[error("market moved repeatedly; gave up after {iterations} re-plans")]
  MarketMoved { iterations: u32 },

  /// The venue refused or the gateway was unreachable.
  #[error("order submission failed: {0}")]
  Submit(#[from] SubmitError),
}

impl ExecutionFailure {
  /// Stable label for metrics.
  fn outcome_label(&self) -> &'static str {
    match self {
      Self::NotReady => "not_ready",
      Self::CannotPlan => "cannot_plan",
      Self::InsufficientFunds { .. } => "insufficient_funds",
      Self::Transfer(_) => "transfer_failed",
      Self::MarketMoved { .. } => "market_moved",
      Self::Submit(SubmitError::AgentNotRegistered) => "agent_not_registered",
      Self::Submit(_) => "submit_failed",
    }
  }
}

/// Result of a completed execution.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
  /// Report id for audit logging.
  pub id: Uuid,
  /// Venue the order went to.
  pub venue: VenueId,
  /// Submitted price (rounded to venue decimals).
  pub price: Decimal,
  /// Submitted size (rounded to venue decimals).
  pub size: Decimal,
  /// Venue order id when the order rested.
  pub oid: Option<u64>,
  /// Immediate fill when the order crossed.
  pub filled: Option<FillSummary>,
  /// Total funds moved between venues during this execution.
  pub transferred: Decimal,
  /// Full protocol restarts that were needed.
  pub replans: u32,
}

/// Per-account execution locks. Keyed by account address so concurrent
/// `execute` calls for the same account queue instead of interleaving.
#[derive(Default)]
pub struct ExecutionLocks {
  inner: std::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ExecutionLocks {
  /// Take the lock for `account`, waiting behind any in-flight execution.
  pub async fn acquire(&self, account: &str) -> tokio::sync::OwnedMutexGuard<()> {
    let lock = {
      let mut map = self.inner.lock().unwrap();
      Arc::clone(map.entry(account.to_string()).or_default())
    };
    lock.lock_owned().await
  }
}

/// Execution timing and instrument parameters.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
  /// Instrument being routed.
  pub coin: Coin,
  /// Wait after a transfer before trusting refreshed balances.
  pub settle_delay: std::time::Duration,
  /// Full protocol restarts allowed when the best venue keeps changing.
  pub max_replans: u32,
  /// Collateral token moved between venues.
  pub token: String,
}

impl ExecutorConfig {
  pub fn from_app_config(config: &AppConfig) -> Self {
    Self {
      coin: config.router.coin.clone(),
      settle_delay: std::time::Duration::from_millis(config.execution.settle_delay_ms),
      max_replans: config.execution.max_replans,
      token: config.account.token.clone(),
    }
  }
}

/// The multi-venue order routing orchestrator.
pub struct SmartOrderExecutor<F, P, T, G, R>
where
  F: MarketFeed,
  P: AccountDataProvider,
  T: TransferGateway,
  G: OrderGateway,
  R: AssetIdResolver,
{
  feed: Arc<F>,
  tracker: Arc<AccountTracker<P>>,
  transfers: Arc<T>,
  gateway: Arc<G>,
  assets: Arc<AssetCatalog<R>>,
  metrics: Arc<MetricsRegistry>,
  account: String,
  display_names: HashMap<VenueId, String>,
  config: ExecutorConfig,
  step_tx: watch::Sender<ExecutionStep>,
  locks: ExecutionLocks,
}

impl<F, P, T, G, R> SmartOrderExecutor<F, P, T, G, R>
where
  F: MarketFeed,
  P: AccountDataProvider,
  T: TransferGateway,
  G: OrderGateway,
  R: AssetIdResolver,
{
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    feed: Arc<F>,
    tracker: Arc<AccountTracker<P>>,
    transfers: Arc<T>,
    gateway: Arc<G>,
    assets: Arc<AssetCatalog<R>>,
    metrics: Arc<MetricsRegistry>,
    account: String,
    display_names: HashMap<VenueId, String>,
    config: ExecutorConfig,
  ) -> Self {
    let (step_tx, _) = watch::channel(ExecutionStep::Idle);
    Self {
      feed,
      tracker,
      transfers,
      gateway,
      assets,
      metrics,
      account,
      display_names,
      config,
      step_tx,
      locks: ExecutionLocks::default(),
    }
  }

  /// The market feed this executor plans against.
  pub fn feed(&self) -> Arc<F> {
    Arc::clone(&self.feed)
  }

  /// Whether executions can be accepted at all: an account is configured
  /// and the order gateway has its signing capability attached.
  pub fn ready(&self) -> bool {
    !self.account.is_empty() && self.gateway.is_ready()
  }

  /// Observable execution progress for status displays.
  pub fn execution_step(&self) -> watch::Receiver<ExecutionStep> {
    self.step_tx.subscribe()
  }

  /// Side-effect-free plan preview against the latest snapshots. Safe to
  /// call on every keystroke; `None` means "cannot plan".
  pub async fn execution_plan(&self, order: &OrderRequest) -> Option<ExecutionPlan> {
    self.draft_plan(order).await
  }

  /// Execute one order request end to end.
  #[instrument(skip(self, order), fields(side = %order.side(), size = %order.size()))]
  pub async fn execute(
    &self,
    order: &OrderRequest,
  ) -> Result<ExecutionReport, ExecutionFailure> {
    if !self.ready() {
      return Err(ExecutionFailure::NotReady);
    }

    let _guard = self.locks.acquire(&self.account).await;
    let result = self.run_protocol(order).await;

    // Post-attempt refresh happens on success AND failure so dependent
    // views never observe pre-attempt balances.
    self.set_step(ExecutionStep::Refreshing);
    if let Err(e) = self.tracker.refresh_all().await {
      warn!(error = %e, "Post-execution account refresh failed");
    }
    self.set_step(ExecutionStep::Idle);

    match &result {
      Ok(report) => {
        self
          .metrics
          .executions_total
          .with_label_values(&["ok"])
          .inc();
        info!(
          venue = %report.venue,
          price = %report.price,
          size = %report.size,
          oid = ?report.oid,
          replans = report.replans,
          "Order executed"
        );
      }
      Err(failure) => {
        self
          .metrics
          .executions_total
          .with_label_values(&[failure.outcome_label()])
          .inc();
        warn!(error = %failure, "Order execution failed");
      }
    }

    result
  }

  /// The transfer-then-revalidate protocol, bounded by `max_replans`.
  async fn run_protocol(
    &self,
    order: &OrderRequest,
  ) -> Result<ExecutionReport, ExecutionFailure> {
    self.set_step(ExecutionStep::Analyzing);

    let started = Instant::now();
    let mut plan = self
      .draft_plan(order)
      .await
      .ok_or(ExecutionFailure::CannotPlan)?;
    self
      .metrics
      .plan_latency_us
      .observe(started.elapsed().as_micros() as f64);

    info!(
      venue = %plan.venue,
      best_price = %plan.best_price,
      required = %plan.required_funds,
      available = %plan.available_funds,
      needs_transfer = plan.needs_transfer,
      "Execution plan drafted"
    );

    let mut transferred = Decimal::ZERO;
    let mut replans = 0u32;

    loop {
      if !plan.is_funded() {
        return Err(ExecutionFailure::InsufficientFunds {
          required: plan.required_funds,
          available: plan.available_funds,
        });
      }

      if plan.needs_transfer {
        let source = plan
          .transfer_source
          .clone()
          .ok_or(ExecutionFailure::CannotPlan)?;

        self.set_step(ExecutionStep::Transferring {
          amount: plan.transfer_amount,
          to: self.display_name(&plan.venue),
        });

        self
          .transfers
          .transfer(&TransferRequest {
            account: self.account.clone(),
            source: source.clone(),
            destination: plan.venue.clone(),
            token: self.config.token.clone(),
            amount: plan.transfer_amount,
          })
          .await?;

        self
          .metrics
          .transfers_total
          .with_label_values(&[source.as_str(), plan.venue.as_str()])
          .inc();
        transferred += plan.transfer_amount;

        // Markets move while funds settle: wait, force a balance
        // refresh, and re-derive the plan before touching the gateway.
        tokio::time::sleep(self.config.settle_delay).await;
        if let Err(e) = self.tracker.refresh_balances().await {
          warn!(error = %e, "Balance refresh after transfer failed");
          return Err(ExecutionFailure::CannotPlan);
        }

        let new_plan = self
          .draft_plan(order)
          .await
          .ok_or(ExecutionFailure::CannotPlan)?;

        if new_plan.venue != plan.venue {
          replans += 1;
          if replans >= self.config.max_replans {
            return Err(ExecutionFailure::MarketMoved { iterations: replans });
          }
          info!(
            from = %plan.venue,
            to = %new_plan.venue,
            replans,
            "Best venue changed after transfer; restarting protocol"
          );
          plan = new_plan;
          continue;
        }

        // Same venue: proceed straight to submission with the
        // re-derived plan's prices.
        plan = new_plan;
      }

      break;
    }

    self.submit(order, &plan, transferred, replans).await
  }

  async fn submit(
    &self,
    order: &OrderRequest,
    plan: &ExecutionPlan,
    transferred: Decimal,
    replans: u32,
  ) -> Result<ExecutionReport, ExecutionFailure> {
    self.set_step(ExecutionStep::BuildingOrder);

    // Falls back to the static table internally; never aborts here.
    let meta = self.assets.asset_meta(&plan.venue, &self.config.coin).await;

    let ticket = OrderTicket {
      asset_id: meta.asset_id,
      is_buy: order.side() == OrderSide::Buy,
      price: plan.final_price.round_dp(meta.px_decimals),
      size: order.size().round_dp(meta.sz_decimals),
      reduce_only: false,
      time_in_force: order.time_in_force(),
    };

    self.set_step(ExecutionStep::Submitting {
      venue: self.display_name(&plan.venue),
    });

    let side_label = order.side().to_string();
    let ack = match self.gateway.submit(&self.account, &ticket).await {
      Ok(ack) => {
        self
          .metrics
          .orders_submitted
          .with_label_values(&[plan.venue.as_str(), side_label.as_str()])
          .inc();
        ack
      }
      Err(e) => {
        self
          .metrics
          .orders_rejected
          .with_label_values(&[plan.venue.as_str(), submit_reason(&e)])
          .inc();
        return Err(e.into());
      }
    };

    Ok(ExecutionReport {
      id: Uuid::new_v4(),
      venue: plan.venue.clone(),
      price: ticket.price,
      size: ticket.size,
      oid: ack.oid,
      filled: ack.filled,
      transferred,
      replans,
    })
  }

  async fn draft_plan(&self, order: &OrderRequest) -> Option<ExecutionPlan> {
    let book = self.feed.current_book(&self.config.coin).await?;
    let balances = self.tracker.balances().await?;
    planner::plan(order, &book, &balances)
  }

  fn display_name(&self, venue: &VenueId) -> String {
    self
      .display_names
      .get(venue)
      .cloned()
      .unwrap_or_else(|| venue.to_uppercase())
  }

  fn set_step(&self, step: ExecutionStep) {
    let _ = self.step_tx.send(step);
  }
}

/// Stable rejection label for metrics.
fn submit_reason(error: &SubmitError) -> &'static str {
  match error {
    SubmitError::AgentNotRegistered => "agent_not_registered",
    SubmitError::Rejected(_) => "rejected",
    SubmitError::Transport(_) => "transport",
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use rust_decimal_macros::dec;
  use std::time::Duration;

  #[test]
  fn test_step_display_strings() {
    assert_eq!(ExecutionStep::Analyzing.to_string(), "Analyzing order...");
    assert_eq!(
      ExecutionStep::Transferring {
        amount: dec!(1084),
        to: "Sekaw".to_string()
      }
      .to_string(),
      "Transferring $1084.00 to Sekaw..."
    );
    assert_eq!(ExecutionStep::Idle.to_string(), "");
  }

  #[test]
  fn test_outcome_labels_are_distinct() {
    let agent = ExecutionFailure::Submit(SubmitError::AgentNotRegistered);
    let rejected = ExecutionFailure::Submit(SubmitError::Rejected("px".to_string()));
    assert_ne!(agent.outcome_label(), rejected.outcome_label());
  }

  #[tokio::test]
  async fn test_locks_serialize_same_account() {
    let locks = ExecutionLocks::default();
    let guard = locks.acquire("0xabc").await;

    // Same account queues behind the in-flight execution
    assert!(
      tokio::time::timeout(Duration::from_millis(50), locks.acquire("0xabc"))
        .await
        .is_err()
    );

    // A different account is independent
    assert!(
      tokio::time::timeout(Duration::from_millis(50), locks.acquire("0xdef"))
        .await
        .is_ok()
    );

    drop(guard);
    assert!(
      tokio::time::timeout(Duration::from_millis(50), locks.acquire("0xabc"))
        .await
        .is_ok()
    );
  }
}
