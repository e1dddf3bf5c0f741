//! Prometheus Metrics Registry - Routing Observability
//!
//! Registers and exposes Prometheus metrics for Grafana dashboards.
//! Covers order submissions, transfers, planning latency, feed health
//! and per-venue balances.

pub mod server;

use prometheus::{
    Encoder, Gauge, GaugeVec, Histogram, HistogramOpts, IntCounterVec, Opts, Registry,
    TextEncoder,
};

/// Centralized Prometheus metrics for the order router.
///
/// All metrics follow the naming convention `hyperdex_router_*` and
/// include venue labels for per-venue filtering.
pub struct MetricsRegistry {
    /// Prometheus registry.
    registry: Registry,
    /// Total orders submitted counter.
    pub orders_submitted: IntCounterVec,
    /// Total orders rejected counter.
    pub orders_rejected: IntCounterVec,
    /// Total inter-venue transfers counter.
    pub transfers_total: IntCounterVec,
    /// Execution attempts by terminal outcome.
    pub executions_total: IntCounterVec,
    /// Plan computation latency histogram (microseconds).
    pub plan_latency_us: Histogram,
    /// Feed connection status (1 = connected, 0 = not).
    pub feed_connected: Gauge,
    /// Withdrawable balance per venue.
    pub venue_balance: GaugeVec,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_submitted = IntCounterVec::new(
            Opts::new("hyperdex_router_orders_submitted_total", "Total orders submitted"),
            &["venue", "side"],
        )?;

        let orders_rejected = IntCounterVec::new(
            Opts::new("hyperdex_router_orders_rejected_total", "Total orders rejected"),
            &["venue", "reason"],
        )?;

        let transfers_total = IntCounterVec::new(
            Opts::new(
                "hyperdex_router_transfers_total",
                "Total inter-venue fund transfers",
            ),
            &["source", "destination"],
        )?;

        let executions_total = IntCounterVec::new(
            Opts::new(
                "hyperdex_router_executions_total",
                "Execution attempts by outcome",
            ),
            &["outcome"],
        )?;

        let plan_latency_us = Histogram::with_opts(
            HistogramOpts::new(
                "hyperdex_router_plan_latency_us",
                "Execution plan computation latency in microseconds",
            )
            .buckets(vec![10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0, 10000.0]),
        )?;

        let feed_connected = Gauge::new(
            "hyperdex_router_feed_connected",
            "Aggregated book feed connection status",
        )?;

        let venue_balance = GaugeVec::new(
            Opts::new(
                "hyperdex_router_venue_balance_usd",
                "Withdrawable balance per venue",
            ),
            &["venue"],
        )?;

        registry.register(Box::new(orders_submitted.clone()))?;
        registry.register(Box::new(orders_rejected.clone()))?;
        registry.register(Box::new(transfers_total.clone()))?;
        registry.register(Box::new(executions_total.clone()))?;
        registry.register(Box::new(plan_latency_us.clone()))?;
        registry.register(Box::new(feed_connected.clone()))?;
        registry.register(Box::new(venue_balance.clone()))?;

        Ok(Self {
            registry,
            orders_submitted,
            orders_rejected,
            transfers_total,
            executions_total,
            plan_latency_us,
            feed_connected,
            venue_balance,
        })
    }

    /// Render all metrics in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        if encoder.encode(&families, &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
