//! Integration Tests - End-to-end Orchestrator Scenarios
//!
//! Exercises the smart order executor against mocked ports: planning,
//! the transfer-then-revalidate loop, failure classification and the
//! post-attempt refresh contract. Uses mockall for trait mocking and
//! tokio::test with a paused clock so settle delays cost nothing.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use mockall::mock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::{broadcast, watch};

use hyperdex_router::adapters::api::assets::AssetCatalog;
use hyperdex_router::adapters::metrics::MetricsRegistry;
use hyperdex_router::config::{PollingConfig, VenueConfig};
use hyperdex_router::domain::book::{AggregatedBook, VenueBalance, VenueId, VenueQuote};
use hyperdex_router::domain::order::{OrderRequest, OrderSide};
use hyperdex_router::ports::account_data::{AccountDataProvider, OpenOrder, VenuePosition};
use hyperdex_router::ports::asset_resolver::{AssetIdResolver, AssetMeta};
use hyperdex_router::ports::market_feed::{ConnectionState, MarketFeed};
use hyperdex_router::ports::order_gateway::{OrderAck, OrderGateway, OrderTicket, SubmitError};
use hyperdex_router::ports::transfer_gateway::{
    TransferError, TransferGateway, TransferReceipt, TransferRequest,
};
use hyperdex_router::usecases::executor::{ExecutionFailure, ExecutorConfig, SmartOrderExecutor};
use hyperdex_router::usecases::AccountTracker;

// ---- Mock Definitions ----

mock! {
    pub AccountData {}

    #[async_trait::async_trait]
    impl AccountDataProvider for AccountData {
        async fn fetch_balances(
            &self,
            account: &str,
            venues: &[VenueId],
        ) -> anyhow::Result<BTreeMap<VenueId, VenueBalance>>;

        async fn fetch_open_orders(&self, account: &str) -> anyhow::Result<Vec<OpenOrder>>;

        async fn fetch_positions(&self, account: &str) -> anyhow::Result<Vec<VenuePosition>>;
    }
}

mock! {
    pub Transfers {}

    #[async_trait::async_trait]
    impl TransferGateway for Transfers {
        async fn transfer(
            &self,
            request: &TransferRequest,
        ) -> Result<TransferReceipt, TransferError>;
    }
}

mock! {
    pub OrderGw {}

    #[async_trait::async_trait]
    impl OrderGateway for OrderGw {
        fn is_ready(&self) -> bool;
        async fn submit(
            &self,
            account: &str,
            ticket: &OrderTicket,
        ) -> Result<OrderAck, SubmitError>;
    }
}

mock! {
    pub Resolver {}

    #[async_trait::async_trait]
    impl AssetIdResolver for Resolver {
        async fn resolve(&self, venue: &VenueId, coin: &str) -> anyhow::Result<AssetMeta>;
    }
}

// ---- Stub Feed ----

/// Feed stub whose published book can be swapped mid-protocol (e.g. from
/// a transfer mock) to simulate markets moving while funds settle.
struct StubFeed {
    book: Mutex<Option<Arc<AggregatedBook>>>,
    update_tx: broadcast::Sender<Arc<AggregatedBook>>,
    state_tx: watch::Sender<ConnectionState>,
}

impl StubFeed {
    fn new(book: Option<AggregatedBook>) -> Self {
        let (update_tx, _) = broadcast::channel(16);
        let (state_tx, _) = watch::channel(ConnectionState::Connected);
        Self {
            book: Mutex::new(book.map(Arc::new)),
            update_tx,
            state_tx,
        }
    }

    fn set_book(&self, book: AggregatedBook) {
        *self.book.lock().unwrap() = Some(Arc::new(book));
    }
}

#[async_trait::async_trait]
impl MarketFeed for StubFeed {
    async fn connect(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn disconnect(&self) {}

    async fn reconnect(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Arc<AggregatedBook>> {
        self.update_tx.subscribe()
    }

    async fn current_book(&self, _coin: &str) -> Option<Arc<AggregatedBook>> {
        self.book.lock().unwrap().clone()
    }

    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    fn just_updated(&self) -> bool {
        false
    }
}

// ---- Fixtures ----

const ACCOUNT: &str = "0x1111111111111111111111111111111111111111";

fn quote(bid: Decimal, ask: Decimal) -> VenueQuote {
    VenueQuote {
        best_bid: Some(bid),
        best_ask: Some(ask),
        spread: Some(ask - bid),
        mid_price: Some((bid + ask) / dec!(2)),
        observed_at_ms: 1_700_000_000_000,
    }
}

/// Book where venue_a has the lower ask (best for buys).
fn book_a_best() -> AggregatedBook {
    book(vec![
        ("venue_a", quote(dec!(99950), dec!(100000))),
        ("venue_b", quote(dec!(99990), dec!(100050))),
    ])
}

/// Book where venue_b has the lower ask.
fn book_b_best() -> AggregatedBook {
    book(vec![
        ("venue_a", quote(dec!(99950), dec!(100100))),
        ("venue_b", quote(dec!(99990), dec!(100050))),
    ])
}

fn book(venues: Vec<(&str, VenueQuote)>) -> AggregatedBook {
    AggregatedBook {
        coin: "BTC".to_string(),
        timestamp_ms: 1_700_000_000_000,
        best_bid: dec!(99950),
        best_ask: dec!(100000),
        spread: dec!(50),
        mid_price: dec!(99975),
        bids: vec![],
        asks: vec![],
        venues: venues
            .into_iter()
            .map(|(id, q)| (id.to_string(), q))
            .collect(),
    }
}

fn balance(withdrawable: Decimal) -> VenueBalance {
    VenueBalance {
        withdrawable,
        total_raw_usd: withdrawable,
        margin_used: dec!(0),
    }
}

type SharedBalances = Arc<Mutex<BTreeMap<VenueId, VenueBalance>>>;

fn shared_balances(entries: Vec<(&str, Decimal)>) -> SharedBalances {
    Arc::new(Mutex::new(
        entries
            .into_iter()
            .map(|(id, w)| (id.to_string(), balance(w)))
            .collect(),
    ))
}

/// Account-data mock that always serves the current shared balance map.
fn account_data_for(balances: &SharedBalances) -> MockAccountData {
    let mut mock = MockAccountData::new();
    let reader = Arc::clone(balances);
    mock.expect_fetch_balances()
        .returning(move |_, _| Ok(reader.lock().unwrap().clone()));
    mock.expect_fetch_open_orders().returning(|_| Ok(Vec::new()));
    mock.expect_fetch_positions().returning(|_| Ok(Vec::new()));
    mock
}

fn ready_gateway() -> MockOrderGw {
    let mut gateway = MockOrderGw::new();
    gateway.expect_is_ready().return_const(true);
    gateway
}

fn accepting_gateway() -> MockOrderGw {
    let mut gateway = ready_gateway();
    gateway.expect_submit().times(1).returning(|_, _| {
        Ok(OrderAck {
            oid: Some(77_738_308),
            filled: None,
        })
    });
    gateway
}

fn resolver_ok() -> MockResolver {
    let mut resolver = MockResolver::new();
    resolver.expect_resolve().returning(|_, _| {
        Ok(AssetMeta {
            asset_id: 390_000,
            sz_decimals: 3,
            px_decimals: 2,
            tick_size: dec!(0.01),
        })
    });
    resolver
}

fn venue_configs() -> Vec<VenueConfig> {
    ["venue_a", "venue_b"]
        .iter()
        .map(|id| VenueConfig {
            id: (*id).to_string(),
            display_name: id.to_uppercase(),
            fallback_assets: HashMap::from([("BTC".to_string(), 390_000)]),
        })
        .collect()
}

type TestExecutor =
    SmartOrderExecutor<StubFeed, MockAccountData, MockTransfers, MockOrderGw, MockResolver>;

async fn executor(
    feed: StubFeed,
    balances: &SharedBalances,
    transfers: MockTransfers,
    gateway: MockOrderGw,
) -> TestExecutor {
    let tracker = Arc::new(AccountTracker::new(
        Arc::new(account_data_for(balances)),
        ACCOUNT.to_string(),
        vec!["venue_a".to_string(), "venue_b".to_string()],
        &PollingConfig {
            balance_interval_secs: 30,
            view_interval_secs: 5,
        },
    ));
    // Prime the snapshot the way the polling loop would
    tracker.refresh_balances().await.unwrap();

    SmartOrderExecutor::new(
        Arc::new(feed),
        tracker,
        Arc::new(transfers),
        Arc::new(gateway),
        Arc::new(AssetCatalog::new(Arc::new(resolver_ok()), &venue_configs())),
        Arc::new(MetricsRegistry::new().unwrap()),
        ACCOUNT.to_string(),
        HashMap::from([
            ("venue_a".to_string(), "Venue A".to_string()),
            ("venue_b".to_string(), "Venue B".to_string()),
        ]),
        ExecutorConfig {
            coin: "BTC".to_string(),
            settle_delay: std::time::Duration::from_secs(2),
            max_replans: 3,
            token: "USDC".to_string(),
        },
    )
}

fn market_buy() -> OrderRequest {
    OrderRequest::market(OrderSide::Buy, dec!(0.01), dec!(8)).unwrap()
}

// ---- Scenarios ----

#[tokio::test]
async fn test_not_ready_rejected_immediately() {
    let mut gateway = MockOrderGw::new();
    gateway.expect_is_ready().return_const(false);

    let balances = shared_balances(vec![("venue_a", dec!(5000))]);
    let exec = executor(
        StubFeed::new(Some(book_a_best())),
        &balances,
        MockTransfers::new(),
        gateway,
    )
    .await;

    assert!(!exec.ready());
    let err = exec.execute(&market_buy()).await.unwrap_err();
    assert!(matches!(err, ExecutionFailure::NotReady));
}

#[tokio::test]
async fn test_no_book_cannot_plan() {
    let balances = shared_balances(vec![("venue_a", dec!(5000))]);
    let exec = executor(
        StubFeed::new(None),
        &balances,
        MockTransfers::new(),
        ready_gateway(),
    )
    .await;

    let err = exec.execute(&market_buy()).await.unwrap_err();
    assert!(matches!(err, ExecutionFailure::CannotPlan));
    assert!(exec.execution_plan(&market_buy()).await.is_none());
}

#[tokio::test]
async fn test_funded_order_submits_without_transfer() {
    let balances = shared_balances(vec![("venue_a", dec!(5000)), ("venue_b", dec!(10))]);
    let mut gateway = ready_gateway();
    gateway.expect_submit().times(1).returning(|_, ticket| {
        // plan: best ask 100000 on venue_a, +8% slippage, rounded to 2dp
        assert_eq!(ticket.price, dec!(108000.00));
        assert_eq!(ticket.size, dec!(0.010));
        assert!(ticket.is_buy);
        Ok(OrderAck {
            oid: Some(1),
            filled: None,
        })
    });

    let exec = executor(
        StubFeed::new(Some(book_a_best())),
        &balances,
        MockTransfers::new(),
        gateway,
    )
    .await;

    let report = exec.execute(&market_buy()).await.unwrap();
    assert_eq!(report.venue, "venue_a");
    assert_eq!(report.transferred, dec!(0));
    assert_eq!(report.replans, 0);
    assert_eq!(report.oid, Some(1));
}

/// The worked scenario: balances A=50 / B=2000 against asks A=100000 /
/// B=100050. Required funds 1134, so 1084 moves from B to A before the
/// order is submitted on A.
#[tokio::test(start_paused = true)]
async fn test_transfer_then_execute() {
    let balances = shared_balances(vec![("venue_a", dec!(50)), ("venue_b", dec!(2000))]);

    let mut transfers = MockTransfers::new();
    let settled = Arc::clone(&balances);
    transfers.expect_transfer().times(1).returning(move |req| {
        assert_eq!(req.source, "venue_b");
        assert_eq!(req.destination, "venue_a");
        assert_eq!(req.amount, dec!(1084.0000));
        assert_eq!(req.token, "USDC");

        // Simulate settlement before the forced refresh reads balances
        let mut map = settled.lock().unwrap();
        map.insert("venue_a".to_string(), balance(dec!(1134)));
        map.insert("venue_b".to_string(), balance(dec!(916)));

        Ok(TransferReceipt {
            amount: req.amount,
            source: req.source.clone(),
            destination: req.destination.clone(),
            timestamp_ms: 0,
        })
    });

    let exec = executor(
        StubFeed::new(Some(book_a_best())),
        &balances,
        transfers,
        accepting_gateway(),
    )
    .await;

    let report = exec.execute(&market_buy()).await.unwrap();
    assert_eq!(report.venue, "venue_a");
    assert_eq!(report.transferred, dec!(1084.0000));
    // Same venue after the transfer: straight to submission, no loop
    assert_eq!(report.replans, 0);
}

#[tokio::test(start_paused = true)]
async fn test_venue_change_after_transfer_replans() {
    let balances = shared_balances(vec![("venue_a", dec!(50)), ("venue_b", dec!(5000))]);

    let mut transfers = MockTransfers::new();
    let feed_book = Arc::new(StubFeed::new(Some(book_a_best())));
    let swap = Arc::clone(&feed_book);
    let settled = Arc::clone(&balances);
    transfers.expect_transfer().times(1).returning(move |req| {
        // Market moves while funds settle: venue_b becomes the best ask
        swap.set_book(book_b_best());
        let mut map = settled.lock().unwrap();
        map.insert("venue_a".to_string(), balance(dec!(1134)));
        map.insert("venue_b".to_string(), balance(dec!(3916)));
        Ok(TransferReceipt {
            amount: req.amount,
            source: req.source.clone(),
            destination: req.destination.clone(),
            timestamp_ms: 0,
        })
    });

    let mut gateway = ready_gateway();
    gateway.expect_submit().times(1).returning(|_, ticket| {
        // Re-derived plan prices off venue_b's 100050 ask
        assert_eq!(ticket.price, dec!(108054.00));
        Ok(OrderAck {
            oid: Some(2),
            filled: None,
        })
    });

    let tracker = Arc::new(AccountTracker::new(
        Arc::new(account_data_for(&balances)),
        ACCOUNT.to_string(),
        vec!["venue_a".to_string(), "venue_b".to_string()],
        &PollingConfig {
            balance_interval_secs: 30,
            view_interval_secs: 5,
        },
    ));
    tracker.refresh_balances().await.unwrap();

    let exec = SmartOrderExecutor::new(
        Arc::clone(&feed_book),
        tracker,
        Arc::new(transfers),
        Arc::new(gateway),
        Arc::new(AssetCatalog::new(Arc::new(resolver_ok()), &venue_configs())),
        Arc::new(MetricsRegistry::new().unwrap()),
        ACCOUNT.to_string(),
        HashMap::new(),
        ExecutorConfig {
            coin: "BTC".to_string(),
            settle_delay: std::time::Duration::from_secs(2),
            max_replans: 3,
            token: "USDC".to_string(),
        },
    );

    let report = exec.execute(&market_buy()).await.unwrap();
    assert_eq!(report.venue, "venue_b");
    assert_eq!(report.replans, 1);
}

#[tokio::test(start_paused = true)]
async fn test_market_moving_repeatedly_fails_closed() {
    // Keep both venues underfunded and flip the best venue after every
    // transfer, so the protocol can never converge.
    let balances = shared_balances(vec![("venue_a", dec!(10)), ("venue_b", dec!(20))]);

    let feed_book = Arc::new(StubFeed::new(Some(book_a_best())));
    let swap = Arc::clone(&feed_book);
    let flip = Arc::new(Mutex::new(false));

    let mut transfers = MockTransfers::new();
    transfers.expect_transfer().times(3).returning(move |req| {
        let mut to_b = flip.lock().unwrap();
        if *to_b {
            swap.set_book(book_a_best());
        } else {
            swap.set_book(book_b_best());
        }
        *to_b = !*to_b;
        Ok(TransferReceipt {
            amount: req.amount,
            source: req.source.clone(),
            destination: req.destination.clone(),
            timestamp_ms: 0,
        })
    });

    let tracker = Arc::new(AccountTracker::new(
        Arc::new(account_data_for(&balances)),
        ACCOUNT.to_string(),
        vec!["venue_a".to_string(), "venue_b".to_string()],
        &PollingConfig {
            balance_interval_secs: 30,
            view_interval_secs: 5,
        },
    ));
    tracker.refresh_balances().await.unwrap();

    let exec = SmartOrderExecutor::new(
        Arc::clone(&feed_book),
        tracker,
        Arc::new(transfers),
        Arc::new(ready_gateway()),
        Arc::new(AssetCatalog::new(Arc::new(resolver_ok()), &venue_configs())),
        Arc::new(MetricsRegistry::new().unwrap()),
        ACCOUNT.to_string(),
        HashMap::new(),
        ExecutorConfig {
            coin: "BTC".to_string(),
            settle_delay: std::time::Duration::from_secs(2),
            max_replans: 3,
            token: "USDC".to_string(),
        },
    );

    let err = exec.execute(&market_buy()).await.unwrap_err();
    assert!(matches!(err, ExecutionFailure::MarketMoved { iterations: 3 }));
}

#[tokio::test(start_paused = true)]
async fn test_transfer_failure_aborts_whole_execution() {
    let balances = shared_balances(vec![("venue_a", dec!(50)), ("venue_b", dec!(2000))]);

    let mut transfers = MockTransfers::new();
    transfers
        .expect_transfer()
        .times(1)
        .returning(|_| Err(TransferError::VenueRejected("insufficient margin".to_string())));

    // No submit expectation: the gateway must never be touched
    let exec = executor(
        StubFeed::new(Some(book_a_best())),
        &balances,
        transfers,
        ready_gateway(),
    )
    .await;

    let err = exec.execute(&market_buy()).await.unwrap_err();
    assert!(matches!(
        err,
        ExecutionFailure::Transfer(TransferError::VenueRejected(_))
    ));
}

#[tokio::test]
async fn test_global_shortfall_refuses_execution() {
    let balances = shared_balances(vec![("venue_a", dec!(5)), ("venue_b", dec!(0))]);

    let exec = executor(
        StubFeed::new(Some(book_a_best())),
        &balances,
        MockTransfers::new(),
        ready_gateway(),
    )
    .await;

    let err = exec.execute(&market_buy()).await.unwrap_err();
    match err {
        ExecutionFailure::InsufficientFunds { required, available } => {
            assert_eq!(required, dec!(1134.0000));
            assert_eq!(available, dec!(5));
        }
        other => panic!("wrong failure: {other:?}"),
    }
}

#[tokio::test]
async fn test_agent_not_registered_is_distinct() {
    let balances = shared_balances(vec![("venue_a", dec!(5000))]);

    let mut gateway = ready_gateway();
    gateway
        .expect_submit()
        .times(1)
        .returning(|_, _| Err(SubmitError::AgentNotRegistered));

    let exec = executor(
        StubFeed::new(Some(book_a_best())),
        &balances,
        MockTransfers::new(),
        gateway,
    )
    .await;

    let err = exec.execute(&market_buy()).await.unwrap_err();
    assert!(matches!(
        err,
        ExecutionFailure::Submit(SubmitError::AgentNotRegistered)
    ));
}

#[tokio::test]
async fn test_plan_preview_has_no_side_effects() {
    let balances = shared_balances(vec![("venue_a", dec!(50)), ("venue_b", dec!(2000))]);

    // No transfer/submit expectations: preview must not touch gateways
    let exec = executor(
        StubFeed::new(Some(book_a_best())),
        &balances,
        MockTransfers::new(),
        ready_gateway(),
    )
    .await;

    let first = exec.execution_plan(&market_buy()).await.unwrap();
    let second = exec.execution_plan(&market_buy()).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.venue, "venue_a");
    assert!(first.needs_transfer);
    assert_eq!(first.transfer_amount, dec!(1084.0000));
}

#[tokio::test]
async fn test_limit_ioc_time_in_force_reaches_gateway() {
    let balances = shared_balances(vec![("venue_a", dec!(5000))]);

    let mut gateway = ready_gateway();
    gateway.expect_submit().times(1).returning(|_, ticket| {
        assert_eq!(
            ticket.time_in_force,
            hyperdex_router::domain::order::TimeInForce::Ioc
        );
        Ok(OrderAck {
            oid: None,
            filled: Some(hyperdex_router::ports::order_gateway::FillSummary {
                avg_price: dec!(100004.5),
                total_size: dec!(0.01),
            }),
        })
    });

    let exec = executor(
        StubFeed::new(Some(book_a_best())),
        &balances,
        MockTransfers::new(),
        gateway,
    )
    .await;

    let order = OrderRequest::ioc(OrderSide::Buy, dec!(0.01), dec!(1)).unwrap();
    let report = exec.execute(&order).await.unwrap();
    assert!(report.filled.is_some());
}
