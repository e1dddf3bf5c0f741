//! Execution planner — pure venue selection and funding analysis.
//!
//! Turns an order request plus the current aggregated book and balance
//! snapshot into an [`ExecutionPlan`]. No I/O, no clocks, no mutation of
//! inputs: identical inputs always produce an identical plan, and a changed
//! market produces a new plan object, never a patched one.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::book::{AggregatedBook, VenueBalance, VenueId};
use super::order::{OrderKind, OrderRequest, OrderSide};

/// Safety margin applied on top of the notional when checking funding.
pub const FUNDING_BUFFER: Decimal = dec!(1.05);

/// The orchestrator's decision artifact for one execution attempt.
///
/// Derived, never persisted, discarded after the attempt completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Venue offering the best executable price for this order.
    pub venue: VenueId,
    /// That venue's best ask (buy) or best bid (sell).
    pub best_price: Decimal,
    /// Price after limit/slippage resolution; what gets submitted.
    pub final_price: Decimal,
    /// `size × final_price × 1.05`.
    pub required_funds: Decimal,
    /// Withdrawable balance currently on the selected venue.
    pub available_funds: Decimal,
    /// Whether funds must be moved from another venue first.
    pub needs_transfer: bool,
    /// Amount to move if `needs_transfer`; zero otherwise.
    pub transfer_amount: Decimal,
    /// Donor venue if `needs_transfer`.
    pub transfer_source: Option<VenueId>,
}

impl ExecutionPlan {
    /// False when the selected venue is short and no other venue can cover
    /// any of the gap — the caller must refuse execution.
    pub fn is_funded(&self) -> bool {
        self.needs_transfer || self.available_funds >= self.required_funds
    }
}

/// Pick the venue with the best executable price for `side`.
///
/// Buy routes to the lowest ask, sell to the highest bid. Ties go to the
/// first venue in venue-id order (the book keys venues in a `BTreeMap`,
/// so the tie-break is deterministic).
pub fn select_venue(side: OrderSide, book: &AggregatedBook) -> Option<(VenueId, Decimal)> {
    let mut best: Option<(&VenueId, Decimal)> = None;

    for (venue, quote) in book.executable_venues() {
        // is_executable guarantees both sides are present
        let price = match (side, quote.best_ask, quote.best_bid) {
            (OrderSide::Buy, Some(ask), _) => ask,
            (OrderSide::Sell, _, Some(bid)) => bid,
            _ => continue,
        };
        best = match best {
            None => Some((venue, price)),
            Some((_, current)) if side == OrderSide::Buy && price < current => {
                Some((venue, price))
            }
            Some((_, current)) if side == OrderSide::Sell && price > current => {
                Some((venue, price))
            }
            other => other,
        };
    }

    best.map(|(venue, price)| (venue.clone(), price))
}

/// Resolve the submitted price from the order type.
///
/// Limit orders use the caller's price verbatim; market and ioc orders pad
/// the best price by the slippage allowance (up for buys, down for sells).
fn resolve_price(order: &OrderRequest, best_price: Decimal) -> Decimal {
    match order.kind() {
        OrderKind::Limit => order.limit_price().unwrap_or(best_price),
        OrderKind::Market | OrderKind::Ioc => {
            let fraction = order.slippage_pct() / dec!(100);
            let multiplier = match order.side() {
                OrderSide::Buy => Decimal::ONE + fraction,
                OrderSide::Sell => Decimal::ONE - fraction,
            };
            best_price * multiplier
        }
    }
}

/// Build an execution plan, or `None` when market or balance data is
/// insufficient to decide anything (no venue with a routable quote, or no
/// balance snapshot at all). Callers must surface `None` as "cannot plan",
/// not as an empty plan.
pub fn plan(
    order: &OrderRequest,
    book: &AggregatedBook,
    balances: &BTreeMap<VenueId, VenueBalance>,
) -> Option<ExecutionPlan> {
    if balances.is_empty() {
        return None;
    }

    let (venue, best_price) = select_venue(order.side(), book)?;
    let final_price = resolve_price(order, best_price);
    let required_funds = order.size() * final_price * FUNDING_BUFFER;

    let available_funds = balances
        .get(&venue)
        .map_or(Decimal::ZERO, |b| b.withdrawable);

    let mut needs_transfer = false;
    let mut transfer_amount = Decimal::ZERO;
    let mut transfer_source = None;

    if available_funds < required_funds {
        // Donor = the other venue with the largest withdrawable balance;
        // first-in-venue-id-order wins ties.
        let mut donor: Option<(&VenueId, Decimal)> = None;
        for (id, bal) in balances.iter().filter(|(id, _)| **id != venue) {
            if donor.is_none_or(|(_, funds)| bal.withdrawable > funds) {
                donor = Some((id, bal.withdrawable));
            }
        }

        if let Some((donor_id, donor_funds)) = donor {
            if donor_funds > Decimal::ZERO {
                transfer_amount = (required_funds - available_funds).min(donor_funds);
                transfer_source = Some(donor_id.clone());
                needs_transfer = transfer_amount > Decimal::ZERO;
            }
        }
    }

    Some(ExecutionPlan {
        venue,
        best_price,
        final_price,
        required_funds,
        available_funds,
        needs_transfer,
        transfer_amount,
        transfer_source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::book::VenueQuote;

    fn quote(bid: Decimal, ask: Decimal) -> VenueQuote {
        VenueQuote {
            best_bid: Some(bid),
            best_ask: Some(ask),
            spread: Some(ask - bid),
            mid_price: Some((bid + ask) / dec!(2)),
            observed_at_ms: 0,
        }
    }

    fn book(venues: Vec<(&str, VenueQuote)>) -> AggregatedBook {
        AggregatedBook {
            coin: "BTC".to_string(),
            timestamp_ms: 0,
            best_bid: dec!(0),
            best_ask: dec!(0),
            spread: dec!(0),
            mid_price: dec!(0),
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

    fn balances(entries: Vec<(&str, Decimal)>) -> BTreeMap<VenueId, VenueBalance> {
        entries
            .into_iter()
            .map(|(id, w)| (id.to_string(), balance(w)))
            .collect()
    }

    #[test]
    fn test_buy_routes_to_lowest_ask() {
        let book = book(vec![
            ("btcx", quote(dec!(99990), dec!(100050))),
            ("merrli", quote(dec!(99980), dec!(100020))),
            ("sekaw", quote(dec!(99995), dec!(100010))),
        ]);
        let (venue, price) = select_venue(OrderSide::Buy, &book).unwrap();
        assert_eq!(venue, "sekaw");
        assert_eq!(price, dec!(100010));
    }

    #[test]
    fn test_sell_routes_to_highest_bid() {
        let book = book(vec![
            ("btcx", quote(dec!(99990), dec!(100050))),
            ("merrli", quote(dec!(99980), dec!(100020))),
            ("sekaw", quote(dec!(99995), dec!(100010))),
        ]);
        let (venue, price) = select_venue(OrderSide::Sell, &book).unwrap();
        assert_eq!(venue, "btcx");
        assert_eq!(price, dec!(99990));
    }

    #[test]
    fn test_tie_breaks_to_first_venue_id() {
        let book = book(vec![
            ("sekaw", quote(dec!(99), dec!(100))),
            ("btcx", quote(dec!(99), dec!(100))),
        ]);
        let (venue, _) = select_venue(OrderSide::Buy, &book).unwrap();
        assert_eq!(venue, "btcx");
    }

    #[test]
    fn test_one_sided_quotes_are_skipped() {
        let mut half = quote(dec!(90), dec!(91));
        half.best_ask = None;
        let book = book(vec![
            ("btcx", half),
            ("merrli", quote(dec!(99), dec!(100))),
        ]);
        let (venue, _) = select_venue(OrderSide::Buy, &book).unwrap();
        assert_eq!(venue, "merrli");
    }

    #[test]
    fn test_no_executable_venue_cannot_plan() {
        let book = book(vec![]);
        let order = OrderRequest::market(OrderSide::Buy, dec!(1), dec!(1)).unwrap();
        assert!(plan(&order, &book, &balances(vec![("btcx", dec!(100))])).is_none());
    }

    #[test]
    fn test_empty_balances_cannot_plan() {
        let book = book(vec![("btcx", quote(dec!(99), dec!(100)))]);
        let order = OrderRequest::market(OrderSide::Buy, dec!(1), dec!(1)).unwrap();
        assert!(plan(&order, &book, &BTreeMap::new()).is_none());
    }

    #[test]
    fn test_limit_price_used_verbatim() {
        let book = book(vec![("btcx", quote(dec!(99000), dec!(100000)))]);
        let order = OrderRequest::limit(OrderSide::Buy, dec!(0.5), dec!(98500)).unwrap();
        let plan = plan(&order, &book, &balances(vec![("btcx", dec!(100000))])).unwrap();
        assert_eq!(plan.final_price, dec!(98500));
        assert_eq!(plan.required_funds, dec!(0.5) * dec!(98500) * FUNDING_BUFFER);
    }

    #[test]
    fn test_sell_slippage_pads_downward() {
        let book = book(vec![("btcx", quote(dec!(100000), dec!(100010)))]);
        let order = OrderRequest::market(OrderSide::Sell, dec!(1), dec!(2)).unwrap();
        let plan = plan(&order, &book, &balances(vec![("btcx", dec!(1000000))])).unwrap();
        assert_eq!(plan.final_price, dec!(98000));
    }

    #[test]
    fn test_fully_funded_venue_needs_no_transfer() {
        let book = book(vec![("btcx", quote(dec!(99), dec!(100)))]);
        let order = OrderRequest::market(OrderSide::Buy, dec!(1), dec!(0)).unwrap();
        let plan = plan(
            &order,
            &book,
            &balances(vec![("btcx", dec!(500)), ("sekaw", dec!(9000))]),
        )
        .unwrap();
        assert!(!plan.needs_transfer);
        assert_eq!(plan.transfer_amount, dec!(0));
        assert_eq!(plan.transfer_source, None);
        assert!(plan.is_funded());
    }

    #[test]
    fn test_shortfall_with_no_donor_reports_unfunded() {
        let book = book(vec![("btcx", quote(dec!(99), dec!(100)))]);
        let order = OrderRequest::market(OrderSide::Buy, dec!(10), dec!(0)).unwrap();
        let plan = plan(
            &order,
            &book,
            &balances(vec![("btcx", dec!(5)), ("sekaw", dec!(0))]),
        )
        .unwrap();
        assert!(!plan.needs_transfer);
        assert!(!plan.is_funded());
    }

    #[test]
    fn test_transfer_capped_by_donor_balance() {
        let book = book(vec![("btcx", quote(dec!(99), dec!(100)))]);
        let order = OrderRequest::market(OrderSide::Buy, dec!(10), dec!(0)).unwrap();
        // required = 10 * 100 * 1.05 = 1050; gap = 1050 - 5 = 1045 > donor 200
        let plan = plan(
            &order,
            &book,
            &balances(vec![("btcx", dec!(5)), ("sekaw", dec!(200))]),
        )
        .unwrap();
        assert!(plan.needs_transfer);
        assert_eq!(plan.transfer_amount, dec!(200));
        assert_eq!(plan.transfer_source, Some("sekaw".to_string()));
    }

    #[test]
    fn test_richest_donor_is_selected() {
        let book = book(vec![("btcx", quote(dec!(99), dec!(100)))]);
        let order = OrderRequest::market(OrderSide::Buy, dec!(10), dec!(0)).unwrap();
        let plan = plan(
            &order,
            &book,
            &balances(vec![
                ("btcx", dec!(5)),
                ("merrli", dec!(300)),
                ("sekaw", dec!(2000)),
            ]),
        )
        .unwrap();
        assert_eq!(plan.transfer_source, Some("sekaw".to_string()));
        // gap = 1050 - 5 = 1045, covered by sekaw's 2000
        assert_eq!(plan.transfer_amount, dec!(1045));
    }

    /// Worked example: buy 0.01 market with 8% slippage against asks
    /// A=100000 / B=100050 and balances A=50, B=2000.
    #[test]
    fn test_transfer_then_execute_scenario() {
        let book = book(vec![
            ("venue_a", quote(dec!(99950), dec!(100000))),
            ("venue_b", quote(dec!(99990), dec!(100050))),
        ]);
        let order = OrderRequest::market(OrderSide::Buy, dec!(0.01), dec!(8)).unwrap();
        let plan = plan(
            &order,
            &book,
            &balances(vec![("venue_a", dec!(50)), ("venue_b", dec!(2000))]),
        )
        .unwrap();

        assert_eq!(plan.venue, "venue_a");
        assert_eq!(plan.final_price, dec!(108000.00));
        assert_eq!(plan.required_funds, dec!(1134.0000));
        assert_eq!(plan.available_funds, dec!(50));
        assert!(plan.needs_transfer);
        assert_eq!(plan.transfer_amount, dec!(1084.0000));
        assert_eq!(plan.transfer_source, Some("venue_b".to_string()));
    }

    #[test]
    fn test_plan_is_deterministic() {
        let book = book(vec![
            ("btcx", quote(dec!(99), dec!(100))),
            ("sekaw", quote(dec!(98), dec!(100))),
        ]);
        let bals = balances(vec![("btcx", dec!(1)), ("sekaw", dec!(50))]);
        let order = OrderRequest::market(OrderSide::Buy, dec!(2), dec!(1)).unwrap();
        let first = plan(&order, &book, &bals).unwrap();
        let second = plan(&order, &book, &bals).unwrap();
        assert_eq!(first, second);
    }
}
