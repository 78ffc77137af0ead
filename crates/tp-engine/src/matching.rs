//! Simulated matching engine (spec §4.D).
//!
//! `simulate_execution` is the one stochastic component in the pipeline: it
//! builds a synthetic order book around the incoming order's price, lets it
//! cross, and then samples a CANCELLED/PARTIAL/FILLED outcome independent of
//! whatever the synthetic book actually produced (the synthetic book exists
//! to source a plausible fill price, not to gate the outcome). Seed control
//! is the caller's responsibility — this module takes an injected RNG rather
//! than reaching for a global one.

use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use rand_distr::Normal;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use tp_types::{Order, OrderStatus, Side};

use crate::orderbook::OrderBook;

const TICK: f64 = 0.01;
const LEVELS: i64 = 5;
const VOL_MEAN: f64 = 100.0;
const VOL_STD: f64 = 20.0;

/// The execution outcome of a simulated order (spec §4.D).
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub status: OrderStatus,
    pub qty: i64,
    pub price: Option<Decimal>,
}

/// Builds the synthetic 5-level book and simulates one order's execution
/// against it, then samples the 10%/60%/30% CANCELLED/PARTIAL/FILLED split.
pub fn simulate_execution<R: Rng + ?Sized>(order: &Order, rng: &mut R) -> ExecutionOutcome {
    let reference = order.price.to_f64().unwrap_or(0.0);
    let mut book = OrderBook::new();
    let normal = Normal::new(VOL_MEAN, VOL_STD).expect("valid normal distribution parameters");

    let mut order_id = 1u64;
    for level in 1..=LEVELS {
        let offset = level as f64 * TICK;

        let bid_qty = normal.sample(rng).max(1.0) as i64;
        if let Some(bid_price) = Decimal::from_f64_retain(reference - offset) {
            book.add_order(order_id, Side::Buy, "SYNTH", bid_price, bid_qty.max(1), 0);
        }
        order_id += 1;

        let ask_qty = normal.sample(rng).max(1.0) as i64;
        if let Some(ask_price) = Decimal::from_f64_retain(reference + offset) {
            book.add_order(order_id, Side::Sell, "SYNTH", ask_price, ask_qty.max(1), 0);
        }
        order_id += 1;
    }

    let incoming_id = order_id;
    let trades = book.add_order(incoming_id, order.side, &order.symbol, order.price, order.qty, 0);

    let fill_price = trades.last().map(|t| t.price).or_else(|| match order.side {
        Side::Buy => book.best_ask(),
        Side::Sell => book.best_bid(),
    });

    let u: f64 = Uniform::new(0.0, 1.0).sample(rng);

    if u < 0.1 {
        ExecutionOutcome {
            status: OrderStatus::Cancelled,
            qty: 0,
            price: None,
        }
    } else if u < 0.7 && order.qty > 1 {
        let filled_qty = rng.gen_range(1..order.qty);
        ExecutionOutcome {
            status: OrderStatus::Partial,
            qty: filled_qty,
            price: fill_price,
        }
    } else {
        ExecutionOutcome {
            status: OrderStatus::Filled,
            qty: order.qty,
            price: fill_price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rust_decimal_macros::dec;

    fn order(side: Side, qty: i64, price: Decimal) -> Order {
        Order::new(side, "AAPL", qty, price).unwrap()
    }

    #[test]
    fn qty_one_never_partial() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..200 {
            let outcome = simulate_execution(&order(Side::Buy, 1, dec!(100)), &mut rng);
            assert_ne!(outcome.status, OrderStatus::Partial);
        }
    }

    #[test]
    fn cancelled_outcome_has_zero_qty_and_no_price() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut saw_cancel = false;
        for _ in 0..500 {
            let outcome = simulate_execution(&order(Side::Buy, 10, dec!(100)), &mut rng);
            if outcome.status == OrderStatus::Cancelled {
                saw_cancel = true;
                assert_eq!(outcome.qty, 0);
                assert!(outcome.price.is_none());
            }
        }
        assert!(saw_cancel, "expected to observe at least one cancel in 500 draws");
    }

    #[test]
    fn partial_fill_qty_strictly_between_zero_and_order_qty() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut saw_partial = false;
        for _ in 0..500 {
            let outcome = simulate_execution(&order(Side::Sell, 10, dec!(100)), &mut rng);
            if outcome.status == OrderStatus::Partial {
                saw_partial = true;
                assert!(outcome.qty > 0 && outcome.qty < 10);
            }
        }
        assert!(saw_partial);
    }

    #[test]
    fn full_fill_matches_order_qty() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        for _ in 0..200 {
            let outcome = simulate_execution(&order(Side::Buy, 5, dec!(100)), &mut rng);
            if outcome.status == OrderStatus::Filled {
                assert_eq!(outcome.qty, 5);
                assert!(outcome.price.is_some());
            }
        }
    }

    #[test]
    fn same_seed_yields_identical_sequence() {
        let mut rng_a = ChaCha8Rng::seed_from_u64(99);
        let mut rng_b = ChaCha8Rng::seed_from_u64(99);
        let a: Vec<_> = (0..20).map(|_| simulate_execution(&order(Side::Buy, 10, dec!(100)), &mut rng_a)).collect();
        let b: Vec<_> = (0..20).map(|_| simulate_execution(&order(Side::Buy, 10, dec!(100)), &mut rng_b)).collect();
        assert_eq!(a, b);
    }
}
