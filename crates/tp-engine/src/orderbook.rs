//! Price-time-priority order book (spec §4.C).
//!
//! Two binary heaps hold admission-ordered price keys; a `HashMap<u64, Entry>`
//! is the source of truth for each order's live state. Heap entries are
//! tombstoned rather than removed in place: every mutation bumps an entry's
//! `version`, and a heap entry whose version no longer matches the current
//! record is stale and gets dropped lazily when it reaches the top.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use rust_decimal::Decimal;
use tp_types::Side;

#[derive(Debug, Clone)]
struct Entry {
    order_id: u64,
    side: Side,
    symbol: String,
    price: Decimal,
    qty: i64,
    ts: i64,
    active: bool,
    seq: u64,
    version: u64,
}

/// A single resting/heap reference into the book, ordered for max-heap
/// semantics on both sides: bids compare on price directly (higher first),
/// asks compare on negated price (lower first); `seq` breaks ties so earlier
/// admissions win within a price level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HeapKey {
    price_rank: Decimal,
    seq: u64,
    order_id: u64,
    version: u64,
}

impl Ord for HeapKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.price_rank
            .cmp(&other.price_rank)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for HeapKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One completed match between two resting/incoming orders.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub buy_id: u64,
    pub sell_id: u64,
    pub price: Decimal,
    pub qty: i64,
    pub ts: i64,
}

/// One aggregated price level, best-first.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthLevel {
    pub price: Decimal,
    pub qty: i64,
}

pub struct OrderBook {
    orders: HashMap<u64, Entry>,
    bids: BinaryHeap<HeapKey>,
    asks: BinaryHeap<HeapKey>,
    next_seq: u64,
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderBook {
    pub fn new() -> Self {
        Self {
            orders: HashMap::new(),
            bids: BinaryHeap::new(),
            asks: BinaryHeap::new(),
            next_seq: 1,
        }
    }

    fn next_seq(&mut self) -> u64 {
        let s = self.next_seq;
        self.next_seq += 1;
        s
    }

    fn push_heap(&mut self, entry: &Entry) {
        let price_rank = match entry.side {
            Side::Buy => entry.price,
            Side::Sell => -entry.price,
        };
        let key = HeapKey {
            price_rank,
            seq: entry.seq,
            order_id: entry.order_id,
            version: entry.version,
        };
        match entry.side {
            Side::Buy => self.bids.push(key),
            Side::Sell => self.asks.push(key),
        }
    }

    /// Pops stale tops (tombstones whose version or active status disagrees
    /// with the live record) until a genuinely live top is found, or the
    /// heap runs dry.
    fn peek_live(&mut self, side: Side) -> Option<u64> {
        loop {
            let heap = match side {
                Side::Buy => &mut self.bids,
                Side::Sell => &mut self.asks,
            };
            let top = heap.peek()?;
            let order_id = top.order_id;
            let version = top.version;
            match self.orders.get(&order_id) {
                Some(live) if live.active && live.version == version => return Some(order_id),
                _ => {
                    match side {
                        Side::Buy => self.bids.pop(),
                        Side::Sell => self.asks.pop(),
                    };
                }
            }
        }
    }

    pub fn best_bid(&mut self) -> Option<Decimal> {
        let id = self.peek_live(Side::Buy)?;
        self.orders.get(&id).map(|e| e.price)
    }

    pub fn best_ask(&mut self) -> Option<Decimal> {
        let id = self.peek_live(Side::Sell)?;
        self.orders.get(&id).map(|e| e.price)
    }

    /// Admit a new order and run the matching loop against the book.
    #[allow(clippy::too_many_arguments)]
    pub fn add_order(
        &mut self,
        order_id: u64,
        side: Side,
        symbol: impl Into<String>,
        price: Decimal,
        qty: i64,
        ts: i64,
    ) -> Vec<Trade> {
        let seq = self.next_seq();
        let entry = Entry {
            order_id,
            side,
            symbol: symbol.into(),
            price,
            qty,
            ts,
            active: true,
            seq,
            version: 1,
        };
        self.push_heap(&entry);
        self.orders.insert(order_id, entry);
        self.try_match(order_id, ts)
    }

    /// Mutate qty/price on a live order. Bumps seq and version, pushes a
    /// fresh heap entry (the prior one becomes a tombstone), and re-runs
    /// matching.
    pub fn modify_order(&mut self, order_id: u64, new_qty: Option<i64>, new_price: Option<Decimal>, ts: i64) -> Vec<Trade> {
        let Some(entry) = self.orders.get_mut(&order_id) else {
            return Vec::new();
        };
        if !entry.active {
            return Vec::new();
        }
        if let Some(q) = new_qty {
            entry.qty = q;
        }
        if let Some(p) = new_price {
            entry.price = p;
        }
        entry.seq = self.next_seq;
        self.next_seq += 1;
        entry.version += 1;
        let snapshot = entry.clone();
        self.push_heap(&snapshot);
        self.try_match(order_id, ts)
    }

    /// Deactivate a live order. The existing heap entry is left as a
    /// tombstone and discarded lazily on the next peek.
    pub fn cancel_order(&mut self, order_id: u64) {
        if let Some(entry) = self.orders.get_mut(&order_id) {
            entry.active = false;
            entry.qty = 0;
            entry.version += 1;
        }
    }

    /// Price-time priority matching loop (spec §4.C): the incoming order
    /// walks the counter side while it crosses, taking the resting side's
    /// price on every trade.
    fn try_match(&mut self, incoming_id: u64, ts: i64) -> Vec<Trade> {
        let mut trades = Vec::new();
        loop {
            let Some(incoming) = self.orders.get(&incoming_id).cloned() else {
                break;
            };
            if !incoming.active || incoming.qty <= 0 {
                break;
            }
            let counter_side = incoming.side.opposite();
            let Some(resting_id) = self.peek_live(counter_side) else {
                break;
            };
            let resting = self.orders.get(&resting_id).cloned().unwrap();

            let crosses = match incoming.side {
                Side::Buy => incoming.price >= resting.price,
                Side::Sell => incoming.price <= resting.price,
            };
            if !crosses {
                break;
            }

            let trade_qty = incoming.qty.min(resting.qty);
            let trade_price = resting.price;

            let (buy_id, sell_id) = match incoming.side {
                Side::Buy => (incoming.order_id, resting.order_id),
                Side::Sell => (resting.order_id, incoming.order_id),
            };
            trades.push(Trade {
                buy_id,
                sell_id,
                price: trade_price,
                qty: trade_qty,
                ts,
            });

            if let Some(e) = self.orders.get_mut(&incoming_id) {
                e.qty -= trade_qty;
                if e.qty <= 0 {
                    e.active = false;
                }
            }
            if let Some(e) = self.orders.get_mut(&resting_id) {
                e.qty -= trade_qty;
                if e.qty <= 0 {
                    e.active = false;
                }
            }
        }
        trades
    }

    /// Aggregate live entries by price, best-first per side.
    pub fn depth(&self, side: Side) -> Vec<DepthLevel> {
        let mut levels: HashMap<Decimal, i64> = HashMap::new();
        for entry in self.orders.values() {
            if entry.active && entry.side == side {
                *levels.entry(entry.price).or_insert(0) += entry.qty;
            }
        }
        let mut out: Vec<DepthLevel> = levels.into_iter().map(|(price, qty)| DepthLevel { price, qty }).collect();
        match side {
            Side::Buy => out.sort_by(|a, b| b.price.cmp(&a.price)),
            Side::Sell => out.sort_by(|a, b| a.price.cmp(&b.price)),
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn crossing_order_generates_trade_at_resting_price() {
        let mut book = OrderBook::new();
        book.add_order(1, Side::Buy, "AAPL", dec!(100), 10, 0);
        let trades = book.add_order(2, Side::Sell, "AAPL", dec!(99), 4, 1);

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0], Trade { buy_id: 1, sell_id: 2, price: dec!(100), qty: 4, ts: 1 });
        assert_eq!(book.orders.get(&1).unwrap().qty, 6);
    }

    #[test]
    fn non_crossing_orders_rest() {
        let mut book = OrderBook::new();
        book.add_order(1, Side::Buy, "AAPL", dec!(99), 10, 0);
        let trades = book.add_order(2, Side::Sell, "AAPL", dec!(100), 4, 1);
        assert!(trades.is_empty());
        assert_eq!(book.best_bid(), Some(dec!(99)));
        assert_eq!(book.best_ask(), Some(dec!(100)));
    }

    #[test]
    fn cancel_tombstones_without_removing_heap_entry() {
        let mut book = OrderBook::new();
        book.add_order(1, Side::Buy, "AAPL", dec!(100), 10, 0);
        book.cancel_order(1);
        assert_eq!(book.best_bid(), None);
    }

    #[test]
    fn modify_bumps_version_and_rematches() {
        let mut book = OrderBook::new();
        book.add_order(1, Side::Sell, "AAPL", dec!(105), 10, 0);
        let trades = book.modify_order(1, None, Some(dec!(95)), 1);
        // No resting counter-order yet, so modify alone shouldn't trade.
        assert!(trades.is_empty());
        assert_eq!(book.best_ask(), Some(dec!(95)));
    }

    #[test]
    fn best_bid_always_below_best_ask_when_both_exist() {
        let mut book = OrderBook::new();
        book.add_order(1, Side::Buy, "AAPL", dec!(99), 10, 0);
        book.add_order(2, Side::Sell, "AAPL", dec!(101), 10, 1);
        let bid = book.best_bid().unwrap();
        let ask = book.best_ask().unwrap();
        assert!(bid < ask);
    }

    #[test]
    fn depth_aggregates_by_price_best_first() {
        let mut book = OrderBook::new();
        book.add_order(1, Side::Buy, "AAPL", dec!(99), 5, 0);
        book.add_order(2, Side::Buy, "AAPL", dec!(99), 3, 1);
        book.add_order(3, Side::Buy, "AAPL", dec!(98), 7, 2);

        let depth = book.depth(Side::Buy);
        assert_eq!(depth[0], DepthLevel { price: dec!(99), qty: 8 });
        assert_eq!(depth[1], DepthLevel { price: dec!(98), qty: 7 });
    }

    #[test]
    fn incoming_order_has_at_most_one_live_entry_after_partial_match() {
        let mut book = OrderBook::new();
        book.add_order(1, Side::Sell, "AAPL", dec!(100), 3, 0);
        book.add_order(2, Side::Buy, "AAPL", dec!(100), 10, 1);
        // Incoming buy (qty 10) partially matches the resting sell (qty 3);
        // the remainder rests as the book's single live entry for id=2.
        assert_eq!(book.orders.get(&2).unwrap().qty, 7);
        assert!(book.orders.get(&2).unwrap().active);
        assert!(!book.orders.get(&1).unwrap().active);
    }
}
