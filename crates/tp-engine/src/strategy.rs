//! The streaming strategy family (spec §4.B).
//!
//! Each strategy is an incremental state machine: one instance per symbol,
//! fed one bar at a time through [`Strategy::on_new_bar`], emitting a
//! [`Signal`] only on a crossing event. A `position` flag (0 flat, 1 long)
//! guards against duplicate same-side signals — a strategy never emits two
//! BUYs in a row without an intervening SELL.

use std::collections::VecDeque;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tp_types::{MarketDataPoint, Signal, SignalAction};

/// Capability set shared by every concrete strategy (spec §9 redesign note:
/// "define a single Strategy capability set as a polymorphism point").
pub trait Strategy: Send {
    fn on_new_bar(&mut self, bar: &MarketDataPoint) -> Option<Signal>;
    fn symbol(&self) -> &str;
    fn position_size(&self) -> i64;
}

fn flat_to_long(position: &mut u8) {
    *position = 1;
}

fn long_to_flat(position: &mut u8) {
    *position = 0;
}

/// 4.B.1 Moving-average crossover.
pub struct MaCrossover {
    symbol: String,
    short_w: usize,
    long_w: usize,
    position_size: i64,
    short_window: VecDeque<Decimal>,
    long_window: VecDeque<Decimal>,
    short_sum: Decimal,
    long_sum: Decimal,
    prev_short_gt_long: Option<bool>,
    position: u8,
}

impl MaCrossover {
    pub fn new(symbol: impl Into<String>, short_w: usize, long_w: usize, position_size: i64) -> Self {
        assert!(short_w < long_w, "short_w must be < long_w");
        Self {
            symbol: symbol.into(),
            short_w,
            long_w,
            position_size,
            short_window: VecDeque::with_capacity(short_w),
            long_window: VecDeque::with_capacity(long_w),
            short_sum: Decimal::ZERO,
            long_sum: Decimal::ZERO,
            prev_short_gt_long: None,
            position: 0,
        }
    }

    fn push(window: &mut VecDeque<Decimal>, sum: &mut Decimal, cap: usize, price: Decimal) {
        if window.len() == cap {
            *sum -= window.pop_front().unwrap();
        }
        window.push_back(price);
        *sum += price;
    }
}

impl Strategy for MaCrossover {
    fn on_new_bar(&mut self, bar: &MarketDataPoint) -> Option<Signal> {
        if bar.symbol != self.symbol {
            return None;
        }
        Self::push(&mut self.short_window, &mut self.short_sum, self.short_w, bar.price);
        Self::push(&mut self.long_window, &mut self.long_sum, self.long_w, bar.price);

        if self.short_window.len() < self.short_w || self.long_window.len() < self.long_w {
            return None;
        }

        let short_avg = self.short_sum / Decimal::from(self.short_w);
        let long_avg = self.long_sum / Decimal::from(self.long_w);
        let short_gt_long = short_avg > long_avg;

        let prev = match self.prev_short_gt_long {
            None => {
                // First bar with both windows full: seed the relation, no signal.
                self.prev_short_gt_long = Some(short_gt_long);
                return None;
            }
            Some(p) => p,
        };
        self.prev_short_gt_long = Some(short_gt_long);

        if !prev && short_gt_long && self.position == 0 {
            flat_to_long(&mut self.position);
            return Some(Signal::new(
                bar.timestamp,
                SignalAction::Buy,
                &self.symbol,
                bar.price,
                "ma crossover: short crossed above long",
            ));
        }
        if prev && !short_gt_long && self.position == 1 {
            long_to_flat(&mut self.position);
            return Some(Signal::new(
                bar.timestamp,
                SignalAction::Sell,
                &self.symbol,
                bar.price,
                "ma crossover: short crossed below long",
            ));
        }
        None
    }

    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn position_size(&self) -> i64 {
        self.position_size
    }
}

/// 4.B.2 Momentum (rate of change). The SELL branch is asymmetric by
/// contract: entry requires a crossing above `threshold`, but exit fires on
/// any bar below `-threshold`, not a crossing.
pub struct Momentum {
    symbol: String,
    window: usize,
    threshold: Decimal,
    position_size: i64,
    prices: VecDeque<Decimal>,
    prev_above_threshold: bool,
    position: u8,
}

impl Momentum {
    pub fn new(symbol: impl Into<String>, window: usize, threshold: Decimal, position_size: i64) -> Self {
        assert!(window >= 1, "window must be >= 1");
        assert!(threshold >= Decimal::ZERO, "threshold must be >= 0");
        Self {
            symbol: symbol.into(),
            window,
            threshold,
            position_size,
            prices: VecDeque::with_capacity(window + 1),
            prev_above_threshold: false,
            position: 0,
        }
    }
}

impl Strategy for Momentum {
    fn on_new_bar(&mut self, bar: &MarketDataPoint) -> Option<Signal> {
        if bar.symbol != self.symbol {
            return None;
        }
        if self.prices.len() == self.window + 1 {
            self.prices.pop_front();
        }
        self.prices.push_back(bar.price);

        if self.prices.len() < self.window + 1 {
            return None;
        }

        let oldest = self.prices[0];
        if oldest == Decimal::ZERO {
            return None;
        }
        let momentum = (bar.price - oldest) / oldest;

        let above_threshold = momentum > self.threshold;
        let signal = if !self.prev_above_threshold && above_threshold && self.position == 0 {
            flat_to_long(&mut self.position);
            Some(Signal::new(
                bar.timestamp,
                SignalAction::Buy,
                &self.symbol,
                bar.price,
                "momentum: crossed above threshold",
            ))
        } else if momentum < -self.threshold && self.position == 1 {
            long_to_flat(&mut self.position);
            Some(Signal::new(
                bar.timestamp,
                SignalAction::Sell,
                &self.symbol,
                bar.price,
                "momentum: breached negative threshold",
            ))
        } else {
            None
        };

        self.prev_above_threshold = above_threshold;
        signal
    }

    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn position_size(&self) -> i64 {
        self.position_size
    }
}

/// 4.B.3 Z-score mean reversion. Uses population standard deviation. The
/// exit's "previous z" is a deliberate approximation: it substitutes the
/// previous price into the *current* window rather than replaying the window
/// as it existed one bar ago.
pub struct ZScore {
    symbol: String,
    window: usize,
    threshold: Decimal,
    position_size: i64,
    prices: VecDeque<Decimal>,
    prev_price: Option<Decimal>,
    position: u8,
}

impl ZScore {
    pub fn new(symbol: impl Into<String>, window: usize, threshold: Decimal, position_size: i64) -> Self {
        assert!(window >= 2, "window must be >= 2");
        assert!(threshold > Decimal::ZERO, "threshold must be > 0");
        Self {
            symbol: symbol.into(),
            window,
            threshold,
            position_size,
            prices: VecDeque::with_capacity(window),
            prev_price: None,
            position: 0,
        }
    }

    fn mean_and_std(values: impl Iterator<Item = Decimal> + Clone, n: usize) -> (Decimal, Decimal) {
        let count = Decimal::from(n);
        let mean: Decimal = values.clone().sum::<Decimal>() / count;
        let variance: Decimal = values.map(|v| (v - mean) * (v - mean)).sum::<Decimal>() / count;
        let std = variance.to_f64().map(|v| v.sqrt()).and_then(Decimal::from_f64_retain).unwrap_or(Decimal::ZERO);
        (mean, std)
    }
}

impl Strategy for ZScore {
    fn on_new_bar(&mut self, bar: &MarketDataPoint) -> Option<Signal> {
        if bar.symbol != self.symbol {
            return None;
        }
        if self.prices.len() == self.window {
            self.prices.pop_front();
        }
        self.prices.push_back(bar.price);

        if self.prices.len() < self.window {
            self.prev_price = Some(bar.price);
            return None;
        }

        let (mean, std) = Self::mean_and_std(self.prices.iter().copied(), self.window);
        if std == Decimal::ZERO {
            self.prev_price = Some(bar.price);
            return None;
        }
        let z = (bar.price - mean) / std;

        let signal = if self.position == 0 && z < -self.threshold {
            flat_to_long(&mut self.position);
            Some(Signal::new(
                bar.timestamp,
                SignalAction::Buy,
                &self.symbol,
                bar.price,
                "zscore: oversold entry",
            ))
        } else if self.position == 1 {
            let prev_z = self.prev_price.map(|prev| {
                let mut window: Vec<Decimal> = self.prices.iter().copied().collect();
                window[self.window - 1] = prev;
                let (prev_mean, prev_std) = Self::mean_and_std(window.into_iter(), self.window);
                if prev_std == Decimal::ZERO {
                    Decimal::ZERO
                } else {
                    (prev - prev_mean) / prev_std
                }
            });
            if matches!(prev_z, Some(pz) if pz < Decimal::ZERO) && z >= Decimal::ZERO {
                long_to_flat(&mut self.position);
                Some(Signal::new(
                    bar.timestamp,
                    SignalAction::Sell,
                    &self.symbol,
                    bar.price,
                    "zscore: mean-crossing exit",
                ))
            } else {
                None
            }
        } else {
            None
        };

        self.prev_price = Some(bar.price);
        signal
    }

    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn position_size(&self) -> i64 {
        self.position_size
    }
}

/// Per-bar sentiment in `[-1, 1]`; absent data yields 0 (spec §4.B.4).
pub trait SentimentLookup: Send {
    fn sentiment(&self, timestamp: chrono::DateTime<chrono::Utc>, symbol: &str) -> f64;
}

/// A lookup with no data — every bar reads as neutral.
pub struct NoSentiment;

impl SentimentLookup for NoSentiment {
    fn sentiment(&self, _timestamp: chrono::DateTime<chrono::Utc>, _symbol: &str) -> f64 {
        0.0
    }
}

/// 4.B.4 Sentiment-gated entry.
pub struct Sentiment {
    symbol: String,
    positive_threshold: f64,
    negative_threshold: f64,
    cooldown_bars: u32,
    position_size: i64,
    bars_since_trade: u32,
    position: u8,
    lookup: Box<dyn SentimentLookup>,
}

impl Sentiment {
    pub fn new(
        symbol: impl Into<String>,
        positive_threshold: f64,
        negative_threshold: f64,
        cooldown_bars: u32,
        position_size: i64,
        lookup: Box<dyn SentimentLookup>,
    ) -> Self {
        assert!(negative_threshold < 0.0 && 0.0 < positive_threshold);
        assert!(cooldown_bars >= 1);
        Self {
            symbol: symbol.into(),
            positive_threshold,
            negative_threshold,
            cooldown_bars,
            position_size,
            bars_since_trade: cooldown_bars,
            position: 0,
            lookup,
        }
    }
}

impl Strategy for Sentiment {
    fn on_new_bar(&mut self, bar: &MarketDataPoint) -> Option<Signal> {
        if bar.symbol != self.symbol {
            return None;
        }
        let sentiment = self.lookup.sentiment(bar.timestamp, &self.symbol);
        if self.bars_since_trade < self.cooldown_bars {
            self.bars_since_trade += 1;
        }

        let signal = if self.position == 0
            && sentiment >= self.positive_threshold
            && self.bars_since_trade >= self.cooldown_bars
        {
            flat_to_long(&mut self.position);
            Some(Signal::new(
                bar.timestamp,
                SignalAction::Buy,
                &self.symbol,
                bar.price,
                "sentiment: positive gate cleared",
            ))
        } else if self.position == 1 && sentiment <= self.negative_threshold {
            long_to_flat(&mut self.position);
            Some(Signal::new(
                bar.timestamp,
                SignalAction::Sell,
                &self.symbol,
                bar.price,
                "sentiment: negative gate tripped",
            ))
        } else {
            None
        };

        if signal.is_some() {
            self.bars_since_trade = 0;
        }
        signal
    }

    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn position_size(&self) -> i64 {
        self.position_size
    }
}
