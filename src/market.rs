// ===============================
// src/market.rs (market maker: inventory, prices, liquidity)
// ===============================
use std::fmt;

use ahash::AHashMap as HashMap;
use parking_lot::{Mutex, MutexGuard};
use rand::{Rng, RngCore};

use crate::domain::{Listing, MarketSnapshot, Symbol, TradeOutcome};
use crate::engine;
use crate::trader::Trader;

/// Price impact applied after every market fill. The market floors the
/// result at 1 whatever the rule returns.
pub trait PriceRule: Send + Sync + fmt::Debug {
    fn after_buy(&self, price: i64, rng: &mut dyn RngCore) -> i64;
    fn after_sell(&self, price: i64, rng: &mut dyn RngCore) -> i64;
}

/// Buy: `+ rand{0..=max_step}`. Sell: `- rand{0..=max_step}`.
/// Asymmetric on purpose (the floor only bites on the way down), so prices
/// drift upward over long runs.
#[derive(Debug, Clone, Copy)]
pub struct Drift { pub max_step: i64 }

impl Default for Drift {
    fn default() -> Self { Self { max_step: 1 } }
}

impl PriceRule for Drift {
    fn after_buy(&self, price: i64, rng: &mut dyn RngCore) -> i64 {
        price.saturating_add(rng.gen_range(0..=self.max_step))
    }
    fn after_sell(&self, price: i64, rng: &mut dyn RngCore) -> i64 {
        price.saturating_sub(rng.gen_range(0..=self.max_step))
    }
}

/// Price never moves.
#[derive(Debug, Clone, Copy, Default)]
pub struct Flat;

impl PriceRule for Flat {
    fn after_buy(&self, price: i64, _rng: &mut dyn RngCore) -> i64 { price }
    fn after_sell(&self, price: i64, _rng: &mut dyn RngCore) -> i64 { price }
}

/// State guarded by the market lock.
#[derive(Debug, Clone)]
pub struct Book {
    inventory: HashMap<Symbol, u64>,
    prices: HashMap<Symbol, i64>,
    cash: i64,
}

impl Book {
    pub fn price(&self, symbol: &Symbol) -> Option<i64> { self.prices.get(symbol).copied() }

    pub fn inventory(&self, symbol: &Symbol) -> u64 {
        self.inventory.get(symbol).copied().unwrap_or(0)
    }

    pub fn cash(&self) -> i64 { self.cash }

    pub fn credit(&mut self, amount: i64) { self.cash += amount; }

    pub fn debit(&mut self, amount: i64) -> bool {
        if self.cash < amount {
            return false;
        }
        self.cash -= amount;
        true
    }

    pub fn take_share(&mut self, symbol: &Symbol) -> bool {
        match self.inventory.get_mut(symbol) {
            Some(qty) if *qty > 0 => {
                *qty -= 1;
                true
            }
            _ => false,
        }
    }

    pub fn return_share(&mut self, symbol: &Symbol) {
        *self.inventory.entry(symbol.clone()).or_insert(0) += 1;
    }

    /// Floors at 1.
    pub fn set_price(&mut self, symbol: &Symbol, price: i64) {
        if let Some(p) = self.prices.get_mut(symbol) {
            *p = price.max(1);
        }
    }

    fn snapshot(&self) -> MarketSnapshot {
        MarketSnapshot {
            inventory: self.inventory.iter().map(|(s, q)| (s.clone(), *q)).collect(),
            prices: self.prices.iter().map(|(s, p)| (s.clone(), *p)).collect(),
            cash: self.cash,
        }
    }
}

pub struct Market {
    symbols: Vec<Symbol>,
    book: Mutex<Book>,
    rule: Box<dyn PriceRule>,
}

impl fmt::Debug for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Market")
            .field("symbols", &self.symbols)
            .field("rule", &self.rule)
            .finish_non_exhaustive()
    }
}

impl Market {
    pub fn new(listings: &[Listing], cash: i64, rule: Box<dyn PriceRule>) -> Self {
        let symbols = listings.iter().map(|l| l.symbol.clone()).collect();
        let inventory = listings.iter().map(|l| (l.symbol.clone(), l.inventory)).collect();
        let prices = listings.iter().map(|l| (l.symbol.clone(), l.price.max(1))).collect();
        Self { symbols, book: Mutex::new(Book { inventory, prices, cash }), rule }
    }

    pub fn symbols(&self) -> &[Symbol] { &self.symbols }

    pub fn rule(&self) -> &dyn PriceRule { self.rule.as_ref() }

    /// Exclusive access to the book. Always taken before any trader lock.
    pub fn lock(&self) -> MutexGuard<'_, Book> { self.book.lock() }

    /// Live quote, `None` for a symbol that is not listed.
    pub fn price(&self, symbol: &Symbol) -> Option<i64> { self.lock().price(symbol) }

    pub fn buy<R: Rng>(&self, trader: &Trader, symbol: &Symbol, rng: &mut R) -> TradeOutcome {
        engine::buy_from_market(self, trader, symbol, rng)
    }

    pub fn sell<R: Rng>(&self, trader: &Trader, symbol: &Symbol, rng: &mut R) -> TradeOutcome {
        engine::sell_to_market(self, trader, symbol, rng)
    }

    /// Copy of inventory, prices and cash as of one instant. The lock is held
    /// only for the clone.
    pub fn snapshot(&self) -> MarketSnapshot {
        let book = self.lock().clone();
        book.snapshot()
    }

    /// Lock-free read once every other handle is gone.
    pub fn settled(&mut self) -> MarketSnapshot {
        self.book.get_mut().snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn listing(name: &str, inventory: u64, price: i64) -> Listing {
        Listing { symbol: Symbol::new(name), inventory, price }
    }

    #[test]
    fn drift_moves_by_at_most_step() {
        let mut rng = StdRng::seed_from_u64(7);
        let rule = Drift::default();
        for _ in 0..200 {
            let up = rule.after_buy(100, &mut rng);
            assert!((100..=101).contains(&up));
            let down = rule.after_sell(100, &mut rng);
            assert!((99..=100).contains(&down));
        }
    }

    #[test]
    fn set_price_floors_at_one() {
        let m = Market::new(&[listing("BTC", 1, 1)], 0, Box::new(Flat));
        let btc = Symbol::new("BTC");
        m.lock().set_price(&btc, -5);
        assert_eq!(m.price(&btc), Some(1));
    }

    #[test]
    fn snapshot_copies_all_listings() {
        let m = Market::new(
            &[listing("AAPL", 10, 100), listing("TSLA", 20, 250)],
            1_000,
            Box::new(Drift::default()),
        );
        let snap = m.snapshot();
        assert_eq!(snap.cash, 1_000);
        assert_eq!(snap.inventory[&Symbol::new("TSLA")], 20);
        assert_eq!(snap.prices[&Symbol::new("AAPL")], 100);
    }

    #[test]
    fn buy_then_sell_through_the_market() {
        use crate::domain::{DeclineReason, TraderId};

        let aapl = Symbol::new("AAPL");
        let m = Market::new(&[listing("AAPL", 1, 40)], 0, Box::new(Flat));
        let t = Trader::new(TraderId(0), 100, &[aapl.clone()]);
        let mut rng = StdRng::seed_from_u64(5);

        assert_eq!(m.buy(&t, &aapl, &mut rng), TradeOutcome::Filled { price: 40 });
        assert_eq!(m.buy(&t, &aapl, &mut rng), TradeOutcome::Declined(DeclineReason::OutOfStock));
        assert_eq!(m.sell(&t, &aapl, &mut rng), TradeOutcome::Filled { price: 40 });
        assert_eq!(m.sell(&t, &aapl, &mut rng), TradeOutcome::Declined(DeclineReason::NoHoldings));

        let snap = m.snapshot();
        assert_eq!(snap.cash, 0);
        assert_eq!(snap.inventory[&aapl], 1);
        assert_eq!(t.cash(), 100);
    }

    #[test]
    fn unknown_symbol_has_no_quote() {
        let m = Market::new(&[listing("AAPL", 10, 100)], 0, Box::new(Flat));
        assert_eq!(m.price(&Symbol::new("DOGE")), None);
    }
}
