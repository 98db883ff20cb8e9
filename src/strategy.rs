// ===============================
// src/strategy.rs
// ===============================
//
// Disediakan 2 strategi pemilihan aksi:
// 1) Random (default)  -> simbol acak, buy/sell acak 50:50
// 2) Contrarian        -> "beli murah, jual mahal" relatif ke harga listing,
//                         toleransi (%) berbeda per trader
//
// Strategi hanya memutuskan; eksekusi tetap lewat engine.
//
use ahash::AHashMap as HashMap;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};

use crate::config::StrategyMode;
use crate::domain::{Listing, Side, Symbol};
use crate::market::Market;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Trade { symbol: Symbol, side: Side },
    Hold,
}

pub trait Strategy: Send {
    fn name(&self) -> &'static str;
    fn decide(&mut self, market: &Market, rng: &mut dyn RngCore) -> Intent;
}

#[derive(Debug, Default)]
pub struct RandomWalk;

impl Strategy for RandomWalk {
    fn name(&self) -> &'static str { "random" }

    fn decide(&mut self, market: &Market, rng: &mut dyn RngCore) -> Intent {
        let Some(symbol) = market.symbols().choose(rng).cloned() else {
            return Intent::Hold;
        };
        let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
        Intent::Trade { symbol, side }
    }
}

// -----------------------------------------------------------------------------
// CONTRARIAN
//   Buy  kalau harga <= ref * (100 - tol) / 100
//   Sell kalau harga >= ref * (100 + tol) / 100
//   Selain itu hold.
// -----------------------------------------------------------------------------
#[derive(Debug)]
pub struct Contrarian {
    reference: HashMap<Symbol, i64>,
    tolerance_pct: i64,
}

impl Contrarian {
    pub fn new(listings: &[Listing], tolerance_pct: i64) -> Self {
        let reference = listings.iter().map(|l| (l.symbol.clone(), l.price)).collect();
        Self { reference, tolerance_pct: tolerance_pct.clamp(0, 99) }
    }

    pub fn tolerance_pct(&self) -> i64 { self.tolerance_pct }

    fn side_for(&self, symbol: &Symbol, price: i64) -> Option<Side> {
        // i128: harga * 100 tidak boleh overflow untuk harga i64 apa pun
        let reference = i128::from(*self.reference.get(symbol)?);
        let (price, tol) = (i128::from(price) * 100, i128::from(self.tolerance_pct));
        if price <= reference * (100 - tol) {
            Some(Side::Buy)
        } else if price >= reference * (100 + tol) {
            Some(Side::Sell)
        } else {
            None
        }
    }
}

impl Strategy for Contrarian {
    fn name(&self) -> &'static str { "contrarian" }

    fn decide(&mut self, market: &Market, rng: &mut dyn RngCore) -> Intent {
        let Some(symbol) = market.symbols().choose(rng).cloned() else {
            return Intent::Hold;
        };
        // harga dibaca tanpa menahan lock sampai eksekusi; engine cek ulang
        let Some(price) = market.price(&symbol) else {
            return Intent::Hold;
        };
        match self.side_for(&symbol, price) {
            Some(side) => Intent::Trade { symbol, side },
            None => Intent::Hold,
        }
    }
}

/// Fresh strategy for one agent. Contrarian tolerance is drawn once from
/// `1..=max_tolerance_pct`.
pub fn build(
    mode: StrategyMode,
    listings: &[Listing],
    max_tolerance_pct: i64,
    rng: &mut dyn RngCore,
) -> Box<dyn Strategy> {
    match mode {
        StrategyMode::Random => Box::new(RandomWalk),
        StrategyMode::Contrarian => {
            let tol = rng.gen_range(1..=max_tolerance_pct.max(1));
            Box::new(Contrarian::new(listings, tol))
        }
    }
}
