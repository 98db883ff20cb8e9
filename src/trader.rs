// ===============================
// src/trader.rs (Ledger entity per agent)
// ===============================
//
// Setiap trader punya lock sendiri. Field cash/holdings hanya bisa disentuh
// lewat guard, jadi tidak ada jalan baca/tulis tanpa memegang lock.
//
// Urutan lock global:
//   1) Market (kalau ikut)
//   2) Trader, urut TraderId naik
//
use std::collections::BTreeMap;

use ahash::AHashMap as HashMap;
use parking_lot::{Mutex, MutexGuard};

use crate::domain::{Symbol, TraderId, TraderSnapshot};

#[derive(Debug, Clone)]
pub struct Ledger {
    cash: i64,
    holdings: HashMap<Symbol, u64>,
}

impl Ledger {
    pub fn new(cash: i64, symbols: &[Symbol]) -> Self {
        let holdings = symbols.iter().cloned().map(|s| (s, 0)).collect();
        Self { cash, holdings }
    }

    pub fn cash(&self) -> i64 { self.cash }

    pub fn holding(&self, symbol: &Symbol) -> u64 {
        self.holdings.get(symbol).copied().unwrap_or(0)
    }

    pub fn credit(&mut self, amount: i64) {
        self.cash += amount;
    }

    /// Debit only when the balance covers `amount`; cash never goes negative.
    pub fn debit(&mut self, amount: i64) -> bool {
        if amount < 0 || self.cash < amount {
            return false;
        }
        self.cash -= amount;
        true
    }

    pub fn add_share(&mut self, symbol: &Symbol) {
        *self.holdings.entry(symbol.clone()).or_insert(0) += 1;
    }

    pub fn remove_share(&mut self, symbol: &Symbol) -> bool {
        match self.holdings.get_mut(symbol) {
            Some(qty) if *qty > 0 => {
                *qty -= 1;
                true
            }
            _ => false,
        }
    }

    fn snapshot(&self, id: TraderId) -> TraderSnapshot {
        let holdings: BTreeMap<Symbol, u64> =
            self.holdings.iter().map(|(s, q)| (s.clone(), *q)).collect();
        TraderSnapshot { id, cash: self.cash, holdings }
    }
}

#[derive(Debug)]
pub struct Trader {
    id: TraderId,
    ledger: Mutex<Ledger>,
}

impl Trader {
    pub fn new(id: TraderId, cash: i64, symbols: &[Symbol]) -> Self {
        Self { id, ledger: Mutex::new(Ledger::new(cash, symbols)) }
    }

    pub fn id(&self) -> TraderId { self.id }

    /// Exclusive access for multi-field updates. Callers holding the market
    /// lock must take it first.
    pub fn lock(&self) -> MutexGuard<'_, Ledger> { self.ledger.lock() }

    pub fn credit(&self, amount: i64) { self.lock().credit(amount) }

    pub fn debit(&self, amount: i64) -> bool { self.lock().debit(amount) }

    /// Apply a signed share delta; refused (no change) if it would go below zero.
    pub fn adjust_holdings(&self, symbol: &Symbol, delta: i64) -> bool {
        let mut ledger = self.lock();
        let cur = ledger.holding(symbol);
        let next = match (cur as i64).checked_add(delta) {
            Some(n) if n >= 0 => n as u64,
            _ => return false,
        };
        ledger.holdings.insert(symbol.clone(), next);
        true
    }

    pub fn cash(&self) -> i64 { self.lock().cash() }

    pub fn holding(&self, symbol: &Symbol) -> u64 { self.lock().holding(symbol) }

    pub fn snapshot(&self) -> TraderSnapshot {
        let ledger = self.lock().clone();
        ledger.snapshot(self.id)
    }

    /// Read without locking. `&mut self` proves no other task can reach this trader.
    pub fn settled(&mut self) -> TraderSnapshot {
        self.ledger.get_mut().snapshot(self.id)
    }
}

/// Two trader ledgers locked in ascending id order.
///
/// Field order matters: `high` drops before `low`, so release is the reverse
/// of acquisition.
pub struct LedgerPair<'a> {
    high: MutexGuard<'a, Ledger>,
    low: MutexGuard<'a, Ledger>,
    first_is_low: bool,
}

impl<'a> LedgerPair<'a> {
    /// Ledgers in the argument order given to [`lock_pair`].
    pub fn split(&mut self) -> (&mut Ledger, &mut Ledger) {
        if self.first_is_low {
            (&mut *self.low, &mut *self.high)
        } else {
            (&mut *self.high, &mut *self.low)
        }
    }
}

/// Lock both traders by ascending id, regardless of which one is buyer or
/// seller. Returns `None` for the same trader twice (the mutex is not reentrant).
pub fn lock_pair<'a>(a: &'a Trader, b: &'a Trader) -> Option<LedgerPair<'a>> {
    if a.id == b.id {
        return None;
    }
    let (lo, hi, first_is_low) = if a.id < b.id { (a, b, true) } else { (b, a, false) };
    let low = lo.lock();
    let high = hi.lock();
    Some(LedgerPair { high, low, first_is_low })
}
