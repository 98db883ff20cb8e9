// ===============================
// src/audit.rs (conservation audit, runs once after every task has stopped)
// ===============================
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Listing, MarketSnapshot, Symbol, TraderSnapshot};
use crate::market::Market;
use crate::trader::Trader;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("conservation violated: {0}")]
    Violated(String),
    #[error("{0} still shared, trading tasks have not all stopped")]
    StillShared(&'static str),
}

/// Quantities that no sequence of trades may change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConservedTotals {
    pub cash: i64,
    pub shares: BTreeMap<Symbol, u64>,
}

impl ConservedTotals {
    pub fn initial(listings: &[Listing], market_cash: i64, num_traders: u32, trader_cash: i64) -> Self {
        Self {
            cash: market_cash.saturating_add(i64::from(num_traders).saturating_mul(trader_cash)),
            shares: listings.iter().map(|l| (l.symbol.clone(), l.inventory)).collect(),
        }
    }

    pub fn measure(market: &MarketSnapshot, traders: &[TraderSnapshot]) -> Self {
        let cash = market.cash + traders.iter().map(|t| t.cash).sum::<i64>();
        let mut shares = market.inventory.clone();
        for t in traders {
            for (sym, qty) in &t.holdings {
                *shares.entry(sym.clone()).or_insert(0) += qty;
            }
        }
        Self { cash, shares }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Check<T> {
    pub actual: T,
    pub expected: T,
}

impl<T: PartialEq> Check<T> {
    pub fn passed(&self) -> bool { self.actual == self.expected }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub cash: Check<i64>,
    pub shares: BTreeMap<Symbol, Check<u64>>,
}

impl AuditReport {
    pub fn compare(actual: &ConservedTotals, expected: &ConservedTotals) -> Self {
        let mut symbols: Vec<&Symbol> = expected.shares.keys().chain(actual.shares.keys()).collect();
        symbols.sort();
        symbols.dedup();
        let shares = symbols
            .into_iter()
            .map(|s| {
                let check = Check {
                    actual: actual.shares.get(s).copied().unwrap_or(0),
                    expected: expected.shares.get(s).copied().unwrap_or(0),
                };
                (s.clone(), check)
            })
            .collect();
        Self { cash: Check { actual: actual.cash, expected: expected.cash }, shares }
    }

    pub fn passed(&self) -> bool {
        self.cash.passed() && self.shares.values().all(Check::passed)
    }

    /// Human-readable list of mismatches, empty when everything balances.
    pub fn failures(&self) -> Vec<String> {
        let mut out = Vec::new();
        if !self.cash.passed() {
            out.push(format!("cash {} != {}", self.cash.actual, self.cash.expected));
        }
        for (sym, c) in &self.shares {
            if !c.passed() {
                out.push(format!("{sym} {} != {}", c.actual, c.expected));
            }
        }
        out
    }

    pub fn into_result(self) -> Result<Self, AuditError> {
        if self.passed() {
            Ok(self)
        } else {
            Err(AuditError::Violated(self.failures().join(", ")))
        }
    }
}

fn verdict(ok: bool) -> &'static str { if ok { "PASS" } else { "FAIL" } }

impl fmt::Display for AuditReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total Cash:    {}", self.cash.actual)?;
        writeln!(f, "  Expected:    {}  [{}]", self.cash.expected, verdict(self.cash.passed()))?;
        for (sym, c) in &self.shares {
            writeln!(f, "Total {:<7} {}", format!("{sym}:"), c.actual)?;
            writeln!(f, "  Expected:    {}  [{}]", c.expected, verdict(c.passed()))?;
        }
        write!(f, "Audit:         {}", verdict(self.passed()))
    }
}

#[derive(Debug, Clone)]
pub struct Auditor {
    expected: ConservedTotals,
}

impl Auditor {
    pub fn new(expected: ConservedTotals) -> Self { Self { expected } }

    pub fn expected(&self) -> &ConservedTotals { &self.expected }

    /// Sum final state. Exclusive borrows mean no trade can be in flight, so
    /// nothing is locked.
    pub fn audit(&self, market: &mut Market, traders: &mut [Trader]) -> AuditReport {
        let m = market.settled();
        let ts: Vec<TraderSnapshot> = traders.iter_mut().map(Trader::settled).collect();
        AuditReport::compare(&ConservedTotals::measure(&m, &ts), &self.expected)
    }

    /// Take back sole ownership from the shared handles, then audit. Fails if
    /// any task still holds a clone.
    pub fn audit_shared(
        &self,
        market: Arc<Market>,
        traders: Arc<Vec<Trader>>,
    ) -> Result<AuditReport, AuditError> {
        let mut market = Arc::try_unwrap(market).map_err(|_| AuditError::StillShared("market"))?;
        let mut traders =
            Arc::try_unwrap(traders).map_err(|_| AuditError::StillShared("traders"))?;
        Ok(self.audit(&mut market, &mut traders))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TraderId;
    use crate::market::Flat;

    fn listings() -> Vec<Listing> {
        vec![
            Listing { symbol: Symbol::new("AAPL"), inventory: 100, price: 10 },
            Listing { symbol: Symbol::new("BTC"), inventory: 5, price: 50 },
        ]
    }

    fn setup() -> (Market, Vec<Trader>, Auditor) {
        let l = listings();
        let syms: Vec<Symbol> = l.iter().map(|x| x.symbol.clone()).collect();
        let market = Market::new(&l, 1_000, Box::new(Flat));
        let traders = (0..3).map(|i| Trader::new(TraderId(i), 200, &syms)).collect();
        let auditor = Auditor::new(ConservedTotals::initial(&l, 1_000, 3, 200));
        (market, traders, auditor)
    }

    #[test]
    fn untouched_state_passes() {
        let (mut m, mut t, a) = setup();
        let report = a.audit(&mut m, &mut t);
        assert!(report.passed());
        assert_eq!(report.cash, Check { actual: 1_600, expected: 1_600 });
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn leaked_cash_and_share_are_reported() {
        let (mut m, mut t, a) = setup();
        t[1].credit(7);
        t[2].adjust_holdings(&Symbol::new("BTC"), 1);
        let report = a.audit(&mut m, &mut t);
        assert!(!report.passed());
        assert_eq!(report.failures(), vec!["cash 1607 != 1600".to_string(), "BTC 6 != 5".to_string()]);
        assert!(matches!(report.into_result(), Err(AuditError::Violated(_))));
    }

    #[test]
    fn shared_handles_block_the_audit() {
        let (m, t, a) = setup();
        let m = Arc::new(m);
        let t = Arc::new(t);
        let extra = Arc::clone(&t);
        let err = a.audit_shared(Arc::clone(&m), Arc::clone(&t)).unwrap_err();
        assert!(matches!(err, AuditError::StillShared(_)));
        drop(extra);
        drop(err);
        assert!(a.audit_shared(m, t).unwrap().passed());
    }

    #[test]
    fn report_prints_two_lines_per_quantity() {
        let (mut m, mut t, a) = setup();
        let text = a.audit(&mut m, &mut t).to_string();
        assert_eq!(text.lines().count(), 2 * 3 + 1);
        assert!(text.contains("Expected:    1600  [PASS]"));
    }
}
