// ===============================
// src/domain.rs
// ===============================
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Instrument name from the fixed set configured at startup.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol(Arc<str>);

impl Symbol {
    pub fn new(name: &str) -> Self { Self(Arc::from(name)) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self { Symbol::new(s) }
}

/// Stable trader identity. The derived `Ord` is the global lock order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TraderId(pub u32);

impl fmt::Display for TraderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "T{}", self.0) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side { Buy, Sell }
impl Side { pub fn as_str(&self) -> &'static str { match self { Side::Buy => "buy", Side::Sell => "sell" } } }

/// Initial state of one tradable instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing { pub symbol: Symbol, pub inventory: u64, pub price: i64 }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeclineReason {
    InsufficientCash,
    OutOfStock,
    MarketIlliquid,
    NoHoldings,
    SelfTrade,
    UnknownSymbol,
    InvalidPrice,
}

impl DeclineReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeclineReason::InsufficientCash => "insufficient_cash",
            DeclineReason::OutOfStock => "out_of_stock",
            DeclineReason::MarketIlliquid => "market_illiquid",
            DeclineReason::NoHoldings => "no_holdings",
            DeclineReason::SelfTrade => "self_trade",
            DeclineReason::UnknownSymbol => "unknown_symbol",
            DeclineReason::InvalidPrice => "invalid_price",
        }
    }
}

/// Result of one trade attempt. A decline is an expected outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeOutcome {
    Filled { price: i64 },
    Declined(DeclineReason),
}

impl TradeOutcome {
    pub fn is_filled(&self) -> bool { matches!(self, TradeOutcome::Filled { .. }) }
    pub fn label(&self) -> &'static str { if self.is_filled() { "filled" } else { "declined" } }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub inventory: BTreeMap<Symbol, u64>,
    pub prices: BTreeMap<Symbol, i64>,
    pub cash: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraderSnapshot {
    pub id: TraderId,
    pub cash: i64,
    pub holdings: BTreeMap<Symbol, u64>,
}

/// Records written by the JSONL recorder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    Snapshot { ts_ns: i128, market: MarketSnapshot },
    Audit { ts_ns: i128, report: crate::audit::AuditReport },
    Note(String),
}
