// ===============================
// src/monitor.rs (periodic read-only sampling)
// ===============================
//
// Lock hanya dipegang selama copy (Market::snapshot / Trader::snapshot).
// Logging, metrics dan recorder dikerjakan setelah semua lock dilepas.
//
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

use crate::domain::{Event, MarketSnapshot, Symbol, TraderId, TraderSnapshot};
use crate::market::Market;
use crate::metrics::{record_market, FLOOR_BREACHES};
use crate::scheduler::StopSignal;
use crate::trader::Trader;

/// Entity floor seen broken in a snapshot. Quantities are unsigned, so only
/// trader cash and prices can breach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FloorBreach {
    PriceBelowOne { symbol: Symbol, price: i64 },
    NegativeCash { trader: TraderId, cash: i64 },
}

pub fn check_floors(market: &MarketSnapshot, traders: &[TraderSnapshot]) -> Vec<FloorBreach> {
    let mut out: Vec<FloorBreach> = market
        .prices
        .iter()
        .filter(|(_, px)| **px < 1)
        .map(|(s, px)| FloorBreach::PriceBelowOne { symbol: s.clone(), price: *px })
        .collect();
    out.extend(
        traders
            .iter()
            .filter(|t| t.cash < 0)
            .map(|t| FloorBreach::NegativeCash { trader: t.id, cash: t.cash }),
    );
    out
}

#[derive(Debug, Clone, Default)]
pub struct MonitorSummary {
    pub snapshots: u64,
    pub breaches: Vec<FloorBreach>,
    pub last: Option<MarketSnapshot>,
}

pub struct Monitor {
    market: Arc<Market>,
    traders: Arc<Vec<Trader>>,
    every: Duration,
    rec_tx: Option<mpsc::Sender<Event>>,
}

impl Monitor {
    pub fn new(market: Arc<Market>, traders: Arc<Vec<Trader>>, every: Duration) -> Self {
        Self { market, traders, every, rec_tx: None }
    }

    pub fn with_recorder(mut self, tx: mpsc::Sender<Event>) -> Self {
        self.rec_tx = Some(tx);
        self
    }

    /// One sample: market under one lock, then each trader under its own.
    pub fn sample(&self) -> (MarketSnapshot, Vec<TraderSnapshot>) {
        let market = self.market.snapshot();
        let traders = self.traders.iter().map(Trader::snapshot).collect();
        (market, traders)
    }

    fn report(&self, market: &MarketSnapshot, traders: &[TraderSnapshot]) {
        record_market(market);
        for (sym, px) in &market.prices {
            let inv = market.inventory.get(sym).copied().unwrap_or(0);
            info!(symbol = %sym, price = px, inventory = inv, "market");
        }
        let trader_cash: i64 = traders.iter().map(|t| t.cash).sum();
        info!(market_cash = market.cash, trader_cash, "liquidity");

        if let Some(tx) = &self.rec_tx {
            let ts_ns = Utc::now().timestamp_nanos_opt().unwrap_or(0) as i128;
            let _ = tx.try_send(Event::Snapshot { ts_ns, market: market.clone() });
        }
    }

    /// Sample every `every` until the stop signal. Never awaits while a lock is held.
    pub async fn run(self, mut stop: StopSignal) -> MonitorSummary {
        let mut summary = MonitorSummary::default();
        let mut tick = interval(self.every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {}
                _ = stop.raised() => break,
            }
            let (market, traders) = self.sample();
            let breaches = check_floors(&market, &traders);
            for b in &breaches {
                error!(breach = ?b, "entity floor breached");
                FLOOR_BREACHES.inc();
            }
            self.report(&market, &traders);
            summary.snapshots += 1;
            summary.breaches.extend(breaches);
            summary.last = Some(market);
        }
        info!(snapshots = summary.snapshots, "monitor stopped");
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Listing;
    use crate::market::Flat;
    use crate::scheduler::stop_channel;
    use std::collections::BTreeMap;

    #[test]
    fn floors_flag_negative_cash_and_zero_price() {
        let mut prices = BTreeMap::new();
        prices.insert(Symbol::new("AAPL"), 0);
        prices.insert(Symbol::new("BTC"), 3);
        let market = MarketSnapshot { inventory: BTreeMap::new(), prices, cash: 0 };
        let traders = vec![
            TraderSnapshot { id: TraderId(0), cash: 5, holdings: BTreeMap::new() },
            TraderSnapshot { id: TraderId(1), cash: -1, holdings: BTreeMap::new() },
        ];
        assert_eq!(
            check_floors(&market, &traders),
            vec![
                FloorBreach::PriceBelowOne { symbol: Symbol::new("AAPL"), price: 0 },
                FloorBreach::NegativeCash { trader: TraderId(1), cash: -1 },
            ]
        );
    }

    #[tokio::test]
    async fn stops_on_signal_and_counts_samples() {
        let listings = vec![Listing { symbol: Symbol::new("AAPL"), inventory: 3, price: 10 }];
        let market = Arc::new(Market::new(&listings, 100, Box::new(Flat)));
        let traders = Arc::new(vec![Trader::new(TraderId(0), 10, &[Symbol::new("AAPL")])]);
        let (handle, stop) = stop_channel();

        let mon = Monitor::new(market, traders, Duration::from_millis(5));
        let task = tokio::spawn(mon.run(stop));
        tokio::time::sleep(Duration::from_millis(40)).await;
        handle.raise();
        let summary = task.await.unwrap();

        assert!(summary.snapshots >= 1);
        assert!(summary.breaches.is_empty());
        assert_eq!(summary.last.unwrap().inventory[&Symbol::new("AAPL")], 3);
    }
}
