// ===============================
// src/scheduler.rs (trader agents)
// ===============================
//
// Satu task per trader:
//   LOOP { strategi -> trade ke market; peluang kecil P2P ke peer acak; idle }
// Stop signal dicek di awal iterasi dan saat idle, tidak pernah di tengah
// critical section (engine sinkron, tanpa .await).
//
use std::sync::Arc;

use futures_util::future::join_all;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error};

use crate::config::AgentSettings;
use crate::domain::{Listing, TradeOutcome};
use crate::engine;
use crate::market::Market;
use crate::metrics::record_trade;
use crate::strategy::{self, Intent, Strategy};
use crate::trader::Trader;

// ---- Stop signal ----

pub struct StopHandle(watch::Sender<bool>);

impl StopHandle {
    pub fn raise(&self) {
        self.0.send_replace(true);
    }
}

/// Cloneable view of the global stop flag. A dropped [`StopHandle`] counts as raised.
#[derive(Clone)]
pub struct StopSignal(watch::Receiver<bool>);

impl StopSignal {
    pub fn is_raised(&self) -> bool {
        *self.0.borrow() || self.0.has_changed().is_err()
    }

    /// Resolves once the flag is raised.
    pub async fn raised(&mut self) {
        loop {
            let up = *self.0.borrow_and_update();
            if up || self.0.changed().await.is_err() {
                return;
            }
        }
    }
}

pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle(tx), StopSignal(rx))
}

// ---- Agent ----

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgentStats {
    pub iterations: u64,
    pub buys: u64,
    pub sells: u64,
    pub transfers: u64,
    pub holds: u64,
    pub declined: u64,
}

impl AgentStats {
    fn record(&mut self, kind: &str, out: &TradeOutcome) {
        record_trade(kind, out);
        if !out.is_filled() {
            self.declined += 1;
            return;
        }
        match kind {
            "buy" => self.buys += 1,
            "sell" => self.sells += 1,
            _ => self.transfers += 1,
        }
    }

    pub fn merge(&mut self, other: &AgentStats) {
        self.iterations += other.iterations;
        self.buys += other.buys;
        self.sells += other.sells;
        self.transfers += other.transfers;
        self.holds += other.holds;
        self.declined += other.declined;
    }
}

pub struct Agent {
    index: usize,
    market: Arc<Market>,
    traders: Arc<Vec<Trader>>,
    strategy: Box<dyn Strategy>,
    rng: StdRng,
    settings: AgentSettings,
}

impl Agent {
    pub fn new(
        index: usize,
        market: Arc<Market>,
        traders: Arc<Vec<Trader>>,
        strategy: Box<dyn Strategy>,
        rng: StdRng,
        settings: AgentSettings,
    ) -> Self {
        Self { index, market, traders, strategy, rng, settings }
    }

    fn me(&self) -> &Trader { &self.traders[self.index] }

    /// Any index except our own, uniformly. `None` when we are alone.
    fn pick_peer(&mut self) -> Option<usize> {
        let n = self.traders.len();
        if n < 2 {
            return None;
        }
        let j = self.rng.gen_range(0..n - 1);
        Some(if j >= self.index { j + 1 } else { j })
    }

    /// One loop iteration, without the idle delay.
    pub fn step(&mut self, stats: &mut AgentStats) {
        stats.iterations += 1;

        let intent = self.strategy.decide(&self.market, &mut self.rng);
        let symbol = match intent {
            Intent::Trade { symbol, side } => {
                let out = engine::trade_with_market(
                    &self.market,
                    &self.traders[self.index],
                    &symbol,
                    side,
                    &mut self.rng,
                );
                stats.record(side.as_str(), &out);
                Some(symbol)
            }
            Intent::Hold => {
                stats.holds += 1;
                None
            }
        };

        if !self.rng.gen_bool(self.settings.p2p_probability) {
            return;
        }
        let Some(peer) = self.pick_peer() else { return };
        // Hold -> tetap P2P di simbol acak
        let Some(symbol) = symbol.or_else(|| self.market.symbols().choose(&mut self.rng).cloned())
        else {
            return;
        };
        let out = engine::transfer(&self.market, self.me(), &self.traders[peer], &symbol);
        stats.record("p2p", &out);
    }

    pub async fn run(mut self, mut stop: StopSignal) -> AgentStats {
        let mut stats = AgentStats::default();
        let delay = self.settings.trade_delay;
        loop {
            if stop.is_raised() {
                break;
            }
            if self.settings.max_iterations.is_some_and(|max| stats.iterations >= max) {
                break;
            }
            self.step(&mut stats);

            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = stop.raised() => break,
                }
            }
        }
        debug!(trader = %self.me().id(), strategy = self.strategy.name(), ?stats, "agent stopped");
        stats
    }
}

fn agent_rng(seed: Option<u64>, index: usize) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s.wrapping_add(index as u64)),
        None => StdRng::from_entropy(),
    }
}

/// One task per trader in `traders`, on the current runtime.
pub fn spawn_agents(
    market: &Arc<Market>,
    traders: &Arc<Vec<Trader>>,
    listings: &[Listing],
    settings: &AgentSettings,
    stop: &StopSignal,
) -> Vec<JoinHandle<AgentStats>> {
    (0..traders.len())
        .map(|index| {
            let mut rng = agent_rng(settings.seed, index);
            let strat = strategy::build(settings.strategy, listings, settings.max_tolerance_pct, &mut rng);
            let agent = Agent::new(
                index,
                Arc::clone(market),
                Arc::clone(traders),
                strat,
                rng,
                settings.clone(),
            );
            tokio::spawn(agent.run(stop.clone()))
        })
        .collect()
}

/// Wait for every agent. Returns the stats of the agents that finished and the
/// number of tasks that panicked or were cancelled; a failed task contributes
/// no stats and must be reported by the caller.
pub async fn join_agents(handles: Vec<JoinHandle<AgentStats>>) -> (Vec<AgentStats>, usize) {
    let mut stats = Vec::with_capacity(handles.len());
    let mut failed = 0;
    for r in join_all(handles).await {
        match r {
            Ok(s) => stats.push(s),
            Err(e) => {
                error!(?e, "agent task failed");
                failed += 1;
            }
        }
    }
    (stats, failed)
}
