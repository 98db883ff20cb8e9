// ===============================
// tests/contention.rs (atomicity + deadlock freedom under real parallelism)
// ===============================
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use market_sim::config::{AgentSettings, MarketSettings, PriceRuleMode, StrategyMode};
use market_sim::domain::{Listing, Side, Symbol, TraderId};
use market_sim::engine;
use market_sim::market::{Flat, Market};
use market_sim::monitor::Monitor;
use market_sim::scheduler::{join_agents, stop_channel, Agent, AgentStats};
use market_sim::sim::Simulation;
use market_sim::strategy::{Intent, Strategy};
use market_sim::trader::Trader;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

#[derive(Debug)]
struct AlwaysBuy(Symbol);

impl Strategy for AlwaysBuy {
    fn name(&self) -> &'static str { "always_buy" }
    fn decide(&mut self, _market: &Market, _rng: &mut dyn RngCore) -> Intent {
        Intent::Trade { symbol: self.0.clone(), side: Side::Buy }
    }
}

fn aapl() -> Symbol { Symbol::new("AAPL") }

async fn run_buyers(market: &Arc<Market>, traders: &Arc<Vec<Trader>>, iterations: u64) -> Vec<AgentStats> {
    let (handle, stop) = stop_channel();
    let monitor = Monitor::new(Arc::clone(market), Arc::clone(traders), Duration::from_millis(1));
    let mon_task = tokio::spawn(monitor.run(stop.clone()));

    let settings = AgentSettings {
        trade_delay: Duration::ZERO,
        p2p_probability: 0.0,
        max_iterations: Some(iterations),
        ..AgentSettings::default()
    };
    let handles = (0..traders.len())
        .map(|i| {
            let agent = Agent::new(
                i,
                Arc::clone(market),
                Arc::clone(traders),
                Box::new(AlwaysBuy(aapl())),
                StdRng::seed_from_u64(i as u64),
                settings.clone(),
            );
            tokio::spawn(agent.run(stop.clone()))
        })
        .collect();
    let (stats, failed) = join_agents(handles).await;
    assert_eq!(failed, 0);
    handle.raise();
    let summary = mon_task.await.unwrap();
    assert!(summary.breaches.is_empty(), "{:?}", summary.breaches);
    stats
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn buyers_never_oversell_inventory() {
    const N: u32 = 16;
    let listings = vec![Listing { symbol: aapl(), inventory: N as u64, price: 10 }];
    let market = Arc::new(Market::new(&listings, 0, Box::new(Flat)));
    let traders = Arc::new((0..N).map(|i| Trader::new(TraderId(i), 1_000, &[aapl()])).collect::<Vec<_>>());

    let stats = run_buyers(&market, &traders, 50).await;

    let snap = market.snapshot();
    assert_eq!(snap.inventory[&aapl()], 0);
    assert_eq!(snap.cash, 10 * N as i64);
    let bought: u64 = traders.iter().map(|t| t.holding(&aapl())).sum();
    assert_eq!(bought, N as u64);
    assert_eq!(stats.iter().map(|s| s.buys).sum::<u64>(), N as u64);
    for t in traders.iter() {
        assert_eq!(t.cash(), 1_000 - 10 * t.holding(&aapl()) as i64);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn buyers_stop_at_their_cash_limit() {
    // trader i mampu beli i % 3 lembar; total kemampuan == inventory
    const N: u32 = 12;
    let listings = vec![Listing { symbol: aapl(), inventory: N as u64, price: 10 }];
    let market = Arc::new(Market::new(&listings, 0, Box::new(Flat)));
    let traders = Arc::new(
        (0..N)
            .map(|i| Trader::new(TraderId(i), i64::from(i % 3) * 10, &[aapl()]))
            .collect::<Vec<_>>(),
    );

    run_buyers(&market, &traders, 20).await;

    assert_eq!(market.snapshot().inventory[&aapl()], 0);
    for (i, t) in traders.iter().enumerate() {
        assert_eq!(t.holding(&aapl()), (i % 3) as u64);
        assert_eq!(t.cash(), 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn transfers_only_always_terminate() {
    let market = MarketSettings {
        listings: vec![
            Listing { symbol: aapl(), inventory: 50, price: 5 },
            Listing { symbol: Symbol::new("BTC"), inventory: 50, price: 5 },
        ],
        cash: 10_000,
        price_rule: PriceRuleMode::Drift { max_step: 1 },
    };
    let settings = AgentSettings {
        trade_delay: Duration::ZERO,
        p2p_probability: 1.0,
        max_iterations: Some(3_000),
        strategy: StrategyMode::Random,
        max_tolerance_pct: 10,
        seed: Some(7),
    };
    let sim = Simulation::new(&market, 3, 500);

    let out = tokio::time::timeout(
        Duration::from_secs(60),
        sim.run(&settings, Duration::from_millis(5), None, std::future::pending()),
    )
    .await
    .expect("p2p-heavy run must not deadlock")
    .unwrap();

    assert!(out.audit.passed(), "{}", out.audit);
    assert_eq!(out.totals.iterations, 3 * 3_000);
}

#[test]
fn opposite_direction_transfers_on_os_threads() {
    let syms = [aapl()];
    let traders: Arc<Vec<Trader>> = Arc::new(
        (0..2)
            .map(|i| {
                let t = Trader::new(TraderId(i), 1_000_000, &syms);
                t.adjust_holdings(&aapl(), 1_000);
                t
            })
            .collect(),
    );
    let market = Arc::new(Market::new(
        &[Listing { symbol: aapl(), inventory: 0, price: 3 }],
        0,
        Box::new(Flat),
    ));

    // thread 0: T0 beli dari T1, thread 1: T1 beli dari T0 -> urutan lock terbalik kalau naif
    let workers: Vec<_> = (0..2usize)
        .map(|me| {
            let traders = Arc::clone(&traders);
            let market = Arc::clone(&market);
            thread::spawn(move || {
                let other = 1 - me;
                let mut filled = 0u64;
                for _ in 0..50_000 {
                    if engine::transfer(&market, &traders[me], &traders[other], &aapl()).is_filled() {
                        filled += 1;
                    }
                }
                filled
            })
        })
        .collect();
    let filled: u64 = workers.into_iter().map(|w| w.join().unwrap()).sum();

    assert!(filled > 0);
    let cash: i64 = traders.iter().map(|t| t.cash()).sum();
    let shares: u64 = traders.iter().map(|t| t.holding(&aapl())).sum();
    assert_eq!(cash, 2_000_000);
    assert_eq!(shares, 2_000);
}
