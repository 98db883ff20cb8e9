// ===============================
// src/sim.rs (wiring: market + traders + agents + monitor + audit)
// ===============================
use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Duration;
use tracing::{error, info};

use crate::audit::{AuditError, AuditReport, Auditor, ConservedTotals};
use crate::config::{AgentSettings, MarketSettings};
use crate::domain::{Event, Listing, Symbol, TraderId};
use crate::market::Market;
use crate::monitor::{Monitor, MonitorSummary};
use crate::scheduler::{join_agents, spawn_agents, stop_channel, AgentStats};
use crate::trader::Trader;

#[derive(Debug)]
pub struct SimOutcome {
    pub agents: Vec<AgentStats>,
    /// Agent tasks that panicked; their trades are still covered by the audit.
    pub failed_agents: usize,
    pub totals: AgentStats,
    pub monitor: MonitorSummary,
    pub audit: AuditReport,
}

pub struct Simulation {
    listings: Vec<Listing>,
    market: Arc<Market>,
    traders: Arc<Vec<Trader>>,
    auditor: Auditor,
}

impl Simulation {
    pub fn new(market: &MarketSettings, num_traders: u32, initial_cash: i64) -> Self {
        let listings = market.listings.clone();
        let symbols: Vec<Symbol> = listings.iter().map(|l| l.symbol.clone()).collect();
        let traders = (0..num_traders)
            .map(|i| Trader::new(TraderId(i), initial_cash, &symbols))
            .collect();
        let auditor = Auditor::new(ConservedTotals::initial(
            &listings,
            market.cash,
            num_traders,
            initial_cash,
        ));
        Self {
            market: Arc::new(Market::new(&listings, market.cash, market.price_rule.build())),
            traders: Arc::new(traders),
            listings,
            auditor,
        }
    }

    pub fn market(&self) -> &Arc<Market> { &self.market }

    pub fn traders(&self) -> &Arc<Vec<Trader>> { &self.traders }

    pub fn expected(&self) -> &ConservedTotals { self.auditor.expected() }

    /// Run until every agent hits its iteration cap or `shutdown` resolves,
    /// then stop the monitor, join everything and audit.
    pub async fn run<F>(
        self,
        agent: &AgentSettings,
        monitor_every: Duration,
        rec_tx: Option<mpsc::Sender<Event>>,
        shutdown: F,
    ) -> Result<SimOutcome, AuditError>
    where
        F: Future<Output = ()>,
    {
        let (handle, stop) = stop_channel();

        let mut monitor = Monitor::new(Arc::clone(&self.market), Arc::clone(&self.traders), monitor_every);
        if let Some(tx) = rec_tx {
            monitor = monitor.with_recorder(tx);
        }
        let mon_task = tokio::spawn(monitor.run(stop.clone()));

        let handles = spawn_agents(&self.market, &self.traders, &self.listings, agent, &stop);
        info!(agents = handles.len(), "trading started");

        let agents_done = join_agents(handles);
        tokio::pin!(agents_done);
        let early = tokio::select! {
            stats = &mut agents_done => Some(stats),
            _ = shutdown => None,
        };
        let (agents, failed_agents) = match early {
            Some(joined) => joined,
            None => {
                info!("stop requested, waiting for agents");
                handle.raise();
                agents_done.await
            }
        };
        handle.raise();

        let monitor = match mon_task.await {
            Ok(summary) => summary,
            Err(e) => {
                error!(?e, "monitor task failed");
                MonitorSummary::default()
            }
        };

        let mut totals = AgentStats::default();
        for s in &agents {
            totals.merge(s);
        }
        if failed_agents > 0 {
            error!(failed_agents, "some agent tasks failed");
        }
        info!(?totals, "trading stopped");

        let Simulation { market, traders, auditor, .. } = self;
        let audit = auditor.audit_shared(market, traders)?;
        Ok(SimOutcome { agents, failed_agents, totals, monitor, audit })
    }
}
