// ===============================
// src/main.rs
// ===============================
/*
 cd /home/kukuhtw/rust/market_sim_rust

 # run 10 detik, 20 trader, P2P 5%
 NUM_TRADERS=20 RUN_SECS=10 P2P_PROBABILITY=0.05 cargo run --release

 # metrics
 METRICS_PORT=9898 cargo run
 curl -s localhost:9898/metrics | egrep '^(market_price|trades_total|audit_pass)'
*/
/*
=============================================================================
Project : market_sim_rust — concurrent market-maker / trader simulation
Module  : main.rs
Version : 0.1.0
Author  : Kukuh Tripamungkas Wicaksono (Kukuh TW)
Email   : kukuhtw@gmail.com
WhatsApp: https://wa.me/628129893706
LinkedIn: https://id.linkedin.com/in/kukuhtw
License : MIT (see LICENSE)

Summary : N trader tasks trade against one shared market maker and with each
          other (P2P) under ordered locking, a monitor samples consistent
          snapshots, and an auditor checks cash/share conservation at the end.

(c) 2025 Kukuh TW. All rights reserved where applicable.
=============================================================================
*/
use std::process::ExitCode;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use market_sim::config::{self, Settings};
use market_sim::domain::Event;
use market_sim::metrics;
use market_sim::recorder;
use market_sim::sim::Simulation;

async fn shutdown_signal(settings: &Settings) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(?e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };
    match settings.run_for {
        Some(d) => {
            tokio::select! {
                _ = sleep(d) => info!(secs = d.as_secs(), "run timer elapsed"),
                _ = ctrl_c => info!("ctrl-c"),
            }
        }
        None => ctrl_c.await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // ---- Logging ----
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // ---- Config ----
    let settings = match config::load() {
        Ok(s) => s,
        Err(e) => {
            error!(%e, "invalid configuration");
            return ExitCode::from(2);
        }
    };

    // ---- Metrics ----
    metrics::init();
    if let Some(port) = settings.metrics_port {
        metrics::serve_metrics(port);
    }
    metrics::CONFIG_TRADERS.set(i64::from(settings.num_traders));
    for l in &settings.market.listings {
        metrics::CONFIG_SYMBOL.with_label_values(&[l.symbol.as_str()]).set(1);
    }

    let symbols: Vec<&str> = settings.market.listings.iter().map(|l| l.symbol.as_str()).collect();
    info!(
        traders = settings.num_traders,
        initial_cash = settings.initial_cash,
        market_cash = settings.market.cash,
        symbols = ?symbols,
        strategy = settings.agent.strategy.as_str(),
        price_rule = ?settings.market.price_rule,
        p2p_probability = settings.agent.p2p_probability,
        trade_delay_ms = settings.agent.trade_delay.as_millis() as u64,
        run_for = ?settings.run_for,
        max_iterations = ?settings.agent.max_iterations,
        "startup config"
    );

    // ---- Recorder (optional) ----
    let (rec_tx, rec_task) = match settings.record_file.clone() {
        Some(path) => {
            let (tx, rx) = mpsc::channel::<Event>(8192);
            (Some(tx), Some(tokio::spawn(recorder::run(rx, path))))
        }
        None => (None, None),
    };
    if let Some(tx) = &rec_tx {
        let _ = tx.try_send(Event::Note("market open".into()));
    }

    // ---- Run ----
    info!("--- market open ---");
    let sim = Simulation::new(&settings.market, settings.num_traders, settings.initial_cash);
    let outcome = sim
        .run(
            &settings.agent,
            settings.monitor_interval,
            rec_tx.clone(),
            shutdown_signal(&settings),
        )
        .await;
    info!("--- market closed (audit) ---");

    let code = match outcome {
        Ok(out) => {
            let report = out.audit;
            metrics::AUDIT_PASS.with_label_values(&["cash"]).set(report.cash.passed() as i64);
            for (sym, c) in &report.shares {
                metrics::AUDIT_PASS.with_label_values(&[sym.as_str()]).set(c.passed() as i64);
            }
            if let Some(tx) = &rec_tx {
                let ts_ns = Utc::now().timestamp_nanos_opt().unwrap_or(0) as i128;
                let _ = tx.send(Event::Audit { ts_ns, report: report.clone() }).await;
            }
            println!("{report}");
            info!(
                snapshots = out.monitor.snapshots,
                breaches = out.monitor.breaches.len(),
                buys = out.totals.buys,
                sells = out.totals.sells,
                transfers = out.totals.transfers,
                declined = out.totals.declined,
                failed_agents = out.failed_agents,
                "run summary"
            );
            match report.into_result() {
                Ok(_) if out.failed_agents > 0 => {
                    error!(failed_agents = out.failed_agents, "agent tasks panicked during run");
                    ExitCode::FAILURE
                }
                Ok(_) if out.monitor.breaches.is_empty() => ExitCode::SUCCESS,
                Ok(_) => {
                    error!(breaches = ?out.monitor.breaches, "entity floors breached during run");
                    ExitCode::FAILURE
                }
                Err(e) => {
                    error!(%e, "audit failed");
                    ExitCode::FAILURE
                }
            }
        }
        Err(e) => {
            error!(%e, "audit could not run");
            ExitCode::FAILURE
        }
    };

    // Tutup channel recorder lalu tunggu flush
    drop(rec_tx);
    if let Some(task) = rec_task {
        let _ = task.await;
    }
    code
}
