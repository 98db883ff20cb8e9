// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

use crate::domain::{MarketSnapshot, TradeOutcome};

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Trading activity --------
pub static TRADES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("trades_total", "trade attempts (labels: kind=buy|sell|p2p, outcome)"),
        &["kind", "outcome"],
    )
    .unwrap()
});

pub static DECLINES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(Opts::new("declines_total", "declined trades by reason"), &["reason"])
        .unwrap()
});

// -------- Market state (set by the monitor) --------
pub static MARKET_PRICE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(Opts::new("market_price", "last sampled price"), &["symbol"]).unwrap()
});

pub static MARKET_INVENTORY: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(Opts::new("market_inventory", "last sampled market inventory"), &["symbol"])
        .unwrap()
});

pub static MARKET_CASH: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("market_cash", "last sampled market cash").unwrap());

pub static SNAPSHOTS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("monitor_snapshots_total", "monitor snapshots taken").unwrap());

pub static FLOOR_BREACHES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("floor_breaches_total", "negative cash/holdings/inventory or price < 1 seen")
        .unwrap()
});

// -------- Audit --------
pub static AUDIT_PASS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("audit_pass", "1 if the conserved quantity matched (label: quantity)"),
        &["quantity"],
    )
    .unwrap()
});

// ---- Config visibility ----
pub static CONFIG_TRADERS: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("config_traders", "number of trader tasks").unwrap());

pub static CONFIG_SYMBOL: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(Opts::new("config_symbol", "configured symbols (label: symbol)"), &["symbol"])
        .unwrap()
});

pub fn init() {
    // Register all metrics to the custom registry
    for m in [
        REGISTRY.register(Box::new(TRADES.clone())),
        REGISTRY.register(Box::new(DECLINES.clone())),
        REGISTRY.register(Box::new(MARKET_PRICE.clone())),
        REGISTRY.register(Box::new(MARKET_INVENTORY.clone())),
        REGISTRY.register(Box::new(MARKET_CASH.clone())),
        REGISTRY.register(Box::new(SNAPSHOTS.clone())),
        REGISTRY.register(Box::new(FLOOR_BREACHES.clone())),
        REGISTRY.register(Box::new(AUDIT_PASS.clone())),
        REGISTRY.register(Box::new(CONFIG_TRADERS.clone())),
        REGISTRY.register(Box::new(CONFIG_SYMBOL.clone())),
    ] {
        let _ = m;
    }
}

pub fn record_trade(kind: &str, outcome: &TradeOutcome) {
    TRADES.with_label_values(&[kind, outcome.label()]).inc();
    if let TradeOutcome::Declined(reason) = outcome {
        DECLINES.with_label_values(&[reason.as_str()]).inc();
    }
}

pub fn record_market(snap: &MarketSnapshot) {
    for (sym, px) in &snap.prices {
        MARKET_PRICE.with_label_values(&[sym.as_str()]).set(*px);
    }
    for (sym, qty) in &snap.inventory {
        MARKET_INVENTORY
            .with_label_values(&[sym.as_str()])
            .set(i64::try_from(*qty).unwrap_or(i64::MAX));
    }
    MARKET_CASH.set(snap.cash);
    SNAPSHOTS.inc();
}

// Encode all metrics in Prometheus text format
fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

// Serve one HTTP request (GET / or /metrics) — tiny HTTP 1.1 responder
fn handle_client(mut stream: TcpStream) {
    // Read a bit to consume headers (no full parse)
    let mut _req_buf = [0u8; 1024];
    let _ = stream.read(&mut _req_buf);

    let body = encode_metrics();
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );

    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

/// Metrics server on a dedicated OS thread (keeps the trading runtime clean).
/// Bind failure is logged and the simulation carries on without metrics.
pub fn serve_metrics(port: u16) {
    thread::spawn(move || {
        let addr = format!("0.0.0.0:{port}");
        let listener = match TcpListener::bind(&addr) {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(%addr, error = %e, "metrics bind failed");
                return;
            }
        };
        tracing::info!("metrics listening on http://{addr}/ (and /metrics)");

        for conn in listener.incoming() {
            match conn {
                Ok(stream) => handle_client(stream),
                Err(e) => tracing::warn!(error = %e, "metrics accept error"),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DeclineReason;

    #[test]
    fn declines_are_counted_by_reason() {
        let before = DECLINES.with_label_values(&["self_trade"]).get();
        record_trade("p2p", &TradeOutcome::Declined(DeclineReason::SelfTrade));
        assert!(DECLINES.with_label_values(&["self_trade"]).get() > before);
    }
}
