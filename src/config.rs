// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : market_sim_rust — concurrent market-maker / trader simulation
Module  : config.rs
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
use std::collections::HashSet;
use std::time::Duration;

use clap::Parser;
use dotenvy::dotenv;
use thiserror::Error;

use crate::domain::{Listing, Symbol};
use crate::market::{Drift, Flat, PriceRule};

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("at least one symbol is required")]
    NoSymbols,
    #[error("duplicate symbol {0}")]
    DuplicateSymbol(String),
    #[error("bad symbol entry '{0}' (expected NAME[:inventory[:price]])")]
    BadListing(String),
    #[error("price for {0} must be >= 1")]
    PriceFloor(String),
    #[error("at least one trader is required")]
    NoTraders,
    #[error("cash must be >= 0 (got {0})")]
    NegativeCash(i64),
    #[error("p2p probability must be within [0, 1] (got {0})")]
    Probability(f64),
    #[error("price step must be within [0, 1e12] (got {0})")]
    PriceStep(i64),
    #[error("unknown strategy '{0}'")]
    Strategy(String),
    #[error("unknown price rule '{0}'")]
    PriceRule(String),
    #[error("price for {0} must be <= 1e12")]
    PriceCeiling(String),
    #[error("total cash (market + traders * initial cash) overflows i64")]
    CashOverflow,
}

/// Harga awal dan price step dibatasi supaya aritmetika harga tetap jauh dari i64::MAX.
pub const MAX_PRICE: i64 = 1_000_000_000_000;

// ===== Strategi =====
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrategyMode {
    Random,
    Contrarian,
}

impl StrategyMode {
    pub fn parse_one(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" | "rand" | "coin" => Some(StrategyMode::Random),
            "contrarian" | "value" | "buy_low" => Some(StrategyMode::Contrarian),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyMode::Random => "random",
            StrategyMode::Contrarian => "contrarian",
        }
    }
}

// ===== Aturan harga =====
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PriceRuleMode {
    Drift { max_step: i64 },
    Flat,
}

impl PriceRuleMode {
    pub fn parse(s: &str, max_step: i64) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drift" => Some(PriceRuleMode::Drift { max_step }),
            "flat" | "fixed" => Some(PriceRuleMode::Flat),
            _ => None,
        }
    }

    pub fn build(&self) -> Box<dyn PriceRule> {
        match *self {
            PriceRuleMode::Drift { max_step } => Box::new(Drift { max_step }),
            PriceRuleMode::Flat => Box::new(Flat),
        }
    }
}

/// Command line, with every flag falling back to an env var (and `.env`).
#[derive(Parser, Debug, Clone)]
#[command(name = "market_sim_rust", version, about = "Concurrent market simulation with conservation audit")]
pub struct Cli {
    #[arg(long, env = "NUM_TRADERS", default_value_t = 10)]
    pub num_traders: u32,
    #[arg(long, env = "INITIAL_CASH", default_value_t = 10_000)]
    pub initial_cash: i64,
    #[arg(long, env = "MARKET_CASH", default_value_t = 1_000_000)]
    pub market_cash: i64,

    /// NAME[:inventory[:price]], comma separated
    #[arg(long, env = "SYMBOLS", default_value = "AAPL,TSLA,BTC")]
    pub symbols: String,
    #[arg(long, env = "INITIAL_INVENTORY", default_value_t = 10_000)]
    pub initial_inventory: u64,
    #[arg(long, env = "INITIAL_PRICE", default_value_t = 100)]
    pub initial_price: i64,

    #[arg(long, env = "P2P_PROBABILITY", default_value_t = 0.01)]
    pub p2p_probability: f64,
    #[arg(long, env = "TRADE_DELAY_MS", default_value_t = 1)]
    pub trade_delay_ms: u64,
    #[arg(long, env = "MONITOR_INTERVAL_MS", default_value_t = 250)]
    pub monitor_interval_ms: u64,
    /// 0 = run until Ctrl-C
    #[arg(long, env = "RUN_SECS", default_value_t = 5)]
    pub run_secs: u64,
    #[arg(long, env = "MAX_ITERATIONS")]
    pub max_iterations: Option<u64>,

    #[arg(long, env = "STRATEGY", default_value = "random")]
    pub strategy: String,
    #[arg(long, env = "MAX_TOLERANCE_PCT", default_value_t = 10)]
    pub max_tolerance_pct: i64,
    #[arg(long, env = "PRICE_RULE", default_value = "drift")]
    pub price_rule: String,
    #[arg(long, env = "PRICE_STEP", default_value_t = 1)]
    pub price_step: i64,
    #[arg(long, env = "SEED")]
    pub seed: Option<u64>,

    /// 0 disables the endpoint
    #[arg(long, env = "METRICS_PORT", default_value_t = 0)]
    pub metrics_port: u16,
    #[arg(long, env = "RECORD_FILE")]
    pub record_file: Option<String>,
}

#[derive(Clone, Debug)]
pub struct MarketSettings {
    pub listings: Vec<Listing>,
    pub cash: i64,
    pub price_rule: PriceRuleMode,
}

#[derive(Clone, Debug)]
pub struct AgentSettings {
    pub trade_delay: Duration,
    pub p2p_probability: f64,
    pub max_iterations: Option<u64>,
    pub strategy: StrategyMode,
    pub max_tolerance_pct: i64,
    pub seed: Option<u64>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            trade_delay: Duration::from_millis(1),
            p2p_probability: 0.01,
            max_iterations: None,
            strategy: StrategyMode::Random,
            max_tolerance_pct: 10,
            seed: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub market: MarketSettings,
    pub num_traders: u32,
    pub initial_cash: i64,
    pub agent: AgentSettings,
    pub monitor_interval: Duration,
    pub run_for: Option<Duration>,
    pub metrics_port: Option<u16>,
    pub record_file: Option<String>,
}

/// SYMBOLS=AAPL,TSLA:500,BTC:20:30000
pub fn parse_listings(raw: &str, inventory: u64, price: i64) -> Result<Vec<Listing>, ConfigError> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for entry in raw.split(',').map(|x| x.trim()).filter(|x| !x.is_empty()) {
        let mut parts = entry.split(':').map(|p| p.trim());
        let name = parts.next().unwrap_or_default().to_ascii_uppercase();
        if name.is_empty() {
            return Err(ConfigError::BadListing(entry.to_string()));
        }
        let inv = match parts.next() {
            Some(p) => p.parse().map_err(|_| ConfigError::BadListing(entry.to_string()))?,
            None => inventory,
        };
        let px: i64 = match parts.next() {
            Some(p) => p.parse().map_err(|_| ConfigError::BadListing(entry.to_string()))?,
            None => price,
        };
        if parts.next().is_some() {
            return Err(ConfigError::BadListing(entry.to_string()));
        }
        if px < 1 {
            return Err(ConfigError::PriceFloor(name));
        }
        if px > MAX_PRICE {
            return Err(ConfigError::PriceCeiling(name));
        }
        if !seen.insert(name.clone()) {
            return Err(ConfigError::DuplicateSymbol(name));
        }
        out.push(Listing { symbol: Symbol::new(&name), inventory: inv, price: px });
    }
    if out.is_empty() {
        return Err(ConfigError::NoSymbols);
    }
    Ok(out)
}

impl TryFrom<Cli> for Settings {
    type Error = ConfigError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let listings = parse_listings(&cli.symbols, cli.initial_inventory, cli.initial_price)?;
        if cli.num_traders == 0 {
            return Err(ConfigError::NoTraders);
        }
        for cash in [cli.initial_cash, cli.market_cash] {
            if cash < 0 {
                return Err(ConfigError::NegativeCash(cash));
            }
        }
        if !(0.0..=1.0).contains(&cli.p2p_probability) {
            return Err(ConfigError::Probability(cli.p2p_probability));
        }
        i64::from(cli.num_traders)
            .checked_mul(cli.initial_cash)
            .and_then(|traders| traders.checked_add(cli.market_cash))
            .ok_or(ConfigError::CashOverflow)?;
        if !(0..=MAX_PRICE).contains(&cli.price_step) {
            return Err(ConfigError::PriceStep(cli.price_step));
        }
        let strategy = StrategyMode::parse_one(&cli.strategy)
            .ok_or_else(|| ConfigError::Strategy(cli.strategy.clone()))?;
        let price_rule = PriceRuleMode::parse(&cli.price_rule, cli.price_step)
            .ok_or_else(|| ConfigError::PriceRule(cli.price_rule.clone()))?;

        Ok(Settings {
            market: MarketSettings { listings, cash: cli.market_cash, price_rule },
            num_traders: cli.num_traders,
            initial_cash: cli.initial_cash,
            agent: AgentSettings {
                trade_delay: Duration::from_millis(cli.trade_delay_ms),
                p2p_probability: cli.p2p_probability,
                max_iterations: cli.max_iterations,
                strategy,
                max_tolerance_pct: cli.max_tolerance_pct,
                seed: cli.seed,
            },
            monitor_interval: Duration::from_millis(cli.monitor_interval_ms.max(1)),
            run_for: (cli.run_secs > 0).then(|| Duration::from_secs(cli.run_secs)),
            metrics_port: (cli.metrics_port > 0).then_some(cli.metrics_port),
            record_file: cli.record_file,
        })
    }
}

pub fn load() -> Result<Settings, ConfigError> {
    // Pastikan .env dibaca sebelum clap melihat env
    let _ = dotenv();
    Settings::try_from(Cli::parse())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["market_sim_rust"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn listings_take_defaults_and_overrides() {
        let l = parse_listings("aapl, TSLA:500 ,btc:20:30000", 10_000, 100).unwrap();
        assert_eq!(l.len(), 3);
        assert_eq!(l[0], Listing { symbol: Symbol::new("AAPL"), inventory: 10_000, price: 100 });
        assert_eq!(l[1].inventory, 500);
        assert_eq!(l[1].price, 100);
        assert_eq!(l[2].price, 30_000);
    }

    #[test]
    fn listings_reject_bad_input() {
        assert_eq!(parse_listings(" , ", 1, 1), Err(ConfigError::NoSymbols));
        assert_eq!(
            parse_listings("AAPL,aapl", 1, 1),
            Err(ConfigError::DuplicateSymbol("AAPL".into()))
        );
        assert_eq!(parse_listings("BTC:1:0", 1, 1), Err(ConfigError::PriceFloor("BTC".into())));
        assert!(matches!(parse_listings("BTC:x", 1, 1), Err(ConfigError::BadListing(_))));
        assert!(matches!(parse_listings("BTC:1:2:3", 1, 1), Err(ConfigError::BadListing(_))));
    }

    #[test]
    fn settings_validate_ranges() {
        let err = Settings::try_from(cli(&["--num-traders", "0"])).unwrap_err();
        assert_eq!(err, ConfigError::NoTraders);
        let err = Settings::try_from(cli(&["--p2p-probability", "1.5"])).unwrap_err();
        assert_eq!(err, ConfigError::Probability(1.5));
        let err = Settings::try_from(cli(&["--strategy", "martingale"])).unwrap_err();
        assert_eq!(err, ConfigError::Strategy("martingale".into()));
    }

    #[test]
    fn settings_reject_values_that_overflow() {
        let err = Settings::try_from(cli(&[
            "--num-traders", "10",
            "--initial-cash", "1000000000000000000",
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::CashOverflow);

        let err = Settings::try_from(cli(&[
            "--market-cash", &i64::MAX.to_string(),
            "--initial-cash", "1",
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::CashOverflow);

        let err = Settings::try_from(cli(&[
            "--symbols", "BTC:1:100000000000000000",
            "--strategy", "contrarian",
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::PriceCeiling("BTC".into()));

        let err = Settings::try_from(cli(&["--price-step", "1000000000001"])).unwrap_err();
        assert_eq!(err, ConfigError::PriceStep(1_000_000_000_001));

        // tepat di batas masih diterima
        let s = Settings::try_from(cli(&["--symbols", "BTC:1:1000000000000"])).unwrap();
        assert_eq!(s.market.listings[0].price, MAX_PRICE);
    }

    #[test]
    fn settings_map_cli_flags() {
        let s = Settings::try_from(cli(&[
            "--num-traders", "4",
            "--symbols", "AAPL,BTC",
            "--strategy", "contrarian",
            "--price-rule", "flat",
            "--run-secs", "0",
            "--metrics-port", "9100",
        ]))
        .unwrap();
        assert_eq!(s.num_traders, 4);
        assert_eq!(s.market.listings.len(), 2);
        assert_eq!(s.agent.strategy, StrategyMode::Contrarian);
        assert_eq!(s.market.price_rule, PriceRuleMode::Flat);
        assert_eq!(s.run_for, None);
        assert_eq!(s.metrics_port, Some(9100));
    }
}
