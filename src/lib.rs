// ===============================
// src/lib.rs
// ===============================
pub mod audit;
pub mod config;
pub mod domain;
pub mod engine;
pub mod market;
pub mod metrics;
pub mod monitor;
pub mod recorder;
pub mod scheduler;
pub mod sim;
pub mod strategy;
pub mod trader;
