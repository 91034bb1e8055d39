//! QuantLab Core — deterministic backtest simulation engine.
//!
//! This crate contains the heart of the platform:
//! - Domain types (symbols, bars, fills, positions, the ledger, snapshots)
//! - Trading calendar provider with a process-wide cache
//! - Price/factor batch providers and the shared factor cache
//! - The day-stepped simulation loop with as-of views (no look-ahead by
//!   construction)
//! - Strategy trait and the tagged-kind factory
//!
//! The loop is strictly sequential and admits no wall-clock or unseeded
//! random state, so re-running a configuration reproduces its snapshot
//! sequence byte for byte.

pub mod calendar;
pub mod data;
pub mod domain;
pub mod engine;
pub mod rng;
pub mod strategy;
