//! Launch Detection and Decision Pipeline
//!
//! Watches Solana DEX-launchpad on-chain log streams, reconstructs per-token
//! early microstructure, and emits unitary buy decisions through an
//! observation gate, a safety gate, and heat-adjusted conviction scoring.

pub mod alerts;
pub mod cli;
pub mod config;
pub mod counters;
pub mod entry;
pub mod error;
pub mod heat;
pub mod microstructure;
pub mod origin;
pub mod parser;
pub mod pipeline;
pub mod safety;
pub mod scoring;
pub mod status;
pub mod store;
pub mod tx_introspect;
pub mod validator;
pub mod watcher;

pub use config::Config;
pub use error::{Error, Result};
