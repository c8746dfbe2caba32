//! procwatch: alerts chat recipients about newly started processes

pub mod batcher;
pub mod collector;
pub mod commands;
pub mod config;
pub mod db;
pub mod detector;
pub mod filter;
pub mod messages;
pub mod notifier;
pub mod pipeline;
pub mod protocol;
pub mod recipient;
pub mod state;
pub mod stats;
pub mod transport;
