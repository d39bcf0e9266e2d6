//! Tank Arena Server Library
//!
//! A multiplayer tank battle server speaking the semicolon-delimited
//! command protocol over TCP.
//!
//! # Features
//!
//! - `metrics_server` - HTTP endpoint serving Prometheus/JSON metrics (enabled by default)
//! - `bonus_drops` - Periodic bonus box drops at map bonus points (enabled by default)

pub mod catalog;
pub mod config;
pub mod game;
pub mod handlers;
pub mod lobby;
pub mod metrics;
pub mod net;
pub mod server;
pub mod store;
pub mod util;
