//! teamspeak-exporter - TeamSpeak 3 ServerQuery to Prometheus bridge.
//!
//! Polls every virtual server behind one ServerQuery endpoint and exposes
//! per-server statistics and per-client presence as Prometheus gauges.

pub mod catalogue;
pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod poller;
pub mod presence;
