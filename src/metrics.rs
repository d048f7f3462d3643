//! Prometheus metrics registry for the exporter.
//!
//! Holds every series exported on `/metrics`:
//!
//! - `teamspeak_<serverinfo field>{virtualserver_name}` - one gauge per
//!   [`ScalarMetric`] catalogue entry
//! - `teamspeak_player_online{virtualserver_name, clid, ...}` - one series
//!   per connected user, value always 1
//! - `teamspeak_exporter_*` - health of the polling loop itself
//!
//! The state is built once at startup and shared by reference; the HTTP
//! server only ever gathers it.

use std::collections::HashMap;
use std::time::Duration;

use prometheus::{
    Encoder, GaugeVec, Histogram, HistogramOpts, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use tracing::{debug, warn};

use crate::catalogue::ScalarMetric;
use crate::presence::{PRESENCE_LABELS, PresenceLabels};

/// How a polling cycle ended, for `teamspeak_exporter_scrape_cycles_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Every server was read.
    Success,
    /// Completed, but at least one query failed.
    Degraded,
    /// Login rejected.
    AuthFailed,
    /// Aborted by a transport error.
    Failed,
}

impl CycleOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Degraded => "degraded",
            Self::AuthFailed => "auth_failed",
            Self::Failed => "failed",
        }
    }
}

/// Registry plus handles to every metric family.
pub struct MetricsState {
    registry: Registry,
    scalars: HashMap<ScalarMetric, GaugeVec>,
    player_online: IntGaugeVec,
    cycles: IntCounterVec,
    query_errors: IntCounterVec,
    cycle_duration: Histogram,
}

impl MetricsState {
    /// Create and register all metric families.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        // Helper macro to register metric
        macro_rules! register {
            ($init:expr) => {{
                let m = $init?;
                registry.register(Box::new(m.clone()))?;
                m
            }};
        }

        let mut scalars = HashMap::with_capacity(ScalarMetric::ALL.len());
        for &metric in ScalarMetric::ALL {
            let name = metric.metric_name();
            let gauge = register!(GaugeVec::new(
                Opts::new(name.as_str(), name.as_str()),
                &["virtualserver_name"]
            ));
            debug!(metric = %name, "Initialized gauge");
            scalars.insert(metric, gauge);
        }

        let player_online = register!(IntGaugeVec::new(
            Opts::new("teamspeak_player_online", "Online players"),
            &PRESENCE_LABELS
        ));
        let cycles = register!(IntCounterVec::new(
            Opts::new(
                "teamspeak_exporter_scrape_cycles_total",
                "ServerQuery polling cycles by outcome"
            ),
            &["outcome"]
        ));
        let query_errors = register!(IntCounterVec::new(
            Opts::new(
                "teamspeak_exporter_query_errors_total",
                "ServerQuery commands answered with a non-ok status"
            ),
            &["command"]
        ));
        let cycle_duration = register!(Histogram::with_opts(
            HistogramOpts::new(
                "teamspeak_exporter_scrape_duration_seconds",
                "Duration of one ServerQuery polling cycle"
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0])
        ));

        Ok(Self {
            registry,
            scalars,
            player_online,
            cycles,
            query_errors,
            cycle_duration,
        })
    }

    /// Set a scalar metric for one virtual server from its raw wire value.
    ///
    /// Unparsable values leave the series untouched. Returns whether the
    /// series was written.
    pub fn set_scalar(&self, metric: ScalarMetric, server: &str, raw: &str) -> bool {
        let Some(value) = metric.kind().parse(raw) else {
            warn!(
                metric = metric.name(),
                server = %server,
                raw = %raw,
                kind = ?metric.kind(),
                "Value does not parse as declared kind, not set"
            );
            return false;
        };
        match self.scalars.get(&metric) {
            Some(gauge) => {
                gauge.with_label_values(&[server]).set(value);
                true
            }
            None => {
                warn!(metric = metric.name(), "Metric missing from registry");
                false
            }
        }
    }

    /// Current value of a scalar series, if it has ever been set.
    pub fn scalar(&self, metric: ScalarMetric, server: &str) -> Option<f64> {
        // Looking the series up through the vec would create it.
        let name = metric.metric_name();
        let families = self.registry.gather();
        families
            .iter()
            .filter(|family| family.get_name() == name)
            .flat_map(|family| family.get_metric())
            .find(|m| m.get_label().iter().any(|l| l.get_value() == server))
            .map(|m| m.get_gauge().get_value())
    }

    /// Mark a user as present. Idempotent.
    pub fn mark_present(&self, labels: &PresenceLabels) {
        self.player_online.with_label_values(&labels.values()).set(1);
    }

    /// Remove a user's presence series entirely.
    pub fn retract(&self, labels: &PresenceLabels) {
        if let Err(e) = self.player_online.remove_label_values(&labels.values()) {
            debug!(
                server = %labels.virtualserver_name(),
                clid = %labels.clid(),
                error = %e,
                "Presence row already gone"
            );
        }
    }

    /// Number of `teamspeak_player_online` series currently exported.
    pub fn presence_rows(&self) -> usize {
        self.registry
            .gather()
            .iter()
            .filter(|family| family.get_name() == "teamspeak_player_online")
            .map(|family| family.get_metric().len())
            .sum()
    }

    /// Record a finished polling cycle.
    pub fn record_cycle(&self, outcome: CycleOutcome, elapsed: Duration) {
        self.cycles.with_label_values(&[outcome.as_str()]).inc();
        self.cycle_duration.observe(elapsed.as_secs_f64());
    }

    /// Record a command answered with a non-ok status.
    pub fn record_query_error(&self, command: &str) {
        self.query_errors.with_label_values(&[command]).inc();
    }

    /// Gather all metrics and encode them in Prometheus text format.
    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = vec![];
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!(error = %e, "Failed to encode Prometheus metrics");
            return String::new();
        }
        match String::from_utf8(buffer) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
                String::new()
            }
        }
    }
}
