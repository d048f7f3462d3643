//! Online-player presence rows and their reconciliation across cycles.
//!
//! `teamspeak_player_online` has one series per connected user; the label
//! combination *is* the information and the value is always `1`. Prometheus
//! has no notion of a series expiring, so every row published in an earlier
//! cycle but not seen again has to be removed explicitly, or a user who
//! connected once stays "online" for the lifetime of the process.

use std::collections::HashSet;

use ts3_query::Row;

use crate::metrics::MetricsState;

/// Label names of `teamspeak_player_online`, in export order.
pub const PRESENCE_LABELS: [&str; 32] = [
    "virtualserver_name",
    "player_id",
    "nickname",
    "clid",
    "cid",
    "client_database_id",
    "client_nickname",
    "client_type",
    "client_away",
    "client_away_message",
    "client_flag_talking",
    "client_input_muted",
    "client_output_muted",
    "client_input_hardware",
    "client_output_hardware",
    "client_talk_power",
    "client_is_talker",
    "client_is_priority_speaker",
    "client_is_recording",
    "client_is_channel_commander",
    "client_unique_identifier",
    "client_servergroups",
    "client_channel_group_id",
    "client_channel_group_inherited_channel_id",
    "client_version",
    "client_platform",
    "client_idle_time",
    "client_created",
    "client_lastconnected",
    "client_country",
    "connection_client_ip",
    "client_badges",
];

/// Nickname of the query account itself; it shows up in `clientlist`.
pub const SERVER_ADMIN_NICKNAME: &str = "serveradmin";

const CLID: usize = 3;
const CLIENT_NICKNAME: usize = 6;

/// Why a `clientlist` row was not turned into a presence row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowSkip {
    /// No connection id; the client is still connecting or already gone.
    MissingClid,
    /// No display name.
    MissingNickname,
    /// The administrative query account.
    ServerAdmin,
}

/// Label values of one presence series, ordered as [`PRESENCE_LABELS`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PresenceLabels(Vec<String>);

impl PresenceLabels {
    /// Build the label tuple for one `clientlist` row on `server_name`.
    ///
    /// Attributes missing from the row are exported as empty strings.
    pub fn from_client_row(server_name: &str, row: &Row) -> Result<Self, RowSkip> {
        if row.get(PRESENCE_LABELS[CLIENT_NICKNAME]) == Some(SERVER_ADMIN_NICKNAME) {
            return Err(RowSkip::ServerAdmin);
        }
        if row.get_non_empty(PRESENCE_LABELS[CLID]).is_none() {
            return Err(RowSkip::MissingClid);
        }
        if row.get_non_empty(PRESENCE_LABELS[CLIENT_NICKNAME]).is_none() {
            return Err(RowSkip::MissingNickname);
        }

        let mut values = Vec::with_capacity(PRESENCE_LABELS.len());
        values.push(server_name.to_string());
        values.extend(
            PRESENCE_LABELS[1..]
                .iter()
                .map(|label| row.get(label).unwrap_or_default().to_string()),
        );
        Ok(Self(values))
    }

    /// Label values in export order, as `prometheus` wants them.
    pub fn values(&self) -> Vec<&str> {
        self.0.iter().map(String::as_str).collect()
    }

    pub fn virtualserver_name(&self) -> &str {
        &self.0[0]
    }

    pub fn clid(&self) -> &str {
        &self.0[CLID]
    }

    pub fn client_nickname(&self) -> &str {
        &self.0[CLIENT_NICKNAME]
    }
}

/// Result of closing a presence cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileSummary {
    /// Rows removed because their user is gone.
    pub retracted: usize,
    /// Rows published after reconciliation.
    pub published: usize,
}

/// Tracks which presence rows are published and which were seen this cycle.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    published: HashSet<PresenceLabels>,
    current: HashSet<PresenceLabels>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start collecting a new cycle's observations.
    pub fn begin_cycle(&mut self) {
        self.current.clear();
    }

    /// Record a row marked present this cycle. Returns `false` if it was
    /// already observed in this cycle.
    pub fn observe(&mut self, labels: PresenceLabels) -> bool {
        self.current.insert(labels)
    }

    /// Keep the published rows of `server_name` alive for this cycle.
    ///
    /// Used when a server's user list could not be read: its users are
    /// neither confirmed nor known to be gone.
    pub fn carry_forward(&mut self, server_name: &str) -> usize {
        let kept: Vec<_> = self
            .published
            .iter()
            .filter(|labels| labels.virtualserver_name() == server_name)
            .cloned()
            .collect();
        let count = kept.len();
        self.current.extend(kept);
        count
    }

    /// Retract every published row not observed this cycle and publish the
    /// observed set.
    pub fn reconcile(&mut self, metrics: &MetricsState) -> ReconcileSummary {
        let mut retracted = 0;
        for stale in self.published.difference(&self.current) {
            metrics.retract(stale);
            retracted += 1;
        }
        self.published = std::mem::take(&mut self.current);
        ReconcileSummary {
            retracted,
            published: self.published.len(),
        }
    }

    /// End an aborted cycle without retracting anything.
    ///
    /// Rows observed before the abort are already in the registry, so they
    /// join the published set; the next completed cycle retracts them if
    /// their users are gone.
    pub fn abandon_cycle(&mut self) {
        self.published.extend(self.current.drain());
    }

    /// Rows currently published.
    pub fn published(&self) -> &HashSet<PresenceLabels> {
        &self.published
    }
}
