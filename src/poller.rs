//! ServerQuery polling loop.
//!
//! One cycle walks `Disconnected → Connected → Iterating(sid) → Disconnected`:
//!
//! 1. connect and log in (a rejected login aborts the cycle)
//! 2. `serverlist` (a non-ok status aborts the cycle)
//! 3. per virtual server: `use`, `serverinfo` into the scalar gauges,
//!    `clientlist` into the presence rows; failures skip only that server
//!    or that step
//! 4. reconcile presence rows, then `quit` on every exit path
//!
//! Cycles never overlap and an aborted cycle leaves the previously exported
//! values in place until the next tick.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};
use ts3_query::{Command, QueryClient, QueryError, Response, Row};

use crate::catalogue::ScalarMetric;
use crate::config::{SecretString, TeamspeakConfig};
use crate::error::{PollError, PollResult};
use crate::metrics::{CycleOutcome, MetricsState};
use crate::presence::{PresenceLabels, PresenceTracker, ReconcileSummary, RowSkip};

// ============================================================================
// Seams
// ============================================================================

/// A request/response ServerQuery session.
#[async_trait]
pub trait QuerySession: Send {
    /// Send one command and read its complete response.
    async fn execute(&mut self, cmd: &Command) -> Result<Response, QueryError>;

    /// Close the session.
    async fn quit(&mut self) -> Result<(), QueryError>;
}

#[async_trait]
impl QuerySession for QueryClient<TcpStream> {
    async fn execute(&mut self, cmd: &Command) -> Result<Response, QueryError> {
        QueryClient::execute(self, cmd).await
    }

    async fn quit(&mut self) -> Result<(), QueryError> {
        QueryClient::quit(self).await
    }
}

/// Opens a fresh session for every cycle.
#[async_trait]
pub trait Connector: Send + Sync {
    type Session: QuerySession;

    async fn connect(&self) -> Result<Self::Session, QueryError>;
}

/// Connects over TCP to a real ServerQuery endpoint.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpConnector {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Session = QueryClient<TcpStream>;

    async fn connect(&self) -> Result<Self::Session, QueryError> {
        QueryClient::connect(&self.host, self.port, self.timeout).await
    }
}

/// Decides when the next cycle starts.
#[async_trait]
pub trait Scheduler: Send {
    /// Wait for the next cycle. Returning `false` stops the loop.
    async fn tick(&mut self) -> bool;
}

/// Fixed-interval scheduler; ticks forever, the first tick is immediate.
pub struct IntervalScheduler {
    interval: Interval,
}

impl IntervalScheduler {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        // A slow cycle pushes the next one back instead of bursting.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

#[async_trait]
impl Scheduler for IntervalScheduler {
    async fn tick(&mut self) -> bool {
        self.interval.tick().await;
        true
    }
}

/// Runs a fixed number of cycles back to back.
#[derive(Debug, Clone)]
pub struct BoundedScheduler {
    remaining: usize,
}

impl BoundedScheduler {
    pub fn new(ticks: usize) -> Self {
        Self { remaining: ticks }
    }
}

#[async_trait]
impl Scheduler for BoundedScheduler {
    async fn tick(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}

// ============================================================================
// Cycle
// ============================================================================

/// Where the poller is within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Disconnected,
    Connected,
    Iterating(u64),
}

/// A virtual server as listed by `serverlist`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualServer {
    pub id: u64,
    pub name: String,
}

impl VirtualServer {
    fn from_row(row: &Row) -> Option<Self> {
        let id = row.get("virtualserver_id")?.parse().ok()?;
        Some(Self {
            id,
            name: row.get("virtualserver_name").unwrap_or_default().to_string(),
        })
    }
}

/// What one completed cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Virtual servers listed by `serverlist`.
    pub servers: usize,
    /// Queries answered with a non-ok status (or unusable rows).
    pub failed_queries: usize,
    /// Presence rows marked this cycle.
    pub users: usize,
    pub presence: ReconcileSummary,
}

/// Drives polling cycles against one ServerQuery endpoint.
pub struct Poller<C> {
    connector: C,
    username: String,
    password: SecretString,
    metrics: Arc<MetricsState>,
    presence: PresenceTracker,
    /// Name each server's rows were last published under, by sid.
    published_names: HashMap<u64, String>,
    state: CycleState,
}

impl<C: Connector> Poller<C> {
    pub fn new(connector: C, teamspeak: &TeamspeakConfig, metrics: Arc<MetricsState>) -> Self {
        Self {
            connector,
            username: teamspeak.username.clone(),
            password: teamspeak.password.clone(),
            metrics,
            presence: PresenceTracker::new(),
            published_names: HashMap::new(),
            state: CycleState::Disconnected,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    /// Run cycles until the scheduler stops ticking.
    pub async fn run<S: Scheduler>(&mut self, scheduler: &mut S) {
        while scheduler.tick().await {
            info!("Fetching metrics");
            self.run_cycle().await;
        }
    }

    /// Run exactly one cycle. Never fails; errors are logged and counted.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let started = Instant::now();
        self.presence.begin_cycle();

        let result = self.poll_once().await;
        self.transition(CycleState::Disconnected);

        let outcome = match &result {
            Ok(report) => {
                info!(
                    servers = report.servers,
                    users = report.users,
                    retracted = report.presence.retracted,
                    failed_queries = report.failed_queries,
                    "Cycle complete"
                );
                if report.failed_queries == 0 {
                    CycleOutcome::Success
                } else {
                    CycleOutcome::Degraded
                }
            }
            Err(e) => {
                self.presence.abandon_cycle();
                match e {
                    PollError::Authentication { .. } => {
                        error!(
                            error = %e,
                            code = e.error_code(),
                            "Login not successful, retrying next cycle"
                        );
                        CycleOutcome::AuthFailed
                    }
                    PollError::Protocol { .. } => {
                        warn!(
                            error = %e,
                            code = e.error_code(),
                            "Cycle aborted, keeping previous values"
                        );
                        CycleOutcome::Degraded
                    }
                    PollError::Transport(_) => {
                        warn!(
                            error = %e,
                            code = e.error_code(),
                            "Connection lost, keeping previous values"
                        );
                        CycleOutcome::Failed
                    }
                }
            }
        };

        self.metrics.record_cycle(outcome, started.elapsed());
        outcome
    }

    fn transition(&mut self, state: CycleState) {
        trace!(from = ?self.state, to = ?state, "cycle state");
        self.state = state;
    }

    async fn poll_once(&mut self) -> PollResult<CycleReport> {
        let mut session = self.connector.connect().await?;
        self.transition(CycleState::Connected);

        let result = self.scrape(&mut session).await;

        if let Err(e) = session.quit().await {
            debug!(error = %e, "Error while disconnecting");
        }
        result
    }

    async fn scrape(&mut self, session: &mut C::Session) -> PollResult<CycleReport> {
        let login = session
            .execute(&Command::login(&self.username, self.password.expose()))
            .await?;
        if !login.is_ok() {
            return Err(PollError::Authentication {
                username: self.username.clone(),
                status: login.status,
            });
        }

        let servers = self.query(session, Command::serverlist()).await?;
        if !servers.is_ok() {
            return Err(PollError::Protocol {
                command: "serverlist".to_string(),
                status: servers.status,
            });
        }

        let mut report = CycleReport {
            servers: servers.rows.len(),
            ..CycleReport::default()
        };

        for row in &servers.rows {
            let Some(server) = VirtualServer::from_row(row) else {
                warn!(row = ?row, "serverlist row without usable virtualserver_id");
                report.failed_queries += 1;
                continue;
            };
            self.transition(CycleState::Iterating(server.id));
            self.poll_server(session, &server, &mut report).await?;
        }

        report.presence = self.presence.reconcile(&self.metrics);
        Ok(report)
    }

    async fn poll_server(
        &mut self,
        session: &mut C::Session,
        server: &VirtualServer,
        report: &mut CycleReport,
    ) -> PollResult<()> {
        let selected = self.query(session, Command::use_server(server.id)).await?;
        if !selected.is_ok() {
            warn!(sid = server.id, server = %server.name, status = %selected.status, "Error selecting virtual server");
            self.skip_presence(server, report);
            return Ok(());
        }

        let info = self.query(session, Command::serverinfo()).await?;
        let Some(info_row) = info.first().filter(|_| info.is_ok()) else {
            warn!(sid = server.id, server = %server.name, status = %info.status, "Error retrieving serverinfo");
            self.skip_presence(server, report);
            return Ok(());
        };

        let name = info_row
            .get_non_empty("virtualserver_name")
            .unwrap_or(&server.name)
            .to_string();
        self.published_names.insert(server.id, name.clone());

        let mut set = 0;
        for &metric in ScalarMetric::ALL {
            let Some(raw) = info_row.get(metric.name()) else {
                trace!(metric = metric.name(), server = %name, "Field absent from serverinfo");
                continue;
            };
            if self.metrics.set_scalar(metric, &name, raw) {
                set += 1;
            }
        }
        debug!(sid = server.id, server = %name, metrics = set, "Server metrics updated");

        let clients = self.query(session, Command::clientlist_extended()).await?;
        if !clients.is_ok() {
            warn!(sid = server.id, server = %name, status = %clients.status, "Error retrieving clientlist");
            self.skip_presence(server, report);
            return Ok(());
        }

        for row in &clients.rows {
            match PresenceLabels::from_client_row(&name, row) {
                Ok(labels) => {
                    self.metrics.mark_present(&labels);
                    if self.presence.observe(labels) {
                        report.users += 1;
                    }
                }
                Err(RowSkip::ServerAdmin) => {}
                Err(reason) => {
                    debug!(server = %name, reason = ?reason, "Skipping incomplete client row");
                }
            }
        }
        Ok(())
    }

    /// Issue a command, counting non-ok answers. Only transport errors
    /// escape.
    async fn query(&self, session: &mut C::Session, cmd: Command) -> PollResult<Response> {
        let response = session.execute(&cmd).await?;
        if !response.is_ok() {
            self.metrics.record_query_error(cmd.name());
        }
        Ok(response)
    }

    /// Keep a server's previous rows, looked up by the name they were
    /// published under, which may differ from the `serverlist` name.
    fn skip_presence(&mut self, server: &VirtualServer, report: &mut CycleReport) {
        report.failed_queries += 1;
        let server_name = self
            .published_names
            .get(&server.id)
            .map_or(server.name.as_str(), String::as_str);
        let kept = self.presence.carry_forward(server_name);
        if kept > 0 {
            debug!(server = %server_name, rows = kept, "Keeping previous presence rows");
        }
    }
}
