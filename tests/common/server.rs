//! Scripted ServerQuery endpoint.
//!
//! Serves a mutable [`World`] of virtual servers and clients. Tests change
//! the world between cycles to simulate joins, leaves and failures.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use teamspeak_exporter::config::{SecretString, TeamspeakConfig};
use teamspeak_exporter::metrics::MetricsState;
use teamspeak_exporter::poller::{Poller, TcpConnector};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use ts3_query::escape::{escape, unescape};

const GREETING: &str = "TS3\n\rWelcome to the TeamSpeak 3 ServerQuery interface, type \"help\" for a list of commands.\n\r";
const OK: &str = "error id=0 msg=ok";

/// A connected client as reported by `clientlist`.
#[derive(Debug, Clone)]
pub struct ClientFixture {
    pub fields: Vec<(String, String)>,
}

impl ClientFixture {
    pub fn new(clid: u32, nickname: &str) -> Self {
        Self {
            fields: vec![
                ("clid".to_string(), clid.to_string()),
                ("cid".to_string(), "1".to_string()),
                ("client_nickname".to_string(), nickname.to_string()),
                ("client_type".to_string(), "0".to_string()),
            ],
        }
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.fields.push((key.to_string(), value.to_string()));
        self
    }
}

/// A virtual server with its `serverinfo` fields and clients.
#[derive(Debug, Clone)]
pub struct ServerFixture {
    pub id: u64,
    pub name: String,
    pub info: Vec<(String, String)>,
    pub clients: Vec<ClientFixture>,
    /// Status id returned for `serverinfo` instead of data.
    pub serverinfo_error: Option<u32>,
    /// Status id returned for `clientlist` instead of data.
    pub clientlist_error: Option<u32>,
}

impl ServerFixture {
    pub fn new(id: u64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            info: Vec::new(),
            clients: Vec::new(),
            serverinfo_error: None,
            clientlist_error: None,
        }
    }

    pub fn info(mut self, key: &str, value: &str) -> Self {
        self.info.push((key.to_string(), value.to_string()));
        self
    }

    pub fn client(mut self, client: ClientFixture) -> Self {
        self.clients.push(client);
        self
    }
}

/// Everything the endpoint knows.
#[derive(Debug, Clone)]
pub struct World {
    pub username: String,
    pub password: String,
    pub servers: Vec<ServerFixture>,
    /// Status id returned for `serverlist` instead of data.
    pub serverlist_error: Option<u32>,
    /// Drop the connection without answering `use` for this sid.
    pub hang_up_on_use: Option<u64>,
    /// Command names received, across all connections.
    pub received: Vec<String>,
}

impl World {
    pub fn new(servers: Vec<ServerFixture>) -> Self {
        Self {
            username: "serveradmin".to_string(),
            password: "secret".to_string(),
            servers,
            serverlist_error: None,
            hang_up_on_use: None,
            received: Vec::new(),
        }
    }

    pub fn server_mut(&mut self, id: u64) -> &mut ServerFixture {
        self.servers
            .iter_mut()
            .find(|s| s.id == id)
            .expect("no such virtual server")
    }
}

/// A running ServerQuery endpoint on a random local port.
pub struct MockServerQuery {
    addr: SocketAddr,
    world: Arc<Mutex<World>>,
    handle: JoinHandle<()>,
}

impl MockServerQuery {
    pub async fn spawn(world: World) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let world = Arc::new(Mutex::new(world));

        let accept_world = Arc::clone(&world);
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve_session(stream, Arc::clone(&accept_world)));
            }
        });

        Self {
            addr,
            world,
            handle,
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn world(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap()
    }

    /// Connection settings with the world's credentials.
    pub fn teamspeak_config(&self) -> TeamspeakConfig {
        let world = self.world();
        TeamspeakConfig {
            host: "127.0.0.1".to_string(),
            port: self.port(),
            username: world.username.clone(),
            password: SecretString::new(world.password.clone()),
        }
    }

    /// A poller pointed at this endpoint, with a fresh registry.
    pub fn poller(&self) -> (Poller<TcpConnector>, Arc<MetricsState>) {
        let config = self.teamspeak_config();
        let connector = TcpConnector::new(config.host.clone(), config.port, Duration::from_secs(2));
        let metrics = Arc::new(MetricsState::new().unwrap());
        (Poller::new(connector, &config, Arc::clone(&metrics)), metrics)
    }
}

impl Drop for MockServerQuery {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_session(stream: TcpStream, world: Arc<Mutex<World>>) {
    let (read, mut write) = stream.into_split();
    if write.write_all(GREETING.as_bytes()).await.is_err() {
        return;
    }

    let mut lines = BufReader::new(read).lines();
    let mut session = Session::default();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let (reply, quit) = session.handle(line, &mut world.lock().unwrap());
        if write.write_all(reply.as_bytes()).await.is_err() || quit {
            break;
        }
    }
}

#[derive(Default)]
struct Session {
    logged_in: bool,
    selected: Option<u64>,
}

impl Session {
    /// Answer one command line. Returns the wire reply and whether to hang up.
    fn handle(&mut self, line: &str, world: &mut World) -> (String, bool) {
        let mut tokens = line.split(' ');
        let name = tokens.next().unwrap_or_default().to_string();
        let args: Vec<(String, String)> = tokens
            .filter_map(|t| t.split_once('='))
            .map(|(k, v)| (k.to_string(), unescape(v)))
            .collect();
        let arg = |key: &str| args.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str());
        world.received.push(name.clone());

        let reply = match name.as_str() {
            "quit" => return (frame(None, OK), true),
            "login" => {
                if arg("client_login_name") == Some(world.username.as_str())
                    && arg("client_login_password") == Some(world.password.as_str())
                {
                    self.logged_in = true;
                    frame(None, OK)
                } else {
                    frame(None, "error id=520 msg=invalid\\sloginname\\sor\\spassword")
                }
            }
            _ if !self.logged_in => frame(None, "error id=518 msg=not\\slogged\\sin"),
            "serverlist" => match world.serverlist_error {
                Some(id) => frame(None, &error_line(id)),
                None => {
                    let rows: Vec<String> = world
                        .servers
                        .iter()
                        .map(|s| {
                            record(&[
                                ("virtualserver_id".to_string(), s.id.to_string()),
                                ("virtualserver_name".to_string(), s.name.clone()),
                                ("virtualserver_status".to_string(), "online".to_string()),
                            ])
                        })
                        .collect();
                    frame(Some(rows.join("|")).filter(|d| !d.is_empty()), OK)
                }
            },
            "use" => {
                let sid: Option<u64> = arg("sid").and_then(|v| v.parse().ok());
                if sid.is_some() && sid == world.hang_up_on_use {
                    return (String::new(), true);
                }
                match sid.filter(|sid| world.servers.iter().any(|s| s.id == *sid)) {
                    Some(sid) => {
                        self.selected = Some(sid);
                        frame(None, OK)
                    }
                    None => frame(None, "error id=1024 msg=invalid\\sserverID"),
                }
            }
            "serverinfo" | "clientlist" => {
                let Some(server) = self
                    .selected
                    .and_then(|sid| world.servers.iter().find(|s| s.id == sid))
                else {
                    return (frame(None, "error id=1280 msg=no\\sserver\\sselected"), false);
                };
                if name == "serverinfo" {
                    match server.serverinfo_error {
                        Some(id) => frame(None, &error_line(id)),
                        None => {
                            let mut fields =
                                vec![("virtualserver_name".to_string(), server.name.clone())];
                            fields.extend(server.info.iter().cloned());
                            frame(Some(record(&fields)), OK)
                        }
                    }
                } else {
                    match server.clientlist_error {
                        Some(id) => frame(None, &error_line(id)),
                        None if server.clients.is_empty() => frame(
                            None,
                            "error id=1281 msg=database\\sempty\\sresult\\sset",
                        ),
                        None => {
                            let rows: Vec<String> =
                                server.clients.iter().map(|c| record(&c.fields)).collect();
                            frame(Some(rows.join("|")), OK)
                        }
                    }
                }
            }
            _ => frame(None, "error id=256 msg=command\\snot\\sfound"),
        };
        (reply, false)
    }
}

fn record(fields: &[(String, String)]) -> String {
    fields
        .iter()
        .map(|(k, v)| {
            if v.is_empty() {
                k.clone()
            } else {
                format!("{k}={}", escape(v))
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn error_line(id: u32) -> String {
    format!("error id={id} msg=injected\\sfailure")
}

fn frame(data: Option<String>, status: &str) -> String {
    match data {
        Some(data) => format!("{data}\n\r{status}\n\r"),
        None => format!("{status}\n\r"),
    }
}
