//! Framed ServerQuery session over TCP.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, trace, warn};

use crate::command::Command;
use crate::error::{QueryError, Result};
use crate::line::LineCodec;
use crate::response::{parse_rows, Response, Status};

/// First line the server sends on a new connection.
pub const BANNER: &str = "TS3";

/// An authenticated-or-not ServerQuery session.
///
/// The protocol is strictly request/response: every method sends one command
/// and reads until that command's status line. The session is stateful on
/// the server side; after [`QueryClient::use_server`] every command targets
/// the selected virtual server.
pub struct QueryClient<S = TcpStream> {
    framed: Framed<S, LineCodec>,
    timeout: Duration,
}

impl QueryClient<TcpStream> {
    /// Connect to `host:port` and consume the greeting.
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| QueryError::Timeout(timeout))??;

        if let Err(e) = Self::enable_keepalive(&stream) {
            warn!("failed to enable TCP keepalive: {}", e);
        }
        stream.set_nodelay(true)?;

        debug!(host = %host, port = port, "connected to ServerQuery endpoint");
        Self::handshake(stream, timeout).await
    }

    fn enable_keepalive(stream: &TcpStream) -> std::io::Result<()> {
        use socket2::{SockRef, TcpKeepalive};

        let sock = SockRef::from(stream);
        let keepalive = TcpKeepalive::new()
            .with_time(Duration::from_secs(120))
            .with_interval(Duration::from_secs(30));

        sock.set_tcp_keepalive(&keepalive)
    }
}

impl<S> QueryClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already connected stream and consume the greeting.
    ///
    /// The server greets with the `TS3` banner followed by one welcome line.
    pub async fn handshake(stream: S, timeout: Duration) -> Result<Self> {
        let mut client = Self {
            framed: Framed::new(stream, LineCodec::new()),
            timeout,
        };

        let banner = client.read_line().await?;
        if banner != BANNER {
            return Err(QueryError::UnexpectedBanner(banner));
        }
        let welcome = client.read_line().await?;
        trace!(welcome = %welcome, "ServerQuery greeting");

        Ok(client)
    }

    /// Send `cmd` and collect its response.
    pub async fn execute(&mut self, cmd: &Command) -> Result<Response> {
        trace!(command = ?cmd, "sending command");
        tokio::time::timeout(self.timeout, self.framed.send(cmd.to_string()))
            .await
            .map_err(|_| QueryError::Timeout(self.timeout))??;

        let mut rows = Vec::new();
        loop {
            let line = self.read_line().await?;
            if let Some(status) = Status::parse(&line)? {
                return Ok(Response { status, rows });
            }
            if line.starts_with("notify") {
                trace!(line = %line, "ignoring notification");
                continue;
            }
            rows.extend(parse_rows(&line));
        }
    }

    /// Authenticate. A rejected login is returned as a non-ok [`Status`].
    pub async fn login(&mut self, username: &str, password: &str) -> Result<Status> {
        self.execute(&Command::login(username, password))
            .await
            .map(|r| r.status)
    }

    /// Select the virtual server targeted by subsequent commands.
    pub async fn use_server(&mut self, sid: u64) -> Result<Status> {
        self.execute(&Command::use_server(sid)).await.map(|r| r.status)
    }

    /// Say goodbye and close the connection.
    ///
    /// The server may drop the socket before or after acknowledging `quit`,
    /// so a closed connection here is not an error.
    pub async fn quit(&mut self) -> Result<()> {
        match self.execute(&Command::quit()).await {
            Ok(_) | Err(QueryError::ConnectionClosed) => {}
            Err(e) => return Err(e),
        }
        // Best effort flush/shutdown of our half.
        let _ = self.framed.close().await;
        Ok(())
    }

    async fn read_line(&mut self) -> Result<String> {
        match tokio::time::timeout(self.timeout, self.framed.next()).await {
            Err(_) => Err(QueryError::Timeout(self.timeout)),
            Ok(None) => Err(QueryError::ConnectionClosed),
            Ok(Some(line)) => line,
        }
    }
}
