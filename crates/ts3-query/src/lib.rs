//! # ts3-query
//!
//! A small async client for the TeamSpeak 3 ServerQuery interface, the
//! line-based administrative protocol served on port 10011 by default.
//!
//! Only the command/response core is implemented: connect, log in, select a
//! virtual server, issue commands and read their rows and status. Event
//! notifications are skipped.
//!
//! ```no_run
//! use std::time::Duration;
//! use ts3_query::{Command, QueryClient};
//!
//! # async fn run() -> ts3_query::Result<()> {
//! let mut client = QueryClient::connect("localhost", 10011, Duration::from_secs(5)).await?;
//! if client.login("serveradmin", "secret").await?.is_ok() {
//!     let servers = client.execute(&Command::serverlist()).await?;
//!     for row in &servers.rows {
//!         println!("{:?}", row.get("virtualserver_name"));
//!     }
//! }
//! client.quit().await?;
//! # Ok(())
//! # }
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod client;
pub mod command;
pub mod error;
pub mod escape;
pub mod line;
pub mod response;

pub use self::client::QueryClient;
pub use self::command::Command;
pub use self::error::{QueryError, Result};
pub use self::response::{Response, Row, Status};
