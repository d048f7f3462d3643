//! ServerQuery command construction.
//!
//! ```
//! use ts3_query::Command;
//!
//! let cmd = Command::new("clientlist").flag("uid").flag("away");
//! assert_eq!(cmd.to_string(), "clientlist -uid -away");
//!
//! let login = Command::login("serveradmin", "secret pass");
//! assert_eq!(login.name(), "login");
//! ```

use std::fmt;

use crate::escape::escape_value;

/// Flags requested from `clientlist` to get every user attribute exported.
pub const CLIENTLIST_FLAGS: &[&str] = &[
    "uid", "away", "voice", "times", "groups", "info", "country", "ip", "badges",
];

/// A single ServerQuery command line.
#[derive(Clone, PartialEq, Eq)]
pub struct Command {
    name: String,
    args: Vec<(String, String)>,
    flags: Vec<String>,
    sensitive: bool,
}

impl Command {
    /// Create a command with no arguments.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            flags: Vec::new(),
            sensitive: false,
        }
    }

    /// Add a `key=value` argument. The value is escaped on serialization.
    pub fn arg(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.args.push((key.into(), value.to_string()));
        self
    }

    /// Add a `-flag` option.
    pub fn flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.push(flag.into());
        self
    }

    /// Command name, e.g. `serverinfo`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `login client_login_name=... client_login_password=...`
    pub fn login(username: &str, password: &str) -> Self {
        let mut cmd = Self::new("login")
            .arg("client_login_name", username)
            .arg("client_login_password", password);
        cmd.sensitive = true;
        cmd
    }

    /// `use sid=<id>`: select the virtual server subsequent commands target.
    pub fn use_server(sid: u64) -> Self {
        Self::new("use").arg("sid", sid)
    }

    /// `serverlist`: enumerate virtual servers.
    pub fn serverlist() -> Self {
        Self::new("serverlist")
    }

    /// `serverinfo`: statistics of the selected virtual server.
    pub fn serverinfo() -> Self {
        Self::new("serverinfo")
    }

    /// `clientlist` with every flag in [`CLIENTLIST_FLAGS`].
    pub fn clientlist_extended() -> Self {
        CLIENTLIST_FLAGS
            .iter()
            .fold(Self::new("clientlist"), |cmd, flag| cmd.flag(*flag))
    }

    /// `quit`: close the session.
    pub fn quit() -> Self {
        Self::new("quit")
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (key, value) in &self.args {
            write!(f, " {key}=")?;
            escape_value(f, value)?;
        }
        for flag in &self.flags {
            write!(f, " -{flag}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print credentials
        if self.sensitive {
            return f
                .debug_struct("Command")
                .field("name", &self.name)
                .finish_non_exhaustive();
        }
        write!(f, "Command({self})")
    }
}
