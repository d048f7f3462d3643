//! ServerQuery response types and parsing.
//!
//! A response is zero or more data lines followed by exactly one status
//! line:
//!
//! ```text
//! virtualserver_id=1 virtualserver_name=Alpha|virtualserver_id=2 virtualserver_name=Beta
//! error id=0 msg=ok
//! ```
//!
//! Rows are separated by `|`, fields by spaces. A field is `key=value` or a
//! bare `key`, which is read as an empty value.

use std::collections::BTreeMap;

use crate::error::{QueryError, Result};
use crate::escape::unescape;

/// Status id reported on success.
pub const STATUS_OK: u32 = 0;

/// Status id for "database empty result set"; a successful query with no rows.
pub const STATUS_EMPTY_RESULT: u32 = 1281;

/// The `error id=... msg=...` line terminating every response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    /// Numeric status id, `0` on success.
    pub id: u32,
    /// Human readable message, unescaped.
    pub msg: String,
    /// Optional `extra_msg` detail.
    pub extra_msg: Option<String>,
}

impl Status {
    /// Successful status.
    pub fn ok() -> Self {
        Self {
            id: STATUS_OK,
            msg: "ok".to_string(),
            extra_msg: None,
        }
    }

    /// Whether the command succeeded. An empty result set counts as success.
    pub fn is_ok(&self) -> bool {
        self.id == STATUS_OK || self.id == STATUS_EMPTY_RESULT
    }

    /// Parse a status line. Returns `Ok(None)` if the line is not a status
    /// line at all.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let Some(rest) = line.strip_prefix("error ") else {
            return Ok(None);
        };
        let fields = parse_row(rest);
        let id = fields
            .get("id")
            .and_then(|id| id.parse::<u32>().ok())
            .ok_or_else(|| QueryError::MalformedStatus(line.to_string()))?;
        Ok(Some(Self {
            id,
            msg: fields.get("msg").map(str::to_string).unwrap_or_default(),
            extra_msg: fields.get("extra_msg").map(str::to_string),
        }))
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "id={} msg={}", self.id, self.msg)?;
        if let Some(extra) = &self.extra_msg {
            write!(f, " ({extra})")?;
        }
        Ok(())
    }
}

/// One record of a response: field name to unescaped value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row(BTreeMap<String, String>);

impl Row {
    /// Look up a field.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Look up a field, treating an empty value as absent.
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    /// Whether the row has a field with this name.
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the row has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A complete response to one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Terminating status.
    pub status: Status,
    /// Data rows, possibly empty.
    pub rows: Vec<Row>,
}

impl Response {
    /// Whether the command succeeded.
    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }

    /// First data row, if any.
    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }
}

/// Parse one data line into its rows.
pub fn parse_rows(line: &str) -> Vec<Row> {
    line.split('|').map(parse_row).filter(|r| !r.is_empty()).collect()
}

fn parse_row(record: &str) -> Row {
    Row(record
        .split(' ')
        .filter(|field| !field.is_empty())
        .map(|field| match field.split_once('=') {
            Some((key, value)) => (key.to_string(), unescape(value)),
            None => (field.to_string(), String::new()),
        })
        .collect())
}
