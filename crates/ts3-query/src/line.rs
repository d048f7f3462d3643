//! Line-based codec for tokio.
//!
//! ServerQuery terminates server lines with `\n\r` (the carriage return leads
//! the *next* line), so the decoder splits on `\n` and trims `\r` from both
//! ends. Blank lines are skipped.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{QueryError, Result};

/// Default maximum line length. A whole `clientlist` answer arrives as one
/// line; with every flag set each client adds roughly 700 bytes, so this
/// leaves room for several thousand clients.
pub const MAX_LINE_LEN: usize = 4 * 1024 * 1024;

/// Line codec that handles newline-terminated ServerQuery lines.
pub struct LineCodec {
    /// Index of next byte to check for newline
    next_index: usize,
    /// Maximum line length
    max_len: usize,
}

impl LineCodec {
    /// Create a new codec with the default line limit.
    pub fn new() -> Self {
        Self::with_max_len(MAX_LINE_LEN)
    }

    /// Create a new codec with custom max line length.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            next_index: 0,
            max_len,
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = QueryError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        loop {
            let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
                // No complete line yet - remember where we stopped
                self.next_index = src.len();

                if src.len() > self.max_len {
                    return Err(QueryError::LineTooLong {
                        actual: src.len(),
                        limit: self.max_len,
                    });
                }
                return Ok(None);
            };

            let line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;

            if line.len() > self.max_len {
                return Err(QueryError::LineTooLong {
                    actual: line.len(),
                    limit: self.max_len,
                });
            }

            let data = std::str::from_utf8(&line).map_err(|e| QueryError::InvalidUtf8 {
                byte_pos: e.valid_up_to(),
            })?;
            let trimmed = data.trim_matches(&['\r', '\n'][..]);
            if trimmed.is_empty() {
                continue;
            }
            return Ok(Some(trimmed.to_string()));
        }
    }
}

impl Encoder<String> for LineCodec {
    type Error = QueryError;

    fn encode(&mut self, msg: String, dst: &mut BytesMut) -> Result<()> {
        // Truncate at first line ending so one command is always one line.
        let line = match msg.find(['\r', '\n']) {
            Some(pos) => &msg[..pos],
            None => msg.as_str(),
        };
        dst.reserve(line.len() + 1);
        dst.extend_from_slice(line.as_bytes());
        dst.extend_from_slice(b"\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_ts3_line_endings() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"TS3\n\rWelcome to the ServerQuery\n\rerror id=0"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("TS3"));
        assert_eq!(
            codec.decode(&mut buf).unwrap().as_deref(),
            Some("Welcome to the ServerQuery")
        );
        // Partial line stays buffered
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b" msg=ok\n\r");
        assert_eq!(
            codec.decode(&mut buf).unwrap().as_deref(),
            Some("error id=0 msg=ok")
        );
    }

    #[test]
    fn test_decode_skips_blank_lines() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"\n\r\n\rerror id=0 msg=ok\n"[..]);
        assert_eq!(
            codec.decode(&mut buf).unwrap().as_deref(),
            Some("error id=0 msg=ok")
        );
    }

    #[test]
    fn test_decode_line_too_long() {
        let mut codec = LineCodec::with_max_len(8);
        let mut buf = BytesMut::from(&b"0123456789"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(QueryError::LineTooLong { limit: 8, .. })
        ));
    }

    #[test]
    fn test_decode_busy_clientlist() {
        let client = "clid=1 cid=1 client_database_id=1 client_nickname=some\\suser client_type=0 \
            client_away=0 client_away_message client_flag_talking=0 client_input_muted=0 \
            client_output_muted=0 client_input_hardware=1 client_output_hardware=1 \
            client_talk_power=75 client_is_talker=0 client_is_priority_speaker=0 \
            client_is_recording=0 client_is_channel_commander=0 \
            client_unique_identifier=Zk9vYmFyYmF6cXV1eGNvcmdlZ3JhdWx0Zz0= \
            client_servergroups=6,8,9 client_channel_group_id=8 \
            client_channel_group_inherited_channel_id=1 \
            client_version=3.6.2\\s[Build:\\s1695203293] client_platform=Windows \
            client_idle_time=123456 client_created=1600000000 \
            client_lastconnected=1700000000 client_country=DE \
            connection_client_ip=198.51.100.23 \
            client_badges=overwolf=0:badges=c9e97536-5a2d-4c8e-a135-af404587a472";
        let line = vec![client; 120].join("|");
        assert!(line.len() > 64 * 1024);

        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(format!("{line}\n\r").as_bytes());
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some(line.as_str()));
    }

    #[test]
    fn test_decode_invalid_utf8() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"ab\xffcd\n"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(QueryError::InvalidUtf8 { byte_pos: 2 })
        ));
    }

    #[test]
    fn test_encode_appends_newline_and_truncates() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode("serverinfo\nquit".to_string(), &mut buf)
            .unwrap();
        assert_eq!(&buf[..], b"serverinfo\n");
    }
}
