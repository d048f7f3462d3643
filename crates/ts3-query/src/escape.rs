//! ServerQuery value escaping.
//!
//! Parameter values on the wire may not contain spaces, pipes or control
//! characters. The server escapes them as follows:
//!
//! | char | escaped |
//! |------|---------|
//! | `\`  | `\\`    |
//! | `/`  | `\/`    |
//! | ` `  | `\s`    |
//! | `\|` | `\p`    |
//! | BEL  | `\a`    |
//! | BS   | `\b`    |
//! | FF   | `\f`    |
//! | LF   | `\n`    |
//! | CR   | `\r`    |
//! | TAB  | `\t`    |
//! | VT   | `\v`    |

use std::fmt::{Result as FmtResult, Write};

/// Escape a value for serialization into a command line.
pub fn escape_value(f: &mut dyn Write, value: &str) -> FmtResult {
    for c in value.chars() {
        match c {
            '\\' => f.write_str("\\\\")?,
            '/' => f.write_str("\\/")?,
            ' ' => f.write_str("\\s")?,
            '|' => f.write_str("\\p")?,
            '\x07' => f.write_str("\\a")?,
            '\x08' => f.write_str("\\b")?,
            '\x0C' => f.write_str("\\f")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            '\x0B' => f.write_str("\\v")?,
            c => f.write_char(c)?,
        }
    }
    Ok(())
}

/// Escape a value into a new `String`.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    // Writing into a String cannot fail.
    let _ = escape_value(&mut out, value);
    out
}

/// Unescape a value from wire format.
///
/// Unknown escapes yield the escaped character itself; a trailing lone
/// backslash is dropped.
pub fn unescape(value: &str) -> String {
    let mut unescaped = String::with_capacity(value.len());
    let mut iter = value.chars();
    while let Some(c) = iter.next() {
        let r = if c == '\\' {
            match iter.next() {
                Some('\\') => '\\',
                Some('/') => '/',
                Some('s') => ' ',
                Some('p') => '|',
                Some('a') => '\x07',
                Some('b') => '\x08',
                Some('f') => '\x0C',
                Some('n') => '\n',
                Some('r') => '\r',
                Some('t') => '\t',
                Some('v') => '\x0B',
                Some(c) => c,
                None => break,
            }
        } else {
            c
        };
        unescaped.push(r);
    }
    unescaped
}
