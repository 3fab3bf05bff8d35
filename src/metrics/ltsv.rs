//! Line format of the durable access log.
//!
//! One observation per line, tab separated `label:value` columns:
//!
//! ```text
//! method:GET	path:/users/1	status:200	response_body_size:42	response_time_nano:1500	accessed_at:2017-12-02T00:00:00.000000000Z	request_body_size:-1
//! ```
//!
//! The first six labels are required. `request_body_size` is optional and
//! unknown labels are skipped, so older files keep loading.
//!
//! Backslash, tab, CR and LF inside `method` and `path` are written as `\\`,
//! `\t`, `\r` and `\n`. Any other backslash sequence decodes as written.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};

use super::{Observation, UNKNOWN_BODY_SIZE};
use crate::error::DecodeError;

const METHOD: &str = "method";
const PATH: &str = "path";
const STATUS: &str = "status";
const RESPONSE_BODY_SIZE: &str = "response_body_size";
const RESPONSE_TIME: &str = "response_time_nano";
const ACCESSED_AT: &str = "accessed_at";
const REQUEST_BODY_SIZE: &str = "request_body_size";

/// Append one encoded line (newline included) to `w`.
pub fn write_line<W: Write>(w: &mut W, obs: &Observation) -> io::Result<()> {
    writeln!(
        w,
        "{METHOD}:{}\t{PATH}:{}\t{STATUS}:{}\t{RESPONSE_BODY_SIZE}:{}\t{RESPONSE_TIME}:{}\t{ACCESSED_AT}:{}\t{REQUEST_BODY_SIZE}:{}",
        Escaped(&obs.method),
        Escaped(&obs.path),
        obs.status,
        obs.response_body_size,
        obs.response_time.as_nanos(),
        obs.accessed_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
        obs.request_body_size,
    )
}

pub fn encode(obs: &Observation) -> String {
    let mut buf = Vec::with_capacity(160);
    // Writing into a Vec cannot fail.
    let _ = write_line(&mut buf, obs);
    String::from_utf8_lossy(&buf).trim_end_matches('\n').to_owned()
}

/// Parse one line (without its trailing newline).
pub fn decode(line: &str) -> Result<Observation, DecodeError> {
    let mut table = HashMap::with_capacity(8);
    for column in line.split('\t') {
        let (label, value) = column
            .split_once(':')
            .ok_or_else(|| DecodeError::MalformedField(column.to_owned()))?;
        table.insert(label, value);
    }

    let field = |label: &'static str| {
        table
            .get(label)
            .copied()
            .ok_or(DecodeError::MissingLabel(label))
    };

    let method = unescape(field(METHOD)?).into_owned();
    let path = unescape(field(PATH)?).into_owned();
    let status = number(STATUS, field(STATUS)?)?;
    let response_body_size = number(RESPONSE_BODY_SIZE, field(RESPONSE_BODY_SIZE)?)?;
    let response_time = Duration::from_nanos(number(RESPONSE_TIME, field(RESPONSE_TIME)?)?);

    let raw = field(ACCESSED_AT)?;
    let accessed_at = DateTime::parse_from_rfc3339(raw)
        .map_err(|_| DecodeError::InvalidTimestamp {
            value: raw.to_owned(),
        })?
        .with_timezone(&Utc);

    let request_body_size = match table.get(REQUEST_BODY_SIZE) {
        Some(v) => number(REQUEST_BODY_SIZE, v)?,
        None => UNKNOWN_BODY_SIZE,
    };

    Ok(Observation {
        method,
        path,
        request_body_size,
        status,
        response_body_size,
        response_time,
        accessed_at,
    })
}

/// Writes a value with the column and line separators escaped.
struct Escaped<'a>(&'a str);

impl fmt::Display for Escaped<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rest = self.0;
        while let Some(idx) = rest.find(['\\', '\t', '\n', '\r']) {
            f.write_str(&rest[..idx])?;
            let escaped = match rest.as_bytes()[idx] {
                b'\t' => "\\t",
                b'\n' => "\\n",
                b'\r' => "\\r",
                _ => "\\\\",
            };
            f.write_str(escaped)?;
            rest = &rest[idx + 1..];
        }
        f.write_str(rest)
    }
}

fn unescape(value: &str) -> Cow<'_, str> {
    if !value.contains('\\') {
        return Cow::Borrowed(value);
    }

    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    Cow::Owned(out)
}

fn number<T: FromStr>(label: &'static str, value: &str) -> Result<T, DecodeError> {
    value.parse().map_err(|_| DecodeError::InvalidNumber {
        label,
        value: value.to_owned(),
    })
}
