//! Sync stream codec.
//!
//! A sync stream is a JSON array written one element per line:
//!
//! ```text
//! [\r\n
//! {header},\r\n
//! {entry},\r\n
//! {entry}\r\n
//! ]
//! ```
//!
//! The header is mandatory. A stream may end early with an error object
//! (`{"error": "unavailable"}`) in place of its closing bracket, which is
//! how a sender signals that it could not complete the payload.

use crate::error::{ProtocolError, ProtocolResult};
use crate::messages::ErrorBody;
use crate::ErrorKind;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

const START: &str = "[";
const END: &str = "]";
const SEPARATOR: &str = ",\r\n";

/// Encodes a header and its entries as a sync stream.
///
/// # Errors
///
/// Returns an error if a message cannot be serialized.
pub fn encode_stream<H: Serialize, E: Serialize>(header: &H, entries: &[E]) -> ProtocolResult<String> {
    let mut out = String::from("[\r\n");
    out.push_str(&serde_json::to_string(header)?);
    for entry in entries {
        out.push_str(SEPARATOR);
        out.push_str(&serde_json::to_string(entry)?);
    }
    out.push_str("\r\n]");
    Ok(out)
}

/// Encodes a stream that fails with `kind`.
///
/// # Errors
///
/// Returns an error if the error object cannot be serialized.
pub fn encode_error_stream(kind: ErrorKind, message: Option<String>) -> ProtocolResult<String> {
    let body = ErrorBody::new(kind, message);
    Ok(format!("[\r\n{}\r\n", serde_json::to_string(&body)?))
}

/// Decodes a sync stream into its header and entries.
///
/// Nothing is returned unless the whole stream is well formed, so a
/// malformed payload never yields a partial batch.
///
/// # Errors
///
/// Returns [`ProtocolError::BrokenSyncStream`] if:
/// - the opening or closing bracket is missing
/// - the stream has no header
/// - a separating comma is missing, or a trailing one is present
/// - a line does not decode as the expected message
///
/// Returns [`ProtocolError::Remote`] if the stream carries an error object.
pub fn decode_stream<H: DeserializeOwned, E: DeserializeOwned>(
    data: &str,
) -> ProtocolResult<(H, Vec<E>)> {
    let lines: Vec<&str> = data.lines().collect();
    if lines.first() != Some(&START) {
        return Err(ProtocolError::broken("missing stream start"));
    }
    let Some((&last, _)) = lines[1..].split_last() else {
        return Err(ProtocolError::broken("missing stream end"));
    };
    if last != END {
        if let Ok(value) = serde_json::from_str::<Value>(last) {
            ErrorBody::check(&value)?;
        }
        return Err(ProtocolError::broken("missing stream end"));
    }

    let body = &lines[1..lines.len() - 1];
    let Some((&first, rest)) = body.split_first() else {
        return Err(ProtocolError::broken("no header"));
    };

    let (line, mut comma) = strip_comma(first);
    let header = decode_line(line, "header")?;
    let mut entries = Vec::with_capacity(rest.len());
    for &line in rest {
        if !comma {
            return Err(ProtocolError::broken("missing comma"));
        }
        let (line, has_comma) = strip_comma(line);
        comma = has_comma;
        entries.push(decode_line(line, "entry")?);
    }
    if comma {
        return Err(ProtocolError::broken("trailing comma"));
    }
    Ok((header, entries))
}

fn strip_comma(line: &str) -> (&str, bool) {
    match line.strip_suffix(',') {
        Some(stripped) => (stripped, true),
        None => (line, false),
    }
}

fn decode_line<T: DeserializeOwned>(line: &str, what: &str) -> ProtocolResult<T> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| ProtocolError::broken(format!("invalid {what}: {e}")))?;
    ErrorBody::check(&value)?;
    serde_json::from_value(value).map_err(|e| ProtocolError::broken(format!("invalid {what}: {e}")))
}
