//! Wire codec for message values.
//!
//! Values cross the socket as type-prefixed, CRLF-delimited frames:
//!
//! ```text
//! :42\r\n                top-level integer
//! $5\r\nhello\r\n        string (UTF-8 payload)
//! =4\r\n<bytes>\r\n      binary data
//! !16\r\n<bytes>\r\n     uuid (payload must be 16 bytes)
//! *2\r\n<v><v>           array of 2 values
//! %1\r\n<key><v>         dictionary of 1 pair; keys are string frames
//! ```
//!
//! Parsing is incremental: a frame split across reads reports
//! [`ParseResult::Incomplete`] until the buffer holds all of it, and a
//! completed parse reports how many bytes it consumed so the read buffer
//! can be advanced.

use crate::message::Value;
use bytes::BytesMut;

/// Maximum byte length of a string, data, or uuid payload
const MAX_ELEMENT_SIZE: usize = 16 * 1024 * 1024;

/// Maximum entry count of an array or dictionary frame
const MAX_ELEMENTS: usize = 64 * 1024;

/// Maximum nesting depth of aggregate frames
const MAX_DEPTH: usize = 32;

/// Maximum byte length of a frame header line (prefix + decimal + CRLF).
/// A signed 64-bit decimal needs at most 20 characters, so a header still
/// unterminated past this bound can never become valid.
const MAX_HEADER_LEN: usize = 32;

/// Frame decoding errors
#[derive(Debug, PartialEq)]
pub enum ParseError {
    UnknownType(u8),
    InvalidInteger(String),
    InvalidLength(String),
    LengthExceeded { length: usize, limit: usize },
    DepthExceeded,
    InvalidUtf8,
    UuidLength(usize),
    KeyType(u8),
    MissingTerminator,
    HeaderTooLong,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::UnknownType(b) => {
                write!(f, "Unknown frame type prefix 0x{b:02x}")
            }
            ParseError::InvalidInteger(s) => write!(f, "Invalid integer '{s}'"),
            ParseError::InvalidLength(s) => write!(f, "Invalid length '{s}'"),
            ParseError::LengthExceeded { length, limit } => {
                write!(f, "Length {length} exceeds limit {limit}")
            }
            ParseError::DepthExceeded => {
                write!(f, "Nesting depth exceeds {MAX_DEPTH}")
            }
            ParseError::InvalidUtf8 => write!(f, "Invalid UTF-8 in string payload"),
            ParseError::UuidLength(n) => {
                write!(f, "Uuid payload must be 16 bytes, got {n}")
            }
            ParseError::KeyType(b) => {
                write!(f, "Dictionary key must be a string frame, got prefix 0x{b:02x}")
            }
            ParseError::MissingTerminator => write!(f, "Payload missing trailing CRLF"),
            ParseError::HeaderTooLong => {
                write!(f, "Frame header exceeds {MAX_HEADER_LEN} bytes without CRLF")
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Parse result
#[derive(Debug)]
pub enum ParseResult {
    /// Successfully parsed a value with bytes consumed
    Complete(Value, usize),
    /// Need more data
    Incomplete,
    /// Parse error
    Error(ParseError),
}

/// Encode a value to bytes
pub fn encode(value: &Value) -> BytesMut {
    let mut buf = BytesMut::new();
    encode_into(value, &mut buf);
    buf
}

/// Encode a value into an existing buffer
pub fn encode_into(value: &Value, buf: &mut BytesMut) {
    match value {
        Value::Int64(n) => {
            buf.extend_from_slice(b":");
            buf.extend_from_slice(n.to_string().as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
        Value::String(s) => encode_bulk(buf, b'$', s.as_bytes()),
        Value::Data(data) => encode_bulk(buf, b'=', data),
        Value::Uuid(bytes) => encode_bulk(buf, b'!', bytes),
        Value::Array(values) => {
            buf.extend_from_slice(b"*");
            buf.extend_from_slice(values.len().to_string().as_bytes());
            buf.extend_from_slice(b"\r\n");
            for value in values {
                encode_into(value, buf);
            }
        }
        Value::Dictionary(map) => {
            buf.extend_from_slice(b"%");
            buf.extend_from_slice(map.len().to_string().as_bytes());
            buf.extend_from_slice(b"\r\n");
            for (key, value) in map {
                encode_bulk(buf, b'$', key.as_bytes());
                encode_into(value, buf);
            }
        }
    }
}

/// Write a length-prefixed payload frame: <prefix><len>\r\n<payload>\r\n
fn encode_bulk(buf: &mut BytesMut, prefix: u8, data: &[u8]) {
    buf.extend_from_slice(&[prefix]);
    buf.extend_from_slice(data.len().to_string().as_bytes());
    buf.extend_from_slice(b"\r\n");
    buf.extend_from_slice(data);
    buf.extend_from_slice(b"\r\n");
}

/// Parse one value frame from a buffer
pub fn parse(buffer: &[u8]) -> ParseResult {
    parse_value(buffer, 0)
}

fn parse_value(buffer: &[u8], depth: usize) -> ParseResult {
    if depth >= MAX_DEPTH {
        return ParseResult::Error(ParseError::DepthExceeded);
    }
    if buffer.is_empty() {
        return ParseResult::Incomplete;
    }

    match buffer[0] {
        b':' => parse_int64(buffer),
        b'$' => parse_string(buffer),
        b'=' => parse_data(buffer),
        b'!' => parse_uuid(buffer),
        b'*' => parse_array(buffer, depth),
        b'%' => parse_dictionary(buffer, depth),
        other => ParseResult::Error(ParseError::UnknownType(other)),
    }
}

/// Find CRLF in buffer, return position of \r
fn find_crlf(buffer: &[u8]) -> Option<usize> {
    (0..buffer.len().saturating_sub(1)).find(|&i| buffer[i] == b'\r' && buffer[i + 1] == b'\n')
}

/// Parse an integer frame: :1000\r\n
fn parse_int64(buffer: &[u8]) -> ParseResult {
    let end = match find_crlf(buffer) {
        Some(end) => end,
        // An unterminated header past the bound can never complete, so
        // reject it instead of letting the read buffer grow unboundedly.
        None if buffer.len() > MAX_HEADER_LEN => {
            return ParseResult::Error(ParseError::HeaderTooLong);
        }
        None => return ParseResult::Incomplete,
    };
    let s = match std::str::from_utf8(&buffer[1..end]) {
        Ok(s) => s,
        Err(_) => {
            let lossy = String::from_utf8_lossy(&buffer[1..end]).into_owned();
            return ParseResult::Error(ParseError::InvalidInteger(lossy));
        }
    };
    match s.parse::<i64>() {
        Ok(n) => ParseResult::Complete(Value::Int64(n), end + 2),
        Err(_) => ParseResult::Error(ParseError::InvalidInteger(s.to_string())),
    }
}

/// Parse the decimal length line after a type prefix.
/// Returns the length and the offset of the first byte after its CRLF,
/// or `None` if the line is not complete yet.
fn parse_length(buffer: &[u8], limit: usize) -> Result<Option<(usize, usize)>, ParseError> {
    let end = match find_crlf(buffer) {
        Some(end) => end,
        None if buffer.len() > MAX_HEADER_LEN => return Err(ParseError::HeaderTooLong),
        None => return Ok(None),
    };
    let s = match std::str::from_utf8(&buffer[1..end]) {
        Ok(s) => s,
        Err(_) => {
            let lossy = String::from_utf8_lossy(&buffer[1..end]).into_owned();
            return Err(ParseError::InvalidLength(lossy));
        }
    };
    let length = s
        .parse::<usize>()
        .map_err(|_| ParseError::InvalidLength(s.to_string()))?;
    if length > limit {
        return Err(ParseError::LengthExceeded { length, limit });
    }
    Ok(Some((length, end + 2)))
}

/// Parse a length-prefixed payload: <len>\r\n<len bytes>\r\n.
/// Returns the payload slice and total bytes consumed including the prefix.
fn parse_payload(buffer: &[u8]) -> Result<Option<(&[u8], usize)>, ParseError> {
    let (length, data_start) = match parse_length(buffer, MAX_ELEMENT_SIZE)? {
        Some(header) => header,
        None => return Ok(None),
    };

    let data_end = data_start + length;
    let total_len = data_end + 2; // +2 for trailing \r\n

    if buffer.len() < total_len {
        return Ok(None);
    }
    if buffer[data_end] != b'\r' || buffer[data_end + 1] != b'\n' {
        return Err(ParseError::MissingTerminator);
    }

    Ok(Some((&buffer[data_start..data_end], total_len)))
}

/// Parse a string frame: $5\r\nhello\r\n
fn parse_string(buffer: &[u8]) -> ParseResult {
    match parse_payload(buffer) {
        Ok(Some((data, consumed))) => match std::str::from_utf8(data) {
            Ok(s) => ParseResult::Complete(Value::String(s.to_string()), consumed),
            Err(_) => ParseResult::Error(ParseError::InvalidUtf8),
        },
        Ok(None) => ParseResult::Incomplete,
        Err(e) => ParseResult::Error(e),
    }
}

/// Parse a data frame: =4\r\n<bytes>\r\n
fn parse_data(buffer: &[u8]) -> ParseResult {
    match parse_payload(buffer) {
        Ok(Some((data, consumed))) => ParseResult::Complete(Value::Data(data.to_vec()), consumed),
        Ok(None) => ParseResult::Incomplete,
        Err(e) => ParseResult::Error(e),
    }
}

/// Parse a uuid frame: !16\r\n<16 bytes>\r\n
fn parse_uuid(buffer: &[u8]) -> ParseResult {
    match parse_payload(buffer) {
        Ok(Some((data, consumed))) => match <[u8; 16]>::try_from(data) {
            Ok(bytes) => ParseResult::Complete(Value::Uuid(bytes), consumed),
            Err(_) => ParseResult::Error(ParseError::UuidLength(data.len())),
        },
        Ok(None) => ParseResult::Incomplete,
        Err(e) => ParseResult::Error(e),
    }
}

/// Parse an array frame: *2\r\n<value><value>
fn parse_array(buffer: &[u8], depth: usize) -> ParseResult {
    let (count, mut offset) = match parse_length(buffer, MAX_ELEMENTS) {
        Ok(Some(header)) => header,
        Ok(None) => return ParseResult::Incomplete,
        Err(e) => return ParseResult::Error(e),
    };

    // Capacity follows parsed elements, not the declared count; a header
    // alone must not reserve MAX_ELEMENTS entries.
    let mut values = Vec::with_capacity(count.min(16));
    for _ in 0..count {
        match parse_value(&buffer[offset..], depth + 1) {
            ParseResult::Complete(value, consumed) => {
                values.push(value);
                offset += consumed;
            }
            ParseResult::Incomplete => return ParseResult::Incomplete,
            ParseResult::Error(e) => return ParseResult::Error(e),
        }
    }

    ParseResult::Complete(Value::Array(values), offset)
}

/// Parse a dictionary frame: %1\r\n$3\r\nkey\r\n<value>
fn parse_dictionary(buffer: &[u8], depth: usize) -> ParseResult {
    let (count, mut offset) = match parse_length(buffer, MAX_ELEMENTS) {
        Ok(Some(header)) => header,
        Ok(None) => return ParseResult::Incomplete,
        Err(e) => return ParseResult::Error(e),
    };

    let mut map = std::collections::HashMap::with_capacity(count.min(16));
    for _ in 0..count {
        let (key, consumed) = match parse_key(&buffer[offset..]) {
            Ok(Some(pair)) => pair,
            Ok(None) => return ParseResult::Incomplete,
            Err(e) => return ParseResult::Error(e),
        };
        offset += consumed;

        match parse_value(&buffer[offset..], depth + 1) {
            ParseResult::Complete(value, consumed) => {
                map.insert(key, value);
                offset += consumed;
            }
            ParseResult::Incomplete => return ParseResult::Incomplete,
            ParseResult::Error(e) => return ParseResult::Error(e),
        }
    }

    ParseResult::Complete(Value::Dictionary(map), offset)
}

/// Parse a dictionary key, which must be a string frame
fn parse_key(buffer: &[u8]) -> Result<Option<(String, usize)>, ParseError> {
    if buffer.is_empty() {
        return Ok(None);
    }
    if buffer[0] != b'$' {
        return Err(ParseError::KeyType(buffer[0]));
    }
    match parse_payload(buffer)? {
        Some((data, consumed)) => match std::str::from_utf8(data) {
            Ok(s) => Ok(Some((s.to_string(), consumed))),
            Err(_) => Err(ParseError::InvalidUtf8),
        },
        None => Ok(None),
    }
}
