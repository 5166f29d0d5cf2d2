//! # RESP2 Protocol
//!
//! Parse RESP2 arrays of bulk strings from a streaming TCP buffer, and
//! encode the five reply kinds the dispatcher produces.
//!
//! ## Design Principles
//!
//! 1. **State Machine Pattern**: Explicit parser states avoid backtracking
//!    and keep control flow predictable.
//! 2. **Streaming Friendly**: The parser consumes from a mutable buffer and
//!    returns `None` when more data is needed.
//! 3. **Low Allocation**: Only bulk string arguments are copied into `Vec<u8>`.
//! 4. **Fail Fast**: Malformed frames return a protocol error immediately.

use bytes::{Buf, BytesMut};

/// RESP parser errors surfaced to the server for client responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RespError {
    /// The input is not valid RESP2 for the supported subset.
    Protocol,
}

/// RESP2 parser for arrays of bulk strings.
#[derive(Debug)]
pub struct RespParser {
    state: ParseState,
    args: Vec<Vec<u8>>,
    remaining: usize,
    bulk_len: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    ArrayLen,
    BulkLen,
    BulkData,
}

impl Default for RespParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RespParser {
    /// Creates a new parser in the initial state.
    pub fn new() -> Self {
        RespParser {
            state: ParseState::ArrayLen,
            args: Vec::new(),
            remaining: 0,
            bulk_len: 0,
        }
    }

    /// Attempts to parse a single command from the buffer.
    ///
    /// Returns `Ok(None)` if more data is required.
    pub fn parse(&mut self, buf: &mut BytesMut) -> Result<Option<Vec<Vec<u8>>>, RespError> {
        loop {
            match self.state {
                ParseState::ArrayLen => {
                    let line = match read_line(buf) {
                        Some(line) => line,
                        None => return Ok(None),
                    };
                    if line.first() != Some(&b'*') {
                        return Err(RespError::Protocol);
                    }
                    let count = parse_usize(&line[1..])?;
                    self.args.clear();
                    self.remaining = count;
                    if self.remaining == 0 {
                        self.state = ParseState::ArrayLen;
                        return Ok(Some(Vec::new()));
                    }
                    self.state = ParseState::BulkLen;
                }
                ParseState::BulkLen => {
                    let line = match read_line(buf) {
                        Some(line) => line,
                        None => return Ok(None),
                    };
                    if line.first() != Some(&b'$') {
                        return Err(RespError::Protocol);
                    }
                    let len = parse_usize(&line[1..])?;
                    self.bulk_len = len;
                    self.state = ParseState::BulkData;
                }
                ParseState::BulkData => {
                    if buf.len() < self.bulk_len + 2 {
                        return Ok(None);
                    }
                    let data = buf.split_to(self.bulk_len).to_vec();
                    if buf.get_u8() != b'\r' || buf.get_u8() != b'\n' {
                        return Err(RespError::Protocol);
                    }
                    self.args.push(data);
                    self.remaining -= 1;
                    if self.remaining == 0 {
                        self.state = ParseState::ArrayLen;
                        return Ok(Some(std::mem::take(&mut self.args)));
                    }
                    self.state = ParseState::BulkLen;
                }
            }
        }
    }
}

fn read_line(buf: &mut BytesMut) -> Option<BytesMut> {
    let mut idx = 1;
    while idx < buf.len() {
        if buf[idx] == b'\n' && buf[idx - 1] == b'\r' {
            let line = buf.split_to(idx - 1);
            buf.advance(2);
            return Some(line);
        }
        idx += 1;
    }
    None
}

fn parse_usize(data: &[u8]) -> Result<usize, RespError> {
    if data.is_empty() {
        return Err(RespError::Protocol);
    }
    let mut value: usize = 0;
    for &b in data {
        if !b.is_ascii_digit() {
            return Err(RespError::Protocol);
        }
        value = value.saturating_mul(10).saturating_add((b - b'0') as usize);
    }
    Ok(value)
}

/// One outbound reply, covering every kind the dispatcher can produce.
///
/// `KEYS`/`SMEMBERS`/`HKEYS`/`HGETALL`/`HMGET` all return `Array`; there is
/// no dedicated "empty array" alias reply kind, so an empty result is just
/// `Array(vec![])` rather than a separate encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Simple(&'static str),
    Error { prefix: &'static str, message: String },
    Integer(i64),
    Bulk(Option<String>),
    Array(Vec<Reply>),
}

impl Reply {
    pub fn ok() -> Reply {
        Reply::Simple("OK")
    }

    pub fn nil() -> Reply {
        Reply::Bulk(None)
    }

    pub fn bulk(value: impl Into<String>) -> Reply {
        Reply::Bulk(Some(value.into()))
    }

    pub fn array_of_strings(values: impl IntoIterator<Item = String>) -> Reply {
        Reply::Array(values.into_iter().map(Reply::bulk).collect())
    }

    pub fn array_of_optional_strings(values: impl IntoIterator<Item = Option<String>>) -> Reply {
        Reply::Array(
            values
                .into_iter()
                .map(|v| match v {
                    Some(s) => Reply::bulk(s),
                    None => Reply::nil(),
                })
                .collect(),
        )
    }

    /// Serializes this reply as RESP2 wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Reply::Simple(message) => {
                out.push(b'+');
                out.extend_from_slice(message.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Reply::Error { prefix, message } => {
                out.push(b'-');
                out.extend_from_slice(prefix.as_bytes());
                out.push(b' ');
                out.extend_from_slice(message.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Reply::Integer(value) => {
                out.push(b':');
                out.extend_from_slice(value.to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Reply::Bulk(None) => out.extend_from_slice(b"$-1\r\n"),
            Reply::Bulk(Some(data)) => {
                out.push(b'$');
                out.extend_from_slice(data.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                out.extend_from_slice(data.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Reply::Array(items) => {
                out.push(b'*');
                out.extend_from_slice(items.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                for item in items {
                    item.encode_into(out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_get() {
        let mut buf = BytesMut::from("*2\r\n$3\r\nGET\r\n$3\r\nkey\r\n");
        let mut parser = RespParser::new();
        let cmd = parser.parse(&mut buf).unwrap().unwrap();
        assert_eq!(cmd.len(), 2);
        assert_eq!(cmd[0], b"GET");
        assert_eq!(cmd[1], b"key");
    }

    #[test]
    fn handles_partial_frames() {
        let mut buf = BytesMut::from("*1\r\n$4\r\nPIN");
        let mut parser = RespParser::new();
        assert!(parser.parse(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"G\r\n");
        let cmd = parser.parse(&mut buf).unwrap().unwrap();
        assert_eq!(cmd[0], b"PING");
    }

    #[test]
    fn encodes_nil_bulk() {
        assert_eq!(Reply::nil().encode(), b"$-1\r\n");
    }

    #[test]
    fn encodes_wrongtype_error() {
        let reply = Reply::Error {
            prefix: "WRONGTYPE",
            message: "Operation against a key holding the wrong kind of value".to_string(),
        };
        assert_eq!(
            reply.encode(),
            b"-WRONGTYPE Operation against a key holding the wrong kind of value\r\n".to_vec()
        );
    }

    #[test]
    fn encodes_nested_array() {
        let reply = Reply::array_of_strings(["a".to_string(), "b".to_string()]);
        assert_eq!(reply.encode(), b"*2\r\n$1\r\na\r\n$1\r\nb\r\n".to_vec());
    }
}
