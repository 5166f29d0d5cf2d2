//! # HybridKV Error Types
//!
//! ## Design Principles
//!
//! 1. **Stable Codes**: Each variant maps to exactly one wire prefix (`ERR`
//!    or `WRONGTYPE`) so the server layer never has to re-derive intent.
//! 2. **Categorized Ranges**: Codes are grouped by intent (client, server,
//!    protocol) for future FFI-style transport, matching the rest of this
//!    workspace's error types.
//! 3. **Low Overhead**: Variants are cheap to construct and match.

use core::fmt;
use std::path::PathBuf;

/// Result type used across HybridKV components.
pub type HkvResult<T> = core::result::Result<T, HkvError>;

/// High-level category for grouping error codes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum HkvErrorCategory {
    /// Invalid input or user request issues (wire prefix `ERR`).
    Client,
    /// Key exists with a different value kind (wire prefix `WRONGTYPE`).
    WrongType,
    /// Server-side I/O or invariant failures.
    Server,
}

/// Errors shared between the keyspace, timer set, snapshot engine, and the
/// server's command dispatcher.
#[derive(Debug)]
pub enum HkvError {
    /// Key exists with a different kind than the command requires.
    WrongType,
    /// Command targeted a key that has no entry (used internally; most
    /// commands turn this into a 0/nil/empty reply rather than an error).
    NotFound,
    /// An argument expected to be an integer could not be parsed as one.
    NotAnInteger,
    /// A command's optional-argument syntax was invalid (e.g. `SET k v BAD`).
    SyntaxError,
    /// The command name is not recognized.
    UnknownCommand(String),
    /// The command was called with the wrong number of arguments.
    WrongArity(String),
    /// A list index was out of range for `LSET`.
    IndexOutOfRange,
    /// Filesystem I/O failure while loading or writing the snapshot file.
    Io(std::io::Error),
    /// The snapshot file could not be decoded.
    SnapshotDecode(String),
    /// The snapshot path has no usable parent directory.
    InvalidSnapshotPath(PathBuf),
}

impl HkvError {
    /// Returns the coarse category of the error, which determines its wire
    /// prefix (`ERR` or `WRONGTYPE`).
    pub const fn category(&self) -> HkvErrorCategory {
        match self {
            HkvError::WrongType => HkvErrorCategory::WrongType,
            HkvError::Io(_) | HkvError::SnapshotDecode(_) | HkvError::InvalidSnapshotPath(_) => {
                HkvErrorCategory::Server
            }
            _ => HkvErrorCategory::Client,
        }
    }
}

impl fmt::Display for HkvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HkvError::WrongType => {
                write!(f, "Operation against a key holding the wrong kind of value")
            }
            HkvError::NotFound => write!(f, "no such key"),
            HkvError::NotAnInteger => write!(f, "value is not an integer"),
            HkvError::SyntaxError => write!(f, "syntax error"),
            HkvError::UnknownCommand(name) => write!(f, "unknown command {name}"),
            HkvError::WrongArity(name) => write!(f, "wrong number of arguments for {name}"),
            HkvError::IndexOutOfRange => write!(f, "index out of range"),
            HkvError::Io(err) => write!(f, "io error: {err}"),
            HkvError::SnapshotDecode(msg) => write!(f, "snapshot decode error: {msg}"),
            HkvError::InvalidSnapshotPath(path) => {
                write!(f, "invalid snapshot path: {}", path.display())
            }
        }
    }
}

impl std::error::Error for HkvError {}

impl From<std::io::Error> for HkvError {
    fn from(err: std::io::Error) -> Self {
        HkvError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_type_is_its_own_category() {
        assert_eq!(HkvError::WrongType.category(), HkvErrorCategory::WrongType);
    }

    #[test]
    fn client_errors_share_a_category() {
        assert_eq!(HkvError::NotAnInteger.category(), HkvErrorCategory::Client);
        assert_eq!(HkvError::SyntaxError.category(), HkvErrorCategory::Client);
        assert_eq!(HkvError::IndexOutOfRange.category(), HkvErrorCategory::Client);
    }

    #[test]
    fn wrong_type_message_matches_wire_text() {
        assert_eq!(
            HkvError::WrongType.to_string(),
            "Operation against a key holding the wrong kind of value"
        );
    }
}
