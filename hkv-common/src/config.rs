//! # Server Configuration
//!
//! Purpose: A static configuration record supplied to the server binary at
//! startup. Loading this from a config file is an external collaborator and
//! out of scope here — `main` builds one of these from environment
//! variables (or accepts the defaults) and hands it to the acceptor.
//!
//! ## Design Principles
//!
//! 1. **Plain Data**: No behavior lives on this type beyond its defaults.
//! 2. **Stable Defaults**: Mirror the reference implementation's tuning
//!    constants so behavior is unsurprising out of the box.

use std::path::PathBuf;

/// Default snapshot poll interval, in seconds, for the "any change" tier.
pub const DEFAULT_ASYNC_TIME: u64 = 100;
/// Default mutation threshold within one second before a snapshot triggers.
pub const DEFAULT_SEC_COUNT: u64 = 100;
/// Default mutation threshold within one minute before a snapshot triggers.
pub const DEFAULT_MIN_COUNT: u64 = 10;
/// Default bind host.
pub const DEFAULT_BIND_HOST: &str = "127.0.0.1";
/// Default bind port.
pub const DEFAULT_BIND_PORT: u16 = 12345;
/// Default snapshot file path, relative to the process's working directory.
pub const DEFAULT_PDB_FILE: &str = "db/dump.pdb";

/// Static configuration for the server: snapshot location, persistence
/// policy thresholds, and the TCP bind address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Path to the snapshot file.
    pub pdb_file: PathBuf,
    /// Seconds between "any change" snapshot poll ticks.
    pub async_time: u64,
    /// Mutation count within one second that forces a snapshot.
    pub sec_count: u64,
    /// Mutation count within one minute that forces a snapshot.
    pub min_count: u64,
    /// Host to bind the TCP listener to.
    pub bind_host: String,
    /// Port to bind the TCP listener to.
    pub bind_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            pdb_file: PathBuf::from(DEFAULT_PDB_FILE),
            async_time: DEFAULT_ASYNC_TIME,
            sec_count: DEFAULT_SEC_COUNT,
            min_count: DEFAULT_MIN_COUNT,
            bind_host: DEFAULT_BIND_HOST.to_string(),
            bind_port: DEFAULT_BIND_PORT,
        }
    }
}

impl ServerConfig {
    /// Builds a configuration from environment variables, falling back to
    /// the documented defaults for anything unset or unparsable.
    ///
    /// Recognized variables: `HKV_PDB_FILE`, `HKV_ASYNC_TIME`,
    /// `HKV_SEC_COUNT`, `HKV_MIN_COUNT`, `HKV_BIND_HOST`, `HKV_BIND_PORT`.
    pub fn from_env() -> Self {
        let defaults = ServerConfig::default();
        ServerConfig {
            pdb_file: std::env::var("HKV_PDB_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.pdb_file),
            async_time: env_u64("HKV_ASYNC_TIME").unwrap_or(defaults.async_time),
            sec_count: env_u64("HKV_SEC_COUNT").unwrap_or(defaults.sec_count),
            min_count: env_u64("HKV_MIN_COUNT").unwrap_or(defaults.min_count),
            bind_host: std::env::var("HKV_BIND_HOST").unwrap_or(defaults.bind_host),
            bind_port: env_u16("HKV_BIND_PORT").unwrap_or(defaults.bind_port),
        }
    }

    /// Returns the `host:port` string to bind the TCP listener to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.bind_port)
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_u16(name: &str) -> Option<u16> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_tuning() {
        let config = ServerConfig::default();
        assert_eq!(config.async_time, 100);
        assert_eq!(config.sec_count, 100);
        assert_eq!(config.min_count, 10);
        assert_eq!(config.bind_addr(), "127.0.0.1:12345");
    }
}
