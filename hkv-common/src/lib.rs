// hkv-common - Shared error and configuration types for HybridKV

pub mod config;
pub mod error;

pub use config::ServerConfig;
pub use error::{HkvError, HkvErrorCategory, HkvResult};
