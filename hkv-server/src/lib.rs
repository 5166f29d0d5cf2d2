// hkv-server - RESP2 command dispatch and TCP connection handling

pub mod commands;
pub mod metrics;
pub mod protocol;
pub mod server;

pub use commands::{dispatch, ServerContext};
pub use metrics::Metrics;
pub use protocol::Reply;
