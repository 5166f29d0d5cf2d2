//! # HybridKV Server
//!
//! Provide a Redis-compatible TCP server that routes commands to the
//! typed in-memory keyspace, backing it with periodic snapshot
//! persistence and per-key expiration.
//!
//! ## Design Principles
//!
//! 1. **Single Responsibility**: Parsing and dispatch are isolated in modules.
//! 2. **Async First**: Tokio handles concurrent connections efficiently.
//! 3. **Fail-Open Defaults**: Protocol errors are localized to the connection.
//! 4. **Performance Focus**: Reuse buffers and avoid unnecessary allocations.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info, warn};

use hkv_common::ServerConfig;
use hkv_engine::{ExpirationTimers, Keyspace, SnapshotEngine};
use hkv_server::commands::ServerContext;
use hkv_server::metrics::Metrics;
use hkv_server::server;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = ServerConfig::from_env();
    let snapshot = Arc::new(SnapshotEngine::new(config.pdb_file.clone()));

    let keyspace = match snapshot.load() {
        Ok(Some(entries)) => {
            info!(count = entries.len(), "restored keyspace from snapshot");
            Arc::new(Keyspace::from_entries(entries))
        }
        Ok(None) => {
            info!("no snapshot found; starting with an empty keyspace");
            Arc::new(Keyspace::new())
        }
        Err(err) => {
            warn!(error = %err, "snapshot file unreadable; starting with an empty keyspace");
            Arc::new(Keyspace::new())
        }
    };

    let timers = Arc::new(ExpirationTimers::new(Arc::clone(&keyspace)));
    timers.rehydrate(keyspace.deadlines());

    let ctx = Arc::new(ServerContext {
        keyspace: Arc::clone(&keyspace),
        timers,
        snapshot: Arc::clone(&snapshot),
    });
    let metrics = Arc::new(Metrics::new());

    tokio::spawn(Arc::clone(&snapshot).run_async_time_policy(
        Arc::clone(&keyspace),
        tokio::time::Duration::from_secs(config.async_time),
    ));
    tokio::spawn(Arc::clone(&snapshot).run_sec_count_policy(Arc::clone(&keyspace), config.sec_count));
    tokio::spawn(Arc::clone(&snapshot).run_min_count_policy(Arc::clone(&keyspace), config.min_count));

    let listener = match TcpListener::bind(config.bind_addr()).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, addr = %config.bind_addr(), "failed to bind");
            std::process::exit(1);
        }
    };
    info!(addr = %config.bind_addr(), "listening");

    loop {
        tokio::select! {
            accept = listener.accept() => {
                let (stream, peer) = match accept {
                    Ok(value) => value,
                    Err(err) => {
                        error!(error = %err, "accept failed");
                        continue;
                    }
                };
                info!(%peer, "connection accepted");
                let ctx = Arc::clone(&ctx);
                let metrics = Arc::clone(&metrics);
                tokio::spawn(async move {
                    if let Err(err) = server::handle_connection(stream, ctx, metrics).await {
                        error!(error = %err, "connection error");
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received, waiting for in-flight commands to finish");
                while metrics.snapshot().inflight > 0 {
                    tokio::time::sleep(tokio::time::Duration::from_millis(5)).await;
                }
                info!("saving snapshot");
                if let Err(err) = snapshot.save(&keyspace) {
                    error!(error = %err, "final save failed");
                }
                break;
            }
        }
    }
}
