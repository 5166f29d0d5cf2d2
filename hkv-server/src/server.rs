//! # TCP Server
//!
//! Accept RESP2 connections, parse commands, and dispatch them to the
//! typed keyspace with minimal overhead.

use std::sync::Arc;
use std::time::Instant;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::commands::{dispatch, ServerContext};
use crate::metrics::Metrics;
use crate::protocol::{Reply, RespError, RespParser};

/// Handles a single TCP client connection until it closes or a protocol
/// error is seen.
pub async fn handle_connection(
    mut stream: TcpStream,
    ctx: Arc<ServerContext>,
    metrics: Arc<Metrics>,
) -> std::io::Result<()> {
    let mut buffer = BytesMut::with_capacity(8 * 1024);
    let mut parser = RespParser::new();

    loop {
        let bytes = stream.read_buf(&mut buffer).await?;
        if bytes == 0 {
            break;
        }

        loop {
            match parser.parse(&mut buffer) {
                Ok(Some(args)) => {
                    metrics.record_request_start();
                    let start = Instant::now();
                    let reply = dispatch(&args, &ctx);
                    if matches!(reply, Reply::Error { .. }) {
                        metrics.record_error();
                    }
                    metrics.record_request_end(start.elapsed());
                    if stream.write_all(&reply.encode()).await.is_err() {
                        continue;
                    }
                }
                Ok(None) => break,
                Err(RespError::Protocol) => {
                    let err = Reply::Error {
                        prefix: "ERR",
                        message: "protocol error".to_string(),
                    };
                    stream.write_all(&err.encode()).await?;
                    return Ok(());
                }
            }
        }
    }

    Ok(())
}
