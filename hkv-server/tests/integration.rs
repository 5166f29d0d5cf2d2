//! # End-to-End Protocol Tests
//!
//! Purpose: Exercise the dispatcher and TCP loop together through the real
//! wire protocol, using `hkv-client` as the RESP2 peer rather than an
//! external `redis-cli` binary so these tests run unconditionally.
//!
//! ## Design Principles
//!
//! 1. **End-to-End**: Drive the server the way a real client would, over a
//!    loopback TCP socket.
//! 2. **Isolated Server**: Bind to an ephemeral port per test.
//! 3. **Stable Outputs**: Assert on typed client results, not raw bytes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::oneshot;

use hkv_client::{ClientConfig, ClientTtl, KVClient, RespValue};
use hkv_engine::{ExpirationTimers, Keyspace, SnapshotEngine};
use hkv_server::commands::ServerContext;
use hkv_server::metrics::Metrics;
use hkv_server::server;

async fn spawn_test_server() -> (SocketAddr, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");

    let keyspace = Arc::new(Keyspace::new());
    let timers = Arc::new(ExpirationTimers::new(Arc::clone(&keyspace)));
    let snapshot = Arc::new(SnapshotEngine::new(
        std::env::temp_dir().join(format!("hkv-integration-{}.pdb", addr.port())),
    ));
    let ctx = Arc::new(ServerContext { keyspace, timers, snapshot });
    let metrics = Arc::new(Metrics::new());

    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => break,
                accept = listener.accept() => {
                    let (stream, _) = match accept {
                        Ok(value) => value,
                        Err(_) => break,
                    };
                    let ctx = Arc::clone(&ctx);
                    let metrics = Arc::clone(&metrics);
                    tokio::spawn(async move {
                        let _ = server::handle_connection(stream, ctx, metrics).await;
                    });
                }
            }
        }
    });

    (addr, shutdown_tx)
}

fn client_for(addr: SocketAddr) -> KVClient {
    let config = ClientConfig {
        addr: addr.to_string(),
        max_idle: 1,
        max_total: 1,
        read_timeout: Some(Duration::from_secs(1)),
        write_timeout: Some(Duration::from_secs(1)),
        connect_timeout: Some(Duration::from_secs(1)),
    };
    KVClient::with_config(config).expect("client")
}

#[tokio::test(flavor = "multi_thread")]
async fn set_get_ttl_and_delete_roundtrip() {
    let (addr, _shutdown) = spawn_test_server().await;
    let client = tokio::task::spawn_blocking(move || -> Result<(), String> {
        let client = client_for(addr);
        client.set(b"key", b"value").map_err(|e| e.to_string())?;
        let value = client.get(b"key").map_err(|e| e.to_string())?;
        assert_eq!(value, Some(b"value".to_vec()));

        assert_eq!(client.ttl(b"key").unwrap(), ClientTtl::NoExpiry);

        assert!(client.expire(b"key", Duration::from_secs(1)).unwrap());
        match client.ttl(b"key").unwrap() {
            ClientTtl::ExpiresIn(d) => assert!(d.as_secs() <= 1),
            other => panic!("expected ExpiresIn, got {other:?}"),
        }

        assert!(client.delete(b"key").unwrap());
        assert_eq!(client.get(b"key").unwrap(), None);
        assert_eq!(client.ttl(b"key").unwrap(), ClientTtl::Missing);
        Ok(())
    })
    .await
    .unwrap();
    client.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn expiration_fires_without_explicit_get() {
    let (addr, _shutdown) = spawn_test_server().await;
    tokio::task::spawn_blocking(move || {
        let client = client_for(addr);
        client.set(b"soon", b"bye").unwrap();
        client.expire(b"soon", Duration::from_secs(0)).unwrap();
        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(client.get(b"soon").unwrap(), None);
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn hash_list_and_set_commands_work_over_the_wire() {
    let (addr, _shutdown) = spawn_test_server().await;
    tokio::task::spawn_blocking(move || {
        let client = client_for(addr);

        let reply = client.command(&[b"HSET", b"h", b"f1", b"v1", b"f2", b"v2"]).unwrap();
        assert_eq!(reply, RespValue::Integer(2));

        let reply = client.command(&[b"HGET", b"h", b"f1"]).unwrap();
        assert_eq!(reply, RespValue::Bulk(Some(b"v1".to_vec())));

        let reply = client.command(&[b"RPUSH", b"l", b"a", b"b", b"c"]).unwrap();
        assert_eq!(reply, RespValue::Integer(3));

        let reply = client.command(&[b"LPOP", b"l"]).unwrap();
        assert_eq!(reply, RespValue::Bulk(Some(b"a".to_vec())));

        let reply = client.command(&[b"RPOP", b"l"]).unwrap();
        assert_eq!(reply, RespValue::Bulk(Some(b"c".to_vec())));

        let reply = client.command(&[b"SADD", b"s", b"x", b"y"]).unwrap();
        assert_eq!(reply, RespValue::Integer(2));

        let reply = client.command(&[b"SCARD", b"s"]).unwrap();
        assert_eq!(reply, RespValue::Integer(2));
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn wrongtype_on_mismatched_kind() {
    let (addr, _shutdown) = spawn_test_server().await;
    tokio::task::spawn_blocking(move || {
        let client = client_for(addr);
        client.set(b"a", b"1").unwrap();
        let reply = client.command(&[b"HGET", b"a", b"f"]).unwrap();
        match reply {
            RespValue::Error(message) => {
                assert!(String::from_utf8_lossy(&message).starts_with("WRONGTYPE"));
            }
            other => panic!("expected error reply, got {other:?}"),
        }
    })
    .await
    .unwrap();
}
