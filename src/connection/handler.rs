//! Connection Lifecycle
//!
//! One task per accepted socket. The task registers a client, then runs a
//! strictly sequential loop: read one complete command, execute it to
//! completion with the reply flushed, and only then read the next. There
//! is no reply pipelining within a connection.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. accept() ──> register_connection() ──> spawn task
//!        │
//!        ▼
//! 2. ┌──────────────────────────────┐
//!    │  dispatch one command        │◄──┐
//!    │  (frame, route, reply)       │   │ Flow::Continue
//!    └───────────┬──────────────────┘───┘
//!                │
//!                ▼ Flow::Quit / Flow::Disconnect / fatal error
//! 3. drop_connection(id) ──> task ends
//! ```
//!
//! ## Error policy
//!
//! IO errors that mean the peer went away (connection reset, broken
//! pipe, not connected) end the session silently. Any other fatal error
//! (a framing violation, the discard recursion bound, an unexpected IO
//! failure) is logged and ends the session. Recoverable rejections never
//! reach this loop; the dispatcher already turned them into error
//! replies.

use crate::commands::{dispatch, Flow};
use crate::connection::registry::ClientRegistry;
use crate::protocol::{RespError, RespReader, RespWriter};
use crate::storage::Store;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Statistics shared across every connection.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }
}

fn is_peer_closed(error: &std::io::Error) -> bool {
    matches!(
        error.kind(),
        std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::NotConnected
    )
}

/// Handles one client connection from registration to teardown.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    store: Arc<Store>,
    registry: Arc<ClientRegistry>,
    stats: Arc<ConnectionStats>,
) {
    stats.connection_opened();
    let client = registry.register_connection();
    let id = client.id();
    info!(client = %addr, id, "client connected");

    let (read_half, write_half) = stream.into_split();
    let mut reader = RespReader::new(read_half);
    let mut writer = RespWriter::new(write_half);

    let result: Result<bool, RespError> = async {
        loop {
            match dispatch(&mut reader, &mut writer, &store, &client).await? {
                Flow::Continue => stats.command_processed(),
                Flow::Quit => {
                    stats.command_processed();
                    return Ok(true);
                }
                Flow::Disconnect => return Ok(false),
            }
        }
    }
    .await;

    match result {
        Ok(quit) => {
            if quit {
                debug!(client = %addr, id, "client quit");
            } else {
                info!(client = %addr, id, "client disconnected");
            }
        }
        Err(RespError::Io(ref error)) if is_peer_closed(error) => {
            debug!(client = %addr, id, "connection closed by peer");
        }
        Err(RespError::Closed) => {
            debug!(client = %addr, id, "connection closed mid-command");
        }
        Err(error) => {
            warn!(client = %addr, id, error = %error, "session terminated");
        }
    }

    registry.drop_connection(id);
    stats.connection_closed();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn start_server() -> (
        SocketAddr,
        Arc<Store>,
        Arc<ClientRegistry>,
        Arc<ConnectionStats>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let store = Arc::new(Store::new());
        let registry = Arc::new(ClientRegistry::new());
        let stats = Arc::new(ConnectionStats::new());

        {
            let store = Arc::clone(&store);
            let registry = Arc::clone(&registry);
            let stats = Arc::clone(&stats);
            tokio::spawn(async move {
                while let Ok((stream, client_addr)) = listener.accept().await {
                    tokio::spawn(handle_connection(
                        stream,
                        client_addr,
                        Arc::clone(&store),
                        Arc::clone(&registry),
                        Arc::clone(&stats),
                    ));
                }
            });
        }

        (addr, store, registry, stats)
    }

    async fn exchange(client: &mut TcpStream, request: &[u8], expected: &[u8]) {
        client.write_all(request).await.unwrap();
        let mut buf = vec![0u8; expected.len()];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, expected);
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let (addr, _, _, _) = start_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        exchange(&mut client, b"*1\r\n$4\r\nPING\r\n", b"+PONG\r\n").await;
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let (addr, _, _, _) = start_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        exchange(
            &mut client,
            b"*3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$5\r\nhello\r\n",
            b"+OK\r\n",
        )
        .await;
        exchange(
            &mut client,
            b"*2\r\n$3\r\nGET\r\n$3\r\nkey\r\n",
            b"$5\r\nhello\r\n",
        )
        .await;
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let (addr, _, _, _) = start_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        exchange(&mut client, b"*2\r\n$3\r\nGET\r\n$4\r\nmiss\r\n", b"$-1\r\n").await;
    }

    #[tokio::test]
    async fn test_append_sequence() {
        let (addr, _, _, _) = start_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        exchange(
            &mut client,
            b"*3\r\n$6\r\nAPPEND\r\n$1\r\nk\r\n$3\r\nfoo\r\n",
            b":3\r\n",
        )
        .await;
        exchange(
            &mut client,
            b"*3\r\n$6\r\nAPPEND\r\n$1\r\nk\r\n$3\r\nbar\r\n",
            b":6\r\n",
        )
        .await;
    }

    #[tokio::test]
    async fn test_incr_sequence() {
        let (addr, _, _, _) = start_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        exchange(&mut client, b"*2\r\n$4\r\nINCR\r\n$3\r\ncnt\r\n", b":1\r\n").await;
        exchange(
            &mut client,
            b"*3\r\n$6\r\nINCRBY\r\n$3\r\ncnt\r\n$2\r\n10\r\n",
            b":11\r\n",
        )
        .await;
    }

    #[tokio::test]
    async fn test_incr_of_non_integer() {
        let (addr, _, _, _) = start_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        exchange(
            &mut client,
            b"*3\r\n$3\r\nSET\r\n$1\r\nx\r\n$1\r\na\r\n",
            b"+OK\r\n",
        )
        .await;
        exchange(
            &mut client,
            b"*2\r\n$4\r\nINCR\r\n$1\r\nx\r\n",
            b"-cannot perform incr or decr operation on non-integer value\r\n",
        )
        .await;
    }

    #[tokio::test]
    async fn test_pipelined_commands() {
        let (addr, _, _, _) = start_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        exchange(
            &mut client,
            b"*3\r\n$3\r\nSET\r\n$2\r\nk1\r\n$2\r\nv1\r\n\
              *3\r\n$3\r\nSET\r\n$2\r\nk2\r\n$2\r\nv2\r\n\
              *2\r\n$3\r\nGET\r\n$2\r\nk1\r\n\
              *2\r\n$3\r\nGET\r\n$2\r\nk2\r\n",
            b"+OK\r\n+OK\r\n$2\r\nv1\r\n$2\r\nv2\r\n",
        )
        .await;
    }

    #[tokio::test]
    async fn test_quit_closes_connection() {
        let (addr, _, _, _) = start_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        exchange(&mut client, b"*1\r\n$4\r\nQUIT\r\n", b"+OK\r\n").await;
        // The server closes its end after QUIT.
        let mut buf = [0u8; 16];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_registry_tracks_sessions() {
        let (addr, _, registry, stats) = start_server().await;
        assert_eq!(registry.len(), 0);

        let mut client = TcpStream::connect(addr).await.unwrap();
        exchange(&mut client, b"*1\r\n$4\r\nPING\r\n", b"+PONG\r\n").await;
        assert_eq!(registry.len(), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 1);
        assert!(stats.commands_processed.load(Ordering::Relaxed) >= 1);

        drop(client);
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        assert_eq!(registry.len(), 0);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_client_id_matches_registry() {
        let (addr, _, registry, _) = start_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"*2\r\n$6\r\nCLIENT\r\n$2\r\nID\r\n")
            .await
            .unwrap();
        let mut buf = [0u8; 32];
        let n = client.read(&mut buf).await.unwrap();
        let text = String::from_utf8_lossy(&buf[..n]).into_owned();
        let id: i64 = text
            .trim_start_matches(':')
            .trim_end_matches("\r\n")
            .parse()
            .unwrap();
        assert!(registry.get(id).is_some());
    }

    #[tokio::test]
    async fn test_protocol_error_terminates_session() {
        let (addr, _, _, _) = start_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        // LF without CR inside the envelope header is unframable.
        client.write_all(b"*1\n").await.unwrap();
        let mut buf = [0u8; 16];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_scan_over_socket() {
        let (addr, store, _, _) = start_server().await;
        for i in 0..5 {
            store.put(format!("s{i}").as_bytes(), crate::storage::Value::Int(i));
        }
        let mut client = TcpStream::connect(addr).await.unwrap();

        let mut collected = 0usize;
        let mut cursor = String::from("0");
        loop {
            let command = format!(
                "*4\r\n$4\r\nSCAN\r\n${}\r\n{}\r\n$5\r\nCOUNT\r\n$3\r\n100\r\n",
                cursor.len(),
                cursor
            );
            client.write_all(command.as_bytes()).await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = client.read(&mut buf).await.unwrap();
            let text = String::from_utf8_lossy(&buf[..n]).into_owned();
            assert!(text.starts_with("*2\r\n:"));
            collected += text.matches("\r\ns").count();
            let next = text["*2\r\n:".len()..]
                .split("\r\n")
                .next()
                .unwrap()
                .to_string();
            if next == "0" {
                break;
            }
            cursor = next;
        }
        assert_eq!(collected, 5);
    }
}
