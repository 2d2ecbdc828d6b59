//! CinderKV - A RESP-Speaking In-Memory Key-Value Server
//!
//! This is the main entry point. It parses the configuration, builds the
//! store and client registry, opens the listen socket, and accepts
//! connections until a shutdown signal arrives.

use cinderkv::connection::{handle_connection, ClientRegistry, ConnectionStats};
use cinderkv::storage::{Store, DEFAULT_SEGMENTS, MAX_SEGMENTS};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpSocket};
use tokio::signal;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Listen backlog for the accept socket
const LISTEN_BACKLOG: u32 = 128;

/// Server configuration
struct Config {
    /// Host to bind to
    host: String,
    /// Port to listen on
    port: u16,
    /// Number of store segments (power of two)
    segments: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: cinderkv::DEFAULT_HOST.to_string(),
            port: cinderkv::DEFAULT_PORT,
            segments: DEFAULT_SEGMENTS,
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    if i + 1 < args.len() {
                        config.host = args[i + 1].clone();
                        i += 2;
                    } else {
                        eprintln!("Error: --host requires a value");
                        std::process::exit(1);
                    }
                }
                "--port" | "-p" => {
                    if i + 1 < args.len() {
                        config.port = args[i + 1].parse().unwrap_or_else(|_| {
                            eprintln!("Error: invalid port number");
                            std::process::exit(1);
                        });
                        i += 2;
                    } else {
                        eprintln!("Error: --port requires a value");
                        std::process::exit(1);
                    }
                }
                "--segments" | "-s" => {
                    if i + 1 < args.len() {
                        config.segments = args[i + 1].parse().unwrap_or_else(|_| {
                            eprintln!("Error: invalid segment count");
                            std::process::exit(1);
                        });
                        if !config.segments.is_power_of_two() || config.segments > MAX_SEGMENTS {
                            eprintln!(
                                "Error: segment count must be a power of two at most {MAX_SEGMENTS}"
                            );
                            std::process::exit(1);
                        }
                        i += 2;
                    } else {
                        eprintln!("Error: --segments requires a value");
                        std::process::exit(1);
                    }
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("CinderKV version {}", cinderkv::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }

    /// Returns the bind address as a string
    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn print_help() {
    println!(
        r#"
CinderKV - A RESP-Speaking In-Memory Key-Value Server

USAGE:
    cinderkv [OPTIONS]

OPTIONS:
    -h, --host <HOST>         Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>         Port to listen on (default: 6000)
    -s, --segments <N>        Store segments, power of two (default: 16)
    -v, --version             Print version information
        --help                Print this help message

EXAMPLES:
    cinderkv                          # Start on 127.0.0.1:6000
    cinderkv --port 6380              # Start on port 6380
    cinderkv --host 0.0.0.0 -s 64     # All interfaces, 64 segments

CONNECTING:
    Use redis-cli or any RESP client to connect:
    $ redis-cli -p 6000
    127.0.0.1:6000> PING
    PONG
    127.0.0.1:6000> SET name cinder
    OK
    127.0.0.1:6000> GET name
    "cinder"
"#
    );
}

/// Opens the listen socket with address reuse enabled and the fixed
/// backlog.
fn bind_listener(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    #[cfg(unix)]
    socket.set_reuseport(true)?;
    socket.bind(addr)?;
    socket.listen(LISTEN_BACKLOG)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args();

    // Set up logging
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let addr: SocketAddr = config.bind_address().parse()?;

    // Shared server state
    let store = Arc::new(Store::with_segments(config.segments));
    info!(segments = config.segments, "store initialized");
    let registry = Arc::new(ClientRegistry::new());
    let stats = Arc::new(ConnectionStats::new());

    let listener = bind_listener(addr)?;
    info!(%addr, "listening");

    // Set up graceful shutdown
    let shutdown = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
        info!("shutdown signal received, stopping server");
    };

    tokio::select! {
        _ = accept_loop(listener, store, registry, stats) => {}
        _ = shutdown => {}
    }

    info!("server shutdown complete");
    Ok(())
}

/// Main loop that accepts incoming connections
async fn accept_loop(
    listener: TcpListener,
    store: Arc<Store>,
    registry: Arc<ClientRegistry>,
    stats: Arc<ConnectionStats>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let store = Arc::clone(&store);
                let registry = Arc::clone(&registry);
                let stats = Arc::clone(&stats);
                tokio::spawn(async move {
                    handle_connection(stream, addr, store, registry, stats).await;
                });
            }
            Err(e) => {
                error!("failed to accept connection: {}", e);
            }
        }
    }
}
