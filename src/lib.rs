//! # CinderKV - A RESP-Speaking In-Memory Key-Value Server
//!
//! CinderKV is a minimal Redis-compatible data engine written in Rust.
//! It accepts TCP connections, reads RESP-encoded commands from the socket
//! as a typed stream, dispatches them against a segmented concurrent
//! key-value store, and writes RESP-encoded replies.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            CinderKV                             │
//! │                                                                 │
//! │  ┌─────────────┐    ┌─────────────┐    ┌──────────────┐         │
//! │  │ TCP Server  │───>│ Connection  │───>│   Command    │         │
//! │  │ (Listener)  │    │    Task     │    │   Dispatch   │         │
//! │  └─────────────┘    └─────────────┘    └──────┬───────┘         │
//! │                                               │                 │
//! │       bytes ──> RespReader ──> typed args ────┤                 │
//! │       bytes <── RespWriter <── replies    <───┘                 │
//! │                                               │                 │
//! │                     ┌─────────────────────────▼──────────────┐  │
//! │                     │                 Store                  │  │
//! │                     │  ┌─────────┐ ┌─────────┐ ┌─────────┐   │  │
//! │                     │  │ Seg 0   │ │ Seg 1   │ │ ...N    │   │  │
//! │                     │  │ RwLock  │ │ RwLock  │ │ RwLock  │   │  │
//! │                     │  └─────────┘ └─────────┘ └─────────┘   │  │
//! │                     └────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: streaming RESP reader and writer with strict framing
//! - [`storage`]: segmented store, reference-counted entries, glob matcher
//! - [`commands`]: per-command handlers and the dispatch table
//! - [`connection`]: connection lifecycle, client registry, statistics
//!
//! ## Design Highlights
//!
//! Arguments are read from the wire lazily: a handler pulls exactly the
//! values it needs through the reader, and the dispatcher drains whatever
//! is left so the stream stays framed between commands.
//!
//! Every entry is shared by reference count (`Arc`), so a reader holding
//! a borrowed entry keeps its value alive even while another connection
//! deletes or replaces the key. Locks are held only long enough to touch
//! the map or the value, never across socket IO.

pub mod commands;
pub mod connection;
pub mod protocol;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::{dispatch, Flow};
pub use connection::{handle_connection, Client, ClientRegistry, ConnectionStats};
pub use protocol::{RespError, RespReader, RespWriter};
pub use storage::{Entry, Store, Value};

/// The default port CinderKV listens on
pub const DEFAULT_PORT: u16 = 6000;

/// The default host CinderKV binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of CinderKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
