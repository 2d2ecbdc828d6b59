//! Connection Management Module
//!
//! Owns everything about a session that is not a command: accepting a
//! socket into a task, client identity, statistics, and the error policy
//! that decides when a session ends.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                      (main.rs)                              │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │ accept()
//!                        ▼
//!           ┌────────────────────────┐
//!           │ registry.register()    │
//!           └────────────┬───────────┘
//!                        │ spawn task
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  handle_connection                          │
//! │                                                             │
//! │   RespReader ──> dispatch ──> RespWriter ──> flush          │
//! │        ▲                                       │            │
//! │        └────────────── next command ◄──────────┘            │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod handler;
pub mod registry;

// Re-export commonly used types
pub use handler::{handle_connection, ConnectionStats};
pub use registry::{Client, ClientRegistry};
