//! Command Processing Module
//!
//! Frames command envelopes off the wire, routes them by lowercased name,
//! and executes the handlers against the store.
//!
//! ## Architecture
//!
//! ```text
//! Client bytes
//!       │
//!       ▼
//! ┌─────────────────┐
//! │   RespReader    │  (protocol module)
//! └────────┬────────┘
//!          │ typed arguments, read lazily
//!          ▼
//! ┌─────────────────┐
//! │    dispatch     │  (this module)
//! │                 │
//! │  - frame        │
//! │  - route        │
//! │  - drain        │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │      Store      │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `PING`, `QUIT`, `COMMAND`
//! - `GET`, `SET`, `DEL`, `APPEND`
//! - `INCR`, `DECR`, `INCRBY`, `DECRBY`
//! - `CLIENT ID`, `CLIENT SETNAME`
//! - `SCAN cursor [MATCH pattern] [COUNT n]`

pub mod context;
pub mod handler;

// Re-export the dispatch entry point
pub use context::Context;
pub use handler::{dispatch, Flow};
