//! RESP Protocol Implementation
//!
//! A streaming implementation of the Redis Serialization Protocol
//! (RESP2). The reader recovers typed values straight off the socket:
//! handlers pull arguments one at a time instead of parsing whole
//! messages up front. The writer emits the matching grammar.
//!
//! ## Modules
//!
//! - `types`: type prefixes, wire limits, and the `RespError` taxonomy
//! - `reader`: streaming typed reader with strict CRLF framing
//! - `writer`: buffered reply writer
//! - `params`: positional/flag argument parsing on top of the reader
//!
//! ## Example
//!
//! ```ignore
//! use cinderkv::protocol::{RespReader, RespWriter};
//!
//! let mut reader = RespReader::new(read_half);
//! let mut writer = RespWriter::new(write_half);
//!
//! let len = reader.read_array_header().await?;
//! let name = reader.read_string().await?;
//! writer.write_ok().await?;
//! writer.flush().await?;
//! ```

pub mod params;
pub mod reader;
pub mod types;
pub mod writer;

// Re-export commonly used types for convenience
pub use params::{Flag, ParamKind, ParamValue, ParsedParams, Positional};
pub use reader::{EnumArg, RespReader};
pub use types::{Kind, RespError, MAX_BULK_SIZE};
pub use writer::RespWriter;
