//! RESP Reply Writer
//!
//! Emits the same grammar the reader consumes. Output goes through a
//! `BufWriter`, so a handler can assemble a multi-part reply (array
//! header plus elements) without a syscall per token; `flush` pushes the
//! assembled reply to the socket once the command completes.
//!
//! The writer tracks whether any reply bytes have been produced since
//! `begin_command`. The dispatcher consults that flag before converting a
//! recoverable failure into an error reply: once a partial reply is on
//! the wire, an interleaved error line would corrupt the frame and the
//! session must end instead.

use crate::protocol::types::{prefix, RespError, CRLF, MAX_BULK_SIZE};
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

/// A buffered RESP value writer over any async byte sink.
pub struct RespWriter<W> {
    inner: BufWriter<W>,
    dirty: bool,
}

impl<W: AsyncWrite + Unpin> RespWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: BufWriter::new(inner),
            dirty: false,
        }
    }

    /// Resets the per-command output flag.
    pub fn begin_command(&mut self) {
        self.dirty = false;
    }

    /// True once any reply bytes have been produced for the current
    /// command.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    async fn put(&mut self, bytes: &[u8]) -> Result<(), RespError> {
        self.dirty = true;
        self.inner.write_all(bytes).await?;
        Ok(())
    }

    async fn put_line(&mut self, prefix: u8, body: &[u8]) -> Result<(), RespError> {
        self.put(&[prefix]).await?;
        self.put(body).await?;
        self.put(CRLF).await
    }

    /// Emits `:<n>\r\n`.
    pub async fn write_integer(&mut self, value: i64) -> Result<(), RespError> {
        self.put_line(prefix::INTEGER, value.to_string().as_bytes())
            .await
    }

    /// Emits `*<n>\r\n`.
    pub async fn write_array_header(&mut self, len: i64) -> Result<(), RespError> {
        self.put_line(prefix::ARRAY, len.to_string().as_bytes())
            .await
    }

    /// Emits `$<len>\r\n<bytes>\r\n`.
    pub async fn write_bulk_string(&mut self, body: &[u8]) -> Result<(), RespError> {
        if body.len() > MAX_BULK_SIZE {
            return Err(RespError::InvalidValue(
                "bulk string exceeds maximum length".to_string(),
            ));
        }
        self.put_line(prefix::BULK_STRING, body.len().to_string().as_bytes())
            .await?;
        self.put(body).await?;
        self.put(CRLF).await
    }

    /// Emits the null bulk string `$-1\r\n`.
    pub async fn write_null(&mut self) -> Result<(), RespError> {
        self.put_line(prefix::BULK_STRING, b"-1").await
    }

    /// Emits `+<body>\r\n`.
    pub async fn write_simple_string(&mut self, body: &[u8]) -> Result<(), RespError> {
        self.put_line(prefix::SIMPLE_STRING, body).await
    }

    /// Emits `+OK\r\n`.
    pub async fn write_ok(&mut self) -> Result<(), RespError> {
        self.put(b"+OK\r\n").await
    }

    /// Emits `-<message>\r\n`.
    pub async fn write_error(&mut self, message: &str) -> Result<(), RespError> {
        self.put_line(prefix::ERROR, message.as_bytes()).await
    }

    /// Flushes buffered reply bytes to the sink.
    pub async fn flush(&mut self) -> Result<(), RespError> {
        self.inner.flush().await?;
        Ok(())
    }

    /// Unwraps the underlying sink, discarding any unflushed bytes.
    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }
}
