//! Per-Command Execution Context
//!
//! A `Context` binds everything one handler invocation needs: the
//! reader (arguments are still on the wire when the handler starts), the
//! writer, the store, and the borrowed client. It also does the argument
//! bookkeeping: every read bumps a counter against the envelope's
//! declared argument count, so the dispatcher can always drain exactly
//! the arguments a handler left behind.
//!
//! Counts stay accurate across recoverable failures because a rejected
//! value has, by the reader's framing discipline, already left the
//! stream.

use crate::connection::registry::Client;
use crate::protocol::params::{Flag, ParsedParams, Positional};
use crate::protocol::reader::{EnumArg, RespReader};
use crate::protocol::types::RespError;
use crate::protocol::writer::RespWriter;
use crate::storage::Store;
use bytes::Bytes;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

/// Everything a command handler gets to work with.
pub struct Context<'a, R, W> {
    pub reader: &'a mut RespReader<R>,
    pub writer: &'a mut RespWriter<W>,
    pub store: &'a Store,
    pub client: &'a Arc<Client>,
    /// Lowercased command name, used in error replies
    name: String,
    /// Arguments the envelope declared after the command name
    args: usize,
    /// Arguments consumed so far
    read: usize,
}

impl<'a, R, W> Context<'a, R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(
        reader: &'a mut RespReader<R>,
        writer: &'a mut RespWriter<W>,
        store: &'a Store,
        client: &'a Arc<Client>,
        name: String,
        args: usize,
    ) -> Self {
        Self {
            reader,
            writer,
            store,
            client,
            name,
            args,
            read: 0,
        }
    }

    /// The lowercased command name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Arguments declared by the envelope.
    pub fn arg_count(&self) -> usize {
        self.args
    }

    /// Arguments not yet consumed.
    pub fn remaining(&self) -> usize {
        self.args - self.read
    }

    async fn fail_arity(&mut self) -> Result<(), RespError> {
        let message = format!("wrong number of arguments for '{}' command", self.name);
        self.writer.write_error(&message).await?;
        self.discard_remaining().await
    }

    /// Checks for exactly `n` arguments; on mismatch replies with the
    /// arity error, drains the rest, and returns false.
    pub async fn exact_arg_num(&mut self, n: usize) -> Result<bool, RespError> {
        if self.args == n {
            return Ok(true);
        }
        self.fail_arity().await?;
        Ok(false)
    }

    /// Checks for at least `n` arguments.
    pub async fn min_arg_num(&mut self, n: usize) -> Result<bool, RespError> {
        if self.args >= n {
            return Ok(true);
        }
        self.fail_arity().await?;
        Ok(false)
    }

    /// Checks for at most `n` arguments.
    pub async fn max_arg_num(&mut self, n: usize) -> Result<bool, RespError> {
        if self.args <= n {
            return Ok(true);
        }
        self.fail_arity().await?;
        Ok(false)
    }

    /// Reads one (nullable) string argument.
    pub async fn read_string(&mut self) -> Result<Option<Bytes>, RespError> {
        let value = self.reader.read_string().await;
        self.read += 1;
        value
    }

    /// Reads one string argument, rejecting the null form.
    pub async fn read_required_string(&mut self) -> Result<Bytes, RespError> {
        match self.read_string().await? {
            Some(value) => Ok(value),
            None => Err(RespError::InvalidValue(
                "null where non-null value is required".to_string(),
            )),
        }
    }

    /// Reads one native integer argument.
    pub async fn read_i64(&mut self) -> Result<i64, RespError> {
        let value = self.reader.read_i64().await;
        self.read += 1;
        value
    }

    /// Reads one integer argument in native or string form.
    pub async fn read_i64_string(&mut self) -> Result<i64, RespError> {
        let value = self.reader.read_i64_string().await;
        self.read += 1;
        value
    }

    /// Reads one string argument and resolves it to an enum variant.
    pub async fn read_enum<T: EnumArg>(&mut self) -> Result<T, RespError> {
        let value = self.reader.read_enum::<T>().await;
        self.read += 1;
        value
    }

    /// Parses the remaining arguments against a positional/flag
    /// specification. Consumption is tracked even when the parse fails
    /// partway through.
    pub async fn read_parameters(
        &mut self,
        positionals: &[Positional],
        flags: &[Flag],
    ) -> Result<ParsedParams, RespError> {
        let max = self.remaining();
        let mut consumed = 0;
        let result = self
            .reader
            .read_parameters(max, positionals, flags, &mut consumed)
            .await;
        self.read += consumed;
        result
    }

    /// Discards every argument not yet consumed.
    pub async fn discard_remaining(&mut self) -> Result<(), RespError> {
        let leftover = self.remaining();
        if leftover > 0 {
            self.reader.discard_n_values(leftover).await?;
            self.read = self.args;
        }
        Ok(())
    }
}
