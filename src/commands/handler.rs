//! Command Dispatch and Handlers
//!
//! One `dispatch` call frames and executes one command: it reads the
//! envelope header, lowercases the command name, routes it through the
//! dispatch table, and guarantees the stream is framed again before
//! returning, whatever the handler did.
//!
//! ## Error mapping
//!
//! ```text
//!            ┌── recoverable (InvalidValue / InvalidParameters)
//!            │     └─> error reply, drain arguments, continue
//! handler ───┤
//!            └── fatal (Io / Protocol / RecursionLimit / Closed)
//!                  └─> bubbled to the connection loop, session ends
//! ```
//!
//! A recoverable failure is downgraded only while the writer is still
//! clean for the current command; once a partial reply is on the wire an
//! interleaved error line would corrupt the frame, so the session ends
//! instead.

use crate::commands::context::Context;
use crate::connection::registry::Client;
use crate::protocol::params::{Flag, ParamKind, Positional};
use crate::protocol::reader::{EnumArg, RespReader};
use crate::protocol::types::RespError;
use crate::protocol::writer::RespWriter;
use crate::storage::{Store, Value};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::warn;

/// What the connection loop should do after a command completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading commands
    Continue,
    /// The client asked to quit; close cleanly
    Quit,
    /// The peer closed the stream at an envelope boundary
    Disconnect,
}

/// Reads and executes one command envelope.
pub async fn dispatch<R, W>(
    reader: &mut RespReader<R>,
    writer: &mut RespWriter<W>,
    store: &Store,
    client: &Arc<Client>,
) -> Result<Flow, RespError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    writer.begin_command();

    let len = match reader.read_array_header().await {
        Ok(len) => len,
        Err(RespError::Closed) => return Ok(Flow::Disconnect),
        Err(error) => return Err(error),
    };
    if len <= 0 {
        return Err(RespError::Protocol("empty command envelope"));
    }

    let mut name = match reader.read_string().await {
        Ok(Some(name)) => name.to_vec(),
        Ok(None) => return Err(RespError::Protocol("null command name")),
        // A rejected name leaves the stream framed; refuse the command
        // but keep the session.
        Err(error) if error.is_recoverable() => {
            writer.write_error(&error.to_string()).await?;
            reader.discard_n_values((len - 1) as usize).await?;
            writer.flush().await?;
            return Ok(Flow::Continue);
        }
        Err(error) => return Err(error),
    };
    name.make_ascii_lowercase();
    let args = (len - 1) as usize;

    let mut ctx = Context::new(
        reader,
        writer,
        store,
        client,
        String::from_utf8_lossy(&name).into_owned(),
        args,
    );

    let flow = match run_command(&mut ctx, &name).await {
        Ok(flow) => {
            let leftover = ctx.remaining();
            if leftover > 0 {
                warn!(command = %ctx.name(), leftover, "handler left arguments unread");
                ctx.discard_remaining().await?;
            }
            flow
        }
        Err(error) if error.is_recoverable() && !ctx.writer.is_dirty() => {
            ctx.writer.write_error(&error.to_string()).await?;
            ctx.discard_remaining().await?;
            Flow::Continue
        }
        Err(error) => return Err(error),
    };

    writer.flush().await?;
    Ok(flow)
}

async fn run_command<R, W>(ctx: &mut Context<'_, R, W>, name: &[u8]) -> Result<Flow, RespError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match name {
        b"ping" => cmd_ping(ctx).await,
        b"quit" => cmd_quit(ctx).await,
        b"get" => cmd_get(ctx).await,
        b"set" => cmd_set(ctx).await,
        b"del" => cmd_del(ctx).await,
        b"append" => cmd_append(ctx).await,
        b"incr" => cmd_incr(ctx, 1, false).await,
        b"decr" => cmd_incr(ctx, -1, false).await,
        b"incrby" => cmd_incr(ctx, 1, true).await,
        b"decrby" => cmd_incr(ctx, -1, true).await,
        b"client" => cmd_client(ctx).await,
        b"command" => cmd_command(ctx).await,
        b"scan" => cmd_scan(ctx).await,
        _ => {
            let message = format!("unknown command '{}'", ctx.name());
            ctx.writer.write_error(&message).await?;
            ctx.discard_remaining().await?;
            Ok(Flow::Continue)
        }
    }
}

async fn cmd_ping<R, W>(ctx: &mut Context<'_, R, W>) -> Result<Flow, RespError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if !ctx.exact_arg_num(0).await? {
        return Ok(Flow::Continue);
    }
    ctx.writer.write_simple_string(b"PONG").await?;
    Ok(Flow::Continue)
}

async fn cmd_quit<R, W>(ctx: &mut Context<'_, R, W>) -> Result<Flow, RespError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if !ctx.exact_arg_num(0).await? {
        return Ok(Flow::Continue);
    }
    ctx.writer.write_ok().await?;
    Ok(Flow::Quit)
}

async fn cmd_get<R, W>(ctx: &mut Context<'_, R, W>) -> Result<Flow, RespError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if !ctx.exact_arg_num(1).await? {
        return Ok(Flow::Continue);
    }
    let key = ctx.read_required_string().await?;
    match ctx.store.get(&key) {
        None => ctx.writer.write_null().await?,
        Some(entry) => {
            // Copy out under the entry's lock; reply after it is gone.
            let value = entry.snapshot();
            match value {
                Value::Int(n) => ctx.writer.write_integer(n).await?,
                Value::Bytes(bytes) => ctx.writer.write_bulk_string(&bytes).await?,
            }
        }
    }
    Ok(Flow::Continue)
}

async fn cmd_set<R, W>(ctx: &mut Context<'_, R, W>) -> Result<Flow, RespError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if !ctx.min_arg_num(2).await? {
        return Ok(Flow::Continue);
    }
    let key = ctx.read_required_string().await?;
    let value = ctx.read_string().await?;
    // Options beyond key and value are accepted and ignored.
    ctx.discard_remaining().await?;

    match value {
        Some(value) => match ctx.store.get(&key) {
            Some(entry) => entry.set(Value::from_bytes(&value)),
            None => ctx.store.put(&key, Value::from_bytes(&value)),
        },
        // A null value unsets the key.
        None => {
            ctx.store.del(&key);
        }
    }
    ctx.writer.write_ok().await?;
    Ok(Flow::Continue)
}

async fn cmd_del<R, W>(ctx: &mut Context<'_, R, W>) -> Result<Flow, RespError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if !ctx.min_arg_num(1).await? {
        return Ok(Flow::Continue);
    }
    let mut removed: i64 = 0;
    for _ in 0..ctx.arg_count() {
        let key = ctx.read_required_string().await?;
        if ctx.store.del(&key) {
            removed += 1;
        }
    }
    ctx.writer.write_integer(removed).await?;
    Ok(Flow::Continue)
}

async fn cmd_append<R, W>(ctx: &mut Context<'_, R, W>) -> Result<Flow, RespError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if !ctx.min_arg_num(2).await? {
        return Ok(Flow::Continue);
    }
    let key = ctx.read_required_string().await?;
    let value = match ctx.read_string().await? {
        Some(value) => value,
        None => {
            return Err(RespError::InvalidValue(
                "invalid value for 'append' command".to_string(),
            ))
        }
    };
    let entry = ctx
        .store
        .get_or_insert_with(&key, || Value::Bytes(Vec::new()));
    let new_len = entry.append(&value);
    ctx.writer.write_integer(new_len as i64).await?;
    Ok(Flow::Continue)
}

/// INCR, DECR, INCRBY, DECRBY. `sign` is the direction; `with_delta`
/// selects the two-argument forms.
async fn cmd_incr<R, W>(
    ctx: &mut Context<'_, R, W>,
    sign: i64,
    with_delta: bool,
) -> Result<Flow, RespError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let expected = if with_delta { 2 } else { 1 };
    if !ctx.exact_arg_num(expected).await? {
        return Ok(Flow::Continue);
    }
    let key = ctx.read_required_string().await?;
    let delta = if with_delta {
        ctx.read_i64_string().await?
    } else {
        1
    };
    let delta = if sign < 0 {
        match delta.checked_neg() {
            Some(delta) => delta,
            None => {
                ctx.writer
                    .write_error("operation resulted in integer overflow")
                    .await?;
                return Ok(Flow::Continue);
            }
        }
    } else {
        delta
    };

    let entry = ctx.store.get_or_insert_with(&key, || Value::Int(0));
    match entry.incr_by(delta) {
        Ok(value) => ctx.writer.write_integer(value).await?,
        Err(error) => ctx.writer.write_error(&error.to_string()).await?,
    }
    Ok(Flow::Continue)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientSubcommand {
    Id,
    SetName,
}

impl EnumArg for ClientSubcommand {
    fn from_name(name: &[u8]) -> Option<Self> {
        if name.eq_ignore_ascii_case(b"id") {
            Some(ClientSubcommand::Id)
        } else if name.eq_ignore_ascii_case(b"setname") {
            Some(ClientSubcommand::SetName)
        } else {
            None
        }
    }
}

async fn cmd_client<R, W>(ctx: &mut Context<'_, R, W>) -> Result<Flow, RespError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if !ctx.min_arg_num(1).await? {
        return Ok(Flow::Continue);
    }
    let subcommand = match ctx.read_enum::<ClientSubcommand>().await {
        Ok(subcommand) => subcommand,
        Err(RespError::InvalidValue(_)) => {
            return Err(RespError::InvalidValue(
                "unknown subcommand for 'client' command".to_string(),
            ))
        }
        Err(error) => return Err(error),
    };
    match subcommand {
        ClientSubcommand::Id => {
            if !ctx.exact_arg_num(1).await? {
                return Ok(Flow::Continue);
            }
            ctx.writer.write_integer(ctx.client.id()).await?;
        }
        ClientSubcommand::SetName => {
            if !ctx.exact_arg_num(2).await? {
                return Ok(Flow::Continue);
            }
            let name = ctx.read_string().await?.filter(|name| !name.is_empty());
            ctx.client.set_name(name);
            ctx.writer.write_ok().await?;
        }
    }
    Ok(Flow::Continue)
}

async fn cmd_command<R, W>(ctx: &mut Context<'_, R, W>) -> Result<Flow, RespError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    ctx.discard_remaining().await?;
    ctx.writer.write_array_header(0).await?;
    Ok(Flow::Continue)
}

const SCAN_POSITIONALS: &[Positional] = &[Positional {
    name: "cursor",
    kind: ParamKind::I64,
    required: false,
}];

const SCAN_FLAGS: &[Flag] = &[
    Flag {
        name: "match",
        kind: ParamKind::Bytes,
    },
    Flag {
        name: "count",
        kind: ParamKind::I64,
    },
];

const SCAN_FLAG_MATCH: usize = 0;
const SCAN_FLAG_COUNT: usize = 1;

/// Default number of keys produced per SCAN call
const SCAN_DEFAULT_COUNT: i64 = 10;

async fn cmd_scan<R, W>(ctx: &mut Context<'_, R, W>) -> Result<Flow, RespError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    // cursor plus two name/value flag pairs at most
    if !ctx.max_arg_num(5).await? {
        return Ok(Flow::Continue);
    }
    let params = ctx.read_parameters(SCAN_POSITIONALS, SCAN_FLAGS).await?;
    let cursor = params.positional_i64(0).unwrap_or(0) as u64;
    let count = params
        .flag_i64(SCAN_FLAG_COUNT)
        .unwrap_or(SCAN_DEFAULT_COUNT)
        .max(1) as usize;
    let pattern = params
        .flag_bytes(SCAN_FLAG_MATCH)
        .map(|pattern| pattern.to_vec())
        .unwrap_or_else(|| b"*".to_vec());

    let (next_cursor, keys) = ctx.store.scan(cursor, count, &pattern);

    ctx.writer.write_array_header(2).await?;
    ctx.writer.write_integer(next_cursor as i64).await?;
    ctx.writer.write_array_header(keys.len() as i64).await?;
    for key in &keys {
        ctx.writer.write_bulk_string(key).await?;
    }
    Ok(Flow::Continue)
}
