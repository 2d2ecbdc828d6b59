//! Positional and Flag Parameter Parsing
//!
//! Commands like SCAN mix positional arguments with optional
//! `NAME value` flag pairs. `read_parameters` consumes up to `max`
//! arguments from the current command envelope in two phases:
//!
//! 1. **Positional phase**: one value per positional field, in order.
//!    When an *optional* field sees a value that is actually a known flag
//!    name, the positional phase ends and that value starts the flag
//!    phase instead.
//! 2. **Flag phase**: alternating flag names and values. A bool flag is
//!    presence-only and consumes no value.
//!
//! Whatever the parse does not consume stays in the stream for the caller
//! to discard; the `consumed` counter is kept accurate even across
//! recoverable rejections so argument accounting never drifts.

use crate::protocol::reader::{parse_i64_bytes, RespReader};
use crate::protocol::types::{Kind, RespError};
use bytes::Bytes;
use tokio::io::AsyncRead;

/// The value shape of a positional field or flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// An integer, accepted in native or string form
    I64,
    /// An owned byte string
    Bytes,
    /// Presence-only; legal for flags, not for positionals
    Bool,
}

/// One positional field. Optional fields may only follow required ones.
#[derive(Debug, Clone, Copy)]
pub struct Positional {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
}

/// One flag. Flags are always optional and matched case-insensitively;
/// `name` must be lowercase.
#[derive(Debug, Clone, Copy)]
pub struct Flag {
    pub name: &'static str,
    pub kind: ParamKind,
}

/// A populated parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    I64(i64),
    Bytes(Bytes),
    Bool(bool),
}

/// The outcome of a `read_parameters` call: populated positional and flag
/// slots (indexed like the specifications) plus the number of arguments
/// consumed from the envelope.
#[derive(Debug)]
pub struct ParsedParams {
    pub positionals: Vec<Option<ParamValue>>,
    pub flags: Vec<Option<ParamValue>>,
    pub consumed: usize,
}

impl ParsedParams {
    pub fn positional_i64(&self, index: usize) -> Option<i64> {
        match self.positionals.get(index)? {
            Some(ParamValue::I64(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn flag_i64(&self, index: usize) -> Option<i64> {
        match self.flags.get(index)? {
            Some(ParamValue::I64(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn flag_bytes(&self, index: usize) -> Option<&Bytes> {
        match self.flags.get(index)? {
            Some(ParamValue::Bytes(value)) => Some(value),
            _ => None,
        }
    }

    pub fn flag_present(&self, index: usize) -> bool {
        matches!(
            self.flags.get(index),
            Some(Some(ParamValue::Bool(true)))
        )
    }
}

fn flag_index(flags: &[Flag], name: &[u8]) -> Option<usize> {
    flags
        .iter()
        .position(|flag| name.eq_ignore_ascii_case(flag.name.as_bytes()))
}

fn validate_spec(positionals: &[Positional]) -> Result<(), RespError> {
    let mut seen_optional = false;
    for field in positionals {
        if field.kind == ParamKind::Bool {
            return Err(RespError::InvalidParameters(
                "bool is not a valid positional kind".to_string(),
            ));
        }
        if field.required && seen_optional {
            return Err(RespError::InvalidParameters(
                "required parameter after optional one".to_string(),
            ));
        }
        seen_optional |= !field.required;
    }
    Ok(())
}

impl<R: AsyncRead + Unpin> RespReader<R> {
    /// Reads up to `max` arguments against a positional and flag
    /// specification. See the module docs for the two-phase algorithm.
    ///
    /// `consumed` is updated as each argument leaves the stream, including
    /// on recoverable failures, so the caller can always discard the
    /// correct number of remaining arguments.
    pub async fn read_parameters(
        &mut self,
        max: usize,
        positionals: &[Positional],
        flags: &[Flag],
        consumed: &mut usize,
    ) -> Result<ParsedParams, RespError> {
        validate_spec(positionals)?;

        let mut out_positionals: Vec<Option<ParamValue>> = vec![None; positionals.len()];
        let mut out_flags: Vec<Option<ParamValue>> = vec![None; flags.len()];

        for (index, field) in positionals.iter().enumerate() {
            if *consumed >= max {
                break;
            }
            match field.kind {
                ParamKind::Bytes => {
                    let value = self.read_string().await;
                    *consumed += 1;
                    let value = value?;
                    if let Some(value) = &value {
                        if !field.required {
                            if let Some(fi) = flag_index(flags, value) {
                                self.assign_flag(&flags[fi], fi, &mut out_flags, max, consumed)
                                    .await?;
                                break;
                            }
                        }
                    }
                    out_positionals[index] = value.map(ParamValue::Bytes);
                }
                ParamKind::I64 => {
                    match self.read_type_prefix().await? {
                        Kind::Integer => {
                            let value = self.read_integer_body().await;
                            *consumed += 1;
                            out_positionals[index] = Some(ParamValue::I64(value?));
                        }
                        kind @ (Kind::SimpleString | Kind::BulkString) => {
                            let body = match kind {
                                Kind::SimpleString => {
                                    let body = self.read_simple_body().await;
                                    *consumed += 1;
                                    Some(body?)
                                }
                                _ => {
                                    let body = self.read_bulk_body().await;
                                    *consumed += 1;
                                    body?
                                }
                            };
                            let body = body.ok_or_else(|| {
                                RespError::InvalidParameters(format!(
                                    "expected integer for '{}' parameter",
                                    field.name
                                ))
                            })?;
                            match parse_i64_bytes(&body) {
                                Ok(value) => {
                                    out_positionals[index] = Some(ParamValue::I64(value));
                                }
                                Err(_) => {
                                    let fi = (!field.required)
                                        .then(|| flag_index(flags, &body))
                                        .flatten();
                                    match fi {
                                        Some(fi) => {
                                            self.assign_flag(
                                                &flags[fi],
                                                fi,
                                                &mut out_flags,
                                                max,
                                                consumed,
                                            )
                                            .await?;
                                            break;
                                        }
                                        None => {
                                            return Err(RespError::InvalidParameters(format!(
                                                "expected integer for '{}' parameter",
                                                field.name
                                            )))
                                        }
                                    }
                                }
                            }
                        }
                        _ => {
                            return Err(RespError::Protocol(
                                "expected string or integer value",
                            ))
                        }
                    }
                }
                // Rejected by validate_spec
                ParamKind::Bool => unreachable!(),
            }
        }

        // Flag phase: runs after the positionals are satisfied or after an
        // optional positional turned out to be a flag name. With no flags
        // declared, the remaining arguments stay in the stream.
        if !flags.is_empty() {
            while *consumed < max {
                let name = self.read_string().await;
                *consumed += 1;
                let name = name?.ok_or_else(|| {
                    RespError::InvalidParameters("null parameter name".to_string())
                })?;
                match flag_index(flags, &name) {
                    Some(fi) => {
                        self.assign_flag(&flags[fi], fi, &mut out_flags, max, consumed)
                            .await?;
                    }
                    None => {
                        return Err(RespError::InvalidParameters(format!(
                            "unknown parameter '{}'",
                            String::from_utf8_lossy(&name)
                        )))
                    }
                }
            }
        }

        Ok(ParsedParams {
            positionals: out_positionals,
            flags: out_flags,
            consumed: *consumed,
        })
    }

    async fn assign_flag(
        &mut self,
        flag: &Flag,
        index: usize,
        out: &mut [Option<ParamValue>],
        max: usize,
        consumed: &mut usize,
    ) -> Result<(), RespError> {
        match flag.kind {
            ParamKind::Bool => {
                out[index] = Some(ParamValue::Bool(true));
                Ok(())
            }
            ParamKind::I64 => {
                if *consumed >= max {
                    return Err(RespError::InvalidParameters(format!(
                        "parameter '{}' requires a value",
                        flag.name
                    )));
                }
                let value = self.read_i64_string().await;
                *consumed += 1;
                out[index] = Some(ParamValue::I64(value?));
                Ok(())
            }
            ParamKind::Bytes => {
                if *consumed >= max {
                    return Err(RespError::InvalidParameters(format!(
                        "parameter '{}' requires a value",
                        flag.name
                    )));
                }
                let value = self.read_string().await;
                *consumed += 1;
                match value? {
                    Some(value) => {
                        out[index] = Some(ParamValue::Bytes(value));
                        Ok(())
                    }
                    None => Err(RespError::InvalidParameters(format!(
                        "parameter '{}' requires a value",
                        flag.name
                    ))),
                }
            }
        }
    }
}
