//! Command dispatch table
//!
//! Built once at startup from an explicit list. Each server-bound
//! identity maps to one handler and an argument binding mode.

use futures::future::BoxFuture;
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;

use super::protocol::{Command, CommandName, CommandSide};
use crate::handlers::HandlerError;

/// Future returned by every handler
pub type HandlerFuture = BoxFuture<'static, Result<(), HandlerError>>;

/// Handler entry point; non-capturing closures coerce to this
pub type HandlerFn<C> = fn(C, BoundArgs) -> HandlerFuture;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("No handler registered for {0}")]
    NoHandler(CommandName),
    #[error("Direction mismatch for {name}: received {received:?}, declared {declared:?}")]
    DirectionMismatch {
        name: CommandName,
        received: CommandSide,
        declared: CommandSide,
    },
    #[error("Handler already registered for {0}")]
    DuplicateHandler(CommandName),
    #[error("Cannot register a handler for client-bound {0}")]
    ClientBound(CommandName),
    #[error("Bad arguments for {name}: {source}")]
    Arguments {
        name: CommandName,
        #[source]
        source: ArgumentError,
    },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ArgumentError {
    #[error("Expected {expected} arguments, got {actual}")]
    Arity { expected: usize, actual: usize },
    #[error("Argument {index} '{value}' is not a valid {kind:?}")]
    InvalidValue {
        index: usize,
        kind: ArgKind,
        value: String,
    },
    #[error("Argument {0} is missing")]
    Missing(usize),
    #[error("Argument {index} is not a {expected:?}")]
    TypeMismatch { index: usize, expected: ArgKind },
    #[error("Argument {index} payload: {message}")]
    Payload { index: usize, message: String },
}

/// Declared type of a positional parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Bool,
    Int,
    Float,
    Str,
    Json,
}

/// A converted positional argument
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Json(serde_json::Value),
}

impl ArgKind {
    fn convert(self, index: usize, raw: &str) -> Result<ArgValue, ArgumentError> {
        let invalid = || ArgumentError::InvalidValue {
            index,
            kind: self,
            value: raw.to_string(),
        };
        Ok(match self {
            ArgKind::Bool => match raw.to_ascii_lowercase().as_str() {
                "true" => ArgValue::Bool(true),
                "false" => ArgValue::Bool(false),
                _ => return Err(invalid()),
            },
            ArgKind::Int => ArgValue::Int(raw.trim().parse().map_err(|_| invalid())?),
            ArgKind::Float => ArgValue::Float(raw.trim().parse().map_err(|_| invalid())?),
            ArgKind::Str => ArgValue::Str(raw.to_string()),
            ArgKind::Json => ArgValue::Json(serde_json::from_str(raw).map_err(|_| invalid())?),
        })
    }
}

/// How a handler receives its arguments
#[derive(Debug, Clone, Copy)]
pub enum ArgBinding {
    /// Converted in order; arity must match exactly
    Positional(&'static [ArgKind]),
    /// Full raw argument list, parsed by the handler
    Raw,
}

impl ArgBinding {
    pub fn bind(&self, args: Vec<String>) -> Result<BoundArgs, ArgumentError> {
        match self {
            ArgBinding::Raw => Ok(BoundArgs::Raw(args)),
            ArgBinding::Positional(kinds) => {
                if kinds.len() != args.len() {
                    return Err(ArgumentError::Arity {
                        expected: kinds.len(),
                        actual: args.len(),
                    });
                }
                kinds
                    .iter()
                    .zip(args.iter())
                    .enumerate()
                    .map(|(index, (kind, raw))| kind.convert(index, raw))
                    .collect::<Result<Vec<_>, _>>()
                    .map(BoundArgs::Positional)
            }
        }
    }
}

/// Arguments after binding
#[derive(Debug, Clone, PartialEq)]
pub enum BoundArgs {
    Positional(Vec<ArgValue>),
    Raw(Vec<String>),
}

impl BoundArgs {
    fn value(&self, index: usize) -> Result<&ArgValue, ArgumentError> {
        match self {
            BoundArgs::Positional(values) => values.get(index).ok_or(ArgumentError::Missing(index)),
            BoundArgs::Raw(_) => Err(ArgumentError::Missing(index)),
        }
    }

    pub fn bool(&self, index: usize) -> Result<bool, ArgumentError> {
        match self.value(index)? {
            ArgValue::Bool(v) => Ok(*v),
            _ => Err(ArgumentError::TypeMismatch { index, expected: ArgKind::Bool }),
        }
    }

    pub fn int(&self, index: usize) -> Result<i64, ArgumentError> {
        match self.value(index)? {
            ArgValue::Int(v) => Ok(*v),
            _ => Err(ArgumentError::TypeMismatch { index, expected: ArgKind::Int }),
        }
    }

    pub fn float(&self, index: usize) -> Result<f64, ArgumentError> {
        match self.value(index)? {
            ArgValue::Float(v) => Ok(*v),
            ArgValue::Int(v) => Ok(*v as f64),
            _ => Err(ArgumentError::TypeMismatch { index, expected: ArgKind::Float }),
        }
    }

    pub fn str(&self, index: usize) -> Result<&str, ArgumentError> {
        match self {
            BoundArgs::Raw(args) => args
                .get(index)
                .map(String::as_str)
                .ok_or(ArgumentError::Missing(index)),
            BoundArgs::Positional(_) => match self.value(index)? {
                ArgValue::Str(v) => Ok(v),
                _ => Err(ArgumentError::TypeMismatch { index, expected: ArgKind::Str }),
            },
        }
    }

    /// Deserialize a JSON argument (positional Json or a raw string)
    pub fn json<T: DeserializeOwned>(&self, index: usize) -> Result<T, ArgumentError> {
        let payload = |e: serde_json::Error| ArgumentError::Payload {
            index,
            message: e.to_string(),
        };
        match self {
            BoundArgs::Raw(args) => {
                let raw = args.get(index).ok_or(ArgumentError::Missing(index))?;
                serde_json::from_str(raw).map_err(payload)
            }
            BoundArgs::Positional(_) => match self.value(index)? {
                ArgValue::Json(value) => T::deserialize(value).map_err(payload),
                _ => Err(ArgumentError::TypeMismatch { index, expected: ArgKind::Json }),
            },
        }
    }

    /// Raw argument list (empty for positional bindings)
    pub fn raw(&self) -> &[String] {
        match self {
            BoundArgs::Raw(args) => args,
            BoundArgs::Positional(_) => &[],
        }
    }

    pub fn len(&self) -> usize {
        match self {
            BoundArgs::Raw(args) => args.len(),
            BoundArgs::Positional(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One registered handler
pub struct HandlerDescriptor<C> {
    pub binding: ArgBinding,
    pub handler: HandlerFn<C>,
}

/// Identity -> handler table
pub struct CommandRegistry<C> {
    handlers: FxHashMap<CommandName, HandlerDescriptor<C>>,
}

impl<C> Default for CommandRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> CommandRegistry<C> {
    pub fn new() -> Self {
        Self {
            handlers: FxHashMap::default(),
        }
    }

    pub fn register(
        &mut self,
        name: CommandName,
        binding: ArgBinding,
        handler: HandlerFn<C>,
    ) -> Result<(), DispatchError> {
        if name.side() != CommandSide::Server {
            return Err(DispatchError::ClientBound(name));
        }
        if self.handlers.contains_key(&name) {
            return Err(DispatchError::DuplicateHandler(name));
        }
        self.handlers.insert(name, HandlerDescriptor { binding, handler });
        Ok(())
    }

    pub fn contains(&self, name: CommandName) -> bool {
        self.handlers.contains_key(&name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Resolve, check direction and bind; the caller decides how to run the future
    pub fn dispatch(
        &self,
        ctx: C,
        command: Command,
        received: CommandSide,
    ) -> Result<HandlerFuture, DispatchError> {
        let name = command.name;
        if name.side() != received {
            return Err(DispatchError::DirectionMismatch {
                name,
                received,
                declared: name.side(),
            });
        }
        let descriptor = self.handlers.get(&name).ok_or(DispatchError::NoHandler(name))?;
        let args = descriptor
            .binding
            .bind(command.args)
            .map_err(|source| DispatchError::Arguments { name, source })?;
        Ok((descriptor.handler)(ctx, args))
    }
}
