//! Command handlers ("modules") and the errors they return.

use thiserror::Error;

use crate::capability::CapabilityError;
use crate::memory::MemoryError;
use crate::registry::ModuleRegistry;

/// Handed to every handler so it can consult or extend the live registry.
pub struct CommandContext<'a> {
    pub registry: &'a ModuleRegistry,
}

/// A slash-command handler, e.g. `/memory` or a runtime-compiled plugin.
pub trait ChatModule: Send + Sync {
    /// Command name, unique across the registry.
    fn id(&self) -> &str;

    /// Usage text shown to the assistant by `/help`.
    fn prompt(&self) -> &str;

    /// Run `/<id> <args> <body>`. On success the reply goes back to the requester.
    fn execute(&self, ctx: &CommandContext<'_>, args: &str, body: &str) -> Result<String, CommandError>;
}

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("invalid command: {0}")]
    Parse(String),
    #[error("unknown command: /{0}")]
    UnknownModule(String),
    #[error("{0} not implemented")]
    NotImplemented(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Capability(#[from] CapabilityError),
    #[error(transparent)]
    Memory(#[from] MemoryError),
    /// A failure that still carries a message for the requester (compiler
    /// diagnostics, a refusal notice).
    #[error("{source}")]
    Failed {
        reply: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl CommandError {
    pub fn failed(reply: impl Into<String>, source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Failed {
            reply: reply.into(),
            source: source.into(),
        }
    }

    /// The message paired with this error, if any.
    pub fn reply(&self) -> Option<&str> {
        match self {
            Self::Failed { reply, .. } if !reply.is_empty() => Some(reply),
            _ => None,
        }
    }
}
