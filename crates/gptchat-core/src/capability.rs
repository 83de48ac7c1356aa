//! Capabilities: units of behaviour loaded at runtime and exposed as commands.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::module::{ChatModule, CommandContext, CommandError};

#[derive(Error, Debug)]
pub enum CapabilityError {
    #[error("capability execution failed: {0}")]
    Execution(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("capability ABI violation: {0}")]
    Abi(String),
}

/// A loaded unit of behaviour. Implementations are invoked synchronously and
/// are not re-entered.
pub trait Capability: Send + Sync {
    fn identifier(&self) -> String;
    fn example(&self) -> String;
    fn execute(&self, input: Map<String, Value>) -> Result<Map<String, Value>, CapabilityError>;
}

/// Adapts a [`Capability`] to the command surface: the body is a JSON object,
/// the reply is pretty-printed JSON.
pub struct CapabilityModule {
    id: String,
    example: String,
    capability: Box<dyn Capability>,
}

impl CapabilityModule {
    pub fn new(capability: Box<dyn Capability>) -> Self {
        Self {
            id: capability.identifier(),
            example: capability.example(),
            capability,
        }
    }
}

impl ChatModule for CapabilityModule {
    fn id(&self) -> &str {
        &self.id
    }

    fn prompt(&self) -> &str {
        &self.example
    }

    fn execute(&self, _ctx: &CommandContext<'_>, _args: &str, body: &str) -> Result<String, CommandError> {
        let input = parse_input(body)?;
        let output = self.capability.execute(input)?;
        serde_json::to_string_pretty(&Value::Object(output))
            .map_err(|e| CommandError::Capability(CapabilityError::Serialization(e)))
    }
}

fn parse_input(body: &str) -> Result<Map<String, Value>, CommandError> {
    let body = body.trim();
    if body.is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(CommandError::InvalidInput(format!(
            "expected a JSON object, got {}",
            kind_of(&other)
        ))),
        Err(e) => Err(CommandError::InvalidInput(format!("body is not JSON: {}", e))),
    }
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
