//! Control commands sent from a controller to the evaluator.
//!
//! Wire form: `{"type": "pause"}` / `{"type": "terminate"}`. The `type`
//! discriminator selects the variant; future variants carry their arguments
//! in additional fields of the same object.

use serde_json::{json, Map, Value};
use thiserror::Error;

const KIND_FIELD: &str = "type";

/// Errors decoding a command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unknown command kind {0:?}")]
    UnknownKind(String),

    #[error("command has no \"type\" field")]
    MissingKind,

    #[error("command is not an object")]
    NotAnObject,

    #[error("command is not valid json: {0}")]
    Json(#[from] serde_json::Error),
}

/// A control message. Equality is structural: two commands of the same kind are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Pause,
    Terminate,
}

impl Command {
    /// Hold dispatch of new work.
    pub fn pause() -> Self {
        Command::Pause
    }

    /// Stop the evaluator.
    pub fn terminate() -> Self {
        Command::Terminate
    }

    /// Wire discriminator.
    pub const fn kind(&self) -> &'static str {
        match self {
            Command::Pause => "pause",
            Command::Terminate => "terminate",
        }
    }

    /// Structured wire form.
    pub fn to_dict(&self) -> Value {
        json!({ KIND_FIELD: self.kind() })
    }

    /// Decode the structured wire form.
    pub fn from_dict(value: &Value) -> Result<Self, CommandError> {
        let object: &Map<String, Value> = value.as_object().ok_or(CommandError::NotAnObject)?;
        let kind = object
            .get(KIND_FIELD)
            .and_then(Value::as_str)
            .ok_or(CommandError::MissingKind)?;
        match kind {
            "pause" => Ok(Command::Pause),
            "terminate" => Ok(Command::Terminate),
            other => Err(CommandError::UnknownKind(other.to_string())),
        }
    }

    /// Encode as a JSON string.
    pub fn to_json(&self) -> String {
        self.to_dict().to_string()
    }

    /// Decode from a JSON string.
    pub fn from_json(s: &str) -> Result<Self, CommandError> {
        let value: Value = serde_json::from_str(s)?;
        Self::from_dict(&value)
    }
}
