use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A business-rule refusal reported by the server with `status: "error"`,
/// e.g. offering a salary below the minimum for the requested skill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message}")]
pub struct ServerRejection {
    pub message: String,
}

impl ServerRejection {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EffectDecodeError {
    #[error("unknown choice effect '{0}'")]
    UnknownKeyword(String),
    #[error("unknown choice effect type '{0}'")]
    UnknownType(String),
    #[error("choice effect object is missing its 'type' field")]
    MissingType,
    #[error("malformed '{kind}' choice effect: {reason}")]
    Malformed { kind: String, reason: String },
    #[error("choice effect must be a string or an object")]
    UnsupportedShape,
}
