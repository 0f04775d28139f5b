use shared::error::ServerRejection;
use thiserror::Error;

use crate::minigame::MiniGameKind;

/// A single-flight lane of player intents. At most one request per surface
/// is outstanding; unrelated surfaces do not block each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Surface {
    Desk,
    Saves,
    MiniGameStart,
    MiniGameRound,
    EventModal,
}

impl std::fmt::Display for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Desk => "desk",
            Self::Saves => "saves",
            Self::MiniGameStart => "mini-game start",
            Self::MiniGameRound => "mini-game round",
            Self::EventModal => "event modal",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server responded with {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid server payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid server url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// Client-side field checks that fail before any request is sent.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Missing { field: &'static str },
    #[error("{field} must be a number, got '{raw}'")]
    NotNumeric { field: &'static str, raw: String },
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },
    #[error("choice {choice} is not one of the {available} options")]
    NoSuchOption { choice: usize, available: usize },
    #[error("alpha '{0}' is not available for allocation")]
    UnknownAlpha(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("server rejected the action: {0}")]
    Rejected(#[from] ServerRejection),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("a {0} request is already in flight")]
    Busy(Surface),
    #[error("a {0} session is already active")]
    SessionActive(MiniGameKind),
    #[error("no active {0} session")]
    NoActiveSession(MiniGameKind),
    #[error("the {0} session is over; start a new one")]
    SessionFinished(MiniGameKind),
    #[error("no event is being shown")]
    NoEvent,
    #[error("resolve the '{0}' event first")]
    EventPending(String),
    #[error("event has no choice {index} (it offers {available})")]
    NoSuchChoice { index: usize, available: usize },
    #[error("game state has not been loaded yet")]
    Uninitialized,
    #[error("server response for {action} is missing {field}")]
    UnexpectedPayload {
        action: &'static str,
        field: &'static str,
    },
    #[error("protocol violation: {0}")]
    Protocol(String),
}

impl SessionError {
    /// Errors that never left the client.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::Busy(_)
                | Self::SessionActive(_)
                | Self::NoActiveSession(_)
                | Self::SessionFinished(_)
                | Self::NoEvent
                | Self::EventPending(_)
                | Self::NoSuchChoice { .. }
                | Self::Uninitialized
        )
    }
}

pub(crate) fn parse_finite(field: &'static str, raw: &str) -> Result<f64, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Missing { field });
    }
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(ValidationError::NotNumeric {
            field,
            raw: raw.to_string(),
        }),
    }
}

pub(crate) fn require_name(field: &'static str, raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Missing { field });
    }
    Ok(trimmed.to_string())
}
