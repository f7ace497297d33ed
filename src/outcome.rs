use serde::{Deserialize, Serialize};

/// Uniform outcome returned by every tool operation.
///
/// Serializes as `{"status": "success", ...payload}` or
/// `{"status": "error", "error_message": "..."}`. Conditions the caller is
/// expected to reason about (nothing found, empty response) are reported
/// through the `Error` variant; transport and protocol failures are returned
/// as `Err` by the operations instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ToolResult<T> {
    Success(T),
    Error { error_message: String },
}

impl<T> ToolResult<T> {
    pub fn success(payload: T) -> Self {
        Self::Success(payload)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error_message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn payload(&self) -> Option<&T> {
        match self {
            Self::Success(payload) => Some(payload),
            Self::Error { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Success(_) => None,
            Self::Error { error_message } => Some(error_message),
        }
    }
}
