use std::error::Error;
use std::fmt;

use crate::api_connection::connection::ApiConnectionError;

/// Error taxonomy for the recommendation core.
///
/// `NotFound` and `NoActiveSession` are definite negative outcomes, not
/// malfunctions; callers turn them into user-facing messages. The remaining
/// variants signal that something in the decision path actually broke.
#[derive(Debug)]
pub enum CoreError {
    /// No catalog entry satisfied the request and no fallback was available.
    NotFound(String),
    /// A session operation was attempted for a user with no assigned recipe.
    NoActiveSession(String),
    /// The generative capability produced output that failed to parse as the
    /// required structure. Carries the raw payload for diagnosis.
    MalformedGeneration { detail: String, raw: String },
    /// The generative capability itself failed (network, timeout, API error).
    CapabilityUnavailable(String),
    /// Caller-supplied input could not be interpreted.
    InvalidInput(String),
    /// Document store failure.
    Store(String),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::NotFound(what) => write!(f, "not found: {}", what),
            CoreError::NoActiveSession(user_id) => {
                write!(f, "no active session for user {}", user_id)
            }
            CoreError::MalformedGeneration { detail, raw } => {
                write!(f, "malformed generation ({}): {}", detail, raw)
            }
            CoreError::CapabilityUnavailable(detail) => {
                write!(f, "generative capability unavailable: {}", detail)
            }
            CoreError::InvalidInput(detail) => write!(f, "invalid input: {}", detail),
            CoreError::Store(detail) => write!(f, "store error: {}", detail),
        }
    }
}

impl Error for CoreError {}

impl From<ApiConnectionError> for CoreError {
    fn from(err: ApiConnectionError) -> Self {
        CoreError::CapabilityUnavailable(err.to_string())
    }
}
