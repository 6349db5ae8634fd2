use thiserror::Error;

/// Failures talking to the inference or reduction service. Callers turn
/// these into flagged fallback data; none of them is fatal.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("service returned HTTP {0}")]
    Status(u16),
    #[error("could not decode response: {0}")]
    Decode(String),
    #[error("response shape mismatch: {0}")]
    Shape(String),
    #[error("service rejected the request: {0}")]
    Rejected(String),
}

impl From<ureq::Error> for ServiceError {
    fn from(error: ureq::Error) -> Self {
        match error {
            ureq::Error::StatusCode(code) => Self::Status(code),
            other => Self::Transport(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(error: serde_json::Error) -> Self {
        Self::Decode(error.to_string())
    }
}
