use thiserror::Error;

/// Failures surfaced by a live translation session.
///
/// Everything except `DecodeFailure` is fatal to the session it occurs in and
/// always leaves the controller back in `Idle` with every device released.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LiveError {
    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("Could not connect to the translation service: {0}")]
    ConnectFailed(String),
    #[error("Connection to the translation service failed: {0}")]
    TransportError(String),
    #[error("Dropped malformed audio chunk: {0}")]
    DecodeFailure(String),
    #[error("A live session is already running")]
    AlreadyActive,
    #[error("Configuration error: {0}")]
    Config(String),
}

impl LiveError {
    /// Whether this error ends the session it happened in.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, LiveError::DecodeFailure(_))
    }
}

pub type LiveResult<T> = Result<T, LiveError>;
