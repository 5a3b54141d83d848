/// Result alias that carries the custom [`LipSyncError`] type.
pub type Result<T> = std::result::Result<T, LipSyncError>;

/// Common error type for the core crate.
///
/// Missing or stalled audio is deliberately absent from this taxonomy: it is
/// reported as [`Signal::NoData`](crate::Signal::NoData) and absorbed by the
/// session, so only construction and the file helpers can fail.
#[derive(Debug, thiserror::Error)]
pub enum LipSyncError {
    /// Malformed band or category setup detected while building an engine.
    #[error("invalid configuration: {0}")]
    Configuration(String),
    /// Free-form message used by the command line front-end.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Config or track documents that failed to (de)serialise.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl LipSyncError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// Creates a configuration error describing the offending field.
    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::Configuration(msg.into())
    }

    /// Returns `true` for errors raised by configuration validation.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}
