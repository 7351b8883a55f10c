use thiserror::Error;

/// Camera failures as seen by the capture loop.
///
/// The message is shown to the user as-is.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CameraError {
    /// The shot may succeed when tried again (focus failure, busy camera).
    #[error("{message}")]
    Recoverable { message: String },

    /// Retrying is pointless; the whole session is aborted.
    #[error("{message}")]
    Fatal { message: String },
}

impl CameraError {
    pub fn recoverable(message: impl Into<String>) -> Self {
        Self::Recoverable {
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Recoverable { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Recoverable { message } | Self::Fatal { message } => message,
        }
    }
}
