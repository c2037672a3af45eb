use thiserror::Error;

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("messaging client is not configured")]
    NotConfigured,

    /// The platform answered with a non-success status.
    #[error("messaging API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("messaging transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl MessagingError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            MessagingError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
