use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing listing id")]
    MissingListingId,

    #[error("No photo selected")]
    NoValidFiles,

    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Server returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response from server")]
    InvalidResponse,

    #[error("Upload failed: {reason}")]
    UploadFailed { reason: String },

    #[error("All uploads failed: {reason}")]
    AllUploadsFailed { reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Custom result type
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(field: &str, message: &str) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    pub fn upload_failed(reason: &str) -> Self {
        Self::UploadFailed {
            reason: reason.to_string(),
        }
    }

    pub fn api(status: u16, message: &str) -> Self {
        Self::Api {
            status,
            message: message.to_string(),
        }
    }

    /// Message recorded against a failed file: the backend's own text when
    /// there is one, without the variant prefix.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Api { message, .. } => message.clone(),
            AppError::UploadFailed { reason } | AppError::AllUploadsFailed { reason } => {
                reason.clone()
            }
            AppError::Network(e) => e.to_string(),
            AppError::Io(e) => e.to_string(),
            other => other.to_string(),
        }
    }

    /// Errors raised before any network activity. Retrying them without
    /// changing the input is pointless.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            AppError::MissingListingId | AppError::NoValidFiles | AppError::Validation { .. }
        )
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Network(_)
            | AppError::Io(_)
            | AppError::InvalidResponse
            | AppError::UploadFailed { .. }
            | AppError::AllUploadsFailed { .. } => true,
            AppError::Api { status, .. } => matches!(status, 408 | 429 | 500 | 502 | 503 | 504),
            _ => false,
        }
    }
}
