use crate::storage::StorageError;
use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// The request carried no file under the upload field
    #[error("No file uploaded.")]
    NoFileSupplied,

    /// Invalid request data
    #[error("{message}")]
    BadRequest { message: String },

    /// Malformed multipart body or a body limit hit while parsing
    #[error(transparent)]
    Multipart(#[from] MultipartError),

    /// Uploaded file is larger than the configured limit
    #[error("File size exceeds maximum allowed size of {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    /// Uploaded file's content type is not on the allow list
    #[error("Unsupported file type: {content_type}")]
    UnsupportedMediaType { content_type: String },

    /// The filesystem rejected the write
    #[error(transparent)]
    StorageWriteFailed(#[from] StorageError),

    /// Configuration failed validation
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::NoFileSupplied | Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::Multipart(e) => e.status(),
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Error::StorageWriteFailed(_) | Error::InvalidConfig { .. } | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking paths or OS error details
    pub fn user_message(&self) -> String {
        match self {
            Error::Multipart(e) => e.body_text(),
            Error::StorageWriteFailed(_) => "Failed to store uploaded file".to_string(),
            Error::InvalidConfig { .. } | Error::Other(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::StorageWriteFailed(_) | Error::InvalidConfig { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {}", FullChain(&self));
            }
            Error::Multipart(_) | Error::PayloadTooLarge { .. } | Error::UnsupportedMediaType { .. } => {
                tracing::info!("Rejected upload: {}", self);
            }
            Error::NoFileSupplied | Error::BadRequest { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();
        (status, Json(json!({ "message": self.user_message() }))).into_response()
    }
}

/// Renders an error together with its `source()` chain
struct FullChain<'a>(&'a Error);

impl std::fmt::Display for FullChain<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = std::error::Error::source(self.0);
        while let Some(cause) = source {
            write!(f, ": {cause}")?;
            source = cause.source();
        }
        Ok(())
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::{io, path::PathBuf};

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::NoFileSupplied.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::PayloadTooLarge { limit: 1 }.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            Error::UnsupportedMediaType {
                content_type: "text/plain".to_string()
            }
            .status_code(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );

        let storage = Error::from(StorageError::Write {
            path: PathBuf::from("/srv/uploads/1-2.jpg"),
            source: io::Error::other("No space left on device"),
        });
        assert_eq!(storage.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_storage_failures_do_not_leak_paths() {
        let err = Error::from(StorageError::Create {
            path: PathBuf::from("/srv/uploads/1-2.jpg"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        });

        let message = err.user_message();
        assert_eq!(message, "Failed to store uploaded file");
        assert!(!message.contains("/srv"));
    }

    #[test]
    fn test_full_chain_includes_io_cause() {
        let err = Error::from(StorageError::Write {
            path: PathBuf::from("/srv/uploads/1-2.jpg"),
            source: io::Error::other("No space left on device"),
        });

        let rendered = FullChain(&err).to_string();
        assert!(rendered.contains("Failed to write /srv/uploads/1-2.jpg"));
        assert!(rendered.contains("No space left on device"));
    }

    #[test]
    fn test_no_file_message() {
        assert_eq!(Error::NoFileSupplied.user_message(), "No file uploaded.");
    }
}
