//! MediaVault Error Types

use thiserror::Error;

/// Result type alias for MediaVault operations
pub type Result<T> = std::result::Result<T, Error>;

/// MediaVault error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Upload validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    // Storage errors
    #[error("Storage backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Asset not found: {0}")]
    NotFound(String),

    // Session errors
    #[error("Session error: {0}")]
    Session(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Text suitable for a flash message.
    ///
    /// Backend failures are reported generically so that credentials or
    /// endpoint details never reach the page.
    pub fn user_message(&self) -> String {
        match self {
            Error::Validation(msg) => msg.clone(),
            Error::NotFound(_) => "File not found".to_string(),
            Error::BackendUnavailable(_) | Error::Network(_) | Error::Io(_) => {
                "Storage is currently unavailable, please try again later".to_string()
            }
            Error::Session(_) => "Your session has expired, please log in again".to_string(),
            Error::Config(_) | Error::ConfigParse(_) => "Server misconfigured".to_string(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Network(e.to_string())
    }
}

impl From<s3::error::S3Error> for Error {
    fn from(e: s3::error::S3Error) -> Self {
        Error::BackendUnavailable(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_is_shown_verbatim() {
        let err = Error::Validation("Unsupported file type: notes.txt".into());
        assert_eq!(err.user_message(), "Unsupported file type: notes.txt");
    }

    #[test]
    fn test_backend_details_are_hidden() {
        let err = Error::BackendUnavailable("403 InvalidAccessKeyId AKIA123".into());
        assert!(!err.user_message().contains("AKIA123"));
    }
}
