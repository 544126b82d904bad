//! Error types for overdrive-tools
//!
//! This module defines error types using thiserror for ergonomic error handling.
//! Errors are categorized by domain (metadata API, license documents, downloads,
//! files) so callers can decide whether to retry, re-prompt, or give up.
//!
//! ## Categories
//!
//! - **API**: catalog and Audnex requests, response parsing, rate limiting
//! - **ODM/License**: license-request documents, acquired licenses
//! - **Download**: part transfers, network failures
//! - **File**: missing files, unusable paths
//! - **Input**: user input, cancelled selections, empty results

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our OverdriveError type
pub type Result<T> = std::result::Result<T, OverdriveError>;

/// Main error type for overdrive-tools
#[derive(Error, Debug)]
pub enum OverdriveError {
    // ===== API Errors =====

    /// Generic API request failure
    #[error("API request failed: {message}")]
    ApiRequestFailed {
        message: String,
        /// HTTP status code if available
        status_code: Option<u16>,
        /// URL that failed
        endpoint: Option<String>,
    },

    /// API returned invalid or unexpected response format
    #[error("Invalid API response: {message}")]
    InvalidApiResponse {
        message: String,
        /// Response body snippet for debugging
        response_body: Option<String>,
    },

    /// API rate limiting (HTTP 429)
    #[error("API rate limit exceeded. Retry after {retry_after_seconds} seconds")]
    RateLimitExceeded {
        retry_after_seconds: u64,
        endpoint: String,
    },

    /// Resource does not exist (HTTP 404). Never retried.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unknown catalog region code
    #[error("Invalid region '{0}'. Available regions: au, ca, de, es, fr, in, it, jp, uk, us")]
    InvalidRegion(String),

    // ===== ODM / License Errors =====

    /// License-request document could not be parsed
    #[error("Invalid ODM document: {0}")]
    InvalidOdm(String),

    /// License-request document lacks a required element or attribute
    #[error("ODM document is missing {0}")]
    MissingOdmField(String),

    /// Acquired license could not be parsed
    #[error("Invalid license: {0}")]
    InvalidLicense(String),

    /// Download attempted before a license was acquired
    #[error("No license found at {0}. Acquire a license first.")]
    LicenseNotAcquired(PathBuf),

    // ===== Download Errors =====

    /// Generic download failure
    #[error("Download failed: {0}")]
    DownloadFailed(String),

    /// Network connectivity error
    #[error("Network error: {message}")]
    NetworkError {
        message: String,
        /// Whether this error might be transient
        is_transient: bool,
    },

    // ===== File Errors =====

    /// File or directory not found
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Invalid file path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    // ===== Input Errors =====

    /// Generic input validation error
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Book metadata lacks a field needed to continue
    #[error("Missing required field: {0}")]
    MissingRequiredField(String),

    /// User backed out of a selection
    #[error("Operation cancelled")]
    Cancelled,

    /// Search or lookup returned nothing usable
    #[error("No results: {0}")]
    NoResults(String),

    // ===== External Library Errors =====

    /// HTTP client error from reqwest
    #[error("HTTP client error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// XML parse error from quick-xml
    #[error("XML error: {0}")]
    XmlError(#[from] quick_xml::Error),

    /// URL parse error
    #[error("URL error: {0}")]
    UrlError(#[from] url::ParseError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<std::string::FromUtf8Error> for OverdriveError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        OverdriveError::InvalidInput(format!("UTF-8 conversion error: {}", err))
    }
}

impl From<std::num::ParseIntError> for OverdriveError {
    fn from(err: std::num::ParseIntError) -> Self {
        OverdriveError::InvalidInput(format!("Failed to parse integer: {}", err))
    }
}

// Helper methods for creating common errors
impl OverdriveError {
    /// Create an InvalidInput error with a message
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        OverdriveError::InvalidInput(message.into())
    }

    /// Create a MissingOdmField error naming the element or attribute
    pub fn missing_field<S: Into<String>>(field: S) -> Self {
        OverdriveError::MissingOdmField(field.into())
    }

    /// Create an ApiRequestFailed error
    pub fn api_failed<S: Into<String>>(
        message: S,
        status_code: Option<u16>,
        endpoint: Option<String>,
    ) -> Self {
        OverdriveError::ApiRequestFailed {
            message: message.into(),
            status_code,
            endpoint,
        }
    }

    /// Create a NetworkError
    pub fn network_error<S: Into<String>>(message: S, is_transient: bool) -> Self {
        OverdriveError::NetworkError {
            message: message.into(),
            is_transient,
        }
    }

    /// Check if error is retryable
    ///
    /// Returns `true` for transient errors that might succeed on retry:
    /// - Network errors marked as transient
    /// - Rate limiting
    /// - Any non-404 HTTP failure
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OverdriveError::NetworkError { is_transient: true, .. }
                | OverdriveError::RateLimitExceeded { .. }
                | OverdriveError::ApiRequestFailed { .. }
        )
    }

    /// Get retry delay in seconds when the server supplied one
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            OverdriveError::RateLimitExceeded { retry_after_seconds, .. } => {
                Some(*retry_after_seconds)
            }
            _ => None,
        }
    }

    /// Get user-friendly error message suitable for display
    pub fn user_message(&self) -> String {
        match self {
            OverdriveError::RateLimitExceeded { retry_after_seconds, .. } => {
                format!(
                    "The metadata service is rate limiting requests. Please wait {} seconds before trying again.",
                    retry_after_seconds
                )
            }
            OverdriveError::LicenseNotAcquired(path) => {
                format!(
                    "No license is available for this loan (expected {}). Run the license step first.",
                    path.display()
                )
            }
            OverdriveError::NotFound(url) => {
                format!("The requested resource does not exist: {}", url)
            }
            OverdriveError::Cancelled => "No book selected.".to_string(),
            OverdriveError::NetworkError { message, .. } => {
                format!("Network problem: {}. Please check your connection and try again.", message)
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(OverdriveError::network_error("reset", true).is_retryable());
        assert!(!OverdriveError::network_error("dns", false).is_retryable());
        assert!(OverdriveError::api_failed("boom", Some(500), None).is_retryable());
        assert!(!OverdriveError::NotFound("x".into()).is_retryable());
        assert!(!OverdriveError::Cancelled.is_retryable());
    }

    #[test]
    fn test_retry_after_seconds() {
        let err = OverdriveError::RateLimitExceeded {
            retry_after_seconds: 7,
            endpoint: "/search".to_string(),
        };
        assert_eq!(err.retry_after_seconds(), Some(7));
        assert_eq!(OverdriveError::Cancelled.retry_after_seconds(), None);
    }

    #[test]
    fn test_user_message_license() {
        let err = OverdriveError::LicenseNotAcquired(PathBuf::from("book.odm.license"));
        assert!(err.user_message().contains("book.odm.license"));
    }
}
