//! Error types for publista-client
//!
//! This module provides error handling for the library, including:
//! - Domain-specific error variants (item pipeline, publishing, configuration)
//! - The structured `{code, message}` error shape returned by the API
//! - Machine-readable error codes for callers that branch on failures

use crate::types::{ItemId, ItemStatus, Platform};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for publista-client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error code the API uses when the account has no generation credits left
pub const QUOTA_EXCEEDED: &str = "QUOTA_EXCEEDED";

/// Main error type for publista-client
///
/// Every failure in this crate is scoped to the item, request or job that
/// produced it; none of these variants is fatal to the embedding process.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "api.base_url")
        key: Option<String>,
    },

    /// The API answered with a structured error body
    #[error("API error {status} ({code}): {message}")]
    Api {
        /// HTTP status code of the response
        status: u16,
        /// Machine-readable code from the error body (e.g., "QUOTA_EXCEEDED")
        code: String,
        /// Human-readable message from the error body
        message: String,
    },

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid URL built from configuration or a server response
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// A patch tried to move an item through a forbidden status transition
    #[error("item {id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// The item that rejected the patch
        id: ItemId,
        /// Status the item is currently in
        from: ItemStatus,
        /// Status the patch asked for
        to: ItemStatus,
    },

    /// Item is not (or no longer) part of the collection
    #[error("item {0} not found")]
    ItemNotFound(ItemId),

    /// Submission blocked: not enough items finished acquisition
    #[error("not enough ready items: {ready} ready, {required} required")]
    NotEnoughReadyItems {
        /// Items currently ready with a server reference
        ready: usize,
        /// Minimum the collection kind requires
        required: usize,
    },

    /// Submission blocked while items are still uploading or generating
    #[error("{active} item(s) are still being processed")]
    AcquisitionInProgress {
        /// Number of items in an active status
        active: usize,
    },

    /// Publish or schedule request without any platform
    #[error("at least one platform must be selected")]
    NoPlatforms,

    /// Publish or schedule request names a platform that is not connected
    #[error("{platform} account is not connected")]
    PlatformNotConnected {
        /// The first platform missing from the connected set
        platform: Platform,
    },

    /// Client-side input validation failed
    #[error("validation error: {0}")]
    Validation(String),

    /// Media metadata could not be extracted
    #[error("metadata extraction failed: {0}")]
    Metadata(String),

    /// External tool execution failed (ffprobe, ffmpeg)
    #[error("external tool error: {0}")]
    ExternalTool(String),
}

/// Structured error body as sent by the API
///
/// # Example JSON
///
/// ```json
/// {
///   "error": {
///     "code": "QUOTA_EXCEEDED",
///     "message": "Not enough credits. Upgrade your plan for more."
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
    /// The error details
    pub error: ErrorDetail,
}

/// The `{code, message}` pair every failing call reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code
    pub code: String,

    /// Human-readable error message, suitable for end users
    pub message: String,
}

impl Error {
    /// Build an API error from a status code and an error body
    pub fn api(status: u16, detail: ErrorDetail) -> Self {
        Error::Api {
            status,
            code: detail.code,
            message: detail.message,
        }
    }

    /// Get the machine-readable error code
    ///
    /// API errors keep the server's code verbatim; local failures use
    /// snake_case codes.
    pub fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Api { code, .. } => code,
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::Io(_) => "io_error",
            Error::Url(_) => "invalid_url",
            Error::InvalidTransition { .. } => "invalid_transition",
            Error::ItemNotFound(_) => "item_not_found",
            Error::NotEnoughReadyItems { .. } => "not_enough_ready_items",
            Error::AcquisitionInProgress { .. } => "acquisition_in_progress",
            Error::NoPlatforms => "no_platforms",
            Error::PlatformNotConnected { .. } => "platform_not_connected",
            Error::Validation(_) => "validation_error",
            Error::Metadata(_) => "metadata_error",
            Error::ExternalTool(_) => "external_tool_error",
        }
    }

    /// Whether this is the distinguished quota-exhaustion error
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Error::Api { code, .. } if code == QUOTA_EXCEEDED)
    }

    /// HTTP status of an API error, if this is one
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            Error::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Message from the server when the API supplied one
    ///
    /// Used for user-facing notifications, which fall back to a fixed
    /// sentence when this is `None`.
    pub fn api_message(&self) -> Option<&str> {
        match self {
            Error::Api { message, .. } if !message.is_empty() => Some(message),
            _ => None,
        }
    }
}

impl From<&Error> for ErrorDetail {
    fn from(error: &Error) -> Self {
        ErrorDetail {
            code: error.error_code().to_string(),
            message: error
                .api_message()
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string()),
        }
    }
}
