//! Error types for iris-core
//!
//! Provides a unified error type that can be converted to appropriate exit codes.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for iris-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for iris-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// A credentials section is partially filled in
    #[error("Incomplete credentials in section '{section}': missing {}", .missing.join(", "))]
    IncompleteCredentials {
        section: &'static str,
        missing: Vec<&'static str>,
    },

    /// No credentials section usable for the requested backend
    #[error("No usable credentials: {0}")]
    NoUsableCredentials(String),

    /// Bucket does not exist on the object store
    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    /// The backend refused the operation for these credentials
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Operation needs a mounted bucket
    #[error("No bucket is mounted. Mount a bucket first")]
    NoBucketMounted,

    /// Object key does not exist in the mounted bucket
    #[error("Object not found: {0}")]
    RemoteObjectNotFound(String),

    /// Local file or folder does not exist
    #[error("Local path not found: {}", .0.display())]
    LocalFileNotFound(PathBuf),

    /// ACL permission level outside the supported set
    #[error(
        "Invalid permission '{0}'. Valid options are FULL_CONTROL, WRITE, WRITE_ACP, READ, READ_ACP"
    )]
    InvalidPermission(String),

    /// Authentication against the index backend failed
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Index name unknown to the index backend
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    /// Backend unreachable or rejected the connection
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A single object transfer failed
    #[error("Transfer of '{key}' failed: {reason}")]
    Transfer { key: String, reason: String },

    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Conflict or precondition failure
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Base64 input could not be decoded
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl Error {
    /// Shorthand for a per-object transfer failure
    pub fn transfer(key: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::Transfer {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the error came from credential validation
    pub const fn is_config_time(&self) -> bool {
        matches!(
            self,
            Error::IncompleteCredentials { .. } | Error::NoUsableCredentials(_)
        )
    }

    /// Get the appropriate exit code for this error
    pub const fn exit_code(&self) -> i32 {
        match self {
            Error::IncompleteCredentials { .. }
            | Error::NoUsableCredentials(_)
            | Error::InvalidPermission(_)
            | Error::NoBucketMounted
            | Error::Config(_)
            | Error::InvalidEncoding(_)
            | Error::InvalidUrl(_)
            | Error::TomlParse(_) => 2, // UsageError
            Error::BackendUnavailable(_) | Error::Transfer { .. } => 3, // NetworkError
            Error::Authentication(_) | Error::AccessDenied(_) => 4, // AuthError
            Error::BucketNotFound(_)
            | Error::RemoteObjectNotFound(_)
            | Error::LocalFileNotFound(_)
            | Error::IndexNotFound(_) => 5, // NotFound
            Error::Conflict(_) => 6,  // Conflict
            _ => 1,                   // GeneralError
        }
    }
}
