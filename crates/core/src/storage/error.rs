//! Storage error types.

use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Object not found in storage.
    #[error("object not found: {key}")]
    NotFound {
        /// Storage key that was not found.
        key: String,
    },

    /// Presign operation not supported by provider.
    #[error("presign operation not supported by storage provider")]
    PresignNotSupported,

    /// Storage provider configuration error.
    #[error("storage configuration error: {0}")]
    Configuration(String),

    /// Bucket could not be checked or created.
    #[error("bucket provisioning failed: {0}")]
    Provisioning(String),

    /// OpenDAL operation error.
    #[error("storage operation failed: {0}")]
    Operation(String),

    /// Local I/O failed while streaming an object.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Upload stream ended before the announced length.
    #[error("payload length mismatch: expected {expected} bytes, read {actual}")]
    LengthMismatch {
        /// Announced length.
        expected: u64,
        /// Bytes actually read.
        actual: u64,
    },

    /// Invalid storage key format.
    #[error("invalid storage key: {0}")]
    InvalidKey(String),
}

impl StorageError {
    /// Create a not found error.
    #[must_use]
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Create a configuration error.
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a provisioning error.
    #[must_use]
    pub fn provisioning(msg: impl Into<String>) -> Self {
        Self::Provisioning(msg.into())
    }
}

impl From<opendal::Error> for StorageError {
    fn from(err: opendal::Error) -> Self {
        match err.kind() {
            opendal::ErrorKind::NotFound => Self::NotFound {
                key: err.to_string(),
            },
            _ => Self::Operation(err.to_string()),
        }
    }
}

impl StorageError {
    /// Map an error from a presign call, where `Unsupported` has a dedicated variant.
    pub(crate) fn from_presign(err: opendal::Error) -> Self {
        if err.kind() == opendal::ErrorKind::Unsupported {
            Self::PresignNotSupported
        } else {
            err.into()
        }
    }
}
