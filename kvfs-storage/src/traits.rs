//! Capability Trait Definitions
//!
//! Defines the error type and the filesystem-style capabilities an adapter
//! can offer. Callers depend on the subset of capabilities they need.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::client::{DeleteObjectOutput, PutObjectOutput};

/// Per-key request option overrides, forwarded to the backend as-is.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Errors that can occur during adapter or backend operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("The configured bucket \"{bucket}\" does not exist.")]
    BucketNotFound { bucket: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Operation not implemented: {0}")]
    NotImplemented(&'static str),

    /// The copy step of a rename succeeded but removing the source failed.
    /// Both objects are present on the backend.
    #[error("copied {source_key} to {target_key} but could not delete the source: {cause}")]
    OrphanedCopy {
        source_key: String,
        target_key: String,
        #[source]
        cause: Box<StorageError>,
    },
}

impl StorageError {
    /// Whether this error came from the backend reporting a missing object.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

/// Key-value storage over logical keys.
pub trait KeyValueStore: Send + Sync {
    /// Read the full content stored under `key`.
    fn read(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Write `content` under `key`, replacing any existing object.
    fn write(&self, key: &str, content: &[u8]) -> Result<PutObjectOutput, StorageError>;

    /// Move `source` to `target`. Not atomic.
    fn rename(&self, source: &str, target: &str) -> Result<(), StorageError>;

    /// Check if an object exists under `key`.
    fn exists(&self, key: &str) -> Result<bool, StorageError>;

    /// Last-modified time of `key`, `None` when the backend does not report one.
    fn mtime(&self, key: &str) -> Result<Option<DateTime<Utc>>, StorageError>;

    /// All keys known to the store, including synthesized directories.
    fn keys(&self) -> Result<Vec<String>, StorageError>;

    fn delete(&self, key: &str) -> Result<DeleteObjectOutput, StorageError>;

    /// Directories exist only as explicit `key/` markers.
    fn is_directory(&self, key: &str) -> Result<bool, StorageError>;
}

/// Per-key metadata association.
pub trait MetadataSupport {
    fn set_metadata(&self, key: &str, metadata: Metadata);

    /// Stored metadata for `key`, or an empty map.
    fn get_metadata(&self, key: &str) -> Metadata;
}

/// Prefix-scoped key listing.
pub trait KeyListing {
    fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}
