//! Backend Client Module
//!
//! The object-storage collaborator the adapter talks to, plus the request
//! and response shapes exchanged with it. Networking, retries, credentials
//! and pagination all live behind this trait.

mod local;
mod memory;

#[cfg(feature = "s3")]
mod s3;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::traits::{Metadata, StorageError};

pub use local::LocalClient;
pub use memory::MemoryClient;

#[cfg(feature = "s3")]
pub use s3::S3Client;

/// Well-known request field names.
pub mod fields {
    pub const BUCKET: &str = "Bucket";
    pub const KEY: &str = "Key";
    pub const BODY: &str = "Body";
    pub const ACL: &str = "ACL";
    pub const CONTENT_TYPE: &str = "ContentType";
    pub const CACHE_CONTROL: &str = "CacheControl";
    pub const CONTENT_DISPOSITION: &str = "ContentDisposition";
    pub const CONTENT_ENCODING: &str = "ContentEncoding";
    pub const CONTENT_LANGUAGE: &str = "ContentLanguage";
    pub const STORAGE_CLASS: &str = "StorageClass";
    pub const SERVER_SIDE_ENCRYPTION: &str = "ServerSideEncryption";
    pub const METADATA: &str = "Metadata";
    pub const VERSION_ID: &str = "VersionId";
}

/// Options for a single backend request.
///
/// `bucket` and `key` address the object; everything else is forwarded to
/// the backend, which applies the fields it understands.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub bucket: String,
    pub key: String,
    pub fields: Metadata,
}

impl RequestOptions {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            fields: Metadata::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Merge `metadata` over the current options. Later values win, and
    /// string `Bucket`/`Key` entries retarget the request.
    pub fn merge(mut self, metadata: &Metadata) -> Self {
        for (name, value) in metadata {
            match (name.as_str(), value) {
                (fields::BUCKET, Value::String(bucket)) => self.bucket = bucket.clone(),
                (fields::KEY, Value::String(key)) => self.key = key.clone(),
                _ => {
                    self.fields.insert(name.clone(), value.clone());
                }
            }
        }
        self
    }

    /// String value of a forwarded field. Numbers and booleans are rendered.
    pub fn field_str(&self, name: &str) -> Option<String> {
        match self.fields.get(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// User metadata carried in the `Metadata` field.
    pub fn user_metadata(&self) -> Option<HashMap<String, String>> {
        let Value::Object(map) = self.fields.get(fields::METADATA)? else {
            return None;
        };
        Some(
            map.iter()
                .map(|(k, v)| match v {
                    Value::String(s) => (k.clone(), s.clone()),
                    other => (k.clone(), other.to_string()),
                })
                .collect(),
        )
    }
}

/// Response descriptor for a put-object call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutObjectOutput {
    pub etag: Option<String>,
    pub version_id: Option<String>,
}

/// Response descriptor for a delete-object call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteObjectOutput {
    pub delete_marker: bool,
    pub version_id: Option<String>,
}

/// Response descriptor for a head-object call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadObjectOutput {
    pub content_length: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// Object-storage client capabilities used by the adapter.
///
/// Handles are cheap to clone. `with_region` returns a new handle scoped to
/// a region and leaves `self` untouched, so adapters sharing a client never
/// see each other's region.
pub trait ObjectClient: Clone + Send + Sync {
    fn get_object(&self, request: &RequestOptions) -> Result<Vec<u8>, StorageError>;

    fn put_object(
        &self,
        request: &RequestOptions,
        body: &[u8],
    ) -> Result<PutObjectOutput, StorageError>;

    fn delete_object(&self, request: &RequestOptions) -> Result<DeleteObjectOutput, StorageError>;

    fn head_object(&self, request: &RequestOptions) -> Result<HeadObjectOutput, StorageError>;

    /// Copy `copy_source` (`bucket/key`) to the bucket and key of `request`.
    fn copy_object(&self, copy_source: &str, request: &RequestOptions) -> Result<(), StorageError>;

    /// Every key in `bucket`, unscoped.
    fn list_objects(&self, bucket: &str) -> Result<Vec<String>, StorageError>;

    fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, StorageError>;

    fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError>;

    fn create_bucket(
        &self,
        bucket: &str,
        location_constraint: Option<&str>,
    ) -> Result<(), StorageError>;

    fn with_region(&self, region: &str) -> Self;

    /// Get the name/type of this backend for logging.
    fn backend_type(&self) -> &'static str;
}

/// Split a `bucket/key` copy source.
pub(crate) fn split_copy_source(copy_source: &str) -> Result<(&str, &str), StorageError> {
    copy_source
        .split_once('/')
        .filter(|(bucket, key)| !bucket.is_empty() && !key.is_empty())
        .ok_or_else(|| StorageError::InvalidPath(format!("bad copy source: {copy_source}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_overrides_fields_and_target() {
        let mut metadata = Metadata::new();
        metadata.insert("ACL".into(), json!("public-read"));
        metadata.insert("Bucket".into(), json!("elsewhere"));
        metadata.insert("ContentType".into(), json!("text/plain"));

        let request = RequestOptions::new("bucket", "dir/key")
            .with_field(fields::ACL, "private")
            .merge(&metadata);

        assert_eq!(request.bucket, "elsewhere");
        assert_eq!(request.key, "dir/key");
        assert_eq!(request.field_str(fields::ACL).as_deref(), Some("public-read"));
        assert_eq!(request.field_str(fields::CONTENT_TYPE).as_deref(), Some("text/plain"));
        assert!(!request.fields.contains_key(fields::BUCKET));
    }

    #[test]
    fn test_user_metadata_stringifies_scalars() {
        let request = RequestOptions::new("b", "k")
            .with_field(fields::METADATA, json!({"owner": "ops", "rev": 3}));
        let meta = request.user_metadata().unwrap();
        assert_eq!(meta.get("owner").map(String::as_str), Some("ops"));
        assert_eq!(meta.get("rev").map(String::as_str), Some("3"));
    }

    #[test]
    fn test_split_copy_source() {
        assert_eq!(split_copy_source("b/a/c.txt").unwrap(), ("b", "a/c.txt"));
        assert!(split_copy_source("no-key").is_err());
        assert!(split_copy_source("/key").is_err());
    }
}
