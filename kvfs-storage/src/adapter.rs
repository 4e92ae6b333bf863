//! Object Store Adapter
//!
//! Maps logical filesystem keys onto objects in a single bucket. The adapter
//! prefixes keys with the configured directory, forwards per-key metadata as
//! request options and makes sure the bucket exists before the first data
//! operation. Everything else is the backend client's job.

use crate::client::{fields, DeleteObjectOutput, ObjectClient, PutObjectOutput, RequestOptions};
use crate::metadata::MetadataTable;
use crate::options::AdapterOptions;
use crate::traits::{KeyListing, KeyValueStore, Metadata, MetadataSupport, StorageError};
use chrono::{DateTime, Utc};
use metrics::counter;
use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Adapter exposing a bucket through the key-value capability traits.
///
/// The adapter is `Send + Sync`. Configuration and the metadata table sit
/// behind read-write locks, and bucket-ensure runs under a mutex so that
/// concurrent first calls perform a single existence check.
pub struct ObjectStoreAdapter<C: ObjectClient> {
    client: C,
    bucket: String,
    options: RwLock<AdapterOptions>,
    metadata: RwLock<MetadataTable>,
    /// Client handle to use once the bucket is known to exist.
    ensured: Mutex<Option<C>>,
}

impl<C: ObjectClient> std::fmt::Debug for ObjectStoreAdapter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreAdapter")
            .field("backend", &self.client.backend_type())
            .field("bucket", &self.bucket)
            .field("options", &self.options())
            .field(
                "metadata_entries",
                &self.metadata.read().unwrap_or_else(PoisonError::into_inner).len(),
            )
            .field("bucket_ensured", &self.is_bucket_ensured())
            .finish()
    }
}

fn record(backend: &'static str, op: &'static str) {
    counter!("kvfs_backend_requests_total", "backend" => backend, "op" => op).increment(1);
}

/// Parent directory of a listed key, `None` for keys at the bucket root.
fn parent_dir(key: &str) -> Option<&str> {
    let trimmed = key.trim_end_matches('/');
    let idx = trimmed.rfind('/')?;
    let parent = trimmed[..idx].trim_end_matches('/');
    if parent.is_empty() {
        Some("/")
    } else {
        Some(parent)
    }
}

impl<C: ObjectClient> ObjectStoreAdapter<C> {
    /// Create an adapter over `bucket`.
    ///
    /// `client` may be a clone of a handle shared with other adapters; region
    /// scoping derives a private handle and never touches the shared one.
    pub fn new(client: C, bucket: impl Into<String>, options: AdapterOptions) -> Self {
        let metadata = MetadataTable::new(options.metadata_capacity);
        Self {
            client,
            bucket: bucket.into(),
            options: RwLock::new(options),
            metadata: RwLock::new(metadata),
            ensured: Mutex::new(None),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Snapshot of the current configuration.
    pub fn options(&self) -> AdapterOptions {
        self.options
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_acl(&self, acl: impl Into<String>) {
        self.options
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .acl = acl.into();
    }

    pub fn acl(&self) -> String {
        self.options
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .acl
            .clone()
    }

    /// Change the key prefix. Metadata stored under the old prefix stays
    /// where it is and is no longer reachable through the same keys.
    pub fn set_directory(&self, directory: impl Into<String>) {
        self.options
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .directory = directory.into();
    }

    pub fn directory(&self) -> String {
        self.options
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .directory
            .clone()
    }

    /// Backend path for a logical key. No normalization is applied.
    pub fn compute_path(&self, key: &str) -> String {
        let options = self.options.read().unwrap_or_else(PoisonError::into_inner);
        if options.directory.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", options.directory, key)
        }
    }

    /// Whether bucket-ensure has completed for this adapter.
    pub fn is_bucket_ensured(&self) -> bool {
        self.ensured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Size in bytes of the object under `key`.
    pub fn size(&self, key: &str) -> Result<u64, StorageError> {
        let client = self.ensure_bucket()?;
        let request = self.request_with_metadata(&self.compute_path(key));
        record(client.backend_type(), "head_object");
        Ok(client.head_object(&request)?.content_length)
    }

    /// Make sure the bucket exists, creating it when configured to.
    ///
    /// Succeeds at most once per adapter; later calls return the cached
    /// handle without contacting the backend, even if the bucket has since
    /// been removed.
    fn ensure_bucket(&self) -> Result<C, StorageError> {
        let mut ensured = self.ensured.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = ensured.as_ref() {
            return Ok(client.clone());
        }

        let (region, create) = {
            let options = self.options.read().unwrap_or_else(PoisonError::into_inner);
            (options.region.clone(), options.create)
        };
        let client = if region.is_empty() {
            self.client.clone()
        } else {
            debug!(bucket = %self.bucket, region = %region, "scoping client to region");
            self.client.with_region(&region)
        };

        record(client.backend_type(), "bucket_exists");
        if client.bucket_exists(&self.bucket)? {
            debug!(bucket = %self.bucket, "bucket exists");
        } else if !create {
            return Err(StorageError::BucketNotFound {
                bucket: self.bucket.clone(),
            });
        } else {
            let location = (!region.is_empty()).then_some(region.as_str());
            record(client.backend_type(), "create_bucket");
            client.create_bucket(&self.bucket, location)?;
            info!(bucket = %self.bucket, region = ?location, "created bucket");
        }

        *ensured = Some(client.clone());
        Ok(client)
    }

    fn metadata_for(&self, path: &str) -> Metadata {
        self.metadata
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
    }

    fn request_with_metadata(&self, path: &str) -> RequestOptions {
        RequestOptions::new(self.bucket.as_str(), path).merge(&self.metadata_for(path))
    }
}

impl<C: ObjectClient> KeyValueStore for ObjectStoreAdapter<C> {
    fn read(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let client = self.ensure_bucket()?;
        let request = self.request_with_metadata(&self.compute_path(key));
        debug!(bucket = %request.bucket, key = %request.key, "reading object");
        record(client.backend_type(), "get_object");
        client.get_object(&request)
    }

    fn write(&self, key: &str, content: &[u8]) -> Result<PutObjectOutput, StorageError> {
        let client = self.ensure_bucket()?;
        let path = self.compute_path(key);
        let acl = self.acl();

        let mut request = RequestOptions::new(self.bucket.as_str(), path.as_str());
        if !acl.is_empty() {
            request = request.with_field(fields::ACL, acl);
        }
        let mut request = request.merge(&self.metadata_for(&path));
        // The content always wins over a stored body field.
        request.fields.remove(fields::BODY);

        debug!(
            bucket = %request.bucket,
            key = %request.key,
            bytes = content.len(),
            "writing object"
        );
        record(client.backend_type(), "put_object");
        client.put_object(&request, content)
    }

    fn rename(&self, source: &str, target: &str) -> Result<(), StorageError> {
        let client = self.ensure_bucket()?;
        let source_path = self.compute_path(source);
        let target_path = self.compute_path(target);

        let copy_source = format!("{}/{}", self.bucket, source_path);
        let request = RequestOptions::new(self.bucket.as_str(), target_path)
            .merge(&self.metadata_for(&source_path));

        debug!(from = %copy_source, to = %request.key, "copying object");
        record(client.backend_type(), "copy_object");
        client.copy_object(&copy_source, &request)?;

        if let Err(err) = self.delete(source) {
            warn!(
                source = %source,
                target = %target,
                error = %err,
                "rename copied the object but left the source behind"
            );
            return Err(StorageError::OrphanedCopy {
                source_key: source.to_string(),
                target_key: target.to_string(),
                cause: Box::new(err),
            });
        }
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let client = self.ensure_bucket()?;
        record(client.backend_type(), "object_exists");
        client.object_exists(&self.bucket, &self.compute_path(key))
    }

    fn mtime(&self, key: &str) -> Result<Option<DateTime<Utc>>, StorageError> {
        let client = self.ensure_bucket()?;
        let request = self.request_with_metadata(&self.compute_path(key));
        record(client.backend_type(), "head_object");
        Ok(client.head_object(&request)?.last_modified)
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let client = self.ensure_bucket()?;
        // The whole bucket is listed; the directory prefix does not apply.
        record(client.backend_type(), "list_objects");
        let listed = client.list_objects(&self.bucket)?;

        let mut keys = BTreeSet::new();
        for key in &listed {
            if let Some(dir) = parent_dir(key) {
                keys.insert(dir.to_string());
            }
        }
        keys.extend(listed);
        Ok(keys.into_iter().collect())
    }

    fn delete(&self, key: &str) -> Result<DeleteObjectOutput, StorageError> {
        let client = self.ensure_bucket()?;
        let request = self.request_with_metadata(&self.compute_path(key));
        debug!(bucket = %request.bucket, key = %request.key, "deleting object");
        record(client.backend_type(), "delete_object");
        client.delete_object(&request)
    }

    fn is_directory(&self, key: &str) -> Result<bool, StorageError> {
        self.exists(&format!("{key}/"))
    }
}

impl<C: ObjectClient> MetadataSupport for ObjectStoreAdapter<C> {
    fn set_metadata(&self, key: &str, metadata: Metadata) {
        let path = self.compute_path(key);
        self.metadata
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path, metadata);
    }

    fn get_metadata(&self, key: &str) -> Metadata {
        self.metadata_for(&self.compute_path(key))
    }
}

impl<C: ObjectClient> KeyListing for ObjectStoreAdapter<C> {
    fn list_keys(&self, _prefix: &str) -> Result<Vec<String>, StorageError> {
        Err(StorageError::NotImplemented("list_keys"))
    }
}
