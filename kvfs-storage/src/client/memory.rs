//! In-Memory Backend Client
//!
//! Keeps buckets and objects in process memory. Clones share state, which
//! makes it suitable for tests and for embedding without a network backend.

use super::{
    fields, split_copy_source, DeleteObjectOutput, HeadObjectOutput, ObjectClient,
    PutObjectOutput, RequestOptions,
};
use crate::traits::StorageError;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone)]
struct StoredObject {
    body: Vec<u8>,
    last_modified: Option<DateTime<Utc>>,
    content_type: Option<String>,
    metadata: HashMap<String, String>,
    etag: String,
}

#[derive(Debug, Default)]
struct MemoryState {
    buckets: HashMap<String, BTreeMap<String, StoredObject>>,
    bucket_exists_calls: usize,
    create_bucket_calls: usize,
    failing_deletes: usize,
    failing_creates: usize,
    denied_reads: usize,
    untimed_writes: bool,
    version: u64,
}

/// In-memory object store client.
#[derive(Debug, Clone, Default)]
pub struct MemoryClient {
    state: Arc<RwLock<MemoryState>>,
    region: Option<String>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a client that already holds the given buckets.
    pub fn with_buckets<I, S>(buckets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client = Self::new();
        {
            let mut state = client.state.write().unwrap_or_else(PoisonError::into_inner);
            for bucket in buckets {
                state.buckets.entry(bucket.into()).or_default();
            }
        }
        client
    }

    /// Region this handle is scoped to, if any.
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    /// Number of `bucket_exists` calls served by any clone of this client.
    pub fn bucket_exists_calls(&self) -> usize {
        self.state.read().unwrap_or_else(PoisonError::into_inner).bucket_exists_calls
    }

    /// Number of `create_bucket` calls served by any clone of this client.
    pub fn create_bucket_calls(&self) -> usize {
        self.state.read().unwrap_or_else(PoisonError::into_inner).create_bucket_calls
    }

    /// Make the next `count` delete calls fail with a network error.
    pub fn fail_next_deletes(&self, count: usize) {
        self.state.write().unwrap_or_else(PoisonError::into_inner).failing_deletes = count;
    }

    /// Make the next `count` bucket creations fail with a provider error.
    /// The failed calls still count towards [`Self::create_bucket_calls`].
    pub fn fail_next_creates(&self, count: usize) {
        self.state.write().unwrap_or_else(PoisonError::into_inner).failing_creates = count;
    }

    /// Make the next `count` get or head calls fail with access denied.
    pub fn deny_next_reads(&self, count: usize) {
        self.state.write().unwrap_or_else(PoisonError::into_inner).denied_reads = count;
    }

    /// Store objects written from now on without a last-modified time,
    /// like providers that omit the header.
    pub fn omit_last_modified(&self, omit: bool) {
        self.state.write().unwrap_or_else(PoisonError::into_inner).untimed_writes = omit;
    }

    /// Remove a bucket and everything in it, bypassing the adapter.
    pub fn drop_bucket(&self, bucket: &str) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .buckets
            .remove(bucket);
    }

    fn missing_bucket(bucket: &str) -> StorageError {
        StorageError::NotFound(format!("bucket {bucket}"))
    }

    fn missing_object(bucket: &str, key: &str) -> StorageError {
        StorageError::NotFound(format!("{bucket}/{key}"))
    }

    fn take_denied_read(
        state: &mut MemoryState,
        request: &RequestOptions,
    ) -> Result<(), StorageError> {
        if state.denied_reads > 0 {
            state.denied_reads -= 1;
            return Err(StorageError::PermissionDenied(format!(
                "{}/{}",
                request.bucket, request.key
            )));
        }
        Ok(())
    }

    fn log_ignored_fields(request: &RequestOptions) {
        for name in request.fields.keys() {
            if name != fields::CONTENT_TYPE && name != fields::METADATA {
                tracing::debug!(field = %name, "memory backend ignores request field");
            }
        }
    }
}

impl ObjectClient for MemoryClient {
    fn get_object(&self, request: &RequestOptions) -> Result<Vec<u8>, StorageError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        Self::take_denied_read(&mut state, request)?;
        let bucket = state
            .buckets
            .get(&request.bucket)
            .ok_or_else(|| Self::missing_bucket(&request.bucket))?;
        bucket
            .get(&request.key)
            .map(|object| object.body.clone())
            .ok_or_else(|| Self::missing_object(&request.bucket, &request.key))
    }

    fn put_object(
        &self,
        request: &RequestOptions,
        body: &[u8],
    ) -> Result<PutObjectOutput, StorageError> {
        Self::log_ignored_fields(request);
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.version += 1;
        let etag = format!("\"{:016x}\"", state.version);
        let last_modified = (!state.untimed_writes).then(Utc::now);
        let bucket = state
            .buckets
            .get_mut(&request.bucket)
            .ok_or_else(|| Self::missing_bucket(&request.bucket))?;
        bucket.insert(
            request.key.clone(),
            StoredObject {
                body: body.to_vec(),
                last_modified,
                content_type: request.field_str(fields::CONTENT_TYPE),
                metadata: request.user_metadata().unwrap_or_default(),
                etag: etag.clone(),
            },
        );
        Ok(PutObjectOutput {
            etag: Some(etag),
            version_id: None,
        })
    }

    fn delete_object(&self, request: &RequestOptions) -> Result<DeleteObjectOutput, StorageError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.failing_deletes > 0 {
            state.failing_deletes -= 1;
            return Err(StorageError::Network(format!(
                "injected delete failure for {}/{}",
                request.bucket, request.key
            )));
        }
        let bucket = state
            .buckets
            .get_mut(&request.bucket)
            .ok_or_else(|| Self::missing_bucket(&request.bucket))?;
        // Deleting a missing key succeeds, as it does on S3.
        bucket.remove(&request.key);
        Ok(DeleteObjectOutput::default())
    }

    fn head_object(&self, request: &RequestOptions) -> Result<HeadObjectOutput, StorageError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        Self::take_denied_read(&mut state, request)?;
        let object = state
            .buckets
            .get(&request.bucket)
            .ok_or_else(|| Self::missing_bucket(&request.bucket))?
            .get(&request.key)
            .ok_or_else(|| Self::missing_object(&request.bucket, &request.key))?;
        Ok(HeadObjectOutput {
            content_length: object.body.len() as u64,
            last_modified: object.last_modified,
            content_type: object.content_type.clone(),
            etag: Some(object.etag.clone()),
            metadata: object.metadata.clone(),
        })
    }

    fn copy_object(&self, copy_source: &str, request: &RequestOptions) -> Result<(), StorageError> {
        let (src_bucket, src_key) = split_copy_source(copy_source)?;
        Self::log_ignored_fields(request);
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let mut object = state
            .buckets
            .get(src_bucket)
            .ok_or_else(|| Self::missing_bucket(src_bucket))?
            .get(src_key)
            .cloned()
            .ok_or_else(|| Self::missing_object(src_bucket, src_key))?;
        object.last_modified = (!state.untimed_writes).then(Utc::now);
        if let Some(content_type) = request.field_str(fields::CONTENT_TYPE) {
            object.content_type = Some(content_type);
        }
        if let Some(metadata) = request.user_metadata() {
            object.metadata = metadata;
        }
        state
            .buckets
            .get_mut(&request.bucket)
            .ok_or_else(|| Self::missing_bucket(&request.bucket))?
            .insert(request.key.clone(), object);
        Ok(())
    }

    fn list_objects(&self, bucket: &str) -> Result<Vec<String>, StorageError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state
            .buckets
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .ok_or_else(|| Self::missing_bucket(bucket))
    }

    fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, StorageError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state
            .buckets
            .get(bucket)
            .is_some_and(|objects| objects.contains_key(key)))
    }

    fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.bucket_exists_calls += 1;
        Ok(state.buckets.contains_key(bucket))
    }

    fn create_bucket(
        &self,
        bucket: &str,
        location_constraint: Option<&str>,
    ) -> Result<(), StorageError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.create_bucket_calls += 1;
        if state.failing_creates > 0 {
            state.failing_creates -= 1;
            return Err(StorageError::Provider(format!(
                "injected create failure for {bucket}"
            )));
        }
        if state.buckets.contains_key(bucket) {
            return Err(StorageError::Provider(format!(
                "BucketAlreadyOwnedByYou: {bucket}"
            )));
        }
        tracing::debug!(bucket, location = ?location_constraint, "memory backend created bucket");
        state.buckets.insert(bucket.to_string(), BTreeMap::new());
        Ok(())
    }

    fn with_region(&self, region: &str) -> Self {
        Self {
            state: Arc::clone(&self.state),
            region: Some(region.to_string()),
        }
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_head() {
        let client = MemoryClient::with_buckets(["b"]);
        let request = RequestOptions::new("b", "dir/file.txt").with_field("ContentType", "text/plain");
        client.put_object(&request, b"hello").unwrap();

        assert_eq!(client.get_object(&request).unwrap(), b"hello");
        let head = client.head_object(&request).unwrap();
        assert_eq!(head.content_length, 5);
        assert_eq!(head.content_type.as_deref(), Some("text/plain"));
        assert!(head.last_modified.is_some());
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let client = MemoryClient::with_buckets(["b"]);
        let err = client.get_object(&RequestOptions::new("b", "nope")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_region_handle_shares_state() {
        let client = MemoryClient::with_buckets(["b"]);
        let scoped = client.with_region("eu-west-1");
        scoped
            .put_object(&RequestOptions::new("b", "k"), b"v")
            .unwrap();

        assert_eq!(client.region(), None);
        assert_eq!(scoped.region(), Some("eu-west-1"));
        assert!(client.object_exists("b", "k").unwrap());
    }

    #[test]
    fn test_injected_delete_failure() {
        let client = MemoryClient::with_buckets(["b"]);
        let request = RequestOptions::new("b", "k");
        client.put_object(&request, b"v").unwrap();
        client.fail_next_deletes(1);

        assert!(client.delete_object(&request).is_err());
        assert!(client.object_exists("b", "k").unwrap());
        client.delete_object(&request).unwrap();
        assert!(!client.object_exists("b", "k").unwrap());
    }

    #[test]
    fn test_injected_read_and_create_failures() {
        let client = MemoryClient::with_buckets(["b"]);
        let request = RequestOptions::new("b", "k");
        client.put_object(&request, b"v").unwrap();

        client.deny_next_reads(2);
        assert!(matches!(
            client.get_object(&request),
            Err(StorageError::PermissionDenied(_))
        ));
        assert!(matches!(
            client.head_object(&request),
            Err(StorageError::PermissionDenied(_))
        ));
        assert_eq!(client.get_object(&request).unwrap(), b"v");

        client.fail_next_creates(1);
        assert!(matches!(
            client.create_bucket("c", None),
            Err(StorageError::Provider(_))
        ));
        assert!(!client.bucket_exists("c").unwrap());
        client.create_bucket("c", None).unwrap();
    }

    #[test]
    fn test_omitted_last_modified() {
        let client = MemoryClient::with_buckets(["b"]);
        client.omit_last_modified(true);
        let request = RequestOptions::new("b", "k");
        client.put_object(&request, b"v").unwrap();
        assert_eq!(client.head_object(&request).unwrap().last_modified, None);
    }

    #[test]
    fn test_create_existing_bucket_fails() {
        let client = MemoryClient::with_buckets(["b"]);
        assert!(client.create_bucket("b", None).is_err());
        client.create_bucket("c", Some("eu-west-1")).unwrap();
        assert!(client.bucket_exists("c").unwrap());
        assert_eq!(client.create_bucket_calls(), 2);
    }
}
