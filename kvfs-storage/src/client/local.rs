//! Local Filesystem Backend Client
//!
//! Maps buckets to directories under a root and objects to files inside
//! them. Useful for development, testing, and single-node deployments.

use super::{
    split_copy_source, DeleteObjectOutput, HeadObjectOutput, ObjectClient, PutObjectOutput,
    RequestOptions,
};
use crate::traits::StorageError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// File standing in for an object whose key ends with `/`.
const DIR_MARKER: &str = ".kvfs-dir";

/// Local filesystem-based object store client.
#[derive(Debug, Clone)]
pub struct LocalClient {
    root: PathBuf,
    region: Option<String>,
}

impl LocalClient {
    /// Create a new LocalClient with the given root directory.
    ///
    /// # Arguments
    /// * `root` - Directory holding one subdirectory per bucket
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root, region: None })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Region this handle was scoped to. The filesystem has no regions, so
    /// it is only recorded.
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    fn bucket_path(&self, bucket: &str) -> Result<PathBuf, StorageError> {
        if bucket.is_empty() || bucket.contains(['/', '\\']) || bucket == "." || bucket == ".." {
            return Err(StorageError::InvalidPath(format!("bad bucket name: {bucket}")));
        }
        Ok(self.root.join(bucket))
    }

    /// Get the file backing `key` inside `bucket`.
    ///
    /// Keys map to paths one-to-one. Segments the filesystem would collapse
    /// (empty, `.`, `..`) or that clash with the marker file are rejected
    /// rather than folded into another key's file.
    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        let (body, is_marker) = match key.strip_suffix('/') {
            Some(body) => (body, true),
            None => (key, false),
        };
        let bad_segment = body.split('/').find(|s| {
            s.is_empty() || *s == "." || *s == ".." || *s == DIR_MARKER || s.contains('\\')
        });
        if let Some(segment) = bad_segment {
            return Err(StorageError::InvalidPath(format!(
                "key {key:?} has segment {segment:?} the local backend cannot store"
            )));
        }
        let mut path = self.bucket_path(bucket)?.join(body);
        if is_marker {
            path.push(DIR_MARKER);
        }
        Ok(path)
    }

    /// Files and directories share one namespace on disk, so an object `a`
    /// cannot coexist with `a/` or `a/b`. Report that as a path error
    /// instead of a raw IO failure.
    fn check_layout(&self, bucket: &str, key: &str, path: &Path) -> Result<(), StorageError> {
        let bucket_root = self.bucket_path(bucket)?;
        if path.is_dir() {
            return Err(StorageError::InvalidPath(format!(
                "key {key:?} conflicts with a directory of the same name in the local backend"
            )));
        }
        let blocked = path
            .ancestors()
            .skip(1)
            .take_while(|a| *a != bucket_root.as_path())
            .find(|a| a.is_file());
        if let Some(ancestor) = blocked {
            return Err(StorageError::InvalidPath(format!(
                "key {key:?} needs {} to be a directory but it holds an object",
                ancestor.display()
            )));
        }
        Ok(())
    }

    fn existing_bucket(&self, bucket: &str) -> Result<PathBuf, StorageError> {
        let path = self.bucket_path(bucket)?;
        if !path.is_dir() {
            return Err(StorageError::NotFound(format!("bucket {bucket}")));
        }
        Ok(path)
    }

    fn map_io(err: std::io::Error, bucket: &str, key: &str) -> StorageError {
        match err.kind() {
            ErrorKind::NotFound => StorageError::NotFound(format!("{bucket}/{key}")),
            ErrorKind::PermissionDenied => StorageError::PermissionDenied(format!("{bucket}/{key}")),
            _ => StorageError::Io(err),
        }
    }

    fn write_file(path: &Path, body: &[u8]) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, body)
    }
}

impl ObjectClient for LocalClient {
    fn get_object(&self, request: &RequestOptions) -> Result<Vec<u8>, StorageError> {
        self.existing_bucket(&request.bucket)?;
        let path = self.object_path(&request.bucket, &request.key)?;
        fs::read(&path).map_err(|e| Self::map_io(e, &request.bucket, &request.key))
    }

    fn put_object(
        &self,
        request: &RequestOptions,
        body: &[u8],
    ) -> Result<PutObjectOutput, StorageError> {
        self.existing_bucket(&request.bucket)?;
        for name in request.fields.keys() {
            tracing::debug!(field = %name, "local backend ignores request field");
        }
        let path = self.object_path(&request.bucket, &request.key)?;
        self.check_layout(&request.bucket, &request.key, &path)?;
        Self::write_file(&path, body).map_err(|e| Self::map_io(e, &request.bucket, &request.key))?;
        Ok(PutObjectOutput::default())
    }

    fn delete_object(&self, request: &RequestOptions) -> Result<DeleteObjectOutput, StorageError> {
        self.existing_bucket(&request.bucket)?;
        let path = self.object_path(&request.bucket, &request.key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(DeleteObjectOutput::default()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(DeleteObjectOutput::default()),
            Err(e) => Err(Self::map_io(e, &request.bucket, &request.key)),
        }
    }

    fn head_object(&self, request: &RequestOptions) -> Result<HeadObjectOutput, StorageError> {
        self.existing_bucket(&request.bucket)?;
        let path = self.object_path(&request.bucket, &request.key)?;
        let metadata =
            fs::metadata(&path).map_err(|e| Self::map_io(e, &request.bucket, &request.key))?;
        if !metadata.is_file() {
            return Err(StorageError::NotFound(format!(
                "{}/{}",
                request.bucket, request.key
            )));
        }
        let last_modified = metadata.modified().ok().map(DateTime::<Utc>::from);

        Ok(HeadObjectOutput {
            content_length: metadata.len(),
            last_modified,
            content_type: None,
            etag: None,
            metadata: HashMap::new(),
        })
    }

    fn copy_object(&self, copy_source: &str, request: &RequestOptions) -> Result<(), StorageError> {
        let (src_bucket, src_key) = split_copy_source(copy_source)?;
        self.existing_bucket(src_bucket)?;
        self.existing_bucket(&request.bucket)?;
        let src_path = self.object_path(src_bucket, src_key)?;
        let dst_path = self.object_path(&request.bucket, &request.key)?;
        self.check_layout(&request.bucket, &request.key, &dst_path)?;

        if let Some(parent) = dst_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&src_path, &dst_path).map_err(|e| Self::map_io(e, src_bucket, src_key))?;
        Ok(())
    }

    fn list_objects(&self, bucket: &str) -> Result<Vec<String>, StorageError> {
        let path = self.existing_bucket(bucket)?;

        let mut results = Vec::new();
        for entry in WalkDir::new(&path).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| StorageError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&path)
                .map_err(|e| StorageError::InvalidPath(e.to_string()))?;
            let mut parts: Vec<String> = relative
                .iter()
                .map(|c| c.to_string_lossy().into_owned())
                .collect();
            if parts.last().map(String::as_str) == Some(DIR_MARKER) {
                parts.pop();
                results.push(format!("{}/", parts.join("/")));
            } else {
                results.push(parts.join("/"));
            }
        }
        Ok(results)
    }

    fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, StorageError> {
        let path = self.object_path(bucket, key)?;
        Ok(path.is_file())
    }

    fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        Ok(self.bucket_path(bucket)?.is_dir())
    }

    fn create_bucket(
        &self,
        bucket: &str,
        location_constraint: Option<&str>,
    ) -> Result<(), StorageError> {
        let path = self.bucket_path(bucket)?;
        if path.exists() {
            return Err(StorageError::Provider(format!(
                "BucketAlreadyOwnedByYou: {bucket}"
            )));
        }
        tracing::debug!(bucket, location = ?location_constraint, "local backend created bucket");
        fs::create_dir_all(&path)?;
        Ok(())
    }

    fn with_region(&self, region: &str) -> Self {
        Self {
            root: self.root.clone(),
            region: Some(region.to_string()),
        }
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}
