//! AWS S3 Backend Client

use super::{
    fields, DeleteObjectOutput, HeadObjectOutput, ObjectClient, PutObjectOutput, RequestOptions,
};
use crate::traits::StorageError;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CreateBucketConfiguration, MetadataDirective, ObjectCannedAcl,
    ServerSideEncryption, StorageClass,
};
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::runtime::Runtime;

/// Fields the S3 client knows how to apply to write requests.
const WRITE_FIELDS: &[&str] = &[
    fields::ACL,
    fields::CONTENT_TYPE,
    fields::CACHE_CONTROL,
    fields::CONTENT_DISPOSITION,
    fields::CONTENT_ENCODING,
    fields::CONTENT_LANGUAGE,
    fields::STORAGE_CLASS,
    fields::SERVER_SIDE_ENCRYPTION,
    fields::METADATA,
];

/// Fields the S3 client knows how to apply to read, head and delete requests.
const READ_FIELDS: &[&str] = &[fields::VERSION_ID];

/// Applies the write fields shared by put-object and copy-object builders.
macro_rules! apply_write_fields {
    ($builder:expr, $request:expr) => {{
        let request: &RequestOptions = $request;
        let mut builder = $builder;
        if let Some(acl) = request.field_str(fields::ACL) {
            builder = builder.acl(ObjectCannedAcl::from(acl.as_str()));
        }
        if let Some(value) = request.field_str(fields::CONTENT_TYPE) {
            builder = builder.content_type(value);
        }
        if let Some(value) = request.field_str(fields::CACHE_CONTROL) {
            builder = builder.cache_control(value);
        }
        if let Some(value) = request.field_str(fields::CONTENT_DISPOSITION) {
            builder = builder.content_disposition(value);
        }
        if let Some(value) = request.field_str(fields::CONTENT_ENCODING) {
            builder = builder.content_encoding(value);
        }
        if let Some(value) = request.field_str(fields::CONTENT_LANGUAGE) {
            builder = builder.content_language(value);
        }
        if let Some(value) = request.field_str(fields::STORAGE_CLASS) {
            builder = builder.storage_class(StorageClass::from(value.as_str()));
        }
        if let Some(value) = request.field_str(fields::SERVER_SIDE_ENCRYPTION) {
            builder = builder.server_side_encryption(ServerSideEncryption::from(value.as_str()));
        }
        if let Some(metadata) = request.user_metadata() {
            builder = builder.set_metadata(Some(metadata));
        }
        builder
    }};
}

/// AWS S3 backend client.
///
/// The SDK is async; calls are driven to completion on a runtime owned by
/// the client, so it must not be used from inside another tokio runtime.
#[derive(Clone)]
pub struct S3Client {
    client: Client,
    runtime: Arc<Runtime>,
}

impl std::fmt::Debug for S3Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Client")
            .field("region", &self.client.config().region())
            .finish()
    }
}

impl S3Client {
    /// Build a client from the standard AWS environment.
    pub fn new() -> Result<Self, StorageError> {
        let runtime = Runtime::new().map_err(|e| StorageError::Configuration(e.to_string()))?;
        let client = runtime.block_on(async {
            let config = aws_config::load_from_env().await;
            Client::new(&config)
        });

        Ok(Self {
            client,
            runtime: Arc::new(runtime),
        })
    }

    /// Build a client against an S3-compatible endpoint (MinIO, LocalStack).
    pub fn with_endpoint(
        endpoint_url: impl Into<String>,
        region: impl Into<String>,
    ) -> Result<Self, StorageError> {
        let runtime = Runtime::new().map_err(|e| StorageError::Configuration(e.to_string()))?;
        let endpoint = endpoint_url.into();
        let region_str = region.into();

        let client = runtime.block_on(async {
            let config = aws_config::from_env()
                .endpoint_url(&endpoint)
                .region(Region::new(region_str))
                .load()
                .await;
            let s3_config = aws_sdk_s3::config::Builder::from(&config)
                .force_path_style(true)
                .build();
            Client::from_conf(s3_config)
        });

        Ok(Self {
            client,
            runtime: Arc::new(runtime),
        })
    }

    fn run_async<F, T>(&self, fut: F) -> Result<T, StorageError>
    where
        F: std::future::Future<Output = Result<T, StorageError>>,
    {
        self.runtime.block_on(fut)
    }

    fn log_ignored_fields(request: &RequestOptions, known: &[&str]) {
        for name in request.fields.keys() {
            if !known.contains(&name.as_str()) {
                tracing::debug!(field = %name, "s3 backend ignores request field");
            }
        }
    }
}

fn map_sdk_error<E, R>(err: SdkError<E, R>, target: &str) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let detail = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => StorageError::Network(detail),
        SdkError::ServiceError(ctx) => match ctx.err().code() {
            Some("NoSuchKey" | "NotFound" | "NoSuchBucket") => {
                StorageError::NotFound(target.to_string())
            }
            Some("AccessDenied" | "Forbidden") => StorageError::PermissionDenied(target.to_string()),
            _ => StorageError::Provider(detail),
        },
        _ => StorageError::Provider(detail),
    }
}

fn to_utc(t: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos())
}

impl ObjectClient for S3Client {
    fn get_object(&self, request: &RequestOptions) -> Result<Vec<u8>, StorageError> {
        Self::log_ignored_fields(request, READ_FIELDS);
        let target = format!("{}/{}", request.bucket, request.key);
        self.run_async(async {
            let resp = self
                .client
                .get_object()
                .bucket(&request.bucket)
                .key(&request.key)
                .set_version_id(request.field_str(fields::VERSION_ID))
                .send()
                .await
                .map_err(|e| map_sdk_error(e, &target))?;
            let body = resp
                .body
                .collect()
                .await
                .map_err(|e| StorageError::Network(e.to_string()))?;
            Ok(body.into_bytes().to_vec())
        })
    }

    fn put_object(
        &self,
        request: &RequestOptions,
        body: &[u8],
    ) -> Result<PutObjectOutput, StorageError> {
        Self::log_ignored_fields(request, WRITE_FIELDS);
        let target = format!("{}/{}", request.bucket, request.key);
        let builder = self
            .client
            .put_object()
            .bucket(&request.bucket)
            .key(&request.key)
            .body(ByteStream::from(body.to_vec()));
        let builder = apply_write_fields!(builder, request);
        self.run_async(async {
            let resp = builder
                .send()
                .await
                .map_err(|e| map_sdk_error(e, &target))?;
            Ok(PutObjectOutput {
                etag: resp.e_tag().map(|s| s.to_string()),
                version_id: resp.version_id().map(|s| s.to_string()),
            })
        })
    }

    fn delete_object(&self, request: &RequestOptions) -> Result<DeleteObjectOutput, StorageError> {
        Self::log_ignored_fields(request, READ_FIELDS);
        let target = format!("{}/{}", request.bucket, request.key);
        self.run_async(async {
            let resp = self
                .client
                .delete_object()
                .bucket(&request.bucket)
                .key(&request.key)
                .set_version_id(request.field_str(fields::VERSION_ID))
                .send()
                .await
                .map_err(|e| map_sdk_error(e, &target))?;
            Ok(DeleteObjectOutput {
                delete_marker: resp.delete_marker().unwrap_or_default(),
                version_id: resp.version_id().map(|s| s.to_string()),
            })
        })
    }

    fn head_object(&self, request: &RequestOptions) -> Result<HeadObjectOutput, StorageError> {
        Self::log_ignored_fields(request, READ_FIELDS);
        let target = format!("{}/{}", request.bucket, request.key);
        self.run_async(async {
            let resp = self
                .client
                .head_object()
                .bucket(&request.bucket)
                .key(&request.key)
                .set_version_id(request.field_str(fields::VERSION_ID))
                .send()
                .await
                .map_err(|e| map_sdk_error(e, &target))?;

            Ok(HeadObjectOutput {
                content_length: resp.content_length().unwrap_or(0) as u64,
                last_modified: resp.last_modified().and_then(to_utc),
                content_type: resp.content_type().map(|s| s.to_string()),
                etag: resp.e_tag().map(|s| s.to_string()),
                metadata: resp.metadata().cloned().unwrap_or_default(),
            })
        })
    }

    fn copy_object(&self, copy_source: &str, request: &RequestOptions) -> Result<(), StorageError> {
        Self::log_ignored_fields(request, WRITE_FIELDS);
        let mut builder = self
            .client
            .copy_object()
            .bucket(&request.bucket)
            .copy_source(copy_source)
            .key(&request.key);
        if request.user_metadata().is_some() {
            builder = builder.metadata_directive(MetadataDirective::Replace);
        }
        let builder = apply_write_fields!(builder, request);

        self.run_async(async {
            builder
                .send()
                .await
                .map_err(|e| map_sdk_error(e, copy_source))?;
            Ok(())
        })
    }

    fn list_objects(&self, bucket: &str) -> Result<Vec<String>, StorageError> {
        self.run_async(async {
            let mut results = Vec::new();
            let mut continuation_token = None;

            loop {
                let mut req = self.client.list_objects_v2().bucket(bucket);
                if let Some(token) = continuation_token {
                    req = req.continuation_token(token);
                }
                let resp = req.send().await.map_err(|e| map_sdk_error(e, bucket))?;

                for object in resp.contents() {
                    if let Some(key) = object.key() {
                        results.push(key.to_string());
                    }
                }

                if let Some(token) = resp.next_continuation_token() {
                    continuation_token = Some(token.to_string());
                } else {
                    break;
                }
            }
            Ok(results)
        })
    }

    fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, StorageError> {
        let target = format!("{bucket}/{key}");
        self.run_async(async {
            match self.client.head_object().bucket(bucket).key(key).send().await {
                Ok(_) => Ok(true),
                Err(e) => match map_sdk_error(e, &target) {
                    StorageError::NotFound(_) => Ok(false),
                    other => Err(other),
                },
            }
        })
    }

    fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        self.run_async(async {
            match self.client.head_bucket().bucket(bucket).send().await {
                Ok(_) => Ok(true),
                Err(e) => match map_sdk_error(e, bucket) {
                    StorageError::NotFound(_) => Ok(false),
                    other => Err(other),
                },
            }
        })
    }

    fn create_bucket(
        &self,
        bucket: &str,
        location_constraint: Option<&str>,
    ) -> Result<(), StorageError> {
        let mut req = self.client.create_bucket().bucket(bucket);
        // us-east-1 rejects an explicit location constraint.
        if let Some(location) = location_constraint.filter(|l| *l != "us-east-1") {
            req = req.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(location))
                    .build(),
            );
        }
        self.run_async(async {
            req.send().await.map_err(|e| map_sdk_error(e, bucket))?;
            Ok(())
        })
    }

    fn with_region(&self, region: &str) -> Self {
        let config = self
            .client
            .config()
            .to_builder()
            .region(Region::new(region.to_string()))
            .build();
        Self {
            client: Client::from_conf(config),
            runtime: Arc::clone(&self.runtime),
        }
    }

    fn backend_type(&self) -> &'static str {
        "s3"
    }
}
