//! Key-value filesystem adapter over object storage.
//!
//! [`ObjectStoreAdapter`] exposes one bucket through the capability traits in
//! [`traits`], delegating all I/O to an [`ObjectClient`].

pub mod adapter;
pub mod client;
mod metadata;
pub mod options;
pub mod traits;

// Re-exports
pub use adapter::ObjectStoreAdapter;
pub use client::{
    DeleteObjectOutput, HeadObjectOutput, LocalClient, MemoryClient, ObjectClient,
    PutObjectOutput, RequestOptions,
};
pub use options::AdapterOptions;
pub use traits::{KeyListing, KeyValueStore, Metadata, MetadataSupport, StorageError};

#[cfg(feature = "s3")]
pub use client::S3Client;
