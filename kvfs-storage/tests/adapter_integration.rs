use kvfs_storage::{
    AdapterOptions, KeyValueStore, LocalClient, MemoryClient, MetadataSupport, ObjectClient,
    ObjectStoreAdapter, StorageError,
};
use serde_json::json;
use std::sync::Arc;
use std::thread;

fn assert_bucket_missing<T: std::fmt::Debug>(result: Result<T, StorageError>) {
    match result {
        Err(StorageError::BucketNotFound { bucket }) => assert_eq!(bucket, "absent"),
        other => panic!("expected missing bucket error, got {other:?}"),
    }
}

#[test]
fn test_every_data_operation_requires_bucket() {
    let client = MemoryClient::with_buckets(["present"]);
    let adapter = ObjectStoreAdapter::new(client.clone(), "absent", AdapterOptions::default());

    assert_bucket_missing(adapter.read("k"));
    assert_bucket_missing(adapter.write("k", b"v"));
    assert_bucket_missing(adapter.delete("k"));
    assert_bucket_missing(adapter.exists("k"));
    assert_bucket_missing(adapter.mtime("k"));
    assert_bucket_missing(adapter.keys());
    assert_bucket_missing(adapter.rename("a", "b"));
    assert_bucket_missing(adapter.is_directory("k"));

    // Only existence checks reached the backend.
    assert_eq!(client.bucket_exists_calls(), 8);
    assert_eq!(client.create_bucket_calls(), 0);
    assert!(!client.bucket_exists("absent").unwrap());
}

#[test]
fn test_concurrent_first_use_checks_bucket_once() {
    let client = MemoryClient::new();
    let adapter = Arc::new(ObjectStoreAdapter::new(
        client.clone(),
        "shared",
        AdapterOptions::default().with_create(true),
    ));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let adapter = Arc::clone(&adapter);
            thread::spawn(move || adapter.write(&format!("file-{i}"), b"x").map(|_| ()))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    assert_eq!(client.bucket_exists_calls(), 1);
    assert_eq!(client.create_bucket_calls(), 1);
    assert_eq!(adapter.keys().unwrap().len(), 8);
}

#[test]
fn test_region_scoping_is_per_adapter() {
    let shared = MemoryClient::with_buckets(["eu", "us"]);
    let eu = ObjectStoreAdapter::new(
        shared.clone(),
        "eu",
        AdapterOptions::default().with_region("eu-west-1"),
    );
    let us = ObjectStoreAdapter::new(shared.clone(), "us", AdapterOptions::default());

    eu.write("a", b"1").unwrap();
    us.write("b", b"2").unwrap();

    assert_eq!(shared.region(), None);
    assert!(shared.object_exists("eu", "a").unwrap());
    assert!(shared.object_exists("us", "b").unwrap());
}

#[test]
fn test_local_backend_round_trip() {
    let temp = tempfile::tempdir().unwrap();
    let client = LocalClient::new(temp.path()).unwrap();
    let adapter = ObjectStoreAdapter::new(
        client.clone(),
        "assets",
        AdapterOptions::default()
            .with_create(true)
            .with_directory("site"),
    );

    adapter.write("css/main.css", b"body {}").unwrap();
    adapter.write("index.html", b"<html>").unwrap();
    adapter.write("css/", b"").unwrap();

    assert!(temp.path().join("assets/site/css/main.css").is_file());
    assert_eq!(adapter.read("index.html").unwrap(), b"<html>");
    assert!(adapter.is_directory("css").unwrap());
    assert!(adapter.mtime("index.html").unwrap().is_some());

    assert_eq!(
        adapter.keys().unwrap(),
        vec![
            "site",
            "site/css",
            "site/css/",
            "site/css/main.css",
            "site/index.html",
        ]
    );

    adapter.rename("index.html", "home.html").unwrap();
    assert!(!adapter.exists("index.html").unwrap());
    assert!(adapter.exists("home.html").unwrap());
}

#[test]
fn test_metadata_forwarded_on_rename() {
    let client = MemoryClient::with_buckets(["docs"]);
    let adapter = ObjectStoreAdapter::new(client.clone(), "docs", AdapterOptions::default());

    let mut metadata = kvfs_storage::Metadata::new();
    metadata.insert("ContentType".into(), json!("application/pdf"));
    adapter.set_metadata("draft.pdf", metadata);

    adapter.write("draft.pdf", b"%PDF").unwrap();
    adapter.rename("draft.pdf", "final.pdf").unwrap();

    let head = client
        .head_object(&kvfs_storage::RequestOptions::new("docs", "final.pdf"))
        .unwrap();
    assert_eq!(head.content_type.as_deref(), Some("application/pdf"));
}

#[test]
fn test_capability_traits_as_objects() {
    let client = MemoryClient::with_buckets(["b"]);
    let adapter = ObjectStoreAdapter::new(client, "b", AdapterOptions::default());

    let store: &dyn KeyValueStore = &adapter;
    store.write("k", b"v").unwrap();
    assert_eq!(store.read("k").unwrap(), b"v");

    let meta: &dyn MetadataSupport = &adapter;
    assert!(meta.get_metadata("k").is_empty());
}

#[test]
fn test_bounded_metadata_table() {
    let client = MemoryClient::with_buckets(["b"]);
    let adapter = ObjectStoreAdapter::new(
        client,
        "b",
        AdapterOptions::default().with_metadata_capacity(1),
    );

    let mut first = kvfs_storage::Metadata::new();
    first.insert("ACL".into(), json!("private"));
    adapter.set_metadata("one", first.clone());
    adapter.set_metadata("two", first.clone());

    assert!(adapter.get_metadata("one").is_empty());
    assert_eq!(adapter.get_metadata("two"), first);
}

#[test]
fn test_local_backend_keeps_slash_variants_apart() {
    let temp = tempfile::tempdir().unwrap();
    let client = LocalClient::new(temp.path()).unwrap();
    let adapter = ObjectStoreAdapter::new(
        client.clone(),
        "bucket",
        AdapterOptions::default()
            .with_create(true)
            .with_directory("d"),
    );

    adapter.write("x", b"plain").unwrap();
    for key in ["/x", "./x", "x//"] {
        let err = adapter.write(key, b"other").unwrap_err();
        assert!(matches!(err, StorageError::InvalidPath(_)), "{key}: {err:?}");
    }

    assert_eq!(adapter.read("x").unwrap(), b"plain");
    assert_eq!(client.list_objects("bucket").unwrap(), vec!["d/x"]);
}

#[test]
fn test_local_backend_object_and_marker_conflict() {
    let temp = tempfile::tempdir().unwrap();
    let client = LocalClient::new(temp.path()).unwrap();
    let adapter = ObjectStoreAdapter::new(
        client,
        "bucket",
        AdapterOptions::default().with_create(true),
    );

    adapter.write("dir/", b"").unwrap();
    let err = adapter.write("dir", b"x").unwrap_err();
    assert!(matches!(err, StorageError::InvalidPath(_)), "{err:?}");
    assert!(adapter.is_directory("dir").unwrap());
    assert!(!adapter.exists("dir").unwrap());
}
