//! KeyVaultBlobStore against a fake vault served by wiremock

mod support;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::TryStreamExt;
use pretty_assertions::assert_eq;
use secretblob_keyvault::prelude::*;
use serde_json::json;
use support::FakeVault;
use tokio::sync::Mutex;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const NAMES: [&str; 4] = ["bio", "photo", "resume", "portfolio"];

async fn setup(prefix: &str) -> (MockServer, FakeVault, KeyVaultBlobStore) {
    let server = MockServer::start().await;
    let vault = FakeVault::mount(&server).await;
    let store = support::store(&server, prefix);
    (server, vault, store)
}

fn unique(name: &str) -> String {
    format!("{}{name}", uuid::Uuid::new_v4())
}

fn collecting(sink: Arc<Mutex<Vec<String>>>) -> BlobVisitor {
    visitor(move |blob| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().await.push(blob.name);
            Ok(())
        }
    })
}

#[tokio::test]
async fn test_put_then_get() {
    let (_server, vault, store) = setup("").await;

    store.put("bio", "Fred Flintstone").await.unwrap();

    assert_eq!(store.get("bio").await.unwrap(), "Fred Flintstone");
    assert_eq!(vault.value("bio").as_deref(), Some("Fred Flintstone"));
}

#[tokio::test]
async fn test_last_writer_wins() {
    let (_server, _vault, store) = setup("").await;

    store.put("bio", "first").await.unwrap();
    store.put("bio", "second").await.unwrap();

    assert_eq!(store.get("bio").await.unwrap(), "second");
}

#[tokio::test]
async fn test_get_missing_is_not_found() {
    let (_server, _vault, store) = setup("").await;

    let err = store.get("nope").await.unwrap_err();

    match err {
        BlobError::NotFound { key } => assert_eq!(key, "nope"),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_delete_then_get_is_not_found() {
    let (_server, vault, store) = setup("").await;
    store.put("bio", "Fred").await.unwrap();

    store.delete("bio").await.unwrap();

    assert!(store.get("bio").await.unwrap_err().is_not_found());
    assert!(vault.names().is_empty());
}

#[tokio::test]
async fn test_delete_missing_is_ok() {
    let (_server, _vault, store) = setup("").await;

    store.delete("never-created").await.unwrap();
    store.delete("never-created").await.unwrap();
}

#[tokio::test]
async fn test_empty_key_never_reaches_the_vault() {
    let (server, _vault, store) = setup("").await;

    assert!(store.get("").await.unwrap_err().is_not_found());
    assert!(store.get_bytes("").await.unwrap_err().is_not_found());
    let mut out = Vec::new();
    assert!(store.get_into("", &mut out).await.unwrap_err().is_not_found());
    assert!(out.is_empty());

    store.delete("").await.unwrap();

    let err = store.put("", "Fred").await.unwrap_err();
    assert!(matches!(
        err.backend_source::<KeyVaultError>(),
        Some(KeyVaultError::EmptySecretName)
    ));

    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_key_under_prefix_is_the_prefix_secret() {
    let (_server, vault, store) = setup("app-").await;

    store.put("", "Fred").await.unwrap();

    assert_eq!(store.get("").await.unwrap(), "Fred");
    assert_eq!(vault.value("app-").as_deref(), Some("Fred"));
    store.delete("").await.unwrap();
    assert!(store.get("").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_reader_writer_and_bytes() {
    let (_server, _vault, store) = setup("").await;

    let mut reader: &[u8] = "Wilma".as_bytes();
    store.put_reader("bio", &mut reader).await.unwrap();

    let mut out = Vec::new();
    store.get_into("bio", &mut out).await.unwrap();
    assert_eq!(out, b"Wilma");

    assert_eq!(store.get_bytes("bio").await.unwrap(), b"Wilma".to_vec());
}

#[tokio::test]
async fn test_get_into_missing_writes_nothing() {
    let (_server, _vault, store) = setup("").await;

    let mut out = Vec::new();
    let err = store.get_into("nope", &mut out).await.unwrap_err();

    assert!(err.is_not_found());
    assert!(out.is_empty());
}

#[tokio::test]
async fn test_open_read_write_not_supported() {
    let (server, _vault, store) = setup("").await;

    assert!(store.open_read("bio").await.err().unwrap().is_not_supported());
    assert!(store.open_write("bio").await.err().unwrap().is_not_supported());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_prefix_applied_on_the_wire() {
    let (_server, vault, store) = setup("app-").await;

    store.put("bio", "Fred").await.unwrap();

    assert_eq!(vault.names(), vec!["app-bio"]);
    assert_eq!(store.prefix(), "app-");
    assert_eq!(store.get("bio").await.unwrap(), "Fred");
}

#[tokio::test]
async fn test_find_star_dot_star_returns_fresh_entries() {
    let (_server, _vault, store) = setup("").await;
    let keys: Vec<String> = NAMES.iter().map(|n| unique(n)).collect();
    for key in &keys {
        store.put(key, "Fred").await.unwrap();
    }

    // Four entries on pages of two
    let mut found = store.find("*.*").await.unwrap();
    found.sort();
    let mut expected = keys.clone();
    expected.sort();
    assert_eq!(found, expected);

    for key in &keys {
        store.delete(key).await.unwrap();
    }
    assert!(store.find("*.*").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_find_pattern() {
    let (_server, _vault, store) = setup("").await;
    for name in NAMES {
        store.put(name, "x").await.unwrap();
    }

    assert_eq!(store.find("p*").await.unwrap(), vec!["photo", "portfolio"]);
    assert_eq!(store.find("?io").await.unwrap(), vec!["bio"]);
    assert!(store.find("*.txt").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_prefixes_isolate_stores() {
    let server = MockServer::start().await;
    let vault = FakeVault::mount(&server).await;
    let orders = support::store(&server, "orders-");
    let users = support::store(&server, "users-");

    orders.put("a1", "x").await.unwrap();
    orders.put("a2", "x").await.unwrap();
    users.put("a1", "y").await.unwrap();
    vault.insert("unrelated", "z");

    assert_eq!(orders.find("*").await.unwrap(), vec!["a1", "a2"]);
    assert_eq!(users.find("*").await.unwrap(), vec!["a1"]);
    assert_eq!(users.get("a1").await.unwrap(), "y");

    let names: Vec<String> = users
        .blobs()
        .map_ok(|blob| blob.name)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(names, vec!["a1"]);
}

#[tokio::test]
async fn test_enumerate_sequential_visits_each_entry() {
    let (_server, _vault, store) = setup("").await;
    for name in NAMES {
        store.put(&unique(name), "x").await.unwrap();
    }

    let seen = Arc::new(Mutex::new(Vec::new()));
    store
        .enumerate(None, collecting(Arc::clone(&seen)), VisitMode::Sequential)
        .await
        .unwrap();

    assert_eq!(seen.lock().await.len(), 4);
}

#[tokio::test]
async fn test_enumerate_concurrent_finishes_all_visits() {
    let (_server, _vault, store) = setup("").await;
    for name in NAMES {
        store.put(name, "x").await.unwrap();
    }

    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    let visit = visitor(move |_blob| {
        let counter = Arc::clone(&counter);
        async move {
            tokio::task::yield_now().await;
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });

    store
        .enumerate(None, visit, VisitMode::Concurrent)
        .await
        .unwrap();

    assert_eq!(count.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_enumerate_applies_filter_to_stripped_names() {
    let (_server, _vault, store) = setup("app-").await;
    for name in NAMES {
        store.put(name, "x").await.unwrap();
    }

    let seen = Arc::new(Mutex::new(Vec::new()));
    store
        .enumerate(Some("*o"), collecting(Arc::clone(&seen)), VisitMode::Sequential)
        .await
        .unwrap();

    assert_eq!(*seen.lock().await, vec!["bio", "photo", "portfolio"]);
}

#[tokio::test]
async fn test_enumerate_stops_on_visitor_error() {
    let (_server, _vault, store) = setup("").await;
    for name in NAMES {
        store.put(name, "x").await.unwrap();
    }

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let visit = visitor(move |blob| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            if blob.name == "photo" {
                return Err(BlobError::not_found(blob.name));
            }
            Ok(())
        }
    });

    let err = store
        .enumerate(None, visit, VisitMode::Sequential)
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    // bio, photo; portfolio and resume are never visited
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_descriptor_projection() {
    let (_server, _vault, store) = setup("").await;
    store.put("bio", "x").await.unwrap();

    let blobs: Vec<BlobDescriptor> = store.blobs().try_collect().await.unwrap();

    assert_eq!(blobs.len(), 1);
    let blob = &blobs[0];
    assert_eq!(blob.name, "bio");
    assert!(!blob.deleted);
    assert!(blob.enabled);
    assert!(blob.metadata.is_empty());
    assert_eq!(blob.version, None);
}

#[tokio::test]
async fn test_blobs_is_restartable() {
    let (_server, _vault, store) = setup("").await;
    for name in NAMES {
        store.put(name, "x").await.unwrap();
    }

    let first: Vec<BlobDescriptor> = store.blobs().try_collect().await.unwrap();
    store.delete("bio").await.unwrap();
    let second: Vec<BlobDescriptor> = store.blobs().try_collect().await.unwrap();

    assert_eq!(first.len(), 4);
    assert_eq!(second.len(), 3);
}

#[tokio::test]
async fn test_page_size_sent_as_maxresults() {
    let server = MockServer::start().await;
    let vault = FakeVault::mount(&server).await;
    let store = KeyVaultBlobStore::new(support::config(&server).with_page_size(1)).unwrap();
    for name in NAMES {
        vault.insert(name, "x");
    }

    assert_eq!(store.find("*").await.unwrap().len(), 4);
    assert_eq!(store.metrics().list_count(), 4);

    let requests = server.received_requests().await.unwrap();
    assert!(
        requests
            .iter()
            .all(|r| r.url.query_pairs().any(|(k, v)| k == "maxresults" && v == "1"))
    );
}

#[tokio::test]
async fn test_listing_404_means_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/secrets"))
        .respond_with(support::not_found("secrets"))
        .mount(&server)
        .await;
    let store = support::store(&server, "");

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let visit = visitor(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok(()) }
    });

    store
        .enumerate(None, visit, VisitMode::Sequential)
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(store.find("*.*").await.unwrap().is_empty());

    // The lazy listing reports the failure instead
    let err = store.blobs().try_next().await.unwrap_err();
    let inner = err.backend_source::<KeyVaultError>().unwrap();
    assert!(inner.is_not_found());
}

#[tokio::test]
async fn test_mid_listing_failure_propagates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/secrets"))
        .and(query_param("$skiptoken", "2"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": {"code": "ServiceUnavailable", "message": "try later"}
        })))
        .with_priority(1)
        .mount(&server)
        .await;
    let vault = FakeVault::mount(&server).await;
    let store = support::store(&server, "");
    for name in NAMES {
        vault.insert(name, "x");
    }

    let seen = Arc::new(Mutex::new(Vec::new()));
    let err = store
        .enumerate(None, collecting(Arc::clone(&seen)), VisitMode::Sequential)
        .await
        .unwrap_err();

    let inner = err.backend_source::<KeyVaultError>().unwrap();
    assert_eq!(inner.status().map(|s| s.as_u16()), Some(503));
    // The first page was visited before the failure
    assert_eq!(seen.lock().await.len(), 2);

    let err = store.find("*").await.unwrap_err();
    assert!(!err.is_not_found());
}

#[tokio::test]
async fn test_wrong_token_propagates_unauthorized() {
    let server = MockServer::start().await;
    let _vault = FakeVault::mount(&server).await;
    let config = KeyVaultStoreConfig::new(server.uri().parse().unwrap())
        .with_credential(CredentialSource::provided(StaticTokenCredential::new("wrong")));
    let store = KeyVaultBlobStore::new(config).unwrap();

    let err = store.get("bio").await.unwrap_err();

    assert!(!err.is_not_found());
    match err.backend_source::<KeyVaultError>() {
        Some(KeyVaultError::Service { status, code, .. }) => {
            assert_eq!(status.as_u16(), 401);
            assert_eq!(code.as_deref(), Some("Unauthorized"));
        }
        other => panic!("expected a 401 service error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_content_type_and_tags_applied_to_puts() {
    let server = MockServer::start().await;
    let vault = FakeVault::mount(&server).await;
    let config = support::config(&server)
        .with_content_type("text/plain")
        .with_tag("owner", "blobstore");
    let store = KeyVaultBlobStore::new(config).unwrap();

    store.put("bio", "x").await.unwrap();

    assert_eq!(vault.content_type("bio").as_deref(), Some("text/plain"));
    assert_eq!(vault.tags("bio"), Some(json!({"owner": "blobstore"})));

    let blob = store.blobs().try_next().await.unwrap().unwrap();
    assert_eq!(blob.content_type.as_deref(), Some("text/plain"));
    assert_eq!(blob.tags.get("owner").map(String::as_str), Some("blobstore"));
}

#[tokio::test]
async fn test_metrics_count_remote_calls() {
    let (_server, _vault, store) = setup("").await;

    store.put("bio", "x").await.unwrap();
    store.get("bio").await.unwrap();
    store.get("missing").await.unwrap_err();
    store.delete("missing").await.unwrap();

    let metrics = store.metrics();
    assert_eq!(metrics.put_count(), 1);
    assert_eq!(metrics.get_count(), 2);
    assert_eq!(metrics.delete_count(), 1);
    assert_eq!(metrics.error_count(), 2);
}

#[tokio::test]
async fn test_usable_as_trait_object() {
    let (_server, _vault, store) = setup("").await;
    let store: Arc<dyn BlobStore> = Arc::new(store);

    store.put("bio", "x").await.unwrap();
    assert_eq!(store.find("*.*").await.unwrap(), vec!["bio"]);
}
