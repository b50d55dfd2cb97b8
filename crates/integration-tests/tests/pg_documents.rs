//! Integration tests for the `PostgreSQL` document store.
//!
//! These require a database with the storefront migrations applied and
//! `KRD_TEST_DATABASE_URL` pointing at it.

#![allow(clippy::unwrap_used)]

use serde_json::{Map, Value, json};

use krd_storefront::db::{self, PgDocumentStore};
use krd_storefront::store::{DocumentStore, SetMode, StoreError};

async fn store() -> PgDocumentStore {
    let url = std::env::var("KRD_TEST_DATABASE_URL").expect("KRD_TEST_DATABASE_URL must be set");
    let pool = db::create_pool(&secrecy::SecretString::from(url)).await.unwrap();
    db::MIGRATOR.run(&pool).await.unwrap();
    PgDocumentStore::new(pool)
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

fn unique_key(prefix: &str) -> String {
    format!("{prefix}-{}", std::process::id())
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (KRD_TEST_DATABASE_URL)"]
async fn test_merge_set_preserves_other_fields() {
    let store = store().await;
    let key = unique_key("merge");

    store
        .set("carts", &key, object(json!({"items": [1], "note": "keep"})), SetMode::Replace)
        .await
        .unwrap();
    store
        .set("carts", &key, object(json!({"items": [2, 3]})), SetMode::Merge)
        .await
        .unwrap();

    let doc = store.get("carts", &key).await.unwrap().unwrap();
    assert_eq!(doc["items"], json!([2, 3]));
    assert_eq!(doc["note"], "keep");
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (KRD_TEST_DATABASE_URL)"]
async fn test_update_missing_document_is_not_found() {
    let store = store().await;
    let err = store
        .update("wishlists", &unique_key("missing"), object(json!({"x": 1})))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (KRD_TEST_DATABASE_URL)"]
async fn test_create_assigns_key_and_ping_succeeds() {
    let store = store().await;
    store.ping().await.unwrap();

    let id = store
        .create("images", object(json!({"fileName": "a.jpg"})))
        .await
        .unwrap();
    let doc = store.get("images", id.as_str()).await.unwrap().unwrap();
    assert_eq!(doc["fileName"], "a.jpg");
}
