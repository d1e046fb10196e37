//! Integration tests for the PostgreSQL document store.
//!
//! These tests require a real PostgreSQL database and use SQLx test macros
//! to ensure proper test isolation and cleanup.
//!
//! Run with: `DATABASE_URL=... cargo test --test postgres_store -- --ignored`

use anchor_graph_repository::{
    DocumentStore, Filter, PostgresStore, StoreError, StoreTransaction, WriteOp,
};
use anchor_graph_shared::{AnchorKind, ObjectId};
use serde_json::json;

#[sqlx::test(migrations = "src/postgres/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_bulk_upsert_and_find(pool: sqlx::PgPool) {
    let store = PostgresStore::new(pool);
    let (a, b) = (ObjectId::new(), ObjectId::new());

    let mut tx = store.begin().await.unwrap();
    tx.bulk_write(
        AnchorKind::Node,
        &[
            WriteOp::Upsert { id: a, document: json!({"_id": a.to_hex(), "name": "A"}) },
            WriteOp::Upsert { id: b, document: json!({"_id": b.to_hex(), "name": "B"}) },
        ],
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();

    let found = store.find(AnchorKind::Node, &Filter::ids([a, b])).await.unwrap();
    assert_eq!(found.len(), 2);

    let named = store
        .find(AnchorKind::Node, &Filter::eq(&["name"], "B"))
        .await
        .unwrap();
    assert_eq!(named, vec![json!({"_id": b.to_hex(), "name": "B"})]);
}

#[sqlx::test(migrations = "src/postgres/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_aborted_transaction_writes_nothing(pool: sqlx::PgPool) {
    let store = PostgresStore::new(pool);
    let id = ObjectId::new();

    let mut tx = store.begin().await.unwrap();
    tx.bulk_write(
        AnchorKind::Object,
        &[WriteOp::Upsert { id, document: json!({"_id": id.to_hex()}) }],
    )
    .await
    .unwrap();
    tx.abort().await.unwrap();

    assert!(store.find_by_id(AnchorKind::Object, &id).await.unwrap().is_none());
}

#[sqlx::test(migrations = "src/postgres/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_duplicate_key_and_compare_and_set(pool: sqlx::PgPool) {
    let store = PostgresStore::new(pool);
    let id = ObjectId::new();
    let pending = json!({"_id": id.to_hex(), "schedule": {"status": "PENDING", "execute_date": "2024-04-23T09:00:00.000000Z"}});

    store.insert_one(AnchorKind::Walker, &id, pending.clone()).await.unwrap();
    let duplicate = store.insert_one(AnchorKind::Walker, &id, pending).await;
    assert!(matches!(duplicate, Err(StoreError::DuplicateKey(_))));

    let due = Filter::And(vec![
        Filter::eq(&["schedule", "status"], "PENDING"),
        Filter::lte(&["schedule", "execute_date"], "2024-04-23T09:00:00.000001Z"),
    ]);
    assert_eq!(store.find(AnchorKind::Walker, &due).await.unwrap().len(), 1);

    let running = json!({"_id": id.to_hex(), "schedule": {"status": "RUNNING"}});
    let claimed = store
        .replace_if(AnchorKind::Walker, &id, &Filter::eq(&["schedule", "status"], "PENDING"), running.clone())
        .await
        .unwrap();
    let reclaimed = store
        .replace_if(AnchorKind::Walker, &id, &Filter::eq(&["schedule", "status"], "PENDING"), running)
        .await
        .unwrap();

    assert!(claimed);
    assert!(!reclaimed);
}
