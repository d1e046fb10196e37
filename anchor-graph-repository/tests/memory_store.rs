//! Integration tests for the in-memory document store.

use anchor_graph_repository::{
    DocumentStore, Filter, InMemoryStore, StoreError, StoreFault, StoreTransaction, WriteOp,
};
use anchor_graph_shared::{AnchorKind, ObjectId};
use serde_json::{Value, json};

fn document(id: &ObjectId, extra: Value) -> Value {
    let mut document = json!({"_id": id.to_hex()});
    if let (Some(target), Value::Object(fields)) = (document.as_object_mut(), extra) {
        target.extend(fields);
    }
    document
}

#[tokio::test]
async fn test_transaction_is_invisible_until_commit() {
    let store = InMemoryStore::new();
    let id = ObjectId::new();

    let mut tx = store.begin().await.unwrap();
    tx.bulk_write(
        AnchorKind::Node,
        &[WriteOp::Upsert {
            id,
            document: document(&id, json!({"name": "A"})),
        }],
    )
    .await
    .unwrap();

    assert!(store.find_by_id(AnchorKind::Node, &id).await.unwrap().is_none());
    tx.commit().await.unwrap();
    assert!(store.find_by_id(AnchorKind::Node, &id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_faulted_commit_leaves_store_unchanged() {
    let store = InMemoryStore::new();
    let kept = ObjectId::new();
    store
        .insert_one(AnchorKind::Edge, &kept, document(&kept, json!({})))
        .await
        .unwrap();
    store.inject_commit_fault(StoreFault::Transient).await;

    let fresh = ObjectId::new();
    let mut tx = store.begin().await.unwrap();
    tx.bulk_write(AnchorKind::Edge, &[WriteOp::Delete { id: kept }])
        .await
        .unwrap();
    tx.bulk_write(
        AnchorKind::Node,
        &[WriteOp::Upsert {
            id: fresh,
            document: document(&fresh, json!({})),
        }],
    )
    .await
    .unwrap();

    let error = tx.commit().await.unwrap_err();
    assert!(error.is_transient());
    assert_eq!(store.count(AnchorKind::Edge).await, 1);
    assert_eq!(store.count(AnchorKind::Node).await, 0);
    assert_eq!(store.commit_attempts(), 1);
}

#[tokio::test]
async fn test_insert_one_rejects_duplicates() {
    let store = InMemoryStore::new();
    let id = ObjectId::from_parts(1_713_859_200, b"cron");

    store
        .insert_one(AnchorKind::Walker, &id, document(&id, json!({})))
        .await
        .unwrap();
    let second = store
        .insert_one(AnchorKind::Walker, &id, document(&id, json!({})))
        .await;

    assert!(matches!(second, Err(StoreError::DuplicateKey(_))));
}

#[tokio::test]
async fn test_replace_if_is_compare_and_set() {
    let store = InMemoryStore::new();
    let id = ObjectId::new();
    let pending = document(&id, json!({"schedule": {"status": "PENDING"}}));
    let running = document(&id, json!({"schedule": {"status": "RUNNING"}}));
    store
        .insert_one(AnchorKind::Walker, &id, pending)
        .await
        .unwrap();

    let expected = Filter::eq(&["schedule", "status"], "PENDING");
    let first = store
        .replace_if(AnchorKind::Walker, &id, &expected, running.clone())
        .await
        .unwrap();
    let second = store
        .replace_if(AnchorKind::Walker, &id, &expected, running)
        .await
        .unwrap();

    assert!(first);
    assert!(!second);
}

#[tokio::test]
async fn test_delete_many_and_insert_if_absent() {
    let store = InMemoryStore::new();
    let node = ObjectId::new();
    let node_ref = format!("n::{node}");
    let (a, b, c) = (ObjectId::new(), ObjectId::new(), ObjectId::new());

    let mut tx = store.begin().await.unwrap();
    tx.bulk_write(
        AnchorKind::Edge,
        &[
            WriteOp::Upsert { id: a, document: document(&a, json!({"source": node_ref, "target": "n::x"})) },
            WriteOp::Upsert { id: b, document: document(&b, json!({"source": "n::x", "target": node_ref})) },
            WriteOp::Upsert { id: c, document: document(&c, json!({"source": "n::x", "target": "n::y"})) },
        ],
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    tx.bulk_write(
        AnchorKind::Edge,
        &[
            WriteOp::DeleteMany(Filter::Or(vec![
                Filter::eq(&["source"], node_ref.clone()),
                Filter::eq(&["target"], node_ref.clone()),
            ])),
            WriteOp::InsertIfAbsent { id: c, document: json!({"overwritten": true}) },
        ],
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();

    let remaining = store.documents(AnchorKind::Edge).await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0]["_id"], json!(c.to_hex()));
    assert!(remaining[0].get("overwritten").is_none());
}

#[tokio::test]
async fn test_find_by_ids_skips_missing() {
    let store = InMemoryStore::new();
    let present = ObjectId::new();
    store
        .insert_one(AnchorKind::Object, &present, document(&present, json!({})))
        .await
        .unwrap();

    let found = store
        .find(AnchorKind::Object, &Filter::ids([present, ObjectId::new()]))
        .await
        .unwrap();

    assert_eq!(found.len(), 1);
}
