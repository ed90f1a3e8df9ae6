use serde_json::json;
use typed_firestore::firestore::{Firestore, FirestoreErrorCode, FirestoreValue, SetOptions};

#[tokio::test]
async fn batch_is_all_or_nothing() {
    let firestore = Firestore::in_memory("batches");
    let a = firestore.doc("items/a").unwrap();
    let b = firestore.doc("items/b").unwrap();
    a.set(&json!({"count": 1}), true, SetOptions::Overwrite)
        .await
        .unwrap();

    let mut batch = firestore.batch();
    batch
        .update_fields(&a, [("count", FirestoreValue::from_integer(2))])
        .unwrap()
        .set(&b, &json!({"count": 5}), true, SetOptions::Overwrite)
        .unwrap()
        .update(&firestore.doc("items/missing").unwrap(), &json!({"count": 0}), true)
        .unwrap();
    let err = batch.commit().await.unwrap_err();
    assert_eq!(err.code, FirestoreErrorCode::NotFound);

    assert_eq!(a.get().await.unwrap().get::<i64>("count").unwrap(), Some(1));
    assert!(!b.get().await.unwrap().exists());
}

#[tokio::test]
async fn writes_apply_in_order() {
    let firestore = Firestore::in_memory("batches");
    let doc = firestore.doc("items/a").unwrap();

    let mut batch = firestore.batch();
    batch
        .set(&doc, &json!({"count": 1, "label": "x"}), true, SetOptions::Overwrite)
        .unwrap()
        .delete(&doc)
        .unwrap()
        .set(&doc, &json!({"count": 3}), true, SetOptions::merge())
        .unwrap();
    batch.commit().await.unwrap();

    let snapshot = doc.get().await.unwrap();
    assert_eq!(snapshot.get::<i64>("count").unwrap(), Some(3));
    assert!(!snapshot.contains("label"));
}

#[tokio::test]
async fn empty_batch_commits() {
    let firestore = Firestore::in_memory("batches");
    let batch = firestore.batch();
    assert!(batch.is_empty());
    batch.commit().await.unwrap();
}
