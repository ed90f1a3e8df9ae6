use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use typed_firestore::firestore::{
    FieldPath, FieldValue, Firestore, FirestoreErrorCode, FirestoreValue, ServerTimestampBehavior, SetOptions,
    Timestamp,
};

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
struct User {
    name: String,
    age: i64,
}

#[tokio::test]
async fn set_update_delete_round_trip() {
    let firestore = Firestore::in_memory("integration");
    let doc = firestore.collection("users").unwrap().doc(Some("u1")).unwrap();

    doc.set(&User { name: "Ann".into(), age: 30 }, true, SetOptions::Overwrite)
        .await
        .unwrap();
    let snapshot = doc.get().await.unwrap();
    assert!(snapshot.exists());
    assert_eq!(
        snapshot.data_as::<User>().unwrap(),
        Some(User { name: "Ann".into(), age: 30 })
    );

    doc.update(&serde_json::json!({"age": 31}), true).await.unwrap();
    assert_eq!(
        doc.get().await.unwrap().data_as::<User>().unwrap(),
        Some(User { name: "Ann".into(), age: 31 })
    );

    doc.delete().await.unwrap();
    let snapshot = doc.get().await.unwrap();
    assert!(!snapshot.exists());
    assert_eq!(snapshot.data_as::<User>().unwrap(), None);
}

#[tokio::test]
async fn overwrite_drops_fields_missing_from_the_new_data() {
    let firestore = Firestore::in_memory("integration");
    let doc = firestore.doc("users/u1").unwrap();
    doc.set(
        &serde_json::json!({"name": "Ann", "age": 30, "email": "ann@example.com", "prefs": {"theme": "dark"}}),
        true,
        SetOptions::Overwrite,
    )
    .await
    .unwrap();

    doc.set(&User { name: "Bob".into(), age: 40 }, true, SetOptions::Overwrite)
        .await
        .unwrap();
    let data = doc.get().await.unwrap().data().cloned().unwrap();
    assert_eq!(
        data,
        BTreeMap::from([
            ("age".to_string(), FirestoreValue::from_integer(40)),
            ("name".to_string(), FirestoreValue::from_string("Bob")),
        ])
    );
}

#[tokio::test]
async fn merge_keeps_untouched_fields() {
    let firestore = Firestore::in_memory("integration");
    let doc = firestore.doc("cities/sf").unwrap();
    doc.set(
        &serde_json::json!({"name": "SF", "stats": {"population": 1, "area": 2}}),
        true,
        SetOptions::Overwrite,
    )
    .await
    .unwrap();

    doc.set(&serde_json::json!({"stats": {"population": 5}}), true, SetOptions::merge())
        .await
        .unwrap();
    let snapshot = doc.get().await.unwrap();
    assert_eq!(snapshot.get::<String>("name").unwrap().as_deref(), Some("SF"));
    assert_eq!(snapshot.get::<i64>("stats.population").unwrap(), Some(5));
    assert_eq!(snapshot.get::<i64>("stats.area").unwrap(), Some(2));

    doc.set(
        &serde_json::json!({"name": "San Francisco", "stats": {"area": 9}}),
        true,
        SetOptions::merge_fields(["stats.area"]).unwrap(),
    )
    .await
    .unwrap();
    let snapshot = doc.get().await.unwrap();
    assert_eq!(snapshot.get::<String>("name").unwrap().as_deref(), Some("SF"));
    assert_eq!(snapshot.get::<i64>("stats.area").unwrap(), Some(9));
}

#[tokio::test]
async fn sentinels_become_transforms() {
    let firestore = Firestore::in_memory("integration");
    let doc = firestore.doc("posts/p1").unwrap();
    doc.set(
        &serde_json::json!({"likes": 1, "tags": ["a"], "draft": true}),
        true,
        SetOptions::Overwrite,
    )
    .await
    .unwrap();

    doc.update_fields([
        ("likes", FieldValue::increment(2i64).into()),
        ("tags", FieldValue::array_union(["b", "a"]).unwrap().into()),
        ("draft", FieldValue::delete().into()),
        ("edited", FieldValue::server_timestamp().into()),
    ])
    .await
    .unwrap();

    let snapshot = doc.get().await.unwrap();
    assert_eq!(snapshot.get::<i64>("likes").unwrap(), Some(3));
    assert_eq!(snapshot.get::<Vec<String>>("tags").unwrap(), Some(vec!["a".into(), "b".into()]));
    assert!(!snapshot.contains("draft"));
    let edited: Timestamp = snapshot.get("edited").unwrap().unwrap();
    assert_eq!(Some(edited), snapshot.update_time());
}

#[tokio::test]
async fn update_requires_an_existing_document() {
    let firestore = Firestore::in_memory("integration");
    let err = firestore
        .doc("users/ghost")
        .unwrap()
        .update_fields([(FieldPath::from_dot_separated("age").unwrap(), FirestoreValue::from_integer(1))])
        .await
        .unwrap_err();
    assert_eq!(err.code, FirestoreErrorCode::NotFound);
    assert!(err.is_backend_error());
    assert!(err.is_precondition_failure());
}

#[tokio::test]
async fn subcollections_are_independent() {
    let firestore = Firestore::in_memory("integration");
    let room = firestore.doc("rooms/eros").unwrap();
    let messages = room.collection("messages").unwrap();
    messages
        .doc(Some("m1"))
        .unwrap()
        .set(&serde_json::json!({"text": "hi"}), true, SetOptions::Overwrite)
        .await
        .unwrap();

    assert!(!room.get().await.unwrap().exists());
    assert_eq!(messages.get().await.unwrap().len(), 1);
    assert!(firestore.collection("rooms").unwrap().get().await.unwrap().is_empty());
}

#[tokio::test]
async fn pending_server_timestamps_follow_the_requested_behavior() {
    let firestore = Firestore::in_memory("integration");
    let doc = firestore.doc("posts/p1").unwrap();
    let published = Timestamp::new(1_000, 0);
    doc.set(
        &BTreeMap::from([
            ("title", FirestoreValue::from_string("Hi")),
            ("edited", FirestoreValue::from_timestamp(published)),
        ]),
        true,
        SetOptions::Overwrite,
    )
    .await
    .unwrap();

    firestore.disable_network().await.unwrap();
    let pending = doc.clone();
    let write = tokio::spawn(async move {
        pending
            .update(
                &BTreeMap::from([
                    ("edited", FieldValue::server_timestamp()),
                    ("created", FieldValue::server_timestamp()),
                ]),
                true,
            )
            .await
    });
    tokio::task::yield_now().await;

    let local = doc.get().await.unwrap();
    assert!(local.has_pending_writes());
    let estimate: Timestamp = local
        .get_with_behavior("edited", ServerTimestampBehavior::Estimate)
        .unwrap()
        .unwrap();
    assert!(estimate > published);
    assert_eq!(local.get::<Timestamp>("edited").unwrap(), Some(estimate));
    assert_eq!(
        local
            .get_with_behavior::<Timestamp>("edited", ServerTimestampBehavior::Previous)
            .unwrap(),
        Some(published)
    );
    assert_eq!(
        local
            .get_with_behavior::<Option<Timestamp>>("created", ServerTimestampBehavior::Previous)
            .unwrap(),
        Some(None)
    );
    let none = local.data_with_behavior(ServerTimestampBehavior::None).unwrap();
    assert_eq!(none["edited"], FirestoreValue::null());
    assert_eq!(none["created"], FirestoreValue::null());
    assert_eq!(none["title"], FirestoreValue::from_string("Hi"));

    firestore.enable_network().await.unwrap();
    write.await.unwrap().unwrap();
    let synced = doc.get().await.unwrap();
    let committed = synced
        .get_with_behavior::<Timestamp>("edited", ServerTimestampBehavior::None)
        .unwrap();
    assert_eq!(committed, synced.update_time());
}
