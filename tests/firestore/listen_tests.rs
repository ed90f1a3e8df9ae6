use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use typed_firestore::firestore::api::{QueryDefinition, SnapshotMetadata};
use typed_firestore::firestore::error::unavailable;
use typed_firestore::firestore::remote::{ListenEvent, ListenSink, ListenTarget, ListenerRegistration, WriteOperation};
use typed_firestore::firestore::value::MapValue;
use typed_firestore::firestore::{
    Datastore, DocumentKey, DocumentSnapshot, Firestore, FirestoreErrorCode, FirestoreResult, FirestoreSettings,
    DatabaseId, SetOptions,
};

/// Backend double that records listener registrations and lets the test
/// push events by hand.
#[derive(Default)]
struct ScriptedDatastore {
    sinks: Mutex<Vec<ListenSink>>,
    registered: AtomicUsize,
    released: Arc<AtomicUsize>,
}

impl ScriptedDatastore {
    fn push(&self, event: FirestoreResult<ListenEvent>) -> usize {
        let sinks = self.sinks.lock().unwrap();
        sinks.iter().filter(|sink| sink.try_send(event.clone()).is_ok()).count()
    }
}

#[async_trait]
impl Datastore for ScriptedDatastore {
    async fn get_document(&self, key: &DocumentKey) -> FirestoreResult<DocumentSnapshot> {
        Ok(DocumentSnapshot::new(key.clone(), None, SnapshotMetadata::default()))
    }

    async fn run_query(&self, _query: &QueryDefinition) -> FirestoreResult<Vec<DocumentSnapshot>> {
        Ok(Vec::new())
    }

    async fn commit(&self, _writes: Vec<WriteOperation>) -> FirestoreResult<()> {
        Ok(())
    }

    fn listen(&self, _target: ListenTarget, sink: ListenSink) -> FirestoreResult<ListenerRegistration> {
        self.sinks.lock().unwrap().push(sink);
        self.registered.fetch_add(1, Ordering::SeqCst);
        let released = self.released.clone();
        Ok(ListenerRegistration::new(move || {
            released.fetch_add(1, Ordering::SeqCst);
        }))
    }
}

fn scripted() -> (Firestore, Arc<ScriptedDatastore>) {
    let datastore = Arc::new(ScriptedDatastore::default());
    let firestore = Firestore::new(
        DatabaseId::default("listen"),
        FirestoreSettings::default(),
        datastore.clone(),
    )
    .unwrap();
    (firestore, datastore)
}

fn document_event(path: &str, name: &str) -> FirestoreResult<ListenEvent> {
    let mut data = MapValue::new(Default::default());
    data.set(
        &typed_firestore::firestore::FieldPath::from_dot_separated("name").unwrap(),
        name.into(),
    );
    Ok(ListenEvent::Document(DocumentSnapshot::new(
        DocumentKey::from_string(path).unwrap(),
        Some(data),
        SnapshotMetadata::default(),
    )))
}

#[tokio::test]
async fn cancel_releases_once_and_stops_emissions() {
    let (firestore, datastore) = scripted();
    let mut stream = firestore.doc("users/u1").unwrap().snapshots().unwrap();
    assert_eq!(datastore.registered.load(Ordering::SeqCst), 1);

    datastore.push(document_event("users/u1", "Ann"));
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.get::<String>("name").unwrap().as_deref(), Some("Ann"));

    stream.cancel();
    stream.cancel();
    assert_eq!(datastore.push(document_event("users/u1", "Bo")), 0);
    assert!(stream.next().await.is_none());
    drop(stream);
    assert_eq!(datastore.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn backend_error_is_yielded_then_the_stream_ends() {
    let (firestore, datastore) = scripted();
    let mut stream = firestore.doc("users/u1").unwrap().snapshots().unwrap();

    datastore.push(Err(unavailable("backend went away")));
    datastore.push(document_event("users/u1", "late"));

    let err = stream.next().await.unwrap().unwrap_err();
    assert_eq!(err.code, FirestoreErrorCode::Unavailable);
    assert!(stream.is_terminated());
    assert!(stream.next().await.is_none());
    assert_eq!(datastore.released.load(Ordering::SeqCst), 1);
    drop(stream);
    assert_eq!(datastore.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn dropping_an_unpolled_stream_releases_the_listener() {
    let (firestore, datastore) = scripted();
    let stream = firestore.collection("users").unwrap().query().snapshots().unwrap();
    drop(stream);
    assert_eq!(datastore.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn query_snapshots_follow_in_memory_writes() {
    let firestore = Firestore::in_memory("listen");
    let users = firestore.collection("users").unwrap();
    let adults = users.where_greater_than_or_equal("age", 18).unwrap();
    let mut stream = adults.snapshots().unwrap();
    assert!(stream.next().await.unwrap().unwrap().is_empty());

    let ann = users.doc(Some("ann")).unwrap();
    ann.set(&serde_json::json!({"age": 30}), true, SetOptions::Overwrite)
        .await
        .unwrap();
    let snapshot = stream.next().await.unwrap().unwrap();
    assert_eq!(snapshot.len(), 1);

    ann.update(&serde_json::json!({"age": 12}), true).await.unwrap();
    let snapshot = stream.next().await.unwrap().unwrap();
    assert!(snapshot.is_empty());
    assert_eq!(snapshot.document_changes().len(), 1);
}
