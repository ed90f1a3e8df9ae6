use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::firestore::api::operations::{FieldTransform, TransformOperation};
use crate::firestore::api::query::QueryDefinition;
use crate::firestore::api::{DocumentSnapshot, SnapshotMetadata};
use crate::firestore::error::{
    already_exists, cancelled, failed_precondition, not_found, FirestoreError, FirestoreResult,
};
use crate::firestore::model::{DocumentKey, FieldPath, Timestamp};
use crate::firestore::query_evaluator::{apply_query_to_documents, values_equal};
use crate::firestore::value::{FirestoreValue, MapValue, ValueKind};

use super::{
    Datastore, ListenEvent, ListenSink, ListenTarget, ListenerRegistration, Precondition,
    WriteOperation,
};

/// Backend that keeps every document in process memory.
///
/// Commits are atomic, listeners are notified after every change, and
/// [`Datastore::set_network_enabled`] simulates going offline: writes made
/// while offline are queued and visible locally as pending. Their `commit`
/// resolves once the network comes back and the backend accepts or rejects
/// the batch.
#[derive(Clone, Default)]
pub struct InMemoryDatastore {
    state: Arc<Mutex<State>>,
}

struct State {
    documents: BTreeMap<DocumentKey, StoredDocument>,
    pending: Vec<PendingBatch>,
    network_enabled: bool,
    last_commit_time: Option<Timestamp>,
    listeners: BTreeMap<u64, Listener>,
    next_listener_id: u64,
    commit_count: usize,
}

impl Default for State {
    fn default() -> Self {
        Self {
            documents: BTreeMap::new(),
            pending: Vec::new(),
            network_enabled: true,
            last_commit_time: None,
            listeners: BTreeMap::new(),
            next_listener_id: 0,
            commit_count: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct StoredDocument {
    data: MapValue,
    update_time: Timestamp,
}

struct PendingBatch {
    writes: Vec<WriteOperation>,
    local_time: Timestamp,
    acknowledge: async_channel::Sender<FirestoreResult<()>>,
}

struct Listener {
    target: ListenTarget,
    sink: ListenSink,
    last: Option<ListenEvent>,
}

/// Documents as seen by the client: committed state plus queued writes.
struct View {
    documents: BTreeMap<DocumentKey, StoredDocument>,
    pending_keys: BTreeSet<DocumentKey>,
    server_timestamps: EstimatedTimestamps,
    from_cache: bool,
}

/// Fields holding a local server timestamp estimate, with the value each
/// one replaced.
type EstimatedTimestamps = BTreeMap<DocumentKey, Vec<(FieldPath, Option<FirestoreValue>)>>;

impl InMemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        lock_state(&self.state)
    }

    /// Number of listeners currently attached.
    pub fn active_listener_count(&self) -> usize {
        self.state().listeners.len()
    }

    /// Number of batches applied to the committed state.
    pub fn commit_count(&self) -> usize {
        self.state().commit_count
    }

    /// Number of batches waiting for the network.
    pub fn pending_batch_count(&self) -> usize {
        self.state().pending.len()
    }

    pub fn is_network_enabled(&self) -> bool {
        self.state().network_enabled
    }

    /// Pushes `error` to every attached listener and detaches them.
    pub fn inject_listen_error(&self, error: FirestoreError) {
        let mut state = self.state();
        let listeners = std::mem::take(&mut state.listeners);
        log::debug!("Failing {} listeners: {error}", listeners.len());
        for listener in listeners.into_values() {
            let _ = listener.sink.try_send(Err(error.clone()));
        }
    }
}

fn lock_state(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl State {
    fn next_commit_time(&mut self) -> Timestamp {
        let now = Timestamp::now();
        let time = match self.last_commit_time {
            Some(last) if now <= last => Timestamp::new(last.seconds, last.nanos + 1),
            _ => now,
        };
        self.last_commit_time = Some(time);
        time
    }

    fn view(&self) -> View {
        let mut documents = self.documents.clone();
        let mut pending_keys = BTreeSet::new();
        let mut server_timestamps = EstimatedTimestamps::new();
        for batch in &self.pending {
            if let Ok(next) = apply_pending_batch(&documents, batch, &mut server_timestamps) {
                documents = next;
                pending_keys.extend(batch.writes.iter().map(|write| write.key().clone()));
            }
        }
        View {
            documents,
            pending_keys,
            server_timestamps,
            from_cache: !self.network_enabled,
        }
    }

    fn notify(&mut self) {
        let view = self.view();
        let mut closed = Vec::new();
        for (id, listener) in self.listeners.iter_mut() {
            let event = view.evaluate(&listener.target);
            if listener.last.as_ref() == Some(&event) {
                continue;
            }
            if listener.sink.try_send(Ok(event.clone())).is_err() {
                log::warn!("Listener {id} no longer accepts snapshots; detaching it");
                closed.push(*id);
                continue;
            }
            listener.last = Some(event);
        }
        for id in closed {
            self.listeners.remove(&id);
        }
    }

    fn flush_pending(&mut self) {
        for batch in std::mem::take(&mut self.pending) {
            let commit_time = self.next_commit_time();
            let outcome = match apply_batch(&self.documents, &batch.writes, commit_time) {
                Ok(next) => {
                    self.documents = next;
                    self.commit_count += 1;
                    Ok(())
                }
                Err(err) => {
                    log::warn!("Offline write batch rejected by the backend: {err}");
                    Err(err)
                }
            };
            // The committer may have stopped waiting; the outcome stands either way.
            let _ = batch.acknowledge.try_send(outcome);
        }
    }
}

impl View {
    fn document(&self, key: &DocumentKey) -> DocumentSnapshot {
        let stored = self.documents.get(key);
        let metadata = SnapshotMetadata::new(self.from_cache, self.pending_keys.contains(key));
        let mut snapshot = DocumentSnapshot::new(key.clone(), stored.map(|doc| doc.data.clone()), metadata)
            .with_update_time(stored.map(|doc| doc.update_time));
        if stored.is_some() {
            for (path, previous) in self.server_timestamps.get(key).into_iter().flatten() {
                snapshot = snapshot.with_pending_server_timestamp(path.clone(), previous.clone());
            }
        }
        snapshot
    }

    fn query(&self, definition: &QueryDefinition) -> Vec<DocumentSnapshot> {
        let candidates = self
            .documents
            .keys()
            .filter(|key| definition.matches_collection(key))
            .map(|key| self.document(key))
            .collect();
        apply_query_to_documents(candidates, definition)
    }

    fn evaluate(&self, target: &ListenTarget) -> ListenEvent {
        match target {
            ListenTarget::Document(key) => ListenEvent::Document(self.document(key)),
            ListenTarget::Query(definition) => {
                let documents = self.query(definition);
                let has_pending_writes = documents.iter().any(|doc| doc.has_pending_writes());
                ListenEvent::Query {
                    documents,
                    metadata: SnapshotMetadata::new(self.from_cache, has_pending_writes),
                }
            }
        }
    }
}

#[async_trait]
impl Datastore for InMemoryDatastore {
    async fn get_document(&self, key: &DocumentKey) -> FirestoreResult<DocumentSnapshot> {
        Ok(self.state().view().document(key))
    }

    async fn run_query(&self, query: &QueryDefinition) -> FirestoreResult<Vec<DocumentSnapshot>> {
        Ok(self.state().view().query(query))
    }

    async fn commit(&self, writes: Vec<WriteOperation>) -> FirestoreResult<()> {
        let acknowledged = {
            let mut state = self.state();
            if state.network_enabled {
                let commit_time = state.next_commit_time();
                let next = apply_batch(&state.documents, &writes, commit_time)?;
                state.documents = next;
                state.commit_count += 1;
                log::debug!("Committed {} writes", writes.len());
                state.notify();
                return Ok(());
            }

            log::debug!("Network disabled; queueing {} writes", writes.len());
            let (acknowledge, acknowledged) = async_channel::bounded(1);
            state.pending.push(PendingBatch {
                writes,
                local_time: Timestamp::now(),
                acknowledge,
            });
            state.notify();
            acknowledged
        };

        match acknowledged.recv().await {
            Ok(outcome) => outcome,
            Err(_) => Err(cancelled("Queued writes were discarded before reaching the backend")),
        }
    }

    fn listen(&self, target: ListenTarget, sink: ListenSink) -> FirestoreResult<ListenerRegistration> {
        let mut state = self.state();
        let id = state.next_listener_id;
        state.next_listener_id += 1;

        let initial = state.view().evaluate(&target);
        let last = match sink.try_send(Ok(initial.clone())) {
            Ok(()) => Some(initial),
            Err(_) => None,
        };
        state.listeners.insert(id, Listener { target, sink, last });
        log::debug!("Registered listener {id}");

        let shared = Arc::downgrade(&self.state);
        Ok(ListenerRegistration::new(move || {
            if let Some(shared) = shared.upgrade() {
                if lock_state(&shared).listeners.remove(&id).is_some() {
                    log::debug!("Removed listener {id}");
                }
            }
        }))
    }

    async fn set_network_enabled(&self, enabled: bool) -> FirestoreResult<()> {
        let mut state = self.state();
        if state.network_enabled == enabled {
            return Ok(());
        }
        state.network_enabled = enabled;
        if enabled {
            state.flush_pending();
        }
        log::debug!("Network {}", if enabled { "enabled" } else { "disabled" });
        state.notify();
        Ok(())
    }

    async fn clear_persistence(&self) -> FirestoreResult<()> {
        let mut state = self.state();
        if !state.pending.is_empty() {
            log::warn!("Clearing persistence discards {} queued batches", state.pending.len());
        }
        state.pending.clear();
        state.notify();
        Ok(())
    }
}

/// Applies `writes` to a copy of `documents`; the input is untouched on error.
fn apply_batch(
    documents: &BTreeMap<DocumentKey, StoredDocument>,
    writes: &[WriteOperation],
    commit_time: Timestamp,
) -> FirestoreResult<BTreeMap<DocumentKey, StoredDocument>> {
    let mut next = documents.clone();
    for write in writes {
        apply_write(&mut next, write, commit_time)?;
    }
    Ok(next)
}

/// Applies a queued batch to the local view, tracking which fields now hold
/// a server timestamp estimate.
fn apply_pending_batch(
    documents: &BTreeMap<DocumentKey, StoredDocument>,
    batch: &PendingBatch,
    server_timestamps: &mut EstimatedTimestamps,
) -> FirestoreResult<BTreeMap<DocumentKey, StoredDocument>> {
    let mut next = documents.clone();
    let mut tracked = server_timestamps.clone();
    for write in &batch.writes {
        track_server_timestamps(&mut tracked, &next, write);
        apply_write(&mut next, write, batch.local_time)?;
    }
    *server_timestamps = tracked;
    Ok(next)
}

fn track_server_timestamps(
    tracked: &mut EstimatedTimestamps,
    documents: &BTreeMap<DocumentKey, StoredDocument>,
    write: &WriteOperation,
) {
    let key = write.key();
    let (replaced, transforms): (Option<&[FieldPath]>, &[FieldTransform]) = match write {
        WriteOperation::Set { mask, transforms, .. } => (mask.as_deref(), transforms.as_slice()),
        WriteOperation::Update {
            field_paths, transforms, ..
        } => (Some(field_paths.as_slice()), transforms.as_slice()),
        WriteOperation::Delete { .. } => {
            tracked.remove(key);
            return;
        }
        WriteOperation::Verify { .. } => return,
    };

    let existing = tracked.remove(key).unwrap_or_default();
    let previous_of = |path: &FieldPath| -> Option<FirestoreValue> {
        match existing.iter().find(|(pending, _)| pending == path) {
            Some((_, previous)) => previous.clone(),
            None => documents.get(key).and_then(|doc| doc.data.get(path)).cloned(),
        }
    };
    let overlaps = |left: &FieldPath, right: &FieldPath| left.is_prefix_of(right) || right.is_prefix_of(left);

    let mut entries: Vec<(FieldPath, Option<FirestoreValue>)> = transforms
        .iter()
        .filter(|transform| matches!(transform.operation(), TransformOperation::ServerTimestamp))
        .map(|transform| (transform.field_path().clone(), previous_of(transform.field_path())))
        .collect();

    // A full overwrite drops every earlier estimate; masks and transforms
    // drop the ones they touch.
    if let Some(replaced) = replaced {
        entries.extend(existing.into_iter().filter(|(path, _)| {
            !replaced.iter().any(|written| overlaps(written, path))
                && !transforms
                    .iter()
                    .any(|transform| overlaps(transform.field_path(), path))
        }));
    }
    if !entries.is_empty() {
        tracked.insert(key.clone(), entries);
    }
}

fn apply_write(
    documents: &mut BTreeMap<DocumentKey, StoredDocument>,
    write: &WriteOperation,
    commit_time: Timestamp,
) -> FirestoreResult<()> {
    let key = write.key();
    check_precondition(key, documents.get(key), write.precondition())?;

    match write {
        WriteOperation::Set {
            data,
            mask,
            transforms,
            ..
        } => {
            let mut fields = match mask {
                None => data.clone(),
                Some(mask) => {
                    let mut fields = documents
                        .get(key)
                        .map(|doc| doc.data.clone())
                        .unwrap_or_default();
                    apply_mask(&mut fields, data, mask);
                    fields
                }
            };
            apply_transforms(&mut fields, transforms, commit_time);
            documents.insert(
                key.clone(),
                StoredDocument {
                    data: fields,
                    update_time: commit_time,
                },
            );
        }
        WriteOperation::Update {
            data,
            field_paths,
            transforms,
            ..
        } => {
            let current = documents.get(key).ok_or_else(|| {
                not_found(format!("No document to update: {}", key.canonical_string()))
            })?;
            let mut fields = current.data.clone();
            apply_mask(&mut fields, data, field_paths);
            apply_transforms(&mut fields, transforms, commit_time);
            documents.insert(
                key.clone(),
                StoredDocument {
                    data: fields,
                    update_time: commit_time,
                },
            );
        }
        WriteOperation::Delete { .. } => {
            documents.remove(key);
        }
        WriteOperation::Verify { .. } => {}
    }
    Ok(())
}

fn check_precondition(
    key: &DocumentKey,
    current: Option<&StoredDocument>,
    precondition: &Precondition,
) -> FirestoreResult<()> {
    match (precondition, current) {
        (Precondition::None, _) => Ok(()),
        (Precondition::Exists(true), None) => Err(not_found(format!(
            "No document to update: {}",
            key.canonical_string()
        ))),
        (Precondition::Exists(false), Some(_)) => Err(already_exists(format!(
            "Document already exists: {}",
            key.canonical_string()
        ))),
        (Precondition::Exists(_), _) => Ok(()),
        (Precondition::UpdateTime(expected), Some(doc)) if doc.update_time == *expected => Ok(()),
        (Precondition::UpdateTime(_), _) => Err(failed_precondition(format!(
            "Document {} changed since it was read",
            key.canonical_string()
        ))),
    }
}

fn apply_mask(fields: &mut MapValue, data: &MapValue, mask: &[crate::firestore::model::FieldPath]) {
    for path in mask {
        match data.get(path) {
            Some(value) => fields.set(path, value.clone()),
            None => {
                fields.delete(path);
            }
        }
    }
}

fn apply_transforms(fields: &mut MapValue, transforms: &[FieldTransform], commit_time: Timestamp) {
    for transform in transforms {
        let current = fields.get(transform.field_path());
        let next = match transform.operation() {
            TransformOperation::ServerTimestamp => FirestoreValue::from_timestamp(commit_time),
            TransformOperation::ArrayUnion(elements) => {
                let mut values = array_elements(current);
                for element in elements {
                    if !values.iter().any(|value| values_equal(value, element)) {
                        values.push(element.clone());
                    }
                }
                FirestoreValue::from_array(values)
            }
            TransformOperation::ArrayRemove(elements) => {
                let mut values = array_elements(current);
                values.retain(|value| !elements.iter().any(|element| values_equal(value, element)));
                FirestoreValue::from_array(values)
            }
            TransformOperation::NumericIncrement(operand) => increment(current, operand),
        };
        fields.set(transform.field_path(), next);
    }
}

fn array_elements(value: Option<&FirestoreValue>) -> Vec<FirestoreValue> {
    match value.map(FirestoreValue::kind) {
        Some(ValueKind::Array(array)) => array.values().to_vec(),
        _ => Vec::new(),
    }
}

fn increment(current: Option<&FirestoreValue>, operand: &FirestoreValue) -> FirestoreValue {
    match (current.map(FirestoreValue::kind), operand.kind()) {
        (Some(ValueKind::Integer(base)), ValueKind::Integer(delta)) => {
            FirestoreValue::from_integer(base.saturating_add(*delta))
        }
        (Some(ValueKind::Integer(base)), ValueKind::Double(delta)) => {
            FirestoreValue::from_double(*base as f64 + delta)
        }
        (Some(ValueKind::Double(base)), ValueKind::Integer(delta)) => {
            FirestoreValue::from_double(base + *delta as f64)
        }
        (Some(ValueKind::Double(base)), ValueKind::Double(delta)) => FirestoreValue::from_double(base + delta),
        _ => operand.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::api::ServerTimestampBehavior;
    use crate::firestore::error::{unavailable, FirestoreErrorCode};

    fn key(path: &str) -> DocumentKey {
        DocumentKey::from_string(path).unwrap()
    }

    fn path(value: &str) -> FieldPath {
        FieldPath::from_dot_separated(value).unwrap()
    }

    fn map(entries: &[(&str, FirestoreValue)]) -> MapValue {
        MapValue::new(
            entries
                .iter()
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect(),
        )
    }

    fn set(path: &str, data: MapValue) -> WriteOperation {
        WriteOperation::Set {
            key: key(path),
            data,
            mask: None,
            transforms: Vec::new(),
            precondition: Precondition::None,
        }
    }

    #[tokio::test]
    async fn in_memory_get_set() {
        let datastore = InMemoryDatastore::new();
        datastore
            .commit(vec![set(
                "cities/sf",
                map(&[("name", FirestoreValue::from_string("SF"))]),
            )])
            .await
            .unwrap();
        let snapshot = datastore.get_document(&key("cities/sf")).await.unwrap();
        assert!(snapshot.exists());
        assert!(snapshot.update_time().is_some());
        assert_eq!(
            snapshot.data().unwrap().get("name"),
            Some(&FirestoreValue::from_string("SF"))
        );
    }

    #[tokio::test]
    async fn failed_commit_leaves_state_untouched() {
        let datastore = InMemoryDatastore::new();
        let update = WriteOperation::Update {
            key: key("cities/missing"),
            data: map(&[("a", FirestoreValue::from_integer(1))]),
            field_paths: vec![path("a")],
            transforms: Vec::new(),
            precondition: Precondition::Exists(true),
        };
        let err = datastore
            .commit(vec![set("cities/sf", MapValue::default()), update])
            .await
            .unwrap_err();
        assert_eq!(err.code, FirestoreErrorCode::NotFound);
        assert!(!datastore.get_document(&key("cities/sf")).await.unwrap().exists());
        assert_eq!(datastore.commit_count(), 0);
    }

    #[tokio::test]
    async fn transforms_resolve_at_commit() {
        let datastore = InMemoryDatastore::new();
        datastore
            .commit(vec![set(
                "stats/main",
                map(&[
                    ("visits", FirestoreValue::from_integer(2)),
                    (
                        "tags",
                        FirestoreValue::from_array(vec![FirestoreValue::from_string("a")]),
                    ),
                ]),
            )])
            .await
            .unwrap();

        let update = WriteOperation::Update {
            key: key("stats/main"),
            data: MapValue::default(),
            field_paths: Vec::new(),
            transforms: vec![
                FieldTransform::new(
                    path("visits"),
                    TransformOperation::NumericIncrement(FirestoreValue::from_integer(3)),
                ),
                FieldTransform::new(
                    path("tags"),
                    TransformOperation::ArrayUnion(vec![
                        FirestoreValue::from_string("a"),
                        FirestoreValue::from_string("b"),
                    ]),
                ),
                FieldTransform::new(path("touched"), TransformOperation::ServerTimestamp),
            ],
            precondition: Precondition::Exists(true),
        };
        datastore.commit(vec![update]).await.unwrap();

        let snapshot = datastore.get_document(&key("stats/main")).await.unwrap();
        let data = snapshot.data().unwrap();
        assert_eq!(data["visits"], FirestoreValue::from_integer(5));
        assert_eq!(
            data["tags"],
            FirestoreValue::from_array(vec![
                FirestoreValue::from_string("a"),
                FirestoreValue::from_string("b"),
            ])
        );
        assert!(matches!(data["touched"].kind(), ValueKind::Timestamp(ts) if Some(*ts) == snapshot.update_time()));
    }

    #[tokio::test]
    async fn update_time_precondition_detects_conflicts() {
        let datastore = InMemoryDatastore::new();
        datastore.commit(vec![set("a/b", MapValue::default())]).await.unwrap();
        let read = datastore.get_document(&key("a/b")).await.unwrap();
        let read_time = read.update_time().unwrap();

        datastore.commit(vec![set("a/b", MapValue::default())]).await.unwrap();

        let err = datastore
            .commit(vec![WriteOperation::Verify {
                key: key("a/b"),
                precondition: Precondition::UpdateTime(read_time),
            }])
            .await
            .unwrap_err();
        assert_eq!(err.code, FirestoreErrorCode::FailedPrecondition);
    }

    /// Starts `writes` on a background task and lets it reach the queue.
    async fn queue(
        datastore: &InMemoryDatastore,
        writes: Vec<WriteOperation>,
    ) -> tokio::task::JoinHandle<FirestoreResult<()>> {
        let datastore = datastore.clone();
        let handle = tokio::spawn(async move { datastore.commit(writes).await });
        tokio::task::yield_now().await;
        handle
    }

    #[tokio::test]
    async fn offline_writes_queue_until_network_returns() {
        let datastore = InMemoryDatastore::new();
        datastore.set_network_enabled(false).await.unwrap();
        let write = queue(
            &datastore,
            vec![set("a/b", map(&[("n", FirestoreValue::from_integer(1))]))],
        )
        .await;

        let local = datastore.get_document(&key("a/b")).await.unwrap();
        assert!(local.exists());
        assert!(local.from_cache());
        assert!(local.has_pending_writes());
        assert_eq!(datastore.pending_batch_count(), 1);
        assert_eq!(datastore.commit_count(), 0);
        assert!(!write.is_finished());

        datastore.set_network_enabled(true).await.unwrap();
        write.await.unwrap().unwrap();
        let synced = datastore.get_document(&key("a/b")).await.unwrap();
        assert!(!synced.from_cache());
        assert!(!synced.has_pending_writes());
        assert_eq!(datastore.commit_count(), 1);
    }

    #[tokio::test]
    async fn offline_server_timestamps_remember_the_replaced_value() {
        let datastore = InMemoryDatastore::new();
        let published = FirestoreValue::from_timestamp(Timestamp::new(1_000, 0));
        datastore
            .commit(vec![set("posts/p1", map(&[("edited", published.clone())]))])
            .await
            .unwrap();

        datastore.set_network_enabled(false).await.unwrap();
        let touch = |field: &str| WriteOperation::Update {
            key: key("posts/p1"),
            data: MapValue::default(),
            field_paths: Vec::new(),
            transforms: vec![FieldTransform::new(path(field), TransformOperation::ServerTimestamp)],
            precondition: Precondition::Exists(true),
        };
        let first = queue(&datastore, vec![touch("edited")]).await;
        let second = queue(&datastore, vec![touch("edited"), touch("created")]).await;

        let local = datastore.get_document(&key("posts/p1")).await.unwrap();
        assert!(local.has_pending_server_timestamp("edited").unwrap());
        assert_eq!(
            local.field_with_behavior("edited", ServerTimestampBehavior::Previous).unwrap(),
            Some(published)
        );
        assert_eq!(
            local.field_with_behavior("created", ServerTimestampBehavior::Previous).unwrap(),
            Some(FirestoreValue::null())
        );
        assert!(matches!(
            local.field("edited").unwrap().map(FirestoreValue::kind),
            Some(ValueKind::Timestamp(_))
        ));

        datastore.set_network_enabled(true).await.unwrap();
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
        let synced = datastore.get_document(&key("posts/p1")).await.unwrap();
        assert!(!synced.has_pending_server_timestamp("edited").unwrap());
        assert_eq!(
            synced.field_with_behavior("edited", ServerTimestampBehavior::None).unwrap(),
            Some(FirestoreValue::from_timestamp(synced.update_time().unwrap()))
        );
    }

    #[tokio::test]
    async fn rejected_offline_batches_report_to_the_committer() {
        let datastore = InMemoryDatastore::new();
        datastore.set_network_enabled(false).await.unwrap();
        let update = WriteOperation::Update {
            key: key("a/missing"),
            data: map(&[("n", FirestoreValue::from_integer(1))]),
            field_paths: vec![path("n")],
            transforms: Vec::new(),
            precondition: Precondition::Exists(true),
        };
        let write = queue(&datastore, vec![update]).await;

        datastore.set_network_enabled(true).await.unwrap();
        let err = write.await.unwrap().unwrap_err();
        assert_eq!(err.code, FirestoreErrorCode::NotFound);
        assert_eq!(datastore.commit_count(), 0);
    }

    #[tokio::test]
    async fn cleared_offline_batches_are_cancelled() {
        let datastore = InMemoryDatastore::new();
        datastore.set_network_enabled(false).await.unwrap();
        let write = queue(&datastore, vec![set("a/b", MapValue::default())]).await;

        datastore.clear_persistence().await.unwrap();
        let err = write.await.unwrap().unwrap_err();
        assert_eq!(err.code, FirestoreErrorCode::Cancelled);
        datastore.set_network_enabled(true).await.unwrap();
        assert!(!datastore.get_document(&key("a/b")).await.unwrap().exists());
    }

    #[tokio::test]
    async fn listeners_receive_changes_and_detach() {
        let datastore = InMemoryDatastore::new();
        let (sender, receiver) = async_channel::unbounded();
        let registration = datastore
            .listen(ListenTarget::Document(key("a/b")), sender)
            .unwrap();
        assert_eq!(datastore.active_listener_count(), 1);

        datastore.commit(vec![set("a/b", MapValue::default())]).await.unwrap();

        let first = receiver.recv().await.unwrap().unwrap();
        let second = receiver.recv().await.unwrap().unwrap();
        assert!(matches!(first, ListenEvent::Document(ref doc) if !doc.exists()));
        assert!(matches!(second, ListenEvent::Document(ref doc) if doc.exists()));

        registration.remove();
        assert_eq!(datastore.active_listener_count(), 0);
    }

    #[tokio::test]
    async fn injected_errors_reach_listeners() {
        let datastore = InMemoryDatastore::new();
        let (sender, receiver) = async_channel::unbounded();
        let _registration = datastore
            .listen(ListenTarget::Document(key("a/b")), sender)
            .unwrap();
        let _initial = receiver.recv().await.unwrap();

        datastore.inject_listen_error(unavailable("backend went away"));
        let err = receiver.recv().await.unwrap().unwrap_err();
        assert_eq!(err.code, FirestoreErrorCode::Unavailable);
        assert_eq!(datastore.active_listener_count(), 0);
    }
}
