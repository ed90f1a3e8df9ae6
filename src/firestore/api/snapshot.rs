use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::de::DeserializeOwned;

use crate::firestore::codec::{self, DecodeStrategy};
use crate::firestore::error::FirestoreResult;
use crate::firestore::model::{DocumentKey, FieldPath, IntoFieldPath, Timestamp};
use crate::firestore::query_evaluator::values_equal;
use crate::firestore::value::{FirestoreValue, MapValue};

use super::reference::DocumentReference;
use super::Firestore;

/// Metadata about the state of a document snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SnapshotMetadata {
    from_cache: bool,
    has_pending_writes: bool,
}

impl SnapshotMetadata {
    pub fn new(from_cache: bool, has_pending_writes: bool) -> Self {
        Self {
            from_cache,
            has_pending_writes,
        }
    }

    /// Whether the snapshot was served from the local cache rather than a
    /// backend that is known to be up to date.
    pub fn from_cache(&self) -> bool {
        self.from_cache
    }

    /// Whether the snapshot contains local writes the backend has not
    /// acknowledged yet.
    pub fn has_pending_writes(&self) -> bool {
        self.has_pending_writes
    }
}

/// What a read returns for a server timestamp the backend has not resolved
/// yet.
///
/// Accessors without a behavior argument return the local estimate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ServerTimestampBehavior {
    /// The local time at which the write was made.
    #[default]
    Estimate,
    /// The field's value before the pending write, or null if it had none.
    Previous,
    /// Null.
    None,
}

#[derive(Clone, Debug, PartialEq)]
struct PendingServerTimestamp {
    path: FieldPath,
    previous: Option<FirestoreValue>,
}

/// Immutable read of a single document.
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentSnapshot {
    key: DocumentKey,
    data: Option<MapValue>,
    metadata: SnapshotMetadata,
    update_time: Option<Timestamp>,
    pending_server_timestamps: Vec<PendingServerTimestamp>,
}

impl DocumentSnapshot {
    pub fn new(key: DocumentKey, data: Option<MapValue>, metadata: SnapshotMetadata) -> Self {
        Self {
            key,
            data,
            metadata,
            update_time: None,
            pending_server_timestamps: Vec::new(),
        }
    }

    pub(crate) fn with_update_time(mut self, update_time: Option<Timestamp>) -> Self {
        self.update_time = update_time;
        self
    }

    /// Marks `path` as holding a locally estimated server timestamp that
    /// replaced `previous`.
    pub fn with_pending_server_timestamp(mut self, path: FieldPath, previous: Option<FirestoreValue>) -> Self {
        self.pending_server_timestamps
            .push(PendingServerTimestamp { path, previous });
        self
    }

    /// Returns whether the document exists.
    pub fn exists(&self) -> bool {
        self.data.is_some()
    }

    pub fn id(&self) -> &str {
        self.key.id()
    }

    pub fn document_key(&self) -> &DocumentKey {
        &self.key
    }

    pub fn reference(&self, firestore: &Firestore) -> DocumentReference {
        DocumentReference::from_key(firestore.clone(), self.key.clone())
    }

    /// Raw document fields, `None` when the document does not exist.
    pub fn data(&self) -> Option<&BTreeMap<String, FirestoreValue>> {
        self.data.as_ref().map(MapValue::fields)
    }

    pub(crate) fn map_value(&self) -> Option<&MapValue> {
        self.data.as_ref()
    }

    /// Document fields with pending server timestamps resolved per `behavior`.
    fn resolved(&self, behavior: ServerTimestampBehavior) -> Option<Cow<'_, MapValue>> {
        let data = self.data.as_ref()?;
        if behavior == ServerTimestampBehavior::Estimate || self.pending_server_timestamps.is_empty() {
            return Some(Cow::Borrowed(data));
        }
        let mut resolved = data.clone();
        for pending in &self.pending_server_timestamps {
            let value = match behavior {
                ServerTimestampBehavior::Previous => pending.previous.clone().unwrap_or_else(FirestoreValue::null),
                _ => FirestoreValue::null(),
            };
            resolved.set(&pending.path, value);
        }
        Some(Cow::Owned(resolved))
    }

    /// Whether a read of `field` is affected by an unresolved server timestamp.
    pub fn has_pending_server_timestamp(&self, field: impl IntoFieldPath) -> FirestoreResult<bool> {
        let path = field.into_field_path()?;
        Ok(self
            .pending_server_timestamps
            .iter()
            .any(|pending| path.is_prefix_of(&pending.path) || pending.path.is_prefix_of(&path)))
    }

    /// Raw document fields, resolving pending server timestamps per `behavior`.
    pub fn data_with_behavior(&self, behavior: ServerTimestampBehavior) -> Option<BTreeMap<String, FirestoreValue>> {
        self.resolved(behavior).map(|map| map.into_owned().into_fields())
    }

    /// Decodes the whole document into `T`.
    pub fn data_as<T>(&self) -> FirestoreResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        self.data_with(&codec::Derived)
    }

    pub fn data_as_with_behavior<T>(&self, behavior: ServerTimestampBehavior) -> FirestoreResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        self.decode_with_behavior(&codec::Derived, behavior)
    }

    /// Decodes the whole document with an explicit strategy.
    pub fn data_with<T, S>(&self, strategy: &S) -> FirestoreResult<Option<T>>
    where
        S: DecodeStrategy<T> + ?Sized,
    {
        self.decode_with_behavior(strategy, ServerTimestampBehavior::Estimate)
    }

    pub fn decode_with_behavior<T, S>(
        &self,
        strategy: &S,
        behavior: ServerTimestampBehavior,
    ) -> FirestoreResult<Option<T>>
    where
        S: DecodeStrategy<T> + ?Sized,
    {
        self.resolved(behavior)
            .map(|map| strategy.decode(&FirestoreValue::from_map(map.into_owned().into_fields())))
            .transpose()
    }

    /// Raw value stored at `field`.
    pub fn field(&self, field: impl IntoFieldPath) -> FirestoreResult<Option<&FirestoreValue>> {
        let path = field.into_field_path()?;
        Ok(self.data.as_ref().and_then(|map| map.get(&path)))
    }

    pub fn field_with_behavior(
        &self,
        field: impl IntoFieldPath,
        behavior: ServerTimestampBehavior,
    ) -> FirestoreResult<Option<FirestoreValue>> {
        let path = field.into_field_path()?;
        Ok(self
            .resolved(behavior)
            .and_then(|map| map.get(&path).cloned()))
    }

    /// Decodes the value stored at `field` into `T`.
    pub fn get<T>(&self, field: impl IntoFieldPath) -> FirestoreResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        self.get_with(field, &codec::Derived)
    }

    pub fn get_with<T, S>(&self, field: impl IntoFieldPath, strategy: &S) -> FirestoreResult<Option<T>>
    where
        S: DecodeStrategy<T> + ?Sized,
    {
        self.field(field)?.map(|value| strategy.decode(value)).transpose()
    }

    pub fn get_with_behavior<T>(
        &self,
        field: impl IntoFieldPath,
        behavior: ServerTimestampBehavior,
    ) -> FirestoreResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        self.decode_field_with_behavior(field, &codec::Derived, behavior)
    }

    pub fn decode_field_with_behavior<T, S>(
        &self,
        field: impl IntoFieldPath,
        strategy: &S,
        behavior: ServerTimestampBehavior,
    ) -> FirestoreResult<Option<T>>
    where
        S: DecodeStrategy<T> + ?Sized,
    {
        self.field_with_behavior(field, behavior)?
            .map(|value| strategy.decode(&value))
            .transpose()
    }

    pub fn contains(&self, field: impl IntoFieldPath) -> bool {
        matches!(self.field(field), Ok(Some(_)))
    }

    pub fn metadata(&self) -> &SnapshotMetadata {
        &self.metadata
    }

    pub fn from_cache(&self) -> bool {
        self.metadata.from_cache()
    }

    pub fn has_pending_writes(&self) -> bool {
        self.metadata.has_pending_writes()
    }

    /// Time of the last committed write, `None` for missing documents.
    pub fn update_time(&self) -> Option<Timestamp> {
        self.update_time
    }

    fn same_contents(&self, other: &DocumentSnapshot) -> bool {
        match (&self.data, &other.data) {
            (Some(left), Some(right)) => {
                values_equal(
                    &FirestoreValue::from_map(left.fields().clone()),
                    &FirestoreValue::from_map(right.fields().clone()),
                ) && self.metadata == other.metadata
            }
            (None, None) => true,
            _ => false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentChangeType {
    Added,
    Modified,
    Removed,
}

/// How one document differs between two consecutive query emissions.
///
/// `old_index` is the position in the previous emission and `new_index` the
/// position in the current one; each is `None` when the document is absent
/// from that emission.
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentChange {
    change_type: DocumentChangeType,
    document: DocumentSnapshot,
    old_index: Option<usize>,
    new_index: Option<usize>,
}

impl DocumentChange {
    pub fn change_type(&self) -> DocumentChangeType {
        self.change_type
    }

    pub fn document(&self) -> &DocumentSnapshot {
        &self.document
    }

    pub fn old_index(&self) -> Option<usize> {
        self.old_index
    }

    pub fn new_index(&self) -> Option<usize> {
        self.new_index
    }
}

/// Removals come first in previous order, then additions and modifications
/// in current order.
pub(crate) fn compute_changes(previous: &[DocumentSnapshot], current: &[DocumentSnapshot]) -> Vec<DocumentChange> {
    let old_positions: BTreeMap<&DocumentKey, usize> = previous
        .iter()
        .enumerate()
        .map(|(index, doc)| (doc.document_key(), index))
        .collect();
    let new_positions: BTreeMap<&DocumentKey, usize> = current
        .iter()
        .enumerate()
        .map(|(index, doc)| (doc.document_key(), index))
        .collect();

    let mut changes: Vec<DocumentChange> = previous
        .iter()
        .enumerate()
        .filter(|(_, doc)| !new_positions.contains_key(doc.document_key()))
        .map(|(index, doc)| DocumentChange {
            change_type: DocumentChangeType::Removed,
            document: doc.clone(),
            old_index: Some(index),
            new_index: None,
        })
        .collect();

    for (index, doc) in current.iter().enumerate() {
        match old_positions.get(doc.document_key()) {
            None => changes.push(DocumentChange {
                change_type: DocumentChangeType::Added,
                document: doc.clone(),
                old_index: None,
                new_index: Some(index),
            }),
            Some(&old_index) if !previous[old_index].same_contents(doc) => changes.push(DocumentChange {
                change_type: DocumentChangeType::Modified,
                document: doc.clone(),
                old_index: Some(old_index),
                new_index: Some(index),
            }),
            Some(_) => {}
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::model::GeoPoint;
    use serde::Deserialize;

    fn snapshot(path: &str, fields: &[(&str, FirestoreValue)]) -> DocumentSnapshot {
        let map = fields
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        DocumentSnapshot::new(
            DocumentKey::from_string(path).unwrap(),
            Some(MapValue::new(map)),
            SnapshotMetadata::default(),
        )
    }

    #[test]
    fn metadata_flags() {
        let meta = SnapshotMetadata::new(true, false);
        assert!(meta.from_cache());
        assert!(!meta.has_pending_writes());
    }

    #[test]
    fn missing_documents_decode_to_none() {
        let key = DocumentKey::from_string("cities/sf").unwrap();
        let snapshot = DocumentSnapshot::new(key, None, SnapshotMetadata::default());
        assert!(!snapshot.exists());
        assert_eq!(snapshot.data_as::<BTreeMap<String, i64>>().unwrap(), None);
        assert_eq!(snapshot.get::<i64>("population").unwrap(), None);
    }

    #[test]
    fn typed_field_access() {
        #[derive(Debug, PartialEq, Deserialize)]
        struct City {
            name: String,
            location: GeoPoint,
        }

        let location = GeoPoint::new(37.7, -122.4).unwrap();
        let doc = snapshot(
            "cities/sf",
            &[
                ("name", FirestoreValue::from_string("SF")),
                ("location", FirestoreValue::from_geo_point(location)),
                (
                    "meta",
                    FirestoreValue::from_map(BTreeMap::from([(
                        "rank".to_string(),
                        FirestoreValue::from_integer(2),
                    )])),
                ),
            ],
        );

        assert_eq!(doc.get::<i64>("meta.rank").unwrap(), Some(2));
        assert!(doc.contains("meta.rank"));
        assert!(!doc.contains("meta.missing"));
        assert!(doc.get::<i64>("name").is_err());
        let city: City = doc.data_as().unwrap().unwrap();
        assert_eq!(city.location, location);
    }

    #[test]
    fn pending_server_timestamps_resolve_per_behavior() {
        let estimate = Timestamp::new(2_000, 0);
        let previous = Timestamp::new(1_000, 0);
        let doc = snapshot(
            "posts/p1",
            &[
                ("edited", FirestoreValue::from_timestamp(estimate)),
                ("created", FirestoreValue::from_timestamp(estimate)),
                ("title", FirestoreValue::from_string("Hi")),
            ],
        )
        .with_pending_server_timestamp(
            FieldPath::from_dot_separated("edited").unwrap(),
            Some(FirestoreValue::from_timestamp(previous)),
        )
        .with_pending_server_timestamp(FieldPath::from_dot_separated("created").unwrap(), None);

        assert_eq!(doc.get::<Timestamp>("edited").unwrap(), Some(estimate));
        assert_eq!(
            doc.get_with_behavior::<Timestamp>("edited", ServerTimestampBehavior::Previous)
                .unwrap(),
            Some(previous)
        );
        assert_eq!(
            doc.field_with_behavior("created", ServerTimestampBehavior::Previous)
                .unwrap(),
            Some(FirestoreValue::null())
        );

        let none = doc.data_with_behavior(ServerTimestampBehavior::None).unwrap();
        assert_eq!(none["edited"], FirestoreValue::null());
        assert_eq!(none["title"], FirestoreValue::from_string("Hi"));
        assert!(doc.has_pending_server_timestamp("edited").unwrap());
        assert!(!doc.has_pending_server_timestamp("title").unwrap());
    }

    #[test]
    fn changes_track_positions() {
        let a = snapshot("c/a", &[("n", 1i64.into())]);
        let b = snapshot("c/b", &[("n", 2i64.into())]);
        let c = snapshot("c/c", &[("n", 3i64.into())]);
        let b2 = snapshot("c/b", &[("n", 20i64.into())]);

        let first = compute_changes(&[], &[a.clone(), b.clone()]);
        assert!(first
            .iter()
            .all(|change| change.change_type() == DocumentChangeType::Added));

        let changes = compute_changes(&[a.clone(), b], &[b2, c]);
        let summary: Vec<_> = changes
            .iter()
            .map(|change| (change.change_type(), change.document().id().to_string(), change.old_index(), change.new_index()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (DocumentChangeType::Removed, "a".to_string(), Some(0), None),
                (DocumentChangeType::Modified, "b".to_string(), Some(1), Some(0)),
                (DocumentChangeType::Added, "c".to_string(), None, Some(1)),
            ]
        );
    }
}
