use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use std::fmt::{Display, Formatter};
use std::ops::Deref;

use serde::{Serialize, Serializer};

use crate::firestore::codec::{encode_document, Derived, EncodeStrategy};
use crate::firestore::constants::AUTO_ID_LENGTH;
use crate::firestore::error::{invalid_argument, FirestoreResult};
use crate::firestore::model::{DocumentKey, FieldPath, IntoFieldPath, ResourcePath};
use crate::firestore::value::FirestoreValue;

use super::database::Firestore;
use super::listen::DocumentSnapshotStream;
use super::operations::{self, SetOptions};
use super::query::Query;
use super::snapshot::DocumentSnapshot;

/// A collection path. Dereferences to the [`Query`] that reads every
/// document in the collection, so query clauses can be chained directly.
#[derive(Clone, Debug)]
pub struct CollectionReference {
    query: Query,
}

impl CollectionReference {
    pub(crate) fn new(firestore: Firestore, path: ResourcePath) -> FirestoreResult<Self> {
        if !path.is_collection() {
            return Err(invalid_argument(format!(
                "Collection references must point to a collection (odd number of segments), got '{path}'"
            )));
        }
        Ok(Self {
            query: Query::new(firestore, path)?,
        })
    }

    pub fn firestore(&self) -> &Firestore {
        self.query.firestore()
    }

    /// The full resource path of the collection (e.g. `rooms/eros/messages`).
    pub fn path(&self) -> &ResourcePath {
        self.query.collection_path()
    }

    pub fn id(&self) -> &str {
        self.query.collection_id()
    }

    /// The document that contains this collection, `None` for root collections.
    pub fn parent(&self) -> Option<DocumentReference> {
        let parent_path = self.path().pop_last()?;
        if parent_path.is_empty() {
            return None;
        }
        DocumentReference::new(self.firestore().clone(), parent_path).ok()
    }

    /// Returns a reference to the document identified by `document_id`.
    ///
    /// When `document_id` is `None`, a random 20 character ID is generated.
    pub fn doc(&self, document_id: Option<&str>) -> FirestoreResult<DocumentReference> {
        let id = document_id.map(str::to_string).unwrap_or_else(generate_auto_id);
        if id.is_empty() || id.contains('/') {
            return Err(invalid_argument(format!(
                "Invalid document ID '{id}'. IDs must be non-empty and cannot contain '/'."
            )));
        }
        DocumentReference::new(self.firestore().clone(), self.path().child([id]))
    }

    /// The query that reads the whole collection.
    pub fn query(&self) -> Query {
        self.query.clone()
    }

    /// Creates a document with an auto-generated ID.
    pub async fn add<T>(&self, value: &T, encode_defaults: bool) -> FirestoreResult<DocumentReference>
    where
        T: Serialize + ?Sized,
    {
        self.add_with(&Derived, value, encode_defaults).await
    }

    pub async fn add_with<T, S>(&self, strategy: &S, value: &T, encode_defaults: bool) -> FirestoreResult<DocumentReference>
    where
        T: ?Sized,
        S: EncodeStrategy<T> + ?Sized,
    {
        let document = self.doc(None)?;
        document
            .set_with(strategy, value, encode_defaults, SetOptions::Overwrite)
            .await?;
        Ok(document)
    }
}

impl Deref for CollectionReference {
    type Target = Query;

    fn deref(&self) -> &Query {
        &self.query
    }
}

impl Display for CollectionReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "CollectionReference({})", self.path().canonical_string())
    }
}

#[derive(Clone, Debug)]
pub struct DocumentReference {
    firestore: Firestore,
    key: DocumentKey,
}

impl DocumentReference {
    pub(crate) fn new(firestore: Firestore, path: ResourcePath) -> FirestoreResult<Self> {
        let key = DocumentKey::from_path(path)?;
        Ok(Self::from_key(firestore, key))
    }

    pub(crate) fn from_key(firestore: Firestore, key: DocumentKey) -> Self {
        Self { firestore, key }
    }

    pub fn firestore(&self) -> &Firestore {
        &self.firestore
    }

    pub fn id(&self) -> &str {
        self.key.id()
    }

    pub fn path(&self) -> &ResourcePath {
        self.key.path()
    }

    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    /// The collection containing this document.
    pub fn parent(&self) -> CollectionReference {
        CollectionReference {
            query: Query::with_collection(self.firestore.clone(), self.key.collection_path()),
        }
    }

    /// Returns a reference to a subcollection rooted at this document.
    pub fn collection(&self, path: &str) -> FirestoreResult<CollectionReference> {
        let sub_path = ResourcePath::from_string(path)?;
        CollectionReference::new(self.firestore.clone(), self.key.path().append(&sub_path))
    }

    pub async fn get(&self) -> FirestoreResult<DocumentSnapshot> {
        self.firestore.datastore().get_document(&self.key).await
    }

    /// Writes `value` as the document's contents.
    pub async fn set<T>(&self, value: &T, encode_defaults: bool, options: SetOptions) -> FirestoreResult<()>
    where
        T: Serialize + ?Sized,
    {
        self.set_with(&Derived, value, encode_defaults, options).await
    }

    pub async fn set_with<T, S>(
        &self,
        strategy: &S,
        value: &T,
        encode_defaults: bool,
        options: SetOptions,
    ) -> FirestoreResult<()>
    where
        T: ?Sized,
        S: EncodeStrategy<T> + ?Sized,
    {
        let fields = encode_document(strategy, value, encode_defaults)?;
        let write = operations::set_write(self.key.clone(), fields, &options)?;
        self.firestore.datastore().commit(vec![write]).await
    }

    /// Updates the fields of an existing document. Top-level keys of the
    /// encoded value are read as dot-separated field paths.
    pub async fn update<T>(&self, value: &T, encode_defaults: bool) -> FirestoreResult<()>
    where
        T: Serialize + ?Sized,
    {
        self.update_with(&Derived, value, encode_defaults).await
    }

    pub async fn update_with<T, S>(&self, strategy: &S, value: &T, encode_defaults: bool) -> FirestoreResult<()>
    where
        T: ?Sized,
        S: EncodeStrategy<T> + ?Sized,
    {
        let fields = encode_document(strategy, value, encode_defaults)?;
        let write = operations::update_write(self.key.clone(), fields)?;
        self.firestore.datastore().commit(vec![write]).await
    }

    /// Updates explicit `(field, value)` pairs.
    pub async fn update_fields<I, P>(&self, pairs: I) -> FirestoreResult<()>
    where
        I: IntoIterator<Item = (P, FirestoreValue)>,
        P: IntoFieldPath,
    {
        let write = operations::update_fields_write(self.key.clone(), field_pairs(pairs)?)?;
        self.firestore.datastore().commit(vec![write]).await
    }

    pub async fn delete(&self) -> FirestoreResult<()> {
        let write = operations::delete_write(self.key.clone());
        self.firestore.datastore().commit(vec![write]).await
    }

    /// Listens to the document.
    pub fn snapshots(&self) -> FirestoreResult<DocumentSnapshotStream> {
        DocumentSnapshotStream::open(&self.firestore, self.key.clone())
    }
}

impl Display for DocumentReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "DocumentReference({})", self.key.canonical_string())
    }
}

/// References are stored as native reference values.
impl Serialize for DocumentReference {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.key.serialize(serializer)
    }
}

pub(crate) fn field_pairs<I, P>(pairs: I) -> FirestoreResult<Vec<(FieldPath, FirestoreValue)>>
where
    I: IntoIterator<Item = (P, FirestoreValue)>,
    P: IntoFieldPath,
{
    pairs
        .into_iter()
        .map(|(field, value)| Ok((field.into_field_path()?, value)))
        .collect()
}

fn generate_auto_id() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .map(char::from)
        .take(AUTO_ID_LENGTH)
        .collect()
}
