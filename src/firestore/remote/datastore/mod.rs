use std::fmt;

use async_trait::async_trait;

use crate::firestore::api::operations::FieldTransform;
use crate::firestore::api::query::QueryDefinition;
use crate::firestore::api::{DocumentSnapshot, SnapshotMetadata};
use crate::firestore::error::FirestoreResult;
use crate::firestore::model::{DocumentKey, FieldPath, Timestamp};
use crate::firestore::value::MapValue;

pub mod in_memory;

/// Condition a document must satisfy for a write to be applied.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Precondition {
    #[default]
    None,
    Exists(bool),
    UpdateTime(Timestamp),
}

/// A single encoded write, as handed to [`Datastore::commit`].
///
/// Paths listed in `mask`/`field_paths` that have no value in `data` are
/// removed from the stored document.
#[derive(Clone, Debug)]
pub enum WriteOperation {
    Set {
        key: DocumentKey,
        data: MapValue,
        mask: Option<Vec<FieldPath>>,
        transforms: Vec<FieldTransform>,
        precondition: Precondition,
    },
    Update {
        key: DocumentKey,
        data: MapValue,
        field_paths: Vec<FieldPath>,
        transforms: Vec<FieldTransform>,
        precondition: Precondition,
    },
    Delete {
        key: DocumentKey,
        precondition: Precondition,
    },
    /// Checks a precondition without changing the document.
    Verify {
        key: DocumentKey,
        precondition: Precondition,
    },
}

impl WriteOperation {
    pub fn key(&self) -> &DocumentKey {
        match self {
            WriteOperation::Set { key, .. }
            | WriteOperation::Update { key, .. }
            | WriteOperation::Delete { key, .. }
            | WriteOperation::Verify { key, .. } => key,
        }
    }

    pub fn precondition(&self) -> &Precondition {
        match self {
            WriteOperation::Set { precondition, .. }
            | WriteOperation::Update { precondition, .. }
            | WriteOperation::Delete { precondition, .. }
            | WriteOperation::Verify { precondition, .. } => precondition,
        }
    }

    pub(crate) fn with_precondition(mut self, value: Precondition) -> Self {
        match &mut self {
            WriteOperation::Set { precondition, .. }
            | WriteOperation::Update { precondition, .. }
            | WriteOperation::Delete { precondition, .. }
            | WriteOperation::Verify { precondition, .. } => *precondition = value,
        }
        self
    }
}

/// What a listener is attached to.
#[derive(Clone, Debug)]
pub enum ListenTarget {
    Document(DocumentKey),
    Query(QueryDefinition),
}

/// One push from the backend to a listener.
#[derive(Clone, Debug, PartialEq)]
pub enum ListenEvent {
    Document(DocumentSnapshot),
    Query {
        documents: Vec<DocumentSnapshot>,
        metadata: SnapshotMetadata,
    },
}

pub type ListenSink = async_channel::Sender<FirestoreResult<ListenEvent>>;

/// Handle returned by [`Datastore::listen`].
///
/// Removing (or dropping) the registration detaches the listener from the
/// backend. The unsubscribe callback runs at most once.
pub struct ListenerRegistration {
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl ListenerRegistration {
    pub fn new<F>(unsubscribe: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    pub fn remove(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

/// Backend collaborator consumed by the client API.
#[async_trait]
pub trait Datastore: Send + Sync + 'static {
    async fn get_document(&self, key: &DocumentKey) -> FirestoreResult<DocumentSnapshot>;

    async fn run_query(&self, query: &QueryDefinition) -> FirestoreResult<Vec<DocumentSnapshot>>;

    /// Applies every write or none of them.
    async fn commit(&self, writes: Vec<WriteOperation>) -> FirestoreResult<()>;

    /// Attaches a listener. Snapshots and terminal errors are pushed into `sink`.
    fn listen(&self, target: ListenTarget, sink: ListenSink) -> FirestoreResult<ListenerRegistration>;

    async fn set_network_enabled(&self, _enabled: bool) -> FirestoreResult<()> {
        Ok(())
    }

    async fn clear_persistence(&self) -> FirestoreResult<()> {
        Ok(())
    }
}

pub use in_memory::InMemoryDatastore;
