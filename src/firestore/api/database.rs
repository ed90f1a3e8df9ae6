use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::firestore::error::FirestoreResult;
use crate::firestore::model::{DatabaseId, ResourcePath};
use crate::firestore::remote::datastore::{Datastore, InMemoryDatastore};
use crate::firestore::remote::transaction_runner::{self, TransactionOptions};

use super::query::Query;
use super::reference::{CollectionReference, DocumentReference};
use super::settings::FirestoreSettings;
use super::transaction::Transaction;
use super::write_batch::WriteBatch;

/// Handle to one database. Cheap to clone; clones share the same backend.
#[derive(Clone)]
pub struct Firestore {
    inner: Arc<FirestoreInner>,
}

struct FirestoreInner {
    database_id: DatabaseId,
    settings: FirestoreSettings,
    datastore: Arc<dyn Datastore>,
}

impl Firestore {
    pub fn new(
        database_id: DatabaseId,
        settings: FirestoreSettings,
        datastore: Arc<dyn Datastore>,
    ) -> FirestoreResult<Self> {
        settings.validate()?;
        log::debug!("Created Firestore client for {database_id}");
        let inner = FirestoreInner {
            database_id,
            settings,
            datastore,
        };
        Ok(Self { inner: Arc::new(inner) })
    }

    pub fn builder(project_id: impl Into<String>) -> FirestoreBuilder {
        FirestoreBuilder::new(project_id)
    }

    /// A client for the default database of `project_id`, backed by a fresh
    /// [`InMemoryDatastore`].
    pub fn in_memory(project_id: impl Into<String>) -> Self {
        let inner = FirestoreInner {
            database_id: DatabaseId::default(project_id),
            settings: FirestoreSettings::default(),
            datastore: Arc::new(InMemoryDatastore::new()),
        };
        Self { inner: Arc::new(inner) }
    }

    /// The fully qualified database identifier (project + database name).
    pub fn database_id(&self) -> &DatabaseId {
        &self.inner.database_id
    }

    pub fn project_id(&self) -> &str {
        self.inner.database_id.project_id()
    }

    /// Returns the logical database name (usually `"(default)"`).
    pub fn database(&self) -> &str {
        self.inner.database_id.database()
    }

    pub fn settings(&self) -> &FirestoreSettings {
        &self.inner.settings
    }

    pub(crate) fn datastore(&self) -> &Arc<dyn Datastore> {
        &self.inner.datastore
    }

    /// Whether both handles were cloned from the same client.
    pub(crate) fn same_instance(&self, other: &Firestore) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Creates a `CollectionReference` pointing at `path`.
    ///
    /// The path is interpreted relative to the database root using forward
    /// slashes to separate segments (e.g. `"users/alovelace/repos"`).
    pub fn collection(&self, path: &str) -> FirestoreResult<CollectionReference> {
        let resource = ResourcePath::from_string(path)?;
        CollectionReference::new(self.clone(), resource)
    }

    /// Creates a `DocumentReference` pointing at `path`.
    ///
    /// The path must contain an even number of segments (collection/doc pairs).
    pub fn doc(&self, path: &str) -> FirestoreResult<DocumentReference> {
        let resource = ResourcePath::from_string(path)?;
        DocumentReference::new(self.clone(), resource)
    }

    /// Creates a query over every collection named `collection_id`,
    /// regardless of its parent path.
    pub fn collection_group(&self, collection_id: &str) -> FirestoreResult<Query> {
        Query::new_collection_group(self.clone(), collection_id)
    }

    pub fn batch(&self) -> WriteBatch {
        WriteBatch::new(self.clone())
    }

    /// Runs `body` atomically with the default [`TransactionOptions`].
    ///
    /// The body may run several times; it should only act through the
    /// [`Transaction`] it is given.
    pub async fn run_transaction<F, Fut, R>(&self, body: F) -> FirestoreResult<R>
    where
        F: FnMut(Transaction) -> Fut,
        Fut: Future<Output = FirestoreResult<R>>,
    {
        self.run_transaction_with_options(TransactionOptions::default(), body)
            .await
    }

    pub async fn run_transaction_with_options<F, Fut, R>(&self, options: TransactionOptions, body: F) -> FirestoreResult<R>
    where
        F: FnMut(Transaction) -> Fut,
        Fut: Future<Output = FirestoreResult<R>>,
    {
        transaction_runner::run_transaction(self, options, body).await
    }

    /// Re-enables backend access; writes queued while offline are sent.
    pub async fn enable_network(&self) -> FirestoreResult<()> {
        log::debug!("Enabling network for {}", self.inner.database_id);
        self.inner.datastore.set_network_enabled(true).await
    }

    /// Serves reads from the local cache and queues writes until
    /// [`enable_network`](Self::enable_network) is called. Writes made while
    /// offline are visible locally at once, but their futures resolve only
    /// when the backend accepts or rejects them.
    pub async fn disable_network(&self) -> FirestoreResult<()> {
        log::debug!("Disabling network for {}", self.inner.database_id);
        self.inner.datastore.set_network_enabled(false).await
    }

    /// Drops locally cached state, including writes not yet acknowledged.
    pub async fn clear_persistence(&self) -> FirestoreResult<()> {
        self.inner.datastore.clear_persistence().await
    }

    /// Turns debug logging of the `log` facade on or off process-wide.
    pub fn set_logging_enabled(enabled: bool) {
        let level = if enabled {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Error
        };
        log::set_max_level(level);
    }
}

impl fmt::Debug for Firestore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Firestore")
            .field("database_id", &self.inner.database_id)
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

/// Assembles a [`Firestore`] client. The datastore defaults to a new
/// [`InMemoryDatastore`].
pub struct FirestoreBuilder {
    project_id: String,
    database: Option<String>,
    settings: FirestoreSettings,
    datastore: Option<Arc<dyn Datastore>>,
}

impl FirestoreBuilder {
    fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database: None,
            settings: FirestoreSettings::default(),
            datastore: None,
        }
    }

    /// Database name or full `projects/{project}/databases/{database}` path.
    pub fn database(mut self, identifier: impl Into<String>) -> Self {
        self.database = Some(identifier.into());
        self
    }

    pub fn settings(mut self, settings: FirestoreSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn datastore(mut self, datastore: Arc<dyn Datastore>) -> Self {
        self.datastore = Some(datastore);
        self
    }

    pub fn build(self) -> FirestoreResult<Firestore> {
        let database_id = match self.database.as_deref() {
            Some(identifier) => DatabaseId::parse(identifier, &self.project_id)?,
            None => DatabaseId::default(self.project_id.as_str()),
        };
        let datastore = self
            .datastore
            .unwrap_or_else(|| Arc::new(InMemoryDatastore::new()));
        Firestore::new(database_id, self.settings, datastore)
    }
}
