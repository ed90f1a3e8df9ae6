use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::firestore::codec::{encode_document, Derived, EncodeStrategy};
use crate::firestore::error::{invalid_argument, unavailable, FirestoreResult};
use crate::firestore::model::{DocumentKey, IntoFieldPath};
use crate::firestore::remote::datastore::{Precondition, WriteOperation};
use crate::firestore::value::FirestoreValue;

use super::database::Firestore;
use super::operations::{self, SetOptions};
use super::reference::{field_pairs, DocumentReference};
use super::snapshot::DocumentSnapshot;

/// Reads and writes executed as one atomic unit by
/// [`Firestore::run_transaction`].
///
/// Every read must happen before the first write. Writes are buffered and
/// sent together when the transaction body returns `Ok`. Each write carries
/// a precondition derived from what the transaction read, so a concurrent
/// change to any of those documents makes the commit fail and the body is
/// retried.
#[derive(Clone)]
pub struct Transaction {
    firestore: Firestore,
    state: Arc<Mutex<TransactionState>>,
}

#[derive(Default)]
struct TransactionState {
    reads: BTreeMap<DocumentKey, DocumentSnapshot>,
    writes: Vec<WriteOperation>,
    written: BTreeSet<DocumentKey>,
    committed: bool,
}

impl TransactionState {
    /// Precondition for set and delete.
    fn precondition(&self, key: &DocumentKey) -> Precondition {
        if self.written.contains(key) {
            return Precondition::None;
        }
        match self.reads.get(key) {
            Some(snapshot) => match snapshot.update_time() {
                Some(update_time) if snapshot.exists() => Precondition::UpdateTime(update_time),
                _ => Precondition::Exists(false),
            },
            None => Precondition::None,
        }
    }

    fn update_precondition(&self, key: &DocumentKey) -> FirestoreResult<Precondition> {
        if self.written.contains(key) {
            return Ok(Precondition::Exists(true));
        }
        match self.reads.get(key) {
            Some(snapshot) if !snapshot.exists() => {
                Err(invalid_argument("Can't update a document that doesn't exist."))
            }
            Some(snapshot) => Ok(snapshot
                .update_time()
                .map(Precondition::UpdateTime)
                .unwrap_or(Precondition::Exists(true))),
            None => Ok(Precondition::Exists(true)),
        }
    }

    fn push(&mut self, write: WriteOperation) {
        self.written.insert(write.key().clone());
        self.writes.push(write);
    }
}

impl Transaction {
    pub(crate) fn new(firestore: Firestore) -> Self {
        Self {
            firestore,
            state: Arc::new(Mutex::new(TransactionState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TransactionState> {
        self.state.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    fn check(&self, reference: &DocumentReference) -> FirestoreResult<()> {
        if !self.firestore.same_instance(reference.firestore()) {
            return Err(invalid_argument(
                "Provided document reference is from a different Firestore instance",
            ));
        }
        if self.lock().committed {
            return Err(invalid_argument("Transaction has already been committed"));
        }
        Ok(())
    }

    /// Reads a document. Reading the same document again returns the snapshot
    /// captured by the first read.
    pub async fn get(&self, reference: &DocumentReference) -> FirestoreResult<DocumentSnapshot> {
        self.check(reference)?;
        {
            let state = self.lock();
            if !state.writes.is_empty() {
                return Err(invalid_argument(
                    "Firestore transactions require all reads to be executed before all writes.",
                ));
            }
            if let Some(snapshot) = state.reads.get(reference.key()) {
                return Ok(snapshot.clone());
            }
        }

        let snapshot = self.firestore.datastore().get_document(reference.key()).await?;
        if snapshot.from_cache() {
            return Err(unavailable(
                "Failed to get document because the client is offline.",
            ));
        }

        let mut state = self.lock();
        if !state.writes.is_empty() {
            return Err(invalid_argument(
                "Firestore transactions require all reads to be executed before all writes.",
            ));
        }
        Ok(state
            .reads
            .entry(reference.key().clone())
            .or_insert(snapshot)
            .clone())
    }

    pub fn set<T>(
        &self,
        reference: &DocumentReference,
        value: &T,
        encode_defaults: bool,
        options: SetOptions,
    ) -> FirestoreResult<&Self>
    where
        T: Serialize + ?Sized,
    {
        self.set_with(reference, &Derived, value, encode_defaults, options)
    }

    pub fn set_with<T, S>(
        &self,
        reference: &DocumentReference,
        strategy: &S,
        value: &T,
        encode_defaults: bool,
        options: SetOptions,
    ) -> FirestoreResult<&Self>
    where
        T: ?Sized,
        S: EncodeStrategy<T> + ?Sized,
    {
        self.check(reference)?;
        let fields = encode_document(strategy, value, encode_defaults)?;
        let write = operations::set_write(reference.key().clone(), fields, &options)?;
        let mut state = self.lock();
        let precondition = state.precondition(reference.key());
        state.push(write.with_precondition(precondition));
        Ok(self)
    }

    pub fn update<T>(&self, reference: &DocumentReference, value: &T, encode_defaults: bool) -> FirestoreResult<&Self>
    where
        T: Serialize + ?Sized,
    {
        self.update_with(reference, &Derived, value, encode_defaults)
    }

    pub fn update_with<T, S>(
        &self,
        reference: &DocumentReference,
        strategy: &S,
        value: &T,
        encode_defaults: bool,
    ) -> FirestoreResult<&Self>
    where
        T: ?Sized,
        S: EncodeStrategy<T> + ?Sized,
    {
        self.check(reference)?;
        let fields = encode_document(strategy, value, encode_defaults)?;
        let write = operations::update_write(reference.key().clone(), fields)?;
        self.push_update(write)
    }

    pub fn update_fields<I, P>(&self, reference: &DocumentReference, pairs: I) -> FirestoreResult<&Self>
    where
        I: IntoIterator<Item = (P, FirestoreValue)>,
        P: IntoFieldPath,
    {
        self.check(reference)?;
        let write = operations::update_fields_write(reference.key().clone(), field_pairs(pairs)?)?;
        self.push_update(write)
    }

    pub fn delete(&self, reference: &DocumentReference) -> FirestoreResult<&Self> {
        self.check(reference)?;
        let mut state = self.lock();
        let precondition = state.precondition(reference.key());
        state.push(operations::delete_write(reference.key().clone()).with_precondition(precondition));
        Ok(self)
    }

    fn push_update(&self, write: WriteOperation) -> FirestoreResult<&Self> {
        let mut state = self.lock();
        let precondition = state.update_precondition(write.key())?;
        state.push(write.with_precondition(precondition));
        Ok(self)
    }

    /// Sends the buffered writes plus a verification for every document that
    /// was read but not written.
    pub(crate) async fn commit(&self) -> FirestoreResult<()> {
        let writes = {
            let mut state = self.lock();
            if state.committed {
                return Err(invalid_argument("Transaction has already been committed"));
            }
            state.committed = true;
            let mut writes = std::mem::take(&mut state.writes);
            let verifications: Vec<WriteOperation> = state
                .reads
                .keys()
                .filter(|key| !state.written.contains(*key))
                .map(|key| WriteOperation::Verify {
                    key: key.clone(),
                    precondition: state.precondition(key),
                })
                .collect();
            writes.extend(verifications);
            writes
        };
        if writes.is_empty() {
            return Ok(());
        }
        self.firestore.datastore().commit(writes).await
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Transaction")
            .field("reads", &state.reads.len())
            .field("writes", &state.writes.len())
            .field("committed", &state.committed)
            .finish()
    }
}
