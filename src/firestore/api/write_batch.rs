use serde::Serialize;

use crate::firestore::codec::{encode_document, Derived, EncodeStrategy};
use crate::firestore::constants::MAX_BATCH_WRITES;
use crate::firestore::error::{invalid_argument, resource_exhausted, FirestoreResult};
use crate::firestore::model::IntoFieldPath;
use crate::firestore::remote::datastore::WriteOperation;
use crate::firestore::value::FirestoreValue;

use super::database::Firestore;
use super::operations::{self, SetOptions};
use super::reference::{field_pairs, DocumentReference};

/// Aggregates write operations and commits them atomically.
///
/// Values are encoded when they are added, so an encoding failure surfaces
/// from the call that introduced it and leaves the batch unchanged.
/// [`commit`](WriteBatch::commit) consumes the batch.
#[derive(Clone, Debug)]
pub struct WriteBatch {
    firestore: Firestore,
    writes: Vec<WriteOperation>,
}

impl WriteBatch {
    pub(crate) fn new(firestore: Firestore) -> Self {
        Self {
            firestore,
            writes: Vec::new(),
        }
    }

    pub fn set<T>(
        &mut self,
        reference: &DocumentReference,
        value: &T,
        encode_defaults: bool,
        options: SetOptions,
    ) -> FirestoreResult<&mut Self>
    where
        T: Serialize + ?Sized,
    {
        self.set_with(reference, &Derived, value, encode_defaults, options)
    }

    pub fn set_with<T, S>(
        &mut self,
        reference: &DocumentReference,
        strategy: &S,
        value: &T,
        encode_defaults: bool,
        options: SetOptions,
    ) -> FirestoreResult<&mut Self>
    where
        T: ?Sized,
        S: EncodeStrategy<T> + ?Sized,
    {
        self.check(reference)?;
        let fields = encode_document(strategy, value, encode_defaults)?;
        let write = operations::set_write(reference.key().clone(), fields, &options)?;
        self.writes.push(write);
        Ok(self)
    }

    /// Adds an update; top-level keys of the encoded value are field paths.
    pub fn update<T>(&mut self, reference: &DocumentReference, value: &T, encode_defaults: bool) -> FirestoreResult<&mut Self>
    where
        T: Serialize + ?Sized,
    {
        self.update_with(reference, &Derived, value, encode_defaults)
    }

    pub fn update_with<T, S>(
        &mut self,
        reference: &DocumentReference,
        strategy: &S,
        value: &T,
        encode_defaults: bool,
    ) -> FirestoreResult<&mut Self>
    where
        T: ?Sized,
        S: EncodeStrategy<T> + ?Sized,
    {
        self.check(reference)?;
        let fields = encode_document(strategy, value, encode_defaults)?;
        let write = operations::update_write(reference.key().clone(), fields)?;
        self.writes.push(write);
        Ok(self)
    }

    pub fn update_fields<I, P>(&mut self, reference: &DocumentReference, pairs: I) -> FirestoreResult<&mut Self>
    where
        I: IntoIterator<Item = (P, FirestoreValue)>,
        P: IntoFieldPath,
    {
        self.check(reference)?;
        let write = operations::update_fields_write(reference.key().clone(), field_pairs(pairs)?)?;
        self.writes.push(write);
        Ok(self)
    }

    pub fn delete(&mut self, reference: &DocumentReference) -> FirestoreResult<&mut Self> {
        self.check(reference)?;
        self.writes.push(operations::delete_write(reference.key().clone()));
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Commits all queued writes atomically. An empty batch is a no-op.
    pub async fn commit(self) -> FirestoreResult<()> {
        if self.writes.is_empty() {
            return Ok(());
        }
        log::debug!("Committing write batch of {} writes", self.writes.len());
        self.firestore.datastore().commit(self.writes).await
    }

    fn check(&self, reference: &DocumentReference) -> FirestoreResult<()> {
        if self.writes.len() >= MAX_BATCH_WRITES {
            return Err(resource_exhausted(format!(
                "A write batch cannot contain more than {MAX_BATCH_WRITES} writes"
            )));
        }
        if !self.firestore.same_instance(reference.firestore()) {
            return Err(invalid_argument(
                "Provided document reference is from a different Firestore instance",
            ));
        }
        Ok(())
    }
}
