pub mod api;
pub mod codec;
mod constants;
pub mod error;
pub mod model;
mod query_evaluator;
pub mod remote;
pub mod value;

pub use api::{
    CollectionReference, DocumentChange, DocumentChangeType, DocumentReference, DocumentSnapshot,
    DocumentSnapshotStream, FilterOperator, Firestore, FirestoreBuilder, FirestoreSettings, LimitType,
    OrderDirection, Query, QuerySnapshot, QuerySnapshotStream, ServerTimestampBehavior, SetOptions,
    SnapshotMetadata, Transaction, WriteBatch,
};
pub use codec::{decode, decode_with, encode, encode_with, ScalarKind};
pub use constants::{CACHE_SIZE_UNLIMITED, DEFAULT_CACHE_SIZE_BYTES, DEFAULT_HOST};
pub use error::{FirestoreError, FirestoreErrorCode, FirestoreResult};
pub use model::{DatabaseId, DocumentKey, FieldPath, GeoPoint, Timestamp};
pub use remote::{Datastore, InMemoryDatastore, RetrySettings, TransactionOptions};
pub use value::{FieldValue, FirestoreValue};
