mod database;
mod listen;
pub(crate) mod operations;
pub(crate) mod query;
mod reference;
mod settings;
mod snapshot;
mod transaction;
mod write_batch;

pub use database::{Firestore, FirestoreBuilder};
pub use listen::{DocumentSnapshotStream, QuerySnapshotStream};
pub use operations::{FieldTransform, SetOptions, TransformOperation};
pub use query::{
    AnyOfFilter, Bound, FieldFilter, FilterOperator, LimitType, OrderBy, OrderDirection, Query, QueryDefinition,
    QuerySnapshot, RangeFilter,
};
pub use reference::{CollectionReference, DocumentReference};
pub use settings::FirestoreSettings;
pub use snapshot::{DocumentChange, DocumentChangeType, DocumentSnapshot, ServerTimestampBehavior, SnapshotMetadata};
pub use transaction::Transaction;
pub use write_batch::WriteBatch;
