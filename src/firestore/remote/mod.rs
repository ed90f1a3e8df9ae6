pub mod datastore;
pub(crate) mod transaction_runner;

pub use datastore::{
    Datastore, InMemoryDatastore, ListenEvent, ListenSink, ListenTarget, ListenerRegistration, Precondition,
    WriteOperation,
};
pub use transaction_runner::{RetrySettings, TransactionOptions};
