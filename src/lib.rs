//! Typed access to Cloud Firestore documents.
//!
//! Documents are plain Rust types implementing `serde::Serialize` and
//! `serde::Deserialize`. The [`firestore::codec`] module maps them onto
//! Firestore values, keeping timestamps, geo points, document references and
//! write sentinels as native scalars.
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use typed_firestore::firestore::{Firestore, SetOptions};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct User {
//!     name: String,
//!     age: i64,
//! }
//!
//! # futures::executor::block_on(async {
//! let firestore = Firestore::in_memory("demo-project");
//! let doc = firestore.doc("users/u1")?;
//! doc.set(&User { name: "Ann".into(), age: 30 }, true, SetOptions::Overwrite)
//!     .await?;
//!
//! let adults = firestore
//!     .collection("users")?
//!     .where_greater_than_or_equal("age", 18)?
//!     .get()
//!     .await?;
//! let users: Vec<User> = adults.decode_all()?;
//! assert_eq!(users[0].name, "Ann");
//! # Ok::<(), typed_firestore::firestore::FirestoreError>(())
//! # }).unwrap();
//! ```
//!
//! Queries are immutable values: every builder call returns a new
//! [`Query`](firestore::Query). Writes go through
//! [`DocumentReference`](firestore::DocumentReference),
//! [`WriteBatch`](firestore::WriteBatch) or
//! [`Firestore::run_transaction`](firestore::Firestore::run_transaction), and
//! live updates arrive as `futures::Stream`s.

pub mod firestore;

pub(crate) mod platform;
pub(crate) mod util;
