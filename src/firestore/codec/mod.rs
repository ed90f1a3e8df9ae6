//! Typed document codec.
//!
//! Converts between application values and the dynamic [`FirestoreValue`]
//! tree. Any `serde` type can be encoded or decoded; the backend-native
//! scalars ([`Timestamp`](crate::firestore::model::Timestamp),
//! [`GeoPoint`](crate::firestore::model::GeoPoint),
//! [`FieldValue`](crate::firestore::value::FieldValue) and document
//! references) are recognised by [`ScalarKind`] and kept native.
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use typed_firestore::firestore::codec;
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct User {
//!     name: String,
//!     age: i64,
//!     nickname: Option<String>,
//! }
//!
//! let ann = User { name: "Ann".into(), age: 30, nickname: None };
//! let encoded = codec::encode(&ann, false).unwrap();
//! assert!(!encoded.as_map().unwrap().fields().contains_key("nickname"));
//! let decoded: User = codec::decode(&encoded).unwrap();
//! assert_eq!(decoded, ann);
//! ```

mod decoder;
mod encoder;
pub(crate) mod scalar;
mod strategy;

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::firestore::error::{invalid_argument, FirestoreResult};
use crate::firestore::value::{FirestoreValue, ValueKind};

pub use scalar::ScalarKind;
pub use strategy::{DecodeStrategy, Derived, Dynamic, EncodeStrategy, FnDecoder, FnEncoder, WithDefaults};

/// Encodes `value` with its serde implementation.
///
/// When `encode_defaults` is `false`, record fields holding `None` are
/// omitted from the result.
pub fn encode<T>(value: &T, encode_defaults: bool) -> FirestoreResult<FirestoreValue>
where
    T: Serialize + ?Sized,
{
    encode_with(&Derived, value, encode_defaults)
}

/// Encodes `value` with an explicit strategy.
pub fn encode_with<T, S>(strategy: &S, value: &T, encode_defaults: bool) -> FirestoreResult<FirestoreValue>
where
    T: ?Sized,
    S: EncodeStrategy<T> + ?Sized,
{
    strategy.encode(value, encode_defaults)
}

/// Decodes a dynamic value into `T` with its serde implementation.
pub fn decode<T>(value: &FirestoreValue) -> FirestoreResult<T>
where
    T: DeserializeOwned,
{
    decode_with(&Derived, value)
}

/// Decodes a dynamic value with an explicit strategy.
pub fn decode_with<T, S>(strategy: &S, value: &FirestoreValue) -> FirestoreResult<T>
where
    S: DecodeStrategy<T> + ?Sized,
{
    strategy.decode(value)
}

/// Encodes a whole document. The result must be a map.
pub(crate) fn encode_document<T, S>(
    strategy: &S,
    value: &T,
    encode_defaults: bool,
) -> FirestoreResult<BTreeMap<String, FirestoreValue>>
where
    T: ?Sized,
    S: EncodeStrategy<T> + ?Sized,
{
    let encoded = strategy.encode(value, encode_defaults)?;
    match encoded.into_kind() {
        ValueKind::Map(map) => Ok(map.into_fields()),
        other => Err(invalid_argument(format!(
            "Documents must encode to a map, found {}",
            other.type_name()
        ))),
    }
}
