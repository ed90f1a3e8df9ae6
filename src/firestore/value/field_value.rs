use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::firestore::codec::{self, ScalarKind};
use crate::firestore::error::{unsupported_value, FirestoreResult};
use crate::firestore::value::{FirestoreValue, SentinelValue};

const SERVER_TIMESTAMP_TAG: i64 = 0;
const DELETE_TAG: i64 = 1;
const ARRAY_UNION_TAG: i64 = 2;
const ARRAY_REMOVE_TAG: i64 = 3;
const INCREMENT_TAG: i64 = 4;

/// Write-time field operation that can be embedded in any encoded value.
///
/// ```
/// use serde::Serialize;
/// use typed_firestore::firestore::value::FieldValue;
///
/// #[derive(Serialize)]
/// struct Touch {
///     updated_at: FieldValue,
/// }
///
/// let touch = Touch { updated_at: FieldValue::server_timestamp() };
/// let encoded = typed_firestore::firestore::codec::encode(&touch, true).unwrap();
/// assert!(encoded.as_map().is_some());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct FieldValue(SentinelValue);

impl FieldValue {
    pub fn server_timestamp() -> Self {
        Self(SentinelValue::ServerTimestamp)
    }

    pub fn delete() -> Self {
        Self(SentinelValue::Delete)
    }

    /// Adds each element not already present in the target array.
    pub fn array_union<I, T>(elements: I) -> FirestoreResult<Self>
    where
        I: IntoIterator<Item = T>,
        T: Serialize,
    {
        Ok(Self(SentinelValue::ArrayUnion(encode_elements(elements)?)))
    }

    /// Removes every instance of each element from the target array.
    pub fn array_remove<I, T>(elements: I) -> FirestoreResult<Self>
    where
        I: IntoIterator<Item = T>,
        T: Serialize,
    {
        Ok(Self(SentinelValue::ArrayRemove(encode_elements(elements)?)))
    }

    pub fn increment(operand: impl Into<FirestoreValue>) -> Self {
        Self(SentinelValue::NumericIncrement(Box::new(operand.into())))
    }

    pub fn sentinel(&self) -> &SentinelValue {
        &self.0
    }

    pub fn into_sentinel(self) -> SentinelValue {
        self.0
    }

    /// Canonical `[tag, [elements...]]` payload used by the scalar codec.
    pub(crate) fn to_payload(&self) -> FirestoreValue {
        let (tag, elements) = self.parts();
        FirestoreValue::from_array(vec![
            FirestoreValue::from_integer(tag),
            FirestoreValue::from_array(elements),
        ])
    }

    pub(crate) fn from_parts(tag: i64, mut elements: Vec<FirestoreValue>) -> FirestoreResult<Self> {
        let sentinel = match tag {
            SERVER_TIMESTAMP_TAG => SentinelValue::ServerTimestamp,
            DELETE_TAG => SentinelValue::Delete,
            ARRAY_UNION_TAG => SentinelValue::ArrayUnion(elements),
            ARRAY_REMOVE_TAG => SentinelValue::ArrayRemove(elements),
            INCREMENT_TAG if elements.len() == 1 => {
                SentinelValue::NumericIncrement(Box::new(elements.remove(0)))
            }
            _ => {
                return Err(unsupported_value(format!(
                    "Unknown field value operation tag {tag}"
                )))
            }
        };
        Ok(Self(sentinel))
    }

    fn parts(&self) -> (i64, Vec<FirestoreValue>) {
        match &self.0 {
            SentinelValue::ServerTimestamp => (SERVER_TIMESTAMP_TAG, Vec::new()),
            SentinelValue::Delete => (DELETE_TAG, Vec::new()),
            SentinelValue::ArrayUnion(elements) => (ARRAY_UNION_TAG, elements.clone()),
            SentinelValue::ArrayRemove(elements) => (ARRAY_REMOVE_TAG, elements.clone()),
            SentinelValue::NumericIncrement(operand) => (INCREMENT_TAG, vec![(**operand).clone()]),
        }
    }
}

impl From<SentinelValue> for FieldValue {
    fn from(value: SentinelValue) -> Self {
        Self(value)
    }
}

fn encode_elements<I, T>(elements: I) -> FirestoreResult<Vec<FirestoreValue>>
where
    I: IntoIterator<Item = T>,
    T: Serialize,
{
    elements
        .into_iter()
        .map(|element| codec::encode(&element, true))
        .collect()
}

impl Serialize for FieldValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_newtype_struct(ScalarKind::FieldValue.token(), &self.parts())
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct FieldValueVisitor;

        impl<'de> Visitor<'de> for FieldValueVisitor {
            type Value = FieldValue;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a Firestore field value operation")
            }

            fn visit_newtype_struct<D>(self, deserializer: D) -> Result<FieldValue, D::Error>
            where
                D: Deserializer<'de>,
            {
                let (tag, elements) = <(i64, Vec<FirestoreValue>)>::deserialize(deserializer)?;
                FieldValue::from_parts(tag, elements).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_newtype_struct(ScalarKind::FieldValue.token(), FieldValueVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_union_encodes_elements() {
        let value = FieldValue::array_union(["a", "b"]).unwrap();
        assert_eq!(
            value.sentinel(),
            &SentinelValue::ArrayUnion(vec![
                FirestoreValue::from_string("a"),
                FirestoreValue::from_string("b")
            ])
        );
    }

    #[test]
    fn payload_roundtrip() {
        let value = FieldValue::increment(5i64);
        let (tag, elements) = value.parts();
        assert_eq!(FieldValue::from_parts(tag, elements).unwrap(), value);
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let err = FieldValue::from_parts(42, Vec::new()).unwrap_err();
        assert_eq!(err.code_str(), "firestore/unsupported-value");
    }
}
