use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::firestore::codec::ScalarKind;
use crate::firestore::model::{GeoPoint, Timestamp};
use crate::firestore::value::{ArrayValue, BytesValue, FieldValue, MapValue};

/// Dynamically typed document value as exchanged with the backend.
#[derive(Clone, Debug, PartialEq)]
pub struct FirestoreValue {
    kind: ValueKind,
}

/// Sentinel transforms supported during writes.
#[derive(Clone, Debug, PartialEq)]
pub enum SentinelValue {
    ServerTimestamp,
    Delete,
    ArrayUnion(Vec<FirestoreValue>),
    ArrayRemove(Vec<FirestoreValue>),
    NumericIncrement(Box<FirestoreValue>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ValueKind {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    Timestamp(Timestamp),
    String(String),
    Bytes(BytesValue),
    Reference(String),
    GeoPoint(GeoPoint),
    Array(ArrayValue),
    Map(MapValue),
    Sentinel(SentinelValue),
}

impl ValueKind {
    /// Lower-case name of the kind, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Boolean(_) => "boolean",
            ValueKind::Integer(_) => "integer",
            ValueKind::Double(_) => "double",
            ValueKind::Timestamp(_) => "timestamp",
            ValueKind::String(_) => "string",
            ValueKind::Bytes(_) => "bytes",
            ValueKind::Reference(_) => "reference",
            ValueKind::GeoPoint(_) => "geopoint",
            ValueKind::Array(_) => "array",
            ValueKind::Map(_) => "map",
            ValueKind::Sentinel(_) => "field value",
        }
    }
}

impl FirestoreValue {
    pub(crate) fn from_kind(kind: ValueKind) -> Self {
        Self { kind }
    }

    pub fn null() -> Self {
        Self::from_kind(ValueKind::Null)
    }

    pub fn from_bool(value: bool) -> Self {
        Self::from_kind(ValueKind::Boolean(value))
    }

    pub fn from_integer(value: i64) -> Self {
        Self::from_kind(ValueKind::Integer(value))
    }

    pub fn from_double(value: f64) -> Self {
        Self::from_kind(ValueKind::Double(value))
    }

    pub fn from_timestamp(value: Timestamp) -> Self {
        Self::from_kind(ValueKind::Timestamp(value))
    }

    pub fn from_string(value: impl Into<String>) -> Self {
        Self::from_kind(ValueKind::String(value.into()))
    }

    pub fn from_bytes(value: BytesValue) -> Self {
        Self::from_kind(ValueKind::Bytes(value))
    }

    /// A reference to another document, addressed by its slash separated path.
    pub fn from_reference(path: impl Into<String>) -> Self {
        Self::from_kind(ValueKind::Reference(path.into()))
    }

    pub fn from_geo_point(value: GeoPoint) -> Self {
        Self::from_kind(ValueKind::GeoPoint(value))
    }

    pub fn from_array(values: Vec<FirestoreValue>) -> Self {
        Self::from_kind(ValueKind::Array(ArrayValue::new(values)))
    }

    pub fn from_map(map: BTreeMap<String, FirestoreValue>) -> Self {
        Self::from_kind(ValueKind::Map(MapValue::new(map)))
    }

    /// Sentinel that populates the field with the commit time on the backend.
    pub fn server_timestamp() -> Self {
        Self::from_kind(ValueKind::Sentinel(SentinelValue::ServerTimestamp))
    }

    /// Sentinel that removes the field. Only valid in updates and merging sets.
    pub fn delete_field() -> Self {
        Self::from_kind(ValueKind::Sentinel(SentinelValue::Delete))
    }

    /// Sentinel that unions the provided elements with an existing array field.
    pub fn array_union(elements: Vec<FirestoreValue>) -> Self {
        Self::from_kind(ValueKind::Sentinel(SentinelValue::ArrayUnion(elements)))
    }

    /// Sentinel that removes the provided elements from an existing array field.
    pub fn array_remove(elements: Vec<FirestoreValue>) -> Self {
        Self::from_kind(ValueKind::Sentinel(SentinelValue::ArrayRemove(elements)))
    }

    /// Sentinel that increments the targeted numeric field by `operand`.
    pub fn numeric_increment(operand: FirestoreValue) -> Self {
        Self::from_kind(ValueKind::Sentinel(SentinelValue::NumericIncrement(Box::new(
            operand,
        ))))
    }

    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    pub fn into_kind(self) -> ValueKind {
        self.kind
    }

    pub fn is_null(&self) -> bool {
        matches!(self.kind, ValueKind::Null)
    }

    pub fn as_map(&self) -> Option<&MapValue> {
        match &self.kind {
            ValueKind::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }
}

impl From<bool> for FirestoreValue {
    fn from(value: bool) -> Self {
        Self::from_bool(value)
    }
}

impl From<i64> for FirestoreValue {
    fn from(value: i64) -> Self {
        Self::from_integer(value)
    }
}

impl From<i32> for FirestoreValue {
    fn from(value: i32) -> Self {
        Self::from_integer(value as i64)
    }
}

impl From<f64> for FirestoreValue {
    fn from(value: f64) -> Self {
        Self::from_double(value)
    }
}

impl From<&str> for FirestoreValue {
    fn from(value: &str) -> Self {
        Self::from_string(value)
    }
}

impl From<String> for FirestoreValue {
    fn from(value: String) -> Self {
        Self::from_string(value)
    }
}

impl From<Timestamp> for FirestoreValue {
    fn from(value: Timestamp) -> Self {
        Self::from_timestamp(value)
    }
}

impl From<GeoPoint> for FirestoreValue {
    fn from(value: GeoPoint) -> Self {
        Self::from_geo_point(value)
    }
}

impl From<BytesValue> for FirestoreValue {
    fn from(value: BytesValue) -> Self {
        Self::from_bytes(value)
    }
}

impl From<FieldValue> for FirestoreValue {
    fn from(value: FieldValue) -> Self {
        Self::from_kind(ValueKind::Sentinel(value.into_sentinel()))
    }
}

impl From<Vec<FirestoreValue>> for FirestoreValue {
    fn from(values: Vec<FirestoreValue>) -> Self {
        Self::from_array(values)
    }
}

impl From<BTreeMap<String, FirestoreValue>> for FirestoreValue {
    fn from(map: BTreeMap<String, FirestoreValue>) -> Self {
        Self::from_map(map)
    }
}

impl From<MapValue> for FirestoreValue {
    fn from(map: MapValue) -> Self {
        Self::from_kind(ValueKind::Map(map))
    }
}

impl<T> From<Option<T>> for FirestoreValue
where
    T: Into<FirestoreValue>,
{
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_else(Self::null)
    }
}

impl Serialize for FirestoreValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match &self.kind {
            ValueKind::Null => serializer.serialize_unit(),
            ValueKind::Boolean(value) => serializer.serialize_bool(*value),
            ValueKind::Integer(value) => serializer.serialize_i64(*value),
            ValueKind::Double(value) => serializer.serialize_f64(*value),
            ValueKind::Timestamp(value) => value.serialize(serializer),
            ValueKind::String(value) => serializer.serialize_str(value),
            ValueKind::Bytes(value) => serializer.serialize_bytes(value.as_slice()),
            ValueKind::Reference(path) => {
                serializer.serialize_newtype_struct(ScalarKind::Reference.token(), path)
            }
            ValueKind::GeoPoint(value) => value.serialize(serializer),
            ValueKind::Array(array) => serializer.collect_seq(array.values()),
            ValueKind::Map(map) => serializer.collect_map(map.fields()),
            ValueKind::Sentinel(sentinel) => FieldValue::from(sentinel.clone()).serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for FirestoreValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(FirestoreValueVisitor)
    }
}

struct FirestoreValueVisitor;

impl<'de> Visitor<'de> for FirestoreValueVisitor {
    type Value = FirestoreValue;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("any Firestore value")
    }

    fn visit_bool<E>(self, value: bool) -> Result<FirestoreValue, E> {
        Ok(FirestoreValue::from_bool(value))
    }

    fn visit_i64<E>(self, value: i64) -> Result<FirestoreValue, E> {
        Ok(FirestoreValue::from_integer(value))
    }

    fn visit_u64<E>(self, value: u64) -> Result<FirestoreValue, E>
    where
        E: de::Error,
    {
        i64::try_from(value)
            .map(FirestoreValue::from_integer)
            .map_err(|_| E::custom(format!("integer {value} exceeds the int64 range")))
    }

    fn visit_f64<E>(self, value: f64) -> Result<FirestoreValue, E> {
        Ok(FirestoreValue::from_double(value))
    }

    fn visit_str<E>(self, value: &str) -> Result<FirestoreValue, E> {
        Ok(FirestoreValue::from_string(value))
    }

    fn visit_string<E>(self, value: String) -> Result<FirestoreValue, E> {
        Ok(FirestoreValue::from_string(value))
    }

    fn visit_bytes<E>(self, value: &[u8]) -> Result<FirestoreValue, E> {
        Ok(FirestoreValue::from_bytes(BytesValue::new(value.to_vec())))
    }

    fn visit_byte_buf<E>(self, value: Vec<u8>) -> Result<FirestoreValue, E> {
        Ok(FirestoreValue::from_bytes(BytesValue::new(value)))
    }

    fn visit_none<E>(self) -> Result<FirestoreValue, E> {
        Ok(FirestoreValue::null())
    }

    fn visit_unit<E>(self) -> Result<FirestoreValue, E> {
        Ok(FirestoreValue::null())
    }

    fn visit_some<D>(self, deserializer: D) -> Result<FirestoreValue, D::Error>
    where
        D: Deserializer<'de>,
    {
        FirestoreValue::deserialize(deserializer)
    }

    fn visit_newtype_struct<D>(self, deserializer: D) -> Result<FirestoreValue, D::Error>
    where
        D: Deserializer<'de>,
    {
        FirestoreValue::deserialize(deserializer)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<FirestoreValue, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut values = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(value) = seq.next_element()? {
            values.push(value);
        }
        Ok(FirestoreValue::from_array(values))
    }

    fn visit_map<A>(self, mut map: A) -> Result<FirestoreValue, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut fields = BTreeMap::new();
        let Some(first_key) = map.next_key::<String>()? else {
            return Ok(FirestoreValue::from_map(fields));
        };

        // Scalars travel through untyped decoding as a single tagged entry.
        if let Some(kind) = ScalarKind::from_token(&first_key) {
            let payload: FirestoreValue = map.next_value()?;
            return kind.rebuild(payload).map_err(de::Error::custom);
        }

        fields.insert(first_key, map.next_value()?);
        while let Some((key, value)) = map.next_entry()? {
            fields.insert(key, value);
        }
        Ok(FirestoreValue::from_map(fields))
    }
}
