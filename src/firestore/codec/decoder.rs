use std::collections::btree_map;
use std::vec;

use serde::de::{self, DeserializeSeed, IntoDeserializer, Visitor};
use serde::forward_to_deserialize_any;

use crate::firestore::codec::scalar::{self, ScalarKind};
use crate::firestore::error::{unsupported_value, FirestoreError, FirestoreResult};
use crate::firestore::value::{FirestoreValue, ValueKind};

/// serde `Deserializer` over an owned [`FirestoreValue`].
///
/// Scalar targets (types that ask for one of the registered scalar tokens)
/// get their canonical payload; everything else is visited structurally.
/// Untyped targets see scalars as a single-entry map keyed by the scalar
/// token, which `FirestoreValue`'s own `Deserialize` turns back into the
/// native scalar.
pub(crate) struct ValueDeserializer {
    value: FirestoreValue,
}

impl ValueDeserializer {
    pub(crate) fn new(value: FirestoreValue) -> Self {
        Self { value }
    }
}

type Result<T> = FirestoreResult<T>;

impl<'de> de::Deserializer<'de> for ValueDeserializer {
    type Error = FirestoreError;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        if let Some((kind, payload)) = ScalarKind::split(&self.value) {
            let entries = scalar::tagged(kind, payload);
            return visitor.visit_map(MapDecoder::new(entries.into_iter()));
        }

        match self.value.into_kind() {
            ValueKind::Null => visitor.visit_unit(),
            ValueKind::Boolean(value) => visitor.visit_bool(value),
            ValueKind::Integer(value) => visitor.visit_i64(value),
            ValueKind::Double(value) => visitor.visit_f64(value),
            ValueKind::String(value) => visitor.visit_string(value),
            ValueKind::Bytes(value) => visitor.visit_byte_buf(value.into_vec()),
            ValueKind::Array(array) => visitor.visit_seq(SeqDecoder::new(array.into_values())),
            ValueKind::Map(map) => visitor.visit_map(MapDecoder::new(map.into_fields().into_iter())),
            other => Err(unsupported_value(format!(
                "Unsupported decode type: {}",
                other.type_name()
            ))),
        }
    }

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        if self.value.is_null() {
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_unit<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_any(visitor)
    }

    fn deserialize_unit_struct<V>(self, _name: &'static str, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_any(visitor)
    }

    fn deserialize_newtype_struct<V>(self, name: &'static str, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        match ScalarKind::from_token(name) {
            Some(kind) => {
                let payload = kind.coerce_payload(self.value)?;
                visitor.visit_newtype_struct(ValueDeserializer::new(payload))
            }
            None => visitor.visit_newtype_struct(self),
        }
    }

    fn deserialize_f32<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_f64(visitor)
    }

    fn deserialize_f64<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        match self.value.kind() {
            ValueKind::Integer(value) => visitor.visit_f64(*value as f64),
            _ => self.deserialize_any(visitor),
        }
    }

    fn deserialize_bytes<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_any(visitor)
    }

    fn deserialize_byte_buf<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_any(visitor)
    }

    fn deserialize_enum<V>(
        self,
        name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        match self.value.into_kind() {
            ValueKind::String(variant) => visitor.visit_enum(variant.into_deserializer()),
            ValueKind::Map(map) if map.fields().len() == 1 => {
                let mut entries = map.into_fields().into_iter();
                match entries.next() {
                    Some((variant, value)) => visitor.visit_enum(EnumDecoder { variant, value }),
                    None => Err(unsupported_value(format!("Empty map for enum {name}"))),
                }
            }
            other => Err(unsupported_value(format!(
                "Unsupported decode type: expected enum {name}, found {}",
                other.type_name()
            ))),
        }
    }

    fn deserialize_ignored_any<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_unit()
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 char str string
        seq tuple tuple_struct map struct identifier
    }
}

struct SeqDecoder {
    values: vec::IntoIter<FirestoreValue>,
}

impl SeqDecoder {
    fn new(values: Vec<FirestoreValue>) -> Self {
        Self {
            values: values.into_iter(),
        }
    }
}

impl<'de> de::SeqAccess<'de> for SeqDecoder {
    type Error = FirestoreError;

    fn next_element_seed<T>(&mut self, seed: T) -> Result<Option<T::Value>>
    where
        T: DeserializeSeed<'de>,
    {
        match self.values.next() {
            Some(value) => seed.deserialize(ValueDeserializer::new(value)).map(Some),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.values.len())
    }
}

struct MapDecoder {
    entries: btree_map::IntoIter<String, FirestoreValue>,
    pending: Option<FirestoreValue>,
}

impl MapDecoder {
    fn new(entries: btree_map::IntoIter<String, FirestoreValue>) -> Self {
        Self {
            entries,
            pending: None,
        }
    }
}

impl<'de> de::MapAccess<'de> for MapDecoder {
    type Error = FirestoreError;

    fn next_key_seed<K>(&mut self, seed: K) -> Result<Option<K::Value>>
    where
        K: DeserializeSeed<'de>,
    {
        match self.entries.next() {
            Some((key, value)) => {
                self.pending = Some(value);
                seed.deserialize(MapKeyDeserializer { key }).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V>(&mut self, seed: V) -> Result<V::Value>
    where
        V: DeserializeSeed<'de>,
    {
        let value = self
            .pending
            .take()
            .ok_or_else(|| unsupported_value("Map value requested before its key"))?;
        seed.deserialize(ValueDeserializer::new(value))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.entries.len())
    }
}

/// Document map keys are always strings; integer and boolean key types parse
/// them back from the text form the encoder wrote.
struct MapKeyDeserializer {
    key: String,
}

macro_rules! deserialize_parsed_key {
    ($($method:ident => $visit:ident($ty:ty)),* $(,)?) => {
        $(
            fn $method<V>(self, visitor: V) -> Result<V::Value>
            where
                V: Visitor<'de>,
            {
                match self.key.parse::<$ty>() {
                    Ok(value) => visitor.$visit(value),
                    Err(_) => Err(unsupported_value(format!(
                        "Unsupported decode type: map key '{}' is not a valid {}",
                        self.key,
                        stringify!($ty)
                    ))),
                }
            }
        )*
    };
}

impl<'de> de::Deserializer<'de> for MapKeyDeserializer {
    type Error = FirestoreError;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_string(self.key)
    }

    deserialize_parsed_key! {
        deserialize_bool => visit_bool(bool),
        deserialize_i8 => visit_i8(i8),
        deserialize_i16 => visit_i16(i16),
        deserialize_i32 => visit_i32(i32),
        deserialize_i64 => visit_i64(i64),
        deserialize_i128 => visit_i128(i128),
        deserialize_u8 => visit_u8(u8),
        deserialize_u16 => visit_u16(u16),
        deserialize_u32 => visit_u32(u32),
        deserialize_u64 => visit_u64(u64),
        deserialize_u128 => visit_u128(u128),
    }

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V>(self, _name: &'static str, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_enum(self.key.into_deserializer())
    }

    forward_to_deserialize_any! {
        f32 f64 char str string bytes byte_buf unit unit_struct
        seq tuple tuple_struct map struct identifier ignored_any
    }
}

struct EnumDecoder {
    variant: String,
    value: FirestoreValue,
}

impl<'de> de::EnumAccess<'de> for EnumDecoder {
    type Error = FirestoreError;
    type Variant = VariantDecoder;

    fn variant_seed<V>(self, seed: V) -> Result<(V::Value, VariantDecoder)>
    where
        V: DeserializeSeed<'de>,
    {
        let variant = seed.deserialize(self.variant.into_deserializer())?;
        Ok((variant, VariantDecoder { value: self.value }))
    }
}

struct VariantDecoder {
    value: FirestoreValue,
}

impl<'de> de::VariantAccess<'de> for VariantDecoder {
    type Error = FirestoreError;

    fn unit_variant(self) -> Result<()> {
        if self.value.is_null() {
            Ok(())
        } else {
            Err(unsupported_value(format!(
                "Unsupported decode type: unit variant carries a {}",
                self.value.type_name()
            )))
        }
    }

    fn newtype_variant_seed<T>(self, seed: T) -> Result<T::Value>
    where
        T: DeserializeSeed<'de>,
    {
        seed.deserialize(ValueDeserializer::new(self.value))
    }

    fn tuple_variant<V>(self, _len: usize, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        de::Deserializer::deserialize_seq(ValueDeserializer::new(self.value), visitor)
    }

    fn struct_variant<V>(self, _fields: &'static [&'static str], visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        de::Deserializer::deserialize_map(ValueDeserializer::new(self.value), visitor)
    }
}
