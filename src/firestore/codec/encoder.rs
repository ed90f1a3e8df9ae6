use std::collections::BTreeMap;

use serde::ser::{self, Serialize};

use crate::firestore::codec::ScalarKind;
use crate::firestore::error::{unsupported_value, FirestoreError, FirestoreResult};
use crate::firestore::value::{BytesValue, FirestoreValue, ValueKind};

/// serde `Serializer` that produces a [`FirestoreValue`] tree.
///
/// Dispatch order: registered scalar tokens first, then serde's structural
/// shapes (structs and maps become maps, sequences and tuples become arrays,
/// unit variants become strings, data-carrying variants become single-entry
/// maps). Anything with no document representation is an
/// `UnsupportedValue` error.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ValueSerializer {
    omit_null_fields: bool,
}

impl ValueSerializer {
    pub(crate) fn new(encode_defaults: bool) -> Self {
        Self {
            omit_null_fields: !encode_defaults,
        }
    }
}

type Result<T> = FirestoreResult<T>;

impl ser::Serializer for ValueSerializer {
    type Ok = FirestoreValue;
    type Error = FirestoreError;

    type SerializeSeq = SeqEncoder;
    type SerializeTuple = SeqEncoder;
    type SerializeTupleStruct = SeqEncoder;
    type SerializeTupleVariant = VariantSeqEncoder;
    type SerializeMap = MapEncoder;
    type SerializeStruct = StructEncoder;
    type SerializeStructVariant = VariantStructEncoder;

    fn serialize_bool(self, v: bool) -> Result<FirestoreValue> {
        Ok(FirestoreValue::from_bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<FirestoreValue> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i16(self, v: i16) -> Result<FirestoreValue> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i32(self, v: i32) -> Result<FirestoreValue> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i64(self, v: i64) -> Result<FirestoreValue> {
        Ok(FirestoreValue::from_integer(v))
    }

    fn serialize_i128(self, v: i128) -> Result<FirestoreValue> {
        i64::try_from(v)
            .map(FirestoreValue::from_integer)
            .map_err(|_| unsupported_value(format!("Unsupported encode type: i128 value {v} exceeds the int64 range")))
    }

    fn serialize_u8(self, v: u8) -> Result<FirestoreValue> {
        self.serialize_i64(v as i64)
    }

    fn serialize_u16(self, v: u16) -> Result<FirestoreValue> {
        self.serialize_i64(v as i64)
    }

    fn serialize_u32(self, v: u32) -> Result<FirestoreValue> {
        self.serialize_i64(v as i64)
    }

    fn serialize_u64(self, v: u64) -> Result<FirestoreValue> {
        i64::try_from(v)
            .map(FirestoreValue::from_integer)
            .map_err(|_| unsupported_value(format!("Unsupported encode type: u64 value {v} exceeds the int64 range")))
    }

    fn serialize_u128(self, v: u128) -> Result<FirestoreValue> {
        i64::try_from(v)
            .map(FirestoreValue::from_integer)
            .map_err(|_| unsupported_value(format!("Unsupported encode type: u128 value {v} exceeds the int64 range")))
    }

    fn serialize_f32(self, v: f32) -> Result<FirestoreValue> {
        self.serialize_f64(v as f64)
    }

    fn serialize_f64(self, v: f64) -> Result<FirestoreValue> {
        Ok(FirestoreValue::from_double(v))
    }

    fn serialize_char(self, v: char) -> Result<FirestoreValue> {
        Ok(FirestoreValue::from_string(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<FirestoreValue> {
        Ok(FirestoreValue::from_string(v))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<FirestoreValue> {
        Ok(FirestoreValue::from_bytes(BytesValue::new(v.to_vec())))
    }

    fn serialize_none(self) -> Result<FirestoreValue> {
        Ok(FirestoreValue::null())
    }

    fn serialize_some<T>(self, value: &T) -> Result<FirestoreValue>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<FirestoreValue> {
        Ok(FirestoreValue::null())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<FirestoreValue> {
        Ok(FirestoreValue::null())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<FirestoreValue> {
        Ok(FirestoreValue::from_string(variant))
    }

    fn serialize_newtype_struct<T>(self, name: &'static str, value: &T) -> Result<FirestoreValue>
    where
        T: ?Sized + Serialize,
    {
        match ScalarKind::from_token(name) {
            Some(kind) => {
                let payload = value.serialize(ValueSerializer::new(true))?;
                kind.rebuild(payload)
            }
            None => value.serialize(self),
        }
    }

    fn serialize_newtype_variant<T>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<FirestoreValue>
    where
        T: ?Sized + Serialize,
    {
        let inner = value.serialize(self)?;
        Ok(FirestoreValue::from_map(BTreeMap::from([(
            variant.to_string(),
            inner,
        )])))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqEncoder> {
        Ok(SeqEncoder {
            serializer: self,
            values: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqEncoder> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(self, _name: &'static str, len: usize) -> Result<SeqEncoder> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<VariantSeqEncoder> {
        Ok(VariantSeqEncoder {
            variant,
            inner: self.serialize_seq(Some(len))?,
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<MapEncoder> {
        Ok(MapEncoder {
            serializer: self,
            fields: BTreeMap::new(),
            pending_key: None,
        })
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<StructEncoder> {
        Ok(StructEncoder {
            serializer: self,
            fields: BTreeMap::new(),
        })
    }

    fn serialize_struct_variant(
        self,
        name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<VariantStructEncoder> {
        Ok(VariantStructEncoder {
            variant,
            inner: self.serialize_struct(name, len)?,
        })
    }
}

pub(crate) struct SeqEncoder {
    serializer: ValueSerializer,
    values: Vec<FirestoreValue>,
}

impl SeqEncoder {
    fn push<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.values.push(value.serialize(self.serializer)?);
        Ok(())
    }
}

impl ser::SerializeSeq for SeqEncoder {
    type Ok = FirestoreValue;
    type Error = FirestoreError;

    fn serialize_element<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.push(value)
    }

    fn end(self) -> Result<FirestoreValue> {
        Ok(FirestoreValue::from_array(self.values))
    }
}

impl ser::SerializeTuple for SeqEncoder {
    type Ok = FirestoreValue;
    type Error = FirestoreError;

    fn serialize_element<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.push(value)
    }

    fn end(self) -> Result<FirestoreValue> {
        Ok(FirestoreValue::from_array(self.values))
    }
}

impl ser::SerializeTupleStruct for SeqEncoder {
    type Ok = FirestoreValue;
    type Error = FirestoreError;

    fn serialize_field<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.push(value)
    }

    fn end(self) -> Result<FirestoreValue> {
        Ok(FirestoreValue::from_array(self.values))
    }
}

pub(crate) struct VariantSeqEncoder {
    variant: &'static str,
    inner: SeqEncoder,
}

impl ser::SerializeTupleVariant for VariantSeqEncoder {
    type Ok = FirestoreValue;
    type Error = FirestoreError;

    fn serialize_field<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.inner.push(value)
    }

    fn end(self) -> Result<FirestoreValue> {
        Ok(FirestoreValue::from_map(BTreeMap::from([(
            self.variant.to_string(),
            FirestoreValue::from_array(self.inner.values),
        )])))
    }
}

pub(crate) struct MapEncoder {
    serializer: ValueSerializer,
    fields: BTreeMap<String, FirestoreValue>,
    pending_key: Option<String>,
}

impl ser::SerializeMap for MapEncoder {
    type Ok = FirestoreValue;
    type Error = FirestoreError;

    fn serialize_key<T>(&mut self, key: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        let key = key.serialize(ValueSerializer::new(true))?;
        self.pending_key = Some(map_key(key)?);
        Ok(())
    }

    fn serialize_value<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        let key = self
            .pending_key
            .take()
            .ok_or_else(|| unsupported_value("Map value serialized without a key"))?;
        self.fields.insert(key, value.serialize(self.serializer)?);
        Ok(())
    }

    fn end(self) -> Result<FirestoreValue> {
        // Untyped sources carry scalars as a single entry keyed by the token.
        if self.fields.len() == 1 {
            if let Some((token, payload)) = self.fields.first_key_value() {
                if let Some(kind) = ScalarKind::from_token(token) {
                    return kind.rebuild(payload.clone());
                }
            }
        }
        Ok(FirestoreValue::from_map(self.fields))
    }
}

/// Map keys must be strings in a document; integer and boolean keys are
/// rendered in their decimal/text form, any other key kind is rejected.
fn map_key(key: FirestoreValue) -> Result<String> {
    match key.into_kind() {
        ValueKind::String(value) => Ok(value),
        ValueKind::Integer(value) => Ok(value.to_string()),
        ValueKind::Boolean(value) => Ok(value.to_string()),
        other => Err(unsupported_value(format!(
            "Unsupported encode type: map keys must be strings, found {}",
            other.type_name()
        ))),
    }
}

pub(crate) struct StructEncoder {
    serializer: ValueSerializer,
    fields: BTreeMap<String, FirestoreValue>,
}

impl StructEncoder {
    fn insert<T>(&mut self, key: &'static str, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        let encoded = value.serialize(self.serializer)?;
        let is_none = || value.serialize(NoneCheck).unwrap_or(false);
        if self.serializer.omit_null_fields && encoded.is_null() && is_none() {
            return Ok(());
        }
        self.fields.insert(key.to_string(), encoded);
        Ok(())
    }
}

impl ser::SerializeStruct for StructEncoder {
    type Ok = FirestoreValue;
    type Error = FirestoreError;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.insert(key, value)
    }

    fn end(self) -> Result<FirestoreValue> {
        Ok(FirestoreValue::from_map(self.fields))
    }
}

/// Answers whether a value serializes as `Option::None`. Unit values also
/// encode to null but have no default on decode, so they are never omitted.
struct NoneCheck;

macro_rules! not_none {
    ($($method:ident($($arg:ty),*)),* $(,)?) => {
        $(
            fn $method(self, $(_: $arg),*) -> Result<bool> {
                Ok(false)
            }
        )*
    };
}

impl ser::Serializer for NoneCheck {
    type Ok = bool;
    type Error = FirestoreError;

    type SerializeSeq = ser::Impossible<bool, FirestoreError>;
    type SerializeTuple = ser::Impossible<bool, FirestoreError>;
    type SerializeTupleStruct = ser::Impossible<bool, FirestoreError>;
    type SerializeTupleVariant = ser::Impossible<bool, FirestoreError>;
    type SerializeMap = ser::Impossible<bool, FirestoreError>;
    type SerializeStruct = ser::Impossible<bool, FirestoreError>;
    type SerializeStructVariant = ser::Impossible<bool, FirestoreError>;

    fn serialize_none(self) -> Result<bool> {
        Ok(true)
    }

    not_none! {
        serialize_bool(bool),
        serialize_i8(i8),
        serialize_i16(i16),
        serialize_i32(i32),
        serialize_i64(i64),
        serialize_i128(i128),
        serialize_u8(u8),
        serialize_u16(u16),
        serialize_u32(u32),
        serialize_u64(u64),
        serialize_u128(u128),
        serialize_f32(f32),
        serialize_f64(f64),
        serialize_char(char),
        serialize_str(&str),
        serialize_bytes(&[u8]),
        serialize_unit(),
        serialize_unit_struct(&'static str),
        serialize_unit_variant(&'static str, u32, &'static str),
    }

    fn serialize_some<T>(self, _value: &T) -> Result<bool>
    where
        T: ?Sized + Serialize,
    {
        Ok(false)
    }

    fn serialize_newtype_struct<T>(self, _name: &'static str, _value: &T) -> Result<bool>
    where
        T: ?Sized + Serialize,
    {
        Ok(false)
    }

    fn serialize_newtype_variant<T>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<bool>
    where
        T: ?Sized + Serialize,
    {
        Ok(false)
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq> {
        Err(not_a_none())
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple> {
        Err(not_a_none())
    }

    fn serialize_tuple_struct(self, _name: &'static str, _len: usize) -> Result<Self::SerializeTupleStruct> {
        Err(not_a_none())
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        Err(not_a_none())
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap> {
        Err(not_a_none())
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self::SerializeStruct> {
        Err(not_a_none())
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Err(not_a_none())
    }
}

fn not_a_none() -> FirestoreError {
    unsupported_value("compound value")
}

pub(crate) struct VariantStructEncoder {
    variant: &'static str,
    inner: StructEncoder,
}

impl ser::SerializeStructVariant for VariantStructEncoder {
    type Ok = FirestoreValue;
    type Error = FirestoreError;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.inner.insert(key, value)
    }

    fn end(self) -> Result<FirestoreValue> {
        Ok(FirestoreValue::from_map(BTreeMap::from([(
            self.variant.to_string(),
            FirestoreValue::from_map(self.inner.fields),
        )])))
    }
}
