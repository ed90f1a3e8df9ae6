use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::firestore::codec::decoder::ValueDeserializer;
use crate::firestore::codec::encoder::ValueSerializer;
use crate::firestore::error::FirestoreResult;
use crate::firestore::value::{FirestoreValue, ValueKind};

/// Describes how a value of type `T` is turned into a document value.
pub trait EncodeStrategy<T: ?Sized> {
    fn encode(&self, value: &T, encode_defaults: bool) -> FirestoreResult<FirestoreValue>;
}

/// Describes how a document value is turned back into a `T`.
pub trait DecodeStrategy<T> {
    fn decode(&self, value: &FirestoreValue) -> FirestoreResult<T>;
}

/// Uses the type's own serde implementation.
///
/// With `encode_defaults == false`, record fields that encode to null are
/// left out. Derived `Deserialize` impls restore those as `None` on decode.
#[derive(Clone, Copy, Debug, Default)]
pub struct Derived;

impl<T> EncodeStrategy<T> for Derived
where
    T: Serialize + ?Sized,
{
    fn encode(&self, value: &T, encode_defaults: bool) -> FirestoreResult<FirestoreValue> {
        value.serialize(ValueSerializer::new(encode_defaults))
    }
}

impl<T> DecodeStrategy<T> for Derived
where
    T: DeserializeOwned,
{
    fn decode(&self, value: &FirestoreValue) -> FirestoreResult<T> {
        T::deserialize(ValueDeserializer::new(value.clone()))
    }
}

/// Record strategy whose declared defaults come from `T::default()`.
///
/// Encoding without defaults drops every top-level field equal to the
/// matching field of the default record. Decoding fills missing top-level
/// fields back in from the default record, so `T` does not need
/// `#[serde(default)]` attributes to read what it wrote.
pub struct WithDefaults<T>(PhantomData<fn() -> T>);

impl<T> WithDefaults<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for WithDefaults<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for WithDefaults<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for WithDefaults<T> {}

impl<T> fmt::Debug for WithDefaults<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WithDefaults")
    }
}

impl<T> EncodeStrategy<T> for WithDefaults<T>
where
    T: Serialize + Default,
{
    fn encode(&self, value: &T, encode_defaults: bool) -> FirestoreResult<FirestoreValue> {
        let encoded = Derived.encode(value, true)?;
        if encode_defaults {
            return Ok(encoded);
        }
        let defaults = Derived.encode(&T::default(), true)?;
        match (encoded.into_kind(), defaults.into_kind()) {
            (ValueKind::Map(map), ValueKind::Map(defaults)) => {
                let mut fields = map.into_fields();
                fields.retain(|key, value| defaults.fields().get(key) != Some(value));
                Ok(FirestoreValue::from_map(fields))
            }
            (kind, _) => Ok(FirestoreValue::from_kind(kind)),
        }
    }
}

impl<T> DecodeStrategy<T> for WithDefaults<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    fn decode(&self, value: &FirestoreValue) -> FirestoreResult<T> {
        let (ValueKind::Map(map), ValueKind::Map(defaults)) = (
            value.kind(),
            Derived.encode(&T::default(), true)?.into_kind(),
        ) else {
            return Derived.decode(value);
        };
        let mut fields = defaults.into_fields();
        fields.extend(map.fields().iter().map(|(k, v)| (k.clone(), v.clone())));
        Derived.decode(&FirestoreValue::from_map(fields))
    }
}

/// Passthrough for values that are already dynamic.
#[derive(Clone, Copy, Debug, Default)]
pub struct Dynamic;

impl EncodeStrategy<FirestoreValue> for Dynamic {
    fn encode(&self, value: &FirestoreValue, _encode_defaults: bool) -> FirestoreResult<FirestoreValue> {
        Ok(value.clone())
    }
}

impl DecodeStrategy<FirestoreValue> for Dynamic {
    fn decode(&self, value: &FirestoreValue) -> FirestoreResult<FirestoreValue> {
        Ok(value.clone())
    }
}

/// Hand-written encoder: `Fn(&T, encode_defaults) -> FirestoreResult<FirestoreValue>`.
#[derive(Clone, Copy)]
pub struct FnEncoder<F>(pub F);

impl<T, F> EncodeStrategy<T> for FnEncoder<F>
where
    T: ?Sized,
    F: Fn(&T, bool) -> FirestoreResult<FirestoreValue>,
{
    fn encode(&self, value: &T, encode_defaults: bool) -> FirestoreResult<FirestoreValue> {
        (self.0)(value, encode_defaults)
    }
}

/// Hand-written decoder: `Fn(&FirestoreValue) -> FirestoreResult<T>`.
#[derive(Clone, Copy)]
pub struct FnDecoder<F>(pub F);

impl<T, F> DecodeStrategy<T> for FnDecoder<F>
where
    F: Fn(&FirestoreValue) -> FirestoreResult<T>,
{
    fn decode(&self, value: &FirestoreValue) -> FirestoreResult<T> {
        (self.0)(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Profile {
        name: String,
        visits: i64,
        theme: String,
    }

    impl Default for Profile {
        fn default() -> Self {
            Self {
                name: String::new(),
                visits: 0,
                theme: "light".into(),
            }
        }
    }

    #[test]
    fn with_defaults_omits_default_fields() {
        let profile = Profile {
            name: "Ann".into(),
            ..Default::default()
        };
        let encoded = WithDefaults::<Profile>::new().encode(&profile, false).unwrap();
        let map = encoded.as_map().unwrap();
        assert_eq!(map.fields().len(), 1);
        assert!(map.fields().contains_key("name"));

        let full = WithDefaults::<Profile>::new().encode(&profile, true).unwrap();
        assert_eq!(full.as_map().unwrap().fields().len(), 3);
    }

    #[test]
    fn with_defaults_restores_omitted_fields() {
        let profile = Profile {
            name: "Ann".into(),
            visits: 4,
            ..Default::default()
        };
        let strategy = WithDefaults::<Profile>::new();
        let encoded = strategy.encode(&profile, false).unwrap();
        let decoded: Profile = strategy.decode(&encoded).unwrap();
        assert_eq!(decoded, profile);
    }

    #[test]
    fn fn_strategies_wrap_closures() {
        let encoder = FnEncoder(
            |value: &u8, _encode_defaults: bool| -> FirestoreResult<FirestoreValue> {
                Ok(FirestoreValue::from_string(value.to_string()))
            },
        );
        let decoder = FnDecoder(|value: &FirestoreValue| -> FirestoreResult<usize> {
            match value.kind() {
                ValueKind::String(text) => Ok(text.len()),
                _ => Ok(0),
            }
        });
        let encoded = encoder.encode(&42u8, true).unwrap();
        assert_eq!(encoded, FirestoreValue::from_string("42"));
        assert_eq!(decoder.decode(&encoded).unwrap(), 2);
    }

    #[test]
    fn dynamic_passthrough() {
        let value = FirestoreValue::from_integer(7);
        assert_eq!(Dynamic.encode(&value, false).unwrap(), value);
        assert_eq!(Dynamic.decode(&value).unwrap(), value);
    }
}
