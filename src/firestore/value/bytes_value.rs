use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::firestore::error::{unsupported_value, FirestoreResult};

/// Opaque binary blob stored as a Firestore bytes value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BytesValue(Vec<u8>);

impl BytesValue {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn from_base64(value: &str) -> FirestoreResult<Self> {
        STANDARD
            .decode(value)
            .map(Self)
            .map_err(|err| unsupported_value(format!("Invalid base64 bytes value: {err}")))
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for BytesValue {
    fn from(value: Vec<u8>) -> Self {
        Self::new(value)
    }
}

impl Serialize for BytesValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for BytesValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct BytesVisitor;

        impl<'de> Visitor<'de> for BytesVisitor {
            type Value = BytesValue;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a byte blob")
            }

            fn visit_bytes<E>(self, value: &[u8]) -> Result<BytesValue, E> {
                Ok(BytesValue::new(value.to_vec()))
            }

            fn visit_byte_buf<E>(self, value: Vec<u8>) -> Result<BytesValue, E> {
                Ok(BytesValue::new(value))
            }

            fn visit_str<E>(self, value: &str) -> Result<BytesValue, E>
            where
                E: de::Error,
            {
                BytesValue::from_base64(value).map_err(E::custom)
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<BytesValue, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let mut bytes = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(byte) = seq.next_element::<u8>()? {
                    bytes.push(byte);
                }
                Ok(BytesValue::new(bytes))
            }
        }

        deserializer.deserialize_byte_buf(BytesVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_roundtrip() {
        let bytes = BytesValue::new(vec![1, 2, 3, 4]);
        let encoded = bytes.to_base64();
        assert_eq!(encoded, "AQIDBA==");
        let decoded = BytesValue::from_base64(&encoded).unwrap();
        assert_eq!(decoded.as_slice(), &[1, 2, 3, 4]);
    }

    #[test]
    fn rejects_invalid_base64() {
        let err = BytesValue::from_base64("***").unwrap_err();
        assert_eq!(err.code_str(), "firestore/unsupported-value");
    }
}
