use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::firestore::codec::ScalarKind;
use crate::firestore::error::{invalid_argument, FirestoreResult};
use crate::firestore::model::ResourcePath;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DocumentKey {
    path: ResourcePath,
}

impl DocumentKey {
    pub fn from_path(path: ResourcePath) -> FirestoreResult<Self> {
        if !path.is_document() {
            return Err(invalid_argument(format!(
                "Invalid document path '{path}': documents need an even number of segments"
            )));
        }
        Ok(Self { path })
    }

    pub fn from_string(path: &str) -> FirestoreResult<Self> {
        let resource = ResourcePath::from_string(path)?;
        Self::from_path(resource)
    }

    pub fn collection_path(&self) -> ResourcePath {
        self.path.without_last()
    }

    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    pub fn id(&self) -> &str {
        self.path.last_segment().unwrap_or_default()
    }

    /// Identifier of the collection that directly contains the document.
    pub fn collection_id(&self) -> &str {
        self.path
            .get(self.path.len().saturating_sub(2))
            .unwrap_or_default()
    }

    pub fn canonical_string(&self) -> String {
        self.path.canonical_string()
    }
}

impl PartialOrd for DocumentKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DocumentKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        ResourcePath::comparator(&self.path, &other.path)
    }
}

/// Encodes as a native reference value through the document codec and as the
/// slash-separated path elsewhere.
impl Serialize for DocumentKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_newtype_struct(ScalarKind::Reference.token(), &self.canonical_string())
    }
}

impl<'de> Deserialize<'de> for DocumentKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DocumentKeyVisitor;

        impl<'de> Visitor<'de> for DocumentKeyVisitor {
            type Value = DocumentKey;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a document path")
            }

            fn visit_newtype_struct<D>(self, deserializer: D) -> Result<DocumentKey, D::Error>
            where
                D: Deserializer<'de>,
            {
                let path = String::deserialize(deserializer)?;
                DocumentKey::from_string(&path).map_err(de::Error::custom)
            }

            fn visit_str<E>(self, value: &str) -> Result<DocumentKey, E>
            where
                E: de::Error,
            {
                DocumentKey::from_string(value).map_err(E::custom)
            }
        }

        deserializer.deserialize_newtype_struct(ScalarKind::Reference.token(), DocumentKeyVisitor)
    }
}
