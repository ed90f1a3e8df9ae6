use std::collections::BTreeMap;

use crate::firestore::model::FieldPath;
use crate::firestore::value::{FirestoreValue, ValueKind};

/// Ordered field map backing documents and nested map values.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MapValue {
    fields: BTreeMap<String, FirestoreValue>,
}

impl MapValue {
    pub fn new(fields: BTreeMap<String, FirestoreValue>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &BTreeMap<String, FirestoreValue> {
        &self.fields
    }

    pub fn into_fields(self) -> BTreeMap<String, FirestoreValue> {
        self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Resolves a possibly nested field. Intermediate non-map values end the lookup.
    pub fn get(&self, path: &FieldPath) -> Option<&FirestoreValue> {
        let (first, rest) = path.segments().split_first()?;
        let mut current = self.fields.get(first)?;
        for segment in rest {
            match current.kind() {
                ValueKind::Map(child) => current = child.fields.get(segment)?,
                _ => return None,
            }
        }
        Some(current)
    }

    /// Writes `value` at `path`, replacing non-map intermediates with maps.
    pub fn set(&mut self, path: &FieldPath, value: FirestoreValue) {
        set_at_segments(&mut self.fields, path.segments(), value);
    }

    /// Removes the field at `path`. Returns whether anything was removed.
    pub fn delete(&mut self, path: &FieldPath) -> bool {
        delete_at_segments(&mut self.fields, path.segments())
    }
}

impl From<BTreeMap<String, FirestoreValue>> for MapValue {
    fn from(fields: BTreeMap<String, FirestoreValue>) -> Self {
        Self::new(fields)
    }
}

fn set_at_segments(
    fields: &mut BTreeMap<String, FirestoreValue>,
    segments: &[String],
    value: FirestoreValue,
) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };

    if rest.is_empty() {
        fields.insert(first.clone(), value);
        return;
    }

    let mut child = match fields.remove(first).map(FirestoreValue::into_kind) {
        Some(ValueKind::Map(map)) => map.into_fields(),
        _ => BTreeMap::new(),
    };
    set_at_segments(&mut child, rest, value);
    fields.insert(first.clone(), FirestoreValue::from_map(child));
}

fn delete_at_segments(fields: &mut BTreeMap<String, FirestoreValue>, segments: &[String]) -> bool {
    let Some((first, rest)) = segments.split_first() else {
        return false;
    };

    if rest.is_empty() {
        return fields.remove(first).is_some();
    }

    let Some(entry) = fields.get_mut(first) else {
        return false;
    };
    let ValueKind::Map(map) = entry.kind() else {
        return false;
    };
    let mut child = map.fields().clone();
    let removed = delete_at_segments(&mut child, rest);
    if removed {
        *entry = FirestoreValue::from_map(child);
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(value: &str) -> FieldPath {
        FieldPath::from_dot_separated(value).unwrap()
    }

    #[test]
    fn stores_map_entries() {
        let mut map = BTreeMap::new();
        map.insert("foo".to_string(), FirestoreValue::from_integer(1));
        let value = MapValue::new(map.clone());
        assert_eq!(value.fields().get("foo"), map.get("foo"));
    }

    #[test]
    fn set_and_get_nested_paths() {
        let mut map = MapValue::default();
        map.set(&path("stats.visits"), FirestoreValue::from_integer(3));
        map.set(&path("stats.last"), FirestoreValue::from_string("home"));
        assert_eq!(
            map.get(&path("stats.visits")),
            Some(&FirestoreValue::from_integer(3))
        );
        assert_eq!(map.fields().len(), 1);
    }

    #[test]
    fn set_replaces_scalar_intermediate() {
        let mut map = MapValue::default();
        map.set(&path("stats"), FirestoreValue::from_integer(1));
        map.set(&path("stats.visits"), FirestoreValue::from_integer(2));
        assert_eq!(
            map.get(&path("stats.visits")),
            Some(&FirestoreValue::from_integer(2))
        );
    }

    #[test]
    fn delete_nested_field() {
        let mut map = MapValue::default();
        map.set(&path("a.b"), FirestoreValue::from_integer(1));
        map.set(&path("a.c"), FirestoreValue::from_integer(2));
        assert!(map.delete(&path("a.b")));
        assert!(!map.delete(&path("a.b")));
        assert!(map.get(&path("a.b")).is_none());
        assert!(map.get(&path("a.c")).is_some());
    }
}
