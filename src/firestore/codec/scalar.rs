use std::collections::BTreeMap;

use crate::firestore::error::{unsupported_value, FirestoreResult};
use crate::firestore::model::{GeoPoint, Timestamp};
use crate::firestore::value::{FieldValue, FirestoreValue, MapValue, ValueKind};

const TIMESTAMP_TOKEN: &str = "$__firestore_timestamp";
const GEO_POINT_TOKEN: &str = "$__firestore_geo_point";
const FIELD_VALUE_TOKEN: &str = "$__firestore_field_value";
const REFERENCE_TOKEN: &str = "$__firestore_reference";

/// Closed set of backend-native scalar types.
///
/// Each kind is announced to serde through a newtype struct whose name is the
/// kind's token. The codec intercepts those tokens before any structural
/// recursion, so a scalar always lands in the document tree as its native
/// value kind. Every kind also has a canonical payload shape used to carry it
/// through serde:
///
/// | kind       | payload                         |
/// |------------|---------------------------------|
/// | Timestamp  | `[seconds, nanoseconds]`        |
/// | GeoPoint   | `[latitude, longitude]`         |
/// | FieldValue | `[tag, [elements...]]`          |
/// | Reference  | `"collection/document"`         |
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Timestamp,
    GeoPoint,
    FieldValue,
    Reference,
}

impl ScalarKind {
    pub const ALL: [ScalarKind; 4] = [
        ScalarKind::Timestamp,
        ScalarKind::GeoPoint,
        ScalarKind::FieldValue,
        ScalarKind::Reference,
    ];

    pub fn token(self) -> &'static str {
        match self {
            ScalarKind::Timestamp => TIMESTAMP_TOKEN,
            ScalarKind::GeoPoint => GEO_POINT_TOKEN,
            ScalarKind::FieldValue => FIELD_VALUE_TOKEN,
            ScalarKind::Reference => REFERENCE_TOKEN,
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.token() == token)
    }

    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::Timestamp => "Timestamp",
            ScalarKind::GeoPoint => "GeoPoint",
            ScalarKind::FieldValue => "FieldValue",
            ScalarKind::Reference => "DocumentReference",
        }
    }

    /// Splits a dynamic scalar into its kind and canonical payload.
    pub(crate) fn split(value: &FirestoreValue) -> Option<(ScalarKind, FirestoreValue)> {
        match value.kind() {
            ValueKind::Timestamp(timestamp) => {
                Some((ScalarKind::Timestamp, timestamp_payload(timestamp)))
            }
            ValueKind::GeoPoint(point) => Some((ScalarKind::GeoPoint, geo_point_payload(point))),
            ValueKind::Sentinel(sentinel) => Some((
                ScalarKind::FieldValue,
                FieldValue::from(sentinel.clone()).to_payload(),
            )),
            ValueKind::Reference(path) => {
                Some((ScalarKind::Reference, FirestoreValue::from_string(path.clone())))
            }
            _ => None,
        }
    }

    /// Builds the native value from its canonical payload.
    pub(crate) fn rebuild(self, payload: FirestoreValue) -> FirestoreResult<FirestoreValue> {
        match (self, payload.into_kind()) {
            (ScalarKind::Timestamp, ValueKind::Array(array)) => match array.values() {
                [seconds, nanos] => match (seconds.kind(), nanos.kind()) {
                    (ValueKind::Integer(seconds), ValueKind::Integer(nanos)) => {
                        let nanos = i32::try_from(*nanos).map_err(|_| {
                            unsupported_value(format!("Timestamp nanoseconds {nanos} out of range"))
                        })?;
                        Ok(FirestoreValue::from_timestamp(Timestamp::new(*seconds, nanos)))
                    }
                    _ => Err(malformed(self)),
                },
                _ => Err(malformed(self)),
            },
            (ScalarKind::GeoPoint, ValueKind::Array(array)) => match array.values() {
                [latitude, longitude] => match (as_f64(latitude), as_f64(longitude)) {
                    (Some(latitude), Some(longitude)) => GeoPoint::new(latitude, longitude)
                        .map(FirestoreValue::from_geo_point)
                        .map_err(|err| unsupported_value(err.message())),
                    _ => Err(malformed(self)),
                },
                _ => Err(malformed(self)),
            },
            (ScalarKind::FieldValue, ValueKind::Array(array)) => {
                let mut values = array.into_values();
                if values.len() != 2 {
                    return Err(malformed(self));
                }
                let elements = values.pop().map(FirestoreValue::into_kind);
                let tag = values.pop().map(FirestoreValue::into_kind);
                match (tag, elements) {
                    (Some(ValueKind::Integer(tag)), Some(ValueKind::Array(elements))) => {
                        FieldValue::from_parts(tag, elements.into_values()).map(FirestoreValue::from)
                    }
                    _ => Err(malformed(self)),
                }
            }
            (ScalarKind::Reference, ValueKind::String(path)) => Ok(FirestoreValue::from_reference(path)),
            _ => Err(malformed(self)),
        }
    }

    /// Converts a decoded source value into this kind's canonical payload.
    ///
    /// Besides the native kind, timestamps accept RFC 3339 strings and
    /// `{seconds, nanoseconds}` maps, geo points accept `{latitude, longitude}`
    /// maps and references accept plain path strings.
    pub(crate) fn coerce_payload(self, source: FirestoreValue) -> FirestoreResult<FirestoreValue> {
        if let Some((kind, payload)) = ScalarKind::split(&source) {
            if kind == self {
                return Ok(payload);
            }
            return Err(mismatch(self, source.type_name()));
        }

        match (self, source.kind()) {
            (ScalarKind::Timestamp, ValueKind::String(text)) => {
                Ok(timestamp_payload(&Timestamp::from_rfc3339(text)?))
            }
            (ScalarKind::Timestamp, ValueKind::Map(map)) => {
                let seconds = integer_field(map, &["seconds"]);
                let nanos = integer_field(map, &["nanoseconds", "nanos"]).unwrap_or(0);
                match seconds {
                    Some(seconds) => Ok(FirestoreValue::from_array(vec![
                        FirestoreValue::from_integer(seconds),
                        FirestoreValue::from_integer(nanos),
                    ])),
                    None => Err(mismatch(self, "map")),
                }
            }
            (ScalarKind::GeoPoint, ValueKind::Map(map)) => {
                let latitude = map.fields().get("latitude").and_then(as_f64);
                let longitude = map.fields().get("longitude").and_then(as_f64);
                match (latitude, longitude) {
                    (Some(latitude), Some(longitude)) => Ok(FirestoreValue::from_array(vec![
                        FirestoreValue::from_double(latitude),
                        FirestoreValue::from_double(longitude),
                    ])),
                    _ => Err(mismatch(self, "map")),
                }
            }
            (ScalarKind::Reference, ValueKind::String(_)) => Ok(source),
            (ScalarKind::Timestamp | ScalarKind::GeoPoint | ScalarKind::FieldValue, ValueKind::Array(_)) => {
                self.rebuild(source.clone())?;
                Ok(source)
            }
            (_, other) => Err(mismatch(self, other.type_name())),
        }
    }
}

fn timestamp_payload(timestamp: &Timestamp) -> FirestoreValue {
    FirestoreValue::from_array(vec![
        FirestoreValue::from_integer(timestamp.seconds),
        FirestoreValue::from_integer(timestamp.nanos as i64),
    ])
}

fn geo_point_payload(point: &GeoPoint) -> FirestoreValue {
    FirestoreValue::from_array(vec![
        FirestoreValue::from_double(point.latitude()),
        FirestoreValue::from_double(point.longitude()),
    ])
}

fn as_f64(value: &FirestoreValue) -> Option<f64> {
    match value.kind() {
        ValueKind::Double(value) => Some(*value),
        ValueKind::Integer(value) => Some(*value as f64),
        _ => None,
    }
}

fn integer_field(map: &MapValue, names: &[&str]) -> Option<i64> {
    names.iter().find_map(|name| match map.fields().get(*name)?.kind() {
        ValueKind::Integer(value) => Some(*value),
        _ => None,
    })
}

fn malformed(kind: ScalarKind) -> crate::firestore::error::FirestoreError {
    unsupported_value(format!("Malformed {} payload", kind.name()))
}

fn mismatch(kind: ScalarKind, found: &str) -> crate::firestore::error::FirestoreError {
    unsupported_value(format!(
        "Unsupported decode type: expected {}, found {found}",
        kind.name()
    ))
}

/// Rebuilds the tagged single-entry map form of a scalar, as seen by untyped targets.
pub(crate) fn tagged(kind: ScalarKind, payload: FirestoreValue) -> BTreeMap<String, FirestoreValue> {
    BTreeMap::from([(kind.token().to_string(), payload)])
}
