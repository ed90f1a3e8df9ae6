use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use typed_firestore::firestore::codec::{self, Dynamic, FnDecoder, FnEncoder, WithDefaults};
use typed_firestore::firestore::value::ValueKind;
use typed_firestore::firestore::{
    DocumentKey, Firestore, FirestoreErrorCode, FirestoreValue, GeoPoint, SetOptions, Timestamp,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Venue {
    name: String,
    opened: Timestamp,
    location: GeoPoint,
    owner: DocumentKey,
    tags: Vec<String>,
    #[serde(default)]
    rating: Option<f64>,
}

fn venue() -> Venue {
    Venue {
        name: "Hall".into(),
        opened: Timestamp::new(1_600_000_000, 5),
        location: GeoPoint::new(52.5, 13.4).unwrap(),
        owner: DocumentKey::from_string("users/u1").unwrap(),
        tags: vec!["music".into()],
        rating: None,
    }
}

#[test]
fn scalars_stay_native() {
    let encoded = codec::encode(&venue(), true).unwrap();
    let map = encoded.as_map().unwrap();
    assert!(matches!(map.fields()["opened"].kind(), ValueKind::Timestamp(_)));
    assert!(matches!(map.fields()["location"].kind(), ValueKind::GeoPoint(_)));
    assert!(matches!(map.fields()["owner"].kind(), ValueKind::Reference(_)));
    assert!(map.fields()["rating"].is_null());

    let decoded: Venue = codec::decode(&encoded).unwrap();
    assert_eq!(decoded, venue());
}

#[test]
fn omitting_defaults_drops_null_fields() {
    let encoded = codec::encode(&venue(), false).unwrap();
    assert!(!encoded.as_map().unwrap().fields().contains_key("rating"));
    let decoded: Venue = codec::decode(&encoded).unwrap();
    assert_eq!(decoded.rating, None);
}

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
struct Preferences {
    theme: String,
    font_size: i64,
    beta: bool,
}

#[tokio::test]
async fn declared_defaults_round_trip_through_a_document() {
    let firestore = Firestore::in_memory("codec");
    let doc = firestore.doc("prefs/u1").unwrap();
    let prefs = Preferences {
        theme: "dark".into(),
        ..Default::default()
    };
    doc.set_with(&WithDefaults::<Preferences>::new(), &prefs, false, SetOptions::Overwrite)
        .await
        .unwrap();

    let snapshot = doc.get().await.unwrap();
    assert_eq!(snapshot.data().unwrap().len(), 1);
    let restored = snapshot.data_with(&WithDefaults::<Preferences>::new()).unwrap();
    assert_eq!(restored, Some(prefs));
}

#[test]
fn custom_strategies() {
    let encoder = FnEncoder(|value: &(i64, i64), _defaults: bool| {
        Ok(FirestoreValue::from_map(BTreeMap::from([
            ("x".to_string(), FirestoreValue::from_integer(value.0)),
            ("y".to_string(), FirestoreValue::from_integer(value.1)),
        ])))
    });
    let decoder = FnDecoder(|value: &FirestoreValue| {
        let point: BTreeMap<String, i64> = codec::decode(value)?;
        Ok((point["x"], point["y"]))
    });

    let encoded = codec::encode_with(&encoder, &(3, 4), true).unwrap();
    let decoded: (i64, i64) = codec::decode_with(&decoder, &encoded).unwrap();
    assert_eq!(decoded, (3, 4));

    let passthrough = codec::encode_with(&Dynamic, &encoded, true).unwrap();
    assert_eq!(passthrough, encoded);
}

#[test]
fn unsupported_values_are_local_errors() {
    let err = codec::encode(&u64::MAX, true).unwrap_err();
    assert_eq!(err.code, FirestoreErrorCode::UnsupportedValue);
    assert!(!err.is_backend_error());

    let err = codec::decode::<i64>(&FirestoreValue::from_string("seven")).unwrap_err();
    assert_eq!(err.code, FirestoreErrorCode::UnsupportedValue);
}
