use serde::{Deserialize, Serialize};
use typed_firestore::firestore::{
    Firestore, FirestoreErrorCode, FirestoreValue, OrderDirection, Query, SetOptions,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct City {
    name: String,
    state: String,
    population: i64,
}

fn city(name: &str, state: &str, population: i64) -> City {
    City {
        name: name.into(),
        state: state.into(),
        population,
    }
}

async fn seeded() -> Firestore {
    let firestore = Firestore::in_memory("queries");
    let cities = firestore.collection("cities").unwrap();
    for (id, value) in [
        ("sf", city("San Francisco", "CA", 860_000)),
        ("la", city("Los Angeles", "CA", 3_900_000)),
        ("dc", city("Washington", "DC", 680_000)),
        ("tok", city("Tokyo", "JP", 9_000_000)),
        ("bj", city("Beijing", "BJ", 21_500_000)),
    ] {
        cities
            .doc(Some(id))
            .unwrap()
            .set(&value, true, SetOptions::Overwrite)
            .await
            .unwrap();
    }
    firestore
}

fn names(cities: Vec<City>) -> Vec<String> {
    cities.into_iter().map(|city| city.name).collect()
}

#[tokio::test]
async fn builder_calls_do_not_mutate_the_base_query() {
    let firestore = seeded().await;
    let base: Query = firestore.collection("cities").unwrap().query();
    let californian = base.where_equal_to("state", "CA").unwrap();
    let limited = californian.limit(1).unwrap();

    assert_eq!(base.get().await.unwrap().len(), 5);
    assert_eq!(californian.get().await.unwrap().len(), 2);
    assert_eq!(limited.get().await.unwrap().len(), 1);
    assert!(!base.is_equivalent(&californian));
    assert!(californian.is_equivalent(&base.where_equal_to("state", "CA").unwrap()));
}

#[tokio::test]
async fn filters_order_and_limit() {
    let firestore = seeded().await;
    let cities = firestore.collection("cities").unwrap();

    let big = cities
        .where_greater_than("population", 1_000_000)
        .unwrap()
        .order_by("population", OrderDirection::Descending)
        .unwrap()
        .limit(2)
        .unwrap()
        .get()
        .await
        .unwrap();
    assert_eq!(names(big.decode_all().unwrap()), ["Beijing", "Tokyo"]);

    let in_states = cities
        .where_in("state", ["DC", "JP"])
        .unwrap()
        .order_by("name", OrderDirection::Ascending)
        .unwrap()
        .get()
        .await
        .unwrap();
    assert_eq!(names(in_states.decode_all().unwrap()), ["Tokyo", "Washington"]);

    let last = cities
        .order_by("population", OrderDirection::Ascending)
        .unwrap()
        .limit_to_last(2)
        .unwrap()
        .get()
        .await
        .unwrap();
    assert_eq!(names(last.decode_all().unwrap()), ["Tokyo", "Beijing"]);
}

#[tokio::test]
async fn cursors_page_through_results() {
    let firestore = seeded().await;
    let ordered = firestore
        .collection("cities")
        .unwrap()
        .order_by("population", OrderDirection::Ascending)
        .unwrap();

    let first_page = ordered.limit(2).unwrap().get().await.unwrap();
    let last_seen = first_page.documents().last().unwrap().clone();
    let second_page = ordered
        .start_after_snapshot(&last_seen)
        .limit(2)
        .unwrap()
        .get()
        .await
        .unwrap();
    assert_eq!(names(second_page.decode_all().unwrap()), ["Los Angeles", "Tokyo"]);

    let bounded = ordered
        .start_at(vec![FirestoreValue::from_integer(860_000)])
        .end_before_values((9_000_000,))
        .unwrap()
        .get()
        .await
        .unwrap();
    assert_eq!(names(bounded.decode_all().unwrap()), ["San Francisco", "Los Angeles"]);
}

#[tokio::test]
async fn cursor_with_more_values_than_orderings_is_rejected() {
    let firestore = seeded().await;
    let query = firestore
        .collection("cities")
        .unwrap()
        .order_by("state", OrderDirection::Ascending)
        .unwrap()
        .start_at(vec![FirestoreValue::from_string("CA"), FirestoreValue::from_integer(1)]);
    let err = query.get().await.unwrap_err();
    assert_eq!(err.code, FirestoreErrorCode::InvalidArgument);
    assert!(query.snapshots().is_err());
}

#[tokio::test]
async fn collection_groups_span_parents() {
    let firestore = seeded().await;
    for (parent, id) in [("sf", "golden-gate"), ("tok", "tower")] {
        firestore
            .doc(&format!("cities/{parent}/landmarks/{id}"))
            .unwrap()
            .set(&serde_json::json!({"name": id}), true, SetOptions::Overwrite)
            .await
            .unwrap();
    }
    let landmarks = firestore.collection_group("landmarks").unwrap().get().await.unwrap();
    assert_eq!(landmarks.len(), 2);
    assert!(landmarks.documents().iter().all(|doc| doc.document_key().collection_path().last_segment() == Some("landmarks")));
}
