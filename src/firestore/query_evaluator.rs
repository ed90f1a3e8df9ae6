use std::cmp::Ordering;

use crate::firestore::api::query::{
    Bound, FieldFilter, FilterOperator, LimitType, OrderBy, OrderDirection, QueryDefinition,
};
use crate::firestore::api::DocumentSnapshot;
use crate::firestore::model::FieldPath;
use crate::firestore::value::{ArrayValue, FirestoreValue, MapValue, ValueKind};

/// Applies filters, ordering, cursors and limit of `definition` to candidate
/// documents that already belong to the queried collection.
///
/// Documents missing a field used in the ordering are excluded, like on the
/// backend.
pub(crate) fn apply_query_to_documents(
    documents: Vec<DocumentSnapshot>,
    definition: &QueryDefinition,
) -> Vec<DocumentSnapshot> {
    let order_by = definition.order_by();
    let mut filtered: Vec<DocumentSnapshot> = documents
        .into_iter()
        .filter(|snapshot| snapshot.exists())
        .filter(|snapshot| has_order_fields(snapshot, order_by))
        .filter(|snapshot| document_satisfies_filters(snapshot, definition.filters()))
        .collect();

    filtered.sort_by(|left, right| compare_snapshots(left, right, order_by));

    if let Some(bound) = definition.start_at() {
        filtered.retain(|snapshot| !is_before_start_bound(snapshot, bound, order_by));
    }

    if let Some(bound) = definition.end_at() {
        filtered.retain(|snapshot| !is_after_end_bound(snapshot, bound, order_by));
    }

    if let Some(limit) = definition.limit() {
        let limit = limit as usize;
        match definition.limit_type() {
            LimitType::First => filtered.truncate(limit),
            LimitType::Last => {
                if filtered.len() > limit {
                    let start = filtered.len() - limit;
                    filtered.drain(0..start);
                }
            }
        }
    }

    filtered
}

/// Position of a value's kind in the backend's cross-type ordering.
pub(crate) fn type_order(value: &FirestoreValue) -> u8 {
    match value.kind() {
        ValueKind::Null => 0,
        ValueKind::Boolean(_) => 1,
        ValueKind::Integer(_) | ValueKind::Double(_) => 2,
        ValueKind::Timestamp(_) => 3,
        ValueKind::String(_) => 4,
        ValueKind::Bytes(_) => 5,
        ValueKind::Reference(_) => 6,
        ValueKind::GeoPoint(_) => 7,
        ValueKind::Array(_) => 8,
        ValueKind::Map(_) => 9,
        ValueKind::Sentinel(_) => 10,
    }
}

/// Total order over values: kinds first, then values within a kind.
pub(crate) fn compare_values(left: &FirestoreValue, right: &FirestoreValue) -> Ordering {
    let by_type = type_order(left).cmp(&type_order(right));
    if by_type != Ordering::Equal {
        return by_type;
    }

    match (left.kind(), right.kind()) {
        (ValueKind::Boolean(a), ValueKind::Boolean(b)) => a.cmp(b),
        (ValueKind::Integer(a), ValueKind::Integer(b)) => a.cmp(b),
        (ValueKind::Double(a), ValueKind::Double(b)) => compare_doubles(*a, *b),
        (ValueKind::Integer(a), ValueKind::Double(b)) => compare_doubles(*a as f64, *b),
        (ValueKind::Double(a), ValueKind::Integer(b)) => compare_doubles(*a, *b as f64),
        (ValueKind::Timestamp(a), ValueKind::Timestamp(b)) => a.cmp(b),
        (ValueKind::String(a), ValueKind::String(b)) => a.cmp(b),
        (ValueKind::Bytes(a), ValueKind::Bytes(b)) => a.as_slice().cmp(b.as_slice()),
        (ValueKind::Reference(a), ValueKind::Reference(b)) => a.split('/').cmp(b.split('/')),
        (ValueKind::GeoPoint(a), ValueKind::GeoPoint(b)) => compare_doubles(a.latitude(), b.latitude())
            .then_with(|| compare_doubles(a.longitude(), b.longitude())),
        (ValueKind::Array(a), ValueKind::Array(b)) => compare_arrays(a, b),
        (ValueKind::Map(a), ValueKind::Map(b)) => compare_maps(a, b),
        _ => Ordering::Equal,
    }
}

/// Equality as used by filters: integers and doubles compare numerically and
/// NaN equals NaN.
pub(crate) fn values_equal(left: &FirestoreValue, right: &FirestoreValue) -> bool {
    match (left.kind(), right.kind()) {
        (ValueKind::Array(a), ValueKind::Array(b)) => {
            a.len() == b.len()
                && a.values().iter().zip(b.values()).all(|(l, r)| values_equal(l, r))
        }
        (ValueKind::Map(a), ValueKind::Map(b)) => {
            a.fields().len() == b.fields().len()
                && a.fields().iter().all(|(key, value)| {
                    b.fields()
                        .get(key)
                        .is_some_and(|other| values_equal(value, other))
                })
        }
        (ValueKind::Sentinel(a), ValueKind::Sentinel(b)) => a == b,
        _ => type_order(left) == type_order(right) && compare_values(left, right) == Ordering::Equal,
    }
}

fn compare_doubles(left: f64, right: f64) -> Ordering {
    match (left.is_nan(), right.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => left.partial_cmp(&right).unwrap_or(Ordering::Equal),
    }
}

fn compare_arrays(left: &ArrayValue, right: &ArrayValue) -> Ordering {
    for (l, r) in left.values().iter().zip(right.values()) {
        let ordering = compare_values(l, r);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    left.len().cmp(&right.len())
}

fn compare_maps(left: &MapValue, right: &MapValue) -> Ordering {
    for ((left_key, left_value), (right_key, right_value)) in left.fields().iter().zip(right.fields()) {
        let ordering = left_key
            .cmp(right_key)
            .then_with(|| compare_values(left_value, right_value));
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    left.fields().len().cmp(&right.fields().len())
}

fn document_satisfies_filters(snapshot: &DocumentSnapshot, filters: &[FieldFilter]) -> bool {
    filters
        .iter()
        .all(|filter| evaluate_filter(filter, get_field_value(snapshot, filter.field()).as_ref()))
}

fn evaluate_filter(filter: &FieldFilter, value: Option<&FirestoreValue>) -> bool {
    let expected = filter.value();
    let Some(value) = value else {
        return false;
    };

    match filter.operator() {
        FilterOperator::Equal => values_equal(value, expected),
        FilterOperator::NotEqual => !value.is_null() && !values_equal(value, expected),
        FilterOperator::LessThan => comparable(value, expected, |o| o == Ordering::Less),
        FilterOperator::LessThanOrEqual => comparable(value, expected, |o| o != Ordering::Greater),
        FilterOperator::GreaterThan => comparable(value, expected, |o| o == Ordering::Greater),
        FilterOperator::GreaterThanOrEqual => comparable(value, expected, |o| o != Ordering::Less),
        FilterOperator::ArrayContains => match value.kind() {
            ValueKind::Array(array) => array_contains(array, expected),
            _ => false,
        },
        FilterOperator::ArrayContainsAny => match (value.kind(), expected.kind()) {
            (ValueKind::Array(array), ValueKind::Array(needles)) => needles
                .values()
                .iter()
                .any(|needle| array_contains(array, needle)),
            _ => false,
        },
        FilterOperator::In => match expected.kind() {
            ValueKind::Array(candidates) => array_contains(candidates, value),
            _ => false,
        },
        FilterOperator::NotIn => match expected.kind() {
            ValueKind::Array(candidates) => {
                !array_contains(candidates, &FirestoreValue::null())
                    && !value.is_null()
                    && !array_contains(candidates, value)
            }
            _ => false,
        },
    }
}

fn comparable(value: &FirestoreValue, expected: &FirestoreValue, accept: impl Fn(Ordering) -> bool) -> bool {
    type_order(value) == type_order(expected) && accept(compare_values(value, expected))
}

fn array_contains(array: &ArrayValue, needle: &FirestoreValue) -> bool {
    array.values().iter().any(|candidate| values_equal(candidate, needle))
}

fn get_field_value(snapshot: &DocumentSnapshot, field: &FieldPath) -> Option<FirestoreValue> {
    if field.is_document_id() {
        return Some(FirestoreValue::from_reference(
            snapshot.document_key().canonical_string(),
        ));
    }
    snapshot.map_value()?.get(field).cloned()
}

fn has_order_fields(snapshot: &DocumentSnapshot, order_by: &[OrderBy]) -> bool {
    order_by
        .iter()
        .all(|order| get_field_value(snapshot, order.field()).is_some())
}

fn compare_snapshots(left: &DocumentSnapshot, right: &DocumentSnapshot, order_by: &[OrderBy]) -> Ordering {
    for order in order_by {
        let left_value = get_field_value(left, order.field()).unwrap_or_else(FirestoreValue::null);
        let right_value = get_field_value(right, order.field()).unwrap_or_else(FirestoreValue::null);

        let mut ordering = compare_values(&left_value, &right_value);
        if order.direction() == OrderDirection::Descending {
            ordering = ordering.reverse();
        }
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    left.document_key().cmp(right.document_key())
}

fn is_before_start_bound(snapshot: &DocumentSnapshot, bound: &Bound, order_by: &[OrderBy]) -> bool {
    let ordering = compare_snapshot_to_bound(snapshot, bound, order_by);
    if bound.inclusive() {
        ordering == Ordering::Less
    } else {
        ordering != Ordering::Greater
    }
}

fn is_after_end_bound(snapshot: &DocumentSnapshot, bound: &Bound, order_by: &[OrderBy]) -> bool {
    let ordering = compare_snapshot_to_bound(snapshot, bound, order_by);
    if bound.inclusive() {
        ordering == Ordering::Greater
    } else {
        ordering != Ordering::Less
    }
}

fn compare_snapshot_to_bound(snapshot: &DocumentSnapshot, bound: &Bound, order_by: &[OrderBy]) -> Ordering {
    for (order, bound_value) in order_by.iter().zip(bound.values()) {
        let snapshot_value = get_field_value(snapshot, order.field()).unwrap_or_else(FirestoreValue::null);

        let mut ordering = compare_values(&snapshot_value, bound_value);
        if order.direction() == OrderDirection::Descending {
            ordering = ordering.reverse();
        }

        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}
