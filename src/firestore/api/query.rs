use std::cmp::Ordering;

use serde::Serialize;

use crate::firestore::codec;
use crate::firestore::constants::MAX_DISJUNCTION_VALUES;
use crate::firestore::error::{invalid_argument, FirestoreResult};
use crate::firestore::model::{DocumentKey, FieldPath, IntoFieldPath, ResourcePath};
use crate::firestore::query_evaluator::compare_values;
use crate::firestore::value::{FirestoreValue, ValueKind};

use super::listen::QuerySnapshotStream;
use super::snapshot::{compute_changes, DocumentChange, DocumentSnapshot, SnapshotMetadata};
use super::Firestore;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    LessThan,
    LessThanOrEqual,
    Equal,
    NotEqual,
    GreaterThanOrEqual,
    GreaterThan,
    ArrayContains,
    In,
    NotIn,
    ArrayContainsAny,
}

impl FilterOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::LessThan => "<",
            FilterOperator::LessThanOrEqual => "<=",
            FilterOperator::Equal => "==",
            FilterOperator::NotEqual => "!=",
            FilterOperator::GreaterThanOrEqual => ">=",
            FilterOperator::GreaterThan => ">",
            FilterOperator::ArrayContains => "array-contains",
            FilterOperator::In => "in",
            FilterOperator::NotIn => "not-in",
            FilterOperator::ArrayContainsAny => "array-contains-any",
        }
    }

    /// Operators that add an implicit ordering on their field.
    pub(crate) fn is_inequality(&self) -> bool {
        matches!(
            self,
            FilterOperator::LessThan
                | FilterOperator::LessThanOrEqual
                | FilterOperator::GreaterThan
                | FilterOperator::GreaterThanOrEqual
                | FilterOperator::NotEqual
                | FilterOperator::NotIn
        )
    }

    fn takes_list(&self) -> bool {
        matches!(
            self,
            FilterOperator::In | FilterOperator::NotIn | FilterOperator::ArrayContainsAny
        )
    }

    fn conflicts_with(&self) -> &'static [FilterOperator] {
        use FilterOperator::*;
        match self {
            NotEqual => &[NotEqual, NotIn],
            NotIn => &[ArrayContainsAny, In, NotIn, NotEqual],
            ArrayContains => &[ArrayContains, ArrayContainsAny],
            ArrayContainsAny => &[ArrayContains, ArrayContainsAny, NotIn],
            In => &[NotIn],
            _ => &[],
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum OrderDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LimitType {
    #[default]
    First,
    Last,
}

/// A single `field op value` predicate.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldFilter {
    field: FieldPath,
    operator: FilterOperator,
    value: FirestoreValue,
}

impl FieldFilter {
    pub fn field(&self) -> &FieldPath {
        &self.field
    }

    pub fn operator(&self) -> FilterOperator {
        self.operator
    }

    pub fn value(&self) -> &FirestoreValue {
        &self.value
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    field: FieldPath,
    direction: OrderDirection,
}

impl OrderBy {
    pub fn field(&self) -> &FieldPath {
        &self.field
    }

    pub fn direction(&self) -> OrderDirection {
        self.direction
    }
}

/// A resolved cursor position: one value per ordering field.
#[derive(Clone, Debug, PartialEq)]
pub struct Bound {
    values: Vec<FirestoreValue>,
    inclusive: bool,
}

impl Bound {
    pub fn values(&self) -> &[FirestoreValue] {
        &self.values
    }

    pub fn inclusive(&self) -> bool {
        self.inclusive
    }
}

/// Range and membership predicates applied together to one field.
///
/// Every clause that is present becomes its own filter.
#[derive(Clone, Debug, Default)]
pub struct RangeFilter {
    pub less_than: Option<FirestoreValue>,
    pub greater_than: Option<FirestoreValue>,
    pub array_contains: Option<FirestoreValue>,
}

/// List predicates applied together to one field.
#[derive(Clone, Debug, Default)]
pub struct AnyOfFilter {
    pub in_list: Option<Vec<FirestoreValue>>,
    pub array_contains_any: Option<Vec<FirestoreValue>>,
}

#[derive(Clone, Debug)]
enum CursorPosition {
    Values(Vec<FirestoreValue>),
    Snapshot(Box<DocumentSnapshot>),
}

#[derive(Clone, Debug)]
struct Cursor {
    position: CursorPosition,
    inclusive: bool,
}

/// Immutable description of a collection query.
///
/// Every clause method returns a new query and leaves the receiver as it was.
/// Cursor arity and snapshot cursors are checked when the query runs.
#[derive(Clone, Debug)]
pub struct Query {
    firestore: Firestore,
    collection_path: ResourcePath,
    collection_group: Option<String>,
    filters: Vec<FieldFilter>,
    order_by: Vec<OrderBy>,
    limit: Option<u32>,
    limit_type: LimitType,
    start: Option<Cursor>,
    end: Option<Cursor>,
}

impl Query {
    pub(crate) fn new(firestore: Firestore, collection_path: ResourcePath) -> FirestoreResult<Self> {
        if !collection_path.is_collection() {
            return Err(invalid_argument(format!(
                "Invalid collection path '{collection_path}': collections need an odd number of segments"
            )));
        }
        Ok(Self::with_parts(firestore, collection_path, None))
    }

    pub(crate) fn new_collection_group(firestore: Firestore, collection_id: &str) -> FirestoreResult<Self> {
        if collection_id.is_empty() || collection_id.contains('/') {
            return Err(invalid_argument(format!(
                "Invalid collection ID '{collection_id}' passed to collection_group(). Collection IDs must be non-empty and must not contain '/'."
            )));
        }
        Ok(Self::with_parts(
            firestore,
            ResourcePath::root(),
            Some(collection_id.to_string()),
        ))
    }

    /// Collection query for a path already known to be a collection.
    pub(crate) fn with_collection(firestore: Firestore, collection_path: ResourcePath) -> Self {
        Self::with_parts(firestore, collection_path, None)
    }

    fn with_parts(firestore: Firestore, collection_path: ResourcePath, collection_group: Option<String>) -> Self {
        Self {
            firestore,
            collection_path,
            collection_group,
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            limit_type: LimitType::First,
            start: None,
            end: None,
        }
    }

    pub fn firestore(&self) -> &Firestore {
        &self.firestore
    }

    /// Collection path of a collection query; the root for collection groups.
    pub fn collection_path(&self) -> &ResourcePath {
        &self.collection_path
    }

    pub fn collection_id(&self) -> &str {
        match &self.collection_group {
            Some(id) => id,
            None => self.collection_path.last_segment().unwrap_or_default(),
        }
    }

    pub fn is_collection_group(&self) -> bool {
        self.collection_group.is_some()
    }

    pub fn where_field(
        &self,
        field: impl IntoFieldPath,
        operator: FilterOperator,
        value: impl Serialize,
    ) -> FirestoreResult<Query> {
        let field = field.into_field_path()?;
        let value = encode_query_value(&value)?;
        let mut next = self.clone();
        next.push_filter(field, operator, value)?;
        Ok(next)
    }

    pub fn where_equal_to(&self, field: impl IntoFieldPath, value: impl Serialize) -> FirestoreResult<Query> {
        self.where_field(field, FilterOperator::Equal, value)
    }

    pub fn where_not_equal_to(&self, field: impl IntoFieldPath, value: impl Serialize) -> FirestoreResult<Query> {
        self.where_field(field, FilterOperator::NotEqual, value)
    }

    pub fn where_less_than(&self, field: impl IntoFieldPath, value: impl Serialize) -> FirestoreResult<Query> {
        self.where_field(field, FilterOperator::LessThan, value)
    }

    pub fn where_less_than_or_equal(&self, field: impl IntoFieldPath, value: impl Serialize) -> FirestoreResult<Query> {
        self.where_field(field, FilterOperator::LessThanOrEqual, value)
    }

    pub fn where_greater_than(&self, field: impl IntoFieldPath, value: impl Serialize) -> FirestoreResult<Query> {
        self.where_field(field, FilterOperator::GreaterThan, value)
    }

    pub fn where_greater_than_or_equal(
        &self,
        field: impl IntoFieldPath,
        value: impl Serialize,
    ) -> FirestoreResult<Query> {
        self.where_field(field, FilterOperator::GreaterThanOrEqual, value)
    }

    pub fn where_array_contains(&self, field: impl IntoFieldPath, value: impl Serialize) -> FirestoreResult<Query> {
        self.where_field(field, FilterOperator::ArrayContains, value)
    }

    pub fn where_in(&self, field: impl IntoFieldPath, values: impl Serialize) -> FirestoreResult<Query> {
        self.where_field(field, FilterOperator::In, values)
    }

    pub fn where_not_in(&self, field: impl IntoFieldPath, values: impl Serialize) -> FirestoreResult<Query> {
        self.where_field(field, FilterOperator::NotIn, values)
    }

    pub fn where_array_contains_any(&self, field: impl IntoFieldPath, values: impl Serialize) -> FirestoreResult<Query> {
        self.where_field(field, FilterOperator::ArrayContainsAny, values)
    }

    /// Adds `<`, `>` and `array-contains` filters on `field` for every clause
    /// that is set.
    pub fn where_range(&self, field: impl IntoFieldPath, range: RangeFilter) -> FirestoreResult<Query> {
        let field = field.into_field_path()?;
        let clauses = [
            (FilterOperator::LessThan, range.less_than),
            (FilterOperator::GreaterThan, range.greater_than),
            (FilterOperator::ArrayContains, range.array_contains),
        ];
        self.push_clauses(field, clauses)
    }

    /// Adds `in` and `array-contains-any` filters on `field` for every list
    /// that is set.
    pub fn where_any_of(&self, field: impl IntoFieldPath, any_of: AnyOfFilter) -> FirestoreResult<Query> {
        let field = field.into_field_path()?;
        let clauses = [
            (FilterOperator::In, any_of.in_list.map(FirestoreValue::from_array)),
            (
                FilterOperator::ArrayContainsAny,
                any_of.array_contains_any.map(FirestoreValue::from_array),
            ),
        ];
        self.push_clauses(field, clauses)
    }

    fn push_clauses<const N: usize>(
        &self,
        field: FieldPath,
        clauses: [(FilterOperator, Option<FirestoreValue>); N],
    ) -> FirestoreResult<Query> {
        let mut next = self.clone();
        for (operator, value) in clauses {
            if let Some(value) = value {
                let value = encode_query_value(&value)?;
                next.push_filter(field.clone(), operator, value)?;
            }
        }
        Ok(next)
    }

    pub fn order_by(&self, field: impl IntoFieldPath, direction: OrderDirection) -> FirestoreResult<Query> {
        let field = field.into_field_path()?;
        let mut next = self.clone();
        next.order_by.push(OrderBy { field, direction });
        Ok(next)
    }

    /// Keeps the first `limit` results.
    pub fn limit(&self, limit: u32) -> FirestoreResult<Query> {
        self.with_limit(limit, LimitType::First)
    }

    /// Keeps the last `limit` results. Requires an explicit `order_by`.
    pub fn limit_to_last(&self, limit: u32) -> FirestoreResult<Query> {
        self.with_limit(limit, LimitType::Last)
    }

    fn with_limit(&self, limit: u32, limit_type: LimitType) -> FirestoreResult<Query> {
        if limit == 0 {
            return Err(invalid_argument(format!(
                "Invalid Query. Query limit ({limit}) is invalid. Limit must be positive."
            )));
        }
        let mut next = self.clone();
        next.limit = Some(limit);
        next.limit_type = limit_type;
        Ok(next)
    }

    pub fn start_at(&self, values: Vec<FirestoreValue>) -> Query {
        self.with_start(CursorPosition::Values(values), true)
    }

    pub fn start_after(&self, values: Vec<FirestoreValue>) -> Query {
        self.with_start(CursorPosition::Values(values), false)
    }

    pub fn end_at(&self, values: Vec<FirestoreValue>) -> Query {
        self.with_end(CursorPosition::Values(values), true)
    }

    pub fn end_before(&self, values: Vec<FirestoreValue>) -> Query {
        self.with_end(CursorPosition::Values(values), false)
    }

    /// Cursor values taken from any serializable tuple or sequence.
    pub fn start_at_values(&self, values: impl Serialize) -> FirestoreResult<Query> {
        Ok(self.start_at(encode_cursor_values(&values)?))
    }

    pub fn start_after_values(&self, values: impl Serialize) -> FirestoreResult<Query> {
        Ok(self.start_after(encode_cursor_values(&values)?))
    }

    pub fn end_at_values(&self, values: impl Serialize) -> FirestoreResult<Query> {
        Ok(self.end_at(encode_cursor_values(&values)?))
    }

    pub fn end_before_values(&self, values: impl Serialize) -> FirestoreResult<Query> {
        Ok(self.end_before(encode_cursor_values(&values)?))
    }

    pub fn start_at_snapshot(&self, snapshot: &DocumentSnapshot) -> Query {
        self.with_start(CursorPosition::Snapshot(Box::new(snapshot.clone())), true)
    }

    pub fn start_after_snapshot(&self, snapshot: &DocumentSnapshot) -> Query {
        self.with_start(CursorPosition::Snapshot(Box::new(snapshot.clone())), false)
    }

    pub fn end_at_snapshot(&self, snapshot: &DocumentSnapshot) -> Query {
        self.with_end(CursorPosition::Snapshot(Box::new(snapshot.clone())), true)
    }

    pub fn end_before_snapshot(&self, snapshot: &DocumentSnapshot) -> Query {
        self.with_end(CursorPosition::Snapshot(Box::new(snapshot.clone())), false)
    }

    fn with_start(&self, position: CursorPosition, inclusive: bool) -> Query {
        let mut next = self.clone();
        next.start = Some(Cursor { position, inclusive });
        next
    }

    fn with_end(&self, position: CursorPosition, inclusive: bool) -> Query {
        let mut next = self.clone();
        next.end = Some(Cursor { position, inclusive });
        next
    }

    /// Runs the query once.
    pub async fn get(&self) -> FirestoreResult<QuerySnapshot> {
        let definition = self.definition()?;
        let documents = self.firestore.datastore().run_query(&definition).await?;
        let metadata = SnapshotMetadata::new(
            documents.iter().any(DocumentSnapshot::from_cache),
            documents.iter().any(DocumentSnapshot::has_pending_writes),
        );
        let changes = compute_changes(&[], &documents);
        Ok(QuerySnapshot::new(self.clone(), documents, changes, metadata))
    }

    /// Listens to the query results. The definition is validated before the
    /// listener is attached.
    pub fn snapshots(&self) -> FirestoreResult<QuerySnapshotStream> {
        let definition = self.definition()?;
        QuerySnapshotStream::open(self.clone(), definition)
    }

    /// Whether both queries target the same database and resolve to the same
    /// definition. Invalid queries are never equivalent.
    pub fn is_equivalent(&self, other: &Query) -> bool {
        if !self.firestore.same_instance(&other.firestore) {
            return false;
        }
        match (self.definition(), other.definition()) {
            (Ok(left), Ok(right)) => left == right,
            _ => false,
        }
    }

    fn push_filter(&mut self, field: FieldPath, operator: FilterOperator, value: FirestoreValue) -> FirestoreResult<()> {
        validate_filter_value(&field, operator, &value)?;
        for existing in &self.filters {
            if operator.conflicts_with().contains(&existing.operator) {
                let message = if existing.operator == operator {
                    format!("Invalid query. You cannot use more than one '{}' filter.", operator.as_str())
                } else {
                    format!(
                        "Invalid query. You cannot use '{}' filters with '{}' filters.",
                        operator.as_str(),
                        existing.operator.as_str()
                    )
                };
                return Err(invalid_argument(message));
            }
        }
        let value = if field.is_document_id() {
            self.document_id_value(operator, value)?
        } else {
            value
        };
        self.filters.push(FieldFilter { field, operator, value });
        Ok(())
    }

    fn document_id_value(&self, operator: FilterOperator, value: FirestoreValue) -> FirestoreResult<FirestoreValue> {
        match operator {
            FilterOperator::ArrayContains | FilterOperator::ArrayContainsAny => Err(invalid_argument(format!(
                "Invalid Query. You can't perform '{}' queries on documentId().",
                operator.as_str()
            ))),
            FilterOperator::In | FilterOperator::NotIn => match value.into_kind() {
                ValueKind::Array(array) => Ok(FirestoreValue::from_array(
                    array
                        .into_values()
                        .into_iter()
                        .map(|value| self.document_id_reference(value))
                        .collect::<FirestoreResult<Vec<_>>>()?,
                )),
                other => Err(invalid_argument(format!(
                    "Invalid Query. A non-empty array is required for '{}' filters, found {}",
                    operator.as_str(),
                    other.type_name()
                ))),
            },
            _ => self.document_id_reference(value),
        }
    }

    /// Turns a document ID (or full path for collection groups) into the
    /// reference value documents are compared against.
    fn document_id_reference(&self, value: FirestoreValue) -> FirestoreResult<FirestoreValue> {
        match value.kind() {
            ValueKind::Reference(_) => Ok(value),
            ValueKind::String(id) if id.is_empty() => Err(invalid_argument(
                "Invalid query. When querying with documentId(), you must provide a valid document ID, but it was an empty string.",
            )),
            ValueKind::String(id) => {
                if self.collection_group.is_none() && id.contains('/') {
                    return Err(invalid_argument(format!(
                        "Invalid query. When querying a collection by documentId(), you must provide a plain document ID, but '{id}' contains a '/' character."
                    )));
                }
                let path = self.collection_path.append(&ResourcePath::from_string(id)?);
                let key = DocumentKey::from_path(path)?;
                Ok(FirestoreValue::from_reference(key.canonical_string()))
            }
            other => Err(invalid_argument(format!(
                "Invalid query. When querying with documentId(), you must provide a valid string or a DocumentReference, but it was of type: {}",
                other.type_name()
            ))),
        }
    }

    /// Resolves the query into the form the backend evaluates.
    ///
    /// The ordering is the explicit `order_by` clauses, then every inequality
    /// field not already ordered, then the document name. Cursor values are
    /// validated against that ordering here rather than when the cursor was
    /// attached.
    pub(crate) fn definition(&self) -> FirestoreResult<QueryDefinition> {
        if self.limit_type == LimitType::Last && self.order_by.is_empty() {
            return Err(invalid_argument(
                "limit_to_last() queries require specifying at least one order_by() clause",
            ));
        }

        let order_by = self.normalized_order_by();
        let start_at = self
            .start
            .as_ref()
            .map(|cursor| self.resolve_cursor(cursor, &order_by, "start_at"))
            .transpose()?;
        let end_at = self
            .end
            .as_ref()
            .map(|cursor| self.resolve_cursor(cursor, &order_by, "end_at"))
            .transpose()?;

        let mut filters = self.filters.clone();
        filters.sort_by(compare_filters);

        Ok(QueryDefinition {
            collection_path: self.collection_path.clone(),
            collection_group: self.collection_group.clone(),
            filters,
            order_by,
            limit: self.limit,
            limit_type: self.limit_type,
            start_at,
            end_at,
        })
    }

    fn normalized_order_by(&self) -> Vec<OrderBy> {
        let mut order_by = self.order_by.clone();
        let direction = order_by.last().map(OrderBy::direction).unwrap_or_default();

        let mut inequality_fields: Vec<&FieldPath> = self
            .filters
            .iter()
            .filter(|filter| filter.operator.is_inequality())
            .map(FieldFilter::field)
            .collect();
        inequality_fields.sort_by(|left, right| left.segments().cmp(right.segments()));
        inequality_fields.dedup();

        for field in inequality_fields {
            if !field.is_document_id() && !order_by.iter().any(|order| &order.field == field) {
                order_by.push(OrderBy {
                    field: field.clone(),
                    direction,
                });
            }
        }
        if !order_by.iter().any(|order| order.field.is_document_id()) {
            order_by.push(OrderBy {
                field: FieldPath::document_id(),
                direction,
            });
        }
        order_by
    }

    fn resolve_cursor(&self, cursor: &Cursor, order_by: &[OrderBy], method: &str) -> FirestoreResult<Bound> {
        let values = match &cursor.position {
            CursorPosition::Values(values) => {
                if values.len() != self.order_by.len() {
                    return Err(invalid_argument(format!(
                        "Invalid query. {method}() was given {} value(s) but the query has {} order_by() clause(s); the counts must match.",
                        values.len(),
                        self.order_by.len()
                    )));
                }
                values
                    .iter()
                    .zip(order_by)
                    .map(|(value, order)| {
                        if order.field.is_document_id() {
                            self.document_id_reference(value.clone())
                        } else {
                            Ok(value.clone())
                        }
                    })
                    .collect::<FirestoreResult<Vec<_>>>()?
            }
            CursorPosition::Snapshot(snapshot) => {
                if !snapshot.exists() {
                    return Err(invalid_argument(format!(
                        "Invalid query. You are trying to start or end a query using a document that doesn't exist ({}).",
                        snapshot.document_key().canonical_string()
                    )));
                }
                order_by
                    .iter()
                    .map(|order| {
                        if order.field.is_document_id() {
                            return Ok(FirestoreValue::from_reference(
                                snapshot.document_key().canonical_string(),
                            ));
                        }
                        snapshot.field(&order.field)?.cloned().ok_or_else(|| {
                            invalid_argument(format!(
                                "Invalid query. You are trying to start or end a query using a document for which the field '{}' (used as the order_by) does not exist.",
                                order.field
                            ))
                        })
                    })
                    .collect::<FirestoreResult<Vec<_>>>()?
            }
        };
        Ok(Bound {
            values,
            inclusive: cursor.inclusive,
        })
    }
}

fn encode_query_value(value: &(impl Serialize + ?Sized)) -> FirestoreResult<FirestoreValue> {
    let encoded = codec::encode(value, true)?;
    reject_sentinels(&encoded)?;
    Ok(encoded)
}

fn encode_cursor_values(values: &(impl Serialize + ?Sized)) -> FirestoreResult<Vec<FirestoreValue>> {
    let encoded = encode_query_value(values)?;
    match encoded.into_kind() {
        ValueKind::Array(array) => Ok(array.into_values()),
        other => Ok(vec![FirestoreValue::from_kind(other)]),
    }
}

fn reject_sentinels(value: &FirestoreValue) -> FirestoreResult<()> {
    match value.kind() {
        ValueKind::Sentinel(_) => Err(invalid_argument(
            "Invalid query. FieldValue sentinels are not allowed in query filters or cursors.",
        )),
        ValueKind::Array(array) => array.values().iter().try_for_each(reject_sentinels),
        ValueKind::Map(map) => map.fields().values().try_for_each(reject_sentinels),
        _ => Ok(()),
    }
}

fn validate_filter_value(field: &FieldPath, operator: FilterOperator, value: &FirestoreValue) -> FirestoreResult<()> {
    if operator.takes_list() {
        let ValueKind::Array(array) = value.kind() else {
            return Err(invalid_argument(format!(
                "Invalid Query. A non-empty array is required for '{}' filters on '{field}'.",
                operator.as_str()
            )));
        };
        if array.is_empty() {
            return Err(invalid_argument(format!(
                "Invalid Query. A non-empty array is required for '{}' filters on '{field}'.",
                operator.as_str()
            )));
        }
        if array.len() > MAX_DISJUNCTION_VALUES {
            return Err(invalid_argument(format!(
                "Invalid Query. '{}' filters support a maximum of {MAX_DISJUNCTION_VALUES} elements in the value array.",
                operator.as_str()
            )));
        }
        return Ok(());
    }

    let is_nan = matches!(value.kind(), ValueKind::Double(number) if number.is_nan());
    if (value.is_null() || is_nan) && !matches!(operator, FilterOperator::Equal | FilterOperator::NotEqual) {
        let kind = if is_nan { "NaN" } else { "Null" };
        return Err(invalid_argument(format!(
            "Invalid query. {kind} only supports '==' and '!=' comparisons (field '{field}')."
        )));
    }
    Ok(())
}

/// A query resolved for execution.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryDefinition {
    collection_path: ResourcePath,
    collection_group: Option<String>,
    filters: Vec<FieldFilter>,
    order_by: Vec<OrderBy>,
    limit: Option<u32>,
    limit_type: LimitType,
    start_at: Option<Bound>,
    end_at: Option<Bound>,
}

impl QueryDefinition {
    pub fn collection_path(&self) -> &ResourcePath {
        &self.collection_path
    }

    pub fn collection_group(&self) -> Option<&str> {
        self.collection_group.as_deref()
    }

    pub fn filters(&self) -> &[FieldFilter] {
        &self.filters
    }

    /// Explicit ordering followed by the implicit one.
    pub fn order_by(&self) -> &[OrderBy] {
        &self.order_by
    }

    pub fn limit(&self) -> Option<u32> {
        self.limit
    }

    pub fn limit_type(&self) -> LimitType {
        self.limit_type
    }

    pub fn start_at(&self) -> Option<&Bound> {
        self.start_at.as_ref()
    }

    pub fn end_at(&self) -> Option<&Bound> {
        self.end_at.as_ref()
    }

    /// Whether a document lives in a collection this query reads.
    pub fn matches_collection(&self, key: &DocumentKey) -> bool {
        match &self.collection_group {
            Some(collection_id) => {
                key.collection_id() == collection_id && self.collection_path.is_prefix_of(key.path())
            }
            None => key.collection_path() == self.collection_path,
        }
    }
}

/// Results of running a query, with the changes since the previous emission.
#[derive(Clone, Debug)]
pub struct QuerySnapshot {
    query: Query,
    documents: Vec<DocumentSnapshot>,
    changes: Vec<DocumentChange>,
    metadata: SnapshotMetadata,
}

impl QuerySnapshot {
    pub(crate) fn new(
        query: Query,
        documents: Vec<DocumentSnapshot>,
        changes: Vec<DocumentChange>,
        metadata: SnapshotMetadata,
    ) -> Self {
        Self {
            query,
            documents,
            changes,
            metadata,
        }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn documents(&self) -> &[DocumentSnapshot] {
        &self.documents
    }

    pub fn document_changes(&self) -> &[DocumentChange] {
        &self.changes
    }

    pub fn metadata(&self) -> &SnapshotMetadata {
        &self.metadata
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Decodes every document into `T`.
    pub fn decode_all<T>(&self) -> FirestoreResult<Vec<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        self.documents
            .iter()
            .filter_map(|doc| doc.data_as::<T>().transpose())
            .collect()
    }

    pub fn into_documents(self) -> Vec<DocumentSnapshot> {
        self.documents
    }
}

impl IntoIterator for QuerySnapshot {
    type Item = DocumentSnapshot;
    type IntoIter = std::vec::IntoIter<DocumentSnapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.into_iter()
    }
}

/// Filters form a conjunction; a canonical order makes equivalent queries
/// resolve to equal definitions.
fn compare_filters(left: &FieldFilter, right: &FieldFilter) -> Ordering {
    left.field
        .segments()
        .cmp(right.field.segments())
        .then_with(|| left.operator.as_str().cmp(right.operator.as_str()))
        .then_with(|| compare_values(&left.value, &right.value))
}
