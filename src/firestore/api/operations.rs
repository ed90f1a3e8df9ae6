use std::collections::{BTreeMap, HashSet};

use crate::firestore::error::{invalid_argument, FirestoreResult};
use crate::firestore::model::{DocumentKey, FieldPath, IntoFieldPath};
use crate::firestore::remote::datastore::{Precondition, WriteOperation};
use crate::firestore::value::{FirestoreValue, MapValue, SentinelValue, ValueKind};

/// How a `set` write combines with the stored document.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum SetOptions {
    /// Replace the whole document.
    #[default]
    Overwrite,
    /// Merge every field present in the written data.
    MergeAll,
    /// Merge only the listed paths; everything else is left untouched.
    MergeFields(Vec<FieldPath>),
}

impl SetOptions {
    pub fn merge() -> Self {
        SetOptions::MergeAll
    }

    /// Builds a field mask from dot-separated strings or [`FieldPath`]s.
    pub fn merge_fields<I, P>(fields: I) -> FirestoreResult<Self>
    where
        I: IntoIterator<Item = P>,
        P: IntoFieldPath,
    {
        let mut unique = Vec::new();
        let mut seen = HashSet::new();
        for field in fields {
            let field = field.into_field_path()?;
            if seen.insert(field.canonical_string()) {
                unique.push(field);
            }
        }
        if unique.is_empty() {
            return Err(invalid_argument("merge_fields requires at least one field path"));
        }
        Ok(SetOptions::MergeFields(unique))
    }

    pub fn merge_field_paths(paths: Vec<FieldPath>) -> FirestoreResult<Self> {
        Self::merge_fields(paths)
    }

    pub fn is_merge(&self) -> bool {
        !matches!(self, SetOptions::Overwrite)
    }
}

/// Describes a single field transform applied during a write.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldTransform {
    field_path: FieldPath,
    operation: TransformOperation,
}

impl FieldTransform {
    pub fn new(field_path: FieldPath, operation: TransformOperation) -> Self {
        Self {
            field_path,
            operation,
        }
    }

    pub fn field_path(&self) -> &FieldPath {
        &self.field_path
    }

    pub fn operation(&self) -> &TransformOperation {
        &self.operation
    }
}

/// Write-time transforms resolved by the backend.
#[derive(Clone, Debug, PartialEq)]
pub enum TransformOperation {
    ServerTimestamp,
    ArrayUnion(Vec<FirestoreValue>),
    ArrayRemove(Vec<FirestoreValue>),
    NumericIncrement(FirestoreValue),
}

/// Where a delete sentinel may appear while walking the written data.
#[derive(Clone, Copy)]
enum DeleteRule {
    Allowed,
    Forbidden(&'static str),
}

#[derive(Default)]
struct ParsedFields {
    transforms: Vec<FieldTransform>,
    field_mask: Vec<FieldPath>,
}

pub(crate) fn set_write(
    key: DocumentKey,
    fields: BTreeMap<String, FirestoreValue>,
    options: &SetOptions,
) -> FirestoreResult<WriteOperation> {
    let rule = if options.is_merge() {
        DeleteRule::Allowed
    } else {
        DeleteRule::Forbidden("FieldValue.delete() cannot be used with set() unless you pass merge")
    };
    let original = MapValue::new(fields);
    let mut parsed = ParsedFields::default();
    let data = sanitize_fields(original.fields(), &[], rule, &mut parsed)?;

    let (mask, transforms) = match options {
        SetOptions::Overwrite => (None, parsed.transforms),
        SetOptions::MergeAll => (Some(parsed.field_mask), parsed.transforms),
        SetOptions::MergeFields(mask) => {
            for path in mask {
                if original.get(path).is_none() {
                    return Err(invalid_argument(format!(
                        "Field '{path}' is specified in your field mask but missing from your input data."
                    )));
                }
            }
            let transforms = parsed
                .transforms
                .into_iter()
                .filter(|transform| mask.iter().any(|path| path.is_prefix_of(transform.field_path())))
                .collect();
            (Some(mask.clone()), transforms)
        }
    };

    Ok(WriteOperation::Set {
        key,
        data: MapValue::new(data),
        mask,
        transforms,
        precondition: Precondition::None,
    })
}

/// Update from an encoded map whose keys are dot-separated field paths.
pub(crate) fn update_write(
    key: DocumentKey,
    fields: BTreeMap<String, FirestoreValue>,
) -> FirestoreResult<WriteOperation> {
    let pairs = fields
        .into_iter()
        .map(|(path, value)| Ok((FieldPath::from_dot_separated(&path)?, value)))
        .collect::<FirestoreResult<Vec<_>>>()?;
    update_fields_write(key, pairs)
}

pub(crate) fn update_fields_write(
    key: DocumentKey,
    pairs: Vec<(FieldPath, FirestoreValue)>,
) -> FirestoreResult<WriteOperation> {
    if pairs.is_empty() {
        return Err(invalid_argument("update() requires at least one field/value pair"));
    }
    ensure_distinct_paths(pairs.iter().map(|(path, _)| path))?;

    let mut data = MapValue::default();
    let mut field_paths = Vec::new();
    let mut parsed = ParsedFields::default();
    for (path, value) in pairs {
        match value.kind() {
            ValueKind::Sentinel(SentinelValue::Delete) => field_paths.push(path),
            _ => {
                let rule =
                    DeleteRule::Forbidden("FieldValue.delete() can only appear at the top level of your update data");
                if let Some(cleaned) = sanitize_value(&value, &path, rule, &mut parsed)? {
                    data.set(&path, cleaned);
                    field_paths.push(path);
                }
            }
        }
    }

    Ok(WriteOperation::Update {
        key,
        data,
        field_paths,
        transforms: parsed.transforms,
        precondition: Precondition::Exists(true),
    })
}

pub(crate) fn delete_write(key: DocumentKey) -> WriteOperation {
    WriteOperation::Delete {
        key,
        precondition: Precondition::None,
    }
}

fn ensure_distinct_paths<'a>(paths: impl Iterator<Item = &'a FieldPath>) -> FirestoreResult<()> {
    let mut seen: Vec<&FieldPath> = Vec::new();
    for path in paths {
        if let Some(other) = seen
            .iter()
            .find(|other| other.is_prefix_of(path) || path.is_prefix_of(other))
        {
            return Err(invalid_argument(format!(
                "Field '{path}' conflicts with field '{other}' in the same update"
            )));
        }
        seen.push(path);
    }
    Ok(())
}

fn sanitize_fields(
    fields: &BTreeMap<String, FirestoreValue>,
    parent: &[String],
    rule: DeleteRule,
    parsed: &mut ParsedFields,
) -> FirestoreResult<BTreeMap<String, FirestoreValue>> {
    let mut cleaned = BTreeMap::new();
    for (name, value) in fields {
        let mut segments = parent.to_vec();
        segments.push(name.clone());
        let path = FieldPath::new(segments)?;
        if let Some(value) = sanitize_value(value, &path, rule, parsed)? {
            cleaned.insert(name.clone(), value);
        }
    }
    Ok(cleaned)
}

/// Strips sentinels out of `value`, recording transforms and mask paths.
/// Returns `None` when nothing is left to store at `path`.
fn sanitize_value(
    value: &FirestoreValue,
    path: &FieldPath,
    rule: DeleteRule,
    parsed: &mut ParsedFields,
) -> FirestoreResult<Option<FirestoreValue>> {
    match value.kind() {
        ValueKind::Sentinel(SentinelValue::Delete) => match rule {
            DeleteRule::Allowed => {
                parsed.field_mask.push(path.clone());
                Ok(None)
            }
            DeleteRule::Forbidden(message) => Err(invalid_argument(format!("{message} (found in field {path})"))),
        },
        ValueKind::Sentinel(sentinel) => {
            parsed.transforms.push(transform_from_sentinel(path, sentinel)?);
            Ok(None)
        }
        ValueKind::Map(map) => {
            if map.is_empty() {
                parsed.field_mask.push(path.clone());
            }
            let nested = sanitize_fields(map.fields(), path.segments(), rule, parsed)?;
            Ok(Some(FirestoreValue::from_map(nested)))
        }
        ValueKind::Array(_) => {
            assert_no_sentinel_in_value(value, path)?;
            parsed.field_mask.push(path.clone());
            Ok(Some(value.clone()))
        }
        _ => {
            parsed.field_mask.push(path.clone());
            Ok(Some(value.clone()))
        }
    }
}

fn transform_from_sentinel(path: &FieldPath, sentinel: &SentinelValue) -> FirestoreResult<FieldTransform> {
    let operation = match sentinel {
        SentinelValue::ServerTimestamp => TransformOperation::ServerTimestamp,
        SentinelValue::ArrayUnion(elements) | SentinelValue::ArrayRemove(elements) => {
            for element in elements {
                assert_no_sentinel_in_value(element, path)?;
            }
            if matches!(sentinel, SentinelValue::ArrayUnion(_)) {
                TransformOperation::ArrayUnion(elements.clone())
            } else {
                TransformOperation::ArrayRemove(elements.clone())
            }
        }
        SentinelValue::NumericIncrement(operand) => match operand.kind() {
            ValueKind::Integer(_) | ValueKind::Double(_) => TransformOperation::NumericIncrement((**operand).clone()),
            _ => return Err(invalid_argument("FieldValue.increment() requires a numeric operand")),
        },
        SentinelValue::Delete => {
            return Err(invalid_argument(format!(
                "FieldValue.delete() is not supported in field {path}"
            )))
        }
    };
    Ok(FieldTransform::new(path.clone(), operation))
}

fn assert_no_sentinel_in_value(value: &FirestoreValue, context: &FieldPath) -> FirestoreResult<()> {
    match value.kind() {
        ValueKind::Sentinel(_) => Err(invalid_argument(format!(
            "Invalid data. FieldValue sentinels cannot be used inside arrays (field '{context}')."
        ))),
        ValueKind::Array(array) => array
            .values()
            .iter()
            .try_for_each(|element| assert_no_sentinel_in_value(element, context)),
        ValueKind::Map(map) => map
            .fields()
            .values()
            .try_for_each(|element| assert_no_sentinel_in_value(element, context)),
        _ => Ok(()),
    }
}
