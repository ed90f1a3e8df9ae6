mod array_value;
mod bytes_value;
mod field_value;
mod map_value;
mod value;

pub use array_value::ArrayValue;
pub use bytes_value::BytesValue;
pub use field_value::FieldValue;
pub use map_value::MapValue;
pub use value::{FirestoreValue, SentinelValue, ValueKind};
