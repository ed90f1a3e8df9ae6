pub(crate) const DEFAULT_DATABASE_ID: &str = "(default)";
pub(crate) const DOCUMENT_ID_FIELD: &str = "__name__";
pub(crate) const AUTO_ID_LENGTH: usize = 20;
pub(crate) const MAX_BATCH_WRITES: usize = 500;
pub(crate) const MAX_DISJUNCTION_VALUES: usize = 30;

pub const DEFAULT_HOST: &str = "firestore.googleapis.com";
pub const CACHE_SIZE_UNLIMITED: i64 = -1;
pub const DEFAULT_CACHE_SIZE_BYTES: i64 = 100 * 1024 * 1024;
