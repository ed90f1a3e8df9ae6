use serde::{Deserialize, Serialize};

use crate::firestore::constants::{CACHE_SIZE_UNLIMITED, DEFAULT_CACHE_SIZE_BYTES, DEFAULT_HOST};
use crate::firestore::error::{invalid_argument, FirestoreResult};

const MINIMUM_CACHE_SIZE_BYTES: i64 = 1024 * 1024;

/// Client configuration. Missing JSON keys take their default values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FirestoreSettings {
    pub host: String,
    pub ssl_enabled: bool,
    pub persistence_enabled: bool,
    /// Local cache budget; [`CACHE_SIZE_UNLIMITED`] disables collection.
    pub cache_size_bytes: i64,
}

impl Default for FirestoreSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            ssl_enabled: true,
            persistence_enabled: true,
            cache_size_bytes: DEFAULT_CACHE_SIZE_BYTES,
        }
    }
}

impl FirestoreSettings {
    /// Points the client at a local emulator. SSL and persistence are off.
    pub fn with_emulator(mut self, host: &str, port: u16) -> Self {
        self.host = format!("{host}:{port}");
        self.ssl_enabled = false;
        self.persistence_enabled = false;
        self
    }

    pub fn from_json(json: &str) -> FirestoreResult<Self> {
        let settings: Self = serde_json::from_str(json)
            .map_err(|err| invalid_argument(format!("Invalid Firestore settings: {err}")))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> FirestoreResult<()> {
        if self.host.trim().is_empty() {
            return Err(invalid_argument("Settings host must not be empty"));
        }
        if self.cache_size_bytes != CACHE_SIZE_UNLIMITED && self.cache_size_bytes < MINIMUM_CACHE_SIZE_BYTES {
            return Err(invalid_argument(format!(
                "cache_size_bytes must be at least {MINIMUM_CACHE_SIZE_BYTES}"
            )));
        }
        Ok(())
    }
}
