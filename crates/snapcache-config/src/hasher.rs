use serde::Deserialize;
use snapcache_core::{CanonicalHasher, DEFAULT_FLOAT_PRECISION, DEFAULT_UNORDERED_FIELDS};

/// Canonical hasher configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HasherConfig {
    /// Mixed into every digest; bump it to invalidate every cached row
    #[serde(default = "default_version")]
    pub version: String,
    /// Decimals kept when rounding floats
    #[serde(default = "default_float_precision")]
    pub float_precision: u32,
    /// Array fields whose element order is not meaningful
    #[serde(default = "default_unordered_fields")]
    pub unordered_fields: Vec<String>,
}

impl Default for HasherConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            float_precision: default_float_precision(),
            unordered_fields: default_unordered_fields(),
        }
    }
}

impl HasherConfig {
    /// Build the configured hasher
    pub fn hasher(&self) -> CanonicalHasher {
        CanonicalHasher::new(
            self.version.clone(),
            self.float_precision,
            self.unordered_fields.iter().cloned(),
        )
    }
}

fn default_version() -> String {
    "v1".to_owned()
}

#[allow(clippy::missing_const_for_fn)]
fn default_float_precision() -> u32 {
    DEFAULT_FLOAT_PRECISION
}

fn default_unordered_fields() -> Vec<String> {
    DEFAULT_UNORDERED_FIELDS.iter().map(|f| (*f).to_owned()).collect()
}
