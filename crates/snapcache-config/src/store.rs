use serde::Deserialize;
use url::Url;

/// Snapshot store backend
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// Process-local storage; single-flight holds only within one process
    #[default]
    Memory,
    /// Redis/Valkey storage shared by every handler process
    Redis(RedisStoreConfig),
}

/// Redis-backed store configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisStoreConfig {
    /// Connection URL
    pub url: Url,
    /// Prefix for every key written by the store
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_key_prefix() -> String {
    "snapcache".to_owned()
}
