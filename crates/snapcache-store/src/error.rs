use thiserror::Error;

/// Snapshot store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend unreachable or a command failed
    #[error("snapshot store unavailable: {0}")]
    Unavailable(String),

    /// A row could not be encoded or decoded
    #[error("serialization: {0}")]
    Serialization(String),

    /// A persisted row violates the row invariants
    #[error("corrupt row {key}: {reason}")]
    Corrupt {
        /// Storage key of the row
        key: String,
        /// What was wrong with it
        reason: String,
    },
}
