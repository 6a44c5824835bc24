use http::StatusCode;
use snapcache_core::{AnalyticsError, HashError, HttpError};
use snapcache_store::StoreError;
use thiserror::Error;

/// Errors a cache lookup may fail with
///
/// Generator failures never appear here; they resolve to a fallback row.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Analytics input could not be fingerprinted
    #[error(transparent)]
    InvalidInput(#[from] HashError),

    /// The snapshot store could not be used
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl HttpError for CacheError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::InvalidInput(_) => "invalid_input_error",
            Self::Store(_) => "store_unavailable_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::InvalidInput(e) => e.to_string(),
            Self::Store(_) => "snapshot store is temporarily unavailable".to_owned(),
        }
    }
}

/// Failure to reconcile one row; never aborts the sweep
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("analytics for {key}: {source}")]
    Analytics {
        key: String,
        #[source]
        source: AnalyticsError,
    },

    #[error("cache for {key}: {source}")]
    Cache {
        key: String,
        #[source]
        source: CacheError,
    },
}
