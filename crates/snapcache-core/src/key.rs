use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Viewer role the commentary is written for
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Audience {
    /// The student who sat the exam
    Student,
    /// A parent or guardian
    Parent,
    /// The teacher or tutor reviewing the class
    Teacher,
}

/// Errors raised when building a [`SnapshotKey`]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    /// A key component was empty
    #[error("{field} must not be empty")]
    Empty {
        /// Name of the offending component
        field: &'static str,
    },
    /// A key component contained the storage separator
    #[error("{field} must not contain ':'")]
    Separator {
        /// Name of the offending component
        field: &'static str,
    },
    /// Audience string did not name a known role
    #[error("unknown audience: {0}")]
    Audience(String),
}

/// Composite identity of one cached artifact: (subject, context, audience)
///
/// For exam commentary the subject is the exam and the context is the student.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotKey {
    subject_id: String,
    context_id: String,
    audience: Audience,
}

impl SnapshotKey {
    /// Build a key, rejecting empty components and the `:` separator
    pub fn new(subject_id: impl Into<String>, context_id: impl Into<String>, audience: Audience) -> Result<Self, KeyError> {
        let subject_id = subject_id.into();
        let context_id = context_id.into();

        validate_component("subject_id", &subject_id)?;
        validate_component("context_id", &context_id)?;

        Ok(Self {
            subject_id,
            context_id,
            audience,
        })
    }

    /// Build a key from raw path segments, including the audience name
    pub fn parse(subject_id: &str, context_id: &str, audience: &str) -> Result<Self, KeyError> {
        let audience = audience
            .parse::<Audience>()
            .map_err(|_| KeyError::Audience(audience.to_owned()))?;
        Self::new(subject_id, context_id, audience)
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    pub const fn audience(&self) -> Audience {
        self.audience
    }

    /// Storage key under the given prefix: `prefix:subject:context:audience`
    pub fn storage_key(&self, prefix: &str) -> String {
        format!("{prefix}:{self}")
    }
}

impl fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.subject_id, self.context_id, self.audience)
    }
}

fn validate_component(field: &'static str, value: &str) -> Result<(), KeyError> {
    if value.trim().is_empty() {
        return Err(KeyError::Empty { field });
    }
    if value.contains(':') {
        return Err(KeyError::Separator { field });
    }
    Ok(())
}
