//! Canonical fingerprinting of analytics input
//!
//! Two analytics snapshots that mean the same thing must hash to the same
//! digest, regardless of key insertion order or float formatting. The
//! canonical form is:
//!
//! - object keys sorted bytewise
//! - floats rounded to `precision` decimals, integral values written as integers
//! - arrays under an *unordered* field name (see [`DEFAULT_UNORDERED_FIELDS`])
//!   sorted by their canonical encoding; every other array keeps its order
//!   (attempt histories, timelines, ranked lists)
//!
//! The digest is SHA-256 over `version || 0x00 || canonical bytes`, hex encoded.

use std::collections::BTreeSet;

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::analytics::AnalyticsSnapshot;

/// Array fields whose element order carries no meaning
pub const DEFAULT_UNORDERED_FIELDS: &[&str] = &["topics", "skills", "strengths", "weaknesses", "tags"];

/// Default number of decimals kept for floats
pub const DEFAULT_FLOAT_PRECISION: u32 = 4;

/// Upper bound on accepted precision
pub const MAX_FLOAT_PRECISION: u32 = 12;

const MAX_DEPTH: usize = 64;

/// Hashing errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HashError {
    /// Input is not a well-formed analytics document
    #[error("invalid analytics input: {0}")]
    InvalidInput(String),
}

/// Deterministic SHA-256 fingerprint over a canonical encoding
#[derive(Debug, Clone)]
pub struct CanonicalHasher {
    version: String,
    precision: u32,
    unordered: BTreeSet<String>,
}

impl Default for CanonicalHasher {
    fn default() -> Self {
        Self::new("v1", DEFAULT_FLOAT_PRECISION, DEFAULT_UNORDERED_FIELDS.iter().copied())
    }
}

impl CanonicalHasher {
    /// Create a hasher
    ///
    /// `version` is mixed into every digest so a change to the canonical form
    /// or prompt invalidates all previously cached rows.
    pub fn new<I, S>(version: impl Into<String>, precision: u32, unordered: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            version: version.into(),
            precision: precision.min(MAX_FLOAT_PRECISION),
            unordered: unordered.into_iter().map(Into::into).collect(),
        }
    }

    /// Fingerprint an analytics snapshot
    pub fn hash(&self, input: &AnalyticsSnapshot) -> Result<String, HashError> {
        let mut bytes = Vec::with_capacity(self.version.len() + 1);
        bytes.extend_from_slice(self.version.as_bytes());
        bytes.push(0);
        bytes.extend(self.canonical_bytes(input)?);

        let digest = Sha256::digest(&bytes);
        Ok(format!("{digest:x}"))
    }

    /// Canonical serialization of the input, before hashing
    pub fn canonical_bytes(&self, input: &AnalyticsSnapshot) -> Result<Vec<u8>, HashError> {
        let value = input.as_value();
        if !value.is_object() {
            return Err(HashError::InvalidInput("analytics must be a JSON object".to_owned()));
        }

        let mut out = Vec::new();
        self.write_value(value, false, 0, &mut out)?;
        Ok(out)
    }

    fn write_value(
        &self,
        value: &serde_json::Value,
        unordered: bool,
        depth: usize,
        out: &mut Vec<u8>,
    ) -> Result<(), HashError> {
        use serde_json::Value;

        if depth > MAX_DEPTH {
            return Err(HashError::InvalidInput(format!("nesting deeper than {MAX_DEPTH} levels")));
        }

        match value {
            Value::Null => out.extend_from_slice(b"null"),
            Value::Bool(true) => out.extend_from_slice(b"true"),
            Value::Bool(false) => out.extend_from_slice(b"false"),
            Value::Number(n) => out.extend_from_slice(self.canonical_number(n)?.as_bytes()),
            Value::String(s) => write_string(s, out)?,
            Value::Array(items) => {
                let mut encoded = items
                    .iter()
                    .map(|item| {
                        let mut buf = Vec::new();
                        self.write_value(item, false, depth + 1, &mut buf)?;
                        Ok(buf)
                    })
                    .collect::<Result<Vec<_>, HashError>>()?;

                if unordered {
                    encoded.sort_unstable();
                }

                out.push(b'[');
                for (i, item) in encoded.iter().enumerate() {
                    if i > 0 {
                        out.push(b',');
                    }
                    out.extend_from_slice(item);
                }
                out.push(b']');
            }
            Value::Object(map) => {
                let mut entries: Vec<_> = map.iter().collect();
                entries.sort_unstable_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

                out.push(b'{');
                for (i, (field, item)) in entries.into_iter().enumerate() {
                    if i > 0 {
                        out.push(b',');
                    }
                    write_string(field, out)?;
                    out.push(b':');
                    self.write_value(item, self.unordered.contains(field.as_str()), depth + 1, out)?;
                }
                out.push(b'}');
            }
        }

        Ok(())
    }

    #[allow(clippy::cast_possible_wrap, clippy::float_cmp)]
    fn canonical_number(&self, n: &serde_json::Number) -> Result<String, HashError> {
        if let Some(i) = n.as_i64() {
            return Ok(i.to_string());
        }
        if let Some(u) = n.as_u64() {
            return Ok(u.to_string());
        }

        let f = n
            .as_f64()
            .filter(|f| f.is_finite())
            .ok_or_else(|| HashError::InvalidInput(format!("unrepresentable number: {n}")))?;

        // Integral floats carry no fraction to round, and scaling them may overflow
        let rounded = if f.fract() == 0.0 {
            f
        } else {
            let scale = 10f64.powi(self.precision as i32);
            (f * scale).round() / scale
        };

        // Integral values share the integer spelling so `1`, `1.0` and `1e0` agree
        if rounded.fract() == 0.0 {
            if rounded == 0.0 {
                return Ok("0".to_owned());
            }
            return Ok(format!("{rounded:.0}"));
        }

        Ok(format!("{rounded:.prec$}", prec = self.precision as usize))
    }
}

fn write_string(s: &str, out: &mut Vec<u8>) -> Result<(), HashError> {
    serde_json::to_writer(&mut *out, s).map_err(|e| HashError::InvalidInput(e.to_string()))
}
