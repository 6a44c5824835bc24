//! The persisted cache row and its lifecycle
//!
//! One [`Snapshot`] exists per [`SnapshotKey`]. Rows move
//! EMPTY → COMPUTING → READY | FAILED and only re-enter COMPUTING when the
//! input hash changes or the owning lease has expired.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::generation::{Commentary, GenerationResult, TokenUsage};
use crate::key::SnapshotKey;

/// Maximum characters kept in `last_message`
const PREVIEW_CHARS: usize = 160;

/// Advisory fields (durations, model, usage, error text); never read for control flow
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Row status
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Status {
    Empty,
    Computing,
    Ready,
    Failed,
}

/// Where a payload came from
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Source {
    /// The external generator
    Generated,
    /// The deterministic degraded path
    Fallback,
}

/// Identity of the caller holding the compute lease
///
/// The nil token is reserved for rows queued by a producer that will not
/// compute them itself; any caller may take those over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerToken(Uuid);

impl OwnerToken {
    /// Fresh random token for one caller
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Reserved token marking a queued, unowned row
    pub const fn queue() -> Self {
        Self(Uuid::nil())
    }

    pub fn is_queue(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Display for OwnerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for OwnerToken {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Payload produced by the external generator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedPayload {
    pub commentary: Commentary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Payload produced by the deterministic summary after a generator failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackPayload {
    pub commentary: Commentary,
    /// Why the generator path was abandoned
    pub reason: String,
}

/// Cached result envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    Generated(GeneratedPayload),
    Fallback(FallbackPayload),
}

impl Payload {
    pub const fn commentary(&self) -> &Commentary {
        match self {
            Self::Generated(p) => &p.commentary,
            Self::Fallback(p) => &p.commentary,
        }
    }

    pub const fn source(&self) -> Source {
        match self {
            Self::Generated(_) => Source::Generated,
            Self::Fallback(_) => Source::Fallback,
        }
    }
}

/// Last READY result of a row that has since been re-claimed for new input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviousResult {
    pub content_hash: String,
    pub payload: Payload,
    pub updated_at: Timestamp,
}

/// One cached computation result for a key and input hash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub key: SnapshotKey,
    /// Fingerprint of the input that produced (or is producing) this row
    pub content_hash: String,
    pub status: Status,
    /// Present iff `status == Ready`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    /// Set iff `status == Computing`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_token: Option<OwnerToken>,
    /// Set iff `status == Computing`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computing_since: Option<Timestamp>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<PreviousResult>,
    pub updated_at: Timestamp,
}

impl Snapshot {
    /// Row state for a key that has never been computed
    pub fn vacant(key: SnapshotKey, content_hash: impl Into<String>) -> Self {
        Self {
            key,
            content_hash: content_hash.into(),
            status: Status::Empty,
            payload: None,
            last_message: None,
            source: None,
            owner_token: None,
            computing_since: None,
            metadata: Metadata::new(),
            previous: None,
            updated_at: Timestamp::now(),
        }
    }

    /// Finished row carrying a payload
    pub fn ready(key: SnapshotKey, content_hash: impl Into<String>, payload: Payload, metadata: Metadata) -> Self {
        let last_message = Some(payload.commentary().preview(PREVIEW_CHARS));
        let source = Some(payload.source());

        Self {
            key,
            content_hash: content_hash.into(),
            status: Status::Ready,
            payload: Some(payload),
            last_message,
            source,
            owner_token: None,
            computing_since: None,
            metadata,
            previous: None,
            updated_at: Timestamp::now(),
        }
    }

    /// Row whose generator and fallback both failed
    pub fn failed(
        key: SnapshotKey,
        content_hash: impl Into<String>,
        previous: Option<PreviousResult>,
        metadata: Metadata,
    ) -> Self {
        let last_message = previous
            .as_ref()
            .map(|p| p.payload.commentary().preview(PREVIEW_CHARS));

        Self {
            key,
            content_hash: content_hash.into(),
            status: Status::Failed,
            payload: None,
            last_message,
            source: None,
            owner_token: None,
            computing_since: None,
            metadata,
            previous,
            updated_at: Timestamp::now(),
        }
    }

    /// Transition this row into COMPUTING for `owner`
    ///
    /// A READY payload is retained as `previous` so waiters can still be
    /// served a stale answer while the new input is being computed.
    #[must_use]
    pub fn claim(self, content_hash: impl Into<String>, owner: OwnerToken, since: Timestamp) -> Self {
        let previous = self.ready_result().or(self.previous);

        Self {
            key: self.key,
            content_hash: content_hash.into(),
            status: Status::Computing,
            payload: None,
            last_message: self.last_message,
            source: None,
            owner_token: Some(owner),
            computing_since: Some(since),
            metadata: Metadata::new(),
            previous,
            updated_at: since,
        }
    }

    /// The payload of this row as a [`PreviousResult`], if READY
    pub fn ready_result(&self) -> Option<PreviousResult> {
        match (self.status, &self.payload) {
            (Status::Ready, Some(payload)) => Some(PreviousResult {
                content_hash: self.content_hash.clone(),
                payload: payload.clone(),
                updated_at: self.updated_at,
            }),
            _ => None,
        }
    }

    /// READY view of the retained previous result, for stale serving
    pub fn stale_view(&self) -> Option<Self> {
        let previous = self.previous.as_ref()?;
        let mut view = Self::ready(
            self.key.clone(),
            previous.content_hash.clone(),
            previous.payload.clone(),
            Metadata::new(),
        );
        view.updated_at = previous.updated_at;
        Some(view)
    }

    /// READY for exactly this input hash
    pub fn is_fresh_for(&self, content_hash: &str) -> bool {
        self.status == Status::Ready && self.content_hash == content_hash
    }

    /// Queued by a producer that does not compute it itself
    pub fn is_queued(&self) -> bool {
        self.status == Status::Computing && self.owner_token.is_some_and(|t| t.is_queue())
    }

    /// COMPUTING and the owner's lease has run out at `now`
    pub fn lease_expired(&self, now: Timestamp, lease: Duration) -> bool {
        if self.status != Status::Computing {
            return false;
        }
        self.computing_since
            .is_none_or(|since| elapsed_between(since, now) >= lease)
    }

    /// COMPUTING under a live, non-queued lease
    pub fn is_held(&self, now: Timestamp, lease: Duration) -> bool {
        self.status == Status::Computing && !self.is_queued() && !self.lease_expired(now, lease)
    }

    /// Model identifier recorded for a generated payload
    pub fn model(&self) -> Option<&str> {
        match &self.payload {
            Some(Payload::Generated(p)) => p.model.as_deref(),
            _ => None,
        }
    }

    /// Check the status/payload/lease invariants of a persisted row
    pub fn is_consistent(&self) -> bool {
        let payload_ok = (self.status == Status::Ready) == self.payload.is_some();
        let computing = self.status == Status::Computing;
        let lease_ok = computing == self.owner_token.is_some() && computing == self.computing_since.is_some();
        let source_ok = self.source == self.payload.as_ref().map(Payload::source);
        payload_ok && lease_ok && source_ok
    }
}

/// Build the READY payload for a generation result
pub fn generated_payload(result: GenerationResult) -> (Payload, Metadata) {
    let mut metadata = usage_metadata(result.usage);
    if let Some(model) = &result.model {
        metadata.insert("model".to_owned(), serde_json::Value::from(model.clone()));
    }
    let payload = Payload::Generated(GeneratedPayload {
        commentary: result.commentary,
        model: result.model,
    });
    (payload, metadata)
}

/// Build the READY payload for a fallback result
pub fn fallback_payload(result: GenerationResult, reason: String) -> (Payload, Metadata) {
    let mut metadata = usage_metadata(result.usage);
    metadata.insert("fallback_reason".to_owned(), serde_json::Value::from(reason.clone()));
    let payload = Payload::Fallback(FallbackPayload {
        commentary: result.commentary,
        reason,
    });
    (payload, metadata)
}

fn usage_metadata(usage: Option<TokenUsage>) -> Metadata {
    let mut metadata = Metadata::new();
    if let Some(usage) = usage {
        metadata.insert("prompt_tokens".to_owned(), serde_json::Value::from(usage.prompt_tokens));
        metadata.insert(
            "completion_tokens".to_owned(),
            serde_json::Value::from(usage.completion_tokens),
        );
    }
    metadata
}

/// Non-negative time between two timestamps; clock skew reads as zero
pub fn elapsed_between(earlier: Timestamp, later: Timestamp) -> Duration {
    let span = later.duration_since(earlier);
    if span.is_negative() {
        Duration::ZERO
    } else {
        span.unsigned_abs()
    }
}

/// Latest `computing_since` that counts as abandoned under `lease`
pub fn lease_cutoff(now: Timestamp, lease: Duration) -> Timestamp {
    now.checked_sub(lease).unwrap_or(Timestamp::MIN)
}
