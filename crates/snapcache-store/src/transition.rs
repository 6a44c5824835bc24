use jiff::Timestamp;
use snapcache_core::{OwnerToken, Snapshot, SnapshotKey, Status};

/// Precondition checked atomically by [`crate::SnapshotStore::try_transition`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expected {
    /// Any row state, including no row
    Any,
    /// Row status equals this; `Status::Empty` also matches a missing row
    Status(Status),
    /// Row may be claimed for `content_hash`
    ///
    /// True when there is no row, the row holds a different hash, the row
    /// is EMPTY or FAILED, or it is COMPUTING under a queued or expired
    /// lease (`computing_since <= lease_cutoff`).
    Claimable {
        content_hash: String,
        lease_cutoff: Timestamp,
    },
    /// Row is COMPUTING under exactly this owner
    OwnedBy(OwnerToken),
}

/// Row update applied when the precondition holds
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Enter COMPUTING for `content_hash` under `owner_token`
    Claim {
        content_hash: String,
        owner_token: OwnerToken,
        computing_since: Timestamp,
    },
    /// Replace the row with a settled (READY or FAILED) snapshot
    Settle(Box<Snapshot>),
}

impl Expected {
    /// Whether `row` satisfies this precondition
    pub fn matches(&self, row: Option<&Snapshot>) -> bool {
        match (self, row) {
            (Self::Any, _) | (Self::Claimable { .. }, None) => true,
            (Self::Status(status), None) => *status == Status::Empty,
            (Self::Status(status), Some(row)) => row.status == *status,
            (
                Self::Claimable {
                    content_hash,
                    lease_cutoff,
                },
                Some(row),
            ) => {
                row.content_hash != *content_hash
                    || match row.status {
                        Status::Empty | Status::Failed => true,
                        Status::Computing => {
                            row.is_queued() || row.computing_since.is_none_or(|since| since <= *lease_cutoff)
                        }
                        Status::Ready => false,
                    }
            }
            (Self::OwnedBy(_), None) => false,
            (Self::OwnedBy(owner), Some(row)) => row.status == Status::Computing && row.owner_token == Some(*owner),
        }
    }
}

impl Change {
    /// Resulting row when applied to `row`
    pub fn apply(self, key: &SnapshotKey, row: Option<Snapshot>) -> Snapshot {
        match self {
            Self::Claim {
                content_hash,
                owner_token,
                computing_since,
            } => row
                .unwrap_or_else(|| Snapshot::vacant(key.clone(), content_hash.clone()))
                .claim(content_hash, owner_token, computing_since),
            Self::Settle(snapshot) => *snapshot,
        }
    }
}
