//! Valkey/Redis snapshot store
//!
//! Each row is a hash at `{prefix}:{subject}:{context}:{audience}`:
//!
//! | field             | contents                                      |
//! |-------------------|-----------------------------------------------|
//! | `status`          | row status name                               |
//! | `content_hash`    | input fingerprint                             |
//! | `owner_token`     | lease owner, COMPUTING only                   |
//! | `computing_since` | lease start in epoch milliseconds             |
//! | `updated_at`      | last write in epoch milliseconds              |
//! | `key`             | JSON-encoded [`SnapshotKey`]                  |
//! | `doc`             | JSON of the last settled [`Snapshot`], if any |
//!
//! The control fields are what the transition script compares; `doc` is
//! only rewritten on settle. A COMPUTING row is read back as `doc` claimed
//! for the current owner, which keeps the previous READY payload around.
//!
//! COMPUTING rows are also indexed in the sorted set `{prefix}:computing`
//! scored by `computing_since`, with queued rows at score 0.

use std::collections::HashMap;

use async_trait::async_trait;
use jiff::Timestamp;
use snapcache_config::SweepOrder;
use snapcache_core::{OwnerToken, Snapshot, SnapshotKey, Status};

use crate::{Change, Expected, SnapshotStore, StoreError};

/// Atomic compare-and-set over one row hash and the computing index
///
/// KEYS: row, index.
/// ARGV: mode, expected, cutoff ms, queue token, change, status, content hash,
/// owner token, timestamp ms, index member, doc, key json.
const TRANSITION_SCRIPT: &str = r"
local row = redis.call('HMGET', KEYS[1], 'status', 'content_hash', 'owner_token', 'computing_since')
local status, hash, owner, since = row[1], row[2], row[3], row[4]
local mode = ARGV[1]
local ok = false

if mode == 'any' then
  ok = true
elseif mode == 'status' then
  ok = (status or 'empty') == ARGV[2]
elseif mode == 'claimable' then
  ok = (not status) or hash ~= ARGV[2] or status == 'empty' or status == 'failed'
    or (status == 'computing' and (owner == ARGV[4] or tonumber(since or '0') <= tonumber(ARGV[3])))
elseif mode == 'owned' then
  ok = status == 'computing' and owner == ARGV[2]
end

if not ok then
  return 0
end

if ARGV[5] == 'claim' then
  redis.call('HSET', KEYS[1], 'status', 'computing', 'content_hash', ARGV[7], 'owner_token', ARGV[8],
    'computing_since', ARGV[9], 'updated_at', ARGV[9], 'key', ARGV[12])
  local score = ARGV[9]
  if ARGV[8] == ARGV[4] then
    score = 0
  end
  redis.call('ZADD', KEYS[2], score, ARGV[10])
else
  redis.call('HSET', KEYS[1], 'status', ARGV[6], 'content_hash', ARGV[7], 'updated_at', ARGV[9],
    'doc', ARGV[11], 'key', ARGV[12])
  redis.call('HDEL', KEYS[1], 'owner_token', 'computing_since')
  redis.call('ZREM', KEYS[2], ARGV[10])
end

return 1
";

/// Snapshot store shared by every handler process through Valkey/Redis
#[derive(Clone)]
pub struct RedisStore {
    client: ::redis::Client,
    key_prefix: String,
    transition: ::redis::Script,
}

impl RedisStore {
    /// Create a store for the given connection URL
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid
    pub fn new(url: &str, key_prefix: &str) -> Result<Self, StoreError> {
        let client =
            ::redis::Client::open(url).map_err(|e| StoreError::Unavailable(format!("invalid URL: {e}")))?;

        Ok(Self {
            client,
            key_prefix: key_prefix.to_owned(),
            transition: ::redis::Script::new(TRANSITION_SCRIPT),
        })
    }

    async fn connection(&self) -> Result<::redis::aio::MultiplexedConnection, StoreError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Unavailable(format!("connection failed: {e}")))
    }

    fn row_key(&self, key: &SnapshotKey) -> String {
        key.storage_key(&self.key_prefix)
    }

    fn index_key(&self) -> String {
        format!("{}:computing", self.key_prefix)
    }

    async fn read_row(
        &self,
        conn: &mut ::redis::aio::MultiplexedConnection,
        row_key: &str,
    ) -> Result<Option<Snapshot>, StoreError> {
        use ::redis::AsyncCommands;

        let fields: HashMap<String, String> = conn
            .hgetall(row_key)
            .await
            .map_err(|e| StoreError::Unavailable(format!("HGETALL failed: {e}")))?;

        assemble(row_key, &fields)
    }

    async fn members_in_range(
        &self,
        conn: &mut ::redis::aio::MultiplexedConnection,
        min: &str,
        max: &str,
        order: SweepOrder,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        use ::redis::AsyncCommands;

        let count = isize::try_from(limit).unwrap_or(isize::MAX);
        let members = match order {
            SweepOrder::OldestFirst => conn.zrangebyscore_limit(self.index_key(), min, max, 0, count).await,
            SweepOrder::NewestFirst => conn.zrevrangebyscore_limit(self.index_key(), max, min, 0, count).await,
        };

        members.map_err(|e| StoreError::Unavailable(format!("ZRANGEBYSCORE failed: {e}")))
    }
}

#[async_trait]
impl SnapshotStore for RedisStore {
    async fn read(&self, key: &SnapshotKey) -> Result<Option<Snapshot>, StoreError> {
        let mut conn = self.connection().await?;
        self.read_row(&mut conn, &self.row_key(key)).await
    }

    async fn upsert(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let row_key = self.row_key(&snapshot.key);
        let key_json = encode(&snapshot.key)?;
        let doc = encode(snapshot)?;
        let updated_at = snapshot.updated_at.as_millisecond().to_string();

        let mut pipe = ::redis::pipe();
        pipe.atomic().hset_multiple(
            &row_key,
            &[
                ("status", snapshot.status.as_ref()),
                ("content_hash", snapshot.content_hash.as_str()),
                ("updated_at", updated_at.as_str()),
                ("doc", doc.as_str()),
                ("key", key_json.as_str()),
            ],
        );

        match (snapshot.status, snapshot.owner_token, snapshot.computing_since) {
            (Status::Computing, Some(owner), Some(since)) => {
                let since_ms = since.as_millisecond();
                let score = if owner.is_queue() { 0 } else { since_ms };
                pipe.hset_multiple(
                    &row_key,
                    &[
                        ("owner_token", owner.to_string()),
                        ("computing_since", since_ms.to_string()),
                    ],
                )
                .zadd(self.index_key(), &row_key, score);
            }
            (Status::Computing, ..) => {
                return Err(StoreError::Corrupt {
                    key: row_key,
                    reason: "COMPUTING row without owner and lease start".to_owned(),
                });
            }
            _ => {
                pipe.hdel(&row_key, &["owner_token", "computing_since"])
                    .zrem(self.index_key(), &row_key);
            }
        }

        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Unavailable(format!("upsert failed: {e}")))?;

        tracing::debug!(key = %snapshot.key, status = %snapshot.status, "upserted snapshot");
        Ok(())
    }

    async fn try_transition(&self, key: &SnapshotKey, expected: Expected, change: Change) -> Result<bool, StoreError> {
        let mut conn = self.connection().await?;
        let row_key = self.row_key(key);
        let queue = OwnerToken::queue().to_string();

        let mut invocation = self.transition.key(&row_key);
        invocation.key(self.index_key());

        match &expected {
            Expected::Any => invocation.arg("any").arg("").arg(0),
            Expected::Status(status) => invocation.arg("status").arg(status.as_ref()).arg(0),
            Expected::Claimable {
                content_hash,
                lease_cutoff,
            } => invocation
                .arg("claimable")
                .arg(content_hash.as_str())
                .arg(lease_cutoff.as_millisecond()),
            Expected::OwnedBy(owner) => invocation.arg("owned").arg(owner.to_string()).arg(0),
        };
        invocation.arg(&queue);

        match change {
            Change::Claim {
                content_hash,
                owner_token,
                computing_since,
            } => {
                invocation
                    .arg("claim")
                    .arg(Status::Computing.as_ref())
                    .arg(content_hash)
                    .arg(owner_token.to_string())
                    .arg(computing_since.as_millisecond())
                    .arg(&row_key)
                    .arg("")
                    .arg(encode(key)?);
            }
            Change::Settle(snapshot) => {
                if snapshot.status == Status::Computing {
                    return Err(StoreError::Corrupt {
                        key: row_key,
                        reason: "cannot settle into COMPUTING".to_owned(),
                    });
                }
                invocation
                    .arg("settle")
                    .arg(snapshot.status.as_ref())
                    .arg(snapshot.content_hash.as_str())
                    .arg("")
                    .arg(snapshot.updated_at.as_millisecond())
                    .arg(&row_key)
                    .arg(encode(&*snapshot)?)
                    .arg(encode(key)?);
            }
        }

        let applied: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StoreError::Unavailable(format!("transition script failed: {e}")))?;

        Ok(applied == 1)
    }

    async fn scan_stale(&self, cutoff: Timestamp, limit: usize, order: SweepOrder) -> Result<Vec<Snapshot>, StoreError> {
        let mut conn = self.connection().await?;

        let mut members = self
            .members_in_range(&mut conn, "0", "0", SweepOrder::OldestFirst, limit)
            .await?;
        if members.len() < limit {
            let expired = self
                .members_in_range(
                    &mut conn,
                    "(0",
                    &cutoff.as_millisecond().to_string(),
                    order,
                    limit - members.len(),
                )
                .await?;
            members.extend(expired);
        }

        let mut rows = Vec::with_capacity(members.len());
        for member in members {
            // Rows settled since the range query are no longer candidates
            if let Some(row) = self.read_row(&mut conn, &member).await?
                && row.status == Status::Computing
            {
                rows.push(row);
            }
        }

        Ok(rows)
    }
}

fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Serialization(format!("serialize: {e}")))
}

/// Rebuild a snapshot from its hash fields
fn assemble(row_key: &str, fields: &HashMap<String, String>) -> Result<Option<Snapshot>, StoreError> {
    let Some(status) = fields.get("status") else {
        return Ok(None);
    };

    let corrupt = |reason: String| StoreError::Corrupt {
        key: row_key.to_owned(),
        reason,
    };

    let status: Status = status.parse().map_err(|_| corrupt(format!("unknown status '{status}'")))?;
    let content_hash = fields
        .get("content_hash")
        .ok_or_else(|| corrupt("missing content_hash".to_owned()))?;
    let key: SnapshotKey = fields
        .get("key")
        .ok_or_else(|| corrupt("missing key".to_owned()))
        .and_then(|raw| serde_json::from_str(raw).map_err(|e| corrupt(format!("bad key: {e}"))))?;
    let doc: Option<Snapshot> = fields
        .get("doc")
        .map(|raw| serde_json::from_str(raw).map_err(|e| corrupt(format!("bad doc: {e}"))))
        .transpose()?;

    if status != Status::Computing {
        return doc.map(Some).ok_or_else(|| corrupt(format!("{status} row without doc")));
    }

    let owner: OwnerToken = fields
        .get("owner_token")
        .ok_or_else(|| corrupt("COMPUTING row without owner_token".to_owned()))?
        .parse()
        .map_err(|e| corrupt(format!("bad owner_token: {e}")))?;
    let since = fields
        .get("computing_since")
        .and_then(|raw| raw.parse::<i64>().ok())
        .and_then(|ms| Timestamp::from_millisecond(ms).ok())
        .ok_or_else(|| corrupt("COMPUTING row without valid computing_since".to_owned()))?;

    let base = doc.unwrap_or_else(|| Snapshot::vacant(key, content_hash.clone()));
    Ok(Some(base.claim(content_hash.clone(), owner, since)))
}

#[cfg(test)]
mod tests {
    use snapcache_core::{Audience, Commentary, GenerationResult, Source, generated_payload};

    use super::*;

    fn key() -> SnapshotKey {
        SnapshotKey::new("E1", "S1", Audience::Parent).unwrap()
    }

    fn ready_doc(hash: &str) -> Snapshot {
        let (payload, metadata) = generated_payload(GenerationResult::deterministic(Commentary {
            text: "T1".to_owned(),
            highlights: Vec::new(),
            next_steps: Vec::new(),
        }));
        Snapshot::ready(key(), hash, payload, metadata)
    }

    fn fields(pairs: &[(&str, String)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| ((*k).to_owned(), v.clone())).collect()
    }

    #[test]
    fn missing_hash_reads_as_no_row() {
        assert!(assemble("snapcache:E1:S1:parent", &HashMap::new()).unwrap().is_none());
    }

    #[test]
    fn ready_row_is_its_doc() {
        let doc = ready_doc("h1");
        let row = fields(&[
            ("status", "ready".to_owned()),
            ("content_hash", "h1".to_owned()),
            ("key", serde_json::to_string(&key()).unwrap()),
            ("doc", serde_json::to_string(&doc).unwrap()),
        ]);

        let snapshot = assemble("snapcache:E1:S1:parent", &row).unwrap().unwrap();
        assert_eq!(snapshot, doc);
        assert_eq!(snapshot.source, Some(Source::Generated));
    }

    #[test]
    fn computing_row_keeps_previous_ready_payload() {
        let owner = OwnerToken::generate();
        let since = Timestamp::from_millisecond(1_760_000_000_000).unwrap();
        let row = fields(&[
            ("status", "computing".to_owned()),
            ("content_hash", "h2".to_owned()),
            ("owner_token", owner.to_string()),
            ("computing_since", since.as_millisecond().to_string()),
            ("key", serde_json::to_string(&key()).unwrap()),
            ("doc", serde_json::to_string(&ready_doc("h1")).unwrap()),
        ]);

        let snapshot = assemble("snapcache:E1:S1:parent", &row).unwrap().unwrap();
        assert_eq!(snapshot.status, Status::Computing);
        assert_eq!(snapshot.content_hash, "h2");
        assert_eq!(snapshot.owner_token, Some(owner));
        assert_eq!(snapshot.computing_since, Some(since));
        assert_eq!(snapshot.previous.unwrap().content_hash, "h1");
    }

    #[test]
    fn computing_row_without_doc_starts_vacant() {
        let row = fields(&[
            ("status", "computing".to_owned()),
            ("content_hash", "h1".to_owned()),
            ("owner_token", OwnerToken::queue().to_string()),
            ("computing_since", "1760000000000".to_owned()),
            ("key", serde_json::to_string(&key()).unwrap()),
        ]);

        let snapshot = assemble("snapcache:E1:S1:parent", &row).unwrap().unwrap();
        assert!(snapshot.is_queued());
        assert!(snapshot.previous.is_none());
        assert!(snapshot.is_consistent());
    }

    #[test]
    fn computing_row_without_owner_is_corrupt() {
        let row = fields(&[
            ("status", "computing".to_owned()),
            ("content_hash", "h1".to_owned()),
            ("key", serde_json::to_string(&key()).unwrap()),
        ]);

        let err = assemble("snapcache:E1:S1:parent", &row).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { reason, .. } if reason.contains("owner_token")));
    }

    #[test]
    fn unknown_status_is_corrupt() {
        let row = fields(&[("status", "pending".to_owned()), ("content_hash", "h1".to_owned())]);
        assert!(matches!(
            assemble("snapcache:E1:S1:parent", &row),
            Err(StoreError::Corrupt { .. })
        ));
    }

    mod live {
        //! Runs the transition script against a real server at `SNAPCACHE_TEST_REDIS_URL`

        use std::time::Duration;

        use ::redis::AsyncCommands;
        use snapcache_core::lease_cutoff;

        use super::*;

        fn store() -> Option<RedisStore> {
            let Ok(url) = std::env::var("SNAPCACHE_TEST_REDIS_URL") else {
                println!("Skipping redis test - no SNAPCACHE_TEST_REDIS_URL provided");
                return None;
            };
            let prefix = format!("snapcache-test-{}", OwnerToken::generate());
            Some(RedisStore::new(&url, &prefix).unwrap())
        }

        async fn index_score(store: &RedisStore, key: &SnapshotKey) -> Option<f64> {
            let mut conn = store.connection().await.unwrap();
            conn.zscore(store.index_key(), store.row_key(key)).await.unwrap()
        }

        fn claim(hash: &str, owner: OwnerToken, since: Timestamp) -> Change {
            Change::Claim {
                content_hash: hash.to_owned(),
                owner_token: owner,
                computing_since: since,
            }
        }

        fn claimable(hash: &str, cutoff: Timestamp) -> Expected {
            Expected::Claimable {
                content_hash: hash.to_owned(),
                lease_cutoff: cutoff,
            }
        }

        #[tokio::test]
        async fn queued_row_is_indexed_first_and_settle_unindexes() {
            let Some(store) = store() else { return };
            let k = key();
            let now = Timestamp::now();
            let cutoff = lease_cutoff(now, Duration::from_secs(300));

            assert!(
                store
                    .try_transition(&k, claimable("h1", cutoff), claim("h1", OwnerToken::queue(), now))
                    .await
                    .unwrap()
            );
            assert_eq!(index_score(&store, &k).await, Some(0.0));

            let stale = store.scan_stale(cutoff, 10, SweepOrder::OldestFirst).await.unwrap();
            assert_eq!(stale.len(), 1);
            assert!(stale[0].is_queued());

            let owner = OwnerToken::generate();
            assert!(
                store
                    .try_transition(&k, claimable("h1", cutoff), claim("h1", owner, now))
                    .await
                    .unwrap()
            );
            #[allow(clippy::cast_precision_loss)]
            let since_ms = now.as_millisecond() as f64;
            assert_eq!(index_score(&store, &k).await, Some(since_ms));
            assert!(store.scan_stale(cutoff, 10, SweepOrder::OldestFirst).await.unwrap().is_empty());

            let settle = Change::Settle(Box::new(ready_doc("h1")));
            assert!(
                !store
                    .try_transition(&k, Expected::OwnedBy(OwnerToken::generate()), settle.clone())
                    .await
                    .unwrap()
            );
            assert!(store.try_transition(&k, Expected::OwnedBy(owner), settle).await.unwrap());

            assert_eq!(index_score(&store, &k).await, None);
            let row = store.read(&k).await.unwrap().unwrap();
            assert_eq!(row.status, Status::Ready);
            assert!(row.owner_token.is_none());
        }

        #[tokio::test]
        async fn live_lease_blocks_claims_until_it_expires() {
            let Some(store) = store() else { return };
            let k = key();
            let now = Timestamp::now();
            let holder = OwnerToken::generate();

            assert!(
                store
                    .try_transition(
                        &k,
                        claimable("h1", lease_cutoff(now, Duration::from_secs(300))),
                        claim("h1", holder, now)
                    )
                    .await
                    .unwrap()
            );

            let rival = OwnerToken::generate();
            let later = now.checked_add(Duration::from_secs(1)).unwrap();
            assert!(
                !store
                    .try_transition(
                        &k,
                        claimable("h1", lease_cutoff(later, Duration::from_secs(300))),
                        claim("h1", rival, later)
                    )
                    .await
                    .unwrap()
            );

            let after_lease = now.checked_add(Duration::from_secs(600)).unwrap();
            assert!(
                store
                    .try_transition(
                        &k,
                        claimable("h1", lease_cutoff(after_lease, Duration::from_secs(300))),
                        claim("h1", rival, after_lease)
                    )
                    .await
                    .unwrap()
            );
            assert_eq!(store.read(&k).await.unwrap().unwrap().owner_token, Some(rival));
        }
    }
}
