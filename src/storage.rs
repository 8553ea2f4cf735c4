//! Redis-backed document record store.

use crate::error::StoreError;
use crate::fingerprint::Fingerprint;
use crate::job::DocumentId;
use crate::record::{DocumentRecord, RecordStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use std::collections::HashMap;
use tracing::{debug, info};

/// Hash field holding the fingerprint string.
const FIELD_FINGERPRINT: &str = "fingerprint";

/// Hash field holding the raw submitted bytes.
const FIELD_ORIGIN: &str = "origin";

/// Hash field holding the rendered artifact. Absent until rendered.
const FIELD_RESULT: &str = "result";

/// Hash field holding the RFC 3339 creation time.
const FIELD_CREATED_AT: &str = "created_at";

/// Stores the result only while the record hash exists, so a concurrent
/// delete can never leave a hash holding nothing but `result`.
///
/// KEYS: record hash, pending set. ARGV: result field, artifact, id.
const SET_RESULT_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return 0
end
redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])
redis.call('SREM', KEYS[2], ARGV[3])
return 1
"#;

/// Persistent `RecordStore` on Redis.
///
/// Layout, for a key prefix `p`:
/// - `p:doc:{id}`: hash with the record fields
/// - `p:fingerprint:{fp}`: set of ids sharing a fingerprint
/// - `p:pending`: set of ids without a result
pub struct RedisRecordStore {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisRecordStore {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        Self {
            conn,
            prefix: prefix.into(),
        }
    }

    /// Opens a managed connection to `redis_url`.
    pub async fn connect(redis_url: &str, prefix: impl Into<String>) -> Result<Self, StoreError> {
        let client = Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        info!("Connected to record store: {}", redis_url);
        Ok(Self::new(conn, prefix))
    }
}

fn doc_key(prefix: &str, id: DocumentId) -> String {
    format!("{}:doc:{}", prefix, id)
}

fn fingerprint_key(prefix: &str, fingerprint: &Fingerprint) -> String {
    format!("{}:fingerprint:{}", prefix, fingerprint)
}

fn pending_key(prefix: &str) -> String {
    format!("{}:pending", prefix)
}

fn parse_id(raw: &str) -> Result<DocumentId, StoreError> {
    raw.parse().map_err(|e: uuid::Error| StoreError::Corrupt {
        id: raw.to_string(),
        reason: e.to_string(),
    })
}

/// Rebuilds a record from its hash fields. An empty hash means no record.
fn decode_record(
    id: DocumentId,
    mut fields: HashMap<String, Vec<u8>>,
) -> Result<Option<DocumentRecord>, StoreError> {
    if fields.is_empty() {
        return Ok(None);
    }

    let corrupt = |reason: String| StoreError::Corrupt {
        id: id.to_string(),
        reason,
    };

    let fingerprint = fields
        .remove(FIELD_FINGERPRINT)
        .ok_or_else(|| corrupt("missing fingerprint".to_string()))?;
    let fingerprint =
        String::from_utf8(fingerprint).map_err(|e| corrupt(format!("fingerprint: {}", e)))?;

    let origin = fields
        .remove(FIELD_ORIGIN)
        .ok_or_else(|| corrupt("missing origin".to_string()))?;

    let created_at = match fields.remove(FIELD_CREATED_AT) {
        Some(raw) => {
            let text = String::from_utf8(raw).map_err(|e| corrupt(format!("created_at: {}", e)))?;
            DateTime::parse_from_rfc3339(&text)
                .map_err(|e| corrupt(format!("created_at: {}", e)))?
                .with_timezone(&Utc)
        }
        None => Utc::now(),
    };

    Ok(Some(DocumentRecord {
        id,
        fingerprint: Fingerprint::new(fingerprint),
        origin,
        result: fields.remove(FIELD_RESULT),
        created_at,
    }))
}

#[async_trait]
impl RecordStore for RedisRecordStore {
    async fn find_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Vec<DocumentRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .smembers(fingerprint_key(&self.prefix, fingerprint))
            .await?;

        let mut records = Vec::with_capacity(ids.len());
        for raw in ids {
            // Index entries can outlive a record deleted between the two reads.
            if let Some(record) = self.find_by_id(parse_id(&raw)?).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn find_by_id(&self, id: DocumentId) -> Result<Option<DocumentRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, Vec<u8>> = conn.hgetall(doc_key(&self.prefix, id)).await?;
        decode_record(id, fields)
    }

    async fn create(
        &self,
        origin: Vec<u8>,
        fingerprint: Fingerprint,
    ) -> Result<DocumentRecord, StoreError> {
        let record = DocumentRecord::new(origin, fingerprint);
        let created_at = record.created_at.to_rfc3339();
        let id = record.id.to_string();

        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .hset_multiple(
                doc_key(&self.prefix, record.id),
                &[
                    (FIELD_FINGERPRINT, record.fingerprint.as_str().as_bytes()),
                    (FIELD_ORIGIN, record.origin.as_slice()),
                    (FIELD_CREATED_AT, created_at.as_bytes()),
                ],
            )
            .ignore()
            .sadd(fingerprint_key(&self.prefix, &record.fingerprint), &id)
            .ignore()
            .sadd(pending_key(&self.prefix), &id)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;

        debug!("Created record: document_id={}", record.id);
        Ok(record)
    }

    async fn set_result(&self, id: DocumentId, result: Vec<u8>) -> Result<bool, StoreError> {
        let key = doc_key(&self.prefix, id);
        let mut conn = self.conn.clone();

        let stored: i64 = redis::Script::new(SET_RESULT_SCRIPT)
            .key(&key)
            .key(pending_key(&self.prefix))
            .arg(FIELD_RESULT)
            .arg(result)
            .arg(id.to_string())
            .invoke_async(&mut conn)
            .await?;
        Ok(stored == 1)
    }

    async fn delete(&self, id: DocumentId) -> Result<bool, StoreError> {
        let key = doc_key(&self.prefix, id);
        let mut conn = self.conn.clone();

        let fingerprint: Option<String> = conn.hget(&key, FIELD_FINGERPRINT).await?;
        let Some(fingerprint) = fingerprint else {
            return Ok(false);
        };

        let (removed,): (i64,) = redis::pipe()
            .atomic()
            .del(&key)
            .srem(
                fingerprint_key(&self.prefix, &Fingerprint::new(fingerprint)),
                id.to_string(),
            )
            .ignore()
            .srem(pending_key(&self.prefix), id.to_string())
            .ignore()
            .query_async(&mut conn)
            .await?;

        debug!("Deleted record: document_id={}", id);
        Ok(removed > 0)
    }

    async fn pending_ids(&self) -> Result<Vec<DocumentId>, StoreError> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.smembers(pending_key(&self.prefix)).await?;
        ids.iter().map(|raw| parse_id(raw)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let id: DocumentId = "67e55044-10b1-426f-9247-bb680e5fe0c8".parse().unwrap();
        assert_eq!(
            doc_key("render", id),
            "render:doc:67e55044-10b1-426f-9247-bb680e5fe0c8"
        );
        assert_eq!(
            fingerprint_key("render", &Fingerprint::new("ABCD")),
            "render:fingerprint:ABCD"
        );
        assert_eq!(pending_key("render"), "render:pending");
    }

    #[test]
    fn test_decode_empty_hash_is_missing() {
        assert!(decode_record(DocumentId::new(), HashMap::new())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_decode_full_record() {
        let id = DocumentId::new();
        let fields = HashMap::from([
            (FIELD_FINGERPRINT.to_string(), b"FP".to_vec()),
            (FIELD_ORIGIN.to_string(), b"<svg/>".to_vec()),
            (FIELD_RESULT.to_string(), b"%PDF".to_vec()),
            (
                FIELD_CREATED_AT.to_string(),
                b"2024-01-02T03:04:05+00:00".to_vec(),
            ),
        ]);

        let record = decode_record(id, fields).unwrap().unwrap();
        assert_eq!(record.id, id);
        assert_eq!(record.fingerprint.as_str(), "FP");
        assert_eq!(record.origin, b"<svg/>".to_vec());
        assert_eq!(record.result, Some(b"%PDF".to_vec()));
        assert_eq!(record.created_at.to_rfc3339(), "2024-01-02T03:04:05+00:00");
    }

    #[test]
    fn test_decode_missing_origin_is_corrupt() {
        let fields = HashMap::from([(FIELD_FINGERPRINT.to_string(), b"FP".to_vec())]);
        let err = decode_record(DocumentId::new(), fields).unwrap_err();
        assert!(err.to_string().contains("missing origin"));
    }

    // Note: These tests require a running Redis instance.
    // Run with: docker run -d -p 6379:6379 redis:7-alpine

    #[tokio::test]
    #[ignore]
    async fn test_redis_record_lifecycle() {
        let prefix = format!("render-test-{}", DocumentId::new());
        let store = RedisRecordStore::connect("redis://127.0.0.1/", prefix)
            .await
            .unwrap();

        let record = store
            .create(b"<svg/>".to_vec(), Fingerprint::new("FP-LIFECYCLE"))
            .await
            .unwrap();

        let candidates = store
            .find_by_fingerprint(&Fingerprint::new("FP-LIFECYCLE"))
            .await
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(store.pending_ids().await.unwrap(), vec![record.id]);

        assert!(store.set_result(record.id, b"%PDF".to_vec()).await.unwrap());
        let rendered = store.find_by_id(record.id).await.unwrap().unwrap();
        assert_eq!(rendered.result, Some(b"%PDF".to_vec()));
        assert!(store.pending_ids().await.unwrap().is_empty());

        assert!(store.delete(record.id).await.unwrap());
        assert!(store.find_by_id(record.id).await.unwrap().is_none());
        assert!(!store.delete(record.id).await.unwrap());
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_set_result_after_delete_leaves_nothing() {
        let prefix = format!("render-test-{}", DocumentId::new());
        let store = RedisRecordStore::connect("redis://127.0.0.1/", prefix.clone())
            .await
            .unwrap();

        let record = store
            .create(b"<html/>".to_vec(), Fingerprint::new("FP-DELETED"))
            .await
            .unwrap();
        assert!(store.delete(record.id).await.unwrap());

        assert!(!store.set_result(record.id, b"%PDF".to_vec()).await.unwrap());
        assert!(store.find_by_id(record.id).await.unwrap().is_none());

        let mut conn = store.conn.clone();
        let exists: bool = conn.exists(doc_key(&prefix, record.id)).await.unwrap();
        assert!(!exists, "late result must not recreate the record hash");
    }
}
