//! Document records and the store contract the queue core depends on.

use crate::error::StoreError;
use crate::fingerprint::Fingerprint;
use crate::job::DocumentId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

/// A submitted document and, once rendered, its artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub fingerprint: Fingerprint,
    pub origin: Vec<u8>,
    /// `None` until rendered, or after the result was lost.
    pub result: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
}

impl DocumentRecord {
    pub fn new(origin: Vec<u8>, fingerprint: Fingerprint) -> Self {
        Self {
            id: DocumentId::new(),
            fingerprint,
            origin,
            result: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_rendered(&self) -> bool {
        self.result.is_some()
    }

    /// Whether this record holds exactly `content`.
    pub fn same_origin(&self, content: &[u8]) -> bool {
        self.origin == content
    }
}

/// Persistent storage of document records.
///
/// Writes to one record are assumed to be serialized by the backend; the job
/// queue guarantees a single executing worker per id.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Snapshot of every record sharing `fingerprint`.
    async fn find_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Vec<DocumentRecord>, StoreError>;

    async fn find_by_id(&self, id: DocumentId) -> Result<Option<DocumentRecord>, StoreError>;

    /// Persists a new record and assigns its id.
    async fn create(
        &self,
        origin: Vec<u8>,
        fingerprint: Fingerprint,
    ) -> Result<DocumentRecord, StoreError>;

    /// Stores the rendered artifact. Returns `false` if the record is gone.
    async fn set_result(&self, id: DocumentId, result: Vec<u8>) -> Result<bool, StoreError>;

    /// Removes the record. Returns `false` if it did not exist.
    async fn delete(&self, id: DocumentId) -> Result<bool, StoreError>;

    /// Ids of records that still have no result.
    async fn pending_ids(&self) -> Result<Vec<DocumentId>, StoreError>;
}

#[derive(Default)]
struct MemoryState {
    records: HashMap<DocumentId, DocumentRecord>,
    by_fingerprint: HashMap<Fingerprint, HashSet<DocumentId>>,
}

/// Process-local `RecordStore`, for embedding and tests.
#[derive(Default)]
pub struct MemoryRecordStore {
    state: Mutex<MemoryState>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.state.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn find_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Vec<DocumentRecord>, StoreError> {
        let state = self.state.lock().await;
        let records = state
            .by_fingerprint
            .get(fingerprint)
            .into_iter()
            .flatten()
            .filter_map(|id| state.records.get(id).cloned())
            .collect();
        Ok(records)
    }

    async fn find_by_id(&self, id: DocumentId) -> Result<Option<DocumentRecord>, StoreError> {
        Ok(self.state.lock().await.records.get(&id).cloned())
    }

    async fn create(
        &self,
        origin: Vec<u8>,
        fingerprint: Fingerprint,
    ) -> Result<DocumentRecord, StoreError> {
        let record = DocumentRecord::new(origin, fingerprint);
        let mut state = self.state.lock().await;
        state
            .by_fingerprint
            .entry(record.fingerprint.clone())
            .or_default()
            .insert(record.id);
        state.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn set_result(&self, id: DocumentId, result: Vec<u8>) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        match state.records.get_mut(&id) {
            Some(record) => {
                record.result = Some(result);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: DocumentId) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let Some(record) = state.records.remove(&id) else {
            return Ok(false);
        };
        if let Some(ids) = state.by_fingerprint.get_mut(&record.fingerprint) {
            ids.remove(&id);
            if ids.is_empty() {
                state.by_fingerprint.remove(&record.fingerprint);
            }
        }
        Ok(true)
    }

    async fn pending_ids(&self) -> Result<Vec<DocumentId>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .records
            .values()
            .filter(|r| !r.is_rendered())
            .map(|r| r.id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(s: &str) -> Fingerprint {
        Fingerprint::new(s)
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let store = MemoryRecordStore::new();
        let record = store.create(b"<svg/>".to_vec(), fp("F1")).await.unwrap();

        let found = store.find_by_id(record.id).await.unwrap().unwrap();
        assert_eq!(found, record);
        assert!(!found.is_rendered());

        let candidates = store.find_by_fingerprint(&fp("F1")).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].same_origin(b"<svg/>"));
        assert!(store.find_by_fingerprint(&fp("F2")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fingerprint_collision_keeps_both() {
        let store = MemoryRecordStore::new();
        store.create(b"one".to_vec(), fp("SAME")).await.unwrap();
        store.create(b"two".to_vec(), fp("SAME")).await.unwrap();

        let candidates = store.find_by_fingerprint(&fp("SAME")).await.unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates.iter().filter(|r| r.same_origin(b"two")).count(), 1);
    }

    #[tokio::test]
    async fn test_set_result_and_pending() {
        let store = MemoryRecordStore::new();
        let a = store.create(b"a".to_vec(), fp("A")).await.unwrap();
        let b = store.create(b"b".to_vec(), fp("B")).await.unwrap();

        assert!(store.set_result(a.id, b"%PDF".to_vec()).await.unwrap());
        assert_eq!(store.pending_ids().await.unwrap(), vec![b.id]);

        let rendered = store.find_by_id(a.id).await.unwrap().unwrap();
        assert_eq!(rendered.result.as_deref(), Some(&b"%PDF"[..]));
    }

    #[tokio::test]
    async fn test_delete_removes_from_index() {
        let store = MemoryRecordStore::new();
        let record = store.create(b"x".to_vec(), fp("X")).await.unwrap();

        assert!(store.delete(record.id).await.unwrap());
        assert!(!store.delete(record.id).await.unwrap());
        assert!(store.find_by_id(record.id).await.unwrap().is_none());
        assert!(store.find_by_fingerprint(&fp("X")).await.unwrap().is_empty());
        assert!(!store.set_result(record.id, vec![1]).await.unwrap());
        assert!(store.is_empty().await);
    }
}
