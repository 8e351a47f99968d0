//! Reference in-memory session store.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::error::{Result, SessionError};
use crate::record::{SessionId, SessionRecord};
use crate::store::SessionStore;

/// In-memory [`SessionStore`] backed by a single map.
///
/// One reader/writer lock guards the map: loads take the shared lock, saves
/// and deletes take the exclusive lock. Suitable for single-process
/// deployments and tests; sessions do not survive a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<SessionId, SessionRecord>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held, including idle-expired ones that
    /// have not been swept yet.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] if the lock is poisoned.
    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    /// Whether the store holds no records at all.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read()?.is_empty())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<SessionId, SessionRecord>>> {
        self.records
            .read()
            .map_err(|_| SessionError::Store("session map lock poisoned".into()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<SessionId, SessionRecord>>> {
        self.records
            .write()
            .map_err(|_| SessionError::Store("session map lock poisoned".into()))
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn load(&self, id: &SessionId) -> Result<Option<SessionRecord>> {
        let records = self.read()?;
        Ok(records
            .get(id)
            .filter(|r| !r.is_expired_at(Utc::now()))
            .cloned())
    }

    async fn save(&self, record: &SessionRecord) -> Result<()> {
        // Lazy expiry: a record dead on arrival is not worth a write.
        if record.is_expired_at(Utc::now()) {
            return Ok(());
        }
        self.write()?.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<()> {
        self.write()?.remove(id);
        Ok(())
    }

    async fn delete_expired(&self) -> Result<()> {
        let mut records = self.write()?;
        let now = Utc::now();
        let before = records.len();
        records.retain(|_, r| !r.is_expired_at(now));
        let removed = before - records.len();
        drop(records);
        if removed > 0 {
            debug!(removed, "swept expired session records");
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn record(id: &str, idle_in_secs: i64) -> SessionRecord {
        let now = Utc::now();
        SessionRecord {
            id: SessionId::from(id),
            idle_deadline: now + Duration::seconds(idle_in_secs),
            absolute_deadline: now + Duration::days(7),
            data: id.as_bytes().to_vec(),
        }
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = MemoryStore::new();
        let saved = record("alpha", 3600);
        store.save(&saved).await.unwrap();

        let loaded = store.load(&saved.id).await.unwrap().unwrap();
        assert_eq!(loaded, saved);
    }

    #[tokio::test]
    async fn load_of_missing_id_is_none() {
        let store = MemoryStore::new();
        assert!(store.load(&SessionId::from("ghost")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn load_of_expired_record_behaves_as_not_found() {
        let store = MemoryStore::new();
        let mut expired = record("stale", 3600);
        store.save(&expired).await.unwrap();

        // Expire it in place, bypassing save's lazy-expiry filter.
        expired.idle_deadline = Utc::now() - Duration::seconds(10);
        store.write().unwrap().insert(expired.id.clone(), expired.clone());

        assert!(store.load(&expired.id).await.unwrap().is_none());
        // The row is still physically present until a sweep.
        assert_eq!(store.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn save_of_expired_record_is_a_no_op() {
        let store = MemoryStore::new();
        store.save(&record("dead", -10)).await.unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryStore::new();
        let r = record("gone", 3600);
        store.save(&r).await.unwrap();

        store.delete(&r.id).await.unwrap();
        assert!(store.load(&r.id).await.unwrap().is_none());

        // Deleting again is not an error.
        store.delete(&r.id).await.unwrap();
        store.delete(&SessionId::from("never-existed")).await.unwrap();
    }

    #[tokio::test]
    async fn delete_expired_removes_only_expired_records() {
        let store = MemoryStore::new();
        let live = record("live", 3600);
        store.save(&live).await.unwrap();

        let mut stale = record("stale", 3600);
        stale.idle_deadline = Utc::now() - Duration::seconds(10);
        store.write().unwrap().insert(stale.id.clone(), stale.clone());

        store.delete_expired().await.unwrap();

        assert_eq!(store.len().unwrap(), 1);
        assert!(store.load(&live.id).await.unwrap().is_some());
        assert!(store.load(&stale.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_saves_of_independent_ids_do_not_corrupt() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let mut tasks = Vec::new();
        for i in 0..32 {
            let store = std::sync::Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                let r = record(&format!("id-{i}"), 3600);
                store.save(&r).await.unwrap();
                assert!(store.load(&r.id).await.unwrap().is_some());
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(store.len().unwrap(), 32);
    }
}
