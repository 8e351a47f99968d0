//! Mock stores for testing.
//!
//! Available under the default-on `test-utils` feature. [`FailingStore`]
//! exercises error-handler paths; [`CountingStore`] lets tests assert which
//! store operations a request did (or did not) perform.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::{Result, SessionError};
use crate::memory::MemoryStore;
use crate::record::{SessionId, SessionRecord};
use crate::store::SessionStore;

/// Store whose operations can be switched to fail at runtime.
///
/// Delegates to an inner [`MemoryStore`] until a failure flag is set, then
/// returns [`SessionError::Store`] for the flagged operation.
#[derive(Debug, Default)]
pub struct FailingStore {
    inner: MemoryStore,
    fail_loads: AtomicBool,
    fail_saves: AtomicBool,
    fail_deletes: AtomicBool,
    fail_sweeps: AtomicBool,
}

impl FailingStore {
    /// Create a store with all operations passing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `load` calls fail (or succeed again).
    pub fn fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `save` calls fail (or succeed again).
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `delete` calls fail (or succeed again).
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `delete_expired` calls fail (or succeed again).
    pub fn fail_sweeps(&self, fail: bool) {
        self.fail_sweeps.store(fail, Ordering::SeqCst);
    }

    /// The wrapped in-memory store, for direct inspection.
    #[must_use]
    pub const fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    fn check(flag: &AtomicBool, op: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(SessionError::Store(format!("injected {op} failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FailingStore {
    async fn load(&self, id: &SessionId) -> Result<Option<SessionRecord>> {
        Self::check(&self.fail_loads, "load")?;
        self.inner.load(id).await
    }

    async fn save(&self, record: &SessionRecord) -> Result<()> {
        Self::check(&self.fail_saves, "save")?;
        self.inner.save(record).await
    }

    async fn delete(&self, id: &SessionId) -> Result<()> {
        Self::check(&self.fail_deletes, "delete")?;
        self.inner.delete(id).await
    }

    async fn delete_expired(&self) -> Result<()> {
        Self::check(&self.fail_sweeps, "delete_expired")?;
        self.inner.delete_expired().await
    }
}

/// Store wrapper that counts calls per operation.
#[derive(Debug)]
pub struct CountingStore<S> {
    inner: S,
    loads: AtomicUsize,
    saves: AtomicUsize,
    deletes: AtomicUsize,
    sweeps: AtomicUsize,
}

impl<S> CountingStore<S> {
    /// Wrap `inner`, counting every call that passes through.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            loads: AtomicUsize::new(0),
            saves: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            sweeps: AtomicUsize::new(0),
        }
    }

    /// Number of `load` calls so far.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Number of `save` calls so far.
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Number of `delete` calls so far.
    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Number of `delete_expired` calls so far.
    pub fn sweeps(&self) -> usize {
        self.sweeps.load(Ordering::SeqCst)
    }

    /// The wrapped store.
    #[must_use]
    pub const fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: SessionStore> SessionStore for CountingStore<S> {
    async fn load(&self, id: &SessionId) -> Result<Option<SessionRecord>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load(id).await
    }

    async fn save(&self, record: &SessionRecord) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(record).await
    }

    async fn delete(&self, id: &SessionId) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(id).await
    }

    async fn delete_expired(&self) -> Result<()> {
        self.sweeps.fetch_add(1, Ordering::SeqCst);
        self.inner.delete_expired().await
    }
}
