//! Test utilities for engram - deterministic providers and fault-injecting stores
//!
//! Nothing here loads a model or touches the network, so tests built on these
//! run fast and give the same answers on every machine.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::config::MemoryConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{MemoryError, Result};
use crate::memory::MemoryManager;
use crate::storage::{Collection, InMemoryStore, Record, RecordStore};

/// Dimension used by the mock provider unless told otherwise
pub const MOCK_DIMENSION: usize = 384;

fn bucket(token: &str, dimension: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    (hasher.finish() % dimension as u64) as usize
}

/// Bag-of-words embedding by feature hashing.
///
/// Each lowercase word adds 1.0 to one hashed bucket, so texts sharing words
/// have high cosine similarity and identical texts score exactly 1.0.
#[derive(Debug, Clone)]
pub struct MockEmbeddingProvider {
    dimension: usize,
    calls: Arc<AtomicUsize>,
}

impl MockEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of embed calls served so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];
        let mut any = false;
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            vector[bucket(&word.to_lowercase(), self.dimension)] += 1.0;
            any = true;
        }
        if !any {
            vector[bucket(text, self.dimension)] = 1.0;
        }
        vector
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new(MOCK_DIMENSION)
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    fn name(&self) -> &str {
        "mock-bag-of-words"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vector(text))
    }
}

/// A provider whose model never loads
#[derive(Debug, Clone, Default)]
pub struct UnavailableEmbeddingProvider;

#[async_trait]
impl EmbeddingProvider for UnavailableEmbeddingProvider {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(MemoryError::Initialization(
            "embedding model is not available".to_string(),
        ))
    }
}

/// An [`InMemoryStore`] that fails writes on demand.
#[derive(Debug)]
pub struct FlakyStore {
    inner: InMemoryStore,
    fail_puts: AtomicBool,
    deletes_left: AtomicUsize,
}

impl Default for FlakyStore {
    fn default() -> Self {
        Self {
            inner: InMemoryStore::new(),
            fail_puts: AtomicBool::new(false),
            deletes_left: AtomicUsize::new(usize::MAX),
        }
    }
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }

    /// Make every subsequent `put` fail (or succeed again)
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Let `n` more deletes succeed, then fail the rest
    pub fn fail_deletes_after(&self, n: usize) {
        self.deletes_left.store(n, Ordering::SeqCst);
    }

    pub fn allow_all_deletes(&self) {
        self.deletes_left.store(usize::MAX, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn put(&self, collection: Collection, id: &str, record: Record) -> Result<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(MemoryError::Storage(format!(
                "injected put failure for {collection}/{id}"
            )));
        }
        self.inner.put(collection, id, record).await
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Record>> {
        self.inner.get(collection, id).await
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<bool> {
        let allowed = self
            .deletes_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                0 => None,
                usize::MAX => Some(usize::MAX),
                n => Some(n - 1),
            })
            .is_ok();
        if !allowed {
            return Err(MemoryError::Storage(format!(
                "injected delete failure for {collection}/{id}"
            )));
        }
        self.inner.delete(collection, id).await
    }

    async fn list_ids(&self, collection: Collection) -> Result<Vec<String>> {
        self.inner.list_ids(collection).await
    }
}

/// A manager over a fresh [`InMemoryStore`] and [`MockEmbeddingProvider`]
pub async fn in_memory_manager(config: MemoryConfig) -> Result<MemoryManager> {
    MemoryManager::open(
        Arc::new(InMemoryStore::new()),
        Arc::new(MockEmbeddingProvider::default()),
        config,
        MOCK_DIMENSION,
    )
    .await
}
