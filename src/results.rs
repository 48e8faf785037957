use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::domain::SearchResult;
use crate::generation::Generations;

#[derive(Debug, Default)]
struct Inner {
    generation: u64,
    items: Vec<SearchResult>,
}

/// Authoritative search results behind a single lock, with a version counter
/// observers poll before copying out a snapshot.
///
/// Writes are generation gated: the live generation is checked while the
/// lock is held, so a write from an abandoned search either lands before the
/// newer search clears the store or is rejected.
#[derive(Debug)]
pub struct ResultStore {
    generations: Arc<Generations>,
    inner: Mutex<Inner>,
    version: AtomicU64,
}

impl ResultStore {
    pub fn new(generations: Arc<Generations>) -> Self {
        Self {
            generations,
            inner: Mutex::new(Inner::default()),
            version: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn bump(&self) {
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    /// Returns `false` when `generation` is no longer live.
    pub fn replace_page(&self, generation: u64, mut results: Vec<SearchResult>) -> bool {
        let mut inner = self.lock();
        if !self.generations.is_live(generation) {
            return false;
        }
        for result in &mut results {
            result.generation = generation;
        }
        inner.generation = generation;
        inner.items = results;
        self.bump();
        true
    }

    /// Applies `mutator` to one slot if both the live generation and the
    /// slot's own tag still equal `generation`.
    pub fn update_item<F>(&self, index: usize, generation: u64, mutator: F) -> bool
    where
        F: FnOnce(&mut SearchResult),
    {
        let mut inner = self.lock();
        if !self.generations.is_live(generation) || inner.generation != generation {
            return false;
        }
        let Some(item) = inner.items.get_mut(index) else {
            return false;
        };
        if item.generation != generation {
            return false;
        }
        mutator(item);
        self.bump();
        true
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.items.clear();
        inner.generation = self.generations.current_generation();
        self.bump();
    }

    pub fn get(&self, index: usize) -> Option<SearchResult> {
        self.lock().items.get(index).cloned()
    }

    pub fn snapshot(&self) -> Vec<SearchResult> {
        self.lock().items.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }
}
