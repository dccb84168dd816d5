//! Lazy derived cells keyed on a store revision
//!
//! The form store owns one revision counter, bumped exactly once per mutation
//! batch. A [`Derived`] cell caches `(revision, value)` and recomputes only when
//! read at a newer revision, so each cell runs at most once per batch and never
//! when nobody reads it.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

/// Monotonic store revision
pub type Revision = u64;

#[derive(Debug)]
pub struct Derived<T> {
    cache: Mutex<Option<(Revision, T)>>,
    computes: AtomicUsize,
}

impl<T> Default for Derived<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Derived<T> {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(None),
            computes: AtomicUsize::new(0),
        }
    }

    /// How many times the cell has been (re)computed
    pub fn compute_count(&self) -> usize {
        self.computes.load(Ordering::Relaxed)
    }
}

impl<T: Clone> Derived<T> {
    /// Cached value for `revision`, computing it with `compute` if stale
    pub fn get_or_compute(&self, revision: Revision, compute: impl FnOnce() -> T) -> T {
        let mut cache = self.cache.lock();
        if let Some((cached_at, value)) = cache.as_ref() {
            if *cached_at == revision {
                return value.clone();
            }
        }
        let value = compute();
        self.computes.fetch_add(1, Ordering::Relaxed);
        *cache = Some((revision, value.clone()));
        value
    }
}
