//! Signature deduplication for the ingestion transports
//!
//! Bounded least-recently-seen set keyed by transaction signature.
//! The store already scopes "recent signatures" per address, so one
//! global set is enough and is shared by every per-address fetch.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

const DEFAULT_CAPACITY: usize = 50_000;

pub struct SignatureDeduplicator {
    seen: Mutex<LruCache<String, ()>>,
}

impl SignatureDeduplicator {
    /// Create a deduplicator remembering at most `capacity` signatures
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity)
            .or(NonZeroUsize::new(DEFAULT_CAPACITY))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            seen: Mutex::new(LruCache::new(cap)),
        }
    }

    /// Returns `true` the first time `signature` is offered and records it.
    ///
    /// Check and insert happen under one lock, so concurrent callers can
    /// never both see the same signature as new.
    pub fn is_new(&self, address: &str, signature: &str) -> bool {
        let mut seen = self.seen.lock();
        // get() refreshes recency so hot signatures survive eviction
        if seen.get(signature).is_some() {
            tracing::trace!(address, signature, "Signature already processed");
            return false;
        }
        seen.put(signature.to_string(), ());
        true
    }

    /// Drop a signature whose extraction never happened so that a later
    /// cycle can pick it up again (e.g. transaction not indexed yet).
    pub fn forget(&self, signature: &str) {
        self.seen.lock().pop(signature);
    }

    pub fn contains(&self, signature: &str) -> bool {
        self.seen.lock().contains(signature)
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.seen.lock().cap().get()
    }
}

impl Default for SignatureDeduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
