// src/ingest/dedup.rs
use std::collections::HashSet;
use std::sync::Mutex;

/// Identifiers processed during this process lifetime, per source.
///
/// Ids are compared as exact strings. The set grows without eviction until
/// restart. An id is only marked seen after its item was handed to the
/// forwarder; while a cycle works on it the id sits in `in_flight`, so an
/// overlapping cycle cannot pick it up a second time.
#[derive(Debug, Default)]
pub struct SeenSet {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    seen: HashSet<String>,
    in_flight: HashSet<String>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_new(&self, id: &str) -> bool {
        !self.lock().seen.contains(id)
    }

    /// Reserve `id` for the calling cycle. False if it was already seen or
    /// another cycle holds it.
    pub fn try_claim(&self, id: &str) -> bool {
        let mut g = self.lock();
        if g.seen.contains(id) || g.in_flight.contains(id) {
            return false;
        }
        g.in_flight.insert(id.to_string())
    }

    /// Like `try_claim`, but the reservation is released when the guard drops
    /// unless it was marked seen first.
    pub fn claim<'a>(&'a self, id: &str) -> Option<Claim<'a>> {
        self.try_claim(id).then(|| Claim {
            set: self,
            id: id.to_string(),
            done: false,
        })
    }

    pub fn mark_seen(&self, id: &str) {
        let mut g = self.lock();
        g.in_flight.remove(id);
        if !g.seen.contains(id) {
            g.seen.insert(id.to_string());
        }
    }

    /// Drop a claim without marking the id seen; the next cycle may retry it.
    pub fn release(&self, id: &str) {
        self.lock().in_flight.remove(id);
    }

    pub fn len(&self) -> usize {
        self.lock().seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // every mutation is a single insert/remove, poisoned state is still consistent
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// In-flight reservation of one id.
#[derive(Debug)]
pub struct Claim<'a> {
    set: &'a SeenSet,
    id: String,
    done: bool,
}

impl Claim<'_> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mark_seen(mut self) {
        self.set.mark_seen(&self.id);
        self.done = true;
    }

    pub fn release(mut self) {
        self.set.release(&self.id);
        self.done = true;
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.set.release(&self.id);
        }
    }
}
