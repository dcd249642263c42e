//! Single-slot in-flight guard for scoped fetches.
//!
//! At most one fetch is in flight. Starting a fetch while one is pending is
//! refused rather than queued. Superseding bumps the generation so that every
//! token handed out earlier reads as stale when its fetch completes.

use std::fmt::Debug;

use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchToken<K> {
    key: K,
    generation: u64,
}

impl<K> FetchToken<K> {
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug)]
pub struct RequestCancellationGuard<K> {
    generation: u64,
    in_flight: Option<K>,
}

impl<K> Default for RequestCancellationGuard<K> {
    fn default() -> Self {
        Self {
            generation: 0,
            in_flight: None,
        }
    }
}

impl<K: Clone + PartialEq + Debug> RequestCancellationGuard<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out a fresh token, or `None` when a fetch is already pending.
    pub fn start_if_idle(&mut self, key: K) -> Option<FetchToken<K>> {
        if let Some(pending) = &self.in_flight {
            debug!(
                pending = ?pending,
                requested = ?key,
                "guard busy; dropping fetch request"
            );
            return None;
        }
        self.generation += 1;
        self.in_flight = Some(key.clone());
        Some(FetchToken {
            key,
            generation: self.generation,
        })
    }

    pub fn is_stale(&self, token: &FetchToken<K>) -> bool {
        token.generation != self.generation
            || self.in_flight.as_ref() != Some(&token.key)
    }

    /// Releases the busy flag. Finishing a stale token changes nothing.
    pub fn finish(&mut self, token: &FetchToken<K>) {
        if !self.is_stale(token) {
            self.in_flight = None;
        }
    }

    /// Marks every outstanding token stale and frees the slot.
    pub fn supersede(&mut self) {
        if let Some(pending) = self.in_flight.take() {
            debug!(superseded = ?pending, generation = self.generation, "superseding in-flight fetch");
        }
        self.generation += 1;
    }

    pub fn in_flight(&self) -> Option<&K> {
        self.in_flight.as_ref()
    }

    pub fn is_busy_with(&self, key: &K) -> bool {
        self.in_flight.as_ref() == Some(key)
    }
}

#[cfg(test)]
#[path = "tests/guard_tests.rs"]
mod tests;
