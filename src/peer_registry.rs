//! The cluster-wide advisory lock that lets a read against a source
//! whose supervisor never started it claim the right to start the
//! recent-logs cache lazily, without racing a concurrent reader into
//! creating a second cache for the same source.

use crate::event::SourceId;
use parking_lot::Mutex;
use std::collections::HashSet;

/// Tracks which sources have a cache claimed on this node, lazily or
/// eagerly. `try_claim` is the only way to win a claim; it's safe to call
/// redundantly (an already-claimed source just returns `false`).
#[derive(Default)]
pub struct PeerRegistry {
    claimed: Mutex<HashSet<SourceId>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to claim `source_id`. Returns `true` if this call won the
    /// claim and should proceed to create the cache; `false` if another
    /// caller already holds it.
    pub fn try_claim(&self, source_id: SourceId) -> bool {
        self.claimed.lock().insert(source_id)
    }

    pub fn is_claimed(&self, source_id: SourceId) -> bool {
        self.claimed.lock().contains(&source_id)
    }

    /// Releases a claim, e.g. when the source's supervisor stops.
    pub fn release(&self, source_id: SourceId) {
        self.claimed.lock().remove(&source_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_one_caller_wins_the_claim() {
        let registry = PeerRegistry::new();
        assert!(registry.try_claim(1));
        assert!(!registry.try_claim(1));
        assert!(registry.is_claimed(1));
    }

    #[test]
    fn release_allows_reclaiming() {
        let registry = PeerRegistry::new();
        assert!(registry.try_claim(1));
        registry.release(1);
        assert!(!registry.is_claimed(1));
        assert!(registry.try_claim(1));
    }
}
