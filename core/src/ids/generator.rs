use super::EntityId;
use uuid::Uuid;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Produces entity ids for a store.
///
/// Seeded generators yield a reproducible sequence (used by tests and
/// project replays); unseeded ones fall back to random v4 ids.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    namespace: Option<Uuid>,
    counter: Arc<AtomicUsize>,
}

impl IdGenerator {
    /// Create a deterministic generator from a string seed.
    pub fn new(seed: &str) -> Self {
        let namespace = Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes());
        Self {
            namespace: Some(namespace),
            counter: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Generator handing out random ids.
    pub fn random() -> Self {
        Self {
            namespace: None,
            counter: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Generate the next ID in the sequence.
    pub fn next_id(&self) -> EntityId {
        let count = self.counter.fetch_add(1, Ordering::SeqCst);
        match self.namespace {
            Some(namespace) => {
                let uuid = Uuid::new_v5(&namespace, &count.to_be_bytes());
                EntityId::from_uuid(uuid)
            }
            None => EntityId::new(),
        }
    }

    /// Number of ids handed out so far.
    pub fn issued(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::random()
    }
}
