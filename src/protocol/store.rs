use super::host::HostValue;
use super::value::{InstanceId, RemoteRef};
use super::ProtocolError;
use lru::LruCache;
use std::num::NonZeroUsize;

/// Live objects handed out by reference from one sibling instance.
///
/// Ids come from a counter and are never reused while the instance lives.
/// The store is bounded: once full, minting a new reference evicts the least
/// recently used one, and later lookups of the evicted id fail.
pub struct ReferenceStore {
    instance: InstanceId,
    next_id: u64,
    entries: LruCache<u64, HostValue>,
}

impl ReferenceStore {
    pub const DEFAULT_CAPACITY: usize = 1024;

    pub fn new(instance: InstanceId) -> Self {
        Self::with_capacity(instance, Self::DEFAULT_CAPACITY)
    }

    /// A capacity of zero is treated as one.
    pub fn with_capacity(instance: InstanceId, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            instance,
            next_id: 0,
            entries: LruCache::new(capacity),
        }
    }

    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn insert(&mut self, value: HostValue) -> RemoteRef {
        let id = self.next_id;
        self.next_id += 1;

        if let Some((evicted, _)) = self.entries.push(id, value) {
            tracing::debug!(instance = %self.instance, evicted, "reference store full, evicted oldest entry");
        }

        RemoteRef {
            instance: self.instance,
            id,
        }
    }

    /// Looks up a reference minted by this instance and marks it recently used.
    pub fn get(&mut self, reference: &RemoteRef) -> Result<HostValue, ProtocolError> {
        if reference.instance != self.instance {
            return Err(ProtocolError::ResolutionError {
                message: format!(
                    "reference {} (minted by another instance)",
                    reference
                ),
            });
        }

        self.entries
            .get(&reference.id)
            .cloned()
            .ok_or_else(|| ProtocolError::ResolutionError {
                message: format!("reference {} (unknown or evicted)", reference),
            })
    }
}
