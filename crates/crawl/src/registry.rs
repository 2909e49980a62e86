//! Deduplicating address intake.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use crate::Endpoint;

/// The set of every endpoint the crawl has learned about, plus the queue of
/// endpoints still waiting for a probe.
///
/// Both structures live under one lock so a batch insert is atomic: an
/// endpoint never appears in the queue without being in the seen-set, and no
/// endpoint enters the queue twice.
#[derive(Debug, Default)]
pub struct AddressRegistry {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    seen: HashSet<Endpoint>,
    pending: VecDeque<Endpoint>,
    rng: fastrand::Rng,
}

impl AddressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a batch of hosts. Hosts not yet seen join the seen-set and the
    /// pending queue in one step; the batch is shuffled before it is
    /// appended so a single informant cannot cluster the queue around its
    /// own address block. Returns the number of new endpoints.
    pub fn add_batch(&self, hosts: impl IntoIterator<Item = String>) -> usize {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        let Inner { seen, pending, rng } = &mut *inner;

        let mut fresh: Vec<Endpoint> = Vec::new();
        for host in hosts {
            let endpoint = Endpoint::new(host);
            if seen.insert(endpoint.clone()) {
                fresh.push(endpoint);
            }
        }
        rng.shuffle(&mut fresh);

        let added = fresh.len();
        pending.extend(fresh);
        added
    }

    /// Pop the endpoint at the head of the pending queue, if any.
    pub fn take_one(&self) -> Option<Endpoint> {
        self.inner
            .lock()
            .expect("registry lock poisoned")
            .pending
            .pop_front()
    }

    /// Endpoints awaiting dispatch.
    pub fn queue_len(&self) -> usize {
        self.inner.lock().expect("registry lock poisoned").pending.len()
    }

    /// Endpoints ever seen. Monotonic for the lifetime of the crawl.
    pub fn total_seen(&self) -> usize {
        self.inner.lock().expect("registry lock poisoned").seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deduplicates_within_and_across_batches() {
        let registry = AddressRegistry::new();

        let added = registry.add_batch(vec![
            "10.0.0.1".to_owned(),
            "10.0.0.1".to_owned(),
            "10.0.0.1".to_owned(),
        ]);
        assert_eq!(added, 1);
        assert_eq!(registry.total_seen(), 1);
        assert_eq!(registry.queue_len(), 1);

        let added = registry.add_batch(vec!["10.0.0.1".to_owned(), "10.0.0.2".to_owned()]);
        assert_eq!(added, 1);
        assert_eq!(registry.total_seen(), 2);
        assert_eq!(registry.queue_len(), 2);
    }

    #[test]
    fn endpoints_are_handed_out_once() {
        let registry = AddressRegistry::new();
        registry.add_batch((0..32).map(|i| format!("10.0.0.{i}")));

        let mut taken = HashSet::new();
        while let Some(endpoint) = registry.take_one() {
            assert!(taken.insert(endpoint), "endpoint dispatched twice");
        }
        assert_eq!(taken.len(), 32);
        assert_eq!(registry.queue_len(), 0);
        // The seen-set never shrinks, so a re-announce stays deduplicated.
        assert_eq!(registry.total_seen(), 32);
        assert_eq!(registry.add_batch(vec!["10.0.0.5".to_owned()]), 0);
    }

    #[test]
    fn batch_is_queued_in_full() {
        let registry = AddressRegistry::new();
        let hosts: Vec<String> = (0..100).map(|i| format!("192.0.2.{i}")).collect();
        registry.add_batch(hosts.clone());

        let mut queued = HashSet::new();
        while let Some(endpoint) = registry.take_one() {
            queued.insert(endpoint.host().to_owned());
        }
        assert_eq!(queued, hosts.into_iter().collect::<HashSet<_>>());
    }
}
