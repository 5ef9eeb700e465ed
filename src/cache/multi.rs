//! Multi-Node Cache Store
//!
//! Fans each logical cache operation out over a [`Ring`] of independent
//! nodes.
//!
//! # Routing
//!
//! ```text
//!              ┌───────────── CallOptions.node ─────────────┐
//!              │                    │                       │
//!            Auto               Node(n)                    All
//!     random ring member      pinned node           every node, ring order
//!              │                    │                       │
//!              └──── sticky for read + write-back ──┘      broadcast
//! ```
//!
//! An unpinned call picks one node at random and keeps it for both the read
//! and any write-back of a computed value. A broadcast fetch populates every
//! node, running the computation at most once. Deletes without a pinned node
//! always fan out, since the key may have been written anywhere.
//!
//! # Fault Tolerance
//!
//! Nodes fail independently. An unreachable node reads as a miss and writes
//! as `false`; broadcasts carry on over the remaining nodes and never roll
//! back partial success.

use std::time::Duration;

use tracing::debug;

use super::entry::CacheEntry;
use super::metrics::{MetricsSnapshot, StoreMetrics};
use super::ring::Ring;
use super::router::{self, Route};
use super::options::CallOptions;
use super::store::{
    delete_from, delete_from_all, fetch_on, read_from, with_default_ttl, write_to, CacheStore,
    Compute, ComputeOnce, Fetched,
};
use crate::error::Result;

/// Cache store spread over a ring of nodes
pub struct MultiCache {
    ring: Ring,
    default_ttl: Option<Duration>,
    metrics: StoreMetrics,
}

impl MultiCache {
    /// Create a store over `ring`
    pub fn new(ring: Ring) -> Self {
        Self {
            ring,
            default_ttl: None,
            metrics: StoreMetrics::new(),
        }
    }

    /// TTL applied when a call gives none
    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// The ring
    pub fn ring(&self) -> &Ring {
        &self.ring
    }

    fn ttl(&self, options: &CallOptions) -> Option<Duration> {
        options.expires_in.or(self.default_ttl)
    }
}

impl std::fmt::Debug for MultiCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiCache")
            .field("ring", &self.ring)
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl CacheStore for MultiCache {
    fn name(&self) -> &'static str {
        "multi_cache"
    }

    fn fetch(
        &self,
        key: &str,
        options: &CallOptions,
        compute: Option<Compute<'_>>,
    ) -> Result<Fetched> {
        let ttl = self.ttl(options);
        let mut compute = ComputeOnce::new(compute);

        match router::route(&self.ring, &options.node) {
            Route::Broadcast(nodes) => {
                debug!(key, nodes = nodes.len(), "Broadcast fetch");
                let mut results = Vec::with_capacity(nodes.len());
                for node in nodes {
                    let pinned = options.pinned_to(node);
                    results.push(fetch_on(node, key, &pinned, ttl, &mut compute, &self.metrics)?);
                }
                Ok(Fetched::PerNode(results))
            }
            Route::Single(node) => {
                let value = fetch_on(node, key, options, ttl, &mut compute, &self.metrics)?;
                Ok(Fetched::Single(value))
            }
        }
    }

    fn read(&self, key: &str, options: &CallOptions) -> Result<Option<CacheEntry>> {
        for node in router::route(&self.ring, &options.node).nodes() {
            if let Some(entry) = read_from(node, key, &self.metrics)? {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    fn write(&self, key: &str, entry: CacheEntry, options: &CallOptions) -> Result<bool> {
        let entry = with_default_ttl(entry, self.ttl(options));
        router::route(&self.ring, &options.node)
            .nodes()
            .iter()
            .try_fold(false, |stored, node| {
                Ok(write_to(node, key, &entry, options.unless_exist, &self.metrics)? || stored)
            })
    }

    fn delete(&self, key: &str, options: &CallOptions) -> Result<bool> {
        match options.node.pinned() {
            Some(node) => delete_from(node, key, &self.metrics),
            None => delete_from_all(self.ring.nodes(), key, &self.metrics),
        }
    }

    fn copies(&self, _key: &str) -> Option<usize> {
        None
    }

    fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStoreExt, InMemoryNode, Node, WriteOptions};
    use bytes::Bytes;
    use std::sync::Arc;

    fn ring_of(n: usize) -> (Vec<Arc<InMemoryNode>>, MultiCache) {
        let nodes: Vec<Arc<InMemoryNode>> = (0..n)
            .map(|i| Arc::new(InMemoryNode::new(format!("mem-{i}"))))
            .collect();
        let ring = Ring::new(nodes.iter().map(|n| n.clone() as Arc<dyn Node>).collect()).unwrap();
        (nodes, MultiCache::new(ring))
    }

    fn total_ops(nodes: &[Arc<InMemoryNode>]) -> u64 {
        nodes.iter().map(|n| n.operations()).sum()
    }

    #[test]
    fn test_unpinned_read_contacts_one_node() {
        let (nodes, cache) = ring_of(3);
        for _ in 0..20 {
            let before = total_ops(&nodes);
            cache.read("k", &CallOptions::new()).unwrap();
            assert_eq!(total_ops(&nodes) - before, 1);
        }
    }

    #[test]
    fn test_unpinned_write_contacts_one_node() {
        let (nodes, cache) = ring_of(3);
        assert!(cache.write_value("k", "v", &CallOptions::new()).unwrap());
        let holders = nodes.iter().filter(|n| n.peek("k").is_some()).count();
        assert_eq!(holders, 1);
    }

    #[test]
    fn test_fetch_writes_back_to_the_node_it_read() {
        let (nodes, cache) = ring_of(4);
        for i in 0..25 {
            let key = format!("key-{i}");
            let before: Vec<u64> = nodes.iter().map(|n| n.stats().gets).collect();
            cache
                .fetch_with(&key, &CallOptions::new(), || Ok(Bytes::from("v")))
                .unwrap();

            // the node that missed is the node that got the value
            let reader = nodes
                .iter()
                .zip(&before)
                .position(|(n, gets)| n.stats().gets > *gets)
                .unwrap();
            let holders: Vec<usize> = (0..nodes.len())
                .filter(|&idx| nodes[idx].peek(&key).is_some())
                .collect();
            assert_eq!(holders, vec![reader]);
        }
    }

    #[test]
    fn test_pinned_fetch_sticks() {
        let (nodes, cache) = ring_of(3);
        let pinned: Arc<dyn Node> = nodes[1].clone();
        let opts = CallOptions::new().on_node(pinned);

        for _ in 0..10 {
            cache.fetch_with("k", &opts, || Ok(Bytes::from("v"))).unwrap();
        }
        assert_eq!(nodes[1].stats().gets, 10);
        assert_eq!(nodes[1].stats().sets, 1);
        assert_eq!(nodes[0].operations() + nodes[2].operations(), 0);
    }

    #[test]
    fn test_broadcast_fetch_computes_once() {
        let (nodes, cache) = ring_of(3);
        let mut calls = 0;

        let fetched = cache
            .fetch_with("k", &CallOptions::new().all_nodes(), || {
                calls += 1;
                Ok(Bytes::from("shared"))
            })
            .unwrap();

        assert_eq!(calls, 1);
        assert_eq!(fetched, Fetched::PerNode(vec![Some(Bytes::from("shared")); 3]));
        for node in &nodes {
            let stored = node.peek("k").map(|raw| CacheEntry::decode(raw).into_value());
            assert_eq!(stored, Some(Bytes::from("shared")));
        }
    }

    #[test]
    fn test_broadcast_fetch_keeps_existing_values() {
        let (nodes, cache) = ring_of(3);
        nodes[1]
            .set("k", CacheEntry::new("existing").encode(), &WriteOptions::default())
            .unwrap();

        let fetched = cache
            .fetch_with("k", &CallOptions::new().all_nodes(), || Ok(Bytes::from("fresh")))
            .unwrap();
        assert_eq!(
            fetched,
            Fetched::PerNode(vec![
                Some(Bytes::from("fresh")),
                Some(Bytes::from("existing")),
                Some(Bytes::from("fresh")),
            ])
        );
    }

    #[test]
    fn test_broadcast_fetch_without_compute_lists_reads() {
        let (nodes, cache) = ring_of(3);
        nodes[2]
            .set("k", Bytes::from("raw"), &WriteOptions::default())
            .unwrap();

        let fetched = cache.fetch("k", &CallOptions::new().all_nodes(), None).unwrap();
        assert_eq!(fetched, Fetched::PerNode(vec![None, None, Some(Bytes::from("raw"))]));
    }

    #[test]
    fn test_broadcast_fetch_skips_unreachable_node() {
        let (nodes, cache) = ring_of(3);
        nodes[0].set_online(false);

        let fetched = cache
            .fetch_with("k", &CallOptions::new().all_nodes(), || Ok(Bytes::from("v")))
            .unwrap();
        // value still returned for the unreachable node, nothing stored there
        assert_eq!(fetched.per_node().map(|v| v.len()), Some(3));
        assert!(nodes[1].peek("k").is_some());
        assert!(nodes[2].peek("k").is_some());
        assert_eq!(cache.metrics().failed_writes, 1);
    }

    #[test]
    fn test_delete_fans_out_with_or_reduction() {
        let (nodes, cache) = ring_of(3);
        nodes[2]
            .set("k", Bytes::from("v"), &WriteOptions::default())
            .unwrap();
        nodes[0].set_online(false);
        nodes[1].set_online(false);

        assert!(cache.delete("k", &CallOptions::new()).unwrap());
        for node in &nodes {
            assert_eq!(node.stats().deletes, 1);
        }
    }

    #[test]
    fn test_delete_missing_everywhere_is_false() {
        let (_nodes, cache) = ring_of(3);
        assert!(!cache.delete("k", &CallOptions::new()).unwrap());
    }

    #[test]
    fn test_pinned_delete_touches_one_node() {
        let (nodes, cache) = ring_of(3);
        let opts = CallOptions::new().all_nodes();
        cache.write_value("k", "v", &opts).unwrap();

        let pinned: Arc<dyn Node> = nodes[0].clone();
        assert!(cache.delete("k", &CallOptions::new().on_node(pinned)).unwrap());
        assert!(nodes[0].peek("k").is_none());
        assert!(nodes[1].peek("k").is_some());
        assert!(nodes[2].peek("k").is_some());
    }

    #[test]
    fn test_unless_exist_does_not_overwrite() {
        let (nodes, cache) = ring_of(2);
        let pinned: Arc<dyn Node> = nodes[0].clone();
        let opts = CallOptions::new().on_node(pinned).unless_exist();

        assert!(cache.write_value("k", "first", &opts).unwrap());
        assert!(!cache.write_value("k", "second", &opts).unwrap());
        assert_eq!(cache.read_value("k", &opts).unwrap(), Some(Bytes::from("first")));
    }

    #[test]
    fn test_read_from_unreachable_node_is_miss() {
        let (nodes, cache) = ring_of(1);
        nodes[0].set_online(false);
        assert_eq!(cache.read("k", &CallOptions::new()).unwrap(), None);
        assert!(!cache.write_value("k", "v", &CallOptions::new()).unwrap());
        assert_eq!(cache.metrics().connectivity_errors, 2);
    }

    #[test]
    fn test_broadcast_read_returns_first_hit() {
        let (nodes, cache) = ring_of(3);
        nodes[1]
            .set("k", Bytes::from("one"), &WriteOptions::default())
            .unwrap();
        nodes[2]
            .set("k", Bytes::from("two"), &WriteOptions::default())
            .unwrap();

        let value = cache.read_value("k", &CallOptions::new().all_nodes()).unwrap();
        assert_eq!(value, Some(Bytes::from("one")));
    }

    #[test]
    fn test_broadcast_write_reports_any_success() {
        let (nodes, cache) = ring_of(3);
        nodes[0].set_online(false);
        assert!(cache.write_value("k", "v", &CallOptions::new().all_nodes()).unwrap());

        nodes[1].set_online(false);
        nodes[2].set_online(false);
        assert!(!cache.write_value("k", "v", &CallOptions::new().all_nodes()).unwrap());
    }

    #[test]
    fn test_copies_is_unknown() {
        let (_nodes, cache) = ring_of(3);
        assert_eq!(cache.copies("anything"), None);
    }

    #[test]
    fn test_call_options_are_not_mutated() {
        let (_nodes, cache) = ring_of(3);
        let opts = CallOptions::new();
        cache.fetch_with("k", &opts, || Ok(Bytes::from("v"))).unwrap();
        assert!(matches!(opts.node, crate::cache::NodeSelector::Auto));
    }
}
