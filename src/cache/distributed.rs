//! Distributed Store
//!
//! Key-sharded store over several backend connections: each key lives on the
//! node its hash selects. This is the usual shape of a clustered default
//! cache, and the connection set it owns can be re-wrapped as a
//! [`MultiCache`] for callers that want broadcast semantics instead.

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use tracing::debug;

use super::entry::CacheEntry;
use super::metrics::{MetricsSnapshot, StoreMetrics};
use super::multi::MultiCache;
use super::node::Node;
use super::options::CallOptions;
use super::ring::Ring;
use super::router;
use super::store::{
    delete_from, fetch_on, namespaced, read_from, with_default_ttl, write_to, CacheStore, Compute,
    ComputeOnce, Fetched,
};
use crate::error::Result;

/// Hash-sharded store over a connection set
pub struct DistributedStore {
    ring: Ring,
    namespace: Option<String>,
    default_ttl: Option<Duration>,
    metrics: StoreMetrics,
    multi_cache: OnceCell<Arc<MultiCache>>,
}

impl DistributedStore {
    /// Create a store sharding keys across `ring`
    pub fn new(ring: Ring) -> Self {
        Self {
            ring,
            namespace: None,
            default_ttl: None,
            metrics: StoreMetrics::new(),
            multi_cache: OnceCell::new(),
        }
    }

    /// Prefix every key with `namespace`
    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }

    /// TTL applied when a call gives none
    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Backend connections
    pub fn nodes(&self) -> &[Arc<dyn Node>] {
        self.ring.nodes()
    }

    /// The connection set wrapped as a multi-node store
    ///
    /// Built on first call and kept on this store, so every caller sees the
    /// same instance.
    pub fn multi_cache(&self) -> Arc<MultiCache> {
        self.multi_cache
            .get_or_init(|| {
                debug!(nodes = self.ring.len(), "Wrapping distributed connections in a multi cache");
                Arc::new(MultiCache::new(self.ring.clone()))
            })
            .clone()
    }

    fn shard(&self, key: &str) -> &Arc<dyn Node> {
        router::pick_by_key(&self.ring, key)
    }

    fn targets<'a>(&'a self, key: &str, options: &'a CallOptions) -> &'a [Arc<dyn Node>] {
        if options.node.is_all() {
            self.ring.nodes()
        } else {
            std::slice::from_ref(options.node.pinned().unwrap_or_else(|| self.shard(key)))
        }
    }
}

impl CacheStore for DistributedStore {
    fn name(&self) -> &'static str {
        "distributed_store"
    }

    fn fetch(
        &self,
        key: &str,
        options: &CallOptions,
        compute: Option<Compute<'_>>,
    ) -> Result<Fetched> {
        let key = namespaced(self.namespace.as_deref(), key);
        let ttl = options.expires_in.or(self.default_ttl);
        let mut compute = ComputeOnce::new(compute);

        if options.node.is_all() {
            let mut results = Vec::with_capacity(self.ring.len());
            for node in self.ring.nodes() {
                let pinned = options.pinned_to(node);
                results.push(fetch_on(node, &key, &pinned, ttl, &mut compute, &self.metrics)?);
            }
            return Ok(Fetched::PerNode(results));
        }

        let node = options.node.pinned().unwrap_or_else(|| self.shard(&key));
        let value = fetch_on(node, &key, options, ttl, &mut compute, &self.metrics)?;
        Ok(Fetched::Single(value))
    }

    fn read(&self, key: &str, options: &CallOptions) -> Result<Option<CacheEntry>> {
        let key = namespaced(self.namespace.as_deref(), key);
        for node in self.targets(&key, options) {
            if let Some(entry) = read_from(node, &key, &self.metrics)? {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    fn write(&self, key: &str, entry: CacheEntry, options: &CallOptions) -> Result<bool> {
        let key = namespaced(self.namespace.as_deref(), key);
        let entry = with_default_ttl(entry, options.expires_in.or(self.default_ttl));
        self.targets(&key, options)
            .iter()
            .try_fold(false, |stored, node| {
                Ok(write_to(node, &key, &entry, options.unless_exist, &self.metrics)? || stored)
            })
    }

    fn delete(&self, key: &str, options: &CallOptions) -> Result<bool> {
        let key = namespaced(self.namespace.as_deref(), key);
        self.targets(&key, options)
            .iter()
            .try_fold(false, |removed, node| {
                Ok(delete_from(node, &key, &self.metrics)? || removed)
            })
    }

    fn copies(&self, _key: &str) -> Option<usize> {
        Some(1)
    }

    fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn as_distributed(&self) -> Option<&DistributedStore> {
        Some(self)
    }
}

// =============================================================================
// Tests
// =============================================================================
