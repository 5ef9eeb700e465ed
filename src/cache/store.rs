//! Cache Store Contract
//!
//! [`CacheStore`] is the facade every store implements, from the multi-node
//! ring down to the null store. The node-level helpers in this module hold
//! the error containment rules shared by all of them: a connectivity failure
//! on read is a miss, on write or delete it is `false`, and anything else
//! propagates.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, warn};

use super::distributed::DistributedStore;
use super::entry::CacheEntry;
use super::metrics::{MetricsSnapshot, StoreMetrics};
use super::node::{Node, NodeResult, WriteOptions};
use super::options::CallOptions;
use crate::error::Result;

/// Value-producing computation for `fetch`
pub type Compute<'f> = &'f mut dyn FnMut() -> Result<Bytes>;

/// Result of a fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    /// Routed fetch: the stored or computed value
    Single(Option<Bytes>),
    /// Broadcast fetch: one result per node, in ring order
    PerNode(Vec<Option<Bytes>>),
}

impl Fetched {
    /// Single value; for broadcasts, the first node that produced one
    pub fn into_value(self) -> Option<Bytes> {
        match self {
            Fetched::Single(value) => value,
            Fetched::PerNode(values) => values.into_iter().flatten().next(),
        }
    }

    /// Per-node results of a broadcast fetch
    pub fn per_node(&self) -> Option<&[Option<Bytes>]> {
        match self {
            Fetched::PerNode(values) => Some(values),
            Fetched::Single(_) => None,
        }
    }
}

/// Cache store facade
pub trait CacheStore: Send + Sync {
    /// Short implementation name, for logs and the CLI
    fn name(&self) -> &'static str;

    /// Read `key`, computing and writing back the value on a miss
    fn fetch(&self, key: &str, options: &CallOptions, compute: Option<Compute<'_>>)
        -> Result<Fetched>;

    /// Read `key`; `None` on miss, expiry or unreachable node
    fn read(&self, key: &str, options: &CallOptions) -> Result<Option<CacheEntry>>;

    /// Write `entry` under `key`; `false` when nothing was stored
    fn write(&self, key: &str, entry: CacheEntry, options: &CallOptions) -> Result<bool>;

    /// Delete `key`; `true` if any node removed it
    fn delete(&self, key: &str, options: &CallOptions) -> Result<bool>;

    /// Replica count for `key`, `None` when unknown
    fn copies(&self, _key: &str) -> Option<usize> {
        None
    }

    /// Metrics snapshot
    fn metrics(&self) -> MetricsSnapshot;

    /// The store as a distributed connection set, if it is one
    fn as_distributed(&self) -> Option<&DistributedStore> {
        None
    }
}

/// Convenience calls on any store
pub trait CacheStoreExt: CacheStore {
    /// Fetch with a closure instead of a `dyn` reference
    fn fetch_with<F>(&self, key: &str, options: &CallOptions, mut compute: F) -> Result<Fetched>
    where
        F: FnMut() -> Result<Bytes>,
    {
        self.fetch(key, options, Some(&mut compute))
    }

    /// Write a bare value, wrapping it in an entry
    fn write_value(&self, key: &str, value: impl Into<Bytes>, options: &CallOptions) -> Result<bool> {
        self.write(key, CacheEntry::new(value), options)
    }

    /// Read just the value
    fn read_value(&self, key: &str, options: &CallOptions) -> Result<Option<Bytes>> {
        Ok(self.read(key, options)?.map(CacheEntry::into_value))
    }
}

impl<T: CacheStore + ?Sized> CacheStoreExt for T {}

// =============================================================================
// Node-level operations
// =============================================================================

/// Memoized compute for one logical fetch
pub(crate) struct ComputeOnce<'f> {
    compute: Option<Compute<'f>>,
    value: Option<Bytes>,
}

impl<'f> ComputeOnce<'f> {
    pub(crate) fn new(compute: Option<Compute<'f>>) -> Self {
        Self {
            compute,
            value: None,
        }
    }

    /// Computed value; runs the computation on first call only
    pub(crate) fn get(&mut self, metrics: &StoreMetrics) -> Result<Option<Bytes>> {
        if let Some(value) = &self.value {
            return Ok(Some(value.clone()));
        }
        let Some(compute) = self.compute.as_mut() else {
            return Ok(None);
        };
        let value = compute()?;
        metrics.record_compute();
        self.value = Some(value.clone());
        Ok(Some(value))
    }
}

/// Split a node result into contained connectivity failures and the rest
fn contain<T>(
    result: NodeResult<T>,
    node: &Arc<dyn Node>,
    key: &str,
    op: &str,
    metrics: &StoreMetrics,
) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_connectivity() => {
            warn!(node = node.id(), key, op, error = %err, "Cache node unreachable");
            metrics.record_connectivity_error();
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

/// Read and normalize an entry from one node
///
/// An expired entry is a miss. It is purged only from nodes that do not
/// expire values themselves.
pub(crate) fn read_from(
    node: &Arc<dyn Node>,
    key: &str,
    metrics: &StoreMetrics,
) -> Result<Option<CacheEntry>> {
    let raw = contain(node.get(key), node, key, "get", metrics)?.flatten();
    let Some(raw) = raw else {
        metrics.record_miss();
        return Ok(None);
    };

    let entry = CacheEntry::decode(raw);
    if entry.is_expired() {
        debug!(node = node.id(), key, "Dropping expired cache entry");
        metrics.record_miss();
        // the purge is a plain delete and may drop a value written since the get
        if !node.expires_natively() {
            if let Err(err) = node.delete(key) {
                debug!(node = node.id(), key, error = %err, "Expired entry purge failed");
            }
        }
        return Ok(None);
    }

    metrics.record_hit();
    Ok(Some(entry))
}

/// Write an entry to one node
pub(crate) fn write_to(
    node: &Arc<dyn Node>,
    key: &str,
    entry: &CacheEntry,
    unless_exist: bool,
    metrics: &StoreMetrics,
) -> Result<bool> {
    let opts = WriteOptions::with_ttl(entry.remaining_ttl());
    let payload = entry.encode();
    let result = if unless_exist {
        node.set_if_absent(key, payload, &opts)
    } else {
        node.set(key, payload, &opts)
    };

    let stored = contain(result, node, key, "set", metrics)?.unwrap_or(false);
    metrics.record_write(stored);
    Ok(stored)
}

/// Delete from one node
pub(crate) fn delete_from(node: &Arc<dyn Node>, key: &str, metrics: &StoreMetrics) -> Result<bool> {
    let removed = contain(node.delete(key), node, key, "delete", metrics)?.unwrap_or(false);
    if removed {
        metrics.record_delete();
    }
    Ok(removed)
}

/// Delete from every node; true if any removed the key
pub(crate) fn delete_from_all(
    nodes: &[Arc<dyn Node>],
    key: &str,
    metrics: &StoreMetrics,
) -> Result<bool> {
    nodes.iter().try_fold(false, |removed, node| {
        Ok(delete_from(node, key, metrics)? || removed)
    })
}

/// Sticky fetch against a single node: read, then compute and write back
pub(crate) fn fetch_on(
    node: &Arc<dyn Node>,
    key: &str,
    options: &CallOptions,
    ttl: Option<Duration>,
    compute: &mut ComputeOnce<'_>,
    metrics: &StoreMetrics,
) -> Result<Option<Bytes>> {
    if !options.force {
        if let Some(entry) = read_from(node, key, metrics)? {
            return Ok(Some(entry.into_value()));
        }
    }

    let Some(value) = compute.get(metrics)? else {
        return Ok(None);
    };
    let entry = entry_for(value.clone(), ttl);
    if !write_to(node, key, &entry, options.unless_exist, metrics)? {
        debug!(node = node.id(), key, "Computed value not stored");
    }
    Ok(Some(value))
}

/// Build an entry applying `ttl`
pub(crate) fn entry_for(value: Bytes, ttl: Option<Duration>) -> CacheEntry {
    match ttl {
        Some(ttl) => CacheEntry::with_ttl(value, ttl),
        None => CacheEntry::new(value),
    }
}

/// Give an entry without expiry the call or store default TTL
pub(crate) fn with_default_ttl(entry: CacheEntry, ttl: Option<Duration>) -> CacheEntry {
    match ttl {
        Some(ttl) if entry.expires_at().is_none() => CacheEntry::with_ttl(entry.into_value(), ttl),
        _ => entry,
    }
}

/// Prefix `key` with `namespace`
pub(crate) fn namespaced<'k>(namespace: Option<&str>, key: &'k str) -> Cow<'k, str> {
    match namespace {
        Some(ns) => Cow::Owned(format!("{ns}:{key}")),
        None => Cow::Borrowed(key),
    }
}

// =============================================================================
// Single-node store
// =============================================================================

/// Store proxying a single node
pub struct SingleNodeStore {
    node: Arc<dyn Node>,
    namespace: Option<String>,
    default_ttl: Option<Duration>,
    metrics: StoreMetrics,
}

impl SingleNodeStore {
    /// Create a store over `node`
    pub fn new(node: Arc<dyn Node>) -> Self {
        Self {
            node,
            namespace: None,
            default_ttl: None,
            metrics: StoreMetrics::new(),
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

    /// The proxied node
    pub fn node(&self) -> &Arc<dyn Node> {
        &self.node
    }

    /// Configured namespace
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    fn target<'a>(&'a self, options: &'a CallOptions) -> &'a Arc<dyn Node> {
        options.node.pinned().unwrap_or(&self.node)
    }
}

impl CacheStore for SingleNodeStore {
    fn name(&self) -> &'static str {
        "single_node_store"
    }

    fn fetch(
        &self,
        key: &str,
        options: &CallOptions,
        compute: Option<Compute<'_>>,
    ) -> Result<Fetched> {
        let key = namespaced(self.namespace(), key);
        let ttl = options.expires_in.or(self.default_ttl);
        let mut compute = ComputeOnce::new(compute);
        let value = fetch_on(self.target(options), &key, options, ttl, &mut compute, &self.metrics)?;

        if options.node.is_all() {
            Ok(Fetched::PerNode(vec![value]))
        } else {
            Ok(Fetched::Single(value))
        }
    }

    fn read(&self, key: &str, options: &CallOptions) -> Result<Option<CacheEntry>> {
        let key = namespaced(self.namespace(), key);
        read_from(self.target(options), &key, &self.metrics)
    }

    fn write(&self, key: &str, entry: CacheEntry, options: &CallOptions) -> Result<bool> {
        let key = namespaced(self.namespace(), key);
        let entry = with_default_ttl(entry, options.expires_in.or(self.default_ttl));
        write_to(self.target(options), &key, &entry, options.unless_exist, &self.metrics)
    }

    fn delete(&self, key: &str, options: &CallOptions) -> Result<bool> {
        let key = namespaced(self.namespace(), key);
        delete_from(self.target(options), &key, &self.metrics)
    }

    fn copies(&self, _key: &str) -> Option<usize> {
        Some(1)
    }

    fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

// =============================================================================
// Null store
// =============================================================================

/// Store that keeps nothing: every read misses, every write succeeds
#[derive(Debug, Default)]
pub struct NullStore {
    metrics: StoreMetrics,
}

impl NullStore {
    /// Create a null store
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for NullStore {
    fn name(&self) -> &'static str {
        "null_store"
    }

    fn fetch(
        &self,
        _key: &str,
        options: &CallOptions,
        compute: Option<Compute<'_>>,
    ) -> Result<Fetched> {
        self.metrics.record_miss();
        let value = ComputeOnce::new(compute).get(&self.metrics)?;
        if options.node.is_all() {
            Ok(Fetched::PerNode(vec![value]))
        } else {
            Ok(Fetched::Single(value))
        }
    }

    fn read(&self, _key: &str, _options: &CallOptions) -> Result<Option<CacheEntry>> {
        self.metrics.record_miss();
        Ok(None)
    }

    fn write(&self, _key: &str, _entry: CacheEntry, _options: &CallOptions) -> Result<bool> {
        self.metrics.record_write(true);
        Ok(true)
    }

    fn delete(&self, _key: &str, _options: &CallOptions) -> Result<bool> {
        Ok(false)
    }

    fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

// =============================================================================
// Tests
// =============================================================================
