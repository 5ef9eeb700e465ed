//! Cache Nodes
//!
//! A node is one independent cache backend. Stores only ever talk to a node
//! through the closed [`Node`] capability set, so every backend (in-memory,
//! Redis, test doubles) plugs in behind the same four operations.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;

/// Result type for node operations
pub type NodeResult<T> = std::result::Result<T, NodeError>;

/// Errors raised by a node
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// The backend could not be reached (refused, dropped, timed out)
    #[error("node {node} unreachable: {reason}")]
    Connectivity { node: String, reason: String },

    /// The backend answered with an error
    #[error("backend error: {0}")]
    Backend(String),
}

impl NodeError {
    /// Build a connectivity error for `node`
    pub fn connectivity(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Connectivity {
            node: node.into(),
            reason: reason.into(),
        }
    }

    /// Build a backend error
    pub fn backend(reason: impl Into<String>) -> Self {
        Self::Backend(reason.into())
    }

    /// Whether stores should contain this error instead of propagating it
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity { .. })
    }
}

/// Options forwarded to a node on write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Time to live; `None` keeps the value until deleted
    pub ttl: Option<Duration>,
}

impl WriteOptions {
    /// Options with a TTL
    pub fn with_ttl(ttl: Option<Duration>) -> Self {
        Self { ttl }
    }
}

/// Cache node capability set
pub trait Node: Send + Sync + fmt::Debug {
    /// Stable label (usually the address)
    fn id(&self) -> &str;

    /// Get the raw value stored under `key`
    fn get(&self, key: &str) -> NodeResult<Option<Bytes>>;

    /// Store `value`, replacing any existing one
    fn set(&self, key: &str, value: Bytes, opts: &WriteOptions) -> NodeResult<bool>;

    /// Store `value` only if `key` is absent; `false` when it already exists
    fn set_if_absent(&self, key: &str, value: Bytes, opts: &WriteOptions) -> NodeResult<bool>;

    /// Delete `key`; `true` if something was removed
    fn delete(&self, key: &str) -> NodeResult<bool>;

    /// Whether the backend drops values itself once their write TTL passes
    fn expires_natively(&self) -> bool {
        false
    }
}

// =============================================================================
// In-Memory Node
// =============================================================================

/// Node operation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NodeStats {
    /// Keys currently stored (including not yet purged expired ones)
    pub keys: u64,
    /// Read operations
    pub gets: u64,
    /// Write operations (both conditional and unconditional)
    pub sets: u64,
    /// Delete operations
    pub deletes: u64,
    /// Operations rejected while offline
    pub refused: u64,
}

struct StoredValue {
    data: Bytes,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn new(data: Bytes, opts: &WriteOptions) -> Self {
        Self {
            data,
            expires_at: opts.ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_live(&self) -> bool {
        self.expires_at.map_or(true, |at| Instant::now() < at)
    }
}

/// Process-local node backed by a DashMap
///
/// Can be switched offline, after which every operation fails with a
/// connectivity error. That makes it the workhorse for exercising degraded
/// rings without a network.
pub struct InMemoryNode {
    id: String,
    storage: DashMap<String, StoredValue>,
    online: AtomicBool,
    gets: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    refused: AtomicU64,
}

impl InMemoryNode {
    /// Create a new, online node
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            storage: DashMap::new(),
            online: AtomicBool::new(true),
            gets: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            refused: AtomicU64::new(0),
        }
    }

    /// Simulate the backend going away or coming back
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Whether the node currently accepts operations
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Peek at a stored value without touching counters or the online flag
    pub fn peek(&self, key: &str) -> Option<Bytes> {
        self.storage
            .get(key)
            .filter(|v| v.is_live())
            .map(|v| v.data.clone())
    }

    /// Total operations received, refused ones included
    pub fn operations(&self) -> u64 {
        let stats = self.stats();
        stats.gets + stats.sets + stats.deletes
    }

    /// Get node statistics
    pub fn stats(&self) -> NodeStats {
        NodeStats {
            keys: self.storage.len() as u64,
            gets: self.gets.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            refused: self.refused.load(Ordering::Relaxed),
        }
    }

    fn ensure_online(&self) -> NodeResult<()> {
        if self.is_online() {
            Ok(())
        } else {
            self.refused.fetch_add(1, Ordering::Relaxed);
            Err(NodeError::connectivity(&self.id, "connection refused"))
        }
    }
}

impl fmt::Debug for InMemoryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryNode")
            .field("id", &self.id)
            .field("keys", &self.storage.len())
            .field("online", &self.is_online())
            .finish()
    }
}

impl Node for InMemoryNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn get(&self, key: &str) -> NodeResult<Option<Bytes>> {
        self.gets.fetch_add(1, Ordering::Relaxed);
        self.ensure_online()?;

        let expired = match self.storage.get(key) {
            Some(stored) if stored.is_live() => return Ok(Some(stored.data.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.storage.remove_if(key, |_, v| !v.is_live());
        }
        Ok(None)
    }

    fn set(&self, key: &str, value: Bytes, opts: &WriteOptions) -> NodeResult<bool> {
        self.sets.fetch_add(1, Ordering::Relaxed);
        self.ensure_online()?;

        self.storage
            .insert(key.to_string(), StoredValue::new(value, opts));
        Ok(true)
    }

    fn set_if_absent(&self, key: &str, value: Bytes, opts: &WriteOptions) -> NodeResult<bool> {
        self.sets.fetch_add(1, Ordering::Relaxed);
        self.ensure_online()?;

        match self.storage.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live() {
                    Ok(false)
                } else {
                    occupied.insert(StoredValue::new(value, opts));
                    Ok(true)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredValue::new(value, opts));
                Ok(true)
            }
        }
    }

    fn delete(&self, key: &str) -> NodeResult<bool> {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        self.ensure_online()?;

        Ok(self
            .storage
            .remove(key)
            .is_some_and(|(_, stored)| stored.is_live()))
    }

    fn expires_natively(&self) -> bool {
        true
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_delete() {
        let node = InMemoryNode::new("mem-0");
        assert_eq!(node.get("k").unwrap(), None);

        assert!(node.set("k", Bytes::from("v"), &WriteOptions::default()).unwrap());
        assert_eq!(node.get("k").unwrap(), Some(Bytes::from("v")));

        assert!(node.delete("k").unwrap());
        assert!(!node.delete("k").unwrap());
        assert_eq!(node.get("k").unwrap(), None);
    }

    #[test]
    fn test_set_if_absent_does_not_overwrite() {
        let node = InMemoryNode::new("mem-0");
        let opts = WriteOptions::default();

        assert!(node.set_if_absent("k", Bytes::from("first"), &opts).unwrap());
        assert!(!node.set_if_absent("k", Bytes::from("second"), &opts).unwrap());
        assert_eq!(node.peek("k"), Some(Bytes::from("first")));
    }

    #[test]
    fn test_ttl_expiry() {
        let node = InMemoryNode::new("mem-0");
        let opts = WriteOptions::with_ttl(Some(Duration::from_millis(1)));
        node.set("k", Bytes::from("v"), &opts).unwrap();

        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(node.get("k").unwrap(), None);
        // expired slot can be claimed conditionally
        assert!(node
            .set_if_absent("k", Bytes::from("fresh"), &WriteOptions::default())
            .unwrap());
    }

    #[test]
    fn test_offline_node_refuses() {
        let node = InMemoryNode::new("mem-1");
        node.set_online(false);

        let err = node.get("k").unwrap_err();
        assert!(err.is_connectivity());
        assert!(node
            .set("k", Bytes::from("v"), &WriteOptions::default())
            .unwrap_err()
            .is_connectivity());
        assert!(node.delete("k").unwrap_err().is_connectivity());
        assert_eq!(node.stats().refused, 3);

        node.set_online(true);
        assert_eq!(node.get("k").unwrap(), None);
    }

    #[test]
    fn test_stats_count_operations() {
        let node = InMemoryNode::new("mem-0");
        node.set("a", Bytes::from("1"), &WriteOptions::default()).unwrap();
        node.get("a").unwrap();
        node.get("b").unwrap();
        node.delete("a").unwrap();

        let stats = node.stats();
        assert_eq!(stats.gets, 2);
        assert_eq!(stats.sets, 1);
        assert_eq!(stats.deletes, 1);
        assert_eq!(stats.keys, 0);
        assert_eq!(node.operations(), 4);
    }

    #[test]
    fn test_backend_error_is_not_connectivity() {
        assert!(!NodeError::backend("WRONGTYPE").is_connectivity());
        assert!(NodeError::connectivity("redis://a", "refused").is_connectivity());
    }
}
