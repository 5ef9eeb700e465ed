//! ringcache - Multi-Node Cache Ring and Store Resolver
//!
//! One logical cache spread over several independent backend nodes, with
//! per-call control over which node (or every node) an operation touches,
//! and a resolver that decides at runtime which store backs the process-wide
//! cache.
//!
//! # Architecture
//!
//! ```text
//! ha_cache.yml ─▶ CacheResolver ─▶ CacheStore ─▶ Router ─▶ Ring of Nodes
//!                  (memoized)       (MultiCache,             (Redis,
//!                                    Distributed,             in-memory)
//!                                    SingleNode, Null)
//! ```
//!
//! # Modules
//!
//! - [`cache`] - Nodes, ring, router and the store implementations
//! - [`resolver`] - Configuration, store registry, resolver and reload hook
//! - [`error`] - Error types

pub mod cache;
pub mod error;
pub mod resolver;

// Re-export commonly used types
pub use cache::{
    CacheEntry, CacheStore, CacheStoreExt, CallOptions, DistributedStore, Fetched, InMemoryNode,
    MultiCache, Node, NodeSelector, RedisNode, Ring,
};
pub use error::{Error, Result};
pub use resolver::{CacheResolver, HaCacheConfig, Reloader, StoreRegistry};
