//! Multi-Node Cache
//!
//! Stores that spread one logical cache over independent backend nodes.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                        CacheStore facade                             │
//! │   fetch · read · write · delete · copies                              │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │   MultiCache          │ DistributedStore     │ SingleNodeStore       │
//! │   random / pinned /   │ key-hash shards      │ one node              │
//! │   broadcast routing   │                      │                       │
//! ├───────────────────────┴──────────────────────┴───────────────────────┤
//! │                    Key Router  →  Ring (immutable)                   │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │   Node: get · set · set_if_absent · delete                           │
//! │   InMemoryNode (DashMap)          RedisNode (blocking, reconnecting) │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Failure Model
//!
//! - Connectivity errors are classified at the node boundary and contained
//!   by the stores: miss on read, `false` on write and delete
//! - Backend errors (protocol, command) propagate as [`crate::Error::Node`]
//! - Broadcasts succeed or fail per node; nothing is rolled back

mod distributed;
mod entry;
mod metrics;
mod multi;
mod node;
mod options;
mod redis_node;
mod ring;
mod store;
pub mod router;

#[cfg(test)]
mod proptest;

pub use distributed::DistributedStore;
pub use entry::CacheEntry;
pub use metrics::{MetricsSnapshot, StoreMetrics};
pub use multi::MultiCache;
pub use node::{InMemoryNode, Node, NodeError, NodeResult, NodeStats, WriteOptions};
pub use options::{CallOptions, NodeSelector};
pub use redis_node::{RedisNode, DEFAULT_CONNECT_TIMEOUT};
pub use ring::Ring;
pub use router::Route;
pub use store::{CacheStore, CacheStoreExt, Compute, Fetched, NullStore, SingleNodeStore};

/// Default Redis address when a store is configured without one
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
