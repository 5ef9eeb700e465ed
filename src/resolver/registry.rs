//! Store Registry
//!
//! Maps `cache_store` names from the configuration document to factories
//! that build the store.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::config::HaCacheConfig;
use crate::cache::{
    CacheStore, DistributedStore, InMemoryNode, Node, NullStore, RedisNode, Ring, SingleNodeStore,
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_REDIS_URL,
};
use crate::error::{Error, Result};

/// Builds a store from configuration
pub type StoreFactory = Box<dyn Fn(&HaCacheConfig) -> Result<Arc<dyn CacheStore>> + Send + Sync>;

/// Redis store name
pub const REDIS_CACHE_STORE: &str = "redis_cache_store";
/// In-process store name
pub const MEMORY_STORE: &str = "memory_store";
/// No-op store name
pub const NULL_STORE: &str = "null_store";

/// Named store factories
pub struct StoreRegistry {
    factories: HashMap<String, StoreFactory>,
}

impl StoreRegistry {
    /// Registry with the built-in stores
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(REDIS_CACHE_STORE, build_redis_store);
        registry.register(MEMORY_STORE, build_memory_store);
        registry.register(NULL_STORE, |_config: &HaCacheConfig| {
            Ok(Arc::new(NullStore::new()) as Arc<dyn CacheStore>)
        });
        registry
    }

    /// Registry without any stores
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register (or replace) a factory under `name`
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&HaCacheConfig) -> Result<Arc<dyn CacheStore>> + Send + Sync + 'static,
    {
        self.factories
            .insert(normalize(name).to_string(), Box::new(factory));
    }

    /// Whether `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(normalize(name))
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Build the store registered under `name`
    pub fn lookup(&self, name: &str, config: &HaCacheConfig) -> Result<Arc<dyn CacheStore>> {
        let name = normalize(name);
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::UnknownStore(name.to_string()))?;
        debug!(store = name, "Building cache store");
        factory(config)
    }
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("stores", &self.names())
            .finish()
    }
}

/// Store names may be written with a leading `:`
fn normalize(name: &str) -> &str {
    name.trim().trim_start_matches(':')
}

/// One url: single-node store; several: distributed store
fn build_redis_store(config: &HaCacheConfig) -> Result<Arc<dyn CacheStore>> {
    let mut urls = config.urls();
    if urls.is_empty() {
        urls.push(DEFAULT_REDIS_URL.to_string());
    }
    let timeout = config.connect_timeout()?.unwrap_or(DEFAULT_CONNECT_TIMEOUT);

    let mut nodes = urls
        .iter()
        .map(|url| {
            RedisNode::with_timeout(url, timeout)
                .map(|node| Arc::new(node) as Arc<dyn Node>)
                .map_err(|e| Error::Config(format!("invalid redis url {url}: {e}")))
        })
        .collect::<Result<Vec<_>>>()?;

    if nodes.len() == 1 {
        let node = nodes.remove(0);
        let store = SingleNodeStore::new(node)
            .with_namespace(config.namespace.clone())
            .with_default_ttl(config.default_ttl());
        return Ok(Arc::new(store));
    }

    let store = DistributedStore::new(Ring::new(nodes)?)
        .with_namespace(config.namespace.clone())
        .with_default_ttl(config.default_ttl());
    Ok(Arc::new(store))
}

fn build_memory_store(config: &HaCacheConfig) -> Result<Arc<dyn CacheStore>> {
    let store = SingleNodeStore::new(Arc::new(InMemoryNode::new(MEMORY_STORE)))
        .with_namespace(config.namespace.clone())
        .with_default_ttl(config.default_ttl());
    Ok(Arc::new(store))
}

// =============================================================================
// Tests
// =============================================================================
