//! Cache Resolver
//!
//! Decides which store backs the process-wide cache handle and memoizes the
//! decision until it is reset.
//!
//! # Resolution Order
//!
//! 1. The configuration document names a `cache_store`: build it through the
//!    [`StoreRegistry`] with `servers` folded into `url` and the namespace
//!    stripped
//! 2. The default cache is a [`DistributedStore`]: wrap its connections in a
//!    [`MultiCache`], memoized on the distributed store itself
//! 3. Otherwise: the default cache, unchanged
//!
//! The resolver is an ordinary value passed to whoever needs the cache. The
//! host wires it to its [`Reloader`] so configuration reloads take effect.
//!
//! [`DistributedStore`]: crate::cache::DistributedStore
//! [`MultiCache`]: crate::cache::MultiCache

pub mod config;
pub mod registry;
pub mod reload;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::info;

use crate::cache::{CacheStore, CallOptions, Compute, Fetched};
use crate::error::Result;

pub use config::{AddressList, ConfigSource, FileConfigSource, HaCacheConfig, StaticConfigSource};
pub use registry::{StoreFactory, StoreRegistry, MEMORY_STORE, NULL_STORE, REDIS_CACHE_STORE};
pub use reload::{ReloadListener, Reloader};

/// Memoizing selector of the process-wide cache store
pub struct CacheResolver {
    source: Arc<dyn ConfigSource>,
    default_cache: Arc<dyn CacheStore>,
    registry: StoreRegistry,
    resolved: Mutex<Option<Arc<dyn CacheStore>>>,
    resolutions: AtomicU64,
}

impl CacheResolver {
    /// Create a resolver over `source`, falling back to `default_cache`
    pub fn new(source: Arc<dyn ConfigSource>, default_cache: Arc<dyn CacheStore>) -> Self {
        Self {
            source,
            default_cache,
            registry: StoreRegistry::new(),
            resolved: Mutex::new(None),
            resolutions: AtomicU64::new(0),
        }
    }

    /// Use a custom store registry
    pub fn with_registry(mut self, registry: StoreRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// The resolved store, resolving on first access
    ///
    /// Configuration errors propagate and leave the resolver unresolved, so
    /// the next access tries again.
    pub fn cache(&self) -> Result<Arc<dyn CacheStore>> {
        let mut resolved = self.resolved.lock();
        if let Some(store) = resolved.as_ref() {
            return Ok(Arc::clone(store));
        }

        let store = self.resolve()?;
        self.resolutions.fetch_add(1, Ordering::Relaxed);
        *resolved = Some(Arc::clone(&store));
        Ok(store)
    }

    /// Forget the resolved store
    pub fn reset(&self) {
        if self.resolved.lock().take().is_some() {
            info!("Cache store selection reset");
        }
    }

    /// Whether a store is currently memoized
    pub fn is_resolved(&self) -> bool {
        self.resolved.lock().is_some()
    }

    /// How many times resolution has run to completion
    pub fn resolutions(&self) -> u64 {
        self.resolutions.load(Ordering::Relaxed)
    }

    /// The fallback store
    pub fn default_cache(&self) -> &Arc<dyn CacheStore> {
        &self.default_cache
    }

    /// Fetch through the resolved store
    pub fn fetch(
        &self,
        key: &str,
        options: &CallOptions,
        compute: Option<Compute<'_>>,
    ) -> Result<Fetched> {
        self.cache()?.fetch(key, options, compute)
    }

    /// Fetch through the resolved store with a closure
    pub fn fetch_with<F>(&self, key: &str, options: &CallOptions, mut compute: F) -> Result<Fetched>
    where
        F: FnMut() -> Result<Bytes>,
    {
        self.fetch(key, options, Some(&mut compute))
    }

    /// Delete through the resolved store
    pub fn delete(&self, key: &str, options: &CallOptions) -> Result<bool> {
        self.cache()?.delete(key, options)
    }

    /// Replica count; never tracked
    pub fn copies(&self, _key: &str) -> Option<usize> {
        None
    }

    fn resolve(&self) -> Result<Arc<dyn CacheStore>> {
        let config = match self.source.load()? {
            Some(document) => HaCacheConfig::parse(&document)?,
            None => HaCacheConfig::default(),
        };

        if let Some(name) = config.cache_store.clone() {
            info!(store = %name, "Using configured high-availability cache store");
            return self.registry.lookup(&name, &config.for_shared_ring());
        }

        if let Some(distributed) = self.default_cache.as_distributed() {
            info!(
                nodes = distributed.nodes().len(),
                "Using multi cache over distributed default connections"
            );
            let store: Arc<dyn CacheStore> = distributed.multi_cache();
            return Ok(store);
        }

        info!(store = self.default_cache.name(), "Using default cache store");
        Ok(Arc::clone(&self.default_cache))
    }
}

impl ReloadListener for CacheResolver {
    fn on_reload(&self) {
        self.reset();
    }
}

// =============================================================================
// Tests
// =============================================================================
