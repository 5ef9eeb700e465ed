//! High-Availability Cache Configuration
//!
//! The resolver reads a small YAML document (traditionally `ha_cache.yml`)
//! from a [`ConfigSource`]. Every field is optional; an absent or empty
//! document means "no dedicated store configured".
//!
//! ```yaml
//! cache_store: redis_cache_store
//! servers:
//!   - redis://cache-a:6379
//!   - redis://cache-b:6379
//! expires_in: 300
//! connect_timeout: 0.5
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// A single address or a list of them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AddressList {
    One(String),
    Many(Vec<String>),
}

impl AddressList {
    /// Addresses as a list
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            AddressList::One(url) => vec![url.clone()],
            AddressList::Many(urls) => urls.clone(),
        }
    }
}

/// Parsed configuration document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HaCacheConfig {
    /// Store implementation to build (registry name)
    #[serde(default)]
    pub cache_store: Option<String>,
    /// Backend addresses; takes precedence over `url`
    #[serde(default)]
    pub servers: Option<AddressList>,
    /// Backend addresses
    #[serde(default)]
    pub url: Option<AddressList>,
    /// Key prefix
    #[serde(default)]
    pub namespace: Option<String>,
    /// Default TTL in seconds
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Connect timeout in seconds
    #[serde(default)]
    pub connect_timeout: Option<f64>,
    /// Backend-specific options passed through untouched
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl HaCacheConfig {
    /// Parse a YAML document; blank or `null` documents yield the default
    pub fn parse(document: &str) -> Result<Self> {
        if document.trim().is_empty() {
            return Ok(Self::default());
        }
        let parsed: Option<Self> = serde_yaml::from_str(document)?;
        Ok(parsed.unwrap_or_default())
    }

    /// Backend addresses, `servers` first
    pub fn urls(&self) -> Vec<String> {
        self.servers
            .as_ref()
            .or(self.url.as_ref())
            .map(AddressList::to_vec)
            .unwrap_or_default()
    }

    /// Default TTL
    pub fn default_ttl(&self) -> Option<Duration> {
        self.expires_in.map(Duration::from_secs)
    }

    /// Connect timeout, if configured and valid
    pub fn connect_timeout(&self) -> Result<Option<Duration>> {
        self.connect_timeout
            .map(|secs| {
                Duration::try_from_secs_f64(secs)
                    .map_err(|_| Error::Config(format!("invalid connect_timeout: {secs}")))
            })
            .transpose()
    }

    /// Options for a store shared by the whole ring
    ///
    /// `servers` is folded into `url` and the namespace is dropped: every
    /// process must see the same keys on every node.
    pub fn for_shared_ring(mut self) -> Self {
        if let Some(servers) = self.servers.take() {
            self.url = Some(servers);
        }
        if let Some(namespace) = self.namespace.take() {
            debug!(namespace = %namespace, "Ignoring namespace for shared cache ring");
        }
        self
    }
}

// =============================================================================
// Config Sources
// =============================================================================

/// Where the configuration document comes from
pub trait ConfigSource: Send + Sync {
    /// Raw document, `None` when there is none
    fn load(&self) -> Result<Option<String>>;
}

/// In-memory document, replaceable at runtime
#[derive(Debug, Default)]
pub struct StaticConfigSource {
    document: RwLock<Option<String>>,
}

impl StaticConfigSource {
    /// Source holding `document`
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: RwLock::new(Some(document.into())),
        }
    }

    /// Source without a document
    pub fn empty() -> Self {
        Self::default()
    }

    /// Swap the document; takes effect on the next resolution
    pub fn replace(&self, document: Option<String>) {
        *self.document.write() = document;
    }
}

impl ConfigSource for StaticConfigSource {
    fn load(&self) -> Result<Option<String>> {
        Ok(self.document.read().clone())
    }
}

/// Document read from disk on every load
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    /// Source reading `path`; a missing file counts as no document
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Configured path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for FileConfigSource {
    fn load(&self) -> Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(document) => Ok(Some(document)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No cache configuration file");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
