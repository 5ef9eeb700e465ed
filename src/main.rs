//! ringcache CLI
//!
//! Resolves the cache store the same way an application process would and
//! runs single operations against it.
//!
//! ```text
//! ringcache --default-url redis://a:6379,redis://b:6379 get session:42 --all
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use clap::{Parser, Subcommand};
use tracing::{debug, error, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ringcache::cache::CacheStore;
use ringcache::resolver::{
    AddressList, FileConfigSource, HaCacheConfig, MEMORY_STORE, REDIS_CACHE_STORE,
};
use ringcache::{CacheResolver, CacheStoreExt, CallOptions, Fetched, Result, StoreRegistry};

// =============================================================================
// CLI Arguments
// =============================================================================

/// ringcache - multi-node cache ring
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// High-availability cache configuration file
    #[arg(long, env = "RINGCACHE_CONFIG", default_value = "config/ha_cache.yml")]
    config: PathBuf,

    /// Default cache addresses (comma separated); none means in-memory
    #[arg(long, env = "RINGCACHE_DEFAULT_URL", value_delimiter = ',')]
    default_url: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the name of the resolved store
    Resolve,
    /// Read a key
    Get {
        key: String,
        /// Read from every node
        #[arg(long)]
        all: bool,
    },
    /// Write a key
    Set {
        key: String,
        value: String,
        /// Time to live in seconds
        #[arg(long)]
        ttl: Option<u64>,
        /// Only write when the key is absent
        #[arg(long)]
        unless_exist: bool,
        /// Write to every node
        #[arg(long)]
        all: bool,
    },
    /// Read a key, storing `default` on a miss
    Fetch {
        key: String,
        default: String,
        /// Fetch on every node
        #[arg(long)]
        all: bool,
    },
    /// Delete a key from every node
    Delete { key: String },
    /// Print the resolved store's metrics as JSON
    Stats,
}

// =============================================================================
// Main
// =============================================================================

fn main() {
    let args = Args::parse();
    init_logging(&args);

    if let Err(e) = run(args) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let registry = StoreRegistry::new();
    let default_cache = default_cache(&registry, &args.default_url)?;
    debug!(store = default_cache.name(), "Default cache store ready");

    let source = Arc::new(FileConfigSource::new(&args.config));
    let resolver = CacheResolver::new(source, default_cache).with_registry(registry);
    let store = resolver.cache()?;

    match args.command {
        Command::Resolve => println!("{}", store.name()),
        Command::Get { key, all } => {
            let options = select(CallOptions::new(), all);
            print_value(store.read_value(&key, &options)?.as_ref());
        }
        Command::Set {
            key,
            value,
            ttl,
            unless_exist,
            all,
        } => {
            let mut options = select(CallOptions::new(), all);
            if let Some(secs) = ttl {
                options = options.expires_in(Duration::from_secs(secs));
            }
            if unless_exist {
                options = options.unless_exist();
            }
            println!("{}", store.write_value(&key, value, &options)?);
        }
        Command::Fetch { key, default, all } => {
            let options = select(CallOptions::new(), all);
            let fetched = store.fetch_with(&key, &options, || Ok(Bytes::from(default.clone())))?;
            match fetched {
                Fetched::Single(value) => print_value(value.as_ref()),
                Fetched::PerNode(values) => values.iter().for_each(|v| print_value(v.as_ref())),
            }
        }
        Command::Delete { key } => println!("{}", resolver.delete(&key, &CallOptions::new())?),
        Command::Stats => {
            let snapshot = store.metrics();
            let json = serde_json::to_string_pretty(&snapshot)
                .map_err(|e| ringcache::Error::Config(format!("metrics encoding failed: {e}")))?;
            println!("{json}");
        }
    }

    Ok(())
}

/// Store used when the configuration names none
fn default_cache(registry: &StoreRegistry, urls: &[String]) -> Result<Arc<dyn CacheStore>> {
    let urls: Vec<String> = urls
        .iter()
        .map(|url| url.trim())
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect();

    if urls.is_empty() {
        return registry.lookup(MEMORY_STORE, &HaCacheConfig::default());
    }

    let config = HaCacheConfig {
        url: Some(AddressList::Many(urls)),
        ..HaCacheConfig::default()
    };
    registry.lookup(REDIS_CACHE_STORE, &config)
}

fn select(options: CallOptions, all: bool) -> CallOptions {
    if all {
        options.all_nodes()
    } else {
        options
    }
}

fn print_value(value: Option<&Bytes>) {
    match value {
        Some(value) => println!("{}", String::from_utf8_lossy(value)),
        None => println!("(miss)"),
    }
}

// =============================================================================
// Logging
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
