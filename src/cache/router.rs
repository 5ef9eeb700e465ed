//! Key Router
//!
//! Decides which node(s) take part in a call. Routing is a pure function of
//! the ring, the selector and a random source; nothing is remembered between
//! calls, so every unpinned call re-rolls its node.

use std::sync::Arc;

use rand::Rng;

use super::node::Node;
use super::options::NodeSelector;
use super::ring::Ring;

/// Nodes selected for one call
#[derive(Debug, Clone, Copy)]
pub enum Route<'a> {
    /// Exactly one node
    Single(&'a Arc<dyn Node>),
    /// Every node, in ring order
    Broadcast(&'a [Arc<dyn Node>]),
}

impl<'a> Route<'a> {
    /// Selected nodes as a slice
    pub fn nodes(&self) -> &'a [Arc<dyn Node>] {
        match *self {
            Route::Single(node) => std::slice::from_ref(node),
            Route::Broadcast(nodes) => nodes,
        }
    }

    /// True for broadcast routes
    pub fn is_broadcast(&self) -> bool {
        matches!(self, Route::Broadcast(_))
    }
}

/// Route with the thread-local RNG
pub fn route<'a>(ring: &'a Ring, selector: &'a NodeSelector) -> Route<'a> {
    route_with(ring, selector, &mut rand::thread_rng())
}

/// Route with a caller-supplied RNG
pub fn route_with<'a, R: Rng + ?Sized>(
    ring: &'a Ring,
    selector: &'a NodeSelector,
    rng: &mut R,
) -> Route<'a> {
    match selector {
        NodeSelector::All => Route::Broadcast(ring.nodes()),
        NodeSelector::Node(node) => Route::Single(node),
        NodeSelector::Auto => Route::Single(pick_random(ring, rng)),
    }
}

/// Uniformly random ring member
pub fn pick_random<'a, R: Rng + ?Sized>(ring: &'a Ring, rng: &mut R) -> &'a Arc<dyn Node> {
    &ring.nodes()[rng.gen_range(0..ring.len())]
}

/// Node owning `key` under hash placement
pub fn pick_by_key<'a>(ring: &'a Ring, key: &str) -> &'a Arc<dyn Node> {
    let index = (key_hash(key.as_bytes()) % ring.len() as u64) as usize;
    &ring.nodes()[index]
}

/// Fast non-cryptographic hash (FxHash algorithm)
#[inline]
pub fn key_hash(bytes: &[u8]) -> u64 {
    const SEED: u64 = 0x517cc1b727220a95;
    let mut hash = SEED;
    for &byte in bytes {
        hash = hash.rotate_left(5) ^ (byte as u64);
        hash = hash.wrapping_mul(SEED);
    }
    hash
}

// =============================================================================
// Tests
// =============================================================================
