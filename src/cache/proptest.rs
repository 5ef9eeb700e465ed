//! Property-Based Tests for Routing and Fan-Out
//!
//! # Test Properties
//!
//! 1. **Pinning**: a pinned selector always routes to exactly that node
//! 2. **Broadcast Order**: `All` routes to the whole ring in order
//! 3. **Membership**: `Auto` always picks a ring member
//! 4. **OR-Reduction**: fan-out delete is true iff a reachable node held the key
//! 5. **Single Compute**: a broadcast fetch computes at most once

#![cfg(test)]

use std::sync::Arc;

use bytes::Bytes;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::node::{InMemoryNode, Node, WriteOptions};
use super::options::{CallOptions, NodeSelector};
use super::ring::Ring;
use super::router::route_with;
use super::store::{CacheStore, CacheStoreExt};
use super::MultiCache;

// =============================================================================
// Property Strategies
// =============================================================================

fn ring_size_strategy() -> impl Strategy<Value = usize> {
    1usize..=8
}

/// Per node: (online, holds the key)
fn node_state_strategy() -> impl Strategy<Value = Vec<(bool, bool)>> {
    prop::collection::vec((any::<bool>(), any::<bool>()), 1..=8)
}

fn build(n: usize) -> (Vec<Arc<InMemoryNode>>, Ring) {
    let nodes: Vec<Arc<InMemoryNode>> = (0..n)
        .map(|i| Arc::new(InMemoryNode::new(format!("mem-{i}"))))
        .collect();
    let ring = Ring::new(nodes.iter().map(|n| n.clone() as Arc<dyn Node>).collect()).unwrap();
    (nodes, ring)
}

// =============================================================================
// Routing Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_pinned_route_is_deterministic(n in ring_size_strategy(), pick in any::<prop::sample::Index>(), seed in any::<u64>()) {
        let (_nodes, ring) = build(n);
        let pinned = ring.nodes()[pick.index(n)].clone();
        let selector = NodeSelector::Node(pinned.clone());
        let mut rng = StdRng::seed_from_u64(seed);

        for _ in 0..8 {
            let route = route_with(&ring, &selector, &mut rng);
            prop_assert_eq!(route.nodes().len(), 1);
            prop_assert!(Arc::ptr_eq(&route.nodes()[0], &pinned));
        }
    }

    #[test]
    fn prop_broadcast_covers_ring_in_order(n in ring_size_strategy(), seed in any::<u64>()) {
        let (_nodes, ring) = build(n);
        let mut rng = StdRng::seed_from_u64(seed);
        let route = route_with(&ring, &NodeSelector::All, &mut rng);

        prop_assert_eq!(route.nodes().len(), n);
        for (routed, member) in route.nodes().iter().zip(ring.nodes()) {
            prop_assert!(Arc::ptr_eq(routed, member));
        }
    }

    #[test]
    fn prop_auto_picks_a_member(n in ring_size_strategy(), seed in any::<u64>()) {
        let (_nodes, ring) = build(n);
        let mut rng = StdRng::seed_from_u64(seed);
        let route = route_with(&ring, &NodeSelector::Auto, &mut rng);

        prop_assert_eq!(route.nodes().len(), 1);
        prop_assert!(ring.position(&route.nodes()[0]).is_some());
    }
}

// =============================================================================
// Fan-Out Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_delete_is_or_reduction(states in node_state_strategy()) {
        let (nodes, ring) = build(states.len());
        for (node, (_, holds)) in nodes.iter().zip(&states) {
            if *holds {
                node.set("k", Bytes::from("v"), &WriteOptions::default()).unwrap();
            }
        }
        for (node, (online, _)) in nodes.iter().zip(&states) {
            node.set_online(*online);
        }

        let cache = MultiCache::new(ring);
        let expected = states.iter().any(|(online, holds)| *online && *holds);
        prop_assert_eq!(cache.delete("k", &CallOptions::new()).unwrap(), expected);

        // every node was asked, reachable or not
        for node in &nodes {
            prop_assert_eq!(node.stats().deletes, 1);
        }
    }

    #[test]
    fn prop_broadcast_fetch_computes_at_most_once(states in node_state_strategy()) {
        let (nodes, ring) = build(states.len());
        for (node, (online, holds)) in nodes.iter().zip(&states) {
            if *holds {
                node.set("k", Bytes::from("cached"), &WriteOptions::default()).unwrap();
            }
            node.set_online(*online);
        }

        let cache = MultiCache::new(ring);
        let mut calls = 0u32;
        let fetched = cache
            .fetch_with("k", &CallOptions::new().all_nodes(), || {
                calls += 1;
                Ok(Bytes::from("computed"))
            })
            .unwrap();

        let any_miss = states.iter().any(|(online, holds)| !*online || !*holds);
        prop_assert_eq!(calls, u32::from(any_miss));
        prop_assert_eq!(fetched.per_node().map(|v| v.len()), Some(states.len()));
    }
}
