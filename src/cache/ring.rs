//! Node Ring
//!
//! Ordered, fixed-size set of nodes a multi-node store fans operations
//! across. Built once and never modified.

use std::fmt;
use std::sync::Arc;

use super::node::Node;
use crate::error::{Error, Result};

/// Ordered, non-empty node collection
#[derive(Clone)]
pub struct Ring {
    nodes: Arc<[Arc<dyn Node>]>,
}

impl Ring {
    /// Build a ring; fails with [`Error::EmptyRing`] for an empty list
    pub fn new(nodes: Vec<Arc<dyn Node>>) -> Result<Self> {
        if nodes.is_empty() {
            return Err(Error::EmptyRing);
        }
        Ok(Self {
            nodes: nodes.into(),
        })
    }

    /// All nodes in ring order
    #[inline]
    pub fn nodes(&self) -> &[Arc<dyn Node>] {
        &self.nodes
    }

    /// Node at `index`, if any
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Arc<dyn Node>> {
        self.nodes.get(index)
    }

    /// Number of nodes (never zero)
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false; kept for API symmetry with collections
    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Position of `node` in the ring, compared by identity
    pub fn position(&self, node: &Arc<dyn Node>) -> Option<usize> {
        self.nodes.iter().position(|n| Arc::ptr_eq(n, node))
    }

    /// Node labels in ring order
    pub fn ids(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.id().to_string()).collect()
    }
}

impl fmt::Debug for Ring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.nodes.iter().map(|n| n.id()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryNode;
    use assert_matches::assert_matches;

    fn nodes(n: usize) -> Vec<Arc<dyn Node>> {
        (0..n)
            .map(|i| Arc::new(InMemoryNode::new(format!("mem-{i}"))) as Arc<dyn Node>)
            .collect()
    }

    #[test]
    fn test_empty_ring_rejected() {
        assert_matches!(Ring::new(Vec::new()), Err(Error::EmptyRing));
    }

    #[test]
    fn test_ring_keeps_order() {
        let ring = Ring::new(nodes(3)).unwrap();
        assert_eq!(ring.len(), 3);
        assert!(!ring.is_empty());
        assert_eq!(ring.ids(), vec!["mem-0", "mem-1", "mem-2"]);
    }

    #[test]
    fn test_position_uses_identity() {
        let ring = Ring::new(nodes(2)).unwrap();
        let second = ring.get(1).unwrap().clone();
        assert_eq!(ring.position(&second), Some(1));

        // same label, different node
        let stranger: Arc<dyn Node> = Arc::new(InMemoryNode::new("mem-1"));
        assert_eq!(ring.position(&stranger), None);
    }

    #[test]
    fn test_clones_share_nodes() {
        let ring = Ring::new(nodes(2)).unwrap();
        let copy = ring.clone();
        assert!(Arc::ptr_eq(&ring.nodes()[0], &copy.nodes()[0]));
    }
}
