//! Per-call options

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::node::Node;

/// Which node(s) a call targets
#[derive(Clone, Default)]
pub enum NodeSelector {
    /// Let the router pick
    #[default]
    Auto,
    /// Pin the call to one node
    Node(Arc<dyn Node>),
    /// Every node in the ring
    All,
}

impl NodeSelector {
    /// True for the broadcast selector
    pub fn is_all(&self) -> bool {
        matches!(self, NodeSelector::All)
    }

    /// The pinned node, when there is one
    pub fn pinned(&self) -> Option<&Arc<dyn Node>> {
        match self {
            NodeSelector::Node(node) => Some(node),
            _ => None,
        }
    }
}

impl fmt::Debug for NodeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeSelector::Auto => write!(f, "Auto"),
            NodeSelector::Node(node) => write!(f, "Node({})", node.id()),
            NodeSelector::All => write!(f, "All"),
        }
    }
}

/// Options for a single store call
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Target node selection
    pub node: NodeSelector,
    /// Write only if the key is absent
    pub unless_exist: bool,
    /// Expiry for written values; falls back to the store default
    pub expires_in: Option<Duration>,
    /// `fetch` skips the read and recomputes
    pub force: bool,
}

impl CallOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Target every node
    pub fn all_nodes(mut self) -> Self {
        self.node = NodeSelector::All;
        self
    }

    /// Pin to `node`
    pub fn on_node(mut self, node: Arc<dyn Node>) -> Self {
        self.node = NodeSelector::Node(node);
        self
    }

    /// Conditional write
    pub fn unless_exist(mut self) -> Self {
        self.unless_exist = true;
        self
    }

    /// Expire written values after `ttl`
    pub fn expires_in(mut self, ttl: Duration) -> Self {
        self.expires_in = Some(ttl);
        self
    }

    /// Skip the read in `fetch`
    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }

    /// Copy of these options pinned to `node`
    pub(crate) fn pinned_to(&self, node: &Arc<dyn Node>) -> Self {
        Self {
            node: NodeSelector::Node(Arc::clone(node)),
            ..self.clone()
        }
    }
}
