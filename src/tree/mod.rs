//! The macro tree: folders, macros, event bindings and action items.
//!
//! Nodes live in an arena owned by [`MacroTree`]; everything else (handler
//! table, program counters, return stacks) refers to them by [`NodeId`]. The
//! structure is fixed once built. Enabled flags are atomics so another thread
//! can toggle items while a dispatch is walking the tree.

mod builder;
mod document;

use crate::actions::Action;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use builder::TreeBuilder;
pub use document::{ItemDocument, TreeDocument};

/// Index of a node inside its [`MacroTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Interpreter position: a node plus its index inside the parent's children.
/// `index` is `None` for the entry macro of a handler or a jump target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramPosition {
    pub node: NodeId,
    pub index: Option<usize>,
}

impl ProgramPosition {
    pub fn entry(node: NodeId) -> Self {
        Self { node, index: None }
    }
}

/// Structural path of a node (child indices from the root). Handlers of one
/// dispatch run in ascending path order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemPath(Vec<usize>);

impl ItemPath {
    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }
}

impl fmt::Display for ItemPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|idx| idx.to_string()).collect();
        write!(f, "/{}", parts.join("/"))
    }
}

pub enum NodeKind {
    Root,
    Folder,
    /// Sequencing container; may hold actions, event bindings and nested macros.
    Macro,
    /// Binds the parent macro to every event string matching `pattern`.
    Event { pattern: String },
    Action(Arc<dyn Action>),
}

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Root => "root",
            NodeKind::Folder => "folder",
            NodeKind::Macro => "macro",
            NodeKind::Event { .. } => "event",
            NodeKind::Action(_) => "action",
        }
    }

    /// Whether the interpreter can land on this node.
    pub fn is_executable(&self) -> bool {
        matches!(self, NodeKind::Macro | NodeKind::Action(_))
    }
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Event { pattern } => f.debug_struct("Event").field("pattern", pattern).finish(),
            NodeKind::Action(action) => f.debug_tuple("Action").field(&action.name()).finish(),
            other => f.write_str(other.label()),
        }
    }
}

#[derive(Debug)]
pub struct Node {
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
    enabled: AtomicBool,
}

impl Node {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// The node's own flag, ignoring ancestors.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct MacroTree {
    nodes: Vec<Node>,
}

impl MacroTree {
    pub fn builder() -> TreeBuilder {
        TreeBuilder::new()
    }

    /// A tree holding only the root.
    pub fn empty() -> Self {
        TreeBuilder::new().build()
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(Node::parent)
    }

    pub fn name(&self, id: NodeId) -> &str {
        self.node(id).map(Node::name).unwrap_or("")
    }

    pub fn set_enabled(&self, id: NodeId, enabled: bool) -> bool {
        match self.node(id) {
            Some(node) if !matches!(node.kind, NodeKind::Root) => {
                node.enabled.store(enabled, Ordering::Release);
                true
            }
            _ => false,
        }
    }

    /// True when the node and every ancestor are enabled. Evaluated on each
    /// call, so a toggle from another thread is visible to the next check.
    pub fn is_active(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node_id) = current {
            let Some(node) = self.node(node_id) else {
                return false;
            };
            if !node.is_enabled() {
                return false;
            }
            current = node.parent;
        }
        true
    }

    pub fn item_path(&self, id: NodeId) -> ItemPath {
        let mut path = Vec::new();
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            let position = self
                .node(parent)
                .and_then(|node| node.children.iter().position(|child| *child == current))
                .unwrap_or(0);
            path.push(position);
            current = parent;
        }
        path.reverse();
        ItemPath(path)
    }

    /// Only macros sequence their children.
    pub fn is_sequencing(&self, id: NodeId) -> bool {
        matches!(self.node(id).map(|node| &node.kind), Some(NodeKind::Macro))
    }

    /// First enabled, executable child of `container` after `after`.
    pub fn next_child(&self, container: NodeId, after: Option<usize>) -> Option<ProgramPosition> {
        let node = self.node(container)?;
        let start = after.map_or(0, |idx| idx + 1);
        node.children
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, child)| {
                self.node(**child)
                    .is_some_and(|child| child.is_enabled() && child.kind.is_executable())
            })
            .map(|(idx, child)| ProgramPosition {
                node: *child,
                index: Some(idx),
            })
    }

    /// Where execution continues once `position` is done: the next sibling, if
    /// the parent is a sequencing container.
    pub fn next_after(&self, position: ProgramPosition) -> Option<ProgramPosition> {
        let index = position.index?;
        let parent = self.parent(position.node)?;
        if !self.is_sequencing(parent) {
            return None;
        }
        self.next_child(parent, Some(index))
    }

    /// Depth-first, in child order, root excluded.
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<NodeId> = self.nodes[0].children.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            if let Some(node) = self.node(id) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        order
    }

    /// First node named `name` in tree order.
    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.preorder()
            .into_iter()
            .find(|id| self.name(*id) == name)
    }

    pub fn find_macro(&self, name: &str) -> Option<NodeId> {
        self.preorder()
            .into_iter()
            .find(|id| self.name(*id) == name && self.is_sequencing(*id))
    }

    /// Every event item with the pattern it binds, in tree order.
    pub fn event_bindings(&self) -> Vec<(String, NodeId)> {
        self.preorder()
            .into_iter()
            .filter_map(|id| match self.node(id).map(|node| &node.kind) {
                Some(NodeKind::Event { pattern }) => Some((pattern.clone(), id)),
                _ => None,
            })
            .collect()
    }
}
