use super::{MacroTree, Node, NodeId, NodeKind};
use crate::actions::Action;
use anyhow::{bail, Result};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Incremental construction of a [`MacroTree`]. Parents must exist before
/// their children; the nesting rules are checked on every insert.
pub struct TreeBuilder {
    nodes: Vec<Node>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                name: String::from("Configuration Tree"),
                parent: None,
                children: Vec::new(),
                kind: NodeKind::Root,
                enabled: AtomicBool::new(true),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn add_folder(&mut self, parent: NodeId, name: &str) -> Result<NodeId> {
        self.insert(parent, name, NodeKind::Folder)
    }

    pub fn add_macro(&mut self, parent: NodeId, name: &str) -> Result<NodeId> {
        self.insert(parent, name, NodeKind::Macro)
    }

    pub fn add_event(&mut self, parent: NodeId, pattern: &str) -> Result<NodeId> {
        if pattern.trim().is_empty() {
            bail!("event items need a non-empty pattern");
        }
        self.insert(
            parent,
            pattern,
            NodeKind::Event {
                pattern: pattern.to_string(),
            },
        )
    }

    pub fn add_action(
        &mut self,
        parent: NodeId,
        name: &str,
        action: Arc<dyn Action>,
    ) -> Result<NodeId> {
        self.insert(parent, name, NodeKind::Action(action))
    }

    pub fn set_enabled(&mut self, id: NodeId, enabled: bool) -> Result<()> {
        match self.nodes.get_mut(id.0) {
            Some(node) if matches!(node.kind, NodeKind::Root) => {
                bail!("the root item cannot be disabled")
            }
            Some(node) => {
                *node.enabled.get_mut() = enabled;
                Ok(())
            }
            None => bail!("unknown node {}", id.0),
        }
    }

    pub fn build(self) -> MacroTree {
        MacroTree { nodes: self.nodes }
    }

    fn insert(&mut self, parent: NodeId, name: &str, kind: NodeKind) -> Result<NodeId> {
        let Some(parent_node) = self.nodes.get(parent.0) else {
            bail!("unknown parent node {}", parent.0);
        };
        let allowed = match (&parent_node.kind, &kind) {
            (NodeKind::Root | NodeKind::Folder, NodeKind::Folder | NodeKind::Macro) => true,
            (NodeKind::Macro, NodeKind::Macro | NodeKind::Event { .. } | NodeKind::Action(_)) => {
                true
            }
            _ => false,
        };
        if !allowed {
            bail!(
                "a {} cannot be placed inside a {} ('{}')",
                kind.label(),
                parent_node.kind.label(),
                parent_node.name
            );
        }

        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            name: name.to_string(),
            parent: Some(parent),
            children: Vec::new(),
            kind,
            enabled: AtomicBool::new(true),
        });
        self.nodes[parent.0].children.push(id);
        Ok(id)
    }
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
