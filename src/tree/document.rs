use super::{MacroTree, NodeId, TreeBuilder};
use crate::actions::BuiltinAction;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Serialized macro tree, as read by the binary.
///
/// ```yaml
/// items:
///   - type: folder
///     name: Remote
///     items:
///       - type: macro
///         name: Play
///         items:
///           - type: event
///             pattern: Remote.Play*
///           - type: action
///             action: { kind: print, text: playing }
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TreeDocument {
    #[serde(default)]
    pub items: Vec<ItemDocument>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemDocument {
    Folder {
        name: String,
        #[serde(default = "enabled_by_default")]
        enabled: bool,
        #[serde(default)]
        items: Vec<ItemDocument>,
    },
    Macro {
        name: String,
        #[serde(default = "enabled_by_default")]
        enabled: bool,
        #[serde(default)]
        items: Vec<ItemDocument>,
    },
    Event {
        pattern: String,
        #[serde(default = "enabled_by_default")]
        enabled: bool,
    },
    Action {
        #[serde(default)]
        name: Option<String>,
        #[serde(default = "enabled_by_default")]
        enabled: bool,
        action: BuiltinAction,
    },
}

fn enabled_by_default() -> bool {
    true
}

impl TreeDocument {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read tree document '{}'", path.display()))?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            serde_json::from_str(&text)
                .with_context(|| format!("invalid JSON tree document '{}'", path.display()))
        } else {
            Self::from_yaml_str(&text)
                .with_context(|| format!("invalid YAML tree document '{}'", path.display()))
        }
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Build the arena, wiring every action item to its built-in action.
    pub fn build(&self) -> Result<MacroTree> {
        let mut builder = TreeBuilder::new();
        let root = builder.root();
        for item in &self.items {
            insert_item(&mut builder, root, item)?;
        }
        Ok(builder.build())
    }
}

fn insert_item(builder: &mut TreeBuilder, parent: NodeId, item: &ItemDocument) -> Result<()> {
    let (id, enabled) = match item {
        ItemDocument::Folder {
            name,
            enabled,
            items,
        } => {
            let id = builder.add_folder(parent, name)?;
            for child in items {
                insert_item(builder, id, child)?;
            }
            (id, *enabled)
        }
        ItemDocument::Macro {
            name,
            enabled,
            items,
        } => {
            let id = builder.add_macro(parent, name)?;
            for child in items {
                insert_item(builder, id, child)?;
            }
            (id, *enabled)
        }
        ItemDocument::Event { pattern, enabled } => (builder.add_event(parent, pattern)?, *enabled),
        ItemDocument::Action {
            name,
            enabled,
            action,
        } => {
            let label = name.clone().unwrap_or_else(|| action.describe());
            let id = builder.add_action(parent, &label, Arc::new(action.clone()))?;
            (id, *enabled)
        }
    };
    if !enabled {
        builder.set_enabled(id, false)?;
    }
    Ok(())
}
