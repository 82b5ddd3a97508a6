//! Event pattern to handler bindings.

use crate::lock_or_recover;
use crate::log_debug;
use crate::tree::NodeId;
use glob::{MatchOptions, Pattern};
use std::collections::HashMap;
use std::sync::Mutex;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

struct Binding {
    /// Compiled only for patterns carrying `*` or `?`.
    glob: Option<Pattern>,
    handlers: Vec<NodeId>,
}

/// Maps event patterns to the event items bound to them. A handler runs
/// its parent macro.
#[derive(Default)]
pub struct HandlerTable {
    table: Mutex<HashMap<String, Binding>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, pattern: &str, handler: NodeId) {
        let mut table = lock_or_recover(&self.table, "HandlerTable::register");
        table
            .entry(pattern.to_string())
            .or_insert_with(|| Binding {
                glob: compile(pattern),
                handlers: Vec::new(),
            })
            .handlers
            .push(handler);
    }

    /// Drop one registration of `handler` under `pattern`.
    pub fn unregister(&self, pattern: &str, handler: NodeId) -> bool {
        let mut table = lock_or_recover(&self.table, "HandlerTable::unregister");
        let Some(binding) = table.get_mut(pattern) else {
            return false;
        };
        let Some(position) = binding.handlers.iter().position(|id| *id == handler) else {
            return false;
        };
        binding.handlers.remove(position);
        if binding.handlers.is_empty() {
            table.remove(pattern);
        }
        true
    }

    pub fn clear(&self) {
        lock_or_recover(&self.table, "HandlerTable::clear").clear();
    }

    /// Handlers of every pattern matching `string`, concatenated without
    /// deduplication and in no particular order.
    pub fn matching(&self, string: &str) -> Vec<NodeId> {
        let table = lock_or_recover(&self.table, "HandlerTable::matching");
        table
            .iter()
            .filter(|(pattern, binding)| {
                pattern.as_str() == string
                    || binding
                        .glob
                        .as_ref()
                        .is_some_and(|glob| glob.matches_with(string, MATCH_OPTIONS))
            })
            .flat_map(|(_, binding)| binding.handlers.iter().copied())
            .collect()
    }

    /// Handlers registered under exactly `string`.
    pub fn exact(&self, string: &str) -> Vec<NodeId> {
        lock_or_recover(&self.table, "HandlerTable::exact")
            .get(string)
            .map(|binding| binding.handlers.clone())
            .unwrap_or_default()
    }

    pub fn patterns(&self) -> Vec<String> {
        let mut patterns: Vec<String> = lock_or_recover(&self.table, "HandlerTable::patterns")
            .keys()
            .cloned()
            .collect();
        patterns.sort();
        patterns
    }
}

pub fn is_wildcard(pattern: &str) -> bool {
    pattern.contains(['*', '?'])
}

fn compile(pattern: &str) -> Option<Pattern> {
    if !is_wildcard(pattern) {
        return None;
    }
    match Pattern::new(&collapse_stars(pattern)) {
        Ok(glob) => Some(glob),
        Err(err) => {
            log_debug(&format!("event pattern '{pattern}' only matches literally: {err}"));
            None
        }
    }
}

/// `glob` reads `**` as a path component; event strings have no paths, so
/// any run of stars means the same as one.
fn collapse_stars(pattern: &str) -> String {
    let mut collapsed = String::with_capacity(pattern.len());
    for ch in pattern.chars() {
        if ch == '*' && collapsed.ends_with('*') {
            continue;
        }
        collapsed.push(ch);
    }
    collapsed
}
