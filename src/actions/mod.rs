//! Action items: the leaf behavior the interpreter runs.
//!
//! Plugins implement [`Action`]; the engine ships the core set as
//! [`BuiltinAction`]. Every action body runs on the action thread with the
//! dispatch's [`ExecutionContext`] passed in explicitly.

mod builtin;

use crate::interpreter::ExecutionContext;
use std::fmt;
use std::sync::Arc;

pub use builtin::{BuiltinAction, JumpCondition};

/// Value an action hands back; the last one becomes the dispatch result.
pub type ActionValue = serde_json::Value;

/// Why a handler stopped before its macro finished.
#[derive(Debug, thiserror::Error)]
pub enum MacroError {
    /// Raised by `Wait` when a stop was requested; unwinds to the handler.
    #[error("Execution interrupted by the user.")]
    Stopped,
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
    #[error("action panicked: {0}")]
    Panicked(String),
    #[error("no macro item named '{0}'")]
    UnknownItem(String),
}

impl MacroError {
    /// A requested stop is control flow, not a failure worth a traceback.
    pub fn is_stop(&self) -> bool {
        matches!(self, MacroError::Stopped)
    }
}

pub trait Action: Send + Sync {
    fn name(&self) -> &str;

    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<ActionValue, MacroError>;
}

/// Adapter so plugins and tests can register closures as actions.
pub struct FnAction<F> {
    name: String,
    body: F,
}

impl<F> Action for FnAction<F>
where
    F: Fn(&mut ExecutionContext<'_>) -> Result<ActionValue, MacroError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<ActionValue, MacroError> {
        (self.body)(ctx)
    }
}

impl<F> fmt::Debug for FnAction<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnAction").field("name", &self.name).finish()
    }
}

pub fn action_fn<F>(name: &str, body: F) -> Arc<dyn Action>
where
    F: Fn(&mut ExecutionContext<'_>) -> Result<ActionValue, MacroError> + Send + Sync + 'static,
{
    Arc::new(FnAction {
        name: name.to_string(),
        body,
    })
}

/// Python-style truthiness, used by conditional jumps on the last result.
pub fn is_truthy(value: &ActionValue) -> bool {
    match value {
        ActionValue::Null => false,
        ActionValue::Bool(flag) => *flag,
        ActionValue::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        ActionValue::String(text) => !text.is_empty(),
        ActionValue::Array(items) => !items.is_empty(),
        ActionValue::Object(map) => !map.is_empty(),
    }
}
