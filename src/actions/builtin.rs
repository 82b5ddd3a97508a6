use super::{is_truthy, Action, ActionValue, MacroError};
use crate::event::{EventRequest, DEFAULT_PREFIX};
use crate::interpreter::ExecutionContext;
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The core actions every configuration can use without a plugin.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuiltinAction {
    /// Write a line into the automation log.
    Print { text: String },
    /// Write a line once an enduring event is released.
    PrintOnEnd { text: String },
    /// Sleep, watching for a stop request.
    Wait { seconds: f64 },
    /// Stop the current macro after this action.
    StopMacro {
        #[serde(default)]
        ignore_return: bool,
    },
    /// Skip the remaining handlers of the current event.
    StopProcessing,
    /// Continue at another macro, optionally returning here afterwards.
    Jump {
        target: String,
        #[serde(default)]
        condition: JumpCondition,
        #[serde(default)]
        return_after: bool,
    },
    TriggerEvent {
        suffix: String,
        #[serde(default = "default_prefix")]
        prefix: String,
        #[serde(default)]
        payload: Option<ActionValue>,
    },
    EnableItem { target: String },
    DisableItem { target: String },
    SetResult { value: ActionValue },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JumpCondition {
    #[default]
    Always,
    IfTrue,
    IfFalse,
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

impl BuiltinAction {
    /// Label used when a tree document gives the item no name.
    pub fn describe(&self) -> String {
        match self {
            BuiltinAction::Print { text } => format!("Print: {text}"),
            BuiltinAction::PrintOnEnd { text } => format!("Print on end: {text}"),
            BuiltinAction::Wait { seconds } => format!("Wait: {seconds} s"),
            BuiltinAction::StopMacro { .. } => "Stop macro".to_string(),
            BuiltinAction::StopProcessing => "Stop processing this event".to_string(),
            BuiltinAction::Jump { target, .. } => format!("Jump: {target}"),
            BuiltinAction::TriggerEvent { prefix, suffix, .. } => {
                format!("Trigger event: {prefix}.{suffix}")
            }
            BuiltinAction::EnableItem { target } => format!("Enable: {target}"),
            BuiltinAction::DisableItem { target } => format!("Disable: {target}"),
            BuiltinAction::SetResult { .. } => "Set result".to_string(),
        }
    }

    fn toggle(ctx: &ExecutionContext<'_>, target: &str, enabled: bool) -> Result<(), MacroError> {
        let id = ctx
            .tree()
            .find_by_name(target)
            .ok_or_else(|| MacroError::UnknownItem(target.to_string()))?;
        ctx.tree().set_enabled(id, enabled);
        Ok(())
    }
}

impl Action for BuiltinAction {
    fn name(&self) -> &str {
        match self {
            BuiltinAction::Print { .. } => "print",
            BuiltinAction::PrintOnEnd { .. } => "print_on_end",
            BuiltinAction::Wait { .. } => "wait",
            BuiltinAction::StopMacro { .. } => "stop_macro",
            BuiltinAction::StopProcessing => "stop_processing",
            BuiltinAction::Jump { .. } => "jump",
            BuiltinAction::TriggerEvent { .. } => "trigger_event",
            BuiltinAction::EnableItem { .. } => "enable_item",
            BuiltinAction::DisableItem { .. } => "disable_item",
            BuiltinAction::SetResult { .. } => "set_result",
        }
    }

    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<ActionValue, MacroError> {
        match self {
            BuiltinAction::Print { text } => {
                ctx.print(text);
                Ok(ActionValue::Null)
            }
            BuiltinAction::PrintOnEnd { text } => {
                ctx.print_on_end(text);
                Ok(ActionValue::Null)
            }
            BuiltinAction::Wait { seconds } => {
                let duration = Duration::try_from_secs_f64(*seconds).map_err(|_| {
                    anyhow!("wait needs a non-negative duration, got {seconds}")
                })?;
                let completed = ctx.wait(duration, true)?;
                Ok(ActionValue::Bool(completed))
            }
            BuiltinAction::StopMacro { ignore_return } => {
                ctx.stop_macro(*ignore_return);
                Ok(ActionValue::Null)
            }
            BuiltinAction::StopProcessing => {
                ctx.skip_remaining_handlers();
                Ok(ActionValue::Null)
            }
            BuiltinAction::Jump {
                target,
                condition,
                return_after,
            } => {
                let take = match condition {
                    JumpCondition::Always => true,
                    JumpCondition::IfTrue => is_truthy(ctx.result()),
                    JumpCondition::IfFalse => !is_truthy(ctx.result()),
                };
                // Leave the result untouched so the next conditional sees it too.
                let previous = ctx.result().clone();
                if take {
                    let id = ctx
                        .tree()
                        .find_macro(target)
                        .ok_or_else(|| MacroError::UnknownItem(target.clone()))?;
                    ctx.jump_to(id, *return_after);
                }
                Ok(previous)
            }
            BuiltinAction::TriggerEvent {
                suffix,
                prefix,
                payload,
            } => {
                let mut request = EventRequest::new(suffix).prefix(prefix);
                if let Some(payload) = payload {
                    request = request.payload(payload.clone());
                }
                ctx.trigger_event(request)?;
                Ok(ActionValue::Null)
            }
            BuiltinAction::EnableItem { target } => {
                Self::toggle(ctx, target, true)?;
                Ok(ActionValue::Null)
            }
            BuiltinAction::DisableItem { target } => {
                Self::toggle(ctx, target, false)?;
                Ok(ActionValue::Null)
            }
            BuiltinAction::SetResult { value } => Ok(value.clone()),
        }
    }
}
