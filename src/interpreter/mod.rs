//! The macro interpreter.
//!
//! Recursion into nested macros is modelled with an explicit program counter
//! and return stack on the [`ExecutionContext`], never the native call stack,
//! so actions can redirect control (`stop_macro`, `jump_to`) by editing them.

mod context;
#[cfg(test)]
mod tests;

use crate::actions::MacroError;
use crate::tree::{NodeId, NodeKind, ProgramPosition};

pub use context::ExecutionContext;

/// Run the macro `entry` and everything it calls until the program counter
/// and the return stack are both empty.
pub fn run_program(ctx: &mut ExecutionContext<'_>, entry: NodeId) -> Result<(), MacroError> {
    ctx.program_counter = Some(ProgramPosition::entry(entry));
    ctx.return_stack.clear();
    ctx.indent = 1;
    let outcome = step_until_done(ctx);
    ctx.indent = 0;
    outcome
}

fn step_until_done(ctx: &mut ExecutionContext<'_>) -> Result<(), MacroError> {
    let tree = ctx.tree();
    while let Some(position) = ctx.program_counter {
        execute_item(ctx, position)?;
        if ctx.program_counter == Some(position) {
            ctx.program_counter = tree.next_after(position);
        }
        while ctx.program_counter.is_none() {
            let Some(frame) = ctx.return_stack.pop() else {
                break;
            };
            ctx.indent = ctx.indent.saturating_sub(2);
            ctx.program_counter = tree.next_after(frame);
        }
    }
    Ok(())
}

fn execute_item(ctx: &mut ExecutionContext<'_>, position: ProgramPosition) -> Result<(), MacroError> {
    let tree = ctx.tree();
    let Some(node) = tree.node(position.node) else {
        return Err(MacroError::UnknownItem(format!("#{}", position.node.index())));
    };
    match node.kind() {
        NodeKind::Macro => {
            if ctx.config().log_macros {
                ctx.print(node.name());
            }
            // A macro nested in a macro returns to its parent afterwards.
            let nested = position.index.is_some()
                && node.parent().is_some_and(|parent| tree.is_sequencing(parent));
            if nested {
                ctx.return_stack.push(position);
                ctx.indent += 2;
            }
            ctx.program_counter = tree.next_child(position.node, None);
            Ok(())
        }
        NodeKind::Action(action) => {
            if ctx.config().log_actions {
                ctx.print(node.name());
            }
            ctx.result = action.execute(ctx)?;
            Ok(())
        }
        NodeKind::Root | NodeKind::Folder | NodeKind::Event { .. } => Ok(()),
    }
}
