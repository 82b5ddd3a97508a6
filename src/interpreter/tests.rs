use super::*;
use crate::actions::{action_fn, ActionValue, BuiltinAction, JumpCondition};
use crate::config::EngineConfig;
use crate::event::{DispatchInfo, EventRecord, EventRequest};
use crate::eventlog::{EventLog, LogEntry, MemoryLog};
use crate::tree::{MacroTree, TreeBuilder};
use anyhow::anyhow;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Harness {
    tree: MacroTree,
    record: Arc<EventRecord>,
    info: Arc<DispatchInfo>,
    log: Arc<MemoryLog>,
    sink: Arc<dyn EventLog>,
    config: EngineConfig,
}

struct Outcome {
    result: Result<(), MacroError>,
    value: ActionValue,
    indent: usize,
    depth: usize,
    counter: Option<ProgramPosition>,
}

impl Harness {
    fn new(tree: MacroTree) -> Self {
        let record = EventRecord::detached("Main", "Test");
        let info = record.info();
        let log = Arc::new(MemoryLog::new());
        Self {
            tree,
            record,
            info,
            sink: log.clone(),
            log,
            config: EngineConfig {
                wait_tick: Duration::from_millis(5),
                ..EngineConfig::default()
            },
        }
    }

    fn run(&self, entry: NodeId) -> Outcome {
        let mut ctx = ExecutionContext::new(
            &self.tree,
            &self.record,
            &self.info,
            &self.sink,
            &self.config,
            None,
        );
        let result = run_program(&mut ctx, entry);
        Outcome {
            result,
            value: ctx.result().clone(),
            indent: ctx.indent(),
            depth: ctx.return_depth(),
            counter: ctx.program_counter(),
        }
    }

    fn printed(&self) -> Vec<(usize, String)> {
        self.log
            .entries()
            .into_iter()
            .filter_map(|entry| match entry {
                LogEntry::Item { indent, text } => Some((indent, text)),
                _ => None,
            })
            .collect()
    }

    fn texts(&self) -> Vec<String> {
        self.log.items()
    }
}

fn print(builder: &mut TreeBuilder, parent: NodeId, text: &str) -> NodeId {
    builder
        .add_action(
            parent,
            text,
            Arc::new(BuiltinAction::Print {
                text: text.to_string(),
            }),
        )
        .unwrap()
}

fn action(builder: &mut TreeBuilder, parent: NodeId, action: BuiltinAction) -> NodeId {
    let label = action.describe();
    builder.add_action(parent, &label, Arc::new(action)).unwrap()
}

/// top: a1, mid: [b1, low: [c1, <extra>], b2], a2
fn nested_tree(extra: Option<BuiltinAction>) -> (MacroTree, NodeId) {
    let mut builder = MacroTree::builder();
    let root = builder.root();
    let top = builder.add_macro(root, "top").unwrap();
    print(&mut builder, top, "a1");
    let mid = builder.add_macro(top, "mid").unwrap();
    print(&mut builder, mid, "b1");
    let low = builder.add_macro(mid, "low").unwrap();
    print(&mut builder, low, "c1");
    if let Some(extra) = extra {
        action(&mut builder, low, extra);
        print(&mut builder, low, "c2");
    }
    print(&mut builder, mid, "b2");
    print(&mut builder, top, "a2");
    (builder.build(), top)
}

#[test]
fn three_level_nesting_runs_depth_first_and_returns_to_parents() {
    let (tree, top) = nested_tree(None);
    let harness = Harness::new(tree);

    let outcome = harness.run(top);

    assert!(outcome.result.is_ok());
    assert_eq!(
        harness.printed(),
        vec![
            (1, "a1".to_string()),
            (3, "b1".to_string()),
            (5, "c1".to_string()),
            (3, "b2".to_string()),
            (1, "a2".to_string()),
        ]
    );
    assert_eq!(outcome.counter, None);
    assert_eq!(outcome.depth, 0);
    assert_eq!(outcome.indent, 0);
}

#[test]
fn stop_macro_ignoring_returns_ends_everything() {
    let (tree, top) = nested_tree(Some(BuiltinAction::StopMacro {
        ignore_return: true,
    }));
    let harness = Harness::new(tree);

    let outcome = harness.run(top);

    assert!(outcome.result.is_ok());
    assert_eq!(harness.texts(), vec!["a1", "b1", "c1"]);
    assert_eq!(outcome.depth, 0);
    assert_eq!(outcome.counter, None);
}

#[test]
fn stop_macro_keeping_returns_resumes_the_callers() {
    let (tree, top) = nested_tree(Some(BuiltinAction::StopMacro {
        ignore_return: false,
    }));
    let harness = Harness::new(tree);

    let outcome = harness.run(top);

    assert!(outcome.result.is_ok());
    assert_eq!(harness.texts(), vec!["a1", "b1", "c1", "b2", "a2"]);
}

fn jump_tree(condition: JumpCondition, return_after: bool, seed: ActionValue) -> (MacroTree, NodeId) {
    let mut builder = MacroTree::builder();
    let root = builder.root();
    let main = builder.add_macro(root, "Main").unwrap();
    print(&mut builder, main, "m1");
    action(&mut builder, main, BuiltinAction::SetResult { value: seed });
    action(
        &mut builder,
        main,
        BuiltinAction::Jump {
            target: "Helper".into(),
            condition,
            return_after,
        },
    );
    print(&mut builder, main, "m2");
    let helper = builder.add_macro(root, "Helper").unwrap();
    print(&mut builder, helper, "h1");
    (builder.build(), main)
}

#[test]
fn jump_with_return_comes_back_after_the_jump() {
    let (tree, main) = jump_tree(JumpCondition::Always, true, json!(null));
    let harness = Harness::new(tree);

    let outcome = harness.run(main);

    assert!(outcome.result.is_ok());
    assert_eq!(harness.texts(), vec!["m1", "h1", "m2"]);
    assert_eq!(
        harness.printed()[1],
        (3, "h1".to_string()),
        "the called macro is indented one block deeper"
    );
    assert_eq!(outcome.depth, 0);
}

#[test]
fn jump_without_return_abandons_the_caller() {
    let (tree, main) = jump_tree(JumpCondition::Always, false, json!(null));
    let harness = Harness::new(tree);

    harness.run(main);

    assert_eq!(harness.texts(), vec!["m1", "h1"]);
}

#[test]
fn conditional_jump_follows_the_previous_result() {
    let (tree, main) = jump_tree(JumpCondition::IfTrue, false, json!(false));
    let harness = Harness::new(tree);
    harness.run(main);
    assert_eq!(harness.texts(), vec!["m1", "m2"]);

    let (tree, main) = jump_tree(JumpCondition::IfFalse, false, json!(false));
    let harness = Harness::new(tree);
    harness.run(main);
    assert_eq!(harness.texts(), vec!["m1", "h1"]);
}

#[test]
fn jump_to_a_missing_macro_fails() {
    let mut builder = MacroTree::builder();
    let root = builder.root();
    let main = builder.add_macro(root, "Main").unwrap();
    action(
        &mut builder,
        main,
        BuiltinAction::Jump {
            target: "Nowhere".into(),
            condition: JumpCondition::Always,
            return_after: false,
        },
    );
    let harness = Harness::new(builder.build());

    let outcome = harness.run(main);

    assert!(matches!(outcome.result, Err(MacroError::UnknownItem(name)) if name == "Nowhere"));
    assert_eq!(outcome.indent, 0);
}

#[test]
fn disabled_items_and_empty_macros_are_skipped() {
    let mut builder = MacroTree::builder();
    let root = builder.root();
    let main = builder.add_macro(root, "Main").unwrap();
    print(&mut builder, main, "one");
    let skipped = print(&mut builder, main, "skipped");
    builder.set_enabled(skipped, false).unwrap();
    let disabled = builder.add_macro(main, "disabled").unwrap();
    print(&mut builder, disabled, "inside disabled");
    builder.set_enabled(disabled, false).unwrap();
    builder.add_macro(main, "empty").unwrap();
    print(&mut builder, main, "two");
    let harness = Harness::new(builder.build());

    let outcome = harness.run(main);

    assert!(outcome.result.is_ok());
    assert_eq!(harness.texts(), vec!["one", "two"]);
    assert_eq!(outcome.depth, 0);
}

#[test]
fn last_action_value_becomes_the_result() {
    let mut builder = MacroTree::builder();
    let root = builder.root();
    let main = builder.add_macro(root, "Main").unwrap();
    action(&mut builder, main, BuiltinAction::SetResult { value: json!(1) });
    builder
        .add_action(
            main,
            "double",
            action_fn("double", |ctx| {
                let previous = ctx.result().as_i64().unwrap_or_default();
                Ok(json!(previous * 2))
            }),
        )
        .unwrap();
    let harness = Harness::new(builder.build());

    let outcome = harness.run(main);

    assert_eq!(outcome.value, json!(2));
}

#[test]
fn action_failure_unwinds_and_resets_indent() {
    let mut builder = MacroTree::builder();
    let root = builder.root();
    let main = builder.add_macro(root, "Main").unwrap();
    let inner = builder.add_macro(main, "inner").unwrap();
    builder
        .add_action(inner, "boom", action_fn("boom", |_| Err(anyhow!("boom").into())))
        .unwrap();
    print(&mut builder, main, "never");
    let harness = Harness::new(builder.build());

    let outcome = harness.run(main);

    assert!(matches!(outcome.result, Err(MacroError::Failed(_))));
    assert_eq!(outcome.indent, 0);
    assert!(harness.texts().is_empty());
}

#[test]
fn wait_raises_once_a_stop_is_requested() {
    let mut builder = MacroTree::builder();
    let root = builder.root();
    let main = builder.add_macro(root, "Main").unwrap();
    action(&mut builder, main, BuiltinAction::Wait { seconds: 5.0 });
    print(&mut builder, main, "after");
    let harness = Harness::new(builder.build());
    harness.record.request_stop();

    let started = Instant::now();
    let outcome = harness.run(main);

    assert!(matches!(outcome.result, Err(MacroError::Stopped)));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(harness.texts().is_empty());
}

#[test]
fn wait_beyond_the_clock_range_fails_cleanly() {
    let mut builder = MacroTree::builder();
    let root = builder.root();
    let main = builder.add_macro(root, "Main").unwrap();
    action(&mut builder, main, BuiltinAction::Wait { seconds: 1e18 });
    let harness = Harness::new(builder.build());

    let outcome = harness.run(main);

    match outcome.result {
        Err(MacroError::Failed(err)) => assert!(err.to_string().contains("too long")),
        other => panic!("expected a failed wait, got {other:?}"),
    }
}

#[test]
fn wait_without_raise_reports_the_stop() {
    let mut builder = MacroTree::builder();
    let root = builder.root();
    let main = builder.add_macro(root, "Main").unwrap();
    builder
        .add_action(
            main,
            "soft wait",
            action_fn("soft wait", |ctx| {
                let completed = ctx.wait(Duration::from_secs(5), false)?;
                Ok(json!(completed))
            }),
        )
        .unwrap();
    let harness = Harness::new(builder.build());
    harness.record.request_stop();

    let outcome = harness.run(main);

    assert!(outcome.result.is_ok());
    assert_eq!(outcome.value, json!(false));
}

#[test]
fn short_wait_completes() {
    let mut builder = MacroTree::builder();
    let root = builder.root();
    let main = builder.add_macro(root, "Main").unwrap();
    action(&mut builder, main, BuiltinAction::Wait { seconds: 0.02 });
    let harness = Harness::new(builder.build());

    let outcome = harness.run(main);

    assert!(outcome.result.is_ok());
    assert_eq!(outcome.value, json!(true));
}

#[test]
fn disable_item_takes_effect_within_the_same_run() {
    let mut builder = MacroTree::builder();
    let root = builder.root();
    let main = builder.add_macro(root, "Main").unwrap();
    action(
        &mut builder,
        main,
        BuiltinAction::DisableItem {
            target: "later".into(),
        },
    );
    print(&mut builder, main, "later");
    print(&mut builder, main, "last");
    let harness = Harness::new(builder.build());

    harness.run(main);

    assert_eq!(harness.texts(), vec!["last"]);
}

#[test]
fn trigger_without_dispatcher_fails() {
    let mut builder = MacroTree::builder();
    let root = builder.root();
    let main = builder.add_macro(root, "Main").unwrap();
    builder
        .add_action(
            main,
            "raise",
            action_fn("raise", |ctx| {
                ctx.trigger_event(EventRequest::new("Next"))?;
                Ok(ActionValue::Null)
            }),
        )
        .unwrap();
    let harness = Harness::new(builder.build());

    let outcome = harness.run(main);

    assert!(matches!(outcome.result, Err(MacroError::Failed(_))));
}

#[test]
fn print_on_end_waits_for_the_release() {
    let mut builder = MacroTree::builder();
    let root = builder.root();
    let main = builder.add_macro(root, "Main").unwrap();
    action(
        &mut builder,
        main,
        BuiltinAction::PrintOnEnd {
            text: "released".into(),
        },
    );
    print(&mut builder, main, "pressed");
    let harness = Harness::new(builder.build());

    harness.run(main);
    assert_eq!(harness.texts(), vec!["pressed"]);

    harness.record.set_started(false);
    harness.record.set_should_end();
    assert_eq!(harness.texts(), vec!["pressed", "released"]);
}
