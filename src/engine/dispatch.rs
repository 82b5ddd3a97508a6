use crate::actions::{ActionValue, MacroError};
use crate::config::EngineConfig;
use crate::event::{
    EventRecord, EventRegistry, EventRequest, EventTrigger, PendingTrigger, RecordHooks,
    RecordRunner, TriggerKind,
};
use crate::eventlog::EventLog;
use crate::handlers::HandlerTable;
use crate::interpreter::{run_program, ExecutionContext};
use crate::lock_or_recover;
use crate::log_debug;
use crate::notify::{NotificationRegistry, NotifierSlot};
use crate::tree::{MacroTree, NodeId};
use crate::workers::{ActionThread, EventThread, WorkerError};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

/// Everything a dispatch needs, shared by the engine handle, the records'
/// workers and the action thread.
pub(crate) struct Dispatcher {
    pub(crate) config: EngineConfig,
    pub(crate) log: Arc<dyn EventLog>,
    pub(crate) registry: EventRegistry,
    pub(crate) handlers: HandlerTable,
    pub(crate) notifications: NotificationRegistry,
    pub(crate) tree: Mutex<Arc<MacroTree>>,
    pub(crate) action_thread: ActionThread,
    pub(crate) event_thread: EventThread,
    pub(crate) notifier: NotifierSlot,
    hooks: RecordHooks,
    sequence: AtomicU64,
}

impl Dispatcher {
    pub(crate) fn new(
        config: EngineConfig,
        log: Arc<dyn EventLog>,
        action_thread: ActionThread,
        event_thread: EventThread,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Dispatcher>| {
            let runner: Weak<dyn RecordRunner> = weak.clone();
            let notifier = NotifierSlot::default();
            let hooks = RecordHooks {
                runner: Some(runner),
                action_thread: Some(action_thread.clone()),
                notifier: notifier.clone(),
                end_timeout: config.end_timeout,
            };
            Self {
                config,
                log,
                registry: EventRegistry::new(),
                handlers: HandlerTable::new(),
                notifications: NotificationRegistry::new(),
                tree: Mutex::new(Arc::new(MacroTree::empty())),
                action_thread,
                event_thread,
                notifier,
                hooks,
                sequence: AtomicU64::new(0),
            }
        })
    }

    pub(crate) fn tree(&self) -> Arc<MacroTree> {
        Arc::clone(&lock_or_recover(&self.tree, "Dispatcher::tree"))
    }

    /// Swap in a new tree and rebind every event item in it.
    pub(crate) fn load_tree(&self, tree: MacroTree) -> usize {
        let mut current = lock_or_recover(&self.tree, "Dispatcher::load_tree");
        let bindings = tree.event_bindings();
        self.handlers.clear();
        for (pattern, node) in &bindings {
            self.handlers.register(pattern, *node);
        }
        *current = Arc::new(tree);
        bindings.len()
    }

    fn post(&self, request: EventRequest, kind: TriggerKind) -> Result<Arc<EventRecord>, WorkerError> {
        let record = self.registry.resolve(request, kind, &self.hooks);
        self.event_thread.execute(Arc::clone(&record))?;
        Ok(record)
    }

    /// Tree snapshot plus its active handlers for `string`, sorted by item
    /// path. Read under the tree lock so ids and tree always agree.
    fn active_handlers(&self, string: &str) -> (Arc<MacroTree>, Vec<NodeId>) {
        let current = lock_or_recover(&self.tree, "Dispatcher::active_handlers");
        let tree = Arc::clone(&current);
        let mut handlers: Vec<NodeId> = self
            .handlers
            .matching(string)
            .into_iter()
            .filter(|handler| tree.is_active(*handler))
            .collect();
        handlers.sort_by_cached_key(|handler| tree.item_path(*handler));
        handlers.dedup();
        drop(current);
        (tree, handlers)
    }

    pub(crate) fn has_active_handler(&self, string: &str) -> bool {
        let tree = self.tree();
        self.handlers
            .exact(string)
            .into_iter()
            .any(|handler| tree.is_active(handler))
    }

    fn set_meter(&self, record: &EventRecord, percent: f32) {
        record.set_percent(percent);
        self.log.set_event_meter(percent);
    }

    /// One full dispatch of `record`. Runs on the action thread.
    fn run_dispatch(&self, record: &Arc<EventRecord>, trigger: PendingTrigger) {
        let started = Instant::now();
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let info = record.begin_dispatch(trigger, sequence);
        let ends_now = info.kind == TriggerKind::Instant;

        if self.notifications.consult(&info) {
            record.set_started(ends_now);
            return;
        }

        let (tree, handlers) = self.active_handlers(&info.string);
        self.log.observe_event(&info);

        if self.config.only_log_assigned && handlers.is_empty() {
            self.set_meter(record, 100.0);
            record.set_started(ends_now);
            return;
        }

        self.log.log_event(&info);

        let total = handlers.len();
        let mut ctx = ExecutionContext::new(
            &tree,
            record,
            &info,
            &self.log,
            &self.config,
            Some(self as &dyn EventTrigger),
        );
        let mut ran = 0usize;
        for (done, handler) in handlers.iter().enumerate() {
            if record.stop_requested() {
                break;
            }
            self.set_meter(record, done as f32 / total as f32 * 100.0);
            let Some(entry) = tree.parent(*handler) else {
                continue;
            };
            ran += 1;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| run_program(&mut ctx, entry)));
            let error = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(err),
                Err(payload) => {
                    ctx.indent = 0;
                    Some(MacroError::Panicked(crate::panic_message(payload.as_ref())))
                }
            };
            if let Some(error) = error {
                self.report(&info.string, tree.name(entry), &error);
                self.log.log_error(&info, &error);
            }
            if ctx.skip_remaining {
                break;
            }
        }

        self.set_meter(record, 100.0);
        let result = std::mem::replace(&mut ctx.result, ActionValue::Null);
        drop(ctx);
        record.store_result(result);

        if self.config.log_timings {
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
            log_debug(&format!(
                "timing|event={}|handlers={ran}/{total}|elapsed_ms={elapsed_ms:.2}",
                info.string
            ));
            tracing::info!(event = %info.string, handlers = ran, elapsed_ms, "dispatch timing");
        }

        record.set_started(ends_now);
    }

    fn report(&self, event: &str, handler: &str, error: &MacroError) {
        if error.is_stop() {
            tracing::info!(event, handler, "macro stopped");
        } else {
            log_debug(&format!("handler '{handler}' for '{event}' failed: {error:#}"));
            tracing::warn!(event, handler, "handler failed: {error:#}");
        }
    }
}

impl RecordRunner for Dispatcher {
    fn next_work(&self, record: &Arc<EventRecord>) -> Option<PendingTrigger> {
        self.registry.next_work(record)
    }

    fn dispatch(self: Arc<Self>, record: &Arc<EventRecord>, trigger: PendingTrigger) {
        let action_thread = self.action_thread.clone();
        let target = Arc::clone(record);
        let outcome = action_thread.call_wait(move || self.run_dispatch(&target, trigger));
        if let Err(err) = outcome {
            log_debug(&format!("dispatch of '{}' lost: {err}", record.string()));
            tracing::error!(event = %record.string(), "dispatch lost: {err}");
        }
    }
}

impl EventTrigger for Dispatcher {
    fn trigger(&self, request: EventRequest) -> Result<Arc<EventRecord>, WorkerError> {
        self.post(request, TriggerKind::Instant)
    }

    fn trigger_enduring(&self, request: EventRequest) -> Result<Arc<EventRecord>, WorkerError> {
        self.post(request, TriggerKind::Enduring)
    }
}
