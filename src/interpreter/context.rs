use crate::actions::{ActionValue, MacroError};
use crate::config::EngineConfig;
use crate::event::{DispatchInfo, EventRecord, EventRequest, EventTrigger};
use crate::eventlog::EventLog;
use crate::tree::{MacroTree, NodeId, ProgramPosition};
use anyhow::anyhow;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Per-dispatch interpreter state, passed explicitly to every action.
pub struct ExecutionContext<'a> {
    tree: &'a MacroTree,
    event: &'a Arc<EventRecord>,
    info: &'a DispatchInfo,
    log: &'a Arc<dyn EventLog>,
    config: &'a EngineConfig,
    triggers: Option<&'a dyn EventTrigger>,
    pub(crate) result: ActionValue,
    pub(crate) indent: usize,
    pub(crate) program_counter: Option<ProgramPosition>,
    pub(crate) return_stack: Vec<ProgramPosition>,
    pub(crate) skip_remaining: bool,
}

impl<'a> ExecutionContext<'a> {
    pub(crate) fn new(
        tree: &'a MacroTree,
        event: &'a Arc<EventRecord>,
        info: &'a DispatchInfo,
        log: &'a Arc<dyn EventLog>,
        config: &'a EngineConfig,
        triggers: Option<&'a dyn EventTrigger>,
    ) -> Self {
        Self {
            tree,
            event,
            info,
            log,
            config,
            triggers,
            result: ActionValue::Null,
            indent: 0,
            program_counter: None,
            return_stack: Vec::new(),
            skip_remaining: false,
        }
    }

    pub fn tree(&self) -> &'a MacroTree {
        self.tree
    }

    pub fn event(&self) -> &'a Arc<EventRecord> {
        self.event
    }

    pub fn info(&self) -> &'a DispatchInfo {
        self.info
    }

    pub fn payload(&self) -> Option<&'a ActionValue> {
        self.info.payload.as_ref()
    }

    pub fn config(&self) -> &'a EngineConfig {
        self.config
    }

    /// Value returned by the previous action.
    pub fn result(&self) -> &ActionValue {
        &self.result
    }

    pub fn indent(&self) -> usize {
        self.indent
    }

    pub fn program_counter(&self) -> Option<ProgramPosition> {
        self.program_counter
    }

    pub fn return_depth(&self) -> usize {
        self.return_stack.len()
    }

    /// End the current macro once this action returns. With `ignore_return`
    /// the pending return frames are dropped too.
    pub fn stop_macro(&mut self, ignore_return: bool) {
        self.program_counter = None;
        if ignore_return {
            self.return_stack.clear();
        }
    }

    /// Continue at `target`. With `return_after`, execution comes back to the
    /// item after the current one once `target` is done.
    pub fn jump_to(&mut self, target: NodeId, return_after: bool) {
        if return_after {
            if let Some(current) = self.program_counter {
                self.return_stack.push(current);
                self.indent += 2;
            }
        }
        self.program_counter = Some(ProgramPosition::entry(target));
    }

    /// Skip the handlers that would run after this one for this event.
    pub fn skip_remaining_handlers(&mut self) {
        self.skip_remaining = true;
    }

    pub fn stop_requested(&self) -> bool {
        self.event.stop_requested()
    }

    /// Sleep for `duration` in `wait_tick` steps, watching for a stop
    /// request. Returns `Ok(true)` when the full time passed; on a stop,
    /// `Err(Stopped)` if `raise` is set, else `Ok(false)`.
    pub fn wait(&self, duration: Duration, raise: bool) -> Result<bool, MacroError> {
        let tick = self.config.wait_tick.max(Duration::from_millis(1));
        let deadline = Instant::now()
            .checked_add(duration)
            .ok_or_else(|| anyhow!("wait of {duration:?} is too long"))?;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(true);
            }
            if self.stop_requested() {
                return if raise {
                    Err(MacroError::Stopped)
                } else {
                    Ok(false)
                };
            }
            thread::sleep((deadline - now).min(tick));
        }
    }

    /// Write a trace line at the current nesting depth.
    pub fn print(&self, text: &str) {
        self.log.log_item(self.info, self.indent, text);
    }

    /// Write `text` into the log once the event ends, like a key release.
    pub fn print_on_end(&self, text: &str) {
        let log = Arc::clone(self.log);
        let info = self.info.clone();
        let indent = self.indent;
        let text = text.to_string();
        self.event
            .add_up_func(move || log.log_item(&info, indent, &text));
    }

    pub fn trigger_event(&self, request: EventRequest) -> Result<Arc<EventRecord>, MacroError> {
        let triggers = self
            .triggers
            .ok_or_else(|| anyhow!("no dispatcher is attached to trigger '{}'", request.string()))?;
        triggers
            .trigger(request)
            .map_err(|err| MacroError::Failed(err.into()))
    }

    /// Run `callback` when the current event ends.
    pub fn add_up_func<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.event.add_up_func(callback);
    }
}
