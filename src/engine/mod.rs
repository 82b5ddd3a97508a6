//! The engine handle: starts the worker threads and exposes the trigger API.

mod dispatch;

use crate::config::EngineConfig;
use crate::event::{EventRecord, EventRegistry, EventRequest, EventTrigger};
use crate::eventlog::EventLog;
use crate::handlers::HandlerTable;
use crate::log_debug;
use crate::notify::{NotificationRegistry, ProcessingStateNotifier};
use crate::tree::MacroTree;
use crate::workers::{ActionThread, EventThread, WorkerError};
use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use dispatch::Dispatcher;

const IDLE_POLL: Duration = Duration::from_millis(5);

pub struct Engine {
    dispatcher: Arc<Dispatcher>,
    stopped: AtomicBool,
}

impl Engine {
    /// Spawn the action and event threads with an empty tree loaded.
    pub fn start(config: EngineConfig, log: Arc<dyn EventLog>) -> Result<Self> {
        let action_thread = ActionThread::start()?;
        let event_thread = match EventThread::start() {
            Ok(event_thread) => event_thread,
            Err(err) => {
                action_thread.shutdown();
                return Err(err);
            }
        };
        log_debug(&format!(
            "engine started (only_log_assigned={}, end_timeout={:?}, wait_tick={:?})",
            config.only_log_assigned, config.end_timeout, config.wait_tick
        ));
        Ok(Self {
            dispatcher: Dispatcher::new(config, log, action_thread, event_thread),
            stopped: AtomicBool::new(false),
        })
    }

    /// Replace the macro tree and rebuild the handler table from its event
    /// items. Returns how many bindings were registered.
    pub fn load_tree(&self, tree: MacroTree) -> usize {
        let bindings = self.dispatcher.load_tree(tree);
        tracing::info!(bindings, "macro tree loaded");
        bindings
    }

    pub fn tree(&self) -> Arc<MacroTree> {
        self.dispatcher.tree()
    }

    pub fn handlers(&self) -> &HandlerTable {
        &self.dispatcher.handlers
    }

    pub fn notifications(&self) -> &NotificationRegistry {
        &self.dispatcher.notifications
    }

    pub fn registry(&self) -> &EventRegistry {
        &self.dispatcher.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.dispatcher.config
    }

    pub fn action_thread(&self) -> &ActionThread {
        &self.dispatcher.action_thread
    }

    pub fn event_thread(&self) -> &EventThread {
        &self.dispatcher.event_thread
    }

    /// Raise an event that ends as soon as its dispatch is done.
    pub fn trigger(&self, request: EventRequest) -> Result<Arc<EventRecord>, WorkerError> {
        self.dispatcher.trigger(request)
    }

    /// Raise an event that stays held until `EventRecord::set_should_end`.
    pub fn trigger_enduring(&self, request: EventRequest) -> Result<Arc<EventRecord>, WorkerError> {
        self.dispatcher.trigger_enduring(request)
    }

    /// Whether an enabled handler is bound to exactly `string`.
    pub fn has_active_handler(&self, string: &str) -> bool {
        self.dispatcher.has_active_handler(string)
    }

    /// The live record for `string`, if one is queued, running or held.
    pub fn running_event(&self, string: &str) -> Option<Arc<EventRecord>> {
        self.dispatcher.registry.get(string)
    }

    pub fn set_processing_notifier(&self, notifier: Arc<dyn ProcessingStateNotifier>) {
        self.dispatcher.notifier.set(Some(notifier));
    }

    pub fn clear_processing_notifier(&self) {
        self.dispatcher.notifier.set(None);
    }

    /// Block until nothing is queued on the event thread and every record
    /// has drained. Returns false on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.dispatcher.event_thread.pending() == 0 && self.dispatcher.registry.is_empty() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(IDLE_POLL);
        }
    }

    /// Stop both worker threads. Work already queued on them still runs.
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.dispatcher.event_thread.shutdown();
        self.dispatcher.action_thread.shutdown();
        log_debug("engine stopped");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
