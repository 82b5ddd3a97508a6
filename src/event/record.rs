use super::{DispatchInfo, PendingTrigger, RecordRunner, TriggerKind};
use crate::actions::ActionValue;
use crate::config::EngineConfig;
use crate::lock_or_recover;
use crate::log_debug;
use crate::notify::{NotifierSlot, ProcessingState};
use crate::workers::{ActionThread, Signal};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::{Duration, Instant};

/// Lifecycle of a record as seen by `set_should_end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Idle,
    Queued,
    Running,
    /// Dispatch finished, waiting for the end signal of an enduring event.
    Held,
    Ended,
}

#[derive(Debug)]
pub(super) struct DispatchTicket {
    pub(super) queued_at: Instant,
}

#[derive(Debug)]
pub(super) struct RecordQueue {
    pub(super) pending: VecDeque<PendingTrigger>,
    pub(super) work: VecDeque<DispatchTicket>,
    pub(super) worker_active: bool,
    pub(super) state: RecordState,
    pub(super) retired: bool,
}

type UpFunc = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct UpFuncs {
    list: Vec<UpFunc>,
    fired: bool,
}

/// Collaborators a record needs to run and end itself.
#[derive(Clone)]
pub(crate) struct RecordHooks {
    pub(crate) runner: Option<Weak<dyn RecordRunner>>,
    pub(crate) action_thread: Option<ActionThread>,
    pub(crate) notifier: NotifierSlot,
    pub(crate) end_timeout: Duration,
}

impl Default for RecordHooks {
    fn default() -> Self {
        Self {
            runner: None,
            action_thread: None,
            notifier: NotifierSlot::default(),
            end_timeout: EngineConfig::default().end_timeout,
        }
    }
}

/// The single live instance for one event string.
///
/// Repeated triggers of the same string queue on the record instead of
/// creating a new one; its private worker drains them strictly FIFO.
pub struct EventRecord {
    string: String,
    prefix: String,
    suffix: String,
    pub(super) queue: Mutex<RecordQueue>,
    current: Mutex<Arc<DispatchInfo>>,
    should_end: AtomicBool,
    is_ended: AtomicBool,
    stop_requested: AtomicBool,
    percent_bits: AtomicU32,
    up_funcs: Mutex<UpFuncs>,
    ended: Signal,
    last_result: Mutex<ActionValue>,
    hooks: RecordHooks,
}

impl EventRecord {
    pub(super) fn new(prefix: &str, suffix: &str, hooks: RecordHooks) -> Self {
        let string = super::event_string(prefix, suffix);
        let current = Arc::new(DispatchInfo {
            string: string.clone(),
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
            payload: None,
            source: super::DEFAULT_SOURCE.to_string(),
            kind: TriggerKind::Instant,
            sequence: 0,
            time: Instant::now(),
        });
        Self {
            string,
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
            queue: Mutex::new(RecordQueue {
                pending: VecDeque::new(),
                work: VecDeque::new(),
                worker_active: false,
                state: RecordState::Idle,
                retired: false,
            }),
            current: Mutex::new(current),
            should_end: AtomicBool::new(false),
            is_ended: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            percent_bits: AtomicU32::new(0.0f32.to_bits()),
            up_funcs: Mutex::new(UpFuncs::default()),
            ended: Signal::new(),
            last_result: Mutex::new(ActionValue::Null),
            hooks,
        }
    }

    /// A record with no dispatcher behind it, for driving the interpreter directly.
    #[cfg(test)]
    pub(crate) fn detached(prefix: &str, suffix: &str) -> Arc<Self> {
        Arc::new(Self::new(prefix, suffix, RecordHooks::default()))
    }

    pub fn string(&self) -> &str {
        &self.string
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// The occurrence currently (or most recently) dispatched.
    pub fn info(&self) -> Arc<DispatchInfo> {
        Arc::clone(&lock_or_recover(&self.current, "EventRecord::info"))
    }

    pub fn payload(&self) -> Option<ActionValue> {
        self.info().payload.clone()
    }

    pub fn is_ended(&self) -> bool {
        self.is_ended.load(Ordering::Acquire)
    }

    /// Whether an end was signalled that the current dispatch has not acted on.
    pub fn end_requested(&self) -> bool {
        self.should_end.load(Ordering::Acquire)
    }

    pub fn state(&self) -> RecordState {
        lock_or_recover(&self.queue, "EventRecord::state").state
    }

    /// Whether the registry has let go of this record.
    pub fn is_retired(&self) -> bool {
        lock_or_recover(&self.queue, "EventRecord::is_retired").retired
    }

    /// Triggers queued but not yet dispatched.
    pub fn pending_len(&self) -> usize {
        lock_or_recover(&self.queue, "EventRecord::pending_len")
            .pending
            .len()
    }

    /// Payload/source pairs still waiting, oldest first.
    pub fn pending_triggers(&self) -> Vec<(Option<ActionValue>, String)> {
        lock_or_recover(&self.queue, "EventRecord::pending_triggers")
            .pending
            .iter()
            .map(|trigger| (trigger.payload.clone(), trigger.source.clone()))
            .collect()
    }

    /// Progress of the running dispatch, 0 to 100.
    pub fn percent_run(&self) -> f32 {
        f32::from_bits(self.percent_bits.load(Ordering::Relaxed))
    }

    pub(crate) fn set_percent(&self, percent: f32) {
        self.percent_bits
            .store(percent.clamp(0.0, 100.0).to_bits(), Ordering::Relaxed);
    }

    /// Result of the last action of the most recent dispatch.
    pub fn last_result(&self) -> ActionValue {
        lock_or_recover(&self.last_result, "EventRecord::last_result").clone()
    }

    pub(crate) fn store_result(&self, value: ActionValue) {
        *lock_or_recover(&self.last_result, "EventRecord::store_result") = value;
    }

    /// Ask the running dispatch to stop at its next cooperative check.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Run `callback` when the event ends, or right away if it already has.
    pub fn add_up_func<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut up = lock_or_recover(&self.up_funcs, "EventRecord::add_up_func");
        if up.fired {
            drop(up);
            callback();
        } else {
            up.list.push(Box::new(callback));
        }
    }

    /// Signal the end of an enduring event.
    ///
    /// Only the first call has an effect. A held event ends right away; one
    /// whose dispatch has not finished yet ends in `set_started`. Unless
    /// called from the action thread, blocks until the release callbacks ran
    /// or the end timeout passed.
    pub fn set_should_end(self: &Arc<Self>) {
        enum Outcome {
            AlreadyEnded,
            Waiting,
            EndNow,
        }

        let outcome = {
            let queue = lock_or_recover(&self.queue, "EventRecord::set_should_end");
            let dispatch_ahead = !queue.pending.is_empty() || !queue.work.is_empty();
            if queue.state == RecordState::Ended && !dispatch_ahead {
                Outcome::AlreadyEnded
            } else if self.should_end.swap(true, Ordering::AcqRel) {
                Outcome::Waiting
            } else if matches!(queue.state, RecordState::Held | RecordState::Idle) && !dispatch_ahead {
                Outcome::EndNow
            } else {
                // A dispatch is still to come or under way; it picks the
                // flag up in `set_started`.
                Outcome::Waiting
            }
        };

        match outcome {
            Outcome::AlreadyEnded => return,
            Outcome::EndNow => self.schedule_end(),
            Outcome::Waiting => {}
        }

        if !self.on_action_thread() && !self.ended.wait(self.hooks.end_timeout) {
            log_debug(&format!(
                "end of '{}' still pending after {:?}",
                self.string, self.hooks.end_timeout
            ));
            tracing::warn!(event = %self.string, "end callbacks timed out");
        }
    }

    /// Wait until the event has ended. Returns false on timeout.
    pub fn wait_ended(&self, timeout: Duration) -> bool {
        self.ended.wait(timeout)
    }

    pub(crate) fn enqueue_trigger(&self, trigger: PendingTrigger) {
        lock_or_recover(&self.queue, "EventRecord::enqueue_trigger")
            .pending
            .push_back(trigger);
    }

    /// Queue one dispatch and make sure a worker is draining the queue.
    pub(crate) fn execute(self: &Arc<Self>) {
        let spawn = {
            let mut queue = lock_or_recover(&self.queue, "EventRecord::execute");
            queue.work.push_back(DispatchTicket {
                queued_at: Instant::now(),
            });
            if queue.state != RecordState::Running {
                queue.state = RecordState::Queued;
            }
            if queue.worker_active {
                false
            } else {
                queue.worker_active = true;
                true
            }
        };
        if spawn {
            self.spawn_worker();
        }
    }

    fn spawn_worker(self: &Arc<Self>) {
        let record = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(self.string.clone())
            .spawn(move || record.drain());
        if let Err(err) = spawned {
            log_debug(&format!(
                "failed to spawn worker for '{}': {err}; draining inline",
                self.string
            ));
            self.drain();
        }
    }

    fn drain(self: &Arc<Self>) {
        let Some(runner) = self.hooks.runner.as_ref().and_then(Weak::upgrade) else {
            lock_or_recover(&self.queue, "EventRecord::drain").worker_active = false;
            log_debug(&format!("no dispatcher for '{}'; dropping work", self.string));
            return;
        };
        while let Some(trigger) = runner.next_work(self) {
            Arc::clone(&runner).dispatch(self, trigger);
        }
    }

    /// Reset the per-dispatch fields and publish the new occurrence.
    pub(crate) fn begin_dispatch(&self, trigger: PendingTrigger, sequence: u64) -> Arc<DispatchInfo> {
        if self.is_ended.swap(false, Ordering::AcqRel) {
            lock_or_recover(&self.up_funcs, "EventRecord::begin_dispatch").fired = false;
            self.ended.reset();
        }
        self.stop_requested.store(false, Ordering::Release);
        self.set_percent(0.0);
        self.store_result(ActionValue::Null);

        let info = Arc::new(DispatchInfo {
            string: self.string.clone(),
            prefix: self.prefix.clone(),
            suffix: self.suffix.clone(),
            payload: trigger.payload,
            source: trigger.source,
            kind: trigger.kind,
            sequence,
            time: Instant::now(),
        });
        *lock_or_recover(&self.current, "EventRecord::begin_dispatch") = Arc::clone(&info);
        self.hooks.notifier.notify(ProcessingState::Busy, self);
        info
    }

    /// Called once a dispatch is through its handlers. Ends the event if it
    /// was instant or the end was already signalled; otherwise holds it.
    pub(crate) fn set_started(&self, ends_now: bool) {
        let end = {
            let mut queue = lock_or_recover(&self.queue, "EventRecord::set_started");
            if ends_now || self.should_end.load(Ordering::Acquire) {
                true
            } else {
                queue.state = if queue.work.is_empty() {
                    RecordState::Held
                } else {
                    RecordState::Queued
                };
                false
            }
        };
        if end {
            self.end();
        }
    }

    fn on_action_thread(&self) -> bool {
        self.hooks
            .action_thread
            .as_ref()
            .is_some_and(ActionThread::is_current)
    }

    fn schedule_end(self: &Arc<Self>) {
        match &self.hooks.action_thread {
            Some(action_thread) if !action_thread.is_current() => {
                let record = Arc::clone(self);
                if let Err(err) = action_thread.call(move || record.end()) {
                    log_debug(&format!("{err}; ending '{}' inline", self.string));
                    self.end();
                }
            }
            _ => self.end(),
        }
    }

    /// Fire the release callbacks exactly once and mark the event ended.
    pub(crate) fn end(&self) {
        let callbacks = {
            let mut up = lock_or_recover(&self.up_funcs, "EventRecord::end");
            if up.fired {
                return;
            }
            up.fired = true;
            std::mem::take(&mut up.list)
        };
        for callback in callbacks {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(callback)) {
                let message = crate::panic_message(payload.as_ref());
                log_debug(&format!("release callback of '{}' panicked: {message}", self.string));
                tracing::error!(event = %self.string, %message, "release callback panicked");
            }
        }
        self.is_ended.store(true, Ordering::Release);
        {
            let mut queue = lock_or_recover(&self.queue, "EventRecord::end");
            self.should_end.store(false, Ordering::Release);
            queue.state = if queue.work.is_empty() {
                RecordState::Ended
            } else {
                RecordState::Queued
            };
        }
        self.hooks.notifier.notify(ProcessingState::Idle, self);
        self.ended.set();
    }
}

impl std::fmt::Debug for EventRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRecord")
            .field("string", &self.string)
            .field("state", &self.state())
            .field("is_ended", &self.is_ended())
            .finish()
    }
}
