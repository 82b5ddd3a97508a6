use super::{run_guarded, Job, WorkerError, EVENT_THREAD_NAME};
use crate::event::EventRecord;
use crate::lock_or_recover;
use crate::log_debug;
use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

enum EventMessage {
    Execute(Arc<EventRecord>),
    Call(Job),
    Shutdown,
}

/// Owns the main automation queue: triggered records are scheduled from
/// here so triggering never blocks the plugin that raised the event.
pub struct EventThread {
    sender: Sender<EventMessage>,
    pending: Arc<AtomicUsize>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl EventThread {
    pub fn start() -> Result<Self> {
        let (sender, receiver) = unbounded();
        let pending = Arc::new(AtomicUsize::new(0));
        let loop_pending = Arc::clone(&pending);
        let handle = thread::Builder::new()
            .name(EVENT_THREAD_NAME.to_string())
            .spawn(move || run_loop(receiver, loop_pending))
            .context("failed to spawn the event thread")?;
        Ok(Self {
            sender,
            pending,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Schedule one dispatch of `record`.
    pub fn execute(&self, record: Arc<EventRecord>) -> Result<(), WorkerError> {
        self.post(EventMessage::Execute(record))
    }

    /// Run an arbitrary job on the event thread.
    pub fn call<F>(&self, job: F) -> Result<(), WorkerError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.post(EventMessage::Call(Box::new(job)))
    }

    /// Messages posted but not yet handled.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn shutdown(&self) {
        let _ = self.sender.send(EventMessage::Shutdown);
        let handle = lock_or_recover(&self.handle, "EventThread::shutdown").take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                log_debug("event thread exited with a panic");
            }
        }
    }

    fn post(&self, message: EventMessage) -> Result<(), WorkerError> {
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.sender.send(message).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            WorkerError::Stopped(EVENT_THREAD_NAME)
        })
    }
}

fn run_loop(receiver: Receiver<EventMessage>, pending: Arc<AtomicUsize>) {
    log_debug("event thread started");
    while let Ok(message) = receiver.recv() {
        match message {
            EventMessage::Execute(record) => record.execute(),
            EventMessage::Call(job) => run_guarded(EVENT_THREAD_NAME, job),
            EventMessage::Shutdown => break,
        }
        pending.fetch_sub(1, Ordering::AcqRel);
    }
    log_debug("event thread stopped");
}
