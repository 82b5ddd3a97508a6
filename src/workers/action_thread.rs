use super::{run_guarded, Job, WorkerError, ACTION_THREAD_NAME};
use crate::lock_or_recover;
use crate::log_debug;
use anyhow::{Context, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle, ThreadId};

enum ActionMessage {
    Run(Job),
    Shutdown,
}

struct Inner {
    sender: Sender<ActionMessage>,
    thread_id: ThreadId,
    handle: Mutex<Option<JoinHandle<()>>>,
}

/// The one thread every action body runs on, one job at a time, in
/// submission order. Cheap to clone; all clones feed the same queue.
#[derive(Clone)]
pub struct ActionThread {
    inner: Arc<Inner>,
}

impl ActionThread {
    pub fn start() -> Result<Self> {
        let (sender, receiver) = unbounded();
        let handle = thread::Builder::new()
            .name(ACTION_THREAD_NAME.to_string())
            .spawn(move || run_loop(receiver))
            .context("failed to spawn the action thread")?;
        let thread_id = handle.thread().id();
        Ok(Self {
            inner: Arc::new(Inner {
                sender,
                thread_id,
                handle: Mutex::new(Some(handle)),
            }),
        })
    }

    pub fn is_current(&self) -> bool {
        thread::current().id() == self.inner.thread_id
    }

    /// Queue `job` and return immediately.
    pub fn call<F>(&self, job: F) -> Result<(), WorkerError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner
            .sender
            .send(ActionMessage::Run(Box::new(job)))
            .map_err(|_| WorkerError::Stopped(ACTION_THREAD_NAME))
    }

    /// Run `job` on the action thread and hand back its value. Runs inline
    /// when already on the action thread, since queueing would deadlock.
    pub fn call_wait<F, R>(&self, job: F) -> Result<R, WorkerError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_current() {
            return std::panic::catch_unwind(std::panic::AssertUnwindSafe(job))
                .map_err(|_| WorkerError::JobPanicked(ACTION_THREAD_NAME));
        }
        let (reply, result) = bounded(1);
        self.call(move || {
            let _ = reply.send(job());
        })?;
        result
            .recv()
            .map_err(|_| WorkerError::JobPanicked(ACTION_THREAD_NAME))
    }

    /// Stop after the jobs already queued and join the thread.
    pub fn shutdown(&self) {
        let _ = self.inner.sender.send(ActionMessage::Shutdown);
        if self.is_current() {
            return;
        }
        let handle = lock_or_recover(&self.inner.handle, "ActionThread::shutdown").take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log_debug("action thread exited with a panic");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        lock_or_recover(&self.inner.handle, "ActionThread::is_running")
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

fn run_loop(receiver: Receiver<ActionMessage>) {
    log_debug("action thread started");
    while let Ok(message) = receiver.recv() {
        match message {
            ActionMessage::Run(job) => run_guarded(ACTION_THREAD_NAME, job),
            ActionMessage::Shutdown => break,
        }
    }
    log_debug("action thread stopped");
}
