//! The two long-lived worker threads and the signal they hand off with.

mod action_thread;
mod event_thread;
mod signal;

pub use action_thread::ActionThread;
pub use event_thread::EventThread;
pub use signal::Signal;

pub(crate) const ACTION_THREAD_NAME: &str = "eventghost-action";
pub(crate) const EVENT_THREAD_NAME: &str = "eventghost-event";

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkerError {
    #[error("{0} thread is not running")]
    Stopped(&'static str),
    #[error("job on the {0} thread panicked before returning")]
    JobPanicked(&'static str),
}

/// Run a job, keeping a panic from unwinding into the worker loop.
pub(crate) fn run_guarded(thread_name: &str, job: Job) {
    if let Err(payload) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)) {
        let message = crate::panic_message(payload.as_ref());
        crate::log_debug(&format!("job on {thread_name} panicked: {message}"));
        tracing::error!(thread = thread_name, %message, "worker job panicked");
    }
}
