pub mod actions;
pub mod config;
pub mod engine;
pub mod event;
pub mod eventlog;
pub mod handlers;
pub mod interpreter;
mod lock;
pub mod logging;
pub mod notify;
pub mod telemetry;
pub mod tree;
pub mod workers;

use std::any::Any;

pub(crate) use lock::lock_or_recover;
pub use actions::{action_fn, Action, ActionValue, BuiltinAction, JumpCondition, MacroError};
pub use config::{AppConfig, EngineConfig, LogFormat};
pub use engine::Engine;
pub use event::{
    event_string, DispatchInfo, EventRecord, EventRegistry, EventRequest, EventTrigger,
    RecordState, TriggerKind,
};
pub use eventlog::{EventLog, LogEntry, MemoryLog, TracingLog};
pub use handlers::HandlerTable;
pub use interpreter::{run_program, ExecutionContext};
pub use logging::{init_logging, log_debug, log_file_path, log_panic};
pub use notify::{
    ListenerId, Notice, NotificationRegistry, ProcessingState, ProcessingStateNotifier,
};
pub use telemetry::init_tracing;
pub use tree::{ItemPath, MacroTree, NodeId, NodeKind, ProgramPosition, TreeBuilder, TreeDocument};
pub use workers::{ActionThread, EventThread, Signal, WorkerError};

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        String::from("non-string panic payload")
    }
}
