//! Headless EventGhost runner.
//!
//! Loads a macro tree document, then reads events from stdin one per line and
//! dispatches them through the engine. The automation log goes to stdout.
//!
//! # Input
//!
//! - `Prefix.Suffix [payload]`: instant event, payload parsed as JSON when possible
//! - `+Prefix.Suffix [payload]`: enduring event, held until released
//! - `-Prefix.Suffix`: release a held event
//! - blank lines and `#` comments are skipped

mod console;
mod input;

use anyhow::{Context, Result};
use eventghost::{
    init_logging, init_tracing, log_debug, log_file_path, AppConfig, Engine, EventRecord,
    MacroTree, TreeDocument,
};
use std::collections::HashMap;
use std::io::{self, BufRead};
use std::panic;
use std::sync::Arc;

use crate::console::ConsoleLog;
use crate::input::{parse_line, Command};

/// Source name attached to every event read from stdin.
const STDIN_SOURCE: &str = "stdin";

fn install_panic_hook() {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        eventghost::log_panic(info);
        previous(info);
    }));
}

fn load_tree(config: &AppConfig) -> Result<MacroTree> {
    let Some(path) = &config.tree else {
        return Ok(MacroTree::builder().build());
    };
    let document = TreeDocument::load(path)?;
    document
        .build()
        .with_context(|| format!("invalid macro tree in '{}'", path.display()))
}

fn main() -> Result<()> {
    let config = AppConfig::parse_args()?;
    install_panic_hook();
    init_logging(&config);
    init_tracing(&config);
    if config.file_logging_enabled() {
        log_debug(&format!(
            "eventghost starting; debug log at {}",
            log_file_path().display()
        ));
    }

    let tree = load_tree(&config)?;
    let engine = Engine::start(
        config.engine_config(),
        Arc::new(ConsoleLog::new(config.format)),
    )?;
    let bindings = engine.load_tree(tree);
    log_debug(&format!("loaded macro tree with {bindings} event bindings"));

    let mut held: HashMap<String, Arc<EventRecord>> = HashMap::new();
    for line in io::stdin().lock().lines() {
        let line = line.context("failed to read stdin")?;
        let Some(command) = parse_line(&line) else {
            continue;
        };
        match command {
            Command::Trigger(request) => {
                engine.trigger(request.source(STDIN_SOURCE))?;
            }
            Command::Press(request) => {
                let record = engine.trigger_enduring(request.source(STDIN_SOURCE))?;
                let replaced = held.insert(record.string().to_string(), Arc::clone(&record));
                // A re-press after the first dispatch retired lands on a new
                // record; the old one would otherwise never be released.
                if let Some(previous) = replaced {
                    if !Arc::ptr_eq(&previous, &record) {
                        previous.set_should_end();
                    }
                }
            }
            Command::Release(string) => match held.remove(&string) {
                Some(record) => record.set_should_end(),
                None => eprintln!("{string} is not held"),
            },
        }
    }

    for (_, record) in held.drain() {
        record.set_should_end();
    }
    if !engine.wait_idle(config.idle_timeout()) {
        eprintln!(
            "macros still running after {} ms; exiting",
            config.idle_timeout_ms
        );
    }
    engine.shutdown();
    Ok(())
}
