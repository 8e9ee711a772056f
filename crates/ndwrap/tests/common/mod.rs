//! Shared helpers for integration tests.

#![allow(dead_code)]

use log::{Level, LevelFilter, Log, Metadata, Record};
use std::collections::BTreeMap;
use std::sync::{Mutex, Once};

/// Records every log line, grouped by the name of the thread that emitted it.
///
/// The test harness runs each test on a thread named after the test, so a
/// test sees only its own diagnostics.
struct CapturingLogger {
    records: Mutex<BTreeMap<String, Vec<(Level, String)>>>,
}

impl Log for CapturingLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        let thread = std::thread::current().name().unwrap_or("<unnamed>").to_string();
        let mut records = self.records.lock().unwrap();
        records
            .entry(thread)
            .or_default()
            .push((record.level(), record.args().to_string()));
    }

    fn flush(&self) {}
}

static LOGGER: CapturingLogger = CapturingLogger {
    records: Mutex::new(BTreeMap::new()),
};
static INIT: Once = Once::new();

/// Install the capturing logger (once per test binary) and drop anything the
/// current thread logged so far.
pub fn init_logging() {
    INIT.call_once(|| {
        log::set_logger(&LOGGER).unwrap();
        log::set_max_level(LevelFilter::Trace);
    });
    take_logs();
}

/// Drain the lines logged by the current thread.
pub fn take_logs() -> Vec<(Level, String)> {
    let thread = std::thread::current().name().unwrap_or("<unnamed>").to_string();
    LOGGER
        .records
        .lock()
        .unwrap()
        .remove(&thread)
        .unwrap_or_default()
}

/// Drained warnings of the current thread.
pub fn take_warnings() -> Vec<String> {
    take_logs()
        .into_iter()
        .filter(|(level, _)| *level == Level::Warn)
        .map(|(_, message)| message)
        .collect()
}
