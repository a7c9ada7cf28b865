use std::fmt::Arguments;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Severity levels for log messages.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Fine-grained, low-level diagnostic messages.
    Debug,
    /// Informational messages about normal operation.
    Info,
    /// Warnings about unexpected but non-fatal behavior.
    Warn,
    /// Errors that may require attention.
    Error,
}

/// Interface for structured logging and event tracing.
///
/// Supports level-based logging with efficient formatting through
/// `std::fmt::Arguments`, plus structured trace events for the plan cache
/// and the runner selector.
pub trait LoggerAndTracer: Send + Sync {
    /// Logs a formatted message at the specified level.
    fn log(&self, level: LogLevel, msg: Arguments);

    /// Convenience method for `Debug` level logging.
    fn debug(&self, msg: Arguments) {
        self.log(LogLevel::Debug, msg);
    }

    /// Convenience method for `Info` level logging.
    fn info(&self, msg: Arguments) {
        self.log(LogLevel::Info, msg);
    }

    /// Convenience method for `Warn` level logging.
    fn warn(&self, msg: Arguments) {
        self.log(LogLevel::Warn, msg);
    }

    /// Convenience method for `Error` level logging.
    fn error(&self, msg: Arguments) {
        self.log(LogLevel::Error, msg);
    }

    /// Emits a trace event message. Format should follow:
    ///
    /// `event: <action>, key1=value1, key2=value2`
    ///
    /// Example:
    /// `event: plan_cache hit, ns=db.coll`
    fn event(&self, event: Arguments);

    /// Returns `true` if the given log level is currently enabled.
    fn level_enabled(&self, level: LogLevel) -> bool;
}

/// A simple logger that prints messages to stdout with timestamps and thread IDs.
pub struct StdoutLogger {
    /// Minimum log level to emit.
    pub min_level: LogLevel,
    /// Whether structured trace events are enabled.
    pub tracing_enabled: bool,
}

impl StdoutLogger {
    pub fn new(min_level: LogLevel, tracing_enabled: bool) -> Arc<Self> {
        Arc::new(StdoutLogger { min_level, tracing_enabled })
    }

    /// Returns current timestamp in microseconds since UNIX_EPOCH.
    fn now_micros() -> u128 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros())
            .unwrap_or(0)
    }
}

impl LoggerAndTracer for StdoutLogger {
    fn log(&self, level: LogLevel, msg: Arguments) {
        if self.level_enabled(level) {
            let timestamp = Self::now_micros();
            let thread_id = std::thread::current().id();
            println!("[{:?}] [{}] [thread={:?}] {}", level, timestamp, thread_id, msg);
        }
    }

    fn event(&self, event: Arguments) {
        if self.tracing_enabled {
            let timestamp = Self::now_micros();
            let thread_id = std::thread::current().id();
            println!("[TRACE] [{}] [thread={:?}] {}", timestamp, thread_id, event);
        }
    }

    fn level_enabled(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }
}

/// A logger that discards everything. Default for embedders that bring their
/// own observability.
#[derive(Default)]
pub struct NoOpLogger;

impl NoOpLogger {
    pub fn new() -> Arc<Self> {
        Arc::new(NoOpLogger)
    }
}

impl LoggerAndTracer for NoOpLogger {
    fn log(&self, _level: LogLevel, _msg: Arguments) {}

    fn event(&self, _event: Arguments) {}

    fn level_enabled(&self, _level: LogLevel) -> bool {
        false
    }
}

#[cfg(test)]
pub fn test_instance() -> Arc<dyn LoggerAndTracer> {
    StdoutLogger::new(LogLevel::Debug, true)
}
