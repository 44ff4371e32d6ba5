use std::sync::Arc;

use log::Level;

pub const LOG_TARGET: &str = "playout_jitter";

/// Diagnostic channel of a jitter buffer. Purely observational: nothing the
/// sink does changes buffer behaviour.
#[cfg_attr(test, mockall::automock)]
pub trait LogSink: Send + Sync {
    fn log(&self, level: Level, message: &str, fatal: bool);

    fn enabled(&self, _level: Level) -> bool {
        true
    }
}

pub type SharedLogSink = Arc<dyn LogSink>;

/// Forwards to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogCrateSink;

impl LogSink for LogCrateSink {
    fn log(&self, level: Level, message: &str, fatal: bool) {
        if fatal {
            log::log!(target: LOG_TARGET, level, "[fatal] {}", message);
        } else {
            log::log!(target: LOG_TARGET, level, "{}", message);
        }
    }

    fn enabled(&self, level: Level) -> bool {
        log::log_enabled!(target: LOG_TARGET, level)
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LogSink for NullSink {
    fn log(&self, _level: Level, _message: &str, _fatal: bool) {}

    fn enabled(&self, _level: Level) -> bool {
        false
    }
}
