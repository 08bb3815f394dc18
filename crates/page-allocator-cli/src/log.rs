use core::fmt;
use std::{
    sync::{
        OnceLock,
        atomic::{AtomicU8, Ordering},
    },
    time::Instant,
};

use page_allocator::{Action, Logger};

macro_rules! log {
    ($level:expr, $($arg:tt)*) => {
        $crate::log::log($level, format_args!($($arg)*));
    };
}

macro_rules! trace {
    ($($arg:tt)*) => {
        log!($crate::log::LogLevel::Trace, $($arg)*);
    };
}

macro_rules! debug {
    ($($arg:tt)*) => {
        log!($crate::log::LogLevel::Debug, $($arg)*);
    };
}

macro_rules! info {
    ($($arg:tt)*) => {
        log!($crate::log::LogLevel::Info, $($arg)*);
    };
}

macro_rules! warn {
    ($($arg:tt)*) => {
        log!($crate::log::LogLevel::Warn, $($arg)*);
    };
}

static MAX_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);
static START: OnceLock<Instant> = OnceLock::new();

pub fn set_max_level(level: LogLevel) {
    START.get_or_init(Instant::now);
    MAX_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn enabled(level: LogLevel) -> bool {
    level as u8 >= MAX_LEVEL.load(Ordering::Relaxed)
}

pub fn log(level: LogLevel, message: fmt::Arguments) {
    if !enabled(level) {
        return;
    }
    let elapsed = START.get_or_init(Instant::now).elapsed();
    eprintln!("{elapsed:>10.3?} {} {}", LevelTag(level), message);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    const fn tag(self) -> (u8, &'static str) {
        match self {
            Self::Trace => (35, "TRACE"),
            Self::Debug => (34, "DEBUG"),
            Self::Info => (32, " INFO"),
            Self::Warn => (33, " WARN"),
            Self::Error => (31, "ERROR"),
        }
    }
}

/// Bold, colored level tag for terminals.
struct LevelTag(LogLevel);

impl fmt::Display for LevelTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (color, label) = self.0.tag();
        write!(f, "\x1B[{color};1m{label}\x1B[0m")
    }
}

/// Forwards allocator diagnostics to the debug level.
pub struct AllocatorLog;

impl Logger for AllocatorLog {
    fn log(&self, action: Action, bytes: usize) {
        debug!("{action} {bytes} bytes");
    }
}
