use chrono::Local;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

static VERBOSE: AtomicBool = AtomicBool::new(false);

pub fn set_verbose(enabled: bool) {
    VERBOSE.store(enabled, Ordering::Relaxed);
}

pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

/// Timestamped diagnostic line on stderr. Stdout carries only primes.
pub fn write_line(level: &str, args: fmt::Arguments<'_>) {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    eprintln!("{} | {} | {}", timestamp, level, args);
}

/// Progress output, only with `--verbose`.
macro_rules! verbose {
    ($($arg:tt)*) => {
        if $crate::log::is_verbose() {
            $crate::log::write_line("info", format_args!($($arg)*));
        }
    };
}

/// Always printed.
macro_rules! warning {
    ($($arg:tt)*) => {
        $crate::log::write_line("warn", format_args!($($arg)*))
    };
}

pub(crate) use verbose;
pub(crate) use warning;
