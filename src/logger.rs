//! Session log for the colouring core.
//!
//! Records what the interactive path does not surface to the user:
//! segmentation summaries (mask count, raw and compressed bytes, time),
//! fill queries (candidates tried, masks skipped because they failed to
//! decode), stale background fills that were discarded, history replays and
//! compactions (including compactions abandoned because the baseline could
//! not be encoded), and configuration errors found at startup.
//!
//! One file per run, truncated when [`init`] is called:
//!   Windows:  `%APPDATA%\Tapfill\tapfill.log`
//!   Linux:    `$XDG_DATA_HOME/Tapfill/tapfill.log` (or `~/.local/share/...`)
//!   macOS:    `~/Library/Application Support/Tapfill/tapfill.log`
//!
//! The binary calls [`init`]; library users and the test suite usually
//! don't, and every `log_*!` call is then a no-op.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

static LOG_FILE: OnceLock<Mutex<File>> = OnceLock::new();

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
    Panic,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Panic => "PANIC",
        })
    }
}

pub fn is_enabled() -> bool {
    LOG_FILE.get().is_some()
}

fn append(line: &str) {
    if let Some(mutex) = LOG_FILE.get() {
        if let Ok(mut file) = mutex.lock() {
            let _ = writeln!(file, "{}", line);
        }
    }
}

/// `[HH:MM:SS] [LEVEL] msg`.  I/O errors are ignored.
pub fn write(level: Level, msg: &str) {
    if !is_enabled() {
        return;
    }
    append(&format!("[{}] [{}] {}", clock(), level, msg));
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Info, &format!($($arg)*));
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Warn, &format!($($arg)*));
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Error, &format!($($arg)*));
    };
}

/// Open (truncating) the log file and mirror panics into it.  A log file
/// that cannot be opened leaves logging disabled.
pub fn init() {
    let path = data_dir().join("Tapfill").join("tapfill.log");
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    let file = match OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path)
    {
        Ok(f) => f,
        Err(e) => {
            eprintln!("[logger] cannot open {}: {}", path.display(), e);
            return;
        }
    };
    if LOG_FILE.set(Mutex::new(file)).is_err() {
        // Already initialised
        return;
    }

    append(&format!("=== tapfill {} (unix {}) ===", env!("CARGO_PKG_VERSION"), unix_secs()));
    append(&format!("log: {}", path.display()));

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        write(Level::Panic, &info.to_string());
        prev(info);
    }));
}

/// Platform data directory, without the app folder.
fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata);
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support");
        }
    }
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from(".")
}

fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// `HH:MM:SS` within the current UTC day.
fn clock() -> String {
    let secs = unix_secs();
    format!(
        "{:02}:{:02}:{:02}",
        (secs % 86400) / 3600,
        (secs % 3600) / 60,
        secs % 60
    )
}
