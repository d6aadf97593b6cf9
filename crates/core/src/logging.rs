//! Centralized logging configuration for the emulator core.
//!
//! - **LogConfig**: thread-safe global configuration using atomic levels
//! - **LogLevel**: hierarchical levels (Off < Error < Warn < Info < Debug < Trace)
//! - **LogCategory**: per-component channels (Cpu, Bus, Interrupts, Stubs)
//! - **log()**: single entry point with lazy message construction
//!
//! Messages are cheap to skip: the closure building the text only runs when
//! the category/level combination is enabled, so instruction tracing costs
//! nothing while it is off. File output happens on a background thread so
//! the stepping loop never blocks on disk I/O.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::Mutex;
use std::thread;

/// Log level for controlling verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    /// Parse a log level from a string (case-insensitive)
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "off" | "0" => Some(LogLevel::Off),
            "error" | "err" | "1" => Some(LogLevel::Error),
            "warn" | "warning" | "2" => Some(LogLevel::Warn),
            "info" | "3" => Some(LogLevel::Info),
            "debug" | "4" => Some(LogLevel::Debug),
            "trace" | "5" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    fn from_u8(val: u8) -> Self {
        match val {
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            5 => LogLevel::Trace,
            _ => LogLevel::Off,
        }
    }
}

/// Log category for the different parts of the core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    /// Instruction execution and IP tracing
    Cpu,
    /// Memory and port bus traffic
    Bus,
    /// Interrupt raises (INT n, INT3)
    Interrupts,
    /// Unimplemented or invalid opcodes
    Stubs,
}

/// Global logging configuration
pub struct LogConfig {
    /// Fallback level when a category has no specific level set
    global_level: AtomicU8,
    cpu_level: AtomicU8,
    bus_level: AtomicU8,
    interrupt_level: AtomicU8,
    stub_level: AtomicU8,
    /// Channel feeding the background file-writer thread
    log_sender: Mutex<Option<Sender<String>>>,
    file_logging_enabled: AtomicBool,
}

impl LogConfig {
    fn new() -> Self {
        Self {
            global_level: AtomicU8::new(LogLevel::Off as u8),
            cpu_level: AtomicU8::new(LogLevel::Off as u8),
            bus_level: AtomicU8::new(LogLevel::Off as u8),
            interrupt_level: AtomicU8::new(LogLevel::Off as u8),
            stub_level: AtomicU8::new(LogLevel::Off as u8),
            log_sender: Mutex::new(None),
            file_logging_enabled: AtomicBool::new(false),
        }
    }

    /// Get the global singleton instance
    pub fn global() -> &'static Self {
        use std::sync::OnceLock;
        static INSTANCE: OnceLock<LogConfig> = OnceLock::new();
        INSTANCE.get_or_init(LogConfig::new)
    }

    /// Set the fallback level applied to categories without a specific level
    pub fn set_global_level(&self, level: LogLevel) {
        self.global_level.store(level as u8, Ordering::Relaxed);
    }

    /// Get the fallback level
    pub fn get_global_level(&self) -> LogLevel {
        LogLevel::from_u8(self.global_level.load(Ordering::Relaxed))
    }

    fn level_slot(&self, category: LogCategory) -> &AtomicU8 {
        match category {
            LogCategory::Cpu => &self.cpu_level,
            LogCategory::Bus => &self.bus_level,
            LogCategory::Interrupts => &self.interrupt_level,
            LogCategory::Stubs => &self.stub_level,
        }
    }

    /// Set the level for a specific category
    pub fn set_level(&self, category: LogCategory, level: LogLevel) {
        self.level_slot(category).store(level as u8, Ordering::Relaxed);
    }

    /// Get the level for a specific category
    pub fn get_level(&self, category: LogCategory) -> LogLevel {
        LogLevel::from_u8(self.level_slot(category).load(Ordering::Relaxed))
    }

    /// Check whether a message at `level` should be emitted for `category`.
    ///
    /// A category-specific level takes priority; `Off` falls back to the
    /// global level.
    pub fn should_log(&self, category: LogCategory, level: LogLevel) -> bool {
        let category_level = self.get_level(category);
        if category_level != LogLevel::Off {
            level <= category_level
        } else {
            level <= self.get_global_level()
        }
    }

    /// Reset all levels to Off
    pub fn reset(&self) {
        self.set_global_level(LogLevel::Off);
        self.set_level(LogCategory::Cpu, LogLevel::Off);
        self.set_level(LogCategory::Bus, LogLevel::Off);
        self.set_level(LogCategory::Interrupts, LogLevel::Off);
        self.set_level(LogCategory::Stubs, LogLevel::Off);
    }

    /// Route log output to a file, appending.
    ///
    /// Spawns a background writer thread; an existing writer is replaced.
    pub fn set_log_file(&self, path: PathBuf) -> std::io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        let (sender, receiver) = channel::<String>();

        thread::Builder::new()
            .name("log-writer".to_string())
            .spawn(move || {
                let mut file = file;
                while let Ok(message) = receiver.recv() {
                    // Logging must never take the emulator down
                    let _ = writeln!(file, "{}", message);
                    let _ = file.flush();
                }
                let _ = file.flush();
            })?;

        let mut log_sender = self.log_sender.lock().unwrap();
        *log_sender = Some(sender);
        self.file_logging_enabled.store(true, Ordering::Relaxed);

        Ok(())
    }

    /// Stop logging to file; subsequent messages go to stderr.
    pub fn clear_log_file(&self) {
        let mut log_sender = self.log_sender.lock().unwrap();
        *log_sender = None;
        self.file_logging_enabled.store(false, Ordering::Relaxed);
        // Writer thread exits when the sender is dropped
    }

    fn write_message(&self, message: &str) {
        if self.file_logging_enabled.load(Ordering::Relaxed) {
            let log_sender = self.log_sender.lock().unwrap();
            if let Some(ref sender) = *log_sender {
                if sender.send(message.to_string()).is_err() {
                    eprintln!("{}", message);
                }
            } else {
                eprintln!("{}", message);
            }
        } else {
            eprintln!("{}", message);
        }
    }
}

/// Log a message for the given category and level.
///
/// The message closure is only evaluated when the category/level is
/// enabled, so callers can format freely in hot paths:
///
/// ```rust
/// use emu8086_core::logging::{log, LogCategory, LogLevel};
///
/// log(LogCategory::Cpu, LogLevel::Trace, || {
///     format!("opcode {:02X} at {:04X}:{:04X}", 0x90, 0xF000, 0x0100)
/// });
/// ```
pub fn log<F>(category: LogCategory, level: LogLevel, message_fn: F)
where
    F: FnOnce() -> String,
{
    let config = LogConfig::global();
    if config.should_log(category, level) {
        let message = message_fn();
        config.write_message(&message);
    }
}
