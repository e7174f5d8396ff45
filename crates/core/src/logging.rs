//! Centralized logging for the graphics HLE.
//!
//! # Architecture
//!
//! - **LogConfig**: process-wide configuration; one atomic level per category plus a global fallback
//! - **LogLevel**: hierarchical levels (Off < Error < Warn < Info < Debug < Trace)
//! - **LogCategory**: the pipeline stage a message comes from (task, microcode, display list, ...)
//! - **log()**: single entry point, lazily formatted and rate limited per category
//!
//! Output goes to stderr. Levels are set from a filter string such as
//! `"texture=debug,warn"`, usually taken from the session config.
//!
//! # Usage
//!
//! ```rust
//! use emu_core::logging::{log, LogCategory, LogLevel};
//!
//! log(LogCategory::DisplayList, LogLevel::Debug, || {
//!     format!("DL: call {:08X}", 0x0010_0000)
//! });
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

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
    /// Parse log level from string (case-insensitive)
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

/// Pipeline stage a log message originates from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    /// Task dispatch (task type, interrupts, presentation)
    Task,
    /// Microcode identification
    Microcode,
    /// Display-list control flow and fatal halts
    DisplayList,
    /// Matrices, vertices, lights and triangles
    Geometry,
    /// RDP state commands (tiles, images, rectangles)
    Rdp,
    /// TMEM loads, hashing and the texture cache
    Texture,
    /// Render backend
    Backend,
    /// Unimplemented commands and known gaps
    Stubs,
}

const CATEGORY_COUNT: usize = 8;

impl LogCategory {
    /// Parse a category name (case-insensitive)
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "task" => Some(LogCategory::Task),
            "microcode" | "ucode" => Some(LogCategory::Microcode),
            "displaylist" | "dl" => Some(LogCategory::DisplayList),
            "geometry" | "rsp" => Some(LogCategory::Geometry),
            "rdp" => Some(LogCategory::Rdp),
            "texture" | "tmem" => Some(LogCategory::Texture),
            "backend" => Some(LogCategory::Backend),
            "stubs" | "stub" => Some(LogCategory::Stubs),
            _ => None,
        }
    }

    fn index(self) -> usize {
        match self {
            LogCategory::Task => 0,
            LogCategory::Microcode => 1,
            LogCategory::DisplayList => 2,
            LogCategory::Geometry => 3,
            LogCategory::Rdp => 4,
            LogCategory::Texture => 5,
            LogCategory::Backend => 6,
            LogCategory::Stubs => 7,
        }
    }
}

/// Locks a mutex, recovering the data if a writer panicked while holding it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Sliding-window rate limiter, one window per category.
struct RateLimiter {
    max_logs_per_second: usize,
    window_duration: Duration,
    timestamps: Mutex<[VecDeque<Instant>; CATEGORY_COUNT]>,
    dropped_counts: Mutex<[usize; CATEGORY_COUNT]>,
    last_drop_report: Mutex<[Option<Instant>; CATEGORY_COUNT]>,
}

impl RateLimiter {
    fn new(max_logs_per_second: usize) -> Self {
        Self {
            max_logs_per_second,
            window_duration: Duration::from_secs(1),
            timestamps: Mutex::new(std::array::from_fn(|_| VecDeque::new())),
            dropped_counts: Mutex::new([0; CATEGORY_COUNT]),
            last_drop_report: Mutex::new([None; CATEGORY_COUNT]),
        }
    }

    /// Check if a log should be allowed based on rate limits
    /// Returns (allowed, dropped_count) where dropped_count is Some(n) if drops should be reported
    fn should_allow(&self, category: LogCategory) -> (bool, Option<usize>) {
        let now = Instant::now();
        let idx = category.index();

        let mut timestamps = lock(&self.timestamps);
        let mut dropped_counts = lock(&self.dropped_counts);
        let mut last_drop_report = lock(&self.last_drop_report);

        let window = &mut timestamps[idx];
        while let Some(&front) = window.front() {
            if now.duration_since(front) > self.window_duration {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() < self.max_logs_per_second {
            window.push_back(now);

            let dropped = dropped_counts[idx];
            if dropped > 0 {
                dropped_counts[idx] = 0;
                last_drop_report[idx] = Some(now);
                return (true, Some(dropped));
            }
            (true, None)
        } else {
            dropped_counts[idx] += 1;

            // Drops are summarized at most once per second
            let should_report = match last_drop_report[idx] {
                None => true,
                Some(last) => now.duration_since(last) >= Duration::from_secs(1),
            };
            if should_report {
                let dropped = dropped_counts[idx];
                dropped_counts[idx] = 0;
                last_drop_report[idx] = Some(now);
                (false, Some(dropped))
            } else {
                (false, None)
            }
        }
    }
}

/// One parsed filter entry; `None` targets the global level
pub type FilterEntry = (Option<LogCategory>, LogLevel);

/// Parse a filter string such as `"texture=debug,stubs=warn,error"`.
///
/// A bare level sets the global level; `category=level` pairs set that category.
pub fn parse_filter(filter: &str) -> Result<Vec<FilterEntry>, String> {
    filter
        .split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((name, level)) => {
                let category = LogCategory::from_str(name.trim())
                    .ok_or_else(|| format!("unknown log category '{}'", name.trim()))?;
                let level = LogLevel::from_str(level.trim())
                    .ok_or_else(|| format!("unknown log level '{}'", level.trim()))?;
                Ok((Some(category), level))
            }
            None => LogLevel::from_str(entry)
                .map(|level| (None, level))
                .ok_or_else(|| format!("unknown log level '{}'", entry)),
        })
        .collect()
}

/// Global logging configuration
pub struct LogConfig {
    /// Applies to every category whose own level is Off
    global_level: AtomicU8,
    category_levels: [AtomicU8; CATEGORY_COUNT],
    rate_limiter: RateLimiter,
}

impl LogConfig {
    /// Everything off, 60 messages per second per category
    fn new() -> Self {
        Self {
            global_level: AtomicU8::new(LogLevel::Off as u8),
            category_levels: std::array::from_fn(|_| AtomicU8::new(LogLevel::Off as u8)),
            rate_limiter: RateLimiter::new(60),
        }
    }

    /// Get the global singleton instance
    pub fn global() -> &'static Self {
        use std::sync::OnceLock;
        static INSTANCE: OnceLock<LogConfig> = OnceLock::new();
        INSTANCE.get_or_init(LogConfig::new)
    }

    fn global_level(&self) -> LogLevel {
        LogLevel::from_u8(self.global_level.load(Ordering::Relaxed))
    }

    fn level(&self, category: LogCategory) -> LogLevel {
        LogLevel::from_u8(self.category_levels[category.index()].load(Ordering::Relaxed))
    }

    /// Check if a message should be logged for the given category and level
    ///
    /// A category with its own level uses it; a category left at Off falls back
    /// to the global level.
    pub fn should_log(&self, category: LogCategory, level: LogLevel) -> bool {
        let category_level = self.level(category);
        if category_level != LogLevel::Off {
            level <= category_level
        } else {
            level <= self.global_level()
        }
    }

    /// Parse and apply a filter string. Nothing changes when any entry is invalid.
    pub fn apply_filter(&self, filter: &str) -> Result<(), String> {
        for (category, level) in parse_filter(filter)? {
            let slot = match category {
                Some(category) => &self.category_levels[category.index()],
                None => &self.global_level,
            };
            slot.store(level as u8, Ordering::Relaxed);
        }
        Ok(())
    }
}

/// Log a message with the specified category and level
///
/// The closure only runs when the category/level is enabled and the per-category
/// rate limit (60/s by default) has room. Dropped messages are summarized with a
/// warning line once per second.
///
/// # Examples
///
/// ```rust
/// use emu_core::logging::{log, LogCategory, LogLevel};
///
/// log(LogCategory::Texture, LogLevel::Debug, || {
///     format!("TMEM: block load of {} bytes", 256)
/// });
/// ```
pub fn log<F>(category: LogCategory, level: LogLevel, message_fn: F)
where
    F: FnOnce() -> String,
{
    let config = LogConfig::global();
    if config.should_log(category, level) {
        let (allowed, dropped_count) = config.rate_limiter.should_allow(category);

        if let Some(count) = dropped_count.filter(|&c| c > 0) {
            eprintln!(
                "[{:?}] WARNING: Rate limit exceeded, {} log message(s) dropped in the last second",
                category, count
            );
        }

        if allowed {
            eprintln!("{}", message_fn());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::from_str("off"), Some(LogLevel::Off));
        assert_eq!(LogLevel::from_str("ERR"), Some(LogLevel::Error));
        assert_eq!(LogLevel::from_str("WARNING"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_str("3"), Some(LogLevel::Info));
        assert_eq!(LogLevel::from_str("DEBUG"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::from_str("trace"), Some(LogLevel::Trace));
        assert_eq!(LogLevel::from_str("invalid"), None);
    }

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Off < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Trace);
    }

    #[test]
    fn test_category_parsing() {
        assert_eq!(LogCategory::from_str("tmem"), Some(LogCategory::Texture));
        assert_eq!(LogCategory::from_str("DL"), Some(LogCategory::DisplayList));
        assert_eq!(LogCategory::from_str("ucode"), Some(LogCategory::Microcode));
        assert_eq!(LogCategory::from_str("gpu"), None);
    }

    #[test]
    fn test_category_level_overrides_global() {
        let config = LogConfig::new();
        config.apply_filter("error,geometry=debug").unwrap();

        assert!(config.should_log(LogCategory::Geometry, LogLevel::Debug));
        assert!(!config.should_log(LogCategory::Task, LogLevel::Warn));
        assert!(config.should_log(LogCategory::Task, LogLevel::Error));
    }

    #[test]
    fn test_apply_filter() {
        let config = LogConfig::new();
        config
            .apply_filter("texture=debug, stubs=warn,info")
            .unwrap();
        assert_eq!(config.level(LogCategory::Texture), LogLevel::Debug);
        assert_eq!(config.level(LogCategory::Stubs), LogLevel::Warn);
        assert_eq!(config.level(LogCategory::Rdp), LogLevel::Off);
        assert_eq!(config.global_level(), LogLevel::Info);
    }

    #[test]
    fn test_invalid_filter_changes_nothing() {
        let config = LogConfig::new();
        assert!(config.apply_filter("rdp=debug,shader=debug").is_err());
        assert!(config.apply_filter("rdp=loud").is_err());
        assert_eq!(config.level(LogCategory::Rdp), LogLevel::Off);
        assert_eq!(parse_filter(" , "), Ok(vec![]));
    }

    #[test]
    fn test_rate_limiter_blocks_over_limit() {
        let limiter = RateLimiter::new(60);
        for _ in 0..60 {
            let (allowed, _) = limiter.should_allow(LogCategory::Geometry);
            assert!(allowed, "Should allow logs within the rate limit");
        }
        let (allowed, _) = limiter.should_allow(LogCategory::Geometry);
        assert!(!allowed, "Should block logs exceeding the rate limit");

        // Other categories have their own window
        let (allowed, _) = limiter.should_allow(LogCategory::Texture);
        assert!(allowed);
    }

    #[test]
    fn test_rate_limiter_reports_dropped_count() {
        let limiter = RateLimiter::new(5);
        for _ in 0..5 {
            limiter.should_allow(LogCategory::Stubs);
        }
        for _ in 0..10 {
            limiter.should_allow(LogCategory::Stubs);
        }

        std::thread::sleep(Duration::from_millis(1100));

        let (allowed, dropped) = limiter.should_allow(LogCategory::Stubs);
        assert!(allowed, "Should be allowed after window slides");
        let dropped = dropped.expect("drop count reported");
        // The first drop is reported immediately, so 9 or 10 remain
        assert!((9..=10).contains(&dropped), "got {}", dropped);
    }
}
