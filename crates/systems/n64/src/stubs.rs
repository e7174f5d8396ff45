//! Once-per-session reporting of commands that run as no-ops.

use crate::ErrorClass;
use emu_core::logging::{log, LogCategory, LogLevel};
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct StubLog {
    seen: HashSet<String>,
}

impl StubLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `name`. Only the first report of each name is logged.
    pub fn report(&mut self, name: &str) {
        if self.seen.contains(name) {
            return;
        }
        self.seen.insert(name.to_string());
        log(LogCategory::Stubs, LogLevel::Warn, || {
            format!("{} {}", ErrorClass::Unimplemented.prefix(), name)
        });
    }

    pub fn was_reported(&self, name: &str) -> bool {
        self.seen.contains(name)
    }

    pub fn reported(&self) -> impl Iterator<Item = &str> {
        self.seen.iter().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_each_name_once() {
        let mut stubs = StubLog::new();
        stubs.report("Sprite2DBase");
        stubs.report("Sprite2DBase");
        stubs.report("DmaIo");
        assert!(stubs.was_reported("DmaIo"));
        assert_eq!(stubs.reported().count(), 2);

        stubs.clear();
        assert!(!stubs.was_reported("DmaIo"));
    }
}
