//! Scoped begin/complete logging around one operation
//!
//! - `{NAME}_BEGIN` on creation (TRACE)
//! - `{NAME}_COMPLETE` with elapsed `millis` on `complete()` (INFO)
//! - `{NAME}_FAILED` on `fail()` (WARN for rejected input, ERROR otherwise)
//! - `{NAME}_INCOMPLETE` if dropped without either

use std::time::Instant;

use super::logger::{Logger, Severity};

pub struct ObservationScope<'a> {
    name: &'a str,
    fields: Vec<(&'a str, String)>,
    timer: Timer,
    finished: bool,
}

impl<'a> ObservationScope<'a> {
    pub fn new(name: &'a str) -> Self {
        Self::with_fields(name, &[])
    }

    pub fn with_fields(name: &'a str, fields: &[(&'a str, &str)]) -> Self {
        Logger::trace(&format!("{}_BEGIN", name), fields);
        Self {
            name,
            fields: fields.iter().map(|(k, v)| (*k, v.to_string())).collect(),
            timer: Timer::new(),
            finished: false,
        }
    }

    fn emit(&self, severity: Severity, suffix: &str, extra: &[(&str, &str)]) {
        let millis = self.timer.elapsed_ms();
        let mut fields: Vec<(&str, &str)> = self.fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        fields.extend(extra.iter().copied());
        fields.push(("millis", millis.as_str()));
        Logger::log(severity, &format!("{}_{}", self.name, suffix), &fields);
    }

    pub fn complete(self) {
        self.complete_with_fields(&[]);
    }

    pub fn complete_with_fields(mut self, extra: &[(&str, &str)]) {
        self.finished = true;
        self.emit(Severity::Info, "COMPLETE", extra);
    }

    /// `rejected` marks failures caused by the request rather than the server
    pub fn fail(mut self, code: &str, reason: &str, rejected: bool) {
        self.finished = true;
        let severity = if rejected { Severity::Warn } else { Severity::Error };
        self.emit(severity, "FAILED", &[("code", code), ("reason", reason)]);
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.timer.elapsed_millis()
    }
}

impl Drop for ObservationScope<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.emit(Severity::Warn, "INCOMPLETE", &[]);
        }
    }
}

/// Wall-clock timer for elapsed milliseconds
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_millis(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    pub fn elapsed_ms(&self) -> String {
        self.elapsed_millis().to_string()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
