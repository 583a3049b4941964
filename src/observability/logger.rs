//! Structured JSON-lines logger with scoped fields.
//!
//! - One log line = one event
//! - Deterministic key ordering (event, severity, then fields sorted)
//! - Synchronous, no buffering
//! - DEBUG/INFO/WARN go to stdout, ERROR/FATAL to stderr

use std::fmt;
use std::io::{self, Write};

/// Log severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Step-by-step pipeline detail
    Debug = 0,
    /// Normal operations
    Info = 1,
    /// Recoverable issues (tolerated unfreeze failures, chown failures)
    Warn = 2,
    /// Operation failures
    Error = 3,
    /// Failures that must never pass silently (RBAC/config capture)
    Fatal = 4,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A logger carrying persistent scope fields.
///
/// Cloning is cheap enough for the per-table fan-out; derived loggers own
/// their field set.
#[derive(Debug, Clone, Default)]
pub struct Logger {
    fields: Vec<(String, String)>,
}

impl Logger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a derived logger with one more persistent field.
    pub fn with_field(&self, key: &str, value: &str) -> Self {
        let mut fields = self.fields.clone();
        fields.retain(|(k, _)| k != key);
        fields.push((key.to_string(), value.to_string()));
        Self { fields }
    }

    /// Returns a derived logger with several more persistent fields.
    pub fn with_fields(&self, extra: &[(&str, &str)]) -> Self {
        let mut logger = self.clone();
        for (key, value) in extra {
            logger = logger.with_field(key, value);
        }
        logger
    }

    pub fn debug(&self, event: &str) {
        self.log(Severity::Debug, event, &[]);
    }

    pub fn info(&self, event: &str) {
        self.log(Severity::Info, event, &[]);
    }

    pub fn warn(&self, event: &str) {
        self.log(Severity::Warn, event, &[]);
    }

    pub fn error(&self, event: &str) {
        self.log(Severity::Error, event, &[]);
    }

    pub fn fatal(&self, event: &str) {
        self.log(Severity::Fatal, event, &[]);
    }

    /// Log an event with per-call fields merged over the scope fields.
    pub fn log(&self, severity: Severity, event: &str, extra: &[(&str, &str)]) {
        if severity >= Severity::Error {
            self.log_to_writer(severity, event, extra, &mut io::stderr());
        } else {
            self.log_to_writer(severity, event, extra, &mut io::stdout());
        }
    }

    fn log_to_writer<W: Write>(
        &self,
        severity: Severity,
        event: &str,
        extra: &[(&str, &str)],
        writer: &mut W,
    ) {
        let mut output = String::with_capacity(256);

        output.push_str("{\"event\":\"");
        escape_json_string(&mut output, event);
        output.push_str("\",\"severity\":\"");
        output.push_str(severity.as_str());
        output.push('"');

        // Per-call fields shadow scope fields of the same key; the merged
        // set is sorted for deterministic output.
        let mut merged: Vec<(&str, &str)> = self
            .fields
            .iter()
            .filter(|(k, _)| !extra.iter().any(|(ek, _)| ek == k))
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        merged.extend(extra.iter().copied());
        merged.sort_by_key(|(k, _)| *k);

        for (key, value) in merged {
            output.push_str(",\"");
            escape_json_string(&mut output, key);
            output.push_str("\":\"");
            escape_json_string(&mut output, value);
            output.push('"');
        }

        output.push('}');
        output.push('\n');

        let _ = writer.write_all(output.as_bytes());
        let _ = writer.flush();
    }
}

fn escape_json_string(output: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '"' => output.push_str("\\\""),
            '\\' => output.push_str("\\\\"),
            '\n' => output.push_str("\\n"),
            '\r' => output.push_str("\\r"),
            '\t' => output.push_str("\\t"),
            c if c.is_control() => {
                output.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => output.push(c),
        }
    }
}
