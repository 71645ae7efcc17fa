//! Event logging for compilation and rewriting.
//!
//! Every [`crate::Program`] owns an [`EventLog`] that records what the compiler and the
//! rewrite pass did to it: constants folded, CASE limbs eliminated, impossible casts
//! folded away, membership tables built and every peephole rule that fired. Events can be
//! inspected for debugging or ignored entirely.
//!
//! # Example
//!
//! ```rust
//! use vexc::{EventKind, EventLog};
//!
//! let log = EventLog::new();
//! log.record(EventKind::RuleApplied)
//!     .location(4)
//!     .rule("and.k/self")
//!     .message("v4 = and.k v3, v3 -> v3");
//! log.info("sweep finished");
//!
//! assert!(log.has(EventKind::RuleApplied));
//! assert_eq!(log.len(), 2);
//! ```

use std::{collections::HashMap, fmt};

/// Kind of a recorded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A peephole rule replaced or clobbered a node.
    RuleApplied,
    /// A literal-only expression was evaluated at compile time.
    ConstantFolded,
    /// A cast was resolved statically.
    CastFolded,
    /// A CASE limb whose WHEN folds to false was dropped.
    LimbEliminated,
    /// A radix hash table was built for a membership test or lookup.
    HashTableBuilt,
    /// A construction request matched an existing node.
    NodeDeduplicated,
    /// A program pass started.
    PassStarted,
    /// A program pass completed.
    PassCompleted,
    /// General information.
    Info,
    /// A non-fatal oddity.
    Warning,
    /// An error condition.
    Error,
}

impl EventKind {
    /// Human-readable description.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::RuleApplied => "rule applied",
            Self::ConstantFolded => "constant folded",
            Self::CastFolded => "cast folded",
            Self::LimbEliminated => "limb eliminated",
            Self::HashTableBuilt => "hash table built",
            Self::NodeDeduplicated => "node deduplicated",
            Self::PassStarted => "pass started",
            Self::PassCompleted => "pass completed",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    /// Returns true for events that describe a change to the program.
    #[must_use]
    pub fn is_transformation(&self) -> bool {
        matches!(
            self,
            Self::RuleApplied | Self::ConstantFolded | Self::CastFolded | Self::LimbEliminated
        )
    }

    /// Returns true for info, warning and error events.
    #[must_use]
    pub fn is_diagnostic(&self) -> bool {
        matches!(self, Self::Info | Self::Warning | Self::Error)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A single recorded event.
#[derive(Debug, Clone)]
pub struct Event {
    /// What happened
    pub kind: EventKind,
    /// Node index the event concerns
    pub location: Option<usize>,
    /// Name of the rule or pass responsible
    pub rule: Option<&'static str>,
    /// Free-form detail
    pub message: String,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.kind)?;
        if let Some(rule) = self.rule {
            write!(f, " {rule}")?;
        }
        if let Some(location) = self.location {
            write!(f, " @v{location}")?;
        }
        write!(f, " {}", self.message)
    }
}

/// Fluent event construction; the event is pushed when the builder is dropped.
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    kind: EventKind,
    location: Option<usize>,
    rule: Option<&'static str>,
    message: Option<String>,
}

impl<'a> EventBuilder<'a> {
    fn new(log: &'a EventLog, kind: EventKind) -> Self {
        Self {
            log,
            kind,
            location: None,
            rule: None,
            message: None,
        }
    }

    /// Sets the node index.
    pub fn location(mut self, location: usize) -> Self {
        self.location = Some(location);
        self
    }

    /// Sets the responsible rule or pass.
    pub fn rule(mut self, rule: &'static str) -> Self {
        self.rule = Some(rule);
        self
    }

    /// Sets the message.
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        if !self.log.enabled {
            return;
        }
        let message = self
            .message
            .take()
            .unwrap_or_else(|| self.kind.description().to_string());

        self.log.events.push(Event {
            kind: self.kind,
            location: self.location.take(),
            rule: self.rule.take(),
            message,
        });
    }
}

/// Append-only event collection, writable through a shared reference.
#[derive(Debug)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
    enabled: bool,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventLog {
    fn clone(&self) -> Self {
        let new_log = Self {
            events: boxcar::Vec::new(),
            enabled: self.enabled,
        };
        for (_, event) in &self.events {
            new_log.events.push(event.clone());
        }
        new_log
    }
}

impl EventLog {
    /// Creates an empty, recording log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: boxcar::Vec::new(),
            enabled: true,
        }
    }

    /// Creates a log that silently drops everything recorded into it.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            events: boxcar::Vec::new(),
            enabled: false,
        }
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.count() == 0
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Starts recording an event of `kind`.
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder::new(self, kind)
    }

    /// Records an info event.
    pub fn info(&self, msg: impl Into<String>) {
        self.record(EventKind::Info).message(msg);
    }

    /// Records a warning.
    pub fn warn(&self, msg: impl Into<String>) {
        self.record(EventKind::Warning).message(msg);
    }

    /// Copies every event of `other` into this log.
    pub fn merge(&self, other: &EventLog) {
        for (_, event) in &other.events {
            self.events.push(event.clone());
        }
    }

    /// Returns true if any event of `kind` was recorded.
    #[must_use]
    pub fn has(&self, kind: EventKind) -> bool {
        self.events.iter().any(|(_, e)| e.kind == kind)
    }

    /// Number of events of `kind`.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|(_, e)| e.kind == kind).count()
    }

    /// Iterates over all events in recording order.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|(_, e)| e)
    }

    /// Iterates over the events of `kind`.
    pub fn filter_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> + '_ {
        self.events
            .iter()
            .filter_map(move |(_, e)| if e.kind == kind { Some(e) } else { None })
    }

    /// Iterates over the events recorded by `rule`.
    pub fn filter_rule<'a>(&'a self, rule: &'a str) -> impl Iterator<Item = &'a Event> + 'a {
        self.events
            .iter()
            .filter_map(move |(_, e)| if e.rule == Some(rule) { Some(e) } else { None })
    }

    /// Event counts per kind.
    #[must_use]
    pub fn count_by_kind(&self) -> HashMap<EventKind, usize> {
        let mut counts = HashMap::new();
        for (_, event) in &self.events {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        counts
    }

    /// One-line summary of the transformations recorded.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no events".to_string();
        }

        let counts = self.count_by_kind();

        // Only show transformation counts in summary
        let mut parts: Vec<String> = counts
            .iter()
            .filter(|(k, _)| k.is_transformation())
            .map(|(kind, count)| format!("{} {}", count, kind.description()))
            .collect();

        if parts.is_empty() {
            return format!("{} events", self.len());
        }

        parts.sort();
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_records_on_drop() {
        let log = EventLog::new();
        log.record(EventKind::ConstantFolded)
            .location(3)
            .message("1 + 2 -> 3");
        let event = log.iter().next().unwrap();
        assert_eq!(event.kind, EventKind::ConstantFolded);
        assert_eq!(event.location, Some(3));
        assert_eq!(event.to_string(), "[constant folded] @v3 1 + 2 -> 3");
    }

    #[test]
    fn test_default_message() {
        let log = EventLog::new();
        log.record(EventKind::LimbEliminated);
        assert_eq!(log.iter().next().unwrap().message, "limb eliminated");
    }

    #[test]
    fn test_disabled_log() {
        let log = EventLog::disabled();
        log.record(EventKind::RuleApplied).rule("or.k/init");
        log.info("ignored");
        assert!(log.is_empty());
    }

    #[test]
    fn test_queries() {
        let log = EventLog::new();
        log.record(EventKind::RuleApplied).rule("and.k/self");
        log.record(EventKind::RuleApplied).rule("or.k/false");
        log.record(EventKind::RuleApplied).rule("and.k/self");
        log.warn("odd");

        assert_eq!(log.count_kind(EventKind::RuleApplied), 3);
        assert_eq!(log.filter_rule("and.k/self").count(), 2);
        assert_eq!(log.filter_kind(EventKind::Warning).count(), 1);
        assert_eq!(log.summary(), "3 rule applied");

        let other = EventLog::new();
        other.merge(&log);
        assert_eq!(other.len(), 4);
    }

    #[test]
    fn test_summary_without_transformations() {
        let log = EventLog::new();
        assert_eq!(log.summary(), "no events");
        log.info("a");
        assert_eq!(log.summary(), "1 events");
    }
}
