//! Monitoring event sinks
//!
//! Components report slow queries, health issues and collaborator failures
//! through an injected [`EventSink`]. [`TracingSink`] forwards to `tracing`;
//! [`MemorySink`] keeps events for inspection.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Severity of a monitoring event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventLevel {
    /// Diagnostic detail
    Debug,
    /// Noteworthy but expected
    Info,
    /// Threshold breached or collaborator failed
    Warn,
    /// Monitoring-internal fault
    Error,
}

/// Destination for monitoring events
pub trait EventSink: Send + Sync + Debug {
    /// Emit a debug event
    fn debug(&self, message: &str);

    /// Emit an info event
    fn info(&self, message: &str);

    /// Emit a warning event
    fn warn(&self, message: &str);

    /// Emit an error event
    fn error(&self, message: &str);
}

/// Sink that forwards to the `tracing` subscriber
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn debug(&self, message: &str) {
        tracing::debug!(target: "query_monitor", "{}", message);
    }

    fn info(&self, message: &str) {
        tracing::info!(target: "query_monitor", "{}", message);
    }

    fn warn(&self, message: &str) {
        tracing::warn!(target: "query_monitor", "{}", message);
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "query_monitor", "{}", message);
    }
}

/// Sink that records events in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<(EventLevel, String)>>,
}

impl MemorySink {
    /// Create an empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events in emission order
    #[must_use]
    pub fn events(&self) -> Vec<(EventLevel, String)> {
        self.events.lock().clone()
    }

    /// Messages recorded at the given level
    #[must_use]
    pub fn messages_at(&self, level: EventLevel) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Number of events recorded at the given level
    #[must_use]
    pub fn count_at(&self, level: EventLevel) -> usize {
        self.events.lock().iter().filter(|(l, _)| *l == level).count()
    }

    /// Drop all recorded events
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    fn push(&self, level: EventLevel, message: &str) {
        self.events.lock().push((level, message.to_string()));
    }
}

impl EventSink for MemorySink {
    fn debug(&self, message: &str) {
        self.push(EventLevel::Debug, message);
    }

    fn info(&self, message: &str) {
        self.push(EventLevel::Info, message);
    }

    fn warn(&self, message: &str) {
        self.push(EventLevel::Warn, message);
    }

    fn error(&self, message: &str) {
        self.push(EventLevel::Error, message);
    }
}
