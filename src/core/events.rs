//! Connector events: progress and outcome notifications for one operation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use ulid::Ulid;

/// Operation a connector event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    EntityAdded,
    EntityUpdated,
    EntityDeleted,
    LinkAdded,
    LinkUpdated,
    LinkDeleted,
    Publish,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::EntityAdded => "entity_added",
            EventKind::EntityUpdated => "entity_updated",
            EventKind::EntityDeleted => "entity_deleted",
            EventKind::LinkAdded => "link_added",
            EventKind::LinkUpdated => "link_updated",
            EventKind::LinkDeleted => "link_deleted",
            EventKind::Publish => "publish",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One progress notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorEvent {
    /// Shared by every notification of one operation
    pub session: Ulid,
    pub kind: EventKind,
    pub message: String,
    pub percentage: u8,
    pub is_error: bool,
    pub timestamp: DateTime<Utc>,
}

/// Receiver of connector events; delivery is fire-and-forget
pub trait EventSink {
    fn publish(&self, event: &ConnectorEvent);
}

/// Writes events to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn publish(&self, event: &ConnectorEvent) {
        if event.is_error {
            tracing::error!(
                session = %event.session,
                kind = %event.kind,
                percentage = event.percentage,
                "{}",
                event.message
            );
        } else {
            tracing::info!(
                session = %event.session,
                kind = %event.kind,
                percentage = event.percentage,
                "{}",
                event.message
            );
        }
    }
}

/// Keeps events in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: RefCell<Vec<ConnectorEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ConnectorEvent> {
        self.events.borrow().clone()
    }

    pub fn percentages(&self) -> Vec<u8> {
        self.events.borrow().iter().map(|e| e.percentage).collect()
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: &ConnectorEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}

/// Reports the progress of one operation to a sink
pub struct EventReporter<'a> {
    sink: &'a dyn EventSink,
    session: Ulid,
    kind: EventKind,
}

impl<'a> EventReporter<'a> {
    /// Start an operation and report it at 0%
    pub fn start(sink: &'a dyn EventSink, kind: EventKind, message: impl Into<String>) -> Self {
        let reporter = Self {
            sink,
            session: Ulid::new(),
            kind,
        };
        reporter.emit(message.into(), 0, false);
        reporter
    }

    pub fn session(&self) -> Ulid {
        self.session
    }

    pub fn update(&self, message: impl Into<String>, percentage: u8) {
        self.emit(message.into(), percentage.min(100), false);
    }

    pub fn fail(&self, message: impl Into<String>) {
        self.emit(message.into(), 100, true);
    }

    pub fn finish(&self, message: impl Into<String>) {
        self.emit(message.into(), 100, false);
    }

    fn emit(&self, message: String, percentage: u8, is_error: bool) {
        self.sink.publish(&ConnectorEvent {
            session: self.session,
            kind: self.kind,
            message,
            percentage,
            is_error,
            timestamp: Utc::now(),
        });
    }
}
