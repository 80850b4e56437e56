use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::attendance::AttendeeId;
use crate::event::{EventId, EventStatus};

/// Enumerates the errors returned by the training core.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum TrainingError {
    /// The input was missing required fields or had malformed values.
    #[error("Validation failed: {}", summarize_fields(.fields))]
    Validation { fields: Vec<FieldError> },

    /// The referenced entity does not exist.
    #[error("{subject} not found")]
    NotFound { subject: Subject },

    /// The attendee already holds a registration for the event.
    #[error("{attendee} is already registered for event {event}")]
    DuplicateRegistration { event: EventId, attendee: AttendeeId },

    /// The event has no free seats left.
    #[error("Event {event} is full ({capacity} registered)")]
    CapacityExceeded { event: EventId, capacity: u32 },

    /// The requested status change would move the event backwards.
    #[error("Event {event} cannot move from {from} to {to}")]
    InvalidTransition {
        event: EventId,
        from: EventStatus,
        to: EventStatus,
    },

    /// The event still has attendance records and cascading was not requested.
    #[error("Event {event} still has {records} attendance records")]
    Conflict { event: EventId, records: usize },

    /// The acting role lacks the permission for the command.
    #[error("Role {role:?} is not allowed to {action}")]
    Forbidden { role: String, action: String },
}

/// Result alias used throughout the crate.
pub type TrainingResult<T> = Result<T, TrainingError>;

impl TrainingError {
    /// Shortcut for a validation error about a single field.
    pub fn invalid(field: &'static str, problem: impl Into<String>) -> Self {
        TrainingError::Validation {
            fields: vec![FieldError::new(field, problem)],
        }
    }

    pub fn event_not_found(id: EventId) -> Self {
        TrainingError::NotFound {
            subject: Subject::Event(id),
        }
    }

    pub fn record_not_found(event: EventId, attendee: AttendeeId) -> Self {
        TrainingError::NotFound {
            subject: Subject::Record { event, attendee },
        }
    }

    /// The identifier the error is about, used as the notification subject.
    pub fn subject_id(&self) -> Option<String> {
        match self {
            TrainingError::Validation { .. } | TrainingError::Forbidden { .. } => None,
            TrainingError::NotFound { subject } => Some(subject.id()),
            TrainingError::DuplicateRegistration { event, .. }
            | TrainingError::CapacityExceeded { event, .. }
            | TrainingError::InvalidTransition { event, .. }
            | TrainingError::Conflict { event, .. } => Some(event.to_string()),
        }
    }
}

/// A single problem found while validating input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub problem: String,
}

impl FieldError {
    pub fn new(field: &'static str, problem: impl Into<String>) -> Self {
        FieldError {
            field,
            problem: problem.into(),
        }
    }
}

fn summarize_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| format!("{} {}", f.field, f.problem))
        .collect::<Vec<_>>()
        .join(", ")
}

/// What a `NotFound` error refers to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Subject {
    Event(EventId),
    Record { event: EventId, attendee: AttendeeId },
    Token(String),
}

impl Subject {
    fn id(&self) -> String {
        match self {
            Subject::Event(id) => id.to_string(),
            Subject::Record { attendee, .. } => attendee.to_string(),
            Subject::Token(token) => token.clone(),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Event(id) => write!(f, "Event {}", id),
            Subject::Record { event, attendee } => {
                write!(f, "Attendance record for {} in event {}", attendee, event)
            }
            Subject::Token(_) => write!(f, "Check-in token"),
        }
    }
}

/// Enumerates errors returned while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable was present but could not be parsed.
    #[error("Invalid value {value:?} for {name}: {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },

    /// The permission matrix was not valid JSON of the expected shape.
    #[error("Unable to parse {name}")]
    Permissions {
        name: &'static str,
        source: serde_json::Error,
    },
}
