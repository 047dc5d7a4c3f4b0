//! Error types for pical-engine operations.

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecurrenceError {
    /// The RRULE failed to parse, uses an unsupported part, or contradicts itself.
    #[error("Malformed RRULE: {0}")]
    MalformedRule(String),

    #[error("Invalid window: start {start} is after end {end}")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// The iteration guard tripped. The expansion is incomplete and no
    /// occurrences are returned.
    #[error("Rule budget exceeded: more than {limit} iterations")]
    RuleBudgetExceeded { limit: u64 },

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Event not found: {0}")]
    EventNotFound(String),

    #[error("Store error: {0}")]
    Store(String),

    /// Caller-supplied text (JSON, query values) that could not be read.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl RecurrenceError {
    /// Whether the error is attributable to one event's own definition, as
    /// opposed to the query or the resource guard.
    pub fn is_event_defect(&self) -> bool {
        matches!(
            self,
            Self::MalformedRule(_) | Self::InvalidTimezone(_) | Self::InvalidEvent(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RecurrenceError>;
