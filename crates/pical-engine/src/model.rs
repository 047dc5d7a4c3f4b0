//! Value types shared by the engine, the store seam and the wire layer.
//!
//! Field names serialize in camelCase to match the kiosk frontend's JSON.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{RecurrenceError, Result};

/// A calendar event: either a single occurrence or a recurrence definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_id: String,
    /// Household member the event belongs to.
    #[serde(default)]
    pub person_name: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// IANA zone name the event's wall-clock times live in.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default, alias = "allDay")]
    pub is_all_day: bool,
    /// RFC 5545 RRULE body. `None` (or blank) means a one-off event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rrule: Option<String>,
    /// Start of the anchor occurrence.
    pub start: DateTime<Utc>,
    /// End of the anchor occurrence.
    pub end: DateTime<Utc>,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Event {
    /// Build a timed event in `timezone` with no recurrence rule.
    pub fn new(
        event_id: impl Into<String>,
        title: impl Into<String>,
        timezone: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            person_name: String::new(),
            title: title.into(),
            notes: None,
            timezone: timezone.into(),
            is_all_day: false,
            rrule: None,
            start,
            end,
        }
    }

    /// Attach a recurrence rule.
    #[must_use]
    pub fn with_rrule(mut self, rrule: impl Into<String>) -> Self {
        self.rrule = Some(rrule.into());
        self
    }

    /// Set the household member the event belongs to.
    #[must_use]
    pub fn with_person(mut self, person_name: impl Into<String>) -> Self {
        self.person_name = person_name.into();
        self
    }

    /// Mark the event as all-day.
    #[must_use]
    pub fn all_day(mut self) -> Self {
        self.is_all_day = true;
        self
    }

    /// The rule text, treating a blank string the same as no rule.
    pub fn rule_text(&self) -> Option<&str> {
        self.rrule
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }

    /// Resolve the event's IANA zone.
    ///
    /// # Errors
    /// Returns `RecurrenceError::InvalidTimezone` for names `chrono-tz` does not know.
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse()
            .map_err(|_| RecurrenceError::InvalidTimezone(self.timezone.clone()))
    }
}

/// What an exception does to its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ExceptionKind {
    /// Suppress the occurrence.
    Cancel,
    /// Replace the occurrence's start and end.
    #[serde(rename_all = "camelCase")]
    Move {
        new_start: DateTime<Utc>,
        new_end: DateTime<Utc>,
    },
}

/// A per-slot deviation from the rule-generated schedule.
///
/// Keyed by `(event_id, recurrence_id)`, where `recurrence_id` is the start
/// instant the rule produced for the slot before any move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurrenceException {
    pub event_id: String,
    pub recurrence_id: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: ExceptionKind,
}

impl RecurrenceException {
    pub fn cancel(event_id: impl Into<String>, recurrence_id: DateTime<Utc>) -> Self {
        Self {
            event_id: event_id.into(),
            recurrence_id,
            kind: ExceptionKind::Cancel,
        }
    }

    pub fn moved(
        event_id: impl Into<String>,
        recurrence_id: DateTime<Utc>,
        new_start: DateTime<Utc>,
        new_end: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            recurrence_id,
            kind: ExceptionKind::Move { new_start, new_end },
        }
    }

    pub fn is_cancel(&self) -> bool {
        matches!(self.kind, ExceptionKind::Cancel)
    }
}

/// One concrete instance of an event inside a query window.
///
/// Derived on demand; never stored. Identity is `(event_id, recurrence_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    pub event_id: String,
    pub recurrence_id: DateTime<Utc>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// True when a move exception supplied the times.
    pub is_override: bool,
    pub is_all_day: bool,
}

impl Occurrence {
    /// Sort key: effective start, then event id, then slot.
    pub(crate) fn order_key(&self) -> (DateTime<Utc>, &str, DateTime<Utc>) {
        (self.start_time, self.event_id.as_str(), self.recurrence_id)
    }
}
