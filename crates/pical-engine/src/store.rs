//! The event-store seam: how the engine's callers load events and exceptions.
//!
//! [`EventStore`] is the contract a persistence layer fulfils. [`MemoryStore`]
//! is the in-process implementation used by the CLI and tests; it keeps the
//! relational invariants of the household database (one exception per slot,
//! exceptions deleted with their event).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::config::ExpandOptions;
use crate::error::{RecurrenceError, Result};
use crate::expander::{expand_many, expand_with_options};
use crate::model::{Event, Occurrence, RecurrenceException};

/// Read access to stored events and their exceptions.
pub trait EventStore {
    /// # Errors
    /// Returns `RecurrenceError::EventNotFound` for unknown ids.
    fn get_event(&self, event_id: &str) -> Result<Event>;

    /// All exceptions recorded for `event_id` (possibly none).
    ///
    /// # Errors
    /// Returns `RecurrenceError::Store` when the backend fails.
    fn list_exceptions(&self, event_id: &str) -> Result<Vec<RecurrenceException>>;

    /// Every stored event, ordered by person, then title, then id.
    ///
    /// # Errors
    /// Returns `RecurrenceError::Store` when the backend fails.
    fn list_events(&self) -> Result<Vec<Event>>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    events: BTreeMap<String, Event>,
    exceptions: BTreeMap<String, BTreeMap<DateTime<Utc>, RecurrenceException>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an event.
    ///
    /// # Errors
    /// Returns `RecurrenceError::InvalidEvent` if the person name, title or
    /// timezone is blank.
    pub fn insert_event(&mut self, event: Event) -> Result<Option<Event>> {
        let required = [
            ("personName", &event.person_name),
            ("title", &event.title),
            ("timezone", &event.timezone),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(RecurrenceError::InvalidEvent(format!(
                "event {} has no {field}",
                event.event_id
            )));
        }
        Ok(self.events.insert(event.event_id.clone(), event))
    }

    /// Record an exception, replacing any existing one for the same slot.
    ///
    /// # Errors
    /// Returns `RecurrenceError::EventNotFound` if the event is not stored.
    pub fn insert_exception(
        &mut self,
        exception: RecurrenceException,
    ) -> Result<Option<RecurrenceException>> {
        if !self.events.contains_key(&exception.event_id) {
            return Err(RecurrenceError::EventNotFound(exception.event_id));
        }
        Ok(self
            .exceptions
            .entry(exception.event_id.clone())
            .or_default()
            .insert(exception.recurrence_id, exception))
    }

    /// Delete an event together with its exceptions.
    ///
    /// # Errors
    /// Returns `RecurrenceError::EventNotFound` if the event is not stored.
    pub fn delete_event(&mut self, event_id: &str) -> Result<Event> {
        let event = self
            .events
            .remove(event_id)
            .ok_or_else(|| RecurrenceError::EventNotFound(event_id.to_string()))?;
        self.exceptions.remove(event_id);
        Ok(event)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl EventStore for MemoryStore {
    fn get_event(&self, event_id: &str) -> Result<Event> {
        self.events
            .get(event_id)
            .cloned()
            .ok_or_else(|| RecurrenceError::EventNotFound(event_id.to_string()))
    }

    fn list_exceptions(&self, event_id: &str) -> Result<Vec<RecurrenceException>> {
        Ok(self
            .exceptions
            .get(event_id)
            .map(|by_slot| by_slot.values().cloned().collect())
            .unwrap_or_default())
    }

    fn list_events(&self) -> Result<Vec<Event>> {
        let mut events: Vec<Event> = self.events.values().cloned().collect();
        events.sort_by(|a, b| {
            (&a.person_name, &a.title, &a.event_id).cmp(&(&b.person_name, &b.title, &b.event_id))
        });
        Ok(events)
    }
}

/// Load one event and its exceptions from `store` and expand it.
///
/// # Errors
/// Store errors, plus everything [`crate::expander::expand`] returns.
pub fn expand_event<S: EventStore + ?Sized>(
    store: &S,
    event_id: &str,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    options: &ExpandOptions,
) -> Result<Vec<Occurrence>> {
    let event = store.get_event(event_id)?;
    let exceptions = store.list_exceptions(event_id)?;
    expand_with_options(&event, &exceptions, window_start, window_end, options)
        .map(|expansion| expansion.occurrences)
}

/// Expand every stored event over one window into a single ordered list.
///
/// # Errors
/// Store errors, plus everything [`crate::expander::expand_many`] returns.
pub fn expand_calendar<S: EventStore + ?Sized>(
    store: &S,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    options: &ExpandOptions,
) -> Result<Vec<Occurrence>> {
    let events = store.list_events()?;
    let exceptions = events
        .iter()
        .map(|event| store.list_exceptions(&event.event_id))
        .collect::<Result<Vec<_>>>()?;
    expand_many(
        events
            .iter()
            .zip(exceptions.iter().map(Vec::as_slice)),
        window_start,
        window_end,
        options,
    )
}
