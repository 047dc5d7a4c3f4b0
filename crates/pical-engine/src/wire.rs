//! Wire formats for the kiosk API: the JSON calendar document, query-string
//! instants, and the paged occurrence envelope.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RecurrenceError, Result};
use crate::model::{Event, Occurrence, RecurrenceException};
use crate::store::MemoryStore;

pub const DEFAULT_PAGE_LIMIT: usize = 50;
pub const MAX_PAGE_LIMIT: usize = 200;
pub const MAX_PAGE_OFFSET: usize = 1_000_000;

/// A calendar as exchanged in JSON: events plus their exceptions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarDocument {
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub exceptions: Vec<RecurrenceException>,
}

impl CalendarDocument {
    /// Parse a JSON document.
    ///
    /// # Errors
    /// Returns `RecurrenceError::InvalidInput` when the JSON does not match the schema.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| RecurrenceError::InvalidInput(format!("calendar JSON: {e}")))
    }

    /// Load the document into a [`MemoryStore`].
    ///
    /// # Errors
    /// Returns `RecurrenceError::EventNotFound` for an exception whose event
    /// is not in the document.
    pub fn into_store(self) -> Result<MemoryStore> {
        let mut store = MemoryStore::new();
        for event in self.events {
            store.insert_event(event)?;
        }
        for exception in self.exceptions {
            store.insert_exception(exception)?;
        }
        Ok(store)
    }
}

/// Limit/offset paging, clamped to the ranges the kiosk API accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub limit: usize,
    pub offset: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

impl PageRequest {
    /// Build a request from optional query values; missing values take the
    /// defaults and out-of-range values are clamped.
    pub fn new(limit: Option<usize>, offset: Option<usize>) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT),
            offset: offset.unwrap_or(0).min(MAX_PAGE_OFFSET),
        }
    }
}

/// One page of occurrences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccurrencePage {
    pub items: Vec<Occurrence>,
    pub limit: usize,
    pub offset: usize,
    /// Items on this page.
    pub count: usize,
    /// Items across all pages.
    pub total: usize,
}

impl OccurrencePage {
    /// Cut one page out of an ordered occurrence list.
    pub fn paginate(occurrences: Vec<Occurrence>, page: PageRequest) -> Self {
        let total = occurrences.len();
        let items: Vec<Occurrence> = occurrences
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect();
        Self {
            count: items.len(),
            items,
            limit: page.limit,
            offset: page.offset,
            total,
        }
    }
}

/// Parse a query-string instant.
///
/// Accepts RFC 3339 (`2025-01-01T09:00:00+01:00`), a naive date-time
/// (`2025-01-01T09:00:00`, read as UTC) or a bare date (`2025-01-01`, UTC
/// midnight).
///
/// # Errors
/// Returns `RecurrenceError::InvalidInput` carrying the offending text.
pub fn parse_instant(text: &str) -> Result<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Ok(naive.and_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map(|date| date.and_time(chrono::NaiveTime::MIN).and_utc())
        .map_err(|e| RecurrenceError::InvalidInput(format!("instant '{text}': {e}")))
}
