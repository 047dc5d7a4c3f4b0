//! # pical-engine
//!
//! Recurrence expansion and exception resolution for a household calendar.
//!
//! Given an [`Event`] (one-off or governed by an RFC 5545 RRULE), the
//! [`RecurrenceException`]s recorded against it, and a half-open query
//! window, [`expand`] returns the concrete [`Occurrence`]s that intersect the
//! window: ordered by start, cancellations removed, moves applied, timed
//! slots pinned to local wall-clock time across DST changes, and all-day
//! slots spanning local midnight to midnight. Open-ended rules fast-forward
//! to the window instead of walking their history.
//!
//! ## Modules
//!
//! - [`expander`] — the entry points: `expand`, `expand_with_options`, `expand_many`
//! - [`rule`] — RRULE parsing and validation
//! - [`generator`] — period-by-period slot generation with fast-forward and an iteration budget
//! - [`dst`] — DST gap/fold resolution policies
//! - [`model`] — `Event`, `RecurrenceException`, `Occurrence`
//! - [`config`] — `ExpandOptions`
//! - [`store`] — the `EventStore` seam and an in-memory implementation
//! - [`wire`] — JSON document, paging envelope, query-string instants
//! - [`error`] — Error types

pub mod config;
pub mod dst;
pub mod error;
pub mod expander;
pub mod generator;
pub mod model;
pub mod rule;
pub mod store;
pub mod wire;

pub use config::ExpandOptions;
pub use dst::DstPolicy;
pub use error::RecurrenceError;
pub use expander::{expand, expand_many, expand_with_options, Expansion};
pub use model::{Event, ExceptionKind, Occurrence, RecurrenceException};
pub use rule::RecurrenceRule;
pub use store::{expand_calendar, expand_event, EventStore, MemoryStore};
pub use wire::{parse_instant, CalendarDocument, OccurrencePage, PageRequest};
