//! Recurrence expansion -- turns an event plus its exceptions into the ordered
//! occurrences that intersect a query window.
//!
//! Slots come from [`SlotCursor`] in the event's own zone; each slot's
//! rule-computed start is its recurrence id, which is what exceptions are
//! matched against. Timed slots keep their local wall-clock time across DST
//! changes; all-day slots span local midnight to local midnight.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;

use crate::config::ExpandOptions;
use crate::dst::{resolve_local, DstPolicy};
use crate::error::{RecurrenceError, Result};
use crate::generator::{IterationBudget, SlotCursor};
use crate::model::{Event, ExceptionKind, Occurrence, RecurrenceException};
use crate::rule::RecurrenceRule;

/// Result of a single-event expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    /// Occurrences intersecting the window, ordered by start.
    pub occurrences: Vec<Occurrence>,
    /// Generator iterations spent (periods visited plus slots produced).
    pub iterations: u64,
}

/// Expand one event over the half-open window `[window_start, window_end)`
/// with default options.
///
/// # Errors
/// - `MalformedRule` if the event's RRULE cannot be parsed or contradicts itself.
/// - `InvalidWindow` if `window_start > window_end`.
/// - `RuleBudgetExceeded` if expansion needs more than the default iteration cap.
/// - `InvalidTimezone` / `InvalidEvent` for a bad zone name or `end < start`.
pub fn expand(
    event: &Event,
    exceptions: &[RecurrenceException],
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Result<Vec<Occurrence>> {
    expand_with_options(
        event,
        exceptions,
        window_start,
        window_end,
        &ExpandOptions::default(),
    )
    .map(|expansion| expansion.occurrences)
}

/// Expand one event with explicit options, reporting the work done.
///
/// An empty window (`window_start == window_end`) yields no occurrences. On
/// error no occurrences are returned.
///
/// # Errors
/// See [`expand`].
pub fn expand_with_options(
    event: &Event,
    exceptions: &[RecurrenceException],
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    options: &ExpandOptions,
) -> Result<Expansion> {
    let tz = event.tz()?;
    let rule = event.rule_text().map(RecurrenceRule::parse).transpose()?;
    if event.end < event.start {
        return Err(RecurrenceError::InvalidEvent(format!(
            "event {} ends at {} before it starts at {}",
            event.event_id, event.end, event.start
        )));
    }
    check_window(window_start, window_end)?;

    let mut budget = IterationBudget::new(options.max_iterations);
    if window_start == window_end {
        return Ok(Expansion {
            occurrences: Vec::new(),
            iterations: 0,
        });
    }

    let window = Window {
        start: window_start,
        end: window_end,
    };
    let shape = SlotShape::of(event, tz, options.dst_policy);
    let index = ExceptionIndex::build(event, exceptions);

    let mut occurrences = match rule {
        None => expand_single(event, &shape, &index, window)?,
        Some(rule) => expand_recurring(event, &rule, &shape, &index, window, &mut budget)?,
    };
    sort_occurrences(&mut occurrences);

    Ok(Expansion {
        occurrences,
        iterations: budget.used(),
    })
}

/// Expand several events over one window and merge them into a single list,
/// ordered by start time with ties broken by event id.
///
/// With [`ExpandOptions::skip_malformed`] set, events whose own definition is
/// invalid are logged and left out; otherwise the first error is returned.
///
/// # Errors
/// See [`expand`].
pub fn expand_many<'a, I>(
    entries: I,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    options: &ExpandOptions,
) -> Result<Vec<Occurrence>>
where
    I: IntoIterator<Item = (&'a Event, &'a [RecurrenceException])>,
{
    check_window(window_start, window_end)?;

    let mut all = Vec::new();
    for (event, exceptions) in entries {
        match expand_with_options(event, exceptions, window_start, window_end, options) {
            Ok(expansion) => all.extend(expansion.occurrences),
            Err(err) if options.skip_malformed && err.is_event_defect() => {
                tracing::warn!(event_id = %event.event_id, error = %err, "skipping event");
            }
            Err(err) => return Err(err),
        }
    }

    let mut seen = HashSet::new();
    all.retain(|occ| seen.insert((occ.event_id.clone(), occ.recurrence_id)));
    sort_occurrences(&mut all);
    Ok(all)
}

fn check_window(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<()> {
    if start > end {
        return Err(RecurrenceError::InvalidWindow { start, end });
    }
    Ok(())
}

fn sort_occurrences(occurrences: &mut [Occurrence]) {
    occurrences.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
}

#[derive(Debug, Clone, Copy)]
struct Window {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl Window {
    /// Half-open overlap; a zero-length interval counts when its instant is
    /// inside the window.
    fn intersects(self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        if start == end {
            self.start <= start && start < self.end
        } else {
            start < self.end && end > self.start
        }
    }
}

/// How one event's slots turn into absolute intervals.
#[derive(Debug, Clone, Copy)]
struct SlotShape {
    tz: Tz,
    policy: DstPolicy,
    /// Local wall-clock anchor (local midnight for all-day events).
    anchor: NaiveDateTime,
    /// Civil-day span of an all-day event; `None` for timed events.
    days: Option<u64>,
    /// Absolute length of a timed occurrence; nominal length of an all-day one.
    span: Duration,
}

impl SlotShape {
    fn of(event: &Event, tz: Tz, policy: DstPolicy) -> Self {
        if event.is_all_day {
            let start_date = event.start.with_timezone(&tz).date_naive();
            let end_local = event.end.with_timezone(&tz).naive_local();
            let mut end_date = end_local.date();
            if end_local.time() != NaiveTime::MIN {
                end_date = end_date.succ_opt().unwrap_or(end_date);
            }
            let days = (end_date - start_date).num_days().max(1);
            Self {
                tz,
                policy,
                anchor: start_date.and_time(NaiveTime::MIN),
                days: u64::try_from(days).ok(),
                span: Duration::days(days),
            }
        } else {
            Self {
                tz,
                policy,
                anchor: event.start.with_timezone(&tz).naive_local(),
                days: None,
                span: event.end - event.start,
            }
        }
    }

    /// Absolute `(start, end)` of the slot at local time `local`, or `None`
    /// if `policy` drops it. All-day slots always begin at the first instant
    /// of their local day, so a gap at midnight never drops one.
    fn materialize(
        &self,
        local: NaiveDateTime,
        policy: DstPolicy,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
        match self.days {
            Some(days) => {
                let Some(start) = resolve_local(self.tz, local, DstPolicy::ShiftForward) else {
                    return Ok(None);
                };
                let end = local
                    .date()
                    .checked_add_days(chrono::Days::new(days))
                    .and_then(|last| {
                        resolve_local(self.tz, last.and_time(NaiveTime::MIN), DstPolicy::ShiftForward)
                    })
                    .ok_or_else(|| out_of_range(local))?;
                Ok(Some((start, end)))
            }
            None => {
                let Some(start) = resolve_local(self.tz, local, policy) else {
                    return Ok(None);
                };
                let end = start
                    .checked_add_signed(self.span)
                    .ok_or_else(|| out_of_range(local))?;
                Ok(Some((start, end)))
            }
        }
    }

    fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.tz).date_naive()
    }
}

fn out_of_range(local: NaiveDateTime) -> RecurrenceError {
    RecurrenceError::InvalidEvent(format!(
        "occurrence at {local} ends beyond the representable date range"
    ))
}

/// Exceptions for one event, keyed by recurrence id.
struct ExceptionIndex<'a> {
    by_slot: BTreeMap<DateTime<Utc>, &'a RecurrenceException>,
}

impl<'a> ExceptionIndex<'a> {
    /// Index `exceptions` for `event`. Entries for other events and moves with
    /// an end before their start are dropped. When several entries share a
    /// slot, a cancel wins over a move, and otherwise the first one supplied
    /// wins.
    fn build(event: &Event, exceptions: &'a [RecurrenceException]) -> Self {
        let mut by_slot: BTreeMap<DateTime<Utc>, &'a RecurrenceException> = BTreeMap::new();
        for exception in exceptions {
            if exception.event_id != event.event_id {
                tracing::debug!(
                    event_id = %event.event_id,
                    exception_event_id = %exception.event_id,
                    "ignoring exception for another event"
                );
                continue;
            }
            if let ExceptionKind::Move { new_start, new_end } = exception.kind {
                if new_end < new_start {
                    tracing::debug!(
                        event_id = %event.event_id,
                        recurrence_id = %exception.recurrence_id,
                        "ignoring move that ends before it starts"
                    );
                    continue;
                }
            }
            match by_slot.entry(exception.recurrence_id) {
                std::collections::btree_map::Entry::Vacant(slot) => {
                    slot.insert(exception);
                }
                std::collections::btree_map::Entry::Occupied(mut slot) => {
                    tracing::debug!(
                        event_id = %event.event_id,
                        recurrence_id = %exception.recurrence_id,
                        "duplicate exception for slot"
                    );
                    if exception.is_cancel() && !slot.get().is_cancel() {
                        slot.insert(exception);
                    }
                }
            }
        }
        Self { by_slot }
    }

    fn get(&self, recurrence_id: DateTime<Utc>) -> Option<&'a RecurrenceException> {
        self.by_slot.get(&recurrence_id).copied()
    }
}

/// Apply the slot's exception (if any) and window filter.
fn resolve_slot(
    event: &Event,
    recurrence_id: DateTime<Utc>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    exception: Option<&RecurrenceException>,
    window: Window,
) -> Option<Occurrence> {
    let (start, end, is_override) = match exception.map(|e| e.kind) {
        None => (start, end, false),
        Some(ExceptionKind::Cancel) => return None,
        Some(ExceptionKind::Move { new_start, new_end }) => (new_start, new_end, true),
    };
    window.intersects(start, end).then(|| Occurrence {
        event_id: event.event_id.clone(),
        recurrence_id,
        start_time: start,
        end_time: end,
        is_override,
        is_all_day: event.is_all_day,
    })
}

fn expand_single(
    event: &Event,
    shape: &SlotShape,
    index: &ExceptionIndex<'_>,
    window: Window,
) -> Result<Vec<Occurrence>> {
    let (start, end) = if event.is_all_day {
        shape
            .materialize(shape.anchor, DstPolicy::ShiftForward)?
            .unwrap_or((event.start, event.end))
    } else {
        (event.start, event.end)
    };
    Ok(resolve_slot(event, start, start, end, index.get(start), window)
        .into_iter()
        .collect())
}

fn expand_recurring(
    event: &Event,
    rule: &RecurrenceRule,
    shape: &SlotShape,
    index: &ExceptionIndex<'_>,
    window: Window,
    budget: &mut IterationBudget,
) -> Result<Vec<Occurrence>> {
    let until = rule.until.map(|u| u.local_bound(shape.tz));
    let horizon = shape.local_date(window.end).succ_opt().unwrap_or(NaiveDate::MAX);

    // Occurrences starting up to one span (plus a day of zone slack) before
    // the window can still reach into it.
    let reach = shape.span + Duration::days(1);
    let lower = window
        .start
        .checked_sub_signed(reach)
        .map_or(shape.anchor.date(), |t| shape.local_date(t));

    let mut cursor = SlotCursor::new(rule, shape.anchor, until, horizon);
    cursor.seek(lower);

    let mut out = Vec::new();
    let mut handled = BTreeSet::new();
    let mut scanned_from = None;
    while let Some(local) = cursor.next_slot(budget)? {
        let Some((start, end)) = shape.materialize(local, shape.policy)? else {
            continue;
        };
        if start >= window.end {
            break;
        }
        scanned_from.get_or_insert(start);
        let exception = index.get(start);
        if exception.is_some() {
            handled.insert(start);
        }
        out.extend(resolve_slot(event, start, start, end, exception, window));
    }

    // A move can pull a slot from outside the scanned range into the window.
    // Only honor it if the rule really produces that slot.
    for (&recurrence_id, exception) in &index.by_slot {
        if handled.contains(&recurrence_id) {
            continue;
        }
        let ExceptionKind::Move { new_start, new_end } = exception.kind else {
            continue;
        };
        if !window.intersects(new_start, new_end) {
            continue;
        }
        if slot_exists(rule, shape, until, recurrence_id, budget)? {
            handled.insert(recurrence_id);
            out.extend(resolve_slot(
                event,
                recurrence_id,
                new_start,
                new_end,
                Some(exception),
                window,
            ));
        }
    }

    if let Some(from) = scanned_from {
        for recurrence_id in index.by_slot.range(from..window.end).map(|(id, _)| id) {
            if !handled.contains(recurrence_id) {
                tracing::debug!(
                    event_id = %event.event_id,
                    %recurrence_id,
                    "exception matches no slot of the rule"
                );
            }
        }
    }

    Ok(out)
}

/// Whether the rule produces a slot starting exactly at `recurrence_id`.
fn slot_exists(
    rule: &RecurrenceRule,
    shape: &SlotShape,
    until: Option<NaiveDateTime>,
    recurrence_id: DateTime<Utc>,
    budget: &mut IterationBudget,
) -> Result<bool> {
    let date = shape.local_date(recurrence_id);
    let mut cursor = SlotCursor::new(
        rule,
        shape.anchor,
        until,
        date.succ_opt().unwrap_or(NaiveDate::MAX),
    );
    cursor.seek(date.pred_opt().unwrap_or(date));
    while let Some(local) = cursor.next_slot(budget)? {
        match shape.materialize(local, shape.policy)? {
            Some((start, _)) if start == recurrence_id => return Ok(true),
            Some((start, _)) if start > recurrence_id => return Ok(false),
            _ => {}
        }
    }
    Ok(false)
}
