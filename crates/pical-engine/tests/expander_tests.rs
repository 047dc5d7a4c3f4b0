//! Integration tests for the public expansion API: window semantics,
//! exceptions, DST behaviour, fast-forward and the iteration budget.

use chrono::{DateTime, Duration, TimeZone, Utc};
use pical_engine::{
    expand, expand_many, expand_with_options, DstPolicy, Event, ExpandOptions, MemoryStore,
    Occurrence, RecurrenceError, RecurrenceException,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

fn starts(occurrences: &[Occurrence]) -> Vec<DateTime<Utc>> {
    occurrences.iter().map(|o| o.start_time).collect()
}

fn weekly_standup() -> Event {
    Event::new(
        "standup",
        "Monday standup",
        "UTC",
        utc(2025, 1, 6, 10, 0),
        utc(2025, 1, 6, 11, 0),
    )
    .with_rrule("FREQ=WEEKLY;BYDAY=MO;COUNT=5")
}

// ---------------------------------------------------------------------------
// Moves and cancellations
// ---------------------------------------------------------------------------

#[test]
fn weekly_with_one_moved_slot() {
    let moved = RecurrenceException::moved(
        "standup",
        utc(2025, 1, 20, 10, 0),
        utc(2025, 1, 22, 14, 0),
        utc(2025, 1, 22, 15, 0),
    );

    let result = expand(
        &weekly_standup(),
        &[moved],
        utc(2025, 1, 1, 0, 0),
        utc(2025, 2, 1, 0, 0),
    )
    .expect("should expand weekly standup");

    assert_eq!(result.len(), 4, "Feb 3 is outside the window");
    assert_eq!(
        starts(&result),
        vec![
            utc(2025, 1, 6, 10, 0),
            utc(2025, 1, 13, 10, 0),
            utc(2025, 1, 22, 14, 0),
            utc(2025, 1, 27, 10, 0),
        ]
    );

    let over = &result[2];
    assert!(over.is_override);
    assert_eq!(over.recurrence_id, utc(2025, 1, 20, 10, 0));
    assert_eq!(over.end_time, utc(2025, 1, 22, 15, 0));
    assert!(result.iter().filter(|o| !o.is_override).all(|o| o.recurrence_id == o.start_time));
}

#[test]
fn cancelled_slot_is_removed() {
    let cancel = RecurrenceException::cancel("standup", utc(2025, 1, 13, 10, 0));
    let result = expand(
        &weekly_standup(),
        &[cancel],
        utc(2025, 1, 1, 0, 0),
        utc(2025, 2, 10, 0, 0),
    )
    .expect("should expand");

    assert_eq!(result.len(), 4);
    assert!(!starts(&result).contains(&utc(2025, 1, 13, 10, 0)));
}

#[test]
fn move_out_of_window_removes_slot() {
    let moved = RecurrenceException::moved(
        "standup",
        utc(2025, 1, 13, 10, 0),
        utc(2025, 3, 1, 10, 0),
        utc(2025, 3, 1, 11, 0),
    );
    let result = expand(
        &weekly_standup(),
        &[moved],
        utc(2025, 1, 10, 0, 0),
        utc(2025, 1, 17, 0, 0),
    )
    .expect("should expand");

    assert!(result.is_empty());
}

#[test]
fn move_into_window_from_later_slot() {
    let event = Event::new(
        "dog",
        "Walk the dog",
        "UTC",
        utc(2025, 1, 1, 9, 0),
        utc(2025, 1, 1, 10, 0),
    )
    .with_rrule("FREQ=DAILY");
    let moved = RecurrenceException::moved(
        "dog",
        utc(2025, 1, 20, 9, 0),
        utc(2025, 1, 10, 12, 0),
        utc(2025, 1, 10, 13, 0),
    );

    let result = expand(&event, &[moved], utc(2025, 1, 10, 0, 0), utc(2025, 1, 11, 0, 0))
        .expect("should expand");

    assert_eq!(
        starts(&result),
        vec![utc(2025, 1, 10, 9, 0), utc(2025, 1, 10, 12, 0)]
    );
    assert_eq!(result[1].recurrence_id, utc(2025, 1, 20, 9, 0));
    assert!(result[1].is_override);
}

#[test]
fn move_of_slot_the_rule_never_produces_is_ignored() {
    let event = Event::new(
        "dog",
        "Walk the dog",
        "UTC",
        utc(2025, 1, 1, 9, 0),
        utc(2025, 1, 1, 10, 0),
    )
    .with_rrule("FREQ=DAILY");
    // 10:00 is not a slot of a 09:00 daily rule.
    let stale = RecurrenceException::moved(
        "dog",
        utc(2025, 1, 20, 10, 0),
        utc(2025, 1, 10, 12, 0),
        utc(2025, 1, 10, 13, 0),
    );

    let result = expand(&event, &[stale], utc(2025, 1, 10, 0, 0), utc(2025, 1, 11, 0, 0))
        .expect("should expand");

    assert_eq!(starts(&result), vec![utc(2025, 1, 10, 9, 0)]);
}

#[test]
fn exceptions_for_other_events_are_ignored() {
    let cancel = RecurrenceException::cancel("someone-else", utc(2025, 1, 13, 10, 0));
    let result = expand(
        &weekly_standup(),
        &[cancel],
        utc(2025, 1, 1, 0, 0),
        utc(2025, 2, 10, 0, 0),
    )
    .expect("should expand");

    assert_eq!(result.len(), 5);
}

#[test]
fn single_event_can_be_moved_or_cancelled() {
    let dentist = Event::new(
        "dentist",
        "Dentist",
        "Europe/London",
        utc(2025, 4, 2, 14, 0),
        utc(2025, 4, 2, 15, 0),
    );
    let window = (utc(2025, 4, 1, 0, 0), utc(2025, 4, 10, 0, 0));

    let cancelled = expand(
        &dentist,
        &[RecurrenceException::cancel("dentist", dentist.start)],
        window.0,
        window.1,
    )
    .expect("should expand");
    assert!(cancelled.is_empty());

    let moved = expand(
        &dentist,
        &[RecurrenceException::moved(
            "dentist",
            dentist.start,
            utc(2025, 4, 3, 9, 0),
            utc(2025, 4, 3, 10, 0),
        )],
        window.0,
        window.1,
    )
    .expect("should expand");
    assert_eq!(starts(&moved), vec![utc(2025, 4, 3, 9, 0)]);
    assert!(moved[0].is_override);
}

// ---------------------------------------------------------------------------
// Window semantics
// ---------------------------------------------------------------------------

#[test]
fn single_event_round_trips() {
    let event = Event::new(
        "party",
        "Birthday party",
        "UTC",
        utc(2025, 5, 10, 15, 0),
        utc(2025, 5, 10, 18, 0),
    );

    let result = expand(&event, &[], utc(2025, 5, 1, 0, 0), utc(2025, 6, 1, 0, 0))
        .expect("should expand single event");

    assert_eq!(result.len(), 1);
    let occ = &result[0];
    assert_eq!(occ.event_id, "party");
    assert_eq!(occ.start_time, event.start);
    assert_eq!(occ.end_time, event.end);
    assert_eq!(occ.recurrence_id, event.start);
    assert!(!occ.is_override);
}

#[test]
fn disjoint_window_is_empty() {
    let event = Event::new(
        "party",
        "Birthday party",
        "UTC",
        utc(2025, 5, 10, 15, 0),
        utc(2025, 5, 10, 18, 0),
    );

    let before = expand(&event, &[], utc(2025, 5, 1, 0, 0), utc(2025, 5, 10, 15, 0))
        .expect("should expand");
    let after = expand(&event, &[], utc(2025, 5, 10, 18, 0), utc(2025, 6, 1, 0, 0))
        .expect("should expand");

    assert!(before.is_empty(), "window ending at start does not touch");
    assert!(after.is_empty(), "window starting at end does not touch");
}

#[test]
fn occurrence_straddling_window_start_is_included() {
    let event = Event::new(
        "night",
        "Night shift",
        "UTC",
        utc(2025, 1, 1, 23, 0),
        utc(2025, 1, 2, 1, 0),
    )
    .with_rrule("FREQ=DAILY");

    let result = expand(&event, &[], utc(2025, 1, 5, 0, 0), utc(2025, 1, 5, 12, 0))
        .expect("should expand");

    assert_eq!(starts(&result), vec![utc(2025, 1, 4, 23, 0)]);
}

#[test]
fn empty_window_returns_nothing() {
    let at = utc(2025, 1, 6, 10, 0);
    let result = expand(&weekly_standup(), &[], at, at).expect("empty window is valid");
    assert!(result.is_empty());
}

#[test]
fn inverted_window_returns_error() {
    let err = expand(
        &weekly_standup(),
        &[],
        utc(2025, 2, 1, 0, 0),
        utc(2025, 1, 1, 0, 0),
    )
    .unwrap_err();
    assert!(matches!(err, RecurrenceError::InvalidWindow { .. }));
}

#[test]
fn unbounded_rule_fills_window() {
    let event = Event::new(
        "dog",
        "Walk the dog",
        "UTC",
        utc(2025, 1, 1, 7, 0),
        utc(2025, 1, 1, 8, 0),
    )
    .with_rrule("FREQ=DAILY");

    let result = expand(&event, &[], utc(2025, 1, 1, 0, 0), utc(2026, 1, 1, 0, 0))
        .expect("should expand a year");

    assert_eq!(result.len(), 365);
    assert_eq!(result[364].start_time, utc(2025, 12, 31, 7, 0));
}

#[test]
fn until_is_inclusive() {
    let event = Event::new(
        "dog",
        "Walk the dog",
        "UTC",
        utc(2025, 1, 1, 9, 0),
        utc(2025, 1, 1, 10, 0),
    )
    .with_rrule("FREQ=DAILY;UNTIL=20250105T090000Z");

    let result = expand(&event, &[], utc(2024, 12, 1, 0, 0), utc(2025, 2, 1, 0, 0))
        .expect("should expand");

    assert_eq!(result.len(), 5);
    assert_eq!(result[4].start_time, utc(2025, 1, 5, 9, 0));
}

// ---------------------------------------------------------------------------
// Invalid events
// ---------------------------------------------------------------------------

#[test]
fn malformed_rule_returns_error() {
    let event = weekly_standup().with_rrule("FREQ=SOMETIMES");
    let err = expand(&event, &[], utc(2025, 1, 1, 0, 0), utc(2025, 2, 1, 0, 0)).unwrap_err();
    assert!(matches!(err, RecurrenceError::MalformedRule(_)));
}

#[test]
fn blank_rule_means_single_event() {
    let event = weekly_standup().with_rrule("   ");
    let result = expand(&event, &[], utc(2025, 1, 1, 0, 0), utc(2025, 2, 1, 0, 0))
        .expect("blank rule is no rule");
    assert_eq!(result.len(), 1);
}

#[test]
fn invalid_timezone_returns_error() {
    let mut event = weekly_standup();
    event.timezone = "Mars/Olympus_Mons".to_string();
    let err = expand(&event, &[], utc(2025, 1, 1, 0, 0), utc(2025, 2, 1, 0, 0)).unwrap_err();
    assert_eq!(
        err,
        RecurrenceError::InvalidTimezone("Mars/Olympus_Mons".to_string())
    );
}

#[test]
fn span_past_the_end_of_time_returns_error() {
    let event = Event::new(
        "epoch",
        "Very long meeting",
        "UTC",
        utc(2025, 1, 1, 9, 0),
        utc(262_000, 1, 1, 0, 0),
    )
    .with_rrule("FREQ=YEARLY;INTERVAL=100");

    let result = expand(&event, &[], utc(2025, 1, 1, 0, 0), utc(2400, 1, 1, 0, 0));
    assert!(
        matches!(result, Err(RecurrenceError::InvalidEvent(_))),
        "got {result:?}"
    );
}

#[test]
fn end_before_start_returns_error() {
    let mut event = weekly_standup();
    event.end = event.start - Duration::hours(1);
    let err = expand(&event, &[], utc(2025, 1, 1, 0, 0), utc(2025, 2, 1, 0, 0)).unwrap_err();
    assert!(matches!(err, RecurrenceError::InvalidEvent(_)));
}

// ---------------------------------------------------------------------------
// DST
// ---------------------------------------------------------------------------

#[test]
fn daily_keeps_wall_clock_across_spring_forward() {
    // 09:00 America/New_York: EST (UTC-5) until Mar 9 2025, then EDT (UTC-4).
    let event = Event::new(
        "school",
        "School run",
        "America/New_York",
        utc(2025, 3, 7, 14, 0),
        utc(2025, 3, 7, 15, 0),
    )
    .with_rrule("FREQ=DAILY");

    let result = expand(&event, &[], utc(2025, 3, 7, 0, 0), utc(2025, 3, 12, 0, 0))
        .expect("should expand across DST");

    assert_eq!(
        starts(&result),
        vec![
            utc(2025, 3, 7, 14, 0),
            utc(2025, 3, 8, 14, 0),
            utc(2025, 3, 9, 13, 0),
            utc(2025, 3, 10, 13, 0),
            utc(2025, 3, 11, 13, 0),
        ]
    );
    for occ in &result {
        assert_eq!(occ.end_time - occ.start_time, Duration::hours(1));
    }
}

#[test]
fn slot_in_spring_gap_shifts_forward_by_default() {
    // 02:30 does not exist in New York on Mar 9 2025.
    let event = Event::new(
        "meds",
        "Medication",
        "America/New_York",
        utc(2025, 3, 7, 7, 30),
        utc(2025, 3, 7, 7, 45),
    )
    .with_rrule("FREQ=DAILY");
    let window = (utc(2025, 3, 8, 0, 0), utc(2025, 3, 11, 0, 0));

    let shifted = expand(&event, &[], window.0, window.1).expect("should expand");
    assert_eq!(
        starts(&shifted),
        vec![
            utc(2025, 3, 8, 7, 30),
            utc(2025, 3, 9, 7, 30),
            utc(2025, 3, 10, 6, 30),
        ]
    );

    let skipping = ExpandOptions::default().with_dst_policy(DstPolicy::Skip);
    let skipped = expand_with_options(&event, &[], window.0, window.1, &skipping)
        .expect("should expand")
        .occurrences;
    assert_eq!(
        starts(&skipped),
        vec![utc(2025, 3, 8, 7, 30), utc(2025, 3, 10, 6, 30)]
    );
}

#[test]
fn slot_in_fall_back_fold_uses_first_instant() {
    // 01:30 happens twice in New York on Nov 2 2025; the EDT one is first.
    let event = Event::new(
        "feed",
        "Night feed",
        "America/New_York",
        utc(2025, 10, 31, 5, 30),
        utc(2025, 10, 31, 6, 0),
    )
    .with_rrule("FREQ=DAILY");

    let result = expand(&event, &[], utc(2025, 11, 1, 0, 0), utc(2025, 11, 4, 0, 0))
        .expect("should expand");

    assert_eq!(
        starts(&result),
        vec![
            utc(2025, 11, 1, 5, 30),
            utc(2025, 11, 2, 5, 30),
            utc(2025, 11, 3, 6, 30),
        ]
    );
}

#[test]
fn all_day_spans_local_midnights_across_dst() {
    // London springs forward at 01:00 UTC on Mar 30 2025: that day is 23 hours.
    let event = Event::new(
        "holiday",
        "Half term",
        "Europe/London",
        utc(2025, 3, 29, 0, 0),
        utc(2025, 3, 30, 0, 0),
    )
    .all_day()
    .with_rrule("FREQ=DAILY;COUNT=3");

    let result = expand(&event, &[], utc(2025, 3, 28, 0, 0), utc(2025, 4, 2, 0, 0))
        .expect("should expand all-day");

    assert_eq!(result.len(), 3);
    assert!(result.iter().all(|o| o.is_all_day));
    assert_eq!(result[0].end_time - result[0].start_time, Duration::hours(24));
    assert_eq!(result[1].start_time, utc(2025, 3, 30, 0, 0));
    assert_eq!(result[1].end_time, utc(2025, 3, 30, 23, 0));
    assert_eq!(result[2].start_time, utc(2025, 3, 30, 23, 0));
    assert_eq!(result[2].end_time - result[2].start_time, Duration::hours(24));
}

#[test]
fn all_day_slot_survives_midnight_gap_when_skipping() {
    // Santiago springs forward at local midnight on Sep 8 2024: 00:00 never
    // happens that day, but the day itself still does.
    let event = Event::new(
        "school",
        "School term",
        "America/Santiago",
        utc(2024, 9, 6, 4, 0),
        utc(2024, 9, 7, 4, 0),
    )
    .all_day()
    .with_rrule("FREQ=DAILY;COUNT=4");
    let options = ExpandOptions::default().with_dst_policy(DstPolicy::Skip);

    let result = expand_with_options(
        &event,
        &[],
        utc(2024, 9, 1, 0, 0),
        utc(2024, 10, 1, 0, 0),
        &options,
    )
    .expect("should expand all-day under skip");

    assert_eq!(
        starts(&result.occurrences),
        vec![
            utc(2024, 9, 6, 4, 0),
            utc(2024, 9, 7, 4, 0),
            utc(2024, 9, 8, 4, 0),
            utc(2024, 9, 9, 3, 0),
        ]
    );
    assert_eq!(result.occurrences[2].end_time, utc(2024, 9, 9, 3, 0));
}

// ---------------------------------------------------------------------------
// Fast-forward and the iteration budget
// ---------------------------------------------------------------------------

#[test]
fn far_window_is_cheap_for_open_ended_rule() {
    let event = Event::new(
        "dog",
        "Walk the dog",
        "UTC",
        utc(2000, 1, 1, 9, 0),
        utc(2000, 1, 1, 10, 0),
    )
    .with_rrule("FREQ=DAILY");
    let tight = ExpandOptions::default().with_max_iterations(Some(100));

    let expansion = expand_with_options(
        &event,
        &[],
        utc(2030, 1, 1, 0, 0),
        utc(2030, 1, 8, 0, 0),
        &tight,
    )
    .expect("fast-forward keeps far windows within a small budget");

    assert_eq!(expansion.occurrences.len(), 7);
    assert_eq!(expansion.occurrences[0].start_time, utc(2030, 1, 1, 9, 0));
    assert!(
        expansion.iterations < 50,
        "spent {} iterations",
        expansion.iterations
    );
}

#[test]
fn huge_window_exceeds_budget() {
    let event = Event::new(
        "dog",
        "Walk the dog",
        "UTC",
        utc(2025, 1, 1, 9, 0),
        utc(2025, 1, 1, 10, 0),
    )
    .with_rrule("FREQ=DAILY");
    let tight = ExpandOptions::default().with_max_iterations(Some(1_000));

    let err = expand_with_options(
        &event,
        &[],
        utc(2025, 1, 1, 0, 0),
        utc(2035, 1, 1, 0, 0),
        &tight,
    )
    .unwrap_err();

    assert_eq!(err, RecurrenceError::RuleBudgetExceeded { limit: 1_000 });
}

#[test]
fn count_rule_walks_from_anchor() {
    let event = Event::new(
        "dog",
        "Walk the dog",
        "UTC",
        utc(2000, 1, 1, 9, 0),
        utc(2000, 1, 1, 10, 0),
    )
    .with_rrule("FREQ=DAILY;COUNT=50000");
    let tight = ExpandOptions::default().with_max_iterations(Some(500));

    let err = expand_with_options(
        &event,
        &[],
        utc(2030, 1, 1, 0, 0),
        utc(2030, 1, 8, 0, 0),
        &tight,
    )
    .unwrap_err();
    assert!(matches!(err, RecurrenceError::RuleBudgetExceeded { .. }));

    let unlimited = ExpandOptions::default().with_max_iterations(None);
    let result = expand_with_options(
        &event,
        &[],
        utc(2030, 1, 1, 0, 0),
        utc(2030, 1, 8, 0, 0),
        &unlimited,
    )
    .expect("no cap");
    assert_eq!(result.occurrences.len(), 7);
}

// ---------------------------------------------------------------------------
// expand_many
// ---------------------------------------------------------------------------

#[test]
fn expand_many_orders_ties_by_event_id() {
    let b = Event::new("b", "Bins", "UTC", utc(2025, 1, 1, 9, 0), utc(2025, 1, 1, 10, 0))
        .with_rrule("FREQ=DAILY");
    let a = Event::new("a", "Alarm", "UTC", utc(2025, 1, 1, 9, 0), utc(2025, 1, 1, 9, 0))
        .with_rrule("FREQ=DAILY");
    let none: &[RecurrenceException] = &[];

    let result = expand_many(
        [(&b, none), (&a, none)],
        utc(2025, 1, 1, 0, 0),
        utc(2025, 1, 3, 0, 0),
        &ExpandOptions::default(),
    )
    .expect("should merge");

    let ids: Vec<_> = result.iter().map(|o| o.event_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "a", "b"]);
}

#[test]
fn expand_many_skips_malformed_only_when_asked() {
    let good = Event::new("good", "Good", "UTC", utc(2025, 1, 1, 9, 0), utc(2025, 1, 1, 10, 0))
        .with_rrule("FREQ=DAILY");
    let bad = Event::new("bad", "Bad", "UTC", utc(2025, 1, 1, 9, 0), utc(2025, 1, 1, 10, 0))
        .with_rrule("FREQ=DAILY;BYDAY=1MO");
    let none: &[RecurrenceException] = &[];
    let window = (utc(2025, 1, 1, 0, 0), utc(2025, 1, 3, 0, 0));

    let err = expand_many(
        [(&good, none), (&bad, none)],
        window.0,
        window.1,
        &ExpandOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, RecurrenceError::MalformedRule(_)));

    let result = expand_many(
        [(&good, none), (&bad, none)],
        window.0,
        window.1,
        &ExpandOptions::default().skipping_malformed(),
    )
    .expect("bad event is skipped");
    assert_eq!(result.len(), 2);
    assert!(result.iter().all(|o| o.event_id == "good"));
}

#[test]
fn expand_many_does_not_skip_budget_errors() {
    let event = Event::new("dog", "Dog", "UTC", utc(2025, 1, 1, 9, 0), utc(2025, 1, 1, 10, 0))
        .with_rrule("FREQ=DAILY");
    let none: &[RecurrenceException] = &[];
    let options = ExpandOptions::default()
        .with_max_iterations(Some(10))
        .skipping_malformed();

    let err = expand_many(
        [(&event, none)],
        utc(2025, 1, 1, 0, 0),
        utc(2026, 1, 1, 0, 0),
        &options,
    )
    .unwrap_err();
    assert_eq!(err, RecurrenceError::RuleBudgetExceeded { limit: 10 });
}

#[test]
fn expand_many_drops_duplicate_entries() {
    let event = weekly_standup();
    let none: &[RecurrenceException] = &[];

    let result = expand_many(
        [(&event, none), (&event, none)],
        utc(2025, 1, 1, 0, 0),
        utc(2025, 2, 10, 0, 0),
        &ExpandOptions::default(),
    )
    .expect("should merge");

    assert_eq!(result.len(), 5);
}

// ---------------------------------------------------------------------------
// Thread safety
// ---------------------------------------------------------------------------

#[test]
fn public_types_are_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Event>();
    assert_send_sync::<RecurrenceException>();
    assert_send_sync::<Occurrence>();
    assert_send_sync::<ExpandOptions>();
    assert_send_sync::<MemoryStore>();
}
