//! DST transition policies and local-to-absolute time resolution.

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Policy for slots whose local wall-clock time falls in a DST gap
/// (e.g., 02:30 on a spring-forward night).
///
/// Times that occur twice (fall-back fold) always resolve to the earlier
/// instant, per RFC 5545 §3.3.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DstPolicy {
    /// Interpret the missing time with the UTC offset in force before the gap,
    /// which lands it the gap's length later on the wall clock (RFC 5545).
    #[default]
    ShiftForward,
    /// Drop the slot. It still consumes a COUNT position.
    Skip,
}

/// Convert a local wall-clock time in `tz` to an absolute instant.
///
/// Returns `None` only when the time is in a gap and `policy` is
/// [`DstPolicy::Skip`].
pub fn resolve_local(tz: Tz, local: NaiveDateTime, policy: DstPolicy) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => match policy {
            DstPolicy::Skip => None,
            DstPolicy::ShiftForward => Some(shift_past_gap(tz, local)),
        },
    }
}

/// Apply the pre-gap offset to a non-existent local time.
fn shift_past_gap(tz: Tz, local: NaiveDateTime) -> DateTime<Utc> {
    // Zone transitions are never a day apart, so a day earlier is on the
    // pre-gap side.
    let before = local - Duration::days(1);
    let offset_secs = match tz.offset_from_local_datetime(&before) {
        LocalResult::Single(off) | LocalResult::Ambiguous(off, _) => off.fix().local_minus_utc(),
        LocalResult::None => 0,
    };
    (local - Duration::seconds(i64::from(offset_secs))).and_utc()
}
