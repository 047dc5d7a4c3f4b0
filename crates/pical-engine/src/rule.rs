//! RRULE parsing and validation.
//!
//! Grammar-level checks are delegated to the `rrule` crate. The parsed rule is
//! then lowered into [`RecurrenceRule`], which covers the subset of RFC 5545 a
//! household calendar uses and which the period generator can fast-forward
//! over. Anything outside that subset is rejected rather than half-honored.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use rrule::{NWeekday, RRule, Unvalidated};

use crate::error::{RecurrenceError, Result};

/// Recurrence frequency. Sub-daily frequencies are not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "DAILY",
            Self::Weekly => "WEEKLY",
            Self::Monthly => "MONTHLY",
            Self::Yearly => "YEARLY",
        }
    }
}

/// One `BYDAY` entry, e.g. `MO`, `2TU`, `-1FR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekdayNum {
    /// `None` means every such weekday in the period.
    pub ordinal: Option<i8>,
    pub weekday: Weekday,
}

/// Rule termination bound, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Until {
    /// `UNTIL=YYYYMMDD`
    Date(NaiveDate),
    /// `UNTIL=YYYYMMDDTHHMMSS`, read as wall-clock time in the event's zone.
    Floating(NaiveDateTime),
    /// `UNTIL=YYYYMMDDTHHMMSSZ`
    Utc(DateTime<Utc>),
}

impl Until {
    /// The last admissible local wall-clock time in `tz`.
    pub fn local_bound(&self, tz: Tz) -> NaiveDateTime {
        match *self {
            Self::Date(date) => date.and_time(NaiveTime::from_hms_opt(23, 59, 59).unwrap_or_default()),
            Self::Floating(local) => local,
            Self::Utc(instant) => instant.with_timezone(&tz).naive_local(),
        }
    }
}

/// A parsed and validated recurrence rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub freq: Frequency,
    pub interval: u32,
    pub count: Option<u32>,
    pub until: Option<Until>,
    pub by_day: Vec<WeekdayNum>,
    pub by_month_day: Vec<i8>,
    pub by_month: Vec<u32>,
    pub by_set_pos: Vec<i32>,
    pub week_start: Weekday,
}

fn malformed(msg: impl Into<String>) -> RecurrenceError {
    RecurrenceError::MalformedRule(msg.into())
}

impl RecurrenceRule {
    /// Parse an RRULE body such as `FREQ=WEEKLY;BYDAY=MO,WE;COUNT=10`.
    ///
    /// A leading `RRULE:` and a trailing `;` are tolerated; keys and values
    /// are case-insensitive.
    ///
    /// # Errors
    /// Returns `RecurrenceError::MalformedRule` for unparseable text,
    /// unsupported parts, and self-contradictory constraints.
    pub fn parse(text: &str) -> Result<Self> {
        let upper = text.trim().to_ascii_uppercase();
        let body = upper
            .strip_prefix("RRULE:")
            .unwrap_or(&upper)
            .trim()
            .trim_end_matches(';');
        if body.is_empty() {
            return Err(malformed("empty RRULE string"));
        }

        let parsed = body
            .parse::<RRule<Unvalidated>>()
            .map_err(|e| malformed(e.to_string()))?;
        let rule = Self::lower(&parsed, until_is_date_only(body))?;
        rule.validate()?;
        Ok(rule)
    }

    /// Map the crate's rule onto the supported subset.
    fn lower(parsed: &RRule<Unvalidated>, date_only_until: bool) -> Result<Self> {
        let present = [
            ("BYHOUR", !parsed.get_by_hour().is_empty()),
            ("BYMINUTE", !parsed.get_by_minute().is_empty()),
            ("BYSECOND", !parsed.get_by_second().is_empty()),
            ("BYWEEKNO", !parsed.get_by_week_no().is_empty()),
            ("BYYEARDAY", !parsed.get_by_year_day().is_empty()),
        ];
        if let Some((part, _)) = present.iter().find(|(_, set)| *set) {
            return Err(malformed(format!("unsupported rule part {part}")));
        }

        let freq = match parsed.get_freq() {
            rrule::Frequency::Daily => Frequency::Daily,
            rrule::Frequency::Weekly => Frequency::Weekly,
            rrule::Frequency::Monthly => Frequency::Monthly,
            rrule::Frequency::Yearly => Frequency::Yearly,
            other => return Err(malformed(format!("FREQ={other} is not supported"))),
        };

        let until = parsed.get_until().map(|until| {
            if date_only_until {
                Until::Date(until.date_naive())
            } else if until.timezone().is_local() {
                Until::Floating(until.naive_local())
            } else {
                Until::Utc(until.with_timezone(&Utc))
            }
        });

        let by_day = parsed
            .get_by_weekday()
            .iter()
            .map(|wd| match *wd {
                NWeekday::Every(weekday) => Ok(WeekdayNum {
                    ordinal: None,
                    weekday,
                }),
                NWeekday::Nth(n, weekday) => i8::try_from(n)
                    .map(|n| WeekdayNum {
                        ordinal: Some(n),
                        weekday,
                    })
                    .map_err(|_| malformed(format!("BYDAY ordinal {n} can never match"))),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(RecurrenceRule {
            freq,
            interval: u32::from(parsed.get_interval()),
            count: parsed.get_count(),
            until,
            by_day,
            by_month_day: parsed.get_by_month_day().to_vec(),
            by_month: parsed.get_by_month().iter().map(|m| u32::from(*m)).collect(),
            by_set_pos: parsed.get_by_set_pos().to_vec(),
            week_start: parsed.get_week_start(),
        })
    }

    fn validate(&self) -> Result<()> {
        if self.interval == 0 {
            return Err(malformed("INTERVAL must be at least 1"));
        }
        if self.count.is_some() && self.until.is_some() {
            return Err(malformed("COUNT and UNTIL are mutually exclusive"));
        }

        for wd in &self.by_day {
            if let Some(n) = wd.ordinal {
                if matches!(self.freq, Frequency::Daily | Frequency::Weekly) {
                    return Err(malformed(format!(
                        "BYDAY ordinals are only valid with MONTHLY or YEARLY, not {}",
                        self.freq.as_str()
                    )));
                }
                let limit = if self.freq == Frequency::Monthly || !self.by_month.is_empty() {
                    5
                } else {
                    53
                };
                if n == 0 || n.unsigned_abs() > limit {
                    return Err(malformed(format!("BYDAY ordinal {n} can never match")));
                }
            }
        }

        if self.freq == Frequency::Weekly && !self.by_month_day.is_empty() {
            return Err(malformed("BYMONTHDAY is not valid with WEEKLY"));
        }
        if let Some(d) = self
            .by_month_day
            .iter()
            .find(|d| **d == 0 || d.unsigned_abs() > 31)
        {
            return Err(malformed(format!("BYMONTHDAY {d} out of range")));
        }
        if let Some(m) = self.by_month.iter().find(|m| !(1..=12).contains(*m)) {
            return Err(malformed(format!("BYMONTH {m} out of range")));
        }
        if let Some(p) = self
            .by_set_pos
            .iter()
            .find(|p| **p == 0 || p.unsigned_abs() > 366)
        {
            return Err(malformed(format!("BYSETPOS {p} out of range")));
        }
        if !self.by_set_pos.is_empty()
            && self.by_day.is_empty()
            && self.by_month_day.is_empty()
            && self.by_month.is_empty()
        {
            return Err(malformed("BYSETPOS requires another BY-part"));
        }

        if !self.by_month_day.is_empty() {
            let months: Vec<u32> = if self.by_month.is_empty() {
                (1..=12).collect()
            } else {
                self.by_month.clone()
            };
            let reachable = months.iter().any(|&m| {
                let longest = longest_month_length(m);
                self.by_month_day.iter().any(|d| u32::from(d.unsigned_abs()) <= longest)
            });
            if !reachable {
                return Err(malformed(
                    "BYMONTHDAY never falls inside any BYMONTH month",
                ));
            }
        }
        Ok(())
    }
}

impl FromStr for RecurrenceRule {
    type Err = RecurrenceError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for RecurrenceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FREQ={}", self.freq.as_str())?;
        if self.interval != 1 {
            write!(f, ";INTERVAL={}", self.interval)?;
        }
        if let Some(count) = self.count {
            write!(f, ";COUNT={count}")?;
        }
        match self.until {
            Some(Until::Date(d)) => write!(f, ";UNTIL={}", d.format("%Y%m%d"))?,
            Some(Until::Floating(t)) => write!(f, ";UNTIL={}", t.format("%Y%m%dT%H%M%S"))?,
            Some(Until::Utc(t)) => write!(f, ";UNTIL={}", t.format("%Y%m%dT%H%M%SZ"))?,
            None => {}
        }
        if !self.by_month.is_empty() {
            write!(f, ";BYMONTH={}", join(&self.by_month))?;
        }
        if !self.by_month_day.is_empty() {
            write!(f, ";BYMONTHDAY={}", join(&self.by_month_day))?;
        }
        if !self.by_day.is_empty() {
            let days: Vec<String> = self
                .by_day
                .iter()
                .map(|wd| match wd.ordinal {
                    Some(n) => format!("{n}{}", weekday_code(wd.weekday)),
                    None => weekday_code(wd.weekday).to_string(),
                })
                .collect();
            write!(f, ";BYDAY={}", days.join(","))?;
        }
        if !self.by_set_pos.is_empty() {
            write!(f, ";BYSETPOS={}", join(&self.by_set_pos))?;
        }
        if self.week_start != Weekday::Mon {
            write!(f, ";WKST={}", weekday_code(self.week_start))?;
        }
        Ok(())
    }
}

fn join<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Days in month `m` of a leap year.
fn longest_month_length(m: u32) -> u32 {
    match m {
        2 => 29,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

/// The crate reads `UNTIL=YYYYMMDD` as local midnight, which is
/// indistinguishable from an explicit `T000000`.
fn until_is_date_only(body: &str) -> bool {
    body.split(';')
        .find_map(|part| part.strip_prefix("UNTIL="))
        .is_some_and(|value| !value.contains('T'))
}

pub(crate) fn weekday_code(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}
