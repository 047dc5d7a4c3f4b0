//! Period-by-period slot generation for a [`RecurrenceRule`].
//!
//! A rule's schedule is split into periods (one day, week, month or year,
//! times `INTERVAL`). Each period expands into a sorted set of civil dates; all
//! slots share the anchor's wall-clock time of day. Period `k`'s start is a
//! closed-form function of `k`, which is what lets [`SlotCursor::seek`] jump
//! over years of history without visiting them.

use std::collections::VecDeque;

use chrono::{Datelike, Days, Months, NaiveDate, NaiveDateTime, NaiveTime, Weekday};

use crate::error::{RecurrenceError, Result};
use crate::rule::{Frequency, RecurrenceRule, WeekdayNum};

/// Caps the work one expansion may do. Every period visited and every slot
/// yielded costs one unit.
#[derive(Debug, Clone)]
pub struct IterationBudget {
    limit: Option<u64>,
    used: u64,
}

impl IterationBudget {
    pub fn new(limit: Option<u64>) -> Self {
        Self { limit, used: 0 }
    }

    pub fn unlimited() -> Self {
        Self::new(None)
    }

    /// Spend one unit.
    ///
    /// # Errors
    /// Returns `RecurrenceError::RuleBudgetExceeded` once usage passes the limit.
    pub fn charge(&mut self) -> Result<()> {
        self.used = self.used.saturating_add(1);
        match self.limit {
            Some(limit) if self.used > limit => Err(RecurrenceError::RuleBudgetExceeded { limit }),
            _ => Ok(()),
        }
    }

    pub fn used(&self) -> u64 {
        self.used
    }
}

/// Walks a rule's slots in ascending local wall-clock order.
#[derive(Debug)]
pub struct SlotCursor<'r> {
    rule: &'r RecurrenceRule,
    anchor: NaiveDate,
    time: NaiveTime,
    until: Option<NaiveDateTime>,
    horizon: NaiveDate,
    period: u64,
    pending: VecDeque<NaiveDate>,
    yielded: u64,
    done: bool,
}

impl<'r> SlotCursor<'r> {
    /// Start a cursor at the rule's anchor (DTSTART, in local wall-clock time).
    ///
    /// `until` is the inclusive local bound derived from the rule's `UNTIL`;
    /// `horizon` is the last civil date the caller needs.
    pub fn new(
        rule: &'r RecurrenceRule,
        anchor: NaiveDateTime,
        until: Option<NaiveDateTime>,
        horizon: NaiveDate,
    ) -> Self {
        Self {
            rule,
            anchor: anchor.date(),
            time: anchor.time(),
            until,
            horizon,
            period: 0,
            pending: VecDeque::new(),
            yielded: 0,
            done: false,
        }
    }

    /// Jump to the period containing `target`, discarding earlier slots.
    ///
    /// Only rules without `COUNT` can jump: a COUNT rule has to see its
    /// earlier slots to know how many remain. Returns whether a jump happened.
    pub fn seek(&mut self, target: NaiveDate) -> bool {
        if self.rule.count.is_some() {
            return false;
        }
        let interval = i64::from(self.rule.interval);
        let offset = match self.rule.freq {
            Frequency::Daily => (target - self.anchor).num_days(),
            Frequency::Weekly => (target - week_start(self.anchor, self.rule.week_start))
                .num_days()
                .div_euclid(7),
            Frequency::Monthly => month_index(target) - month_index(self.anchor),
            Frequency::Yearly => i64::from(target.year()) - i64::from(self.anchor.year()),
        };
        let Ok(period) = u64::try_from(offset.div_euclid(interval)) else {
            return false;
        };
        if period <= self.period {
            return false;
        }
        tracing::trace!(from = self.period, to = period, %target, "fast-forwarding rule");
        self.period = period;
        self.pending.clear();
        true
    }

    /// The next slot as a local wall-clock date-time, or `None` once the rule
    /// terminates or passes the horizon.
    ///
    /// # Errors
    /// Returns `RecurrenceError::RuleBudgetExceeded` when `budget` runs out.
    pub fn next_slot(&mut self, budget: &mut IterationBudget) -> Result<Option<NaiveDateTime>> {
        loop {
            if self.done {
                return Ok(None);
            }
            if self
                .rule
                .count
                .is_some_and(|count| self.yielded >= u64::from(count))
            {
                self.done = true;
                continue;
            }

            if let Some(date) = self.pending.pop_front() {
                let slot = date.and_time(self.time);
                if date > self.horizon || self.until.is_some_and(|until| slot > until) {
                    self.done = true;
                    continue;
                }
                budget.charge()?;
                self.yielded += 1;
                return Ok(Some(slot));
            }

            let Some(start) = self.period_start(self.period) else {
                self.done = true;
                continue;
            };
            if start > self.horizon || self.until.is_some_and(|until| start > until.date()) {
                self.done = true;
                continue;
            }
            budget.charge()?;
            let anchor = self.anchor;
            let dates = self.period_dates(start);
            self.pending
                .extend(dates.into_iter().filter(|date| *date >= anchor));
            self.period += 1;
        }
    }

    fn period_start(&self, period: u64) -> Option<NaiveDate> {
        let steps = period.checked_mul(u64::from(self.rule.interval))?;
        match self.rule.freq {
            Frequency::Daily => self.anchor.checked_add_days(Days::new(steps)),
            Frequency::Weekly => week_start(self.anchor, self.rule.week_start)
                .checked_add_days(Days::new(steps.checked_mul(7)?)),
            Frequency::Monthly => first_of_month(self.anchor)
                .checked_add_months(Months::new(u32::try_from(steps).ok()?)),
            Frequency::Yearly => {
                let year = i64::from(self.anchor.year()).checked_add(i64::try_from(steps).ok()?)?;
                NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, 1, 1)
            }
        }
    }

    /// Every date the rule selects inside the period starting at `start`,
    /// sorted, with `BYSETPOS` applied.
    fn period_dates(&self, start: NaiveDate) -> Vec<NaiveDate> {
        let rule = self.rule;
        let dates: Vec<NaiveDate> = match rule.freq {
            Frequency::Daily => {
                if self.month_ok(start) && self.month_day_ok(start) && self.weekday_ok(start, start, start) {
                    vec![start]
                } else {
                    Vec::new()
                }
            }
            Frequency::Weekly => start
                .iter_days()
                .take(7)
                .filter(|date| {
                    if rule.by_day.is_empty() {
                        date.weekday() == self.anchor.weekday()
                    } else {
                        self.weekday_ok(*date, *date, *date)
                    }
                })
                .filter(|date| self.month_ok(*date))
                .collect(),
            Frequency::Monthly => {
                if !self.month_ok(start) {
                    Vec::new()
                } else if rule.by_month_day.is_empty() && rule.by_day.is_empty() {
                    start.with_day(self.anchor.day()).into_iter().collect()
                } else {
                    let last = last_of_month(start);
                    start
                        .iter_days()
                        .take_while(|date| *date <= last)
                        .filter(|date| self.month_day_ok(*date) && self.weekday_ok(*date, start, last))
                        .collect()
                }
            }
            Frequency::Yearly => {
                if rule.by_month_day.is_empty() && rule.by_day.is_empty() {
                    let mut months = if rule.by_month.is_empty() {
                        vec![self.anchor.month()]
                    } else {
                        rule.by_month.clone()
                    };
                    months.sort_unstable();
                    months.dedup();
                    months
                        .into_iter()
                        .filter_map(|m| NaiveDate::from_ymd_opt(start.year(), m, self.anchor.day()))
                        .collect()
                } else {
                    let year_end = NaiveDate::from_ymd_opt(start.year(), 12, 31).unwrap_or(start);
                    start
                        .iter_days()
                        .take_while(|date| *date <= year_end)
                        .filter(|date| {
                            let (scope_start, scope_end) = if rule.by_month.is_empty() {
                                (start, year_end)
                            } else {
                                (first_of_month(*date), last_of_month(*date))
                            };
                            self.month_ok(*date)
                                && self.month_day_ok(*date)
                                && self.weekday_ok(*date, scope_start, scope_end)
                        })
                        .collect()
                }
            }
        };
        apply_set_pos(dates, &rule.by_set_pos)
    }

    fn month_ok(&self, date: NaiveDate) -> bool {
        self.rule.by_month.is_empty() || self.rule.by_month.contains(&date.month())
    }

    fn month_day_ok(&self, date: NaiveDate) -> bool {
        if self.rule.by_month_day.is_empty() {
            return true;
        }
        let length = i64::from(last_of_month(date).day());
        let day = i64::from(date.day());
        self.rule.by_month_day.iter().any(|&md| {
            let md = i64::from(md);
            if md > 0 {
                md == day
            } else {
                length + 1 + md == day
            }
        })
    }

    /// `BYDAY` check; ordinals count within `[scope_start, scope_end]`.
    fn weekday_ok(&self, date: NaiveDate, scope_start: NaiveDate, scope_end: NaiveDate) -> bool {
        self.rule.by_day.is_empty()
            || self
                .rule
                .by_day
                .iter()
                .any(|wd| weekday_num_matches(*wd, date, scope_start, scope_end))
    }
}

fn weekday_num_matches(
    wd: WeekdayNum,
    date: NaiveDate,
    scope_start: NaiveDate,
    scope_end: NaiveDate,
) -> bool {
    if date.weekday() != wd.weekday {
        return false;
    }
    match wd.ordinal {
        None => true,
        Some(n) if n > 0 => (date - scope_start).num_days() / 7 + 1 == i64::from(n),
        Some(n) => (scope_end - date).num_days() / 7 + 1 == -i64::from(n),
    }
}

fn apply_set_pos(dates: Vec<NaiveDate>, set_pos: &[i32]) -> Vec<NaiveDate> {
    if set_pos.is_empty() {
        return dates;
    }
    let len = dates.len() as i64;
    let mut picked: Vec<NaiveDate> = set_pos
        .iter()
        .filter_map(|&pos| {
            let pos = i64::from(pos);
            let index = if pos > 0 { pos - 1 } else { len + pos };
            usize::try_from(index).ok().and_then(|i| dates.get(i).copied())
        })
        .collect();
    picked.sort_unstable();
    picked.dedup();
    picked
}

fn week_start(date: NaiveDate, week_start: Weekday) -> NaiveDate {
    let back = (7 + date.weekday().num_days_from_monday() - week_start.num_days_from_monday()) % 7;
    date - Days::new(u64::from(back))
}

fn month_index(date: NaiveDate) -> i64 {
    i64::from(date.year()) * 12 + i64::from(date.month0())
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn last_of_month(date: NaiveDate) -> NaiveDate {
    first_of_month(date)
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(date)
}
