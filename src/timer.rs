//! Session/weekday/monthday-aware scheduled callbacks (§4.5 "Timer
//! subsystem").

use std::collections::VecDeque;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;

use crate::error::{TempolineResult, TimerError};

/// The anchor a timer's firing time is resolved against.
#[derive(Debug, Clone, Copy)]
pub enum TimerWhen {
    TimeOfDay(NaiveTime),
    SessionStart,
    SessionEnd,
}

pub struct Timer {
    when: TimerWhen,
    offset: Duration,
    repeat: Option<Duration>,
    weekdays: VecDeque<u8>,
    weekcarry: bool,
    monthdays: VecDeque<u8>,
    monthcarry: bool,
    allow: Option<Box<dyn Fn(NaiveDate) -> bool>>,
    pub cheat: bool,
    pub tz: Tz,
    pub owner: String,

    last_called_date: Option<NaiveDate>,
    last_checked_date: Option<NaiveDate>,
    allowed_today: bool,
    target: Option<DateTime<Utc>>,
    cached_session_end: Option<DateTime<Utc>>,
    last_when: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("when", &self.when)
            .field("cheat", &self.cheat)
            .field("owner", &self.owner)
            .finish()
    }
}

impl Timer {
    pub fn new(when: TimerWhen, owner: impl Into<String>) -> TempolineResult<Self> {
        Ok(Self {
            when,
            offset: Duration::zero(),
            repeat: None,
            weekdays: VecDeque::new(),
            weekcarry: false,
            monthdays: VecDeque::new(),
            monthcarry: false,
            allow: None,
            cheat: false,
            tz: Tz::UTC,
            owner: owner.into(),
            last_called_date: None,
            last_checked_date: None,
            allowed_today: false,
            target: None,
            cached_session_end: None,
            last_when: None,
        })
    }

    pub fn with_offset(mut self, offset: Duration) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_repeat(mut self, repeat: Duration) -> TempolineResult<Self> {
        if repeat <= Duration::zero() {
            return Err(TimerError::InvalidRepeat(
                repeat
                    .to_std()
                    .unwrap_or(std::time::Duration::from_secs(0)),
            )
            .into());
        }
        self.repeat = Some(repeat);
        Ok(self)
    }

    pub fn with_weekdays(mut self, mut weekdays: Vec<u8>, weekcarry: bool) -> Self {
        weekdays.sort_unstable();
        weekdays.dedup();
        self.weekdays = weekdays.into();
        self.weekcarry = weekcarry;
        self
    }

    pub fn with_monthdays(mut self, mut monthdays: Vec<u8>, monthcarry: bool) -> Self {
        monthdays.sort_unstable();
        monthdays.dedup();
        self.monthdays = monthdays.into();
        self.monthcarry = monthcarry;
        self
    }

    pub fn with_allow(mut self, predicate: Box<dyn Fn(NaiveDate) -> bool>) -> Self {
        self.allow = Some(predicate);
        self
    }

    pub fn with_cheat(mut self, cheat: bool) -> Self {
        self.cheat = cheat;
        self
    }

    pub fn with_timezone(mut self, tz: Tz) -> Self {
        self.tz = tz;
        self
    }

    pub fn last_when(&self) -> Option<DateTime<Utc>> {
        self.last_when
    }

    /// Drains `mask` up to `current`, firing (and consuming one entry) either
    /// on an exact match or, with `carry`, on the first entry `current` has
    /// already passed. An empty mask always passes.
    fn check_mask(mask: &mut VecDeque<u8>, carry: bool, current: u8) -> bool {
        if mask.is_empty() {
            return true;
        }
        while let Some(&front) = mask.front() {
            if front < current {
                mask.pop_front();
                if carry {
                    return true;
                }
                continue;
            }
            break;
        }
        mask.front() == Some(&current) && {
            mask.pop_front();
            true
        }
    }

    /// Chains the monthday mask, the weekday mask, and the `allow` predicate
    /// in sequence, matching `check_month` / `check_week` / `allow` ordering:
    /// all three must pass for the timer to fire today.
    fn resolve_mask(&mut self, today: NaiveDate) -> bool {
        if !Self::check_mask(&mut self.monthdays, self.monthcarry, today.day() as u8) {
            return false;
        }
        let iso = today.weekday().number_from_monday() as u8;
        if !Self::check_mask(&mut self.weekdays, self.weekcarry, iso) {
            return false;
        }
        match &self.allow {
            Some(predicate) => predicate(today),
            None => true,
        }
    }

    fn anchor_time(&self, session_start: DateTime<Utc>, session_end: DateTime<Utc>) -> NaiveTime {
        match self.when {
            TimerWhen::TimeOfDay(t) => t,
            TimerWhen::SessionStart => session_start.time(),
            TimerWhen::SessionEnd => session_end.time(),
        }
    }

    /// `check(dt_current)` from §4.5, driven with the owning feed's session
    /// boundaries for the current date.
    pub fn check(
        &mut self,
        dt_current: DateTime<Utc>,
        session_start: DateTime<Utc>,
        session_end: DateTime<Utc>,
    ) -> bool {
        let today = dt_current.date_naive();

        if self.last_called_date == Some(today) && self.repeat.is_none() {
            return false;
        }

        if self.cached_session_end.map(|e| e.date_naive()) != Some(today) {
            self.cached_session_end = Some(session_end);
        }

        if self.last_checked_date != Some(today) {
            self.allowed_today = self.resolve_mask(today);
            self.last_checked_date = Some(today);
            self.target = self.allowed_today.then(|| {
                let time = self.anchor_time(session_start, session_end);
                today.and_time(time).and_utc() + self.offset
            });
        }

        let Some(target) = self.target else {
            return false;
        };
        if dt_current < target {
            return false;
        }

        self.last_when = Some(dt_current);
        match self.repeat {
            None => self.last_called_date = Some(today),
            Some(interval) => {
                let next_target = target + interval;
                if next_target > self.cached_session_end.unwrap_or(session_end) {
                    self.last_called_date = Some(today);
                } else {
                    self.target = Some(next_target);
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn weekday_mask_with_carry_fires_on_next_trading_day() {
        let mut timer = Timer::new(
            TimerWhen::TimeOfDay(NaiveTime::from_hms_opt(10, 0, 0).unwrap()),
            "strategy",
        )
        .unwrap()
        .with_weekdays(vec![3], true); // WED only

        let session_start = at(2025, 1, 1, 0, 0);
        let session_end = at(2025, 1, 1, 23, 59);

        let mon = at(2025, 1, 6, 10, 0); // Monday
        let tue = at(2025, 1, 7, 10, 0); // Tuesday
        let fri = at(2025, 1, 10, 10, 0); // Friday, no Wednesday bar existed

        assert!(!timer.check(mon, session_start, session_end));
        assert!(!timer.check(tue, session_start, session_end));
        assert!(timer.check(fri, session_start, session_end));
        // the mask entry is consumed, so it does not fire again.
        assert!(!timer.check(at(2025, 1, 17, 10, 0), session_start, session_end));
    }

    #[test]
    fn monthday_and_weekday_masks_are_both_required() {
        let mut timer = Timer::new(
            TimerWhen::TimeOfDay(NaiveTime::from_hms_opt(10, 0, 0).unwrap()),
            "strategy",
        )
        .unwrap()
        .with_monthdays(vec![6], false)
        .with_weekdays(vec![3], false); // Wednesday only, no carry.

        let session_start = at(2025, 1, 1, 0, 0);
        let session_end = at(2025, 1, 1, 23, 59);

        // Jan 6 2025 is a Monday: the monthday mask matches, but the weekday
        // mask doesn't, so the timer must not fire off the monthday branch
        // alone.
        assert!(!timer.check(at(2025, 1, 6, 10, 0), session_start, session_end));
    }

    #[test]
    fn fires_at_most_once_per_day_without_repeat() {
        let mut timer = Timer::new(
            TimerWhen::TimeOfDay(NaiveTime::from_hms_opt(9, 0, 0).unwrap()),
            "strategy",
        )
        .unwrap();
        let session_start = at(2025, 1, 1, 0, 0);
        let session_end = at(2025, 1, 1, 23, 59);
        assert!(timer.check(at(2025, 1, 1, 9, 0), session_start, session_end));
        assert!(!timer.check(at(2025, 1, 1, 9, 30), session_start, session_end));
    }

    #[test]
    fn repeat_fires_again_within_the_same_session() {
        let mut timer = Timer::new(
            TimerWhen::TimeOfDay(NaiveTime::from_hms_opt(9, 0, 0).unwrap()),
            "strategy",
        )
        .unwrap()
        .with_repeat(Duration::hours(1))
        .unwrap();
        let session_start = at(2025, 1, 1, 0, 0);
        let session_end = at(2025, 1, 1, 23, 59);
        assert!(timer.check(at(2025, 1, 1, 9, 0), session_start, session_end));
        assert!(!timer.check(at(2025, 1, 1, 9, 30), session_start, session_end));
        assert!(timer.check(at(2025, 1, 1, 10, 0), session_start, session_end));
    }

    #[test]
    fn rejects_non_positive_repeat() {
        let timer = Timer::new(
            TimerWhen::TimeOfDay(NaiveTime::from_hms_opt(9, 0, 0).unwrap()),
            "strategy",
        )
        .unwrap();
        assert!(timer.with_repeat(Duration::zero()).is_err());
    }
}
