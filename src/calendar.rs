//! Trading calendar: session boundaries and next-trading-day resolution
//! (§4.6).

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;

/// `next_trading_day` / `schedule` contract any calendar (default or
/// external-provider-backed) must satisfy.
pub trait TradingCalendar {
    fn next_trading_day(&mut self, d: NaiveDate) -> (NaiveDate, u32);
    fn schedule(&mut self, d: NaiveDate, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>);
}

/// Weekday-mask calendar with explicit holiday and early-close lists.
#[derive(Debug, Clone)]
pub struct DefaultCalendar {
    trading_weekdays: HashSet<Weekday>,
    holidays: HashSet<NaiveDate>,
    early_closes: HashMap<NaiveDate, NaiveTime>,
    session_start: NaiveTime,
    session_end: NaiveTime,
}

impl Default for DefaultCalendar {
    fn default() -> Self {
        Self {
            trading_weekdays: [
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ]
            .into_iter()
            .collect(),
            holidays: HashSet::new(),
            early_closes: HashMap::new(),
            session_start: NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
            session_end: NaiveTime::from_hms_opt(23, 59, 59).unwrap(),
        }
    }
}

impl DefaultCalendar {
    pub fn with_session(mut self, start: NaiveTime, end: NaiveTime) -> Self {
        self.session_start = start;
        self.session_end = end;
        self
    }

    pub fn with_holidays(mut self, holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.holidays.extend(holidays);
        self
    }

    pub fn with_early_close(mut self, date: NaiveDate, close: NaiveTime) -> Self {
        self.early_closes.insert(date, close);
        self
    }

    fn is_trading_day(&self, d: NaiveDate) -> bool {
        self.trading_weekdays.contains(&d.weekday()) && !self.holidays.contains(&d)
    }
}

impl TradingCalendar for DefaultCalendar {
    fn next_trading_day(&mut self, d: NaiveDate) -> (NaiveDate, u32) {
        let mut cursor = d + Duration::days(1);
        while !self.is_trading_day(cursor) {
            cursor += Duration::days(1);
        }
        (cursor, cursor.iso_week().week())
    }

    fn schedule(&mut self, d: NaiveDate, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
        let end_time = self.early_closes.get(&d).copied().unwrap_or(self.session_end);
        let open = tz
            .from_local_datetime(&d.and_time(self.session_start))
            .single()
            .unwrap_or_else(|| Utc.from_utc_datetime(&d.and_time(self.session_start)).with_timezone(&tz))
            .with_timezone(&Utc);
        let close = tz
            .from_local_datetime(&d.and_time(end_time))
            .single()
            .unwrap_or_else(|| Utc.from_utc_datetime(&d.and_time(end_time)).with_timezone(&tz))
            .with_timezone(&Utc);
        (open, close)
    }
}

/// Wraps an external market-calendar provider with a one-year LRU cache of
/// resolved `(next_trading_day, schedule)` results, per §4.6.
pub struct CachedCalendar<P> {
    provider: P,
    cache: HashMap<NaiveDate, (NaiveDate, u32)>,
    schedule_cache: HashMap<(NaiveDate, &'static str), (DateTime<Utc>, DateTime<Utc>)>,
    capacity: usize,
}

impl<P: TradingCalendar> CachedCalendar<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            cache: HashMap::new(),
            schedule_cache: HashMap::new(),
            capacity: 365,
        }
    }

    fn evict_if_full(&mut self) {
        if self.cache.len() > self.capacity {
            if let Some(&oldest) = self.cache.keys().min() {
                self.cache.remove(&oldest);
            }
        }
    }
}

impl<P: TradingCalendar> TradingCalendar for CachedCalendar<P> {
    fn next_trading_day(&mut self, d: NaiveDate) -> (NaiveDate, u32) {
        if let Some(&cached) = self.cache.get(&d) {
            return cached;
        }
        let result = self.provider.next_trading_day(d);
        self.cache.insert(d, result);
        self.evict_if_full();
        result
    }

    fn schedule(&mut self, d: NaiveDate, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
        let key = (d, tz.name());
        if let Some(&cached) = self.schedule_cache.get(&key) {
            return cached;
        }
        let result = self.provider.schedule(d, tz);
        self.schedule_cache.insert(key, result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_weekends_and_holidays() {
        let mut cal = DefaultCalendar::default()
            .with_holidays([NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()]);
        // Dec 31 2024 is a Tuesday; next trading day skips New Year's Day
        // and the following weekend.
        let (next, _) = cal.next_trading_day(NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
        assert_eq!(next, NaiveDate::from_ymd_opt(2025, 1, 2).unwrap());
    }

    #[test]
    fn early_close_overrides_session_end() {
        let date = NaiveDate::from_ymd_opt(2025, 7, 3).unwrap();
        let mut cal = DefaultCalendar::default()
            .with_early_close(date, NaiveTime::from_hms_opt(13, 0, 0).unwrap());
        let (_, close) = cal.schedule(date, Tz::UTC);
        assert_eq!(close.time(), NaiveTime::from_hms_opt(13, 0, 0).unwrap());
    }
}
