//! Numeric time representation shared by every line that carries a
//! timestamp, and the timeframe/compression vocabulary used to describe a
//! feed's bar size.
//!
//! All datetimes inside the core are serialized as a single [`TimeNum`]: the
//! integer part is the day number since a fixed epoch, the fractional part
//! encodes time-of-day in `[0, 1)`. Comparisons are exact float comparisons
//! on this representation; conversions to/from `chrono` only happen at I/O
//! boundaries (feed sources, timers, the trading calendar).

use chrono::{DateTime, NaiveDate, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::{impl_add_sub_mul_div_primitive, impl_from_primitive};

/// Day 0 of the engine's numeric time format.
///
/// Chosen once, centrally, per the REDESIGN note on the "global numerical
/// time epoch": every conversion goes through [`datetime_to_num`] /
/// [`num_to_datetime`], which both honour this constant.
pub fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1899, 12, 30).expect("static epoch date is valid")
}

/// A single 64-bit float day-number + fraction, per §3 "Time representation".
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct TimeNum(pub f64);
impl_from_primitive!(TimeNum, f64);
impl_add_sub_mul_div_primitive!(TimeNum, f64);

impl TimeNum {
    pub const NAN: TimeNum = TimeNum(f64::NAN);

    pub fn is_nan(self) -> bool {
        self.0.is_nan()
    }
}

impl Eq for TimeNum {}
impl Ord for TimeNum {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(std::cmp::Ordering::Equal)
    }
}

/// Converts a UTC `DateTime` into the engine's numeric time format.
pub fn datetime_to_num(dt: DateTime<Utc>) -> TimeNum {
    let days = (dt.date_naive() - epoch()).num_days();
    let secs_in_day = dt.num_seconds_from_midnight() as f64 + dt.timestamp_subsec_nanos() as f64 / 1e9;
    TimeNum(days as f64 + secs_in_day / 86_400.0)
}

/// Converts an engine numeric time back into a UTC `DateTime`.
///
/// Microsecond precision is guaranteed per §6 ("Time comparisons... are
/// exact when microsecond precision suffices").
pub fn num_to_datetime(num: TimeNum) -> DateTime<Utc> {
    let days = num.0.floor() as i64;
    let frac = num.0 - num.0.floor();
    let date = epoch() + chrono::Duration::days(days);
    let nanos_in_day = (frac * 86_400.0 * 1e9).round() as i64;
    let naive = date.and_hms_opt(0, 0, 0).unwrap() + chrono::Duration::nanoseconds(nanos_in_day);
    Utc.from_utc_datetime(&naive)
}

/// Unit of a feed's timeframe; combined with a positive `compression` count
/// (e.g. `(Minutes, 5)` means 5-minute bars).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    Ticks,
    Microseconds,
    Seconds,
    Minutes,
    Days,
    Weeks,
    Months,
    Years,
}

impl Timeframe {
    /// Approximate duration of one unit of compression, used only to floor a
    /// timestamp onto a resample/replay boundary grid; calendar-aware units
    /// (months/years) are handled separately by [`TimeframeCompression::floor`].
    fn approx_seconds(self) -> Option<f64> {
        match self {
            Timeframe::Ticks => None,
            Timeframe::Microseconds => Some(1e-6),
            Timeframe::Seconds => Some(1.0),
            Timeframe::Minutes => Some(60.0),
            Timeframe::Days => Some(86_400.0),
            Timeframe::Weeks => Some(7.0 * 86_400.0),
            Timeframe::Months | Timeframe::Years => None,
        }
    }
}

/// A `(timeframe, compression)` pair, e.g. 5-minute bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeframeCompression {
    pub timeframe: Timeframe,
    pub compression: u32,
}

impl TimeframeCompression {
    pub fn new(timeframe: Timeframe, compression: u32) -> crate::error::TempolineResult<Self> {
        if compression == 0 {
            return Err(crate::error::ConfigError::InvalidTimeframe(format!(
                "compression must be positive, got {compression}"
            ))
            .into());
        }
        Ok(Self {
            timeframe,
            compression,
        })
    }

    /// Floors `ts` onto the boundary grid implied by this timeframe and
    /// compression, e.g. a 5-minute grid floors `09:07` to `09:05`.
    ///
    /// This is the `Boundary` check supplemented from
    /// `original_source/backtrader/feed.py`'s resample/replay logic (see
    /// SPEC_FULL.md §4.3): comparing against the floored boundary instead of
    /// the previous raw bar avoids drift across missing bars.
    pub fn floor(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        match self.timeframe.approx_seconds() {
            Some(unit_secs) => {
                let grid = unit_secs * self.compression as f64;
                let epoch_secs = ts.timestamp() as f64 + ts.timestamp_subsec_nanos() as f64 / 1e9;
                let floored = (epoch_secs / grid).floor() * grid;
                DateTime::<Utc>::from_timestamp(floored as i64, 0).unwrap_or(ts)
            }
            None => match self.timeframe {
                Timeframe::Months => {
                    let total_months = ts.year() as i64 * 12 + (ts.month() as i64 - 1);
                    let grid = self.compression as i64;
                    let floored_total = (total_months / grid) * grid;
                    let year = floored_total.div_euclid(12) as i32;
                    let month = floored_total.rem_euclid(12) as u32 + 1;
                    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).unwrap()
                }
                Timeframe::Years => {
                    let grid = self.compression as i32;
                    let floored_year = (ts.year() / grid) * grid;
                    Utc.with_ymd_and_hms(floored_year, 1, 1, 0, 0, 0).unwrap()
                }
                _ => ts,
            },
        }
    }
}

use chrono::Datelike;
