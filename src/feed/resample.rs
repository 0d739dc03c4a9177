//! Aggregates smaller bars into larger ones (§4.3 "Resampler filter").

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::domain::Bar;
use crate::feed::filter::Filter;
use crate::time::{datetime_to_num, num_to_datetime, TimeframeCompression};

#[derive(Debug)]
pub struct Resampler {
    target: TimeframeCompression,
    pending: Option<Bar>,
    boundary: Option<DateTime<Utc>>,
}

impl Resampler {
    pub fn new(target: TimeframeCompression) -> Self {
        Self {
            target,
            pending: None,
            boundary: None,
        }
    }

    fn merge(acc: &mut Bar, bar: &Bar) {
        if bar.high.0 > acc.high.0 {
            acc.high = bar.high;
        }
        if bar.low.0 < acc.low.0 {
            acc.low = bar.low;
        }
        acc.close = bar.close;
        acc.volume.0 += bar.volume.0;
        acc.open_interest = bar.open_interest;
    }
}

impl Filter for Resampler {
    fn on_bar(&mut self, bar: &mut Bar, barstack: &mut VecDeque<Bar>, _barstash: &mut VecDeque<Bar>) -> bool {
        let floor = self.target.floor(num_to_datetime(bar.datetime));
        match (self.pending, self.boundary) {
            (Some(mut acc), Some(b)) if b == floor => {
                Self::merge(&mut acc, bar);
                self.pending = Some(acc);
            }
            (Some(acc), Some(b)) => {
                let mut finished = acc;
                finished.datetime = datetime_to_num(floor);
                barstack.push_back(finished);
                self.pending = Some(*bar);
                self.boundary = Some(floor);
            }
            _ => {
                self.pending = Some(*bar);
                self.boundary = Some(floor);
            }
        }
        true
    }

    fn last(&mut self, barstack: &mut VecDeque<Bar>) -> bool {
        if let (Some(acc), Some(b)) = (self.pending.take(), self.boundary.take()) {
            let mut finished = acc;
            finished.datetime = datetime_to_num(b);
            barstack.push_back(finished);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Price, Quantity};
    use crate::time::{datetime_to_num, Timeframe};
    use chrono::TimeZone;

    fn bar(dt: DateTime<Utc>, close: f64) -> Bar {
        Bar {
            datetime: datetime_to_num(dt),
            open: Price(close),
            high: Price(close),
            low: Price(close),
            close: Price(close),
            volume: Quantity(1.0),
            open_interest: Quantity(0.0),
        }
    }

    #[test]
    fn aggregates_within_one_period_and_flushes_on_rollover() {
        let target = TimeframeCompression::new(Timeframe::Minutes, 5).unwrap();
        let mut r = Resampler::new(target);
        let mut barstack = VecDeque::new();
        let mut barstash = VecDeque::new();

        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2025, 1, 1, 9, 2, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2025, 1, 1, 9, 5, 0).unwrap(); // next period

        let mut b0 = bar(t0, 10.0);
        let mut b1 = bar(t1, 12.0);
        let mut b2 = bar(t2, 20.0);

        r.on_bar(&mut b0, &mut barstack, &mut barstash);
        assert!(barstack.is_empty());
        r.on_bar(&mut b1, &mut barstack, &mut barstash);
        assert!(barstack.is_empty());
        r.on_bar(&mut b2, &mut barstack, &mut barstash);

        let finished = barstack.pop_front().unwrap();
        assert_eq!(finished.close.0, 12.0);
        assert_eq!(finished.high.0, 12.0);
        assert_eq!(finished.volume.0, 2.0);
    }
}
