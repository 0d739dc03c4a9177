//! Like [`crate::feed::resample::Resampler`] but also streams the
//! in-progress bar on every sub-bar tick (§4.3 "Replayer filter").

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::domain::Bar;
use crate::feed::filter::Filter;
use crate::time::{datetime_to_num, num_to_datetime, TimeframeCompression};

#[derive(Debug)]
pub struct Replayer {
    target: TimeframeCompression,
    pending: Option<Bar>,
    boundary: Option<DateTime<Utc>>,
}

impl Replayer {
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

impl Filter for Replayer {
    fn on_bar(&mut self, bar: &mut Bar, barstack: &mut VecDeque<Bar>, barstash: &mut VecDeque<Bar>) -> bool {
        let floor = self.target.floor(num_to_datetime(bar.datetime));
        let rolled_over = self.boundary.is_some_and(|b| b != floor);
        if rolled_over {
            if let (Some(prev), Some(prev_boundary)) = (self.pending.take(), self.boundary.take()) {
                let mut finished = prev;
                finished.datetime = datetime_to_num(prev_boundary);
                barstack.push_back(finished);
            }
        }
        match &mut self.pending {
            Some(acc) if !rolled_over => Self::merge(acc, bar),
            _ => self.pending = Some(*bar),
        }
        self.boundary = Some(floor);

        // Re-stream the in-progress bar so the next load returns the
        // updated partial (the strategy "sees" the bar grow in real time).
        if let Some(acc) = self.pending {
            let mut partial = acc;
            partial.datetime = datetime_to_num(floor);
            barstash.push_back(partial);
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
