//! A [`LineSeries`] specialized with the fixed OHLCV schema, the feed load
//! protocol, and clone semantics (§3 "Data feed", §4.3).

use std::collections::VecDeque;

use chrono_tz::Tz;

use crate::domain::Bar;
use crate::error::{FeedError, TempolineResult};
use crate::feed::filter::Filter;
use crate::feed::notification::NotificationQueue;
use crate::feed::source::{FeedSource, LoadResult};
use crate::line::{LineMode, LineSeries};
use crate::time::{datetime_to_num, TimeNum, TimeframeCompression};

/// The outcome of one `load_next` attempt on a [`Feed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Produced,
    Pending,
    Exhausted,
}

/// Stable handle into a [`FeedArena`]; clones reference their source feed by
/// id rather than by direct pointer (REDESIGN FLAG: cyclic feed/clone/engine
/// references become arena ids resolved through a central table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeedId(pub usize);

pub struct Feed {
    series: LineSeries,
    source: Box<dyn FeedSource>,
    pub timeframe_compression: TimeframeCompression,
    pub fromdate: Option<TimeNum>,
    pub todate: Option<TimeNum>,
    pub session_start: Option<TimeNum>,
    pub session_end: Option<TimeNum>,
    pub input_tz: Option<Tz>,
    pub output_tz: Option<Tz>,
    filters: Vec<Box<dyn Filter>>,
    barstack: VecDeque<Bar>,
    barstash: VecDeque<Bar>,
    pub notifications: NotificationQueue,
    live: bool,
    is_clone: bool,
    clone_source: Option<FeedId>,
    done: bool,
    replaying: bool,
    resample_only: bool,
}

impl std::fmt::Debug for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Feed")
            .field("timeframe_compression", &self.timeframe_compression)
            .field("live", &self.live)
            .field("is_clone", &self.is_clone)
            .finish()
    }
}

impl Feed {
    pub const LINE_NAMES: [&'static str; Bar::NUM_LINES] = Bar::LINE_NAMES;

    pub fn new(
        source: Box<dyn FeedSource>,
        timeframe_compression: TimeframeCompression,
        mode: LineMode,
    ) -> Self {
        let live = source.is_live();
        Self {
            series: LineSeries::new(&Self::LINE_NAMES, mode),
            source,
            timeframe_compression,
            fromdate: None,
            todate: None,
            session_start: None,
            session_end: None,
            input_tz: None,
            output_tz: None,
            filters: Vec::new(),
            barstack: VecDeque::new(),
            barstash: VecDeque::new(),
            notifications: NotificationQueue::new(),
            live,
            is_clone: false,
            clone_source: None,
            done: false,
            replaying: false,
            resample_only: false,
        }
    }

    /// Constructs a non-owning clone view: it shares no backing storage
    /// directly but is synchronized every tick by
    /// [`FeedArena::sync_clone`], per the clone semantics in §4.3.
    pub fn new_clone(source_id: FeedId, timeframe_compression: TimeframeCompression, mode: LineMode) -> Self {
        Self {
            series: LineSeries::new(&Self::LINE_NAMES, mode),
            source: Box::new(crate::feed::source::VecSource::new(Vec::new())),
            timeframe_compression,
            fromdate: None,
            todate: None,
            session_start: None,
            session_end: None,
            input_tz: None,
            output_tz: None,
            filters: Vec::new(),
            barstack: VecDeque::new(),
            barstash: VecDeque::new(),
            notifications: NotificationQueue::new(),
            live: false,
            is_clone: true,
            clone_source: Some(source_id),
            done: false,
            replaying: false,
            resample_only: false,
        }
    }

    pub fn add_filter(&mut self, filter: Box<dyn Filter>) {
        self.filters.push(filter);
    }

    /// Marks this feed as carrying a replayer in its pipeline; the clock
    /// synchronizer relaxes its rewind-on-overshoot rule for these.
    pub fn mark_replaying(&mut self) {
        self.replaying = true;
    }

    /// Marks this feed as a resampled view kept only for the strategy to
    /// read, never the one driving the master clock. The clock synchronizer
    /// excludes it from the `dt0` computation.
    pub fn mark_resample_only(&mut self) {
        self.resample_only = true;
    }

    pub fn is_resample_only(&self) -> bool {
        self.resample_only
    }

    pub fn lines(&self) -> &LineSeries {
        &self.series
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn is_clone(&self) -> bool {
        self.is_clone
    }

    pub fn clone_source(&self) -> Option<FeedId> {
        self.clone_source
    }

    /// True if this feed's filter pipeline contains a replayer — the clock
    /// synchronizer relaxes its rewind-on-overshoot rule for these (see the
    /// Open Question in SPEC_FULL.md on replayer rewind relaxation).
    pub fn is_replaying(&self) -> bool {
        self.replaying
    }

    pub fn current_datetime(&self) -> TimeNum {
        TimeNum(self.series.line_at(0).unwrap().borrow().get(0))
    }

    fn forward_empty_slot(&self) {
        self.series.forward_all(f64::NAN, 1);
    }

    fn undo_reserved_slot(&self) -> TempolineResult<()> {
        for line in self.series.iter() {
            line.borrow_mut().backward(1, true)?;
        }
        Ok(())
    }

    fn write_bar(&self, bar: Bar) -> TempolineResult<()> {
        for (line, v) in self.series.iter().zip(bar.as_line_values()) {
            line.borrow_mut().set(0, v)?;
        }
        Ok(())
    }

    fn relocalize(&self, mut bar: Bar) -> TempolineResult<Bar> {
        if let Some(tz) = self.input_tz {
            if tz != Tz::UTC {
                use chrono::{TimeZone, Utc};
                let naive = crate::time::num_to_datetime(bar.datetime).naive_utc();
                let localized = tz
                    .from_local_datetime(&naive)
                    .single()
                    .ok_or_else(|| FeedError::Timezone(format!("ambiguous local time {naive}")))?;
                bar.datetime = datetime_to_num(localized.with_timezone(&Utc));
            }
        }
        Ok(bar)
    }

    /// Attempts to produce exactly one new bar (§4.3 feed load protocol).
    pub fn load_next(&mut self) -> TempolineResult<LoadOutcome> {
        if self.done {
            return Ok(LoadOutcome::Exhausted);
        }
        self.forward_empty_slot();
        match self.load_into_reserved_slot() {
            Ok(LoadOutcome::Produced) => Ok(LoadOutcome::Produced),
            Ok(other) => {
                self.undo_reserved_slot()?;
                Ok(other)
            }
            Err(e) => {
                self.undo_reserved_slot()?;
                Err(e)
            }
        }
    }

    fn load_into_reserved_slot(&mut self) -> TempolineResult<LoadOutcome> {
        loop {
            if let Some(bar) = self.barstack.pop_front() {
                self.write_bar(bar)?;
                return Ok(LoadOutcome::Produced);
            }
            // Bars a filter already pushed onto barstash (e.g. a replayer's
            // in-progress partial) are emitted as-is — running them back
            // through the filter pipeline would re-merge a partial bar into
            // itself every tick.
            if let Some(bar) = self.barstash.pop_front() {
                self.write_bar(bar)?;
                return Ok(LoadOutcome::Produced);
            }
            let mut bar = match self.source.load_next() {
                LoadResult::Bar(raw) => self.relocalize(raw)?,
                LoadResult::Pending => return Ok(LoadOutcome::Pending),
                LoadResult::Exhausted => return Ok(LoadOutcome::Exhausted),
                LoadResult::Error(e) => return Err(e.into()),
            };

            if let Some(from) = self.fromdate {
                if bar.datetime < from {
                    continue;
                }
            }
            if let Some(to) = self.todate {
                if bar.datetime > to {
                    self.done = true;
                    return Ok(LoadOutcome::Exhausted);
                }
            }

            let mut consumed = false;
            for filter in &mut self.filters {
                if filter.on_bar(&mut bar, &mut self.barstack, &mut self.barstash) {
                    consumed = true;
                    break;
                }
            }
            if consumed {
                continue;
            }
            self.write_bar(bar)?;
            return Ok(LoadOutcome::Produced);
        }
    }

    /// End-of-stream flush: lets every filter emit a pending partial bar.
    pub fn flush_last(&mut self) -> TempolineResult<bool> {
        self.forward_empty_slot();
        let mut any = false;
        for filter in &mut self.filters {
            if filter.last(&mut self.barstack) {
                any = true;
            }
        }
        if let Some(bar) = self.barstack.pop_front() {
            self.write_bar(bar)?;
            Ok(true)
        } else {
            self.undo_reserved_slot()?;
            Ok(any)
        }
    }

    /// Holds this feed back one bar (it overshot the tick's `dt0`).
    pub fn rewind_one(&mut self) -> TempolineResult<()> {
        for line in self.series.iter() {
            line.borrow_mut().backward(1, true)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Price, Quantity};
    use crate::feed::source::VecSource;
    use crate::time::Timeframe;

    fn bar(dt: f64, close: f64) -> Bar {
        Bar {
            datetime: TimeNum(dt),
            open: Price(close),
            high: Price(close),
            low: Price(close),
            close: Price(close),
            volume: Quantity(1.0),
            open_interest: Quantity(0.0),
        }
    }

    #[test]
    fn loads_bars_in_order_and_reports_exhaustion() {
        let tc = TimeframeCompression::new(Timeframe::Days, 1).unwrap();
        let source = VecSource::new(vec![bar(1.0, 10.0), bar(2.0, 11.0)]);
        let mut feed = Feed::new(Box::new(source), tc, LineMode::Unbounded);

        assert_eq!(feed.load_next().unwrap(), LoadOutcome::Produced);
        assert_eq!(feed.current_datetime(), TimeNum(1.0));
        assert_eq!(feed.load_next().unwrap(), LoadOutcome::Produced);
        assert_eq!(feed.current_datetime(), TimeNum(2.0));
        assert_eq!(feed.load_next().unwrap(), LoadOutcome::Exhausted);
    }

    #[test]
    fn fromdate_discards_earlier_bars() {
        let tc = TimeframeCompression::new(Timeframe::Days, 1).unwrap();
        let source = VecSource::new(vec![bar(1.0, 10.0), bar(2.0, 11.0)]);
        let mut feed = Feed::new(Box::new(source), tc, LineMode::Unbounded);
        feed.fromdate = Some(TimeNum(2.0));

        assert_eq!(feed.load_next().unwrap(), LoadOutcome::Produced);
        assert_eq!(feed.current_datetime(), TimeNum(2.0));
    }

    #[test]
    fn undoes_the_reserved_slot_when_pending() {
        let tc = TimeframeCompression::new(Timeframe::Days, 1).unwrap();
        let source = VecSource::new(vec![bar(1.0, 10.0)]);
        let mut feed = Feed::new(Box::new(source), tc, LineMode::Unbounded);
        feed.load_next().unwrap();
        let idx_before = feed.lines().line_at(0).unwrap().borrow().idx();
        // second call hits Exhausted, reserved slot must be undone.
        feed.load_next().unwrap();
        assert_eq!(feed.lines().line_at(0).unwrap().borrow().idx(), idx_before);
    }
}

/// Owns every feed by stable id; clones resolve their source through this
/// table instead of holding a direct reference (see [`FeedId`]).
pub struct FeedArena {
    feeds: Vec<Feed>,
}

impl Default for FeedArena {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedArena {
    pub fn new() -> Self {
        Self { feeds: Vec::new() }
    }

    pub fn insert(&mut self, feed: Feed) -> FeedId {
        self.feeds.push(feed);
        FeedId(self.feeds.len() - 1)
    }

    pub fn get(&self, id: FeedId) -> &Feed {
        &self.feeds[id.0]
    }

    pub fn get_mut(&mut self, id: FeedId) -> &mut Feed {
        &mut self.feeds[id.0]
    }

    pub fn ids(&self) -> impl Iterator<Item = FeedId> {
        (0..self.feeds.len()).map(FeedId)
    }

    /// Copies every line's current slot from a clone's source feed
    /// (§4.3 "Clone semantics"): the clone never invokes the source's
    /// loader, it only observes.
    pub fn sync_clone(&mut self, clone_id: FeedId) -> TempolineResult<()> {
        let source_id = self.feeds[clone_id.0]
            .clone_source
            .ok_or_else(|| FeedError::Config(format!("feed {} is not a clone", clone_id.0)))?;
        let values: Vec<f64> = self.feeds[source_id.0]
            .series
            .iter()
            .map(|line| line.borrow().get(0))
            .collect();
        let clone = &mut self.feeds[clone_id.0];
        for (line, v) in clone.series.iter().zip(values) {
            line.borrow_mut().forward(v, 1);
        }
        Ok(())
    }
}
