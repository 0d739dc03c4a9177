//! The contract every concrete data source (CSV reader, dataframe bridge,
//! broker API client, …) must implement; the core never depends on a
//! concrete source (§6 "Feed source contract").

use crate::domain::Bar;
use crate::error::{FeedError, TempolineResult};

#[derive(Debug, Clone, PartialEq)]
pub enum LoadResult {
    Bar(Bar),
    Pending,
    Exhausted,
    Error(FeedError),
}

pub trait FeedSource: std::fmt::Debug {
    fn start(&mut self) -> TempolineResult<()> {
        Ok(())
    }

    fn stop(&mut self) {}

    /// Produces exactly one new raw bar, or reports why it could not.
    fn load_next(&mut self) -> LoadResult;

    fn is_live(&self) -> bool {
        false
    }

    /// True iff an unread bar is already buffered (used to collapse
    /// `qcheck` polling patience to zero).
    fn has_live_data(&self) -> bool {
        false
    }

    /// Repeatedly loads until `Exhausted`, for PRELOAD mode.
    fn preload(&mut self) -> TempolineResult<Vec<Bar>> {
        let mut bars = Vec::new();
        loop {
            match self.load_next() {
                LoadResult::Bar(bar) => bars.push(bar),
                LoadResult::Pending => continue,
                LoadResult::Exhausted => return Ok(bars),
                LoadResult::Error(e) => return Err(e.into()),
            }
        }
    }
}

/// An in-memory source over a fixed slice of bars, used by tests and by
/// PRELOAD mode once a live/CSV source has been fully drained.
#[derive(Debug, Clone)]
pub struct VecSource {
    bars: Vec<Bar>,
    cursor: usize,
}

impl VecSource {
    pub fn new(bars: Vec<Bar>) -> Self {
        Self { bars, cursor: 0 }
    }
}

impl FeedSource for VecSource {
    fn load_next(&mut self) -> LoadResult {
        match self.bars.get(self.cursor) {
            Some(bar) => {
                self.cursor += 1;
                LoadResult::Bar(*bar)
            }
            None => LoadResult::Exhausted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Price, Quantity};
    use crate::time::TimeNum;

    fn bar(dt: f64, close: f64) -> Bar {
        Bar {
            datetime: TimeNum(dt),
            open: Price(close),
            high: Price(close),
            low: Price(close),
            close: Price(close),
            volume: Quantity(0.0),
            open_interest: Quantity(0.0),
        }
    }

    #[test]
    fn vec_source_exhausts_after_its_bars() {
        let mut s = VecSource::new(vec![bar(1.0, 10.0)]);
        assert!(matches!(s.load_next(), LoadResult::Bar(_)));
        assert!(matches!(s.load_next(), LoadResult::Exhausted));
    }
}
