//! Aligns feeds of differing timeframes, resamplers, replayers, and live
//! sources into a single monotonic timeline (§4.4 "Clock synchronizer").
//!
//! This covers steps 3, 5, 6 of the per-tick protocol: asking every feed for
//! its next bar, computing `dt0` as the minimum datetime across feeds that
//! produced one, and reconciling feeds that didn't. The surrounding steps
//! (store/data notification, cheat timers, broker dispatch, strategy
//! invocation, writers) are orchestrated by the engine driver around a
//! [`ClockSynchronizer::tick`] call. Grounded on the "min next-availability
//! across streams" pattern used to step a heterogeneous set of cursors in
//! lockstep.

use std::collections::HashMap;

use crate::error::{ClockError, TempolineResult};
use crate::feed::{FeedArena, FeedId, LoadOutcome};
use crate::time::TimeNum;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockTick {
    Advanced { dt0: TimeNum, master: FeedId },
    Pending,
    Done,
}

pub struct ClockSynchronizer {
    feed_ids: Vec<FeedId>,
}

impl ClockSynchronizer {
    pub fn new(feed_ids: Vec<FeedId>) -> TempolineResult<Self> {
        if feed_ids.is_empty() {
            return Err(ClockError::NoFeeds.into());
        }
        Ok(Self { feed_ids })
    }

    pub fn feed_ids(&self) -> &[FeedId] {
        &self.feed_ids
    }

    /// Runs one engine tick: step 3 (ask every feed for a bar), step 5
    /// (compute `dt0` and the datetime master), step 6 (reconcile feeds
    /// that didn't produce).
    pub fn tick(&self, arena: &mut FeedArena) -> TempolineResult<ClockTick> {
        let mut outcomes: HashMap<FeedId, LoadOutcome> = HashMap::with_capacity(self.feed_ids.len());
        let mut produced: Vec<(FeedId, TimeNum)> = Vec::new();

        for &id in &self.feed_ids {
            if arena.get(id).is_clone() {
                arena.sync_clone(id)?;
                continue;
            }
            let outcome = arena.get_mut(id).load_next()?;
            if outcome == LoadOutcome::Produced {
                produced.push((id, arena.get(id).current_datetime()));
            }
            outcomes.insert(id, outcome);
        }

        if produced.is_empty() {
            let mut any_flushed = false;
            for &id in &self.feed_ids {
                if arena.get(id).is_clone() {
                    continue;
                }
                if arena.get_mut(id).flush_last()? {
                    any_flushed = true;
                    produced.push((id, arena.get(id).current_datetime()));
                }
            }
            if produced.is_empty() {
                return Ok(if any_flushed {
                    ClockTick::Pending
                } else {
                    ClockTick::Done
                });
            }
        }

        // resample-only feeds are derived views, not independent clocks —
        // excluding them here keeps a resampler from fabricating the master
        // clock off its own (coarser) bar boundaries. If every producing
        // feed happens to be resample-only, fall back to the full set rather
        // than stalling the tick.
        let dt0_candidates: Vec<(FeedId, TimeNum)> = produced
            .iter()
            .copied()
            .filter(|&(id, _)| !arena.get(id).is_resample_only())
            .collect();
        let candidates = if dt0_candidates.is_empty() { &produced } else { &dt0_candidates };

        let (master, dt0) = candidates
            .iter()
            .copied()
            .min_by(|a, b| a.1.cmp(&b.1))
            .ok_or(ClockError::NoMaster)?;

        for &id in &self.feed_ids {
            if arena.get(id).is_clone() || produced.iter().any(|&(pid, _)| pid == id) {
                continue;
            }
            let retry = outcomes.get(&id).copied().unwrap_or(LoadOutcome::Pending);
            if retry == LoadOutcome::Produced {
                continue;
            }
            let feed = arena.get_mut(id);
            if feed.load_next()? == LoadOutcome::Produced {
                let dt = feed.current_datetime();
                if dt > dt0 && !feed.is_replaying() {
                    feed.rewind_one()?;
                }
            }
        }

        Ok(ClockTick::Advanced { dt0, master })
    }
}
