//! The append-only columnar storage described in §3/§4.1.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use chrono_tz::Tz;

use crate::error::{LineError, TempolineResult};

/// Whether a line's backing grows without limit or rotates within a fixed
/// capacity (§3 "a mode: either UNBOUNDED… or BOUNDED…").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineMode {
    Unbounded,
    Bounded { capacity: usize },
}

/// A write-through link to another line, owned elsewhere (§3 "Bindings").
///
/// `Rc<RefCell<LineBuffer>>` is a weak write-through link — the binder never
/// treats the link as exclusive ownership, it only ever calls `set` through
/// it.
pub type LineHandle = Rc<RefCell<LineBuffer>>;

/// A single append-only column with a movable logical cursor (§4.1).
#[derive(Debug)]
pub struct LineBuffer {
    name: String,
    mode: LineMode,
    /// Committed values at `ago >= 0`. `backing[i]` holds the value at
    /// logical position `origin + i`.
    backing: VecDeque<f64>,
    /// Logical position of `backing[0]`. Advances (and slides the window)
    /// as a BOUNDED line evicts its oldest slot.
    origin: i64,
    /// Logical position of `ago == 0`. May diverge from `origin +
    /// backing.len() - 1` after `rewind`/`advance`, which move the cursor
    /// without touching the backing.
    idx: i64,
    /// Bars produced since the last reset; can exceed `backing.len()` in
    /// BOUNDED mode once the ring has rotated.
    lencount: usize,
    min_period: usize,
    bindings: Vec<LineHandle>,
    tz: Option<Tz>,
}

impl LineBuffer {
    pub fn new(name: impl Into<String>, mode: LineMode) -> Self {
        Self {
            name: name.into(),
            mode,
            backing: VecDeque::new(),
            origin: 0,
            idx: -1,
            lencount: 0,
            min_period: 1,
            bindings: Vec::new(),
            tz: None,
        }
    }

    pub fn with_timezone(mut self, tz: Tz) -> Self {
        self.tz = Some(tz);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> LineMode {
        self.mode
    }

    pub fn timezone(&self) -> Option<Tz> {
        self.tz
    }

    pub fn idx(&self) -> i64 {
        self.idx
    }

    pub fn lencount(&self) -> usize {
        self.lencount
    }

    pub fn min_period(&self) -> usize {
        self.min_period
    }

    pub fn capacity(&self) -> Option<usize> {
        match self.mode {
            LineMode::Unbounded => None,
            LineMode::Bounded { capacity } => Some(capacity),
        }
    }

    /// Number of slots currently allocated in `backing` — in BOUNDED mode
    /// this never exceeds `capacity()`, regardless of `lencount()` (§8
    /// invariant 7).
    pub fn len(&self) -> usize {
        self.backing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backing.is_empty()
    }

    fn physical(&self, logical: i64) -> Option<usize> {
        let rel = logical - self.origin;
        if rel < 0 || rel as usize >= self.backing.len() {
            None
        } else {
            Some(rel as usize)
        }
    }

    /// `buf[ago]`: current bar at `ago=0`, past bars at positive `ago`,
    /// future bars (previously `extend`ed) at negative `ago`.
    ///
    /// Returns `NaN` for any slot that has never been written or has been
    /// evicted (BOUNDED mode) — NaN already denotes "no value" per §3, so
    /// indicator code reading a stale/absent slot degrades gracefully.
    pub fn get(&self, ago: isize) -> f64 {
        let logical = self.idx - ago as i64;
        self.physical(logical)
            .map(|p| self.backing[p])
            .unwrap_or(f64::NAN)
    }

    /// Like [`get`](Self::get) but reports an explicit error instead of NaN
    /// when the slot genuinely cannot be addressed (used by callers that
    /// must distinguish "evicted" from "legitimately NaN").
    pub fn try_get(&self, ago: isize) -> TempolineResult<f64> {
        let logical = self.idx - ago as i64;
        self.physical(logical)
            .map(|p| self.backing[p])
            .ok_or_else(|| {
                LineError::IndexOutOfRange {
                    ago,
                    len: self.backing.len(),
                }
                .into()
            })
    }

    /// Returns `size` values ending at `ago`, oldest first.
    pub fn get_slice(&self, ago: isize, size: usize) -> Vec<f64> {
        (0..size)
            .map(|i| self.get(ago + (size - 1 - i) as isize))
            .collect()
    }

    /// Assigns `buf[ago] = v` and propagates the write to every bound line
    /// at the same `ago` (invariant 6 in §8).
    pub fn set(&mut self, ago: isize, v: f64) -> TempolineResult<()> {
        let logical = self.idx - ago as i64;
        let p = self.physical(logical).ok_or(LineError::IndexOutOfRange {
            ago,
            len: self.backing.len(),
        })?;
        self.backing[p] = v;
        for binding in &self.bindings {
            binding.borrow_mut().set(ago, v)?;
        }
        Ok(())
    }

    /// Appends `size` slots filled with `v`, advancing `idx`/`lencount`.
    ///
    /// In BOUNDED mode, once `backing.len()` reaches capacity, each further
    /// `forward` evicts the oldest slot so `idx` stays pinned relative to
    /// `origin` while `lencount` keeps growing (§4.1 "BOUNDED mode").
    pub fn forward(&mut self, v: f64, size: usize) {
        for _ in 0..size {
            let insert_pos = (self.idx - self.origin + 1) as usize;
            if insert_pos == self.backing.len() {
                self.backing.push_back(v);
            } else if insert_pos < self.backing.len() {
                self.backing[insert_pos] = v;
            } else {
                while self.backing.len() < insert_pos {
                    self.backing.push_back(f64::NAN);
                }
                self.backing.push_back(v);
            }
            self.idx += 1;
            self.lencount += 1;
            if let LineMode::Bounded { capacity } = self.mode {
                while self.backing.len() > capacity {
                    self.backing.pop_front();
                    self.origin += 1;
                }
            }
        }
    }

    /// Pops `size` slots, rewinding `idx`/`lencount`. Refuses to retreat past
    /// the first real slot in BOUNDED mode unless `force` is set.
    pub fn backward(&mut self, size: usize, force: bool) -> TempolineResult<()> {
        for _ in 0..size {
            if matches!(self.mode, LineMode::Bounded { .. }) && !force && self.idx <= self.origin {
                return Err(LineError::BackwardPastOrigin { size }.into());
            }
            if let Some(p) = self.physical(self.idx) {
                if p == self.backing.len().saturating_sub(1) {
                    self.backing.pop_back();
                }
            }
            self.idx -= 1;
            self.lencount = self.lencount.saturating_sub(1);
        }
        Ok(())
    }

    /// Moves `idx`/`lencount` without touching the backing.
    pub fn rewind(&mut self, size: usize) {
        self.idx -= size as i64;
        self.lencount = self.lencount.saturating_sub(size);
    }

    /// Moves `idx`/`lencount` without touching the backing.
    pub fn advance(&mut self, size: usize) {
        self.idx += size as i64;
        self.lencount += size;
    }

    /// Grows the backing beyond `idx` (for lookahead) without moving the
    /// cursor.
    pub fn extend(&mut self, v: f64, size: usize) {
        let mut insert_pos = (self.idx - self.origin + 1) as usize;
        for _ in 0..size {
            if insert_pos == self.backing.len() {
                self.backing.push_back(v);
            } else if insert_pos < self.backing.len() {
                self.backing[insert_pos] = v;
            } else {
                while self.backing.len() < insert_pos {
                    self.backing.push_back(f64::NAN);
                }
                self.backing.push_back(v);
            }
            insert_pos += 1;
        }
    }

    /// Resets the cursor and length to the start without touching the
    /// backing (used to replay a vectorized `_once` pass bar-by-bar).
    pub fn home(&mut self) {
        self.idx = self.origin - 1;
        self.lencount = 0;
    }

    /// Refuses to advance past a BOUNDED line's pinned index once the
    /// backing has filled, unless `force` (replayers building an
    /// in-progress bar use `force=true`).
    pub fn set_idx(&mut self, new_idx: i64, force: bool) {
        if let LineMode::Bounded { capacity } = self.mode {
            if !force && self.backing.len() >= capacity && new_idx > self.idx {
                return;
            }
        }
        self.idx = new_idx;
    }

    /// Clears backing and counters entirely.
    pub fn reset(&mut self) {
        self.backing.clear();
        self.origin = 0;
        self.idx = -1;
        self.lencount = 0;
    }

    /// Registers a write-through link; `other`'s minimum period is raised to
    /// at least this line's.
    pub fn add_binding(&mut self, other: LineHandle) {
        {
            let mut other_mut = other.borrow_mut();
            if other_mut.min_period < self.min_period {
                other_mut.min_period = self.min_period;
            }
        }
        self.bindings.push(other);
    }

    pub fn bindings(&self) -> &[LineHandle] {
        &self.bindings
    }

    /// Overlapping-period convention: an input of minimum period `m`
    /// combined with a window of size `n` needs `m + n - 1` bars of history.
    pub fn add_min_period(&mut self, n: usize) {
        self.min_period += n.saturating_sub(1);
    }

    /// Raises the minimum period unconditionally by `n`.
    pub fn inc_min_period(&mut self, n: usize) {
        self.min_period += n;
    }

    pub fn set_min_period(&mut self, n: usize) {
        self.min_period = n;
    }
}

pub fn new_handle(name: impl Into<String>, mode: LineMode) -> LineHandle {
    Rc::new(RefCell::new(LineBuffer::new(name, mode)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_advances_idx_and_len_in_unbounded_mode() {
        let mut l = LineBuffer::new("close", LineMode::Unbounded);
        l.forward(1.0, 1);
        l.forward(2.0, 1);
        l.forward(3.0, 1);
        assert_eq!(l.idx(), 2);
        assert_eq!(l.lencount(), 3);
        assert_eq!(l.get(0), 3.0);
        assert_eq!(l.get(1), 2.0);
        assert_eq!(l.get(2), 1.0);
        assert!(l.get(3).is_nan());
    }

    #[test]
    fn bounded_mode_rotates_and_pins_idx() {
        let mut l = LineBuffer::new("close", LineMode::Bounded { capacity: 3 });
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            l.forward(v, 1);
        }
        // capacity 3, so only the last 3 values survive.
        assert_eq!(l.lencount(), 5);
        assert_eq!(l.get(0), 5.0);
        assert_eq!(l.get(1), 4.0);
        assert_eq!(l.get(2), 3.0);
        assert!(l.get(3).is_nan(), "evicted slot must not be visible");
    }

    #[test]
    fn backward_refuses_to_cross_origin_in_bounded_mode_without_force() {
        let mut l = LineBuffer::new("close", LineMode::Bounded { capacity: 2 });
        l.forward(1.0, 1);
        l.forward(2.0, 1);
        l.forward(3.0, 1); // evicts the first 1.0
        assert!(l.backward(2, false).is_err());
        assert!(l.backward(2, true).is_ok());
    }

    #[test]
    fn binding_propagates_every_assignment() {
        let bound = new_handle("bound", LineMode::Unbounded);
        bound.borrow_mut().forward(f64::NAN, 1);

        let mut src = LineBuffer::new("src", LineMode::Unbounded);
        src.forward(f64::NAN, 1);
        src.add_binding(bound.clone());
        src.set(0, 42.0).unwrap();

        assert_eq!(bound.borrow().get(0), 42.0);
    }

    #[test]
    fn add_min_period_uses_overlap_convention() {
        let mut l = LineBuffer::new("sma_input", LineMode::Unbounded);
        assert_eq!(l.min_period(), 1);
        l.add_min_period(3);
        assert_eq!(l.min_period(), 1 + (3 - 1));
    }

    #[test]
    fn extend_grows_without_moving_cursor() {
        let mut l = LineBuffer::new("close", LineMode::Unbounded);
        l.forward(1.0, 1);
        let idx_before = l.idx();
        l.extend(f64::NAN, 2);
        assert_eq!(l.idx(), idx_before);
    }

    #[test]
    fn home_resets_cursor_but_keeps_backing() {
        let mut l = LineBuffer::new("close", LineMode::Unbounded);
        l.forward(1.0, 3);
        l.home();
        assert_eq!(l.idx(), -1);
        assert_eq!(l.lencount(), 0);
    }

    #[test]
    fn get_slice_returns_oldest_first() {
        let mut l = LineBuffer::new("close", LineMode::Unbounded);
        for v in [10.0, 11.0, 12.0] {
            l.forward(v, 1);
        }
        assert_eq!(l.get_slice(0, 3), vec![10.0, 11.0, 12.0]);
    }
}
