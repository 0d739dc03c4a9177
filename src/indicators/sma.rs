//! Simple moving average.

use std::collections::VecDeque;

use crate::iterator::{LineIterator, LineIteratorHandle};
use crate::line::{LineHandle, LineMode, LineSeries};

/// `SMA(input, period)`: the arithmetic mean of `input` over the trailing
/// `period` bars.
#[derive(Debug)]
pub struct Sma {
    input: LineHandle,
    period: usize,
    lines: LineSeries,
    window: VecDeque<f64>,
    sum: f64,
}

impl Sma {
    pub fn new(input: LineHandle, period: usize) -> Self {
        let lines = LineSeries::new(&["sma"], crate::indicators::output_mode(&input));
        lines
            .line("sma")
            .unwrap()
            .borrow_mut()
            .add_min_period(period);
        Self {
            input,
            period,
            lines,
            window: VecDeque::with_capacity(period),
            sum: 0.0,
        }
    }

    pub fn output(&self) -> &LineHandle {
        self.lines.line_at(0).unwrap()
    }

    /// Folds one value into the window/sum and returns the resulting average
    /// (or NaN before the window fills). Shared by the per-bar and
    /// vectorized paths so both compute identically.
    fn step(&mut self, value: f64) -> f64 {
        self.window.push_back(value);
        self.sum += value;
        if self.window.len() > self.period {
            if let Some(removed) = self.window.pop_front() {
                self.sum -= removed;
            }
        }
        if self.window.len() >= self.period {
            self.sum / self.window.len() as f64
        } else {
            f64::NAN
        }
    }
}

impl LineIterator for Sma {
    fn lines(&self) -> &LineSeries {
        &self.lines
    }

    fn children(&self) -> &[LineIteratorHandle] {
        &[]
    }

    fn own_min_period(&self) -> usize {
        self.period
    }

    fn next(&mut self) {
        let value = self.input.borrow().get(0);
        let out = self.step(value);
        self.output().borrow_mut().forward(out, 1);
    }

    /// Reads `[start, end)` straight out of the already-loaded input buffer
    /// by `ago` offset from its current index, instead of stepping through
    /// `next()` one bar at a time.
    fn once(&mut self, start: usize, end: usize) {
        for i in start..end {
            let ago = (end - 1 - i) as isize;
            let value = self.input.borrow().get(ago);
            let out = self.step(value);
            self.output().borrow_mut().forward(out, 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::new_handle;

    #[test]
    fn averages_the_trailing_window() {
        let input = new_handle("close", LineMode::Unbounded);
        let mut sma = Sma::new(input.clone(), 3);
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            input.borrow_mut().forward(v, 1);
            sma.next();
        }
        // last window is [3, 4, 5]
        assert_eq!(sma.output().borrow().get(0), 4.0);
    }

    #[test]
    fn stays_nan_before_the_window_fills() {
        let input = new_handle("close", LineMode::Unbounded);
        let mut sma = Sma::new(input.clone(), 3);
        input.borrow_mut().forward(1.0, 1);
        sma.next();
        assert!(sma.output().borrow().get(0).is_nan());
    }

    #[test]
    fn vectorized_once_matches_per_bar_next() {
        let closes = [10.0, 11.0, 12.0, 11.0, 10.0, 9.0, 10.0, 11.0];

        let per_bar_input = new_handle("close", LineMode::Unbounded);
        let mut per_bar = Sma::new(per_bar_input.clone(), 3);
        let mut per_bar_values = Vec::new();
        for &c in &closes {
            per_bar_input.borrow_mut().forward(c, 1);
            per_bar.next();
            per_bar_values.push(per_bar.output().borrow().get(0));
        }

        let vectorized_input = new_handle("close", LineMode::Unbounded);
        for &c in &closes {
            vectorized_input.borrow_mut().forward(c, 1);
        }
        let mut vectorized = Sma::new(vectorized_input, 3);
        vectorized.once(0, closes.len());
        let mut vectorized_values = Vec::new();
        for ago in (0..closes.len()).rev() {
            vectorized_values.push(vectorized.output().borrow().get(ago as isize));
        }

        for (per_bar_v, vectorized_v) in per_bar_values.iter().zip(vectorized_values.iter()) {
            if per_bar_v.is_nan() {
                assert!(vectorized_v.is_nan());
            } else {
                assert!((per_bar_v - vectorized_v).abs() < 1e-9);
            }
        }
    }
}
