//! Relative Strength Index, via Wilder's smoothing of up/down moves.

use crate::indicators::ema::Ewm;
use crate::iterator::{LineIterator, LineIteratorHandle};
use crate::line::{LineHandle, LineMode, LineSeries};

/// `RSI(input, period)`, using Wilder's smoothing (`alpha = 1 / period`)
/// rather than the standard EMA alpha.
#[derive(Debug)]
pub struct Rsi {
    input: LineHandle,
    period: usize,
    lines: LineSeries,
    prev_price: Option<f64>,
    avg_gain: Ewm,
    avg_loss: Ewm,
}

impl Rsi {
    pub fn new(input: LineHandle, period: usize) -> Self {
        let lines = LineSeries::new(&["rsi"], crate::indicators::output_mode(&input));
        // one extra bar is needed for the first delta.
        lines
            .line("rsi")
            .unwrap()
            .borrow_mut()
            .add_min_period(period + 1);
        let alpha = 1.0 / period as f64;
        Self {
            input,
            period,
            lines,
            prev_price: None,
            avg_gain: Ewm::new(alpha, period),
            avg_loss: Ewm::new(alpha, period),
        }
    }

    pub fn output(&self) -> &LineHandle {
        self.lines.line_at(0).unwrap()
    }

    /// Folds one value into the gain/loss smoothers and returns the RSI (or
    /// NaN before either smoother has enough history). Shared by the per-bar
    /// and vectorized paths so both compute identically.
    fn step(&mut self, value: f64) -> f64 {
        match self.prev_price.replace(value) {
            None => f64::NAN,
            Some(prev) => {
                let delta = value - prev;
                let (gain, loss) = if delta > 0.0 {
                    (delta, 0.0)
                } else {
                    (0.0, delta.abs())
                };
                match (self.avg_gain.update(gain), self.avg_loss.update(loss)) {
                    (Some(avg_gain), Some(avg_loss)) => {
                        if avg_loss == 0.0 {
                            if avg_gain == 0.0 {
                                50.0
                            } else {
                                100.0
                            }
                        } else {
                            let rs = avg_gain / avg_loss;
                            100.0 - (100.0 / (1.0 + rs))
                        }
                    }
                    _ => f64::NAN,
                }
            }
        }
    }
}

impl LineIterator for Rsi {
    fn lines(&self) -> &LineSeries {
        &self.lines
    }

    fn children(&self) -> &[LineIteratorHandle] {
        &[]
    }

    fn own_min_period(&self) -> usize {
        self.period + 1
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
    fn pure_uptrend_saturates_at_one_hundred() {
        let input = new_handle("close", LineMode::Unbounded);
        let mut rsi = Rsi::new(input.clone(), 3);
        for v in [1.0, 2.0, 3.0, 4.0, 5.0, 6.0] {
            input.borrow_mut().forward(v, 1);
            rsi.next();
        }
        assert_eq!(rsi.output().borrow().get(0), 100.0);
    }

    #[test]
    fn flat_series_reads_fifty() {
        let input = new_handle("close", LineMode::Unbounded);
        let mut rsi = Rsi::new(input.clone(), 3);
        for _ in 0..6 {
            input.borrow_mut().forward(10.0, 1);
            rsi.next();
        }
        assert_eq!(rsi.output().borrow().get(0), 50.0);
    }
}
