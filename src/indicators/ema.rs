//! Exponential moving average and the shared exponentially-weighted-mean
//! kernel it and [`crate::indicators::rsi::Rsi`] are both built on.

use crate::iterator::{LineIterator, LineIteratorHandle};
use crate::line::{LineHandle, LineMode, LineSeries};

/// `y_t = alpha * x_t + (1 - alpha) * y_{t-1}`, seeded with the first
/// observed value (matches the `adjust=false` convention most charting
/// libraries default to).
#[derive(Debug, Clone)]
pub(crate) struct Ewm {
    alpha: f64,
    mean: f64,
    initialized: bool,
    window: usize,
    count: usize,
}

impl Ewm {
    pub(crate) fn new(alpha: f64, window: usize) -> Self {
        Self {
            alpha,
            mean: 0.0,
            initialized: false,
            window,
            count: 0,
        }
    }

    pub(crate) fn update(&mut self, value: f64) -> Option<f64> {
        if !self.initialized {
            self.mean = value;
            self.initialized = true;
            self.count = 1;
        } else {
            self.mean = self.alpha * value + (1.0 - self.alpha) * self.mean;
            self.count += 1;
        }
        (self.count >= self.window).then_some(self.mean)
    }
}

/// `EMA(input, period)` with the standard `alpha = 2 / (period + 1)`.
#[derive(Debug)]
pub struct Ema {
    input: LineHandle,
    period: usize,
    lines: LineSeries,
    inner: Ewm,
}

impl Ema {
    pub fn new(input: LineHandle, period: usize) -> Self {
        let lines = LineSeries::new(&["ema"], crate::indicators::output_mode(&input));
        lines
            .line("ema")
            .unwrap()
            .borrow_mut()
            .add_min_period(period);
        let alpha = 2.0 / (period as f64 + 1.0);
        Self {
            input,
            period,
            lines,
            inner: Ewm::new(alpha, period),
        }
    }

    pub fn output(&self) -> &LineHandle {
        self.lines.line_at(0).unwrap()
    }
}

impl LineIterator for Ema {
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
        let out = self.inner.update(value).unwrap_or(f64::NAN);
        self.output().borrow_mut().forward(out, 1);
    }

    /// Reads `[start, end)` straight out of the already-loaded input buffer
    /// by `ago` offset from its current index, instead of stepping through
    /// `next()` one bar at a time.
    fn once(&mut self, start: usize, end: usize) {
        for i in start..end {
            let ago = (end - 1 - i) as isize;
            let value = self.input.borrow().get(ago);
            let out = self.inner.update(value).unwrap_or(f64::NAN);
            self.output().borrow_mut().forward(out, 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::new_handle;

    #[test]
    fn tracks_price_with_exponential_decay() {
        let input = new_handle("close", LineMode::Unbounded);
        let mut ema = Ema::new(input.clone(), 2);
        for v in [10.0, 10.0, 10.0] {
            input.borrow_mut().forward(v, 1);
            ema.next();
        }
        assert_eq!(ema.output().borrow().get(0), 10.0);
    }
}
