//! Strong-typed scalar wrappers and the fixed OHLCV bar record layout
//! (§6 "Bar record layout").

use serde::{Deserialize, Serialize};

use crate::{impl_abs_primitive, impl_add_sub_mul_div_primitive, impl_from_primitive, time::TimeNum};

/// A price level: open/high/low/close, or an order's limit/stop price.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Price(pub f64);
impl_from_primitive!(Price, f64);
impl_add_sub_mul_div_primitive!(Price, f64);
impl_abs_primitive!(Price, f64);

/// A traded quantity (volume, order size, open interest).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Quantity(pub f64);
impl_from_primitive!(Quantity, f64);
impl_add_sub_mul_div_primitive!(Quantity, f64);

pub type Volume = Quantity;

/// The fixed schema every data feed's [`crate::line::series::LineSeries`]
/// carries: `{datetime, open, high, low, close, volume, open_interest}`.
///
/// Line index 0 is always `datetime`, per §3/§6.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub datetime: TimeNum,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: Volume,
    pub open_interest: Quantity,
}

impl Bar {
    pub const NUM_LINES: usize = 7;

    pub const LINE_NAMES: [&'static str; Self::NUM_LINES] = [
        "datetime",
        "open",
        "high",
        "low",
        "close",
        "volume",
        "open_interest",
    ];

    /// Decomposes the bar into the raw values a [`crate::line::series::LineSeries`]
    /// forward-fills, in schema order.
    pub fn as_line_values(&self) -> [f64; Self::NUM_LINES] {
        [
            self.datetime.0,
            self.open.0,
            self.high.0,
            self.low.0,
            self.close.0,
            self.volume.0,
            self.open_interest.0,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_decomposes_in_schema_order() {
        let bar = Bar {
            datetime: TimeNum(1.0),
            open: Price(10.0),
            high: Price(11.0),
            low: Price(9.0),
            close: Price(10.5),
            volume: Volume(100.0),
            open_interest: Quantity(0.0),
        };
        assert_eq!(bar.as_line_values(), [1.0, 10.0, 11.0, 9.0, 10.5, 100.0, 0.0]);
    }
}
