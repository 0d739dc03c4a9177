//! Concrete line-buffer indicators built on the streaming update kernels
//! (§6 "Indicators").

pub mod ema;
pub mod rsi;
pub mod sma;

pub use ema::Ema;
pub use rsi::Rsi;
pub use sma::Sma;

use crate::line::{LineHandle, LineMode};

/// Mode an indicator's own output line should take given its input's mode:
/// a BOUNDED input (the `exactbars=1` memory discipline, §5) keeps its
/// indicators BOUNDED too, with capacity 1 since an indicator only ever
/// reads its own output at `ago=0` (§8 scenario S6).
pub(crate) fn output_mode(input: &LineHandle) -> LineMode {
    match input.borrow().mode() {
        LineMode::Unbounded => LineMode::Unbounded,
        LineMode::Bounded { .. } => LineMode::Bounded { capacity: 1 },
    }
}
