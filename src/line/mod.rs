//! Line-buffer data model (§3, §4.1): the append-only columnar series every
//! feed, indicator, observer, and strategy is built from.

pub mod buffer;
pub mod expr;
pub mod series;

pub use buffer::{new_handle, LineBuffer, LineHandle, LineMode};
pub use expr::{eager_compare, BinOp, CompareOp, Expr, UnOp};
pub use series::LineSeries;
