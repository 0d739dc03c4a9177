//! Data feed abstraction: the fixed-schema OHLCV series, its filter
//! pipeline, and the concrete source contract (§3 "Data feed", §4.3).

pub mod filter;
pub mod notification;
pub mod ohlcv;
pub mod replay;
pub mod resample;
pub mod source;

pub use filter::Filter;
pub use notification::{FeedNotification, FeedNotificationCode, NotificationQueue};
pub use ohlcv::{Feed, FeedArena, FeedId, LoadOutcome};
pub use replay::Replayer;
pub use resample::Resampler;
pub use source::{FeedSource, LoadResult, VecSource};
