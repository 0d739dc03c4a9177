// 1. Line data model
pub use crate::line::{eager_compare, BinOp, CompareOp, Expr, LineBuffer, LineHandle, LineMode, LineSeries, UnOp};

// 2. Iterator base and indicators
pub use crate::indicators::{Ema, Rsi, Sma};
pub use crate::iterator::{resolve_min_period, run as run_line_iterator, tree_next_force, LineIterator, LineIteratorHandle};

// 3. Feeds and filters
pub use crate::feed::{
    Feed, FeedArena, FeedId, FeedNotification, FeedNotificationCode, FeedSource, Filter, LoadOutcome, LoadResult,
    NotificationQueue, Replayer, Resampler, VecSource,
};

// 4. Clock, timer, calendar
pub use crate::calendar::{CachedCalendar, DefaultCalendar, TradingCalendar};
pub use crate::clock::{ClockSynchronizer, ClockTick};
pub use crate::timer::{Timer, TimerWhen};

// 5. Engine driver
pub use crate::engine::{decide_mode, run_optimization_shard, Engine, EngineMode, NoOpStrategy, OptimizationJob, StrategyResultLight};

// 6. Domain and time types
pub use crate::domain::{Bar, Price, Quantity, Volume};
pub use crate::time::{datetime_to_num, num_to_datetime, Timeframe, TimeframeCompression, TimeNum};

// 7. External-interface traits
pub use crate::broker::{validate_fund_history, Broker, FundHistoryEntry, OrderNotification, OrderStatus};
pub use crate::strategy::{Strategy, StrategySkip};

// 8. Errors
pub use crate::error::{
    ClockError, ConfigError, EngineError, FeedError, LineError, TempolineError, TempolineResult, TimerError,
};
