use thiserror::Error;

pub type TempolineResult<T> = Result<T, TempolineError>;

#[derive(Debug, Error)]
pub enum TempolineError {
    #[error(transparent)]
    Line(#[from] LineError),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Clock(#[from] ClockError),

    #[error(transparent)]
    Timer(#[from] TimerError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors raised by `LineBuffer` / `LineSeries` invariant violations.
///
/// These are always fatal: the core does not attempt to recover from a
/// broken line invariant, it surfaces the error to the caller and aborts
/// the run (see `EngineError::Fatal`, which most of these get folded into
/// at the engine boundary).
#[derive(Debug, Error)]
pub enum LineError {
    #[error("index {ago} out of range for line of length {len}")]
    IndexOutOfRange { ago: isize, len: usize },

    #[error("bounded line exceeded capacity {capacity} (attempted length {attempted})")]
    CapacityExceeded { capacity: usize, attempted: usize },

    #[error("cannot retreat {size} slots past the first real slot without force=true")]
    BackwardPastOrigin { size: usize },

    #[error("minimum period {found} is inconsistent with declared capacity {capacity}")]
    MinPeriodExceedsCapacity { found: usize, capacity: usize },

    #[error("line '{0}' not found in series schema")]
    UnknownLine(String),
}

/// Errors surfaced by a concrete feed source or the feed load protocol.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed '{0}' is exhausted")]
    Exhausted(String),

    #[error("live feed '{0}' lost its connection")]
    ConnectionBroken(String),

    #[error("feed '{0}' subscription was rejected by the upstream source")]
    SubscriptionRejected(String),

    #[error("invalid feed configuration: {0}")]
    Config(String),

    #[error("datetime relocalization failed: {0}")]
    Timezone(String),
}

/// Errors raised while synchronizing feeds onto a common clock.
#[derive(Debug, Error)]
pub enum ClockError {
    #[error("no feeds registered with the clock synchronizer")]
    NoFeeds,

    #[error("feed reported a datetime ({reported}) earlier than the last master tick ({master})")]
    NonMonotonicDatetime { reported: f64, master: f64 },

    #[error("clock master could not be determined this tick")]
    NoMaster,
}

/// Errors raised by the timer subsystem.
#[derive(Debug, Error)]
pub enum TimerError {
    #[error("timer has neither a session anchor nor an explicit time-of-day")]
    MissingAnchor,

    #[error("trading calendar could not resolve a session for {0}")]
    NoSession(String),

    #[error("repeat interval must be positive, got {0:?}")]
    InvalidRepeat(std::time::Duration),
}

/// Errors raised by the engine driver.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("strategy '{0}' was skipped: {1}")]
    StrategySkip(String, String),

    #[error("no strategies registered")]
    NoStrategies,

    #[error("fatal invariant violation: {0}")]
    Fatal(String),

    #[error("run was stopped before completion")]
    Stopped,
}

/// Errors raised while validating engine/feed/timer configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("contradictory filter pipeline: {0}")]
    ContradictoryFilters(String),

    #[error("invalid timeframe/compression pair: {0}")]
    InvalidTimeframe(String),

    #[error("malformed fund history entry: {0}")]
    MalformedFundHistory(String),
}

impl From<LineError> for EngineError {
    fn from(value: LineError) -> Self {
        EngineError::Fatal(value.to_string())
    }
}
