//! End-to-end scenarios against the public API, one per named scenario in
//! the testable-properties section: single-feed SMA crossover, two feeds at
//! differing timeframes, a replayer filter, cheat-on-open fills, a
//! weekday-masked timer with carry, and bounded memory under a long run.

use tempoline::prelude::*;

fn bar(dt: f64, close: f64) -> Bar {
    Bar {
        datetime: TimeNum(dt),
        open: Price(close),
        high: Price(close),
        low: Price(close),
        close: Price(close),
        volume: Volume(1.0),
        open_interest: Quantity(0.0),
    }
}

fn approx(a: f64, b: f64) {
    assert!((a - b).abs() < 1e-6, "{a} != {b}");
}

/// S1: single feed, SMA crossover.
#[test]
fn s1_single_feed_sma_crossover() {
    let closes = [10.0, 11.0, 12.0, 11.0, 10.0, 9.0, 10.0, 11.0];
    let close = new_handle("close", LineMode::Unbounded);
    let mut sma = Sma::new(close.clone(), 3);

    let mut sma_values = Vec::new();
    let mut signals = Vec::new();
    let mut long = false;

    for &c in &closes {
        close.borrow_mut().forward(c, 1);
        sma.next();
        let sma_v = sma.output().borrow().get(0);
        sma_values.push(sma_v);

        if !long && eager_compare(c, sma_v, CompareOp::Gt) {
            signals.push(("buy", sma_values.len() - 1));
            long = true;
        } else if long && eager_compare(c, sma_v, CompareOp::Lt) {
            signals.push(("sell", sma_values.len() - 1));
            long = false;
        }
    }

    assert!(sma_values[0].is_nan());
    assert!(sma_values[1].is_nan());
    approx(sma_values[2], 11.0);
    approx(sma_values[3], 11.333333333333334);
    approx(sma_values[4], 11.0);
    approx(sma_values[5], 10.0);
    approx(sma_values[6], 9.666666666666666);
    approx(sma_values[7], 10.0);

    assert_eq!(signals, vec![("buy", 2), ("sell", 3), ("buy", 6)]);
}

/// S2: two feeds, differing timeframes — a feed pending this tick keeps its
/// last value and its cursor does not rewind.
#[test]
fn s2_two_feeds_differing_timeframes() {
    let mut arena = FeedArena::new();
    let one_min = TimeframeCompression::new(Timeframe::Minutes, 1).unwrap();
    let five_min = TimeframeCompression::new(Timeframe::Minutes, 5).unwrap();

    let a = arena.insert(Feed::new(
        Box::new(VecSource::new(vec![bar(0.0, 10.0), bar(1.0, 11.0), bar(2.0, 12.0)])),
        one_min,
        LineMode::Unbounded,
    ));
    let b = arena.insert(Feed::new(
        Box::new(VecSource::new(vec![bar(0.0, 100.0)])),
        five_min,
        LineMode::Unbounded,
    ));

    let clock = ClockSynchronizer::new(vec![a, b]).unwrap();

    // t=0: both feeds deliver.
    match clock.tick(&mut arena).unwrap() {
        ClockTick::Advanced { dt0, .. } => assert_eq!(dt0, TimeNum(0.0)),
        other => panic!("expected Advanced, got {other:?}"),
    }
    assert_eq!(arena.get(b).lines().line("close").unwrap().borrow().get(0), 100.0);

    // t=1: A delivers, B is exhausted (its only bar already consumed) — B's
    // close must hold its last value, dt0 must come from A alone.
    match clock.tick(&mut arena).unwrap() {
        ClockTick::Advanced { dt0, master } => {
            assert_eq!(dt0, TimeNum(1.0));
            assert_eq!(master, a);
        }
        other => panic!("expected Advanced, got {other:?}"),
    }
    assert_eq!(arena.get(b).lines().line("close").unwrap().borrow().get(0), 100.0);

    // t=2: same again, no rewind occurred for B.
    match clock.tick(&mut arena).unwrap() {
        ClockTick::Advanced { dt0, .. } => assert_eq!(dt0, TimeNum(2.0)),
        other => panic!("expected Advanced, got {other:?}"),
    }
    assert_eq!(arena.get(b).lines().line("close").unwrap().borrow().get(0), 100.0);
}

/// S3: a replayer filter streams the in-progress 5-minute bar on every
/// source minute, finalizing it once the boundary rolls over.
#[test]
fn s3_replayer_filter() {
    let one_min = TimeframeCompression::new(Timeframe::Minutes, 1).unwrap();
    let five_min = TimeframeCompression::new(Timeframe::Minutes, 5).unwrap();

    // minute offsets within [0, 86400) expressed in TimeNum day-fractions.
    let minute = 60.0 / 86_400.0;
    let bars: Vec<Bar> = (0..6)
        .map(|i| bar(i as f64 * minute, 10.0 + i as f64))
        .collect();

    let mut feed = Feed::new(Box::new(VecSource::new(bars)), one_min, LineMode::Unbounded);
    feed.add_filter(Box::new(Replayer::new(five_min)));
    feed.mark_replaying();

    let mut closes = Vec::new();
    for _ in 0..7 {
        assert_eq!(feed.load_next().unwrap(), LoadOutcome::Produced);
        closes.push(feed.lines().line("close").unwrap().borrow().get(0));
    }

    // minutes 0-4 grow the same in-progress bar (close tracks the latest
    // sub-bar).
    assert_eq!(closes[0], 10.0);
    assert_eq!(closes[1], 11.0);
    assert_eq!(closes[2], 12.0);
    assert_eq!(closes[3], 13.0);
    assert_eq!(closes[4], 14.0);
    // minute 5 crosses the boundary: barstack (the finished bar) drains
    // before barstash (the fresh partial), so the 6th call still reads the
    // finished bar's close, and only the 7th call reaches the new partial.
    assert_eq!(closes[5], 14.0);
    assert_eq!(closes[6], 15.0);

    // the finished 0-4 bar is now sitting one slot back (ago=1).
    let finished_close = feed.lines().line("close").unwrap().borrow().get(1);
    assert_eq!(finished_close, 14.0);
}

#[derive(Debug, Default)]
struct CheatBroker {
    cheat_on_open: bool,
    pending_buy: bool,
    notifications: std::collections::VecDeque<OrderNotification>,
    next_order_id: u64,
    current_open: Price,
}

impl CheatBroker {
    fn submit_market_buy(&mut self) {
        self.pending_buy = true;
    }
}

impl Broker for CheatBroker {
    fn next(&mut self) -> TempolineResult<()> {
        if self.pending_buy {
            self.pending_buy = false;
            self.next_order_id += 1;
            self.notifications.push_back(OrderNotification {
                order_id: self.next_order_id,
                status: OrderStatus::Completed,
                executed_price: Some(self.current_open),
                executed_size: Some(Quantity(1.0)),
                datetime: TimeNum(0.0),
            });
        }
        Ok(())
    }

    fn get_notification(&mut self) -> Option<OrderNotification> {
        self.notifications.pop_front()
    }

    fn set_cheat_on_open(&mut self, enabled: bool) {
        self.cheat_on_open = enabled;
    }

    fn set_fund_history(&mut self, entries: Vec<FundHistoryEntry>) -> TempolineResult<()> {
        validate_fund_history(&entries)?;
        Ok(())
    }
}

#[derive(Debug)]
struct CheatStrategy {
    lines: LineSeries,
    fills: std::rc::Rc<std::cell::RefCell<Vec<Price>>>,
}

impl LineIterator for CheatStrategy {
    fn lines(&self) -> &LineSeries {
        &self.lines
    }

    fn children(&self) -> &[LineIteratorHandle] {
        &[]
    }

    fn next(&mut self) {}
}

impl Strategy for CheatStrategy {
    fn notify_order(&mut self, order: OrderNotification) {
        self.fills.borrow_mut().push(order.executed_price.unwrap());
    }
}

/// S4: cheat-on-open — a market order submitted in `next_open` fills at the
/// bar's open, and the fill notification arrives before `next_bar`.
#[test]
fn s4_cheat_on_open_fills_at_open() {
    let daily = TimeframeCompression::new(Timeframe::Days, 1).unwrap();
    let feed = Feed::new(
        Box::new(VecSource::new(vec![Bar {
            datetime: TimeNum(0.0),
            open: Price(100.0),
            high: Price(110.0),
            low: Price(100.0),
            close: Price(110.0),
            volume: Volume(1.0),
            open_interest: Quantity(0.0),
        }])),
        daily,
        LineMode::Unbounded,
    );

    let mut engine = Engine::new().with_cheat_on_open(true);
    engine.register_feed(feed);

    let mut broker = CheatBroker::default();
    broker.current_open = Price(100.0);
    broker.submit_market_buy();
    engine.set_broker(Box::new(broker));

    // the broker mock already carries the pending buy, so this directly
    // exercises the fill-at-open path without needing an order-submission API.
    let fills = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    engine.register_strategy(Ok(Box::new(CheatStrategy {
        lines: LineSeries::new(&[], LineMode::Unbounded),
        fills: fills.clone(),
    })));

    let result = engine.run();
    assert!(result.is_ok());
    // fill price must be the bar's open (100), never its close (110).
    assert_eq!(fills.borrow().as_slice(), &[Price(100.0)]);
}

/// S5: timer with a weekday mask and carry — Wed is missing, the timer
/// fires once, carried forward to Friday.
#[test]
fn s5_timer_weekday_mask_with_carry() {
    use chrono::{NaiveTime, TimeZone, Utc};

    let mut timer = Timer::new(TimerWhen::TimeOfDay(NaiveTime::from_hms_opt(10, 0, 0).unwrap()), "strategy")
        .unwrap()
        .with_weekdays(vec![3], true); // Wednesday only, carried forward.

    let session_start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let session_end = Utc.with_ymd_and_hms(2025, 1, 1, 23, 59, 59).unwrap();

    let mon = Utc.with_ymd_and_hms(2025, 1, 6, 10, 0, 0).unwrap();
    let tue = Utc.with_ymd_and_hms(2025, 1, 7, 10, 0, 0).unwrap();
    let fri = Utc.with_ymd_and_hms(2025, 1, 10, 10, 0, 0).unwrap();

    assert!(!timer.check(mon, session_start, session_end));
    assert!(!timer.check(tue, session_start, session_end));
    assert!(timer.check(fri, session_start, session_end));
}

/// S6: BOUNDED memory — a 20-period SMA's input never holds more than 20
/// slots, and the SMA's own output never holds more than 1, across a long
/// run.
#[test]
fn s6_bounded_memory_over_a_long_run() {
    let close = new_handle("close", LineMode::Bounded { capacity: 20 });
    let mut sma = Sma::new(close.clone(), 20);

    for i in 0..10_000u32 {
        close.borrow_mut().forward(i as f64, 1);
        sma.next();
        assert!(close.borrow().len() <= 20, "close backing exceeded capacity at bar {i}");
        assert_eq!(close.borrow().lencount(), i as usize + 1);
        assert!(sma.output().borrow().len() <= 1, "sma output exceeded capacity at bar {i}");
    }
    // last 20 values forwarded are 9980..=9999.
    approx(sma.output().borrow().get(0), (9980..10_000u32).map(|v| v as f64).sum::<f64>() / 20.0);
}
