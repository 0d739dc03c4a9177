//! The common base for indicators, observers, and strategies (§4.2
//! "LineIterator").
//!
//! Every line iterator owns a [`LineSeries`] of its own output lines, reads
//! from a set of upstream input lines, and is registered with an explicit
//! `owner` at construction time (REDESIGN FLAG: replacing call-stack
//! introspection with explicit owner passing — nothing here ever walks the
//! Rust call stack to discover its parent).

use std::cell::RefCell;
use std::rc::Rc;

use crate::line::LineSeries;

pub type LineIteratorHandle = Rc<RefCell<dyn LineIterator>>;

/// Shared behaviour of indicators, observers, and strategies.
pub trait LineIterator {
    fn lines(&self) -> &LineSeries;

    /// Children registered under this iterator (e.g. an indicator computed
    /// from another indicator), used for the bottom-up min-period pass.
    fn children(&self) -> &[LineIteratorHandle];

    /// This iterator's own minimum period, ignoring its children — e.g. an
    /// SMA(20) declares `20` regardless of what feeds it.
    fn own_min_period(&self) -> usize {
        1
    }

    /// When true, this iterator cannot be driven by the vectorized `once`
    /// path and forces the whole owning tree back to per-bar `next` calls
    /// (§4.2 "next-force propagation").
    fn next_force(&self) -> bool {
        false
    }

    /// Advances by exactly one bar.
    fn next(&mut self);

    /// Vectorized counterpart of `prenext`: covers every bar strictly before
    /// the minimum period, in one call. The default is a no-op, matching
    /// `prenext`'s default.
    fn preonce(&mut self, _start: usize, _end: usize) {}

    /// Vectorized counterpart of `nextstart`: covers exactly the bar where
    /// the minimum period is first met. The default forwards to `once`,
    /// matching `nextstart`'s default of forwarding to `next`.
    fn oncestart(&mut self, start: usize, end: usize) {
        self.once(start, end);
    }

    /// Computes every bar in `[start, end)` in one vectorized pass. The
    /// default falls back to repeated [`LineIterator::next`] calls; iterators
    /// that can batch their arithmetic should override this.
    fn once(&mut self, start: usize, end: usize) {
        for _ in start..end {
            self.next();
        }
    }
}

/// Pass 1 + pass 2 of the two-pass minimum-period resolution (§4.2):
///
/// 1. each node already knows its *own* minimum period from the lines it
///    binds ([`LineIterator::own_min_period`], backed by
///    [`crate::line::LineBuffer::add_min_period`]);
/// 2. this walks the ownership tree bottom-up, taking the max of every
///    node's own period against all of its children's resolved periods, so
///    a strategy sitting on top of an indicator sitting on top of another
///    indicator waits for the slowest one to converge before its first
///    `next` call.
pub fn resolve_min_period(it: &LineIteratorHandle) -> usize {
    let borrowed = it.borrow();
    let children_max = borrowed
        .children()
        .iter()
        .map(resolve_min_period)
        .max()
        .unwrap_or(0);
    children_max.max(borrowed.own_min_period())
}

/// True if `it` or anything in its owned tree demands per-bar execution.
pub fn tree_next_force(it: &LineIteratorHandle) -> bool {
    let borrowed = it.borrow();
    borrowed.next_force() || borrowed.children().iter().any(tree_next_force)
}

/// Drives `root` (and transitively everything it owns, via its own `next`/
/// `once` implementation) over `total_bars` bars.
///
/// Bars before the resolved minimum period are skipped entirely — mirroring
/// `_next`/`_once` dispatch in §4.2 — and vectorized execution is only used
/// when requested *and* nothing in the tree sets `next_force`. The vectorized
/// branch mirrors the per-bar `prenext`/`nextstart`/`next` split with its own
/// `preonce`/`oncestart`/`once` calls, so an iterator that overrides all
/// three gets a genuinely batched pass rather than `total_bars` individual
/// `once` calls.
pub fn run(root: &LineIteratorHandle, total_bars: usize, vectorized_requested: bool) -> usize {
    let min_period = resolve_min_period(root).max(1);
    if min_period > total_bars {
        return min_period;
    }
    let use_vectorized = vectorized_requested && !tree_next_force(root);
    if use_vectorized {
        let mut it = root.borrow_mut();
        if min_period > 1 {
            it.preonce(0, min_period - 1);
        }
        it.oncestart(min_period - 1, min_period);
        if total_bars > min_period {
            it.once(min_period, total_bars);
        }
    } else {
        for _ in min_period..=total_bars {
            root.borrow_mut().next();
        }
    }
    min_period
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::{LineMode, LineSeries};

    struct Leaf {
        lines: LineSeries,
        own_min_period: usize,
        calls: usize,
    }

    impl LineIterator for Leaf {
        fn lines(&self) -> &LineSeries {
            &self.lines
        }

        fn children(&self) -> &[LineIteratorHandle] {
            &[]
        }

        fn own_min_period(&self) -> usize {
            self.own_min_period
        }

        fn next(&mut self) {
            self.calls += 1;
        }
    }

    struct Parent {
        lines: LineSeries,
        child: LineIteratorHandle,
        calls: usize,
    }

    impl LineIterator for Parent {
        fn lines(&self) -> &LineSeries {
            &self.lines
        }

        fn children(&self) -> &[LineIteratorHandle] {
            std::slice::from_ref(&self.child)
        }

        fn own_min_period(&self) -> usize {
            1
        }

        fn next(&mut self) {
            self.child.borrow_mut().next();
            self.calls += 1;
        }
    }

    #[test]
    fn resolve_min_period_takes_the_max_across_the_tree() {
        let leaf = Rc::new(RefCell::new(Leaf {
            lines: LineSeries::new(&["out"], LineMode::Unbounded),
            own_min_period: 20,
            calls: 0,
        }));
        let parent: LineIteratorHandle = Rc::new(RefCell::new(Parent {
            lines: LineSeries::new(&["out"], LineMode::Unbounded),
            child: leaf,
            calls: 0,
        }));
        assert_eq!(resolve_min_period(&parent), 20);
    }

    #[test]
    fn run_skips_bars_before_the_minimum_period() {
        let leaf: LineIteratorHandle = Rc::new(RefCell::new(Leaf {
            lines: LineSeries::new(&["out"], LineMode::Unbounded),
            own_min_period: 3,
            calls: 0,
        }));
        let min_period = run(&leaf, 5, false);
        assert_eq!(min_period, 3);
    }
}
