//! Single-pass mean and median over a temperature stream.
//!
//! The median is kept with two heaps: `lower` is a max-heap of the smaller
//! half, `upper` a min-heap of the larger half. After every insert
//! `lower.len() - upper.len()` is 0 or 1 and `max(lower) <= min(upper)`.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// `f64` with a total order, so it can live in a `BinaryHeap`.
#[derive(Debug, Clone, Copy)]
struct Reading(f64);

impl PartialEq for Reading {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Reading {}

impl PartialOrd for Reading {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Reading {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Final statistics for a consumed stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub count: u64,
    pub mean: f64,
    pub median: f64,
}

/// Running mean and median.
#[derive(Debug, Default)]
pub struct OnlineAggregator {
    count: u64,
    sum: f64,
    lower: BinaryHeap<Reading>,
    upper: BinaryHeap<Reverse<Reading>>,
}

impl OnlineAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;

        match self.lower.peek() {
            Some(top) if value > top.0 => self.upper.push(Reverse(Reading(value))),
            _ => self.lower.push(Reading(value)),
        }

        self.rebalance();
    }

    fn rebalance(&mut self) {
        while self.lower.len() > self.upper.len() + 1 {
            if let Some(v) = self.lower.pop() {
                self.upper.push(Reverse(v));
            }
        }
        while self.upper.len() > self.lower.len() {
            if let Some(Reverse(v)) = self.upper.pop() {
                self.lower.push(v);
            }
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    /// Median of everything pushed so far; 0.0 when empty.
    pub fn median(&self) -> f64 {
        match (self.lower.peek(), self.upper.peek()) {
            (None, _) => 0.0,
            (Some(lo), Some(Reverse(hi))) if self.lower.len() == self.upper.len() => {
                (lo.0 + hi.0) / 2.0
            }
            (Some(lo), _) => lo.0,
        }
    }

    /// Consumes the aggregator; `None` if nothing was pushed.
    pub fn finish(self) -> Option<Summary> {
        if self.count == 0 {
            return None;
        }
        Some(Summary {
            count: self.count,
            mean: self.mean(),
            median: self.median(),
        })
    }
}

impl Extend<f64> for OnlineAggregator {
    fn extend<I: IntoIterator<Item = f64>>(&mut self, iter: I) {
        for value in iter {
            self.push(value);
        }
    }
}
