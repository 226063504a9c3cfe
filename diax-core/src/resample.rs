//! Bucket raw samples onto the grid.
//!
//! Grid point `g[i]` owns the right-closed bucket `(g[i] - p, g[i]]`.
//! `mean` and `sum` skip missing raw values, and a bucket with no usable
//! value is missing (a `sum` over nothing is not zero). `ffill` takes the
//! bucket's last raw sample as is, so a trailing missing value wins.

use crate::grid::Grid;
use crate::policy::AggregationRule;
use crate::signal::Signal;

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    sum: f64,
    count: usize,
    /// Value of the latest sample, missing or not. `None` until one arrives.
    last: Option<Option<f64>>,
}

impl Bucket {
    fn push(&mut self, value: Option<f64>) {
        self.last = Some(value);
        if let Some(v) = value {
            self.sum += v;
            self.count += 1;
        }
    }

    fn finish(&self, rule: AggregationRule) -> Option<f64> {
        match rule {
            AggregationRule::CarryForward => self.last.flatten(),
            _ if self.count == 0 => None,
            AggregationRule::Mean => Some(self.sum / self.count as f64),
            AggregationRule::Sum => Some(self.sum),
        }
    }
}

/// Resample `signal` onto `grid`. The output has exactly `grid.len()` slots.
pub fn resample(signal: &Signal, rule: AggregationRule, grid: &Grid) -> Vec<Option<f64>> {
    let mut buckets = vec![Bucket::default(); grid.len()];

    for sample in signal.samples() {
        if let Some(index) = grid.bucket_of(sample.time) {
            buckets[index].push(sample.value);
        }
    }

    buckets.iter().map(|b| b.finish(rule)).collect()
}
