//! Running mean / variance accumulator for SAA estimates.

use serde::{Deserialize, Serialize};

/// Welford accumulator over a stream of profits.
///
/// `variance_of_mean` is `Σ(x − mean)² / (n(n − 1))`, the variance of the
/// sample mean, and is zero for fewer than two observations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleStatistics {
    count: usize,
    mean: f64,
    /// Sum of squared deviations from the running mean
    m2: f64,
}

impl SampleStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values<I: IntoIterator<Item = f64>>(values: I) -> Self {
        let mut stats = Self::new();
        for value in values {
            stats.push(value);
        }
        stats
    }

    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    /// Combine two disjoint samples (Chan et al. pairwise update).
    pub fn merge(&self, other: &Self) -> Self {
        if self.count == 0 {
            return *other;
        }
        if other.count == 0 {
            return *self;
        }
        let count = self.count + other.count;
        let delta = other.mean - self.mean;
        let mean = self.mean + delta * other.count as f64 / count as f64;
        let m2 = self.m2
            + other.m2
            + delta * delta * (self.count as f64 * other.count as f64) / count as f64;
        Self { count, mean, m2 }
    }

    /// Same spread with the mean moved by `delta`.
    pub fn shifted(&self, delta: f64) -> Self {
        Self {
            mean: self.mean + delta,
            ..*self
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Sample mean (zero when empty).
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Unbiased sample variance `Σ(x − mean)² / (n − 1)`.
    pub fn sample_variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn variance_of_mean(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count as f64 * (self.count - 1) as f64)
        }
    }
}
