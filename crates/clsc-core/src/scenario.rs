//! Scenario triples and the SAA scenario generator.
//!
//! A scenario fixes the three uncertain quantities of the closed loop:
//! the market size, the quantity of returned products and the fraction of
//! those returns that can be remanufactured. Each is drawn independently from
//! a triangular-shaped distribution described by `(min, mode, max)`.
//!
//! ## Sampling formula
//!
//! Each variate is drawn as
//!
//! ```text
//! x = mode + sqrt(u1) · (min − mode + u2 · (max − min))
//! ```
//!
//! with two independent uniforms `u1, u2` on `[0, 1)`. This is the
//! two-uniform construction of Stein & Keblis (2009); it always lands in
//! `[min, max]` and is kept bit-for-bit, including the draw order (`u1`
//! before `u2`, market size before returns before recovery rate).

use crate::error::ConfigError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One sampled realization of the uncertain parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Total market size (upper bound on products sold)
    pub market_size: f64,
    /// Quantity of products returned by customers
    pub return_quantity: f64,
    /// Fraction of returns that can be remanufactured
    pub recovery_rate: f64,
}

impl Scenario {
    pub fn new(market_size: f64, return_quantity: f64, recovery_rate: f64) -> Self {
        Self {
            market_size,
            return_quantity,
            recovery_rate,
        }
    }

    /// Upper bound on remanufactured output in this scenario.
    pub fn remanufacturable(&self) -> f64 {
        self.recovery_rate * self.return_quantity
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[market={:.3} returns={:.3} recovery={:.4}]",
            self.market_size, self.return_quantity, self.recovery_rate
        )
    }
}

/// `(min, mode, max)` of a triangular distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TriangularParams {
    pub min: f64,
    pub mode: f64,
    pub max: f64,
}

impl TriangularParams {
    pub fn new(min: f64, mode: f64, max: f64) -> Self {
        Self { min, mode, max }
    }

    /// Degenerate distribution that always returns `value`.
    pub fn constant(value: f64) -> Self {
        Self::new(value, value, value)
    }

    fn validate(&self, name: &'static str) -> Result<(), ConfigError> {
        let ok = self.min.is_finite()
            && self.mode.is_finite()
            && self.max.is_finite()
            && self.min <= self.mode
            && self.mode <= self.max;
        if ok {
            Ok(())
        } else {
            Err(ConfigError::InvalidTriangular {
                name,
                min: self.min,
                mode: self.mode,
                max: self.max,
            })
        }
    }

    /// Map two uniforms to a variate.
    pub fn sample(&self, u1: f64, u2: f64) -> f64 {
        self.mode + u1.sqrt() * (self.min - self.mode + u2 * (self.max - self.min))
    }

    fn draw<R: Rng>(&self, rng: &mut R) -> f64 {
        let u1: f64 = rng.gen();
        let u2: f64 = rng.gen();
        self.sample(u1, u2)
    }
}

/// Distribution of all three scenario parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistributionParams {
    pub market_size: TriangularParams,
    pub return_quantity: TriangularParams,
    pub recovery_rate: TriangularParams,
}

impl DistributionParams {
    pub fn new(
        market_size: TriangularParams,
        return_quantity: TriangularParams,
        recovery_rate: TriangularParams,
    ) -> Self {
        Self {
            market_size,
            return_quantity,
            recovery_rate,
        }
    }

    /// Check finiteness, ordering and physical ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.market_size.validate("market_size")?;
        self.return_quantity.validate("return_quantity")?;
        self.recovery_rate.validate("recovery_rate")?;
        if self.market_size.min <= 0.0 {
            return Err(ConfigError::InvalidTriangular {
                name: "market_size",
                min: self.market_size.min,
                mode: self.market_size.mode,
                max: self.market_size.max,
            });
        }
        if self.return_quantity.min < 0.0 {
            return Err(ConfigError::InvalidTriangular {
                name: "return_quantity",
                min: self.return_quantity.min,
                mode: self.return_quantity.mode,
                max: self.return_quantity.max,
            });
        }
        if self.recovery_rate.min < 0.0 || self.recovery_rate.max > 1.0 {
            return Err(ConfigError::InvalidTriangular {
                name: "recovery_rate",
                min: self.recovery_rate.min,
                mode: self.recovery_rate.mode,
                max: self.recovery_rate.max,
            });
        }
        Ok(())
    }
}

/// `M` independent scenario sets of `N` scenarios each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioGrid {
    sets: Vec<Vec<Scenario>>,
}

impl ScenarioGrid {
    pub fn num_sets(&self) -> usize {
        self.sets.len()
    }

    /// Scenarios per set (zero for an empty grid).
    pub fn set_size(&self) -> usize {
        self.sets.first().map_or(0, Vec::len)
    }

    pub fn set(&self, index: usize) -> Option<&[Scenario]> {
        self.sets.get(index).map(Vec::as_slice)
    }

    pub fn sets(&self) -> impl Iterator<Item = &[Scenario]> {
        self.sets.iter().map(Vec::as_slice)
    }

    pub fn into_sets(self) -> Vec<Vec<Scenario>> {
        self.sets
    }
}

/// Seeded sampler producing scenario triples.
///
/// The same seed and parameters always yield the same sequence.
#[derive(Debug, Clone)]
pub struct ScenarioGenerator {
    params: DistributionParams,
    rng: StdRng,
}

impl ScenarioGenerator {
    /// Build a generator after validating the distribution.
    pub fn new(params: DistributionParams, seed: u64) -> Result<Self, ConfigError> {
        params.validate()?;
        Ok(Self {
            params,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn params(&self) -> &DistributionParams {
        &self.params
    }

    /// Draw one scenario.
    pub fn draw(&mut self) -> Scenario {
        let market_size = self.params.market_size.draw(&mut self.rng);
        let return_quantity = self.params.return_quantity.draw(&mut self.rng);
        let recovery_rate = self.params.recovery_rate.draw(&mut self.rng);
        Scenario::new(market_size, return_quantity, recovery_rate)
    }

    /// Draw one set of `n` scenarios.
    pub fn sample_set(&mut self, n: usize) -> Vec<Scenario> {
        (0..n).map(|_| self.draw()).collect()
    }

    /// Draw an `m × n` grid, row by row.
    pub fn generate(&mut self, m: usize, n: usize) -> ScenarioGrid {
        let sets = (0..m).map(|_| self.sample_set(n)).collect();
        ScenarioGrid { sets }
    }
}

/// Convenience wrapper: draw an `m × n` grid from a fresh seeded generator.
pub fn generate_scenarios(
    params: &DistributionParams,
    m: usize,
    n: usize,
    seed: u64,
) -> Result<ScenarioGrid, ConfigError> {
    Ok(ScenarioGenerator::new(*params, seed)?.generate(m, n))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example_params() -> DistributionParams {
        DistributionParams::new(
            TriangularParams::new(100.0, 150.0, 200.0),
            TriangularParams::new(20.0, 30.0, 40.0),
            TriangularParams::new(0.5, 0.7, 0.9),
        )
    }

    #[test]
    fn test_sample_formula_endpoints() {
        let t = TriangularParams::new(100.0, 150.0, 200.0);
        assert_eq!(t.sample(0.0, 0.3), 150.0);
        assert_eq!(t.sample(1.0, 0.0), 100.0);
        assert_eq!(t.sample(1.0, 1.0), 200.0);
        // mode + 0.5 * (100 - 150 + 0.25 * 100) = 137.5
        assert!((t.sample(0.25, 0.25) - 137.5).abs() < 1e-12);
    }

    #[test]
    fn test_single_triple_within_bounds() {
        let grid = generate_scenarios(&example_params(), 1, 1, 7).unwrap();
        assert_eq!(grid.num_sets(), 1);
        assert_eq!(grid.set_size(), 1);
        let s = grid.set(0).unwrap()[0];
        assert!((100.0..=200.0).contains(&s.market_size));
        assert!((20.0..=40.0).contains(&s.return_quantity));
        assert!((0.5..=0.9).contains(&s.recovery_rate));
    }

    #[test]
    fn test_same_seed_same_grid() {
        let a = generate_scenarios(&example_params(), 3, 4, 99).unwrap();
        let b = generate_scenarios(&example_params(), 3, 4, 99).unwrap();
        assert_eq!(a, b);
        let c = generate_scenarios(&example_params(), 3, 4, 100).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_constant_distribution() {
        let params = DistributionParams::new(
            TriangularParams::constant(120.0),
            TriangularParams::constant(25.0),
            TriangularParams::constant(0.6),
        );
        let mut generator = ScenarioGenerator::new(params, 1).unwrap();
        for s in generator.sample_set(5) {
            assert_eq!(s, Scenario::new(120.0, 25.0, 0.6));
        }
    }

    #[test]
    fn test_rejects_unordered_parameters() {
        let mut params = example_params();
        params.return_quantity = TriangularParams::new(30.0, 20.0, 40.0);
        assert!(matches!(
            ScenarioGenerator::new(params, 0),
            Err(ConfigError::InvalidTriangular {
                name: "return_quantity",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_recovery_rate_above_one() {
        let mut params = example_params();
        params.recovery_rate = TriangularParams::new(0.5, 0.9, 1.2);
        assert!(params.validate().is_err());
    }
}
