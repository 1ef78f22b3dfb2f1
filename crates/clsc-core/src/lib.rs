//! # clsc-core: Closed-Loop Supply Chain Problem Data
//!
//! Deterministic data and stochastic inputs for the two-stage closed-loop
//! supply chain design problem solved by `clsc-algo`.
//!
//! ## Contents
//!
//! | Module | Provides |
//! |--------|----------|
//! | [`config`] | [`ClscConfig`]: economics, capacities, fixed and flow costs, demand density, master side constraints |
//! | [`facility`] | [`DcId`], [`RcId`], [`FacilityDecision`] and facility pins |
//! | [`scenario`] | [`Scenario`] triples, triangular parameters and the seeded [`ScenarioGenerator`] |
//! | [`error`] | [`ConfigError`] for input validation |
//!
//! Configuration is immutable once built and is passed by reference to every
//! solver component; there is no global state.
//!
//! ## Example
//!
//! ```
//! use clsc_core::{ClscConfigBuilder, DistributionParams, TriangularParams, generate_scenarios};
//!
//! let config = ClscConfigBuilder::new(1, 1, 2)
//!     .capacities(200.0, 100.0)
//!     .dc_fixed_costs(vec![1000.0])
//!     .rc_fixed_costs(vec![500.0])
//!     .build()?;
//!
//! let params = DistributionParams::new(
//!     TriangularParams::new(100.0, 150.0, 200.0),
//!     TriangularParams::new(20.0, 30.0, 40.0),
//!     TriangularParams::new(0.5, 0.7, 0.9),
//! );
//! let grid = generate_scenarios(&params, 2, 10, 42)?;
//! assert_eq!(grid.num_sets(), 2);
//! assert_eq!(config.num_customers(), 2);
//! # Ok::<(), clsc_core::ConfigError>(())
//! ```

pub mod config;
pub mod error;
pub mod facility;
pub mod scenario;

pub use config::{ClscConfig, ClscConfigBuilder, EconomicParams};
pub use error::ConfigError;
pub use facility::{DcId, FacilityDecision, FacilityPin, FacilityRef, FacilityState, RcId};
pub use scenario::{
    generate_scenarios, DistributionParams, Scenario, ScenarioGenerator, ScenarioGrid,
    TriangularParams,
};
