//! # clsc-algo: Benders Decomposition for Closed-Loop Supply Chain Design
//!
//! Chooses which distribution centers (DCs) and return centers (RCs) to open
//! when market size, return quantity and recovery rate are uncertain. The
//! two-stage problem is solved per scenario set by Benders decomposition and
//! validated by sample average approximation (SAA).
//!
//! ## Architecture
//!
//! | Module | Role | Problem Class |
//! |--------|------|---------------|
//! | [`master`] | Facility selection with lazy cuts ([`BranchAndBound`]) | Mixed-integer linear |
//! | [`subproblem`] | Pricing and flows for one scenario and fixed facilities | Concave quadratic |
//! | [`cut`] | Optimality and feasibility cuts from duals and rays | Linear algebra |
//! | [`benders`] | Lazy-constraint callback and the decomposition driver | |
//! | [`saa`] | Replications, out-of-sample selection, disposal sweeps | Statistics |
//!
//! Both solver seams are traits so the decomposition can be driven by test
//! doubles or alternative backends:
//!
//! - **[`solver::ConvexSolver`]**: solves a [`solver::ConvexProgram`] and
//!   returns duals or an infeasibility certificate
//!   ([`solver::ClarabelSolver`] is the default)
//! - **[`master::MipSolver`]**: runs the master search and consults a callback
//!   at every integer incumbent
//!
//! ## Example
//!
//! ```ignore
//! use clsc_algo::{run_saa, SaaSettings};
//! use clsc_core::{ClscConfig, DistributionParams, TriangularParams};
//!
//! let config = ClscConfig::load("network.yaml".as_ref())?;
//! let params = DistributionParams::new(
//!     TriangularParams::new(100.0, 150.0, 200.0),
//!     TriangularParams::new(20.0, 30.0, 40.0),
//!     TriangularParams::new(0.5, 0.7, 0.9),
//! );
//! let settings = SaaSettings { replications: 10, sample_size: 20, ..Default::default() };
//!
//! let report = run_saa(&config, &params, &settings)?;
//! println!("{}", report.summary());
//! ```

pub mod benders;
pub mod cut;
pub mod error;
pub mod master;
pub mod saa;
pub mod solution;
pub mod solver;
pub mod stats;
pub mod subproblem;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use benders::{
    run_decomposition, run_decomposition_with, AcceptedIncumbent, BendersCallback,
    BendersSettings,
};
pub use cut::{Cut, CutAggregator, CutKind, DualSnapshot, InfeasibilityRay};
pub use error::{BendersError, SolverError};
pub use master::{
    BranchAndBound, Incumbent, LazyAction, MasterModel, MasterOutcome, MasterStatus, MipSolver,
};
pub use saa::{
    distinct_configurations, evaluate_decision, run_disposal_sweep, run_saa, run_saa_with,
    ConfigurationEstimate, EvaluationOptions, OutOfSampleSelection, Replication, SaaReport,
    SaaSettings, SweepPoint,
};
pub use solution::{CandidateSolution, FlowPlan};
pub use solver::{ClarabelSolver, ConvexProgram, ConvexSolver, ProgramSolution, SolveStatus};
pub use stats::SampleStatistics;
pub use subproblem::{profit_upper_bound, Product, Subproblem, SubproblemOutcome};
