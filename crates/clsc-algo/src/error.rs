//! Error types for the solver interface and the decomposition engine.

use crate::solver::SolveStatus;
use clsc_core::ConfigError;
use thiserror::Error;

/// Errors raised by a solver backend or by querying its results.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    /// Backend rejected its settings.
    #[error("solver settings rejected: {0}")]
    Settings(String),

    /// Backend could not be set up for the model (bad matrix, cone mismatch).
    #[error("solver setup failed: {0}")]
    Setup(String),

    /// Duals or certificates requested for a solve that does not provide them.
    #[error("{what} requested but solve status is {status:?}")]
    NotAvailable {
        what: &'static str,
        status: SolveStatus,
    },

    /// Row index outside the model.
    #[error("row {0} is out of range")]
    RowOutOfRange(usize),

    /// Any other backend failure.
    #[error("backend failure: {0}")]
    Backend(String),
}

/// Errors raised while running a decomposition or the SAA loop.
#[derive(Debug, Error)]
pub enum BendersError {
    /// Input data failed validation before the run started.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The solver backend failed outside a callback.
    #[error(transparent)]
    Solver(#[from] SolverError),

    /// A decomposition was requested without scenarios.
    #[error("scenario set is empty")]
    NoScenarios,

    /// SAA sample sizes are unusable.
    #[error("SAA needs M >= 1 and N >= 1 (got M={m}, N={n})")]
    InvalidSampleSize { m: usize, n: usize },

    /// The master search ended without accepting any incumbent.
    #[error("master problem has no feasible facility configuration")]
    MasterInfeasible,

    /// The node limit stopped the search before any incumbent was accepted.
    #[error("node limit of {0} reached before any incumbent was accepted")]
    NodeLimit(usize),

    /// A subproblem with a fixed configuration did not solve to optimality.
    #[error("evaluation of {decision} failed: subproblem status {status:?}")]
    Evaluation {
        decision: String,
        status: SolveStatus,
    },
}
