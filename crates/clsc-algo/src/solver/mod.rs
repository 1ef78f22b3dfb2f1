//! Convex program model and the solver capability used by the subproblems.
//!
//! Subproblems are written against a small, backend-neutral model:
//! named variables, a linear objective with optional quadratic terms, and
//! linear rows that are either `≤` or `=`. A [`ConvexSolver`] takes the model
//! and returns primal values, one shadow price per row, or a Farkas
//! certificate when the rows are inconsistent.
//!
//! ## Dual sign convention
//!
//! Every backend reports duals as shadow prices: `duals[r]` is the rate of
//! change of the optimal objective (in the model's own sense) when the
//! right-hand side of row `r` increases. For a maximization with a `≤` row
//! the dual is therefore non-negative, and a bounding cut can be written
//! directly as `Σ rhs(y) · dual`.
//!
//! Farkas certificates `c` satisfy `Aᵀc = 0` (over rows in model order),
//! `c ≥ 0` on `≤` rows and `bᵀc < 0`. Changing the right-hand sides to some
//! `b'` with `b'ᵀc < 0` keeps the rows inconsistent, which is what a
//! feasibility cut excludes.

pub mod clarabel;

pub use self::clarabel::ClarabelSolver;

use crate::error::SolverError;
use serde::{Deserialize, Serialize};

/// Variable handle inside a [`ConvexProgram`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub usize);

/// Row handle inside a [`ConvexProgram`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectiveSense {
    Minimize,
    Maximize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowSense {
    /// `Σ a·x ≤ b`
    LessEqual,
    /// `Σ a·x = b`
    Equal,
}

/// One linear row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub name: String,
    pub coefficients: Vec<(VarId, f64)>,
    pub sense: RowSense,
    pub rhs: f64,
}

/// Convex quadratic program over linear rows.
///
/// The objective is `Σ c_v·x_v + Σ a·x_i·x_j` over the registered linear and
/// quadratic terms. It must be concave for `Maximize` and convex for
/// `Minimize`; backends do not check this.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvexProgram {
    sense: ObjectiveSense,
    var_names: Vec<String>,
    linear: Vec<f64>,
    quadratic: Vec<(VarId, VarId, f64)>,
    rows: Vec<Row>,
}

impl ConvexProgram {
    pub fn new(sense: ObjectiveSense) -> Self {
        Self {
            sense,
            var_names: Vec::new(),
            linear: Vec::new(),
            quadratic: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn sense(&self) -> ObjectiveSense {
        self.sense
    }

    /// Add a free variable with a linear objective coefficient.
    pub fn add_var(&mut self, name: impl Into<String>, objective: f64) -> VarId {
        let id = VarId(self.var_names.len());
        self.var_names.push(name.into());
        self.linear.push(objective);
        id
    }

    /// Add a variable together with an explicit `−x ≤ 0` row.
    pub fn add_nonnegative_var(&mut self, name: impl Into<String>, objective: f64) -> VarId {
        let name = name.into();
        let id = self.add_var(name.clone(), objective);
        self.add_row(format!("nonneg_{}", name), vec![(id, -1.0)], RowSense::LessEqual, 0.0);
        id
    }

    /// Add the objective term `coefficient · x_i · x_j` (`i == j` for squares).
    pub fn add_quadratic(&mut self, i: VarId, j: VarId, coefficient: f64) {
        self.quadratic.push((i, j, coefficient));
    }

    pub fn add_row(
        &mut self,
        name: impl Into<String>,
        coefficients: Vec<(VarId, f64)>,
        sense: RowSense,
        rhs: f64,
    ) -> RowId {
        let id = RowId(self.rows.len());
        self.rows.push(Row {
            name: name.into(),
            coefficients,
            sense,
            rhs,
        });
        id
    }

    /// Replace the right-hand side of an existing row.
    pub fn set_bound(&mut self, row: RowId, rhs: f64) -> Result<(), SolverError> {
        let slot = self
            .rows
            .get_mut(row.0)
            .ok_or(SolverError::RowOutOfRange(row.0))?;
        slot.rhs = rhs;
        Ok(())
    }

    pub fn num_vars(&self) -> usize {
        self.var_names.len()
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, id: RowId) -> Option<&Row> {
        self.rows.get(id.0)
    }

    pub fn var_name(&self, id: VarId) -> Option<&str> {
        self.var_names.get(id.0).map(String::as_str)
    }

    pub fn linear_objective(&self) -> &[f64] {
        &self.linear
    }

    pub fn quadratic_terms(&self) -> &[(VarId, VarId, f64)] {
        &self.quadratic
    }

    /// Objective value at a point.
    pub fn objective_at(&self, x: &[f64]) -> f64 {
        let linear: f64 = self.linear.iter().zip(x).map(|(c, v)| c * v).sum();
        let quadratic: f64 = self
            .quadratic
            .iter()
            .map(|(i, j, a)| a * x[i.0] * x[j.0])
            .sum();
        linear + quadratic
    }

    /// Largest violation of any row at a point (zero when feasible).
    pub fn max_violation(&self, x: &[f64]) -> f64 {
        self.rows
            .iter()
            .map(|row| {
                let lhs: f64 = row.coefficients.iter().map(|(v, a)| a * x[v.0]).sum();
                match row.sense {
                    RowSense::LessEqual => (lhs - row.rhs).max(0.0),
                    RowSense::Equal => (lhs - row.rhs).abs(),
                }
            })
            .fold(0.0, f64::max)
    }
}

/// Outcome class of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveStatus {
    Optimal,
    Infeasible,
    Unbounded,
    /// Iteration/time limit, numerical trouble or anything else unusable
    Other,
}

/// Result of one solve.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramSolution {
    pub status: SolveStatus,
    /// Objective in the model's own sense (meaningful only when optimal)
    pub objective: f64,
    pub iterations: u32,
    /// Backend-specific status text for diagnostics
    pub detail: String,
    primal: Vec<f64>,
    duals: Vec<f64>,
    certificate: Vec<f64>,
}

impl ProgramSolution {
    pub fn optimal(objective: f64, primal: Vec<f64>, duals: Vec<f64>) -> Self {
        Self {
            status: SolveStatus::Optimal,
            objective,
            iterations: 0,
            detail: "optimal".to_string(),
            primal,
            duals,
            certificate: Vec::new(),
        }
    }

    pub fn infeasible(certificate: Vec<f64>) -> Self {
        Self {
            status: SolveStatus::Infeasible,
            objective: f64::NAN,
            iterations: 0,
            detail: "infeasible".to_string(),
            primal: Vec::new(),
            duals: Vec::new(),
            certificate,
        }
    }

    /// A solve with nothing usable (unbounded, limit hit, numerical failure).
    pub fn unusable(status: SolveStatus, detail: impl Into<String>) -> Self {
        Self {
            status,
            objective: f64::NAN,
            iterations: 0,
            detail: detail.into(),
            primal: Vec::new(),
            duals: Vec::new(),
            certificate: Vec::new(),
        }
    }

    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn is_optimal(&self) -> bool {
        self.status == SolveStatus::Optimal
    }

    pub fn primal(&self) -> &[f64] {
        &self.primal
    }

    /// Primal value of one variable (zero if the solve produced none).
    pub fn value(&self, var: VarId) -> f64 {
        self.primal.get(var.0).copied().unwrap_or(0.0)
    }

    pub fn values(&self, vars: &[VarId]) -> Vec<f64> {
        vars.iter().map(|v| self.value(*v)).collect()
    }

    /// Shadow prices of the requested rows.
    pub fn duals(&self, rows: &[RowId]) -> Result<Vec<f64>, SolverError> {
        if !self.is_optimal() {
            return Err(SolverError::NotAvailable {
                what: "duals",
                status: self.status,
            });
        }
        gather(&self.duals, rows)
    }

    pub fn dual(&self, row: RowId) -> Result<f64, SolverError> {
        Ok(self.duals(&[row])?[0])
    }

    /// Farkas certificate entries of the requested rows.
    pub fn certificate(&self, rows: &[RowId]) -> Result<Vec<f64>, SolverError> {
        if self.status != SolveStatus::Infeasible {
            return Err(SolverError::NotAvailable {
                what: "certificate",
                status: self.status,
            });
        }
        gather(&self.certificate, rows)
    }
}

fn gather(values: &[f64], rows: &[RowId]) -> Result<Vec<f64>, SolverError> {
    rows.iter()
        .map(|r| values.get(r.0).copied().ok_or(SolverError::RowOutOfRange(r.0)))
        .collect()
}

/// Backend able to solve a [`ConvexProgram`].
///
/// Implementations must be shareable across threads so scenario subproblems
/// can be solved concurrently.
pub trait ConvexSolver: Send + Sync {
    /// Short identifier used in diagnostics.
    fn id(&self) -> &str;

    /// Solve the program. `Err` is reserved for backend failures; an
    /// infeasible or unbounded model is reported through the status.
    fn solve(&self, program: &ConvexProgram) -> Result<ProgramSolution, SolverError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonnegative_var_adds_row() {
        let mut program = ConvexProgram::new(ObjectiveSense::Maximize);
        let x = program.add_nonnegative_var("x", 1.0);
        assert_eq!(program.num_vars(), 1);
        assert_eq!(program.num_rows(), 1);
        let row = program.row(RowId(0)).unwrap();
        assert_eq!(row.name, "nonneg_x");
        assert_eq!(row.coefficients, vec![(x, -1.0)]);
    }

    #[test]
    fn test_set_bound_out_of_range() {
        let mut program = ConvexProgram::new(ObjectiveSense::Minimize);
        assert_eq!(
            program.set_bound(RowId(3), 1.0),
            Err(SolverError::RowOutOfRange(3))
        );
    }

    #[test]
    fn test_objective_and_violation() {
        let mut program = ConvexProgram::new(ObjectiveSense::Maximize);
        let x = program.add_var("x", 3.0);
        let y = program.add_var("y", 1.0);
        program.add_quadratic(x, x, -1.0);
        program.add_quadratic(x, y, 2.0);
        program.add_row("cap", vec![(x, 1.0), (y, 1.0)], RowSense::LessEqual, 2.0);
        program.add_row("fix", vec![(y, 1.0)], RowSense::Equal, 1.0);

        // 3·1 + 1·1 − 1 + 2·1 = 5
        assert_eq!(program.objective_at(&[1.0, 1.0]), 5.0);
        assert_eq!(program.max_violation(&[1.0, 1.0]), 0.0);
        assert_eq!(program.max_violation(&[2.0, 0.5]), 0.5);
    }

    #[test]
    fn test_duals_require_optimal_status() {
        let solution = ProgramSolution::infeasible(vec![1.0, -1.0]);
        assert!(matches!(
            solution.duals(&[RowId(0)]),
            Err(SolverError::NotAvailable { what: "duals", .. })
        ));
        assert_eq!(
            solution.certificate(&[RowId(1), RowId(0)]).unwrap(),
            vec![-1.0, 1.0]
        );
    }
}
