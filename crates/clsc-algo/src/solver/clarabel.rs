//! Clarabel backend for [`ConvexProgram`].
//!
//! Clarabel solves
//!
//! ```text
//! minimize    ½ xᵀPx + qᵀx
//! subject to  Ax + s = b,  s ∈ K
//! ```
//!
//! with `P` upper triangular. Equality rows go into a zero cone and `≤` rows
//! into the non-negative orthant, so rows are reordered (equalities first)
//! before assembly and the dual vector is mapped back afterwards.
//! A maximization is solved as the minimization of the negated objective.

use super::{ConvexProgram, ConvexSolver, ObjectiveSense, ProgramSolution, RowSense, SolveStatus};
use crate::error::SolverError;
use ::clarabel::algebra::CscMatrix;
use ::clarabel::solver::{
    DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus, SupportedConeT,
};

/// Interior-point backend; always available (pure Rust).
#[derive(Debug, Clone)]
pub struct ClarabelSolver {
    pub max_iter: u32,
    /// Wall-clock limit per solve in seconds
    pub time_limit: f64,
}

impl Default for ClarabelSolver {
    fn default() -> Self {
        Self {
            max_iter: 200,
            time_limit: f64::INFINITY,
        }
    }
}

impl ClarabelSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iter(mut self, max_iter: u32) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_time_limit(mut self, seconds: f64) -> Self {
        self.time_limit = seconds;
        self
    }
}

impl ConvexSolver for ClarabelSolver {
    fn id(&self) -> &str {
        "clarabel"
    }

    fn solve(&self, program: &ConvexProgram) -> Result<ProgramSolution, SolverError> {
        let n_var = program.num_vars();
        let n_row = program.num_rows();
        let sign = match program.sense() {
            ObjectiveSense::Minimize => 1.0,
            ObjectiveSense::Maximize => -1.0,
        };

        // Row permutation: equalities first, then inequalities.
        let mut order: Vec<usize> = Vec::with_capacity(n_row);
        order.extend((0..n_row).filter(|r| program.rows()[*r].sense == RowSense::Equal));
        let n_eq = order.len();
        order.extend((0..n_row).filter(|r| program.rows()[*r].sense == RowSense::LessEqual));

        // A, column-wise
        let mut columns: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n_var];
        let mut rhs = Vec::with_capacity(n_row);
        for (position, original) in order.iter().enumerate() {
            let row = &program.rows()[*original];
            for (var, coefficient) in &row.coefficients {
                columns[var.0].push((position, *coefficient));
            }
            rhs.push(row.rhs);
        }
        let a_mat = to_csc(n_row, columns);

        // P, upper triangle only
        let mut p_columns: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n_var];
        for (i, j, coefficient) in program.quadratic_terms() {
            let (r, c) = if i.0 <= j.0 { (i.0, j.0) } else { (j.0, i.0) };
            // ½·P_rr·x_r² for squares, P_rc·x_r·x_c off the diagonal
            let value = if r == c { 2.0 * coefficient } else { *coefficient };
            p_columns[c].push((r, sign * value));
        }
        let p_mat = to_csc(n_var, p_columns);

        let q: Vec<f64> = program.linear_objective().iter().map(|c| sign * c).collect();

        let mut cones: Vec<SupportedConeT<f64>> = Vec::new();
        if n_eq > 0 {
            cones.push(SupportedConeT::ZeroConeT(n_eq));
        }
        if n_row > n_eq {
            cones.push(SupportedConeT::NonnegativeConeT(n_row - n_eq));
        }

        let settings = DefaultSettingsBuilder::default()
            .verbose(false)
            .max_iter(self.max_iter)
            .time_limit(self.time_limit)
            .build()
            .map_err(|e| SolverError::Settings(format!("{:?}", e)))?;

        let mut solver = DefaultSolver::new(&p_mat, &q, &a_mat, &rhs, &cones, settings)
            .map_err(|e| SolverError::Setup(format!("{:?}", e)))?;
        solver.solve();
        let sol = solver.solution;

        // z back into model row order
        let mut z = vec![0.0; n_row];
        for (position, original) in order.iter().enumerate() {
            if let Some(value) = sol.z.get(position) {
                z[*original] = *value;
            }
        }

        let solution = match sol.status {
            SolverStatus::Solved | SolverStatus::AlmostSolved => {
                // Shadow price of the stated objective: z when maximizing, −z when minimizing.
                let duals = z.iter().map(|v| -sign * v).collect();
                ProgramSolution::optimal(sign * sol.obj_val, sol.x.clone(), duals)
            }
            SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => {
                ProgramSolution::infeasible(z)
            }
            SolverStatus::DualInfeasible | SolverStatus::AlmostDualInfeasible => {
                ProgramSolution::unusable(SolveStatus::Unbounded, format!("{:?}", sol.status))
            }
            other => ProgramSolution::unusable(SolveStatus::Other, format!("{:?}", other)),
        };
        Ok(solution.with_iterations(sol.iterations))
    }
}

/// Assemble per-column entries into CSC, summing duplicates.
fn to_csc(n_rows: usize, mut columns: Vec<Vec<(usize, f64)>>) -> CscMatrix<f64> {
    let n_cols = columns.len();
    let mut col_ptr = Vec::with_capacity(n_cols + 1);
    let mut row_idx = Vec::new();
    let mut values = Vec::new();

    for column in columns.iter_mut() {
        col_ptr.push(row_idx.len());
        column.sort_by_key(|(r, _)| *r);
        for &(r, v) in column.iter() {
            if row_idx.len() > *col_ptr.last().unwrap_or(&0) && row_idx.last() == Some(&r) {
                if let Some(last) = values.last_mut() {
                    *last += v;
                }
            } else {
                row_idx.push(r);
                values.push(v);
            }
        }
    }
    col_ptr.push(row_idx.len());

    CscMatrix::new(n_rows, n_cols, col_ptr, row_idx, values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::RowId;

    #[test]
    fn test_clarabel_id() {
        assert_eq!(ClarabelSolver::new().id(), "clarabel");
    }

    #[test]
    fn test_concave_quadratic_with_shadow_price() {
        // max 10x − x²  s.t. x ≤ 3  → x = 3, obj = 21, shadow price 10 − 2·3 = 4
        let mut program = ConvexProgram::new(ObjectiveSense::Maximize);
        let x = program.add_nonnegative_var("x", 10.0);
        program.add_quadratic(x, x, -1.0);
        let cap = program.add_row("cap", vec![(x, 1.0)], RowSense::LessEqual, 3.0);

        let solution = ClarabelSolver::new().solve(&program).unwrap();
        assert_eq!(solution.status, SolveStatus::Optimal);
        assert!((solution.value(x) - 3.0).abs() < 1e-5);
        assert!((solution.objective - 21.0).abs() < 1e-5);
        assert!((solution.dual(cap).unwrap() - 4.0).abs() < 1e-4);
    }

    #[test]
    fn test_equality_rows_reordered() {
        // min x + 2y  s.t. x + y = 4, y ≥ 1 (as −y ≤ −1), x ≥ 0
        let mut program = ConvexProgram::new(ObjectiveSense::Minimize);
        let x = program.add_nonnegative_var("x", 1.0);
        let y = program.add_var("y", 2.0);
        let floor = program.add_row("floor", vec![(y, -1.0)], RowSense::LessEqual, -1.0);
        let total = program.add_row("total", vec![(x, 1.0), (y, 1.0)], RowSense::Equal, 4.0);

        let solution = ClarabelSolver::new().solve(&program).unwrap();
        assert!(solution.is_optimal());
        assert!((solution.value(x) - 3.0).abs() < 1e-5);
        assert!((solution.value(y) - 1.0).abs() < 1e-5);
        assert!((solution.objective - 5.0).abs() < 1e-5);
        // one more unit of total is served by x at cost 1
        assert!((solution.dual(total).unwrap() - 1.0).abs() < 1e-4);
        // raising −y ≤ −1 to −y ≤ 0 lets y fall, saving 2 − 1 = 1
        assert!((solution.dual(floor).unwrap() + 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_infeasible_rows_give_certificate() {
        // x ≤ 1 and x = 2
        let mut program = ConvexProgram::new(ObjectiveSense::Maximize);
        let x = program.add_var("x", 0.0);
        let cap = program.add_row("cap", vec![(x, 1.0)], RowSense::LessEqual, 1.0);
        let fix = program.add_row("fix", vec![(x, 1.0)], RowSense::Equal, 2.0);

        let solution = ClarabelSolver::new().solve(&program).unwrap();
        assert_eq!(solution.status, SolveStatus::Infeasible);
        let ray = solution.certificate(&[cap, fix]).unwrap();
        // Aᵀc = 0 and bᵀc < 0
        assert!((ray[0] + ray[1]).abs() < 1e-6 * ray[0].abs().max(1.0));
        assert!(ray[0] > 0.0);
        assert!(1.0 * ray[0] + 2.0 * ray[1] < 0.0);
        assert!(solution.duals(&[RowId(0)]).is_err());
    }
}
