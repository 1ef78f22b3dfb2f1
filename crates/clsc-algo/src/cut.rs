//! Dual snapshots and Benders cut synthesis.
//!
//! Every callback invocation solves one subproblem per scenario and keeps a
//! fresh [`DualSnapshot`] per scenario: the shadow prices of the rows whose
//! right-hand side is non-zero (capacity, supply, return balance) and the
//! realized production quantities. The [`CutAggregator`] turns those records
//! into one inequality over the master variables and drops them.
//!
//! ## Optimality cut
//!
//! For a concave QP `max cᵀx + xᵀMx s.t. Ax ≤ b`, Lagrangian duality at the
//! optimum `(x*, z*)` gives, for every right-hand side `b'`,
//!
//! ```text
//! v(b') ≤ b'ᵀz* − x*ᵀMx*
//! ```
//!
//! Only the supply rows depend on the facility decision, so averaging over
//! scenarios yields
//!
//! ```text
//! θ ≤ (1/|S|) Σ_s [ Σ cap_dual·cap_rhs + Σ ret_dual·ret_rhs + I_s(q_n² + 2d·q_n·q_r + d·q_r²)
//!                   + Σ_i useDC_i · Σ_j (dc_new_dual·cap_new + dc_reman_dual·cap_reman)
//!                   + Σ_k useRC_k · Σ_j rc_dual·returns_s ]
//! ```
//!
//! ## Feasibility cut
//!
//! A Farkas ray `r` of an infeasible scenario proves `b(y)ᵀr < 0`; any
//! decision that can be feasible has `b(y)ᵀr ≥ 0`, which is linear in `y`.

use clsc_core::{ClscConfig, DcId, FacilityDecision, RcId, Scenario};
use serde::{Deserialize, Serialize};

/// Capacity row order: manufacturing, remanufacturing, market size, recoverable returns.
pub const CAPACITY_ROWS: usize = 4;

/// Right-hand sides of the four capacity rows under a scenario.
pub fn capacity_rhs(config: &ClscConfig, scenario: &Scenario) -> [f64; CAPACITY_ROWS] {
    [
        config.manufacturing_capacity,
        config.remanufacturing_capacity,
        scenario.market_size,
        scenario.remanufacturable(),
    ]
}

/// One value per decision-dependent or non-zero-RHS row of a subproblem.
///
/// Holds duals for an optimal solve and the Farkas ray for an infeasible one.
#[derive(Debug, Clone, PartialEq)]
pub struct RowValues {
    pub capacity: [f64; CAPACITY_ROWS],
    /// DC supply rows for new units, `[dc][customer]`
    pub dc_supply_new: Vec<Vec<f64>>,
    /// DC supply rows for remanufactured units, `[dc][customer]`
    pub dc_supply_reman: Vec<Vec<f64>>,
    /// RC supply rows, `[customer][rc]`
    pub rc_supply: Vec<Vec<f64>>,
    /// Return balance rows, per customer
    pub return_balance: Vec<f64>,
}

impl RowValues {
    /// All-zero values shaped for a configuration.
    pub fn zeros(config: &ClscConfig) -> Self {
        let n_cust = config.num_customers();
        Self {
            capacity: [0.0; CAPACITY_ROWS],
            dc_supply_new: vec![vec![0.0; n_cust]; config.num_dcs()],
            dc_supply_reman: vec![vec![0.0; n_cust]; config.num_dcs()],
            rc_supply: vec![vec![0.0; config.num_rcs()]; n_cust],
            return_balance: vec![0.0; n_cust],
        }
    }
}

/// Per-scenario dual record of one optimal subproblem solve.
#[derive(Debug, Clone, PartialEq)]
pub struct DualSnapshot {
    pub scenario: Scenario,
    pub manufactured: f64,
    pub remanufactured: f64,
    pub duals: RowValues,
}

/// Farkas ray of one infeasible subproblem.
#[derive(Debug, Clone, PartialEq)]
pub struct InfeasibilityRay {
    pub scenario: Scenario,
    pub ray: RowValues,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CutKind {
    /// `θ ≤ constant + Σ dc·useDC + Σ rc·useRC`
    Optimality,
    /// `0 ≤ constant + Σ dc·useDC + Σ rc·useRC`
    Feasibility,
}

/// Linear inequality over the master variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cut {
    pub kind: CutKind,
    pub constant: f64,
    pub dc_coefficients: Vec<f64>,
    pub rc_coefficients: Vec<f64>,
}

impl Cut {
    /// Coefficient of the surrogate profit on the left-hand side.
    pub fn theta_coefficient(&self) -> f64 {
        match self.kind {
            CutKind::Optimality => 1.0,
            CutKind::Feasibility => 0.0,
        }
    }

    /// Right-hand side at (possibly fractional) master values.
    pub fn bound_at_values(&self, dc_values: &[f64], rc_values: &[f64]) -> f64 {
        let dc: f64 = self
            .dc_coefficients
            .iter()
            .zip(dc_values)
            .map(|(a, y)| a * y)
            .sum();
        let rc: f64 = self
            .rc_coefficients
            .iter()
            .zip(rc_values)
            .map(|(a, y)| a * y)
            .sum();
        self.constant + dc + rc
    }

    /// Right-hand side at a facility decision.
    pub fn bound_at(&self, decision: &FacilityDecision) -> f64 {
        self.bound_at_values(&decision.dc_values(), &decision.rc_values())
    }

    /// Whether `(θ, decision)` satisfies the cut within `tolerance`.
    pub fn is_satisfied(
        &self,
        estimated_profit: f64,
        decision: &FacilityDecision,
        tolerance: f64,
    ) -> bool {
        self.theta_coefficient() * estimated_profit <= self.bound_at(decision) + tolerance
    }

    pub fn dc_coefficient(&self, dc: DcId) -> f64 {
        self.dc_coefficients.get(dc.0).copied().unwrap_or(0.0)
    }

    pub fn rc_coefficient(&self, rc: RcId) -> f64 {
        self.rc_coefficients.get(rc.0).copied().unwrap_or(0.0)
    }
}

/// `b(y)ᵀv` split into its constant part and per-facility coefficients.
struct RhsExpression {
    constant: f64,
    dc: Vec<f64>,
    rc: Vec<f64>,
}

/// Builds cuts from per-scenario snapshots.
pub struct CutAggregator<'a> {
    config: &'a ClscConfig,
}

impl<'a> CutAggregator<'a> {
    pub fn new(config: &'a ClscConfig) -> Self {
        Self { config }
    }

    /// Revenue curvature `I(q_n² + 2d·q_n·q_r + d·q_r²)` at the realized quantities.
    pub fn curvature(&self, snapshot: &DualSnapshot) -> f64 {
        let econ = &self.config.economics;
        let slope = econ.price_slope(snapshot.scenario.market_size);
        let d = econ.reman_depreciation;
        let (qn, qr) = (snapshot.manufactured, snapshot.remanufactured);
        slope * (qn * qn + 2.0 * d * qn * qr + d * qr * qr)
    }

    /// Average of the per-scenario dual bounds.
    pub fn optimality_cut(&self, snapshots: &[DualSnapshot]) -> Cut {
        let mut constant = 0.0;
        let mut dc = vec![0.0; self.config.num_dcs()];
        let mut rc = vec![0.0; self.config.num_rcs()];

        // Sequential fold in scenario order.
        for snapshot in snapshots {
            let expr = self.rhs_expression(&snapshot.scenario, &snapshot.duals);
            constant += expr.constant + self.curvature(snapshot);
            for (total, a) in dc.iter_mut().zip(&expr.dc) {
                *total += a;
            }
            for (total, a) in rc.iter_mut().zip(&expr.rc) {
                *total += a;
            }
        }

        let n = snapshots.len().max(1) as f64;
        Cut {
            kind: CutKind::Optimality,
            constant: constant / n,
            dc_coefficients: dc.into_iter().map(|a| a / n).collect(),
            rc_coefficients: rc.into_iter().map(|a| a / n).collect(),
        }
    }

    /// `b(y)ᵀr ≥ 0`, scaled so the largest coefficient has magnitude one.
    pub fn feasibility_cut(&self, ray: &InfeasibilityRay) -> Cut {
        let expr = self.rhs_expression(&ray.scenario, &ray.ray);
        let scale = expr
            .dc
            .iter()
            .chain(&expr.rc)
            .chain(std::iter::once(&expr.constant))
            .fold(0.0_f64, |m, a| m.max(a.abs()));
        let scale = if scale > 0.0 { scale } else { 1.0 };
        Cut {
            kind: CutKind::Feasibility,
            constant: expr.constant / scale,
            dc_coefficients: expr.dc.into_iter().map(|a| a / scale).collect(),
            rc_coefficients: expr.rc.into_iter().map(|a| a / scale).collect(),
        }
    }

    fn rhs_expression(&self, scenario: &Scenario, values: &RowValues) -> RhsExpression {
        let config = self.config;
        let caps = capacity_rhs(config, scenario);
        let mut constant: f64 = values.capacity.iter().zip(caps).map(|(v, b)| v * b).sum();
        constant += values
            .return_balance
            .iter()
            .zip(&config.demand_density)
            .map(|(v, share)| v * scenario.return_quantity * share)
            .sum::<f64>();

        let dc = values
            .dc_supply_new
            .iter()
            .zip(&values.dc_supply_reman)
            .map(|(new, reman)| {
                new.iter().sum::<f64>() * config.manufacturing_capacity
                    + reman.iter().sum::<f64>() * config.remanufacturing_capacity
            })
            .collect();

        let mut rc = vec![0.0; config.num_rcs()];
        for row in &values.rc_supply {
            for (total, v) in rc.iter_mut().zip(row) {
                *total += v * scenario.return_quantity;
            }
        }

        RhsExpression { constant, dc, rc }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clsc_core::ClscConfigBuilder;

    fn config() -> ClscConfig {
        ClscConfigBuilder::new(2, 1, 2)
            .capacities(200.0, 100.0)
            .dc_fixed_costs(vec![10.0, 20.0])
            .rc_fixed_costs(vec![5.0])
            .build()
            .unwrap()
    }

    fn snapshot(config: &ClscConfig, scenario: Scenario) -> DualSnapshot {
        let mut duals = RowValues::zeros(config);
        duals.capacity = [1.0, 0.0, 0.5, 2.0];
        duals.dc_supply_new[0] = vec![0.25, 0.25];
        duals.dc_supply_reman[1] = vec![1.0, 0.0];
        duals.rc_supply[0][0] = 3.0;
        duals.return_balance = vec![-1.0, 4.0];
        DualSnapshot {
            scenario,
            manufactured: 10.0,
            remanufactured: 0.0,
            duals,
        }
    }

    #[test]
    fn test_single_scenario_cut_coefficients() {
        let config = config();
        let scenario = Scenario::new(230.0, 40.0, 0.5);
        let cut = CutAggregator::new(&config).optimality_cut(&[snapshot(&config, scenario)]);

        // capacity: 1·200 + 0·100 + 0.5·230 + 2·20 = 355
        // returns:  −1·40·0.5 + 4·40·0.5 = 60
        // curvature: slope 1 · 10² = 100
        assert!((cut.constant - 515.0).abs() < 1e-9);
        assert_eq!(cut.dc_coefficients, vec![100.0, 100.0]);
        assert_eq!(cut.rc_coefficients, vec![120.0]);
        assert_eq!(cut.kind, CutKind::Optimality);
    }

    #[test]
    fn test_cut_averages_scenarios() {
        let config = config();
        let a = snapshot(&config, Scenario::new(230.0, 40.0, 0.5));
        let mut b = a.clone();
        b.duals = RowValues::zeros(&config);
        b.manufactured = 0.0;
        let cut = CutAggregator::new(&config).optimality_cut(&[a, b]);
        assert!((cut.constant - 257.5).abs() < 1e-9);
        assert_eq!(cut.dc_coefficients, vec![50.0, 50.0]);
        assert_eq!(cut.rc_coefficient(RcId(0)), 60.0);
    }

    #[test]
    fn test_bound_and_satisfaction() {
        let cut = Cut {
            kind: CutKind::Optimality,
            constant: 10.0,
            dc_coefficients: vec![5.0, 1.0],
            rc_coefficients: vec![2.0],
        };
        let decision = FacilityDecision::new(vec![true, false], vec![true]);
        assert_eq!(cut.bound_at(&decision), 17.0);
        assert!(cut.is_satisfied(17.0, &decision, 0.0));
        assert!(!cut.is_satisfied(17.5, &decision, 0.1));
    }

    #[test]
    fn test_feasibility_cut_excludes_all_rcs_closed() {
        let config = config();
        let scenario = Scenario::new(150.0, 30.0, 0.7);
        let mut ray = RowValues::zeros(&config);
        // y_RC ≥ return share for each customer
        for j in 0..config.num_customers() {
            ray.rc_supply[j][0] = 1.0;
            ray.return_balance[j] = -1.0;
        }
        let cut = CutAggregator::new(&config).feasibility_cut(&InfeasibilityRay { scenario, ray });

        assert_eq!(cut.kind, CutKind::Feasibility);
        assert_eq!(cut.theta_coefficient(), 0.0);
        let closed = FacilityDecision::new(vec![true, true], vec![false]);
        let open = FacilityDecision::new(vec![false, false], vec![true]);
        assert!(cut.bound_at(&closed) < 0.0);
        assert!(cut.bound_at(&open) >= 0.0);
        assert!((cut.rc_coefficient(RcId(0)) - 1.0).abs() < 1e-12);
    }
}
