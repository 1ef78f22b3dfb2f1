//! Master problem and the lazy-constraint MIP capability.
//!
//! The master chooses which facilities to open and carries a surrogate
//! `θ` (estimated operational profit):
//!
//! ```text
//! max  θ − Σ fixedDC_i·useDC_i − Σ fixedRC_k·useRC_k
//! s.t. θ ≤ U
//!      Σ useRC_k ≥ minReturnCenters,  pinned facilities fixed
//!      accumulated Benders cuts
//!      useDC, useRC ∈ {0, 1}
//! ```
//!
//! A [`MipSolver`] explores this model and hands every integer-feasible
//! incumbent to a callback, which either accepts it or returns a cut to
//! append. The model itself is never mutated by the solver; the cut pool
//! lives in the solve and is returned with the outcome.

pub mod branch_and_bound;

pub use branch_and_bound::BranchAndBound;

use crate::cut::Cut;
use crate::error::SolverError;
use clsc_core::{ClscConfig, DcId, FacilityDecision, FacilityRef, RcId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintSense {
    /// `Σ a·y ≥ rhs`
    AtLeast,
    /// `Σ a·y ≤ rhs`
    AtMost,
}

/// Static linear constraint over the facility binaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideConstraint {
    pub name: String,
    pub dc_coefficients: Vec<f64>,
    pub rc_coefficients: Vec<f64>,
    pub sense: ConstraintSense,
    pub rhs: f64,
}

impl SideConstraint {
    pub fn lhs_at(&self, dc_values: &[f64], rc_values: &[f64]) -> f64 {
        let dc: f64 = self.dc_coefficients.iter().zip(dc_values).map(|(a, y)| a * y).sum();
        let rc: f64 = self.rc_coefficients.iter().zip(rc_values).map(|(a, y)| a * y).sum();
        dc + rc
    }

    pub fn is_satisfied(&self, dc_values: &[f64], rc_values: &[f64], tolerance: f64) -> bool {
        let lhs = self.lhs_at(dc_values, rc_values);
        match self.sense {
            ConstraintSense::AtLeast => lhs >= self.rhs - tolerance,
            ConstraintSense::AtMost => lhs <= self.rhs + tolerance,
        }
    }
}

/// Facility-location master model.
#[derive(Debug, Clone, PartialEq)]
pub struct MasterModel {
    dc_fixed_costs: Vec<f64>,
    rc_fixed_costs: Vec<f64>,
    profit_upper_bound: f64,
    side_constraints: Vec<SideConstraint>,
    cuts: Vec<Cut>,
}

impl MasterModel {
    /// Master for a configuration with `θ ≤ profit_upper_bound`.
    pub fn new(config: &ClscConfig, profit_upper_bound: f64) -> Self {
        let n_dc = config.num_dcs();
        let n_rc = config.num_rcs();
        let mut side_constraints = Vec::new();

        if config.min_return_centers > 0 {
            side_constraints.push(SideConstraint {
                name: "min_return_centers".to_string(),
                dc_coefficients: vec![0.0; n_dc],
                rc_coefficients: vec![1.0; n_rc],
                sense: ConstraintSense::AtLeast,
                rhs: config.min_return_centers as f64,
            });
        }

        for pin in &config.pins {
            let mut dc_coefficients = vec![0.0; n_dc];
            let mut rc_coefficients = vec![0.0; n_rc];
            match pin.facility {
                FacilityRef::Dc(DcId(i)) => dc_coefficients[i] = 1.0,
                FacilityRef::Rc(RcId(k)) => rc_coefficients[k] = 1.0,
            }
            let (sense, rhs) = if pin.open {
                (ConstraintSense::AtLeast, 1.0)
            } else {
                (ConstraintSense::AtMost, 0.0)
            };
            side_constraints.push(SideConstraint {
                name: format!("pin_{}", pin.facility),
                dc_coefficients,
                rc_coefficients,
                sense,
                rhs,
            });
        }

        Self {
            dc_fixed_costs: config.dc_fixed_costs.clone(),
            rc_fixed_costs: config.rc_fixed_costs.clone(),
            profit_upper_bound,
            side_constraints,
            cuts: Vec::new(),
        }
    }

    /// Seed the model with a cut known before the search starts.
    pub fn with_cut(mut self, cut: Cut) -> Self {
        self.cuts.push(cut);
        self
    }

    pub fn num_dcs(&self) -> usize {
        self.dc_fixed_costs.len()
    }

    pub fn num_rcs(&self) -> usize {
        self.rc_fixed_costs.len()
    }

    pub fn dc_fixed_costs(&self) -> &[f64] {
        &self.dc_fixed_costs
    }

    pub fn rc_fixed_costs(&self) -> &[f64] {
        &self.rc_fixed_costs
    }

    pub fn profit_upper_bound(&self) -> f64 {
        self.profit_upper_bound
    }

    pub fn side_constraints(&self) -> &[SideConstraint] {
        &self.side_constraints
    }

    pub fn cuts(&self) -> &[Cut] {
        &self.cuts
    }

    /// Master objective at (possibly fractional) values.
    pub fn objective(&self, estimated_profit: f64, dc_values: &[f64], rc_values: &[f64]) -> f64 {
        let dc: f64 = self.dc_fixed_costs.iter().zip(dc_values).map(|(f, y)| f * y).sum();
        let rc: f64 = self.rc_fixed_costs.iter().zip(rc_values).map(|(f, y)| f * y).sum();
        estimated_profit - dc - rc
    }
}

/// Master variable handle, for reading incumbent values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MasterVar {
    EstimatedProfit,
    UseDc(DcId),
    UseRc(RcId),
}

/// Integer-feasible point proposed by the search.
#[derive(Debug, Clone, PartialEq)]
pub struct Incumbent {
    pub estimated_profit: f64,
    pub dc_values: Vec<f64>,
    pub rc_values: Vec<f64>,
    /// Master objective at this point
    pub objective: f64,
}

impl Incumbent {
    pub fn value(&self, var: MasterVar) -> f64 {
        match var {
            MasterVar::EstimatedProfit => self.estimated_profit,
            MasterVar::UseDc(id) => self.dc_values.get(id.0).copied().unwrap_or(0.0),
            MasterVar::UseRc(id) => self.rc_values.get(id.0).copied().unwrap_or(0.0),
        }
    }

    pub fn decision(&self) -> FacilityDecision {
        FacilityDecision::from_values(&self.dc_values, &self.rc_values)
    }
}

/// Callback verdict on an incumbent.
#[derive(Debug, Clone, PartialEq)]
pub enum LazyAction {
    /// Keep the incumbent
    Accept,
    /// Reject the incumbent and append the cut
    AddCut(Cut),
    /// Nothing usable was learned; the incumbent stands without a cut
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MasterStatus {
    /// Search tree exhausted
    Optimal,
    /// No integer point satisfies the side constraints and cuts
    Infeasible,
    /// Node limit hit; the best incumbent so far is reported
    NodeLimit,
}

/// Result of a lazy-constraint solve.
#[derive(Debug, Clone, PartialEq)]
pub struct MasterOutcome {
    pub status: MasterStatus,
    pub best: Option<Incumbent>,
    pub nodes: usize,
    /// Final cut pool (seed cuts followed by callback cuts, in order)
    pub cuts: Vec<Cut>,
}

/// MIP backend with lazy-constraint callbacks.
pub trait MipSolver {
    /// Short identifier used in diagnostics.
    fn id(&self) -> &str;

    /// Maximize the master, invoking `callback` on every integer-feasible
    /// incumbent before it may become the best solution.
    fn solve_lazy(
        &self,
        model: &MasterModel,
        callback: &mut dyn FnMut(&Incumbent) -> LazyAction,
    ) -> Result<MasterOutcome, SolverError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use clsc_core::{ClscConfigBuilder, FacilityPin};

    #[test]
    fn test_master_side_constraints_from_config() {
        let config = ClscConfigBuilder::new(2, 3, 1)
            .dc_fixed_costs(vec![10.0, 20.0])
            .rc_fixed_costs(vec![1.0, 2.0, 3.0])
            .min_return_centers(2)
            .pin(FacilityPin::open(FacilityRef::Dc(DcId(1))))
            .pin(FacilityPin::closed(FacilityRef::Rc(RcId(0))))
            .build()
            .unwrap();
        let master = MasterModel::new(&config, 500.0);

        let constraints = master.side_constraints();
        assert_eq!(constraints.len(), 3);
        assert_eq!(constraints[0].name, "min_return_centers");
        assert_eq!(constraints[0].rhs, 2.0);
        assert_eq!(constraints[1].name, "pin_DC1");
        assert_eq!(constraints[1].sense, ConstraintSense::AtLeast);
        assert_eq!(constraints[2].sense, ConstraintSense::AtMost);

        assert!(constraints[0].is_satisfied(&[0.0, 0.0], &[0.0, 1.0, 1.0], 1e-9));
        assert!(!constraints[2].is_satisfied(&[0.0, 0.0], &[1.0, 1.0, 0.0], 1e-9));
    }

    #[test]
    fn test_master_objective_subtracts_fixed_costs() {
        let config = ClscConfigBuilder::new(2, 1, 1)
            .dc_fixed_costs(vec![10.0, 20.0])
            .rc_fixed_costs(vec![5.0])
            .build()
            .unwrap();
        let master = MasterModel::new(&config, 100.0);
        assert_eq!(master.objective(100.0, &[1.0, 0.0], &[1.0]), 85.0);
    }

    #[test]
    fn test_incumbent_values() {
        let incumbent = Incumbent {
            estimated_profit: 42.0,
            dc_values: vec![1.0, 0.0],
            rc_values: vec![1.0],
            objective: 30.0,
        };
        assert_eq!(incumbent.value(MasterVar::EstimatedProfit), 42.0);
        assert_eq!(incumbent.value(MasterVar::UseDc(DcId(0))), 1.0);
        assert_eq!(incumbent.value(MasterVar::UseRc(RcId(3))), 0.0);
        assert_eq!(incumbent.decision().to_string(), "DC{0} RC{0}");
    }
}
