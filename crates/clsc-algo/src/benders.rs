//! Benders decomposition over one scenario set.
//!
//! The master search (any [`MipSolver`]) proposes facility configurations;
//! [`BendersCallback`] re-solves every scenario subproblem for the proposal
//! and either accepts it or returns a cut:
//!
//! 1. push the decision into each subproblem and solve (optionally on the
//!    rayon pool, results kept in scenario order);
//! 2. any anomalous status: log it and skip the incumbent without a cut;
//! 3. any infeasible scenario: return a feasibility cut from its ray;
//! 4. otherwise compare `θ` to the scenario-average profit: above it by more
//!    than the fuzz tolerance returns an optimality cut, else the incumbent
//!    is accepted and the first scenario's flows are recorded.

use crate::cut::{CutAggregator, DualSnapshot};
use crate::error::BendersError;
use crate::master::{BranchAndBound, Incumbent, LazyAction, MasterModel, MasterStatus, MipSolver};
use crate::solution::{CandidateSolution, FlowPlan};
use crate::solver::{ClarabelSolver, ConvexSolver, SolveStatus};
use crate::subproblem::{profit_upper_bound, Subproblem, SubproblemOutcome};
use clsc_core::{ClscConfig, FacilityDecision, Scenario};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

fn default_fuzz() -> f64 {
    1.0
}

fn default_node_limit() -> usize {
    10_000
}

fn default_integrality_tolerance() -> f64 {
    1e-6
}

fn default_parallel() -> bool {
    true
}

/// Tuning of one decomposition run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BendersSettings {
    /// Absolute slack before an incumbent's estimate counts as too optimistic
    #[serde(default = "default_fuzz")]
    pub fuzz: f64,
    /// Branch-and-bound LP relaxation limit
    #[serde(default = "default_node_limit")]
    pub node_limit: usize,
    #[serde(default = "default_integrality_tolerance")]
    pub integrality_tolerance: f64,
    /// Explicit bound on the surrogate profit; derived from the data when unset
    #[serde(default)]
    pub profit_upper_bound: Option<f64>,
    /// Solve the scenario subproblems of one callback concurrently
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

impl Default for BendersSettings {
    fn default() -> Self {
        Self {
            fuzz: default_fuzz(),
            node_limit: default_node_limit(),
            integrality_tolerance: default_integrality_tolerance(),
            profit_upper_bound: None,
            parallel: default_parallel(),
        }
    }
}

impl BendersSettings {
    pub fn branch_and_bound(&self) -> BranchAndBound {
        BranchAndBound::new(self.node_limit, self.integrality_tolerance)
    }
}

/// Best incumbent accepted so far, with the flows of the first scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedIncumbent {
    /// Master objective (surrogate profit minus fixed costs)
    pub objective: f64,
    pub estimated_profit: f64,
    /// Scenario-average subproblem optimum
    pub expected_profit: f64,
    pub decision: FacilityDecision,
    pub flows: FlowPlan,
}

/// Lazy-cut callback state for one decomposition run.
pub struct BendersCallback<'a, S: ConvexSolver + ?Sized> {
    config: &'a ClscConfig,
    solver: &'a S,
    subproblems: Vec<Subproblem>,
    fuzz: f64,
    #[cfg_attr(not(feature = "parallel"), allow(dead_code))]
    parallel: bool,
    best: Option<AcceptedIncumbent>,
    accepted_profits: Vec<f64>,
    optimality_cuts: usize,
    feasibility_cuts: usize,
    anomalies: usize,
}

fn solve_one<S: ConvexSolver + ?Sized>(
    subproblem: &mut Subproblem,
    decision: &FacilityDecision,
    solver: &S,
) -> SubproblemOutcome {
    subproblem
        .update(decision)
        .and_then(|_| subproblem.solve(solver))
        .unwrap_or_else(|e| SubproblemOutcome::Anomaly {
            status: SolveStatus::Other,
            detail: e.to_string(),
        })
}

impl<'a, S: ConvexSolver + ?Sized> BendersCallback<'a, S> {
    /// Build one subproblem per scenario.
    pub fn new(
        config: &'a ClscConfig,
        scenarios: &[Scenario],
        solver: &'a S,
        settings: &BendersSettings,
    ) -> Self {
        Self {
            config,
            solver,
            subproblems: scenarios.iter().map(|s| Subproblem::new(config, *s)).collect(),
            fuzz: settings.fuzz,
            parallel: settings.parallel,
            best: None,
            accepted_profits: Vec::new(),
            optimality_cuts: 0,
            feasibility_cuts: 0,
            anomalies: 0,
        }
    }

    /// Evaluate one incumbent.
    pub fn on_incumbent(&mut self, incumbent: &Incumbent) -> LazyAction {
        let decision = incumbent.decision();
        let outcomes = self.solve_scenarios(&decision);

        let mut solutions = Vec::with_capacity(outcomes.len());
        let mut ray = None;
        for (scenario, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                SubproblemOutcome::Optimal(solution) => solutions.push(solution),
                SubproblemOutcome::Infeasible(r) => {
                    if ray.is_none() {
                        ray = Some((scenario, r));
                    }
                }
                SubproblemOutcome::Anomaly { status, detail } => {
                    self.anomalies += 1;
                    warn!(
                        scenario,
                        ?status,
                        %detail,
                        %decision,
                        "subproblem not optimal; incumbent kept without a cut"
                    );
                    return LazyAction::Skip;
                }
            }
        }

        let aggregator = CutAggregator::new(self.config);
        if let Some((scenario, ray)) = ray {
            self.feasibility_cuts += 1;
            warn!(scenario, %decision, "subproblem infeasible; adding feasibility cut");
            return LazyAction::AddCut(aggregator.feasibility_cut(&ray));
        }
        if solutions.is_empty() {
            return LazyAction::Skip;
        }

        let expected = solutions.iter().map(|s| s.objective).sum::<f64>() / solutions.len() as f64;
        if incumbent.estimated_profit > expected + self.fuzz {
            self.optimality_cuts += 1;
            debug!(
                estimated = incumbent.estimated_profit,
                expected,
                %decision,
                "estimate too optimistic; adding optimality cut"
            );
            let snapshots: Vec<DualSnapshot> = solutions.into_iter().map(|s| s.snapshot).collect();
            return LazyAction::AddCut(aggregator.optimality_cut(&snapshots));
        }

        info!(
            objective = incumbent.objective,
            expected,
            %decision,
            "incumbent accepted"
        );
        self.accepted_profits.push(incumbent.objective);
        let improves = self
            .best
            .as_ref()
            .map_or(true, |best| incumbent.objective > best.objective);
        if improves {
            let flows = solutions.swap_remove(0).flows;
            self.best = Some(AcceptedIncumbent {
                objective: incumbent.objective,
                estimated_profit: incumbent.estimated_profit,
                expected_profit: expected,
                decision,
                flows,
            });
        }
        LazyAction::Accept
    }

    fn solve_scenarios(&mut self, decision: &FacilityDecision) -> Vec<SubproblemOutcome> {
        let solver = self.solver;

        #[cfg(feature = "parallel")]
        if self.parallel {
            use rayon::prelude::*;
            return self
                .subproblems
                .par_iter_mut()
                .map(|subproblem| solve_one(subproblem, decision, solver))
                .collect();
        }

        self.subproblems
            .iter_mut()
            .map(|subproblem| solve_one(subproblem, decision, solver))
            .collect()
    }

    pub fn best(&self) -> Option<&AcceptedIncumbent> {
        self.best.as_ref()
    }

    /// Objectives of accepted incumbents, in acceptance order.
    pub fn accepted_profits(&self) -> &[f64] {
        &self.accepted_profits
    }

    pub fn optimality_cuts(&self) -> usize {
        self.optimality_cuts
    }

    pub fn feasibility_cuts(&self) -> usize {
        self.feasibility_cuts
    }

    pub fn anomalies(&self) -> usize {
        self.anomalies
    }
}

/// Run a decomposition with the clarabel subproblem backend and the built-in
/// branch-and-bound master.
pub fn run_decomposition(
    config: &ClscConfig,
    scenarios: &[Scenario],
    settings: &BendersSettings,
) -> Result<CandidateSolution, BendersError> {
    run_decomposition_with(
        config,
        scenarios,
        settings,
        &ClarabelSolver::default(),
        &settings.branch_and_bound(),
    )
}

/// Run a decomposition with explicit solver capabilities.
pub fn run_decomposition_with<S, M>(
    config: &ClscConfig,
    scenarios: &[Scenario],
    settings: &BendersSettings,
    solver: &S,
    mip: &M,
) -> Result<CandidateSolution, BendersError>
where
    S: ConvexSolver + ?Sized,
    M: MipSolver + ?Sized,
{
    config.validate()?;
    if scenarios.is_empty() {
        return Err(BendersError::NoScenarios);
    }
    let start = Instant::now();

    let upper = settings
        .profit_upper_bound
        .unwrap_or_else(|| profit_upper_bound(config, scenarios));
    let master = MasterModel::new(config, upper);
    let mut callback = BendersCallback::new(config, scenarios, solver, settings);

    debug!(
        scenarios = scenarios.len(),
        upper_bound = upper,
        solver = solver.id(),
        master = mip.id(),
        "starting decomposition"
    );
    let outcome = mip.solve_lazy(&master, &mut |incumbent| callback.on_incumbent(incumbent))?;

    let Some(best) = outcome.best else {
        return Err(match outcome.status {
            MasterStatus::NodeLimit => BendersError::NodeLimit(settings.node_limit),
            _ => BendersError::MasterInfeasible,
        });
    };

    let decision = best.decision();
    let flows = callback
        .best()
        .filter(|accepted| accepted.decision == decision)
        .map(|accepted| accepted.flows.clone());

    let candidate = CandidateSolution {
        profit: best.objective,
        decision,
        flows,
        status: outcome.status,
        nodes: outcome.nodes,
        optimality_cuts: callback.optimality_cuts(),
        feasibility_cuts: callback.feasibility_cuts(),
        anomalies: callback.anomalies(),
        accepted_profits: callback.accepted_profits().to_vec(),
        solve_time: start.elapsed(),
    };
    info!(
        profit = candidate.profit,
        decision = %candidate.decision,
        nodes = candidate.nodes,
        cuts = candidate.cut_count(),
        elapsed = ?candidate.solve_time,
        "decomposition finished"
    );
    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cut::CutKind;
    use crate::test_utils::{
        anomalous, example_scenario, infeasible_without_return_centers, optimal_with_objective,
        single_site_config, FnSolver, ScriptedMip,
    };

    fn incumbent(estimated_profit: f64, dc: f64, rc: f64, fixed: f64) -> Incumbent {
        Incumbent {
            estimated_profit,
            dc_values: vec![dc],
            rc_values: vec![rc],
            objective: estimated_profit - fixed,
        }
    }

    #[test]
    fn test_accepts_within_fuzz() {
        let config = single_site_config();
        let solver = FnSolver::new(optimal_with_objective(100.0));
        let scenarios = [example_scenario(), example_scenario()];
        let settings = BendersSettings::default();
        let mut callback = BendersCallback::new(&config, &scenarios, &solver, &settings);

        let action = callback.on_incumbent(&incumbent(100.9, 1.0, 1.0, 1500.0));
        assert_eq!(action, LazyAction::Accept);
        assert_eq!(solver.calls(), 2);
        assert_eq!(callback.accepted_profits(), &[100.9 - 1500.0]);
        let best = callback.best().unwrap();
        assert_eq!(best.expected_profit, 100.0);
        assert_eq!(best.decision, FacilityDecision::all_open(1, 1));
    }

    #[test]
    fn test_cuts_optimistic_estimate() {
        let config = single_site_config();
        let solver = FnSolver::new(optimal_with_objective(100.0));
        let scenarios = [example_scenario()];
        let settings = BendersSettings::default();
        let mut callback = BendersCallback::new(&config, &scenarios, &solver, &settings);

        match callback.on_incumbent(&incumbent(101.5, 1.0, 1.0, 1500.0)) {
            LazyAction::AddCut(cut) => {
                assert_eq!(cut.kind, CutKind::Optimality);
                // zero duals and zero quantities leave nothing to bound with
                assert_eq!(cut.constant, 0.0);
                assert_eq!(cut.dc_coefficients, vec![0.0]);
            }
            other => panic!("expected a cut, got {:?}", other),
        }
        assert_eq!(callback.optimality_cuts(), 1);
        assert!(callback.best().is_none());
    }

    #[test]
    fn test_infeasible_scenario_gives_feasibility_cut() {
        let config = single_site_config();
        let solver = FnSolver::new(infeasible_without_return_centers());
        let scenarios = [example_scenario()];
        let settings = BendersSettings::default();
        let mut callback = BendersCallback::new(&config, &scenarios, &solver, &settings);

        let action = callback.on_incumbent(&incumbent(500.0, 1.0, 0.0, 1000.0));
        let LazyAction::AddCut(cut) = action else {
            panic!("expected a feasibility cut");
        };
        assert_eq!(cut.kind, CutKind::Feasibility);
        assert!(cut.bound_at(&FacilityDecision::new(vec![true], vec![false])) < 0.0);
        assert!(cut.bound_at(&FacilityDecision::new(vec![false], vec![true])) >= 0.0);
        assert_eq!(callback.feasibility_cuts(), 1);
    }

    #[test]
    fn test_anomaly_skips_without_cut() {
        let config = single_site_config();
        let solver = FnSolver::new(anomalous());
        let scenarios = [example_scenario()];
        let settings = BendersSettings::default();
        let mut callback = BendersCallback::new(&config, &scenarios, &solver, &settings);

        assert_eq!(callback.on_incumbent(&incumbent(10.0, 1.0, 1.0, 0.0)), LazyAction::Skip);
        assert_eq!(callback.anomalies(), 1);
        assert_eq!(callback.optimality_cuts() + callback.feasibility_cuts(), 0);
    }

    #[test]
    fn test_record_only_moves_up() {
        let config = single_site_config();
        let solver = FnSolver::new(optimal_with_objective(100.0));
        let scenarios = [example_scenario()];
        let settings = BendersSettings::default();
        let mut callback = BendersCallback::new(&config, &scenarios, &solver, &settings);

        callback.on_incumbent(&incumbent(100.0, 1.0, 1.0, 0.0));
        callback.on_incumbent(&incumbent(100.0, 0.0, 1.0, 50.0));
        assert_eq!(callback.best().unwrap().decision, FacilityDecision::all_open(1, 1));
    }

    #[test]
    fn test_decomposition_with_fakes() {
        let config = single_site_config();
        let solver = FnSolver::new(optimal_with_objective(2000.0));
        let mip = ScriptedMip::new(vec![
            incumbent(5000.0, 1.0, 1.0, 1500.0),
            incumbent(2000.0, 1.0, 1.0, 1500.0),
        ]);
        let candidate = run_decomposition_with(
            &config,
            &[example_scenario()],
            &BendersSettings::default(),
            &solver,
            &mip,
        )
        .unwrap();

        assert_eq!(candidate.profit, 500.0);
        assert_eq!(candidate.optimality_cuts, 1);
        assert_eq!(candidate.nodes, 2);
        assert!(candidate.flows.is_some());
        assert_eq!(mip.actions().len(), 2);
        assert!(matches!(mip.actions()[0], LazyAction::AddCut(_)));
    }

    #[test]
    fn test_empty_scenarios_rejected() {
        let config = single_site_config();
        let result = run_decomposition(&config, &[], &BendersSettings::default());
        assert!(matches!(result, Err(BendersError::NoScenarios)));
    }

    #[test]
    fn test_no_incumbent_is_master_infeasible() {
        let config = single_site_config();
        let solver = FnSolver::new(optimal_with_objective(0.0));
        let mip = ScriptedMip::new(Vec::new());
        let result = run_decomposition_with(
            &config,
            &[example_scenario()],
            &BendersSettings::default(),
            &solver,
            &mip,
        );
        assert!(matches!(result, Err(BendersError::MasterInfeasible)));
    }

    #[test]
    fn test_settings_defaults_from_empty_json() {
        let settings: BendersSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, BendersSettings::default());
        assert_eq!(settings.fuzz, 1.0);
        assert!(settings.parallel);
    }
}
