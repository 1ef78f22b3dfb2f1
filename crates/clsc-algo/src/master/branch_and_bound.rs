//! Depth-first branch-and-bound with lazy constraints.
//!
//! Each node fixes a subset of the facility binaries; the remaining ones are
//! relaxed to `[0, 1]` and the LP is solved through `good_lp` with the
//! clarabel backend. Fixed binaries enter as constants, so a node never
//! carries bound rows for them.
//!
//! When a relaxation is integral the incumbent goes to the callback. A cut
//! is appended to the pool and the same node is re-solved; an accepted (or
//! skipped) incumbent closes the node. Nodes whose relaxation cannot beat
//! the best incumbent are pruned. Branching picks the most fractional binary
//! and explores the down branch (facility closed) first.
//!
//! The relaxation is solved by an interior-point method, so on a degenerate
//! optimal face it returns a point inside the face rather than a vertex.
//! Binaries within `integrality_tolerance` of 0 or 1 count as integral and
//! are rounded in the incumbent; genuinely interior values are branched on,
//! which can cost extra nodes but never changes the optimum.

use super::{
    ConstraintSense, Incumbent, LazyAction, MasterModel, MasterOutcome, MasterStatus, MipSolver,
};
use crate::cut::{Cut, CutKind};
use crate::error::SolverError;
use good_lp::solvers::clarabel::clarabel;
use good_lp::{
    constraint, variable, variables, Expression, ResolutionError, Solution, SolverModel, Variable,
};
use tracing::debug;

/// Branch-and-bound settings.
#[derive(Debug, Clone)]
pub struct BranchAndBound {
    /// Maximum number of LP relaxations (re-solves after cuts included)
    pub node_limit: usize,
    /// Distance from 0/1 below which a relaxed binary counts as integral
    pub integrality_tolerance: f64,
}

impl Default for BranchAndBound {
    fn default() -> Self {
        Self {
            node_limit: 10_000,
            integrality_tolerance: 1e-6,
        }
    }
}

impl BranchAndBound {
    pub fn new(node_limit: usize, integrality_tolerance: f64) -> Self {
        Self {
            node_limit,
            integrality_tolerance,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binary {
    Dc(usize),
    Rc(usize),
}

#[derive(Debug, Clone)]
struct Node {
    dc: Vec<Option<bool>>,
    rc: Vec<Option<bool>>,
    depth: usize,
}

impl Node {
    fn root(num_dcs: usize, num_rcs: usize) -> Self {
        Self {
            dc: vec![None; num_dcs],
            rc: vec![None; num_rcs],
            depth: 0,
        }
    }

    fn child(&self, binary: Binary, open: bool) -> Self {
        let mut next = self.clone();
        match binary {
            Binary::Dc(i) => next.dc[i] = Some(open),
            Binary::Rc(k) => next.rc[k] = Some(open),
        }
        next.depth += 1;
        next
    }
}

#[derive(Clone, Copy)]
enum Slot {
    Fixed(f64),
    Free(Variable),
}

fn slots(fixed: &[Option<bool>], vars: &mut good_lp::ProblemVariables) -> Vec<Slot> {
    fixed
        .iter()
        .map(|f| match f {
            Some(open) => Slot::Fixed(if *open { 1.0 } else { 0.0 }),
            None => Slot::Free(vars.add(variable().min(0.0).max(1.0))),
        })
        .collect()
}

/// Affine expression over the binaries, split into variable part and constant.
struct Affine {
    expr: Expression,
    constant: f64,
    has_free: bool,
}

fn affine(dc: &[Slot], rc: &[Slot], dc_coefficients: &[f64], rc_coefficients: &[f64]) -> Affine {
    let mut expr = Expression::from(0.0);
    let mut constant = 0.0;
    let mut has_free = false;
    let terms = dc.iter().zip(dc_coefficients).chain(rc.iter().zip(rc_coefficients));
    for (slot, a) in terms {
        if *a == 0.0 {
            continue;
        }
        match slot {
            Slot::Fixed(value) => constant += a * value,
            Slot::Free(var) => {
                expr += *a * *var;
                has_free = true;
            }
        }
    }
    Affine {
        expr,
        constant,
        has_free,
    }
}

struct Relaxation {
    estimated_profit: f64,
    dc_values: Vec<f64>,
    rc_values: Vec<f64>,
    objective: f64,
}

impl Relaxation {
    fn into_incumbent(self, model: &MasterModel) -> Incumbent {
        let round = |v: &f64| v.round().clamp(0.0, 1.0);
        let dc_values: Vec<f64> = self.dc_values.iter().map(round).collect();
        let rc_values: Vec<f64> = self.rc_values.iter().map(round).collect();
        Incumbent {
            estimated_profit: self.estimated_profit,
            objective: model.objective(self.estimated_profit, &dc_values, &rc_values),
            dc_values,
            rc_values,
        }
    }
}

fn prune_tolerance(objective: f64) -> f64 {
    1e-6 * objective.abs().max(1.0)
}

impl BranchAndBound {
    fn solve_relaxation(
        &self,
        model: &MasterModel,
        cuts: &[Cut],
        node: &Node,
    ) -> Result<Option<Relaxation>, SolverError> {
        let mut vars = variables!();
        let theta = vars.add(variable().max(model.profit_upper_bound()));
        let dc = slots(&node.dc, &mut vars);
        let rc = slots(&node.rc, &mut vars);

        let fixed = affine(&dc, &rc, model.dc_fixed_costs(), model.rc_fixed_costs());
        let objective = Expression::from(theta) - fixed.expr;
        let mut problem = vars.maximise(objective).using(clarabel);

        for side in model.side_constraints() {
            let lhs = affine(&dc, &rc, &side.dc_coefficients, &side.rc_coefficients);
            let rhs = side.rhs - lhs.constant;
            if !lhs.has_free {
                let violated = match side.sense {
                    ConstraintSense::AtLeast => rhs > self.integrality_tolerance,
                    ConstraintSense::AtMost => rhs < -self.integrality_tolerance,
                };
                if violated {
                    return Ok(None);
                }
                continue;
            }
            problem = match side.sense {
                ConstraintSense::AtLeast => problem.with(constraint!(lhs.expr >= rhs)),
                ConstraintSense::AtMost => problem.with(constraint!(lhs.expr <= rhs)),
            };
        }

        for cut in cuts {
            let bound = affine(&dc, &rc, &cut.dc_coefficients, &cut.rc_coefficients);
            let rhs = cut.constant + bound.constant;
            match cut.kind {
                CutKind::Optimality => {
                    let lhs = Expression::from(theta) - bound.expr;
                    problem = problem.with(constraint!(lhs <= rhs));
                }
                CutKind::Feasibility if bound.has_free => {
                    problem = problem.with(constraint!(bound.expr >= -rhs));
                }
                CutKind::Feasibility => {
                    if rhs < -self.integrality_tolerance {
                        return Ok(None);
                    }
                }
            }
        }

        let solution = match problem.solve() {
            Ok(solution) => solution,
            Err(ResolutionError::Infeasible) => return Ok(None),
            Err(e) => return Err(SolverError::Backend(format!("master relaxation: {:?}", e))),
        };

        let value = |slot: &Slot| match slot {
            Slot::Fixed(v) => *v,
            Slot::Free(var) => solution.value(*var).clamp(0.0, 1.0),
        };
        let dc_values: Vec<f64> = dc.iter().map(value).collect();
        let rc_values: Vec<f64> = rc.iter().map(value).collect();
        let estimated_profit = solution.value(theta);
        Ok(Some(Relaxation {
            objective: model.objective(estimated_profit, &dc_values, &rc_values),
            estimated_profit,
            dc_values,
            rc_values,
        }))
    }

    /// Most fractional free binary, DCs before RCs on ties.
    fn branching_binary(&self, node: &Node, relaxation: &Relaxation) -> Option<Binary> {
        let dc = node
            .dc
            .iter()
            .zip(&relaxation.dc_values)
            .enumerate()
            .filter(|(_, (fixed, _))| fixed.is_none())
            .map(|(i, (_, v))| (Binary::Dc(i), v.min(1.0 - v)));
        let rc = node
            .rc
            .iter()
            .zip(&relaxation.rc_values)
            .enumerate()
            .filter(|(_, (fixed, _))| fixed.is_none())
            .map(|(k, (_, v))| (Binary::Rc(k), v.min(1.0 - v)));

        let mut best: Option<(Binary, f64)> = None;
        for (binary, fractionality) in dc.chain(rc) {
            if fractionality <= self.integrality_tolerance {
                continue;
            }
            if best.map_or(true, |(_, f)| fractionality > f) {
                best = Some((binary, fractionality));
            }
        }
        best.map(|(binary, _)| binary)
    }
}

impl MipSolver for BranchAndBound {
    fn id(&self) -> &str {
        "branch-and-bound"
    }

    fn solve_lazy(
        &self,
        model: &MasterModel,
        callback: &mut dyn FnMut(&Incumbent) -> LazyAction,
    ) -> Result<MasterOutcome, SolverError> {
        let mut cuts: Vec<Cut> = model.cuts().to_vec();
        let mut best: Option<Incumbent> = None;
        let mut stack = vec![Node::root(model.num_dcs(), model.num_rcs())];
        let mut relaxations = 0;
        let mut hit_limit = false;

        'tree: while let Some(node) = stack.pop() {
            loop {
                if relaxations >= self.node_limit {
                    hit_limit = true;
                    break 'tree;
                }
                relaxations += 1;

                let Some(relaxation) = self.solve_relaxation(model, &cuts, &node)? else {
                    debug!(depth = node.depth, "node infeasible");
                    break;
                };

                if let Some(incumbent) = &best {
                    let cutoff = incumbent.objective + prune_tolerance(incumbent.objective);
                    if relaxation.objective <= cutoff {
                        debug!(
                            depth = node.depth,
                            bound = relaxation.objective,
                            incumbent = incumbent.objective,
                            "node pruned"
                        );
                        break;
                    }
                }

                if let Some(binary) = self.branching_binary(&node, &relaxation) {
                    debug!(depth = node.depth, ?binary, bound = relaxation.objective, "branching");
                    stack.push(node.child(binary, true));
                    stack.push(node.child(binary, false));
                    break;
                }

                let incumbent = relaxation.into_incumbent(model);
                match callback(&incumbent) {
                    LazyAction::Accept | LazyAction::Skip => {
                        best = Some(incumbent);
                        break;
                    }
                    LazyAction::AddCut(cut) => {
                        debug!(
                            depth = node.depth,
                            kind = ?cut.kind,
                            pool = cuts.len() + 1,
                            "lazy cut added"
                        );
                        cuts.push(cut);
                    }
                }
            }
        }

        let status = if hit_limit {
            MasterStatus::NodeLimit
        } else if best.is_some() {
            MasterStatus::Optimal
        } else {
            MasterStatus::Infeasible
        };
        Ok(MasterOutcome {
            status,
            best,
            nodes: relaxations,
            cuts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clsc_core::{ClscConfig, ClscConfigBuilder, FacilityDecision};

    fn config(min_rc: usize) -> ClscConfig {
        ClscConfigBuilder::new(2, 1, 1)
            .dc_fixed_costs(vec![10.0, 20.0])
            .rc_fixed_costs(vec![5.0])
            .min_return_centers(min_rc)
            .build()
            .unwrap()
    }

    #[test]
    fn test_accepts_root_incumbent() {
        let model = MasterModel::new(&config(1), 100.0);
        let mut calls = 0;
        let outcome = BranchAndBound::default()
            .solve_lazy(&model, &mut |_| {
                calls += 1;
                LazyAction::Accept
            })
            .unwrap();

        assert_eq!(outcome.status, MasterStatus::Optimal);
        assert_eq!(calls, 1);
        let best = outcome.best.unwrap();
        assert_eq!(best.decision(), FacilityDecision::new(vec![false, false], vec![true]));
        assert!((best.objective - 95.0).abs() < 1e-4);
    }

    #[test]
    fn test_lazy_cut_steers_search() {
        // True profit 60·y0 + 50·y1: opening both DCs is worth 75 after fixed costs.
        let model = MasterModel::new(&config(1), 200.0);
        let truth = |inc: &Incumbent| 60.0 * inc.dc_values[0] + 50.0 * inc.dc_values[1];
        let outcome = BranchAndBound::default()
            .solve_lazy(&model, &mut |inc| {
                if inc.estimated_profit > truth(inc) + 1e-3 {
                    LazyAction::AddCut(Cut {
                        kind: CutKind::Optimality,
                        constant: 0.0,
                        dc_coefficients: vec![60.0, 50.0],
                        rc_coefficients: vec![0.0],
                    })
                } else {
                    LazyAction::Accept
                }
            })
            .unwrap();

        assert_eq!(outcome.status, MasterStatus::Optimal);
        assert_eq!(outcome.cuts.len(), 1);
        let best = outcome.best.unwrap();
        assert_eq!(best.decision(), FacilityDecision::new(vec![true, true], vec![true]));
        assert!((best.objective - 75.0).abs() < 1e-3);
        assert!(outcome.nodes >= 2);
    }

    #[test]
    fn test_fractional_root_branches_down_first() {
        // θ ≤ 50, θ ≤ 100·y0 and a DC fixed cost of 60 put the LP optimum at y0 = 0.5.
        let config = ClscConfigBuilder::new(1, 1, 1)
            .dc_fixed_costs(vec![60.0])
            .rc_fixed_costs(vec![5.0])
            .min_return_centers(0)
            .build()
            .unwrap();
        let model = MasterModel::new(&config, 50.0).with_cut(Cut {
            kind: CutKind::Optimality,
            constant: 0.0,
            dc_coefficients: vec![100.0],
            rc_coefficients: vec![0.0],
        });
        let mut seen = Vec::new();
        let outcome = BranchAndBound::default()
            .solve_lazy(&model, &mut |inc| {
                seen.push(inc.decision());
                LazyAction::Accept
            })
            .unwrap();

        assert_eq!(outcome.status, MasterStatus::Optimal);
        assert_eq!(seen[0], FacilityDecision::all_closed(1, 1));
        let best = outcome.best.unwrap();
        assert_eq!(best.decision(), FacilityDecision::all_closed(1, 1));
        assert!(best.objective.abs() < 1e-4);
        assert!(outcome.nodes >= 3);
    }

    #[test]
    fn test_contradictory_cut_is_infeasible() {
        let model = MasterModel::new(&config(1), 100.0).with_cut(Cut {
            kind: CutKind::Feasibility,
            constant: -1.0,
            dc_coefficients: vec![0.0, 0.0],
            rc_coefficients: vec![0.0],
        });
        let outcome = BranchAndBound::default()
            .solve_lazy(&model, &mut |_| LazyAction::Accept)
            .unwrap();
        assert_eq!(outcome.status, MasterStatus::Infeasible);
        assert!(outcome.best.is_none());
    }

    #[test]
    fn test_zero_node_limit() {
        let model = MasterModel::new(&config(1), 100.0);
        let outcome = BranchAndBound::new(0, 1e-6)
            .solve_lazy(&model, &mut |_| LazyAction::Accept)
            .unwrap();
        assert_eq!(outcome.status, MasterStatus::NodeLimit);
        assert_eq!(outcome.nodes, 0);
        assert!(outcome.best.is_none());
    }

    #[test]
    fn test_skip_keeps_incumbent_without_cut() {
        let model = MasterModel::new(&config(1), 100.0);
        let outcome = BranchAndBound::default()
            .solve_lazy(&model, &mut |_| LazyAction::Skip)
            .unwrap();
        assert_eq!(outcome.status, MasterStatus::Optimal);
        assert!(outcome.cuts.is_empty());
        assert!(outcome.best.is_some());
    }

    #[test]
    fn test_near_integral_values_are_not_branched() {
        let node = Node::root(2, 1);
        let relaxation = Relaxation {
            estimated_profit: 80.0,
            dc_values: vec![1.0 - 5e-7, 3e-7],
            rc_values: vec![0.9999999],
            objective: 45.0,
        };
        let bnb = BranchAndBound::default();
        assert_eq!(bnb.branching_binary(&node, &relaxation), None);

        let model = MasterModel::new(&config(1), 100.0);
        let incumbent = relaxation.into_incumbent(&model);
        assert_eq!(incumbent.decision(), FacilityDecision::new(vec![true, false], vec![true]));
        assert_eq!(incumbent.dc_values, vec![1.0, 0.0]);
        assert!((incumbent.objective - 65.0).abs() < 1e-9);
    }

    #[test]
    fn test_interior_value_is_branched() {
        let node = Node::root(2, 1);
        let relaxation = Relaxation {
            estimated_profit: 80.0,
            dc_values: vec![0.5, 0.2],
            rc_values: vec![1.0],
            objective: 70.0,
        };
        let binary = BranchAndBound::default().branching_binary(&node, &relaxation);
        assert_eq!(binary, Some(Binary::Dc(0)));
    }
}
