//! Fixtures and scripted solver capabilities for tests.

use crate::error::SolverError;
use crate::master::{Incumbent, LazyAction, MasterModel, MasterOutcome, MasterStatus, MipSolver};
use crate::solver::{ConvexProgram, ConvexSolver, ProgramSolution, SolveStatus};
use clsc_core::{ClscConfig, ClscConfigBuilder, DistributionParams, Scenario, TriangularParams};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// One DC, one RC, two customers; opening both is clearly profitable.
pub fn single_site_config() -> ClscConfig {
    ClscConfigBuilder::new(1, 1, 2)
        .capacities(200.0, 100.0)
        .dc_fixed_costs(vec![1000.0])
        .rc_fixed_costs(vec![500.0])
        .plant_dc_costs(vec![2.0])
        .dc_customer_costs(vec![vec![1.0, 1.5]])
        .customer_rc_costs(vec![vec![0.5], vec![0.8]])
        .rc_plant_costs(vec![1.0])
        .demand_weights(vec![1.0, 1.0])
        .build()
        .expect("fixture configuration is valid")
}

/// Two DCs, two RCs, three customers with uneven demand.
pub fn two_site_config() -> ClscConfig {
    ClscConfigBuilder::new(2, 2, 3)
        .capacities(250.0, 120.0)
        .dc_fixed_costs(vec![1500.0, 900.0])
        .rc_fixed_costs(vec![400.0, 700.0])
        .plant_dc_costs(vec![2.0, 3.5])
        .dc_customer_costs(vec![vec![1.0, 2.0, 4.0], vec![3.0, 1.5, 1.0]])
        .customer_rc_costs(vec![vec![0.5, 1.5], vec![1.0, 1.0], vec![2.0, 0.4]])
        .rc_plant_costs(vec![1.0, 0.8])
        .demand_weights(vec![3.0, 2.0, 1.0])
        .build()
        .expect("fixture configuration is valid")
}

/// Market 100/150/200, returns 20/30/40, recovery 0.5/0.7/0.9.
pub fn example_distribution() -> DistributionParams {
    DistributionParams::new(
        TriangularParams::new(100.0, 150.0, 200.0),
        TriangularParams::new(20.0, 30.0, 40.0),
        TriangularParams::new(0.5, 0.7, 0.9),
    )
}

/// Mode of [`example_distribution`].
pub fn example_scenario() -> Scenario {
    Scenario::new(150.0, 30.0, 0.7)
}

/// [`ConvexSolver`] answering every program through a closure.
pub struct FnSolver<F> {
    respond: F,
    calls: AtomicUsize,
}

impl<F> FnSolver<F>
where
    F: Fn(&ConvexProgram) -> ProgramSolution + Send + Sync,
{
    pub fn new(respond: F) -> Self {
        Self {
            respond,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<F> ConvexSolver for FnSolver<F>
where
    F: Fn(&ConvexProgram) -> ProgramSolution + Send + Sync,
{
    fn id(&self) -> &str {
        "scripted"
    }

    fn solve(&self, program: &ConvexProgram) -> Result<ProgramSolution, SolverError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((self.respond)(program))
    }
}

/// Optimal at the origin with zero duals and a fixed objective.
pub fn optimal_with_objective(
    objective: f64,
) -> impl Fn(&ConvexProgram) -> ProgramSolution + Send + Sync {
    move |program| {
        ProgramSolution::optimal(
            objective,
            vec![0.0; program.num_vars()],
            vec![0.0; program.num_rows()],
        )
    }
}

/// Infeasible with the ray that proves returns cannot reach a closed RC:
/// `+1` on every RC supply row, `−1` on every return balance row.
pub fn infeasible_without_return_centers(
) -> impl Fn(&ConvexProgram) -> ProgramSolution + Send + Sync {
    |program| {
        let certificate = program
            .rows()
            .iter()
            .map(|row| {
                if row.name.starts_with("supply_rc_") {
                    1.0
                } else if row.name.starts_with("return_balance_") {
                    -1.0
                } else {
                    0.0
                }
            })
            .collect();
        ProgramSolution::infeasible(certificate)
    }
}

/// Iteration limit on every solve.
pub fn anomalous() -> impl Fn(&ConvexProgram) -> ProgramSolution + Send + Sync {
    |_| ProgramSolution::unusable(SolveStatus::Other, "MaxIterations")
}

/// [`MipSolver`] that proposes a fixed list of incumbents in order.
///
/// Every callback verdict is recorded. The best incumbent is the one with the
/// highest objective among those accepted or skipped.
pub struct ScriptedMip {
    incumbents: Vec<Incumbent>,
    actions: Mutex<Vec<LazyAction>>,
}

impl ScriptedMip {
    pub fn new(incumbents: Vec<Incumbent>) -> Self {
        Self {
            incumbents,
            actions: Mutex::new(Vec::new()),
        }
    }

    pub fn actions(&self) -> Vec<LazyAction> {
        self.actions.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

impl MipSolver for ScriptedMip {
    fn id(&self) -> &str {
        "scripted"
    }

    fn solve_lazy(
        &self,
        model: &MasterModel,
        callback: &mut dyn FnMut(&Incumbent) -> LazyAction,
    ) -> Result<MasterOutcome, SolverError> {
        let mut cuts = model.cuts().to_vec();
        let mut best: Option<Incumbent> = None;
        let mut actions = Vec::new();
        for incumbent in &self.incumbents {
            let action = callback(incumbent);
            match &action {
                LazyAction::AddCut(cut) => cuts.push(cut.clone()),
                LazyAction::Accept | LazyAction::Skip => {
                    if best.as_ref().map_or(true, |b| incumbent.objective > b.objective) {
                        best = Some(incumbent.clone());
                    }
                }
            }
            actions.push(action);
        }
        if let Ok(mut recorded) = self.actions.lock() {
            *recorded = actions;
        }
        Ok(MasterOutcome {
            status: if best.is_some() {
                MasterStatus::Optimal
            } else {
                MasterStatus::Infeasible
            },
            best,
            nodes: self.incumbents.len(),
            cuts,
        })
    }
}
