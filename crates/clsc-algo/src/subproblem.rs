//! Scenario subproblem: production and flows for a fixed facility decision.
//!
//! ```text
//! max  −I·q_n² − 2dI·q_n·q_r − dI·q_r² + a_n·q_n + a_r·q_r − Σ unit cost · flow
//! s.t. q_n ≤ manCap, q_r ≤ remanCap, q_n + q_r ≤ market, q_r ≤ rate·returns
//!      dc_customer[l][i][j] ≤ cap_l · useDC[i]          (DC supply)
//!      customer_rc[j][k]    ≤ returns · useRC[k]        (RC supply)
//!      rc_plant[k] ≤ rate · Σ_j customer_rc[j][k]
//!      q_l = Σ_i plant_dc[l][i],   plant_dc[l][i] = Σ_j dc_customer[l][i][j]
//!      density[j] · q_l = Σ_i dc_customer[l][i][j]
//!      Σ_k customer_rc[j][k] = returns · density[j]      (return balance)
//!      q_r = Σ_k rc_plant[k],      all variables ≥ 0
//! ```
//!
//! with `I = (upper − lower) / market`, `a_n` the new-unit margin and `a_r`
//! the remanufactured-unit margin. The model is built once per scenario; a
//! new facility decision only rewrites the supply right-hand sides.

use crate::cut::{capacity_rhs, DualSnapshot, InfeasibilityRay, RowValues, CAPACITY_ROWS};
use crate::error::SolverError;
use crate::solution::FlowPlan;
use crate::solver::{
    ConvexProgram, ConvexSolver, ObjectiveSense, ProgramSolution, RowId, RowSense, SolveStatus,
    VarId,
};
use clsc_core::{ClscConfig, FacilityDecision, Scenario};
use tracing::debug;

/// Product kind flowing through the forward network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Product {
    New,
    Remanufactured,
}

impl Product {
    pub const ALL: [Product; 2] = [Product::New, Product::Remanufactured];

    fn index(self) -> usize {
        match self {
            Product::New => 0,
            Product::Remanufactured => 1,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Product::New => "new",
            Product::Remanufactured => "reman",
        }
    }
}

struct Vars {
    quantity: [VarId; 2],
    plant_dc: [Vec<VarId>; 2],
    dc_customer: [Vec<Vec<VarId>>; 2],
    customer_rc: Vec<Vec<VarId>>,
    rc_plant: Vec<VarId>,
}

struct Rows {
    capacity: [RowId; CAPACITY_ROWS],
    dc_supply: [Vec<Vec<RowId>>; 2],
    rc_supply: Vec<Vec<RowId>>,
    return_balance: Vec<RowId>,
}

/// Optimal solve of one scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct SubproblemSolution {
    pub objective: f64,
    pub flows: FlowPlan,
    pub snapshot: DualSnapshot,
}

/// Status-classified outcome of a subproblem solve.
#[derive(Debug, Clone, PartialEq)]
pub enum SubproblemOutcome {
    Optimal(SubproblemSolution),
    Infeasible(InfeasibilityRay),
    /// Anything the decomposition cannot use (unbounded, limits, numerics)
    Anomaly { status: SolveStatus, detail: String },
}

impl SubproblemOutcome {
    pub fn status(&self) -> SolveStatus {
        match self {
            SubproblemOutcome::Optimal(_) => SolveStatus::Optimal,
            SubproblemOutcome::Infeasible(_) => SolveStatus::Infeasible,
            SubproblemOutcome::Anomaly { status, .. } => *status,
        }
    }
}

/// Subproblem of one scenario, owning its model and current supply bounds.
pub struct Subproblem {
    scenario: Scenario,
    capacity: [f64; 2],
    program: ConvexProgram,
    vars: Vars,
    rows: Rows,
    decision: FacilityDecision,
}

impl Subproblem {
    /// Build the model with every facility closed.
    pub fn new(config: &ClscConfig, scenario: Scenario) -> Self {
        let n_dc = config.num_dcs();
        let n_rc = config.num_rcs();
        let n_cust = config.num_customers();
        let econ = &config.economics;
        let slope = econ.price_slope(scenario.market_size);
        let d = econ.reman_depreciation;

        let mut program = ConvexProgram::new(ObjectiveSense::Maximize);

        // Variables
        let qn = program.add_nonnegative_var("q_new", econ.new_margin());
        let qr = program.add_nonnegative_var("q_reman", econ.reman_margin());
        program.add_quadratic(qn, qn, -slope);
        program.add_quadratic(qn, qr, -2.0 * d * slope);
        program.add_quadratic(qr, qr, -d * slope);

        let plant_dc = Product::ALL.map(|p| {
            (0..n_dc)
                .map(|i| {
                    program.add_nonnegative_var(
                        format!("plant_dc_{}_{}", p.label(), i),
                        -config.plant_dc_costs[i],
                    )
                })
                .collect::<Vec<_>>()
        });
        let dc_customer = Product::ALL.map(|p| {
            (0..n_dc)
                .map(|i| {
                    (0..n_cust)
                        .map(|j| {
                            program.add_nonnegative_var(
                                format!("dc_customer_{}_{}_{}", p.label(), i, j),
                                -config.dc_customer_costs[i][j],
                            )
                        })
                        .collect::<Vec<_>>()
                })
                .collect::<Vec<_>>()
        });
        let customer_rc: Vec<Vec<VarId>> = (0..n_cust)
            .map(|j| {
                (0..n_rc)
                    .map(|k| {
                        program.add_nonnegative_var(
                            format!("customer_rc_{}_{}", j, k),
                            -config.customer_rc_costs[j][k],
                        )
                    })
                    .collect()
            })
            .collect();
        let rc_plant: Vec<VarId> = (0..n_rc)
            .map(|k| {
                program.add_nonnegative_var(format!("rc_plant_{}", k), -config.rc_plant_costs[k])
            })
            .collect();

        // Capacity rows
        let caps = capacity_rhs(config, &scenario);
        let capacity = [
            program.add_row("cap_manufacturing", vec![(qn, 1.0)], RowSense::LessEqual, caps[0]),
            program.add_row("cap_remanufacturing", vec![(qr, 1.0)], RowSense::LessEqual, caps[1]),
            program.add_row("cap_market", vec![(qn, 1.0), (qr, 1.0)], RowSense::LessEqual, caps[2]),
            program.add_row("cap_recovery", vec![(qr, 1.0)], RowSense::LessEqual, caps[3]),
        ];

        // Supply rows start closed
        let dc_supply = Product::ALL.map(|p| {
            (0..n_dc)
                .map(|i| {
                    (0..n_cust)
                        .map(|j| {
                            program.add_row(
                                format!("supply_dc_{}_{}_{}", p.label(), i, j),
                                vec![(dc_customer[p.index()][i][j], 1.0)],
                                RowSense::LessEqual,
                                0.0,
                            )
                        })
                        .collect::<Vec<_>>()
                })
                .collect::<Vec<_>>()
        });
        let rc_supply: Vec<Vec<RowId>> = (0..n_cust)
            .map(|j| {
                (0..n_rc)
                    .map(|k| {
                        program.add_row(
                            format!("supply_rc_{}_{}", j, k),
                            vec![(customer_rc[j][k], 1.0)],
                            RowSense::LessEqual,
                            0.0,
                        )
                    })
                    .collect()
            })
            .collect();

        // Recoverable share of what each RC collects
        for k in 0..n_rc {
            let mut coefficients = vec![(rc_plant[k], 1.0)];
            coefficients.extend((0..n_cust).map(|j| (customer_rc[j][k], -scenario.recovery_rate)));
            program.add_row(format!("rc_recovery_{}", k), coefficients, RowSense::LessEqual, 0.0);
        }

        // Forward balance
        for p in Product::ALL {
            let l = p.index();
            let quantity = [qn, qr][l];
            let mut coefficients = vec![(quantity, 1.0)];
            coefficients.extend(plant_dc[l].iter().map(|v| (*v, -1.0)));
            program.add_row(
                format!("plant_balance_{}", p.label()),
                coefficients,
                RowSense::Equal,
                0.0,
            );

            for i in 0..n_dc {
                let mut coefficients = vec![(plant_dc[l][i], 1.0)];
                coefficients.extend(dc_customer[l][i].iter().map(|v| (*v, -1.0)));
                program.add_row(
                    format!("dc_balance_{}_{}", p.label(), i),
                    coefficients,
                    RowSense::Equal,
                    0.0,
                );
            }

            for (j, share) in config.demand_density.iter().enumerate() {
                let mut coefficients = vec![(quantity, *share)];
                coefficients.extend((0..n_dc).map(|i| (dc_customer[l][i][j], -1.0)));
                program.add_row(
                    format!("demand_split_{}_{}", p.label(), j),
                    coefficients,
                    RowSense::Equal,
                    0.0,
                );
            }
        }

        // Reverse balance
        let return_balance: Vec<RowId> = config
            .demand_density
            .iter()
            .enumerate()
            .map(|(j, share)| {
                program.add_row(
                    format!("return_balance_{}", j),
                    customer_rc[j].iter().map(|v| (*v, 1.0)).collect(),
                    RowSense::Equal,
                    scenario.return_quantity * share,
                )
            })
            .collect();
        let mut coefficients = vec![(qr, 1.0)];
        coefficients.extend(rc_plant.iter().map(|v| (*v, -1.0)));
        program.add_row("rc_plant_balance", coefficients, RowSense::Equal, 0.0);

        Self {
            scenario,
            capacity: [config.manufacturing_capacity, config.remanufacturing_capacity],
            program,
            vars: Vars {
                quantity: [qn, qr],
                plant_dc,
                dc_customer,
                customer_rc,
                rc_plant,
            },
            rows: Rows {
                capacity,
                dc_supply,
                rc_supply,
                return_balance,
            },
            decision: FacilityDecision::all_closed(n_dc, n_rc),
        }
    }

    /// Build and immediately apply a decision.
    pub fn for_decision(
        config: &ClscConfig,
        scenario: Scenario,
        decision: &FacilityDecision,
    ) -> Result<Self, SolverError> {
        let mut subproblem = Self::new(config, scenario);
        subproblem.update(decision)?;
        Ok(subproblem)
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn decision(&self) -> &FacilityDecision {
        &self.decision
    }

    pub fn program(&self) -> &ConvexProgram {
        &self.program
    }

    /// Rewrite the supply right-hand sides: open → capacity, closed → zero.
    pub fn update(&mut self, decision: &FacilityDecision) -> Result<(), SolverError> {
        for dc in decision.dcs() {
            for p in Product::ALL {
                let bound = if dc.is_open { self.capacity[p.index()] } else { 0.0 };
                for row in &self.rows.dc_supply[p.index()][dc.id.0] {
                    self.program.set_bound(*row, bound)?;
                }
            }
        }
        let returns = self.scenario.return_quantity;
        for rc in decision.rcs() {
            let bound = if rc.is_open { returns } else { 0.0 };
            for row in &self.rows.rc_supply {
                self.program.set_bound(row[rc.id.0], bound)?;
            }
        }
        self.decision = decision.clone();
        Ok(())
    }

    /// Solve under the current decision and classify the result.
    pub fn solve<S: ConvexSolver + ?Sized>(
        &self,
        solver: &S,
    ) -> Result<SubproblemOutcome, SolverError> {
        let solution = solver.solve(&self.program)?;
        debug!(
            scenario = %self.scenario,
            decision = %self.decision,
            status = ?solution.status,
            iterations = solution.iterations,
            "subproblem solved"
        );
        match solution.status {
            SolveStatus::Optimal => {
                let duals = self.row_values(|rows| solution.duals(rows))?;
                let flows = self.flows(&solution);
                Ok(SubproblemOutcome::Optimal(SubproblemSolution {
                    objective: solution.objective,
                    snapshot: DualSnapshot {
                        scenario: self.scenario,
                        manufactured: flows.manufactured,
                        remanufactured: flows.remanufactured,
                        duals,
                    },
                    flows,
                }))
            }
            SolveStatus::Infeasible => {
                let ray = self.row_values(|rows| solution.certificate(rows))?;
                Ok(SubproblemOutcome::Infeasible(InfeasibilityRay {
                    scenario: self.scenario,
                    ray,
                }))
            }
            status => Ok(SubproblemOutcome::Anomaly {
                status,
                detail: solution.detail,
            }),
        }
    }

    fn flows(&self, solution: &ProgramSolution) -> FlowPlan {
        let v = &self.vars;
        let (new, reman) = (Product::New.index(), Product::Remanufactured.index());
        let grid = |rows: &Vec<Vec<VarId>>| -> Vec<Vec<f64>> {
            rows.iter().map(|row| solution.values(row)).collect()
        };
        FlowPlan {
            manufactured: solution.value(v.quantity[new]),
            remanufactured: solution.value(v.quantity[reman]),
            plant_dc_new: solution.values(&v.plant_dc[new]),
            plant_dc_reman: solution.values(&v.plant_dc[reman]),
            dc_customer_new: grid(&v.dc_customer[new]),
            dc_customer_reman: grid(&v.dc_customer[reman]),
            customer_rc: grid(&v.customer_rc),
            rc_plant: solution.values(&v.rc_plant),
        }
    }

    fn row_values<F>(&self, mut fetch: F) -> Result<RowValues, SolverError>
    where
        F: FnMut(&[RowId]) -> Result<Vec<f64>, SolverError>,
    {
        let rows = &self.rows;
        let capacity = fetch(&rows.capacity[..])?;
        let mut grid = |ids: &Vec<Vec<RowId>>| -> Result<Vec<Vec<f64>>, SolverError> {
            ids.iter().map(|row| fetch(row.as_slice())).collect()
        };
        let dc_supply_new = grid(&rows.dc_supply[Product::New.index()])?;
        let dc_supply_reman = grid(&rows.dc_supply[Product::Remanufactured.index()])?;
        let rc_supply = grid(&rows.rc_supply)?;
        let return_balance = fetch(rows.return_balance.as_slice())?;
        Ok(RowValues {
            capacity: [capacity[0], capacity[1], capacity[2], capacity[3]],
            dc_supply_new,
            dc_supply_reman,
            rc_supply,
            return_balance,
        })
    }
}

/// A-priori upper bound on the expected operational profit of any decision.
///
/// Revenue of each product is at most its margin times its tightest cap;
/// flow costs are non-negative so they are dropped.
pub fn profit_upper_bound(config: &ClscConfig, scenarios: &[Scenario]) -> f64 {
    if scenarios.is_empty() {
        return 0.0;
    }
    let econ = &config.economics;
    let total: f64 = scenarios
        .iter()
        .map(|s| {
            let new_cap = config.manufacturing_capacity.min(s.market_size);
            let reman_cap = config
                .remanufacturing_capacity
                .min(s.remanufacturable())
                .min(s.market_size);
            econ.new_margin().max(0.0) * new_cap + econ.reman_margin().max(0.0) * reman_cap
        })
        .sum();
    total / scenarios.len() as f64
}
