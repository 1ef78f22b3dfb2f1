//! Flow plans and decomposition results.

use crate::master::MasterStatus;
use clsc_core::{ClscConfig, DcId, FacilityDecision, RcId, Scenario};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::time::Duration;

/// Production quantities and flows of one solved scenario subproblem.
///
/// Tiers are split by product kind where the network carries both:
/// `*_new` for newly manufactured units, `*_reman` for remanufactured ones.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FlowPlan {
    pub manufactured: f64,
    pub remanufactured: f64,
    /// Plant → DC, indexed by DC
    pub plant_dc_new: Vec<f64>,
    pub plant_dc_reman: Vec<f64>,
    /// DC → customer, `[dc][customer]`
    pub dc_customer_new: Vec<Vec<f64>>,
    pub dc_customer_reman: Vec<Vec<f64>>,
    /// Customer → RC, `[customer][rc]`
    pub customer_rc: Vec<Vec<f64>>,
    /// RC → plant, indexed by RC
    pub rc_plant: Vec<f64>,
}

impl FlowPlan {
    /// Units shipped by a DC (new plus remanufactured).
    pub fn dc_throughput(&self, dc: DcId) -> f64 {
        self.plant_dc_new.get(dc.0).copied().unwrap_or(0.0)
            + self.plant_dc_reman.get(dc.0).copied().unwrap_or(0.0)
    }

    /// Returns collected by an RC.
    pub fn rc_collected(&self, rc: RcId) -> f64 {
        self.customer_rc.iter().filter_map(|row| row.get(rc.0)).sum()
    }

    /// Largest violation of the network balance conditions under a scenario.
    ///
    /// Covers production = plant outflow, DC inflow = DC outflow, the demand
    /// split across customers, customer returns = return share, and RC
    /// shipments bounded by recoverable returns.
    pub fn max_balance_violation(&self, config: &ClscConfig, scenario: &Scenario) -> f64 {
        let density = &config.demand_density;
        let mut worst: f64 = 0.0;
        let mut check = |gap: f64| worst = worst.max(gap.abs());

        check(self.manufactured - self.plant_dc_new.iter().sum::<f64>());
        check(self.remanufactured - self.plant_dc_reman.iter().sum::<f64>());
        check(self.remanufactured - self.rc_plant.iter().sum::<f64>());

        for i in 0..config.num_dcs() {
            check(self.plant_dc_new[i] - self.dc_customer_new[i].iter().sum::<f64>());
            check(self.plant_dc_reman[i] - self.dc_customer_reman[i].iter().sum::<f64>());
        }

        for (j, share) in density.iter().enumerate() {
            let new_in: f64 = self.dc_customer_new.iter().map(|row| row[j]).sum();
            let reman_in: f64 = self.dc_customer_reman.iter().map(|row| row[j]).sum();
            check(share * self.manufactured - new_in);
            check(share * self.remanufactured - reman_in);
            check(self.customer_rc[j].iter().sum::<f64>() - scenario.return_quantity * share);
        }

        for k in 0..config.num_rcs() {
            let recoverable = scenario.recovery_rate * self.rc_collected(RcId(k));
            check((self.rc_plant[k] - recoverable).max(0.0));
        }
        worst
    }
}

/// Result of one Benders decomposition over a scenario set.
///
/// Two candidates compare equal (and hash alike) when they open the same
/// facilities, whatever their profits or flows; the SAA loop relies on this
/// to deduplicate configurations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSolution {
    /// Expected profit net of fixed costs
    pub profit: f64,
    pub decision: FacilityDecision,
    /// Flows of the first scenario at the accepted incumbent
    pub flows: Option<FlowPlan>,
    pub status: MasterStatus,
    pub nodes: usize,
    pub optimality_cuts: usize,
    pub feasibility_cuts: usize,
    /// Incumbents skipped after a subproblem anomaly
    pub anomalies: usize,
    /// Objective of every accepted incumbent, in acceptance order
    pub accepted_profits: Vec<f64>,
    pub solve_time: Duration,
}

impl CandidateSolution {
    pub fn cut_count(&self) -> usize {
        self.optimality_cuts + self.feasibility_cuts
    }

    pub fn opened_dcs(&self) -> Vec<DcId> {
        self.decision.opened_dcs()
    }

    pub fn opened_rcs(&self) -> Vec<RcId> {
        self.decision.opened_rcs()
    }

    pub fn fixed_cost(&self, config: &ClscConfig) -> f64 {
        config.fixed_cost(&self.decision)
    }

    /// Human-readable summary.
    pub fn summary(&self) -> String {
        let mut s = String::new();
        s.push_str(&format!("Candidate {}\n", self.decision));
        s.push_str(&format!("Status: {:?}\n", self.status));
        s.push_str(&format!("Expected profit: {:.4}\n", self.profit));
        s.push_str(&format!(
            "Nodes: {}  Cuts: {} ({} optimality, {} feasibility)\n",
            self.nodes,
            self.cut_count(),
            self.optimality_cuts,
            self.feasibility_cuts
        ));
        if let Some(flows) = &self.flows {
            s.push_str(&format!(
                "Manufactured: {:.4}  Remanufactured: {:.4}\n",
                flows.manufactured, flows.remanufactured
            ));
        }
        s.push_str(&format!("Solve Time: {:.2?}\n", self.solve_time));
        s
    }
}

impl PartialEq for CandidateSolution {
    fn eq(&self, other: &Self) -> bool {
        self.decision == other.decision
    }
}

impl Eq for CandidateSolution {}

impl Hash for CandidateSolution {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.decision.hash(state);
    }
}
