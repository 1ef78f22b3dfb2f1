//! Sample average approximation around the decomposition.
//!
//! Step one solves `M` independent `N`-scenario problems and reports the
//! mean of their optimal profits with the variance of that mean. Step two
//! (when `evaluation_size > 0`) re-scores every distinct facility
//! configuration on a fresh, larger sample with the facilities held fixed,
//! keeps the best one and adds its estimator variance to the first-stage
//! variance.

use crate::benders::{run_decomposition_with, BendersSettings};
use crate::error::BendersError;
use crate::master::MipSolver;
use crate::solution::CandidateSolution;
use crate::solver::{ClarabelSolver, ConvexSolver};
use crate::stats::SampleStatistics;
use crate::subproblem::{Subproblem, SubproblemOutcome};
use clsc_core::{ClscConfig, DistributionParams, FacilityDecision, Scenario, ScenarioGenerator};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::info;

/// Offset separating the evaluation stream from the optimization stream.
const EVALUATION_SEED_OFFSET: u64 = 0x9E37_79B9_7F4A_7C15;

fn default_replications() -> usize {
    10
}

fn default_sample_size() -> usize {
    20
}

fn default_net_of_return_handling() -> bool {
    true
}

/// SAA run parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaaSettings {
    /// Number of independent scenario sets (`M`)
    #[serde(default = "default_replications")]
    pub replications: usize,
    /// Scenarios per set (`N`)
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
    /// Scenarios per configuration in step two (`N'`); zero skips step two
    #[serde(default)]
    pub evaluation_size: usize,
    #[serde(default)]
    pub seed: u64,
    /// Step-two distribution; the optimization distribution when unset
    #[serde(default)]
    pub out_of_sample: Option<DistributionParams>,
    /// Subtract `(holding + disposal) · returns` from step-two profits
    #[serde(default = "default_net_of_return_handling")]
    pub net_of_return_handling: bool,
    #[serde(default)]
    pub benders: BendersSettings,
}

impl Default for SaaSettings {
    fn default() -> Self {
        Self {
            replications: default_replications(),
            sample_size: default_sample_size(),
            evaluation_size: 0,
            seed: 0,
            out_of_sample: None,
            net_of_return_handling: default_net_of_return_handling(),
            benders: BendersSettings::default(),
        }
    }
}

/// One step-one decomposition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Replication {
    pub index: usize,
    pub candidate: CandidateSolution,
    pub elapsed: Duration,
}

/// Large-sample estimate of one fixed configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationEstimate {
    pub decision: FacilityDecision,
    pub statistics: SampleStatistics,
}

impl ConfigurationEstimate {
    pub fn mean(&self) -> f64 {
        self.statistics.mean()
    }

    pub fn variance(&self) -> f64 {
        self.statistics.variance_of_mean()
    }
}

/// Step-two result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutOfSampleSelection {
    pub best: FacilityDecision,
    pub mean: f64,
    pub variance: f64,
    /// First-stage variance plus `variance`
    pub combined_variance: f64,
    /// Every distinct configuration, in first-seen order
    pub evaluated: Vec<ConfigurationEstimate>,
}

/// Outcome of an SAA run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaaReport {
    pub replications: Vec<Replication>,
    pub statistics: SampleStatistics,
    /// Mean of the replication profits
    pub mean: f64,
    /// Variance of that mean
    pub variance: f64,
    /// Candidate of the selected configuration (step two) or the most
    /// profitable replication
    pub best_candidate: CandidateSolution,
    pub out_of_sample: Option<OutOfSampleSelection>,
}

impl SaaReport {
    pub fn profits(&self) -> Vec<f64> {
        self.replications.iter().map(|r| r.candidate.profit).collect()
    }

    pub fn summary(&self) -> String {
        let mut s = String::new();
        s.push_str(&format!("SAA Summary\n{}\n", "=".repeat(40)));
        s.push_str(&format!("Replications: {}\n", self.replications.len()));
        s.push_str(&format!("Mean profit: {:.4}\n", self.mean));
        s.push_str(&format!("Variance of mean: {:.4}\n", self.variance));
        for r in &self.replications {
            s.push_str(&format!(
                "  #{:<3} {:>14.4}  {}  ({:.2?})\n",
                r.index, r.candidate.profit, r.candidate.decision, r.elapsed
            ));
        }
        if let Some(selection) = &self.out_of_sample {
            s.push_str(&format!(
                "Selected {} out of sample: mean {:.4}, variance {:.4}, combined variance {:.4}\n",
                selection.best, selection.mean, selection.variance, selection.combined_variance
            ));
        }
        s
    }
}

/// Options for scoring a fixed configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationOptions {
    pub net_of_return_handling: bool,
    pub parallel: bool,
}

/// Distinct configurations in first-seen order.
pub fn distinct_configurations<'a, I>(candidates: I) -> Vec<FacilityDecision>
where
    I: IntoIterator<Item = &'a CandidateSolution>,
{
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.decision.clone()))
        .map(|c| c.decision.clone())
        .collect()
}

/// Profit statistics of a fixed configuration over a scenario sample.
///
/// Per scenario: subproblem optimum minus fixed cost. When requested, the
/// return handling baseline `(holding + disposal) · mean(returns)` is then
/// taken off the mean only; the spread is that of the operational profits.
/// Any non-optimal scenario is an error.
pub fn evaluate_decision<S: ConvexSolver + ?Sized>(
    config: &ClscConfig,
    decision: &FacilityDecision,
    scenarios: &[Scenario],
    solver: &S,
    options: EvaluationOptions,
) -> Result<SampleStatistics, BendersError> {
    let fixed = config.fixed_cost(decision);
    let profit = |scenario: &Scenario| -> Result<f64, BendersError> {
        let outcome = Subproblem::for_decision(config, *scenario, decision)?.solve(solver)?;
        match outcome {
            SubproblemOutcome::Optimal(solution) => Ok(solution.objective - fixed),
            other => Err(BendersError::Evaluation {
                decision: decision.to_string(),
                status: other.status(),
            }),
        }
    };

    let profits = solve_all(scenarios, profit, options.parallel)?;
    let statistics = SampleStatistics::from_values(profits);
    if !options.net_of_return_handling || scenarios.is_empty() {
        return Ok(statistics);
    }
    let mean_returns =
        scenarios.iter().map(|s| s.return_quantity).sum::<f64>() / scenarios.len() as f64;
    let baseline = config.economics.return_handling_cost() * mean_returns;
    Ok(statistics.shifted(-baseline))
}

#[cfg_attr(not(feature = "parallel"), allow(unused_variables))]
fn solve_all<F>(scenarios: &[Scenario], profit: F, parallel: bool) -> Result<Vec<f64>, BendersError>
where
    F: Fn(&Scenario) -> Result<f64, BendersError> + Send + Sync,
{
    #[cfg(feature = "parallel")]
    if parallel {
        use rayon::prelude::*;
        return scenarios.par_iter().map(&profit).collect();
    }

    scenarios.iter().map(profit).collect()
}

/// SAA with the clarabel subproblem backend and the built-in master.
pub fn run_saa(
    config: &ClscConfig,
    params: &DistributionParams,
    settings: &SaaSettings,
) -> Result<SaaReport, BendersError> {
    run_saa_with(
        config,
        params,
        settings,
        &ClarabelSolver::default(),
        &settings.benders.branch_and_bound(),
    )
}

/// SAA with explicit solver capabilities.
pub fn run_saa_with<S, M>(
    config: &ClscConfig,
    params: &DistributionParams,
    settings: &SaaSettings,
    solver: &S,
    mip: &M,
) -> Result<SaaReport, BendersError>
where
    S: ConvexSolver + ?Sized,
    M: MipSolver + ?Sized,
{
    if settings.replications == 0 || settings.sample_size == 0 {
        return Err(BendersError::InvalidSampleSize {
            m: settings.replications,
            n: settings.sample_size,
        });
    }
    config.validate()?;
    let grid = ScenarioGenerator::new(*params, settings.seed)?
        .generate(settings.replications, settings.sample_size);

    // Step one
    let mut replications = Vec::with_capacity(grid.num_sets());
    for (index, scenarios) in grid.sets().enumerate() {
        let started = Instant::now();
        let candidate = run_decomposition_with(config, scenarios, &settings.benders, solver, mip)?;
        let elapsed = started.elapsed();
        info!(
            replication = index,
            profit = candidate.profit,
            decision = %candidate.decision,
            ?elapsed,
            "SAA replication finished"
        );
        replications.push(Replication {
            index,
            candidate,
            elapsed,
        });
    }
    let statistics = SampleStatistics::from_values(replications.iter().map(|r| r.candidate.profit));
    info!(
        mean = statistics.mean(),
        variance = statistics.variance_of_mean(),
        "SAA step one finished"
    );

    // Step two
    let out_of_sample = if settings.evaluation_size > 0 {
        Some(select_out_of_sample(config, params, settings, solver, &replications, &statistics)?)
    } else {
        None
    };

    let chosen = match &out_of_sample {
        Some(selection) => replications
            .iter()
            .find(|r| r.candidate.decision == selection.best),
        None => replications.iter().fold(None, |best: Option<&Replication>, r| match best {
            Some(b) if b.candidate.profit >= r.candidate.profit => Some(b),
            _ => Some(r),
        }),
    };
    let best_candidate = chosen
        .map(|r| r.candidate.clone())
        .ok_or(BendersError::MasterInfeasible)?;

    Ok(SaaReport {
        mean: statistics.mean(),
        variance: statistics.variance_of_mean(),
        statistics,
        replications,
        best_candidate,
        out_of_sample,
    })
}

fn select_out_of_sample<S: ConvexSolver + ?Sized>(
    config: &ClscConfig,
    params: &DistributionParams,
    settings: &SaaSettings,
    solver: &S,
    replications: &[Replication],
    first_stage: &SampleStatistics,
) -> Result<OutOfSampleSelection, BendersError> {
    let evaluation_params = settings.out_of_sample.unwrap_or(*params);
    let mut generator = ScenarioGenerator::new(
        evaluation_params,
        settings.seed.wrapping_add(EVALUATION_SEED_OFFSET),
    )?;
    let options = EvaluationOptions {
        net_of_return_handling: settings.net_of_return_handling,
        parallel: settings.benders.parallel,
    };

    let mut evaluated = Vec::new();
    for decision in distinct_configurations(replications.iter().map(|r| &r.candidate)) {
        let scenarios = generator.sample_set(settings.evaluation_size);
        let statistics = evaluate_decision(config, &decision, &scenarios, solver, options)?;
        info!(
            %decision,
            mean = statistics.mean(),
            variance = statistics.variance_of_mean(),
            "configuration evaluated out of sample"
        );
        evaluated.push(ConfigurationEstimate {
            decision,
            statistics,
        });
    }

    let best = evaluated
        .iter()
        .fold(None, |best: Option<&ConfigurationEstimate>, e| match best {
            Some(b) if b.mean() >= e.mean() => Some(b),
            _ => Some(e),
        })
        .ok_or(BendersError::MasterInfeasible)?;

    Ok(OutOfSampleSelection {
        best: best.decision.clone(),
        mean: best.mean(),
        variance: best.variance(),
        combined_variance: first_stage.variance_of_mean() + best.variance(),
        evaluated: evaluated.clone(),
    })
}

/// One point of a disposal-cost sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepPoint {
    pub disposal_cost: f64,
    pub report: SaaReport,
}

/// Repeat the SAA with each disposal cost in turn.
pub fn run_disposal_sweep(
    config: &ClscConfig,
    params: &DistributionParams,
    settings: &SaaSettings,
    costs: &[f64],
) -> Result<Vec<SweepPoint>, BendersError> {
    costs
        .iter()
        .map(|&disposal_cost| {
            info!(disposal_cost, "disposal sweep step");
            let report = run_saa(&config.with_disposal_cost(disposal_cost), params, settings)?;
            Ok(SweepPoint {
                disposal_cost,
                report,
            })
        })
        .collect()
}
