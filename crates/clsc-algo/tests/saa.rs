//! SAA runs on the clarabel backend

use clsc_algo::test_utils::{example_distribution, single_site_config, two_site_config};
use clsc_algo::{
    distinct_configurations, evaluate_decision, run_disposal_sweep, run_saa, ClarabelSolver,
    EvaluationOptions, SaaSettings, SampleStatistics,
};
use clsc_core::{generate_scenarios, FacilityDecision};

fn settings(replications: usize, sample_size: usize, seed: u64) -> SaaSettings {
    SaaSettings {
        replications,
        sample_size,
        seed,
        ..SaaSettings::default()
    }
}

#[test]
fn test_single_replication_single_scenario() {
    let report =
        run_saa(&single_site_config(), &example_distribution(), &settings(1, 1, 42)).unwrap();

    assert_eq!(report.replications.len(), 1);
    assert_eq!(report.best_candidate.decision, FacilityDecision::all_open(1, 1));
    assert!(report.best_candidate.profit >= 0.0);
    assert_eq!(report.mean, report.best_candidate.profit);
    assert_eq!(report.variance, 0.0);
    assert!(report.out_of_sample.is_none());
}

#[test]
fn test_same_seed_reproduces_run() {
    let config = two_site_config();
    let a = run_saa(&config, &example_distribution(), &settings(2, 3, 7)).unwrap();
    let b = run_saa(&config, &example_distribution(), &settings(2, 3, 7)).unwrap();

    assert_eq!(a.profits(), b.profits());
    for (x, y) in a.replications.iter().zip(&b.replications) {
        assert_eq!(x.candidate.decision, y.candidate.decision);
    }
}

#[test]
fn test_half_batches_combine_to_full_estimate() {
    let report =
        run_saa(&single_site_config(), &example_distribution(), &settings(4, 3, 3)).unwrap();
    let profits = report.profits();

    let first = SampleStatistics::from_values(profits[..2].iter().copied());
    let second = SampleStatistics::from_values(profits[2..].iter().copied());
    let merged = first.merge(&second);

    assert_eq!(merged.count(), 4);
    assert!((merged.mean() - report.mean).abs() < 1e-9 * report.mean.abs().max(1.0));
    assert!((merged.variance_of_mean() - report.variance).abs() < 1e-9 * report.variance.max(1.0));
    // each replication differs in its scenarios, so their profits spread
    assert!(report.variance > 0.0);
}

#[test]
fn test_out_of_sample_selects_best_configuration() {
    let config = two_site_config();
    let run = SaaSettings {
        evaluation_size: 5,
        ..settings(3, 2, 11)
    };
    let report = run_saa(&config, &example_distribution(), &run).unwrap();
    let selection = report.out_of_sample.as_ref().expect("step two ran");

    let distinct = distinct_configurations(report.replications.iter().map(|r| &r.candidate));
    assert_eq!(selection.evaluated.len(), distinct.len());
    for (estimate, decision) in selection.evaluated.iter().zip(&distinct) {
        assert_eq!(&estimate.decision, decision);
        assert_eq!(estimate.statistics.count(), 5);
        assert!(selection.mean >= estimate.mean());
    }
    assert_eq!(report.best_candidate.decision, selection.best);
    assert!((selection.combined_variance - (report.variance + selection.variance)).abs() < 1e-9);
}

#[test]
fn test_disposal_sweep_raises_profit() {
    let points = run_disposal_sweep(
        &single_site_config(),
        &example_distribution(),
        &settings(1, 2, 5),
        &[0.0, 100.0],
    )
    .unwrap();

    assert_eq!(points.len(), 2);
    assert_eq!(points[0].disposal_cost, 0.0);
    assert_eq!(points[1].disposal_cost, 100.0);
    // a dearer disposal makes remanufacturing the cheaper way out for returns
    let (cheap, dear) = (points[0].report.mean, points[1].report.mean);
    assert!(dear >= cheap - 2.0 - 1e-3 * cheap.abs());
}

#[test]
fn test_return_handling_leaves_variance_unchanged() {
    let config = single_site_config();
    let decision = FacilityDecision::all_open(1, 1);
    let scenarios = generate_scenarios(&example_distribution(), 1, 6, 3)
        .unwrap()
        .into_sets()
        .remove(0);
    let solver = ClarabelSolver::new();
    let evaluate = |net_of_return_handling| {
        let options = EvaluationOptions {
            net_of_return_handling,
            parallel: false,
        };
        evaluate_decision(&config, &decision, &scenarios, &solver, options).unwrap()
    };

    let gross = evaluate(false);
    let net = evaluate(true);
    let mean_returns = scenarios.iter().map(|s| s.return_quantity).sum::<f64>() / 6.0;
    let handling = config.economics.return_handling_cost();

    assert!(gross.variance_of_mean() > 0.0);
    assert_eq!(net.variance_of_mean(), gross.variance_of_mean());
    let expected = gross.mean() - handling * mean_returns;
    assert!((net.mean() - expected).abs() < 1e-9 * expected.abs().max(1.0));
}
