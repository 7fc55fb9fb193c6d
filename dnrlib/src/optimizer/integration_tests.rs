use super::*;
use crate::graph::{Network, NetworkBuilder};
use crate::switches::SwitchSettings;
use crate::types::*;
use approx::assert_relative_eq;

/// Two feeders with long junction chains, a dead-end branch and three meshes.
///
/// ```text
///  P1 -L- J1 -L- J2 -L- J3 -L- A -Sab- B -L- J4 -S45- J5 -L- P2
///  |                           |  \
///  L                           L   Sac
///  |                           |     \
///  J6 -Sc6- C -----------------K1    C
///                              |
///                              L- K2
/// ```
/// C hangs from P1 through J6 and from A through Sac.
fn feeders() -> (Arc<Network>, Vec<Complex>) {
    let mut b = NetworkBuilder::new();
    let p1 = b.add_provider("P1", 10.0);
    let j1 = b.add_connection("J1");
    let j2 = b.add_connection("J2");
    let j3 = b.add_connection("J3");
    let a = b.add_consumer("A");
    let bb = b.add_consumer("B");
    let j4 = b.add_connection("J4");
    let j5 = b.add_connection("J5");
    let p2 = b.add_provider("P2", 10.0);
    let c = b.add_consumer("C");
    let j6 = b.add_connection("J6");
    let k1 = b.add_connection("K1");
    let k2 = b.add_connection("K2");
    b.add_line("P1-J1", p1, j1);
    b.add_line("J1-J2", j1, j2);
    b.add_line("J2-J3", j2, j3);
    b.add_line("J3-A", j3, a);
    b.add_switch("Sab", a, bb);
    b.add_line("B-J4", bb, j4);
    b.add_switch("S45", j4, j5);
    b.add_line("J5-P2", j5, p2);
    b.add_switch("Sac", a, c);
    b.add_switch("Sc6", c, j6);
    b.add_line("J6-P1", j6, p1);
    b.add_line("A-K1", a, k1);
    b.add_line("K1-K2", k1, k2);
    let network = Arc::new(b.build().unwrap());
    let mut demands = vec![Complex::default(); network.bus_count()];
    demands[a] = Complex::new(200.0, 20.0);
    demands[bb] = Complex::new(100.0, 10.0);
    demands[c] = Complex::new(150.0, 0.0);
    (network, demands)
}

fn start() -> Solution {
    let (network, demands) = feeders();
    let problem = Arc::new(Problem::single_period(Arc::clone(&network), demands).unwrap());
    Solution::uniform(problem, SwitchSettings::all_closed(&network)).unwrap()
}

fn config(aggregate: bool) -> OptimizerConfig {
    OptimizerConfig {
        aggregate,
        seed: Some(3),
        ..Default::default()
    }
}

type Published = Arc<Mutex<Vec<(Arc<Solution>, Evaluation)>>>;

fn recording(optimizer: &mut ConfigOptimizer) -> Published {
    let published: Published = Default::default();
    let sink = Arc::clone(&published);
    optimizer.add_listener(move |event| {
        if let OptimizerEvent::BestFullSolutionFound {
            solution,
            evaluation,
        } = event
        {
            sink.lock().push((Arc::clone(solution), evaluation.clone()));
        }
    });
    published
}

#[test]
fn aggregated_search_publishes_verified_solutions() {
    let mut optimizer = ConfigOptimizer::new(config(true));
    let published = recording(&mut optimizer);
    let result = optimizer.optimize(start(), &StopSignal::new()).unwrap();

    let best = result.best.clone().unwrap();
    let evaluation = result.evaluation.clone().unwrap();
    assert!(evaluation.is_feasible());
    assert!(result.stop_reason.is_none());

    let published = published.lock();
    assert_eq!(published.len(), result.published);
    let (last, last_evaluation) = published.last().unwrap();
    assert!(Arc::ptr_eq(last, &best));
    assert_eq!(last_evaluation, &evaluation);
    for pair in published.windows(2) {
        assert!(pair[1].1.is_better_than(&pair[0].1));
    }

    // The published settings are exactly what the aggregated settings stand for.
    let network = best.network();
    let aggregation = NetworkAggregation::new(Arc::clone(network)).unwrap();
    let settings = &best.settings()[0];
    let aggregate = aggregation.aggregate_settings(settings).unwrap();
    assert_eq!(&aggregation.disaggregate_settings(&aggregate).unwrap(), settings);
    for line in settings.open_lines() {
        assert!(network.line(line).switchable);
    }

    // Recomputed from the settings alone.
    let mut recomputed = Solution::new(Arc::clone(best.problem()), best.settings()).unwrap();
    recomputed
        .set_start_settings(best.start_settings().to_vec())
        .unwrap();
    let again = optimizer
        .criteria()
        .evaluate(&mut recomputed, &LinearFlowProvider)
        .unwrap();
    assert!(again.is_feasible());
    assert_relative_eq!(again.objective, evaluation.objective, max_relative = 1e-12);
    assert!(recomputed.topology(0).unwrap().is_radial());
}

#[test]
fn full_size_search_is_feasible() {
    let optimizer = ConfigOptimizer::new(config(false));
    let result = optimizer.optimize(start(), &StopSignal::new()).unwrap();
    let evaluation = result.evaluation.unwrap();
    assert!(evaluation.is_feasible());
    assert!(evaluation.objective > 0.0);
    assert_eq!(result.start.settings()[0].open_count(), 0);
}

#[test]
fn reused_flows_give_the_same_losses() {
    let mut reuse = config(true);
    reuse.reuse_disaggregated_flows = true;
    let with_reuse = ConfigOptimizer::new(reuse)
        .optimize(start(), &StopSignal::new())
        .unwrap();
    let best = with_reuse.best.unwrap();
    let evaluation = with_reuse.evaluation.unwrap();
    assert!(evaluation.is_feasible());

    let mut recomputed = Solution::new(Arc::clone(best.problem()), best.settings()).unwrap();
    let again = CriteriaSet::standard(0.0)
        .evaluate(&mut recomputed, &LinearFlowProvider)
        .unwrap();
    assert_relative_eq!(again.objective, evaluation.objective, max_relative = 1e-9);
}

#[test]
fn triggered_stop_still_verifies_the_start() {
    let optimizer = ConfigOptimizer::new(config(true));
    let stop = StopSignal::new();
    stop.trigger("interrupted");
    let result = optimizer.optimize(start(), &stop).unwrap();
    assert_eq!(result.stop_reason.as_deref(), Some("interrupted"));
    assert_eq!(result.published, 1);
    // Nothing was repaired, the all-closed start has cycles.
    assert!(!result.evaluation.unwrap().is_feasible());
}

#[test]
fn gap_tolerance_stops_early() {
    let mut generous = config(true);
    generous.gap_tolerance = f64::INFINITY;
    let result = ConfigOptimizer::new(generous)
        .optimize(start(), &StopSignal::new())
        .unwrap();
    assert!(result.evaluation.unwrap().is_feasible());
    assert!(result.published >= 1);
    assert_eq!(result.stop_reason.as_deref(), Some("gap tolerance reached"));
}

#[test]
fn events_report_sub_optimizers_and_local_optima() {
    let mut optimizer = ConfigOptimizer::new(config(true));
    let names: Arc<Mutex<Vec<String>>> = Default::default();
    let sink = Arc::clone(&names);
    optimizer.add_listener(move |event| match event {
        OptimizerEvent::SubOptimizerStarted { name } => sink.lock().push(name.clone()),
        OptimizerEvent::LocalOptimumFound { aggregated, .. } => {
            assert!(aggregated);
            sink.lock().push("optimum".to_string());
        }
        OptimizerEvent::BestFullSolutionFound { .. } => {}
    });
    optimizer.optimize(start(), &StopSignal::new()).unwrap();
    let names = names.lock();
    assert_eq!(names.first().map(String::as_str), Some("steepestDescent"));
    assert_eq!(names.last().map(String::as_str), Some("optimum"));
}

#[test]
fn rejects_invalid_config() {
    let mut bad = config(true);
    bad.queue_capacity = 0;
    assert!(ConfigOptimizer::new(bad).optimize(start(), &StopSignal::new()).is_err());
}

#[test]
fn config_defaults_from_json() {
    let config: OptimizerConfig =
        serde_json::from_str(r#"{"aggregate": false, "timeLimitSecs": 2.5}"#).unwrap();
    assert!(!config.aggregate);
    assert_eq!(config.time_limit_secs, Some(2.5));
    assert_eq!(config.queue_capacity, 4);
    assert_eq!(config.search, SearchKind::SteepestDescent);
}

#[test]
fn constructor_repairs_every_period() {
    let mut solution = start();
    let mut rng = create_rng(Some(11));
    let repaired = FeasibleSolutionConstructor::default()
        .construct(&mut solution, &mut rng, &StopSignal::new())
        .unwrap();
    assert!(repaired);
    assert!(solution.topology(0).unwrap().is_radial());
}
