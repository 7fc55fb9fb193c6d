use super::*;
use crate::create_rng;
use crate::flow::LinearFlowProvider;
use crate::graph::NetworkBuilder;
use crate::solution::{Period, Problem};
use crate::switches::SwitchSettings;
use std::sync::Arc;

const S1: LineIndex = 1;
const S2: LineIndex = 2;

/// P -L0- A -S1- B -S2- P with 100 kW at A and B. Opening S1 halves the losses of opening S2.
fn ring(periods: usize) -> Arc<Problem> {
    let mut b = NetworkBuilder::new();
    let p = b.add_provider("P", 10.0);
    let a = b.add_consumer("A");
    let c = b.add_consumer("B");
    b.add_line("L0", p, a);
    b.add_switch("S1", a, c);
    b.add_switch("S2", c, p);
    let network = Arc::new(b.build().unwrap());
    let demands = vec![
        Complex::default(),
        Complex::new(100.0, 0.0),
        Complex::new(100.0, 0.0),
    ];
    let periods = (0..periods)
        .map(|i| Period {
            name: format!("t{i}"),
            duration_hours: 1.0,
            demands: demands.clone(),
        })
        .collect();
    Arc::new(Problem::new(network, periods).unwrap())
}

fn solution(problem: &Arc<Problem>, open: LineIndex) -> Solution {
    let settings = SwitchSettings::with_open(problem.network(), [open]);
    let mut solution = Solution::uniform(Arc::clone(problem), settings).unwrap();
    solution.ensure_valid();
    solution
}

#[derive(Debug, PartialEq)]
enum Seen {
    NewBest(Vec<LineIndex>),
    LocalOptimum,
}

fn run(
    search: &dyn LocalSearch,
    start: Solution,
    stop: &StopSignal,
) -> (Solution, Evaluation, Vec<Seen>) {
    let criteria = CriteriaSet::standard(0.0);
    let mut rng = create_rng(Some(7));
    let mut seen = Vec::new();
    let mut listener = |event: SearchEvent<'_>| match event {
        SearchEvent::NewBest { solution, .. } => {
            seen.push(Seen::NewBest(solution.settings()[0].open_lines().collect()))
        }
        SearchEvent::LocalOptimum { .. } => seen.push(Seen::LocalOptimum),
    };
    let (solution, evaluation) = {
        let mut context = SearchContext {
            criteria: &criteria,
            flow_provider: &LinearFlowProvider,
            stop,
            rng: &mut rng,
            listener: &mut listener,
        };
        search.search(start, &mut context).unwrap()
    };
    (solution, evaluation, seen)
}

#[test]
fn swaps_follow_the_closed_cycle() {
    let problem = ring(1);
    let start = solution(&problem, S2);
    let moves = swap_neighborhood(&start, 0).unwrap();
    assert_eq!(
        moves,
        vec![SwapMove {
            period: 0,
            close: S2,
            open: S1
        }]
    );
    assert!(moves[0].changes_anything(&start));
    let noop = SwapMove {
        period: 0,
        close: S1,
        open: S2,
    };
    assert!(!noop.changes_anything(&start));
}

#[test]
fn swaps_across_providers() {
    let mut b = NetworkBuilder::new();
    let p1 = b.add_provider("P1", 10.0);
    let a = b.add_consumer("A");
    let c = b.add_consumer("B");
    let p2 = b.add_provider("P2", 10.0);
    b.add_line("L0", p1, a);
    let tie = b.add_switch("S1", a, c);
    let feeder = b.add_switch("S2", c, p2);
    let network = Arc::new(b.build().unwrap());
    let problem = Arc::new(Problem::single_period(network, vec![Complex::default(); 4]).unwrap());
    let start = solution(&problem, tie);
    let moves = swap_neighborhood(&start, 0).unwrap();
    assert_eq!(
        moves,
        vec![SwapMove {
            period: 0,
            close: tie,
            open: feeder
        }]
    );
}

#[test]
fn applied_swap_stays_radial() {
    let problem = ring(1);
    let mut start = solution(&problem, S2);
    let swap = SwapMove {
        period: 0,
        close: S2,
        open: S1,
    };
    swap.apply(&mut start).unwrap();
    start.ensure_valid();
    assert!(start.topology(0).unwrap().is_radial());
    assert!(start.configuration(0).is_open(S1));
    assert_eq!(start.configuration(0).rebuild_stats().incremental, 1);
}

#[test]
fn steepest_descent_finds_the_balanced_opening() {
    let problem = ring(1);
    let (best, evaluation, seen) = run(&SteepestDescent, solution(&problem, S2), &StopSignal::new());
    assert!(best.configuration(0).is_open(S1));
    assert!(evaluation.is_feasible());
    assert_eq!(seen, vec![Seen::NewBest(vec![S1]), Seen::LocalOptimum]);
}

#[test]
fn triggered_stop_returns_the_start() {
    let problem = ring(1);
    let stop = StopSignal::new();
    stop.trigger("test");
    let (best, _, seen) = run(&SteepestDescent, solution(&problem, S2), &stop);
    assert!(best.configuration(0).is_open(S2));
    assert!(seen.is_empty());
}

#[test]
fn iterated_descent_is_never_worse() {
    let problem = ring(2);
    let search = IteratedDescent {
        kicks: 3,
        kick_size: 2,
    };
    let (best, evaluation, seen) = run(&search, solution(&problem, S2), &StopSignal::new());
    for period in 0..2 {
        assert!(best.configuration(period).is_open(S1));
    }
    assert!(evaluation.is_feasible());
    assert_eq!(
        seen.iter()
            .filter(|s| matches!(s, Seen::NewBest(_)))
            .count(),
        2
    );
}

#[test]
fn copy_period() {
    let problem = ring(2);
    let mut start = solution(&problem, S2);
    start.configuration_mut(1).set_switch(S2, false).unwrap();
    start.configuration_mut(1).set_switch(S1, true).unwrap();
    let copy = CopyPeriodMove { from: 0, to: 1 };
    assert!(copy.changes_anything(&start));
    copy.apply(&mut start).unwrap();
    assert!(!copy.changes_anything(&start));
    assert!(start.configuration(1).is_open(S2));

    start.ensure_valid();
    let moves = neighborhood(&start).unwrap();
    // One swap per period, no copies between equal periods.
    assert_eq!(moves.len(), 2);
}

#[test]
fn search_kind_from_json() {
    let kind: SearchKind =
        serde_json::from_str(r#"{"kind": "iteratedDescent", "kicks": 4, "kickSize": 2}"#).unwrap();
    assert_eq!(
        kind,
        SearchKind::IteratedDescent {
            kicks: 4,
            kick_size: 2
        }
    );
    assert_eq!(kind.build().name(), "iteratedDescent");
    assert_eq!(SearchKind::default().build().name(), "steepestDescent");
}
