use super::*;
use crate::aggregation::{LinePart, NetworkAggregation};
use crate::criteria::Evaluation;
use crate::optimizer::{OptimizationResult, QueueStats};

/// Open lines of one period, by name.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PeriodSettings {
    pub period: String,
    pub open_lines: Vec<String>,
}

fn period_settings(solution: &Solution) -> Vec<PeriodSettings> {
    let network = solution.network();
    solution
        .problem()
        .periods()
        .iter()
        .zip(solution.configurations())
        .map(|(period, config)| PeriodSettings {
            period: period.name.clone(),
            open_lines: config
                .settings()
                .open_lines()
                .map(|l| network.line(l).name.clone())
                .collect(),
        })
        .collect()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SolutionReport {
    pub periods: Vec<PeriodSettings>,
    pub switching_operations: usize,
    pub evaluation: Evaluation,
}

impl SolutionReport {
    pub fn new(solution: &Solution, evaluation: &Evaluation) -> Self {
        SolutionReport {
            periods: period_settings(solution),
            switching_operations: solution.switching_operations(),
            evaluation: evaluation.clone(),
        }
    }
}

/// Output of the `optimize` command.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationReport {
    pub name: Option<String>,
    /// None if no solution was verified.
    pub best: Option<SolutionReport>,
    pub published: usize,
    pub queue: QueueStats,
    pub stop_reason: Option<String>,
}

impl OptimizationReport {
    pub fn new(name: Option<String>, result: &OptimizationResult) -> Self {
        let best = match (&result.best, &result.evaluation) {
            (Some(solution), Some(evaluation)) => Some(SolutionReport::new(solution, evaluation)),
            _ => None,
        };
        OptimizationReport {
            name,
            best,
            published: result.published,
            queue: result.queue,
            stop_reason: result.stop_reason.clone(),
        }
    }
}

/// Topology of one period.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PeriodTopology {
    pub period: String,
    pub radial: bool,
    /// One bridge per independent cycle.
    pub cycle_bridges: Vec<String>,
    pub disconnected_buses: Vec<String>,
    pub invalid_transformers: Vec<String>,
    pub open_lines: Vec<String>,
}

/// Output of the `inspect` command.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TopologySummary {
    pub buses: usize,
    pub lines: usize,
    pub switchable_lines: usize,
    pub providers: usize,
    pub transformers: usize,
    pub periods: Vec<PeriodTopology>,
}

impl TopologySummary {
    pub fn new(solution: &mut Solution) -> DnrResult<Self> {
        solution.ensure_valid();
        let network = Arc::clone(solution.network());
        let bus_names = |buses: Vec<BusIndex>| -> Vec<String> {
            buses
                .into_iter()
                .map(|b| network.bus(b).name.clone())
                .collect()
        };
        let mut periods = Vec::with_capacity(solution.period_count());
        for (p, settings) in period_settings(solution).into_iter().enumerate() {
            let topology = solution.topology(p)?;
            periods.push(PeriodTopology {
                period: settings.period,
                radial: topology.is_radial(),
                cycle_bridges: topology
                    .cycle_bridges()
                    .map(|l| network.line(l).name.clone())
                    .collect(),
                disconnected_buses: bus_names(topology.disconnected_buses()),
                invalid_transformers: bus_names(topology.invalid_transformers()),
                open_lines: settings.open_lines,
            });
        }
        Ok(TopologySummary {
            buses: network.bus_count(),
            lines: network.line_count(),
            switchable_lines: network.switchable_lines().len(),
            providers: network.providers().len(),
            transformers: network.transformers().len(),
            periods,
        })
    }
}

/// Output of the `aggregate` command.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AggregationSummary {
    pub original_buses: usize,
    pub original_lines: usize,
    pub aggregate_buses: usize,
    pub aggregate_lines: usize,
    pub removed_dead_ends: usize,
    /// Aggregate lines standing for more than one original line.
    pub merged_lines: usize,
    /// Aggregate lines containing parallel original lines.
    pub parallel_lines: usize,
    pub switchable_lines: usize,
}

fn has_parallel(part: &LinePart) -> bool {
    match part {
        LinePart::Original { .. } => false,
        LinePart::Parallel(_) => true,
        LinePart::Series(parts) => parts.iter().any(has_parallel),
    }
}

impl AggregationSummary {
    pub fn new(aggregation: &NetworkAggregation) -> Self {
        let merged = aggregation.merged_lines();
        AggregationSummary {
            original_buses: aggregation.original().bus_count(),
            original_lines: aggregation.original().line_count(),
            aggregate_buses: aggregation.aggregate().bus_count(),
            aggregate_lines: aggregation.aggregate().line_count(),
            removed_dead_ends: aggregation.dead_end_count(),
            merged_lines: merged
                .iter()
                .filter(|m| !matches!(m.part, LinePart::Original { .. }))
                .count(),
            parallel_lines: merged.iter().filter(|m| has_parallel(&m.part)).count(),
            switchable_lines: aggregation.aggregate().switchable_lines().len(),
        }
    }
}
