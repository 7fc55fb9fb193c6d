//! The optimization pipeline.
//!
//! Search runs on the aggregated problem when aggregation is enabled. Every new best of the
//! search is handed to a verification worker, which maps it back to the full network,
//! re-evaluates it there and publishes it if it improves on the best verified solution.
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::aggregation::NetworkAggregation;
use crate::criteria::{CriteriaSet, Evaluation};
use crate::flow::{FlowProvider, LinearFlowProvider};
use crate::search::{SearchContext, SearchEvent, SearchKind};
use crate::solution::{Problem, Solution};
use crate::stop::StopSignal;
use crate::topology::RepairOptions;
use crate::{create_rng, DnrError, DnrResult};

mod queue;
mod verification;

pub use queue::{CandidateQueue, QueueStats};
pub use verification::SharedBest;
use verification::{Candidate, Verifier};

/// Lower bound of every objective in the catalogue.
const LOWER_BOUND: f64 = 0.0;

/// Settings of a [`ConfigOptimizer`] run.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct OptimizerConfig {
    /// Search on the aggregated network.
    pub aggregate: bool,
    /// Stop once a feasible verified objective is this close to the lower bound.
    pub gap_tolerance: f64,
    pub queue_capacity: usize,
    pub time_limit_secs: Option<f64>,
    /// Limit on search iterations.
    pub max_iterations: Option<u64>,
    /// Iterations of the relaxed repair search.
    pub repair_iterations: u64,
    pub repair: RepairOptions,
    pub seed: Option<u64>,
    pub search: SearchKind,
    /// Weight of one switching operation relative to one kWh of losses.
    pub switching_cost: f64,
    /// Verify with flows disaggregated from the search instead of recomputing them.
    pub reuse_disaggregated_flows: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            aggregate: true,
            gap_tolerance: 0.0,
            queue_capacity: 4,
            time_limit_secs: None,
            max_iterations: None,
            repair_iterations: 200,
            repair: RepairOptions::default(),
            seed: None,
            search: SearchKind::default(),
            switching_cost: 0.0,
            reuse_disaggregated_flows: false,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> DnrResult<()> {
        if self.queue_capacity == 0 {
            return Err(DnrError::BadInput("queueCapacity must be positive".to_string()));
        }
        if !(self.gap_tolerance >= 0.0) {
            return Err(DnrError::BadInput(
                "gapTolerance must be non-negative".to_string(),
            ));
        }
        if let Some(t) = self.time_limit_secs {
            if !(t > 0.0) || !t.is_finite() {
                return Err(DnrError::BadInput("timeLimitSecs must be positive".to_string()));
            }
        }
        Ok(())
    }
}

/// Notifications of the pipeline.
#[derive(Clone, Debug)]
pub enum OptimizerEvent {
    /// A verified full-size solution better than every one published before.
    BestFullSolutionFound {
        solution: Arc<Solution>,
        evaluation: Evaluation,
    },
    LocalOptimumFound {
        evaluation: Evaluation,
        /// True if found on the aggregated network.
        aggregated: bool,
    },
    SubOptimizerStarted { name: String },
}

pub type EventListener = Arc<dyn Fn(&OptimizerEvent) + Send + Sync>;

/// Fire-and-forget listeners.
#[derive(Clone, Default)]
pub struct EventListeners {
    listeners: Vec<EventListener>,
}

impl EventListeners {
    pub fn add(&mut self, listener: EventListener) {
        self.listeners.push(listener);
    }

    pub fn emit(&self, event: &OptimizerEvent) {
        for listener in &self.listeners {
            listener(event);
        }
    }
}

/// Makes every period radial and transformer consistent.
#[derive(Clone, Debug, Default)]
pub struct FeasibleSolutionConstructor {
    pub repair: RepairOptions,
}

impl FeasibleSolutionConstructor {
    pub fn new(repair: RepairOptions) -> Self {
        FeasibleSolutionConstructor { repair }
    }

    /// Returns true if every period was fully repaired.
    pub fn construct<R: Rng + ?Sized>(
        &self,
        solution: &mut Solution,
        rng: &mut R,
        stop: &StopSignal,
    ) -> DnrResult<bool> {
        let mut repaired = true;
        for period in 0..solution.period_count() {
            let config = solution.configuration_mut(period);
            repaired &= config.make_radial(rng, &self.repair, stop)?;
            repaired &= config.make_transformers_use_valid_modes(&self.repair, stop)?;
        }
        solution.ensure_valid();
        Ok(repaired)
    }
}

/// Outcome of [`ConfigOptimizer::optimize`].
#[derive(Debug)]
pub struct OptimizationResult {
    /// Best verified full-size solution, None if nothing was verified.
    pub best: Option<Arc<Solution>>,
    pub evaluation: Option<Evaluation>,
    /// The solution the run started from.
    pub start: Solution,
    pub published: usize,
    pub queue: QueueStats,
    pub stop_reason: Option<String>,
}

/// Aggregate, repair, search and verify.
pub struct ConfigOptimizer {
    config: OptimizerConfig,
    criteria: CriteriaSet,
    search_flow: Arc<dyn FlowProvider>,
    verification_flow: Arc<dyn FlowProvider>,
    events: EventListeners,
}

impl ConfigOptimizer {
    /// Optimizer with the standard criteria and linear flows for search and verification.
    pub fn new(config: OptimizerConfig) -> Self {
        let criteria = CriteriaSet::standard(config.switching_cost);
        ConfigOptimizer {
            config,
            criteria,
            search_flow: Arc::new(LinearFlowProvider),
            verification_flow: Arc::new(LinearFlowProvider),
            events: EventListeners::default(),
        }
    }

    pub fn with_criteria(mut self, criteria: CriteriaSet) -> Self {
        self.criteria = criteria;
        self
    }

    pub fn with_flow_providers(
        mut self,
        search: Arc<dyn FlowProvider>,
        verification: Arc<dyn FlowProvider>,
    ) -> Self {
        self.search_flow = search;
        self.verification_flow = verification;
        self
    }

    pub fn add_listener(&mut self, listener: impl Fn(&OptimizerEvent) + Send + Sync + 'static) {
        self.events.add(Arc::new(listener));
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn criteria(&self) -> &CriteriaSet {
        &self.criteria
    }

    /// Run the pipeline from `start` until `stop` triggers, a limit is reached, the gap closes
    /// or the search finishes.
    pub fn optimize(&self, start: Solution, stop: &StopSignal) -> DnrResult<OptimizationResult> {
        self.config.validate()?;
        let run_stop = stop.child(
            self.config.time_limit_secs.map(Duration::from_secs_f64),
            self.config.max_iterations,
        );
        let problem = Arc::clone(start.problem());
        let aggregation = if self.config.aggregate {
            Some(NetworkAggregation::new(Arc::clone(problem.network()))?)
        } else {
            None
        };
        let mut search_start = match &aggregation {
            Some(aggregation) => {
                let aggregate_problem = Arc::new(aggregation.aggregate_problem(&problem)?);
                aggregation.aggregate_solution(&start, aggregate_problem)?
            }
            None => start.clone(),
        };

        let mut rng = create_rng(self.config.seed);
        let constructor = FeasibleSolutionConstructor::new(self.config.repair.clone());
        if !constructor.construct(&mut search_start, &mut rng, &run_stop)? {
            log::warn!("Start solution could only be partially repaired");
        }

        let queue = CandidateQueue::new(self.config.queue_capacity);
        let best = SharedBest::new();
        let verifier = Verifier {
            problem: &problem,
            aggregation: aggregation.as_ref(),
            criteria: &self.criteria,
            search_flow: self.search_flow.as_ref(),
            verification_flow: self.verification_flow.as_ref(),
            reuse_disaggregated_flows: self.config.reuse_disaggregated_flows,
            best: &best,
            events: &self.events,
            stop: &run_stop,
            gap_tolerance: self.config.gap_tolerance,
        };

        let (searched, published) = thread::scope(|scope| {
            let worker = thread::Builder::new()
                .name("verification".to_string())
                .spawn_scoped(scope, || verifier.run(&queue));
            let worker = match worker {
                Ok(worker) => worker,
                Err(e) => return (Err(DnrError::from(e)), 0),
            };
            let searched = self.search(search_start, aggregation.is_some(), &queue, &mut rng, &run_stop);
            queue.close();
            let published = worker.join().unwrap_or_else(|_| {
                log::error!("Verification worker panicked");
                0
            });
            (searched, published)
        });
        searched?;

        let snapshot = best.snapshot();
        let stop_reason = run_stop.is_triggered().then(|| run_stop.reason()).flatten();
        log::info!(
            "Optimization finished: {published} solutions published, stop reason {}",
            stop_reason.as_deref().unwrap_or("none")
        );
        Ok(OptimizationResult {
            evaluation: snapshot.as_ref().map(|(_, e)| e.clone()),
            best: snapshot.map(|(s, _)| s),
            start,
            published,
            queue: queue.stats(),
            stop_reason,
        })
    }

    /// Search thread: relaxed repair if needed, then the configured local search.
    fn search(
        &self,
        mut solution: Solution,
        aggregated: bool,
        queue: &CandidateQueue<Candidate>,
        rng: &mut rand::rngs::StdRng,
        stop: &StopSignal,
    ) -> DnrResult<()> {
        let mut evaluation = self
            .criteria
            .evaluate(&mut solution, self.search_flow.as_ref())?;
        queue.push(Candidate {
            solution: solution.clone(),
            evaluation: evaluation.clone(),
        });

        let mut listener = |event: SearchEvent<'_>| match event {
            SearchEvent::NewBest {
                solution,
                evaluation,
            } => {
                queue.push(Candidate {
                    solution: solution.clone(),
                    evaluation: evaluation.clone(),
                });
            }
            SearchEvent::LocalOptimum { evaluation } => {
                self.events.emit(&OptimizerEvent::LocalOptimumFound {
                    evaluation: evaluation.clone(),
                    aggregated,
                })
            }
        };

        let search = self.config.search.build();
        if !evaluation.is_feasible() && !stop.is_triggered() {
            let relaxed = self.criteria.relaxed_for(&evaluation);
            let repair_stop = stop.child(None, Some(self.config.repair_iterations));
            self.events.emit(&OptimizerEvent::SubOptimizerStarted {
                name: format!("relaxed {}", search.name()),
            });
            log::info!(
                "Start solution infeasible ({} violations), repairing under relaxed criteria",
                evaluation.violations.len()
            );
            let mut context = SearchContext {
                criteria: &relaxed,
                flow_provider: self.search_flow.as_ref(),
                stop: &repair_stop,
                rng: &mut *rng,
                listener: &mut listener,
            };
            let (repaired, _) = search.search(solution, &mut context)?;
            solution = repaired;
            evaluation = self
                .criteria
                .evaluate(&mut solution, self.search_flow.as_ref())?;
            if !evaluation.is_feasible() {
                log::warn!("Relaxed repair ended with an infeasible solution");
            }
        }

        if stop.is_triggered() {
            return Ok(());
        }
        self.events.emit(&OptimizerEvent::SubOptimizerStarted {
            name: search.name().to_string(),
        });
        let mut context = SearchContext {
            criteria: &self.criteria,
            flow_provider: self.search_flow.as_ref(),
            stop,
            rng,
            listener: &mut listener,
        };
        let (_, evaluation) = search.search(solution, &mut context)?;
        log::info!(
            "Search finished: infeasibility {}, objective {:.6}",
            evaluation.infeasibility,
            evaluation.objective
        );
        Ok(())
    }
}

#[cfg(test)]
mod integration_tests;
