use super::*;

/// The best verified full-size solution, replaced only by strictly better ones.
#[derive(Debug, Default)]
pub struct SharedBest {
    best: Mutex<Option<(Arc<Solution>, Evaluation)>>,
}

impl SharedBest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the candidate if it is strictly better than the current best.
    pub fn try_install(&self, solution: &Arc<Solution>, evaluation: &Evaluation) -> bool {
        let mut best = self.best.lock();
        if let Some((_, current)) = best.as_ref() {
            if !evaluation.is_better_than(current) {
                return false;
            }
        }
        *best = Some((Arc::clone(solution), evaluation.clone()));
        true
    }

    pub fn snapshot(&self) -> Option<(Arc<Solution>, Evaluation)> {
        self.best.lock().clone()
    }

    pub fn evaluation(&self) -> Option<Evaluation> {
        self.best.lock().as_ref().map(|(_, e)| e.clone())
    }
}

/// A new best of the search, in the search problem.
#[derive(Debug)]
pub(super) struct Candidate {
    pub solution: Solution,
    pub evaluation: Evaluation,
}

/// Turns search candidates into verified full-size solutions.
pub(super) struct Verifier<'a> {
    pub problem: &'a Arc<Problem>,
    pub aggregation: Option<&'a NetworkAggregation>,
    pub criteria: &'a CriteriaSet,
    pub search_flow: &'a dyn FlowProvider,
    pub verification_flow: &'a dyn FlowProvider,
    pub reuse_disaggregated_flows: bool,
    pub best: &'a SharedBest,
    pub events: &'a EventListeners,
    pub stop: &'a StopSignal,
    pub gap_tolerance: f64,
}

impl Verifier<'_> {
    /// Verify the latest candidate until the queue is closed and empty.
    /// Returns the number of published solutions.
    pub fn run(&self, queue: &CandidateQueue<Candidate>) -> usize {
        let mut published = 0;
        while let Some(candidate) = queue.pop_latest() {
            match self.verify(candidate) {
                Ok(true) => published += 1,
                Ok(false) => {}
                Err(e) => log::warn!("Verification of a candidate failed: {e}"),
            }
        }
        published
    }

    fn full_solution(&self, candidate: &Candidate) -> DnrResult<Solution> {
        let Some(aggregation) = self.aggregation else {
            let mut full = candidate.solution.clone();
            full.ensure_valid();
            return Ok(full);
        };
        let mut full = aggregation.disaggregate_solution(&candidate.solution, Arc::clone(self.problem))?;
        full.ensure_valid();
        if self.reuse_disaggregated_flows {
            let flows = candidate.solution.flows(self.search_flow)?;
            let full_flows = flows
                .iter()
                .enumerate()
                .map(|(period, flow)| {
                    Ok(self.verification_flow.disaggregate_flow(
                        flow.as_ref(),
                        aggregation,
                        full.topology(period)?,
                        &self.problem.periods()[period].demands,
                    ))
                })
                .collect::<DnrResult<Vec<_>>>()?;
            full.install_flows(self.verification_flow.name(), full_flows)?;
        }
        Ok(full)
    }

    /// Returns true if the candidate was published.
    fn verify(&self, candidate: Candidate) -> DnrResult<bool> {
        log::trace!(
            "Verifying candidate with search objective {}",
            candidate.evaluation.objective
        );
        let full = self.full_solution(&candidate)?;
        let evaluation = self.criteria.evaluate_valid(&full, self.verification_flow)?;
        let full = Arc::new(full);
        if !self.best.try_install(&full, &evaluation) {
            log::debug!(
                "Candidate not published: infeasibility {}, objective {}",
                evaluation.infeasibility,
                evaluation.objective
            );
            return Ok(false);
        }
        log::info!(
            "New best full solution: infeasibility {}, objective {:.6}",
            evaluation.infeasibility,
            evaluation.objective
        );
        self.events.emit(&OptimizerEvent::BestFullSolutionFound {
            solution: Arc::clone(&full),
            evaluation: evaluation.clone(),
        });
        if evaluation.is_feasible() && evaluation.objective - LOWER_BOUND <= self.gap_tolerance {
            self.stop.trigger("gap tolerance reached");
        }
        Ok(true)
    }
}
