use rand::seq::SliceRandom;

use super::*;

/// Move to the best neighbor while it improves.
#[derive(Clone, Copy, Debug, Default)]
pub struct SteepestDescent;

/// Descend from `solution` and report every result better than `record`.
fn descend(
    mut solution: Solution,
    mut evaluation: Evaluation,
    context: &mut SearchContext,
    record: &mut Evaluation,
) -> DnrResult<(Solution, Evaluation)> {
    while context.stop.tick() {
        solution.ensure_valid();
        let mut best: Option<(Solution, Evaluation)> = None;
        for m in neighborhood(&solution)? {
            if context.stop.is_triggered() {
                break;
            }
            if !m.changes_anything(&solution) {
                continue;
            }
            let mut candidate = solution.clone();
            m.apply(&mut candidate)?;
            let candidate_evaluation = context.evaluate(&mut candidate)?;
            if best
                .as_ref()
                .map_or(true, |(_, e)| candidate_evaluation.is_better_than(e))
            {
                best = Some((candidate, candidate_evaluation));
            }
        }
        match best {
            Some((candidate, candidate_evaluation))
                if candidate_evaluation.is_better_than(&evaluation) =>
            {
                log::trace!(
                    "Descent step: infeasibility {}, objective {}",
                    candidate_evaluation.infeasibility,
                    candidate_evaluation.objective
                );
                solution = candidate;
                evaluation = candidate_evaluation;
                if evaluation.is_better_than(record) {
                    *record = evaluation.clone();
                    context.report(SearchEvent::NewBest {
                        solution: &solution,
                        evaluation: &evaluation,
                    });
                }
            }
            _ => {
                if !context.stop.is_triggered() {
                    context.report(SearchEvent::LocalOptimum {
                        evaluation: &evaluation,
                    });
                }
                break;
            }
        }
    }
    Ok((solution, evaluation))
}

impl LocalSearch for SteepestDescent {
    fn name(&self) -> &str {
        "steepestDescent"
    }

    fn search(
        &self,
        mut start: Solution,
        context: &mut SearchContext,
    ) -> DnrResult<(Solution, Evaluation)> {
        let evaluation = context.evaluate(&mut start)?;
        let mut record = evaluation.clone();
        descend(start, evaluation, context, &mut record)
    }
}

/// Steepest descent restarted from random perturbations of the best solution.
#[derive(Clone, Copy, Debug)]
pub struct IteratedDescent {
    /// Number of restarts.
    pub kicks: usize,
    /// Random moves applied per restart.
    pub kick_size: usize,
}

impl Default for IteratedDescent {
    fn default() -> Self {
        IteratedDescent {
            kicks: 10,
            kick_size: 3,
        }
    }
}

impl IteratedDescent {
    fn kick(&self, solution: &mut Solution, context: &mut SearchContext) -> DnrResult<()> {
        for _ in 0..self.kick_size {
            solution.ensure_valid();
            let moves = neighborhood(solution)?;
            match moves.choose(&mut *context.rng) {
                Some(m) => m.apply(solution)?,
                None => break,
            }
        }
        Ok(())
    }
}

impl LocalSearch for IteratedDescent {
    fn name(&self) -> &str {
        "iteratedDescent"
    }

    fn search(
        &self,
        mut start: Solution,
        context: &mut SearchContext,
    ) -> DnrResult<(Solution, Evaluation)> {
        let evaluation = context.evaluate(&mut start)?;
        let mut record = evaluation.clone();
        let (mut best, mut best_evaluation) = descend(start, evaluation, context, &mut record)?;
        for kick in 0..self.kicks {
            if context.stop.is_triggered() {
                break;
            }
            let mut candidate = best.clone();
            self.kick(&mut candidate, context)?;
            let candidate_evaluation = context.evaluate(&mut candidate)?;
            let (candidate, candidate_evaluation) =
                descend(candidate, candidate_evaluation, context, &mut record)?;
            if candidate_evaluation.is_better_than(&best_evaluation) {
                log::debug!(
                    "Kick {kick} improved the objective to {}",
                    candidate_evaluation.objective
                );
                best = candidate;
                best_evaluation = candidate_evaluation;
            }
        }
        Ok((best, best_evaluation))
    }
}
