//! Moves between switch configurations and the local searches built on them.
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::criteria::{CriteriaSet, Evaluation};
use crate::flow::FlowProvider;
use crate::solution::Solution;
use crate::stop::StopSignal;
use crate::types::*;
use crate::DnrResult;

mod descent;

pub use descent::{IteratedDescent, SteepestDescent};

/// A change to a solution.
pub trait Move: Debug + Send + Sync {
    /// False if applying the move would leave the solution as it is.
    fn changes_anything(&self, solution: &Solution) -> bool;
    fn apply(&self, solution: &mut Solution) -> DnrResult<()>;
}

/// Close one switch and open another in a single period.
///
/// When `open` is on the cycle closed by `close`, a radial configuration stays radial and the
/// topology is rebuilt incrementally.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SwapMove {
    pub period: PeriodIndex,
    pub close: LineIndex,
    pub open: LineIndex,
}

impl Move for SwapMove {
    fn changes_anything(&self, solution: &Solution) -> bool {
        let config = solution.configuration(self.period);
        self.close != self.open && config.is_open(self.close) && !config.is_open(self.open)
    }

    fn apply(&self, solution: &mut Solution) -> DnrResult<()> {
        let config = solution.configuration_mut(self.period);
        config.set_switch(self.close, false)?;
        config.set_switch(self.open, true)?;
        Ok(())
    }
}

/// Use the settings of one period in another.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CopyPeriodMove {
    pub from: PeriodIndex,
    pub to: PeriodIndex,
}

impl Move for CopyPeriodMove {
    fn changes_anything(&self, solution: &Solution) -> bool {
        self.from != self.to
            && solution.configuration(self.from).settings()
                != solution.configuration(self.to).settings()
    }

    fn apply(&self, solution: &mut Solution) -> DnrResult<()> {
        let settings = solution.configuration(self.from).settings().clone();
        solution.configuration_mut(self.to).apply_settings(&settings)?;
        Ok(())
    }
}

/// Swaps of every open switch with the switchable lines on the cycle it would close.
///
/// Only switches with both ends connected are considered. If the ends hang below different
/// providers the cycle runs through both of them.
pub fn swap_neighborhood(solution: &Solution, period: PeriodIndex) -> DnrResult<Vec<SwapMove>> {
    let topology = solution.topology(period)?;
    let network = topology.network();
    let mut moves = Vec::new();
    for &close in network.switchable_lines() {
        if topology.settings().is_closed(close) {
            continue;
        }
        let (a, b) = network.line(close).ends();
        if !topology.is_bus_connected(a) || !topology.is_bus_connected(b) {
            continue;
        }
        let path = match topology.path_between(a, b)? {
            Some(path) => path,
            None => {
                let mut path = topology.path_to_provider(a)?;
                path.extend(topology.path_to_provider(b)?);
                path
            }
        };
        moves.extend(
            path.into_iter()
                .filter(|&open| network.line(open).switchable)
                .map(|open| SwapMove {
                    period,
                    close,
                    open,
                }),
        );
    }
    Ok(moves)
}

/// Swap moves of every period, and copies between adjacent periods that differ.
pub fn neighborhood(solution: &Solution) -> DnrResult<Vec<Box<dyn Move>>> {
    let mut moves: Vec<Box<dyn Move>> = Vec::new();
    for period in 0..solution.period_count() {
        for swap in swap_neighborhood(solution, period)? {
            moves.push(Box::new(swap));
        }
    }
    for to in 1..solution.period_count() {
        for (from, to) in [(to - 1, to), (to, to - 1)] {
            let copy = CopyPeriodMove { from, to };
            if copy.changes_anything(solution) {
                moves.push(Box::new(copy));
            }
        }
    }
    Ok(moves)
}

/// Progress reported by a local search.
#[derive(Debug)]
pub enum SearchEvent<'s> {
    /// A solution better than everything reported before.
    NewBest {
        solution: &'s Solution,
        evaluation: &'s Evaluation,
    },
    /// No move improves the current solution.
    LocalOptimum { evaluation: &'s Evaluation },
}

/// What a local search runs against.
pub struct SearchContext<'a> {
    pub criteria: &'a CriteriaSet,
    pub flow_provider: &'a dyn FlowProvider,
    pub stop: &'a StopSignal,
    pub rng: &'a mut StdRng,
    pub listener: &'a mut dyn FnMut(SearchEvent<'_>),
}

impl SearchContext<'_> {
    pub fn evaluate(&self, solution: &mut Solution) -> DnrResult<Evaluation> {
        self.criteria.evaluate(solution, self.flow_provider)
    }

    fn report(&mut self, event: SearchEvent<'_>) {
        (self.listener)(event)
    }
}

/// Improves a solution until a local optimum or the stop signal.
pub trait LocalSearch: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Returns the best solution found and its evaluation, which is never worse than `start`.
    fn search(
        &self,
        start: Solution,
        context: &mut SearchContext,
    ) -> DnrResult<(Solution, Evaluation)>;
}

/// Serializable choice of local search.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum SearchKind {
    SteepestDescent,
    #[serde(rename_all = "camelCase")]
    IteratedDescent { kicks: usize, kick_size: usize },
}

impl Default for SearchKind {
    fn default() -> Self {
        SearchKind::SteepestDescent
    }
}

impl SearchKind {
    pub fn build(&self) -> Box<dyn LocalSearch> {
        match self {
            SearchKind::SteepestDescent => Box::new(SteepestDescent),
            SearchKind::IteratedDescent { kicks, kick_size } => Box::new(IteratedDescent {
                kicks: *kicks,
                kick_size: *kick_size,
            }),
        }
    }
}

#[cfg(test)]
mod tests;
