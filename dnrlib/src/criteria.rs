//! Objectives, constraints and the evaluation of solutions against them.
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::Debug;
use std::sync::Arc;

use crate::flow::{Flow, FlowProvider, FlowStatus};
use crate::solution::Solution;
use crate::DnrResult;

mod catalogue;

pub use catalogue::*;

/// Read access to an evaluated solution and its flows.
pub struct EvaluationContext<'a> {
    pub solution: &'a Solution,
    flow_provider: &'a dyn FlowProvider,
}

impl<'a> EvaluationContext<'a> {
    /// The solution must have valid topologies in every period.
    pub fn new(solution: &'a Solution, flow_provider: &'a dyn FlowProvider) -> Self {
        EvaluationContext {
            solution,
            flow_provider,
        }
    }

    /// Flows of every period, computed on first use and cached in the solution.
    pub fn flows(&self) -> DnrResult<Vec<Arc<dyn Flow>>> {
        self.solution.flows(self.flow_provider)
    }
}

/// A real valued cost, lower is better.
pub trait Objective: Send + Sync + Debug {
    fn name(&self) -> &str;
    fn evaluate(&self, context: &EvaluationContext) -> DnrResult<f64>;
}

/// Outcome of checking a constraint.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstraintCheck {
    Satisfied,
    /// `degree` is a positive measure of how far the solution is from satisfying the constraint.
    Violated { degree: f64, reason: Option<String> },
}

impl ConstraintCheck {
    /// Violated with the given degree, or satisfied if the degree is not positive.
    pub fn from_degree(degree: f64, reason: impl FnOnce() -> String) -> Self {
        if degree > 0.0 {
            ConstraintCheck::Violated {
                degree,
                reason: Some(reason()),
            }
        } else {
            ConstraintCheck::Satisfied
        }
    }
}

pub trait Constraint: Send + Sync + Debug {
    fn name(&self) -> &str;
    fn check(&self, context: &EvaluationContext) -> DnrResult<ConstraintCheck>;
}

/// A violated constraint in an [`Evaluation`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub constraint: String,
    pub degree: f64,
    /// True if the constraint was hard in the criteria set that produced the evaluation.
    pub hard: bool,
    pub reason: Option<String>,
}

/// Result of evaluating a solution, ordered lexicographically by infeasibility then objective.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    /// Zero iff no constraint is violated.
    pub infeasibility: f64,
    /// Weighted sum of the objectives.
    pub objective: f64,
    pub violations: Vec<Violation>,
}

impl Evaluation {
    pub fn is_feasible(&self) -> bool {
        self.violations.is_empty()
    }

    fn key(&self) -> (OrderedFloat<f64>, OrderedFloat<f64>) {
        (OrderedFloat(self.infeasibility), OrderedFloat(self.objective))
    }

    pub fn compare(&self, other: &Evaluation) -> Ordering {
        self.key().cmp(&other.key())
    }

    /// Strictly better: lower infeasibility, or equal infeasibility and lower objective.
    pub fn is_better_than(&self, other: &Evaluation) -> bool {
        self.compare(other) == Ordering::Less
    }
}

#[derive(Clone, Debug)]
struct ConstraintEntry {
    constraint: Arc<dyn Constraint>,
    hard: bool,
}

/// Weighted objectives and hard or soft constraints.
///
/// A violated hard constraint adds one to the infeasibility regardless of its degree, a violated
/// soft constraint adds its degree.
#[derive(Clone, Debug, Default)]
pub struct CriteriaSet {
    objectives: Vec<(Arc<dyn Objective>, f64)>,
    constraints: Vec<ConstraintEntry>,
}

impl CriteriaSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Energy losses, switching costs and every catalogue constraint as hard constraints.
    pub fn standard(switching_cost: f64) -> Self {
        let mut criteria = Self::new()
            .with_objective(LossObjective, 1.0)
            .with_constraint(RadialityConstraint)
            .with_constraint(TransformerModeConstraint)
            .with_constraint(FlowStatusConstraint::default())
            .with_constraint(CurrentLimitConstraint)
            .with_constraint(VoltageLimitConstraint);
        if switching_cost > 0.0 {
            criteria = criteria.with_objective(SwitchingCostObjective, switching_cost);
        }
        criteria
    }

    pub fn with_objective(mut self, objective: impl Objective + 'static, weight: f64) -> Self {
        self.objectives.push((Arc::new(objective), weight));
        self
    }

    pub fn with_constraint(mut self, constraint: impl Constraint + 'static) -> Self {
        self.constraints.push(ConstraintEntry {
            constraint: Arc::new(constraint),
            hard: true,
        });
        self
    }

    pub fn objective_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.objectives.iter().map(|(o, _)| o.name())
    }

    pub fn constraint_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.constraints.iter().map(|c| c.constraint.name())
    }

    /// True if the named constraint is present and hard.
    pub fn is_hard(&self, name: &str) -> bool {
        self.constraints
            .iter()
            .any(|c| c.hard && c.constraint.name() == name)
    }

    /// Every constraint soft.
    pub fn relaxed(&self) -> Self {
        let mut relaxed = self.clone();
        relaxed.constraints.iter_mut().for_each(|c| c.hard = false);
        relaxed
    }

    /// Only the constraints violated in `evaluation` soft, the others stay as they are.
    pub fn relaxed_for(&self, evaluation: &Evaluation) -> Self {
        let mut relaxed = self.clone();
        for entry in relaxed.constraints.iter_mut() {
            let name = entry.constraint.name();
            if evaluation.violations.iter().any(|v| v.constraint == name) {
                entry.hard = false;
            }
        }
        relaxed
    }

    /// Rebuild the topologies of the solution and evaluate it.
    pub fn evaluate(
        &self,
        solution: &mut Solution,
        flow_provider: &dyn FlowProvider,
    ) -> DnrResult<Evaluation> {
        solution.ensure_valid();
        self.evaluate_valid(solution, flow_provider)
    }

    /// Evaluate a solution whose topologies are already valid.
    pub fn evaluate_valid(
        &self,
        solution: &Solution,
        flow_provider: &dyn FlowProvider,
    ) -> DnrResult<Evaluation> {
        let context = EvaluationContext::new(solution, flow_provider);
        let mut infeasibility = 0.0;
        let mut violations = Vec::new();
        for entry in &self.constraints {
            if let ConstraintCheck::Violated { degree, reason } = entry.constraint.check(&context)? {
                infeasibility += if entry.hard { 1.0 } else { degree };
                violations.push(Violation {
                    constraint: entry.constraint.name().to_string(),
                    degree,
                    hard: entry.hard,
                    reason,
                });
            }
        }
        let mut objective = 0.0;
        for (o, weight) in &self.objectives {
            objective += weight * o.evaluate(&context)?;
        }
        Ok(Evaluation {
            infeasibility,
            objective,
            violations,
        })
    }
}

/// Minimum flow status a constraint accepts.
pub const DEFAULT_MINIMUM_STATUS: FlowStatus = FlowStatus::Approximate;
