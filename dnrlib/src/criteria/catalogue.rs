use super::*;
use crate::flow::total_loss;

/// Energy lost on lines over all periods in kWh.
///
/// Periods without a usable flow contribute nothing, see [`FlowStatusConstraint`].
#[derive(Clone, Copy, Debug, Default)]
pub struct LossObjective;

impl Objective for LossObjective {
    fn name(&self) -> &str {
        "loss"
    }

    fn evaluate(&self, context: &EvaluationContext) -> DnrResult<f64> {
        let network = context.solution.network();
        let flows = context.flows()?;
        Ok(flows
            .iter()
            .zip(context.solution.problem().periods())
            .filter(|(flow, _)| flow.status().is_usable())
            .map(|(flow, period)| total_loss(network, flow.as_ref()) * period.duration_hours)
            .sum())
    }
}

/// Number of switching operations, see [`Solution::switching_operations`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SwitchingCostObjective;

impl Objective for SwitchingCostObjective {
    fn name(&self) -> &str {
        "switching"
    }

    fn evaluate(&self, context: &EvaluationContext) -> DnrResult<f64> {
        Ok(context.solution.switching_operations() as f64)
    }
}

/// Every bus fed by exactly one provider. Degree is cycle bridges plus disconnected buses.
#[derive(Clone, Copy, Debug, Default)]
pub struct RadialityConstraint;

impl Constraint for RadialityConstraint {
    fn name(&self) -> &str {
        "radiality"
    }

    fn check(&self, context: &EvaluationContext) -> DnrResult<ConstraintCheck> {
        let mut bridges = 0;
        let mut unreached = 0;
        for period in 0..context.solution.period_count() {
            let topology = context.solution.topology(period)?;
            bridges += topology.bridge_count();
            unreached += topology.unreached_count();
        }
        Ok(ConstraintCheck::from_degree(
            (bridges + unreached) as f64,
            || format!("{bridges} cycle bridges, {unreached} disconnected buses"),
        ))
    }
}

/// Every connected transformer operates in a declared mode.
#[derive(Clone, Copy, Debug, Default)]
pub struct TransformerModeConstraint;

impl Constraint for TransformerModeConstraint {
    fn name(&self) -> &str {
        "transformerModes"
    }

    fn check(&self, context: &EvaluationContext) -> DnrResult<ConstraintCheck> {
        let mut invalid = 0;
        for period in 0..context.solution.period_count() {
            invalid += context.solution.topology(period)?.invalid_transformers().len();
        }
        Ok(ConstraintCheck::from_degree(invalid as f64, || {
            format!("{invalid} transformers without a valid mode")
        }))
    }
}

/// Flows of every period at least as good as `minimum`.
#[derive(Clone, Copy, Debug)]
pub struct FlowStatusConstraint {
    pub minimum: FlowStatus,
}

impl Default for FlowStatusConstraint {
    fn default() -> Self {
        FlowStatusConstraint {
            minimum: DEFAULT_MINIMUM_STATUS,
        }
    }
}

impl Constraint for FlowStatusConstraint {
    fn name(&self) -> &str {
        "flowStatus"
    }

    fn check(&self, context: &EvaluationContext) -> DnrResult<ConstraintCheck> {
        let failed = context
            .flows()?
            .iter()
            .filter(|flow| flow.status() < self.minimum)
            .count();
        Ok(ConstraintCheck::from_degree(failed as f64, || {
            format!("{failed} periods with flow status below {:?}", self.minimum)
        }))
    }
}

/// Line currents within `i_max`. Degree is the summed relative overload.
#[derive(Clone, Copy, Debug, Default)]
pub struct CurrentLimitConstraint;

impl Constraint for CurrentLimitConstraint {
    fn name(&self) -> &str {
        "currentLimit"
    }

    fn check(&self, context: &EvaluationContext) -> DnrResult<ConstraintCheck> {
        let network = context.solution.network();
        let mut degree = 0.0;
        let mut worst = None;
        for flow in context.flows()?.iter().filter(|f| f.status().is_usable()) {
            for (index, line) in network.lines().iter().enumerate() {
                let current = flow.current(index).norm();
                if current > line.i_max {
                    let overload = (current - line.i_max) / line.i_max;
                    degree += overload;
                    if worst.map_or(true, |(_, w)| overload > w) {
                        worst = Some((index, overload));
                    }
                }
            }
        }
        Ok(ConstraintCheck::from_degree(degree, || match worst {
            Some((line, overload)) => format!(
                "line {} overloaded by {:.1}%",
                network.line(line).name,
                overload * 100.0
            ),
            None => String::new(),
        }))
    }
}

/// Voltages of connected buses within their limits. Degree is the summed relative deviation.
#[derive(Clone, Copy, Debug, Default)]
pub struct VoltageLimitConstraint;

impl Constraint for VoltageLimitConstraint {
    fn name(&self) -> &str {
        "voltageLimit"
    }

    fn check(&self, context: &EvaluationContext) -> DnrResult<ConstraintCheck> {
        let network = context.solution.network();
        let flows = context.flows()?;
        let mut degree = 0.0;
        let mut count = 0;
        for (period, flow) in flows.iter().enumerate() {
            if !flow.status().is_usable() {
                continue;
            }
            let topology = context.solution.topology(period)?;
            for (index, bus) in network.buses().iter().enumerate() {
                if !topology.is_bus_connected(index) {
                    continue;
                }
                let v = flow.voltage(index).norm();
                let deviation = if v < bus.v_min {
                    (bus.v_min - v) / bus.v_min
                } else if v > bus.v_max {
                    (v - bus.v_max) / bus.v_max
                } else {
                    continue;
                };
                degree += deviation;
                count += 1;
            }
        }
        Ok(ConstraintCheck::from_degree(degree, || {
            format!("{count} bus voltages out of limits")
        }))
    }
}
