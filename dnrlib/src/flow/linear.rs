use super::*;
use crate::graph::TransformerOperation;
use crate::topology::Visit;

/// Linearized DistFlow on a radial topology.
///
/// One backward sweep accumulates the power drawn below every line and converts it to current
/// at nominal voltage; one forward sweep applies the voltage drops. Losses are not fed back into
/// the currents, so the result is [`FlowStatus::Approximate`].
#[derive(Clone, Debug, Default)]
pub struct LinearFlowProvider;

impl LinearFlowProvider {
    pub const NAME: &'static str = "linear";

    fn sweep(&self, topology: &Topology, demands: &[Complex]) -> Result<NetworkFlow, String> {
        let network = topology.network();
        if demands.len() != network.bus_count() {
            return Err(format!(
                "{} demands given for {} buses",
                demands.len(),
                network.bus_count()
            ));
        }
        if topology.has_cycles() {
            return Err("topology has cycles".to_string());
        }
        if topology.has_transformers_using_missing_modes() {
            return Err("a transformer has no mode for its direction".to_string());
        }

        // Parents before children.
        let mut order = Vec::with_capacity(network.bus_count());
        for &provider in network.providers() {
            topology
                .walk_downstream(provider, |bus| {
                    order.push(bus);
                    Visit::Continue
                })
                .map_err(|e| e.to_string())?;
        }

        let mut below = vec![Complex::default(); network.bus_count()];
        let mut currents = vec![Complex::default(); network.line_count()];
        for &bus in order.iter().rev() {
            below[bus] += demands[bus];
            let (Some(line), Some(parent)) = (
                topology.upstream_line(bus).map_err(|e| e.to_string())?,
                topology.upstream_bus(bus).map_err(|e| e.to_string())?,
            ) else {
                continue;
            };
            let nominal = topology
                .nominal_voltage(bus)
                .map_err(|e| e.to_string())?
                .ok_or_else(|| format!("no nominal voltage at {}", network.bus(bus).name))?;
            let current = (below[bus] / nominal).conj();
            let (first, _) = network.line(line).ends();
            currents[line] = if first == parent { current } else { -current };
            let feeding = below[bus];
            below[parent] += feeding;
        }

        let mut voltages = vec![Complex::default(); network.bus_count()];
        for &bus in &order {
            let (Some(line), Some(parent)) = (
                topology.upstream_line(bus).map_err(|e| e.to_string())?,
                topology.upstream_bus(bus).map_err(|e| e.to_string())?,
            ) else {
                let generator = topology
                    .generator_voltage(bus)
                    .map_err(|e| e.to_string())?;
                voltages[bus] = Complex::new(generator, 0.0);
                continue;
            };
            let source = match topology.transformer_mode(parent, line) {
                Some(mode) => match mode.operation {
                    TransformerOperation::FixedRatio => voltages[parent] * mode.ratio,
                    TransformerOperation::Automatic => {
                        let nominal = topology
                            .nominal_voltage(parent)
                            .map_err(|e| e.to_string())?
                            .unwrap_or_default();
                        Complex::new(nominal * mode.ratio, 0.0)
                    }
                },
                None => voltages[parent],
            };
            let (first, _) = network.line(line).ends();
            let current = if first == parent {
                currents[line]
            } else {
                -currents[line]
            };
            voltages[bus] = source - voltage_drop(network.line(line).impedance, current);
        }

        Ok(NetworkFlow::new(
            Arc::clone(network),
            FlowStatus::Approximate,
            voltages,
            currents,
        ))
    }
}

impl FlowProvider for LinearFlowProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn compute_flow(&self, topology: &Topology, demands: &[Complex]) -> Arc<dyn Flow> {
        match self.sweep(topology, demands) {
            Ok(flow) => Arc::new(flow),
            Err(reason) => {
                log::debug!("Linear flow failed: {reason}");
                Arc::new(FailedFlow::new(reason))
            }
        }
    }
}
