//! Power flow results and the providers that compute them.
//!
//! Units: voltage in kV, current in A, power in kVA, impedance in ohm.
//! A line current is positive when flowing from the first to the second end of the line.
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

use crate::aggregation::NetworkAggregation;
use crate::graph::Network;
use crate::topology::Topology;
use crate::types::*;

mod linear;

pub use linear::LinearFlowProvider;

/// Quality of a flow, ordered from worst to best.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FlowStatus {
    /// Nothing was computed.
    None,
    /// The computation failed or diverged.
    Failed,
    Approximate,
    Exact,
}

impl FlowStatus {
    /// True if the values of the flow can be used.
    pub fn is_usable(self) -> bool {
        self >= FlowStatus::Approximate
    }
}

/// Capability set of every flow representation.
pub trait Flow: Send + Sync + Debug {
    fn status(&self) -> FlowStatus;
    fn voltage(&self, bus: BusIndex) -> Complex;
    /// Current from the first end to the second end of `line`.
    fn current(&self, line: LineIndex) -> Complex;
    /// Net power leaving `bus` into the network: generation minus demand.
    fn power_injection(&self, bus: BusIndex) -> Complex;
    /// Power leaving `bus` into `line`.
    fn power_flow(&self, bus: BusIndex, line: LineIndex) -> Complex;
}

/// Flow with one value per bus and line of a network.
#[derive(Clone, Debug)]
pub struct NetworkFlow {
    network: Arc<Network>,
    status: FlowStatus,
    voltages: Vec<Complex>,
    currents: Vec<Complex>,
    injections: Vec<Complex>,
}

impl NetworkFlow {
    /// Create a flow from voltages and currents. Injections are derived from them.
    pub fn new(
        network: Arc<Network>,
        status: FlowStatus,
        voltages: Vec<Complex>,
        currents: Vec<Complex>,
    ) -> Self {
        let mut flow = NetworkFlow {
            network,
            status,
            voltages,
            currents,
            injections: Vec::new(),
        };
        let injections = (0..flow.network.bus_count())
            .map(|bus| {
                flow.network
                    .bus(bus)
                    .lines()
                    .iter()
                    .map(|&line| flow.power_flow(bus, line))
                    .sum()
            })
            .collect();
        flow.injections = injections;
        flow
    }

    pub fn network(&self) -> &Arc<Network> {
        &self.network
    }

    pub fn voltages(&self) -> &[Complex] {
        &self.voltages
    }

    pub fn currents(&self) -> &[Complex] {
        &self.currents
    }
}

impl Flow for NetworkFlow {
    fn status(&self) -> FlowStatus {
        self.status
    }

    fn voltage(&self, bus: BusIndex) -> Complex {
        self.voltages[bus]
    }

    fn current(&self, line: LineIndex) -> Complex {
        self.currents[line]
    }

    fn power_injection(&self, bus: BusIndex) -> Complex {
        self.injections[bus]
    }

    fn power_flow(&self, bus: BusIndex, line: LineIndex) -> Complex {
        let (first, _) = self.network.line(line).ends();
        let outgoing = if bus == first {
            self.currents[line]
        } else {
            -self.currents[line]
        };
        self.voltages[bus] * outgoing.conj()
    }
}

/// A flow that could not be computed.
#[derive(Clone, Debug, PartialEq)]
pub struct FailedFlow {
    pub status: FlowStatus,
    pub reason: String,
}

impl FailedFlow {
    pub fn new(reason: impl Into<String>) -> Self {
        FailedFlow {
            status: FlowStatus::Failed,
            reason: reason.into(),
        }
    }
}

impl Flow for FailedFlow {
    fn status(&self) -> FlowStatus {
        self.status
    }

    fn voltage(&self, _bus: BusIndex) -> Complex {
        Complex::default()
    }

    fn current(&self, _line: LineIndex) -> Complex {
        Complex::default()
    }

    fn power_injection(&self, _bus: BusIndex) -> Complex {
        Complex::default()
    }

    fn power_flow(&self, _bus: BusIndex, _line: LineIndex) -> Complex {
        Complex::default()
    }
}

/// Voltage drop in kV caused by `current` in A through `impedance` in ohm.
#[inline]
pub fn voltage_drop(impedance: Complex, current: Complex) -> Complex {
    impedance * current / 1000.0
}

/// Active power lost on a line in kW.
pub fn line_loss(network: &Network, flow: &dyn Flow, line: LineIndex) -> f64 {
    flow.current(line).norm_sqr() * network.line(line).impedance.re / 1000.0
}

/// Active power lost on all lines in kW.
pub fn total_loss(network: &Network, flow: &dyn Flow) -> f64 {
    (0..network.line_count())
        .map(|line| line_loss(network, flow, line))
        .sum()
}

/// Computes flows on radial topologies.
pub trait FlowProvider: Send + Sync {
    /// Unique name, used as the flow cache key.
    fn name(&self) -> &str;

    /// Compute the flow for the given per-bus demands in kVA.
    ///
    /// Failures are reported through the status of the returned flow.
    fn compute_flow(&self, topology: &Topology, demands: &[Complex]) -> Arc<dyn Flow>;

    /// Map a flow computed on an aggregated network back to the full network.
    fn disaggregate_flow(
        &self,
        flow: &dyn Flow,
        aggregation: &NetworkAggregation,
        full: &Topology,
        full_demands: &[Complex],
    ) -> Arc<dyn Flow> {
        aggregation.disaggregate_flow(flow, full, full_demands)
    }
}
