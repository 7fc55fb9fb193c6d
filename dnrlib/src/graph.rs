//! Physical network graph.
//!
//! The network is an immutable multigraph stored in an arena: buses, lines and transformers are
//! referenced by dense indices, and a bus keeps the ordered list of its incident lines. It is
//! built once with [`NetworkBuilder`] and then shared (usually as `Arc<Network>`) by every
//! [`crate::topology::NetworkConfiguration`] built over it.
use serde::{Deserialize, Serialize};

use crate::types::*;
use crate::{DnrError, DnrResult};

#[cfg(not(feature = "hashbrown"))]
use std::collections::HashMap;

#[cfg(feature = "hashbrown")]
use hashbrown::HashMap;

/// Type tag of a bus.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum BusKind {
    /// A junction without load or generation.
    Connection,
    /// A source bus. The generator voltage is given in kV.
    Provider { generator_voltage: f64 },
    /// A load bus.
    Consumer,
    /// A transformer, represented by a single bus whose incident lines are the terminals.
    Transformer(TransformerIndex),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Bus {
    pub name: String,
    pub kind: BusKind,
    /// Lower voltage limit in kV.
    pub v_min: f64,
    /// Upper voltage limit in kV.
    pub v_max: f64,
    /// Incident lines in insertion order.
    lines: Vec<LineIndex>,
}

impl Bus {
    /// Incident lines in insertion order.
    #[inline]
    pub fn lines(&self) -> &[LineIndex] {
        &self.lines
    }

    #[inline]
    pub fn is_provider(&self) -> bool {
        matches!(self.kind, BusKind::Provider { .. })
    }

    #[inline]
    pub fn is_consumer(&self) -> bool {
        self.kind == BusKind::Consumer
    }

    #[inline]
    pub fn is_transformer(&self) -> bool {
        matches!(self.kind, BusKind::Transformer(_))
    }

    /// Junction buses are the only ones that may disappear during aggregation.
    #[inline]
    pub fn is_junction(&self) -> bool {
        self.kind == BusKind::Connection
    }

    #[inline]
    pub fn transformer(&self) -> Option<TransformerIndex> {
        match self.kind {
            BusKind::Transformer(t) => Some(t),
            _ => None,
        }
    }

    #[inline]
    pub fn generator_voltage(&self) -> Option<f64> {
        match self.kind {
            BusKind::Provider { generator_voltage } => Some(generator_voltage),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Line {
    pub name: String,
    /// Endpoints. The order carries no meaning.
    ends: (BusIndex, BusIndex),
    /// Series impedance in ohm.
    pub impedance: Complex,
    /// Current limit in A.
    pub i_max: f64,
    /// Rated voltage in kV.
    pub v_max: f64,
    pub switchable: bool,
    pub breaker: bool,
}

impl Line {
    #[inline]
    pub fn ends(&self) -> (BusIndex, BusIndex) {
        self.ends
    }

    #[inline]
    pub fn touches(&self, bus: BusIndex) -> bool {
        self.ends.0 == bus || self.ends.1 == bus
    }

    /// The endpoint opposite to `bus`. For a line that does not touch `bus`, the first endpoint
    /// is returned; callers are expected to only pass endpoints.
    #[inline]
    pub fn other_end(&self, bus: BusIndex) -> BusIndex {
        debug_assert!(self.touches(bus), "Bus {bus} is not an endpoint of {}", self.name);
        if self.ends.0 == bus {
            self.ends.1
        } else {
            self.ends.0
        }
    }
}

/// How a transformer mode regulates its output voltage.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TransformerOperation {
    /// The output voltage is the input voltage times the ratio.
    FixedRatio,
    /// A tap changer keeps the output at the ratio times the nominal input voltage.
    Automatic,
}

/// A declared, directional operating rule of a transformer.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransformerMode {
    /// Terminal (incident line) where power enters.
    pub input: LineIndex,
    /// Terminal (incident line) where power leaves.
    pub output: LineIndex,
    pub operation: TransformerOperation,
    /// Output voltage divided by input voltage.
    pub ratio: f64,
    pub power_factor: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Transformer {
    /// The bus representing this transformer.
    pub bus: BusIndex,
    modes: Vec<TransformerMode>,
}

impl Transformer {
    #[inline]
    pub fn modes(&self) -> &[TransformerMode] {
        &self.modes
    }

    /// The mode declared for power entering at `input` and leaving at `output`, if any.
    pub fn mode(&self, input: LineIndex, output: LineIndex) -> Option<&TransformerMode> {
        self.modes
            .iter()
            .find(|m| m.input == input && m.output == output)
    }

    /// True if power may enter at `input` and leave at every line in `outputs`.
    pub fn supports(&self, input: LineIndex, outputs: &[LineIndex]) -> bool {
        outputs.iter().all(|&o| self.mode(input, o).is_some())
    }
}

/// Contains information about the distribution system.
#[derive(Clone, Debug)]
pub struct Network {
    buses: Vec<Bus>,
    lines: Vec<Line>,
    transformers: Vec<Transformer>,
    /// Indices of switchable lines in ascending order.
    switchable: Vec<LineIndex>,
    /// Indices of provider buses in ascending order.
    providers: Vec<BusIndex>,
    bus_names: HashMap<String, BusIndex>,
}

impl Network {
    #[inline]
    pub fn bus(&self, index: BusIndex) -> &Bus {
        &self.buses[index]
    }

    #[inline]
    pub fn line(&self, index: LineIndex) -> &Line {
        &self.lines[index]
    }

    #[inline]
    pub fn transformer(&self, index: TransformerIndex) -> &Transformer {
        &self.transformers[index]
    }

    /// The transformer record owned by a transformer bus.
    #[inline]
    pub fn transformer_at(&self, bus: BusIndex) -> Option<&Transformer> {
        self.buses[bus].transformer().map(|t| &self.transformers[t])
    }

    #[inline]
    pub fn buses(&self) -> &[Bus] {
        &self.buses
    }

    #[inline]
    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    #[inline]
    pub fn transformers(&self) -> &[Transformer] {
        &self.transformers
    }

    #[inline]
    pub fn bus_count(&self) -> usize {
        self.buses.len()
    }

    #[inline]
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    #[inline]
    pub fn switchable_lines(&self) -> &[LineIndex] {
        &self.switchable
    }

    #[inline]
    pub fn providers(&self) -> &[BusIndex] {
        &self.providers
    }

    pub fn find_bus(&self, name: &str) -> Option<BusIndex> {
        self.bus_names.get(name).copied()
    }
}

/// Incrementally constructs a [`Network`]. All structural checks happen in [`Self::build`].
#[derive(Default, Debug)]
pub struct NetworkBuilder {
    buses: Vec<Bus>,
    lines: Vec<Line>,
    transformers: Vec<Transformer>,
}

/// Default impedance for lines added without electrical data.
const DEFAULT_IMPEDANCE: Complex = Complex::new(0.1, 0.05);

impl NetworkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_bus(&mut self, name: &str, kind: BusKind) -> BusIndex {
        self.buses.push(Bus {
            name: name.to_string(),
            kind,
            v_min: 0.0,
            v_max: f64::INFINITY,
            lines: Vec::new(),
        });
        self.buses.len() - 1
    }

    pub fn add_provider(&mut self, name: &str, generator_voltage: f64) -> BusIndex {
        let bus = self.push_bus(name, BusKind::Provider { generator_voltage });
        self.buses[bus].v_min = 0.9 * generator_voltage;
        self.buses[bus].v_max = 1.1 * generator_voltage;
        bus
    }

    pub fn add_consumer(&mut self, name: &str) -> BusIndex {
        self.push_bus(name, BusKind::Consumer)
    }

    pub fn add_connection(&mut self, name: &str) -> BusIndex {
        self.push_bus(name, BusKind::Connection)
    }

    /// Add a transformer bus and its (initially empty) transformer record.
    pub fn add_transformer(&mut self, name: &str) -> BusIndex {
        let index = self.transformers.len();
        let bus = self.push_bus(name, BusKind::Transformer(index));
        self.transformers.push(Transformer {
            bus,
            modes: Vec::new(),
        });
        bus
    }

    /// Declare a mode on the transformer at `bus`.
    pub fn add_transformer_mode(&mut self, bus: BusIndex, mode: TransformerMode) -> &mut Self {
        if let Some(BusKind::Transformer(t)) = self.buses.get(bus).map(|b| b.kind.clone()) {
            self.transformers[t].modes.push(mode);
        } else {
            // Checked in build, keep a dangling record so the error names the bus.
            self.transformers.push(Transformer {
                bus,
                modes: vec![mode],
            });
        }
        self
    }

    pub fn set_voltage_limits(&mut self, bus: BusIndex, v_min: f64, v_max: f64) -> &mut Self {
        self.buses[bus].v_min = v_min;
        self.buses[bus].v_max = v_max;
        self
    }

    /// Add a non-switchable line with default electrical data.
    pub fn add_line(&mut self, name: &str, a: BusIndex, b: BusIndex) -> LineIndex {
        self.lines.push(Line {
            name: name.to_string(),
            ends: (a, b),
            impedance: DEFAULT_IMPEDANCE,
            i_max: f64::INFINITY,
            v_max: f64::INFINITY,
            switchable: false,
            breaker: false,
        });
        self.lines.len() - 1
    }

    /// Add a switchable line with default electrical data.
    pub fn add_switch(&mut self, name: &str, a: BusIndex, b: BusIndex) -> LineIndex {
        let line = self.add_line(name, a, b);
        self.lines[line].switchable = true;
        line
    }

    pub fn line_mut(&mut self, line: LineIndex) -> &mut Line {
        &mut self.lines[line]
    }

    pub fn set_impedance(&mut self, line: LineIndex, impedance: Complex) -> &mut Self {
        self.lines[line].impedance = impedance;
        self
    }

    pub fn set_current_limit(&mut self, line: LineIndex, i_max: f64) -> &mut Self {
        self.lines[line].i_max = i_max;
        self
    }

    /// Validate the structure and produce the immutable network.
    pub fn build(self) -> DnrResult<Network> {
        let NetworkBuilder {
            mut buses,
            lines,
            transformers,
        } = self;

        let mut bus_names = HashMap::new();
        for (i, bus) in buses.iter().enumerate() {
            if bus_names.insert(bus.name.clone(), i).is_some() {
                return Err(DnrError::BadInput(format!(
                    "Duplicate bus name: {}",
                    bus.name
                )));
            }
            if let Some(v) = bus.generator_voltage() {
                if !(v > 0.0) {
                    return Err(DnrError::BadInput(format!(
                        "Provider {} has non-positive generator voltage {v}",
                        bus.name
                    )));
                }
            }
        }

        for (i, line) in lines.iter().enumerate() {
            let (a, b) = line.ends;
            if a >= buses.len() || b >= buses.len() {
                return Err(DnrError::BadInput(format!(
                    "Line {} connects to a missing bus ({a}, {b})",
                    line.name
                )));
            }
            if a == b {
                return Err(DnrError::BadInput(format!(
                    "Line {} connects bus {} to itself",
                    line.name, buses[a].name
                )));
            }
            buses[a].lines.push(i);
            buses[b].lines.push(i);
        }

        for (t, transformer) in transformers.iter().enumerate() {
            let bus = buses.get(transformer.bus).ok_or_else(|| {
                DnrError::BadInput(format!("Transformer {t} refers to missing bus"))
            })?;
            if bus.transformer() != Some(t) {
                return Err(DnrError::BadInput(format!(
                    "Bus {} is not a transformer bus",
                    bus.name
                )));
            }
            for mode in &transformer.modes {
                for terminal in [mode.input, mode.output] {
                    if terminal >= lines.len() || !lines[terminal].touches(transformer.bus) {
                        return Err(DnrError::BadInput(format!(
                            "Transformer {} has a mode on line {terminal}, which is not one of its terminals",
                            bus.name
                        )));
                    }
                }
                if mode.input == mode.output {
                    return Err(DnrError::BadInput(format!(
                        "Transformer {} has a mode with identical input and output",
                        bus.name
                    )));
                }
                if !(mode.ratio > 0.0) {
                    return Err(DnrError::BadInput(format!(
                        "Transformer {} has a mode with non-positive ratio",
                        bus.name
                    )));
                }
            }
        }

        let switchable = lines
            .iter()
            .enumerate()
            .filter(|(_, l)| l.switchable)
            .map(|(i, _)| i)
            .collect();
        let providers = buses
            .iter()
            .enumerate()
            .filter(|(_, b)| b.is_provider())
            .map(|(i, _)| i)
            .collect();

        log::debug!(
            "Built network with {} buses, {} lines, {} transformers",
            buses.len(),
            lines.len(),
            transformers.len()
        );

        Ok(Network {
            buses,
            lines,
            transformers,
            switchable,
            providers,
            bus_names,
        })
    }
}
