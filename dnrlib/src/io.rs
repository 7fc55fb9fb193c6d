//! Input output module.
//!
//! Contains the JSON representation of reconfiguration problems and of optimization results.
use crate::graph::{Network, NetworkBuilder, TransformerMode};
use crate::optimizer::OptimizerConfig;
use crate::solution::{Period, Problem, Solution};
use crate::switches::SwitchSettings;
use crate::types::*;
use crate::{DnrError, DnrResult};

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

mod report;
pub use report::*;


/// Type of a bus in a [`ProblemFile`].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum BusType {
    Connection,
    Provider,
    Consumer,
    Transformer,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BusEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: BusType,
    /// Required for providers, in kV.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator_voltage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v_max: Option<f64>,
}

/// Resistance and reactance in ohm.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Impedance {
    pub r: f64,
    pub x: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LineEntry {
    pub name: String,
    /// Index of the first endpoint in `buses`.
    pub from: BusIndex,
    /// Index of the second endpoint in `buses`.
    pub to: BusIndex,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impedance: Option<Impedance>,
    /// Current limit in A, unlimited if missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub i_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v_max: Option<f64>,
    #[serde(default)]
    pub switchable: bool,
    #[serde(default)]
    pub breaker: bool,
    /// Initial state of a switchable line.
    #[serde(default)]
    pub open: bool,
}

/// A transformer mode, attached to the transformer bus at index `transformer`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModeEntry {
    pub transformer: BusIndex,
    #[serde(flatten)]
    pub mode: TransformerMode,
}

/// Demand of one bus in kW and kvar.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DemandEntry {
    pub bus: BusIndex,
    pub p: f64,
    #[serde(default)]
    pub q: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PeriodEntry {
    pub name: String,
    #[serde(default = "default_duration")]
    pub duration_hours: f64,
    /// Buses without an entry have no demand.
    #[serde(default)]
    pub demands: Vec<DemandEntry>,
}

fn default_duration() -> f64 {
    1.0
}

/// JSON representation of a reconfiguration problem.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProblemFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub buses: Vec<BusEntry>,
    pub lines: Vec<LineEntry>,
    #[serde(default)]
    pub transformer_modes: Vec<ModeEntry>,
    pub periods: Vec<PeriodEntry>,
    /// Overrides of the optimizer defaults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimizer: Option<OptimizerConfig>,
}

pub fn read_problem_from_file<P: AsRef<Path>>(path: P) -> DnrResult<ProblemFile> {
    let content = std::fs::read_to_string(&path).map_err(|e| {
        DnrError::Io(format!(
            "Cannot read {}: {e}",
            path.as_ref().to_string_lossy()
        ))
    })?;
    ProblemFile::from_json(&content)
}

impl ProblemFile {
    pub fn from_json(content: &str) -> DnrResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Build the immutable network. Line and bus indices are kept as given in the file.
    pub fn network(&self) -> DnrResult<Network> {
        let mut builder = NetworkBuilder::new();
        for (i, bus) in self.buses.iter().enumerate() {
            let index = match bus.kind {
                BusType::Connection => builder.add_connection(&bus.name),
                BusType::Consumer => builder.add_consumer(&bus.name),
                BusType::Transformer => builder.add_transformer(&bus.name),
                BusType::Provider => {
                    let voltage = bus.generator_voltage.ok_or_else(|| {
                        DnrError::BadInput(format!(
                            "Provider {} (bus {i}) has no generatorVoltage",
                            bus.name
                        ))
                    })?;
                    builder.add_provider(&bus.name, voltage)
                }
            };
            if bus.kind != BusType::Provider && bus.generator_voltage.is_some() {
                log::warn!("Ignoring generatorVoltage of non-provider bus {}", bus.name);
            }
            if bus.v_min.is_some() || bus.v_max.is_some() {
                let (default_min, default_max) = match bus.generator_voltage {
                    Some(v) if bus.kind == BusType::Provider => (0.9 * v, 1.1 * v),
                    _ => (0.0, f64::INFINITY),
                };
                builder.set_voltage_limits(
                    index,
                    bus.v_min.unwrap_or(default_min),
                    bus.v_max.unwrap_or(default_max),
                );
            }
        }

        for (i, line) in self.lines.iter().enumerate() {
            if line.open && !line.switchable {
                return Err(DnrError::BadInput(format!(
                    "Line {} (line {i}) is open but not switchable",
                    line.name
                )));
            }
            let index = if line.switchable {
                builder.add_switch(&line.name, line.from, line.to)
            } else {
                builder.add_line(&line.name, line.from, line.to)
            };
            let entry = builder.line_mut(index);
            if let Some(Impedance { r, x }) = line.impedance {
                entry.impedance = Complex::new(r, x);
            }
            if let Some(i_max) = line.i_max {
                if i_max.is_nan() || i_max <= 0.0 {
                    return Err(DnrError::BadInput(format!(
                        "Line {} (line {i}) has a non-positive iMax {i_max}",
                        line.name
                    )));
                }
                entry.i_max = i_max;
            }
            if let Some(v_max) = line.v_max {
                entry.v_max = v_max;
            }
            entry.breaker = line.breaker;
        }

        for entry in &self.transformer_modes {
            builder.add_transformer_mode(entry.transformer, entry.mode.clone());
        }

        builder.build()
    }

    /// Settings with the lines marked `open` opened.
    pub fn initial_settings(&self, network: &Network) -> SwitchSettings {
        let open = self
            .lines
            .iter()
            .enumerate()
            .filter(|(_, line)| line.open)
            .map(|(i, _)| i);
        SwitchSettings::with_open(network, open)
    }

    /// Demand vector of every period, indexed by bus.
    fn periods(&self, bus_count: usize) -> DnrResult<Vec<Period>> {
        self.periods
            .iter()
            .map(|period| {
                let mut demands = vec![Complex::default(); bus_count];
                for demand in &period.demands {
                    let slot = demands.get_mut(demand.bus).ok_or_else(|| {
                        DnrError::BadInput(format!(
                            "Period {} has a demand on missing bus {}",
                            period.name, demand.bus
                        ))
                    })?;
                    *slot += Complex::new(demand.p, demand.q);
                }
                Ok(Period {
                    name: period.name.clone(),
                    duration_hours: period.duration_hours,
                    demands,
                })
            })
            .collect()
    }

    /// Prepare this problem before solving: build the network, the periods and the initial
    /// solution, which uses the file's switch states in every period.
    pub fn prepare(&self) -> DnrResult<(Arc<Problem>, Solution)> {
        let network = Arc::new(self.network()?);
        let periods = self.periods(network.bus_count())?;
        let settings = self.initial_settings(&network);
        let problem = Arc::new(Problem::new(network, periods)?);
        let solution = Solution::uniform(Arc::clone(&problem), settings)?;
        log::debug!(
            "Prepared problem {}: {} buses, {} lines, {} periods",
            self.name.as_deref().unwrap_or("<unnamed>"),
            problem.network().bus_count(),
            problem.network().line_count(),
            problem.period_count()
        );
        Ok((problem, solution))
    }

    /// The optimizer settings of the file, or the defaults.
    pub fn optimizer_config(&self) -> OptimizerConfig {
        self.optimizer.clone().unwrap_or_default()
    }
}
