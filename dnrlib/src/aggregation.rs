//! Electrically equivalent reduction of a network.
//!
//! [`NetworkAggregation::new`] repeatedly removes dead-end junction chains, merges parallel
//! lines and merges series lines through degree-2 junctions until nothing changes. The result
//! is a new [`Network`] together with the mapping needed to translate settings, demands, flows
//! and solutions between the original and the aggregate network.
use std::sync::Arc;

use crate::flow::{voltage_drop, FailedFlow, Flow, NetworkFlow};
use crate::graph::{Network, NetworkBuilder, TransformerMode};
use crate::solution::{Period, Problem, Solution};
use crate::switches::SwitchSettings;
use crate::topology::Topology;
use crate::types::*;
use crate::{DnrError, DnrResult};

#[cfg(not(feature = "hashbrown"))]
use std::collections::HashMap;

#[cfg(feature = "hashbrown")]
use hashbrown::HashMap;

/// Oriented tree of original lines making up an aggregate line.
///
/// Orientation is from the first end of the aggregate line to its second end.
#[derive(Clone, Debug, PartialEq)]
pub enum LinePart {
    /// An original line, `reversed` if its own first end is on the far side.
    Original { line: LineIndex, reversed: bool },
    /// Parts traversed one after another.
    Series(Vec<LinePart>),
    /// Parts sharing both ends.
    Parallel(Vec<LinePart>),
}

impl LinePart {
    /// The same part seen from the other end.
    pub fn reversed(self) -> Self {
        match self {
            LinePart::Original { line, reversed } => LinePart::Original {
                line,
                reversed: !reversed,
            },
            LinePart::Series(parts) => {
                LinePart::Series(parts.into_iter().rev().map(LinePart::reversed).collect())
            }
            LinePart::Parallel(parts) => {
                LinePart::Parallel(parts.into_iter().map(LinePart::reversed).collect())
            }
        }
    }

    /// Original lines in this part, in traversal order.
    pub fn original_lines(&self) -> Vec<LineIndex> {
        let mut lines = Vec::new();
        self.collect_lines(&mut lines);
        lines
    }

    fn collect_lines(&self, lines: &mut Vec<LineIndex>) {
        match self {
            LinePart::Original { line, .. } => lines.push(*line),
            LinePart::Series(parts) | LinePart::Parallel(parts) => {
                parts.iter().for_each(|p| p.collect_lines(lines))
            }
        }
    }

    /// Equivalent series impedance.
    pub fn impedance(&self, network: &Network) -> Complex {
        match self {
            LinePart::Original { line, .. } => network.line(*line).impedance,
            LinePart::Series(parts) => parts.iter().map(|p| p.impedance(network)).sum(),
            LinePart::Parallel(parts) => {
                parallel_impedance(parts.iter().map(|p| p.impedance(network)))
            }
        }
    }
}

/// Impedance of parallel branches. Zero if any branch has zero impedance.
fn parallel_impedance(impedances: impl Iterator<Item = Complex>) -> Complex {
    let mut admittance = Complex::default();
    for z in impedances {
        if z == Complex::default() {
            return Complex::default();
        }
        admittance += z.inv();
    }
    admittance.inv()
}

/// An aggregate line and the original lines it stands for.
#[derive(Clone, Debug, PartialEq)]
pub struct MergedLine {
    /// Index in the aggregate network.
    pub line: LineIndex,
    pub part: LinePart,
    /// The original switchable line, if the aggregate line is switchable.
    pub switch: Option<LineIndex>,
}

/// Line of the network being reduced, in original bus indices.
#[derive(Clone, Debug)]
struct WorkLine {
    ends: (BusIndex, BusIndex),
    part: LinePart,
    impedance: Complex,
    i_max: f64,
    v_max: f64,
    switch: Option<LineIndex>,
    breaker: bool,
    alive: bool,
}

struct Reduction<'a> {
    network: &'a Network,
    lines: Vec<WorkLine>,
    bus_lines: Vec<Vec<usize>>,
    bus_alive: Vec<bool>,
    /// Kept bus standing in for each removed bus.
    representative: Vec<Option<BusIndex>>,
    /// Removed dead-end buses with the bus they hung from, in removal order.
    dead_ends: Vec<(BusIndex, BusIndex)>,
}

impl<'a> Reduction<'a> {
    fn new(network: &'a Network) -> Self {
        let lines = network
            .lines()
            .iter()
            .enumerate()
            .map(|(i, l)| WorkLine {
                ends: l.ends(),
                part: LinePart::Original {
                    line: i,
                    reversed: false,
                },
                impedance: l.impedance,
                i_max: l.i_max,
                v_max: l.v_max,
                switch: l.switchable.then_some(i),
                breaker: l.breaker,
                alive: true,
            })
            .collect();
        Reduction {
            network,
            lines,
            bus_lines: network.buses().iter().map(|b| b.lines().to_vec()).collect(),
            bus_alive: vec![true; network.bus_count()],
            representative: vec![None; network.bus_count()],
            dead_ends: Vec::new(),
        }
    }

    fn other_end(&self, line: usize, bus: BusIndex) -> BusIndex {
        let (a, b) = self.lines[line].ends;
        if a == bus {
            b
        } else {
            a
        }
    }

    fn is_junction(&self, bus: BusIndex) -> bool {
        self.network.bus(bus).is_junction()
    }

    fn is_transformer(&self, bus: BusIndex) -> bool {
        self.network.bus(bus).is_transformer()
    }

    fn remove_line(&mut self, line: usize) {
        self.lines[line].alive = false;
        let (a, b) = self.lines[line].ends;
        self.bus_lines[a].retain(|&l| l != line);
        self.bus_lines[b].retain(|&l| l != line);
    }

    /// Remove junctions hanging on a single non-switchable line.
    fn remove_dead_ends(&mut self) -> bool {
        let mut changed = false;
        let mut stack: Vec<BusIndex> = (0..self.bus_lines.len()).collect();
        while let Some(bus) = stack.pop() {
            if !self.bus_alive[bus] || !self.is_junction(bus) || self.bus_lines[bus].len() != 1 {
                continue;
            }
            let line = self.bus_lines[bus][0];
            let anchor = self.other_end(line, bus);
            if self.lines[line].switch.is_some() || self.is_transformer(anchor) {
                continue;
            }
            self.remove_line(line);
            self.bus_alive[bus] = false;
            self.representative[bus] = Some(anchor);
            self.dead_ends.push((bus, anchor));
            stack.push(anchor);
            changed = true;
        }
        changed
    }

    /// Merge non-switchable lines sharing both ends.
    fn merge_parallel(&mut self) -> bool {
        let mut groups: HashMap<(BusIndex, BusIndex), Vec<usize>> = HashMap::new();
        for (i, line) in self.lines.iter().enumerate() {
            let (a, b) = line.ends;
            if !line.alive
                || line.switch.is_some()
                || self.is_transformer(a)
                || self.is_transformer(b)
            {
                continue;
            }
            groups.entry((a.min(b), a.max(b))).or_default().push(i);
        }
        let mut groups: Vec<_> = groups.into_iter().filter(|(_, g)| g.len() > 1).collect();
        groups.sort_unstable();
        for ((low, high), group) in &groups {
            let parts: Vec<LinePart> = group
                .iter()
                .map(|&i| {
                    let part = self.lines[i].part.clone();
                    if self.lines[i].ends.0 == *low {
                        part
                    } else {
                        part.reversed()
                    }
                })
                .collect();
            let impedance = parallel_impedance(group.iter().map(|&i| self.lines[i].impedance));
            let i_max = group.iter().map(|&i| self.lines[i].i_max).sum();
            let v_max = group
                .iter()
                .map(|&i| self.lines[i].v_max)
                .fold(f64::INFINITY, f64::min);
            let breaker = group.iter().any(|&i| self.lines[i].breaker);
            for &i in &group[1..] {
                self.remove_line(i);
            }
            let kept = &mut self.lines[group[0]];
            kept.ends = (*low, *high);
            kept.part = LinePart::Parallel(parts);
            kept.impedance = impedance;
            kept.i_max = i_max;
            kept.v_max = v_max;
            kept.breaker = breaker;
        }
        !groups.is_empty()
    }

    /// Merge the two lines of degree-2 junctions if at most one of them is switchable.
    fn merge_series(&mut self) -> bool {
        let mut changed = false;
        for bus in 0..self.bus_lines.len() {
            if !self.bus_alive[bus] || !self.is_junction(bus) || self.bus_lines[bus].len() != 2 {
                continue;
            }
            let (first, second) = (self.bus_lines[bus][0], self.bus_lines[bus][1]);
            let (x, y) = (self.other_end(first, bus), self.other_end(second, bus));
            let both_switchable =
                self.lines[first].switch.is_some() && self.lines[second].switch.is_some();
            if x == y || both_switchable {
                continue;
            }
            let towards = |line: &WorkLine, from: BusIndex| {
                if line.ends.0 == from {
                    line.part.clone()
                } else {
                    line.part.clone().reversed()
                }
            };
            let part = LinePart::Series(vec![
                towards(&self.lines[first], x),
                towards(&self.lines[second], bus),
            ]);
            let (a, b) = (&self.lines[first], &self.lines[second]);
            let merged = WorkLine {
                ends: (x, y),
                part,
                impedance: a.impedance + b.impedance,
                i_max: a.i_max.min(b.i_max),
                v_max: a.v_max.min(b.v_max),
                switch: a.switch.or(b.switch),
                breaker: a.breaker || b.breaker,
                alive: true,
            };
            self.remove_line(second);
            self.lines[first] = merged;
            self.bus_lines[y].push(first);
            self.bus_lines[bus].clear();
            self.bus_alive[bus] = false;
            self.representative[bus] = Some(x);
            changed = true;
        }
        changed
    }
}

/// A reduced network and the mapping back to the original one.
#[derive(Clone, Debug)]
pub struct NetworkAggregation {
    original: Arc<Network>,
    aggregate: Arc<Network>,
    bus_to_aggregate: Vec<Option<BusIndex>>,
    aggregate_to_bus: Vec<BusIndex>,
    /// Kept original bus for every removed bus.
    representative: Vec<BusIndex>,
    /// Removed dead-end buses with the bus they hung from, in removal order.
    dead_ends: Vec<(BusIndex, BusIndex)>,
    line_to_aggregate: Vec<Option<LineIndex>>,
    merged: Vec<MergedLine>,
}

impl NetworkAggregation {
    pub fn new(original: Arc<Network>) -> DnrResult<Self> {
        let mut reduction = Reduction::new(&original);
        let mut passes = 0;
        loop {
            passes += 1;
            let dead = reduction.remove_dead_ends();
            let parallel = reduction.merge_parallel();
            let series = reduction.merge_series();
            if !(dead || parallel || series) {
                break;
            }
        }

        let mut builder = NetworkBuilder::new();
        let mut bus_to_aggregate = vec![None; original.bus_count()];
        let mut aggregate_to_bus = Vec::new();
        for (i, bus) in original.buses().iter().enumerate() {
            if !reduction.bus_alive[i] {
                continue;
            }
            let index = if let Some(v) = bus.generator_voltage() {
                builder.add_provider(&bus.name, v)
            } else if bus.is_transformer() {
                builder.add_transformer(&bus.name)
            } else if bus.is_consumer() {
                builder.add_consumer(&bus.name)
            } else {
                builder.add_connection(&bus.name)
            };
            builder.set_voltage_limits(index, bus.v_min, bus.v_max);
            bus_to_aggregate[i] = Some(index);
            aggregate_to_bus.push(i);
        }

        let mut line_to_aggregate = vec![None; original.line_count()];
        let mut merged = Vec::new();
        for work in reduction.lines.iter().filter(|l| l.alive) {
            let (a, b) = work.ends;
            let (Some(a), Some(b)) = (bus_to_aggregate[a], bus_to_aggregate[b]) else {
                return Err(DnrError::InvalidOperation(
                    "Aggregate line ends on a removed bus".to_string(),
                ));
            };
            let originals = work.part.original_lines();
            let name = match originals.as_slice() {
                [single] => original.line(*single).name.clone(),
                _ => originals
                    .iter()
                    .map(|&l| original.line(l).name.as_str())
                    .collect::<Vec<_>>()
                    .join("+"),
            };
            let index = if work.switch.is_some() {
                builder.add_switch(&name, a, b)
            } else {
                builder.add_line(&name, a, b)
            };
            let line = builder.line_mut(index);
            line.impedance = work.impedance;
            line.i_max = work.i_max;
            line.v_max = work.v_max;
            line.breaker = work.breaker;
            for l in originals {
                line_to_aggregate[l] = Some(index);
            }
            merged.push(MergedLine {
                line: index,
                part: work.part.clone(),
                switch: work.switch,
            });
        }

        for transformer in original.transformers() {
            let Some(bus) = bus_to_aggregate[transformer.bus] else {
                continue;
            };
            for mode in transformer.modes() {
                if let (Some(input), Some(output)) =
                    (line_to_aggregate[mode.input], line_to_aggregate[mode.output])
                {
                    builder.add_transformer_mode(
                        bus,
                        TransformerMode {
                            input,
                            output,
                            ..mode.clone()
                        },
                    );
                }
            }
        }

        let aggregate = Arc::new(builder.build()?);
        let representative = (0..original.bus_count())
            .map(|bus| {
                let mut current = bus;
                while let Some(next) = reduction.representative[current] {
                    current = next;
                }
                current
            })
            .collect();
        let dead_ends = reduction.dead_ends;

        log::info!(
            "Aggregated network in {passes} passes: {} -> {} buses, {} -> {} lines",
            original.bus_count(),
            aggregate.bus_count(),
            original.line_count(),
            aggregate.line_count()
        );

        Ok(NetworkAggregation {
            original,
            aggregate,
            bus_to_aggregate,
            aggregate_to_bus,
            representative,
            dead_ends,
            line_to_aggregate,
            merged,
        })
    }

    pub fn original(&self) -> &Arc<Network> {
        &self.original
    }

    pub fn aggregate(&self) -> &Arc<Network> {
        &self.aggregate
    }

    /// The aggregate bus of an original bus, None if it was removed.
    pub fn aggregate_bus(&self, bus: BusIndex) -> Option<BusIndex> {
        self.bus_to_aggregate[bus]
    }

    pub fn original_bus(&self, bus: BusIndex) -> BusIndex {
        self.aggregate_to_bus[bus]
    }

    /// The aggregate line containing an original line, None if it was removed.
    pub fn aggregate_line_of(&self, line: LineIndex) -> Option<LineIndex> {
        self.line_to_aggregate[line]
    }

    pub fn merged_line(&self, line: LineIndex) -> &MergedLine {
        &self.merged[line]
    }

    pub fn merged_lines(&self) -> &[MergedLine] {
        &self.merged
    }

    /// Number of removed dead-end buses.
    pub fn dead_end_count(&self) -> usize {
        self.dead_ends.len()
    }

    fn check_settings(&self, settings: &SwitchSettings, network: &Network) -> DnrResult<()> {
        if settings.line_count() == network.line_count() {
            Ok(())
        } else {
            Err(DnrError::BadInput(format!(
                "Switch settings cover {} lines, expected {}",
                settings.line_count(),
                network.line_count()
            )))
        }
    }

    /// Settings of the aggregate network: a line is open iff its switch is open.
    pub fn aggregate_settings(&self, settings: &SwitchSettings) -> DnrResult<SwitchSettings> {
        self.check_settings(settings, &self.original)?;
        let mut result = SwitchSettings::all_closed(&self.aggregate);
        for merged in &self.merged {
            if let Some(switch) = merged.switch {
                result.set_open(merged.line, settings.is_open(switch));
            }
        }
        Ok(result)
    }

    pub fn disaggregate_settings(&self, settings: &SwitchSettings) -> DnrResult<SwitchSettings> {
        self.check_settings(settings, &self.aggregate)?;
        let mut result = SwitchSettings::all_closed(&self.original);
        for merged in &self.merged {
            if let Some(switch) = merged.switch {
                result.set_open(switch, settings.is_open(merged.line));
            }
        }
        Ok(result)
    }

    /// Sum the demands of removed buses into the buses standing in for them.
    pub fn aggregate_demands(&self, demands: &[Complex]) -> DnrResult<Vec<Complex>> {
        if demands.len() != self.original.bus_count() {
            return Err(DnrError::BadInput(format!(
                "{} demands given for {} buses",
                demands.len(),
                self.original.bus_count()
            )));
        }
        let mut result = vec![Complex::default(); self.aggregate.bus_count()];
        for (bus, demand) in demands.iter().enumerate() {
            if let Some(target) = self.bus_to_aggregate[self.representative[bus]] {
                result[target] += *demand;
            }
        }
        Ok(result)
    }

    pub fn aggregate_problem(&self, problem: &Problem) -> DnrResult<Problem> {
        let periods = problem
            .periods()
            .iter()
            .map(|period| {
                Ok(Period {
                    name: period.name.clone(),
                    duration_hours: period.duration_hours,
                    demands: self.aggregate_demands(&period.demands)?,
                })
            })
            .collect::<DnrResult<Vec<_>>>()?;
        Problem::new(Arc::clone(&self.aggregate), periods)
    }

    /// Translate a solution of the original problem to `aggregate_problem`.
    pub fn aggregate_solution(
        &self,
        solution: &Solution,
        aggregate_problem: Arc<Problem>,
    ) -> DnrResult<Solution> {
        let settings = solution
            .settings()
            .iter()
            .map(|s| self.aggregate_settings(s))
            .collect::<DnrResult<Vec<_>>>()?;
        let start = solution
            .start_settings()
            .iter()
            .map(|s| self.aggregate_settings(s))
            .collect::<DnrResult<Vec<_>>>()?;
        let mut result = Solution::new(aggregate_problem, settings)?;
        result.set_start_settings(start)?;
        Ok(result)
    }

    /// Translate a solution of the aggregate problem back to the original problem.
    pub fn disaggregate_solution(
        &self,
        solution: &Solution,
        original_problem: Arc<Problem>,
    ) -> DnrResult<Solution> {
        let settings = solution
            .settings()
            .iter()
            .map(|s| self.disaggregate_settings(s))
            .collect::<DnrResult<Vec<_>>>()?;
        let start = solution
            .start_settings()
            .iter()
            .map(|s| self.disaggregate_settings(s))
            .collect::<DnrResult<Vec<_>>>()?;
        let mut result = Solution::new(original_problem, settings)?;
        result.set_start_settings(start)?;
        Ok(result)
    }

    /// Map an aggregate flow to the original network.
    ///
    /// Series parts carry the aggregate current with the voltage dropping along the chain;
    /// parallel parts split it by admittance. Removed dead ends carry no current and sit at the
    /// voltage of the bus they hang from.
    pub fn disaggregate_flow(
        &self,
        flow: &dyn Flow,
        full: &Topology,
        full_demands: &[Complex],
    ) -> Arc<dyn Flow> {
        if !flow.status().is_usable() {
            return Arc::new(FailedFlow::new("aggregate flow is not usable"));
        }
        if full_demands.len() != self.original.bus_count() {
            return Arc::new(FailedFlow::new("demand count does not match the network"));
        }
        let mut spread = Spread {
            network: &self.original,
            settings: full.settings(),
            voltages: vec![Complex::default(); self.original.bus_count()],
            currents: vec![Complex::default(); self.original.line_count()],
        };
        for (aggregate_bus, &bus) in self.aggregate_to_bus.iter().enumerate() {
            spread.voltages[bus] = flow.voltage(aggregate_bus);
        }
        for merged in &self.merged {
            let (first, second) = self.aggregate.line(merged.line).ends();
            spread.part(
                &merged.part,
                self.aggregate_to_bus[first],
                flow.voltage(first),
                flow.current(merged.line),
                flow.voltage(second),
            );
        }
        for &(bus, anchor) in self.dead_ends.iter().rev() {
            spread.voltages[bus] = spread.voltages[anchor];
        }
        Arc::new(NetworkFlow::new(
            Arc::clone(&self.original),
            flow.status(),
            spread.voltages,
            spread.currents,
        ))
    }
}

/// Voltages and currents of original lines being filled from aggregate lines.
struct Spread<'a> {
    network: &'a Network,
    settings: &'a SwitchSettings,
    voltages: Vec<Complex>,
    currents: Vec<Complex>,
}

impl Spread<'_> {
    /// Fill a part entered at `start` with `voltage`, carrying `current` in the direction of the
    /// part. `far_voltage` is the voltage at the far end of the aggregate line.
    /// Returns the far end of the part and its voltage.
    fn part(
        &mut self,
        part: &LinePart,
        start: BusIndex,
        voltage: Complex,
        current: Complex,
        far_voltage: Complex,
    ) -> (BusIndex, Complex) {
        match part {
            LinePart::Original { line, reversed } => {
                let l = self.network.line(*line);
                self.currents[*line] = if *reversed { -current } else { current };
                let end = l.other_end(start);
                if self.settings.is_open(*line) {
                    // Everything past an open switch hangs from the far end.
                    (end, far_voltage)
                } else {
                    (end, voltage - voltage_drop(l.impedance, current))
                }
            }
            LinePart::Series(parts) => {
                let (mut bus, mut v) = (start, voltage);
                for (i, part) in parts.iter().enumerate() {
                    (bus, v) = self.part(part, bus, v, current, far_voltage);
                    if i + 1 < parts.len() {
                        self.voltages[bus] = v;
                    }
                }
                (bus, v)
            }
            LinePart::Parallel(parts) => {
                let impedances: Vec<Complex> =
                    parts.iter().map(|p| p.impedance(self.network)).collect();
                let zero = Complex::default();
                let shorted = impedances.iter().filter(|&&z| z == zero).count();
                let admittance: Complex = impedances
                    .iter()
                    .filter(|&&z| z != zero)
                    .map(|z| z.inv())
                    .sum();
                let mut result = (start, voltage);
                for (i, (part, z)) in parts.iter().zip(&impedances).enumerate() {
                    let share = if shorted > 0 {
                        if *z == zero {
                            current / shorted as f64
                        } else {
                            zero
                        }
                    } else {
                        current * z.inv() / admittance
                    };
                    let end = self.part(part, start, voltage, share, far_voltage);
                    if i == 0 {
                        result = end;
                    }
                }
                result
            }
        }
    }
}
