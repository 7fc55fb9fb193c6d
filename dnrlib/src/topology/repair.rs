//! Repairs that turn an arbitrary configuration into a radial, transformer-consistent one.
use super::*;
use ordered_float::OrderedFloat;
use rand::{seq::SliceRandom, Rng};

/// What a repair does when it cannot finish.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum RepairMode {
    /// Return a [`DnrError::Repair`].
    #[default]
    Fail,
    /// Keep the partial repair and return `Ok(false)`.
    Partial,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct RepairOptions {
    pub mode: RepairMode,
    /// Upper bound on repair rounds.
    pub max_iterations: usize,
}

impl Default for RepairOptions {
    fn default() -> Self {
        RepairOptions {
            mode: RepairMode::Fail,
            max_iterations: 1000,
        }
    }
}

/// Largest number of boundary switches closed in one round.
const MAX_CLOSE_BATCH: usize = 6;

fn repair_failed(mode: RepairMode, reason: String) -> DnrResult<bool> {
    match mode {
        RepairMode::Fail => Err(DnrError::Repair(reason)),
        RepairMode::Partial => {
            log::warn!("Partial repair: {reason}");
            Ok(false)
        }
    }
}

/// Buses that no provider reaches even with every line closed.
fn unreachable_buses(network: &Network) -> Vec<BusIndex> {
    let mut reached = vec![false; network.bus_count()];
    let mut stack: Vec<BusIndex> = network.providers().to_vec();
    for &p in &stack {
        reached[p] = true;
    }
    while let Some(bus) = stack.pop() {
        for &line in network.bus(bus).lines() {
            let other = network.line(line).other_end(bus);
            if !reached[other] {
                reached[other] = true;
                stack.push(other);
            }
        }
    }
    (0..network.bus_count()).filter(|&b| !reached[b]).collect()
}

impl Topology {
    /// The switchable line of a cycle whose opening splits the load most evenly, None if the
    /// cycle has no switchable line.
    ///
    /// For a cycle across two providers this is the line nearest the electrical midpoint
    /// between them; for a cycle below a single provider, the line farthest from it.
    fn balanced_opening(&self, cycle: &Cycle) -> DnrResult<Option<LineIndex>> {
        let network = &self.network;
        let midpoint = |line: LineIndex| -> DnrResult<f64> {
            let (a, b) = network.line(line).ends();
            Ok((self.electrical_distance(a)? + self.electrical_distance(b)?) / 2.0)
        };
        let mut best: Option<(OrderedFloat<f64>, LineIndex)> = None;
        match cycle.providers {
            None => {
                for line in cycle.lines().filter(|&l| network.line(l).switchable) {
                    // Farthest first, lowest index on ties.
                    let key = OrderedFloat(-midpoint(line)?);
                    if best.map_or(true, |(k, l)| (key, line) < (k, l)) {
                        best = Some((key, line));
                    }
                }
            }
            Some((first, _)) => {
                let near = self.electrical_distance(cycle.start)?;
                let far = self.electrical_distance(cycle.end)?;
                let bridge = network.line(cycle.bridge).impedance.norm();
                let total = near + bridge + far;
                for line in cycle.lines().filter(|&l| network.line(l).switchable) {
                    // Position along the cycle, measured from the first provider.
                    let position = if line == cycle.bridge {
                        near + bridge / 2.0
                    } else {
                        let (a, _) = network.line(line).ends();
                        if self.provider[a] == Some(first) {
                            midpoint(line)?
                        } else {
                            total - midpoint(line)?
                        }
                    };
                    let key = OrderedFloat((position - total / 2.0).abs());
                    if best.map_or(true, |(k, l)| (key, line) < (k, l)) {
                        best = Some((key, line));
                    }
                }
            }
        }
        Ok(best.map(|(_, line)| line))
    }

    /// Transformers between a candidate opening and the repaired transformer get their input
    /// from `new_input` after the swap; true if they have modes for that direction.
    fn valid_if_reversed(&self, bus: BusIndex, new_input: LineIndex, opened: LineIndex) -> bool {
        let Some(transformer) = self.network.transformer_at(bus) else {
            return true;
        };
        let mut outputs: Vec<LineIndex> = self.downstream[bus]
            .iter()
            .copied()
            .filter(|&l| l != new_input)
            .collect();
        if let Some(input) = self.upstream_line[bus] {
            if input != opened {
                outputs.push(input);
            }
        }
        transformer.supports(new_input, &outputs)
    }

    /// Open switches below `transformer` whose closing reconnects it from outside the subtree
    /// rooted at `root`.
    fn reconnection_switches(&self, transformer: BusIndex, root: BusIndex) -> DnrResult<Vec<LineIndex>> {
        let network = &self.network;
        let mut switches = Vec::new();
        self.walk_downstream(transformer, |bus| {
            for &line in network.bus(bus).lines() {
                if !network.line(line).switchable || self.settings.is_closed(line) {
                    continue;
                }
                let other = network.line(line).other_end(bus);
                if self.is_bus_connected(other) && matches!(self.is_ancestor(root, other), Ok(false)) {
                    switches.push(line);
                }
            }
            Visit::Continue
        })?;
        Ok(switches)
    }

    /// Candidate (open, close) pairs for an invalid transformer, nearest openings first.
    fn transformer_fix_candidates(&self, transformer: BusIndex) -> DnrResult<Vec<(LineIndex, LineIndex)>> {
        let mut pairs = Vec::new();
        // Transformers above the target, with the line leading towards the target.
        let mut intervening: Vec<(BusIndex, LineIndex)> = Vec::new();
        let mut bus = transformer;
        let mut below: Option<LineIndex> = None;
        while let (Some(line), Some(parent)) = (self.upstream_line[bus], self.upstream_bus[bus]) {
            if let Some(below) = below {
                if self.network.bus(bus).is_transformer() {
                    intervening.push((bus, below));
                }
            }
            if self.network.line(line).switchable
                && intervening
                    .iter()
                    .all(|&(t, input)| self.valid_if_reversed(t, input, line))
            {
                for close in self.reconnection_switches(transformer, bus)? {
                    pairs.push((line, close));
                }
            }
            below = Some(line);
            bus = parent;
        }
        Ok(pairs)
    }
}

impl NetworkConfiguration {
    /// Open and close switches until the configuration is radial.
    ///
    /// Each round closes a random batch of switches on the boundary of the disconnected part
    /// and opens the most balanced switchable line of every cycle. Returns true if the result
    /// is radial.
    pub fn make_radial<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        options: &RepairOptions,
        stop: &StopSignal,
    ) -> DnrResult<bool> {
        let network = Arc::clone(self.network());
        let mut unreachable = 0;
        if !self.topology().is_connected() {
            let buses = unreachable_buses(&network);
            if let Some(&first) = buses.first() {
                let reason = format!(
                    "{} buses cannot be reached from any provider, including {}",
                    buses.len(),
                    network.bus(first).name
                );
                if options.mode == RepairMode::Fail {
                    return Err(DnrError::Repair(reason));
                }
                log::warn!("{reason}");
                unreachable = buses.len();
            }
        }

        for iteration in 0..options.max_iterations {
            let topology = self.topology();
            let done = !topology.has_cycles() && topology.unreached_count() <= unreachable;
            if done {
                if iteration > 0 {
                    log::debug!("Configuration made radial in {iteration} rounds");
                }
                return Ok(unreachable == 0);
            }
            if stop.is_triggered() {
                return Ok(false);
            }

            let mut to_close = Vec::new();
            if topology.unreached_count() > unreachable {
                let boundary = topology.boundary_switches();
                if boundary.is_empty() {
                    return repair_failed(
                        options.mode,
                        "Disconnected buses have no switch to a connected bus".to_string(),
                    );
                }
                let count = rng.gen_range(1..=MAX_CLOSE_BATCH).min(boundary.len());
                to_close.extend(boundary.choose_multiple(rng, count).copied());
            }

            let mut to_open: Vec<(LineIndex, LineIndex)> = Vec::new();
            let mut unbreakable = None;
            for bridge in topology.cycle_bridges() {
                let cycle = topology.cycle_of_bridge(bridge)?;
                match topology.balanced_opening(&cycle)? {
                    Some(line) => to_open.push((line, bridge)),
                    None => {
                        unbreakable = Some(format!(
                            "Cycle closed by line {} has no switchable line",
                            network.line(bridge).name
                        ));
                        if options.mode == RepairMode::Fail {
                            break;
                        }
                    }
                }
            }
            if let (Some(reason), RepairMode::Fail) = (&unbreakable, options.mode) {
                return Err(DnrError::Repair(reason.clone()));
            }
            to_open.sort_unstable();
            to_open.dedup_by_key(|(line, _)| *line);

            for line in to_close {
                self.set_switch(line, false)?;
            }
            for (line, bridge) in to_open {
                self.open_switch_for_breaking_cycle_with_bridge(line, bridge)?;
            }
            if let Some(reason) = unbreakable {
                return repair_failed(options.mode, reason);
            }
        }

        if self.topology().is_radial() {
            Ok(true)
        } else {
            repair_failed(
                options.mode,
                format!(
                    "Configuration is not radial after {} rounds",
                    options.max_iterations
                ),
            )
        }
    }

    /// Swap switches until every connected transformer uses declared modes.
    ///
    /// Transformers are fixed top-down: a transformer below another invalid transformer is only
    /// considered once the upper one is fixed. Returns true if no invalid transformer remains.
    pub fn make_transformers_use_valid_modes(
        &mut self,
        options: &RepairOptions,
        stop: &StopSignal,
    ) -> DnrResult<bool> {
        let network = Arc::clone(self.network());
        let mut unfixable: Vec<BusIndex> = Vec::new();
        for _ in 0..options.max_iterations {
            if stop.is_triggered() {
                return Ok(!self.topology().has_transformers_using_missing_modes());
            }
            let target = self
                .topology()
                .undominated_invalid_transformers()
                .into_iter()
                .find(|t| !unfixable.contains(t));
            let Some(transformer) = target else {
                return Ok(!self.topology().has_transformers_using_missing_modes());
            };
            match self.find_transformer_fix(transformer)? {
                Some((open, close)) => {
                    log::debug!(
                        "Transformer {}: opening {} and closing {}",
                        network.bus(transformer).name,
                        network.line(open).name,
                        network.line(close).name
                    );
                    self.set_switch(close, false)?;
                    self.open_switch_for_breaking_cycle_with_bridge(open, close)?;
                }
                None => {
                    let reason = format!(
                        "No switch pair makes transformer {} use a declared mode",
                        network.bus(transformer).name
                    );
                    repair_failed(options.mode, reason)?;
                    unfixable.push(transformer);
                }
            }
        }
        repair_failed(
            options.mode,
            format!(
                "Transformers still invalid after {} rounds",
                options.max_iterations
            ),
        )
    }

    /// The first candidate pair that fixes `transformer` without breaking anything else,
    /// checked on a scratch copy.
    fn find_transformer_fix(&mut self, transformer: BusIndex) -> DnrResult<Option<(LineIndex, LineIndex)>> {
        let topology = self.topology();
        let invalid = topology.invalid_transformers().len();
        let bridges = topology.bridge_count();
        let unreached = topology.unreached_count();
        let candidates = topology.transformer_fix_candidates(transformer)?;
        for (open, close) in candidates {
            let mut trial = self.clone();
            trial.set_switch(close, false)?;
            trial.open_switch_for_breaking_cycle_with_bridge(open, close)?;
            let after = trial.topology();
            if after.is_bus_connected(transformer)
                && after.is_transformer_valid(transformer)
                && after.invalid_transformers().len() < invalid
                && after.bridge_count() <= bridges
                && after.unreached_count() <= unreached
            {
                return Ok(Some((open, close)));
            }
        }
        Ok(None)
    }
}
