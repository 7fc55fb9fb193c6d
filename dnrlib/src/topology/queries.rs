use super::*;

/// What [`Topology::walk_downstream`] does after visiting a bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visit {
    Continue,
    /// Do not descend below this bus.
    SkipChildren,
    /// Abort the walk.
    Stop,
}

/// A cycle closed by a bridge line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cycle {
    pub bridge: LineIndex,
    /// Lines of the cycle other than the bridge, ordered from `start` to `end`.
    ///
    /// If the cycle spans two providers, the path goes up from `start` to its provider and then
    /// down from the other provider to `end`.
    pub path: Vec<LineIndex>,
    pub start: BusIndex,
    pub end: BusIndex,
    /// Providers on both sides of the bridge if they differ.
    pub providers: Option<(BusIndex, BusIndex)>,
}

impl Cycle {
    /// All lines of the cycle, the bridge last.
    pub fn lines(&self) -> impl Iterator<Item = LineIndex> + '_ {
        self.path
            .iter()
            .copied()
            .chain(std::iter::once(self.bridge))
    }

    pub fn spans_providers(&self) -> bool {
        self.providers.is_some()
    }

    pub fn len(&self) -> usize {
        self.path.len() + 1
    }
}

impl Topology {
    #[inline]
    pub fn network(&self) -> &Arc<Network> {
        &self.network
    }

    #[inline]
    pub fn settings(&self) -> &SwitchSettings {
        &self.settings
    }

    /// True if every bus is reached by a provider.
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.unreached == 0
    }

    #[inline]
    pub fn has_cycles(&self) -> bool {
        !self.bridges.is_empty()
    }

    #[inline]
    pub fn is_radial(&self) -> bool {
        self.is_connected() && !self.has_cycles()
    }

    /// Cycle bridges in ascending line order.
    pub fn cycle_bridges(&self) -> impl Iterator<Item = LineIndex> + '_ {
        self.bridges.iter().copied()
    }

    pub fn bridge_count(&self) -> usize {
        self.bridges.len()
    }

    pub fn is_bridge(&self, line: LineIndex) -> bool {
        self.bridges.contains(&line)
    }

    #[inline]
    pub fn is_bus_connected(&self, bus: BusIndex) -> bool {
        self.provider[bus].is_some()
    }

    pub fn unreached_count(&self) -> usize {
        self.unreached
    }

    pub fn disconnected_buses(&self) -> Vec<BusIndex> {
        if self.unreached == 0 {
            return Vec::new();
        }
        (0..self.network.bus_count())
            .filter(|&bus| self.provider[bus].is_none())
            .collect()
    }

    fn require_connected(&self, bus: BusIndex) -> DnrResult<()> {
        if self.provider.get(bus).copied().flatten().is_some() {
            Ok(())
        } else if bus < self.provider.len() {
            Err(DnrError::InvalidOperation(format!(
                "Bus {} is not connected to any provider",
                self.network.bus(bus).name
            )))
        } else {
            Err(DnrError::InvalidOperation(format!(
                "Bus index {bus} is out of bounds"
            )))
        }
    }

    pub fn provider_of(&self, bus: BusIndex) -> DnrResult<BusIndex> {
        self.require_connected(bus)?;
        Ok(self.provider[bus].unwrap_or(bus))
    }

    /// The line feeding `bus`, None for providers.
    pub fn upstream_line(&self, bus: BusIndex) -> DnrResult<Option<LineIndex>> {
        self.require_connected(bus)?;
        Ok(self.upstream_line[bus])
    }

    /// The bus feeding `bus`, None for providers.
    pub fn upstream_bus(&self, bus: BusIndex) -> DnrResult<Option<BusIndex>> {
        self.require_connected(bus)?;
        Ok(self.upstream_bus[bus])
    }

    /// Number of lines between `bus` and its provider.
    pub fn distance_to_provider(&self, bus: BusIndex) -> DnrResult<usize> {
        self.require_connected(bus)?;
        Ok(self.distance[bus])
    }

    /// Nominal voltage in kV, None if the bus is fed through a transformer that has no mode
    /// for the realized direction.
    pub fn nominal_voltage(&self, bus: BusIndex) -> DnrResult<Option<f64>> {
        self.require_connected(bus)?;
        Ok(self.nominal_voltage[bus])
    }

    pub fn generator_voltage(&self, bus: BusIndex) -> DnrResult<f64> {
        self.network.bus(bus).generator_voltage().ok_or_else(|| {
            DnrError::InvalidOperation(format!(
                "Bus {} is not a provider",
                self.network.bus(bus).name
            ))
        })
    }

    /// Lines fed by `bus`, sorted by index.
    pub fn downstream_lines(&self, bus: BusIndex) -> DnrResult<&[LineIndex]> {
        self.require_connected(bus)?;
        Ok(&self.downstream[bus])
    }

    pub fn downstream_buses(&self, bus: BusIndex) -> DnrResult<Vec<BusIndex>> {
        Ok(self
            .downstream_lines(bus)?
            .iter()
            .map(|&line| self.network.line(line).other_end(bus))
            .collect())
    }

    /// True if the line is the upstream line of one of its endpoints.
    pub fn is_tree_line(&self, line: LineIndex) -> bool {
        self.lower_end(line).is_some()
    }

    /// The endpoint of a tree line that is fed through it.
    pub fn downstream_end(&self, line: LineIndex) -> DnrResult<BusIndex> {
        self.lower_end(line).ok_or_else(|| self.not_a_tree_line(line))
    }

    /// The endpoint of a tree line that feeds it.
    pub fn upstream_end(&self, line: LineIndex) -> DnrResult<BusIndex> {
        self.lower_end(line)
            .map(|bus| self.network.line(line).other_end(bus))
            .ok_or_else(|| self.not_a_tree_line(line))
    }

    fn not_a_tree_line(&self, line: LineIndex) -> DnrError {
        DnrError::InvalidOperation(format!(
            "Line {} does not connect a bus to its upstream bus",
            self.network.line(line).name
        ))
    }

    /// `bus` followed by its upstream buses up to the provider.
    fn ancestors(&self, bus: BusIndex) -> impl Iterator<Item = BusIndex> + '_ {
        std::iter::successors(Some(bus), move |&b| self.upstream_bus[b])
    }

    /// Upstream lines from `bus` up to (excluding) `top`, which must be an ancestor.
    fn lines_up_to(&self, bus: BusIndex, top: BusIndex) -> Vec<LineIndex> {
        self.ancestors(bus)
            .take_while(|&b| b != top)
            .filter_map(|b| self.upstream_line[b])
            .collect()
    }

    /// True if `ancestor` is on the path from `bus` to its provider, `bus` included.
    pub fn is_ancestor(&self, ancestor: BusIndex, bus: BusIndex) -> DnrResult<bool> {
        self.require_connected(ancestor)?;
        self.require_connected(bus)?;
        let (da, db) = (self.distance[ancestor], self.distance[bus]);
        Ok(da <= db && self.ancestors(bus).nth(db - da) == Some(ancestor))
    }

    /// The deepest common ancestor, None if the buses hang below different providers.
    pub fn common_ancestor(&self, a: BusIndex, b: BusIndex) -> DnrResult<Option<BusIndex>> {
        self.require_connected(a)?;
        self.require_connected(b)?;
        let (da, db) = (self.distance[a], self.distance[b]);
        let up_a = self.ancestors(a).skip(da.saturating_sub(db));
        let up_b = self.ancestors(b).skip(db.saturating_sub(da));
        Ok(up_a.zip(up_b).find(|(x, y)| x == y).map(|(x, _)| x))
    }

    /// Lines from `bus` up to its provider.
    pub fn path_to_provider(&self, bus: BusIndex) -> DnrResult<Vec<LineIndex>> {
        self.require_connected(bus)?;
        Ok(self.ancestors(bus).filter_map(|b| self.upstream_line[b]).collect())
    }

    /// Tree lines from `a` to `b`, None if they hang below different providers.
    pub fn path_between(&self, a: BusIndex, b: BusIndex) -> DnrResult<Option<Vec<LineIndex>>> {
        let Some(top) = self.common_ancestor(a, b)? else {
            return Ok(None);
        };
        let mut path = self.lines_up_to(a, top);
        let mut down = self.lines_up_to(b, top);
        down.reverse();
        path.append(&mut down);
        Ok(Some(path))
    }

    /// Sum of line impedance magnitudes between `bus` and its provider.
    pub fn electrical_distance(&self, bus: BusIndex) -> DnrResult<f64> {
        Ok(self
            .path_to_provider(bus)?
            .iter()
            .map(|&line| self.network.line(line).impedance.norm())
            .sum())
    }

    /// Depth-first, pre-order walk of the subtree rooted at `root`.
    /// Returns false if the visitor stopped the walk.
    pub fn walk_downstream<F>(&self, root: BusIndex, mut visit: F) -> DnrResult<bool>
    where
        F: FnMut(BusIndex) -> Visit,
    {
        self.require_connected(root)?;
        let mut stack = vec![root];
        while let Some(bus) = stack.pop() {
            match visit(bus) {
                Visit::Stop => return Ok(false),
                Visit::SkipChildren => {}
                Visit::Continue => stack.extend(
                    self.downstream[bus]
                        .iter()
                        .rev()
                        .map(|&line| self.network.line(line).other_end(bus)),
                ),
            }
        }
        Ok(true)
    }

    /// Buses of the subtree rooted at `root`, `root` first.
    pub fn subtree(&self, root: BusIndex) -> DnrResult<Vec<BusIndex>> {
        self.require_connected(root)?;
        Ok(self.collect_subtree(root))
    }

    /// Reconstruct the cycle closed by a bridge.
    pub fn cycle_of_bridge(&self, bridge: LineIndex) -> DnrResult<Cycle> {
        if !self.bridges.contains(&bridge) {
            return Err(DnrError::InvalidOperation(format!(
                "Line {} is not a cycle bridge",
                self.network.line(bridge).name
            )));
        }
        let (start, end) = self.network.line(bridge).ends();
        match self.common_ancestor(start, end)? {
            Some(top) => {
                let mut path = self.lines_up_to(start, top);
                let mut down = self.lines_up_to(end, top);
                down.reverse();
                path.append(&mut down);
                Ok(Cycle {
                    bridge,
                    path,
                    start,
                    end,
                    providers: None,
                })
            }
            None => {
                let mut path = self.path_to_provider(start)?;
                let mut down = self.path_to_provider(end)?;
                down.reverse();
                path.append(&mut down);
                Ok(Cycle {
                    bridge,
                    path,
                    start,
                    end,
                    providers: Some((self.provider_of(start)?, self.provider_of(end)?)),
                })
            }
        }
    }

    /// The mode a connected transformer bus uses to feed `output`.
    pub fn transformer_mode(&self, bus: BusIndex, output: LineIndex) -> Option<&TransformerMode> {
        let transformer = self.network.transformer_at(bus)?;
        transformer.mode(self.upstream_line[bus]?, output)
    }

    /// False for a connected transformer whose realized direction has no declared mode.
    pub fn is_transformer_valid(&self, bus: BusIndex) -> bool {
        let Some(transformer) = self.network.transformer_at(bus) else {
            return true;
        };
        match self.upstream_line[bus] {
            Some(input) => transformer.supports(input, &self.downstream[bus]),
            None => true,
        }
    }

    /// Connected transformer buses using a direction without a declared mode.
    pub fn invalid_transformers(&self) -> Vec<BusIndex> {
        self.network
            .transformers()
            .iter()
            .map(|t| t.bus)
            .filter(|&bus| !self.is_transformer_valid(bus))
            .collect()
    }

    pub fn has_transformers_using_missing_modes(&self) -> bool {
        self.network
            .transformers()
            .iter()
            .any(|t| !self.is_transformer_valid(t.bus))
    }

    /// Invalid transformers with no invalid transformer upstream of them.
    pub fn undominated_invalid_transformers(&self) -> Vec<BusIndex> {
        self.invalid_transformers()
            .into_iter()
            .filter(|&bus| {
                self.ancestors(bus)
                    .skip(1)
                    .all(|above| self.is_transformer_valid(above))
            })
            .collect()
    }

    /// Open switchable lines between a connected and a disconnected bus.
    pub fn boundary_switches(&self) -> Vec<LineIndex> {
        self.network
            .switchable_lines()
            .iter()
            .copied()
            .filter(|&line| {
                let (a, b) = self.network.line(line).ends();
                self.settings.is_open(line) && self.is_bus_connected(a) != self.is_bus_connected(b)
            })
            .collect()
    }
}
