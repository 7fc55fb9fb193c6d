use super::*;

/// Distance of buses that are not reached by any provider.
const UNREACHED: usize = usize::MAX;

/// Derived rooted-forest view of a network under one switch setting.
///
/// Every connected bus except the providers has exactly one upstream line, and the downstream
/// lists are the exact inverse of the upstream pointers. Closed lines that would give a bus a
/// second parent are recorded as cycle bridges instead of being followed.
#[derive(Clone, Debug)]
pub struct Topology {
    pub(super) network: Arc<Network>,
    pub(super) settings: SwitchSettings,
    pub(super) upstream_line: Vec<Option<LineIndex>>,
    pub(super) upstream_bus: Vec<Option<BusIndex>>,
    pub(super) provider: Vec<Option<BusIndex>>,
    pub(super) distance: Vec<usize>,
    /// Sorted by line index.
    pub(super) downstream: Vec<Vec<LineIndex>>,
    pub(super) nominal_voltage: Vec<Option<f64>>,
    pub(super) bridges: BTreeSet<LineIndex>,
    /// Number of buses without a provider.
    pub(super) unreached: usize,
    /// Subtree membership scratch space, all false outside of rebuilds.
    marks: Vec<bool>,
}

impl Topology {
    pub(super) fn new(network: Arc<Network>, settings: SwitchSettings) -> Self {
        let n = network.bus_count();
        Topology {
            network,
            settings,
            upstream_line: vec![None; n],
            upstream_bus: vec![None; n],
            provider: vec![None; n],
            distance: vec![UNREACHED; n],
            downstream: vec![Vec::new(); n],
            nominal_voltage: vec![None; n],
            bridges: BTreeSet::new(),
            unreached: n,
            marks: vec![false; n],
        }
    }

    fn clear_bus(&mut self, bus: BusIndex) {
        if self.provider[bus].is_some() {
            self.unreached += 1;
        }
        self.upstream_line[bus] = None;
        self.upstream_bus[bus] = None;
        self.provider[bus] = None;
        self.distance[bus] = UNREACHED;
        self.downstream[bus].clear();
        self.nominal_voltage[bus] = None;
    }

    /// Make `child` hang below `parent` through `line`.
    fn attach(&mut self, parent: BusIndex, line: LineIndex, child: BusIndex) {
        self.upstream_line[child] = Some(line);
        self.upstream_bus[child] = Some(parent);
        self.provider[child] = self.provider[parent];
        self.distance[child] = self.distance[parent] + 1;
        self.nominal_voltage[child] = self.voltage_through(parent, line);
        let children = &mut self.downstream[parent];
        let pos = children.binary_search(&line).unwrap_or_else(|e| e);
        children.insert(pos, line);
        self.unreached -= 1;
    }

    /// Nominal voltage on `line` when it is fed from `parent`.
    /// None behind a transformer without a mode for this direction.
    fn voltage_through(&self, parent: BusIndex, line: LineIndex) -> Option<f64> {
        let voltage = self.nominal_voltage[parent]?;
        match self.network.transformer_at(parent) {
            None => Some(voltage),
            Some(transformer) => {
                let input = self.upstream_line[parent]?;
                transformer
                    .mode(input, line)
                    .map(|mode| voltage * mode.ratio)
            }
        }
    }

    /// Breadth-first exploration over closed lines from the queued buses.
    fn explore(&mut self, queue: &mut VecDeque<BusIndex>) {
        let network = Arc::clone(&self.network);
        while let Some(bus) = queue.pop_front() {
            for &line in network.bus(bus).lines() {
                if self.settings.is_open(line) || self.upstream_line[bus] == Some(line) {
                    continue;
                }
                let other = network.line(line).other_end(bus);
                if self.provider[other].is_none() {
                    self.attach(bus, line, other);
                    queue.push_back(other);
                } else if self.upstream_line[other] != Some(line) {
                    self.bridges.insert(line);
                }
            }
        }
    }

    /// Multi-source traversal from every provider.
    pub(super) fn full_rebuild(&mut self) {
        let n = self.network.bus_count();
        self.upstream_line.fill(None);
        self.upstream_bus.fill(None);
        self.provider.fill(None);
        self.distance.fill(UNREACHED);
        self.nominal_voltage.fill(None);
        self.downstream.iter_mut().for_each(Vec::clear);
        self.bridges.clear();
        self.unreached = n;

        let network = Arc::clone(&self.network);
        let mut queue = VecDeque::with_capacity(n);
        for &p in network.providers() {
            self.provider[p] = Some(p);
            self.distance[p] = 0;
            self.nominal_voltage[p] = network.bus(p).generator_voltage();
            self.unreached -= 1;
            queue.push_back(p);
        }
        self.explore(&mut queue);
    }

    /// The endpoint of a tree line that hangs below it.
    pub(super) fn lower_end(&self, line: LineIndex) -> Option<BusIndex> {
        let (a, b) = self.network.line(line).ends();
        if self.upstream_line[a] == Some(line) {
            Some(a)
        } else if self.upstream_line[b] == Some(line) {
            Some(b)
        } else {
            None
        }
    }

    /// Buses of the subtree rooted at `root` in breadth-first order.
    pub(super) fn collect_subtree(&self, root: BusIndex) -> Vec<BusIndex> {
        let mut buses = vec![root];
        let mut i = 0;
        while i < buses.len() {
            let bus = buses[i];
            buses.extend(
                self.downstream[bus]
                    .iter()
                    .map(|&line| self.network.line(line).other_end(bus)),
            );
            i += 1;
        }
        buses
    }

    /// Incremental rebuild after opening `opened`, a tree line or a bridge, where `bridge` is
    /// the bridge expected to disappear. Only applies while `bridge` is the sole bridge.
    /// Returns false if the shortcut does not apply, in which case nothing was modified.
    pub(super) fn open_with_bridge(&mut self, opened: LineIndex, bridge: LineIndex) -> bool {
        if self.bridges.len() != 1 || !self.bridges.contains(&bridge) {
            return false;
        }
        if self.bridges.remove(&opened) {
            // Bridges carry no tree structure.
            return true;
        }
        self.reattach_below(opened, bridge)
    }

    /// Incremental rebuild after opening `opened` and closing `closed`, starting from a forest
    /// without cycles. Returns false if the shortcut does not apply, in which case nothing was
    /// modified.
    pub(super) fn swap(&mut self, opened: LineIndex, closed: LineIndex) -> bool {
        if opened == closed {
            return true;
        }
        // With a standing cycle the parents picked by a traversal are not unique.
        if !self.bridges.is_empty() {
            return false;
        }
        self.reattach_below(opened, closed)
    }

    /// Clear the subtree below the opened tree line `opened` and explore it again through
    /// `entry`, a closed line with exactly one endpoint in the subtree and the other one reached.
    fn reattach_below(&mut self, opened: LineIndex, entry: LineIndex) -> bool {
        let Some(root) = self.lower_end(opened) else {
            return false;
        };
        if self.settings.is_open(entry) {
            return false;
        }
        let subtree = self.collect_subtree(root);
        for &bus in &subtree {
            self.marks[bus] = true;
        }
        let (a, b) = self.network.line(entry).ends();
        let outside = match (self.marks[a], self.marks[b]) {
            (true, false) => Some(b),
            (false, true) => Some(a),
            _ => None,
        }
        .filter(|&bus| self.provider[bus].is_some());
        let Some(outside) = outside else {
            for &bus in &subtree {
                self.marks[bus] = false;
            }
            return false;
        };
        let inside = self.network.line(entry).other_end(outside);

        if let Some(parent) = self.upstream_bus[root] {
            self.downstream[parent].retain(|&l| l != opened);
        }
        let network = Arc::clone(&self.network);
        for &bus in &subtree {
            for line in network.bus(bus).lines() {
                self.bridges.remove(line);
            }
        }
        for &bus in &subtree {
            self.clear_bus(bus);
        }

        let mut queue = VecDeque::new();
        self.attach(outside, entry, inside);
        queue.push_back(inside);
        self.explore(&mut queue);
        self.adopt_stragglers(&subtree, &mut queue);

        for &bus in &subtree {
            self.marks[bus] = false;
        }
        true
    }

    /// Attach buses of a cleared subtree that the entry line did not reach but that have a
    /// closed line to a reached bus.
    fn adopt_stragglers(&mut self, buses: &[BusIndex], queue: &mut VecDeque<BusIndex>) {
        let network = Arc::clone(&self.network);
        loop {
            let mut progressed = false;
            for &bus in buses {
                if self.provider[bus].is_some() {
                    continue;
                }
                let link = network.bus(bus).lines().iter().copied().find(|&line| {
                    self.settings.is_closed(line)
                        && self.provider[network.line(line).other_end(bus)].is_some()
                });
                if let Some(line) = link {
                    let parent = network.line(line).other_end(bus);
                    self.attach(parent, line, bus);
                    queue.push_back(bus);
                    self.explore(queue);
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }
    }
}
