use super::*;
use crate::create_rng;
use crate::graph::{NetworkBuilder, TransformerOperation};
use approx::assert_relative_eq;
use rand::{seq::SliceRandom, Rng};

/// Provider - L1 - Junction - L2 - Consumer.
fn chain() -> (Arc<Network>, [BusIndex; 3]) {
    let mut b = NetworkBuilder::new();
    let p = b.add_provider("P", 10.0);
    let j = b.add_connection("J");
    let c = b.add_consumer("C");
    b.add_line("L1", p, j);
    b.add_line("L2", j, c);
    (Arc::new(b.build().unwrap()), [p, j, c])
}

/// Two providers feeding one consumer through two switches.
fn two_providers() -> (Arc<Network>, [BusIndex; 3], [LineIndex; 2]) {
    let mut b = NetworkBuilder::new();
    let p1 = b.add_provider("P1", 10.0);
    let p2 = b.add_provider("P2", 10.0);
    let c = b.add_consumer("C");
    let line1 = b.add_switch("line1", p1, c);
    let line2 = b.add_switch("line2", p2, c);
    (Arc::new(b.build().unwrap()), [p1, p2, c], [line1, line2])
}

/// A loop below one provider closed by a single switch.
fn single_loop() -> (Arc<Network>, LineIndex) {
    let mut b = NetworkBuilder::new();
    let p = b.add_provider("P", 10.0);
    let j1 = b.add_connection("J1");
    let j2 = b.add_consumer("J2");
    let j3 = b.add_consumer("J3");
    b.add_line("A", p, j1);
    b.add_line("B", j1, j2);
    b.add_line("C", j2, j3);
    let s = b.add_switch("S", j3, j1);
    (Arc::new(b.build().unwrap()), s)
}

/// Square grid of switchable lines with providers on two opposite corners.
fn grid(n: usize) -> Arc<Network> {
    let mut b = NetworkBuilder::new();
    let mut buses = Vec::new();
    for i in 0..n {
        for j in 0..n {
            let name = format!("B{i}_{j}");
            let bus = if (i, j) == (0, 0) || (i, j) == (n - 1, n - 1) {
                b.add_provider(&name, 10.0)
            } else {
                b.add_consumer(&name)
            };
            buses.push(bus);
        }
    }
    let mut k = 0;
    for i in 0..n {
        for j in 0..n {
            let here = buses[i * n + j];
            let mut neighbors = Vec::new();
            if j + 1 < n {
                neighbors.push(buses[i * n + j + 1]);
            }
            if i + 1 < n {
                neighbors.push(buses[(i + 1) * n + j]);
            }
            for there in neighbors {
                let line = b.add_switch(&format!("S{k}"), here, there);
                b.set_impedance(line, Complex::new(0.1 * (k % 3 + 1) as f64, 0.05));
                k += 1;
            }
        }
    }
    Arc::new(b.build().unwrap())
}

fn assert_forest(topology: &Topology) {
    let network = topology.network();
    for bus in 0..network.bus_count() {
        if !topology.is_bus_connected(bus) {
            continue;
        }
        if network.bus(bus).is_provider() {
            assert_eq!(topology.distance_to_provider(bus).unwrap(), 0);
            assert_eq!(topology.upstream_bus(bus).unwrap(), None);
            assert_eq!(topology.provider_of(bus).unwrap(), bus);
        } else {
            let up = topology.upstream_bus(bus).unwrap().unwrap();
            let line = topology.upstream_line(bus).unwrap().unwrap();
            assert_eq!(
                topology.distance_to_provider(bus).unwrap(),
                topology.distance_to_provider(up).unwrap() + 1
            );
            assert!(topology.downstream_lines(up).unwrap().contains(&line));
            assert_eq!(topology.downstream_end(line).unwrap(), bus);
            assert_eq!(topology.upstream_end(line).unwrap(), up);
            assert_eq!(
                topology.provider_of(bus).unwrap(),
                topology.provider_of(up).unwrap()
            );
        }
        for &line in topology.downstream_lines(bus).unwrap() {
            let child = network.line(line).other_end(bus);
            assert_eq!(topology.upstream_line(child).unwrap(), Some(line));
        }
    }
}

fn assert_same_state(a: &Topology, b: &Topology) {
    assert_eq!(a.upstream_line, b.upstream_line);
    assert_eq!(a.upstream_bus, b.upstream_bus);
    assert_eq!(a.provider, b.provider);
    assert_eq!(a.distance, b.distance);
    assert_eq!(a.downstream, b.downstream);
    assert_eq!(a.nominal_voltage, b.nominal_voltage);
    assert_eq!(a.bridges, b.bridges);
    assert_eq!(a.unreached, b.unreached);
}

/// Compare the state of `config` with a configuration rebuilt from scratch.
fn assert_matches_full_rebuild(config: &mut NetworkConfiguration) {
    let mut expected =
        NetworkConfiguration::new(config.network().clone(), config.settings().clone()).unwrap();
    expected.ensure_valid();
    config.ensure_valid();
    assert_same_state(
        config.valid_topology().unwrap(),
        expected.valid_topology().unwrap(),
    );
}

fn radial_grid(n: usize, seed: u64) -> NetworkConfiguration {
    let mut config = NetworkConfiguration::all_closed(grid(n));
    let mut rng = create_rng(Some(seed));
    assert!(config
        .make_radial(&mut rng, &RepairOptions::default(), &StopSignal::new())
        .unwrap());
    config
}

#[test]
fn chain_is_radial() {
    let (network, [p, j, c]) = chain();
    let mut config = NetworkConfiguration::all_closed(network);
    let topology = config.topology();
    assert!(topology.is_radial());
    assert_eq!(topology.upstream_bus(c).unwrap(), Some(j));
    assert_eq!(topology.distance_to_provider(c).unwrap(), 2);
    assert_eq!(topology.provider_of(c).unwrap(), p);
    assert_eq!(topology.nominal_voltage(c).unwrap(), Some(10.0));
    assert_eq!(topology.generator_voltage(p).unwrap(), 10.0);
    assert_forest(topology);
}

#[test]
fn two_providers_form_one_cycle() {
    let (network, [p1, p2, c], [line1, line2]) = two_providers();
    let mut config = NetworkConfiguration::all_closed(network);
    let topology = config.topology();
    assert!(topology.has_cycles());
    assert!(topology.is_connected());
    assert_eq!(topology.cycle_bridges().collect::<Vec<_>>(), vec![line2]);

    let cycle = topology.cycle_of_bridge(line2).unwrap();
    assert!(cycle.spans_providers());
    assert_eq!(cycle.len(), 2);
    assert_eq!(cycle.lines().collect::<Vec<_>>(), vec![line1, line2]);
    assert_eq!((cycle.start, cycle.end), (p2, c));
    assert_eq!(cycle.providers, Some((p2, p1)));
}

#[test]
fn opening_one_side_leaves_the_other_path() {
    let (network, [_, p2, c], [line1, _]) = two_providers();
    let mut config = NetworkConfiguration::all_closed(network);
    assert!(config.topology().has_cycles());
    config.set_switch(line1, true).unwrap();
    let topology = config.topology();
    assert!(topology.is_radial());
    assert_eq!(topology.upstream_bus(c).unwrap(), Some(p2));
    assert_forest(topology);
}

#[test]
fn opening_with_bridge_is_incremental() {
    let (network, [_, p2, c], [line1, line2]) = two_providers();
    let mut config = NetworkConfiguration::all_closed(network);
    config.ensure_valid();
    assert_eq!(config.rebuild_stats().full, 1);

    config
        .open_switch_for_breaking_cycle_with_bridge(line1, line2)
        .unwrap();
    assert!(config.topology().is_radial());
    assert_eq!(config.topology().upstream_bus(c).unwrap(), Some(p2));
    assert_eq!(
        config.rebuild_stats(),
        RebuildStats {
            full: 1,
            incremental: 1
        }
    );
    assert_matches_full_rebuild(&mut config);
}

#[test]
fn disconnected_subtree_is_reported() {
    let mut b = NetworkBuilder::new();
    let p = b.add_provider("P", 10.0);
    let c1 = b.add_consumer("C1");
    let c2 = b.add_consumer("C2");
    let c3 = b.add_consumer("C3");
    b.add_line("L1", p, c1);
    let s = b.add_switch("S", p, c2);
    b.add_line("L3", c2, c3);
    let network = Arc::new(b.build().unwrap());
    let settings = SwitchSettings::with_open(&network, [s]);
    let mut config = NetworkConfiguration::new(network, settings).unwrap();

    let topology = config.topology();
    assert!(!topology.is_connected());
    assert!(!topology.is_radial());
    assert_eq!(topology.disconnected_buses(), vec![c2, c3]);
    assert!(matches!(
        topology.provider_of(c3),
        Err(DnrError::InvalidOperation(_))
    ));
    assert!(topology.upstream_bus(c2).is_err());
    assert_eq!(topology.upstream_bus(c1).unwrap(), Some(p));
}

#[test]
fn make_radial_opens_the_only_switch() {
    let (network, s) = single_loop();
    let mut config = NetworkConfiguration::all_closed(network);
    let mut rng = create_rng(Some(1));
    let stop = StopSignal::new();
    assert!(config.topology().has_cycles());

    assert!(config
        .make_radial(&mut rng, &RepairOptions::default(), &stop)
        .unwrap());
    assert!(config.is_open(s));
    assert!(config.topology().is_radial());

    let settings = config.settings().clone();
    let stats = config.rebuild_stats();
    assert!(config
        .make_radial(&mut rng, &RepairOptions::default(), &stop)
        .unwrap());
    assert_eq!(config.settings(), &settings);
    assert_eq!(config.rebuild_stats(), stats);
}

#[test]
fn make_radial_reconnects() {
    let mut b = NetworkBuilder::new();
    let p = b.add_provider("P", 10.0);
    let c = b.add_consumer("C");
    let d = b.add_consumer("D");
    let s1 = b.add_switch("S1", p, c);
    let s2 = b.add_switch("S2", c, d);
    let network = Arc::new(b.build().unwrap());
    let settings = SwitchSettings::with_open(&network, [s1, s2]);
    let mut config = NetworkConfiguration::new(network, settings).unwrap();
    let mut rng = create_rng(Some(7));

    assert!(config
        .make_radial(&mut rng, &RepairOptions::default(), &StopSignal::new())
        .unwrap());
    assert!(!config.is_open(s1));
    assert!(!config.is_open(s2));
}

#[test]
fn make_radial_grid_yields_forest() {
    for seed in 0..5 {
        let mut config = radial_grid(5, seed);
        let topology = config.topology();
        assert!(topology.is_radial());
        assert_forest(topology);
        let network = topology.network().clone();
        // A spanning forest with two trees.
        let closed = network.line_count() - config.settings().open_count();
        assert_eq!(closed, network.bus_count() - 2);
    }
}

#[test]
fn unbreakable_cycle() {
    let mut b = NetworkBuilder::new();
    let p = b.add_provider("P", 10.0);
    let j = b.add_consumer("J");
    b.add_line("A", p, j);
    b.add_line("B", j, p);
    let network = Arc::new(b.build().unwrap());
    let mut rng = create_rng(Some(0));
    let stop = StopSignal::new();

    let mut config = NetworkConfiguration::all_closed(network.clone());
    let result = config.make_radial(&mut rng, &RepairOptions::default(), &stop);
    assert!(matches!(result, Err(DnrError::Repair(_))));

    let partial = RepairOptions {
        mode: RepairMode::Partial,
        ..Default::default()
    };
    let mut config = NetworkConfiguration::all_closed(network);
    assert!(!config.make_radial(&mut rng, &partial, &stop).unwrap());
    assert!(config.topology().has_cycles());
}

#[test]
fn unreachable_bus_fails_repair() {
    let mut b = NetworkBuilder::new();
    let p = b.add_provider("P", 10.0);
    let c = b.add_consumer("C");
    b.add_consumer("Island");
    b.add_line("L", p, c);
    let network = Arc::new(b.build().unwrap());
    let mut rng = create_rng(Some(0));
    let stop = StopSignal::new();

    let mut config = NetworkConfiguration::all_closed(network.clone());
    assert!(config
        .make_radial(&mut rng, &RepairOptions::default(), &stop)
        .is_err());
    let partial = RepairOptions {
        mode: RepairMode::Partial,
        ..Default::default()
    };
    let mut config = NetworkConfiguration::all_closed(network);
    assert!(!config.make_radial(&mut rng, &partial, &stop).unwrap());
}

#[test]
fn make_radial_respects_stop() {
    let mut config = NetworkConfiguration::all_closed(grid(4));
    let mut rng = create_rng(Some(3));
    let stop = StopSignal::new();
    stop.trigger("test");
    assert!(!config
        .make_radial(&mut rng, &RepairOptions::default(), &stop)
        .unwrap());
    assert_eq!(config.settings().open_count(), 0);
}

#[test]
fn bridge_round_trip() {
    let (network, s) = single_loop();
    let mut config = NetworkConfiguration::all_closed(network.clone());
    let bridges: Vec<_> = config.topology().cycle_bridges().collect();
    assert_eq!(bridges.len(), 1);
    let bridge = bridges[0];

    let cycle = config.topology().cycle_of_bridge(bridge).unwrap();
    assert!(!cycle.spans_providers());
    assert_eq!(cycle.len(), 3);
    let (a, b) = network.line(bridge).ends();
    assert_eq!((cycle.start, cycle.end), (a, b));
    assert!(network.line(cycle.path[0]).touches(a));
    assert!(network.line(*cycle.path.last().unwrap()).touches(b));

    config.set_switch(s, true).unwrap();
    assert_eq!(config.topology().bridge_count(), 0);
    config.set_switch(s, false).unwrap();
    assert_eq!(config.topology().bridge_count(), 1);
}

#[test]
fn queries_do_not_rebuild() {
    let mut config = radial_grid(4, 11);
    let stats = config.rebuild_stats();
    let first = config.topology().clone();
    let second = config.topology();
    assert_same_state(&first, second);
    assert_eq!(config.rebuild_stats(), stats);
    assert!(config.valid_topology().is_ok());
}

#[test]
fn stale_topology_is_not_readable() {
    let mut config = radial_grid(3, 2);
    let line = config.settings().open_lines().next().unwrap();
    config.set_switch(line, false).unwrap();
    assert!(!config.is_valid());
    assert!(matches!(
        config.valid_topology(),
        Err(DnrError::InvalidOperation(_))
    ));
    config.ensure_valid();
    assert!(config.valid_topology().is_ok());
}

#[test]
fn flipping_back_needs_no_rebuild() {
    let mut config = radial_grid(3, 4);
    let stats = config.rebuild_stats();
    let line = config.settings().open_lines().next().unwrap();
    assert!(config.set_switch(line, false).unwrap());
    assert!(!config.set_switch(line, false).unwrap());
    config.set_switch(line, true).unwrap();
    assert!(config.is_valid());
    config.ensure_valid();
    assert_eq!(config.rebuild_stats(), stats);
}

#[test]
fn non_switchable_lines_are_fixed() {
    let (network, _) = chain();
    let mut config = NetworkConfiguration::all_closed(network.clone());
    assert!(matches!(
        config.set_switch(0, true),
        Err(DnrError::InvalidOperation(_))
    ));
    assert!(config.set_switch(99, true).is_err());

    let settings = SwitchSettings::with_open(&network, [1]);
    assert!(matches!(
        NetworkConfiguration::new(network, settings),
        Err(DnrError::BadInput(_))
    ));
}

/// Random open/close swaps along cycles, checked against a rebuild from scratch.
#[test]
fn swaps_match_full_rebuild() {
    let mut config = radial_grid(5, 21);
    let network = config.network().clone();
    let mut rng = create_rng(Some(5));
    let mut performed = 0;
    for _ in 0..60 {
        let open: Vec<LineIndex> = config.settings().open_lines().collect();
        let close = *open.choose(&mut rng).unwrap();
        let (a, b) = network.line(close).ends();
        let topology = config.topology();
        let Some(path) = topology.path_between(a, b).unwrap() else {
            continue;
        };
        let Some(&opened) = path.choose(&mut rng) else {
            continue;
        };

        let before = config.rebuild_stats();
        config.set_switch(close, false).unwrap();
        config
            .open_switch_for_breaking_cycle_with_bridge(opened, close)
            .unwrap();
        let topology = config.topology();
        assert!(topology.is_radial());
        assert_forest(topology);
        assert_eq!(config.rebuild_stats().incremental, before.incremental + 1);
        assert_matches_full_rebuild(&mut config);
        performed += 1;
    }
    assert!(performed > 0);
}

/// Closing a switch, then opening a line of the new cycle with the bridge known.
#[test]
fn bridge_openings_match_full_rebuild() {
    let mut config = radial_grid(5, 8);
    let mut rng = create_rng(Some(9));
    for _ in 0..40 {
        let open: Vec<LineIndex> = config.settings().open_lines().collect();
        let close = *open.choose(&mut rng).unwrap();
        config.set_switch(close, false).unwrap();
        let topology = config.topology();
        let Some(bridge) = topology.cycle_bridges().next() else {
            continue;
        };
        let cycle = topology.cycle_of_bridge(bridge).unwrap();
        let lines: Vec<LineIndex> = cycle.lines().collect();
        let opened = lines[rng.gen_range(0..lines.len())];

        config
            .open_switch_for_breaking_cycle_with_bridge(opened, bridge)
            .unwrap();
        let incremental = config.rebuild_stats().incremental;
        assert!(config.topology().is_radial());
        assert_eq!(config.rebuild_stats().incremental, incremental + 1);
        assert_matches_full_rebuild(&mut config);
    }
}

/// Swaps while another cycle stands fall back to a rebuild from scratch.
#[test]
fn swaps_with_standing_cycle_match_full_rebuild() {
    let mut config = radial_grid(5, 13);
    let network = config.network().clone();
    let mut rng = create_rng(Some(17));
    let first = config.settings().open_lines().next().unwrap();
    config.set_switch(first, false).unwrap();
    assert!(config.topology().has_cycles());

    let mut with_cycles = 0;
    for _ in 0..60 {
        let had_cycles = config.topology().has_cycles();
        let open: Vec<LineIndex> = config.settings().open_lines().collect();
        let closed: Vec<LineIndex> = network
            .switchable_lines()
            .iter()
            .copied()
            .filter(|&l| config.settings().is_closed(l))
            .collect();
        let (Some(&close), Some(&opened)) = (open.choose(&mut rng), closed.choose(&mut rng))
        else {
            continue;
        };

        let before = config.rebuild_stats();
        config.set_switch(opened, true).unwrap();
        config.set_switch(close, false).unwrap();
        config.ensure_valid();
        if had_cycles {
            assert_eq!(config.rebuild_stats().full, before.full + 1);
            with_cycles += 1;
        }
        assert_forest(config.topology());
        assert_matches_full_rebuild(&mut config);
    }
    assert!(with_cycles > 0);
}

#[test]
fn long_changelog_rebuilds_fully() {
    let mut config = radial_grid(4, 6);
    let stats = config.rebuild_stats();
    let open: Vec<LineIndex> = config.settings().open_lines().take(3).collect();
    for &line in &open {
        config.set_switch(line, false).unwrap();
    }
    config.ensure_valid();
    assert_eq!(config.rebuild_stats().full, stats.full + 1);
    assert_eq!(config.rebuild_stats().incremental, stats.incremental);
    assert!(config.topology().has_cycles());
}

#[test]
fn tree_navigation() {
    let mut b = NetworkBuilder::new();
    let p = b.add_provider("P", 10.0);
    let a = b.add_connection("A");
    let bb = b.add_consumer("B");
    let c = b.add_connection("C");
    let d = b.add_consumer("D");
    let l0 = b.add_line("L0", p, a);
    let l1 = b.add_line("L1", a, bb);
    let l2 = b.add_line("L2", a, c);
    let l3 = b.add_line("L3", c, d);
    let mut config = NetworkConfiguration::all_closed(Arc::new(b.build().unwrap()));
    let t = config.topology();

    assert_eq!(t.common_ancestor(bb, d).unwrap(), Some(a));
    assert_eq!(t.common_ancestor(d, c).unwrap(), Some(c));
    assert_eq!(t.path_between(bb, d).unwrap(), Some(vec![l1, l2, l3]));
    assert_eq!(t.path_to_provider(d).unwrap(), vec![l3, l2, l0]);
    assert!(t.is_ancestor(a, d).unwrap());
    assert!(t.is_ancestor(d, d).unwrap());
    assert!(!t.is_ancestor(bb, d).unwrap());
    assert_eq!(t.downstream_buses(a).unwrap(), vec![bb, c]);
    assert!(t.is_tree_line(l2));
    assert_eq!(t.upstream_end(l2).unwrap(), a);
    assert!(t.generator_voltage(a).is_err());
    assert_relative_eq!(t.electrical_distance(d).unwrap(), 3.0 * 0.0125f64.sqrt(), epsilon = 1e-3);

    let mut visited = Vec::new();
    assert!(t
        .walk_downstream(a, |bus| {
            visited.push(bus);
            Visit::Continue
        })
        .unwrap());
    assert_eq!(visited, vec![a, bb, c, d]);

    let mut visited = Vec::new();
    assert!(!t
        .walk_downstream(p, |bus| {
            visited.push(bus);
            if bus == c {
                Visit::Stop
            } else {
                Visit::Continue
            }
        })
        .unwrap());
    assert_eq!(visited, vec![p, a, bb, c]);

    let mut visited = Vec::new();
    t.walk_downstream(p, |bus| {
        visited.push(bus);
        if bus == c {
            Visit::SkipChildren
        } else {
            Visit::Continue
        }
    })
    .unwrap();
    assert_eq!(visited, vec![p, a, bb, c]);
    assert_eq!(t.subtree(c).unwrap(), vec![c, d]);
}

/// P2 - S2 - X - lb - T - la - Y - S1 - P1, with T only declared for la -> lb.
fn reversed_transformer() -> (Arc<Network>, BusIndex, [LineIndex; 2], [BusIndex; 2]) {
    let mut b = NetworkBuilder::new();
    let p1 = b.add_provider("P1", 10.0);
    let p2 = b.add_provider("P2", 10.0);
    let t = b.add_transformer("T");
    let x = b.add_connection("X");
    let y = b.add_consumer("Y");
    let s1 = b.add_switch("S1", y, p1);
    let la = b.add_line("la", t, y);
    let lb = b.add_line("lb", x, t);
    let s2 = b.add_switch("S2", p2, x);
    b.add_transformer_mode(
        t,
        TransformerMode {
            input: la,
            output: lb,
            operation: TransformerOperation::FixedRatio,
            ratio: 0.5,
            power_factor: 0.95,
        },
    );
    (Arc::new(b.build().unwrap()), t, [s1, s2], [x, y])
}

#[test]
fn transformer_direction_is_repaired() {
    let (network, t, [s1, s2], [x, y]) = reversed_transformer();
    let settings = SwitchSettings::with_open(&network, [s1]);
    let mut config = NetworkConfiguration::new(network, settings).unwrap();

    let topology = config.topology();
    assert!(topology.is_radial());
    assert_eq!(topology.invalid_transformers(), vec![t]);
    assert!(topology.has_transformers_using_missing_modes());
    assert_eq!(topology.nominal_voltage(y).unwrap(), None);

    assert!(config
        .make_transformers_use_valid_modes(&RepairOptions::default(), &StopSignal::new())
        .unwrap());
    assert!(!config.is_open(s1));
    assert!(config.is_open(s2));
    let topology = config.topology();
    assert!(topology.is_radial());
    assert!(!topology.has_transformers_using_missing_modes());
    assert_eq!(topology.nominal_voltage(x).unwrap(), Some(5.0));
    let output = topology.downstream_lines(t).unwrap()[0];
    assert!(topology.transformer_mode(t, output).is_some());
    assert_forest(topology);
}

/// P1 - S1 - A - l1 - U - l2 - B - S3 - B2 - l3 - T - l4 - C - S2 - P2, where U is only declared
/// for l1 -> l2 and T only for l4 -> l3.
#[test]
fn transformer_fix_keeps_upstream_transformer_valid() {
    let mut b = NetworkBuilder::new();
    let p1 = b.add_provider("P1", 10.0);
    let p2 = b.add_provider("P2", 10.0);
    let a = b.add_consumer("A");
    let u = b.add_transformer("U");
    let bb = b.add_consumer("B");
    let b2 = b.add_consumer("B2");
    let t = b.add_transformer("T");
    let c = b.add_consumer("C");
    let s1 = b.add_switch("S1", p1, a);
    let l1 = b.add_line("l1", a, u);
    let l2 = b.add_line("l2", u, bb);
    let s3 = b.add_switch("S3", bb, b2);
    let l3 = b.add_line("l3", b2, t);
    let l4 = b.add_line("l4", t, c);
    let s2 = b.add_switch("S2", c, p2);
    for (bus, input, output) in [(u, l1, l2), (t, l4, l3)] {
        b.add_transformer_mode(
            bus,
            TransformerMode {
                input,
                output,
                operation: TransformerOperation::FixedRatio,
                ratio: 1.0,
                power_factor: 1.0,
            },
        );
    }
    let network = Arc::new(b.build().unwrap());

    // P1 feeds everything, so T is entered through l3.
    let settings = SwitchSettings::with_open(&network, [s2]);
    let mut config = NetworkConfiguration::new(network, settings).unwrap();
    assert_eq!(config.topology().invalid_transformers(), vec![t]);

    assert!(config
        .make_transformers_use_valid_modes(&RepairOptions::default(), &StopSignal::new())
        .unwrap());
    assert!(config.is_open(s3));
    assert!(!config.is_open(s1));
    assert!(!config.is_open(s2));
    let topology = config.topology();
    assert!(topology.is_radial());
    assert!(topology.invalid_transformers().is_empty());
    assert_eq!(topology.upstream_line(u).unwrap(), Some(l1));
    assert_eq!(topology.upstream_line(t).unwrap(), Some(l4));
    assert_forest(topology);
}

#[test]
fn unfixable_transformer() {
    let mut b = NetworkBuilder::new();
    let p = b.add_provider("P", 10.0);
    let t = b.add_transformer("T");
    let c = b.add_consumer("C");
    b.add_line("in", p, t);
    b.add_line("out", t, c);
    let network = Arc::new(b.build().unwrap());

    let mut config = NetworkConfiguration::all_closed(network.clone());
    assert_eq!(config.topology().invalid_transformers(), vec![t]);
    let result =
        config.make_transformers_use_valid_modes(&RepairOptions::default(), &StopSignal::new());
    assert!(matches!(result, Err(DnrError::Repair(_))));

    let partial = RepairOptions {
        mode: RepairMode::Partial,
        ..Default::default()
    };
    let mut config = NetworkConfiguration::all_closed(network);
    assert!(!config
        .make_transformers_use_valid_modes(&partial, &StopSignal::new())
        .unwrap());
}
