//! Radial topology of a network under a switch setting.
//!
//! [`NetworkConfiguration`] owns a [`SwitchSettings`] table and the derived rooted-forest view
//! ([`Topology`]) of the network under those settings. Switch changes only invalidate the view;
//! it is rebuilt lazily by [`NetworkConfiguration::ensure_valid`], incrementally when the
//! changes since the last rebuild are a single opening with a known bridge or an open/close
//! swap and no other cycle stands, and from scratch otherwise.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use crate::graph::{Network, TransformerMode};
use crate::stop::StopSignal;
use crate::switches::SwitchSettings;
use crate::types::*;
use crate::{DnrError, DnrResult};

mod forest;
mod queries;
mod repair;

pub use forest::Topology;
pub use queries::{Cycle, Visit};
pub use repair::{RepairMode, RepairOptions};

/// Changelogs with more entries than this always lead to a full rebuild.
const CHANGELOG_LIMIT: usize = 2;

/// Switches flipped since the last rebuild.
#[derive(Clone, Debug, Default)]
struct ChangeLog {
    opened: Vec<LineIndex>,
    closed: Vec<LineIndex>,
    /// Bridge expected to disappear with the given opening.
    bridge: Option<(LineIndex, LineIndex)>,
}

impl ChangeLog {
    /// Record a flip. Flipping a line back cancels its earlier entry.
    fn record(&mut self, line: LineIndex, open: bool) {
        let (same, opposite) = if open {
            (&mut self.opened, &mut self.closed)
        } else {
            (&mut self.closed, &mut self.opened)
        };
        if let Some(pos) = opposite.iter().position(|&l| l == line) {
            opposite.remove(pos);
        } else {
            same.push(line);
        }
        if matches!(self.bridge, Some((opened, _)) if !self.opened.contains(&opened)) {
            self.bridge = None;
        }
    }

    fn len(&self) -> usize {
        self.opened.len() + self.closed.len()
    }

    fn is_empty(&self) -> bool {
        self.opened.is_empty() && self.closed.is_empty()
    }
}

#[derive(Clone, Debug)]
enum CacheState {
    /// The derived view matches the settings.
    Valid,
    /// Small changelog, an incremental rebuild may apply.
    Stale(ChangeLog),
    /// Never built or too many changes.
    Dirty,
}

/// Counts of rebuilds performed by a configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RebuildStats {
    pub full: usize,
    pub incremental: usize,
}

impl RebuildStats {
    pub fn total(&self) -> usize {
        self.full + self.incremental
    }
}

/// A network together with one switch setting and its cached radial topology.
#[derive(Clone, Debug)]
pub struct NetworkConfiguration {
    topology: Topology,
    state: CacheState,
    stats: RebuildStats,
}

impl NetworkConfiguration {
    /// Create a configuration with the given settings.
    ///
    /// The settings must cover every line of the network and only non-switchable lines may be
    /// closed.
    pub fn new(network: Arc<Network>, settings: SwitchSettings) -> DnrResult<Self> {
        if settings.line_count() != network.line_count() {
            return Err(DnrError::BadInput(format!(
                "Switch settings cover {} lines, network has {}",
                settings.line_count(),
                network.line_count()
            )));
        }
        if let Some(line) = settings
            .open_lines()
            .find(|&l| !network.line(l).switchable)
        {
            return Err(DnrError::BadInput(format!(
                "Line {} is open but not switchable",
                network.line(line).name
            )));
        }
        Ok(NetworkConfiguration {
            topology: Topology::new(network, settings),
            state: CacheState::Dirty,
            stats: RebuildStats::default(),
        })
    }

    /// Configuration with every switch closed.
    pub fn all_closed(network: Arc<Network>) -> Self {
        let settings = SwitchSettings::all_closed(&network);
        NetworkConfiguration {
            topology: Topology::new(network, settings),
            state: CacheState::Dirty,
            stats: RebuildStats::default(),
        }
    }

    #[inline]
    pub fn network(&self) -> &Arc<Network> {
        self.topology.network()
    }

    #[inline]
    pub fn settings(&self) -> &SwitchSettings {
        self.topology.settings()
    }

    pub fn into_settings(self) -> SwitchSettings {
        self.topology.settings
    }

    #[inline]
    pub fn is_open(&self, line: LineIndex) -> bool {
        self.topology.settings.is_open(line)
    }

    /// Open or close a switchable line. Returns true if the setting changed.
    ///
    /// Only the changelog is updated; the topology is rebuilt by the next query.
    pub fn set_switch(&mut self, line: LineIndex, open: bool) -> DnrResult<bool> {
        let network = self.topology.network();
        if line >= network.line_count() {
            return Err(DnrError::InvalidOperation(format!(
                "Line index {line} is out of bounds"
            )));
        }
        if !network.line(line).switchable {
            return Err(DnrError::InvalidOperation(format!(
                "Line {} is not switchable",
                network.line(line).name
            )));
        }
        if !self.topology.settings.set_open(line, open) {
            return Ok(false);
        }
        self.state = match std::mem::replace(&mut self.state, CacheState::Dirty) {
            CacheState::Valid => {
                let mut log = ChangeLog::default();
                log.record(line, open);
                CacheState::Stale(log)
            }
            CacheState::Stale(mut log) => {
                log.record(line, open);
                if log.is_empty() {
                    CacheState::Valid
                } else if log.len() > CHANGELOG_LIMIT {
                    CacheState::Dirty
                } else {
                    CacheState::Stale(log)
                }
            }
            CacheState::Dirty => CacheState::Dirty,
        };
        Ok(true)
    }

    /// Open `line`, which is expected to break the cycle closed by `bridge`.
    ///
    /// Knowing the bridge lets the next rebuild only re-explore the subtree below `line`.
    pub fn open_switch_for_breaking_cycle_with_bridge(
        &mut self,
        line: LineIndex,
        bridge: LineIndex,
    ) -> DnrResult<bool> {
        let changed = self.set_switch(line, true)?;
        if let CacheState::Stale(log) = &mut self.state {
            if log.opened.last() == Some(&line) {
                log.bridge = Some((line, bridge));
            }
        }
        Ok(changed)
    }

    /// Make every switch match `target`. Returns the number of switching operations.
    pub fn apply_settings(&mut self, target: &SwitchSettings) -> DnrResult<usize> {
        if target.line_count() != self.settings().line_count() {
            return Err(DnrError::BadInput(format!(
                "Switch settings cover {} lines, network has {}",
                target.line_count(),
                self.settings().line_count()
            )));
        }
        let changes: Vec<LineIndex> = self.settings().differences(target).collect();
        for &line in &changes {
            self.set_switch(line, target.is_open(line))?;
        }
        Ok(changes.len())
    }

    /// True if the derived topology matches the current settings.
    pub fn is_valid(&self) -> bool {
        matches!(self.state, CacheState::Valid)
    }

    /// Rebuild the derived topology if any switch changed since the last rebuild.
    pub fn ensure_valid(&mut self) {
        // Dirty while rebuilding, so an interrupted rebuild is redone from scratch.
        let state = std::mem::replace(&mut self.state, CacheState::Dirty);
        match state {
            CacheState::Valid => {}
            CacheState::Dirty => self.full_rebuild(),
            CacheState::Stale(log) => {
                let applied = match (log.opened.as_slice(), log.closed.as_slice(), log.bridge) {
                    (&[opened], &[], Some((line, bridge))) if line == opened => {
                        self.topology.open_with_bridge(opened, bridge)
                    }
                    (&[opened], &[closed], _) => self.topology.swap(opened, closed),
                    _ => false,
                };
                if applied {
                    self.stats.incremental += 1;
                } else {
                    self.full_rebuild();
                }
            }
        }
        self.state = CacheState::Valid;
    }

    fn full_rebuild(&mut self) {
        self.topology.full_rebuild();
        self.stats.full += 1;
        log::trace!(
            "Full topology rebuild #{}: {} bridges, {} unreached buses",
            self.stats.full,
            self.topology.bridge_count(),
            self.topology.unreached
        );
    }

    /// The up-to-date topology, rebuilding it first if needed.
    pub fn topology(&mut self) -> &Topology {
        self.ensure_valid();
        &self.topology
    }

    /// The topology if it is already up to date.
    ///
    /// Use this to share a configuration between readers; call [`Self::ensure_valid`] first.
    pub fn valid_topology(&self) -> DnrResult<&Topology> {
        if self.is_valid() {
            Ok(&self.topology)
        } else {
            Err(DnrError::InvalidOperation(
                "Topology is stale, it must be rebuilt before reading".to_string(),
            ))
        }
    }

    pub fn rebuild_stats(&self) -> RebuildStats {
        self.stats
    }
}

#[cfg(test)]
mod tests;
