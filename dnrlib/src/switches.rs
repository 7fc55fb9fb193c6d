//! Switch settings, decoupled from the network they apply to.
use bitvec::prelude::*;
use serde::{Deserialize, Serialize};

use crate::graph::Network;
use crate::types::*;

/// One open flag per line index.
///
/// Settings are compared and hashed structurally, so two tables with the same open switches are
/// the same settings regardless of where they came from. Non-switchable lines are always closed.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SwitchSettings {
    open: BitVec,
}

impl SwitchSettings {
    /// All switches closed.
    pub fn all_closed(network: &Network) -> Self {
        Self::with_line_count(network.line_count())
    }

    /// All switches closed for a network with `line_count` lines.
    pub fn with_line_count(line_count: usize) -> Self {
        SwitchSettings {
            open: bitvec![0; line_count],
        }
    }

    /// Settings with exactly the given lines open.
    pub fn with_open(network: &Network, open: impl IntoIterator<Item = LineIndex>) -> Self {
        let mut settings = Self::all_closed(network);
        for line in open {
            settings.open.set(line, true);
        }
        settings
    }

    #[inline]
    pub fn line_count(&self) -> usize {
        self.open.len()
    }

    #[inline]
    pub fn is_open(&self, line: LineIndex) -> bool {
        self.open[line]
    }

    #[inline]
    pub fn is_closed(&self, line: LineIndex) -> bool {
        !self.open[line]
    }

    /// Set the open flag of a line. Returns true if the value changed.
    ///
    /// This does not check switchability, see
    /// [`crate::topology::NetworkConfiguration::set_switch`] for the checked version.
    #[inline]
    pub fn set_open(&mut self, line: LineIndex, open: bool) -> bool {
        let changed = self.open[line] != open;
        self.open.set(line, open);
        changed
    }

    /// Indices of open lines in ascending order.
    pub fn open_lines(&self) -> impl Iterator<Item = LineIndex> + '_ {
        self.open.iter_ones()
    }

    pub fn open_count(&self) -> usize {
        self.open.count_ones()
    }

    /// Number of switching operations needed to go from `other` to `self`.
    pub fn switching_distance(&self, other: &SwitchSettings) -> usize {
        debug_assert_eq!(self.open.len(), other.open.len());
        self.differences(other).count()
    }

    /// Lines whose state differs between `self` and `other`.
    pub fn differences<'a>(
        &'a self,
        other: &'a SwitchSettings,
    ) -> impl Iterator<Item = LineIndex> + 'a {
        self.open
            .iter()
            .by_vals()
            .zip(other.open.iter().by_vals())
            .enumerate()
            .filter(|(_, (a, b))| a != b)
            .map(|(i, _)| i)
    }
}
