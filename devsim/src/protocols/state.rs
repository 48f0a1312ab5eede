// DevSim: Multi-Vendor Device and Protocol Simulator
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Shared state tracking of every protocol instance

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Neighbor entry of any protocol. The framework uses it to age out stale neighbors and to render
/// neighbor tables.
pub trait NeighborRecord {
    /// Last time the neighbor was seen
    fn last_activity(&self) -> Instant;
    /// Name of the FSM state, like `FULL` or `ESTABLISHED`
    fn state_name(&self) -> String;
    /// Additional one-line information about the neighbor
    fn detail(&self) -> String {
        String::new()
    }
}

/// # Protocol State
///
/// State kept by every protocol instance of a device. It tracks if the protocol is active, the
/// neighbor table, and the change flags that gate the (expensive) recomputation.
///
/// A neighbor absent from the table was never seen. A neighbor that is present but stale must be
/// removed with [`ProtocolState::expire_neighbors`]; removal sets the topology-changed flag.
#[derive(Debug, Clone)]
pub struct ProtocolState<K: Ord, N> {
    is_active: bool,
    last_update: Option<Instant>,
    last_calculation: Option<Instant>,
    neighbors: BTreeMap<K, N>,
    topology_changed: bool,
    policy_changed: bool,
    recomputations: u64,
}

impl<K: Ord, N> Default for ProtocolState<K, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord, N> ProtocolState<K, N> {
    /// Create an inactive state without neighbors
    pub fn new() -> Self {
        Self {
            is_active: false,
            last_update: None,
            last_calculation: None,
            neighbors: BTreeMap::new(),
            topology_changed: false,
            policy_changed: false,
            recomputations: 0,
        }
    }

    /// Returns true if the protocol is active
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Activate or deactivate. Deactivation clears the neighbor table.
    pub(crate) fn set_active(&mut self, active: bool) {
        if !active {
            self.neighbors.clear();
        }
        if active && !self.is_active {
            // force a calculation right after activation
            self.last_calculation = None;
        }
        self.is_active = active;
    }

    /// Time of the last tick
    pub fn last_update(&self) -> Option<Instant> {
        self.last_update
    }

    /// Time of the last successful calculation
    pub fn last_calculation(&self) -> Option<Instant> {
        self.last_calculation
    }

    pub(crate) fn touch(&mut self, now: Instant) {
        self.last_update = Some(now);
    }

    /// Number of successful calculations
    pub fn recomputations(&self) -> u64 {
        self.recomputations
    }

    /// The neighbor table
    pub fn neighbors(&self) -> &BTreeMap<K, N> {
        &self.neighbors
    }

    /// Mutable access to the neighbor table
    pub(crate) fn neighbors_mut(&mut self) -> &mut BTreeMap<K, N> {
        &mut self.neighbors
    }

    /// Get a single neighbor
    pub fn neighbor(&self, key: &K) -> Option<&N> {
        self.neighbors.get(key)
    }

    /// Set the topology-changed flag
    pub(crate) fn mark_topology_changed(&mut self) {
        self.topology_changed = true;
    }

    /// Set the policy-changed flag
    pub(crate) fn mark_policy_changed(&mut self) {
        self.policy_changed = true;
    }

    /// Returns true if the topology-changed flag is set
    pub fn is_topology_changed(&self) -> bool {
        self.topology_changed
    }

    /// Returns true if the policy-changed flag is set
    pub fn is_policy_changed(&self) -> bool {
        self.policy_changed
    }

    /// Returns true if the calculation must run at `now`: either a change flag is set, or the
    /// periodic ceiling has elapsed since the last calculation.
    pub fn should_run_calculation(&self, now: Instant, ceiling: Duration) -> bool {
        self.topology_changed
            || self.policy_changed
            || self
                .last_calculation
                .map(|t| now.saturating_duration_since(t) >= ceiling)
                .unwrap_or(true)
    }

    /// Record a successful calculation, clearing all change flags.
    pub(crate) fn finish_calculation(&mut self, now: Instant) {
        self.topology_changed = false;
        self.policy_changed = false;
        self.last_calculation = Some(now);
        self.recomputations += 1;
    }
}

impl<K: Ord + Clone, N: NeighborRecord> ProtocolState<K, N> {
    /// Remove every neighbor that was not active within `timeout`. Returns the removed
    /// neighbors. Removing any neighbor sets the topology-changed flag.
    pub(crate) fn expire_neighbors(&mut self, now: Instant, timeout: Duration) -> Vec<(K, N)> {
        let stale: Vec<K> = self
            .neighbors
            .iter()
            .filter(|(_, n)| now.saturating_duration_since(n.last_activity()) > timeout)
            .map(|(k, _)| k.clone())
            .collect();
        let removed: Vec<(K, N)> =
            stale.into_iter().filter_map(|k| self.neighbors.remove_entry(&k)).collect();
        if !removed.is_empty() {
            self.topology_changed = true;
        }
        removed
    }
}
