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

//! BGP process configuration

use crate::device::Interface;
use crate::types::{AsId, ConfigError, Ipv4Prefix};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::net::Ipv4Addr;

/// Hold time in seconds
pub const DEFAULT_HOLD_TIME: u64 = 180;
/// Keepalive interval in seconds
pub const DEFAULT_KEEPALIVE: u64 = 60;
/// Periodic best path recomputation in seconds
pub const DEFAULT_SCAN_INTERVAL: u64 = 300;
/// Local preference of routes learned over eBGP
pub const DEFAULT_LOCAL_PREFERENCE: u32 = 100;

/// A configured BGP neighbor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BgpNeighborConfig {
    /// Address of the neighbor
    pub address: Ipv4Addr,
    /// AS of the neighbor. If it is equal to the local AS, the session is iBGP.
    pub remote_as: AsId,
    /// Free text description
    #[serde(default)]
    pub description: String,
    /// Local preference assigned to all routes received from this neighbor
    #[serde(default)]
    pub local_preference: Option<u32>,
    /// MED attached to all routes advertised to this neighbor
    #[serde(default)]
    pub med: Option<u32>,
    /// Session is administratively shut down
    #[serde(default)]
    pub shutdown: bool,
}

impl BgpNeighborConfig {
    /// Create a new neighbor
    pub fn new(address: Ipv4Addr, remote_as: AsId) -> Self {
        Self {
            address,
            remote_as,
            description: String::new(),
            local_preference: None,
            med: None,
            shutdown: false,
        }
    }
}

/// BGP process configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BgpConfig {
    /// Process is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Local AS
    pub local_as: AsId,
    /// Router id. If unset, the highest interface address is used.
    #[serde(default)]
    pub router_id: Option<Ipv4Addr>,
    /// Neighbors
    #[serde(default)]
    pub neighbors: Vec<BgpNeighborConfig>,
    /// Locally originated networks. A network is only announced if the routing table has a route
    /// for exactly this prefix.
    #[serde(default)]
    pub networks: Vec<Ipv4Prefix>,
    /// Announce static routes (origin incomplete)
    #[serde(default)]
    pub redistribute_static: bool,
    /// Hold time in seconds
    #[serde(default = "default_hold_time")]
    pub hold_time: u64,
    /// Keepalive interval in seconds
    #[serde(default = "default_keepalive")]
    pub keepalive: u64,
    /// Periodic recomputation in seconds
    #[serde(default = "default_scan_interval")]
    pub scan_interval: u64,
    /// Local preference of routes learned over eBGP
    #[serde(default = "default_local_preference")]
    pub default_local_preference: u32,
}

fn default_true() -> bool {
    true
}

fn default_hold_time() -> u64 {
    DEFAULT_HOLD_TIME
}

fn default_keepalive() -> u64 {
    DEFAULT_KEEPALIVE
}

fn default_scan_interval() -> u64 {
    DEFAULT_SCAN_INTERVAL
}

fn default_local_preference() -> u32 {
    DEFAULT_LOCAL_PREFERENCE
}

impl BgpConfig {
    /// Create an enabled process without neighbors
    pub fn new(local_as: AsId) -> Self {
        Self {
            enabled: true,
            local_as,
            router_id: None,
            neighbors: Vec::new(),
            networks: Vec::new(),
            redistribute_static: false,
            hold_time: DEFAULT_HOLD_TIME,
            keepalive: DEFAULT_KEEPALIVE,
            scan_interval: DEFAULT_SCAN_INTERVAL,
            default_local_preference: DEFAULT_LOCAL_PREFERENCE,
        }
    }

    /// Add a neighbor (builder style)
    pub fn neighbor(mut self, neighbor: BgpNeighborConfig) -> Self {
        self.neighbors.push(neighbor);
        self
    }

    /// Add a network (builder style)
    pub fn network(mut self, prefix: Ipv4Prefix) -> Self {
        self.networks.push(prefix);
        self
    }

    /// Check the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.local_as.0 == 0 {
            return Err(ConfigError::InvalidAsNumber);
        }
        let mut seen = HashSet::new();
        for n in self.neighbors.iter() {
            if n.remote_as.0 == 0 {
                return Err(ConfigError::InvalidAsNumber);
            }
            if !seen.insert(n.address) {
                return Err(ConfigError::DuplicateBgpNeighbor(n.address));
            }
        }
        if self.hold_time != 0 && self.keepalive >= self.hold_time {
            return Err(ConfigError::InvalidTimers("keepalive must be shorter than the hold time"));
        }
        Ok(())
    }

    /// The configured router id, or the highest interface address.
    pub fn resolve_router_id(&self, interfaces: &BTreeMap<String, Interface>) -> Result<Ipv4Addr, ConfigError> {
        self.router_id
            .or_else(|| interfaces.values().filter_map(|i| i.ip_address).max())
            .ok_or(ConfigError::NoRouterId)
    }

    /// Get a neighbor by address
    pub fn get_neighbor(&self, address: Ipv4Addr) -> Option<&BgpNeighborConfig> {
        self.neighbors.iter().find(|n| n.address == address)
    }

    /// Returns true if the session to the neighbor is iBGP
    pub fn is_ibgp(&self, neighbor: &BgpNeighborConfig) -> bool {
        neighbor.remote_as == self.local_as
    }
}
