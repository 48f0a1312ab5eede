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

//! VRRP configuration

use crate::device::Interface;
use crate::types::ConfigError;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::net::Ipv4Addr;
use std::time::Duration;

/// Priority of a group, if not configured otherwise
pub const DEFAULT_PRIORITY: u8 = 100;
/// Priority of the owner of the virtual address
pub const OWNER_PRIORITY: u8 = 255;
/// Advertisement interval in milliseconds
pub const DEFAULT_ADVERTISEMENT_INTERVAL: u64 = 1000;
/// Largest advertisement interval in milliseconds (4095 centiseconds)
pub const MAX_ADVERTISEMENT_INTERVAL: u64 = 40_950;
/// Largest preempt delay in seconds
pub const MAX_PREEMPT_DELAY: u64 = 3600;

/// Configuration of a single VRRP group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VrrpGroupConfig {
    /// Virtual router id
    pub group_id: u8,
    /// Virtual address
    pub virtual_ip: Ipv4Addr,
    /// Interface the group runs on
    pub interface: String,
    /// Priority (1..=254, 255 is reserved for the address owner)
    #[serde(default = "default_priority")]
    pub priority: u8,
    /// Take over from a master with lower priority
    #[serde(default = "default_true")]
    pub preempt: bool,
    /// Delay before taking over, in seconds
    #[serde(default)]
    pub preempt_delay: u64,
    /// Advertisement interval in milliseconds
    #[serde(default = "default_interval")]
    pub advertisement_interval: u64,
    /// Free text description
    #[serde(default)]
    pub description: String,
}

fn default_priority() -> u8 {
    DEFAULT_PRIORITY
}

fn default_true() -> bool {
    true
}

fn default_interval() -> u64 {
    DEFAULT_ADVERTISEMENT_INTERVAL
}

impl VrrpGroupConfig {
    /// Create a group with default priority and timers
    pub fn new(group_id: u8, virtual_ip: Ipv4Addr, interface: impl Into<String>) -> Self {
        Self {
            group_id,
            virtual_ip,
            interface: interface.into(),
            priority: DEFAULT_PRIORITY,
            preempt: true,
            preempt_delay: 0,
            advertisement_interval: DEFAULT_ADVERTISEMENT_INTERVAL,
            description: String::new(),
        }
    }

    /// Set the priority (builder style)
    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Advertisement interval
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.advertisement_interval)
    }

    /// Preempt delay
    pub fn preempt_delay(&self) -> Duration {
        Duration::from_secs(self.preempt_delay)
    }
}

/// VRRP configuration of a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VrrpConfig {
    /// VRRP is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Groups
    #[serde(default)]
    pub groups: Vec<VrrpGroupConfig>,
}

impl Default for VrrpConfig {
    fn default() -> Self {
        Self { enabled: true, groups: Vec::new() }
    }
}

impl VrrpConfig {
    /// Create an enabled configuration with the given groups
    pub fn new(groups: Vec<VrrpGroupConfig>) -> Self {
        Self { enabled: true, groups }
    }

    /// Check the configuration against the interfaces of the device.
    pub fn validate(&self, interfaces: &BTreeMap<String, Interface>) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for g in self.groups.iter() {
            if !seen.insert(g.group_id) {
                return Err(ConfigError::DuplicateVrrpGroup(g.group_id));
            }
            if g.priority == 0 {
                return Err(ConfigError::InvalidVrrpPriority(g.group_id));
            }
            if !interfaces.contains_key(&g.interface) {
                return Err(ConfigError::UnknownInterface(g.interface.clone()));
            }
            if g.advertisement_interval == 0 {
                return Err(ConfigError::InvalidTimers("advertisement interval must be positive"));
            }
            if g.advertisement_interval > MAX_ADVERTISEMENT_INTERVAL {
                return Err(ConfigError::InvalidTimers("advertisement interval exceeds 40950 ms"));
            }
            if g.preempt_delay > MAX_PREEMPT_DELAY {
                return Err(ConfigError::InvalidTimers("preempt delay exceeds 3600 s"));
            }
        }
        Ok(())
    }
}
