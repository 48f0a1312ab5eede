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

//! OSPF process configuration

use crate::device::Interface;
use crate::types::ConfigError;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::Ipv4Addr;

/// Interface cost, if not configured otherwise
pub const DEFAULT_COST: u32 = 10;
/// Hello interval in seconds
pub const DEFAULT_HELLO_INTERVAL: u64 = 10;
/// Dead interval in seconds
pub const DEFAULT_DEAD_INTERVAL: u64 = 40;
/// Periodic SPF ceiling in seconds
pub const DEFAULT_SPF_INTERVAL: u64 = 600;

/// Type of an OSPF area
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AreaType {
    /// Normal area
    Normal,
    /// Stub area
    Stub,
    /// Not-so-stubby area
    Nssa,
}

impl Default for AreaType {
    fn default() -> Self {
        AreaType::Normal
    }
}

impl fmt::Display for AreaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Normal => "normal",
            Self::Stub => "stub",
            Self::Nssa => "nssa",
        })
    }
}

/// OSPF area and its interfaces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OspfArea {
    /// Area id, where 0 is the backbone
    pub area_id: u32,
    /// Type of the area
    #[serde(default)]
    pub area_type: AreaType,
    /// Interfaces in this area
    #[serde(default)]
    pub interfaces: Vec<String>,
}

impl OspfArea {
    /// Create a normal area
    pub fn new(area_id: u32, interfaces: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { area_id, area_type: AreaType::Normal, interfaces: interfaces.into_iter().map(Into::into).collect() }
    }

    /// Returns true if this is the backbone area
    pub fn is_backbone(&self) -> bool {
        self.area_id == 0
    }
}

/// OSPF process configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OspfConfig {
    /// Process is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Process id (local significance only)
    #[serde(default = "default_process_id")]
    pub process_id: u32,
    /// Router id. If unset, the highest interface address is used.
    #[serde(default)]
    pub router_id: Option<Ipv4Addr>,
    /// Areas
    #[serde(default)]
    pub areas: Vec<OspfArea>,
    /// Interface costs. Interfaces that are not listed use [`DEFAULT_COST`].
    #[serde(default)]
    pub interface_costs: BTreeMap<String, u32>,
    /// Passive interfaces: advertised, but never form adjacencies
    #[serde(default)]
    pub passive_interfaces: BTreeSet<String>,
    /// Hello interval in seconds
    #[serde(default = "default_hello")]
    pub hello_interval: u64,
    /// Dead interval in seconds
    #[serde(default = "default_dead")]
    pub dead_interval: u64,
    /// Periodic SPF recomputation in seconds
    #[serde(default = "default_spf")]
    pub spf_interval: u64,
}

fn default_true() -> bool {
    true
}

fn default_process_id() -> u32 {
    1
}

fn default_hello() -> u64 {
    DEFAULT_HELLO_INTERVAL
}

fn default_dead() -> u64 {
    DEFAULT_DEAD_INTERVAL
}

fn default_spf() -> u64 {
    DEFAULT_SPF_INTERVAL
}

impl Default for OspfConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            process_id: default_process_id(),
            router_id: None,
            areas: Vec::new(),
            interface_costs: BTreeMap::new(),
            passive_interfaces: BTreeSet::new(),
            hello_interval: DEFAULT_HELLO_INTERVAL,
            dead_interval: DEFAULT_DEAD_INTERVAL,
            spf_interval: DEFAULT_SPF_INTERVAL,
        }
    }
}

impl OspfConfig {
    /// Create a process with a single area
    pub fn with_area(area: OspfArea) -> Self {
        Self { areas: vec![area], ..Default::default() }
    }

    /// Check the configuration against the interfaces of the device.
    pub fn validate(&self, interfaces: &BTreeMap<String, Interface>) -> Result<(), ConfigError> {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for area in self.areas.iter() {
            if area.is_backbone() && area.area_type != AreaType::Normal {
                return Err(ConfigError::BackboneAreaType(area.area_type.to_string()));
            }
            for iface in area.interfaces.iter() {
                if !interfaces.contains_key(iface) {
                    return Err(ConfigError::UnknownInterface(iface.clone()));
                }
                if !seen.insert(iface.as_str()) {
                    return Err(ConfigError::InterfaceInMultipleAreas(iface.clone()));
                }
            }
        }
        if self.hello_interval == 0 {
            return Err(ConfigError::InvalidTimers("hello interval must be positive"));
        }
        if self.dead_interval <= self.hello_interval {
            return Err(ConfigError::InvalidTimers("dead interval must exceed the hello interval"));
        }
        self.resolve_router_id(interfaces).map(|_| ())
    }

    /// The configured router id, or the highest interface address.
    pub fn resolve_router_id(&self, interfaces: &BTreeMap<String, Interface>) -> Result<Ipv4Addr, ConfigError> {
        self.router_id
            .or_else(|| interfaces.values().filter_map(|i| i.ip_address).max())
            .ok_or(ConfigError::NoRouterId)
    }

    /// Area of an interface, if the interface runs OSPF
    pub fn area_of(&self, iface: &str) -> Option<u32> {
        self.areas.iter().find(|a| a.interfaces.iter().any(|i| i == iface)).map(|a| a.area_id)
    }

    /// Cost of an interface
    pub fn cost_of(&self, iface: &str) -> u32 {
        self.interface_costs.get(iface).copied().unwrap_or(DEFAULT_COST)
    }

    /// Returns true if the interface is passive
    pub fn is_passive(&self, iface: &str) -> bool {
        self.passive_interfaces.contains(iface)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn interfaces() -> BTreeMap<String, Interface> {
        let mut m = BTreeMap::new();
        m.insert("eth0".to_string(), Interface::new("eth0", Ipv4Addr::new(10, 0, 0, 1), 30));
        m.insert("eth1".to_string(), Interface::new("eth1", Ipv4Addr::new(10, 0, 1, 1), 30));
        m
    }

    #[test]
    fn backbone_cannot_be_stub() {
        let mut area = OspfArea::new(0, vec!["eth0"]);
        area.area_type = AreaType::Stub;
        let config = OspfConfig::with_area(area);
        assert_eq!(config.validate(&interfaces()), Err(ConfigError::BackboneAreaType("stub".to_string())));
    }

    #[test]
    fn interface_in_two_areas() {
        let mut config = OspfConfig::with_area(OspfArea::new(0, vec!["eth0"]));
        config.areas.push(OspfArea::new(1, vec!["eth0", "eth1"]));
        assert_eq!(
            config.validate(&interfaces()),
            Err(ConfigError::InterfaceInMultipleAreas("eth0".to_string()))
        );
    }

    #[test]
    fn router_id_defaults_to_highest_address() {
        let config = OspfConfig::with_area(OspfArea::new(0, vec!["eth0"]));
        assert_eq!(config.resolve_router_id(&interfaces()), Ok(Ipv4Addr::new(10, 0, 1, 1)));
        assert_eq!(config.resolve_router_id(&BTreeMap::new()), Err(ConfigError::NoRouterId));
    }

    #[test]
    fn defaults() {
        let config: OspfConfig = serde_json::from_str(r#"{"areas": [{"area_id": 0}]}"#).unwrap();
        assert!(config.enabled);
        assert_eq!(config.cost_of("eth0"), DEFAULT_COST);
        assert_eq!(config.dead_interval, 40);
        assert_eq!(config.areas[0].area_type, AreaType::Normal);
    }
}
