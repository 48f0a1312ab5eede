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

//! # Network Configuration
//!
//! This module contains the configuration model. There are several structs in this module:
//!
//! - [`DeviceConfig`]: protocol configuration of a single device (OSPF, BGP, VRRP and static
//!   routes). The device stores it, and the protocols read it during initialization.
//! - [`DeviceDefinition`]: a device with its vendor, interfaces and [`DeviceConfig`].
//! - [`LinkDefinition`]: a point-to-point link between two interfaces.
//! - [`TopologyConfig`]: the entire network, as it is stored in a JSON file.
//!
//! # Example Usage
//!
//! ```rust
//! use devsim::config::TopologyConfig;
//! use devsim::NetworkTopology;
//!
//! fn main() -> Result<(), devsim::Error> {
//!     let config = TopologyConfig::from_json_str(r#"{
//!         "devices": [
//!             { "name": "R1", "vendor": "cisco",
//!               "interfaces": [ { "name": "eth0", "ip_address": "10.0.0.1", "prefix_len": 30 } ],
//!               "ospf": { "areas": [ { "area_id": 0, "interfaces": ["eth0"] } ] } },
//!             { "name": "R2", "vendor": "juniper",
//!               "interfaces": [ { "name": "eth0", "ip_address": "10.0.0.2", "prefix_len": 30 } ],
//!               "ospf": { "areas": [ { "area_id": 0, "interfaces": ["eth0"] } ] } }
//!         ],
//!         "links": [ { "from": "R1", "from_interface": "eth0", "to": "R2", "to_interface": "eth0" } ]
//!     }"#)?;
//!     let net = NetworkTopology::from_config(&config)?;
//!     assert_eq!(net.num_devices(), 2);
//!     Ok(())
//! }
//! ```

use crate::device::Interface;
use crate::protocols::bgp::BgpConfig;
use crate::protocols::ospf::OspfConfig;
use crate::protocols::vrrp::VrrpConfig;
use crate::types::{ConfigError, Ipv4Prefix, Vendor};
use crate::Error;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::Path;

/// Static route configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticRouteConfig {
    /// Destination prefix
    pub prefix: Ipv4Prefix,
    /// Next hop address
    #[serde(default)]
    pub next_hop: Option<Ipv4Addr>,
    /// Outgoing interface
    #[serde(default)]
    pub interface: Option<String>,
}

/// Protocol configuration of a device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// OSPF process
    #[serde(default)]
    pub ospf: Option<OspfConfig>,
    /// BGP process
    #[serde(default)]
    pub bgp: Option<BgpConfig>,
    /// VRRP groups
    #[serde(default)]
    pub vrrp: Option<VrrpConfig>,
    /// Static routes
    #[serde(default)]
    pub static_routes: Vec<StaticRouteConfig>,
}

impl DeviceConfig {
    /// Check every configured protocol against the interfaces of the device.
    pub fn validate(&self, interfaces: &BTreeMap<String, Interface>) -> Result<(), ConfigError> {
        if let Some(ospf) = &self.ospf {
            ospf.validate(interfaces)?;
        }
        if let Some(bgp) = &self.bgp {
            bgp.validate()?;
        }
        if let Some(vrrp) = &self.vrrp {
            vrrp.validate(interfaces)?;
        }
        for route in self.static_routes.iter() {
            if let Some(iface) = &route.interface {
                if !interfaces.contains_key(iface) {
                    return Err(ConfigError::UnknownInterface(iface.clone()));
                }
            }
        }
        Ok(())
    }
}

/// A device of the topology file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDefinition {
    /// Unique name
    pub name: String,
    /// Vendor, deciding which protocols are available
    #[serde(default)]
    pub vendor: Vendor,
    /// Interfaces
    #[serde(default)]
    pub interfaces: Vec<Interface>,
    /// Protocol configuration
    #[serde(flatten)]
    pub config: DeviceConfig,
}

/// A link of the topology file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkDefinition {
    /// Name of the first device
    pub from: String,
    /// Interface of the first device
    pub from_interface: String,
    /// Name of the second device
    pub to: String,
    /// Interface of the second device
    pub to_interface: String,
}

/// Description of an entire network
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologyConfig {
    /// All devices
    #[serde(default)]
    pub devices: Vec<DeviceDefinition>,
    /// All links
    #[serde(default)]
    pub links: Vec<LinkDefinition>,
}

impl TopologyConfig {
    /// Parse the topology from a JSON string
    pub fn from_json_str(s: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(s)?)
    }

    /// Read the topology from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Serialize the topology as pretty printed JSON
    pub fn to_json_string(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
