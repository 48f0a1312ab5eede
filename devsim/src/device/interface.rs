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

//! Module defining the interface of a device

use crate::types::Ipv4Prefix;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Interface of a simulated device. An interface is usable for protocol exchange only if it is
/// up and not administratively shut down (see [`Interface::is_operational`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    /// Interface name, like `GigabitEthernet0/0` or `ge-0/0/0`
    pub name: String,
    /// Primary address
    #[serde(default)]
    pub ip_address: Option<Ipv4Addr>,
    /// Prefix length of the primary address
    #[serde(default = "default_prefix_len")]
    pub prefix_len: u8,
    /// Line protocol state
    #[serde(default = "default_true")]
    pub is_up: bool,
    /// Administrative state (`shutdown`)
    #[serde(default)]
    pub is_shutdown: bool,
    /// Free text description
    #[serde(default)]
    pub description: String,
}

fn default_prefix_len() -> u8 {
    24
}

fn default_true() -> bool {
    true
}

impl Interface {
    /// Create a new interface, which is up and not shut down.
    pub fn new(name: impl Into<String>, ip_address: Ipv4Addr, prefix_len: u8) -> Self {
        Self {
            name: name.into(),
            ip_address: Some(ip_address),
            prefix_len: prefix_len.min(32),
            is_up: true,
            is_shutdown: false,
            description: String::new(),
        }
    }

    /// Create a new interface without any address.
    pub fn unnumbered(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ip_address: None,
            prefix_len: default_prefix_len(),
            is_up: true,
            is_shutdown: false,
            description: String::new(),
        }
    }

    /// Returns true if the interface is up and not administratively shut down.
    pub fn is_operational(&self) -> bool {
        self.is_up && !self.is_shutdown
    }

    /// Subnet mask in dotted notation
    pub fn subnet_mask(&self) -> Ipv4Addr {
        Ipv4Prefix::new(Ipv4Addr::UNSPECIFIED, self.prefix_len).mask()
    }

    /// Network attached to this interface
    pub fn subnet(&self) -> Option<Ipv4Prefix> {
        self.ip_address.map(|ip| Ipv4Prefix::new(ip, self.prefix_len))
    }
}
