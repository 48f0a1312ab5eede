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

//! Module containing all type definitions

use crate::protocols::ProtocolKind;
use petgraph::prelude::*;
use petgraph::stable_graph::StableGraph;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

type IndexType = u32;
/// Device Identification (and index into the topology graph)
pub type DeviceId = NodeIndex<IndexType>;
/// Topology graph. Nodes carry the device name, edges carry the link.
pub(crate) type TopologyGraph = StableGraph<String, Link, Undirected, IndexType>;

/// AS Number
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AsId(pub u32);

impl From<u32> for AsId {
    fn from(x: u32) -> Self {
        Self(x)
    }
}

impl fmt::Display for AsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Vendor of a simulated device. The vendor decides which protocols are available on the device,
/// see [`ProtocolRegistry`](crate::protocols::ProtocolRegistry).
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    /// Cisco IOS / IOS-XE
    Cisco,
    /// Juniper JunOS
    Juniper,
    /// Huawei VRP
    Huawei,
    /// Alcatel-Lucent / Nokia SR OS
    Alcatel,
    /// Aruba AOS-CX
    Aruba,
    /// Arista EOS
    Arista,
    /// Plain linux host
    Linux,
}

impl Vendor {
    /// All known vendors
    pub const ALL: &'static [Vendor] = &[
        Vendor::Cisco,
        Vendor::Juniper,
        Vendor::Huawei,
        Vendor::Alcatel,
        Vendor::Aruba,
        Vendor::Arista,
        Vendor::Linux,
    ];
}

impl Default for Vendor {
    fn default() -> Self {
        Vendor::Cisco
    }
}

/// IPv4 prefix (network address and prefix length). The host bits of the address are always
/// cleared.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv4Prefix {
    addr: Ipv4Addr,
    len: u8,
}

impl Ipv4Prefix {
    /// Create a new prefix. Host bits of `addr` are masked away. Lengths above 32 are clamped.
    pub fn new(addr: Ipv4Addr, len: u8) -> Self {
        let len = len.min(32);
        Self { addr: Ipv4Addr::from(u32::from(addr) & Self::mask_bits(len)), len }
    }

    /// Create a host route prefix (`/32`)
    pub fn host(addr: Ipv4Addr) -> Self {
        Self { addr, len: 32 }
    }

    /// Network address
    pub fn network(&self) -> Ipv4Addr {
        self.addr
    }

    /// Prefix length
    pub fn prefix_len(&self) -> u8 {
        self.len
    }

    /// Subnet mask in dotted notation
    pub fn mask(&self) -> Ipv4Addr {
        Ipv4Addr::from(Self::mask_bits(self.len))
    }

    /// Returns true if `ip` lies inside this prefix
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        u32::from(ip) & Self::mask_bits(self.len) == u32::from(self.addr)
    }

    fn mask_bits(len: u8) -> u32 {
        if len == 0 {
            0
        } else {
            u32::MAX << (32 - len as u32)
        }
    }
}

impl fmt::Display for Ipv4Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.len)
    }
}

impl FromStr for Ipv4Prefix {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, len) = match s.split_once('/') {
            Some((addr, len)) => (addr, len),
            None => (s, "32"),
        };
        let addr: Ipv4Addr =
            addr.trim().parse().map_err(|_| ConfigError::InvalidPrefix(s.to_string()))?;
        let len: u8 = len.trim().parse().map_err(|_| ConfigError::InvalidPrefix(s.to_string()))?;
        if len > 32 {
            return Err(ConfigError::InvalidPrefix(s.to_string()));
        }
        Ok(Self::new(addr, len))
    }
}

impl TryFrom<String> for Ipv4Prefix {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Ipv4Prefix> for String {
    fn from(p: Ipv4Prefix) -> String {
        p.to_string()
    }
}

/// Point-to-point link between two device interfaces. Both endpoints are stored in the edge, such
/// that the remote side can be resolved without depending on the edge direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub(crate) endpoints: [(DeviceId, String); 2],
}

impl Link {
    /// Create a new link
    pub fn new(a: DeviceId, a_iface: impl Into<String>, b: DeviceId, b_iface: impl Into<String>) -> Self {
        Self { endpoints: [(a, a_iface.into()), (b, b_iface.into())] }
    }

    /// Both endpoints of the link
    pub fn endpoints(&self) -> &[(DeviceId, String); 2] {
        &self.endpoints
    }

    /// Given one endpoint, return the other one.
    pub fn other_end(&self, device: DeviceId, iface: &str) -> Option<(DeviceId, &str)> {
        let [a, b] = &self.endpoints;
        if a.0 == device && a.1 == iface {
            Some((b.0, b.1.as_str()))
        } else if b.0 == device && b.1 == iface {
            Some((a.0, a.1.as_str()))
        } else {
            None
        }
    }
}

/// Configuration Error
#[derive(Error, Debug, PartialEq, Clone)]
pub enum ConfigError {
    /// The backbone area must always be a normal area
    #[error("Area 0 (backbone) cannot be configured as {0}")]
    BackboneAreaType(String),
    /// Interface was assigned to multiple areas
    #[error("Interface {0} is assigned to more than one OSPF area")]
    InterfaceInMultipleAreas(String),
    /// The referenced interface does not exist on the device
    #[error("Interface {0} does not exist on the device")]
    UnknownInterface(String),
    /// No router id could be derived
    #[error("No router id configured and no interface carries an address")]
    NoRouterId,
    /// Timer configuration is not valid
    #[error("Invalid timer configuration: {0}")]
    InvalidTimers(&'static str),
    /// AS number 0 is reserved
    #[error("Local AS number must not be 0")]
    InvalidAsNumber,
    /// Same BGP neighbor configured twice
    #[error("BGP neighbor {0} is configured twice")]
    DuplicateBgpNeighbor(Ipv4Addr),
    /// Same VRRP group configured twice on the device
    #[error("VRRP group {0} is configured twice")]
    DuplicateVrrpGroup(u8),
    /// VRRP priority out of range
    #[error("VRRP group {0}: priority must be in the range 1..=255")]
    InvalidVrrpPriority(u8),
    /// Prefix cannot be parsed
    #[error("Invalid prefix: {0}")]
    InvalidPrefix(String),
    /// Protocol is not available on this device
    #[error("Protocol {0} is not supported by vendor {1:?}")]
    UnsupportedProtocol(ProtocolKind, Vendor),
}

/// Device Errors
#[derive(Error, Debug, PartialEq, Clone)]
pub enum DeviceError {
    /// Interface does not exist
    #[error("Interface {0} not found")]
    InterfaceNotFound(String),
    /// Interface already exists
    #[error("Interface {0} already exists")]
    InterfaceAlreadyExists(String),
    /// A protocol route would shadow a connected route
    #[error("Route for {0} rejected: prefix is directly connected")]
    RouteShadowedByConnected(Ipv4Prefix),
    /// The route neither has a next hop nor an outgoing interface
    #[error("Route for {0} rejected: neither next hop nor interface set")]
    InvalidRoute(Ipv4Prefix),
    /// Static route already exists
    #[error("Static route for {0} does already exist")]
    StaticRouteAlreadyExists(Ipv4Prefix),
    /// Static route does not exist
    #[error("Static route for {0} does not yet exist")]
    NoStaticRoute(Ipv4Prefix),
    /// Configuration is invalid
    #[error("Configuration Error: {0}")]
    ConfigError(#[from] ConfigError),
}

/// Errors raised inside a protocol computation. They are caught at the tick boundary, and the
/// routing table is left untouched.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum ProtocolError {
    /// The link-state database does not contain the router LSA of the local router
    #[error("Router LSA of {0} is missing in the LSDB")]
    MissingRouterLsa(Ipv4Addr),
    /// The first hop towards a neighbor cannot be resolved
    #[error("Cannot resolve first hop for link to {0}")]
    UnresolvedFirstHop(Ipv4Addr),
    /// Next hop of a BGP route is not reachable
    #[error("BGP next hop {0} for {1} is not reachable")]
    UnreachableNextHop(Ipv4Addr, Ipv4Prefix),
    /// The protocol was asked to compute without being initialized
    #[error("Protocol {0} is not initialized")]
    NotInitialized(ProtocolKind),
}

/// Network Errors
#[derive(Error, Debug, PartialEq, Clone)]
pub enum NetworkError {
    /// Device Error which cannot be handled
    #[error("Device Error: {0}")]
    DeviceError(#[from] DeviceError),
    /// Configuration error
    #[error("Configuration Error: {0}")]
    ConfigError(#[from] ConfigError),
    /// Device is not present in the topology
    #[error("Network device was not found in topology: {0:?}")]
    DeviceNotFound(DeviceId),
    /// Device name is not present in the topology
    #[error("Network device name was not found in topology: {0}")]
    DeviceNameNotFound(String),
    /// Device name is already in use
    #[error("Network device name is already used: {0}")]
    DuplicateDeviceName(String),
    /// The interface is already connected to another link
    #[error("Interface {1} of device {0:?} is already linked")]
    InterfaceAlreadyLinked(DeviceId, String),
    /// Two interfaces are not connected
    #[error("Network link does not exist: {0:?}:{1}")]
    LinkNotFound(DeviceId, String),
}
