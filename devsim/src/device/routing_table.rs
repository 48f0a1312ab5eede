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

//! # Routing table
//!
//! The routing table of a device keeps all routes grouped by the protocol that owns them. A
//! protocol replaces its own group atomically, without touching routes of other protocols.
//! Forwarding decisions use [`RoutingTable::best_routes`], which picks the route with the lowest
//! administrative distance for every prefix.

use crate::types::{DeviceError, Ipv4Prefix};
use itertools::Itertools;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

/// Source of a route. The administrative distance is a pure function of this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RouteProtocol {
    /// Directly connected network
    Connected,
    /// Statically configured route
    Static,
    /// Route learned over an eBGP session
    Ebgp,
    /// Route computed by OSPF
    Ospf,
    /// Route learned by RIP
    Rip,
    /// Route learned over an iBGP session
    Ibgp,
}

impl RouteProtocol {
    /// Administrative distance of the protocol
    pub fn admin_distance(&self) -> u8 {
        match self {
            Self::Connected => 0,
            Self::Static => 1,
            Self::Ebgp => 20,
            Self::Ospf => 110,
            Self::Rip => 120,
            Self::Ibgp => 200,
        }
    }

    /// Owner group of this route. Both BGP variants are owned by the BGP process.
    pub fn owner(&self) -> RouteOwner {
        match self {
            Self::Connected => RouteOwner::Connected,
            Self::Static => RouteOwner::Static,
            Self::Ebgp | Self::Ibgp => RouteOwner::Bgp,
            Self::Ospf => RouteOwner::Ospf,
            Self::Rip => RouteOwner::Rip,
        }
    }

    /// Single letter code, as shown by `show ip route`
    pub fn code(&self) -> &'static str {
        match self {
            Self::Connected => "C",
            Self::Static => "S",
            Self::Ebgp | Self::Ibgp => "B",
            Self::Ospf => "O",
            Self::Rip => "R",
        }
    }
}

impl fmt::Display for RouteProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connected => "connected",
            Self::Static => "static",
            Self::Ebgp => "eBGP",
            Self::Ospf => "OSPF",
            Self::Rip => "RIP",
            Self::Ibgp => "iBGP",
        };
        f.write_str(s)
    }
}

/// Group of routes that is cleared and reinstalled together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RouteOwner {
    /// Connected routes, derived from the interfaces
    Connected,
    /// Static routes from the configuration
    Static,
    /// Routes of the OSPF process
    Ospf,
    /// Routes of the BGP process
    Bgp,
    /// Routes of the RIP process
    Rip,
}

/// A single route in the routing table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    prefix: Ipv4Prefix,
    next_hop: Option<Ipv4Addr>,
    interface: Option<String>,
    protocol: RouteProtocol,
    metric: u32,
    admin_distance: u8,
}

impl Route {
    /// Create a new route. The administrative distance is derived from `protocol`.
    pub fn new(
        prefix: Ipv4Prefix,
        next_hop: Option<Ipv4Addr>,
        interface: Option<String>,
        protocol: RouteProtocol,
        metric: u32,
    ) -> Self {
        Self { prefix, next_hop, interface, protocol, metric, admin_distance: protocol.admin_distance() }
    }

    /// Destination prefix
    pub fn prefix(&self) -> Ipv4Prefix {
        self.prefix
    }

    /// Destination network address
    pub fn network(&self) -> Ipv4Addr {
        self.prefix.network()
    }

    /// Destination mask
    pub fn mask(&self) -> Ipv4Addr {
        self.prefix.mask()
    }

    /// Next hop address, if any
    pub fn next_hop(&self) -> Option<Ipv4Addr> {
        self.next_hop
    }

    /// Outgoing interface, if known
    pub fn interface(&self) -> Option<&str> {
        self.interface.as_deref()
    }

    /// Protocol that installed the route
    pub fn protocol(&self) -> RouteProtocol {
        self.protocol
    }

    /// Metric of the route
    pub fn metric(&self) -> u32 {
        self.metric
    }

    /// Administrative distance
    pub fn admin_distance(&self) -> u8 {
        self.admin_distance
    }

    /// Compare two routes for the same prefix. Lower administrative distance wins, then lower
    /// metric.
    fn preference(&self) -> (u8, u32) {
        (self.admin_distance, self.metric)
    }
}

/// Routing table of a single device.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    groups: BTreeMap<RouteOwner, Vec<Route>>,
}

impl RoutingTable {
    /// Create an empty routing table
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a single route. Routes from protocols other than `Connected` are rejected if the
    /// same prefix is directly connected. An identical route in the same group is replaced.
    pub fn add_route(&mut self, route: Route) -> Result<(), DeviceError> {
        if route.next_hop.is_none() && route.interface.is_none() {
            return Err(DeviceError::InvalidRoute(route.prefix));
        }
        if route.protocol != RouteProtocol::Connected && self.is_connected(route.prefix) {
            return Err(DeviceError::RouteShadowedByConnected(route.prefix));
        }
        let group = self.groups.entry(route.protocol.owner()).or_default();
        group.retain(|r| !(r.prefix == route.prefix && r.next_hop == route.next_hop));
        group.push(route);
        Ok(())
    }

    /// Remove all routes of the given owner. Returns the number of removed routes.
    pub fn clear_routes_by_protocol(&mut self, owner: RouteOwner) -> usize {
        self.groups.remove(&owner).map(|g| g.len()).unwrap_or(0)
    }

    /// Clear all routes of `owner` and install `routes` instead. Installation errors are
    /// collected and returned, but they do not stop the remaining routes from being installed.
    pub fn replace_routes(&mut self, owner: RouteOwner, routes: Vec<Route>) -> Vec<DeviceError> {
        self.clear_routes_by_protocol(owner);
        let mut errors = Vec::new();
        for route in routes {
            debug_assert_eq!(route.protocol.owner(), owner);
            if let Err(e) = self.add_route(route) {
                errors.push(e);
            }
        }
        errors
    }

    /// Returns true if there exists a connected route for exactly this prefix.
    pub fn is_connected(&self, prefix: Ipv4Prefix) -> bool {
        self.groups
            .get(&RouteOwner::Connected)
            .map(|g| g.iter().any(|r| r.prefix == prefix))
            .unwrap_or(false)
    }

    /// Iterate over all routes, ordered by owner.
    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.groups.values().flatten()
    }

    /// All routes of one owner
    pub fn routes_by_protocol(&self, owner: RouteOwner) -> &[Route] {
        self.groups.get(&owner).map(|g| g.as_slice()).unwrap_or(&[])
    }

    /// Total number of routes
    pub fn len(&self) -> usize {
        self.groups.values().map(|g| g.len()).sum()
    }

    /// Returns true if the table is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The best route for each prefix (lowest administrative distance, then lowest metric),
    /// sorted by prefix.
    pub fn best_routes(&self) -> Vec<&Route> {
        let mut best: Vec<&Route> = self
            .routes()
            .sorted_by(|a, b| a.prefix.cmp(&b.prefix).then(a.preference().cmp(&b.preference())))
            .collect();
        best.dedup_by(|a, b| a.prefix == b.prefix);
        best
    }

    /// Longest prefix match over the best routes.
    pub fn lookup(&self, ip: Ipv4Addr) -> Option<&Route> {
        self.routes()
            .filter(|r| r.prefix.contains(ip))
            .min_by(|a, b| {
                b.prefix
                    .prefix_len()
                    .cmp(&a.prefix.prefix_len())
                    .then(a.preference().cmp(&b.preference()))
            })
    }
}
