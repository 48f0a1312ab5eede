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

//! # BGP
//!
//! Path-vector routing between configured peers. Every tick, the BGP process
//!
//! 1. resolves every configured peer: the peer address must be reachable through the routing
//!    table, the device owning it must run BGP with the expected AS, and it must have a neighbor
//!    statement pointing back to one of our addresses. Reachable peers advance by one FSM state
//!    per tick (`Idle` → `Connect` → `Active` → `OpenSent` → `OpenConfirm` → `Established`).
//!    Unreachable peers fall back to `Idle` immediately.
//! 2. rebuilds the Adj-RIB-In from the advertisements of all established peers. On eBGP sessions,
//!    the AS of the peer is prepended and the next hop is set to the peer. Routes containing the
//!    local AS are dropped, and iBGP-learned routes are never accepted from iBGP peers. Any change
//!    sets the policy-changed flag.
//! 3. if a change flag is set (or the scan interval elapsed), runs the decision process (see
//!    [`compare`]) for every prefix and installs the best routes with administrative distance 20
//!    (eBGP) or 200 (iBGP).
//!
//! Only the best route of each prefix is kept. Alternative paths are not retained beyond the
//! current Adj-RIB-In.

mod config;
mod decision;
mod peer;

pub use config::{BgpConfig, BgpNeighborConfig, DEFAULT_HOLD_TIME, DEFAULT_KEEPALIVE, DEFAULT_LOCAL_PREFERENCE};
pub use decision::{compare, select_best, BgpRouteEntry, Origin};
pub use peer::{BgpPeer, BgpPeerState};

use super::{Protocol, ProtocolKind, ProtocolState, TickContext};
use crate::config::DeviceConfig;
use crate::device::{DeviceLog, Interface, Route, RouteOwner, RouteProtocol};
use crate::snapshot::DeviceSnapshot;
use crate::types::{AsId, ConfigError, DeviceId, Ipv4Prefix, ProtocolError};

use itertools::Itertools;
use log::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::time::Duration;

/// Neighbor statement, as visible to the peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BgpNeighborExport {
    /// Address of the neighbor
    pub address: Ipv4Addr,
    /// AS the neighbor is expected to be in
    pub remote_as: AsId,
    /// MED attached to advertisements towards this neighbor
    pub med: Option<u32>,
}

/// State of a BGP process, as seen by its peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BgpExport {
    /// Local AS
    pub local_as: AsId,
    /// Router id
    pub router_id: Ipv4Addr,
    /// Configured (not shut down) neighbors
    pub neighbors: Vec<BgpNeighborExport>,
    /// Advertised routes: originated routes and the best routes
    pub routes: Vec<BgpRouteEntry>,
}

/// Outcome of resolving a configured peer
enum Session<'a> {
    /// No route to the peer, or the peer is down
    Unreachable,
    /// The peer is reachable, but it does not accept the session
    Refused(&'static str),
    /// The session can be established
    Open { device: DeviceId, local_address: Ipv4Addr, export: &'a BgpExport },
}

/// # BGP process
#[derive(Debug, Default)]
pub struct BgpProtocol {
    config: Option<BgpConfig>,
    state: ProtocolState<Ipv4Addr, BgpPeer>,
    router_id: Option<Ipv4Addr>,
    rib_in: BTreeMap<(Ipv4Prefix, Ipv4Addr), BgpRouteEntry>,
    local: BTreeMap<Ipv4Prefix, BgpRouteEntry>,
    best: BTreeMap<Ipv4Prefix, BgpRouteEntry>,
}

impl BgpProtocol {
    /// Local AS, if the process is configured
    pub fn local_as(&self) -> Option<AsId> {
        self.config.as_ref().map(|c| c.local_as)
    }

    /// Router id, if the process is configured
    pub fn router_id(&self) -> Option<Ipv4Addr> {
        self.router_id
    }

    /// All peers, keyed by address
    pub fn peers(&self) -> &BTreeMap<Ipv4Addr, BgpPeer> {
        self.state.neighbors()
    }

    /// Get a single peer
    pub fn peer(&self, address: Ipv4Addr) -> Option<&BgpPeer> {
        self.state.neighbor(&address)
    }

    /// The best route of every prefix learned from a peer
    pub fn best_routes(&self) -> &BTreeMap<Ipv4Prefix, BgpRouteEntry> {
        &self.best
    }

    /// All routes received from established peers, keyed by prefix and peer
    pub fn rib_in(&self) -> &BTreeMap<(Ipv4Prefix, Ipv4Addr), BgpRouteEntry> {
        &self.rib_in
    }

    /// Locally originated routes
    pub fn local_routes(&self) -> &BTreeMap<Ipv4Prefix, BgpRouteEntry> {
        &self.local
    }

    /// Routes originated by this router: configured networks present in the routing table (not
    /// counting BGP routes), and static routes if redistribution is enabled.
    fn originate(config: &BgpConfig, ctx: &TickContext<'_>) -> BTreeMap<Ipv4Prefix, BgpRouteEntry> {
        let lp = config.default_local_preference;
        let mut local: BTreeMap<Ipv4Prefix, BgpRouteEntry> = config
            .networks
            .iter()
            .filter(|p| ctx.routing_table.routes().any(|r| r.prefix() == **p && r.protocol().owner() != RouteOwner::Bgp))
            .map(|p| (*p, BgpRouteEntry::local(*p, Origin::Igp, lp)))
            .collect();
        if config.redistribute_static {
            for r in ctx.routing_table.routes_by_protocol(RouteOwner::Static) {
                local.entry(r.prefix()).or_insert_with(|| BgpRouteEntry::local(r.prefix(), Origin::Incomplete, lp));
            }
        }
        local
    }

    /// Update the session of every configured peer, and rebuild the Adj-RIB-In.
    fn update_sessions(&mut self, config: &BgpConfig, ctx: &TickContext<'_>, log: &mut DeviceLog) {
        let now = ctx.now;
        let keepalive = Duration::from_secs(config.keepalive);
        let mut topology_changed = false;
        let mut policy_changed = false;

        let configured: BTreeSet<Ipv4Addr> =
            config.neighbors.iter().filter(|n| !n.shutdown).map(|n| n.address).collect();
        let removed: Vec<Ipv4Addr> =
            self.state.neighbors().keys().filter(|a| !configured.contains(a)).copied().collect();
        for address in removed {
            if let Some(peer) = self.state.neighbors_mut().remove(&address) {
                log.info(format!("BGP: peer {} removed in state {}", address, peer.state));
                topology_changed |= peer.is_established();
            }
        }

        let mut rib_in: BTreeMap<(Ipv4Prefix, Ipv4Addr), BgpRouteEntry> = BTreeMap::new();

        for nb in config.neighbors.iter().filter(|n| !n.shutdown) {
            let session = resolve_peer(config, nb, ctx);
            if !self.state.neighbors().contains_key(&nb.address) {
                log.info(format!("BGP: new peer {} (AS {})", nb.address, nb.remote_as));
            }
            let peer = self
                .state
                .neighbors_mut()
                .entry(nb.address)
                .or_insert_with(|| BgpPeer::new(nb.address, nb.remote_as, config.is_ibgp(nb), now));

            match session {
                Session::Unreachable => {
                    peer.last_activity = now;
                    peer.device = None;
                    if peer.state != BgpPeerState::Idle {
                        log.warn(format!("BGP: peer {} unreachable, {} -> Idle", nb.address, peer.state));
                        topology_changed |= peer.reset();
                    }
                }
                Session::Refused(reason) => {
                    if peer.state > BgpPeerState::Active {
                        log.warn(format!("BGP: peer {} closed the session: {}", nb.address, reason));
                        topology_changed |= peer.reset();
                    } else if peer.state < BgpPeerState::Active {
                        peer.advance(now);
                    } else {
                        trace!("{}: BGP peer {} refused: {}", ctx.device_name, nb.address, reason);
                    }
                }
                Session::Open { device, local_address, export } => {
                    peer.last_activity = now;
                    peer.device = Some(device);
                    peer.local_address = Some(local_address);
                    if peer.advance(now) {
                        log.info(format!("BGP: session with {} (AS {}) established", nb.address, nb.remote_as));
                        policy_changed = true;
                    } else {
                        debug!("{}: BGP peer {} -> {}", ctx.device_name, nb.address, peer.state);
                    }
                    peer.keepalive(now, keepalive);
                    if peer.is_established() {
                        let received = receive_routes(config, nb, local_address, export);
                        peer.prefixes_received = received.len();
                        for r in received {
                            rib_in.insert((r.prefix, nb.address), r);
                        }
                    }
                }
            }
        }

        if topology_changed {
            self.state.mark_topology_changed();
        }
        if policy_changed {
            self.state.mark_policy_changed();
        }
        if rib_in != self.rib_in {
            // every changed peer sent an update
            for (_, peer) in self.state.neighbors_mut().iter_mut().filter(|(_, p)| p.is_established()) {
                let before = self.rib_in.keys().filter(|(_, a)| *a == peer.address);
                let after = rib_in.keys().filter(|(_, a)| *a == peer.address);
                if !before.eq(after) {
                    peer.msgs_received += 1;
                }
            }
            debug!("{}: BGP Adj-RIB-In changed ({} routes)", ctx.device_name, rib_in.len());
            self.rib_in = rib_in;
            self.state.mark_policy_changed();
        }
    }
}

/// Resolve a configured peer in the snapshot.
fn resolve_peer<'a>(config: &BgpConfig, nb: &BgpNeighborConfig, ctx: &TickContext<'a>) -> Session<'a> {
    let route = match ctx.routing_table.lookup(nb.address) {
        Some(r) => r,
        None => return Session::Unreachable,
    };
    let local_address = match route.interface() {
        Some(iface) => ctx.operational_interface(iface).and_then(|i| i.ip_address),
        None => route.next_hop().and_then(|nh| {
            ctx.interfaces
                .values()
                .filter(|i| i.is_operational())
                .find(|i| i.subnet().map(|s| s.contains(nh)).unwrap_or(false))
                .and_then(|i| i.ip_address)
        }),
    };
    let local_address = match local_address {
        Some(a) => a,
        None => return Session::Unreachable,
    };
    let (device, remote, _) = match ctx.snapshot.find_address_owner(nb.address) {
        Some(x) => x,
        None => return Session::Unreachable,
    };
    if device == ctx.device_id {
        return Session::Refused("address is local");
    }
    let export = match &remote.bgp {
        Some(e) => e,
        None => return Session::Refused("BGP is not running"),
    };
    if export.local_as != nb.remote_as {
        return Session::Refused("bad peer AS");
    }
    let accepted =
        export.neighbors.iter().any(|n| ctx.owns_address(n.address) && n.remote_as == config.local_as);
    if !accepted {
        return Session::Refused("no matching neighbor statement");
    }
    Session::Open { device, local_address, export }
}

/// Apply the receive policy to all routes advertised by an established peer.
fn receive_routes(
    config: &BgpConfig,
    nb: &BgpNeighborConfig,
    local_address: Ipv4Addr,
    export: &BgpExport,
) -> Vec<BgpRouteEntry> {
    let is_ibgp = config.is_ibgp(nb);
    let med = export.neighbors.iter().find(|n| n.address == local_address).and_then(|n| n.med);
    export
        .routes
        .iter()
        .filter(|r| !(is_ibgp && r.ibgp))
        .map(|r| {
            let mut as_path = r.as_path.clone();
            if !is_ibgp {
                as_path.insert(0, nb.remote_as);
            }
            let (next_hop, lp, default_med) = if is_ibgp {
                (r.next_hop.unwrap_or(nb.address), r.local_preference, r.med)
            } else {
                (nb.address, config.default_local_preference, 0)
            };
            BgpRouteEntry {
                prefix: r.prefix,
                next_hop: Some(next_hop),
                as_path,
                local_preference: nb.local_preference.unwrap_or(lp),
                med: med.unwrap_or(default_med),
                origin: r.origin,
                peer: Some(nb.address),
                ibgp: is_ibgp,
            }
        })
        .filter(|r| !r.has_loop(config.local_as))
        .collect()
}

/// Resolve the outgoing interface of the next hop of a route. Routes for the same prefix cannot
/// be used to resolve the next hop.
fn resolve_next_hop(ctx: &TickContext<'_>, r: &BgpRouteEntry) -> Result<Option<String>, ProtocolError> {
    let next_hop = match r.next_hop {
        Some(nh) => nh,
        None => return Ok(None),
    };
    match ctx.routing_table.lookup(next_hop) {
        Some(route) if route.prefix() != r.prefix => Ok(route.interface().map(String::from)),
        _ => Err(ProtocolError::UnreachableNextHop(next_hop, r.prefix)),
    }
}

impl Protocol for BgpProtocol {
    type Config = BgpConfig;
    type Key = Ipv4Addr;
    type Neighbor = BgpPeer;

    const KIND: ProtocolKind = ProtocolKind::Bgp;
    const ROUTE_OWNER: Option<RouteOwner> = Some(RouteOwner::Bgp);

    fn new() -> Self {
        Self::default()
    }

    fn select_config(config: &DeviceConfig) -> Option<&BgpConfig> {
        config.bgp.as_ref()
    }

    fn is_enabled(config: &BgpConfig) -> bool {
        config.enabled
    }

    fn config(&self) -> Option<&BgpConfig> {
        self.config.as_ref()
    }

    fn state(&self) -> &ProtocolState<Ipv4Addr, BgpPeer> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ProtocolState<Ipv4Addr, BgpPeer> {
        &mut self.state
    }

    fn configure(
        &mut self,
        config: Option<&BgpConfig>,
        interfaces: &BTreeMap<String, Interface>,
    ) -> Result<(), ConfigError> {
        self.config = config.cloned();
        self.router_id = None;
        let config = match config {
            Some(c) => c,
            None => return Ok(()),
        };
        config.validate()?;
        self.router_id = Some(config.resolve_router_id(interfaces)?);
        Ok(())
    }

    fn update_neighbors(&mut self, ctx: &TickContext<'_>, log: &mut DeviceLog) {
        let config = match self.config.clone() {
            Some(c) => c,
            None => return,
        };
        let local = Self::originate(&config, ctx);
        if local != self.local {
            log.debug(format!("BGP: {} locally originated routes", local.len()));
            self.local = local;
            self.state.mark_policy_changed();
        }
        self.update_sessions(&config, ctx, log);
    }

    fn neighbor_timeout(&self) -> Duration {
        match self.config.as_ref().map(|c| c.hold_time).unwrap_or(DEFAULT_HOLD_TIME) {
            0 => Duration::from_secs(u64::MAX),
            secs => Duration::from_secs(secs),
        }
    }

    fn calculation_interval(&self) -> Duration {
        Duration::from_secs(self.config.as_ref().map(|c| c.scan_interval).unwrap_or(config::DEFAULT_SCAN_INTERVAL))
    }

    fn run_calculation(&mut self, ctx: &TickContext<'_>, log: &mut DeviceLog) -> Result<Vec<Route>, ProtocolError> {
        if self.config.is_none() {
            return Err(ProtocolError::NotInitialized(ProtocolKind::Bgp));
        }

        let mut best: BTreeMap<Ipv4Prefix, BgpRouteEntry> = BTreeMap::new();
        let mut routes: Vec<Route> = Vec::new();
        let grouped = self.rib_in.values().group_by(|r| r.prefix);
        for (prefix, candidates) in &grouped {
            if self.local.contains_key(&prefix) {
                continue;
            }
            let mut usable: Vec<(&BgpRouteEntry, Option<String>)> = Vec::new();
            for r in candidates {
                match resolve_next_hop(ctx, r) {
                    Ok(iface) => usable.push((r, iface)),
                    Err(e) => debug!("{}: {}", ctx.device_name, e),
                }
            }
            let winner = match select_best(usable.iter().map(|(r, _)| *r)) {
                Some(w) => w,
                None => continue,
            };
            let iface = usable.iter().find(|(r, _)| *r == winner).and_then(|(_, i)| i.clone());
            best.insert(prefix, winner.clone());
            if ctx.routing_table.is_connected(prefix) {
                continue;
            }
            let protocol = if winner.ibgp { RouteProtocol::Ibgp } else { RouteProtocol::Ebgp };
            routes.push(Route::new(prefix, winner.next_hop, iface, protocol, winner.med));
        }

        log.debug(format!("BGP: best path selection done, {} prefixes", best.len()));
        self.best = best;
        Ok(routes)
    }

    fn publish(&self, out: &mut DeviceSnapshot) {
        let (config, router_id) = match (&self.config, self.router_id) {
            (Some(c), Some(r)) => (c, r),
            _ => return,
        };
        out.bgp = Some(BgpExport {
            local_as: config.local_as,
            router_id,
            neighbors: config
                .neighbors
                .iter()
                .filter(|n| !n.shutdown)
                .map(|n| BgpNeighborExport { address: n.address, remote_as: n.remote_as, med: n.med })
                .collect(),
            routes: self.local.values().chain(self.best.values()).cloned().collect(),
        });
    }

    fn neighbor_expired(&mut self, key: &Ipv4Addr, _neighbor: &BgpPeer, log: &mut DeviceLog) {
        log.warn(format!("BGP: hold timer of peer {} expired", key));
    }

    fn reset(&mut self) {
        self.rib_in.clear();
        self.local.clear();
        self.best.clear();
    }
}
