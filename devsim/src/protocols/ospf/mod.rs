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

//! # OSPF
//!
//! Link-state routing. Every tick, the OSPF process
//!
//! 1. sends hellos over every operational, non-passive interface of an area, and advances the
//!    state machine of each neighbor by one step (`Down` → `Init` → `2-Way` → `ExStart` →
//!    `Exchange` → `Loading` → `Full`). Two routers only become adjacent if both interfaces are in
//!    the same area.
//! 2. originates its own router LSA, listing every `Full` adjacency with the cost of the local
//!    interface, and floods: LSAs stored by `Full` neighbors enter the local database if they are
//!    newer. Any change of the database sets the topology-changed flag.
//! 3. if a change flag is set (or the SPF interval elapsed), runs Dijkstra over the database and
//!    installs a host route to the router id of every reachable router, with the path cost as
//!    metric.
//!
//! All areas share a single database. Area types are validated, but they do not change the
//! computation.

mod config;
mod lsdb;
mod neighbor;
mod spf;

pub use config::{
    AreaType, OspfArea, OspfConfig, DEFAULT_COST, DEFAULT_DEAD_INTERVAL, DEFAULT_HELLO_INTERVAL, DEFAULT_SPF_INTERVAL,
};
pub use lsdb::{LinkStateDatabase, Lsa, OspfLink};
pub use neighbor::{OspfNeighbor, OspfNeighborKey, OspfNeighborState};
pub use spf::{shortest_paths, FirstHop, SpfEntry};

use super::{Protocol, ProtocolKind, ProtocolState, TickContext};
use crate::config::DeviceConfig;
use crate::device::{DeviceLog, Interface, Route, RouteOwner, RouteProtocol};
use crate::snapshot::DeviceSnapshot;
use crate::types::{ConfigError, Ipv4Prefix, ProtocolError};

use log::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::Ipv4Addr;
use std::time::Duration;

/// State of an OSPF process, as seen by the neighbors (hello packets and flooded LSAs).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OspfExport {
    /// Router id
    pub router_id: Ipv4Addr,
    /// Area of every OSPF interface
    pub interface_areas: BTreeMap<String, u32>,
    /// Passive interfaces
    pub passive_interfaces: BTreeSet<String>,
    /// Router ids of all neighbors heard from (the neighbor list of the hello packet)
    pub seen_neighbors: BTreeSet<Ipv4Addr>,
    /// The link-state database
    pub lsdb: LinkStateDatabase,
}

impl OspfExport {
    /// Area of the interface, if it sends hellos
    fn hello_area(&self, iface: &str) -> Option<u32> {
        if self.passive_interfaces.contains(iface) {
            None
        } else {
            self.interface_areas.get(iface).copied()
        }
    }
}

/// # OSPF process
#[derive(Debug, Default)]
pub struct OspfProtocol {
    config: Option<OspfConfig>,
    state: ProtocolState<OspfNeighborKey, OspfNeighbor>,
    router_id: Option<Ipv4Addr>,
    lsdb: LinkStateDatabase,
    sequence_number: u32,
    spf: BTreeMap<Ipv4Addr, SpfEntry>,
}

impl OspfProtocol {
    /// Router id, if the process is configured
    pub fn router_id(&self) -> Option<Ipv4Addr> {
        self.router_id
    }

    /// The neighbor table
    pub fn neighbors(&self) -> &BTreeMap<OspfNeighborKey, OspfNeighbor> {
        self.state.neighbors()
    }

    /// All neighbors in state `Full`
    pub fn full_neighbors(&self) -> impl Iterator<Item = &OspfNeighbor> {
        self.state.neighbors().values().filter(|n| n.is_full())
    }

    /// The link-state database
    pub fn lsdb(&self) -> &LinkStateDatabase {
        &self.lsdb
    }

    /// Result of the last SPF computation
    pub fn spf_results(&self) -> &BTreeMap<Ipv4Addr, SpfEntry> {
        &self.spf
    }

    /// Send hellos and advance the neighbor state machines.
    fn exchange_hellos(&mut self, config: &OspfConfig, router_id: Ipv4Addr, ctx: &TickContext<'_>, log: &mut DeviceLog) {
        let mut heard: BTreeSet<OspfNeighborKey> = BTreeSet::new();

        for area in config.areas.iter() {
            for iface in area.interfaces.iter().filter(|i| !config.is_passive(i)) {
                let local = match ctx.operational_interface(iface) {
                    Some(i) if i.ip_address.is_some() => i,
                    _ => continue,
                };
                let (remote_id, remote, remote_iface) = match ctx.remote_end(&local.name) {
                    Some(x) => x,
                    None => continue,
                };
                let (export, address) = match (&remote.ospf, remote_iface.ip_address) {
                    (Some(export), Some(address)) if remote_iface.is_operational() => (export, address),
                    _ => continue,
                };
                if export.hello_area(&remote_iface.name) != Some(area.area_id) {
                    trace!("{}: area mismatch on {}", ctx.device_name, iface);
                    continue;
                }

                let key = OspfNeighborKey { interface: iface.clone(), router_id: export.router_id };
                heard.insert(key.clone());
                let sees_us = export.seen_neighbors.contains(&router_id);

                match self.state.neighbors_mut().get_mut(&key) {
                    None => {
                        log.info(format!("OSPF: new neighbor {} on {}", export.router_id, iface));
                        self.state.neighbors_mut().insert(
                            key,
                            OspfNeighbor {
                                router_id: export.router_id,
                                address,
                                interface: iface.clone(),
                                area_id: area.area_id,
                                state: OspfNeighborState::Down,
                                device: remote_id,
                                last_activity: ctx.now,
                            },
                        );
                    }
                    Some(n) => {
                        n.last_activity = ctx.now;
                        n.address = address;
                        // 2-Way requires our router id in the hello of the neighbor
                        let blocked = n.state == OspfNeighborState::Init && !sees_us;
                        if n.state != OspfNeighborState::Full && !blocked {
                            n.state = n.state.next();
                            debug!("{}: OSPF neighbor {} -> {}", ctx.device_name, n.router_id, n.state);
                            if n.is_full() {
                                log.info(format!("OSPF: adjacency with {} on {} is FULL", n.router_id, iface));
                                self.state.mark_topology_changed();
                            }
                        }
                    }
                }
            }
        }

        // adjacencies over interfaces that went down are dropped immediately
        let lost: Vec<OspfNeighborKey> = self
            .state
            .neighbors()
            .keys()
            .filter(|k| !heard.contains(k))
            .filter(|k| ctx.operational_interface(&k.interface).is_none() || config.area_of(&k.interface).is_none())
            .cloned()
            .collect();
        for key in lost {
            if let Some(n) = self.state.neighbors_mut().remove(&key) {
                log.warn(format!("OSPF: neighbor {} down, interface {} not operational", n.router_id, key.interface));
                if n.is_full() {
                    self.state.mark_topology_changed();
                }
            }
        }
    }

    /// Originate the own router LSA. Returns true if it changed.
    fn originate(&mut self, config: &OspfConfig, router_id: Ipv4Addr, ctx: &TickContext<'_>) -> bool {
        let links: Vec<OspfLink> = self
            .full_neighbors()
            .filter_map(|n| {
                let local = ctx.interfaces.get(&n.interface)?.ip_address?;
                Some(OspfLink { link_id: n.router_id, link_data: local, metric: config.cost_of(&n.interface) })
            })
            .collect();
        let unchanged = self.lsdb.get(router_id).map(|l| l.links == links).unwrap_or(false);
        if unchanged {
            return false;
        }
        self.sequence_number += 1;
        self.lsdb.install(Lsa {
            ls_id: router_id,
            advertising_router: router_id,
            links,
            sequence_number: self.sequence_number,
            timestamp: ctx.now,
        })
    }

    /// Take over newer LSAs from the databases of all `Full` neighbors. Returns true if the
    /// database changed.
    fn flood(&mut self, router_id: Ipv4Addr, ctx: &TickContext<'_>) -> bool {
        let mut changed = false;
        let sources: Vec<_> = self.full_neighbors().map(|n| n.device).collect();
        for device in sources {
            let export = match ctx.snapshot.device(device).and_then(|d| d.ospf.as_ref()) {
                Some(e) => e,
                None => continue,
            };
            for lsa in export.lsdb.iter() {
                if lsa.advertising_router == router_id {
                    // an old instance of our own LSA survived a restart, jump past it
                    if lsa.sequence_number > self.sequence_number {
                        self.sequence_number = lsa.sequence_number;
                        if let Some(own) = self.lsdb.get(router_id).cloned() {
                            self.sequence_number += 1;
                            self.lsdb.install(Lsa { sequence_number: self.sequence_number, timestamp: ctx.now, ..own });
                            changed = true;
                        }
                    }
                    continue;
                }
                changed |= self.lsdb.install(lsa.clone());
            }
        }
        changed
    }

    fn first_hops(&self, ctx: &TickContext<'_>) -> HashMap<Ipv4Addr, FirstHop> {
        self.full_neighbors()
            .filter_map(|n| {
                let local = ctx.interfaces.get(&n.interface)?.ip_address?;
                Some((local, FirstHop { interface: n.interface.clone(), next_hop: n.address }))
            })
            .collect()
    }
}

impl Protocol for OspfProtocol {
    type Config = OspfConfig;
    type Key = OspfNeighborKey;
    type Neighbor = OspfNeighbor;

    const KIND: ProtocolKind = ProtocolKind::Ospf;
    const ROUTE_OWNER: Option<RouteOwner> = Some(RouteOwner::Ospf);

    fn new() -> Self {
        Self::default()
    }

    fn select_config(config: &DeviceConfig) -> Option<&OspfConfig> {
        config.ospf.as_ref()
    }

    fn is_enabled(config: &OspfConfig) -> bool {
        config.enabled
    }

    fn config(&self) -> Option<&OspfConfig> {
        self.config.as_ref()
    }

    fn state(&self) -> &ProtocolState<OspfNeighborKey, OspfNeighbor> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ProtocolState<OspfNeighborKey, OspfNeighbor> {
        &mut self.state
    }

    fn configure(
        &mut self,
        config: Option<&OspfConfig>,
        interfaces: &BTreeMap<String, Interface>,
    ) -> Result<(), ConfigError> {
        self.config = config.cloned();
        let old_router_id = self.router_id.take();
        let config = match config {
            Some(c) => c,
            None => return Ok(()),
        };
        config.validate(interfaces)?;
        let router_id = config.resolve_router_id(interfaces)?;
        if old_router_id.is_some() && old_router_id != Some(router_id) {
            self.reset();
        }
        self.router_id = Some(router_id);
        Ok(())
    }

    fn update_neighbors(&mut self, ctx: &TickContext<'_>, log: &mut DeviceLog) {
        let (config, router_id) = match (self.config.clone(), self.router_id) {
            (Some(c), Some(r)) => (c, r),
            _ => return,
        };
        self.exchange_hellos(&config, router_id, ctx, log);
        let originated = self.originate(&config, router_id, ctx);
        let flooded = self.flood(router_id, ctx);
        if originated || flooded {
            trace!("{}: OSPF LSDB changed", ctx.device_name);
            self.state.mark_topology_changed();
        }
    }

    fn neighbor_timeout(&self) -> Duration {
        Duration::from_secs(self.config.as_ref().map(|c| c.dead_interval).unwrap_or(DEFAULT_DEAD_INTERVAL))
    }

    fn calculation_interval(&self) -> Duration {
        Duration::from_secs(self.config.as_ref().map(|c| c.spf_interval).unwrap_or(DEFAULT_SPF_INTERVAL))
    }

    fn run_calculation(&mut self, ctx: &TickContext<'_>, log: &mut DeviceLog) -> Result<Vec<Route>, ProtocolError> {
        let router_id = self.router_id.ok_or(ProtocolError::NotInitialized(ProtocolKind::Ospf))?;
        let spf = shortest_paths(&self.lsdb, router_id, &self.first_hops(ctx))?;

        // LSAs of unreachable routers are useless
        let mut reachable: BTreeSet<Ipv4Addr> = spf.keys().copied().collect();
        reachable.insert(router_id);
        let pruned = self.lsdb.retain_routers(&reachable);
        if pruned > 0 {
            debug!("{}: OSPF pruned {} LSAs", ctx.device_name, pruned);
        }

        let routes = spf
            .iter()
            .map(|(rid, e)| {
                Route::new(Ipv4Prefix::host(*rid), Some(e.next_hop), Some(e.interface.clone()), RouteProtocol::Ospf, e.cost)
            })
            .collect();
        log.debug(format!("OSPF: SPF computed {} reachable routers", spf.len()));
        self.spf = spf;
        Ok(routes)
    }

    fn publish(&self, out: &mut DeviceSnapshot) {
        let (config, router_id) = match (&self.config, self.router_id) {
            (Some(c), Some(r)) => (c, r),
            _ => return,
        };
        out.ospf = Some(OspfExport {
            router_id,
            interface_areas: config
                .areas
                .iter()
                .flat_map(|a| a.interfaces.iter().map(move |i| (i.clone(), a.area_id)))
                .collect(),
            passive_interfaces: config.passive_interfaces.clone(),
            seen_neighbors: self.state.neighbors().keys().map(|k| k.router_id).collect(),
            lsdb: self.lsdb.clone(),
        });
    }

    fn neighbor_expired(&mut self, key: &OspfNeighborKey, neighbor: &OspfNeighbor, log: &mut DeviceLog) {
        if !neighbor.is_full() {
            return;
        }
        log.warn(format!("OSPF: adjacency with {} lost (dead interval expired)", key));
        // withdraw the link right away, SPF of this tick must not use it
        let router_id = match self.router_id {
            Some(r) => r,
            None => return,
        };
        if let Some(own) = self.lsdb.get(router_id).filter(|l| l.links_to(neighbor.router_id)).cloned() {
            self.sequence_number += 1;
            let links = own.links.into_iter().filter(|l| l.link_id != neighbor.router_id).collect();
            self.lsdb.install(Lsa { links, sequence_number: self.sequence_number, ..own });
        }
    }

    fn reset(&mut self) {
        self.lsdb.clear();
        self.spf.clear();
        self.sequence_number = 0;
    }
}
