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

//! # VRRP
//!
//! Gateway redundancy. Each group runs its own state machine (`Initialize`, `Backup`, `Master`).
//! Masters advertise once per advertisement interval on the interface of the group. The
//! advertisements of a tick are published in the snapshot, and received in the next tick by the
//! device on the other end of the link.
//!
//! Elections compare (priority, primary address): the higher priority wins, and equal priorities
//! are resolved towards the higher address. A backup with preemption enabled takes over from a
//! master it beats (immediately, or after the preempt delay). A backup that does not hear from a
//! master within the master-down interval (three advertisement intervals plus the skew time)
//! becomes master. A master whose interface goes down resigns with a priority zero
//! advertisement, after which the backup takes over within the skew time.
//!
//! VRRP does not install any routes.

mod config;
mod group;

pub use config::{VrrpConfig, VrrpGroupConfig, DEFAULT_ADVERTISEMENT_INTERVAL, DEFAULT_PRIORITY, OWNER_PRIORITY};
pub use group::{VrrpAdvertisement, VrrpGroup, VrrpState, VrrpStats};

use super::{NeighborRecord, Protocol, ProtocolKind, ProtocolState, TickContext};
use crate::config::DeviceConfig;
use crate::device::{DeviceLog, Interface, Route, RouteOwner};
use crate::snapshot::DeviceSnapshot;
use crate::types::{ConfigError, ProtocolError};

use log::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

/// Periodic recomputation of the group summary, in seconds
const SUMMARY_INTERVAL: u64 = 60;

/// Key of the VRRP neighbor table
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct VrrpNeighborKey {
    /// Virtual router id
    pub group_id: u8,
    /// Primary address of the advertising router
    pub source: Ipv4Addr,
}

impl fmt::Display for VrrpNeighborKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group {} from {}", self.group_id, self.source)
    }
}

/// A router heard advertising for a group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VrrpNeighbor {
    /// Virtual router id
    pub group_id: u8,
    /// Primary address of the router
    pub source: Ipv4Addr,
    /// Advertised priority
    pub priority: u8,
    /// State, as implied by the last advertisement
    pub state: VrrpState,
    /// Local interface the advertisement was received on
    pub interface: String,
    /// Advertisement interval of the neighbor in milliseconds
    pub interval: u64,
    /// Time the last advertisement was received
    #[serde(skip)]
    pub last_activity: Instant,
}

impl NeighborRecord for VrrpNeighbor {
    fn last_activity(&self) -> Instant {
        self.last_activity
    }

    fn state_name(&self) -> String {
        self.state.to_string()
    }

    fn detail(&self) -> String {
        format!("priority {} on {}", self.priority, self.interface)
    }
}

/// # VRRP process
#[derive(Debug, Default)]
pub struct VrrpProtocol {
    config: Option<VrrpConfig>,
    state: ProtocolState<VrrpNeighborKey, VrrpNeighbor>,
    groups: BTreeMap<u8, VrrpGroup>,
    outbox: Vec<VrrpAdvertisement>,
    active_virtual_ips: BTreeSet<Ipv4Addr>,
}

impl VrrpProtocol {
    /// All groups, keyed by group id
    pub fn groups(&self) -> &BTreeMap<u8, VrrpGroup> {
        &self.groups
    }

    /// Get a single group
    pub fn group(&self, group_id: u8) -> Option<&VrrpGroup> {
        self.groups.get(&group_id)
    }

    /// Virtual addresses this device is master for, as of the last calculation
    pub fn active_virtual_ips(&self) -> &BTreeSet<Ipv4Addr> {
        &self.active_virtual_ips
    }

    /// Advertisements sent in the last tick
    pub fn sent_advertisements(&self) -> &[VrrpAdvertisement] {
        &self.outbox
    }

    /// Follow the interface state: groups on down interfaces go to `Initialize`, groups on
    /// interfaces that came back leave it. Returns true if any group changed its state.
    fn track_interfaces(&mut self, ctx: &TickContext<'_>, log: &mut DeviceLog) -> bool {
        let mut changed = false;
        for group in self.groups.values_mut() {
            let iface = ctx.operational_interface(&group.config.interface);
            group.primary_address = ctx.interfaces.get(&group.config.interface).and_then(|i| i.ip_address);
            match (iface, group.state) {
                (None, VrrpState::Initialize) => {}
                (None, old) => {
                    if let Some(resign) = group.interface_down(ctx.now) {
                        self.outbox.push(resign);
                    }
                    log.warn(format!("VRRP: group {} {} -> Init, interface {} down", group.group_id(), old, group.config.interface));
                    changed = true;
                }
                (Some(_), VrrpState::Initialize) if group.primary_address.is_some() => {
                    group.start(ctx.now);
                    log.info(format!("VRRP: group {} Init -> {}", group.group_id(), group.state));
                    changed = true;
                }
                _ => {}
            }
        }
        changed
    }

    /// Receive the advertisements sent by the devices on the other end of the group interfaces.
    fn receive(&mut self, ctx: &TickContext<'_>, log: &mut DeviceLog) -> bool {
        let mut changed = false;
        for group in self.groups.values_mut().filter(|g| g.state != VrrpState::Initialize) {
            let (remote, remote_iface) = match ctx.remote_end(&group.config.interface) {
                Some((_, remote, remote_iface)) => (remote, remote_iface),
                None => continue,
            };
            let group_id = group.group_id();
            for adv in remote.vrrp.iter().filter(|a| a.group_id == group_id && a.interface == remote_iface.name) {
                let key = VrrpNeighborKey { group_id: adv.group_id, source: adv.source };
                let state = if adv.priority == 0 { VrrpState::Initialize } else { VrrpState::Master };
                self.state.neighbors_mut().insert(
                    key,
                    VrrpNeighbor {
                        group_id: adv.group_id,
                        source: adv.source,
                        priority: adv.priority,
                        state,
                        interface: group.config.interface.clone(),
                        interval: adv.interval,
                        last_activity: ctx.now,
                    },
                );
                if adv.virtual_ip != group.config.virtual_ip {
                    log.warn(format!(
                        "VRRP: group {} virtual address mismatch ({} from {})",
                        group.group_id(),
                        adv.virtual_ip,
                        adv.source
                    ));
                }
                let old = group.state;
                group.receive(adv, ctx.now);
                if group.state != old {
                    log.info(format!(
                        "VRRP: group {} {} -> {} (advertisement from {} priority {})",
                        group.group_id(),
                        old,
                        group.state,
                        adv.source,
                        adv.priority
                    ));
                    changed = true;
                }
            }
        }
        changed
    }

    /// Fire timers and send advertisements. Returns true if any group changed its state.
    fn run_timers(&mut self, ctx: &TickContext<'_>, log: &mut DeviceLog) -> bool {
        let mut changed = false;
        for group in self.groups.values_mut() {
            if group.expire_timers(ctx.now) {
                log.info(format!("VRRP: group {} Backup -> Master (timer expired)", group.group_id()));
                changed = true;
            }
            if let Some(adv) = group.advertise(ctx.now) {
                trace!("{}: VRRP group {} advertisement", ctx.device_name, adv.group_id);
                self.outbox.push(adv);
            }
        }
        changed
    }
}

impl Protocol for VrrpProtocol {
    type Config = VrrpConfig;
    type Key = VrrpNeighborKey;
    type Neighbor = VrrpNeighbor;

    const KIND: ProtocolKind = ProtocolKind::Vrrp;
    const ROUTE_OWNER: Option<RouteOwner> = None;

    fn new() -> Self {
        Self::default()
    }

    fn select_config(config: &DeviceConfig) -> Option<&VrrpConfig> {
        config.vrrp.as_ref()
    }

    fn is_enabled(config: &VrrpConfig) -> bool {
        config.enabled
    }

    fn config(&self) -> Option<&VrrpConfig> {
        self.config.as_ref()
    }

    fn state(&self) -> &ProtocolState<VrrpNeighborKey, VrrpNeighbor> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ProtocolState<VrrpNeighborKey, VrrpNeighbor> {
        &mut self.state
    }

    /// Groups whose id, interface and virtual address are unchanged keep their state.
    fn configure(
        &mut self,
        config: Option<&VrrpConfig>,
        interfaces: &BTreeMap<String, Interface>,
    ) -> Result<(), ConfigError> {
        self.config = config.cloned();
        let config = match config {
            Some(c) => c,
            None => {
                self.groups.clear();
                return Ok(());
            }
        };
        if let Err(e) = config.validate(interfaces) {
            self.groups.clear();
            return Err(e);
        }
        let mut old = std::mem::take(&mut self.groups);
        for g in config.groups.iter() {
            let primary = interfaces.get(&g.interface).and_then(|i| i.ip_address);
            let group = match old.remove(&g.group_id) {
                Some(mut kept) if kept.config.interface == g.interface && kept.config.virtual_ip == g.virtual_ip => {
                    kept.config = g.clone();
                    kept.primary_address = primary;
                    kept
                }
                _ => VrrpGroup::new(g.clone(), primary),
            };
            self.groups.insert(g.group_id, group);
        }
        Ok(())
    }

    fn update_neighbors(&mut self, ctx: &TickContext<'_>, log: &mut DeviceLog) {
        self.outbox.clear();
        let mut changed = self.track_interfaces(ctx, log);
        changed |= self.receive(ctx, log);
        changed |= self.run_timers(ctx, log);
        if changed {
            self.state.mark_topology_changed();
        }
    }

    /// Three times the longest advertisement interval of any neighbor, but at least one second
    fn neighbor_timeout(&self) -> Duration {
        let longest = self.state.neighbors().values().map(|n| n.interval).max().unwrap_or(DEFAULT_ADVERTISEMENT_INTERVAL);
        Duration::from_millis((3 * longest).max(1000))
    }

    fn calculation_interval(&self) -> Duration {
        Duration::from_secs(SUMMARY_INTERVAL)
    }

    fn run_calculation(&mut self, ctx: &TickContext<'_>, log: &mut DeviceLog) -> Result<Vec<Route>, ProtocolError> {
        let active: BTreeSet<Ipv4Addr> = self
            .groups
            .values()
            .filter(|g| g.state == VrrpState::Master)
            .map(|g| g.config.virtual_ip)
            .collect();
        if active != self.active_virtual_ips {
            log.info(format!(
                "VRRP: master for {} of {} groups",
                active.len(),
                self.groups.len()
            ));
        }
        debug!("{}: VRRP active virtual addresses {:?}", ctx.device_name, active);
        self.active_virtual_ips = active;
        Ok(Vec::new())
    }

    fn publish(&self, out: &mut DeviceSnapshot) {
        out.vrrp = self.outbox.clone();
    }

    fn reset(&mut self) {
        for group in self.groups.values_mut() {
            group.interface_down(Instant::now());
        }
        self.outbox.clear();
        self.active_virtual_ips.clear();
    }
}
