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

//! # Protocol framework
//!
//! Every routing or redundancy protocol of a device implements [`Protocol`]. The framework drives
//! all of them through the same lifecycle, one instance per device and protocol type:
//!
//! 1. **Initialize**: build the state from the configuration stored on the device. If there is no
//!    configuration (or it is invalid), the protocol stays inactive.
//! 2. **Tick**: the single, externally driven update step. It is composed of
//!    - [`Protocol::update_neighbors`]: discover neighbors over operational interfaces and advance
//!      each neighbor FSM by exactly one transition,
//!    - neighbor aging: neighbors without activity within [`Protocol::neighbor_timeout`] are
//!      removed (which sets the change flag),
//!    - [`Protocol::run_calculation`]: only executed if a change flag is set, or if
//!      [`Protocol::calculation_interval`] has elapsed since the last run. The returned routes
//!      replace all routes of the protocol in the routing table.
//! 3. **ApplyConfiguration**: replace the configuration, set the change flag, and derive the
//!    active state from the enabled flag.
//!
//! Protocols never see other devices directly. All information about the rest of the network is
//! taken from the read-only [`TopologySnapshot`], which is captured before every network-wide
//! tick. This allows different devices to tick in parallel.
//!
//! Since every device stores its protocols as trait objects, [`DynProtocol`] is the object-safe
//! counterpart of [`Protocol`], implemented for every protocol by the framework.

pub mod bgp;
pub mod ospf;
mod registry;
mod state;
pub mod vrrp;

pub use registry::{ProtocolRegistration, ProtocolRegistry};
pub use state::{NeighborRecord, ProtocolState};

use crate::config::DeviceConfig;
use crate::device::{DeviceLog, Interface, Route, RouteOwner, RoutingTable};
use crate::snapshot::{DeviceSnapshot, TopologySnapshot};
use crate::types::{ConfigError, DeviceId, ProtocolError};

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

/// Type of protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    /// Open Shortest Path First
    Ospf,
    /// Border Gateway Protocol
    Bgp,
    /// Virtual Router Redundancy Protocol
    Vrrp,
}

impl ProtocolKind {
    /// Name of the protocol
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ospf => "OSPF",
            Self::Bgp => "BGP",
            Self::Vrrp => "VRRP",
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Mutable parts of a device, handed to a protocol during a tick.
#[derive(Debug)]
pub struct DeviceParts<'a> {
    /// Id of the device
    pub id: DeviceId,
    /// Name of the device
    pub name: &'a str,
    /// Interfaces of the device
    pub interfaces: &'a BTreeMap<String, Interface>,
    /// Routing table of the device
    pub routing_table: &'a mut RoutingTable,
    /// Log sink of the device
    pub log: &'a mut DeviceLog,
}

/// Read-only view of the device and the network during a tick.
#[derive(Debug, Clone, Copy)]
pub struct TickContext<'a> {
    /// Id of the device
    pub device_id: DeviceId,
    /// Name of the device
    pub device_name: &'a str,
    /// Interfaces of the device
    pub interfaces: &'a BTreeMap<String, Interface>,
    /// Routing table of the device, as it was before the calculation of this protocol
    pub routing_table: &'a RoutingTable,
    /// State of the network at the beginning of the tick
    pub snapshot: &'a TopologySnapshot,
    /// Current time
    pub now: Instant,
}

impl<'a> TickContext<'a> {
    /// Get a local interface, only if it is up and not shut down.
    pub fn operational_interface(&self, name: &str) -> Option<&'a Interface> {
        self.interfaces.get(name).filter(|i| i.is_operational())
    }

    /// Returns true if the address is configured on any local interface.
    pub fn owns_address(&self, ip: Ipv4Addr) -> bool {
        self.interfaces.values().any(|i| i.ip_address == Some(ip))
    }

    /// Resolve the device on the other side of a local interface. Returns the remote device id,
    /// its snapshot, and the remote interface, but only if the remote device is running.
    pub fn remote_end(&self, iface: &str) -> Option<(DeviceId, &'a DeviceSnapshot, &'a Interface)> {
        let (remote_id, remote_iface) = self.snapshot.connected(self.device_id, iface)?;
        let remote = self.snapshot.device(remote_id).filter(|d| d.running)?;
        let remote_iface = remote.interfaces.get(remote_iface)?;
        Some((remote_id, remote, remote_iface))
    }
}

/// # Protocol
///
/// Protocol-specific part of the lifecycle. The generic part (aging, calculation gating, route
/// installation, error handling) is implemented once, see [`DynProtocol`].
pub trait Protocol: fmt::Debug + Send + 'static {
    /// Configuration of the protocol
    type Config: Clone + fmt::Debug;
    /// Key of the neighbor table
    type Key: Ord + Clone + fmt::Display + fmt::Debug + Send;
    /// Neighbor entry
    type Neighbor: NeighborRecord + Clone + fmt::Debug + Send;

    /// Kind of protocol
    const KIND: ProtocolKind;
    /// Owner of the routes computed by the protocol, or `None` if the protocol does not install
    /// any routes.
    const ROUTE_OWNER: Option<RouteOwner>;

    /// Create an inactive instance
    fn new() -> Self
    where
        Self: Sized;

    /// Pick the configuration of this protocol from the device configuration
    fn select_config(config: &DeviceConfig) -> Option<&Self::Config>;

    /// Returns true if the configuration enables the protocol
    fn is_enabled(config: &Self::Config) -> bool;

    /// Current configuration
    fn config(&self) -> Option<&Self::Config>;

    /// Shared state
    fn state(&self) -> &ProtocolState<Self::Key, Self::Neighbor>;

    /// Mutable shared state
    fn state_mut(&mut self) -> &mut ProtocolState<Self::Key, Self::Neighbor>;

    /// Replace the configuration. The configuration is validated against the interfaces of the
    /// device. On error, the old configuration must be dropped nonetheless.
    fn configure(
        &mut self,
        config: Option<&Self::Config>,
        interfaces: &BTreeMap<String, Interface>,
    ) -> Result<(), ConfigError>;

    /// Discover neighbors, and advance the FSM of each neighbor by exactly one transition.
    fn update_neighbors(&mut self, ctx: &TickContext<'_>, log: &mut DeviceLog);

    /// Neighbors without activity for longer than this are removed.
    fn neighbor_timeout(&self) -> Duration;

    /// Ceiling after which the calculation is executed even without any change.
    fn calculation_interval(&self) -> Duration;

    /// Compute the routes of the protocol. The returned routes replace all routes of
    /// [`Protocol::ROUTE_OWNER`].
    fn run_calculation(
        &mut self,
        ctx: &TickContext<'_>,
        log: &mut DeviceLog,
    ) -> Result<Vec<Route>, ProtocolError>;

    /// Publish the state visible to other devices into the snapshot.
    fn publish(&self, out: &mut DeviceSnapshot);

    /// Hook called for every neighbor removed by aging.
    fn neighbor_expired(&mut self, _key: &Self::Key, _neighbor: &Self::Neighbor, _log: &mut DeviceLog) {}

    /// Hook called when the protocol is deactivated, to drop all derived state.
    fn reset(&mut self) {}
}

/// Object-safe lifecycle of a protocol instance, implemented for every [`Protocol`].
pub trait DynProtocol: fmt::Debug + Send {
    /// Kind of the protocol
    fn kind(&self) -> ProtocolKind;

    /// Build the initial state from the device configuration.
    fn initialize(&mut self, config: &DeviceConfig, interfaces: &BTreeMap<String, Interface>, log: &mut DeviceLog);

    /// Replace the configuration, set the change flag and derive the active state.
    fn apply_configuration(
        &mut self,
        config: &DeviceConfig,
        interfaces: &BTreeMap<String, Interface>,
        log: &mut DeviceLog,
    );

    /// Perform a single update step.
    fn tick(&mut self, parts: DeviceParts<'_>, snapshot: &TopologySnapshot, now: Instant);

    /// Returns true if the protocol is active
    fn is_active(&self) -> bool;

    /// Returns true if the next tick at `now` would run the calculation (ignoring any change
    /// caused by the neighbor update of that tick).
    fn should_run_calculation(&self, now: Instant) -> bool;

    /// Number of calculations executed so far
    fn recomputations(&self) -> u64;

    /// Publish the state visible to other devices
    fn export(&self, out: &mut DeviceSnapshot);

    /// Read-only summary for display
    fn summary(&self, now: Instant) -> ProtocolSummary;

    /// Deactivate the protocol and withdraw all of its routes.
    fn deactivate(&mut self, routing_table: &mut RoutingTable, log: &mut DeviceLog);

    /// Downcast support, used for typed access to the concrete protocol.
    fn as_any(&self) -> &dyn Any;

    /// Mutable downcast support
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<P: Protocol> DynProtocol for P {
    fn kind(&self) -> ProtocolKind {
        P::KIND
    }

    fn initialize(&mut self, config: &DeviceConfig, interfaces: &BTreeMap<String, Interface>, log: &mut DeviceLog) {
        load_config(self, config, interfaces, log);
    }

    fn apply_configuration(
        &mut self,
        config: &DeviceConfig,
        interfaces: &BTreeMap<String, Interface>,
        log: &mut DeviceLog,
    ) {
        load_config(self, config, interfaces, log);
        self.state_mut().mark_policy_changed();
    }

    fn tick(&mut self, parts: DeviceParts<'_>, snapshot: &TopologySnapshot, now: Instant) {
        tick(self, parts, snapshot, now)
    }

    fn is_active(&self) -> bool {
        self.state().is_active()
    }

    fn should_run_calculation(&self, now: Instant) -> bool {
        self.state().is_active() && self.state().should_run_calculation(now, self.calculation_interval())
    }

    fn recomputations(&self) -> u64 {
        self.state().recomputations()
    }

    fn export(&self, out: &mut DeviceSnapshot) {
        if self.state().is_active() {
            self.publish(out)
        }
    }

    fn summary(&self, now: Instant) -> ProtocolSummary {
        let state = self.state();
        ProtocolSummary {
            kind: P::KIND,
            enabled: self.config().map(P::is_enabled).unwrap_or(false),
            active: state.is_active(),
            last_update_age: state.last_update().map(|t| now.saturating_duration_since(t)),
            recomputations: state.recomputations(),
            neighbors: state
                .neighbors()
                .iter()
                .map(|(k, n)| NeighborSummary {
                    key: k.to_string(),
                    state: n.state_name(),
                    age: now.saturating_duration_since(n.last_activity()),
                    detail: n.detail(),
                })
                .collect(),
        }
    }

    fn deactivate(&mut self, routing_table: &mut RoutingTable, log: &mut DeviceLog) {
        self.state_mut().set_active(false);
        self.reset();
        if let Some(owner) = P::ROUTE_OWNER {
            let n = routing_table.clear_routes_by_protocol(owner);
            if n > 0 {
                log.info(format!("{}: withdrew {} routes", P::KIND, n));
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Load the configuration of the protocol from the device configuration, and derive the active
/// state. Configuration errors keep the protocol inactive.
fn load_config<P: Protocol>(
    p: &mut P,
    config: &DeviceConfig,
    interfaces: &BTreeMap<String, Interface>,
    log: &mut DeviceLog,
) {
    let selected = P::select_config(config);
    let was_active = p.state().is_active();
    let active = match p.configure(selected, interfaces) {
        Ok(()) => selected.map(P::is_enabled).unwrap_or(false),
        Err(e) => {
            log.error(format!("{}: invalid configuration: {}", P::KIND, e));
            false
        }
    };
    if selected.is_none() {
        log.debug(format!("{}: not configured", P::KIND));
    }
    if was_active && !active {
        p.reset();
    }
    p.state_mut().set_active(active);
    if active != was_active {
        log.info(format!("{}: {}", P::KIND, if active { "enabled" } else { "disabled" }));
    }
}

/// The generic tick of every protocol.
fn tick<P: Protocol>(p: &mut P, parts: DeviceParts<'_>, snapshot: &TopologySnapshot, now: Instant) {
    let DeviceParts { id, name, interfaces, routing_table, log } = parts;

    if !p.state().is_active() {
        // an inactive protocol never keeps routes in the table
        if let Some(owner) = P::ROUTE_OWNER {
            let n = routing_table.clear_routes_by_protocol(owner);
            if n > 0 {
                log.info(format!("{}: withdrew {} routes", P::KIND, n));
            }
        }
        return;
    }

    let routes = {
        let ctx = TickContext {
            device_id: id,
            device_name: name,
            interfaces,
            routing_table: &*routing_table,
            snapshot,
            now,
        };

        p.update_neighbors(&ctx, log);

        let timeout = p.neighbor_timeout();
        for (key, neighbor) in p.state_mut().expire_neighbors(now, timeout) {
            log.warn(format!(
                "{}: neighbor {} expired in state {}",
                P::KIND,
                key,
                neighbor.state_name()
            ));
            p.neighbor_expired(&key, &neighbor, log);
        }
        p.state_mut().touch(now);

        if !p.state().should_run_calculation(now, p.calculation_interval()) {
            return;
        }

        match p.run_calculation(&ctx, log) {
            Ok(routes) => routes,
            Err(e) => {
                log.error(format!("{}: calculation failed, keeping previous routes: {}", P::KIND, e));
                return;
            }
        }
    };

    p.state_mut().finish_calculation(now);

    if let Some(owner) = P::ROUTE_OWNER {
        for e in routing_table.replace_routes(owner, routes) {
            log.warn(format!("{}: route not installed: {}", P::KIND, e));
        }
    }
}

/// Read-only summary of a protocol instance, sufficient to render neighbor tables.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProtocolSummary {
    /// Protocol
    pub kind: ProtocolKind,
    /// The configuration exists and enables the protocol
    pub enabled: bool,
    /// The protocol is running
    pub active: bool,
    /// Time since the last tick
    pub last_update_age: Option<Duration>,
    /// Number of calculations so far
    pub recomputations: u64,
    /// Neighbor table
    pub neighbors: Vec<NeighborSummary>,
}

/// Single neighbor entry in a [`ProtocolSummary`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NeighborSummary {
    /// Neighbor key
    pub key: String,
    /// FSM state
    pub state: String,
    /// Time since the last activity
    pub age: Duration,
    /// Additional information
    pub detail: String,
}
