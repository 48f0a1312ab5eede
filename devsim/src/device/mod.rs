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

//! # Simulated device
//!
//! A [`Device`] owns its interfaces, its routing table, its configuration, its log sink, and one
//! instance of every protocol its vendor supports. Devices never access each other: during a
//! tick, everything about the rest of the network is read from a
//! [`TopologySnapshot`](crate::snapshot::TopologySnapshot).

mod interface;
mod log;
mod routing_table;

pub use self::interface::Interface;
pub use self::log::{DeviceLog, LogEntry, DEFAULT_LOG_CAPACITY};
pub use self::routing_table::{Route, RouteOwner, RouteProtocol, RoutingTable};

use crate::config::{DeviceConfig, StaticRouteConfig};
use crate::protocols::bgp::{BgpConfig, BgpProtocol};
use crate::protocols::ospf::{OspfConfig, OspfProtocol};
use crate::protocols::vrrp::{VrrpConfig, VrrpProtocol};
use crate::protocols::{DeviceParts, DynProtocol, ProtocolKind, ProtocolRegistry, ProtocolSummary};
use crate::snapshot::{DeviceSnapshot, TopologySnapshot};
use crate::types::{ConfigError, DeviceError, DeviceId, Ipv4Prefix, Vendor};

use std::collections::BTreeMap;
use std::time::Instant;

/// # Device
///
/// A simulated router or switch. All protocol instances are created from the
/// [`ProtocolRegistry`] when the device is created, and stay inactive until they are configured.
#[derive(Debug)]
pub struct Device {
    id: DeviceId,
    name: String,
    vendor: Vendor,
    interfaces: BTreeMap<String, Interface>,
    routing_table: RoutingTable,
    config: DeviceConfig,
    protocols: Vec<Box<dyn DynProtocol>>,
    log: DeviceLog,
    running: bool,
}

impl Device {
    /// Create a new device with all protocols of the default registry that are available for
    /// `vendor`.
    pub fn new(id: DeviceId, name: impl Into<String>, vendor: Vendor) -> Self {
        Self::with_registry(id, name, vendor, &ProtocolRegistry::default())
    }

    /// Create a new device, taking the protocols from `registry`.
    pub fn with_registry(
        id: DeviceId,
        name: impl Into<String>,
        vendor: Vendor,
        registry: &ProtocolRegistry,
    ) -> Self {
        let name = name.into();
        Self {
            id,
            log: DeviceLog::new(name.clone()),
            name,
            vendor,
            interfaces: BTreeMap::new(),
            routing_table: RoutingTable::new(),
            config: DeviceConfig::default(),
            protocols: registry.instantiate(vendor),
            running: true,
        }
    }

    /// Return the ID of the device
    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Return the name of the device
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the vendor of the device
    pub fn vendor(&self) -> Vendor {
        self.vendor
    }

    /// Returns true if the device is running. Stopped devices ignore ticks.
    pub fn is_running(&self) -> bool {
        self.running
    }

    // ------------------------------------------------------------------------------------------
    // Interfaces
    // ------------------------------------------------------------------------------------------

    /// Add a new interface. The connected routes are refreshed.
    pub fn add_interface(&mut self, iface: Interface) -> Result<(), DeviceError> {
        if self.interfaces.contains_key(&iface.name) {
            return Err(DeviceError::InterfaceAlreadyExists(iface.name));
        }
        self.log.debug(format!("interface {} added", iface.name));
        self.interfaces.insert(iface.name.clone(), iface);
        self.refresh_connected_routes();
        Ok(())
    }

    /// Get a single interface
    pub fn get_interface(&self, name: &str) -> Option<&Interface> {
        self.interfaces.get(name)
    }

    /// Get all interfaces, ordered by name
    pub fn get_all_interfaces(&self) -> &BTreeMap<String, Interface> {
        &self.interfaces
    }

    /// Change the line protocol state of an interface.
    pub fn set_interface_up(&mut self, name: &str, up: bool) -> Result<(), DeviceError> {
        let iface = self.interface_mut(name)?;
        if iface.is_up == up {
            return Ok(());
        }
        iface.is_up = up;
        self.log.info(format!("interface {} changed state to {}", name, if up { "up" } else { "down" }));
        self.refresh_connected_routes();
        Ok(())
    }

    /// Change the administrative state of an interface.
    pub fn set_interface_shutdown(&mut self, name: &str, shutdown: bool) -> Result<(), DeviceError> {
        let iface = self.interface_mut(name)?;
        if iface.is_shutdown == shutdown {
            return Ok(());
        }
        iface.is_shutdown = shutdown;
        self.log.info(format!(
            "interface {} {}",
            name,
            if shutdown { "administratively down" } else { "enabled" }
        ));
        self.refresh_connected_routes();
        Ok(())
    }

    fn interface_mut(&mut self, name: &str) -> Result<&mut Interface, DeviceError> {
        self.interfaces.get_mut(name).ok_or_else(|| DeviceError::InterfaceNotFound(name.to_string()))
    }

    // ------------------------------------------------------------------------------------------
    // Routing table
    // ------------------------------------------------------------------------------------------

    /// Return the routing table
    pub fn get_routing_table(&self) -> &RoutingTable {
        &self.routing_table
    }

    /// Install a single route
    pub fn add_route(&mut self, route: Route) -> Result<(), DeviceError> {
        self.routing_table.add_route(route)
    }

    /// Remove all routes of one owner. Returns the number of removed routes.
    pub fn clear_routes_by_protocol(&mut self, owner: RouteOwner) -> usize {
        self.routing_table.clear_routes_by_protocol(owner)
    }

    /// Recompute the connected routes from the interfaces, and reinstall the static routes (which
    /// may have been shadowed or may now be shadowed by a connected network).
    pub fn refresh_connected_routes(&mut self) {
        let connected = self
            .interfaces
            .values()
            .filter(|i| i.is_operational())
            .filter_map(|i| {
                i.subnet().map(|p| Route::new(p, None, Some(i.name.clone()), RouteProtocol::Connected, 0))
            })
            .collect();
        for e in self.routing_table.replace_routes(RouteOwner::Connected, connected) {
            self.log.warn(format!("connected route not installed: {}", e));
        }
        self.refresh_static_routes();
    }

    fn refresh_static_routes(&mut self) {
        let statics = self
            .config
            .static_routes
            .iter()
            .map(|s| Route::new(s.prefix, s.next_hop, s.interface.clone(), RouteProtocol::Static, 0))
            .collect();
        for e in self.routing_table.replace_routes(RouteOwner::Static, statics) {
            self.log.warn(format!("static route not installed: {}", e));
        }
    }

    /// Add a static route to the configuration and install it.
    pub fn add_static_route(&mut self, route: StaticRouteConfig) -> Result<(), DeviceError> {
        if self.config.static_routes.iter().any(|r| r.prefix == route.prefix) {
            return Err(DeviceError::StaticRouteAlreadyExists(route.prefix));
        }
        if let Some(iface) = &route.interface {
            if !self.interfaces.contains_key(iface) {
                return Err(DeviceError::InterfaceNotFound(iface.clone()));
            }
        }
        if route.next_hop.is_none() && route.interface.is_none() {
            return Err(DeviceError::InvalidRoute(route.prefix));
        }
        self.config.static_routes.push(route);
        self.refresh_static_routes();
        self.policy_changed(ProtocolKind::Bgp);
        Ok(())
    }

    /// Remove a static route from the configuration and from the routing table.
    pub fn remove_static_route(&mut self, prefix: Ipv4Prefix) -> Result<StaticRouteConfig, DeviceError> {
        let pos = self
            .config
            .static_routes
            .iter()
            .position(|r| r.prefix == prefix)
            .ok_or(DeviceError::NoStaticRoute(prefix))?;
        let removed = self.config.static_routes.remove(pos);
        self.refresh_static_routes();
        self.policy_changed(ProtocolKind::Bgp);
        Ok(removed)
    }

    // ------------------------------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------------------------------

    /// Return the entire configuration
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Replace the entire configuration. Every protocol is reconfigured. The configuration is
    /// stored even if it is invalid; the affected protocols stay inactive in that case.
    pub fn set_config(&mut self, config: DeviceConfig) -> Result<(), DeviceError> {
        self.check_supported(&config)?;
        self.config = config;
        for kind in [ProtocolKind::Ospf, ProtocolKind::Bgp, ProtocolKind::Vrrp] {
            self.reconfigure(kind);
        }
        self.refresh_static_routes();
        Ok(self.config.validate(&self.interfaces)?)
    }

    /// Return the OSPF configuration
    pub fn get_ospf_configuration(&self) -> Option<&OspfConfig> {
        self.config.ospf.as_ref()
    }

    /// Replace the OSPF configuration and reconfigure the OSPF process.
    pub fn set_ospf_configuration(&mut self, config: Option<OspfConfig>) -> Result<(), DeviceError> {
        self.require_protocol(ProtocolKind::Ospf, config.is_some())?;
        let result = config.as_ref().map(|c| c.validate(&self.interfaces)).unwrap_or(Ok(()));
        self.config.ospf = config;
        self.reconfigure(ProtocolKind::Ospf);
        Ok(result?)
    }

    /// Return the BGP configuration
    pub fn get_bgp_configuration(&self) -> Option<&BgpConfig> {
        self.config.bgp.as_ref()
    }

    /// Replace the BGP configuration and reconfigure the BGP process.
    pub fn set_bgp_configuration(&mut self, config: Option<BgpConfig>) -> Result<(), DeviceError> {
        self.require_protocol(ProtocolKind::Bgp, config.is_some())?;
        let result = config.as_ref().map(|c| c.validate()).unwrap_or(Ok(()));
        self.config.bgp = config;
        self.reconfigure(ProtocolKind::Bgp);
        Ok(result?)
    }

    /// Return the VRRP configuration
    pub fn get_vrrp_configuration(&self) -> Option<&VrrpConfig> {
        self.config.vrrp.as_ref()
    }

    /// Replace the VRRP configuration and reconfigure all VRRP groups.
    pub fn set_vrrp_configuration(&mut self, config: Option<VrrpConfig>) -> Result<(), DeviceError> {
        self.require_protocol(ProtocolKind::Vrrp, config.is_some())?;
        let result = config.as_ref().map(|c| c.validate(&self.interfaces)).unwrap_or(Ok(()));
        self.config.vrrp = config;
        self.reconfigure(ProtocolKind::Vrrp);
        Ok(result?)
    }

    fn check_supported(&self, config: &DeviceConfig) -> Result<(), ConfigError> {
        self.require_protocol(ProtocolKind::Ospf, config.ospf.is_some())?;
        self.require_protocol(ProtocolKind::Bgp, config.bgp.is_some())?;
        self.require_protocol(ProtocolKind::Vrrp, config.vrrp.is_some())?;
        Ok(())
    }

    fn require_protocol(&self, kind: ProtocolKind, configured: bool) -> Result<(), ConfigError> {
        if configured && self.protocol(kind).is_none() {
            Err(ConfigError::UnsupportedProtocol(kind, self.vendor))
        } else {
            Ok(())
        }
    }

    fn reconfigure(&mut self, kind: ProtocolKind) {
        let Self { protocols, config, interfaces, log, routing_table, running, .. } = self;
        if let Some(p) = protocols.iter_mut().find(|p| p.kind() == kind) {
            p.apply_configuration(config, interfaces, log);
            if !p.is_active() || !*running {
                p.deactivate(routing_table, log);
            }
        }
    }

    fn policy_changed(&mut self, kind: ProtocolKind) {
        // reapplying the configuration sets the policy-changed flag
        self.reconfigure(kind);
    }

    // ------------------------------------------------------------------------------------------
    // Protocols
    // ------------------------------------------------------------------------------------------

    /// Get the protocol instance of the given kind, if the vendor supports it.
    pub fn protocol(&self, kind: ProtocolKind) -> Option<&dyn DynProtocol> {
        self.protocols.iter().find(|p| p.kind() == kind).map(|p| p.as_ref())
    }

    /// Iterate over all protocol instances
    pub fn protocols(&self) -> impl Iterator<Item = &dyn DynProtocol> {
        self.protocols.iter().map(|p| p.as_ref())
    }

    /// Typed access to the OSPF process
    pub fn ospf(&self) -> Option<&OspfProtocol> {
        self.protocol(ProtocolKind::Ospf)?.as_any().downcast_ref()
    }

    /// Typed access to the BGP process
    pub fn bgp(&self) -> Option<&BgpProtocol> {
        self.protocol(ProtocolKind::Bgp)?.as_any().downcast_ref()
    }

    /// Typed access to the VRRP process
    pub fn vrrp(&self) -> Option<&VrrpProtocol> {
        self.protocol(ProtocolKind::Vrrp)?.as_any().downcast_ref()
    }

    /// Read-only summaries of all protocols
    pub fn summaries(&self, now: Instant) -> Vec<ProtocolSummary> {
        self.protocols.iter().map(|p| p.summary(now)).collect()
    }

    /// Perform a single tick of all protocols, using the current time.
    pub fn tick(&mut self, snapshot: &TopologySnapshot) {
        self.tick_at(snapshot, Instant::now())
    }

    /// Perform a single tick of all protocols at time `now`. The protocols are ticked in registry
    /// order (OSPF before BGP), such that BGP resolves its next hops against the OSPF routes of the
    /// same tick.
    pub fn tick_at(&mut self, snapshot: &TopologySnapshot, now: Instant) {
        if !self.running {
            return;
        }
        let Self { id, name, interfaces, routing_table, protocols, log, .. } = self;
        for p in protocols.iter_mut() {
            let parts = DeviceParts {
                id: *id,
                name: name.as_str(),
                interfaces: &*interfaces,
                routing_table: &mut *routing_table,
                log: &mut *log,
            };
            p.tick(parts, snapshot, now);
        }
    }

    /// Returns true if any protocol would run its calculation in a tick at `now`.
    pub fn needs_calculation(&self, now: Instant) -> bool {
        self.running && self.protocols.iter().any(|p| p.should_run_calculation(now))
    }

    /// Publish the state visible to other devices.
    pub fn export(&self) -> DeviceSnapshot {
        let mut snapshot = DeviceSnapshot::new(self.name.clone(), self.interfaces.clone());
        snapshot.running = self.running;
        if self.running {
            for p in self.protocols.iter() {
                p.export(&mut snapshot);
            }
        }
        snapshot
    }

    /// Stop the device: all protocols are deactivated and their routes are withdrawn. Ticks are
    /// ignored until the device is started again.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        let Self { protocols, routing_table, log, .. } = self;
        for p in protocols.iter_mut() {
            p.deactivate(routing_table, log);
        }
        self.running = false;
        self.log.info("device stopped");
    }

    /// Start a stopped device. All protocols are initialized again from the stored configuration.
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        let Self { protocols, config, interfaces, log, .. } = self;
        for p in protocols.iter_mut() {
            p.initialize(config, interfaces, log);
        }
        self.refresh_connected_routes();
        self.log.info("device started");
    }

    // ------------------------------------------------------------------------------------------
    // Log
    // ------------------------------------------------------------------------------------------

    /// Append an informational entry to the device log
    pub fn add_log_entry(&mut self, message: impl Into<String>) {
        self.log.info(message)
    }

    /// Return the device log
    pub fn log(&self) -> &DeviceLog {
        &self.log
    }

    /// Mutable access to the device log
    pub fn log_mut(&mut self) -> &mut DeviceLog {
        &mut self.log
    }
}
