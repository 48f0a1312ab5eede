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

//! # Topology snapshot
//!
//! Read-only copy of everything a device may observe about the other devices during a tick:
//! interface states, links, and the information each protocol publishes (OSPF LSDB, BGP
//! advertisements, VRRP advertisements). The snapshot is captured once before a network-wide
//! tick, so that all devices see the same state and can tick independently.

use crate::device::Interface;
use crate::protocols::bgp::BgpExport;
use crate::protocols::ospf::OspfExport;
use crate::protocols::vrrp::VrrpAdvertisement;
use crate::types::DeviceId;

use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;

/// State of a single device, as seen by the other devices.
#[derive(Debug, Clone, Default)]
pub struct DeviceSnapshot {
    /// Name of the device
    pub name: String,
    /// The device is running (not stopped)
    pub running: bool,
    /// Interfaces of the device
    pub interfaces: BTreeMap<String, Interface>,
    /// Published OSPF state, if OSPF is active
    pub ospf: Option<OspfExport>,
    /// Published BGP state, if BGP is active
    pub bgp: Option<BgpExport>,
    /// VRRP advertisements sent during the last tick
    pub vrrp: Vec<VrrpAdvertisement>,
}

impl DeviceSnapshot {
    /// Create an empty snapshot of a running device
    pub fn new(name: impl Into<String>, interfaces: BTreeMap<String, Interface>) -> Self {
        Self { name: name.into(), running: true, interfaces, ..Default::default() }
    }
}

/// Read-only state of the entire network
#[derive(Debug, Clone, Default)]
pub struct TopologySnapshot {
    devices: HashMap<DeviceId, DeviceSnapshot>,
    links: HashMap<(DeviceId, String), (DeviceId, String)>,
}

impl TopologySnapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device to the snapshot
    pub fn insert_device(&mut self, id: DeviceId, device: DeviceSnapshot) {
        self.devices.insert(id, device);
    }

    /// Add a link to the snapshot (in both directions)
    pub fn insert_link(&mut self, a: DeviceId, a_iface: &str, b: DeviceId, b_iface: &str) {
        self.links.insert((a, a_iface.to_string()), (b, b_iface.to_string()));
        self.links.insert((b, b_iface.to_string()), (a, a_iface.to_string()));
    }

    /// Get the snapshot of a device
    pub fn device(&self, id: DeviceId) -> Option<&DeviceSnapshot> {
        self.devices.get(&id)
    }

    /// Iterate over all devices
    pub fn devices(&self) -> impl Iterator<Item = (DeviceId, &DeviceSnapshot)> {
        self.devices.iter().map(|(id, d)| (*id, d))
    }

    /// Resolve the device and interface on the other end of the link attached to `iface`.
    pub fn connected(&self, device: DeviceId, iface: &str) -> Option<(DeviceId, &str)> {
        self.links.get(&(device, iface.to_string())).map(|(id, i)| (*id, i.as_str()))
    }

    /// Find the running device and interface where `ip` is configured. Only operational
    /// interfaces are considered.
    pub fn find_address_owner(&self, ip: Ipv4Addr) -> Option<(DeviceId, &DeviceSnapshot, &Interface)> {
        self.devices
            .iter()
            .filter(|(_, d)| d.running)
            .flat_map(|(id, d)| d.interfaces.values().map(move |i| (*id, d, i)))
            .find(|(_, _, i)| i.ip_address == Some(ip) && i.is_operational())
    }
}
