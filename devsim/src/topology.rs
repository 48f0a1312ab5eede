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

//! # Network Topology
//!
//! The topology owns all devices and the point-to-point links between their interfaces. Links are
//! stored in an undirected petgraph, where each node is a device (carrying its name) and each edge
//! is a [`Link`] between two interfaces.
//!
//! The topology drives the protocols of all devices with [`NetworkTopology::update_protocols`].
//! Before each network-wide tick, a read-only [`TopologySnapshot`] is captured. Every device then
//! ticks against this snapshot, which means that all devices observe the same state of the
//! network, and that the devices may tick in parallel (see
//! [`NetworkTopology::update_protocols_parallel`]).

use crate::config::TopologyConfig;
use crate::device::Device;
use crate::protocols::ProtocolRegistry;
use crate::snapshot::TopologySnapshot;
use crate::types::{DeviceError, DeviceId, Link, NetworkError, TopologyGraph, Vendor};

use log::*;
use petgraph::prelude::*;
use std::collections::HashMap;
use std::thread;
use std::time::Instant;

/// # Network Topology
#[derive(Debug)]
pub struct NetworkTopology {
    graph: TopologyGraph,
    devices: HashMap<DeviceId, Device>,
    names: HashMap<String, DeviceId>,
    registry: ProtocolRegistry,
}

impl Default for NetworkTopology {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkTopology {
    /// Create an empty topology, using the default protocol registry
    pub fn new() -> Self {
        Self::with_registry(ProtocolRegistry::default())
    }

    /// Create an empty topology. New devices take their protocols from `registry`.
    pub fn with_registry(registry: ProtocolRegistry) -> Self {
        Self { graph: TopologyGraph::default(), devices: HashMap::new(), names: HashMap::new(), registry }
    }

    /// Build the topology described by a configuration file. All devices are created with their
    /// interfaces and configuration, and all links are added.
    pub fn from_config(config: &TopologyConfig) -> Result<Self, NetworkError> {
        let mut net = Self::new();
        for def in config.devices.iter() {
            let id = net.add_device(def.name.clone(), def.vendor)?;
            let device = net.get_device_mut(id)?;
            for iface in def.interfaces.iter() {
                device.add_interface(iface.clone())?;
            }
            device.set_config(def.config.clone())?;
        }
        for link in config.links.iter() {
            let a = net.device_id(&link.from)?;
            let b = net.device_id(&link.to)?;
            net.add_link(a, &link.from_interface, b, &link.to_interface)?;
        }
        info!("Loaded topology with {} devices and {} links", net.num_devices(), net.num_links());
        Ok(net)
    }

    /// Add a new device. The name must be unique. Returns the id of the device.
    pub fn add_device(&mut self, name: impl Into<String>, vendor: Vendor) -> Result<DeviceId, NetworkError> {
        let name = name.into();
        if self.names.contains_key(&name) {
            return Err(NetworkError::DuplicateDeviceName(name));
        }
        let id = self.graph.add_node(name.clone());
        let device = Device::with_registry(id, name.clone(), vendor, &self.registry);
        debug!("Added device {} ({:?}) with protocols {:?}", name, vendor, self.registry.protocols_of(vendor));
        self.devices.insert(id, device);
        self.names.insert(name, id);
        Ok(id)
    }

    /// Remove a device together with all of its links.
    pub fn remove_device(&mut self, id: DeviceId) -> Result<Device, NetworkError> {
        let device = self.devices.remove(&id).ok_or(NetworkError::DeviceNotFound(id))?;
        self.names.remove(device.name());
        self.graph.remove_node(id);
        Ok(device)
    }

    /// Connect two interfaces with a point-to-point link. Both interfaces must exist and must not
    /// be linked yet.
    pub fn add_link(
        &mut self,
        a: DeviceId,
        a_iface: &str,
        b: DeviceId,
        b_iface: &str,
    ) -> Result<EdgeIndex<u32>, NetworkError> {
        for (id, iface) in [(a, a_iface), (b, b_iface)] {
            if self.get_device(id)?.get_interface(iface).is_none() {
                return Err(DeviceError::InterfaceNotFound(iface.to_string()).into());
            }
            if self.find_link(id, iface).is_some() {
                return Err(NetworkError::InterfaceAlreadyLinked(id, iface.to_string()));
            }
        }
        if a == b && a_iface == b_iface {
            return Err(NetworkError::InterfaceAlreadyLinked(a, a_iface.to_string()));
        }
        debug!("Adding link {}:{} <-> {}:{}", self.graph[a], a_iface, self.graph[b], b_iface);
        Ok(self.graph.add_edge(a, b, Link::new(a, a_iface, b, b_iface)))
    }

    /// Remove the link attached to the interface of a device. Returns the removed link.
    pub fn remove_link(&mut self, device: DeviceId, iface: &str) -> Result<Link, NetworkError> {
        let edge = self.find_link(device, iface).ok_or_else(|| NetworkError::LinkNotFound(device, iface.to_string()))?;
        self.graph.remove_edge(edge).ok_or_else(|| NetworkError::LinkNotFound(device, iface.to_string()))
    }

    fn find_link(&self, device: DeviceId, iface: &str) -> Option<EdgeIndex<u32>> {
        if !self.graph.contains_node(device) {
            return None;
        }
        self.graph.edges(device).find(|e| e.weight().other_end(device, iface).is_some()).map(|e| e.id())
    }

    /// Return the device and interface at the other end of the link attached to `iface`.
    pub fn get_connected_device(&self, device: DeviceId, iface: &str) -> Option<(DeviceId, &str)> {
        let edge = self.find_link(device, iface)?;
        self.graph.edge_weight(edge)?.other_end(device, iface)
    }

    /// Iterate over all links
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.graph.edge_indices().filter_map(move |e| self.graph.edge_weight(e))
    }

    /// Number of links
    pub fn num_links(&self) -> usize {
        self.graph.edge_count()
    }

    /// Number of devices
    pub fn num_devices(&self) -> usize {
        self.devices.len()
    }

    /// Get a reference to a device
    pub fn get_device(&self, id: DeviceId) -> Result<&Device, NetworkError> {
        self.devices.get(&id).ok_or(NetworkError::DeviceNotFound(id))
    }

    /// Get a mutable reference to a device
    pub fn get_device_mut(&mut self, id: DeviceId) -> Result<&mut Device, NetworkError> {
        self.devices.get_mut(&id).ok_or(NetworkError::DeviceNotFound(id))
    }

    /// Get a device by its name
    pub fn get_device_by_name(&self, name: &str) -> Result<&Device, NetworkError> {
        self.get_device(self.device_id(name)?)
    }

    /// Get the id of a device by its name
    pub fn device_id(&self, name: &str) -> Result<DeviceId, NetworkError> {
        self.names.get(name).copied().ok_or_else(|| NetworkError::DeviceNameNotFound(name.to_string()))
    }

    /// All device ids, in the order of creation
    pub fn device_ids(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self.devices.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Iterate over all devices, in the order of creation
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.device_ids().into_iter().filter_map(move |id| self.devices.get(&id))
    }

    /// Change the line protocol state of both interfaces of the link attached to `iface`.
    pub fn set_link_state(&mut self, device: DeviceId, iface: &str, up: bool) -> Result<(), NetworkError> {
        let (remote, remote_iface) = self
            .get_connected_device(device, iface)
            .map(|(id, i)| (id, i.to_string()))
            .ok_or_else(|| NetworkError::LinkNotFound(device, iface.to_string()))?;
        info!(
            "Link {}:{} <-> {}:{} {}",
            self.graph[device],
            iface,
            self.graph[remote],
            remote_iface,
            if up { "up" } else { "down" }
        );
        self.get_device_mut(device)?.set_interface_up(iface, up)?;
        self.get_device_mut(remote)?.set_interface_up(&remote_iface, up)?;
        Ok(())
    }

    /// Bring the link attached to `iface` up
    pub fn link_up(&mut self, device: DeviceId, iface: &str) -> Result<(), NetworkError> {
        self.set_link_state(device, iface, true)
    }

    /// Take the link attached to `iface` down
    pub fn link_down(&mut self, device: DeviceId, iface: &str) -> Result<(), NetworkError> {
        self.set_link_state(device, iface, false)
    }

    /// Administratively shut down (or enable) an interface of a device.
    pub fn set_interface_shutdown(&mut self, device: DeviceId, iface: &str, shutdown: bool) -> Result<(), NetworkError> {
        Ok(self.get_device_mut(device)?.set_interface_shutdown(iface, shutdown)?)
    }

    /// Stop a device. Its protocols are deactivated, and it ignores all ticks until it is
    /// started again.
    pub fn stop_device(&mut self, id: DeviceId) -> Result<(), NetworkError> {
        let device = self.get_device_mut(id)?;
        info!("Stopping device {}", device.name());
        device.stop();
        Ok(())
    }

    /// Start a stopped device.
    pub fn start_device(&mut self, id: DeviceId) -> Result<(), NetworkError> {
        let device = self.get_device_mut(id)?;
        info!("Starting device {}", device.name());
        device.start();
        Ok(())
    }

    /// Capture the state of all devices and links.
    pub fn snapshot(&self) -> TopologySnapshot {
        let mut snapshot = TopologySnapshot::new();
        for (id, device) in self.devices.iter() {
            snapshot.insert_device(*id, device.export());
        }
        for link in self.links() {
            let [(a, a_iface), (b, b_iface)] = link.endpoints();
            snapshot.insert_link(*a, a_iface, *b, b_iface);
        }
        snapshot
    }

    /// Tick the protocols of every device once, using the current time.
    pub fn update_protocols(&mut self) {
        self.update_protocols_at(Instant::now())
    }

    /// Tick the protocols of every device once at time `now`. All devices tick against the same
    /// snapshot, in the order of creation.
    pub fn update_protocols_at(&mut self, now: Instant) {
        let snapshot = self.snapshot();
        trace!("Ticking {} devices", self.devices.len());
        for id in self.device_ids() {
            if let Some(device) = self.devices.get_mut(&id) {
                device.tick_at(&snapshot, now);
            }
        }
    }

    /// Tick the protocols of every device once, distributing the devices over `n_threads` threads
    /// (default: number of CPUs).
    pub fn update_protocols_parallel(&mut self, n_threads: Option<usize>) {
        self.update_protocols_parallel_at(Instant::now(), n_threads)
    }

    /// Tick the protocols of every device once at time `now`, in parallel. Since every device
    /// only reads the shared snapshot and writes its own state, the result is the same as for
    /// [`NetworkTopology::update_protocols_at`].
    pub fn update_protocols_parallel_at(&mut self, now: Instant, n_threads: Option<usize>) {
        let n_threads = n_threads.unwrap_or_else(num_cpus::get).max(1);
        let snapshot = self.snapshot();
        let mut devices: Vec<&mut Device> = self.devices.values_mut().collect();
        if devices.is_empty() {
            return;
        }
        let chunk_size = (devices.len() + n_threads - 1) / n_threads;
        trace!("Ticking {} devices on {} threads", devices.len(), n_threads.min(devices.len()));
        let snapshot = &snapshot;
        thread::scope(|s| {
            for chunk in devices.chunks_mut(chunk_size) {
                s.spawn(move || {
                    for device in chunk.iter_mut() {
                        device.tick_at(snapshot, now);
                    }
                });
            }
        });
    }
}
