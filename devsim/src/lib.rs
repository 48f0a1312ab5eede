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

#![deny(missing_docs)]

//! # DevSim: Multi-vendor network device simulator
//! This is a library for simulating the control plane of a network of routers and switches from
//! different vendors. Devices are connected by point-to-point links, and run routing and
//! redundancy protocols, which compute the routing table of every device.
//!
//! ## Structure
//!
//! This library is structured in the following way:
//!
//! - **[`NetworkTopology`](topology::NetworkTopology)**: The network itself, consisting of
//!   [`Devices`](device::Device) and links between their interfaces. The topology drives the
//!   protocols of all devices, either sequentially or in parallel.
//!
//! - **[`Device`](device::Device)**: A single simulated router, with its interfaces, routing
//!   table, configuration, log, and one instance of every protocol supported by its vendor.
//!
//! - **[`Protocols`](protocols)**: The protocol framework ([`Protocol`](protocols::Protocol)),
//!   and its implementations: [`OSPF`](protocols::ospf), [`BGP`](protocols::bgp) and
//!   [`VRRP`](protocols::vrrp). Protocols advance by externally driven ticks. Each tick updates
//!   the neighbor state machines by a single step, ages out stale neighbors, and recomputes the
//!   routes only if something changed.
//!
//! - **[`Config`](config)**: The configuration of the devices and of an entire network, which can
//!   be loaded from a JSON file.
//!
//! - **[`Printer`](printer)**: Helper functions to render the state of a device in a way similar
//!   to the `show` commands of real routers.
//!
//! ## Usage
//!
//! ```
//! use devsim::device::{Interface, RouteProtocol};
//! use devsim::protocols::ospf::{OspfArea, OspfConfig};
//! use devsim::types::Vendor;
//! use devsim::{Error, NetworkTopology};
//! use std::net::Ipv4Addr;
//! use std::time::{Duration, Instant};
//!
//! fn main() -> Result<(), Error> {
//!     let mut net = NetworkTopology::new();
//!     let r1 = net.add_device("R1", Vendor::Cisco)?;
//!     let r2 = net.add_device("R2", Vendor::Juniper)?;
//!     for (id, ip) in [(r1, Ipv4Addr::new(10, 0, 0, 1)), (r2, Ipv4Addr::new(10, 0, 0, 2))] {
//!         let device = net.get_device_mut(id)?;
//!         device.add_interface(Interface::new("eth0", ip, 30))?;
//!         device.set_ospf_configuration(Some(OspfConfig::with_area(OspfArea::new(0, ["eth0"]))))?;
//!     }
//!     net.add_link(r1, "eth0", r2, "eth0")?;
//!
//!     // tick the network until all adjacencies are established
//!     let t0 = Instant::now();
//!     for i in 0..10 {
//!         net.update_protocols_at(t0 + Duration::from_secs(i));
//!     }
//!
//!     // R1 reaches the router id of R2 over OSPF
//!     let route = net.get_device(r1)?.get_routing_table().lookup(Ipv4Addr::new(10, 0, 0, 2));
//!     assert_eq!(route.map(|r| r.protocol()), Some(RouteProtocol::Ospf));
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod device;
mod error;
pub mod printer;
pub mod protocols;
mod runner;
pub mod snapshot;
mod test;
pub mod topology;
pub mod types;

pub use device::Device;
pub use error::Error;
pub use runner::TickLoop;
pub use topology::NetworkTopology;

use std::sync::{Arc, RwLock};

/// Stopper, to check when to stop, or to send the stop command
#[derive(Clone, Debug)]
pub struct Stopper {
    b: Arc<RwLock<bool>>,
}

impl Default for Stopper {
    fn default() -> Self {
        Self::new()
    }
}

impl Stopper {
    /// Create a new stopper
    pub fn new() -> Self {
        Self { b: Arc::new(RwLock::new(false)) }
    }

    /// Send the stop command. This function will block until the write lock can be acquired.
    pub fn send_stop(&self) {
        match self.b.write() {
            Ok(mut b) => *b = true,
            Err(poisoned) => *poisoned.into_inner() = true,
        }
    }

    /// Checks if the stop flag is set. This function will not block, but return `None` if the
    /// read lock cannot be acquired.
    pub fn try_is_stop(&self) -> Option<bool> {
        self.b.try_read().map(|x| *x).ok()
    }

    /// Checks if the stop flag is set. This function will block until the read lock can be
    /// acquired.
    pub fn is_stop(&self) -> bool {
        match self.b.read() {
            Ok(b) => *b,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
