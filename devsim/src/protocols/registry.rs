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

//! Table of all protocols, and which vendor supports which protocol.

use super::bgp::BgpProtocol;
use super::ospf::OspfProtocol;
use super::vrrp::VrrpProtocol;
use super::{DynProtocol, Protocol, ProtocolKind};
use crate::types::Vendor;

/// Vendors offering VRRP
const VRRP_VENDORS: &[Vendor] =
    &[Vendor::Cisco, Vendor::Juniper, Vendor::Huawei, Vendor::Alcatel, Vendor::Aruba, Vendor::Arista];

/// A single entry of the [`ProtocolRegistry`]
#[derive(Debug, Clone)]
pub struct ProtocolRegistration {
    /// Kind of the protocol
    pub kind: ProtocolKind,
    /// Create a new, inactive instance
    pub constructor: fn() -> Box<dyn DynProtocol>,
    /// Vendors offering the protocol
    pub vendors: &'static [Vendor],
}

impl ProtocolRegistration {
    /// Create the registration of a protocol type
    pub fn of<P: Protocol>(vendors: &'static [Vendor]) -> Self {
        Self { kind: P::KIND, constructor: || Box::new(P::new()) as Box<dyn DynProtocol>, vendors }
    }

    /// Returns true if the vendor offers this protocol
    pub fn supports(&self, vendor: Vendor) -> bool {
        self.vendors.contains(&vendor)
    }
}

/// # Protocol Registry
///
/// Explicit table of all protocol types a device can run. New devices are populated from the
/// registry: every protocol supported by the vendor of the device gets one (inactive) instance.
/// The order of registration is the order in which the protocols are ticked.
#[derive(Debug, Clone)]
pub struct ProtocolRegistry {
    entries: Vec<ProtocolRegistration>,
}

impl Default for ProtocolRegistry {
    /// OSPF and BGP are available on every vendor, VRRP on every vendor except plain linux hosts.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(ProtocolRegistration::of::<OspfProtocol>(Vendor::ALL));
        registry.register(ProtocolRegistration::of::<BgpProtocol>(Vendor::ALL));
        registry.register(ProtocolRegistration::of::<VrrpProtocol>(VRRP_VENDORS));
        registry
    }
}

impl ProtocolRegistry {
    /// Create a registry without any protocol
    pub fn empty() -> Self {
        Self { entries: Vec::new() }
    }

    /// Add a protocol. An existing registration of the same kind is replaced, keeping its
    /// position.
    pub fn register(&mut self, registration: ProtocolRegistration) {
        match self.entries.iter_mut().find(|e| e.kind == registration.kind) {
            Some(e) => *e = registration,
            None => self.entries.push(registration),
        }
    }

    /// Returns true if `vendor` offers `kind`
    pub fn supports(&self, kind: ProtocolKind, vendor: Vendor) -> bool {
        self.entries.iter().any(|e| e.kind == kind && e.supports(vendor))
    }

    /// All protocols offered by `vendor`, in registration order
    pub fn protocols_of(&self, vendor: Vendor) -> Vec<ProtocolKind> {
        self.entries.iter().filter(|e| e.supports(vendor)).map(|e| e.kind).collect()
    }

    /// Create one instance of every protocol offered by `vendor`
    pub fn instantiate(&self, vendor: Vendor) -> Vec<Box<dyn DynProtocol>> {
        self.entries.iter().filter(|e| e.supports(vendor)).map(|e| (e.constructor)()).collect()
    }

    /// Iterate over all registrations
    pub fn iter(&self) -> impl Iterator<Item = &ProtocolRegistration> {
        self.entries.iter()
    }
}
