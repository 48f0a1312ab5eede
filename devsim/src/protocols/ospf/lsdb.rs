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

//! Link-state database

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::time::Instant;

/// Point-to-point link of a router LSA
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct OspfLink {
    /// Router id of the neighbor
    pub link_id: Ipv4Addr,
    /// Local interface address
    pub link_data: Ipv4Addr,
    /// Cost of the outgoing interface
    pub metric: u32,
}

/// Router LSA, describing all adjacencies of a router.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Lsa {
    /// Link state id (the router id of the originator)
    pub ls_id: Ipv4Addr,
    /// Originating router
    pub advertising_router: Ipv4Addr,
    /// Adjacencies
    pub links: Vec<OspfLink>,
    /// Sequence number, incremented on every change
    pub sequence_number: u32,
    /// Time of origination
    #[serde(skip)]
    pub timestamp: Instant,
}

impl Lsa {
    /// Returns true if `self` is a more recent instance than `other`
    pub fn is_newer_than(&self, other: &Lsa) -> bool {
        (self.sequence_number, self.timestamp) > (other.sequence_number, other.timestamp)
    }

    /// Returns true if the LSA contains a link towards `router_id`
    pub fn links_to(&self, router_id: Ipv4Addr) -> bool {
        self.links.iter().any(|l| l.link_id == router_id)
    }
}

/// Link-state database, keyed by advertising router.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LinkStateDatabase {
    lsas: BTreeMap<Ipv4Addr, Lsa>,
}

impl LinkStateDatabase {
    /// Create an empty database
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the LSA if it is unknown or newer than the stored instance. Returns true if the
    /// database changed.
    pub fn install(&mut self, lsa: Lsa) -> bool {
        match self.lsas.get(&lsa.advertising_router) {
            Some(old) if !lsa.is_newer_than(old) => false,
            _ => {
                self.lsas.insert(lsa.advertising_router, lsa);
                true
            }
        }
    }

    /// Get the LSA of a router
    pub fn get(&self, router_id: Ipv4Addr) -> Option<&Lsa> {
        self.lsas.get(&router_id)
    }

    /// Iterate over all LSAs, ordered by advertising router
    pub fn iter(&self) -> impl Iterator<Item = &Lsa> {
        self.lsas.values()
    }

    /// Remove every LSA whose originator is not in `keep`. Returns the number of removed LSAs.
    pub fn retain_routers(&mut self, keep: &BTreeSet<Ipv4Addr>) -> usize {
        let before = self.lsas.len();
        self.lsas.retain(|rid, _| keep.contains(rid));
        before - self.lsas.len()
    }

    /// Number of LSAs
    pub fn len(&self) -> usize {
        self.lsas.len()
    }

    /// Returns true if the database is empty
    pub fn is_empty(&self) -> bool {
        self.lsas.is_empty()
    }

    /// Drop all LSAs
    pub fn clear(&mut self) {
        self.lsas.clear()
    }
}
