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

//! BGP routes and the decision process

use crate::types::{AsId, Ipv4Prefix};

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::net::Ipv4Addr;

/// Origin attribute. Lower is preferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Origin {
    /// Network statement
    Igp = 0,
    /// Learned from EGP
    Egp = 1,
    /// Redistributed
    Incomplete = 2,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Igp => "i",
            Self::Egp => "e",
            Self::Incomplete => "?",
        })
    }
}

/// A BGP route, either received from a peer or originated locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BgpRouteEntry {
    /// Destination
    pub prefix: Ipv4Prefix,
    /// Next hop. `None` for locally originated routes.
    pub next_hop: Option<Ipv4Addr>,
    /// AS path, the neighboring AS first
    pub as_path: Vec<AsId>,
    /// Local preference
    pub local_preference: u32,
    /// Multi exit discriminator
    pub med: u32,
    /// Origin
    pub origin: Origin,
    /// Peer the route was received from. `None` for locally originated routes.
    pub peer: Option<Ipv4Addr>,
    /// The route was received over an iBGP session
    pub ibgp: bool,
}

impl BgpRouteEntry {
    /// Create a locally originated route
    pub fn local(prefix: Ipv4Prefix, origin: Origin, local_preference: u32) -> Self {
        Self { prefix, next_hop: None, as_path: Vec::new(), local_preference, med: 0, origin, peer: None, ibgp: false }
    }

    /// The neighboring AS (first AS of the path)
    pub fn neighbor_as(&self) -> Option<AsId> {
        self.as_path.first().copied()
    }

    /// Returns true if the AS path contains `asn`
    pub fn has_loop(&self, asn: AsId) -> bool {
        self.as_path.contains(&asn)
    }

    /// Peer address in dotted notation, used for the final tiebreak, which compares the text
    /// form (`10.0.0.10` before `10.0.0.9`).
    pub fn peer_key(&self) -> Option<String> {
        self.peer.map(|p| p.to_string())
    }

    /// AS path in the usual notation
    pub fn as_path_string(&self) -> String {
        self.as_path.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(" ")
    }
}

/// Compare two routes for the same prefix. `Ordering::Greater` means `a` is preferred.
///
/// 1. higher local preference
/// 2. shorter AS path
/// 3. lower origin
/// 4. lower MED, only if both routes come from the same neighboring AS
/// 5. eBGP over iBGP
/// 6. lexicographically lower peer address
pub fn compare(a: &BgpRouteEntry, b: &BgpRouteEntry) -> Ordering {
    a.local_preference
        .cmp(&b.local_preference)
        .then_with(|| b.as_path.len().cmp(&a.as_path.len()))
        .then_with(|| b.origin.cmp(&a.origin))
        .then_with(|| {
            if a.neighbor_as() == b.neighbor_as() {
                b.med.cmp(&a.med)
            } else {
                Ordering::Equal
            }
        })
        .then_with(|| b.ibgp.cmp(&a.ibgp))
        .then_with(|| b.peer_key().cmp(&a.peer_key()))
}

/// Select the best route among the candidates. The candidates are visited in lexicographic order
/// of their peer address, such that the result does not depend on the order of the input, even
/// though the MED rule does not define a total order.
pub fn select_best<'a>(candidates: impl IntoIterator<Item = &'a BgpRouteEntry>) -> Option<&'a BgpRouteEntry> {
    let mut candidates: Vec<&BgpRouteEntry> = candidates.into_iter().collect();
    candidates.sort_by_cached_key(|c| c.peer_key());
    candidates.into_iter().fold(None, |best, c| match best {
        Some(b) if compare(c, b) != Ordering::Greater => Some(b),
        _ => Some(c),
    })
}
