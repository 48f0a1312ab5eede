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

//! Shortest path first computation over the link-state database

use super::lsdb::LinkStateDatabase;
use crate::types::ProtocolError;

use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};
use std::net::Ipv4Addr;

/// How to reach a directly adjacent router: the local interface and the address of the neighbor on
/// that link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FirstHop {
    /// Outgoing interface
    pub interface: String,
    /// Interface address of the neighbor
    pub next_hop: Ipv4Addr,
}

/// Result of the SPF computation for one destination router
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpfEntry {
    /// Total cost of the path
    pub cost: u32,
    /// Next hop, inherited from the first hop of the path
    pub next_hop: Ipv4Addr,
    /// Outgoing interface, inherited from the first hop of the path
    pub interface: String,
}

/// Compute the shortest paths from `root` to every reachable router.
///
/// `first_hops` maps the `link_data` of the links of the root LSA (local interface addresses) to
/// the first hop over that link. A link is only used if the router on the other end lists the
/// reverse link as well. Among paths with equal cost, the first one found is kept.
pub fn shortest_paths(
    lsdb: &LinkStateDatabase,
    root: Ipv4Addr,
    first_hops: &HashMap<Ipv4Addr, FirstHop>,
) -> Result<BTreeMap<Ipv4Addr, SpfEntry>, ProtocolError> {
    if lsdb.get(root).is_none() {
        return Err(ProtocolError::MissingRouterLsa(root));
    }

    let mut result: BTreeMap<Ipv4Addr, SpfEntry> = BTreeMap::new();
    let mut dist: HashMap<Ipv4Addr, u32> = HashMap::new();
    let mut hops: HashMap<Ipv4Addr, FirstHop> = HashMap::new();
    let mut visited: HashSet<Ipv4Addr> = HashSet::new();
    // (cost, insertion order, router id)
    let mut heap: BinaryHeap<Reverse<(u32, u64, Ipv4Addr)>> = BinaryHeap::new();
    let mut order: u64 = 0;

    dist.insert(root, 0);
    heap.push(Reverse((0, order, root)));

    while let Some(Reverse((cost, _, node))) = heap.pop() {
        if !visited.insert(node) {
            continue;
        }
        if node != root {
            if let Some(hop) = hops.get(&node) {
                result.insert(
                    node,
                    SpfEntry { cost, next_hop: hop.next_hop, interface: hop.interface.clone() },
                );
            }
        }

        let lsa = match lsdb.get(node) {
            Some(lsa) => lsa,
            None => continue,
        };

        for link in lsa.links.iter() {
            let target = link.link_id;
            if visited.contains(&target) {
                continue;
            }
            // bidirectional check
            if !lsdb.get(target).map(|l| l.links_to(node)).unwrap_or(false) {
                continue;
            }
            let new_cost = cost.saturating_add(link.metric);
            if dist.get(&target).map(|d| new_cost < *d).unwrap_or(true) {
                let hop = if node == root {
                    first_hops
                        .get(&link.link_data)
                        .cloned()
                        .ok_or(ProtocolError::UnresolvedFirstHop(target))?
                } else {
                    match hops.get(&node) {
                        Some(hop) => hop.clone(),
                        None => return Err(ProtocolError::UnresolvedFirstHop(target)),
                    }
                };
                dist.insert(target, new_cost);
                hops.insert(target, hop);
                order += 1;
                heap.push(Reverse((new_cost, order, target)));
            }
        }
    }

    Ok(result)
}
