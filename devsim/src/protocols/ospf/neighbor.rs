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

//! OSPF neighbor state machine

use crate::protocols::NeighborRecord;
use crate::types::DeviceId;

use serde::Serialize;
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Instant;

/// State of an OSPF adjacency. Neighbors advance by exactly one state per tick, from `Down` to
/// `Full`, and never skip a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum OspfNeighborState {
    /// No hello received yet
    Down,
    /// Hello received, but our router id is not yet listed by the neighbor
    Init,
    /// Bidirectional communication
    TwoWay,
    /// Negotiation of master / slave for the database exchange
    ExStart,
    /// Database description exchange
    Exchange,
    /// Requesting missing LSAs
    Loading,
    /// Databases are synchronized
    Full,
}

impl OspfNeighborState {
    /// Next state on the way to `Full`. `Full` stays `Full`.
    pub fn next(self) -> Self {
        match self {
            Self::Down => Self::Init,
            Self::Init => Self::TwoWay,
            Self::TwoWay => Self::ExStart,
            Self::ExStart => Self::Exchange,
            Self::Exchange => Self::Loading,
            Self::Loading | Self::Full => Self::Full,
        }
    }
}

impl fmt::Display for OspfNeighborState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Down => "DOWN",
            Self::Init => "INIT",
            Self::TwoWay => "2WAY",
            Self::ExStart => "EXSTART",
            Self::Exchange => "EXCHANGE",
            Self::Loading => "LOADING",
            Self::Full => "FULL",
        })
    }
}

/// Key of the OSPF neighbor table: a router may be adjacent over multiple interfaces.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct OspfNeighborKey {
    /// Local interface
    pub interface: String,
    /// Router id of the neighbor
    pub router_id: Ipv4Addr,
}

impl fmt::Display for OspfNeighborKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} via {}", self.router_id, self.interface)
    }
}

/// Single OSPF neighbor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OspfNeighbor {
    /// Router id of the neighbor
    pub router_id: Ipv4Addr,
    /// Interface address of the neighbor
    pub address: Ipv4Addr,
    /// Local interface
    pub interface: String,
    /// Area of the adjacency
    pub area_id: u32,
    /// FSM state
    pub state: OspfNeighborState,
    /// Remote device
    #[serde(skip)]
    pub device: DeviceId,
    /// Time the last hello was received
    #[serde(skip)]
    pub last_activity: Instant,
}

impl OspfNeighbor {
    /// Returns true if the adjacency is fully established
    pub fn is_full(&self) -> bool {
        self.state == OspfNeighborState::Full
    }
}

impl NeighborRecord for OspfNeighbor {
    fn last_activity(&self) -> Instant {
        self.last_activity
    }

    fn state_name(&self) -> String {
        self.state.to_string()
    }

    fn detail(&self) -> String {
        format!("address {}, area {}", self.address, self.area_id)
    }
}
