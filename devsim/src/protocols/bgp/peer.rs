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

//! BGP peer state machine

use crate::protocols::NeighborRecord;
use crate::types::{AsId, DeviceId};

use serde::Serialize;
use std::fmt;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

/// State of a BGP session. While the peer is reachable, the session advances by exactly one state
/// per tick. If the peer becomes unreachable, the session falls back to `Idle` immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum BgpPeerState {
    /// No session
    Idle,
    /// Waiting for the TCP connection
    Connect,
    /// Trying to initiate the TCP connection
    Active,
    /// OPEN sent, waiting for the OPEN of the peer
    OpenSent,
    /// OPEN received, waiting for a KEEPALIVE
    OpenConfirm,
    /// Session is up, routes are exchanged
    Established,
}

impl BgpPeerState {
    /// Next state on the way to `Established`. `Established` stays `Established`.
    pub fn next(self) -> Self {
        match self {
            Self::Idle => Self::Connect,
            Self::Connect => Self::Active,
            Self::Active => Self::OpenSent,
            Self::OpenSent => Self::OpenConfirm,
            Self::OpenConfirm | Self::Established => Self::Established,
        }
    }
}

impl fmt::Display for BgpPeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "Idle",
            Self::Connect => "Connect",
            Self::Active => "Active",
            Self::OpenSent => "OpenSent",
            Self::OpenConfirm => "OpenConfirm",
            Self::Established => "Established",
        })
    }
}

/// Single BGP peer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BgpPeer {
    /// Address of the peer
    pub address: Ipv4Addr,
    /// AS of the peer
    pub remote_as: AsId,
    /// The session is iBGP
    pub is_ibgp: bool,
    /// FSM state
    pub state: BgpPeerState,
    /// Local address of the session, once the peer was resolved
    pub local_address: Option<Ipv4Addr>,
    /// Messages sent
    pub msgs_sent: u64,
    /// Messages received
    pub msgs_received: u64,
    /// Prefixes currently received from the peer
    pub prefixes_received: usize,
    /// Number of times the session went down after being established
    pub flaps: u64,
    /// Device of the peer
    #[serde(skip)]
    pub device: Option<DeviceId>,
    /// Last time a message was received
    #[serde(skip)]
    pub last_activity: Instant,
    /// Time the session was established
    #[serde(skip)]
    pub established_at: Option<Instant>,
    /// Time of the last keepalive
    #[serde(skip)]
    pub last_keepalive: Option<Instant>,
}

impl BgpPeer {
    /// Create a peer in state `Idle`
    pub fn new(address: Ipv4Addr, remote_as: AsId, is_ibgp: bool, now: Instant) -> Self {
        Self {
            address,
            remote_as,
            is_ibgp,
            state: BgpPeerState::Idle,
            local_address: None,
            msgs_sent: 0,
            msgs_received: 0,
            prefixes_received: 0,
            flaps: 0,
            device: None,
            last_activity: now,
            established_at: None,
            last_keepalive: None,
        }
    }

    /// Returns true if the session is established
    pub fn is_established(&self) -> bool {
        self.state == BgpPeerState::Established
    }

    /// Time since the session was established
    pub fn uptime(&self, now: Instant) -> Option<Duration> {
        self.established_at.map(|t| now.saturating_duration_since(t))
    }

    /// Advance the FSM by one step. Every step past `Active` exchanges one message in each
    /// direction (OPEN, KEEPALIVE). Returns true if the session just became established.
    pub fn advance(&mut self, now: Instant) -> bool {
        if self.is_established() {
            return false;
        }
        self.state = self.state.next();
        if self.state > BgpPeerState::Active {
            self.msgs_sent += 1;
            self.msgs_received += 1;
        }
        if self.is_established() {
            self.established_at = Some(now);
            self.last_keepalive = Some(now);
            true
        } else {
            false
        }
    }

    /// Exchange keepalives if the keepalive interval elapsed.
    pub fn keepalive(&mut self, now: Instant, interval: Duration) {
        let due = self.last_keepalive.map(|t| now.saturating_duration_since(t) >= interval).unwrap_or(true);
        if self.is_established() && due {
            self.msgs_sent += 1;
            self.msgs_received += 1;
            self.last_keepalive = Some(now);
        }
    }

    /// Fall back to `Idle`. Returns true if the session was established before.
    pub fn reset(&mut self) -> bool {
        let was_established = self.is_established();
        if was_established {
            self.flaps += 1;
        }
        self.state = BgpPeerState::Idle;
        self.established_at = None;
        self.last_keepalive = None;
        self.prefixes_received = 0;
        was_established
    }
}

impl NeighborRecord for BgpPeer {
    fn last_activity(&self) -> Instant {
        self.last_activity
    }

    fn state_name(&self) -> String {
        self.state.to_string()
    }

    fn detail(&self) -> String {
        format!(
            "AS {}{}, {} prefixes, {}/{} msgs",
            self.remote_as,
            if self.is_ibgp { " (iBGP)" } else { "" },
            self.prefixes_received,
            self.msgs_received,
            self.msgs_sent
        )
    }
}
