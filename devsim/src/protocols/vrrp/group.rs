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

//! State machine of a single VRRP group

use super::config::{VrrpGroupConfig, OWNER_PRIORITY};

use serde::Serialize;
use std::fmt;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

/// State of a VRRP group
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum VrrpState {
    /// Waiting for the interface
    Initialize,
    /// Monitoring the master
    Backup,
    /// Forwarding for the virtual address
    Master,
}

impl fmt::Display for VrrpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Initialize => "Init",
            Self::Backup => "Backup",
            Self::Master => "Master",
        })
    }
}

/// Advertisement of a master (or a resigning master, with priority 0)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VrrpAdvertisement {
    /// Virtual router id
    pub group_id: u8,
    /// Priority of the sender, 0 if the sender resigns
    pub priority: u8,
    /// Primary address of the sender
    pub source: Ipv4Addr,
    /// Virtual address
    pub virtual_ip: Ipv4Addr,
    /// Interface the advertisement was sent on
    pub interface: String,
    /// Advertisement interval of the sender in milliseconds
    pub interval: u64,
    /// Time of sending
    #[serde(skip)]
    pub sent_at: Instant,
}

/// Counters of a group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VrrpStats {
    /// Transitions to master
    pub master_transitions: u64,
    /// Transitions to backup
    pub backup_transitions: u64,
    /// Advertisements sent
    pub adverts_sent: u64,
    /// Advertisements received
    pub adverts_received: u64,
    /// Priority zero advertisements received
    pub priority_zero_received: u64,
}

/// A VRRP group and its timers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VrrpGroup {
    /// Configuration of the group
    pub config: VrrpGroupConfig,
    /// FSM state
    pub state: VrrpState,
    /// Primary address of the local interface
    pub primary_address: Option<Ipv4Addr>,
    /// Address of the current master, if known
    pub master_address: Option<Ipv4Addr>,
    /// Counters
    pub stats: VrrpStats,
    #[serde(skip)]
    master_down_at: Option<Instant>,
    #[serde(skip)]
    preempt_at: Option<Instant>,
    #[serde(skip)]
    last_advert_sent: Option<Instant>,
}

impl VrrpGroup {
    /// Create a group in state `Initialize`
    pub fn new(config: VrrpGroupConfig, primary_address: Option<Ipv4Addr>) -> Self {
        Self {
            config,
            state: VrrpState::Initialize,
            primary_address,
            master_address: None,
            stats: VrrpStats::default(),
            master_down_at: None,
            preempt_at: None,
            last_advert_sent: None,
        }
    }

    /// Virtual router id
    pub fn group_id(&self) -> u8 {
        self.config.group_id
    }

    /// The local interface address is the virtual address
    pub fn is_owner(&self) -> bool {
        self.primary_address == Some(self.config.virtual_ip)
    }

    /// Priority used in advertisements and elections: 255 for the owner.
    pub fn effective_priority(&self) -> u8 {
        if self.is_owner() {
            OWNER_PRIORITY
        } else {
            self.config.priority
        }
    }

    /// `(256 - priority) / 256` of the advertisement interval
    pub fn skew_time(&self) -> Duration {
        let interval = self.config.advertisement_interval;
        Duration::from_millis((256 - self.effective_priority() as u64).saturating_mul(interval) / 256)
    }

    /// Three advertisement intervals plus the skew time
    pub fn master_down_interval(&self) -> Duration {
        self.config.interval().saturating_mul(3).saturating_add(self.skew_time())
    }

    /// Time at which the master is declared down
    pub fn master_down_at(&self) -> Option<Instant> {
        self.master_down_at
    }

    /// Time at which a pending preemption happens
    pub fn preempt_at(&self) -> Option<Instant> {
        self.preempt_at
    }

    /// Leave `Initialize`: the owner becomes master, everybody else backup.
    pub fn start(&mut self, now: Instant) {
        if self.is_owner() {
            self.become_master();
        } else {
            self.become_backup(now, None);
        }
    }

    fn become_master(&mut self) {
        self.state = VrrpState::Master;
        self.master_address = self.primary_address;
        self.master_down_at = None;
        self.preempt_at = None;
        // announce immediately
        self.last_advert_sent = None;
        self.stats.master_transitions += 1;
    }

    fn become_backup(&mut self, now: Instant, master: Option<Ipv4Addr>) {
        self.state = VrrpState::Backup;
        self.master_address = master;
        self.master_down_at = deadline(now, self.master_down_interval());
        self.preempt_at = None;
        self.stats.backup_transitions += 1;
    }

    /// The interface went down. A master resigns with a priority zero advertisement, which is
    /// returned.
    pub fn interface_down(&mut self, now: Instant) -> Option<VrrpAdvertisement> {
        let resign = if self.state == VrrpState::Master { self.advertisement(0, now) } else { None };
        self.state = VrrpState::Initialize;
        self.master_address = None;
        self.master_down_at = None;
        self.preempt_at = None;
        self.last_advert_sent = None;
        resign
    }

    /// Returns true if the advertisement wins the tie against the local router: higher priority,
    /// or equal priority and higher source address.
    fn loses_against(&self, adv: &VrrpAdvertisement) -> bool {
        let local = (self.effective_priority(), self.primary_address.unwrap_or(Ipv4Addr::UNSPECIFIED));
        (adv.priority, adv.source) > local
    }

    /// Process a received advertisement.
    pub fn receive(&mut self, adv: &VrrpAdvertisement, now: Instant) {
        self.stats.adverts_received += 1;
        if adv.priority == 0 {
            self.stats.priority_zero_received += 1;
        }
        match self.state {
            VrrpState::Initialize => {}
            VrrpState::Master => {
                if adv.priority == 0 {
                    // the resigning router expects a fresh advertisement
                    self.last_advert_sent = None;
                } else if self.loses_against(adv) {
                    self.become_backup(now, Some(adv.source));
                }
            }
            VrrpState::Backup => {
                if adv.priority == 0 {
                    // master resigned, take over after the skew time
                    self.master_address = None;
                    self.master_down_at = deadline(now, self.skew_time());
                } else if self.loses_against(adv) || !self.config.preempt {
                    self.master_address = Some(adv.source);
                    self.master_down_at = deadline(now, self.master_down_interval());
                    self.preempt_at = None;
                } else if self.config.preempt_delay == 0 {
                    self.become_master();
                } else {
                    // lower priority master, preempt once the delay is over
                    self.master_address = Some(adv.source);
                    self.master_down_at = deadline(now, self.master_down_interval());
                    if self.preempt_at.is_none() {
                        self.preempt_at = deadline(now, self.config.preempt_delay());
                    }
                }
            }
        }
    }

    /// Fire the master-down and preempt timers. Returns true if the group became master.
    pub fn expire_timers(&mut self, now: Instant) -> bool {
        if self.state != VrrpState::Backup {
            return false;
        }
        let preempt = self.preempt_at.map(|t| now >= t).unwrap_or(false);
        let master_down = self.master_down_at.map(|t| now >= t).unwrap_or(false);
        if preempt || master_down {
            self.become_master();
            true
        } else {
            false
        }
    }

    /// Emit an advertisement if the group is master and the interval elapsed.
    pub fn advertise(&mut self, now: Instant) -> Option<VrrpAdvertisement> {
        if self.state != VrrpState::Master {
            return None;
        }
        let due = self.last_advert_sent.map(|t| now.saturating_duration_since(t) >= self.config.interval()).unwrap_or(true);
        if !due {
            return None;
        }
        self.last_advert_sent = Some(now);
        self.advertisement(self.effective_priority(), now)
    }

    fn advertisement(&mut self, priority: u8, now: Instant) -> Option<VrrpAdvertisement> {
        let source = self.primary_address?;
        self.stats.adverts_sent += 1;
        Some(VrrpAdvertisement {
            group_id: self.config.group_id,
            priority,
            source,
            virtual_ip: self.config.virtual_ip,
            interface: self.config.interface.clone(),
            interval: self.config.advertisement_interval,
            sent_at: now,
        })
    }
}

/// `now + after`, or no deadline at all if that is not representable.
fn deadline(now: Instant, after: Duration) -> Option<Instant> {
    now.checked_add(after)
}
