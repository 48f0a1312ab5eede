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

//! # Helper (printer) functions for devices
//! Module containing helper functions to get formatted strings and print information about the
//! state of a device. Every function returns one `String` per line, such that the caller decides
//! how to present the output.

use crate::device::Device;
use crate::protocols::vrrp::VrrpState;
use crate::protocols::{Protocol, ProtocolSummary};

use std::time::{Duration, Instant};

/// Format a duration as `hh:mm:ss`
fn hms(d: Duration) -> String {
    let s = d.as_secs();
    format!("{:02}:{:02}:{:02}", s / 3600, (s / 60) % 60, s % 60)
}

/// Get the routing table of the device. Routes selected for forwarding are prefixed with `*`.
pub fn routing_table(device: &Device) -> Vec<String> {
    let table = device.get_routing_table();
    let best = table.best_routes();
    table
        .routes()
        .map(|r| {
            let via = match (r.next_hop(), r.interface()) {
                (Some(nh), Some(iface)) => format!("via {}, {}", nh, iface),
                (Some(nh), None) => format!("via {}", nh),
                (None, Some(iface)) => format!("is directly connected, {}", iface),
                (None, None) => String::from("unresolved"),
            };
            format!(
                "{} {:<2} {:<18} [{}/{}] {}",
                if best.contains(&r) { "*" } else { " " },
                r.protocol().code(),
                r.prefix().to_string(),
                r.admin_distance(),
                r.metric(),
                via
            )
        })
        .collect()
}

/// Get the OSPF neighbor table of the device
pub fn ospf_neighbors(device: &Device, now: Instant) -> Vec<String> {
    let ospf = match device.ospf().filter(|p| p.state().is_active()) {
        Some(ospf) => ospf,
        None => return Vec::new(),
    };
    let mut result = vec![format!(
        "{:<16} {:<10} {:<10} {:<16} {:<8} {}",
        "Neighbor ID", "State", "Dead Time", "Address", "Area", "Interface"
    )];
    let dead = ospf.config().map(|c| Duration::from_secs(c.dead_interval)).unwrap_or_default();
    for n in ospf.neighbors().values() {
        let age = now.saturating_duration_since(n.last_activity);
        result.push(format!(
            "{:<16} {:<10} {:<10} {:<16} {:<8} {}",
            n.router_id.to_string(),
            n.state.to_string(),
            hms(dead.saturating_sub(age)),
            n.address.to_string(),
            n.area_id,
            n.interface
        ));
    }
    result
}

/// Get the BGP summary of the device
pub fn bgp_summary(device: &Device, now: Instant) -> Vec<String> {
    let bgp = match device.bgp().filter(|p| p.state().is_active()) {
        Some(bgp) => bgp,
        None => return Vec::new(),
    };
    let mut result = Vec::new();
    if let (Some(asn), Some(rid)) = (bgp.local_as(), bgp.router_id()) {
        result.push(format!("BGP router identifier {}, local AS number {}", rid, asn));
    }
    result.push(format!(
        "{:<16} {:<8} {:>8} {:>8} {:<10} {}",
        "Neighbor", "AS", "MsgRcvd", "MsgSent", "Up/Down", "State/PfxRcd"
    ));
    for peer in bgp.peers().values() {
        let state = if peer.is_established() { peer.prefixes_received.to_string() } else { peer.state.to_string() };
        result.push(format!(
            "{:<16} {:<8} {:>8} {:>8} {:<10} {}",
            peer.address.to_string(),
            peer.remote_as.to_string(),
            peer.msgs_received,
            peer.msgs_sent,
            peer.uptime(now).map(hms).unwrap_or_else(|| String::from("never")),
            state
        ));
    }
    result
}

/// Get the BGP table of the device. The selected route of every prefix is prefixed with `*>`.
pub fn bgp_table(device: &Device) -> Vec<String> {
    let bgp = match device.bgp().filter(|p| p.state().is_active()) {
        Some(bgp) => bgp,
        None => return Vec::new(),
    };
    let best = bgp.best_routes();
    bgp.local_routes()
        .values()
        .chain(bgp.rib_in().values())
        .map(|r| {
            format!(
                "{} {:<18} {:<16} {:>6} {:>6} {} {}",
                if best.get(&r.prefix) == Some(r) { "*>" } else { "* " },
                r.prefix.to_string(),
                r.next_hop.map(|nh| nh.to_string()).unwrap_or_else(|| String::from("0.0.0.0")),
                r.med,
                r.local_preference,
                r.as_path_string(),
                r.origin
            )
        })
        .collect()
}

/// Get the VRRP groups of the device
pub fn vrrp_groups(device: &Device) -> Vec<String> {
    let vrrp = match device.vrrp().filter(|p| p.state().is_active()) {
        Some(vrrp) => vrrp,
        None => return Vec::new(),
    };
    let mut result =
        vec![format!("{:<10} {:<6} {:<4} {:<8} {:<16} {}", "Interface", "Group", "Pri", "State", "Master", "Virtual IP")];
    for g in vrrp.groups().values() {
        result.push(format!(
            "{:<10} {:<6} {:<4} {:<8} {:<16} {}",
            g.config.interface,
            g.group_id(),
            g.effective_priority(),
            g.state.to_string(),
            match (g.state, g.master_address) {
                (VrrpState::Master, _) => String::from("local"),
                (_, Some(m)) => m.to_string(),
                (_, None) => String::from("unknown"),
            },
            g.config.virtual_ip
        ));
    }
    result
}

/// Get the generic summary of a protocol
pub fn protocol_summary(summary: &ProtocolSummary) -> Vec<String> {
    let mut result = vec![format!(
        "{}: {}, {} recomputations, last update {}",
        summary.kind,
        match (summary.enabled, summary.active) {
            (_, true) => "active",
            (true, false) => "enabled, inactive",
            (false, false) => "disabled",
        },
        summary.recomputations,
        summary.last_update_age.map(|d| format!("{:?} ago", d)).unwrap_or_else(|| String::from("never"))
    )];
    result.extend(
        summary
            .neighbors
            .iter()
            .map(|n| format!("  {:<28} {:<12} {:>6.1}s {}", n.key, n.state, n.age.as_secs_f64(), n.detail)),
    );
    result
}

/// Get everything known about a device
pub fn device(device: &Device, now: Instant) -> Vec<String> {
    let mut result = vec![format!(
        "Device {} ({:?}){}",
        device.name(),
        device.vendor(),
        if device.is_running() { "" } else { " [stopped]" }
    )];
    for summary in device.summaries(now) {
        result.extend(protocol_summary(&summary));
    }
    let sections: [(&str, Vec<String>); 5] = [
        ("Routing table", routing_table(device)),
        ("OSPF neighbors", ospf_neighbors(device, now)),
        ("BGP summary", bgp_summary(device, now)),
        ("BGP table", bgp_table(device)),
        ("VRRP", vrrp_groups(device)),
    ];
    for (title, lines) in sections {
        if !lines.is_empty() {
            result.push(String::new());
            result.push(format!("{}:", title));
            result.extend(lines);
        }
    }
    result
}

/// Print the routing table of a device
pub fn print_routing_table(device: &Device) {
    println!("Routing table of {}:", device.name());
    for line in routing_table(device) {
        println!("{}", line);
    }
}

/// Print everything known about a device
pub fn print_device(device: &Device) {
    for line in self::device(device, Instant::now()) {
        println!("{}", line);
    }
}
