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

//! Test BGP sessions, route exchange and best path selection.

use super::run_for;
use crate::config::StaticRouteConfig;
use crate::device::{DeviceLog, Interface, RouteOwner, RouteProtocol};
use crate::protocols::bgp::{BgpConfig, BgpNeighborConfig, BgpPeerState, BgpProtocol, Origin};
use crate::protocols::ospf::{OspfArea, OspfConfig};
use crate::protocols::{Protocol, TickContext};
use crate::types::{AsId, DeviceId, Ipv4Prefix, Vendor};
use crate::NetworkTopology;

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

fn ip(a: u8, b: u8, c: u8, d: u8) -> Ipv4Addr {
    Ipv4Addr::new(a, b, c, d)
}

fn p(s: &str) -> Ipv4Prefix {
    s.parse().unwrap()
}

/// Add a router running BGP. Every interface is a /24.
fn bgp_router(
    net: &mut NetworkTopology,
    name: &str,
    asn: u32,
    interfaces: &[(&str, Ipv4Addr)],
    neighbors: &[(Ipv4Addr, u32)],
    networks: &[&str],
) -> DeviceId {
    let id = net.add_device(name, Vendor::Cisco).unwrap();
    let device = net.get_device_mut(id).unwrap();
    for (iface, addr) in interfaces {
        device.add_interface(Interface::new(*iface, *addr, 24)).unwrap();
    }
    let mut config = BgpConfig::new(AsId(asn));
    for (addr, remote_as) in neighbors {
        config = config.neighbor(BgpNeighborConfig::new(*addr, AsId(*remote_as)));
    }
    for n in networks {
        config = config.network(p(n));
    }
    device.set_bgp_configuration(Some(config)).unwrap();
    id
}

/// R1 (AS `as1`) and R2 (AS `as2`), R2 announces 192.168.2.0/24
fn pair(as1: u32, as2: u32) -> (NetworkTopology, DeviceId, DeviceId) {
    let mut net = NetworkTopology::new();
    let r1 = bgp_router(
        &mut net,
        "R1",
        as1,
        &[("eth0", ip(10, 0, 0, 1)), ("lo", ip(192, 168, 1, 1))],
        &[(ip(10, 0, 0, 2), as2)],
        &["192.168.1.0/24"],
    );
    let r2 = bgp_router(
        &mut net,
        "R2",
        as2,
        &[("eth0", ip(10, 0, 0, 2)), ("lo", ip(192, 168, 2, 1))],
        &[(ip(10, 0, 0, 1), as1)],
        &["192.168.2.0/24"],
    );
    net.add_link(r1, "eth0", r2, "eth0").unwrap();
    (net, r1, r2)
}

fn peer_state(net: &NetworkTopology, id: DeviceId, peer: Ipv4Addr) -> Option<BgpPeerState> {
    net.get_device(id).unwrap().bgp().unwrap().peer(peer).map(|p| p.state)
}

fn bgp_routes(net: &NetworkTopology, id: DeviceId) -> Vec<(Ipv4Prefix, RouteProtocol, Option<Ipv4Addr>)> {
    net.get_device(id)
        .unwrap()
        .get_routing_table()
        .routes_by_protocol(RouteOwner::Bgp)
        .iter()
        .map(|r| (r.prefix(), r.protocol(), r.next_hop()))
        .collect()
}

#[test]
fn test_session_establishment() {
    let (mut net, r1, r2) = pair(1, 2);
    let mut now = Instant::now();

    let mut states = Vec::new();
    for _ in 0..5 {
        run_for(&mut net, &mut now, 1);
        states.push(peer_state(&net, r1, ip(10, 0, 0, 2)));
        if states.len() < 5 {
            assert!(bgp_routes(&net, r1).is_empty());
        }
    }
    assert_eq!(
        states,
        vec![
            Some(BgpPeerState::Connect),
            Some(BgpPeerState::Active),
            Some(BgpPeerState::OpenSent),
            Some(BgpPeerState::OpenConfirm),
            Some(BgpPeerState::Established),
        ]
    );
    assert_eq!(peer_state(&net, r2, ip(10, 0, 0, 1)), Some(BgpPeerState::Established));

    // the route is learned in the tick the session comes up
    assert_eq!(bgp_routes(&net, r1), vec![(p("192.168.2.0/24"), RouteProtocol::Ebgp, Some(ip(10, 0, 0, 2)))]);
    let route = net.get_device(r1).unwrap().get_routing_table().lookup(ip(192, 168, 2, 7)).unwrap();
    assert_eq!(route.admin_distance(), 20);
    assert_eq!(route.interface(), Some("eth0"));
    assert!(net.get_device(r1).unwrap().log().contains("session with 10.0.0.2 (AS 2) established"));
}

#[test]
fn test_established_sets_policy_changed() {
    // no networks, such that only the session itself changes the state
    let mut net = NetworkTopology::new();
    let r1 = bgp_router(&mut net, "R1", 1, &[("eth0", ip(10, 0, 0, 1))], &[(ip(10, 0, 0, 2), 2)], &[]);
    let r2 = bgp_router(&mut net, "R2", 2, &[("eth0", ip(10, 0, 0, 2))], &[(ip(10, 0, 0, 1), 1)], &[]);
    net.add_link(r1, "eth0", r2, "eth0").unwrap();

    let snapshot = net.snapshot();
    let device = net.get_device(r1).unwrap();
    let mut bgp = BgpProtocol::new();
    bgp.configure(device.get_bgp_configuration(), device.get_all_interfaces()).unwrap();
    let mut log = DeviceLog::new("R1");
    let mut now = Instant::now();

    for _ in 0..5 {
        now += Duration::from_secs(1);
        bgp.state_mut().finish_calculation(now);
        let ctx = TickContext {
            device_id: r1,
            device_name: device.name(),
            interfaces: device.get_all_interfaces(),
            routing_table: device.get_routing_table(),
            snapshot: &snapshot,
            now,
        };
        bgp.update_neighbors(&ctx, &mut log);
    }
    assert_eq!(bgp.peer(ip(10, 0, 0, 2)).unwrap().state, BgpPeerState::Established);
    assert!(bgp.state().is_policy_changed());
    assert!(!bgp.state().is_topology_changed());
}

#[test]
fn test_counters_and_keepalives() {
    let (mut net, r1, _r2) = pair(1, 2);
    let mut now = Instant::now();
    run_for(&mut net, &mut now, 5);

    let peer = net.get_device(r1).unwrap().bgp().unwrap().peer(ip(10, 0, 0, 2)).unwrap().clone();
    assert_eq!(peer.msgs_sent, 3);
    assert_eq!(peer.msgs_received, 4);
    assert_eq!(peer.prefixes_received, 1);
    assert_eq!(peer.uptime(now), Some(std::time::Duration::from_secs(0)));
    assert!(!peer.is_ibgp);

    run_for(&mut net, &mut now, 60);
    let peer = net.get_device(r1).unwrap().bgp().unwrap().peer(ip(10, 0, 0, 2)).unwrap().clone();
    assert_eq!(peer.msgs_sent, 4);
    assert_eq!(peer.msgs_received, 5);
    assert_eq!(peer.uptime(now), Some(std::time::Duration::from_secs(60)));
    assert_eq!(peer.flaps, 0);
}

#[test]
fn test_loop_prevention() {
    let (mut net, r1, r2) = pair(1, 2);
    let mut now = Instant::now();
    run_for(&mut net, &mut now, 10);

    // R2 advertises the prefix of R1 back, with AS path 2 1
    let bgp2 = net.get_device(r2).unwrap().bgp().unwrap();
    assert_eq!(bgp2.best_routes()[&p("192.168.1.0/24")].as_path, vec![AsId(1)]);
    let bgp1 = net.get_device(r1).unwrap().bgp().unwrap();
    assert!(bgp1.rib_in().keys().all(|(prefix, _)| *prefix != p("192.168.1.0/24")));
    assert_eq!(bgp1.rib_in().len(), 1);
    assert_eq!(bgp1.local_routes().len(), 1);
    assert_eq!(bgp1.local_routes()[&p("192.168.1.0/24")].origin, Origin::Igp);
}

#[test]
fn test_unreachable_peer_goes_idle() {
    let (mut net, r1, _r2) = pair(1, 2);
    let mut now = Instant::now();
    run_for(&mut net, &mut now, 6);
    assert_eq!(bgp_routes(&net, r1).len(), 1);

    net.link_down(r1, "eth0").unwrap();
    run_for(&mut net, &mut now, 1);
    assert_eq!(peer_state(&net, r1, ip(10, 0, 0, 2)), Some(BgpPeerState::Idle));
    assert!(bgp_routes(&net, r1).is_empty());
    let d1 = net.get_device(r1).unwrap();
    assert_eq!(d1.bgp().unwrap().peer(ip(10, 0, 0, 2)).unwrap().flaps, 1);
    assert!(d1.log().contains("peer 10.0.0.2 unreachable"));

    // stays idle while unreachable
    run_for(&mut net, &mut now, 5);
    assert_eq!(peer_state(&net, r1, ip(10, 0, 0, 2)), Some(BgpPeerState::Idle));

    net.link_up(r1, "eth0").unwrap();
    run_for(&mut net, &mut now, 5);
    assert_eq!(peer_state(&net, r1, ip(10, 0, 0, 2)), Some(BgpPeerState::Established));
    assert_eq!(bgp_routes(&net, r1).len(), 1);
}

#[test]
fn test_as_path_over_chain() {
    let mut net = NetworkTopology::new();
    let r1 = bgp_router(&mut net, "R1", 1, &[("eth0", ip(10, 0, 12, 1))], &[(ip(10, 0, 12, 2), 2)], &[]);
    let r2 = bgp_router(
        &mut net,
        "R2",
        2,
        &[("eth0", ip(10, 0, 12, 2)), ("eth1", ip(10, 0, 23, 2))],
        &[(ip(10, 0, 12, 1), 1), (ip(10, 0, 23, 3), 3)],
        &[],
    );
    let r3 = bgp_router(
        &mut net,
        "R3",
        3,
        &[("eth0", ip(10, 0, 23, 3)), ("lo", ip(192, 168, 3, 1))],
        &[(ip(10, 0, 23, 2), 2)],
        &["192.168.3.0/24"],
    );
    net.add_link(r1, "eth0", r2, "eth0").unwrap();
    net.add_link(r2, "eth1", r3, "eth0").unwrap();

    let mut now = Instant::now();
    run_for(&mut net, &mut now, 15);

    let best = &net.get_device(r1).unwrap().bgp().unwrap().best_routes()[&p("192.168.3.0/24")];
    assert_eq!(best.as_path, vec![AsId(2), AsId(3)]);
    assert_eq!(best.as_path_string(), "2 3");
    assert_eq!(best.next_hop, Some(ip(10, 0, 12, 2)));
    assert_eq!(best.peer, Some(ip(10, 0, 12, 2)));
    assert_eq!(bgp_routes(&net, r1), vec![(p("192.168.3.0/24"), RouteProtocol::Ebgp, Some(ip(10, 0, 12, 2)))]);
    // R3 does not install its own prefix
    assert!(bgp_routes(&net, r3).is_empty());
}

#[test]
fn test_local_preference_and_tiebreak() {
    let mut net = NetworkTopology::new();
    let r1 = bgp_router(
        &mut net,
        "R1",
        1,
        &[("eth0", ip(10, 0, 12, 1)), ("eth1", ip(10, 0, 13, 1))],
        &[(ip(10, 0, 12, 2), 2), (ip(10, 0, 13, 3), 3)],
        &[],
    );
    let r2 = bgp_router(
        &mut net,
        "R2",
        2,
        &[("eth0", ip(10, 0, 12, 2)), ("lo", ip(192, 168, 100, 2))],
        &[(ip(10, 0, 12, 1), 1)],
        &["192.168.100.0/24"],
    );
    let r3 = bgp_router(
        &mut net,
        "R3",
        3,
        &[("eth0", ip(10, 0, 13, 3)), ("lo", ip(192, 168, 100, 3))],
        &[(ip(10, 0, 13, 1), 1)],
        &["192.168.100.0/24"],
    );
    net.add_link(r1, "eth0", r2, "eth0").unwrap();
    net.add_link(r1, "eth1", r3, "eth0").unwrap();

    let mut now = Instant::now();
    run_for(&mut net, &mut now, 10);

    // equal attributes: the lower peer address wins
    assert_eq!(net.get_device(r1).unwrap().bgp().unwrap().rib_in().len(), 2);
    assert_eq!(bgp_routes(&net, r1), vec![(p("192.168.100.0/24"), RouteProtocol::Ebgp, Some(ip(10, 0, 12, 2)))]);

    let device = net.get_device_mut(r1).unwrap();
    let mut config = device.get_bgp_configuration().unwrap().clone();
    config.neighbors[1].local_preference = Some(200);
    device.set_bgp_configuration(Some(config)).unwrap();
    run_for(&mut net, &mut now, 2);

    let best = &net.get_device(r1).unwrap().bgp().unwrap().best_routes()[&p("192.168.100.0/24")];
    assert_eq!(best.local_preference, 200);
    assert_eq!(best.peer, Some(ip(10, 0, 13, 3)));
    assert_eq!(bgp_routes(&net, r1), vec![(p("192.168.100.0/24"), RouteProtocol::Ebgp, Some(ip(10, 0, 13, 3)))]);
    // the sessions survived the reconfiguration
    assert_eq!(peer_state(&net, r1, ip(10, 0, 12, 2)), Some(BgpPeerState::Established));
}

#[test]
fn test_ibgp_admin_distance_and_split_horizon() {
    let mut net = NetworkTopology::new();
    let r1 = bgp_router(&mut net, "R1", 65000, &[("eth0", ip(10, 0, 12, 1))], &[(ip(10, 0, 12, 2), 65000)], &[]);
    let r2 = bgp_router(
        &mut net,
        "R2",
        65000,
        &[("eth0", ip(10, 0, 12, 2)), ("eth1", ip(10, 0, 23, 2)), ("lo", ip(192, 168, 2, 1))],
        &[(ip(10, 0, 12, 1), 65000), (ip(10, 0, 23, 3), 65000)],
        &["192.168.2.0/24"],
    );
    let r3 = bgp_router(
        &mut net,
        "R3",
        65000,
        &[("eth0", ip(10, 0, 23, 3)), ("lo", ip(192, 168, 3, 1))],
        &[(ip(10, 0, 23, 2), 65000)],
        &["192.168.3.0/24"],
    );
    net.add_link(r1, "eth0", r2, "eth0").unwrap();
    net.add_link(r2, "eth1", r3, "eth0").unwrap();

    let mut now = Instant::now();
    run_for(&mut net, &mut now, 15);

    assert!(net.get_device(r1).unwrap().bgp().unwrap().peer(ip(10, 0, 12, 2)).unwrap().is_ibgp);
    assert_eq!(bgp_routes(&net, r1), vec![(p("192.168.2.0/24"), RouteProtocol::Ibgp, Some(ip(10, 0, 12, 2)))]);
    let route = net.get_device(r1).unwrap().get_routing_table().lookup(ip(192, 168, 2, 1)).unwrap();
    assert_eq!(route.admin_distance(), 200);
    assert_eq!(route.protocol().code(), "B");
    // R2 learned 192.168.3.0/24 over iBGP, and does not pass it on to R1
    assert_eq!(bgp_routes(&net, r2).len(), 1);
    assert!(net.get_device(r1).unwrap().get_routing_table().lookup(ip(192, 168, 3, 1)).is_none());
}

#[test]
fn test_next_hop_resolved_over_ospf() {
    // R1 and R3 peer over iBGP across R2, which only runs OSPF
    fn ospf(id: DeviceId, net: &mut NetworkTopology, rid: Ipv4Addr, ifaces: &[&str]) {
        let mut config = OspfConfig::with_area(OspfArea::new(0, ifaces.iter().copied()));
        config.router_id = Some(rid);
        net.get_device_mut(id).unwrap().set_ospf_configuration(Some(config)).unwrap();
    }
    let mut net = NetworkTopology::new();
    let r1 = bgp_router(&mut net, "R1", 65000, &[("eth0", ip(10, 0, 12, 1))], &[(ip(10, 0, 23, 3), 65000)], &[]);
    let r2 = net.add_device("R2", Vendor::Juniper).unwrap();
    let d2 = net.get_device_mut(r2).unwrap();
    d2.add_interface(Interface::new("eth0", ip(10, 0, 12, 2), 24)).unwrap();
    d2.add_interface(Interface::new("eth1", ip(10, 0, 23, 2), 24)).unwrap();
    let r3 = bgp_router(
        &mut net,
        "R3",
        65000,
        &[("eth0", ip(10, 0, 23, 3)), ("lo", ip(192, 168, 3, 1))],
        &[(ip(10, 0, 12, 1), 65000)],
        &["192.168.3.0/24"],
    );
    ospf(r1, &mut net, ip(10, 0, 12, 1), &["eth0"]);
    ospf(r2, &mut net, ip(2, 2, 2, 2), &["eth0", "eth1"]);
    ospf(r3, &mut net, ip(10, 0, 23, 3), &["eth0"]);
    net.add_link(r1, "eth0", r2, "eth0").unwrap();
    net.add_link(r2, "eth1", r3, "eth0").unwrap();

    let mut now = Instant::now();
    run_for(&mut net, &mut now, 30);

    assert_eq!(peer_state(&net, r1, ip(10, 0, 23, 3)), Some(BgpPeerState::Established));
    let table = net.get_device(r1).unwrap().get_routing_table();
    let ospf_route = table.lookup(ip(10, 0, 23, 3)).unwrap();
    assert_eq!(ospf_route.protocol(), RouteProtocol::Ospf);
    let bgp_route = table.lookup(ip(192, 168, 3, 1)).unwrap();
    assert_eq!(bgp_route.protocol(), RouteProtocol::Ibgp);
    assert_eq!(bgp_route.next_hop(), Some(ip(10, 0, 23, 3)));
    assert_eq!(bgp_route.interface(), Some("eth0"));
}

#[test]
fn test_refused_session_stays_active() {
    let (mut net, r1, r2) = pair(1, 2);
    // R2 expects a different AS
    let device = net.get_device_mut(r2).unwrap();
    let mut config = device.get_bgp_configuration().unwrap().clone();
    config.neighbors[0].remote_as = AsId(99);
    device.set_bgp_configuration(Some(config)).unwrap();

    let mut now = Instant::now();
    run_for(&mut net, &mut now, 10);
    assert_eq!(peer_state(&net, r1, ip(10, 0, 0, 2)), Some(BgpPeerState::Active));
    assert_eq!(peer_state(&net, r2, ip(10, 0, 0, 1)), Some(BgpPeerState::Active));
    assert!(bgp_routes(&net, r1).is_empty());
}

#[test]
fn test_hold_timer_expires() {
    let (mut net, r1, r2) = pair(1, 2);
    let device = net.get_device_mut(r1).unwrap();
    let mut config = device.get_bgp_configuration().unwrap().clone();
    config.hold_time = 9;
    config.keepalive = 3;
    device.set_bgp_configuration(Some(config)).unwrap();
    net.get_device_mut(r2).unwrap().set_bgp_configuration(Some(BgpConfig::new(AsId(2)))).unwrap();

    let mut now = Instant::now();
    run_for(&mut net, &mut now, 10);
    assert_eq!(peer_state(&net, r1, ip(10, 0, 0, 2)), Some(BgpPeerState::Active));
    run_for(&mut net, &mut now, 1);
    assert_eq!(peer_state(&net, r1, ip(10, 0, 0, 2)), None);
    assert!(net.get_device(r1).unwrap().log().contains("hold timer of peer 10.0.0.2 expired"));
    // the peer is recreated on the next tick
    run_for(&mut net, &mut now, 1);
    assert_eq!(peer_state(&net, r1, ip(10, 0, 0, 2)), Some(BgpPeerState::Connect));
}

#[test]
fn test_neighbor_shutdown() {
    let (mut net, r1, r2) = pair(1, 2);
    let mut now = Instant::now();
    run_for(&mut net, &mut now, 6);

    let device = net.get_device_mut(r1).unwrap();
    let mut config = device.get_bgp_configuration().unwrap().clone();
    config.neighbors[0].shutdown = true;
    device.set_bgp_configuration(Some(config)).unwrap();
    run_for(&mut net, &mut now, 1);

    assert_eq!(peer_state(&net, r1, ip(10, 0, 0, 2)), None);
    assert!(bgp_routes(&net, r1).is_empty());
    assert_eq!(peer_state(&net, r2, ip(10, 0, 0, 1)), Some(BgpPeerState::Idle));
    assert!(bgp_routes(&net, r2).is_empty());
    assert!(net.get_device(r2).unwrap().log().contains("closed the session"));
}

#[test]
fn test_med_and_redistribution() {
    let (mut net, r1, r2) = pair(1, 2);
    let device = net.get_device_mut(r2).unwrap();
    let mut config = device.get_bgp_configuration().unwrap().clone();
    config.neighbors[0].med = Some(50);
    config.redistribute_static = true;
    device.set_bgp_configuration(Some(config)).unwrap();
    device
        .add_static_route(StaticRouteConfig {
            prefix: p("172.16.0.0/16"),
            next_hop: None,
            interface: Some("lo".to_string()),
        })
        .unwrap();

    let mut now = Instant::now();
    run_for(&mut net, &mut now, 8);

    let bgp1 = net.get_device(r1).unwrap().bgp().unwrap();
    assert_eq!(bgp1.best_routes()[&p("192.168.2.0/24")].med, 50);
    assert_eq!(bgp1.best_routes()[&p("172.16.0.0/16")].origin, Origin::Incomplete);
    let table = net.get_device(r1).unwrap().get_routing_table();
    assert_eq!(table.lookup(ip(192, 168, 2, 1)).map(|r| r.metric()), Some(50));
    assert_eq!(table.lookup(ip(172, 16, 0, 1)).map(|r| r.protocol()), Some(RouteProtocol::Ebgp));
}
