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

//! Test the topology: devices, links, snapshots, and the different ways of ticking it.

use super::run_for;
use crate::device::{Interface, Route, RouteOwner};
use crate::protocols::ospf::{OspfArea, OspfConfig};
use crate::protocols::Protocol;
use crate::types::{DeviceError, DeviceId, Ipv4Prefix, NetworkError, Vendor};
use crate::{NetworkTopology, TickLoop};

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

fn ip(c: u8, d: u8) -> Ipv4Addr {
    Ipv4Addr::new(10, 0, c, d)
}

fn device(net: &mut NetworkTopology, name: &str, interfaces: &[(&str, Ipv4Addr)]) -> DeviceId {
    let id = net.add_device(name, Vendor::Cisco).unwrap();
    for (iface, addr) in interfaces {
        net.get_device_mut(id).unwrap().add_interface(Interface::new(*iface, *addr, 24)).unwrap();
    }
    id
}

fn enable_ospf(net: &mut NetworkTopology, id: DeviceId, router_id: u8) {
    let device = net.get_device_mut(id).unwrap();
    let ifaces: Vec<String> = device.get_all_interfaces().keys().cloned().collect();
    let mut config = OspfConfig::with_area(OspfArea::new(0, ifaces));
    config.router_id = Some(Ipv4Addr::new(router_id, router_id, router_id, router_id));
    device.set_ospf_configuration(Some(config)).unwrap();
}

/// `R1 -- R2 -- R3 -- R4`, running OSPF
fn chain() -> (NetworkTopology, Vec<DeviceId>) {
    let mut net = NetworkTopology::new();
    let r1 = device(&mut net, "R1", &[("eth0", ip(12, 1))]);
    let r2 = device(&mut net, "R2", &[("eth0", ip(12, 2)), ("eth1", ip(23, 2))]);
    let r3 = device(&mut net, "R3", &[("eth0", ip(23, 3)), ("eth1", ip(34, 3))]);
    let r4 = device(&mut net, "R4", &[("eth0", ip(34, 4))]);
    net.add_link(r1, "eth0", r2, "eth0").unwrap();
    net.add_link(r2, "eth1", r3, "eth0").unwrap();
    net.add_link(r3, "eth1", r4, "eth0").unwrap();
    let ids = vec![r1, r2, r3, r4];
    for (i, id) in ids.iter().enumerate() {
        enable_ospf(&mut net, *id, i as u8 + 1);
    }
    (net, ids)
}

fn routes(net: &NetworkTopology, id: DeviceId) -> Vec<Route> {
    net.get_device(id).unwrap().get_routing_table().routes().cloned().collect()
}

#[test]
fn test_devices() {
    let mut net = NetworkTopology::new();
    let r1 = net.add_device("R1", Vendor::Cisco).unwrap();
    let r2 = net.add_device("R2", Vendor::Linux).unwrap();
    assert_eq!(net.add_device("R1", Vendor::Huawei), Err(NetworkError::DuplicateDeviceName("R1".to_string())));
    assert_eq!(net.num_devices(), 2);
    assert_eq!(net.device_ids(), vec![r1, r2]);
    assert_eq!(net.device_id("R2"), Ok(r2));
    assert_eq!(net.get_device_by_name("R1").unwrap().vendor(), Vendor::Cisco);
    assert_eq!(net.device_id("R3"), Err(NetworkError::DeviceNameNotFound("R3".to_string())));

    let removed = net.remove_device(r1).unwrap();
    assert_eq!(removed.name(), "R1");
    assert_eq!(net.num_devices(), 1);
    assert_eq!(net.get_device(r1).err(), Some(NetworkError::DeviceNotFound(r1)));
    assert_eq!(net.remove_device(r1).err(), Some(NetworkError::DeviceNotFound(r1)));
    // the name is free again
    assert!(net.add_device("R1", Vendor::Arista).is_ok());
}

#[test]
fn test_links() {
    let mut net = NetworkTopology::new();
    let r1 = device(&mut net, "R1", &[("eth0", ip(0, 1)), ("eth1", ip(1, 1))]);
    let r2 = device(&mut net, "R2", &[("eth0", ip(0, 2))]);

    assert_eq!(
        net.add_link(r1, "eth0", r2, "eth7"),
        Err(NetworkError::DeviceError(DeviceError::InterfaceNotFound("eth7".to_string())))
    );
    net.add_link(r1, "eth0", r2, "eth0").unwrap();
    assert_eq!(
        net.add_link(r1, "eth1", r2, "eth0"),
        Err(NetworkError::InterfaceAlreadyLinked(r2, "eth0".to_string()))
    );
    assert_eq!(net.num_links(), 1);
    assert_eq!(net.get_connected_device(r1, "eth0"), Some((r2, "eth0")));
    assert_eq!(net.get_connected_device(r2, "eth0"), Some((r1, "eth0")));
    assert_eq!(net.get_connected_device(r1, "eth1"), None);

    let link = net.remove_link(r2, "eth0").unwrap();
    assert!(link.other_end(r1, "eth0").is_some());
    assert_eq!(net.num_links(), 0);
    assert_eq!(net.remove_link(r2, "eth0"), Err(NetworkError::LinkNotFound(r2, "eth0".to_string())));

    // removing a device removes its links
    net.add_link(r1, "eth1", r2, "eth0").unwrap();
    net.remove_device(r2).unwrap();
    assert_eq!(net.num_links(), 0);
    assert_eq!(net.get_connected_device(r1, "eth1"), None);
}

#[test]
fn test_link_state() {
    let mut net = NetworkTopology::new();
    let r1 = device(&mut net, "R1", &[("eth0", ip(0, 1))]);
    let r2 = device(&mut net, "R2", &[("eth0", ip(0, 2))]);
    net.add_link(r1, "eth0", r2, "eth0").unwrap();
    let prefix: Ipv4Prefix = "10.0.0.0/24".parse().unwrap();

    net.link_down(r1, "eth0").unwrap();
    for id in [r1, r2] {
        let device = net.get_device(id).unwrap();
        assert!(!device.get_interface("eth0").unwrap().is_operational());
        assert!(!device.get_routing_table().is_connected(prefix));
        assert!(device.log().contains("interface eth0 changed state to down"));
    }

    net.link_up(r2, "eth0").unwrap();
    for id in [r1, r2] {
        assert!(net.get_device(id).unwrap().get_routing_table().is_connected(prefix));
    }

    let r3 = device(&mut net, "R3", &[("eth0", ip(9, 3))]);
    assert_eq!(net.link_down(r3, "eth0"), Err(NetworkError::LinkNotFound(r3, "eth0".to_string())));
}

#[test]
fn test_snapshot() {
    let mut net = NetworkTopology::new();
    let r1 = device(&mut net, "R1", &[("eth0", ip(0, 1))]);
    let r2 = device(&mut net, "R2", &[("eth0", ip(0, 2))]);
    net.add_link(r1, "eth0", r2, "eth0").unwrap();
    net.stop_device(r2).unwrap();

    let snapshot = net.snapshot();
    assert_eq!(snapshot.devices().count(), 2);
    assert_eq!(snapshot.connected(r1, "eth0"), Some((r2, "eth0")));
    assert_eq!(snapshot.connected(r2, "eth0"), Some((r1, "eth0")));
    assert!(snapshot.device(r1).unwrap().running);
    assert!(!snapshot.device(r2).unwrap().running);
    assert_eq!(snapshot.device(r2).unwrap().name, "R2");
    let (owner, _, iface) = snapshot.find_address_owner(ip(0, 1)).unwrap();
    assert_eq!((owner, iface.name.as_str()), (r1, "eth0"));
    // addresses of stopped devices are not reachable
    assert!(snapshot.find_address_owner(ip(0, 2)).is_none());
    assert!(snapshot.find_address_owner(ip(0, 3)).is_none());

    // the snapshot is detached from the topology
    net.remove_link(r1, "eth0").unwrap();
    assert_eq!(snapshot.connected(r1, "eth0"), Some((r2, "eth0")));
}

#[test]
fn test_stop_and_start_device() {
    let (mut net, ids) = chain();
    let mut now = Instant::now();
    run_for(&mut net, &mut now, 20);
    let r2 = ids[1];
    assert!(!net.get_device(r2).unwrap().get_routing_table().routes_by_protocol(RouteOwner::Ospf).is_empty());

    net.stop_device(r2).unwrap();
    let device = net.get_device(r2).unwrap();
    assert!(!device.is_running());
    assert!(device.get_routing_table().routes_by_protocol(RouteOwner::Ospf).is_empty());
    assert!(device.log().contains("device stopped"));
    let log_len = device.log().len();

    // a stopped device ignores ticks
    run_for(&mut net, &mut now, 5);
    assert_eq!(net.get_device(r2).unwrap().log().len(), log_len);
    assert!(net.get_device(r2).unwrap().ospf().unwrap().state().neighbors().is_empty());

    net.start_device(r2).unwrap();
    let device = net.get_device(r2).unwrap();
    assert!(device.is_running());
    assert!(device.log().contains("device started"));
    assert!(!device.get_routing_table().routes_by_protocol(RouteOwner::Connected).is_empty());
    run_for(&mut net, &mut now, 20);
    assert_eq!(net.get_device(r2).unwrap().get_routing_table().routes_by_protocol(RouteOwner::Ospf).len(), 3);
}

#[test]
fn test_parallel_equals_sequential() {
    let (mut seq, ids) = chain();
    let (mut par, _) = chain();
    let mut now = Instant::now();
    for _ in 0..20 {
        now += Duration::from_secs(1);
        seq.update_protocols_at(now);
        par.update_protocols_parallel_at(now, Some(3));
        for id in ids.iter() {
            assert_eq!(routes(&seq, *id), routes(&par, *id));
        }
    }
    // R1 has a host route to each remote router id
    let ospf = routes(&seq, ids[0]).into_iter().filter(|r| r.protocol().owner() == RouteOwner::Ospf).count();
    assert_eq!(ospf, 3);

    // more threads than devices
    par.update_protocols_parallel_at(now + Duration::from_secs(1), Some(16));
    seq.update_protocols_at(now + Duration::from_secs(1));
    for id in ids.iter() {
        assert_eq!(routes(&seq, *id), routes(&par, *id));
    }
}

#[test]
fn test_parallel_empty_topology() {
    let mut net = NetworkTopology::new();
    net.update_protocols_parallel_at(Instant::now(), None);
    assert_eq!(net.num_devices(), 0);
}

#[test]
fn test_tick_loop() {
    let (net, ids) = chain();
    let net = Arc::new(Mutex::new(net));
    let tick_loop = TickLoop::spawn(net.clone(), Duration::from_millis(5));
    thread::sleep(Duration::from_millis(100));
    assert!(tick_loop.is_running());

    // the topology can be inspected between two ticks
    {
        let net = net.lock().unwrap();
        let ospf = net.get_device(ids[0]).unwrap().ospf().unwrap();
        assert!(ospf.state().last_update().is_some());
    }

    let ticks = tick_loop.stop();
    assert!(ticks > 0);
}

#[test]
fn test_tick_loop_stopper() {
    let (net, _) = chain();
    let tick_loop = TickLoop::spawn(Arc::new(Mutex::new(net)), Duration::from_secs(3600));
    let stopper = tick_loop.stopper();
    stopper.send_stop();
    let deadline = Instant::now() + Duration::from_secs(5);
    while tick_loop.is_running() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert!(!tick_loop.is_running());
    // the stop command may arrive before the first tick
    assert!(tick_loop.stop() <= 1);
}
