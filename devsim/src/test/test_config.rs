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

//! Test loading topologies from JSON.

use super::run_for;
use crate::config::{DeviceConfig, StaticRouteConfig, TopologyConfig};
use crate::device::{Interface, RouteOwner};
use crate::protocols::bgp::BgpPeerState;
use crate::protocols::ProtocolKind;
use crate::types::{AsId, ConfigError, DeviceError, NetworkError, Vendor};
use crate::{Error, NetworkTopology};

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::time::Instant;

const PAIR: &str = r#"{
    "devices": [
        {
            "name": "R1",
            "vendor": "cisco",
            "interfaces": [
                { "name": "eth0", "ip_address": "10.0.0.1", "prefix_len": 24 },
                { "name": "lo", "ip_address": "192.168.1.1" }
            ],
            "bgp": {
                "local_as": 65001,
                "neighbors": [ { "address": "10.0.0.2", "remote_as": 65002 } ],
                "networks": [ "192.168.1.0/24" ]
            },
            "static_routes": [ { "prefix": "172.16.0.0/16", "next_hop": "10.0.0.2" } ]
        },
        {
            "name": "R2",
            "interfaces": [
                { "name": "eth0", "ip_address": "10.0.0.2", "prefix_len": 24 },
                { "name": "lo", "ip_address": "192.168.2.1", "prefix_len": 24 }
            ],
            "bgp": {
                "local_as": 65002,
                "neighbors": [ { "address": "10.0.0.1", "remote_as": 65001 } ],
                "networks": [ "192.168.2.0/24" ]
            },
            "vrrp": { "groups": [ { "group_id": 1, "virtual_ip": "10.0.0.254", "interface": "eth0" } ] }
        }
    ],
    "links": [ { "from": "R1", "from_interface": "eth0", "to": "R2", "to_interface": "eth0" } ]
}"#;

#[test]
fn test_parse_with_defaults() {
    let config = TopologyConfig::from_json_str(PAIR).unwrap();
    assert_eq!(config.devices.len(), 2);
    assert_eq!(config.links.len(), 1);

    let r1 = &config.devices[0];
    assert_eq!(r1.vendor, Vendor::Cisco);
    assert_eq!(r1.interfaces[1].prefix_len, 24);
    assert!(r1.interfaces[1].is_up);
    assert!(!r1.interfaces[1].is_shutdown);
    assert!(r1.config.ospf.is_none());
    let bgp = r1.config.bgp.as_ref().unwrap();
    assert!(bgp.enabled);
    assert_eq!(bgp.local_as, AsId(65001));
    assert_eq!((bgp.hold_time, bgp.keepalive), (180, 60));
    assert_eq!(bgp.networks[0].to_string(), "192.168.1.0/24");
    assert!(!bgp.neighbors[0].shutdown);
    assert_eq!(r1.config.static_routes[0].interface, None);

    // vendor defaults to cisco
    let r2 = &config.devices[1];
    assert_eq!(r2.vendor, Vendor::Cisco);
    let group = &r2.config.vrrp.as_ref().unwrap().groups[0];
    assert_eq!((group.priority, group.preempt, group.advertisement_interval), (100, true, 1000));
}

#[test]
fn test_load_and_run() {
    let config = TopologyConfig::from_json_str(PAIR).unwrap();
    let mut net = NetworkTopology::from_config(&config).unwrap();
    assert_eq!(net.num_devices(), 2);
    assert_eq!(net.num_links(), 1);
    let r1 = net.device_id("R1").unwrap();
    let r2 = net.device_id("R2").unwrap();
    assert_eq!(net.get_connected_device(r1, "eth0"), Some((r2, "eth0")));
    assert_eq!(
        net.get_device(r1).unwrap().get_routing_table().routes_by_protocol(RouteOwner::Static).len(),
        1
    );

    let mut now = Instant::now();
    run_for(&mut net, &mut now, 10);
    let bgp = net.get_device(r1).unwrap().bgp().unwrap();
    assert_eq!(bgp.peer(Ipv4Addr::new(10, 0, 0, 2)).unwrap().state, BgpPeerState::Established);
    let learned = net.get_device(r1).unwrap().get_routing_table().routes_by_protocol(RouteOwner::Bgp);
    assert_eq!(learned.len(), 1);
    assert_eq!(learned[0].prefix().to_string(), "192.168.2.0/24");

    // the only VRRP router becomes master
    let vrrp = net.get_device(r2).unwrap().vrrp().unwrap();
    assert!(vrrp.active_virtual_ips().contains(&Ipv4Addr::new(10, 0, 0, 254)));
}

#[test]
fn test_parse_errors() {
    assert!(matches!(TopologyConfig::from_json_str("{"), Err(Error::Json(_))));
    let unknown_vendor = r#"{ "devices": [ { "name": "R1", "vendor": "nokia" } ] }"#;
    assert!(matches!(TopologyConfig::from_json_str(unknown_vendor), Err(Error::Json(_))));
    let bad_prefix = r#"{ "devices": [ { "name": "R1", "static_routes": [ { "prefix": "10.0.0.0/33" } ] } ] }"#;
    assert!(matches!(TopologyConfig::from_json_str(bad_prefix), Err(Error::Json(_))));
    // an empty topology is fine
    assert_eq!(TopologyConfig::from_json_str("{}").unwrap(), TopologyConfig::default());
}

#[test]
fn test_build_errors() {
    let mut config = TopologyConfig::from_json_str(PAIR).unwrap();
    config.links[0].to = "R9".to_string();
    assert_eq!(
        NetworkTopology::from_config(&config).err(),
        Some(NetworkError::DeviceNameNotFound("R9".to_string()))
    );

    let mut config = TopologyConfig::from_json_str(PAIR).unwrap();
    config.links[0].to_interface = "eth5".to_string();
    assert_eq!(
        NetworkTopology::from_config(&config).err(),
        Some(NetworkError::DeviceError(DeviceError::InterfaceNotFound("eth5".to_string())))
    );

    let mut config = TopologyConfig::from_json_str(PAIR).unwrap();
    config.devices[1].name = "R1".to_string();
    assert_eq!(
        NetworkTopology::from_config(&config).err(),
        Some(NetworkError::DuplicateDeviceName("R1".to_string()))
    );

    let mut config = TopologyConfig::from_json_str(PAIR).unwrap();
    config.devices[0].config.bgp.as_mut().unwrap().local_as = AsId(0);
    assert_eq!(
        NetworkTopology::from_config(&config).err(),
        Some(NetworkError::DeviceError(DeviceError::ConfigError(ConfigError::InvalidAsNumber)))
    );

    // linux hosts run BGP, but not VRRP
    let mut config = TopologyConfig::from_json_str(PAIR).unwrap();
    config.devices[1].vendor = Vendor::Linux;
    assert_eq!(
        NetworkTopology::from_config(&config).err(),
        Some(NetworkError::DeviceError(DeviceError::ConfigError(ConfigError::UnsupportedProtocol(
            ProtocolKind::Vrrp,
            Vendor::Linux
        ))))
    );
    config.devices[1].config.vrrp = None;
    let net = NetworkTopology::from_config(&config).unwrap();
    assert_eq!(net.get_device_by_name("R2").unwrap().vendor(), Vendor::Linux);
}

#[test]
fn test_serialize() {
    let config = TopologyConfig::from_json_str(PAIR).unwrap();
    let json = config.to_json_string().unwrap();
    assert!(json.contains("\"vendor\": \"cisco\""));
    assert!(json.contains("\"192.168.2.0/24\""));
    assert_eq!(TopologyConfig::from_json_str(&json).unwrap(), config);
}

#[test]
fn test_from_file() {
    let path = std::env::temp_dir().join(format!("devsim-test-{}.json", std::process::id()));
    std::fs::write(&path, PAIR).unwrap();
    let config = TopologyConfig::from_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(config.devices[0].name, "R1");

    assert!(matches!(TopologyConfig::from_file(&path), Err(Error::Io(_))));
}

#[test]
fn test_device_config_validation() {
    let mut interfaces = BTreeMap::new();
    interfaces.insert("eth0".to_string(), Interface::new("eth0", Ipv4Addr::new(10, 0, 0, 1), 24));

    let mut config = DeviceConfig::default();
    assert_eq!(config.validate(&interfaces), Ok(()));
    config.static_routes.push(StaticRouteConfig {
        prefix: "10.1.0.0/16".parse().unwrap(),
        next_hop: None,
        interface: Some("eth3".to_string()),
    });
    assert_eq!(config.validate(&interfaces), Err(ConfigError::UnknownInterface("eth3".to_string())));
}
