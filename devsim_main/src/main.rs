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

use devsim::config::TopologyConfig;
use devsim::{printer, NetworkTopology, TickLoop};

use clap::{Parser, Subcommand};
use log::*;
use std::error::Error;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

fn main() -> Result<(), Box<dyn Error>> {
    // initialize the env logger
    pretty_env_logger::init();

    // run clap
    let args = CommandLineArguments::parse();

    match args.cmd {
        MainCommand::Check { topology } => {
            let net = load(&topology)?;
            println!("{}: {} devices, {} links", topology, net.num_devices(), net.num_links());
            for device in net.devices() {
                let protocols: Vec<String> = device
                    .protocols()
                    .filter(|p| p.is_active())
                    .map(|p| p.kind().to_string())
                    .collect();
                println!("  {:<12} {:<8?} [{}]", device.name(), device.vendor(), protocols.join(", "));
            }
        }
        MainCommand::Run { topology, ticks, interval_ms, realtime, threads, devices } => {
            let net = load(&topology)?;
            let interval = Duration::from_millis(interval_ms.max(1));
            let (net, now) = if realtime {
                run_realtime(net, ticks, interval)?
            } else {
                run_simulated(net, ticks, interval, threads)
            };
            let names: Vec<String> = if devices.is_empty() {
                net.devices().map(|d| d.name().to_string()).collect()
            } else {
                devices
            };
            for name in names {
                for line in printer::device(net.get_device_by_name(&name)?, now) {
                    println!("{}", line);
                }
                println!();
            }
        }
        MainCommand::Show { topology, device, ticks, interval_ms } => {
            let net = load(&topology)?;
            let (net, now) = run_simulated(net, ticks, Duration::from_millis(interval_ms.max(1)), None);
            for line in printer::device(net.get_device_by_name(&device)?, now) {
                println!("{}", line);
            }
        }
    }
    Ok(())
}

fn load(path: &str) -> Result<NetworkTopology, Box<dyn Error>> {
    info!("Loading topology from {}", path);
    let config = TopologyConfig::from_file(path)?;
    Ok(NetworkTopology::from_config(&config)?)
}

fn total_time(interval: Duration, ticks: u64) -> Duration {
    interval.saturating_mul(u32::try_from(ticks).unwrap_or(u32::MAX))
}

/// Tick the network on a simulated clock, as fast as possible.
fn run_simulated(
    mut net: NetworkTopology,
    ticks: u64,
    interval: Duration,
    threads: Option<usize>,
) -> (NetworkTopology, Instant) {
    let mut now = Instant::now();
    for i in 0..ticks {
        now += interval;
        match threads {
            Some(n) => net.update_protocols_parallel_at(now, Some(n)),
            None => net.update_protocols_at(now),
        }
        debug!("Tick {} done", i + 1);
    }
    info!("Performed {} ticks, simulated time {:?}", ticks, total_time(interval, ticks));
    (net, now)
}

/// Tick the network on a background thread, using the wall clock.
fn run_realtime(
    net: NetworkTopology,
    ticks: u64,
    interval: Duration,
) -> Result<(NetworkTopology, Instant), Box<dyn Error>> {
    let net = Arc::new(Mutex::new(net));
    let tick_loop = TickLoop::spawn(net.clone(), interval);
    thread::sleep(total_time(interval, ticks));
    let performed = tick_loop.stop();
    info!("Performed {} ticks in real time", performed);
    let net = Arc::try_unwrap(net)
        .map_err(|_| "topology is still shared")?
        .into_inner()
        .map_err(|_| "topology lock is poisoned")?;
    Ok((net, Instant::now()))
}

/// Simulate a network of routers running OSPF, BGP and VRRP, described by a JSON topology file.
#[derive(Parser, Debug)]
#[clap(name = "devsim", author = "Tibor Schneider")]
struct CommandLineArguments {
    /// Action to perform
    #[clap(subcommand)]
    cmd: MainCommand,
}

#[derive(Subcommand, Debug)]
enum MainCommand {
    /// Load the topology and report configuration errors
    #[clap(name = "check")]
    Check {
        /// Topology file (JSON)
        topology: String,
    },
    /// Run the simulation and print the state of the devices
    #[clap(name = "run")]
    Run {
        /// Topology file (JSON)
        topology: String,
        /// Number of ticks
        #[clap(short = 'n', long, default_value = "60")]
        ticks: u64,
        /// Time between two ticks, in milliseconds
        #[clap(short = 'i', long, default_value = "1000")]
        interval_ms: u64,
        /// Tick on a background thread using the wall clock, instead of a simulated clock
        #[clap(short = 'r', long)]
        realtime: bool,
        /// Tick the devices in parallel on this many threads
        #[clap(short = 't', long)]
        threads: Option<usize>,
        /// Only print these devices
        #[clap(short = 'd', long = "device")]
        devices: Vec<String>,
    },
    /// Run the simulation and print a single device
    #[clap(name = "show")]
    Show {
        /// Topology file (JSON)
        topology: String,
        /// Name of the device
        device: String,
        /// Number of ticks
        #[clap(short = 'n', long, default_value = "60")]
        ticks: u64,
        /// Time between two ticks, in milliseconds
        #[clap(short = 'i', long, default_value = "1000")]
        interval_ms: u64,
    },
}
