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

//! # Tick Loop
//!
//! Drives [`NetworkTopology::update_protocols`] periodically on a background thread, until it is
//! stopped. The topology is shared behind a mutex, such that the caller can inspect or modify it
//! between two ticks.

use crate::topology::NetworkTopology;
use crate::Stopper;

use log::*;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Longest time the loop sleeps before checking the stop flag again
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Background thread ticking a topology at a fixed interval.
///
/// The loop is stopped either explicitly with [`TickLoop::stop`], by sending the stop command to
/// the [`Stopper`] returned by [`TickLoop::stopper`], or implicitly when the `TickLoop` is
/// dropped.
#[derive(Debug)]
pub struct TickLoop {
    stopper: Stopper,
    handle: Option<JoinHandle<u64>>,
}

impl TickLoop {
    /// Spawn the background thread. The first tick happens right away.
    pub fn spawn(topology: Arc<Mutex<NetworkTopology>>, interval: Duration) -> Self {
        let stopper = Stopper::new();
        let abort = stopper.clone();
        let handle = thread::spawn(move || {
            let mut ticks: u64 = 0;
            while !abort.is_stop() {
                let start = Instant::now();
                match topology.lock() {
                    Ok(mut net) => net.update_protocols(),
                    Err(_) => {
                        error!("Topology lock is poisoned, stopping the tick loop");
                        break;
                    }
                }
                ticks += 1;
                // sleep until the next tick, but keep checking the stop flag
                while !abort.is_stop() {
                    let elapsed = start.elapsed();
                    if elapsed >= interval {
                        break;
                    }
                    thread::sleep((interval - elapsed).min(POLL_INTERVAL));
                }
            }
            debug!("Tick loop stopped after {} ticks", ticks);
            ticks
        });
        info!("Tick loop started with interval {:?}", interval);
        Self { stopper, handle: Some(handle) }
    }

    /// Handle to stop the loop from somewhere else
    pub fn stopper(&self) -> Stopper {
        self.stopper.clone()
    }

    /// Returns true if the background thread is still running
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    /// Stop the loop and wait for the background thread. Returns the number of ticks performed.
    pub fn stop(mut self) -> u64 {
        self.shutdown()
    }

    fn shutdown(&mut self) -> u64 {
        self.stopper.send_stop();
        match self.handle.take().map(|h| h.join()) {
            Some(Ok(ticks)) => ticks,
            Some(Err(_)) => {
                error!("Tick loop thread panicked");
                0
            }
            None => 0,
        }
    }
}

impl Drop for TickLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}
