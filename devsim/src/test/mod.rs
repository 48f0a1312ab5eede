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

//! Tests of the protocol core. Every test drives the wall clock explicitly (`*_at(now)`), such that
//! timers behave deterministically.

#[cfg(test)]
mod test_bgp;
#[cfg(test)]
mod test_config;
#[cfg(test)]
mod test_topology;

#[cfg(test)]
use crate::NetworkTopology;
#[cfg(test)]
use std::time::{Duration, Instant};

/// Tick the network `n` times, once per second, starting one second after `*now`. `now` is
/// advanced to the time of the last tick.
#[cfg(test)]
pub(crate) fn run_for(net: &mut NetworkTopology, now: &mut Instant, n: u64) {
    for _ in 0..n {
        *now += Duration::from_secs(1);
        net.update_protocols_at(*now);
    }
}

/// Same as [`run_for`], but with a custom step.
#[cfg(test)]
pub(crate) fn run_steps(net: &mut NetworkTopology, now: &mut Instant, n: u64, step: Duration) {
    for _ in 0..n {
        *now += step;
        net.update_protocols_at(*now);
    }
}
