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

//! Per-device log sink

use log::Level;
use std::collections::VecDeque;
use std::time::SystemTime;

/// Default number of entries kept in the log
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

/// Single log entry of a device
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// Wall-clock time of the entry
    pub timestamp: SystemTime,
    /// Severity
    pub level: Level,
    /// Message
    pub message: String,
}

/// Bounded log of a device. Every entry is forwarded to the `log` facade as well, prefixed with
/// the device name.
#[derive(Debug, Clone)]
pub struct DeviceLog {
    device: String,
    capacity: usize,
    entries: VecDeque<LogEntry>,
}

impl DeviceLog {
    /// Create an empty log
    pub fn new(device: impl Into<String>) -> Self {
        Self::with_capacity(device, DEFAULT_LOG_CAPACITY)
    }

    /// Create an empty log, keeping at most `capacity` entries.
    pub fn with_capacity(device: impl Into<String>, capacity: usize) -> Self {
        Self { device: device.into(), capacity: capacity.max(1), entries: VecDeque::new() }
    }

    /// Add a new entry. The oldest entry is dropped if the log is full.
    pub fn push(&mut self, level: Level, message: impl Into<String>) {
        let message = message.into();
        log::log!(level, "{}: {}", self.device, message);
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(LogEntry { timestamp: SystemTime::now(), level, message });
    }

    /// Add an informational entry
    pub fn info(&mut self, message: impl Into<String>) {
        self.push(Level::Info, message)
    }

    /// Add a warning
    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(Level::Warn, message)
    }

    /// Add an error
    pub fn error(&mut self, message: impl Into<String>) {
        self.push(Level::Error, message)
    }

    /// Add a debug entry
    pub fn debug(&mut self, message: impl Into<String>) {
        self.push(Level::Debug, message)
    }

    /// Iterate over all entries, oldest first
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if any entry contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.entries.iter().any(|e| e.message.contains(needle))
    }

    /// Remove all entries
    pub fn clear(&mut self) {
        self.entries.clear()
    }
}
