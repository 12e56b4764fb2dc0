// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Slot storage: the contents of a single table slot, the shape of the slot
//! array, and the wrapping clock used to timestamp learned entries.

use std::fmt;
use std::ops::Range;

use serde::Deserialize;

use crate::crc::mac_digest;
use crate::types::AtableError;
use crate::types::AtableResult;
use common::network::MacAddr;
use common::ports::PortId;
use common::ports::PortMask;

/// Forwarding priority attached to a static entry.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Deserialize,
)]
#[serde(try_from = "u8")]
pub struct Priority(u8);

impl Priority {
    pub const MAX: u8 = 7;

    pub fn new(prio: u8) -> AtableResult<Self> {
        if prio <= Self::MAX {
            Ok(Priority(prio))
        } else {
            Err(AtableError::InvalidConfig(format!(
                "priority {prio} exceeds {}",
                Self::MAX
            )))
        }
    }

    pub fn as_u8(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Priority {
    type Error = AtableError;

    fn try_from(prio: u8) -> AtableResult<Self> {
        Priority::new(prio)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One slot of the address table.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Entry {
    #[default]
    Empty,
    /// Learned from traffic; subject to aging and eviction.
    Dynamic {
        mac: MacAddr,
        port: PortId,
        timestamp: u8,
    },
    /// Configured by the operator; never aged or evicted.
    Static {
        mac: MacAddr,
        port_mask: PortMask,
        priority: Priority,
    },
}

impl Entry {
    pub fn is_empty(&self) -> bool {
        matches!(self, Entry::Empty)
    }

    pub fn is_static(&self) -> bool {
        matches!(self, Entry::Static { .. })
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Entry::Dynamic { .. })
    }

    pub fn mac(&self) -> Option<MacAddr> {
        match self {
            Entry::Empty => None,
            Entry::Dynamic { mac, .. } | Entry::Static { mac, .. } => Some(*mac),
        }
    }

    /// The egress port of a learned entry.  Static entries forward to a port
    /// set rather than a single port, and report `None`.
    pub fn dynamic_port(&self) -> Option<PortId> {
        match self {
            Entry::Dynamic { port, .. } => Some(*port),
            _ => None,
        }
    }

    pub fn holds(&self, addr: &MacAddr) -> bool {
        self.mac().as_ref() == Some(addr)
    }
}

/// The shape of the slot array: `buckets` groups of `per_bucket` contiguous
/// slots.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Geometry {
    buckets: usize,
    per_bucket: usize,
}

impl Geometry {
    pub const MAX_BUCKETS: usize = 256;
    pub const MAX_PER_BUCKET: usize = 64;

    pub fn new(buckets: usize, per_bucket: usize) -> AtableResult<Self> {
        if buckets == 0 || buckets > Self::MAX_BUCKETS {
            return Err(AtableError::InvalidConfig(format!(
                "bucket count {buckets} not in 1..={}",
                Self::MAX_BUCKETS
            )));
        }
        if !per_bucket.is_power_of_two() || per_bucket > Self::MAX_PER_BUCKET
        {
            return Err(AtableError::InvalidConfig(format!(
                "entries per bucket {per_bucket} must be a power of two \
                no larger than {}",
                Self::MAX_PER_BUCKET
            )));
        }
        Ok(Geometry {
            buckets,
            per_bucket,
        })
    }

    pub fn buckets(&self) -> usize {
        self.buckets
    }

    pub fn per_bucket(&self) -> usize {
        self.per_bucket
    }

    pub fn slots(&self) -> usize {
        self.buckets * self.per_bucket
    }

    /// The bucket a MAC address hashes into.
    pub fn bucket_of(&self, mac: &MacAddr) -> usize {
        usize::from(mac_digest(mac)) % self.buckets
    }

    /// The slot indices making up a bucket.
    pub fn range(&self, bucket: usize) -> Range<usize> {
        let base = bucket * self.per_bucket;
        base..base + self.per_bucket
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Geometry {
            buckets: 256,
            per_bucket: 8,
        }
    }
}

/// A free-running timestamp counter `bits` wide, advanced by the aging tick.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AgeClock {
    now: u8,
    mask: u8,
}

impl AgeClock {
    pub fn new(bits: u8) -> AtableResult<Self> {
        if bits == 0 || bits > 8 {
            return Err(AtableError::InvalidConfig(format!(
                "timestamp width {bits} not in 1..=8"
            )));
        }
        let mask = ((1u16 << bits) - 1) as u8;
        Ok(AgeClock { now: 0, mask })
    }

    pub fn now(&self) -> u8 {
        self.now
    }

    /// Largest representable timestamp.
    pub fn max(&self) -> u8 {
        self.mask
    }

    pub fn advance(&mut self) -> u8 {
        self.now = self.now.wrapping_add(1) & self.mask;
        self.now
    }

    /// Ticks elapsed since `timestamp`, modulo the counter width.
    pub fn age_of(&self, timestamp: u8) -> u8 {
        self.now.wrapping_sub(timestamp) & self.mask
    }

    /// Reduce an externally supplied time to the counter width.
    pub fn truncate(&self, time: u8) -> u8 {
        time & self.mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_wraps() {
        let mut clock = AgeClock::new(7).unwrap();
        assert_eq!(clock.max(), 0x7f);
        for _ in 0..0x7f {
            clock.advance();
        }
        assert_eq!(clock.now(), 0x7f);
        assert_eq!(clock.advance(), 0);
        assert_eq!(clock.age_of(0x7f), 1);
        assert_eq!(clock.age_of(0x70), 0x10);
    }

    #[test]
    fn test_clock_full_width() {
        let mut clock = AgeClock::new(8).unwrap();
        assert_eq!(clock.max(), 0xff);
        clock.advance();
        clock.advance();
        assert_eq!(clock.age_of(0xfe), 4);
        assert!(AgeClock::new(0).is_err());
        assert!(AgeClock::new(9).is_err());
    }

    #[test]
    fn test_geometry() {
        let g = Geometry::new(256, 8).unwrap();
        assert_eq!(g.slots(), 2048);
        assert_eq!(g.range(3), 24..32);
        let mac = MacAddr::new(0x10, 0x11, 0x12, 0x13, 0x14, 0x15);
        assert_eq!(g.bucket_of(&mac), 0xc2);

        let small = Geometry::new(16, 4).unwrap();
        assert_eq!(small.bucket_of(&mac), 0xc2 % 16);

        assert!(Geometry::new(0, 8).is_err());
        assert!(Geometry::new(257, 8).is_err());
        assert!(Geometry::new(256, 6).is_err());
    }

    #[test]
    fn test_entry_accessors() {
        let mac = MacAddr::new(0x02, 0, 0, 0, 0, 1);
        let port = PortId::new(2).unwrap();
        let d = Entry::Dynamic {
            mac,
            port,
            timestamp: 0,
        };
        let s = Entry::Static {
            mac,
            port_mask: PortMask::from_bits(0x3),
            priority: Priority::new(4).unwrap(),
        };
        assert!(d.holds(&mac) && s.holds(&mac));
        assert_eq!(d.dynamic_port(), Some(port));
        assert_eq!(s.dynamic_port(), None);
        assert!(!Entry::Empty.holds(&mac));
        assert!(Priority::new(8).is_err());
    }
}
