// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Switch port identifiers and port sets.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Number of ports on the switch fabric.  Port masks are a single byte wide,
/// so this may not exceed 8.
pub const MAX_PORTS: u8 = 8;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortError {
    #[error("Port {0} is out of range (max {max})", max = MAX_PORTS - 1)]
    OutOfRange(u8),
    #[error("Invalid port: {0:?}")]
    Invalid(String),
}

/// A single switch port, numbered from 0.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub struct PortId(u8);

impl PortId {
    pub fn new(port: u8) -> Result<Self, PortError> {
        if port < MAX_PORTS {
            Ok(PortId(port))
        } else {
            Err(PortError::OutOfRange(port))
        }
    }

    pub fn as_u8(self) -> u8 {
        self.0
    }

    /// Iterate over every port on the switch.
    pub fn all() -> impl Iterator<Item = PortId> {
        (0..MAX_PORTS).map(PortId)
    }
}

impl TryFrom<u8> for PortId {
    type Error = PortError;

    fn try_from(port: u8) -> Result<Self, PortError> {
        PortId::new(port)
    }
}

impl From<PortId> for u8 {
    fn from(port: PortId) -> u8 {
        port.0
    }
}

impl FromStr for PortId {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, PortError> {
        let s = s.trim();
        let s = s.strip_prefix("port").unwrap_or(s);
        s.parse::<u8>()
            .map_err(|_| PortError::Invalid(s.to_string()))
            .and_then(PortId::new)
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "port{}", self.0)
    }
}

/// A set of switch ports, one bit per port.
#[derive(
    Copy,
    Clone,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
pub struct PortMask(u8);

impl PortMask {
    pub const EMPTY: PortMask = PortMask(0);

    pub fn from_bits(bits: u8) -> Self {
        PortMask(bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, port: PortId) -> bool {
        self.0 & (1 << port.as_u8()) != 0
    }

    pub fn insert(&mut self, port: PortId) {
        self.0 |= 1 << port.as_u8();
    }

    pub fn remove(&mut self, port: PortId) {
        self.0 &= !(1 << port.as_u8());
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(self) -> impl Iterator<Item = PortId> {
        PortId::all().filter(move |p| self.contains(*p))
    }
}

impl FromIterator<PortId> for PortMask {
    fn from_iter<I: IntoIterator<Item = PortId>>(iter: I) -> Self {
        let mut mask = PortMask::EMPTY;
        for port in iter {
            mask.insert(port);
        }
        mask
    }
}

// Parses a comma-separated port list such as "0,3,5".
impl FromStr for PortMask {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, PortError> {
        s.split(',')
            .filter(|p| !p.trim().is_empty())
            .map(PortId::from_str)
            .collect()
    }
}

impl fmt::Display for PortMask {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let ports: Vec<String> =
            self.iter().map(|p| p.as_u8().to_string()).collect();
        write!(f, "[{}]", ports.join(","))
    }
}

impl fmt::Debug for PortMask {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PortMask({:#010b})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_bounds() {
        assert!(PortId::new(0).is_ok());
        assert!(PortId::new(MAX_PORTS - 1).is_ok());
        assert_eq!(
            PortId::new(MAX_PORTS),
            Err(PortError::OutOfRange(MAX_PORTS))
        );
    }

    #[test]
    fn test_port_parse() {
        assert_eq!("3".parse::<PortId>().unwrap().as_u8(), 3);
        assert_eq!("port5".parse::<PortId>().unwrap().as_u8(), 5);
        assert!("port".parse::<PortId>().is_err());
        assert!("9".parse::<PortId>().is_err());
    }

    #[test]
    fn test_mask() {
        let mask: PortMask = "0,3,7".parse().unwrap();
        assert_eq!(mask.bits(), 0b1000_1001);
        assert_eq!(mask.len(), 3);
        assert!(mask.contains(PortId::new(3).unwrap()));
        assert!(!mask.contains(PortId::new(4).unwrap()));
        assert_eq!(mask.to_string(), "[0,3,7]");

        let mut m = mask;
        m.remove(PortId::new(0).unwrap());
        assert_eq!(m.bits(), 0b1000_1000);
        assert!("".parse::<PortMask>().unwrap().is_empty());
    }
}
