// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// An EUI-48 MAC address, kept in transmission order.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddr {
    a: [u8; 6],
}

impl From<[u8; 6]> for MacAddr {
    fn from(a: [u8; 6]) -> Self {
        Self { a }
    }
}

impl MacAddr {
    pub const ZERO: Self = MacAddr {
        a: [0, 0, 0, 0, 0, 0],
    };
    pub const BROADCAST: Self = MacAddr {
        a: [0xff, 0xff, 0xff, 0xff, 0xff, 0xff],
    };

    /// Create a new MAC address from octets in transmission order.
    pub const fn new(
        o0: u8,
        o1: u8,
        o2: u8,
        o3: u8,
        o4: u8,
        o5: u8,
    ) -> MacAddr {
        MacAddr {
            a: [o0, o1, o2, o3, o4, o5],
        }
    }

    /// Borrow the six octets in transmission order.
    pub fn octets(&self) -> &[u8; 6] {
        &self.a
    }

    /// Return `true` if `self` is the null MAC address, all zeros.
    pub fn is_null(self) -> bool {
        self == Self::ZERO
    }

    /// Return `true` if the group (I/G) bit of the first octet is set.  This
    /// covers broadcast as well as multicast addresses.
    pub fn is_multicast(self) -> bool {
        self.a[0] & 0x01 != 0
    }

    /// A unicast address is one that may legitimately appear as the source of
    /// a frame, and is therefore eligible for learning.
    pub fn is_unicast(self) -> bool {
        !self.is_multicast() && !self.is_null()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MacError {
    /// Too few octets to be a valid MAC address
    #[error("Too few octets")]
    TooShort,
    /// Too many octets to be a valid MAC address
    #[error("Too many octets")]
    TooLong,
    /// Found an octet with a non-hexadecimal character
    #[error("Invalid octet: {0:?}")]
    InvalidOctet(String),
}

// Both the colon-separated form and the dash-separated form used by switch
// vendors are accepted, but a single address may not mix them.
impl FromStr for MacAddr {
    type Err = MacError;

    fn from_str(s: &str) -> Result<Self, MacError> {
        let sep = if s.contains('-') { '-' } else { ':' };
        let v: Vec<&str> = s.split(sep).collect();

        match v.len().cmp(&6) {
            std::cmp::Ordering::Less => Err(MacError::TooShort),
            std::cmp::Ordering::Greater => Err(MacError::TooLong),
            std::cmp::Ordering::Equal => {
                let mut m = MacAddr::ZERO;
                for (i, octet) in v.iter().enumerate() {
                    if octet.is_empty() || octet.len() > 2 {
                        return Err(MacError::InvalidOctet(octet.to_string()));
                    }
                    m.a[i] = u8::from_str_radix(octet, 16)
                        .map_err(|_| MacError::InvalidOctet(octet.to_string()))?;
                }
                Ok(m)
            }
        }
    }
}

impl TryFrom<String> for MacAddr {
    type Error = MacError;

    fn try_from(s: String) -> Result<Self, MacError> {
        s.parse()
    }
}

impl From<MacAddr> for String {
    fn from(mac: MacAddr) -> String {
        mac.to_string()
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.a[0], self.a[1], self.a[2], self.a[3], self.a[4], self.a[5]
        )
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl From<MacAddr> for [u8; 6] {
    fn from(mac: MacAddr) -> [u8; 6] {
        mac.a
    }
}
