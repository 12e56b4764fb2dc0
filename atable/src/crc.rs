// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! The 8-bit digest the switch hardware uses to pick an address-table bucket.
//!
//! This is a Galois-field CRC-8 over x^8 + x^2 + x + 1 with a preset of 0x12,
//! fed LSB-first through a 9-bit register.  Unlike a textbook CRC the message
//! is never flushed with eight trailing zero bits, so the result is not the
//! CRC remainder.  Bucket placement must agree with the hardware bit for bit.

use common::network::MacAddr;

const PRESET: u16 = 0x12;
// x^8 + x^2 + x + 1, reflected into the 9-bit feedback register
const FEEDBACK: u16 = 0x1c0;

/// Compute the bucket digest of a MAC address.
pub fn mac_digest(mac: &MacAddr) -> u8 {
    let mut crc = PRESET;
    for octet in mac.octets() {
        let mut data = u16::from(*octet) << 8;
        for _ in 0..8 {
            crc |= data & 0x100;
            if crc & 1 != 0 {
                crc ^= FEEDBACK;
            }
            crc >>= 1;
            data >>= 1;
        }
    }
    (crc & 0xff) as u8
}
