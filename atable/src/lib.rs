// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! MAC address learning and forwarding table for the switch fabric.
//!
//! The engine itself ([`table::Table`]) is a bounded, hash-indexed array of
//! learned and static entries.  [`fabric::Fabric`] wraps it in a lock and is
//! shared by the learning worker ([`learn::learn_loop`]), the aging driver
//! ([`aging::aging_loop`]) and the control plane.

pub mod aging;
pub mod bucket;
pub mod config;
pub mod crc;
pub mod entry;
pub mod fabric;
pub mod learn;
pub mod table;
pub mod types;

pub use config::SweepMode;
pub use config::TableConfig;
pub use entry::Entry;
pub use entry::Priority;
pub use fabric::Fabric;
pub use learn::learn_channel;
pub use learn::LearnEvent;
pub use table::LearnOutcome;
pub use table::TableDump;
pub use types::AtableError;
pub use types::AtableResult;
