// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! General types used throughout the address table.

use std::convert;

use common::network::MacAddr;
use common::network::MacError;
use common::ports::PortError;

pub type AtableResult<T> = Result<T, AtableError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AtableError {
    /// A static entry could not be placed: its bucket holds no entry for the
    /// address and has no free slot.
    #[error("Bucket {bucket} is full, cannot add static entry for {mac}")]
    BucketFull { mac: MacAddr, bucket: usize },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid port: {0}")]
    Port(#[from] PortError),
    #[error("Invalid MAC address: {0}")]
    Mac(#[from] MacError),
}

impl convert::From<toml::de::Error> for AtableError {
    fn from(err: toml::de::Error) -> Self {
        AtableError::InvalidConfig(err.to_string())
    }
}
