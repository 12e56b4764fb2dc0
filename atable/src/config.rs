// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Tunable settings for the address table and its background workers.

use std::time::Duration;

use serde::Deserialize;

use crate::entry::AgeClock;
use crate::entry::Geometry;
use crate::entry::Priority;
use crate::types::AtableError;
use crate::types::AtableResult;
use common::network::MacAddr;
use common::ports::PortId;
use common::ports::PortMask;

/// Which background task runs the age sweeps.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepMode {
    /// The aging driver sweeps on its own interval.
    #[default]
    Timer,
    /// The learning worker sweeps whenever it notices the clock has moved.
    Learner,
}

/// An operator-configured entry to install at startup.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct StaticConfig {
    pub mac: MacAddr,
    pub ports: Vec<PortId>,
    #[serde(default)]
    pub priority: Priority,
}

impl StaticConfig {
    pub fn port_mask(&self) -> PortMask {
        self.ports.iter().copied().collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TableConfig {
    /// Number of hash buckets.
    pub buckets: usize,

    /// Slots in each bucket.
    pub entries_per_bucket: usize,

    /// Width of the timestamp counter.
    pub timestamp_bits: u8,

    /// Learned entries older than this many ticks are swept.
    pub age_max: u8,

    /// Period of the aging clock.
    pub tick_interval_ms: u64,

    /// Period of the batched sweep when `sweep_mode` is `timer`.
    pub sweep_interval_ms: u64,

    /// Buckets visited by each sweep pass.
    pub sweep_batch: usize,

    pub sweep_mode: SweepMode,

    /// How long the learning worker waits for an event before doing its idle
    /// housekeeping.
    pub learn_poll_ms: u64,

    /// Depth of the learning event queue.
    pub learn_queue_depth: usize,

    /// When set, learning never overwrites a static entry for the same
    /// address.
    pub protect_static: bool,

    pub statics: Vec<StaticConfig>,
}

impl Default for TableConfig {
    fn default() -> Self {
        TableConfig {
            buckets: 256,
            entries_per_bucket: 8,
            timestamp_bits: 8,
            age_max: 150,
            tick_interval_ms: 2000,
            sweep_interval_ms: 500,
            sweep_batch: 32,
            sweep_mode: SweepMode::Timer,
            learn_poll_ms: 250,
            learn_queue_depth: 256,
            protect_static: false,
            statics: Vec::new(),
        }
    }
}

impl TableConfig {
    pub fn from_toml(txt: &str) -> AtableResult<Self> {
        let config: TableConfig = toml::from_str(txt)?;
        config.validate()?;
        Ok(config)
    }

    pub fn geometry(&self) -> AtableResult<Geometry> {
        Geometry::new(self.buckets, self.entries_per_bucket)
    }

    pub fn clock(&self) -> AtableResult<AgeClock> {
        AgeClock::new(self.timestamp_bits)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn learn_poll(&self) -> Duration {
        Duration::from_millis(self.learn_poll_ms)
    }

    pub fn validate(&self) -> AtableResult<()> {
        self.geometry()?;
        let clock = self.clock()?;
        if self.age_max >= clock.max() {
            return Err(AtableError::InvalidConfig(format!(
                "age_max {} must be below {} for a {}-bit timestamp",
                self.age_max,
                clock.max(),
                self.timestamp_bits
            )));
        }
        if self.tick_interval_ms == 0
            || self.sweep_interval_ms == 0
            || self.learn_poll_ms == 0
        {
            return Err(AtableError::InvalidConfig(
                "intervals must be non-zero".into(),
            ));
        }
        if self.sweep_batch == 0 {
            return Err(AtableError::InvalidConfig(
                "sweep_batch must be non-zero".into(),
            ));
        }
        if self.learn_queue_depth == 0 {
            return Err(AtableError::InvalidConfig(
                "learn_queue_depth must be non-zero".into(),
            ));
        }
        for s in self.statics.iter() {
            if s.ports.is_empty() {
                return Err(AtableError::InvalidConfig(format!(
                    "static entry {} has no ports",
                    s.mac
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_are_valid() {
        TableConfig::default().validate().unwrap();
        assert_eq!(TableConfig::from_toml("").unwrap(), TableConfig::default());
    }

    #[test]
    fn test_parse() -> anyhow::Result<()> {
        let txt = r#"
            buckets = 64
            entries_per_bucket = 4
            timestamp_bits = 7
            age_max = 100
            sweep_mode = "learner"
            protect_static = true

            [[statics]]
            mac = "01:80:c2:00:00:0e"
            ports = [0, 1]
            priority = 7

            [[statics]]
            mac = "10-11-12-13-14-15"
            ports = [3]
        "#;
        let config = TableConfig::from_toml(txt)?;
        assert_eq!(config.buckets, 64);
        assert_eq!(config.sweep_mode, SweepMode::Learner);
        assert!(config.protect_static);
        assert_eq!(config.statics.len(), 2);
        assert_eq!(config.statics[0].port_mask().bits(), 0b11);
        assert_eq!(config.statics[0].priority.as_u8(), 7);
        assert_eq!(config.statics[1].priority, Priority::default());
        assert_eq!(
            config.statics[1].mac,
            MacAddr::new(0x10, 0x11, 0x12, 0x13, 0x14, 0x15)
        );
        Ok(())
    }

    #[test]
    fn test_rejects_bad_settings() {
        assert!(TableConfig::from_toml("age_max = 200\ntimestamp_bits = 7")
            .is_err());
        assert!(TableConfig::from_toml("entries_per_bucket = 3").is_err());
        assert!(TableConfig::from_toml("sweep_batch = 0").is_err());
        assert!(TableConfig::from_toml("bogus = 1").is_err());
        assert!(TableConfig::from_toml(
            "[[statics]]\nmac = \"02:00:00:00:00:01\"\nports = [9]"
        )
        .is_err());
        assert!(TableConfig::from_toml(
            "[[statics]]\nmac = \"02:00:00:00:00:01\"\nports = []"
        )
        .is_err());
    }
}
