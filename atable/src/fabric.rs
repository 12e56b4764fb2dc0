// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! The shared handle through which the learning worker, the aging driver and
//! control-plane callers reach the address table.
//!
//! Every method holds the table lock for exactly one engine call, so all
//! operations are linearizable and no caller ever sees a half-written slot.

use std::sync::Mutex;

use slog::debug;
use slog::error;
use slog::info;
use slog::o;

use crate::config::TableConfig;
use crate::entry::Entry;
use crate::entry::Priority;
use crate::table::LearnOutcome;
use crate::table::Table;
use crate::table::TableDump;
use crate::table::TableUsage;
use crate::types::AtableResult;
use common::network::MacAddr;
use common::ports::PortId;
use common::ports::PortMask;

pub struct Fabric {
    pub log: slog::Logger,
    config: TableConfig,
    table: Mutex<Table>,
}

impl Fabric {
    /// Build the table described by `config` and install its static entries.
    /// A static entry that does not fit is reported and skipped.
    pub fn new(log: &slog::Logger, config: TableConfig) -> AtableResult<Self> {
        let log = log.new(o!("unit" => "fabric"));
        let mut table = Table::new(&log, &config)?;

        for s in config.statics.iter() {
            if let Err(e) =
                table.upsert_static(s.mac, s.port_mask(), s.priority)
            {
                error!(log, "failed to install configured static entry";
                    "mac" => %s.mac,
                    "error" => %e);
            }
        }
        info!(log, "address table ready";
            "slots" => table.geometry().slots(),
            "statics" => config.statics.len());

        Ok(Fabric {
            log,
            config,
            table: Mutex::new(table),
        })
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    /// React to a link state change.  When a port goes down everything
    /// learned on it is forgotten.  Returns the number of entries deleted.
    pub fn port_link_changed(&self, port: PortId, is_up: bool) -> usize {
        debug!(self.log, "link state changed";
            "port" => %port, "up" => is_up);
        if is_up {
            0
        } else {
            self.table.lock().unwrap().delete_for_port(port)
        }
    }

    /// Record one observation from the hardware learning logic.  Sources
    /// that cannot be unicast are ignored.
    pub fn learning_event(&self, mac: MacAddr, port: PortId) -> LearnOutcome {
        let mut table = self.table.lock().unwrap();
        if !mac.is_unicast() {
            debug!(self.log, "ignoring non-unicast source";
                "mac" => %mac, "port" => %port);
            table.note_ignored();
            return LearnOutcome::Skipped;
        }
        table.learn(mac, port)
    }

    pub fn static_entry_set(
        &self,
        mac: MacAddr,
        port_mask: PortMask,
        priority: Priority,
    ) -> AtableResult<()> {
        self.table
            .lock()
            .unwrap()
            .upsert_static(mac, port_mask, priority)
    }

    pub fn static_entry_clear(&self, mac: MacAddr) -> bool {
        self.table.lock().unwrap().clear_static(mac)
    }

    pub fn lookup_port(&self, mac: MacAddr) -> Option<PortId> {
        self.table.lock().unwrap().lookup_port(mac)
    }

    pub fn lookup_entry(&self, mac: MacAddr) -> Option<Entry> {
        self.table.lock().unwrap().lookup_entry(mac)
    }

    pub fn dump_table(&self) -> TableDump {
        self.table.lock().unwrap().dump()
    }

    pub fn clear_all(&self) {
        self.table.lock().unwrap().clear_all()
    }

    /// Advance the aging clock, returning the new time.
    pub fn tick(&self) -> u8 {
        self.table.lock().unwrap().advance_time()
    }

    pub fn now(&self) -> u8 {
        self.table.lock().unwrap().now()
    }

    // The lock is taken per bucket so a long pass never holds off the
    // learning path for more than one bucket's worth of work.
    pub fn sweep_next(&self, count: usize) -> usize {
        (0..count)
            .map(|_| self.table.lock().unwrap().sweep_next(1))
            .sum()
    }

    pub fn sweep_all(&self) -> usize {
        let buckets = self.table.lock().unwrap().geometry().buckets();
        self.sweep_next(buckets)
    }

    pub fn set_age_max(&self, age_max: u8) -> AtableResult<()> {
        self.table.lock().unwrap().set_age_max(age_max)
    }

    pub fn usage(&self) -> TableUsage {
        self.table.lock().unwrap().usage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticConfig;
    use crate::types::AtableError;

    fn test_log() -> slog::Logger {
        use slog::Drain;
        let dec =
            slog_term::PlainSyncDecorator::new(slog_term::TestStdoutWriter);
        let drain = slog_term::FullFormat::new(dec).build().fuse();
        slog::Logger::root(drain, slog::o!())
    }

    fn port(p: u8) -> PortId {
        PortId::new(p).unwrap()
    }

    #[test]
    fn test_configured_statics() {
        let mac = MacAddr::new(0x01, 0x80, 0xc2, 0, 0, 0x0e);
        let config = TableConfig {
            statics: vec![StaticConfig {
                mac,
                ports: vec![port(0), port(7)],
                priority: Priority::new(6).unwrap(),
            }],
            ..Default::default()
        };
        let fabric = Fabric::new(&test_log(), config).unwrap();
        let dump = fabric.dump_table();
        assert_eq!(dump.statics.len(), 1);
        assert_eq!(dump.statics[0].port_mask.bits(), 0x81);
        assert_eq!(fabric.lookup_port(mac), None);
    }

    #[test]
    fn test_overflowing_statics_are_skipped() {
        // A single bucket of one slot holds exactly one static entry.
        let statics = (1..=2)
            .map(|i| StaticConfig {
                mac: MacAddr::new(0x02, 0, 0, 0, 0, i),
                ports: vec![port(1)],
                priority: Priority::default(),
            })
            .collect();
        let config = TableConfig {
            buckets: 1,
            entries_per_bucket: 1,
            statics,
            ..Default::default()
        };
        let fabric = Fabric::new(&test_log(), config).unwrap();
        assert_eq!(fabric.dump_table().statics.len(), 1);
        assert_eq!(fabric.usage().bucket_full, 1);

        let err = fabric
            .static_entry_set(
                MacAddr::new(0x02, 0, 0, 0, 0, 3),
                PortMask::from_bits(1),
                Priority::default(),
            )
            .unwrap_err();
        assert!(matches!(err, AtableError::BucketFull { bucket: 0, .. }));
    }

    #[test]
    fn test_ignores_group_sources() {
        let fabric =
            Fabric::new(&test_log(), TableConfig::default()).unwrap();
        let outcome = fabric.learning_event(MacAddr::BROADCAST, port(1));
        assert_eq!(outcome, LearnOutcome::Skipped);
        let outcome = fabric
            .learning_event(MacAddr::new(0x01, 0x00, 0x5e, 0, 0, 1), port(1));
        assert_eq!(outcome, LearnOutcome::Skipped);
        assert_eq!(fabric.usage().learn_ignored, 2);
        assert_eq!(fabric.usage().occupancy, 0);
    }

    #[test]
    fn test_link_down_flushes_port() {
        let fabric =
            Fabric::new(&test_log(), TableConfig::default()).unwrap();
        let a = MacAddr::new(0x02, 0, 0, 0, 0, 1);
        let b = MacAddr::new(0x02, 0, 0, 0, 0, 2);
        fabric.learning_event(a, port(1));
        fabric.learning_event(b, port(2));

        assert_eq!(fabric.port_link_changed(port(1), true), 0);
        assert_eq!(fabric.lookup_port(a), Some(port(1)));

        assert_eq!(fabric.port_link_changed(port(1), false), 1);
        assert_eq!(fabric.lookup_port(a), None);
        assert_eq!(fabric.lookup_port(b), Some(port(2)));
    }

    #[test]
    fn test_static_round_trip() {
        let fabric =
            Fabric::new(&test_log(), TableConfig::default()).unwrap();
        let mac = MacAddr::new(0x02, 0x10, 0x20, 0x30, 0x40, 0x50);
        fabric.learning_event(mac, port(3));
        fabric
            .static_entry_set(
                mac,
                PortMask::from_bits(0x0c),
                Priority::new(3).unwrap(),
            )
            .unwrap();

        let dump = fabric.dump_table();
        let statics: Vec<_> =
            dump.statics.iter().filter(|s| s.mac == mac).collect();
        assert_eq!(statics.len(), 1);
        assert_eq!(statics[0].port_mask.bits(), 0x0c);
        assert_eq!(statics[0].priority.as_u8(), 3);
        assert!(dump.dynamic.iter().all(|d| d.mac != mac));

        assert!(fabric.static_entry_clear(mac));
        assert_eq!(fabric.lookup_entry(mac), None);
    }

    #[test]
    fn test_sweep_all_through_fabric() {
        let fabric = Fabric::new(
            &test_log(),
            TableConfig {
                age_max: 2,
                ..Default::default()
            },
        )
        .unwrap();
        for i in 0..10 {
            fabric.learning_event(MacAddr::new(0x02, 0, 0, 1, 0, i), port(0));
        }
        fabric.tick();
        fabric.tick();
        assert_eq!(fabric.sweep_all(), 0);
        fabric.tick();
        assert_eq!(fabric.sweep_all(), 10);
    }
}
