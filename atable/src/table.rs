// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! The address table engine.
//!
//! The table is a fixed array of slots split into equal buckets.  A MAC
//! address lives in the bucket chosen by its CRC digest, and every operation
//! touches at most one bucket at a time.  Nothing here blocks or allocates
//! per operation, so callers may hold a lock across any single call.

use slog::debug;
use slog::info;
use slog::o;
use slog::warn;

use crate::bucket;
use crate::bucket::Probe;
use crate::config::TableConfig;
use crate::entry::AgeClock;
use crate::entry::Entry;
use crate::entry::Geometry;
use crate::entry::Priority;
use crate::types::AtableError;
use crate::types::AtableResult;
use common::network::MacAddr;
use common::ports::PortId;
use common::ports::PortMask;

/// What a learning call did to the table.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LearnOutcome {
    /// A new learned entry was written, possibly over an evicted one.
    Inserted,
    /// An existing entry for the address was rewritten with the new port and
    /// timestamp.
    Refreshed,
    /// Nothing was written: either the address is pinned by a protected
    /// static entry, or its bucket holds only static entries.
    Skipped,
}

/// Running statistics for the table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TableUsage {
    /// Total number of slots
    pub size: usize,
    /// Slots currently occupied
    pub occupancy: usize,
    /// Learned entries written into a free or evicted slot
    pub inserts: u64,
    /// Learned entries rewritten in place
    pub refreshes: u64,
    /// Learned entries displaced to make room in a full bucket
    pub evictions: u64,
    /// Learned entries removed by age sweeps
    pub aged: u64,
    /// Learned entries removed by port-scoped deletion
    pub flushed: u64,
    pub static_sets: u64,
    pub static_clears: u64,
    /// Static insertions refused for lack of space
    pub bucket_full: u64,
    /// Learning events dropped because the source was not unicast
    pub learn_ignored: u64,
    /// Learning events that could not be recorded
    pub learn_skipped: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DynamicRecord {
    pub mac: MacAddr,
    pub port: PortId,
    pub timestamp: u8,
    pub age: u8,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaticRecord {
    pub mac: MacAddr,
    pub port_mask: PortMask,
    pub priority: Priority,
}

/// Point-in-time copy of the table contents.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TableDump {
    pub now: u8,
    pub dynamic: Vec<DynamicRecord>,
    pub statics: Vec<StaticRecord>,
}

pub struct Table {
    log: slog::Logger,
    geometry: Geometry,
    slots: Box<[Entry]>,
    clock: AgeClock,
    age_max: u8,
    protect_static: bool,
    // Next bucket visited by a batched sweep
    sweep_cursor: usize,
    usage: TableUsage,
}

impl Table {
    pub fn new(log: &slog::Logger, config: &TableConfig) -> AtableResult<Self> {
        config.validate()?;
        let geometry = config.geometry()?;
        let log = log.new(o!("unit" => "atable"));
        debug!(log, "creating address table";
            "buckets" => geometry.buckets(),
            "entries_per_bucket" => geometry.per_bucket(),
            "timestamp_bits" => config.timestamp_bits,
            "age_max" => config.age_max);

        Ok(Table {
            log,
            geometry,
            slots: vec![Entry::Empty; geometry.slots()].into_boxed_slice(),
            clock: config.clock()?,
            age_max: config.age_max,
            protect_static: config.protect_static,
            sweep_cursor: 0,
            usage: TableUsage {
                size: geometry.slots(),
                ..Default::default()
            },
        })
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    fn bucket(&self, b: usize) -> &[Entry] {
        &self.slots[self.geometry.range(b)]
    }

    fn bucket_mut(&mut self, b: usize) -> &mut [Entry] {
        let range = self.geometry.range(b);
        &mut self.slots[range]
    }

    /// Install or update an operator-configured entry.  A learned entry for
    /// the same address is replaced.  If the bucket has neither a match nor a
    /// free slot the call fails; nothing is evicted to make room.
    pub fn upsert_static(
        &mut self,
        mac: MacAddr,
        port_mask: PortMask,
        priority: Priority,
    ) -> AtableResult<()> {
        let b = self.geometry.bucket_of(&mac);
        let offset = match bucket::find_or_first_empty(self.bucket(b), &mac) {
            Probe::FoundAt(offset) | Probe::FirstEmptyAt(offset) => offset,
            Probe::Full => {
                warn!(self.log, "no room for static entry";
                    "mac" => %mac, "bucket" => b);
                self.usage.bucket_full += 1;
                return Err(AtableError::BucketFull { mac, bucket: b });
            }
        };

        debug!(self.log, "set static entry";
            "mac" => %mac,
            "ports" => %port_mask,
            "priority" => %priority,
            "bucket" => b,
            "offset" => offset);
        bucket::insert_or_replace(
            self.bucket_mut(b),
            offset,
            Entry::Static {
                mac,
                port_mask,
                priority,
            },
        );
        self.usage.static_sets += 1;
        Ok(())
    }

    /// Remove the static entry for `mac`, if there is one.  A learned entry
    /// for the address is left alone.
    pub fn clear_static(&mut self, mac: MacAddr) -> bool {
        let b = self.geometry.bucket_of(&mac);
        match bucket::find_or_first_empty(self.bucket(b), &mac) {
            Probe::FoundAt(offset) if self.bucket(b)[offset].is_static() => {
                debug!(self.log, "cleared static entry";
                    "mac" => %mac, "bucket" => b, "offset" => offset);
                bucket::delete_at(self.bucket_mut(b), offset);
                self.usage.static_clears += 1;
                true
            }
            _ => false,
        }
    }

    /// Record that `mac` was seen arriving on `port` at time `now`.
    ///
    /// A matching entry is rewritten in place, static or not, unless the
    /// table was configured to protect static entries.  When the bucket is
    /// full the learned entry with the greatest age is displaced.
    pub fn learn_or_refresh(
        &mut self,
        mac: MacAddr,
        port: PortId,
        now: u8,
    ) -> LearnOutcome {
        let timestamp = self.clock.truncate(now);
        let b = self.geometry.bucket_of(&mac);
        let entry = Entry::Dynamic {
            mac,
            port,
            timestamp,
        };

        let (offset, outcome) =
            match bucket::find_or_first_empty(self.bucket(b), &mac) {
                Probe::FoundAt(offset) => {
                    let old = self.bucket(b)[offset];
                    if old.is_static() && self.protect_static {
                        debug!(self.log, "not learning over static entry";
                            "mac" => %mac, "port" => %port);
                        self.usage.learn_skipped += 1;
                        return LearnOutcome::Skipped;
                    }
                    if old.dynamic_port() != Some(port) {
                        debug!(self.log, "address moved";
                            "mac" => %mac,
                            "old" => ?old,
                            "port" => %port);
                    }
                    self.usage.refreshes += 1;
                    (offset, LearnOutcome::Refreshed)
                }
                Probe::FirstEmptyAt(offset) => {
                    debug!(self.log, "learned new address";
                        "mac" => %mac,
                        "port" => %port,
                        "bucket" => b,
                        "offset" => offset);
                    self.usage.inserts += 1;
                    (offset, LearnOutcome::Inserted)
                }
                Probe::Full => {
                    let Some(offset) =
                        bucket::evict_oldest(self.bucket(b), &self.clock)
                    else {
                        warn!(self.log, "bucket holds only static entries";
                            "mac" => %mac, "bucket" => b);
                        self.usage.learn_skipped += 1;
                        return LearnOutcome::Skipped;
                    };
                    debug!(self.log, "evicting oldest entry";
                        "victim" => ?self.bucket(b)[offset],
                        "mac" => %mac,
                        "port" => %port,
                        "bucket" => b);
                    self.usage.evictions += 1;
                    self.usage.inserts += 1;
                    (offset, LearnOutcome::Inserted)
                }
            };

        bucket::insert_or_replace(self.bucket_mut(b), offset, entry);
        outcome
    }

    /// Learn `mac` on `port`, stamped with the table's current time.
    pub fn learn(&mut self, mac: MacAddr, port: PortId) -> LearnOutcome {
        let now = self.clock.now();
        self.learn_or_refresh(mac, port, now)
    }

    pub(crate) fn note_ignored(&mut self) {
        self.usage.learn_ignored += 1;
    }

    // Delete every learned entry matching `doomed` from every bucket.  Each
    // bucket is walked from the back so the shifting done by `delete_at` only
    // moves entries that have already been examined.
    fn delete_learned<F>(&mut self, doomed: F) -> usize
    where
        F: Fn(PortId) -> bool,
    {
        let mut deleted = 0;
        for b in 0..self.geometry.buckets() {
            let slots = self.bucket_mut(b);
            for offset in (0..bucket::occupancy(slots)).rev() {
                if slots[offset].dynamic_port().is_some_and(&doomed) {
                    bucket::delete_at(slots, offset);
                    deleted += 1;
                }
            }
            debug_assert!(bucket::is_packed(self.bucket(b)));
        }
        self.usage.flushed += deleted as u64;
        deleted
    }

    /// Forget everything learned on `port`.  Static entries survive.
    pub fn delete_for_port(&mut self, port: PortId) -> usize {
        let deleted = self.delete_learned(|p| p == port);
        info!(self.log, "flushed learned entries";
            "port" => %port, "deleted" => deleted);
        deleted
    }

    /// Forget everything learned on any port other than `port`.
    pub fn delete_for_other_ports(&mut self, port: PortId) -> usize {
        let deleted = self.delete_learned(|p| p != port);
        info!(self.log, "flushed learned entries on other ports";
            "port" => %port, "deleted" => deleted);
        deleted
    }

    /// Remove the learned entries in one bucket whose age exceeds the
    /// configured limit.  Returns the number removed.
    pub fn sweep_bucket_age(&mut self, b: usize) -> usize {
        let clock = self.clock;
        let age_max = self.age_max;
        let mut deleted = 0;

        let slots = self.bucket_mut(b);
        for offset in (0..bucket::occupancy(slots)).rev() {
            if let Entry::Dynamic { timestamp, .. } = slots[offset] {
                if clock.age_of(timestamp) > age_max {
                    bucket::delete_at(slots, offset);
                    deleted += 1;
                }
            }
        }

        if deleted > 0 {
            debug!(self.log, "aged out entries";
                "bucket" => b, "deleted" => deleted, "now" => clock.now());
        }
        self.usage.aged += deleted as u64;
        deleted
    }

    /// Sweep `count` buckets, resuming where the previous batch stopped.
    pub fn sweep_next(&mut self, count: usize) -> usize {
        let buckets = self.geometry.buckets();
        let mut deleted = 0;
        for _ in 0..count.min(buckets) {
            deleted += self.sweep_bucket_age(self.sweep_cursor);
            self.sweep_cursor = (self.sweep_cursor + 1) % buckets;
        }
        deleted
    }

    pub fn sweep_all(&mut self) -> usize {
        (0..self.geometry.buckets())
            .map(|b| self.sweep_bucket_age(b))
            .sum()
    }

    /// The port a learned entry for `mac` forwards to.  Static entries are
    /// not reported here; use `lookup_entry` or a dump to see them.
    pub fn lookup_port(&self, mac: MacAddr) -> Option<PortId> {
        self.lookup_entry(mac).and_then(|e| e.dynamic_port())
    }

    /// The entry holding `mac`, whichever kind it is.
    pub fn lookup_entry(&self, mac: MacAddr) -> Option<Entry> {
        let b = self.geometry.bucket_of(&mac);
        match bucket::find_or_first_empty(self.bucket(b), &mac) {
            Probe::FoundAt(offset) => Some(self.bucket(b)[offset]),
            _ => None,
        }
    }

    /// Move the aging clock forward by one tick.
    pub fn advance_time(&mut self) -> u8 {
        self.clock.advance()
    }

    pub fn now(&self) -> u8 {
        self.clock.now()
    }

    pub fn age_max(&self) -> u8 {
        self.age_max
    }

    pub fn set_age_max(&mut self, age_max: u8) -> AtableResult<()> {
        if age_max >= self.clock.max() {
            return Err(AtableError::InvalidConfig(format!(
                "age_max {age_max} must be below {}",
                self.clock.max()
            )));
        }
        info!(self.log, "updated age limit";
            "old" => self.age_max, "new" => age_max);
        self.age_max = age_max;
        Ok(())
    }

    pub fn dump(&self) -> TableDump {
        let mut dump = TableDump {
            now: self.clock.now(),
            ..Default::default()
        };
        for b in 0..self.geometry.buckets() {
            for entry in self.bucket(b).iter().take_while(|e| !e.is_empty()) {
                match *entry {
                    Entry::Dynamic {
                        mac,
                        port,
                        timestamp,
                    } => dump.dynamic.push(DynamicRecord {
                        mac,
                        port,
                        timestamp,
                        age: self.clock.age_of(timestamp),
                    }),
                    Entry::Static {
                        mac,
                        port_mask,
                        priority,
                    } => dump.statics.push(StaticRecord {
                        mac,
                        port_mask,
                        priority,
                    }),
                    Entry::Empty => {}
                }
            }
        }
        dump
    }

    /// Empty every slot, static entries included.
    pub fn clear_all(&mut self) {
        info!(self.log, "clearing address table");
        self.slots.fill(Entry::Empty);
        self.sweep_cursor = 0;
    }

    pub fn usage(&self) -> TableUsage {
        TableUsage {
            occupancy: self.slots.iter().filter(|e| !e.is_empty()).count(),
            ..self.usage.clone()
        }
    }

    /// Check that every bucket is packed.
    pub fn is_packed(&self) -> bool {
        (0..self.geometry.buckets()).all(|b| bucket::is_packed(self.bucket(b)))
    }
}
