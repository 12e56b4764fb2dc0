// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Operations confined to the slots of a single bucket.
//!
//! Every bucket is kept packed: its occupied slots form a prefix, and the
//! first empty slot marks the end of the data.  Scans stop there, and
//! deletion shifts the tail down rather than leaving a hole.

use crate::entry::AgeClock;
use crate::entry::Entry;
use common::network::MacAddr;

/// Result of probing a bucket for an address.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Probe {
    /// The address is held at this offset.
    FoundAt(usize),
    /// The address is absent and this is the first free offset.
    FirstEmptyAt(usize),
    /// The address is absent and every slot is occupied.
    Full,
}

pub fn find_or_first_empty(bucket: &[Entry], mac: &MacAddr) -> Probe {
    for (offset, entry) in bucket.iter().enumerate() {
        if entry.is_empty() {
            return Probe::FirstEmptyAt(offset);
        }
        if entry.holds(mac) {
            return Probe::FoundAt(offset);
        }
    }
    Probe::Full
}

/// Overwrite a slot in place.  The offset must come from a fresh probe of the
/// same bucket, which guarantees the write does not open a gap.
pub fn insert_or_replace(bucket: &mut [Entry], offset: usize, entry: Entry) {
    debug_assert!(!entry.is_empty());
    debug_assert!(offset == 0 || !bucket[offset - 1].is_empty());
    bucket[offset] = entry;
}

/// Find the learned entry that has gone longest without a refresh.  Static
/// entries are never candidates, so a bucket holding nothing but static
/// entries yields `None`.  Ties go to the lowest offset.
pub fn evict_oldest(bucket: &[Entry], clock: &AgeClock) -> Option<usize> {
    let mut oldest: Option<(usize, u8)> = None;
    for (offset, entry) in bucket.iter().enumerate() {
        if let Entry::Dynamic { timestamp, .. } = entry {
            let age = clock.age_of(*timestamp);
            match oldest {
                Some((_, max)) if age <= max => {}
                _ => oldest = Some((offset, age)),
            }
        }
    }
    oldest.map(|(offset, _)| offset)
}

/// Remove the entry at `offset`, sliding every later entry down one slot.
/// Returns the number of occupied slots left in the bucket.
pub fn delete_at(bucket: &mut [Entry], offset: usize) -> usize {
    if bucket[offset].is_empty() {
        return occupancy(bucket);
    }

    let mut last = offset;
    while last + 1 < bucket.len() && !bucket[last + 1].is_empty() {
        bucket[last] = bucket[last + 1];
        last += 1;
    }
    bucket[last] = Entry::Empty;
    last
}

/// Number of occupied slots.
pub fn occupancy(bucket: &[Entry]) -> usize {
    bucket.iter().take_while(|e| !e.is_empty()).count()
}

/// Check that no empty slot precedes an occupied one.
pub fn is_packed(bucket: &[Entry]) -> bool {
    bucket
        .iter()
        .skip_while(|e| !e.is_empty())
        .all(|e| e.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Priority;
    use common::ports::PortId;
    use common::ports::PortMask;

    fn mac(n: u8) -> MacAddr {
        MacAddr::new(0x02, 0, 0, 0, 0, n)
    }

    fn dynamic(n: u8, timestamp: u8) -> Entry {
        Entry::Dynamic {
            mac: mac(n),
            port: PortId::new(n % 8).unwrap(),
            timestamp,
        }
    }

    fn fixed(n: u8) -> Entry {
        Entry::Static {
            mac: mac(n),
            port_mask: PortMask::from_bits(1),
            priority: Priority::default(),
        }
    }

    fn filled(count: u8) -> Vec<Entry> {
        let mut bucket = vec![Entry::Empty; 8];
        for i in 0..count {
            bucket[usize::from(i)] = dynamic(i + 1, i);
        }
        bucket
    }

    #[test]
    fn test_probe() {
        let bucket = filled(3);
        assert_eq!(find_or_first_empty(&bucket, &mac(2)), Probe::FoundAt(1));
        assert_eq!(
            find_or_first_empty(&bucket, &mac(9)),
            Probe::FirstEmptyAt(3)
        );
        assert_eq!(find_or_first_empty(&filled(8), &mac(9)), Probe::Full);
        assert_eq!(
            find_or_first_empty(&filled(0), &mac(1)),
            Probe::FirstEmptyAt(0)
        );
    }

    #[test]
    fn test_probe_stops_at_first_empty() {
        // A stale copy beyond the end of the data must never be found.
        let mut bucket = filled(2);
        bucket[5] = dynamic(7, 0);
        assert_eq!(
            find_or_first_empty(&bucket, &mac(7)),
            Probe::FirstEmptyAt(2)
        );
    }

    #[test]
    fn test_delete_last() {
        let mut bucket = filled(4);
        assert_eq!(delete_at(&mut bucket, 3), 3);
        assert!(bucket[3].is_empty());
        assert!(is_packed(&bucket));

        let mut full = filled(8);
        assert_eq!(delete_at(&mut full, 7), 7);
        assert!(is_packed(&full));
    }

    #[test]
    fn test_delete_middle_shifts() {
        let mut bucket = filled(5);
        assert_eq!(delete_at(&mut bucket, 1), 4);
        assert!(is_packed(&bucket));
        let macs: Vec<MacAddr> =
            bucket.iter().filter_map(|e| e.mac()).collect();
        assert_eq!(macs, vec![mac(1), mac(3), mac(4), mac(5)]);
    }

    #[test]
    fn test_delete_full_bucket_front() {
        let mut bucket = filled(8);
        assert_eq!(delete_at(&mut bucket, 0), 7);
        assert!(is_packed(&bucket));
        assert_eq!(bucket[0].mac(), Some(mac(2)));
        assert_eq!(bucket[6].mac(), Some(mac(8)));
        assert!(bucket[7].is_empty());
    }

    #[test]
    fn test_delete_empty_slot_is_noop() {
        let mut bucket = filled(2);
        assert_eq!(delete_at(&mut bucket, 4), 2);
        assert_eq!(occupancy(&bucket), 2);
    }

    #[test]
    fn test_evict_oldest() {
        let mut clock = AgeClock::new(8).unwrap();
        for _ in 0..10 {
            clock.advance();
        }
        let mut bucket = filled(8);
        // filled() stamps offset i with time i, so offset 0 is oldest
        assert_eq!(evict_oldest(&bucket, &clock), Some(0));

        // a tie resolves to the lowest offset
        bucket[0] = dynamic(1, 5);
        bucket[4] = dynamic(5, 2);
        bucket[6] = dynamic(7, 2);
        assert_eq!(evict_oldest(&bucket, &clock), Some(1));
        bucket[1] = dynamic(2, 2);
        assert_eq!(evict_oldest(&bucket, &clock), Some(1));
    }

    #[test]
    fn test_evict_oldest_wraps() {
        let mut clock = AgeClock::new(8).unwrap();
        for _ in 0..3 {
            clock.advance();
        }
        // 0xfe was stamped before the counter wrapped, so it is the oldest
        let mut bucket = filled(8);
        for (i, slot) in bucket.iter_mut().enumerate() {
            *slot = dynamic(i as u8 + 1, 2);
        }
        bucket[5] = dynamic(6, 0xfe);
        assert_eq!(evict_oldest(&bucket, &clock), Some(5));
    }

    #[test]
    fn test_evict_skips_static() {
        let clock = AgeClock::new(8).unwrap();
        let mut bucket: Vec<Entry> = (1..=8).map(fixed).collect();
        assert_eq!(evict_oldest(&bucket, &clock), None);
        bucket[3] = dynamic(4, 0);
        assert_eq!(evict_oldest(&bucket, &clock), Some(3));
    }

    #[test]
    fn test_packed() {
        let mut bucket = filled(3);
        assert!(is_packed(&bucket));
        bucket[6] = dynamic(9, 0);
        assert!(!is_packed(&bucket));
    }
}
