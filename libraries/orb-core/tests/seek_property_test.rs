//! Property-based tests for the seek index
//!
//! Uses proptest to verify lookup invariants across random seek tables.

use orb_core::{SeekIndex, SeekPoint};
use proptest::prelude::*;

// ===== Helpers =====

/// Strictly increasing seek table starting at byte 0
fn arbitrary_seek_table() -> impl Strategy<Value = Vec<SeekPoint>> {
    (
        0u64..5_000,
        prop::collection::vec((1u64..3_000, 1u64..100_000), 0..200),
    )
        .prop_map(|(first_time, steps)| {
            let mut points = vec![SeekPoint::new(first_time, 0)];
            let (mut t, mut o) = (first_time, 0);
            for (dt, dofs) in steps {
                t += dt;
                o += dofs;
                points.push(SeekPoint::new(t, o));
            }
            points
        })
}

// ===== Property Tests =====

proptest! {
    /// Property: lookups are monotonic in time
    #[test]
    fn offset_for_time_is_monotonic(
        table in arbitrary_seek_table(),
        t1 in 0u64..700_000,
        t2 in 0u64..700_000,
    ) {
        let index = SeekIndex::new(table).unwrap();
        let (lo, hi) = if t1 <= t2 { (t1, t2) } else { (t2, t1) };
        prop_assert!(index.offset_for_time(lo) <= index.offset_for_time(hi));
    }

    /// Property: the result is always an offset present in the table, and
    /// it is the greatest entry not after the requested time
    #[test]
    fn offset_for_time_matches_linear_scan(
        table in arbitrary_seek_table(),
        t in 0u64..700_000,
    ) {
        let expected = table
            .iter()
            .rev()
            .find(|p| p.time_ms <= t)
            .map(|p| p.byte_offset)
            .unwrap_or(0);

        let index = SeekIndex::new(table).unwrap();
        prop_assert_eq!(index.offset_for_time(t), expected);
    }

    /// Property: anything past the last entry resolves to the last offset
    #[test]
    fn past_end_resolves_to_last_offset(
        table in arbitrary_seek_table(),
        extra in 0u64..1_000_000,
    ) {
        let last = *table.last().unwrap();
        let index = SeekIndex::new(table).unwrap();
        prop_assert_eq!(index.offset_for_time(last.time_ms + extra), last.byte_offset);
    }
}
