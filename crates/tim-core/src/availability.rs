//! Free time detection.
//!
//! Subtracts busy [`Block`]s from a scheduling window and returns the
//! remaining free intervals in time order.

use chrono::{DateTime, Utc};

use crate::schedule::Block;

/// A free `(start, end)` interval.
pub type Interval = (DateTime<Utc>, DateTime<Utc>);

/// Find the free intervals of `[window_start, window_end)` not covered by any
/// block.
///
/// Blocks are applied in start order. Each block cuts every interval it
/// overlaps into at most two remainders, so the result stays sorted and
/// disjoint. Blocks reaching outside the window are clipped implicitly.
pub fn find_availability(
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    blocks: &[Block],
) -> Vec<Interval> {
    let mut sorted: Vec<&Block> = blocks.iter().collect();
    sorted.sort_by_key(|block| block.start);

    let mut available = vec![(window_start, window_end)];

    for block in sorted {
        let mut remaining = Vec::with_capacity(available.len() + 1);
        for (start, end) in available {
            if !block.overlaps(start, end) {
                remaining.push((start, end));
                continue;
            }
            // Left remainder
            if start < block.start {
                remaining.push((start, block.start));
            }
            // Right remainder
            if block.end < end {
                remaining.push((block.end, end));
            }
        }
        available = remaining;
    }

    available
}

/// Total free minutes across a list of intervals.
pub fn free_minutes(intervals: &[Interval]) -> i64 {
    intervals
        .iter()
        .map(|(start, end)| (*end - *start).num_minutes())
        .sum()
}
