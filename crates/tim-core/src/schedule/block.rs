//! Busy intervals excluded from placement.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// An ephemeral busy interval. Rebuilt every cycle, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Block {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// A block widened by `buffer` on both sides.
    pub fn buffered(start: DateTime<Utc>, end: DateTime<Utc>, buffer: Duration) -> Self {
        Self {
            start: start - buffer,
            end: end + buffer,
        }
    }

    /// Whether this block intersects `[start, end)`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        !(self.start >= end || self.end <= start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap()
    }

    #[test]
    fn buffer_is_symmetric() {
        let block = Block::buffered(at(10, 0), at(11, 0), Duration::minutes(10));
        assert_eq!(block.start, at(9, 50));
        assert_eq!(block.end, at(11, 10));
    }

    #[test]
    fn touching_intervals_do_not_overlap() {
        let block = Block::new(at(10, 0), at(11, 0));
        assert!(!block.overlaps(at(11, 0), at(12, 0)));
        assert!(!block.overlaps(at(9, 0), at(10, 0)));
        assert!(block.overlaps(at(10, 59), at(12, 0)));
    }

    #[test]
    fn zero_length_interval_inside_block_overlaps() {
        let block = Block::new(at(10, 0), at(11, 0));
        assert!(block.overlaps(at(10, 30), at(10, 30)));
        assert!(!block.overlaps(at(10, 0), at(10, 0)));
    }
}
