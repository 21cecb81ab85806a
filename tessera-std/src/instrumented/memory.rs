//! Memory snapshots for dispatch metrics.

use std::fs;

/// Source of "current memory usage" readings.
///
/// Only differences between two readings are ever recorded, so the absolute
/// baseline does not matter.
pub trait MemoryProbe: Send + Sync + 'static {
    /// Current usage in bytes.
    fn current_bytes(&self) -> u64;
}

/// Resident set size of the current process.
///
/// Reads `/proc/self/statm` and assumes 4 KiB pages. Reports `0` where that
/// file is unavailable, which makes every delta zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessMemory;

const PAGE_SIZE: u64 = 4096;

impl MemoryProbe for ProcessMemory {
    fn current_bytes(&self) -> u64 {
        fs::read_to_string("/proc/self/statm")
            .ok()
            .and_then(|statm| parse_statm(&statm))
            .unwrap_or(0)
    }
}

fn parse_statm(statm: &str) -> Option<u64> {
    let resident = statm.split_whitespace().nth(1)?;
    resident.parse::<u64>().ok().map(|pages| pages * PAGE_SIZE)
}

/// Signed difference between two readings.
pub(crate) fn delta(before: u64, after: u64) -> i64 {
    if after >= before {
        i64::try_from(after - before).unwrap_or(i64::MAX)
    } else {
        i64::try_from(before - after).map_or(i64::MIN, |shrunk| -shrunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statm_resident_pages_become_bytes() {
        assert_eq!(parse_statm("2048 300 120 1 0 400 0\n"), Some(300 * 4096));
        assert_eq!(parse_statm("2048"), None);
        assert_eq!(parse_statm(""), None);
    }

    #[test]
    fn delta_is_signed() {
        assert_eq!(delta(1024, 3072), 2048);
        assert_eq!(delta(3072, 1024), -2048);
        assert_eq!(delta(7, 7), 0);
    }
}
