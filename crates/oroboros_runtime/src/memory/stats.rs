//! # Heap Diagnostics
//!
//! Developer-facing snapshot of the heap. Not part of the allocator's
//! correctness contract.

use std::fmt;

/// Number of power-of-two size classes in [`HeapStats::free_histogram`].
pub const SIZE_CLASSES: usize = 24;

/// Snapshot of the heap state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Bytes the heap may grow to.
    pub limit: usize,
    /// Bytes currently committed.
    pub committed: usize,
    /// End of the highest block ever carved.
    pub high_water: usize,
    /// Number of grow operations on the raw heap.
    pub grow_count: usize,
    /// Blocks in the free list.
    pub free_blocks: usize,
    /// Bytes in the free list.
    pub free_bytes: usize,
    /// Largest free block.
    pub largest_free: usize,
    /// Free blocks per size class: class `i` holds sizes in `[16 << i, 32 << i)`.
    pub free_histogram: [usize; SIZE_CLASSES],
    /// Outstanding allocations.
    pub live_allocations: usize,
    /// Bytes held by outstanding allocations, headers included.
    pub live_bytes: usize,
    /// Highest `live_bytes` ever observed.
    pub peak_live_bytes: usize,
    /// Allocations served since startup.
    pub total_allocations: u64,
}

impl HeapStats {
    /// Size class of a free block.
    #[inline]
    #[must_use]
    pub fn size_class(size: usize) -> usize {
        let granules = (size / 16).max(1);
        (granules.ilog2() as usize).min(SIZE_CLASSES - 1)
    }

    /// Fraction of free bytes outside the largest free block.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fragmentation(&self) -> f64 {
        if self.free_bytes == 0 {
            return 0.0;
        }
        1.0 - self.largest_free as f64 / self.free_bytes as f64
    }
}

impl fmt::Display for HeapStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "┌─ HEAP ──────────────────────────────────────────┐")?;
        writeln!(f, "│ high-water mark:   {:>12} bytes", self.high_water)?;
        writeln!(f, "│ committed:         {:>12} bytes", self.committed)?;
        writeln!(f, "│ limit:             {:>12} bytes", self.limit)?;
        writeln!(f, "│ grow operations:   {:>12}", self.grow_count)?;
        writeln!(f, "│ live allocations:  {:>12}", self.live_allocations)?;
        writeln!(
            f,
            "│ live bytes:        {:>12} (peak {})",
            self.live_bytes, self.peak_live_bytes
        )?;
        writeln!(f, "│ total allocations: {:>12}", self.total_allocations)?;
        writeln!(
            f,
            "│ free blocks:       {:>12} ({} bytes, largest {})",
            self.free_blocks, self.free_bytes, self.largest_free
        )?;
        writeln!(f, "│ fragmentation:     {:>11.1}%", self.fragmentation() * 100.0)?;
        for (class, &count) in self.free_histogram.iter().enumerate() {
            if count > 0 {
                writeln!(f, "│   [{:>8}, {:>8}) x {count}", 16usize << class, 32usize << class)?;
            }
        }
        write!(f, "└─────────────────────────────────────────────────┘")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_classes() {
        assert_eq!(HeapStats::size_class(16), 0);
        assert_eq!(HeapStats::size_class(31), 0);
        assert_eq!(HeapStats::size_class(32), 1);
        assert_eq!(HeapStats::size_class(4096), 8);
        assert_eq!(HeapStats::size_class(usize::MAX), SIZE_CLASSES - 1);
    }

    #[test]
    fn test_fragmentation() {
        let stats = HeapStats {
            free_bytes: 100,
            largest_free: 75,
            ..HeapStats::default()
        };
        assert!((stats.fragmentation() - 0.25).abs() < 1e-9);
        assert!(HeapStats::default().fragmentation().abs() < f64::EPSILON);
    }

    #[test]
    fn test_display_lists_nonempty_classes() {
        let mut stats = HeapStats::default();
        stats.free_histogram[2] = 3;
        let text = stats.to_string();
        assert!(text.contains("[      64,      128) x 3"));
        assert!(!text.contains(") x 0"));
    }
}
