//! # Free-List Allocator
//!
//! First-fit allocator over a [`RawHeap`].
//!
//! ## Algorithm
//!
//! - Free blocks form a singly linked list sorted by address, stored
//!   in-band ([`FreeBlock`]).
//! - `allocate` takes the first block that fits and splits off the rest.
//!   When nothing fits, the high-water mark moves up (absorbing a free block
//!   that touches it) and the raw heap grows if it has to.
//! - `deallocate` inserts at the sorted position and merges with both
//!   neighbours, so no two free blocks are ever adjacent.
//!
//! First-fit keeps short-lived small allocations near the bottom of the
//! heap, which is what the engine loop produces.
//!
//! ## Thread Safety
//!
//! NOT thread-safe. The global heap wraps it in a mutex.

use std::ptr::NonNull;

use crate::config::HeapConfig;
use crate::error::{RuntimeError, RuntimeResult};
use crate::memory::layout::{
    AllocationHeader, FreeBlock, Placement, FREED_MAGIC, FREE_MAGIC, GRANULE, HEADER_SIZE,
    LIVE_MAGIC, MAX_ALIGN, MIN_ALIGN,
};
use crate::memory::raw::RawHeap;
use crate::memory::stats::HeapStats;

/// Offset terminating the free list. The first granule is never a block.
const NIL: usize = 0;

/// A free-list heap allocator.
///
/// # Example
///
/// ```rust
/// use oroboros_runtime::memory::Allocator;
/// use oroboros_runtime::HeapConfig;
///
/// let mut heap = Allocator::new(&HeapConfig::fixed(64 * 1024)).unwrap();
/// let ptr = heap.allocate(100, 16).unwrap();
/// let ptr = heap.reallocate(ptr, 400).unwrap();
/// heap.deallocate(ptr).unwrap();
/// assert_eq!(heap.stats().live_allocations, 0);
/// ```
pub struct Allocator {
    /// Backing memory.
    heap: RawHeap,
    /// First free block, or [`NIL`].
    free_head: usize,
    /// End of the highest block ever carved.
    high_water: usize,
    /// Outstanding allocations.
    live_allocations: usize,
    /// Bytes held by outstanding blocks.
    live_bytes: usize,
    /// Peak of `live_bytes`.
    peak_live_bytes: usize,
    /// Allocations served.
    total_allocations: u64,
}

/// A validated live block.
#[derive(Clone, Copy, Debug)]
struct LiveBlock {
    start: usize,
    header: AllocationHeader,
}

impl LiveBlock {
    #[inline]
    fn size(self) -> usize {
        self.header.size as usize
    }

    #[inline]
    fn padding(self) -> usize {
        self.header.padding as usize
    }

    #[inline]
    fn header_offset(self) -> usize {
        self.start + self.padding()
    }

    #[inline]
    fn user_offset(self) -> usize {
        self.header_offset() + HEADER_SIZE
    }

    #[inline]
    fn usable(self) -> usize {
        self.size() - self.padding() - HEADER_SIZE
    }
}

/// Neighbours of an offset in the free list.
#[derive(Clone, Copy, Debug)]
struct Neighbors {
    /// Last free block below the offset, or [`NIL`].
    prev: usize,
    /// First free block at or above the offset, or [`NIL`].
    next: usize,
}

#[allow(clippy::cast_possible_truncation)]
#[inline]
fn to_u32(value: usize) -> u32 {
    // max_capacity <= u32::MAX is enforced by HeapConfig::validate.
    debug_assert!(u32::try_from(value).is_ok());
    value as u32
}

impl Allocator {
    /// Creates an allocator over fresh backing memory.
    ///
    /// # Errors
    ///
    /// See [`RawHeap::new`].
    pub fn new(config: &HeapConfig) -> RuntimeResult<Self> {
        Ok(Self {
            heap: RawHeap::new(config)?,
            free_head: NIL,
            high_water: GRANULE,
            live_allocations: 0,
            live_bytes: 0,
            peak_live_bytes: 0,
            total_allocations: 0,
        })
    }

    /// Outstanding allocations.
    #[inline]
    #[must_use]
    pub const fn live_allocations(&self) -> usize {
        self.live_allocations
    }

    /// End of the highest block ever carved.
    #[inline]
    #[must_use]
    pub const fn high_water(&self) -> usize {
        self.high_water
    }

    /// Reserves at least `size` bytes aligned to `align`.
    ///
    /// Alignments below [`MIN_ALIGN`] are raised to it. A zero size is
    /// served as one byte.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::InvalidAlignment`] if `align` is not a power of two
    ///   or exceeds [`MAX_ALIGN`].
    /// - [`RuntimeError::OutOfMemory`] if the heap cannot grow far enough.
    ///   The free list is unchanged in that case.
    pub fn allocate(&mut self, size: usize, align: usize) -> RuntimeResult<NonNull<u8>> {
        if !align.is_power_of_two() || align > MAX_ALIGN {
            return Err(RuntimeError::InvalidAlignment(align));
        }
        let align = align.max(MIN_ALIGN);
        let size = size.max(1);
        if size > self.heap.limit() {
            return Err(self.out_of_memory(size));
        }

        let user = match self.take_first_fit(size, align) {
            Some(user) => user,
            None => self.extend(size, align)?,
        };
        Ok(self.heap.ptr_at(user))
    }

    /// Returns a block to the free list.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::InvalidFree`] if `ptr` was not returned by this
    /// allocator or was already freed. Detection relies on header integrity
    /// and is not guaranteed for every corruption.
    pub fn deallocate(&mut self, ptr: NonNull<u8>) -> RuntimeResult<()> {
        let block = self.live_block(ptr)?;
        let size = block.size();
        let neighbors = self.check_insertable(block.start, size)?;

        let mut header = block.header;
        header.magic = FREED_MAGIC;
        self.heap.write(block.header_offset(), header);
        self.link_free(block.start, size, neighbors);

        self.live_allocations -= 1;
        self.live_bytes -= size;
        Ok(())
    }

    /// Resizes an allocation, preserving `min(old, new)` bytes of content.
    ///
    /// Grows in place when the block can absorb a free successor or sits at
    /// the high-water mark; shrinks in place by splitting off the tail.
    /// Otherwise moves. The original alignment is kept.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::InvalidFree`] for an invalid `ptr`,
    /// [`RuntimeError::OutOfMemory`] if a move is needed and fails. The
    /// original allocation stays valid on error.
    pub fn reallocate(&mut self, ptr: NonNull<u8>, new_size: usize) -> RuntimeResult<NonNull<u8>> {
        let block = self.live_block(ptr)?;
        let new_size = new_size.max(1);
        if new_size > self.heap.limit() {
            return Err(self.out_of_memory(new_size));
        }
        let needed = Placement::compute(block.start, new_size, block.header.align as usize).size;

        if needed <= block.size() {
            self.shrink_in_place(block, needed);
            return Ok(ptr);
        }
        if self.grow_in_place(block, needed) {
            tracing::debug!(offset = block.user_offset(), new_size, "reallocated in place");
            return Ok(ptr);
        }

        let moved = self.allocate(new_size, block.header.align as usize)?;
        let dst = self.offset_of(moved);
        self.heap.copy(block.user_offset(), dst, block.usable().min(new_size));
        self.deallocate(ptr)?;
        Ok(moved)
    }

    /// Bytes usable behind a live allocation.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::InvalidFree`] if `ptr` is not a live allocation.
    pub fn usable_size(&self, ptr: NonNull<u8>) -> RuntimeResult<usize> {
        Ok(self.live_block(ptr)?.usable())
    }

    /// Walks the free list and checks every structural invariant.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::HeapCorruption`] naming the first broken invariant.
    pub fn validate(&self) -> RuntimeResult<()> {
        let corrupt = |offset, reason| Err(RuntimeError::HeapCorruption { offset, reason });
        let max_nodes = self.high_water / GRANULE;
        let mut prev_end = NIL;
        let mut current = self.free_head;
        let mut visited = 0;

        while current != NIL {
            visited += 1;
            if visited > max_nodes {
                return corrupt(current, "free list cycle");
            }
            if current % GRANULE != 0 || current < GRANULE {
                return corrupt(current, "misaligned free block");
            }
            if current + GRANULE > self.high_water {
                return corrupt(current, "free block above high-water mark");
            }
            let node: FreeBlock = self.heap.read(current);
            let size = node.size as usize;
            if node.magic != FREE_MAGIC {
                return corrupt(current, "free block magic");
            }
            if size < GRANULE || size % GRANULE != 0 || current + size > self.high_water {
                return corrupt(current, "free block size");
            }
            if prev_end != NIL && current <= prev_end {
                let reason = if current == prev_end {
                    "adjacent free blocks"
                } else {
                    "free list out of order"
                };
                return corrupt(current, reason);
            }
            prev_end = current + size;
            current = node.next as usize;
        }
        Ok(())
    }

    /// Snapshot of the heap state.
    #[must_use]
    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats {
            limit: self.heap.limit(),
            committed: self.heap.committed(),
            high_water: self.high_water,
            grow_count: self.heap.grow_count(),
            live_allocations: self.live_allocations,
            live_bytes: self.live_bytes,
            peak_live_bytes: self.peak_live_bytes,
            total_allocations: self.total_allocations,
            ..HeapStats::default()
        };
        for (_, node) in self.free_blocks() {
            let size = node.size as usize;
            stats.free_blocks += 1;
            stats.free_bytes += size;
            stats.largest_free = stats.largest_free.max(size);
            stats.free_histogram[HeapStats::size_class(size)] += 1;
        }
        stats
    }

    // ------------------------------------------------------------------
    // Free list
    // ------------------------------------------------------------------

    fn free_blocks(&self) -> impl Iterator<Item = (usize, FreeBlock)> + '_ {
        let mut current = self.free_head;
        std::iter::from_fn(move || {
            if current == NIL {
                return None;
            }
            let offset = current;
            let node: FreeBlock = self.heap.read(offset);
            current = node.next as usize;
            Some((offset, node))
        })
    }

    fn write_free(&mut self, offset: usize, size: usize, next: usize) {
        self.heap.write(
            offset,
            FreeBlock {
                size: to_u32(size),
                next: to_u32(next),
                magic: FREE_MAGIC,
                reserved: 0,
            },
        );
    }

    /// Points `prev` (or the list head) at `target`.
    fn relink(&mut self, prev: usize, target: usize) {
        if prev == NIL {
            self.free_head = target;
        } else {
            let mut node: FreeBlock = self.heap.read(prev);
            node.next = to_u32(target);
            self.heap.write(prev, node);
        }
    }

    fn neighbors(&self, offset: usize) -> Neighbors {
        let mut prev = NIL;
        for (current, _) in self.free_blocks() {
            if current >= offset {
                return Neighbors { prev, next: current };
            }
            prev = current;
        }
        Neighbors { prev, next: NIL }
    }

    /// Rejects a range that overlaps a free block. Returns its neighbours.
    fn check_insertable(&self, start: usize, size: usize) -> RuntimeResult<Neighbors> {
        let neighbors = self.neighbors(start);
        let overlaps_prev = neighbors.prev != NIL && {
            let prev: FreeBlock = self.heap.read(neighbors.prev);
            neighbors.prev + prev.size as usize > start
        };
        let overlaps_next = neighbors.next != NIL && start + size > neighbors.next;
        if overlaps_prev || overlaps_next {
            return Err(RuntimeError::InvalidFree {
                offset: start,
                reason: "double free",
            });
        }
        Ok(neighbors)
    }

    /// Links a free range between its neighbours, merging with both.
    fn link_free(&mut self, start: usize, size: usize, neighbors: Neighbors) {
        let mut size = size;
        let mut next = neighbors.next;

        if next != NIL && start + size == next {
            let node: FreeBlock = self.heap.read(next);
            size += node.size as usize;
            next = node.next as usize;
        }

        if neighbors.prev != NIL {
            let prev: FreeBlock = self.heap.read(neighbors.prev);
            if neighbors.prev + prev.size as usize == start {
                self.write_free(neighbors.prev, prev.size as usize + size, next);
                return;
            }
        }

        self.write_free(start, size, next);
        self.relink(neighbors.prev, start);
    }

    /// First-fit search. Splits the chosen block, writes its header and
    /// returns the user offset.
    fn take_first_fit(&mut self, size: usize, align: usize) -> Option<usize> {
        let mut prev = NIL;
        let mut found = None;
        for (offset, node) in self.free_blocks() {
            let placement = Placement::compute(offset, size, align);
            if placement.size <= node.size as usize {
                found = Some((offset, node, placement));
                break;
            }
            prev = offset;
        }
        let (start, node, mut placement) = found?;

        let remainder = node.size as usize - placement.size;
        if remainder >= GRANULE {
            let rest = start + placement.size;
            self.write_free(rest, remainder, node.next as usize);
            self.relink(prev, rest);
        } else {
            placement.size = node.size as usize;
            self.relink(prev, node.next as usize);
        }

        Some(self.commit_block(start, placement, align))
    }

    /// Carves a block at the top of the heap. Returns the user offset.
    fn extend(&mut self, size: usize, align: usize) -> RuntimeResult<usize> {
        // A free block touching the high-water mark becomes part of the carve.
        let mut tail = None;
        let mut prev = NIL;
        for (offset, node) in self.free_blocks() {
            if offset + node.size as usize == self.high_water {
                tail = Some((prev, offset));
            }
            prev = offset;
        }

        let start = tail.map_or(self.high_water, |(_, offset)| offset);
        let placement = Placement::compute(start, size, align);
        let end = start + placement.size;
        if end > self.heap.limit() {
            return Err(self.out_of_memory(size));
        }
        self.heap.grow_to(end).map_err(|_| self.out_of_memory(size))?;

        if let Some((prev, _)) = tail {
            self.relink(prev, NIL);
        }
        self.high_water = end;
        Ok(self.commit_block(start, placement, align))
    }

    /// Writes the live header. Returns the user offset.
    fn commit_block(&mut self, start: usize, placement: Placement, align: usize) -> usize {
        let header_offset = start + placement.padding;
        self.heap.write(
            header_offset,
            AllocationHeader {
                magic: LIVE_MAGIC,
                size: to_u32(placement.size),
                padding: to_u32(placement.padding),
                align: to_u32(align),
            },
        );
        self.live_allocations += 1;
        self.live_bytes += placement.size;
        self.peak_live_bytes = self.peak_live_bytes.max(self.live_bytes);
        self.total_allocations += 1;
        header_offset + HEADER_SIZE
    }

    // ------------------------------------------------------------------
    // Reallocation
    // ------------------------------------------------------------------

    fn set_block_size(&mut self, block: LiveBlock, size: usize) {
        let mut header = block.header;
        header.size = to_u32(size);
        self.heap.write(block.header_offset(), header);
        self.live_bytes = self.live_bytes - block.size() + size;
        self.peak_live_bytes = self.peak_live_bytes.max(self.live_bytes);
    }

    fn shrink_in_place(&mut self, block: LiveBlock, needed: usize) {
        let remainder = block.size() - needed;
        if remainder < GRANULE {
            return;
        }
        self.set_block_size(block, needed);
        let tail = block.start + needed;
        let neighbors = self.neighbors(tail);
        self.link_free(tail, remainder, neighbors);
    }

    fn grow_in_place(&mut self, block: LiveBlock, needed: usize) -> bool {
        let end = block.start + block.size();
        let target = block.start + needed;
        let neighbors = self.neighbors(end);
        let successor = (neighbors.next == end).then(|| self.heap.read::<FreeBlock>(end));

        let mut region_end = end;
        if let Some(node) = successor {
            region_end += node.size as usize;
            if target <= region_end {
                let remainder = region_end - target;
                if remainder >= GRANULE {
                    self.write_free(target, remainder, node.next as usize);
                    self.relink(neighbors.prev, target);
                    self.set_block_size(block, needed);
                } else {
                    self.relink(neighbors.prev, node.next as usize);
                    self.set_block_size(block, region_end - block.start);
                }
                return true;
            }
        }

        if region_end == self.high_water && self.heap.grow_to(target).is_ok() {
            if successor.is_some() {
                self.relink(neighbors.prev, NIL);
            }
            self.high_water = target;
            self.set_block_size(block, needed);
            return true;
        }
        false
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    fn offset_of(&self, ptr: NonNull<u8>) -> usize {
        self.heap
            .offset_of(ptr)
            .unwrap_or_else(|| unreachable!("allocator returned a foreign pointer"))
    }

    fn live_block(&self, ptr: NonNull<u8>) -> RuntimeResult<LiveBlock> {
        let Some(offset) = self.heap.offset_of(ptr) else {
            return Err(RuntimeError::InvalidFree {
                offset: ptr.as_ptr() as usize,
                reason: "address outside heap",
            });
        };
        let invalid = |reason| Err(RuntimeError::InvalidFree { offset, reason });

        if offset % MIN_ALIGN != 0 {
            return invalid("misaligned address");
        }
        if offset < GRANULE + HEADER_SIZE || offset > self.high_water {
            return invalid("address outside any block");
        }

        let header: AllocationHeader = self.heap.read(offset - HEADER_SIZE);
        if header.magic == FREED_MAGIC || self.inside_free_block(offset) {
            return invalid("double free");
        }
        if header.magic != LIVE_MAGIC {
            return invalid("corrupt header");
        }

        let padding = header.padding as usize;
        let size = header.size as usize;
        let Some(start) = (offset - HEADER_SIZE).checked_sub(padding) else {
            return invalid("corrupt header");
        };
        if start < GRANULE
            || padding % GRANULE != 0
            || size % GRANULE != 0
            || size < padding + 2 * HEADER_SIZE
            || start + size > self.high_water
        {
            return invalid("corrupt header");
        }
        Ok(LiveBlock { start, header })
    }

    fn inside_free_block(&self, offset: usize) -> bool {
        self.free_blocks()
            .take_while(|&(start, _)| start < offset)
            .any(|(start, node)| offset < start + node.size as usize)
    }

    fn out_of_memory(&self, requested: usize) -> RuntimeError {
        let tail_free = self
            .free_blocks()
            .find(|&(offset, node)| offset + node.size as usize == self.high_water)
            .map_or(0, |(_, node)| node.size as usize);
        RuntimeError::OutOfMemory {
            requested,
            available: self.heap.limit().saturating_sub(self.high_water) + tail_free,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KB: usize = 1024;

    fn fixed(capacity: usize) -> Allocator {
        Allocator::new(&HeapConfig::fixed(capacity)).unwrap()
    }

    fn growable(initial: usize, max: usize) -> Allocator {
        Allocator::new(&HeapConfig {
            initial_capacity: initial,
            max_capacity: max,
            page_size: 4 * KB,
            allow_growth: true,
        })
        .unwrap()
    }

    fn offset(heap: &Allocator, ptr: NonNull<u8>) -> usize {
        heap.heap.offset_of(ptr).unwrap()
    }

    #[test]
    fn test_allocate_aligned_and_disjoint() {
        let mut heap = fixed(64 * KB);
        let a = heap.allocate(10, 16).unwrap();
        let b = heap.allocate(100, 64).unwrap();
        let c = heap.allocate(1, 1).unwrap();

        assert_eq!(a.as_ptr() as usize % 16, 0);
        assert_eq!(b.as_ptr() as usize % 64, 0);
        assert_eq!(c.as_ptr() as usize % MIN_ALIGN, 0);

        let (a, b, c) = (offset(&heap, a), offset(&heap, b), offset(&heap, c));
        assert!(a + 10 <= b - HEADER_SIZE);
        assert!(b + 100 <= c - HEADER_SIZE);
        assert_eq!(heap.live_allocations(), 3);
        heap.validate().unwrap();
    }

    #[test]
    fn test_rejects_bad_alignment() {
        let mut heap = fixed(64 * KB);
        assert_eq!(heap.allocate(8, 3), Err(RuntimeError::InvalidAlignment(3)));
        assert_eq!(
            heap.allocate(8, 2 * MAX_ALIGN),
            Err(RuntimeError::InvalidAlignment(2 * MAX_ALIGN))
        );
    }

    #[test]
    fn test_reuses_freed_block_first_fit() {
        let mut heap = fixed(64 * KB);
        let a = heap.allocate(64, 16).unwrap();
        let _b = heap.allocate(64, 16).unwrap();
        heap.deallocate(a).unwrap();

        let high_water = heap.high_water();
        let c = heap.allocate(32, 16).unwrap();
        assert_eq!(c, a, "first fit reuses the lowest free block");
        assert_eq!(heap.high_water(), high_water);

        // The 80-byte block was split: 48 used, 32 left free.
        let stats = heap.stats();
        assert_eq!(stats.free_blocks, 1);
        assert_eq!(stats.free_bytes, 32);
        heap.validate().unwrap();
    }

    #[test]
    fn test_coalesce_adjacent_either_order() {
        for reverse in [false, true] {
            let mut heap = fixed(64 * KB);
            let a = heap.allocate(48, 16).unwrap();
            let b = heap.allocate(48, 16).unwrap();
            let _guard = heap.allocate(16, 16).unwrap();
            let high_water = heap.high_water();

            if reverse {
                heap.deallocate(b).unwrap();
                heap.deallocate(a).unwrap();
            } else {
                heap.deallocate(a).unwrap();
                heap.deallocate(b).unwrap();
            }

            let stats = heap.stats();
            assert_eq!(stats.free_blocks, 1, "reverse = {reverse}");
            assert_eq!(stats.free_bytes, 128);
            heap.validate().unwrap();

            // Both blocks (64 bytes each) now serve one 112-byte payload.
            let merged = heap.allocate(128 - HEADER_SIZE, 16).unwrap();
            assert_eq!(merged, a);
            assert_eq!(heap.high_water(), high_water, "no heap growth");
            assert_eq!(heap.stats().free_blocks, 0);
        }
    }

    #[test]
    fn test_coalesce_three_way() {
        let mut heap = fixed(64 * KB);
        let a = heap.allocate(16, 16).unwrap();
        let b = heap.allocate(16, 16).unwrap();
        let c = heap.allocate(16, 16).unwrap();
        let _guard = heap.allocate(16, 16).unwrap();

        heap.deallocate(a).unwrap();
        heap.deallocate(c).unwrap();
        assert_eq!(heap.stats().free_blocks, 2);
        heap.deallocate(b).unwrap();
        assert_eq!(heap.stats().free_blocks, 1);
        assert_eq!(heap.stats().free_bytes, 96);
        heap.validate().unwrap();
    }

    #[test]
    fn test_tail_free_block_absorbed_by_extension() {
        let mut heap = fixed(64 * KB);
        let _a = heap.allocate(16, 16).unwrap();
        let b = heap.allocate(16, 16).unwrap();
        heap.deallocate(b).unwrap();
        let before = heap.high_water();

        // Too big for the 32-byte tail block, which is reused anyway.
        let c = heap.allocate(100, 16).unwrap();
        assert_eq!(c, b);
        assert_eq!(heap.high_water(), before - 32 + 128);
        assert_eq!(heap.stats().free_blocks, 0);
        heap.validate().unwrap();
    }

    #[test]
    fn test_out_of_memory_leaves_free_list_unchanged() {
        let mut heap = fixed(4 * KB);
        let a = heap.allocate(1000, 16).unwrap();
        let _b = heap.allocate(1000, 16).unwrap();
        heap.deallocate(a).unwrap();
        let before = heap.stats();

        let err = heap.allocate(8 * KB, 16).unwrap_err();
        assert!(matches!(err, RuntimeError::OutOfMemory { requested, .. } if requested == 8 * KB));

        let err = heap.allocate(3 * KB, 16).unwrap_err();
        assert!(matches!(err, RuntimeError::OutOfMemory { .. }));

        assert_eq!(heap.stats(), before);
        heap.validate().unwrap();
    }

    #[test]
    fn test_grows_backing_heap() {
        let mut heap = growable(4 * KB, 16 * KB);
        let _a = heap.allocate(3 * KB, 16).unwrap();
        let _b = heap.allocate(3 * KB, 16).unwrap();
        let stats = heap.stats();
        assert_eq!(stats.committed, 8 * KB);
        assert_eq!(stats.grow_count, 1);

        assert!(heap.allocate(12 * KB, 16).is_err());
        assert_eq!(heap.stats().committed, 8 * KB);
    }

    #[test]
    fn test_double_free_detected() {
        let mut heap = fixed(64 * KB);
        let a = heap.allocate(32, 16).unwrap();
        let _b = heap.allocate(32, 16).unwrap();
        heap.deallocate(a).unwrap();

        let err = heap.deallocate(a).unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidFree { reason: "double free", .. }));
        heap.validate().unwrap();
    }

    #[test]
    fn test_double_free_after_merge_detected() {
        let mut heap = fixed(64 * KB);
        let a = heap.allocate(32, 16).unwrap();
        let b = heap.allocate(32, 16).unwrap();
        let _c = heap.allocate(32, 16).unwrap();
        heap.deallocate(b).unwrap();
        heap.deallocate(a).unwrap();

        assert!(heap.deallocate(b).is_err());
        assert!(heap.deallocate(a).is_err());
        assert_eq!(heap.live_allocations(), 1);
    }

    #[test]
    fn test_foreign_and_interior_pointers_rejected() {
        let mut heap = fixed(64 * KB);
        let a = heap.allocate(64, 16).unwrap();

        let mut local = 0u64;
        let foreign = NonNull::from(&mut local).cast::<u8>();
        assert!(matches!(
            heap.deallocate(foreign),
            Err(RuntimeError::InvalidFree { reason: "address outside heap", .. })
        ));

        let interior = NonNull::new(a.as_ptr().wrapping_add(8)).unwrap();
        assert!(matches!(
            heap.deallocate(interior),
            Err(RuntimeError::InvalidFree { reason: "misaligned address", .. })
        ));

        let interior = NonNull::new(a.as_ptr().wrapping_add(32)).unwrap();
        assert!(heap.deallocate(interior).is_err());
        assert_eq!(heap.live_allocations(), 1);
    }

    #[test]
    fn test_reallocate_preserves_contents_when_moving() {
        let mut heap = fixed(64 * KB);
        let a = heap.allocate(32, 16).unwrap();
        let off = offset(&heap, a);
        for i in 0..32u8 {
            heap.heap.write(off + usize::from(i), i);
        }
        let _blocker = heap.allocate(16, 16).unwrap();

        let moved = heap.reallocate(a, 256).unwrap();
        assert_ne!(moved, a);
        let new_off = offset(&heap, moved);
        let bytes: [u8; 32] = heap.heap.read(new_off);
        assert!(bytes.iter().enumerate().all(|(i, &b)| usize::from(b) == i));
        assert!(heap.usable_size(moved).unwrap() >= 256);
        assert_eq!(heap.live_allocations(), 2);
        heap.validate().unwrap();
    }

    #[test]
    fn test_reallocate_grows_into_free_successor() {
        let mut heap = fixed(64 * KB);
        let a = heap.allocate(16, 16).unwrap();
        let b = heap.allocate(64, 16).unwrap();
        let _c = heap.allocate(16, 16).unwrap();
        heap.deallocate(b).unwrap();

        let grown = heap.reallocate(a, 48).unwrap();
        assert_eq!(grown, a);
        assert_eq!(heap.usable_size(a).unwrap(), 48);
        // 80-byte successor gave up 32 bytes, 48 remain free.
        assert_eq!(heap.stats().free_bytes, 48);
        heap.validate().unwrap();
    }

    #[test]
    fn test_reallocate_grows_at_high_water() {
        let mut heap = growable(4 * KB, 32 * KB);
        let a = heap.allocate(16, 16).unwrap();
        let grown = heap.reallocate(a, 10 * KB).unwrap();
        assert_eq!(grown, a);
        assert_eq!(heap.high_water(), GRANULE + HEADER_SIZE + 10 * KB);
        assert!(heap.stats().committed >= heap.high_water());
    }

    #[test]
    fn test_reallocate_shrinks_in_place() {
        let mut heap = fixed(64 * KB);
        let a = heap.allocate(512, 16).unwrap();
        let _b = heap.allocate(16, 16).unwrap();
        let shrunk = heap.reallocate(a, 16).unwrap();
        assert_eq!(shrunk, a);
        assert_eq!(heap.usable_size(a).unwrap(), 16);
        assert_eq!(heap.stats().free_bytes, 512 - 16);
        heap.validate().unwrap();
    }

    #[test]
    fn test_reallocate_failure_keeps_original() {
        let mut heap = fixed(4 * KB);
        let a = heap.allocate(64, 16).unwrap();
        let _b = heap.allocate(64, 16).unwrap();
        assert!(heap.reallocate(a, 8 * KB).is_err());
        assert_eq!(heap.usable_size(a).unwrap(), 64);
        heap.deallocate(a).unwrap();
    }

    #[test]
    fn test_reallocate_keeps_alignment() {
        let mut heap = fixed(64 * KB);
        let _a = heap.allocate(16, 16).unwrap();
        let b = heap.allocate(16, 256).unwrap();
        let _c = heap.allocate(16, 16).unwrap();
        let moved = heap.reallocate(b, 1024).unwrap();
        assert_eq!(moved.as_ptr() as usize % 256, 0);
    }

    #[test]
    fn test_stats_track_live_bytes() {
        let mut heap = fixed(64 * KB);
        let a = heap.allocate(16, 16).unwrap();
        let b = heap.allocate(100, 16).unwrap();
        let stats = heap.stats();
        assert_eq!(stats.live_allocations, 2);
        assert_eq!(stats.live_bytes, 32 + 128);
        assert_eq!(stats.total_allocations, 2);

        heap.deallocate(a).unwrap();
        heap.deallocate(b).unwrap();
        let stats = heap.stats();
        assert_eq!(stats.live_bytes, 0);
        assert_eq!(stats.peak_live_bytes, 160);
    }
}
