//! # In-band Heap Records
//!
//! Every block in the heap starts with one of two records:
//!
//! ```text
//! Allocated block:
//! ┌───────────┬──────────────────┬───────────────────────────┐
//! │  padding  │ AllocationHeader │        user payload       │
//! │ (align)   │     16 bytes     │                           │
//! └───────────┴──────────────────┴───────────────────────────┘
//! ^ block start                  ^ address handed to caller
//!
//! Free block:
//! ┌───────────┬──────────────────────────────────────────────┐
//! │ FreeBlock │                  unused                      │
//! └───────────┴──────────────────────────────────────────────┘
//! ```
//!
//! Block sizes are multiples of [`GRANULE`]. Offsets are `u32`, matching
//! wasm32 linear memory.

use bytemuck::{Pod, Zeroable};

/// Unit every block size and block start is rounded to.
pub const GRANULE: usize = 16;

/// Size of [`AllocationHeader`] in bytes.
pub const HEADER_SIZE: usize = std::mem::size_of::<AllocationHeader>();

/// Alignment every allocation gets, whatever the caller asks for.
pub const MIN_ALIGN: usize = GRANULE;

/// Largest supported alignment.
pub const MAX_ALIGN: usize = 4096;

/// Magic of a live allocation header.
pub const LIVE_MAGIC: u32 = 0xA110_C8ED;

/// Magic written over a header when its block is freed.
pub const FREED_MAGIC: u32 = 0xDEAD_F4EE;

/// Magic of a free-list node.
pub const FREE_MAGIC: u32 = 0xF4EE_B10C;

/// Metadata placed immediately before every user allocation.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct AllocationHeader {
    /// [`LIVE_MAGIC`] while allocated.
    pub magic: u32,
    /// Whole block size, padding included.
    pub size: u32,
    /// Bytes between block start and this header.
    pub padding: u32,
    /// Alignment requested at allocation time.
    pub align: u32,
}

/// Free-list node, stored at the start of a free block.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct FreeBlock {
    /// Block size in bytes.
    pub size: u32,
    /// Offset of the next free block, 0 terminates the list.
    pub next: u32,
    /// [`FREE_MAGIC`].
    pub magic: u32,
    /// Keeps the record one granule wide.
    pub reserved: u32,
}

const _: () = assert!(HEADER_SIZE == GRANULE);
const _: () = assert!(std::mem::size_of::<FreeBlock>() == GRANULE);

/// Rounds `value` up to a multiple of `align` (a power of two).
#[inline]
#[must_use]
pub const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Block placement for a request inside a candidate block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Placement {
    /// Bytes skipped before the header.
    pub padding: usize,
    /// Whole block size, padding included.
    pub size: usize,
}

impl Placement {
    /// Computes the placement of `size` payload bytes aligned to `align`
    /// in a block starting at `start`.
    #[inline]
    #[must_use]
    pub const fn compute(start: usize, size: usize, align: usize) -> Self {
        let user = align_up(start + HEADER_SIZE, align);
        let padding = user - HEADER_SIZE - start;
        Self {
            padding,
            size: align_up(padding + HEADER_SIZE + size, GRANULE),
        }
    }
}
