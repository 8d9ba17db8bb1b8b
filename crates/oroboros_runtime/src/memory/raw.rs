//! # Raw Heap
//!
//! The byte region every allocation is carved from.

// SAFETY: This is the ONLY module that does pointer arithmetic on the heap.
// Every access is bounds-checked against the committed size.
#![allow(unsafe_code)]
//!
//! ## Backing Memory
//!
//! ```text
//! base                         committed                      limit
//!  │◄──────── usable ────────────►│◄──── reserved, not yet ────►│
//!  │                              │      committed              │
//!  └──────────────────────────────┴─────────────────────────────┘
//!                                 ──► grows in page_size steps
//! ```
//!
//! - **Native**: the whole `limit` is reserved from the OS allocator once,
//!   so `base` never moves. Growing only moves the `committed` mark.
//! - **WebAssembly**: pages are requested with `memory.grow`. Linear memory
//!   never moves either; growth fails if another party grew memory in
//!   between and the new pages are not contiguous with ours. Wasm pages are
//!   64 KiB, so the mapped end is tracked apart from `committed` and a growth
//!   step that fits in the last mapped page requests nothing.
//!
//! Offsets, not pointers, are the currency of the allocator. They are
//! translated here and nowhere else.

use std::ptr::NonNull;

use bytemuck::Pod;

use crate::config::HeapConfig;
use crate::error::{RuntimeError, RuntimeResult};
use crate::memory::layout::align_up;

/// A contiguous, never-moving byte region.
pub struct RawHeap {
    /// Start of the region.
    base: NonNull<u8>,
    /// Bytes usable right now.
    committed: usize,
    /// Bytes the region may grow to.
    limit: usize,
    /// Growth step.
    page_size: usize,
    /// Number of successful grow operations.
    grow_count: usize,
    /// End of the linear memory obtained so far, a multiple of the wasm page.
    #[cfg(target_arch = "wasm32")]
    mapped: usize,
    /// Native reservation, released on drop.
    #[cfg(not(target_arch = "wasm32"))]
    layout: std::alloc::Layout,
}

// SAFETY: The region is owned exclusively by this value; moving it to another
// thread moves the ownership with it.
unsafe impl Send for RawHeap {}

impl RawHeap {
    /// Obtains the backing memory described by `config`.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::InvalidConfig`] for an invalid config,
    /// [`RuntimeError::OutOfMemory`] if the host refuses the memory.
    pub fn new(config: &HeapConfig) -> RuntimeResult<Self> {
        config.validate()?;
        Self::reserve(config)
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn reserve(config: &HeapConfig) -> RuntimeResult<Self> {
        let limit = config.limit();
        let layout = std::alloc::Layout::from_size_align(limit, crate::memory::layout::MAX_ALIGN)
            .map_err(|e| RuntimeError::InvalidConfig(e.to_string()))?;

        // SAFETY: limit >= 2 * GRANULE (validated), so the layout is non-zero.
        let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
        let base = NonNull::new(ptr).ok_or(RuntimeError::OutOfMemory {
            requested: limit,
            available: 0,
        })?;

        Ok(Self {
            base,
            committed: config.initial_capacity,
            limit,
            page_size: config.page_size,
            grow_count: 0,
            layout,
        })
    }

    #[cfg(target_arch = "wasm32")]
    fn reserve(config: &HeapConfig) -> RuntimeResult<Self> {
        use core::arch::wasm32::memory_grow;

        let page = crate::config::WASM_PAGE_SIZE;
        let pages = wasm_pages_to_add(0, config.initial_capacity);
        let previous = memory_grow(0, pages);
        if previous == usize::MAX {
            return Err(RuntimeError::OutOfMemory {
                requested: config.initial_capacity,
                available: 0,
            });
        }
        // Page 0 holds the data segment; previous is never 0 in practice.
        let base = NonNull::new((previous * page) as *mut u8).ok_or(RuntimeError::OutOfMemory {
            requested: config.initial_capacity,
            available: 0,
        })?;

        Ok(Self {
            base,
            committed: config.initial_capacity,
            limit: config.limit(),
            page_size: config.page_size,
            grow_count: 0,
            mapped: pages * page,
        })
    }

    /// Bytes usable right now.
    #[inline]
    #[must_use]
    pub const fn committed(&self) -> usize {
        self.committed
    }

    /// Bytes the region may grow to.
    #[inline]
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Number of successful grow operations.
    #[inline]
    #[must_use]
    pub const fn grow_count(&self) -> usize {
        self.grow_count
    }

    /// Makes sure `[0, end)` is committed, growing in page steps.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::OutOfMemory`] if `end` is beyond the limit or the
    /// host refuses to grow. The committed size is unchanged on failure.
    pub fn grow_to(&mut self, end: usize) -> RuntimeResult<()> {
        if end <= self.committed {
            return Ok(());
        }
        if end > self.limit {
            return Err(RuntimeError::OutOfMemory {
                requested: end - self.committed,
                available: self.limit.saturating_sub(self.committed),
            });
        }

        let target = align_up(end, self.page_size).min(self.limit);
        self.commit(target)?;

        tracing::debug!(
            from = self.committed,
            to = target,
            limit = self.limit,
            "heap grown"
        );
        self.committed = target;
        self.grow_count += 1;
        Ok(())
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[allow(clippy::unnecessary_wraps)]
    fn commit(&mut self, _target: usize) -> RuntimeResult<()> {
        // The reservation is already backed; committing is bookkeeping.
        Ok(())
    }

    #[cfg(target_arch = "wasm32")]
    fn commit(&mut self, target: usize) -> RuntimeResult<()> {
        use core::arch::wasm32::memory_grow;

        let pages = wasm_pages_to_add(self.mapped, target);
        if pages == 0 {
            return Ok(());
        }

        let page = crate::config::WASM_PAGE_SIZE;
        let previous = memory_grow(0, pages);
        let contiguous = self.base.as_ptr() as usize + self.mapped;
        if previous == usize::MAX || previous * page != contiguous {
            return Err(RuntimeError::OutOfMemory {
                requested: target - self.committed,
                available: 0,
            });
        }
        self.mapped += pages * page;
        Ok(())
    }

    /// Translates an offset into an address.
    ///
    /// # Panics
    ///
    /// If `offset` is outside the committed region.
    #[inline]
    #[must_use]
    pub fn ptr_at(&self, offset: usize) -> NonNull<u8> {
        assert!(offset < self.committed, "heap offset {offset:#x} out of range");
        // SAFETY: offset is inside the committed region, which is inside the
        // reservation starting at base.
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset)) }
    }

    /// Translates an address back into an offset, if it lies in the region.
    #[inline]
    #[must_use]
    pub fn offset_of(&self, ptr: NonNull<u8>) -> Option<usize> {
        let addr = ptr.as_ptr() as usize;
        let base = self.base.as_ptr() as usize;
        addr.checked_sub(base).filter(|&offset| offset < self.committed)
    }

    /// Reads a plain-data record at `offset`.
    ///
    /// # Panics
    ///
    /// If the record does not fit in the committed region.
    #[inline]
    #[must_use]
    pub fn read<T: Pod>(&self, offset: usize) -> T {
        self.check_range(offset, std::mem::size_of::<T>());
        // SAFETY: The range is committed and T is valid for any bit pattern.
        unsafe { self.base.as_ptr().add(offset).cast::<T>().read_unaligned() }
    }

    /// Writes a plain-data record at `offset`.
    ///
    /// # Panics
    ///
    /// If the record does not fit in the committed region.
    #[inline]
    pub fn write<T: Pod>(&mut self, offset: usize, value: T) {
        self.check_range(offset, std::mem::size_of::<T>());
        // SAFETY: The range is committed and owned by the allocator.
        unsafe { self.base.as_ptr().add(offset).cast::<T>().write_unaligned(value) }
    }

    /// Copies `len` bytes from `src` to `dst`. Ranges may overlap.
    ///
    /// # Panics
    ///
    /// If either range is outside the committed region.
    #[inline]
    pub fn copy(&mut self, src: usize, dst: usize, len: usize) {
        self.check_range(src, len);
        self.check_range(dst, len);
        // SAFETY: Both ranges are committed; ptr::copy handles overlap.
        unsafe {
            std::ptr::copy(
                self.base.as_ptr().add(src),
                self.base.as_ptr().add(dst),
                len,
            );
        }
    }

    #[inline]
    fn check_range(&self, offset: usize, len: usize) {
        let end = offset.checked_add(len);
        assert!(
            end.is_some_and(|end| end <= self.committed),
            "heap range {offset:#x}+{len} out of committed region {:#x}",
            self.committed
        );
    }
}

/// Wasm pages needed so that memory mapped up to `mapped` covers `target`.
///
/// Zero when the tail of the last page already covers it: `page_size` may be
/// smaller than a wasm page.
#[cfg(any(target_arch = "wasm32", test))]
fn wasm_pages_to_add(mapped: usize, target: usize) -> usize {
    let page = crate::config::WASM_PAGE_SIZE;
    align_up(target, page).saturating_sub(mapped) / page
}

#[cfg(not(target_arch = "wasm32"))]
impl Drop for RawHeap {
    fn drop(&mut self) {
        // SAFETY: base was returned by alloc_zeroed with this exact layout.
        unsafe { std::alloc::dealloc(self.base.as_ptr(), self.layout) };
    }
}
