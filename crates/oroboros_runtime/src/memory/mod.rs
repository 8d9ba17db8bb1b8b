//! # Memory Management
//!
//! The engine heap: one raw region, one free-list allocator, one global
//! gateway every container goes through.
//!
//! ## Design Philosophy
//!
//! - No host allocator on the hot path: the region is obtained once
//! - No garbage collection: every block is freed explicitly
//! - Heap offset arithmetic lives in `raw.rs` and nowhere else
//!
//! ## Layers
//!
//! ```text
//! SharedPtr / Array / HeapString
//!              │
//!              ▼
//!       global (init / shutdown / allocate / deallocate / reallocate)
//!              │
//!              ▼
//!       Allocator (first-fit free list, coalescing)
//!              │
//!              ▼
//!       RawHeap (native reservation or wasm linear memory)
//! ```

mod allocator;
mod global;
pub mod layout;
mod raw;
mod stats;

pub use allocator::Allocator;
pub use global::{
    allocate, deallocate, dump, init, is_initialized, reallocate, shutdown, stats, usable_size,
    validate,
};
pub use layout::{GRANULE, HEADER_SIZE, MAX_ALIGN, MIN_ALIGN};
pub use raw::RawHeap;
pub use stats::{HeapStats, SIZE_CLASSES};

#[cfg(test)]
pub(crate) use global::ensure_test_heap;
