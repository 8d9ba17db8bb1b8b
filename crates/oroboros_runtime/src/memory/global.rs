//! # Process-Wide Heap
//!
//! The engine heap is a singleton with an explicit lifecycle:
//!
//! ```text
//!  ┌──────────────┐  init()   ┌─────────────┐  shutdown()  ┌──────────────┐
//!  │ Uninitialized│──────────►│    Live     │─────────────►│ Uninitialized│
//!  └──────────────┘           └─────────────┘  (no live    └──────────────┘
//!     every call fails           allocations)
//!     with Uninitialized
//! ```
//!
//! The mutex only guards the free list. The engine loop is the sole mutator;
//! the lock makes concurrent test threads safe, nothing more.

use std::ptr::NonNull;

use parking_lot::Mutex;

use crate::config::HeapConfig;
use crate::error::{RuntimeError, RuntimeResult};
use crate::memory::allocator::Allocator;
use crate::memory::stats::HeapStats;

static HEAP: Mutex<Option<Allocator>> = parking_lot::const_mutex(None);

/// Initializes the process-wide heap. Call once, before anything allocates.
///
/// # Errors
///
/// [`RuntimeError::AlreadyInitialized`] on a second call, or the
/// config/backing-memory errors of [`Allocator::new`].
pub fn init(config: &HeapConfig) -> RuntimeResult<()> {
    let mut heap = HEAP.lock();
    if heap.is_some() {
        return Err(RuntimeError::AlreadyInitialized);
    }
    *heap = Some(Allocator::new(config)?);
    tracing::info!(
        initial = config.initial_capacity,
        limit = config.limit(),
        page_size = config.page_size,
        "engine heap initialized"
    );
    Ok(())
}

/// Whether [`init`] has run (and [`shutdown`] has not).
#[must_use]
pub fn is_initialized() -> bool {
    HEAP.lock().is_some()
}

/// Tears the heap down and releases the backing memory.
///
/// # Errors
///
/// [`RuntimeError::Uninitialized`] if there is no heap,
/// [`RuntimeError::LiveAllocations`] if anything is still allocated. The
/// heap stays usable in that case.
pub fn shutdown() -> RuntimeResult<()> {
    let mut heap = HEAP.lock();
    let live = heap
        .as_ref()
        .ok_or(RuntimeError::Uninitialized)?
        .live_allocations();
    if live > 0 {
        tracing::warn!(live, "heap shutdown refused");
        return Err(RuntimeError::LiveAllocations(live));
    }
    *heap = None;
    tracing::info!("engine heap shut down");
    Ok(())
}

/// Runs `f` against the heap.
///
/// `f` must not call back into the global heap.
fn with_heap<R>(f: impl FnOnce(&mut Allocator) -> RuntimeResult<R>) -> RuntimeResult<R> {
    let mut heap = HEAP.lock();
    f(heap.as_mut().ok_or(RuntimeError::Uninitialized)?)
}

/// [`Allocator::allocate`] on the global heap.
///
/// # Errors
///
/// [`RuntimeError::Uninitialized`] before [`init`], otherwise as
/// [`Allocator::allocate`].
pub fn allocate(size: usize, align: usize) -> RuntimeResult<NonNull<u8>> {
    with_heap(|heap| heap.allocate(size, align))
}

/// [`Allocator::deallocate`] on the global heap.
///
/// # Errors
///
/// [`RuntimeError::Uninitialized`] before [`init`], otherwise as
/// [`Allocator::deallocate`].
pub fn deallocate(ptr: NonNull<u8>) -> RuntimeResult<()> {
    with_heap(|heap| heap.deallocate(ptr))
}

/// [`Allocator::reallocate`] on the global heap.
///
/// # Errors
///
/// [`RuntimeError::Uninitialized`] before [`init`], otherwise as
/// [`Allocator::reallocate`].
pub fn reallocate(ptr: NonNull<u8>, new_size: usize) -> RuntimeResult<NonNull<u8>> {
    with_heap(|heap| heap.reallocate(ptr, new_size))
}

/// [`Allocator::usable_size`] on the global heap.
///
/// # Errors
///
/// [`RuntimeError::Uninitialized`] before [`init`], otherwise as
/// [`Allocator::usable_size`].
pub fn usable_size(ptr: NonNull<u8>) -> RuntimeResult<usize> {
    with_heap(|heap| heap.usable_size(ptr))
}

/// [`Allocator::validate`] on the global heap.
///
/// # Errors
///
/// [`RuntimeError::Uninitialized`] before [`init`], otherwise as
/// [`Allocator::validate`].
pub fn validate() -> RuntimeResult<()> {
    with_heap(|heap| heap.validate())
}

/// Snapshot of the global heap.
///
/// # Errors
///
/// [`RuntimeError::Uninitialized`] before [`init`].
pub fn stats() -> RuntimeResult<HeapStats> {
    with_heap(|heap| Ok(heap.stats()))
}

/// Logs a diagnostic dump of the global heap and returns it.
///
/// # Errors
///
/// [`RuntimeError::Uninitialized`] before [`init`].
pub fn dump() -> RuntimeResult<HeapStats> {
    let stats = stats()?;
    tracing::info!(
        high_water = stats.high_water,
        committed = stats.committed,
        limit = stats.limit,
        live_allocations = stats.live_allocations,
        live_bytes = stats.live_bytes,
        free_blocks = stats.free_blocks,
        free_bytes = stats.free_bytes,
        largest_free = stats.largest_free,
        "heap dump"
    );
    Ok(stats)
}

/// Initializes the global heap with defaults unless it already is.
#[cfg(test)]
pub(crate) fn ensure_test_heap() {
    match init(&HeapConfig::default()) {
        Ok(()) | Err(RuntimeError::AlreadyInitialized) => {}
        Err(error) => panic!("test heap: {error}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Other unit tests share the global heap concurrently, so these only
    // check relative effects of their own allocations.

    #[test]
    fn test_global_roundtrip() {
        ensure_test_heap();
        assert!(is_initialized());
        assert_eq!(init(&HeapConfig::default()), Err(RuntimeError::AlreadyInitialized));

        let ptr = allocate(100, 16).unwrap();
        assert!(usable_size(ptr).unwrap() >= 100);
        let ptr = reallocate(ptr, 1000).unwrap();
        assert!(usable_size(ptr).unwrap() >= 1000);
        deallocate(ptr).unwrap();
    }

    #[test]
    fn test_shutdown_refused_while_live() {
        ensure_test_heap();
        let ptr = allocate(8, 8).unwrap();
        assert!(matches!(shutdown(), Err(RuntimeError::LiveAllocations(n)) if n >= 1));
        assert!(is_initialized());
        deallocate(ptr).unwrap();
    }

    #[test]
    fn test_dump_reports_heap() {
        ensure_test_heap();
        let stats = dump().unwrap();
        assert!(stats.committed >= stats.high_water);
        assert!(stats.limit >= stats.committed);
    }
}
