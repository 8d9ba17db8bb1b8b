//! # Shared Pointer
//!
//! Reference-counted ownership on the engine heap.

// SAFETY: This module places values in blocks returned by the allocator.
// Every unsafe block is documented below.
#![allow(unsafe_code)]
//!
//! ## Layout
//!
//! ```text
//!  SharedPtr ──┐
//!  SharedPtr ──┼──► ┌──────────────┬───────────────┐
//!  SharedPtr ──┘    │ strong: 3    │   value: T    │   one allocation
//!                   └──────────────┴───────────────┘
//! ```
//!
//! - Clone: strong += 1, no allocation
//! - Drop: strong -= 1; at zero the value is dropped and the block freed
//!
//! There are no weak pointers. Ownership graphs must be acyclic; a cycle
//! leaks.

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::{self, NonNull};

use crate::error::{OrFatal, RuntimeError, RuntimeResult};
use crate::memory;

/// Strong count and payload, allocated together.
#[repr(C)]
struct ControlBlock<T> {
    strong: Cell<usize>,
    value: T,
}

/// A reference-counted pointer into the engine heap.
///
/// A default-constructed pointer is null; dereferencing it is an error.
///
/// # Example
///
/// ```rust
/// use oroboros_runtime::{memory, HeapConfig, SharedPtr};
///
/// # let _ = memory::init(&HeapConfig::default());
/// let mesh = SharedPtr::new([1.0f32, 2.0, 3.0]).unwrap();
/// let alias = mesh.clone();
/// assert_eq!(mesh.strong_count(), 2);
/// assert_eq!(alias[1], 2.0);
/// ```
pub struct SharedPtr<T> {
    block: Option<NonNull<ControlBlock<T>>>,
    _owns: PhantomData<ControlBlock<T>>,
}

impl<T> SharedPtr<T> {
    /// Allocates a control block holding `value` with a count of one.
    ///
    /// # Errors
    ///
    /// Any allocation error from the global heap. `value` is dropped.
    pub fn new(value: T) -> RuntimeResult<Self> {
        let size = std::mem::size_of::<ControlBlock<T>>();
        let align = std::mem::align_of::<ControlBlock<T>>();
        let block = memory::allocate(size, align)?.cast::<ControlBlock<T>>();

        // SAFETY: The block is fresh, large enough and aligned for
        // ControlBlock<T>, and nothing else refers to it.
        unsafe {
            block.as_ptr().write(ControlBlock {
                strong: Cell::new(1),
                value,
            });
        }
        Ok(Self {
            block: Some(block),
            _owns: PhantomData,
        })
    }

    /// A pointer that owns nothing.
    #[inline]
    #[must_use]
    pub const fn null() -> Self {
        Self {
            block: None,
            _owns: PhantomData,
        }
    }

    /// Whether this pointer owns nothing.
    #[inline]
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.block.is_none()
    }

    #[inline]
    fn control(&self) -> Option<&ControlBlock<T>> {
        // SAFETY: A non-null block stays alive while this pointer holds one
        // of its strong references.
        self.block.map(|block| unsafe { &*block.as_ptr() })
    }

    /// Number of pointers sharing the payload. Zero for a null pointer.
    #[inline]
    #[must_use]
    pub fn strong_count(&self) -> usize {
        self.control().map_or(0, |control| control.strong.get())
    }

    /// Immutable view of the payload.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::NullDereference`] if the pointer is null.
    #[inline]
    pub fn get(&self) -> RuntimeResult<&T> {
        self.control()
            .map(|control| &control.value)
            .ok_or(RuntimeError::NullDereference)
    }

    /// Mutable view of the payload. Only the sole owner may mutate.
    ///
    /// Wrap the payload in a `RefCell` for shared mutation.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::NullDereference`] if the pointer is null,
    /// [`RuntimeError::SharedMutation`] if other pointers share the payload.
    pub fn get_mut(&mut self) -> RuntimeResult<&mut T> {
        let block = self.block.ok_or(RuntimeError::NullDereference)?;
        let strong = self.strong_count();
        if strong != 1 {
            return Err(RuntimeError::SharedMutation { strong });
        }
        // SAFETY: This is the only pointer to the block and it is borrowed
        // mutably for the lifetime of the returned reference.
        Ok(unsafe { &mut (*block.as_ptr()).value })
    }

    /// Whether both pointers share the same control block. Two nulls are equal.
    #[inline]
    #[must_use]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.block == other.block
    }

    /// Moves the payload out if this is the only owner.
    ///
    /// # Errors
    ///
    /// Returns the pointer unchanged if it is null or shared.
    pub fn try_unwrap(mut self) -> Result<T, Self> {
        if self.strong_count() != 1 {
            return Err(self);
        }
        let Some(block) = self.block.take() else {
            return Err(self);
        };
        // SAFETY: Sole owner. The value is read out exactly once and the
        // block is freed without dropping it again.
        let value = unsafe { ptr::addr_of!((*block.as_ptr()).value).read() };
        memory::deallocate(block.cast()).or_fatal("shared pointer unwrap");
        Ok(value)
    }

    /// Gives up this reference. Same as dropping the pointer.
    #[inline]
    pub fn release(self) {
        drop(self);
    }

    /// Releases the payload reference and leaves this pointer null.
    #[inline]
    pub fn reset(&mut self) {
        *self = Self::null();
    }
}

impl<T> Clone for SharedPtr<T> {
    fn clone(&self) -> Self {
        if let Some(control) = self.control() {
            control.strong.set(control.strong.get() + 1);
        }
        Self {
            block: self.block,
            _owns: PhantomData,
        }
    }
}

impl<T> Drop for SharedPtr<T> {
    fn drop(&mut self) {
        let Some(block) = self.block.take() else {
            return;
        };
        // SAFETY: We held a strong reference, so the block is alive.
        let control = unsafe { &*block.as_ptr() };
        let strong = control.strong.get() - 1;
        control.strong.set(strong);
        if strong > 0 {
            return;
        }

        // SAFETY: Last owner. The value is dropped exactly once, before the
        // block goes back to the heap.
        unsafe { ptr::drop_in_place(ptr::addr_of_mut!((*block.as_ptr()).value)) };
        memory::deallocate(block.cast()).or_fatal("shared pointer release");
    }
}

impl<T> Default for SharedPtr<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> Deref for SharedPtr<T> {
    type Target = T;

    #[track_caller]
    fn deref(&self) -> &T {
        self.get().or_fatal("shared pointer dereference")
    }
}

impl<T: PartialEq> PartialEq for SharedPtr<T> {
    /// Compares payloads. Two nulls are equal; null never equals a value.
    fn eq(&self, other: &Self) -> bool {
        match (self.get(), other.get()) {
            (Ok(a), Ok(b)) => a == b,
            (Err(_), Err(_)) => true,
            _ => false,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for SharedPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Ok(value) => f
                .debug_struct("SharedPtr")
                .field("strong", &self.strong_count())
                .field("value", value)
                .finish(),
            Err(_) => f.write_str("SharedPtr(null)"),
        }
    }
}

impl<T: fmt::Display> fmt::Display for SharedPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Ok(value) => value.fmt(f),
            Err(_) => f.write_str("null"),
        }
    }
}
