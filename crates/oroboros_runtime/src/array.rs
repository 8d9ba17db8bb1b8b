//! # Growable Array
//!
//! Contiguous, homogeneous storage on the engine heap.

// SAFETY: This module reads and writes elements in a block obtained from the
// allocator. Slots `0..len` are always initialized; slots `len..capacity`
// never are.
#![allow(unsafe_code)]
//!
//! ## Growth Policy
//!
//! - First allocation: exactly one slot (or exactly what `reserve` asks for)
//! - Afterwards: capacity doubles, through the allocator's `reallocate`,
//!   which grows in place when it can
//! - Never shrinks on its own; removals keep the capacity
//!
//! ## Iteration
//!
//! `iter()` borrows the array, so the borrow checker rejects any structural
//! change while iterating:
//!
//! ```rust,compile_fail
//! use oroboros_runtime::Array;
//!
//! let mut array = Array::new();
//! array.add(1u32).unwrap();
//! for item in array.iter() {
//!     array.add(*item).unwrap();
//! }
//! ```
//!
//! [`Cursor`] is the escape hatch: it holds an index, not a borrow, and
//! re-checks the length on every step.

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};
use std::ptr::{self, NonNull};

use crate::error::{OrFatal, RuntimeError, RuntimeResult};
use crate::memory;

/// A growable array allocated from the engine heap.
///
/// # Example
///
/// ```rust
/// use oroboros_runtime::{memory, Array, HeapConfig};
///
/// # let _ = memory::init(&HeapConfig::default());
/// let mut ids = Array::new();
/// ids.add(4u32).unwrap();
/// ids.add(8).unwrap();
/// assert_eq!(ids.get(1), Ok(&8));
/// assert!(ids.get(2).is_err());
/// ```
pub struct Array<T> {
    /// Slot storage. Dangling while nothing is allocated.
    ptr: NonNull<T>,
    /// Initialized slots.
    len: usize,
    /// Allocated slots.
    capacity: usize,
    _owns: PhantomData<T>,
}

impl<T> Array<T> {
    const IS_ZST: bool = std::mem::size_of::<T>() == 0;

    /// An empty array. Does not allocate.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ptr: NonNull::dangling(),
            len: 0,
            capacity: if Self::IS_ZST { usize::MAX } else { 0 },
            _owns: PhantomData,
        }
    }

    /// An empty array with room for exactly `capacity` elements.
    ///
    /// # Errors
    ///
    /// Any allocation error from the global heap.
    pub fn with_capacity(capacity: usize) -> RuntimeResult<Self> {
        let mut array = Self::new();
        array.reserve(capacity)?;
        Ok(array)
    }

    /// Number of elements.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the array holds no elements.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots allocated.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Reallocates to exactly `capacity` slots.
    fn grow_to(&mut self, capacity: usize) -> RuntimeResult<()> {
        debug_assert!(capacity > self.capacity);
        let bytes = capacity
            .checked_mul(std::mem::size_of::<T>())
            .filter(|_| !Self::IS_ZST)
            .ok_or(RuntimeError::OutOfMemory {
                requested: usize::MAX,
                available: 0,
            })?;

        let block = if self.capacity == 0 {
            memory::allocate(bytes, std::mem::align_of::<T>())?
        } else {
            memory::reallocate(self.ptr.cast(), bytes)?
        };
        self.ptr = block.cast();
        self.capacity = capacity;
        Ok(())
    }

    /// Makes room for at least `additional` more elements, exact fit.
    ///
    /// # Errors
    ///
    /// Any allocation error from the global heap. The array is unchanged.
    pub fn reserve(&mut self, additional: usize) -> RuntimeResult<()> {
        let required = self.len.checked_add(additional).ok_or(RuntimeError::OutOfMemory {
            requested: usize::MAX,
            available: 0,
        })?;
        if required > self.capacity {
            self.grow_to(required)?;
        }
        Ok(())
    }

    /// Appends an element, doubling the capacity when full.
    ///
    /// # Errors
    ///
    /// Any allocation error from the global heap. `value` is dropped and
    /// the array is unchanged.
    pub fn add(&mut self, value: T) -> RuntimeResult<()> {
        if self.len == self.capacity {
            self.grow_to((self.capacity * 2).max(1))?;
        }
        // SAFETY: len < capacity, so the slot is allocated and uninitialized.
        unsafe { self.ptr.as_ptr().add(self.len).write(value) };
        self.len += 1;
        Ok(())
    }

    /// Inserts an element at `index`, shifting later elements up.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::IndexOutOfBounds`] if `index > len`, or any
    /// allocation error.
    pub fn insert(&mut self, index: usize, value: T) -> RuntimeResult<()> {
        if index > self.len {
            return Err(RuntimeError::IndexOutOfBounds { index, len: self.len });
        }
        if self.len == self.capacity {
            self.grow_to((self.capacity * 2).max(1))?;
        }
        // SAFETY: len < capacity; slots index..len move up by one within
        // the allocation, then the vacated slot is written.
        unsafe {
            let slot = self.ptr.as_ptr().add(index);
            ptr::copy(slot, slot.add(1), self.len - index);
            slot.write(value);
        }
        self.len += 1;
        Ok(())
    }

    #[inline]
    fn check_index(&self, index: usize) -> RuntimeResult<()> {
        if index < self.len {
            Ok(())
        } else {
            Err(RuntimeError::IndexOutOfBounds { index, len: self.len })
        }
    }

    /// The element at `index`.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::IndexOutOfBounds`] if `index >= len`.
    #[inline]
    pub fn get(&self, index: usize) -> RuntimeResult<&T> {
        self.check_index(index)?;
        Ok(&self.as_slice()[index])
    }

    /// The element at `index`, mutably.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::IndexOutOfBounds`] if `index >= len`.
    #[inline]
    pub fn get_mut(&mut self, index: usize) -> RuntimeResult<&mut T> {
        self.check_index(index)?;
        Ok(&mut self.as_mut_slice()[index])
    }

    /// Replaces the element at `index`, returning the old one.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::IndexOutOfBounds`] if `index >= len`. `value` is
    /// dropped.
    pub fn set(&mut self, index: usize, value: T) -> RuntimeResult<T> {
        Ok(std::mem::replace(self.get_mut(index)?, value))
    }

    /// Removes the element at `index`, shifting later elements down.
    ///
    /// O(n). The capacity is kept.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::IndexOutOfBounds`] if `index >= len`.
    pub fn remove_at(&mut self, index: usize) -> RuntimeResult<T> {
        self.check_index(index)?;
        // SAFETY: index < len. The element is read out once, then the tail
        // moves down over its slot.
        let value = unsafe {
            let slot = self.ptr.as_ptr().add(index);
            let value = slot.read();
            ptr::copy(slot.add(1), slot, self.len - index - 1);
            value
        };
        self.len -= 1;
        Ok(value)
    }

    /// Removes and returns the last element.
    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        // SAFETY: The slot at the old len - 1 was initialized and is now
        // outside 0..len, so it is read exactly once.
        Some(unsafe { self.ptr.as_ptr().add(self.len).read() })
    }

    /// Drops elements past `len`. Keeps the capacity.
    pub fn truncate(&mut self, len: usize) {
        if len >= self.len {
            return;
        }
        let tail = ptr::slice_from_raw_parts_mut(
            // SAFETY: len < self.len, inside the allocation.
            unsafe { self.ptr.as_ptr().add(len) },
            self.len - len,
        );
        // Shrink first so a panicking destructor cannot cause a double drop.
        self.len = len;
        // SAFETY: The tail slots were initialized and are no longer tracked.
        unsafe { ptr::drop_in_place(tail) };
    }

    /// Drops every element. Keeps the capacity.
    #[inline]
    pub fn clear(&mut self) {
        self.truncate(0);
    }

    /// The initialized elements.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: Slots 0..len are initialized; ptr is aligned even when
        // dangling.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// The initialized elements, mutably.
    #[inline]
    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: As in as_slice, and self is borrowed mutably.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Iterates over the elements.
    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    /// Iterates mutably over the elements.
    #[inline]
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.as_mut_slice().iter_mut()
    }

    /// The first element.
    #[inline]
    #[must_use]
    pub fn first(&self) -> Option<&T> {
        self.as_slice().first()
    }

    /// The last element.
    #[inline]
    #[must_use]
    pub fn last(&self) -> Option<&T> {
        self.as_slice().last()
    }

    /// Whether an element equals `value`.
    #[must_use]
    pub fn contains(&self, value: &T) -> bool
    where
        T: PartialEq,
    {
        self.as_slice().contains(value)
    }
}

impl<T: Clone> Array<T> {
    /// Copies a slice into a new, exactly sized array.
    ///
    /// # Errors
    ///
    /// Any allocation error from the global heap.
    pub fn from_slice(items: &[T]) -> RuntimeResult<Self> {
        let mut array = Self::with_capacity(items.len())?;
        array.extend_from_slice(items)?;
        Ok(array)
    }

    /// Appends clones of every element of `items`.
    ///
    /// # Errors
    ///
    /// Any allocation error from the global heap. Nothing is appended then.
    pub fn extend_from_slice(&mut self, items: &[T]) -> RuntimeResult<()> {
        self.reserve(items.len())?;
        for item in items {
            // SAFETY: reserve made room for every item.
            unsafe { self.ptr.as_ptr().add(self.len).write(item.clone()) };
            self.len += 1;
        }
        Ok(())
    }

    /// Deep copy into a new allocation.
    ///
    /// # Errors
    ///
    /// Any allocation error from the global heap.
    pub fn try_clone(&self) -> RuntimeResult<Self> {
        Self::from_slice(self.as_slice())
    }
}

impl<T> Drop for Array<T> {
    fn drop(&mut self) {
        self.clear();
        if self.capacity > 0 && !Self::IS_ZST {
            memory::deallocate(self.ptr.cast()).or_fatal("array release");
        }
    }
}

impl<T> Default for Array<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Clone for Array<T> {
    #[track_caller]
    fn clone(&self) -> Self {
        self.try_clone().or_fatal("array clone")
    }
}

impl<T> Index<usize> for Array<T> {
    type Output = T;

    #[track_caller]
    fn index(&self, index: usize) -> &T {
        self.get(index).or_fatal("array index")
    }
}

impl<T> IndexMut<usize> for Array<T> {
    #[track_caller]
    fn index_mut(&mut self, index: usize) -> &mut T {
        self.get_mut(index).or_fatal("array index")
    }
}

impl<'a, T> IntoIterator for &'a Array<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T> IntoIterator for &'a mut Array<T> {
    type Item = &'a mut T;
    type IntoIter = std::slice::IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

impl<T: PartialEq> PartialEq for Array<T> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: Eq> Eq for Array<T> {}

impl<T: PartialEq> PartialEq<[T]> for Array<T> {
    fn eq(&self, other: &[T]) -> bool {
        self.as_slice() == other
    }
}

impl<T: fmt::Debug> fmt::Debug for Array<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Index-based, restartable cursor over an [`Array`].
///
/// The cursor does not borrow the array between steps. Each step re-reads
/// the current length, so:
/// - elements added behind the cursor are visited,
/// - removing an element before the cursor shifts the next one under it,
///   so that element is skipped,
/// - once the cursor passes the end it stays there until [`Cursor::reset`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Cursor {
    position: usize,
}

impl Cursor {
    /// A cursor at the first element.
    #[must_use]
    pub const fn new() -> Self {
        Self { position: 0 }
    }

    /// Index of the element the next step yields.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Yields the element under the cursor and moves past it.
    pub fn next<'a, T>(&mut self, array: &'a Array<T>) -> Option<&'a T> {
        let item = array.as_slice().get(self.position)?;
        self.position += 1;
        Some(item)
    }

    /// Restarts at the first element.
    pub fn reset(&mut self) {
        self.position = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    use crate::memory::ensure_test_heap;

    #[test]
    fn test_add_get_roundtrip() {
        ensure_test_heap();
        let mut array = Array::new();
        for i in 0..100u64 {
            array.add(i * 3).unwrap();
        }
        assert_eq!(array.len(), 100);
        for i in 0..100u64 {
            assert_eq!(array.get(i as usize), Ok(&(i * 3)));
        }
    }

    #[test]
    fn test_growth_doubles_from_one() {
        ensure_test_heap();
        let mut array = Array::new();
        assert_eq!(array.capacity(), 0);
        array.add(1u8).unwrap();
        assert_eq!(array.capacity(), 1);
        array.add(2).unwrap();
        assert_eq!(array.capacity(), 2);
        array.add(3).unwrap();
        assert_eq!(array.capacity(), 4);
        array.add(4).unwrap();
        array.add(5).unwrap();
        assert_eq!(array.capacity(), 8);
        assert_eq!(array.as_slice(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_bounds_checked_access() {
        ensure_test_heap();
        let mut array = Array::from_slice(&[10, 20]).unwrap();
        assert_eq!(array.get(2), Err(RuntimeError::IndexOutOfBounds { index: 2, len: 2 }));
        assert!(array.set(5, 0).is_err());
        assert!(array.remove_at(2).is_err());
        assert!(array.insert(3, 0).is_err());

        assert_eq!(array.set(1, 25), Ok(20));
        assert_eq!(array[1], 25);
        array[0] += 1;
        assert_eq!(array.as_slice(), &[11, 25]);
    }

    #[test]
    #[should_panic(expected = "array index: index out of bounds: index 7, length 0")]
    fn test_index_out_of_range_is_fatal() {
        let array: Array<u32> = Array::new();
        let _value = array[7];
    }

    #[test]
    fn test_remove_shifts_and_keeps_capacity() {
        ensure_test_heap();
        let mut array = Array::from_slice(&[1, 2, 3, 4]).unwrap();
        let capacity = array.capacity();
        assert_eq!(array.remove_at(1), Ok(2));
        assert_eq!(array.as_slice(), &[1, 3, 4]);
        assert_eq!(array.remove_at(2), Ok(4));
        assert_eq!(array.as_slice(), &[1, 3]);
        assert_eq!(array.capacity(), capacity);
    }

    #[test]
    fn test_insert_and_pop() {
        ensure_test_heap();
        let mut array = Array::new();
        array.insert(0, 'b').unwrap();
        array.insert(0, 'a').unwrap();
        array.insert(2, 'c').unwrap();
        assert_eq!(array.as_slice(), &['a', 'b', 'c']);
        assert_eq!(array.pop(), Some('c'));
        assert_eq!(array.first(), Some(&'a'));
        assert_eq!(array.last(), Some(&'b'));
    }

    #[test]
    fn test_drops_every_element_once() {
        ensure_test_heap();
        let drops = Rc::new(Cell::new(0));
        struct Probe(Rc<Cell<usize>>);
        impl Drop for Probe {
            fn drop(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }

        let mut array = Array::new();
        for _ in 0..10 {
            array.add(Probe(Rc::clone(&drops))).unwrap();
        }
        drop(array.remove_at(3).unwrap());
        assert_eq!(drops.get(), 1);
        array.truncate(5);
        assert_eq!(drops.get(), 5);
        drop(array);
        assert_eq!(drops.get(), 10);
    }

    #[test]
    fn test_heap_backed_elements_survive_growth() {
        ensure_test_heap();
        let mut names: Array<Array<u8>> = Array::new();
        for i in 0..50u8 {
            names.add(Array::from_slice(&[i, i + 1]).unwrap()).unwrap();
        }
        for (i, name) in names.iter().enumerate() {
            assert_eq!(name.as_slice(), &[i as u8, i as u8 + 1]);
        }
        let copy = names.clone();
        assert_eq!(copy, names);
    }

    #[test]
    fn test_reserve_is_exact() {
        ensure_test_heap();
        let mut array: Array<u32> = Array::with_capacity(10).unwrap();
        assert_eq!(array.capacity(), 10);
        array.reserve(5).unwrap();
        assert_eq!(array.capacity(), 10);
        array.extend_from_slice(&[0; 12]).unwrap();
        assert_eq!(array.capacity(), 12);
        assert!(array.contains(&0));
    }

    #[test]
    fn test_zero_sized_elements() {
        let mut array = Array::new();
        for _ in 0..1000 {
            array.add(()).unwrap();
        }
        assert_eq!(array.len(), 1000);
        assert_eq!(array.pop(), Some(()));
    }

    #[test]
    fn test_cursor_sees_mutation_between_steps() {
        ensure_test_heap();
        let mut array = Array::from_slice(&[1, 2, 3]).unwrap();
        let mut cursor = Cursor::new();

        assert_eq!(cursor.next(&array), Some(&1));
        array.add(4).unwrap();
        assert_eq!(cursor.next(&array), Some(&2));
        array.remove_at(0).unwrap();
        // [2, 3, 4]: position 2 now holds 4, so 3 is skipped.
        assert_eq!(cursor.next(&array), Some(&4));
        assert_eq!(cursor.next(&array), None);
        assert_eq!(cursor.position(), 3);

        cursor.reset();
        let seen: Vec<i32> = std::iter::from_fn(|| cursor.next(&array).copied()).collect();
        assert_eq!(seen, [2, 3, 4]);
    }
}
