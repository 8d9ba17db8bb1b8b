//! # Optional Values
//!
//! Engine code speaks of options as "defined" or "empty". The representation
//! is std `Option<T>`; this module only adds the checked accessors.

use crate::error::{fatal, RuntimeError, RuntimeResult};

/// Engine vocabulary for [`Option`].
///
/// # Example
///
/// ```rust
/// use oroboros_runtime::OptionExt;
///
/// let camera: Option<u32> = Some(3);
/// assert!(camera.is_defined());
/// assert_eq!(camera.value(), 3);
///
/// let missing: Option<u32> = None;
/// assert!(missing.try_value().is_err());
/// ```
pub trait OptionExt<T> {
    /// Whether a value is present.
    fn is_defined(&self) -> bool;

    /// The value.
    ///
    /// # Panics
    ///
    /// Terminates through [`fatal`] when empty.
    fn value(self) -> T;

    /// The value, or [`RuntimeError::EmptyValue`].
    ///
    /// # Errors
    ///
    /// [`RuntimeError::EmptyValue`] when empty.
    fn try_value(self) -> RuntimeResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    #[inline]
    fn is_defined(&self) -> bool {
        self.is_some()
    }

    #[inline]
    #[track_caller]
    fn value(self) -> T {
        match self {
            Some(value) => value,
            None => fatal("option value", &RuntimeError::EmptyValue),
        }
    }

    #[inline]
    fn try_value(self) -> RuntimeResult<T> {
        self.ok_or(RuntimeError::EmptyValue)
    }
}
