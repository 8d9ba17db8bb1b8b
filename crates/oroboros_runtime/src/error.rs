//! # Runtime Error Types
//!
//! All errors that can occur in the primitive runtime.
//!
//! Only [`RuntimeError::OutOfMemory`] is recoverable in practice. Everything
//! else is a programming error: the fallible APIs surface it to the caller,
//! and the infallible ones (`Deref`, `Index`, `Drop`) route it through
//! [`fatal`].

use thiserror::Error;

/// Errors that can occur in the runtime layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// The heap cannot satisfy the request, even after growing.
    #[error("out of memory: requested {requested} bytes, {available} bytes left to grow")]
    OutOfMemory {
        /// Bytes requested by the caller.
        requested: usize,
        /// Bytes the heap could still grow by.
        available: usize,
    },

    /// Alignment is not a power of two or exceeds the supported maximum.
    #[error("invalid alignment: {0}")]
    InvalidAlignment(usize),

    /// Container access outside `0..len`.
    #[error("index out of bounds: index {index}, length {len}")]
    IndexOutOfBounds {
        /// The offending index.
        index: usize,
        /// Length of the container at the time of access.
        len: usize,
    },

    /// The address was never handed out, or was already freed.
    #[error("invalid free at heap offset {offset:#x}: {reason}")]
    InvalidFree {
        /// Heap offset of the user address.
        offset: usize,
        /// Which integrity check failed.
        reason: &'static str,
    },

    /// A heap invariant no longer holds.
    #[error("heap corruption at offset {offset:#x}: {reason}")]
    HeapCorruption {
        /// Heap offset where the walk stopped.
        offset: usize,
        /// Which invariant is broken.
        reason: &'static str,
    },

    /// Dereferenced a null shared pointer.
    #[error("null dereference")]
    NullDereference,

    /// Requested a mutable view of a payload that has other owners.
    #[error("cannot mutate shared payload: {strong} owners")]
    SharedMutation {
        /// Current strong count.
        strong: usize,
    },

    /// Took the value of an empty option.
    #[error("value of an empty option")]
    EmptyValue,

    /// The global heap was used before [`crate::memory::init`].
    #[error("heap not initialized")]
    Uninitialized,

    /// [`crate::memory::init`] was called twice.
    #[error("heap already initialized")]
    AlreadyInitialized,

    /// Shutdown refused while allocations are outstanding.
    #[error("heap has {0} live allocations")]
    LiveAllocations(usize),

    /// Invalid heap configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Text could not be parsed into the requested value.
    #[error("parse error: {0}")]
    Parse(String),

    /// Bytes are not valid UTF-8.
    #[error("invalid utf-8")]
    Utf8,
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Terminates on a non-recoverable runtime error.
///
/// Logs the failing operation and panics at the caller's location. Release
/// builds abort on panic, so this ends the process.
#[cold]
#[track_caller]
pub fn fatal(operation: &str, error: &RuntimeError) -> ! {
    let location = std::panic::Location::caller();
    tracing::error!(%location, operation, %error, "fatal runtime error");
    panic!("{operation}: {error} (at {location})")
}

/// Unwraps a runtime result, or terminates via [`fatal`].
pub(crate) trait OrFatal<T> {
    /// Returns the value, or terminates naming `operation`.
    fn or_fatal(self, operation: &str) -> T;
}

impl<T> OrFatal<T> for RuntimeResult<T> {
    #[inline]
    #[track_caller]
    fn or_fatal(self, operation: &str) -> T {
        match self {
            Ok(value) => value,
            Err(error) => fatal(operation, &error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = RuntimeError::OutOfMemory { requested: 64, available: 0 };
        assert_eq!(err.to_string(), "out of memory: requested 64 bytes, 0 bytes left to grow");

        let err = RuntimeError::InvalidFree { offset: 0x40, reason: "bad magic" };
        assert_eq!(err.to_string(), "invalid free at heap offset 0x40: bad magic");
    }

    #[test]
    #[should_panic(expected = "array get: index out of bounds")]
    fn test_fatal_panics_with_operation() {
        fatal("array get", &RuntimeError::IndexOutOfBounds { index: 3, len: 1 });
    }
}
