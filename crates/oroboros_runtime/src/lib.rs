//! # OROBOROS Runtime
//!
//! The primitive layer every other engine system is built on:
//! - One heap, carved by a first-fit free-list allocator
//! - Reference-counted and growable containers on that heap
//! - Byte strings with a parsing cursor
//! - Hashed string identifiers
//!
//! ## Architecture Rules
//!
//! 1. **One gateway to memory** - containers allocate only through [`memory`]
//! 2. **Explicit lifecycle** - [`memory::init`] before use, [`memory::shutdown`] when done
//! 3. **Fail loudly** - fallible APIs return [`RuntimeResult`], infallible
//!    ones terminate through [`error::fatal`]
//!
//! ## Example
//!
//! ```rust
//! use oroboros_runtime::{memory, sid, Array, HeapConfig, HeapString, SharedPtr};
//!
//! # let _ = memory::init(&HeapConfig::default());
//! let name: HeapString = "player".parse().unwrap();
//! let mut inventory = Array::new();
//! inventory.add(sid("item_sword")).unwrap();
//!
//! let shared = SharedPtr::new(name).unwrap();
//! assert_eq!(*shared, "player");
//! assert_eq!(inventory[0], sid("item_sword"));
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod array;
pub mod config;
pub mod error;
pub mod memory;
pub mod option;
pub mod shared;
pub mod sid;
pub mod string;

pub use array::{Array, Cursor};
pub use config::HeapConfig;
pub use error::{RuntimeError, RuntimeResult};
pub use option::OptionExt;
pub use shared::SharedPtr;
pub use sid::{sid, StringId};
pub use string::{HeapString, SplitMode, StringIterator};
