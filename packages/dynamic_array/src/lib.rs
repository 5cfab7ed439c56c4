#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! A growable contiguous array of fixed-size elements with explicit capacity control.
//!
//! The array keeps its elements in one buffer and grows it by doubling when an append or
//! insert runs out of room. Unlike [`Vec`], capacity is a first-class part of the API: it can be
//! set exactly, doubled or halved a given number of times and trimmed to the element count, and
//! every one of these operations reports allocation failure as an error instead of aborting.
//!
//! # Key Features
//!
//! - **Type-erased or typed storage**: [`RawDynamicArray`] stores opaque byte blocks of a size
//!   chosen at runtime, [`DynamicArray<T>`] stores `Copy` values of one type
//! - **Explicit capacity control**: [`reserve()`](DynamicArray::reserve),
//!   [`expand()`](DynamicArray::expand), [`shrink()`](DynamicArray::shrink) and
//!   [`shrink_to_fit()`](DynamicArray::shrink_to_fit)
//! - **Strong failure guarantee**: a failed operation leaves the array exactly as it was
//! - **Borrow-checked access**: [`get()`](DynamicArray::get) returns a reference that no
//!   mutation can invalidate while it is alive
//! - **Optional locking**: [`SharedDynamicArray<T>`] serializes every operation behind a mutex
//!   (requires the `sync` feature, enabled by default)
//! - **Pluggable memory**: a custom [`MemoryProvider`] can back the buffer
//!
//! # Capacity rules
//!
//! A new array holds [`DEFAULT_CAPACITY`] slots unless configured otherwise. Capacity is never
//! zero while the buffer is allocated and never below the element count:
//!
//! - Appending to a full array doubles the capacity.
//! - `shrink(n)` halves the capacity up to `n` times but stops before going below
//!   `max(len, 1)`.
//! - `shrink_to_fit()` sets the capacity to exactly `max(len, 1)`.
//!
//! # Examples
//!
//! ## Typed array
//!
//! ```rust
//! use dynamic_array::DynamicArray;
//!
//! let mut array = DynamicArray::<i32>::new()?;
//!
//! for value in 1..=16 {
//!     array.push(value)?;
//! }
//!
//! // The 16th element did not fit in the default 15 slots.
//! assert_eq!(array.capacity(), 30);
//!
//! array.shrink_to_fit()?;
//! assert_eq!(array.capacity(), 16);
//!
//! assert_eq!(*array.get(0)?, 1);
//! assert_eq!(array.pop()?, Some(16));
//! # Ok::<(), dynamic_array::Error>(())
//! ```
//!
//! ## Type-erased array
//!
//! ```rust
//! use dynamic_array::RawDynamicArray;
//!
//! // Elements are 3-byte records.
//! let mut array = RawDynamicArray::builder().element_size(3).build()?;
//!
//! array.push(b"abc")?;
//! array.push(b"xyz")?;
//! array.insert(1, b"mid")?;
//!
//! assert_eq!(array.get(1)?, b"mid");
//! assert_eq!(array.len(), 3);
//! # Ok::<(), dynamic_array::Error>(())
//! ```
//!
//! ## Handling errors
//!
//! ```rust
//! use dynamic_array::{DynamicArray, Error};
//!
//! let mut array = DynamicArray::<u8>::new()?;
//! array.push(1)?;
//!
//! match array.remove(5) {
//!     Err(Error::IndexOutOfRange { index, bound }) => {
//!         assert_eq!((index, bound), (5, 1));
//!     }
//!     other => panic!("unexpected result: {other:?}"),
//! }
//! # Ok::<(), dynamic_array::Error>(())
//! ```
//!
//! # Logging
//!
//! Buffer allocations, resizes and releases are reported as `tracing` events at the `debug`
//! level. Allocation failures are reported at the `warn` level. The crate never installs a
//! subscriber.

mod access;
mod array;
mod builder;
mod constants;
mod error;
mod memory;
mod raw;
mod raw_builder;
#[cfg(feature = "sync")]
mod shared;

pub use access::*;
pub use array::*;
pub use builder::*;
pub use constants::DEFAULT_CAPACITY;
pub use error::*;
#[cfg(test)]
pub(crate) use memory::FailingMemory;
pub use memory::{MemoryProvider, SystemMemory};
pub use raw::*;
pub use raw_builder::*;
#[cfg(feature = "sync")]
pub use shared::*;
