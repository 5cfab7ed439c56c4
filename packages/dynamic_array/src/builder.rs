use std::alloc::Layout;
use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::num::NonZero;

use crate::{DEFAULT_CAPACITY, DynamicArray, MemoryProvider, RawDynamicArray, Result, SystemMemory};
#[cfg(feature = "sync")]
use crate::SharedDynamicArray;

/// Builder for creating an instance of [`DynamicArray`] or
/// [`SharedDynamicArray`][crate::SharedDynamicArray].
///
/// The element layout comes from `T`, so only the initial capacity and the memory provider
/// can be configured.
///
/// # Example
///
/// ```
/// use dynamic_array::DynamicArray;
/// use new_zealand::nz;
///
/// let mut array = DynamicArray::<f64>::builder()
///     .initial_capacity(nz!(2))
///     .build()?;
///
/// array.push(1.0)?;
/// array.push(2.0)?;
/// array.push(3.0)?;
///
/// assert_eq!(array.capacity(), 4);
/// # Ok::<(), dynamic_array::Error>(())
/// ```
#[must_use]
pub struct DynamicArrayBuilder<T, M = SystemMemory> {
    initial_capacity: NonZero<usize>,
    memory: M,

    _element: PhantomData<fn() -> T>,
}

impl<T: Copy> DynamicArrayBuilder<T> {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            initial_capacity: DEFAULT_CAPACITY,
            memory: SystemMemory,
            _element: PhantomData,
        }
    }
}

impl<T: Copy, M: MemoryProvider> DynamicArrayBuilder<T, M> {
    /// Sets the number of slots allocated on initialization and reinitialization.
    ///
    /// Defaults to [`DEFAULT_CAPACITY`].
    #[inline]
    pub fn initial_capacity(mut self, capacity: NonZero<usize>) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Sets the [memory provider][MemoryProvider] that backs the element buffer.
    ///
    /// Defaults to [`SystemMemory`].
    #[inline]
    pub fn memory<N: MemoryProvider>(self, memory: N) -> DynamicArrayBuilder<T, N> {
        DynamicArrayBuilder {
            initial_capacity: self.initial_capacity,
            memory,
            _element: PhantomData,
        }
    }

    /// Builds the array and allocates its initial buffer.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidArgument`][crate::Error::InvalidArgument] if `T` is zero-sized.
    /// * [`Error::OutOfMemory`][crate::Error::OutOfMemory] if the initial buffer cannot be
    ///   allocated.
    pub fn build(self) -> Result<DynamicArray<T, M>> {
        let raw = RawDynamicArray::new_inner(
            Layout::new::<T>(),
            self.initial_capacity,
            self.memory,
        )?;

        Ok(DynamicArray::from_raw(raw))
    }

    /// Builds an array that can be shared and mutated across threads.
    ///
    /// # Errors
    ///
    /// Same as [`build()`](Self::build).
    ///
    /// # Example
    ///
    /// ```
    /// use dynamic_array::DynamicArray;
    ///
    /// let array = DynamicArray::<u32>::builder().build_shared()?;
    /// let clone = array.clone();
    ///
    /// std::thread::spawn(move || clone.push(42)).join().unwrap()?;
    ///
    /// assert_eq!(array.get(0)?, 42);
    /// # Ok::<(), dynamic_array::Error>(())
    /// ```
    #[cfg(feature = "sync")]
    pub fn build_shared(self) -> Result<SharedDynamicArray<T, M>> {
        self.build().map(SharedDynamicArray::from)
    }
}

impl<T, M: fmt::Debug> fmt::Debug for DynamicArrayBuilder<T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicArrayBuilder")
            .field("element_type", &type_name::<T>())
            .field("initial_capacity", &self.initial_capacity)
            .field("memory", &self.memory)
            .finish()
    }
}
