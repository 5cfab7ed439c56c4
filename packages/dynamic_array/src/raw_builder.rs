use std::alloc::Layout;
use std::num::NonZero;

use crate::{DEFAULT_CAPACITY, Error, MemoryProvider, RawDynamicArray, Result, SystemMemory};

/// Builder for creating an instance of [`RawDynamicArray`].
///
/// The element size is mandatory and is set with either `.element_size()` (byte-aligned
/// elements), `.layout()` or `.layout_of::<T>()`. The other settings are optional.
///
/// # Examples
///
/// Using a plain element size:
///
/// ```
/// use dynamic_array::RawDynamicArray;
///
/// let array = RawDynamicArray::builder().element_size(16).build()?;
/// # Ok::<(), dynamic_array::Error>(())
/// ```
///
/// Using type-based layout with a custom initial capacity:
///
/// ```
/// use dynamic_array::RawDynamicArray;
/// use new_zealand::nz;
///
/// let array = RawDynamicArray::builder()
///     .layout_of::<u64>()
///     .initial_capacity(nz!(64))
///     .build()?;
///
/// assert_eq!(array.capacity(), 64);
/// assert_eq!(array.element_size(), 8);
/// # Ok::<(), dynamic_array::Error>(())
/// ```
#[derive(Debug)]
#[must_use]
pub struct RawDynamicArrayBuilder<M = SystemMemory> {
    // Zero means "not set", which build() reports like any other zero size.
    element_size: usize,
    element_align: usize,
    initial_capacity: NonZero<usize>,
    memory: M,
}

impl RawDynamicArrayBuilder {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            element_size: 0,
            element_align: 1,
            initial_capacity: DEFAULT_CAPACITY,
            memory: SystemMemory,
        }
    }
}

impl<M: MemoryProvider> RawDynamicArrayBuilder<M> {
    /// Sets the size in bytes of each element. Elements are byte-aligned.
    ///
    /// A size of zero is rejected by [`build()`](Self::build).
    #[inline]
    pub fn element_size(mut self, size: usize) -> Self {
        self.element_size = size;
        self.element_align = 1;
        self
    }

    /// Sets the size and alignment of each element from a memory layout.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::alloc::Layout;
    ///
    /// use dynamic_array::RawDynamicArray;
    ///
    /// let layout = Layout::from_size_align(12, 4).unwrap();
    /// let array = RawDynamicArray::builder().layout(layout).build()?;
    ///
    /// assert_eq!(array.element_layout(), layout);
    /// # Ok::<(), dynamic_array::Error>(())
    /// ```
    #[inline]
    pub fn layout(mut self, layout: Layout) -> Self {
        self.element_size = layout.size();
        self.element_align = layout.align();
        self
    }

    /// Sets the size and alignment of each element to those of `T`.
    #[inline]
    pub fn layout_of<T>(self) -> Self {
        self.layout(Layout::new::<T>())
    }

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
    pub fn memory<N: MemoryProvider>(self, memory: N) -> RawDynamicArrayBuilder<N> {
        RawDynamicArrayBuilder {
            element_size: self.element_size,
            element_align: self.element_align,
            initial_capacity: self.initial_capacity,
            memory,
        }
    }

    /// Builds the array and allocates its initial buffer.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidArgument`] if no element size was set, the element size is zero or
    ///   the element layout is not representable.
    /// * [`Error::OutOfMemory`] if the initial buffer cannot be allocated.
    pub fn build(self) -> Result<RawDynamicArray<M>> {
        let layout = Layout::from_size_align(self.element_size, self.element_align).map_err(
            |_layout_error| Error::InvalidArgument {
                reason: "element size exceeds the address space",
            },
        )?;

        RawDynamicArray::new_inner(layout, self.initial_capacity, self.memory)
    }
}
