use crate::{DynamicArray, MemoryProvider, Result};

/// Element and capacity operations shared by the typed dynamic array flavors.
///
/// Both [`DynamicArray`] and [`SharedDynamicArray`][crate::SharedDynamicArray] implement this
/// trait, so code that fills or drains an array can be written once for either flavor. Values
/// are read by copy, which is the only form of access both flavors can offer.
///
/// # Example
///
/// ```
/// use dynamic_array::{ArrayAccess, DynamicArray, Result};
///
/// fn fill(array: &mut impl ArrayAccess<u32>, count: u32) -> Result<()> {
///     for value in 0..count {
///         array.push(value)?;
///     }
///
///     Ok(())
/// }
///
/// let mut array = DynamicArray::<u32>::new()?;
/// fill(&mut array, 20)?;
///
/// assert_eq!(array.read(19)?, 19);
/// assert_eq!(ArrayAccess::capacity(&array), 30);
/// # Ok::<(), dynamic_array::Error>(())
/// ```
pub trait ArrayAccess<T: Copy> {
    /// Number of live elements.
    fn len(&self) -> usize;

    /// Whether the array has no live elements.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of elements the buffer can hold without reallocating.
    fn capacity(&self) -> usize;

    /// Removes all elements without changing the capacity.
    fn clear(&mut self);

    /// Reallocates the buffer to hold exactly `capacity` elements.
    fn reserve(&mut self, capacity: usize) -> Result<()>;

    /// Doubles the capacity `doublings` times.
    fn expand(&mut self, doublings: u32) -> Result<()>;

    /// Halves the capacity up to `halvings` times without going below `max(len, 1)`.
    fn shrink(&mut self, halvings: u32) -> Result<()>;

    /// Reallocates the buffer to hold exactly `max(len, 1)` elements.
    fn shrink_to_fit(&mut self) -> Result<()>;

    /// Appends a value.
    fn push(&mut self, value: T) -> Result<()>;

    /// Removes and returns the last value, or `None` if the array is empty.
    fn pop(&mut self) -> Result<Option<T>>;

    /// Overwrites the slot at `index`, which may be any slot within the capacity.
    fn set(&mut self, index: usize, value: T) -> Result<()>;

    /// Inserts a value at `index`, shifting later values to the right.
    fn insert(&mut self, index: usize, value: T) -> Result<()>;

    /// Removes the value at `index`, shifting later values to the left.
    fn remove(&mut self, index: usize) -> Result<()>;

    /// Returns a copy of the value at `index`.
    fn read(&self, index: usize) -> Result<T>;
}

impl<T: Copy, M: MemoryProvider> ArrayAccess<T> for DynamicArray<T, M> {
    #[inline]
    fn len(&self) -> usize {
        Self::len(self)
    }

    #[inline]
    fn is_empty(&self) -> bool {
        Self::is_empty(self)
    }

    #[inline]
    fn capacity(&self) -> usize {
        Self::capacity(self)
    }

    #[inline]
    fn clear(&mut self) {
        Self::clear(self);
    }

    #[inline]
    fn reserve(&mut self, capacity: usize) -> Result<()> {
        Self::reserve(self, capacity)
    }

    #[inline]
    fn expand(&mut self, doublings: u32) -> Result<()> {
        Self::expand(self, doublings)
    }

    #[inline]
    fn shrink(&mut self, halvings: u32) -> Result<()> {
        Self::shrink(self, halvings)
    }

    #[inline]
    fn shrink_to_fit(&mut self) -> Result<()> {
        Self::shrink_to_fit(self)
    }

    #[inline]
    fn push(&mut self, value: T) -> Result<()> {
        Self::push(self, value)
    }

    #[inline]
    fn pop(&mut self) -> Result<Option<T>> {
        Self::pop(self)
    }

    #[inline]
    fn set(&mut self, index: usize, value: T) -> Result<()> {
        Self::set(self, index, value)
    }

    #[inline]
    fn insert(&mut self, index: usize, value: T) -> Result<()> {
        Self::insert(self, index, value)
    }

    #[inline]
    fn remove(&mut self, index: usize) -> Result<()> {
        Self::remove(self, index)
    }

    #[inline]
    fn read(&self, index: usize) -> Result<T> {
        self.get(index).copied()
    }
}
