use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::{DynamicArrayBuilder, MemoryProvider, RawDynamicArray, Result, SystemMemory};

/// A growable contiguous array of `T` values with explicit capacity control.
///
/// This is the typed face of [`RawDynamicArray`]: the element size is `size_of::<T>()` and
/// elements go in and out by value. Capacity grows and shrinks exactly as described on
/// [`RawDynamicArray`]: it starts at [`DEFAULT_CAPACITY`][crate::DEFAULT_CAPACITY], doubles on
/// demand and never drops to zero while the buffer is allocated.
///
/// Elements are copied bit by bit when they are moved around the buffer, which is why `T` must
/// be [`Copy`].
///
/// # Examples
///
/// ```
/// use dynamic_array::DynamicArray;
///
/// let mut array = DynamicArray::<u64>::new()?;
///
/// for value in 0..10 {
///     array.push(value)?;
/// }
///
/// assert_eq!(array.len(), 10);
/// assert_eq!(*array.get(3)?, 3);
///
/// array.remove(0)?;
/// array.insert(0, 100)?;
/// assert_eq!(*array.get(0)?, 100);
///
/// assert_eq!(array.pop()?, Some(9));
/// # Ok::<(), dynamic_array::Error>(())
/// ```
///
/// References returned by [`get()`](Self::get) borrow the array, so the compiler rejects any
/// mutation while they are alive:
///
/// ```compile_fail
/// use dynamic_array::DynamicArray;
///
/// let mut array = DynamicArray::<u32>::new().unwrap();
/// array.push(1).unwrap();
///
/// let first = array.get(0).unwrap();
/// array.push(2).unwrap(); // May reallocate, so this does not compile.
/// assert_eq!(*first, 1);
/// ```
///
/// # Thread safety
///
/// The array is [`Send`] and [`Sync`] when `T` and the memory provider are. Mutation requires
/// `&mut self`; use [`SharedDynamicArray`][crate::SharedDynamicArray] to mutate from multiple
/// threads through a lock.
pub struct DynamicArray<T, M: MemoryProvider = SystemMemory> {
    raw: RawDynamicArray<M>,
    _element: PhantomData<T>,
}

impl<T: Copy> DynamicArray<T> {
    /// Creates a builder for configuring and constructing a [`DynamicArray`].
    ///
    /// # Example
    ///
    /// ```
    /// use dynamic_array::DynamicArray;
    /// use new_zealand::nz;
    ///
    /// let array = DynamicArray::<u16>::builder()
    ///     .initial_capacity(nz!(100))
    ///     .build()?;
    ///
    /// assert_eq!(array.capacity(), 100);
    /// # Ok::<(), dynamic_array::Error>(())
    /// ```
    #[inline]
    pub fn builder() -> DynamicArrayBuilder<T> {
        DynamicArrayBuilder::new()
    }

    /// Creates an empty array with the default configuration.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidArgument`][crate::Error::InvalidArgument] if `T` is zero-sized.
    /// * [`Error::OutOfMemory`][crate::Error::OutOfMemory] if the initial buffer cannot be
    ///   allocated.
    #[inline]
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }
}

impl<T: Copy, M: MemoryProvider> DynamicArray<T, M> {
    pub(crate) fn from_raw(raw: RawDynamicArray<M>) -> Self {
        debug_assert_eq!(raw.element_size(), size_of::<T>());

        Self {
            raw,
            _element: PhantomData,
        }
    }

    /// Size of one element in bytes, which is `size_of::<T>()`.
    #[must_use]
    #[inline]
    pub fn element_size(&self) -> usize {
        self.raw.element_size()
    }

    /// Number of live elements.
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Can be mutated to infinite loops in callers.
    #[inline]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Whether the array has no live elements.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Number of elements the buffer can hold without reallocating.
    ///
    /// Zero if and only if the buffer has been released.
    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        self.raw.capacity()
    }

    /// Whether the array currently owns a buffer.
    #[must_use]
    #[inline]
    pub fn is_allocated(&self) -> bool {
        self.raw.is_allocated()
    }

    /// Allocates a fresh buffer of the initial capacity and empties the array.
    ///
    /// See [`RawDynamicArray::reinitialize()`].
    #[inline]
    pub fn reinitialize(&mut self) -> Result<()> {
        self.raw.reinitialize()
    }

    /// Frees the buffer, keeping the array itself usable for
    /// [`reinitialize()`](Self::reinitialize).
    #[inline]
    pub fn release_buffer(&mut self) {
        self.raw.release_buffer();
    }

    /// Releases the buffer and the array itself.
    ///
    /// This is the same as dropping the array; it exists to make the end of the array's life
    /// explicit at the call site.
    #[inline]
    pub fn release_all(self) {
        drop(self);
    }

    /// Removes all elements without changing the capacity.
    #[inline]
    pub fn clear(&mut self) {
        self.raw.clear();
    }

    /// Reallocates the buffer to hold exactly `capacity` elements.
    ///
    /// See [`RawDynamicArray::reserve()`].
    #[inline]
    pub fn reserve(&mut self, capacity: usize) -> Result<()> {
        self.raw.reserve(capacity)
    }

    /// Doubles the capacity `doublings` times.
    ///
    /// See [`RawDynamicArray::expand()`].
    #[inline]
    pub fn expand(&mut self, doublings: u32) -> Result<()> {
        self.raw.expand(doublings)
    }

    /// Halves the capacity up to `halvings` times without going below `max(len, 1)`.
    ///
    /// See [`RawDynamicArray::shrink()`].
    #[inline]
    pub fn shrink(&mut self, halvings: u32) -> Result<()> {
        self.raw.shrink(halvings)
    }

    /// Reallocates the buffer to hold exactly `max(len, 1)` elements.
    ///
    /// See [`RawDynamicArray::shrink_to_fit()`].
    #[inline]
    pub fn shrink_to_fit(&mut self) -> Result<()> {
        self.raw.shrink_to_fit()
    }

    /// Appends a value, doubling the capacity first if the buffer is full.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidArgument`][crate::Error::InvalidArgument] if the buffer has been
    ///   released.
    /// * [`Error::OutOfMemory`][crate::Error::OutOfMemory] if growing the buffer fails. The
    ///   array is unchanged in that case.
    pub fn push(&mut self, value: T) -> Result<()> {
        // SAFETY: The value is a readable T, which is exactly one element, and lives on our
        // stack rather than in the buffer.
        unsafe { self.raw.push_from(NonNull::from(&value).cast::<u8>()) }
    }

    /// Removes the last value and returns it, or `None` if the array is empty.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidArgument`][crate::Error::InvalidArgument] if the buffer has been
    ///   released.
    pub fn pop(&mut self) -> Result<Option<T>> {
        let Some(slot) = self.raw.pop_slot()? else {
            return Ok(None);
        };

        // SAFETY: The slot held a live T. The buffer is aligned for T and the element stride
        // equals size_of::<T>(), so every slot is aligned.
        Ok(Some(unsafe { slot.cast::<T>().read() }))
    }

    /// Overwrites the slot at `index`, which may be any slot within the capacity.
    ///
    /// Writing a slot at or beyond [`len()`](Self::len) does not change the length.
    ///
    /// # Errors
    ///
    /// * [`Error::IndexOutOfRange`][crate::Error::IndexOutOfRange] if
    ///   `index >= capacity()`.
    /// * [`Error::InvalidArgument`][crate::Error::InvalidArgument] if the buffer has been
    ///   released.
    pub fn set(&mut self, index: usize, value: T) -> Result<()> {
        // SAFETY: See push().
        unsafe { self.raw.set_from(index, NonNull::from(&value).cast::<u8>()) }
    }

    /// Inserts a value at `index`, shifting all later values one slot to the right.
    ///
    /// `index == len()` appends.
    ///
    /// # Errors
    ///
    /// * [`Error::IndexOutOfRange`][crate::Error::IndexOutOfRange] if `index > len()`.
    /// * [`Error::InvalidArgument`][crate::Error::InvalidArgument] if the buffer has been
    ///   released.
    /// * [`Error::OutOfMemory`][crate::Error::OutOfMemory] if growing the buffer fails.
    pub fn insert(&mut self, index: usize, value: T) -> Result<()> {
        // SAFETY: See push().
        unsafe {
            self.raw
                .insert_from(index, NonNull::from(&value).cast::<u8>())
        }
    }

    /// Removes the value at `index`, shifting all later values one slot to the left.
    ///
    /// # Errors
    ///
    /// * [`Error::IndexOutOfRange`][crate::Error::IndexOutOfRange] if `index >= len()`.
    /// * [`Error::InvalidArgument`][crate::Error::InvalidArgument] if the buffer has been
    ///   released.
    #[inline]
    pub fn remove(&mut self, index: usize) -> Result<()> {
        self.raw.remove(index)
    }

    /// Returns a reference to the value at `index`.
    ///
    /// # Errors
    ///
    /// * [`Error::IndexOutOfRange`][crate::Error::IndexOutOfRange] if `index >= len()`.
    /// * [`Error::InvalidArgument`][crate::Error::InvalidArgument] if the buffer has been
    ///   released.
    pub fn get(&self, index: usize) -> Result<&T> {
        let slot = self.raw.live_slot(index)?;

        // SAFETY: The slot holds a live, aligned T (see pop()) and the returned reference
        // borrows self, so the buffer cannot change while it exists.
        Ok(unsafe { slot.cast::<T>().as_ref() })
    }

    /// Returns a mutable reference to the value at `index`.
    ///
    /// # Errors
    ///
    /// Same as [`get()`](Self::get).
    pub fn get_mut(&mut self, index: usize) -> Result<&mut T> {
        let slot = self.raw.live_slot(index)?;

        // SAFETY: As in get(), and we hold &mut self so the reference is exclusive.
        Ok(unsafe { slot.cast::<T>().as_mut() })
    }
}

impl<T, M: MemoryProvider> fmt::Debug for DynamicArray<T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicArray")
            .field("element_type", &type_name::<T>())
            .field("raw", &self.raw)
            .finish()
    }
}
